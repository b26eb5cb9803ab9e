use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::debug;

use super::Pipe::layout::BusState;
use super::Pipe::Pipe::{ConsumerPipe, Cpipe, Endpoint, ProducerPipe};
use super::Pipe::Pipe_impl::{find_endpoint, register_endpoint};
use crate::Core::cord::cord_name;
use crate::Core::rmean::{CbusStat, Rmean, CBUS_STAT_STRINGS};
use crate::Core::stailq::CmsgQueue;

pub(crate) struct BusShared {
    /// A single mutex protects all exchanges around the two pipes.
    pub(crate) state: Mutex<BusState>,
    /// Used only for the join rendezvous.
    pub(crate) cond: Condvar,
    pub(crate) stats: Rmean,
}

impl BusShared {
    /// Lock the bus, counting the acquisition.
    pub(crate) fn lock(&self) -> MutexGuard<'_, BusState> {
        self.stats.collect(CbusStat::Locks as usize, 1);
        self.state.lock()
    }
}

/// Cord interconnect: two pipes, one for each message flow direction
/// between exactly two cords.
///
/// ```ignore
/// let input = ConsumerPipe::create();
/// let output = bus.join(input);
/// output.set_max_input(128);
/// output.push(msg);
/// ```
#[derive(Clone)]
pub struct Cbus {
    pub(crate) shared: Arc<BusShared>,
}

impl Cbus {
    pub fn create() -> Self {
        debug!("cbus created");
        Self {
            shared: Arc::new(BusShared {
                state: Mutex::new(BusState::new()),
                cond: Condvar::new(),
                stats: Rmean::new(&CBUS_STAT_STRINGS),
            }),
        }
    }

    /// Destroy the bus once both cords are done with it. Messages still in
    /// the shared queues are freed without being delivered.
    pub fn destroy(self) {
        let stranded: Vec<CmsgQueue> = {
            let mut state = self.shared.state.lock();
            state
                .pipes
                .iter_mut()
                .map(|pipe| std::mem::take(&mut pipe.pipe))
                .collect()
        };
        let dropped: usize = stranded.iter().map(CmsgQueue::len).sum();
        // Queued messages may hold routes back into this bus; free them
        // outside the lock.
        drop(stranded);
        debug!(
            dropped,
            locks = self.shared.stats.total(CbusStat::Locks as usize),
            events = self.shared.stats.total(CbusStat::Events as usize),
            "cbus destroyed"
        );
    }

    /// Connect the calling cord to the bus: `input` becomes the pipe this
    /// cord consumes, and the returned pipe is the one it produces into.
    ///
    /// Blocks the thread until the peer cord has joined too; after both
    /// calls return, pushing is safe on either side. Must be called inside
    /// a cord, by the cord that created `input`.
    ///
    /// Panics if this cord already joined the bus or the bus already has two
    /// members.
    pub fn join(&self, input: ConsumerPipe) -> Cpipe {
        assert!(
            find_endpoint(&self.shared).is_none(),
            "cbus_join: cord '{}' has already joined this bus",
            cord_name()
        );
        let shared = &self.shared;
        let fetch_output = Arc::clone(&input.fetch_output);

        let mut state = shared.lock();
        let pipe_idx = state.pipes[0].is_bound() as usize;
        let peer_idx = pipe_idx ^ 1;
        assert!(
            !state.pipes[pipe_idx].is_bound(),
            "cbus_join: the bus already has two members"
        );
        state.pipes[pipe_idx].fetch_output = Some(fetch_output);
        shared.cond.notify_all();

        // Neither cord may push before the other one listens for wake-ups.
        let consumer = loop {
            if let Some(consumer) = &state.pipes[peer_idx].fetch_output {
                break Arc::clone(consumer);
            }
            shared.cond.wait(&mut state);
        };
        state.pipes[pipe_idx].joined = true;
        shared.cond.notify_all();
        // Our pipe is joined; wait until the peer's pipe is too.
        while !state.pipes[peer_idx].joined {
            shared.cond.wait(&mut state);
        }
        drop(state);
        shared.cond.notify_all();

        let endpoint = Rc::new(Endpoint {
            bus: Arc::clone(shared),
            input_idx: pipe_idx,
            output: ProducerPipe::new(consumer),
            input,
            watcher: RefCell::new(None),
        });
        endpoint.start_watcher();
        register_endpoint(endpoint);
        debug!(cord = %cord_name(), pipe = pipe_idx, "cbus joined");

        Cpipe {
            bus: Arc::clone(shared),
            idx: peer_idx,
        }
    }

    /// Stop listening for incoming messages on this cord. Anything still
    /// staged for the peer is flushed; the cord may keep pushing.
    pub fn leave(&self) {
        let Some(endpoint) = find_endpoint(&self.shared) else {
            panic!("cbus_leave: cord '{}' has not joined this bus", cord_name());
        };
        endpoint.stop_watcher();
        endpoint.flush_input_now();
        debug!(cord = %cord_name(), pipe = endpoint.input_idx, "cbus left");
    }

    /// The pipe the calling cord produces into. Panics outside a member cord.
    pub fn output(&self) -> Cpipe {
        match find_endpoint(&self.shared) {
            Some(endpoint) => Cpipe {
                bus: Arc::clone(&self.shared),
                idx: endpoint.output_idx(),
            },
            None => panic!("cbus: cord '{}' has not joined this bus", cord_name()),
        }
    }

    /// The pipe the calling cord consumes. Panics outside a member cord.
    pub fn input(&self) -> Cpipe {
        self.output().peer()
    }

    pub fn stats(&self) -> &Rmean {
        &self.shared.stats
    }
}
