use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use tokio::sync::Notify;
use tracing::trace;

use super::Pipe::{ConsumerPipe, Cpipe, Endpoint, ProducerPipe};
use crate::CBUS::bus::BusShared;
use crate::CBUS::fiber_pool::FiberPool;
use crate::CBUS::Msg::Cmsg::Cmsg;
use crate::Core::cord::cord_name;
use crate::Core::rmean::CbusStat;
use crate::Core::stailq::CmsgQueue;

thread_local! {
    /// Buses the current cord has joined.
    static ENDPOINTS: RefCell<Vec<Rc<Endpoint>>> = const { RefCell::new(Vec::new()) };
}

pub(crate) fn find_endpoint(bus: &Arc<BusShared>) -> Option<Rc<Endpoint>> {
    ENDPOINTS.with(|endpoints| {
        endpoints
            .borrow()
            .iter()
            .find(|endpoint| Arc::ptr_eq(&endpoint.bus, bus))
            .cloned()
    })
}

pub(crate) fn register_endpoint(endpoint: Rc<Endpoint>) {
    ENDPOINTS.with(|endpoints| endpoints.borrow_mut().push(endpoint));
}

impl ConsumerPipe {
    /// Create the consumer side of a pipe. Must be called by the cord that
    /// will consume the pipe; messages are executed by this cord's pool.
    pub fn create() -> Self {
        Self::with_pool(FiberPool::current())
    }

    /// Like [`create`](Self::create), executing messages on `pool`.
    pub fn with_pool(pool: Rc<FiberPool>) -> Self {
        Self {
            fetch_output: Arc::new(Notify::new()),
            pool,
        }
    }

    /// Destroy a pipe that never joined a bus. A joined pipe lives as long
    /// as its cord.
    pub fn destroy(self) {}

    pub fn pool(&self) -> &Rc<FiberPool> {
        &self.pool
    }
}

impl ProducerPipe {
    pub(crate) fn new(consumer: Arc<Notify>) -> Self {
        Self {
            input: RefCell::new(CmsgQueue::new()),
            n_input: Cell::new(0),
            max_input: Cell::new(usize::MAX),
            flush_scheduled: Cell::new(false),
            consumer,
        }
    }
}

impl Endpoint {
    #[inline]
    pub(crate) fn output_idx(&self) -> usize {
        self.input_idx ^ 1
    }

    /// Stage a message; flush at once if the staging cap is reached.
    pub(crate) fn push_input(&self, msg: Box<Cmsg>) {
        self.output.input.borrow_mut().push_back(msg);
        let n_input = self.output.n_input.get() + 1;
        self.output.n_input.set(n_input);
        if n_input >= self.output.max_input.get() {
            self.flush_input_now();
        }
    }

    pub(crate) fn flush_input(self: &Rc<Self>) {
        // Flush may be called with no input.
        let n_input = self.output.n_input.get();
        if n_input == 0 {
            return;
        }
        if n_input < self.output.max_input.get() {
            // Not much input, deliver at the end of the loop iteration.
            self.schedule_flush();
        } else {
            self.flush_input_now();
        }
    }

    pub(crate) fn push(self: &Rc<Self>, msg: Box<Cmsg>) {
        self.push_input(msg);
        self.schedule_flush();
    }

    /// Queue a flush behind everything currently runnable on this cord, so
    /// all messages pushed in this iteration share one lock acquisition.
    fn schedule_flush(self: &Rc<Self>) {
        if self.output.n_input.get() == 0 || self.output.flush_scheduled.replace(true) {
            return;
        }
        let endpoint = Rc::clone(self);
        tokio::task::spawn_local(async move {
            endpoint.output.flush_scheduled.set(false);
            endpoint.flush_input_now();
        });
    }

    /// Move the staged input into the shared pipe and, in the same critical
    /// section, fetch whatever the peer has sent to this cord.
    pub(crate) fn flush_input_now(&self) {
        let output = &self.output;
        if output.n_input.get() == 0 {
            return;
        }
        let (out_idx, in_idx) = (self.output_idx(), self.input_idx);

        let pipe_was_empty;
        let (flushed, fetched);
        {
            let mut state = self.bus.lock();
            let mut input = output.input.borrow_mut();
            flushed = input.len();
            pipe_was_empty = state.pipes[out_idx].pipe.is_empty();
            state.pipes[out_idx].pipe.append(&mut input);
            // While at it, pop output: this cord is the consumer of the
            // peer pipe, and the bus is locked.
            fetched = state.pipes[in_idx].pipe.len();
            self.input
                .pool
                .output
                .borrow_mut()
                .append(&mut state.pipes[in_idx].pipe);
        }
        output.n_input.set(0);
        trace!(cord = %cord_name(), flushed, fetched, "cpipe flush");

        if pipe_was_empty {
            self.bus.stats.collect(CbusStat::Events as usize, 1);
            output.consumer.notify_one();
        }
        // Process all output fetched along with the flush.
        self.input.pool.resume();
    }

    /// Move the shared pipe into this cord's ready queue and, while the bus
    /// is locked, push out anything staged for the peer.
    pub(crate) fn fetch_output(&self) {
        let (out_idx, in_idx) = (self.output_idx(), self.input_idx);

        let mut peer_pipe_was_empty = false;
        let (fetched, flushed);
        {
            let mut state = self.bus.lock();
            fetched = state.pipes[in_idx].pipe.len();
            self.input
                .pool
                .output
                .borrow_mut()
                .append(&mut state.pipes[in_idx].pipe);
            let mut input = self.output.input.borrow_mut();
            flushed = input.len();
            if !input.is_empty() {
                peer_pipe_was_empty = state.pipes[out_idx].pipe.is_empty();
                state.pipes[out_idx].pipe.append(&mut input);
            }
        }
        self.output.n_input.set(0);
        trace!(cord = %cord_name(), fetched, flushed, "cpipe fetch");

        if peer_pipe_was_empty {
            self.bus.stats.collect(CbusStat::Events as usize, 1);
            self.output.consumer.notify_one();
        }
    }

    /// Start reacting to wake-ups from the producer of the input pipe.
    pub(crate) fn start_watcher(self: &Rc<Self>) {
        let endpoint = Rc::clone(self);
        let fetch_output = self.input.fetch_output.clone();
        let task = tokio::task::spawn_local(async move {
            loop {
                fetch_output.notified().await;
                endpoint.fetch_output();
                endpoint.input.pool.resume();
            }
        });
        *self.watcher.borrow_mut() = Some(task.abort_handle());
    }

    pub(crate) fn stop_watcher(&self) {
        if let Some(watcher) = self.watcher.borrow_mut().take() {
            watcher.abort();
        }
    }
}

impl Cpipe {
    /// Resolve this pipe to the calling cord's producer state.
    fn producer(&self) -> Rc<Endpoint> {
        match find_endpoint(&self.bus) {
            Some(endpoint) if endpoint.output_idx() == self.idx => endpoint,
            _ => panic!(
                "cpipe: cord '{}' is not the producer of this pipe",
                cord_name()
            ),
        }
    }

    /// Push a message and make sure it is delivered: the flush is queued for
    /// the end of the current loop iteration unless the staging cap forces
    /// it earlier.
    pub fn push(&self, msg: Box<Cmsg>) {
        self.producer().push(msg);
    }

    /// Stage a message without scheduling delivery. Call
    /// [`flush_input`](Self::flush_input) once the batch is complete.
    pub fn push_input(&self, msg: Box<Cmsg>) {
        self.producer().push_input(msg);
    }

    /// Deliver all staged messages: at the end of the loop iteration, or
    /// right away if the staging cap has been reached.
    pub fn flush_input(&self) {
        self.producer().flush_input();
    }

    /// Set the staging cap. The default is unbounded: staged input is
    /// flushed once per loop iteration.
    pub fn set_max_input(&self, max_input: usize) {
        assert!(max_input > 0, "cpipe max_input must be positive");
        self.producer().output.max_input.set(max_input);
    }

    pub fn max_input(&self) -> usize {
        self.producer().output.max_input.get()
    }

    /// Messages staged by this cord and not yet flushed.
    pub fn n_input(&self) -> usize {
        self.producer().output.n_input.get()
    }

    /// Messages in the shared cross-thread queue. Takes the bus lock.
    pub fn shared_len(&self) -> usize {
        self.bus.state.lock().pipes[self.idx].pipe.len()
    }

    /// The other direction of the same bus.
    pub fn peer(&self) -> Cpipe {
        Cpipe {
            bus: Arc::clone(&self.bus),
            idx: self.idx ^ 1,
        }
    }

    pub fn index(&self) -> usize {
        self.idx
    }
}

impl PartialEq for Cpipe {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.bus, &other.bus) && self.idx == other.idx
    }
}

impl Eq for Cpipe {}
