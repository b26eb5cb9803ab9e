// One direction of a bus, split by which cord may touch what.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use tokio::sync::Notify;
use tokio::task::AbortHandle;

use crate::CBUS::bus::BusShared;
use crate::CBUS::fiber_pool::FiberPool;
use crate::Core::stailq::CmsgQueue;

/// Address of one direction of a bus.
///
/// `Cpipe` is `Send + Sync` so it can be stored in message routes that
/// travel between cords. It carries no state of its own: producer
/// operations resolve it to the calling cord's [`ProducerPipe`], and panic
/// if the calling cord does not produce into this pipe.
#[derive(Clone)]
pub struct Cpipe {
    pub(crate) bus: Arc<BusShared>,
    pub(crate) idx: usize,
}

/// Producer-only part of a pipe. Lives in the producer cord and is `!Send`.
pub(crate) struct ProducerPipe {
    /// Staging area for pushed messages.
    pub(crate) input: RefCell<CmsgQueue>,
    pub(crate) n_input: Cell<usize>,
    /// Keep the staged input under this limit: reaching it flushes at once.
    pub(crate) max_input: Cell<usize>,
    /// A flush is queued for the end of the current loop iteration.
    pub(crate) flush_scheduled: Cell<bool>,
    /// Wake-up handle of the consumer cord.
    pub(crate) consumer: Arc<Notify>,
}

/// Consumer-only part of a pipe. Created by the cord that will consume the
/// pipe and handed to [`Cbus::join`](crate::CBUS::Cbus::join).
pub struct ConsumerPipe {
    /// Signalled by the producer when the shared queue becomes non-empty.
    pub(crate) fetch_output: Arc<Notify>,
    pub(crate) pool: Rc<FiberPool>,
}

/// A cord's membership in one bus: the producer half of the outgoing pipe
/// and the consumer half of the incoming one. Registered in the cord's
/// thread-local endpoint list by `Cbus::join`.
pub(crate) struct Endpoint {
    pub(crate) bus: Arc<BusShared>,
    /// The pipe this cord consumes; it produces into the other one.
    pub(crate) input_idx: usize,
    pub(crate) output: ProducerPipe,
    pub(crate) input: ConsumerPipe,
    pub(crate) watcher: RefCell<Option<AbortHandle>>,
}
