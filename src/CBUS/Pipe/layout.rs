use std::sync::Arc;

use crossbeam_utils::CachePadded;
use tokio::sync::Notify;

use crate::Core::stailq::CmsgQueue;

/// The lock-protected part of one pipe: only touched while holding the bus
/// mutex, from either cord.
///
/// The message flow in a pipe is:
///     input   <-- staged by the producer cord (ProducerPipe)
///       v
///     pipe    <-- shared, protected by the bus mutex (this struct)
///       v
///     output  <-- ready queue of the consumer cord's fiber pool
pub(crate) struct SharedPipe {
    pub(crate) pipe: CmsgQueue,
    /// Wake-up handle of the consumer cord, published when it joins.
    pub(crate) fetch_output: Option<Arc<Notify>>,
    /// The consumer has bound its producer (the peer cord) and is done joining.
    pub(crate) joined: bool,
}

impl SharedPipe {
    const fn new() -> Self {
        Self {
            pipe: CmsgQueue::new(),
            fetch_output: None,
            joined: false,
        }
    }

    #[inline]
    pub(crate) fn is_bound(&self) -> bool {
        self.fetch_output.is_some()
    }
}

/// Everything the bus mutex protects. The two directions sit on separate
/// cache lines so a flush on one does not bounce the other.
pub(crate) struct BusState {
    pub(crate) pipes: [CachePadded<SharedPipe>; 2],
}

impl BusState {
    pub(crate) fn new() -> Self {
        Self {
            pipes: [
                CachePadded::new(SharedPipe::new()),
                CachePadded::new(SharedPipe::new()),
            ],
        }
    }
}
