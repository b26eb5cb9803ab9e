use std::fmt;
use std::sync::Arc;

use crate::CBUS::fiber_pool::FiberPool;
use crate::CBUS::Msg::Cmsg::{Cmsg, CmsgHop, Route};
use crate::CBUS::Pipe::Pipe::{ConsumerPipe, Cpipe};
use crate::CBUS::Cbus;
use crate::Core::rmean::Rmean;
use crate::Core::stailq::CmsgQueue;

/// Debug function for Cbus
///
/// Shows:
/// - Bus address (shared by every handle and pipe of the bus)
/// - Length of both shared queues, unless the bus is locked right now
/// - Lock and event totals
pub fn debug_cbus(bus: &Cbus, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut s = f.debug_struct("Cbus");
    s.field("bus", &format_args!("{:p}", Arc::as_ptr(&bus.shared)));
    match bus.shared.state.try_lock() {
        Some(state) => {
            s.field("pipe0", &state.pipes[0].pipe.len());
            s.field("pipe1", &state.pipes[1].pipe.len());
            s.field("joined", &(state.pipes[0].joined && state.pipes[1].joined));
        }
        None => {
            s.field("pipes", &"<locked>");
        }
    }
    s.field("stats", &bus.shared.stats).finish()
}

/// Debug function for Cpipe
///
/// A pipe is only an address, so this never touches the bus lock.
pub fn debug_cpipe(pipe: &Cpipe, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Cpipe")
        .field("bus", &format_args!("{:p}", Arc::as_ptr(&pipe.bus)))
        .field("idx", &pipe.idx)
        .finish()
}

pub fn debug_consumer_pipe(pipe: &ConsumerPipe, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ConsumerPipe")
        .field("pool", &format_args!("{:p}", std::rc::Rc::as_ptr(&pipe.pool)))
        .finish_non_exhaustive()
}

/// Debug function for Cmsg
///
/// Displays the route position; the payload is opaque.
pub fn debug_cmsg(msg: &Cmsg, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Cmsg")
        .field("hop", &msg.hop())
        .field("hops", &msg.route().len())
        .field("payload", &"<opaque>")
        .finish()
}

pub fn debug_cmsg_hop(hop: &CmsgHop, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CmsgHop")
        .field("async", &hop.is_async())
        .field("pipe", &hop.pipe())
        .finish()
}

pub fn debug_route(route: &Route, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_list().entries(route.hops()).finish()
}

pub fn debug_cmsg_queue(queue: &CmsgQueue, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CmsgQueue")
        .field("len", &queue.len())
        .field("front", &queue.front())
        .finish()
}

/// Debug function for FiberPool
///
/// Shows:
/// - Fibers alive, parked and the cap
/// - Messages waiting for a fiber
pub fn debug_fiber_pool(pool: &FiberPool, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("FiberPool")
        .field("size", &pool.size())
        .field("idle", &pool.idle_count())
        .field("max_size", &pool.max_size())
        .field("idle_timeout", &pool.idle_timeout())
        .field("ready", &pool.ready_len())
        .finish()
}

pub fn debug_rmean(rmean: &Rmean, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut map = f.debug_map();
    for (name, total, mean) in rmean.snapshot() {
        map.entry(&name, &format_args!("total={} rps={}", total, mean));
    }
    map.finish()
}
