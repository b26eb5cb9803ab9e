use std::fmt;

use super::fiber_pool::FiberPool;
use super::Msg::Cmsg::{Cmsg, CmsgHop, Route};
use super::Pipe::Pipe::{ConsumerPipe, Cpipe};
use super::Cbus;
use crate::Core::rmean::Rmean;
use crate::Core::stailq::CmsgQueue;

impl fmt::Debug for Cbus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_cbus(self, f)
    }
}

impl fmt::Debug for Cpipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_cpipe(self, f)
    }
}

impl fmt::Debug for ConsumerPipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_consumer_pipe(self, f)
    }
}

impl fmt::Debug for Cmsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_cmsg(self, f)
    }
}

impl fmt::Debug for CmsgHop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_cmsg_hop(self, f)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_route(self, f)
    }
}

impl fmt::Debug for CmsgQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_cmsg_queue(self, f)
    }
}

impl fmt::Debug for FiberPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_fiber_pool(self, f)
    }
}

impl fmt::Debug for Rmean {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_rmean(self, f)
    }
}
