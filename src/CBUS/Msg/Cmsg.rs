// Messages traveling between cords and the routes they follow.

use std::any::Any;
use std::ptr::NonNull;
use std::sync::Arc;

use futures::future::LocalBoxFuture;

use crate::CBUS::Pipe::Pipe::Cpipe;

/// Synchronous hop handler.
pub type CmsgFn = dyn Fn(&mut Cmsg) + Send + Sync;

/// Hop handler that may suspend its fiber (never the thread) before the
/// message moves on.
pub type CmsgAsyncFn = dyn for<'a> Fn(&'a mut Cmsg) -> LocalBoxFuture<'a, ()> + Send + Sync;

#[derive(Clone)]
pub(crate) enum HopFn {
    Sync(Arc<CmsgFn>),
    Async(Arc<CmsgAsyncFn>),
}

/// One hop in a message travel route.
///
/// `f` is the delivery function run at this destination, `pipe` is where the
/// message goes once `f` returns. The last hop of a route has no pipe: its
/// handler is the final owner and the message is freed when it returns.
#[derive(Clone)]
pub struct CmsgHop {
    pub(crate) f: HopFn,
    pub(crate) pipe: Option<Cpipe>,
}

impl CmsgHop {
    pub fn new<F>(f: F, pipe: Option<Cpipe>) -> Self
    where
        F: Fn(&mut Cmsg) + Send + Sync + 'static,
    {
        Self {
            f: HopFn::Sync(Arc::new(f)),
            pipe,
        }
    }

    pub fn new_async<F>(f: F, pipe: Option<Cpipe>) -> Self
    where
        F: for<'a> Fn(&'a mut Cmsg) -> LocalBoxFuture<'a, ()> + Send + Sync + 'static,
    {
        Self {
            f: HopFn::Async(Arc::new(f)),
            pipe,
        }
    }

    pub fn pipe(&self) -> Option<&Cpipe> {
        self.pipe.as_ref()
    }

    pub fn is_async(&self) -> bool {
        matches!(self.f, HopFn::Async(_))
    }
}

/// An immutable, shareable message route: the array of hops one message
/// visits in order.
#[derive(Clone)]
pub struct Route(pub(crate) Arc<[CmsgHop]>);

/// A message traveling between cords.
///
/// Always handled as `Box<Cmsg>`: the box is the ownership token that moves
/// from the sender into a pipe, across the bus, into the consumer's fiber
/// pool and through the handlers of its route.
pub struct Cmsg {
    /// Link in the FIFO the message currently sits in.
    pub(crate) fifo: Option<NonNull<Cmsg>>,
    /// The message routing path.
    pub(crate) route: Route,
    /// Index of the current hop in `route`.
    pub(crate) hop: usize,
    pub(crate) payload: Box<dyn Any + Send>,
}

// `fifo` is only followed by the queue that owns the message; everything
// else in a message is Send.
unsafe impl Send for Cmsg {}

/// Payload of the single-hop "wake the waiting fiber" message.
pub struct CmsgNotify {
    pub(crate) fiber: Arc<tokio::sync::Notify>,
}
