use std::any::Any;
use std::sync::Arc;

use lazy_static::lazy_static;
use tokio::sync::Notify;

use super::Cmsg::{Cmsg, CmsgHop, CmsgNotify, HopFn, Route};
use crate::CBUS::Pipe::Pipe::Cpipe;

impl Route {
    /// Build a route from its hops.
    ///
    /// Panics on a malformed route: an empty hop list, a last hop that still
    /// names a pipe, or two consecutive hops pushing into the same pipe (the
    /// consumer of a pipe can never be its producer).
    pub fn new(hops: Vec<CmsgHop>) -> Self {
        assert!(!hops.is_empty(), "cmsg route must have at least one hop");
        assert!(
            hops.last().is_some_and(|hop| hop.pipe.is_none()),
            "the last hop of a cmsg route must not have a next pipe"
        );
        for pair in hops.windows(2) {
            if let (Some(a), Some(b)) = (&pair[0].pipe, &pair[1].pipe) {
                assert!(a != b, "consecutive cmsg hops must not push into the same pipe");
            }
        }
        Route(hops.into())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn hops(&self) -> &[CmsgHop] {
        &self.0
    }

    pub fn ptr_eq(&self, other: &Route) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Cmsg {
    /// Allocate a message carrying `payload`, positioned at the first hop of
    /// `route`. Push it into the pipe of the first destination, or run the
    /// first hop in place with [`deliver`].
    pub fn new<T: Any + Send>(route: &Route, payload: T) -> Box<Cmsg> {
        Box::new(Cmsg {
            fifo: None,
            route: route.clone(),
            hop: 0,
            payload: Box::new(payload),
        })
    }

    /// Give the message a new route and rewind it to the first hop.
    pub fn init(&mut self, route: &Route) {
        self.route = route.clone();
        self.hop = 0;
    }

    /// Index of the hop the message is at.
    pub fn hop(&self) -> usize {
        self.hop
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn is_last_hop(&self) -> bool {
        self.hop + 1 == self.route.len()
    }

    pub fn payload<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    pub fn payload_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.payload.downcast_mut::<T>()
    }

    /// Consume the message and return its payload, or the message back if
    /// the payload is not a `T`.
    pub fn into_payload<T: Any>(self: Box<Self>) -> Result<T, Box<Self>> {
        let Cmsg {
            fifo,
            route,
            hop,
            payload,
        } = *self;
        match payload.downcast::<T>() {
            Ok(payload) => Ok(*payload),
            Err(payload) => Err(Box::new(Cmsg {
                fifo,
                route,
                hop,
                payload,
            })),
        }
    }
}

/// Dispatch the message to the next hop.
///
/// The cursor moves *before* the push: once the message is in the pipe the
/// receiving cord may already be handling it.
pub(crate) fn dispatch(pipe: Option<&Cpipe>, mut msg: Box<Cmsg>) {
    if let Some(pipe) = pipe {
        msg.hop += 1;
        pipe.push(msg);
    }
    // No next pipe: the route is over and the message is freed here.
}

/// Deliver the message at its current hop and dispatch it to the next one.
pub async fn deliver(mut msg: Box<Cmsg>) {
    // Hold the route, not the message: the handler may re-route the message.
    let route = msg.route.clone();
    let hop = &route.0[msg.hop];
    match &hop.f {
        HopFn::Sync(f) => f(msg.as_mut()),
        HopFn::Async(f) => f(msg.as_mut()).await,
    }
    dispatch(hop.pipe.as_ref(), msg);
}

/// Hop handler that wakes the fiber waiting on a [`CmsgNotify`] message.
pub fn cmsg_notify_deliver(msg: &mut Cmsg) {
    if let Some(notify) = msg.payload::<CmsgNotify>() {
        notify.fiber.notify_one();
    }
}

lazy_static! {
    static ref NOTIFY_ROUTE: Route = Route::new(vec![CmsgHop::new(cmsg_notify_deliver, None)]);
}

impl CmsgNotify {
    /// A message that wakes the caller once delivered anywhere.
    ///
    /// Push the message to the peer and await the returned `Notify`. The
    /// wake-up is stored if the message is delivered before the caller
    /// starts waiting.
    pub fn new() -> (Box<Cmsg>, Arc<Notify>) {
        let fiber = Arc::new(Notify::new());
        let msg = Cmsg::new(
            &NOTIFY_ROUTE,
            CmsgNotify {
                fiber: fiber.clone(),
            },
        );
        (msg, fiber)
    }
}
