// Cord bus: point-to-point message channels between cords, with batched
// delivery and per-message fibers on the receiving side.

pub mod Msg {
    pub mod Cmsg;
    pub mod Cmsg_impl;
    pub use Cmsg::{CmsgAsyncFn, CmsgFn, CmsgHop, CmsgNotify, Route}; // re-export for stable path
    pub use Cmsg_impl::{cmsg_notify_deliver, deliver};
}
pub mod Pipe {
    pub mod Pipe;
    pub mod Pipe_impl;
    pub mod layout;
    pub use Pipe::{ConsumerPipe, Cpipe}; // re-export for stable path
}
pub mod builder;
pub mod bus;
mod debug;
pub mod fiber_pool;
pub mod invoke;

pub use builder::{CordBuilder, FiberPoolBuilder};
pub use bus::Cbus;
pub use fiber_pool::FiberPool;
pub use Msg::Cmsg::Cmsg;
pub use Msg::{cmsg_notify_deliver, deliver as cmsg_deliver, CmsgHop, CmsgNotify, Route};
pub use Pipe::{ConsumerPipe, Cpipe};
