// Module naming follows project convention (CBUS = Cord Bus)
#[allow(non_snake_case)]
pub mod CBUS;
#[allow(non_snake_case)]
pub mod Core;
#[allow(non_snake_case)]
pub mod Debug {
    pub mod StructDebug;
}

pub use CBUS::{
    cmsg_deliver, cmsg_notify_deliver, Cbus, Cmsg, CmsgHop, CmsgNotify, ConsumerPipe, CordBuilder,
    Cpipe, FiberPool, FiberPoolBuilder, Route,
};
pub use Core::{cord_name, CbusError, CbusStat, Cord, Result};
