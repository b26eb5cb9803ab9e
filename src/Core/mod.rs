pub mod cord;
pub mod error;
pub mod rmean;
pub mod stailq;

pub use cord::{cord_name, Cord};
pub use error::{CbusError, Result};
pub use rmean::{CbusStat, Rmean, CBUS_STAT_STRINGS};
pub use stailq::CmsgQueue;
