use std::io;

/// Recoverable failures of the bus and the cord runtime under it.
///
/// Broken initialisation sequences (double join, a third joiner, pushing
/// from a thread that does not produce the pipe) are not represented here:
/// they panic, since the process cannot continue safely.
#[derive(Debug, thiserror::Error)]
pub enum CbusError {
    #[error("failed to start cord '{name}': {source}")]
    CordSpawn {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to build the cord event loop: {0}")]
    Runtime(#[source] io::Error),

    #[error("cord '{name}' panicked")]
    CordPanicked { name: String },

    #[error("failed to start a pool fiber: {0}")]
    FiberSpawn(String),

    #[error("timed out waiting for the peer cord")]
    TimedOut,

    #[error("message was dropped before reaching its final hop")]
    Disconnected,
}

pub type Result<T> = std::result::Result<T, CbusError>;
