use thiserror::Error;

/// All errors produced by voxbridge-core.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("engine component unavailable ({binding}): {reason}")]
    ComponentUnavailable {
        binding: &'static str,
        reason: String,
    },

    #[error("entry point `{symbol}` missing from the {binding} binding")]
    EntryPointMissing {
        binding: &'static str,
        symbol: &'static str,
    },

    #[error("engine component is not loadable on this platform ({binding}): {reason}")]
    IncompatibleComponent {
        binding: &'static str,
        reason: String,
    },

    /// Both entry-point tables failed to resolve. Carries the last failure.
    #[error("no engine binding available: {0}")]
    NoBindingAvailable(String),

    #[error("`{0}` returned a null handle")]
    InvalidHandle(&'static str),

    #[error("{0} used after release")]
    UseAfterRelease(&'static str),

    #[error("engine reported failure: {0}")]
    Generation(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("streaming queue is closed")]
    QueueClosed,

    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no output device found")]
    NoDefaultOutputDevice,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BridgeError {
    /// `true` for the failure classes that mean "this entry-point table is not
    /// present", as opposed to an error raised by the call itself.
    pub fn is_binding_unavailable(&self) -> bool {
        matches!(
            self,
            BridgeError::ComponentUnavailable { .. }
                | BridgeError::EntryPointMissing { .. }
                | BridgeError::IncompatibleComponent { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
