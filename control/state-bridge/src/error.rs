use emu_control_common::{ErrorKind, HasErrorKind};
use save_state_codec::CodecError;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("emulator is not running")]
    NotRunning,
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl HasErrorKind for BridgeError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::NotRunning => ErrorKind::CoreBusy,
            Self::Io(_) => ErrorKind::Transient,
            Self::Codec(err) => err.kind(),
        }
    }
}
