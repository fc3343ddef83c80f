use emu_control_common::core::CoreError;
use emu_control_common::{ErrorKind, HasErrorKind};

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("emulator is not running or netplay is active")]
    CoreBusy,
    #[error("not a valid save state file")]
    InvalidFile,
    #[error("save state was created by a newer version")]
    NewerVersion,
    #[error("save state format is too old to load")]
    IncompatibleVersion,
    #[error("console type mismatch: expected {expected}, found {found}")]
    ConsoleMismatch { expected: u32, found: u32 },
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl From<emu_control_common::byteio::ReadStringError> for CodecError {
    fn from(err: emu_control_common::byteio::ReadStringError) -> Self {
        match err {
            emu_control_common::byteio::ReadStringError::Io(err) => Self::Io(err),
            emu_control_common::byteio::ReadStringError::InvalidUtf8 => Self::InvalidFile,
        }
    }
}

impl HasErrorKind for CodecError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::CoreBusy => ErrorKind::CoreBusy,
            Self::InvalidFile | Self::ConsoleMismatch { .. } => ErrorKind::Codec,
            Self::NewerVersion | Self::IncompatibleVersion => ErrorKind::Version,
            Self::Io(_) => ErrorKind::Io,
            Self::Core(err) => err.kind(),
        }
    }
}
