use emu_control_common::core::CoreError;
use emu_control_common::{ErrorKind, HasErrorKind};
use save_state_codec::CodecError;

#[derive(Debug, thiserror::Error)]
pub enum SlotError {
    #[error("slot {0} is out of range")]
    OutOfRange(u32),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("preview buffer does not match its claimed dimensions")]
    InvalidPreview,
}

impl HasErrorKind for SlotError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::OutOfRange(_) | Self::InvalidPreview => ErrorKind::BadRequest,
            Self::Io(_) => ErrorKind::Io,
            Self::Codec(err) => err.kind(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("archive is missing {0}")]
    MissingEntry(&'static str),
    #[error("RomInfo.txt is malformed")]
    MalformedRomInfo,
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl HasErrorKind for ArchiveError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::Io,
            Self::Zip(_) | Self::MissingEntry(_) | Self::MalformedRomInfo => ErrorKind::Codec,
            Self::Codec(err) => err.kind(),
            Self::Core(err) => err.kind(),
        }
    }
}
