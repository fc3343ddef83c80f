use emu_control_common::{ErrorKind, HasErrorKind};

use crate::json::ParseError;

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("bad request: {0}")]
    BadRequest(#[from] ParseError),
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
    #[error("{0}")]
    HandlerFault(String),
    #[error("{0}")]
    HandlerPanic(String),
}

impl HasErrorKind for RpcError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::Io,
            Self::BadRequest(_) | Self::UnknownCommand(_) => ErrorKind::BadRequest,
            Self::HandlerFault(_) | Self::HandlerPanic(_) => ErrorKind::HandlerFault,
        }
    }
}
