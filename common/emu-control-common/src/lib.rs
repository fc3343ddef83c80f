pub mod byteio;
pub mod core;
pub mod error;

pub use error::{ErrorKind, HasErrorKind};
