pub mod codec;
pub mod error;

pub use codec::{decode, decode_preview_only, encode, peek_console_type, PreviewBlock};
pub use error::CodecError;
