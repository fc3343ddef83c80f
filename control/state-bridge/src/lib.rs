pub mod bridge;
pub mod error;

pub use bridge::{default_notify_path, default_watched_path, BridgeState, StateBridge};
pub use error::BridgeError;
