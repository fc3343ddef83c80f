pub mod breakpoints;
pub mod error;
pub mod handlers;
pub mod json;
pub mod server;
pub mod snapshots;

pub use error::RpcError;
pub use handlers::HandlerContext;
pub use json::{ParseError, RpcRequest, RpcResponse, Value};
pub use server::{default_socket_path, ControlRpcServer};
