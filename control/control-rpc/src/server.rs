//! The ControlRPC server (component G): a one-request-per-connection
//! Unix domain socket acceptor that dispatches to the handler table.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use emu_control_common::core::Core;
use emu_control_common::{ErrorKind, HasErrorKind};
use log::{error, info, warn};

use crate::error::RpcError;
use crate::handlers::{default_handlers, Handler, HandlerContext};
use crate::json::{parse_request, RpcResponse};

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const MAX_REQUEST_LINE_BYTES: usize = 1024 * 1024;

/// Names the local endpoint the way the host names it: `mesen2-<pid>.sock`
/// under the OS temp dir.
#[must_use]
pub fn default_socket_path() -> std::path::PathBuf {
    std::env::temp_dir().join(format!("mesen2-{}.sock", std::process::id()))
}

pub struct ControlRpcServer {
    socket_path: std::path::PathBuf,
    core: Arc<Mutex<dyn Core>>,
    context: Arc<HandlerContext>,
    handlers: Arc<Mutex<std::collections::HashMap<String, Handler>>>,
    running: Arc<AtomicBool>,
    accept_thread: Option<JoinHandle<()>>,
}

impl ControlRpcServer {
    #[must_use]
    pub fn new(socket_path: std::path::PathBuf, core: Arc<Mutex<dyn Core>>, context: HandlerContext) -> Self {
        Self {
            socket_path,
            core,
            context: Arc::new(context),
            handlers: Arc::new(Mutex::new(default_handlers())),
            running: Arc::new(AtomicBool::new(false)),
            accept_thread: None,
        }
    }

    #[must_use]
    pub fn socket_path(&self) -> &std::path::Path {
        &self.socket_path
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn register_handler(&self, name: &str, handler: Handler) {
        self.handlers.lock().unwrap().insert(name.to_ascii_uppercase(), handler);
    }

    /// Removes any stale endpoint, binds, and spawns the acceptor thread.
    pub fn start(&mut self) -> std::io::Result<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;
        listener.set_nonblocking(true)?;

        self.running.store(true, Ordering::SeqCst);

        let running = Arc::clone(&self.running);
        let core = Arc::clone(&self.core);
        let context = Arc::clone(&self.context);
        let handlers = Arc::clone(&self.handlers);

        self.accept_thread = Some(thread::spawn(move || {
            accept_loop(&listener, &running, &core, &context, &handlers);
        }));

        info!("ControlRPC server listening on {}", self.socket_path.display());
        Ok(())
    }

    /// Cooperative shutdown: clears `running`, joins the acceptor, and
    /// removes the endpoint file.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.accept_thread.take() {
            let _ = handle.join();
        }
        let _ = std::fs::remove_file(&self.socket_path);
        info!("ControlRPC server stopped");
    }
}

fn accept_loop(
    listener: &UnixListener,
    running: &AtomicBool,
    core: &Arc<Mutex<dyn Core>>,
    context: &Arc<HandlerContext>,
    handlers: &Arc<Mutex<std::collections::HashMap<String, Handler>>>,
) {
    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, _addr)) => handle_client(stream, core, context, handlers),
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(err) => {
                warn!("ControlRPC accept error: {err}");
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
        }
    }
}

fn read_request_line(stream: &UnixStream) -> std::io::Result<Option<String>> {
    let cloned = stream.try_clone()?;
    let mut reader = BufReader::new(cloned).take(MAX_REQUEST_LINE_BYTES as u64 + 1);
    let mut line = String::new();
    let bytes_read = reader.read_line(&mut line)?;
    if bytes_read == 0 {
        return Ok(None);
    }
    if !line.ends_with('\n') {
        return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "request line too long"));
    }
    Ok(Some(line))
}

/// One request, one response, per the "connection == message" framing
/// rule. Any parse failure or handler fault is turned into an error
/// response rather than dropping the connection silently.
fn handle_client(
    mut stream: UnixStream,
    core: &Arc<Mutex<dyn Core>>,
    context: &Arc<HandlerContext>,
    handlers: &Arc<Mutex<std::collections::HashMap<String, Handler>>>,
) {
    let response = match read_request_line(&stream) {
        Ok(None) => return,
        Ok(Some(line)) => dispatch(&line, core, context, handlers),
        Err(err) => RpcResponse::failure(format!("bad request: {err}")),
    };

    if let Err(err) = stream.write_all(response.to_json_line().as_bytes()) {
        warn!("failed to write ControlRPC response: {err}");
    }
}

fn dispatch(
    line: &str,
    core: &Arc<Mutex<dyn Core>>,
    context: &Arc<HandlerContext>,
    handlers: &Arc<Mutex<std::collections::HashMap<String, Handler>>>,
) -> RpcResponse {
    let request = match parse_request(line) {
        Ok(request) => request,
        Err(err) => return failure_response(RpcError::BadRequest(err)),
    };

    let handler = {
        let handler_guard = handlers.lock().unwrap();
        let Some(handler) = handler_guard.get(&request.command_type) else {
            return failure_response(RpcError::UnknownCommand(request.command_type.clone()));
        };
        Arc::clone(handler)
    };

    let mut core_guard = core.lock().unwrap();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(&mut *core_guard, &request, context)));
    drop(core_guard);

    match outcome {
        Ok(Ok(data)) if matches!(data, crate::json::Value::Null) => RpcResponse::ok_empty(),
        Ok(Ok(data)) => RpcResponse::ok(data),
        Ok(Err(message)) => failure_response(RpcError::HandlerFault(message)),
        Err(panic_payload) => {
            let message = panic_message(&panic_payload);
            failure_response(RpcError::HandlerPanic(message))
        }
    }
}

/// Classifies `err` via [`HasErrorKind`] before turning it into a wire
/// response, so the taxonomy is exercised even though the wire format
/// itself only carries the rendered message.
fn failure_response(err: RpcError) -> RpcResponse {
    match err.kind() {
        ErrorKind::HandlerFault => error!("ControlRPC request failed ({}): {err}", err.kind()),
        _ => warn!("ControlRPC request failed ({}): {err}", err.kind()),
    }
    RpcResponse::failure(err.to_string())
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_unknown_command_is_not_fatal() {
        let handlers: Arc<Mutex<std::collections::HashMap<String, Handler>>> =
            Arc::new(Mutex::new(default_handlers()));
        let response = {
            let handlers_guard = handlers.lock().unwrap();
            handlers_guard.get("NOPE")
        };
        assert!(response.is_none());
    }
}
