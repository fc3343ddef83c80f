//! Filesystem-watched bidirectional state synchronization (component E):
//! polls a watched path for changes and loads it; publishes an atomic
//! notify file whenever the host writes a state.

use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use emu_control_common::core::Core;
use log::{error, info, warn};

use crate::error::BridgeError;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub fn default_watched_path() -> PathBuf {
    std::env::temp_dir().join("oos_yaze_state.mss")
}

pub fn default_notify_path() -> PathBuf {
    std::env::temp_dir().join("oos_yaze_state_notify")
}

#[derive(Debug, Clone, Default)]
pub struct BridgeState {
    pub last_synced_path: Option<PathBuf>,
    pub last_synced_frame: Option<u64>,
    pub last_error: Option<String>,
    pub last_error_time_ms: Option<u64>,
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Observation {
    modified_ms: u64,
    size: u64,
}

fn observe(path: &Path) -> Option<Observation> {
    let metadata = fs::metadata(path).ok()?;
    let modified_ms = metadata
        .modified()
        .ok()?
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    Some(Observation { modified_ms, size: metadata.len() })
}

pub struct StateBridge {
    core: Arc<Mutex<dyn Core>>,
    watched_path: Arc<Mutex<PathBuf>>,
    notify_path: PathBuf,
    state: Arc<Mutex<BridgeState>>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl StateBridge {
    #[must_use]
    pub fn new(core: Arc<Mutex<dyn Core>>, watched_path: PathBuf, notify_path: PathBuf) -> Self {
        Self {
            core,
            watched_path: Arc::new(Mutex::new(watched_path)),
            notify_path,
            state: Arc::new(Mutex::new(BridgeState::default())),
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    /// Re-pointing the watched path takes effect without a restart: the
    /// watch loop re-reads it every iteration.
    pub fn set_watched_path(&self, path: PathBuf) {
        *self.watched_path.lock().unwrap() = path;
    }

    #[must_use]
    pub fn watched_path(&self) -> PathBuf {
        self.watched_path.lock().unwrap().clone()
    }

    #[must_use]
    pub fn state(&self) -> BridgeState {
        self.state.lock().unwrap().clone()
    }

    pub fn start(&mut self) {
        self.running.store(true, Ordering::SeqCst);

        let core = Arc::clone(&self.core);
        let watched_path = Arc::clone(&self.watched_path);
        let state = Arc::clone(&self.state);
        let running = Arc::clone(&self.running);

        self.thread = Some(thread::spawn(move || watch_loop(&core, &watched_path, &state, &running)));
        info!("StateBridge watcher started");
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
        info!("StateBridge watcher stopped");
    }

    /// Publishes the two-line notify file atomically after a
    /// host-initiated save. Updates `lastSynced*` before releasing the
    /// lock and writing the file, so a racing reader of bridge state
    /// never observes a notify write the state didn't already reflect.
    pub fn notify_state_saved(&self, state_path: &Path, frame_count: u64) {
        {
            let mut state = self.state.lock().unwrap();
            state.last_synced_path = Some(state_path.to_path_buf());
            state.last_synced_frame = Some(frame_count);
        }

        let content = format!("{}\n{frame_count}\n", state_path.display());
        if let Err(err) = write_notify_file_atomic(&self.notify_path, &content) {
            self.record_error(err.to_string());
        } else {
            let mut state = self.state.lock().unwrap();
            state.last_error = None;
            state.last_error_time_ms = None;
        }
    }

    fn record_error(&self, message: String) {
        let mut state = self.state.lock().unwrap();
        state.last_error = Some(message);
        state.last_error_time_ms = Some(now_ms());
    }
}

/// Writes `content` to `<path>.tmp`, flushes, closes, then renames over
/// `path`. If the rename fails because the target already exists on a
/// platform that forbids overwrite, removes the target and retries once;
/// on persistent failure, removes the temp file and returns the error.
fn write_notify_file_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    let tmp_path = path.with_extension(match path.extension() {
        Some(ext) => format!("{}.tmp", ext.to_string_lossy()),
        None => "tmp".to_string(),
    });

    let write_tmp = || -> std::io::Result<()> {
        let mut file = File::create(&tmp_path)?;
        file.write_all(content.as_bytes())?;
        file.flush()
    };

    if let Err(err) = write_tmp() {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }

    match fs::rename(&tmp_path, path) {
        Ok(()) => Ok(()),
        Err(_) => {
            if fs::remove_file(path).is_ok() {
                match fs::rename(&tmp_path, path) {
                    Ok(()) => Ok(()),
                    Err(err) => {
                        let _ = fs::remove_file(&tmp_path);
                        Err(err)
                    }
                }
            } else {
                let _ = fs::remove_file(&tmp_path);
                Err(std::io::Error::new(std::io::ErrorKind::Other, "rename over notify file failed"))
            }
        }
    }
}

fn watch_loop(
    core: &Arc<Mutex<dyn Core>>,
    watched_path: &Arc<Mutex<PathBuf>>,
    state: &Arc<Mutex<BridgeState>>,
    running: &AtomicBool,
) {
    let mut last_observation: Option<Observation> = None;

    while running.load(Ordering::SeqCst) {
        let path = watched_path.lock().unwrap().clone();
        let observation = observe(&path);

        if observation.is_some() && observation != last_observation {
            last_observation = observation;
            load_watched_state(core, &path, state);
        } else if observation.is_none() {
            last_observation = None;
        }

        thread::sleep(POLL_INTERVAL);
    }
}

fn load_watched_state(core: &Arc<Mutex<dyn Core>>, path: &Path, state: &Arc<Mutex<BridgeState>>) {
    match load_yaze_state(core, path) {
        Ok(frame_count) => {
            let mut state = state.lock().unwrap();
            state.last_synced_path = Some(path.to_path_buf());
            state.last_synced_frame = Some(frame_count);
            state.last_error = None;
            state.last_error_time_ms = None;
        }
        Err(err) => {
            warn!("StateBridge failed to load {}: {err}", path.display());
            let mut state = state.lock().unwrap();
            state.last_error = Some(err.to_string());
            state.last_error_time_ms = Some(now_ms());
        }
    }
}

/// Loads a state file into the Core, bracketing the decode with a
/// pause/resume cycle that restores the pre-call pause state.
fn load_yaze_state(core: &Arc<Mutex<dyn Core>>, path: &Path) -> Result<u64, BridgeError> {
    let mut core = core.lock().unwrap();

    if !core.is_running() {
        return Err(BridgeError::NotRunning);
    }

    let was_paused = core.is_paused();
    if !was_paused {
        core.pause();
    }

    let result = (|| {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        save_state_codec::decode(&mut *core, &mut reader)?;
        Ok::<_, BridgeError>(core.frame_count())
    })();

    if !was_paused {
        core.resume();
    }

    result.inspect_err(|err| error!("bridge load of {} failed: {err}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_produces_exact_two_line_contents() {
        let dir = tempfile::tempdir().unwrap();
        let notify_path = dir.path().join("notify");

        write_notify_file_atomic(&notify_path, "statepath\n42\n").unwrap();

        let contents = fs::read_to_string(&notify_path).unwrap();
        assert_eq!(contents, "statepath\n42\n");
        assert!(!notify_path.with_extension("tmp").exists());
    }

    #[test]
    fn atomic_write_overwrites_existing_notify_file() {
        let dir = tempfile::tempdir().unwrap();
        let notify_path = dir.path().join("notify");
        fs::write(&notify_path, "stale\n0\n").unwrap();

        write_notify_file_atomic(&notify_path, "fresh\n7\n").unwrap();

        assert_eq!(fs::read_to_string(&notify_path).unwrap(), "fresh\n7\n");
    }

    #[test]
    fn observe_detects_size_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watched");
        fs::write(&path, "abc").unwrap();
        let first = observe(&path).unwrap();

        fs::write(&path, "abcdef").unwrap();
        let second = observe(&path).unwrap();

        assert_ne!(first, second);
    }

    #[test]
    fn observe_returns_none_for_missing_file() {
        assert!(observe(Path::new("/nonexistent/path/for/sure")).is_none());
    }
}
