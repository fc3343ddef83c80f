mod config;
mod demo_core;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::Parser;
use control_rpc::{ControlRpcServer, HandlerContext};
use env_logger::Env;
use save_state_manager::SlotStore;
use state_bridge::StateBridge;

use crate::config::HostConfig;
use crate::demo_core::DemoCore;

#[derive(Debug, Parser)]
struct Args {
    /// ROM file path loaded into the demo Core at startup
    #[arg(short = 'f', long)]
    file_path: PathBuf,

    /// Override the default config file path (emu-control-config.toml)
    #[arg(long = "config")]
    config_path_override: Option<PathBuf>,

    /// Override the resolved save state slot count (1-99)
    #[arg(long)]
    max_slot_index: Option<u32>,

    /// Override the ControlRPC socket path
    #[arg(long)]
    socket_path: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let config_path = args.config_path_override.clone().unwrap_or_else(config::default_config_path);
    log::info!("loading config from '{}'", config_path.display());

    let mut host_config = HostConfig::load_or_default(&config_path);
    host_config.persist_if_missing(&config_path);

    if let Some(max_slot_index) = args.max_slot_index {
        host_config.max_slot_index = Some(max_slot_index);
    }
    if let Some(socket_path) = args.socket_path.clone() {
        host_config.socket_path = socket_path;
    }

    if let Some(max_slot_index) = host_config.max_slot_index {
        save_state_manager::slot_store::set_configured_max_index(max_slot_index);
    }

    std::fs::create_dir_all(&host_config.save_states_dir)?;

    let core = Arc::new(Mutex::new(DemoCore::new(&args.file_path.to_string_lossy())));

    let rom_stem = args.file_path.file_stem().map_or_else(|| "rom".to_string(), |s| s.to_string_lossy().into_owned());
    let slot_store = SlotStore::new(host_config.save_states_dir.clone(), &rom_stem, None, false);
    let context = HandlerContext::new(slot_store, host_config.save_states_dir.clone());

    let mut rpc_server = ControlRpcServer::new(host_config.socket_path.clone(), Arc::clone(&core) as Arc<Mutex<dyn emu_control_common::core::Core>>, context);
    rpc_server.start()?;
    log::info!("ControlRPC listening on {}", rpc_server.socket_path().display());

    let mut bridge = StateBridge::new(
        Arc::clone(&core) as Arc<Mutex<dyn emu_control_common::core::Core>>,
        host_config.watched_path.clone(),
        host_config.notify_path.clone(),
    );
    bridge.start();
    log::info!("StateBridge watching {}", bridge.watched_path().display());

    while rpc_server.is_running() {
        std::thread::sleep(std::time::Duration::from_millis(200));
    }

    bridge.stop();
    rpc_server.stop();

    Ok(())
}
