//! The built-in command handler table (component H). Each handler
//! receives the Core, the parsed request, and shared per-server context,
//! and returns either a `data` payload or an error message; the
//! dispatcher in `server.rs` turns either into a wire response.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use emu_control_common::core::{Core, CpuTypeId, MemoryTypeId, StepKind};
use save_state_manager::SlotStore;

use crate::breakpoints::{Breakpoint, BreakpointTable, BreakpointTypeFlags};
use crate::json::{RpcRequest, Value};
use crate::snapshots::{self, NamedSnapshot, SnapshotStore};

/// `Arc`-wrapped so `dispatch` can clone a handler out of the table's lock
/// and invoke it after releasing that lock, instead of holding it for the
/// invocation's duration.
pub type Handler = Arc<dyn Fn(&mut dyn Core, &RpcRequest, &HandlerContext) -> Result<Value, String> + Send + Sync>;

/// Per-server state shared by every handler invocation: the slot store,
/// the breakpoint table, and the named-snapshot map, each behind its own
/// lightweight mutex (spec's shared-resource policy keeps these
/// independent so one doesn't block the others).
pub struct HandlerContext {
    pub slot_store: Mutex<SlotStore>,
    pub breakpoints: Mutex<BreakpointTable>,
    pub snapshots: Mutex<SnapshotStore>,
    pub recent_games_dir: PathBuf,
}

impl HandlerContext {
    #[must_use]
    pub fn new(slot_store: SlotStore, recent_games_dir: PathBuf) -> Self {
        Self {
            slot_store: Mutex::new(slot_store),
            breakpoints: Mutex::new(BreakpointTable::new()),
            snapshots: Mutex::new(SnapshotStore::new()),
            recent_games_dir,
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

fn parse_num(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).map_err(|_| format!("invalid hex number: {s}"))
    } else {
        s.parse::<u64>().map_err(|_| format!("invalid number: {s}"))
    }
}

fn required_param<'a>(req: &'a RpcRequest, key: &str) -> Result<&'a str, String> {
    req.param(key).ok_or_else(|| format!("missing required param: {key}"))
}

fn required_num(req: &RpcRequest, key: &str) -> Result<u64, String> {
    parse_num(required_param(req, key)?)
}

fn optional_num(req: &RpcRequest, key: &str) -> Result<Option<u64>, String> {
    req.param(key).map(parse_num).transpose()
}

fn memory_type(req: &RpcRequest) -> MemoryTypeId {
    MemoryTypeId::new(req.param("memtype").unwrap_or("Main"))
}

fn cpu_type(req: &RpcRequest) -> CpuTypeId {
    CpuTypeId::new(req.param("cputype").unwrap_or("Main"))
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        use std::fmt::Write as _;
        let _ = write!(s, "{b:02x}");
    }
    s
}

fn hex_decode(s: &str) -> Result<Vec<u8>, String> {
    let s = s.trim();
    if s.len() % 2 != 0 {
        return Err("hex string must have an even length".to_string());
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| format!("invalid hex byte at offset {i}")))
        .collect()
}

fn check_in_range(core: &dyn Core, mem: &MemoryTypeId, addr: u64, len: u64) -> Result<(), String> {
    let size = core.memory_len(mem).map_err(|e| e.to_string())?;
    if addr + len > size as u64 {
        return Err("address out of range".to_string());
    }
    Ok(())
}

fn state_path_for(req: &RpcRequest, ctx: &HandlerContext, slot_param: &str) -> Result<PathBuf, String> {
    if let Some(path) = req.param("path") {
        return Ok(PathBuf::from(path));
    }
    let slot_store = ctx.slot_store.lock().unwrap();
    let slot = match req.param(slot_param) {
        Some(raw) => parse_num(raw)? as u32,
        None => slot_store.current_slot(),
    };
    Ok(slot_store.state_path(slot))
}

macro_rules! handlers {
    ($($name:literal => $f:expr),+ $(,)?) => {{
        let mut map: HashMap<String, Handler> = HashMap::new();
        $(map.insert($name.to_string(), Arc::new($f));)+
        map
    }};
}

/// Builds the default command table matching the spec's handler catalog.
#[must_use]
pub fn default_handlers() -> HashMap<String, Handler> {
    handlers! {
        "PING" => |_core, _req, _ctx| Ok(Value::object([("pong", Value::Bool(true))])),

        "STATE" => handle_state,
        "HEALTH" => handle_state,

        "PAUSE" => |core, _req, _ctx| { core.pause(); Ok(Value::Null) },
        "RESUME" => |core, _req, _ctx| { core.resume(); Ok(Value::Null) },
        "RESET" => |core, _req, _ctx| { core.reset(); Ok(Value::Null) },

        "READ" => handle_read,
        "READ16" => handle_read16,
        "WRITE" => handle_write,
        "WRITE16" => handle_write16,
        "READBLOCK" => handle_read_block,
        "WRITEBLOCK" => handle_write_block,

        "SAVESTATE" => handle_save_state,
        "LOADSTATE" => handle_load_state,

        "LOADSCRIPT" => |core, req, _ctx| {
            let path = required_param(req, "path")?;
            core.load_script(path).map_err(|e| e.to_string())?;
            Ok(Value::Null)
        },

        "SCREENSHOT" => handle_screenshot,
        "CPU" => handle_cpu,
        "STATEINSPECT" => handle_state_inspect,
        "INPUT" => handle_input,
        "DISASM" => handle_disasm,
        "STEP" => handle_step,
        "FRAME" => handle_frame,
        "ROMINFO" => handle_rom_info,
        "REWIND" => handle_rewind,
        "CHEAT" => handle_cheat,
        "SPEED" => handle_speed,
        "SEARCH" => handle_search,
        "SNAPSHOT" => handle_snapshot,
        "DIFF" => handle_diff,
        "LABELS" => handle_labels,
        "BREAKPOINT" => handle_breakpoint,
    }
}

fn handle_state(core: &mut dyn Core, _req: &RpcRequest, _ctx: &HandlerContext) -> Result<Value, String> {
    Ok(Value::object([
        ("running", Value::Bool(core.is_running())),
        ("paused", Value::Bool(core.is_paused())),
        ("frameCount", Value::from(core.frame_count())),
        ("romName", Value::from(core.rom_info().name)),
    ]))
}

fn handle_read(core: &mut dyn Core, req: &RpcRequest, _ctx: &HandlerContext) -> Result<Value, String> {
    let addr = required_num(req, "addr")?;
    let mem = memory_type(req);
    check_in_range(core, &mem, addr, 1)?;
    let byte = core.peek(&mem, addr as u32).map_err(|e| e.to_string())?;
    Ok(Value::String(format!("{byte:02x}")))
}

fn handle_read16(core: &mut dyn Core, req: &RpcRequest, _ctx: &HandlerContext) -> Result<Value, String> {
    let addr = required_num(req, "addr")?;
    let mem = memory_type(req);
    check_in_range(core, &mem, addr, 2)?;
    let lo = core.peek(&mem, addr as u32).map_err(|e| e.to_string())?;
    let hi = core.peek(&mem, addr as u32 + 1).map_err(|e| e.to_string())?;
    let word = u16::from_le_bytes([lo, hi]);
    Ok(Value::String(format!("{word:04x}")))
}

fn handle_write(core: &mut dyn Core, req: &RpcRequest, _ctx: &HandlerContext) -> Result<Value, String> {
    let addr = required_num(req, "addr")?;
    let value = required_num(req, "value")?;
    let mem = memory_type(req);
    check_in_range(core, &mem, addr, 1)?;
    core.poke(&mem, addr as u32, value as u8).map_err(|e| e.to_string())?;
    Ok(Value::Null)
}

fn handle_write16(core: &mut dyn Core, req: &RpcRequest, _ctx: &HandlerContext) -> Result<Value, String> {
    let addr = required_num(req, "addr")?;
    let value = required_num(req, "value")? as u16;
    let mem = memory_type(req);
    check_in_range(core, &mem, addr, 2)?;
    let bytes = value.to_le_bytes();
    core.poke(&mem, addr as u32, bytes[0]).map_err(|e| e.to_string())?;
    core.poke(&mem, addr as u32 + 1, bytes[1]).map_err(|e| e.to_string())?;
    Ok(Value::Null)
}

fn handle_read_block(core: &mut dyn Core, req: &RpcRequest, _ctx: &HandlerContext) -> Result<Value, String> {
    let addr = required_num(req, "addr")?;
    let length = required_num(req, "length")?;
    let mem = memory_type(req);
    check_in_range(core, &mem, addr, length)?;
    let mut bytes = Vec::with_capacity(length as usize);
    for offset in 0..length {
        bytes.push(core.peek(&mem, (addr + offset) as u32).map_err(|e| e.to_string())?);
    }
    Ok(Value::String(hex_encode(&bytes)))
}

fn handle_write_block(core: &mut dyn Core, req: &RpcRequest, _ctx: &HandlerContext) -> Result<Value, String> {
    let addr = required_num(req, "addr")?;
    let data = hex_decode(required_param(req, "data")?)?;
    let mem = memory_type(req);
    check_in_range(core, &mem, addr, data.len() as u64)?;
    for (offset, byte) in data.into_iter().enumerate() {
        core.poke(&mem, (addr + offset as u64) as u32, byte).map_err(|e| e.to_string())?;
    }
    Ok(Value::Null)
}

fn handle_save_state(core: &mut dyn Core, req: &RpcRequest, ctx: &HandlerContext) -> Result<Value, String> {
    let path = state_path_for(req, ctx, "slot")?;
    let slot_store = ctx.slot_store.lock().unwrap();
    slot_store.save_path(core, &path).map_err(|e| e.to_string())?;
    Ok(Value::Null)
}

fn handle_load_state(core: &mut dyn Core, req: &RpcRequest, ctx: &HandlerContext) -> Result<Value, String> {
    let path = state_path_for(req, ctx, "slot")?;
    let slot_store = ctx.slot_store.lock().unwrap();
    slot_store.load_path(core, &path).map_err(|e| e.to_string())?;
    Ok(Value::Null)
}

fn handle_screenshot(core: &mut dyn Core, req: &RpcRequest, ctx: &HandlerContext) -> Result<Value, String> {
    let path = req
        .param("path")
        .map(PathBuf::from)
        .unwrap_or_else(|| ctx.recent_games_dir.join("screenshot.png"));
    let mut file = std::fs::File::create(&path).map_err(|e| e.to_string())?;
    core.take_screenshot(&mut file).map_err(|e| e.to_string())?;
    Ok(Value::from(path.display().to_string()))
}

fn handle_cpu(core: &mut dyn Core, req: &RpcRequest, _ctx: &HandlerContext) -> Result<Value, String> {
    let cpu = cpu_type(req);
    let state = core.cpu_state(&cpu).map_err(|e| e.to_string())?;
    let mut fields: Vec<(String, Value)> =
        state.registers.into_iter().map(|(name, value)| (name, Value::from(value))).collect();
    fields.extend(state.flags.into_iter().map(|(name, value)| (name, Value::Bool(value))));
    Ok(Value::Object(fields))
}

fn handle_state_inspect(core: &mut dyn Core, req: &RpcRequest, _ctx: &HandlerContext) -> Result<Value, String> {
    let target = required_param(req, "target")?;
    Ok(Value::object([
        ("target", Value::from(target)),
        ("running", Value::Bool(core.is_running())),
        ("frameCount", Value::from(core.frame_count())),
    ]))
}

fn handle_input(core: &mut dyn Core, req: &RpcRequest, _ctx: &HandlerContext) -> Result<Value, String> {
    let port = required_num(req, "port")? as u32;
    let buttons = required_param(req, "buttons")?;
    let frames = optional_num(req, "frames")?.unwrap_or(1) as u32;
    core.set_input(port, buttons, frames).map_err(|e| e.to_string())?;
    Ok(Value::Null)
}

fn handle_disasm(core: &mut dyn Core, req: &RpcRequest, _ctx: &HandlerContext) -> Result<Value, String> {
    let addr = required_num(req, "addr")? as u32;
    let count = required_num(req, "count")? as u32;
    let cpu = cpu_type(req);
    let lines = core.disassemble(&cpu, addr, count).map_err(|e| e.to_string())?;
    Ok(Value::Array(
        lines
            .into_iter()
            .map(|line| {
                Value::object([
                    ("address", Value::from(format!("{:06x}", line.address))),
                    ("bytes", Value::from(hex_encode(&line.bytes))),
                    ("text", Value::from(line.text)),
                ])
            })
            .collect(),
    ))
}

fn handle_step(core: &mut dyn Core, req: &RpcRequest, _ctx: &HandlerContext) -> Result<Value, String> {
    let count = optional_num(req, "count")?.unwrap_or(1) as u32;
    let cpu = cpu_type(req);
    let kind = match req.param("kind").unwrap_or("into") {
        "over" => StepKind::Over,
        "out" => StepKind::Out,
        _ => StepKind::Into,
    };
    core.step(&cpu, count, kind).map_err(|e| e.to_string())?;
    Ok(Value::Null)
}

fn handle_frame(core: &mut dyn Core, req: &RpcRequest, _ctx: &HandlerContext) -> Result<Value, String> {
    let count = optional_num(req, "count")?.unwrap_or(1) as u32;
    core.run_frames(count).map_err(|e| e.to_string())?;
    Ok(Value::Null)
}

fn handle_rom_info(core: &mut dyn Core, _req: &RpcRequest, _ctx: &HandlerContext) -> Result<Value, String> {
    let info = core.rom_info();
    Ok(Value::object([
        ("path", Value::from(info.path)),
        ("size", Value::from(info.size)),
        ("hash", Value::from(info.hash)),
        ("mapper", Value::from(info.mapper)),
    ]))
}

fn handle_rewind(core: &mut dyn Core, req: &RpcRequest, _ctx: &HandlerContext) -> Result<Value, String> {
    let action = required_param(req, "action")?;
    let frames = optional_num(req, "frames")?.map(|n| n as u32);
    core.rewind(action, frames).map_err(|e| e.to_string())?;
    Ok(Value::Null)
}

fn handle_cheat(core: &mut dyn Core, req: &RpcRequest, _ctx: &HandlerContext) -> Result<Value, String> {
    let action = required_param(req, "action")?;
    core.cheat(action, req.param("code"), req.param("id")).map_err(|e| e.to_string())?;
    Ok(Value::Null)
}

fn handle_speed(core: &mut dyn Core, req: &RpcRequest, _ctx: &HandlerContext) -> Result<Value, String> {
    if let Some(pct) = optional_num(req, "pct")? {
        core.set_speed_percent(pct as u32).map_err(|e| e.to_string())?;
    }
    Ok(Value::object([("pct", Value::from(core.speed_percent()))]))
}

fn handle_search(core: &mut dyn Core, req: &RpcRequest, _ctx: &HandlerContext) -> Result<Value, String> {
    let pattern = hex_decode(required_param(req, "pattern")?)?;
    let mem = memory_type(req);
    let len = core.memory_len(&mem).map_err(|e| e.to_string())?;
    let mut matches = Vec::new();
    if !pattern.is_empty() && pattern.len() <= len {
        for start in 0..=(len - pattern.len()) {
            let mut is_match = true;
            for (offset, &expected) in pattern.iter().enumerate() {
                let actual = core.peek(&mem, (start + offset) as u32).map_err(|e| e.to_string())?;
                if actual != expected {
                    is_match = false;
                    break;
                }
            }
            if is_match {
                matches.push(Value::from(format!("{start:06x}")));
            }
        }
    }
    Ok(Value::Array(matches))
}

fn handle_snapshot(core: &mut dyn Core, req: &RpcRequest, ctx: &HandlerContext) -> Result<Value, String> {
    let action = required_param(req, "action")?;
    let mut snapshots = ctx.snapshots.lock().unwrap();
    match action {
        "capture" => {
            let name = required_param(req, "name")?.to_string();
            let address = required_num(req, "addr")? as u32;
            let length = required_num(req, "length")? as u32;
            let mem = memory_type(req);
            check_in_range(core, &mem, u64::from(address), u64::from(length))?;
            let mut bytes = Vec::with_capacity(length as usize);
            for offset in 0..length {
                bytes.push(core.peek(&mem, address + offset).map_err(|e| e.to_string())?);
            }
            snapshots.capture(
                name,
                NamedSnapshot { memory_type: mem.0, address, length, timestamp_ms: now_ms(), bytes },
            );
            Ok(Value::Null)
        }
        "list" => Ok(Value::Array(snapshots.list_names().into_iter().map(Value::from).collect())),
        "drop" => {
            let name = required_param(req, "name")?;
            snapshots.drop_snapshot(name);
            Ok(Value::Null)
        }
        other => Err(format!("unknown snapshot action: {other}")),
    }
}

fn handle_diff(_core: &mut dyn Core, req: &RpcRequest, ctx: &HandlerContext) -> Result<Value, String> {
    let a_name = required_param(req, "a")?;
    let b_name = required_param(req, "b")?;
    let snapshots = ctx.snapshots.lock().unwrap();
    let a = snapshots.get(a_name).ok_or_else(|| format!("no such snapshot: {a_name}"))?;
    let b = snapshots.get(b_name).ok_or_else(|| format!("no such snapshot: {b_name}"))?;
    let diffs = snapshots::diff(a, b)?;
    Ok(Value::Array(
        diffs
            .into_iter()
            .map(|(offset, x, y)| {
                Value::object([
                    ("offset", Value::from(offset as u64)),
                    ("a", Value::from(format!("{x:02x}"))),
                    ("b", Value::from(format!("{y:02x}"))),
                ])
            })
            .collect(),
    ))
}

fn handle_labels(_core: &mut dyn Core, req: &RpcRequest, ctx: &HandlerContext) -> Result<Value, String> {
    let action = required_param(req, "action")?;
    let slot_store = ctx.slot_store.lock().unwrap();
    match action {
        "get" => {
            let addr = required_param(req, "addr")?;
            let path = Path::new(addr);
            let label = slot_store.get_label(path).map_err(|e| e.to_string())?;
            Ok(Value::from(label))
        }
        "set" => {
            let addr = required_param(req, "addr")?;
            let name = req.param("name").unwrap_or("");
            slot_store.set_label(Path::new(addr), name).map_err(|e| e.to_string())?;
            Ok(Value::Null)
        }
        other => Err(format!("unknown labels action: {other}")),
    }
}

fn handle_breakpoint(_core: &mut dyn Core, req: &RpcRequest, ctx: &HandlerContext) -> Result<Value, String> {
    let action = required_param(req, "action")?;
    let mut table = ctx.breakpoints.lock().unwrap();
    match action {
        "add" => {
            let bp = Breakpoint {
                id: 0,
                cpu_type: req.param("cputype").unwrap_or("Main").to_string(),
                memory_type: req.param("memtype").unwrap_or("Main").to_string(),
                type_flags: BreakpointTypeFlags::from_str_flags(req.param("typeFlags").unwrap_or("x")),
                start_addr: optional_num(req, "startAddr")?.unwrap_or(0) as u32,
                end_addr: optional_num(req, "endAddr")?.unwrap_or(0) as u32,
                enabled: true,
                mark_event: req.param("markEvent").is_some_and(|v| v == "true"),
                ignore_dummy: req.param("ignoreDummy").is_some_and(|v| v == "true"),
                condition: req.param("condition").unwrap_or("").to_string(),
            };
            Ok(Value::from(u64::from(table.add(bp))))
        }
        "remove" => {
            let id = required_num(req, "id")? as u32;
            Ok(Value::Bool(table.remove(id)))
        }
        "enable" | "disable" => {
            let id = required_num(req, "id")? as u32;
            Ok(Value::Bool(table.set_enabled(id, action == "enable")))
        }
        "list" => Ok(Value::Array(
            table
                .list()
                .iter()
                .map(|bp| {
                    Value::object([
                        ("id", Value::from(u64::from(bp.id))),
                        ("cpuType", Value::from(bp.cpu_type.clone())),
                        ("memoryType", Value::from(bp.memory_type.clone())),
                        ("startAddr", Value::from(u64::from(bp.start_addr))),
                        ("endAddr", Value::from(u64::from(bp.end_addr))),
                        ("enabled", Value::Bool(bp.enabled)),
                    ])
                })
                .collect(),
        )),
        other => Err(format!("unknown breakpoint action: {other}")),
    }
}
