//! The capability surface this crate needs from a running emulator.
//!
//! The simulation itself is an opaque collaborator; everything in this
//! module describes the seam the control surface programs against, the
//! way `jgenesis_common::frontend` defines `Renderer`/`AudioOutput` as
//! seams the frontend programs against without knowing the concrete
//! console backend.

use std::io::{Read, Write};

use thiserror::Error;

use crate::error::{ErrorKind, HasErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsoleType {
    Nes,
    Snes,
    GameBoy,
    GameBoyAdvance,
    Genesis,
    SegaCd,
    Sms,
    GameGear,
    Pce,
    Sega32X,
}

impl ConsoleType {
    /// The `consoleType` discriminant written to the snapshot envelope.
    #[must_use]
    pub fn discriminant(self) -> u32 {
        match self {
            Self::Nes => 0,
            Self::Snes => 1,
            Self::GameBoy => 2,
            Self::GameBoyAdvance => 3,
            Self::Genesis => 4,
            Self::SegaCd => 5,
            Self::Sms => 6,
            Self::GameGear => 7,
            Self::Pce => 8,
            Self::Sega32X => 9,
        }
    }

    #[must_use]
    pub fn from_discriminant(value: u32) -> Option<Self> {
        Some(match value {
            0 => Self::Nes,
            1 => Self::Snes,
            2 => Self::GameBoy,
            3 => Self::GameBoyAdvance,
            4 => Self::Genesis,
            5 => Self::SegaCd,
            6 => Self::Sms,
            7 => Self::GameGear,
            8 => Self::Pce,
            9 => Self::Sega32X,
            _ => return None,
        })
    }
}

/// A memory space name as selected by an RPC `memtype` param, e.g.
/// `"SnesMemory"` or `"CpuMemory"`. The Core alone knows which names are
/// valid and how large each space is; this crate treats the string as
/// opaque and asks the Core to resolve it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemoryTypeId(pub String);

impl MemoryTypeId {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

/// A CPU name as selected by an RPC `cputype` param, e.g. `"Main"` or
/// `"Sa1"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CpuTypeId(pub String);

impl CpuTypeId {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Into,
    Over,
    Out,
}

#[derive(Debug, Clone)]
pub struct RomInfo {
    pub name: String,
    pub path: String,
    pub patch_path: Option<String>,
    pub size: u64,
    pub hash: String,
    pub mapper: String,
}

/// The current displayed frame, as needed by the preview block in the
/// snapshot envelope and by `SCREENSHOT`/`STATEINSPECT`.
#[derive(Debug, Clone)]
pub struct PpuFrame {
    pub buffer: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Scale factor as a percentage (100 == 1x).
    pub scale_percent: u32,
}

#[derive(Debug, Clone)]
pub struct CpuState {
    pub cpu_type: String,
    pub registers: Vec<(String, u64)>,
    pub flags: Vec<(String, bool)>,
}

#[derive(Debug, Clone)]
pub struct DisasmLine {
    pub address: u32,
    pub bytes: Vec<u8>,
    pub text: String,
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("emulator is not running")]
    NotRunning,
    #[error("netplay session is active")]
    NetplayConnected,
    #[error("unknown memory type: {0}")]
    UnknownMemoryType(String),
    #[error("unknown cpu type: {0}")]
    UnknownCpuType(String),
    #[error("address out of range")]
    AddressOutOfRange,
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Other(String),
}

impl HasErrorKind for CoreError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::NotRunning | Self::NetplayConnected => ErrorKind::CoreBusy,
            Self::UnknownMemoryType(_) | Self::UnknownCpuType(_) | Self::AddressOutOfRange => {
                ErrorKind::BadRequest
            }
            Self::Io(_) => ErrorKind::Io,
            Self::Other(_) => ErrorKind::HandlerFault,
        }
    }
}

/// The narrow capability set the control surface needs from the
/// emulator simulation. Object-safe: handlers and the bridge hold
/// `&dyn Core` / `&mut dyn Core` behind the exclusive lock rather than
/// knowing the concrete console backend.
pub trait Core: Send {
    fn is_running(&self) -> bool;
    fn is_paused(&self) -> bool;
    fn pause(&mut self);
    fn resume(&mut self);
    fn reset(&mut self);
    fn is_netplay_connected(&self) -> bool;
    fn is_avi_recording(&self) -> bool;
    fn frame_count(&self) -> u64;

    /// The host build version, compared against a snapshot's `emuVersion`.
    fn version(&self) -> u32;
    fn console_type(&self) -> ConsoleType;
    fn rom_info(&self) -> RomInfo;

    fn ppu_frame(&self) -> PpuFrame;
    fn update_frame(&mut self, frame: &PpuFrame);
    fn send_frame_to_filter(&mut self, frame: &PpuFrame);

    fn serialize(&mut self, out: &mut dyn Write) -> Result<(), CoreError>;
    fn deserialize(
        &mut self,
        input: &mut dyn Read,
        format_version: u32,
        console_type: u32,
    ) -> Result<(), CoreError>;
    fn stop_movie(&mut self);

    fn load_rom(&mut self, path: &str, patch: Option<&str>) -> Result<(), CoreError>;
    fn stop(&mut self);

    fn memory_len(&self, mem: &MemoryTypeId) -> Result<usize, CoreError>;
    fn peek(&self, mem: &MemoryTypeId, address: u32) -> Result<u8, CoreError>;
    fn poke(&mut self, mem: &MemoryTypeId, address: u32, value: u8) -> Result<(), CoreError>;

    fn disassemble(
        &self,
        cpu: &CpuTypeId,
        address: u32,
        count: u32,
    ) -> Result<Vec<DisasmLine>, CoreError>;
    fn cpu_state(&self, cpu: &CpuTypeId) -> Result<CpuState, CoreError>;

    fn step(&mut self, cpu: &CpuTypeId, count: u32, kind: StepKind) -> Result<(), CoreError>;
    fn run_frames(&mut self, count: u32) -> Result<(), CoreError>;

    fn take_screenshot(&self, out: &mut dyn Write) -> Result<(), CoreError>;
    fn load_script(&mut self, path: &str) -> Result<(), CoreError>;
    fn set_input(&mut self, port: u32, buttons: &str, frames: u32) -> Result<(), CoreError>;
    fn rewind(&mut self, action: &str, frames: Option<u32>) -> Result<(), CoreError>;
    fn cheat(&mut self, action: &str, code: Option<&str>, id: Option<&str>) -> Result<(), CoreError>;
    fn speed_percent(&self) -> u32;
    fn set_speed_percent(&mut self, pct: u32) -> Result<(), CoreError>;
}
