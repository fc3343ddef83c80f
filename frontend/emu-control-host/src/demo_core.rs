//! A minimal in-memory `Core` so the control surface can be wired up and
//! exercised without a real emulator backend.

use std::io::{Read, Write};

use emu_control_common::byteio::{read_string, read_u32, write_string, write_u32};
use emu_control_common::core::{
    ConsoleType, Core, CoreError, CpuState, CpuTypeId, DisasmLine, MemoryTypeId, PpuFrame,
    RomInfo, StepKind,
};

const MEMORY_SIZE: usize = 128 * 1024;

pub struct DemoCore {
    running: bool,
    paused: bool,
    netplay: bool,
    avi_recording: bool,
    frame_count: u64,
    speed_percent: u32,
    rom_info: RomInfo,
    memory: Vec<u8>,
    frame: PpuFrame,
}

impl DemoCore {
    #[must_use]
    pub fn new(rom_path: &str) -> Self {
        let name =
            std::path::Path::new(rom_path).file_name().map_or_else(|| rom_path.to_string(), |n| n.to_string_lossy().into_owned());

        Self {
            running: true,
            paused: true,
            netplay: false,
            avi_recording: false,
            frame_count: 0,
            speed_percent: 100,
            rom_info: RomInfo {
                name,
                path: rom_path.to_string(),
                patch_path: None,
                size: 0,
                hash: String::new(),
                mapper: "demo".to_string(),
            },
            memory: vec![0u8; MEMORY_SIZE],
            frame: PpuFrame { buffer: vec![0u8; 256 * 224 * 4], width: 256, height: 224, scale_percent: 100 },
        }
    }
}

impl Core for DemoCore {
    fn is_running(&self) -> bool {
        self.running
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn pause(&mut self) {
        self.paused = true;
    }

    fn resume(&mut self) {
        self.paused = false;
    }

    fn reset(&mut self) {
        self.frame_count = 0;
        self.memory.fill(0);
    }

    fn is_netplay_connected(&self) -> bool {
        self.netplay
    }

    fn is_avi_recording(&self) -> bool {
        self.avi_recording
    }

    fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn version(&self) -> u32 {
        1
    }

    fn console_type(&self) -> ConsoleType {
        ConsoleType::Snes
    }

    fn rom_info(&self) -> RomInfo {
        self.rom_info.clone()
    }

    fn ppu_frame(&self) -> PpuFrame {
        self.frame.clone()
    }

    fn update_frame(&mut self, frame: &PpuFrame) {
        self.frame = frame.clone();
    }

    fn send_frame_to_filter(&mut self, _frame: &PpuFrame) {}

    fn serialize(&mut self, out: &mut dyn Write) -> Result<(), CoreError> {
        write_u32(out, self.frame_count as u32)?;
        write_string(out, &self.rom_info.name)?;
        write_u32(out, self.memory.len() as u32)?;
        out.write_all(&self.memory)?;
        Ok(())
    }

    fn deserialize(&mut self, input: &mut dyn Read, _format_version: u32, _console_type: u32) -> Result<(), CoreError> {
        self.frame_count = u64::from(read_u32(input)?);
        self.rom_info.name = read_string(input)?;
        let memory_len = read_u32(input)? as usize;
        let mut memory = vec![0u8; memory_len];
        input.read_exact(&mut memory)?;
        self.memory = memory;
        Ok(())
    }

    fn stop_movie(&mut self) {}

    fn load_rom(&mut self, path: &str, patch: Option<&str>) -> Result<(), CoreError> {
        self.rom_info.path = path.to_string();
        self.rom_info.patch_path = patch.map(ToString::to_string);
        self.reset();
        Ok(())
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn memory_len(&self, mem: &MemoryTypeId) -> Result<usize, CoreError> {
        if mem.0 != "CpuMemory" {
            return Err(CoreError::UnknownMemoryType(mem.0.clone()));
        }
        Ok(self.memory.len())
    }

    fn peek(&self, mem: &MemoryTypeId, address: u32) -> Result<u8, CoreError> {
        if mem.0 != "CpuMemory" {
            return Err(CoreError::UnknownMemoryType(mem.0.clone()));
        }
        self.memory.get(address as usize).copied().ok_or(CoreError::AddressOutOfRange)
    }

    fn poke(&mut self, mem: &MemoryTypeId, address: u32, value: u8) -> Result<(), CoreError> {
        if mem.0 != "CpuMemory" {
            return Err(CoreError::UnknownMemoryType(mem.0.clone()));
        }
        *self.memory.get_mut(address as usize).ok_or(CoreError::AddressOutOfRange)? = value;
        Ok(())
    }

    fn disassemble(&self, cpu: &CpuTypeId, _address: u32, _count: u32) -> Result<Vec<DisasmLine>, CoreError> {
        if cpu.0 != "Main" {
            return Err(CoreError::UnknownCpuType(cpu.0.clone()));
        }
        Ok(Vec::new())
    }

    fn cpu_state(&self, cpu: &CpuTypeId) -> Result<CpuState, CoreError> {
        if cpu.0 != "Main" {
            return Err(CoreError::UnknownCpuType(cpu.0.clone()));
        }
        Ok(CpuState {
            cpu_type: cpu.0.clone(),
            registers: vec![("PC".to_string(), 0), ("SP".to_string(), 0)],
            flags: vec![("Z".to_string(), false), ("C".to_string(), false)],
        })
    }

    fn step(&mut self, cpu: &CpuTypeId, _count: u32, _kind: StepKind) -> Result<(), CoreError> {
        if cpu.0 != "Main" {
            return Err(CoreError::UnknownCpuType(cpu.0.clone()));
        }
        Ok(())
    }

    fn run_frames(&mut self, count: u32) -> Result<(), CoreError> {
        self.frame_count += u64::from(count);
        Ok(())
    }

    fn take_screenshot(&self, _out: &mut dyn Write) -> Result<(), CoreError> {
        Ok(())
    }

    fn load_script(&mut self, _path: &str) -> Result<(), CoreError> {
        Ok(())
    }

    fn set_input(&mut self, _port: u32, _buttons: &str, _frames: u32) -> Result<(), CoreError> {
        Ok(())
    }

    fn rewind(&mut self, _action: &str, _frames: Option<u32>) -> Result<(), CoreError> {
        Ok(())
    }

    fn cheat(&mut self, _action: &str, _code: Option<&str>, _id: Option<&str>) -> Result<(), CoreError> {
        Ok(())
    }

    fn speed_percent(&self) -> u32 {
        self.speed_percent
    }

    fn set_speed_percent(&mut self, pct: u32) -> Result<(), CoreError> {
        self.speed_percent = pct;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_save_state_codec() {
        let mut core = DemoCore::new("test.sfc");
        core.poke(&MemoryTypeId::new("CpuMemory"), 10, 0xAB).unwrap();

        let mut buf = Vec::new();
        save_state_codec::encode(&mut core, &mut buf).unwrap();

        let mut core2 = DemoCore::new("test.sfc");
        save_state_codec::decode(&mut core2, &mut buf.as_slice()).unwrap();

        assert_eq!(core2.peek(&MemoryTypeId::new("CpuMemory"), 10).unwrap(), 0xAB);
    }

    #[test]
    fn rejects_unknown_memory_type() {
        let core = DemoCore::new("test.sfc");
        let err = core.peek(&MemoryTypeId::new("NoSuchMemory"), 0).unwrap_err();
        assert!(matches!(err, CoreError::UnknownMemoryType(_)));
    }
}
