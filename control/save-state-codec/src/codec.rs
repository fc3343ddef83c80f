//! The versioned snapshot envelope: magic, version fields, console tag,
//! an in-band DEFLATE-compressed preview frame, the ROM name, and an
//! opaque machine blob handed verbatim to the Core.

use std::io::{Read, Write};

use emu_control_common::byteio::{deflate, inflate, read_string, read_u32, write_string, write_u32};
use emu_control_common::core::{ConsoleType, Core, PpuFrame};
use log::{info, warn};

use crate::error::CodecError;

pub const MAGIC: [u8; 3] = *b"MSS";
pub const CURRENT_FORMAT_VERSION: u32 = 4;
pub const MIN_FORMAT_VERSION: u32 = 3;
const LEGACY_TRAILER_LEN: usize = 40;
const MAX_COMPRESSED_PREVIEW_BYTES: u32 = 2 * 1024 * 1024;

/// The in-band preview frame: a DEFLATE-compressed framebuffer that lets
/// thumbnail enumeration happen without deserializing the machine blob.
#[derive(Debug, Clone)]
pub struct PreviewBlock {
    pub width: u32,
    pub height: u32,
    pub scale_percent: u32,
    pub buffer: Vec<u8>,
}

impl From<&PpuFrame> for PreviewBlock {
    fn from(frame: &PpuFrame) -> Self {
        Self {
            width: frame.width,
            height: frame.height,
            scale_percent: frame.scale_percent,
            buffer: frame.buffer.clone(),
        }
    }
}

fn write_preview(out: &mut impl Write, preview: &PreviewBlock) -> Result<(), CodecError> {
    let compressed = deflate(&preview.buffer)?;
    write_u32(out, preview.buffer.len() as u32)?;
    write_u32(out, preview.width)?;
    write_u32(out, preview.height)?;
    write_u32(out, preview.scale_percent)?;
    write_u32(out, compressed.len() as u32)?;
    out.write_all(&compressed)?;
    Ok(())
}

fn read_preview(input: &mut impl Read) -> Result<PreviewBlock, CodecError> {
    let buffer_size = read_u32(input)?;
    let width = read_u32(input)?;
    let height = read_u32(input)?;
    let scale_percent = read_u32(input)?;
    let compressed_size = read_u32(input)?;
    if compressed_size > MAX_COMPRESSED_PREVIEW_BYTES {
        return Err(CodecError::InvalidFile);
    }

    let mut compressed = vec![0u8; compressed_size as usize];
    input.read_exact(&mut compressed)?;
    let buffer =
        inflate(&compressed, buffer_size as usize).map_err(|_| CodecError::InvalidFile)?;

    Ok(PreviewBlock { width, height, scale_percent, buffer })
}

/// Writes a complete snapshot: magic, versions, console tag, preview
/// frame, ROM name, and the Core's opaque machine blob.
pub fn encode(core: &mut dyn Core, out: &mut impl Write) -> Result<(), CodecError> {
    out.write_all(&MAGIC)?;
    write_u32(out, core.version())?;
    write_u32(out, CURRENT_FORMAT_VERSION)?;
    write_u32(out, core.console_type().discriminant())?;

    let frame = core.ppu_frame();
    write_preview(out, &PreviewBlock::from(&frame))?;

    write_string(out, &core.rom_info().name)?;

    core.serialize(out)?;
    Ok(())
}

/// Decodes a snapshot and hands the machine blob to `core`.
///
/// Precondition: `core.is_running() && !core.is_netplay_connected()`,
/// otherwise fails with [`CodecError::CoreBusy`] without reading a byte.
/// Decode is atomic: the Core's in-memory machine is replaced only if
/// every check up to and including `core.deserialize` succeeds.
pub fn decode(core: &mut dyn Core, input: &mut impl Read) -> Result<(), CodecError> {
    if !core.is_running() || core.is_netplay_connected() {
        return Err(CodecError::CoreBusy);
    }

    let mut magic = [0u8; 3];
    input.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(CodecError::InvalidFile);
    }

    let emu_version = read_u32(input)?;
    if emu_version > core.version() {
        return Err(CodecError::NewerVersion);
    }

    let format_version = read_u32(input)?;
    if format_version < MIN_FORMAT_VERSION {
        return Err(CodecError::IncompatibleVersion);
    }
    if format_version <= 3 {
        let mut trailer = [0u8; LEGACY_TRAILER_LEN];
        input.read_exact(&mut trailer)?;
    }

    let console_type = read_u32(input)?;
    let expected = core.console_type().discriminant();
    if console_type != expected {
        return Err(CodecError::ConsoleMismatch { expected, found: console_type });
    }

    let preview = read_preview(input)?;
    let _rom_name = read_string(input)?;

    core.deserialize(input, format_version, console_type)?;

    core.stop_movie();

    if core.is_paused() && !core.is_avi_recording() {
        let frame = PpuFrame {
            buffer: preview.buffer,
            width: preview.width,
            height: preview.height,
            scale_percent: preview.scale_percent,
        };
        core.update_frame(&frame);
    } else {
        warn!("discarding decoded preview to avoid desyncing the AVI recorder's audio track");
    }

    info!("loaded save state (format v{format_version}, console {console_type})");
    Ok(())
}

/// Reads only enough of the stream to recover the preview frame,
/// without touching the machine blob. Used for slot thumbnail
/// enumeration (`getPreview`).
pub fn decode_preview_only(input: &mut impl Read) -> Result<PreviewBlock, CodecError> {
    let mut magic = [0u8; 3];
    input.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(CodecError::InvalidFile);
    }

    let _emu_version = read_u32(input)?;
    let format_version = read_u32(input)?;
    if format_version < MIN_FORMAT_VERSION {
        return Err(CodecError::IncompatibleVersion);
    }
    if format_version <= 3 {
        let mut trailer = [0u8; LEGACY_TRAILER_LEN];
        input.read_exact(&mut trailer)?;
    }

    let _console_type = read_u32(input)?;
    read_preview(input)
}

/// Returns `ConsoleType::from_discriminant` of `format_version`'s console
/// tag, useful for the "refuse to hand the blob to a mismatched Core"
/// check outside of a full decode.
pub fn peek_console_type(input: &mut impl Read) -> Result<Option<ConsoleType>, CodecError> {
    let mut magic = [0u8; 3];
    input.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(CodecError::InvalidFile);
    }
    let _emu_version = read_u32(input)?;
    let format_version = read_u32(input)?;
    if format_version <= 3 {
        let mut trailer = [0u8; LEGACY_TRAILER_LEN];
        input.read_exact(&mut trailer)?;
    }
    let console_type = read_u32(input)?;
    Ok(ConsoleType::from_discriminant(console_type))
}

#[cfg(test)]
mod tests {
    use super::*;
    use emu_control_common::core::{CoreError, CpuState, CpuTypeId, DisasmLine, MemoryTypeId, RomInfo, StepKind};

    struct FakeCore {
        running: bool,
        paused: bool,
        netplay: bool,
        avi_recording: bool,
        version: u32,
        console_type: ConsoleType,
        frame_count: u64,
        blob: Vec<u8>,
        last_deserialized: Option<(Vec<u8>, u32, u32)>,
        movie_stopped: bool,
    }

    impl FakeCore {
        fn new() -> Self {
            Self {
                running: true,
                paused: true,
                netplay: false,
                avi_recording: false,
                version: 10,
                console_type: ConsoleType::Snes,
                frame_count: 0,
                blob: vec![1, 2, 3, 4],
                last_deserialized: None,
                movie_stopped: false,
            }
        }
    }

    impl Core for FakeCore {
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
            self.version
        }
        fn console_type(&self) -> ConsoleType {
            self.console_type
        }
        fn rom_info(&self) -> RomInfo {
            RomInfo {
                name: "Test Game.sfc".to_string(),
                path: "/roms/Test Game.sfc".to_string(),
                patch_path: None,
                size: 1024,
                hash: "deadbeef".to_string(),
                mapper: "LoROM".to_string(),
            }
        }
        fn ppu_frame(&self) -> PpuFrame {
            PpuFrame { buffer: vec![0u8; 256 * 224], width: 256, height: 224, scale_percent: 100 }
        }
        fn update_frame(&mut self, _frame: &PpuFrame) {}
        fn send_frame_to_filter(&mut self, _frame: &PpuFrame) {}
        fn serialize(&mut self, out: &mut dyn Write) -> Result<(), CoreError> {
            out.write_all(&self.blob)?;
            Ok(())
        }
        fn deserialize(
            &mut self,
            input: &mut dyn Read,
            format_version: u32,
            console_type: u32,
        ) -> Result<(), CoreError> {
            let mut buf = Vec::new();
            input.read_to_end(&mut buf)?;
            self.last_deserialized = Some((buf, format_version, console_type));
            Ok(())
        }
        fn stop_movie(&mut self) {
            self.movie_stopped = true;
        }
        fn load_rom(&mut self, _path: &str, _patch: Option<&str>) -> Result<(), CoreError> {
            Ok(())
        }
        fn stop(&mut self) {
            self.running = false;
        }
        fn memory_len(&self, _mem: &MemoryTypeId) -> Result<usize, CoreError> {
            Ok(self.blob.len())
        }
        fn peek(&self, _mem: &MemoryTypeId, address: u32) -> Result<u8, CoreError> {
            self.blob.get(address as usize).copied().ok_or(CoreError::AddressOutOfRange)
        }
        fn poke(&mut self, _mem: &MemoryTypeId, address: u32, value: u8) -> Result<(), CoreError> {
            *self.blob.get_mut(address as usize).ok_or(CoreError::AddressOutOfRange)? = value;
            Ok(())
        }
        fn disassemble(
            &self,
            _cpu: &CpuTypeId,
            _address: u32,
            _count: u32,
        ) -> Result<Vec<DisasmLine>, CoreError> {
            Ok(Vec::new())
        }
        fn cpu_state(&self, cpu: &CpuTypeId) -> Result<CpuState, CoreError> {
            Ok(CpuState { cpu_type: cpu.0.clone(), registers: Vec::new(), flags: Vec::new() })
        }
        fn step(&mut self, _cpu: &CpuTypeId, _count: u32, _kind: StepKind) -> Result<(), CoreError> {
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
        fn cheat(
            &mut self,
            _action: &str,
            _code: Option<&str>,
            _id: Option<&str>,
        ) -> Result<(), CoreError> {
            Ok(())
        }
        fn speed_percent(&self) -> u32 {
            100
        }
        fn set_speed_percent(&mut self, _pct: u32) -> Result<(), CoreError> {
            Ok(())
        }
    }

    #[test]
    fn round_trip() {
        let mut core = FakeCore::new();
        let mut buf = Vec::new();
        encode(&mut core, &mut buf).unwrap();

        assert_eq!(&buf[0..3], &MAGIC);

        let mut core2 = FakeCore::new();
        decode(&mut core2, &mut buf.as_slice()).unwrap();
        assert_eq!(core2.last_deserialized.unwrap().0, core.blob);
        assert!(core2.movie_stopped);
    }

    #[test]
    fn refuses_newer_emu_version() {
        let mut core = FakeCore::new();
        let mut buf = Vec::new();
        encode(&mut core, &mut buf).unwrap();
        buf[3..7].copy_from_slice(&(core.version + 1).to_le_bytes());

        let mut core2 = FakeCore::new();
        let err = decode(&mut core2, &mut buf.as_slice()).unwrap_err();
        assert!(matches!(err, CodecError::NewerVersion));
        assert!(core2.last_deserialized.is_none());
    }

    #[test]
    fn refuses_too_old_format_version() {
        let mut core = FakeCore::new();
        let mut buf = Vec::new();
        encode(&mut core, &mut buf).unwrap();
        buf[7..11].copy_from_slice(&2u32.to_le_bytes());

        let mut core2 = FakeCore::new();
        let err = decode(&mut core2, &mut buf.as_slice()).unwrap_err();
        assert!(matches!(err, CodecError::IncompatibleVersion));
        assert!(core2.last_deserialized.is_none());
    }

    #[test]
    fn refuses_when_core_busy() {
        let mut core = FakeCore::new();
        let mut buf = Vec::new();
        encode(&mut core, &mut buf).unwrap();

        let mut core2 = FakeCore::new();
        core2.running = false;
        let err = decode(&mut core2, &mut buf.as_slice()).unwrap_err();
        assert!(matches!(err, CodecError::CoreBusy));
    }

    #[test]
    fn rejects_bad_magic() {
        let mut core = FakeCore::new();
        let mut buf = Vec::new();
        encode(&mut core, &mut buf).unwrap();
        buf[0] = b'X';

        let mut core2 = FakeCore::new();
        let err = decode(&mut core2, &mut buf.as_slice()).unwrap_err();
        assert!(matches!(err, CodecError::InvalidFile));
    }

    #[test]
    fn rejects_oversized_compressed_preview_claim() {
        let mut core = FakeCore::new();
        let mut buf = Vec::new();
        encode(&mut core, &mut buf).unwrap();

        // compressedSize field sits right after bufferSize/width/height/scalePercent,
        // i.e. 3 (magic) + 4*3 (emuVersion/formatVersion/consoleType) + 4*4 (preview
        // header up to compressedSize).
        let compressed_size_offset = 3 + 4 * 3 + 4 * 4;
        buf[compressed_size_offset..compressed_size_offset + 4]
            .copy_from_slice(&(3 * 1024 * 1024u32).to_le_bytes());

        let mut core2 = FakeCore::new();
        let err = decode(&mut core2, &mut buf.as_slice()).unwrap_err();
        assert!(matches!(err, CodecError::InvalidFile));
    }

    #[test]
    fn preview_only_decode_does_not_touch_machine_blob() {
        let mut core = FakeCore::new();
        let mut buf = Vec::new();
        encode(&mut core, &mut buf).unwrap();

        let preview = decode_preview_only(&mut buf.as_slice()).unwrap();
        assert_eq!(preview.width, 256);
        assert_eq!(preview.height, 224);
    }
}
