//! Bundles a screenshot, a save state, and ROM metadata into a single
//! portable "recent game" archive, and reverses the process on load.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use emu_control_common::core::Core;
use log::info;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::error::ArchiveError;

const SCREENSHOT_ENTRY: &str = "Screenshot.png";
const STATE_ENTRY: &str = "Savestate.mss";
const ROM_INFO_ENTRY: &str = "RomInfo.txt";

#[must_use]
pub fn archive_path(recent_games_dir: &Path, base_name: &str) -> PathBuf {
    recent_games_dir.join(format!("{base_name}.rgd"))
}

pub struct RomInfoLines {
    pub rom_name: String,
    pub rom_path: String,
    pub patch_path: Option<String>,
}

/// Captures the current frame and machine state and writes a recent-game
/// archive. The caller skips this entirely when the Core is running
/// headless, since there is no on-disk "recent game" shelf to populate.
pub fn save(core: &mut dyn Core, out_path: &Path) -> Result<(), ArchiveError> {
    let mut screenshot = Vec::new();
    core.take_screenshot(&mut screenshot)?;

    let mut state_bytes = Vec::new();
    save_state_codec::encode(core, &mut state_bytes)?;

    let rom_info = core.rom_info();
    let rom_info_text = format!(
        "{}\n{}\n{}\n",
        rom_info.name,
        rom_info.path,
        rom_info.patch_path.as_deref().unwrap_or("")
    );

    let file = std::fs::File::create(out_path)?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default();

    writer.start_file(SCREENSHOT_ENTRY, options)?;
    writer.write_all(&screenshot)?;

    writer.start_file(STATE_ENTRY, options)?;
    writer.write_all(&state_bytes)?;

    writer.start_file(ROM_INFO_ENTRY, options)?;
    writer.write_all(rom_info_text.as_bytes())?;

    writer.finish()?;
    info!("wrote recent-game archive {}", out_path.display());
    Ok(())
}

fn read_entry(archive: &mut ZipArchive<std::fs::File>, name: &'static str) -> Result<Vec<u8>, ArchiveError> {
    let mut entry = archive.by_name(name).map_err(|_| ArchiveError::MissingEntry(name))?;
    let mut buf = Vec::new();
    entry.read_to_end(&mut buf)?;
    Ok(buf)
}

fn parse_rom_info(bytes: &[u8]) -> Result<RomInfoLines, ArchiveError> {
    let text = String::from_utf8(bytes.to_vec()).map_err(|_| ArchiveError::MalformedRomInfo)?;
    let mut lines = text.lines();
    let rom_name = lines.next().ok_or(ArchiveError::MalformedRomInfo)?.to_string();
    let rom_path = lines.next().ok_or(ArchiveError::MalformedRomInfo)?.to_string();
    let patch_path = lines.next().unwrap_or("").to_string();
    Ok(RomInfoLines {
        rom_name,
        rom_path,
        patch_path: if patch_path.is_empty() { None } else { Some(patch_path) },
    })
}

/// Opens a recent-game archive, loads its ROM (and patch, if any) into
/// the Core, and, when `resume` is set, feeds the bundled save state to
/// the decoder. Any failure stops the Core cleanly rather than leaving
/// it half-loaded.
pub fn load(core: &mut dyn Core, archive_path: &Path, resume: bool) -> Result<(), ArchiveError> {
    match load_inner(core, archive_path, resume) {
        Ok(()) => Ok(()),
        Err(err) => {
            core.stop();
            Err(err)
        }
    }
}

fn load_inner(core: &mut dyn Core, archive_path: &Path, resume: bool) -> Result<(), ArchiveError> {
    let file = std::fs::File::open(archive_path)?;
    let mut archive = ZipArchive::new(file)?;

    let rom_info_bytes = read_entry(&mut archive, ROM_INFO_ENTRY)?;
    let rom_info = parse_rom_info(&rom_info_bytes)?;

    core.load_rom(&rom_info.rom_path, rom_info.patch_path.as_deref())?;

    if resume {
        let state_bytes = read_entry(&mut archive, STATE_ENTRY)?;
        save_state_codec::decode(core, &mut state_bytes.as_slice())?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_path_uses_rgd_extension() {
        let path = archive_path(Path::new("/recent"), "Super Game");
        assert_eq!(path, Path::new("/recent/Super Game.rgd"));
    }

    #[test]
    fn parse_rom_info_reads_three_lines() {
        let text = b"Super Game\n/roms/Super Game.sfc\n/patches/hard.ips\n";
        let info = parse_rom_info(text).unwrap();
        assert_eq!(info.rom_name, "Super Game");
        assert_eq!(info.rom_path, "/roms/Super Game.sfc");
        assert_eq!(info.patch_path.as_deref(), Some("/patches/hard.ips"));
    }

    #[test]
    fn parse_rom_info_treats_blank_patch_line_as_absent() {
        let text = b"Super Game\n/roms/Super Game.sfc\n\n";
        let info = parse_rom_info(text).unwrap();
        assert_eq!(info.patch_path, None);
    }

    #[test]
    fn parse_rom_info_rejects_missing_lines() {
        let text = b"Super Game\n";
        assert!(parse_rom_info(text).is_err());
    }
}
