//! Slot identity, save/load, labels, and thumbnail previews for a single
//! ROM's save states.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;

use emu_control_common::core::Core;
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder};
use log::debug;
use save_state_codec::PreviewBlock;

use crate::error::SlotError;

pub const MIN_SLOTS: u32 = 1;
pub const MAX_SLOTS: u32 = 99;
pub const DEFAULT_SLOTS: u32 = 20;

const PRIMARY_ENV_VAR: &str = "MESEN2_SAVE_STATE_SLOTS";
const FALLBACK_ENV_VAR: &str = "OOS_SAVE_STATE_SLOTS";

static CONFIGURED_MAX_INDEX: AtomicU32 = AtomicU32::new(0);
static ENV_MAX_INDEX: OnceLock<u32> = OnceLock::new();

/// Overrides the resolved max slot index for the process. A value of 0
/// clears the override, falling back to the environment-derived value.
pub fn set_configured_max_index(value: u32) {
    let clamped = if value == 0 { 0 } else { value.min(MAX_SLOTS) };
    CONFIGURED_MAX_INDEX.store(clamped, Ordering::Relaxed);
}

/// The highest valid slot index: the last value passed to
/// [`set_configured_max_index`] if `>= 1`, else the environment-derived
/// value (cached for the process lifetime), else [`DEFAULT_SLOTS`].
pub fn max_index() -> u32 {
    let configured = CONFIGURED_MAX_INDEX.load(Ordering::Relaxed);
    if configured >= MIN_SLOTS {
        return configured;
    }
    *ENV_MAX_INDEX.get_or_init(resolve_env_max_index)
}

fn resolve_env_max_index() -> u32 {
    for var in [PRIMARY_ENV_VAR, FALLBACK_ENV_VAR] {
        if let Ok(raw) = std::env::var(var) {
            if let Ok(parsed) = raw.trim().parse::<u32>() {
                return parsed.clamp(MIN_SLOTS, MAX_SLOTS);
            }
        }
    }
    DEFAULT_SLOTS
}

/// The reserved position just past the highest ordinary slot.
pub fn auto_save_index() -> u32 {
    max_index() + 1
}

fn wrapped_next(current: u32, max: u32) -> u32 {
    (current % max) + 1
}

fn wrapped_prev(current: u32, max: u32) -> u32 {
    if current <= 1 {
        max
    } else {
        current - 1
    }
}

fn state_filename_base(rom_stem: &str, patch_stem: Option<&str>, separate_by_patch: bool) -> String {
    match patch_stem {
        Some(patch) if separate_by_patch && !patch.eq_ignore_ascii_case(rom_stem) => {
            format!("{rom_stem}_{patch}")
        }
        _ => rom_stem.to_string(),
    }
}

pub struct SlotStore {
    save_states_dir: PathBuf,
    base_name: String,
    current_slot: u32,
}

impl SlotStore {
    #[must_use]
    pub fn new(
        save_states_dir: impl Into<PathBuf>,
        rom_stem: &str,
        patch_stem: Option<&str>,
        separate_by_patch: bool,
    ) -> Self {
        Self {
            save_states_dir: save_states_dir.into(),
            base_name: state_filename_base(rom_stem, patch_stem, separate_by_patch),
            current_slot: 1,
        }
    }

    #[must_use]
    pub fn state_path(&self, slot: u32) -> PathBuf {
        self.save_states_dir.join(format!("{}_{slot}.mss", self.base_name))
    }

    #[must_use]
    pub fn label_path_for(state_path: &Path) -> PathBuf {
        let mut os_string = state_path.as_os_str().to_owned();
        os_string.push(".label");
        PathBuf::from(os_string)
    }

    #[must_use]
    pub fn current_slot(&self) -> u32 {
        self.current_slot
    }

    pub fn select_slot(&mut self, slot: u32) {
        self.current_slot = slot.clamp(1, max_index());
    }

    pub fn next_slot(&mut self) {
        self.current_slot = wrapped_next(self.current_slot, max_index());
    }

    pub fn prev_slot(&mut self) {
        self.current_slot = wrapped_prev(self.current_slot, max_index());
    }

    #[must_use]
    pub fn auto_save_slot(&self) -> u32 {
        auto_save_index()
    }

    pub fn save_slot(&self, core: &mut dyn Core, slot: u32) -> Result<(), SlotError> {
        self.save_path(core, &self.state_path(slot))
    }

    pub fn save_path(&self, core: &mut dyn Core, path: &Path) -> Result<(), SlotError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        save_state_codec::encode(core, &mut writer)?;
        writer.flush()?;
        debug!("saved state to {}", path.display());
        Ok(())
    }

    pub fn load_slot(&self, core: &mut dyn Core, slot: u32) -> Result<(), SlotError> {
        self.load_path(core, &self.state_path(slot))
    }

    pub fn load_path(&self, core: &mut dyn Core, path: &Path) -> Result<(), SlotError> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        save_state_codec::decode(core, &mut reader)?;
        debug!("loaded state from {}", path.display());
        Ok(())
    }

    pub fn get_label(&self, state_path: &Path) -> std::io::Result<String> {
        let label_path = Self::label_path_for(state_path);
        match fs::read_to_string(&label_path) {
            Ok(text) => Ok(text.trim().to_string()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(err) => Err(err),
        }
    }

    pub fn set_label(&self, state_path: &Path, text: &str) -> std::io::Result<()> {
        let label_path = Self::label_path_for(state_path);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            match fs::remove_file(&label_path) {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(err) => Err(err),
            }
        } else {
            fs::write(&label_path, trimmed)
        }
    }

    /// Reads only the preview block of a save state and renders it as
    /// PNG bytes, without touching the machine blob.
    pub fn get_preview_png(&self, state_path: &Path) -> Result<Vec<u8>, SlotError> {
        let file = File::open(state_path)?;
        let mut reader = BufReader::new(file);
        let preview = save_state_codec::decode_preview_only(&mut reader)?;
        encode_preview_png(&preview)
    }
}

fn encode_preview_png(preview: &PreviewBlock) -> Result<Vec<u8>, SlotError> {
    let expected_len = preview.width as usize * preview.height as usize * 4;
    if preview.buffer.len() != expected_len {
        return Err(SlotError::InvalidPreview);
    }

    let mut png_bytes = Vec::new();
    PngEncoder::new(&mut png_bytes)
        .write_image(&preview.buffer, preview.width, preview.height, ColorType::Rgba8)
        .map_err(|_| SlotError::InvalidPreview)?;
    Ok(png_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_filename_base_without_patch() {
        assert_eq!(state_filename_base("Super Game", None, true), "Super Game");
    }

    #[test]
    fn state_filename_base_with_distinct_patch() {
        assert_eq!(
            state_filename_base("Super Game", Some("hardmode"), true),
            "Super Game_hardmode"
        );
    }

    #[test]
    fn state_filename_base_skips_redundant_patch_suffix() {
        assert_eq!(
            state_filename_base("Super Game", Some("SUPER GAME"), true),
            "Super Game"
        );
    }

    #[test]
    fn state_filename_base_ignores_patch_when_not_separating() {
        assert_eq!(state_filename_base("Super Game", Some("hardmode"), false), "Super Game");
    }

    #[test]
    fn select_slot_clamps_out_of_range() {
        let mut store = SlotStore::new("/tmp", "rom", None, false);
        store.select_slot(10_000);
        assert!(store.current_slot() <= max_index());
        store.select_slot(0);
        assert_eq!(store.current_slot(), 1);
    }

    #[test]
    fn slot_wrap_matches_modular_arithmetic() {
        let max = 5;
        let mut slot = 1;
        for n in 1..=12u32 {
            slot = wrapped_next(slot, max);
            let expected = ((1 - 1 + n) % max) + 1;
            assert_eq!(slot, expected, "after {n} next_slot calls");
        }
    }

    #[test]
    fn slot_wrap_prev_is_inverse_of_next() {
        let max = 7;
        for start in 1..=max {
            let advanced = wrapped_next(start, max);
            assert_eq!(wrapped_prev(advanced, max), start);
        }
    }

    #[test]
    fn label_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let state_path = dir.path().join("rom_1.mss");
        let store = SlotStore::new(dir.path(), "rom", None, false);

        assert_eq!(store.get_label(&state_path).unwrap(), "");

        store.set_label(&state_path, "  boss fight  ").unwrap();
        assert_eq!(store.get_label(&state_path).unwrap(), "boss fight");

        store.set_label(&state_path, "").unwrap();
        assert_eq!(store.get_label(&state_path).unwrap(), "");
        assert!(!SlotStore::label_path_for(&state_path).exists());
    }
}
