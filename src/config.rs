//! Configuration (§6 options table, §4.A pool sizing).
//!
//! JSON-persisted settings struct, the same pattern the teacher's
//! `config.rs` uses (load/save with graceful fallback to defaults on a
//! missing or unparsable file) but retargeted from desktop window/save-slot
//! settings onto the board's own options table plus the vram pool/swap
//! knobs §4.A calls out as `Config` fields.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const CONFIG_FILE: &str = "mii_config.json";

/// Selects the host board's GPIO/peripheral layout (§6). Carried through
/// by the core only as an opaque tag — the pin mapping itself is out of
/// scope (§1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoardVariant {
    M1,
    M2,
}

impl Default for BoardVariant {
    fn default() -> Self {
        BoardVariant::M1
    }
}

/// One of the two audio reconstruction rates the mixer supports (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleRate {
    Hz22050,
    Hz44100,
}

impl SampleRate {
    pub fn as_hz(self) -> u32 {
        match self {
            SampleRate::Hz22050 => 22_050,
            SampleRate::Hz44100 => 44_100,
        }
    }
}

impl Default for SampleRate {
    fn default() -> Self {
        SampleRate::Hz44100
    }
}

fn default_pool_pages() -> usize {
    256
}
fn default_swap_path() -> String {
    "mii_swap.bin".to_string()
}
fn default_aux_swap_path() -> String {
    "mii_swap_aux.bin".to_string()
}
fn default_rom_dir() -> String {
    "roms".to_string()
}
fn default_disk_dir() -> String {
    "disks".to_string()
}

/// §6 options table, plus the §4.A pool-sizing fields it calls out as
/// living on `Config`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub board_variant: BoardVariant,
    pub cpu_speed_mhz: u32,
    pub psram_enabled: bool,
    pub sample_rate: SampleRate,
    pub palette_index: u32,
    pub video_rom_bank: u8,

    /// §4.A: identity-mapped (256 physical pages) when `psram_enabled` is
    /// false; otherwise the smaller pool size a board with less SRAM than
    /// the guest's 64 KiB address space needs to cache.
    #[serde(default = "default_pool_pages")]
    pub main_pool_pages: usize,
    #[serde(default = "default_pool_pages")]
    pub aux_pool_pages: usize,
    #[serde(default = "default_swap_path")]
    pub main_swap_path: String,
    #[serde(default = "default_aux_swap_path")]
    pub aux_swap_path: String,

    #[serde(default)]
    pub last_disk1: Option<String>,
    #[serde(default)]
    pub last_disk2: Option<String>,

    #[serde(default = "default_rom_dir")]
    pub rom_dir: String,
    #[serde(default = "default_disk_dir")]
    pub disk_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            board_variant: BoardVariant::default(),
            cpu_speed_mhz: 120,
            psram_enabled: false,
            sample_rate: SampleRate::default(),
            palette_index: 0,
            video_rom_bank: 0,
            main_pool_pages: default_pool_pages(),
            aux_pool_pages: default_pool_pages(),
            main_swap_path: default_swap_path(),
            aux_swap_path: default_aux_swap_path(),
            last_disk1: None,
            last_disk2: None,
            rom_dir: default_rom_dir(),
            disk_dir: default_disk_dir(),
        }
    }
}

impl Config {
    pub fn load() -> Self {
        Self::load_from(CONFIG_FILE)
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    log::warn!("config: failed to parse {e}, using defaults");
                    Config::default()
                }
            },
            Err(_) => Config::default(),
        }
    }

    pub fn save(&self) -> Result<(), String> {
        self.save_to(CONFIG_FILE)
    }

    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), String> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| format!("failed to serialize config: {e}"))?;
        fs::write(path, json).map_err(|e| format!("failed to write config: {e}"))?;
        Ok(())
    }

    pub fn ensure_directories(&self) {
        for dir in [&self.rom_dir, &self.disk_dir] {
            if !dir.is_empty() && !Path::new(dir).exists() {
                let _ = fs::create_dir_all(dir);
            }
        }
    }

    /// §4.A: when psram is disabled the guest's whole 256-page space is
    /// identity-mapped, regardless of what the persisted pool size says.
    pub fn effective_main_pool_pages(&self) -> usize {
        if self.psram_enabled {
            self.main_pool_pages.min(crate::vram::GUEST_PAGES)
        } else {
            crate::vram::GUEST_PAGES
        }
    }

    pub fn effective_aux_pool_pages(&self) -> usize {
        if self.psram_enabled {
            self.aux_pool_pages.min(crate::vram::GUEST_PAGES)
        } else {
            crate::vram::GUEST_PAGES
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_identity_mapped_without_psram() {
        let cfg = Config::default();
        assert!(!cfg.psram_enabled);
        assert_eq!(cfg.effective_main_pool_pages(), crate::vram::GUEST_PAGES);
    }

    #[test]
    fn psram_enabled_honours_configured_pool_size() {
        let mut cfg = Config::default();
        cfg.psram_enabled = true;
        cfg.main_pool_pages = 66;
        assert_eq!(cfg.effective_main_pool_pages(), 66);
    }

    #[test]
    fn round_trips_through_json() {
        let cfg = Config::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.cpu_speed_mhz, cfg.cpu_speed_mhz);
        assert_eq!(back.board_variant, cfg.board_variant);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = Config::load_from("/nonexistent/path/mii_config_test.json");
        assert_eq!(cfg.palette_index, Config::default().palette_index);
    }
}
