//! Headless desktop host (§6 "external interfaces").
//!
//! Loads ROMs and an optional pair of disk images, then runs the machine
//! frame-by-frame for a fixed number of frames, reporting progress the way
//! the teacher's own debug binary does with plain `log`/stdout output
//! rather than a window — a board's equivalent main loop looks the same
//! shape, just driven by a panel refresh interrupt instead of a `for` loop.

use clap::Parser;
use mii_core::config::Config;
use mii_core::emu::{AudioSink, Emu, FrameSink};
use mii_core::loader::{MountMode, StdBlockStorage};
use mii_core::rom::{RomClass, RomRegistry};
use mii_core::vram::{StdSwapFile, Vram};

#[derive(Parser, Debug)]
#[command(name = "mii_host", about = "Headless Apple IIe core host")]
struct Args {
    /// Directory holding the main/character/card ROM blobs.
    #[arg(long, default_value = "roms")]
    rom_dir: String,

    /// Disk image to mount in drive 1.
    #[arg(long)]
    disk1: Option<String>,

    /// Disk image to mount in drive 2.
    #[arg(long)]
    disk2: Option<String>,

    /// Number of frames to run before exiting.
    #[arg(long, default_value_t = 60)]
    frames: u32,

    #[arg(long)]
    config: Option<String>,
}

struct NullFrameSink {
    frames_seen: u64,
}
impl FrameSink for NullFrameSink {
    fn present(&mut self, frame: &[u8]) {
        self.frames_seen += 1;
        debug_assert!(!frame.is_empty());
    }
}

struct NullAudioSink;
impl AudioSink for NullAudioSink {
    fn push_samples(&mut self, _interleaved: &[i16]) {}
}

fn load_rom_file(registry: &mut RomRegistry, class: RomClass, name: &str, dir: &str, file_name: &str) {
    let path = format!("{dir}/{file_name}");
    match std::fs::read(&path) {
        Ok(data) => registry.register(class, name, data),
        Err(e) => log::warn!("mii_host: could not read {path}: {e}"),
    }
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    config.ensure_directories();

    let mut registry = RomRegistry::new();
    load_rom_file(&mut registry, RomClass::Main, "iiee", &args.rom_dir, "apple2e.rom");
    load_rom_file(&mut registry, RomClass::Video, "iiee_video", &args.rom_dir, "apple2e_video.rom");
    load_rom_file(&mut registry, RomClass::Card, "disk2", &args.rom_dir, "disk2.rom");

    let main_swap = StdSwapFile::create(&config.main_swap_path).expect("create main swap file");
    let main_vram = Vram::new(config.effective_main_pool_pages(), main_swap).expect("size main vram pool");
    let aux_vram = if config.psram_enabled {
        let aux_swap = StdSwapFile::create(&config.aux_swap_path).expect("create aux swap file");
        Some(Vram::new(config.effective_aux_pool_pages(), aux_swap).expect("size aux vram pool"))
    } else {
        None
    };

    let storage = StdBlockStorage::new(&config.disk_dir);
    let mut emu = Emu::new(
        main_vram,
        aux_vram,
        true,
        config.sample_rate.as_hz(),
        config.palette_index,
        storage,
    );
    emu.install_roms(&registry);

    if let Some(disk1) = args.disk1.or(config.last_disk1.clone()) {
        if let Err(e) = emu.mount(0, &disk1, false, MountMode::Reset) {
            log::error!("mii_host: failed to mount drive 1 ({disk1}): {e}");
        }
    }
    if let Some(disk2) = args.disk2.or(config.last_disk2.clone()) {
        if let Err(e) = emu.mount(1, &disk2, false, MountMode::Reset) {
            log::error!("mii_host: failed to mount drive 2 ({disk2}): {e}");
        }
    }

    let mut frame_sink = NullFrameSink { frames_seen: 0 };
    let mut audio_sink = NullAudioSink;
    for _ in 0..args.frames {
        emu.run_frame();
        emu.render_frame(&mut frame_sink);
        emu.drain_audio_into(&mut audio_sink, 4096);
    }

    log::info!("mii_host: ran {} frames, {} total CPU cycles", frame_sink.frames_seen, emu.cpu.total_cycles);
}
