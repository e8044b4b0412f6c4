//! Top-level machine: wires `Bus`, `Cpu`, `Video`, `AudioMixer`,
//! `DiskController`, `BlockCard` and `TimerWheel` into one steppable
//! machine (§4.L "Outer loop"), and completes the mount/eject sequence
//! the loader defers to its caller (§4.J step 6).
//!
//! Grounded on the teacher's `apple2.rs` `Apple2` struct, which owned
//! exactly this set of subsystems and drove them from one `step()`; the
//! subsystems themselves are all new, but the shape of "one struct owns
//! the CPU plus its peripherals and exposes a frame-at-a-time API to a
//! host binary" is carried over unchanged.

use std::cell::RefCell;
use std::rc::Rc;

use crate::audio::AudioMixer;
use crate::block::BlockCard;
use crate::bus::{Bus, SlotIo, Switches};
use crate::cpu::{Cpu, CpuType, MemoryBus};
use crate::disk::DiskController;
use crate::loader::{BlockStorage, Loader, MountMode};
use crate::rom::RomRegistry;
use crate::timer::{TimerId, TimerTarget, TimerWheel};
use crate::video::{self, Video};
use crate::vram::{SwapBackend, Vram};
use crate::error::Result;

/// Where a host delivers a finished frame (§6 "external interfaces").
/// `out` must hold at least `video::SCREEN_WIDTH * video::SCREEN_HEIGHT`
/// indexed bytes; a desktop binary would blit through a palette LUT, a
/// board would DMA it straight to a panel.
pub trait FrameSink {
    fn present(&mut self, frame: &[u8]);
}

/// Where a host drains interleaved stereo 16-bit PCM (§6).
pub trait AudioSink {
    fn push_samples(&mut self, interleaved: &[i16]);
}

const HD_TRAP_INDEX: u8 = 0x00;
const SP_TRAP_INDEX: u8 = 0x01;
const DISK_SLOT: usize = 6;

/// Forwards the Disk II controller's `SlotIo` calls through the shared
/// handle so `Emu` can also call `run()` on it directly every step — the
/// same "owned once, reached two ways" problem `BlockCard`'s traps solve
/// with the same `Rc<RefCell<..>>` shape.
struct DiskSlot(Rc<RefCell<DiskController>>);

impl SlotIo for DiskSlot {
    fn io_read(&mut self, reg: u8) -> u8 {
        self.0.borrow_mut().io_read(reg)
    }
    fn io_write(&mut self, reg: u8, value: u8) {
        self.0.borrow_mut().io_write(reg, value);
    }
}

/// The whole machine (§3 top-level state, §4.L).
pub struct Emu<S: SwapBackend, B: BlockStorage> {
    pub cpu: Cpu,
    pub bus: Bus<S>,
    pub video: Video,
    pub audio: AudioMixer,
    disk: Rc<RefCell<DiskController>>,
    block_card: BlockCard,
    timers: TimerWheel,
    vbl_timer: TimerId,
    loader: Loader,
    storage: B,
    speaker_prev: bool,
    frame_buf: Vec<u8>,
}

impl<S: SwapBackend, B: BlockStorage> Emu<S, B> {
    /// Builds a cold machine: paged RAM already sized by the caller
    /// (§4.A pool sizing is a `Config` decision, made before this is
    /// called), Disk II installed in slot 6 (the conventional Apple II
    /// boot slot), the block-device traps installed at
    /// `HD_TRAP_INDEX`/`SP_TRAP_INDEX`, and the VBL timer armed for the
    /// first visible scanline period.
    pub fn new(main_vram: Vram<S>, aux_vram: Option<Vram<S>>, is_iie: bool, sample_rate_hz: u32, palette_index: u32, storage: B) -> Self {
        let mut bus = Bus::new(main_vram, aux_vram, is_iie);

        let disk = Rc::new(RefCell::new(DiskController::new()));
        bus.install_slot_io(DISK_SLOT, Box::new(DiskSlot(disk.clone())));

        let block_card = BlockCard::new();
        block_card.install_traps(&mut bus, HD_TRAP_INDEX, SP_TRAP_INDEX);

        let mut timers = TimerWheel::new();
        let vbl_timer = timers.register("vbl", video::VISIBLE_CYCLES);

        Emu {
            cpu: Cpu::new(if is_iie { CpuType::Cpu65C02 } else { CpuType::Cpu6502 }),
            bus,
            video: Video::new(palette_index),
            audio: AudioMixer::new(sample_rate_hz),
            disk,
            block_card,
            timers,
            vbl_timer,
            loader: Loader::new(),
            storage,
            speaker_prev: false,
            frame_buf: vec![0u8; video::SCREEN_WIDTH * video::SCREEN_HEIGHT],
        }
    }

    /// Loads the main 65C02 ROM and the Disk II boot ROM for slot 6 out of
    /// `registry` (§4.K), then resets the CPU from the fresh reset vector.
    pub fn install_roms(&mut self, registry: &RomRegistry) {
        self.bus.load_rom_from_registry(registry, "iiee");
        if let Some(boot) = registry.get(crate::rom::RomClass::Card, "disk2") {
            if boot.len() >= 256 {
                let mut rom = [0u8; 256];
                rom.copy_from_slice(&boot[..256]);
                self.bus.load_slot_rom(DISK_SLOT, &rom);
            }
        }
        self.cpu.reset(&mut self.bus);
    }

    /// Cold or warm reset (§3 "Reset"): cold clears video/audio state too,
    /// warm only re-vectors the CPU (the usual Ctrl-Reset behaviour).
    pub fn reset(&mut self, cold: bool) {
        self.cpu.reset(&mut self.bus);
        if cold {
            self.video.mark_dirty();
            self.bus.scanline = 0;
        }
    }

    /// Mounts `image_path` into `drive` (0/1), completing §4.J's step 6
    /// (boot signature + VBL timer reset) after `Loader::mount` has done
    /// steps 1-5.
    pub fn mount(&mut self, drive: usize, image_path: &str, read_only: bool, mode: MountMode) -> Result<()> {
        {
            let mut disk = self.disk.borrow_mut();
            self.loader.mount(&mut self.storage, &mut disk, drive, image_path, read_only, mode)?;
        }
        self.timers.set(self.vbl_timer, video::VISIBLE_CYCLES);
        self.bus.scanline = 0;
        self.video.mark_dirty();
        Ok(())
    }

    pub fn eject(&mut self, drive: usize) -> Result<()> {
        let mut disk = self.disk.borrow_mut();
        self.loader.eject(&mut self.storage, &mut disk, drive)
    }

    /// Flushes any tracks the drive head left dirty to the mounted BDSK
    /// side file (§8 invariant 5); called once per frame from
    /// `run_frame`, not per CPU step, since a real head rarely crosses a
    /// sector boundary inside a single instruction.
    fn flush_dirty_tracks(&mut self) {
        let flushed = self.disk.borrow_mut().take_pending_flushes();
        for f in flushed {
            if let Some(desc) = self.loader.descriptor(f.drive).cloned() {
                if !desc.read_only {
                    if let Err(e) = self.loader.persist_track(&mut self.storage, &desc, f.physical_track, &f.data) {
                        log::warn!("emu: failed to persist track {} of drive {}: {e}", f.physical_track, f.drive);
                    }
                }
            }
        }
    }

    /// One CPU instruction plus everything cooperative that hangs off it:
    /// disk bit-clock advance, the speaker click edge, the timer wheel,
    /// and the vapor-read refresh (§4.L).
    fn step_one(&mut self) {
        let speaker_before = self.bus.switches.contains(Switches::SPEAKER_CLICK);
        let cycles = self.cpu.step(&mut self.bus);
        let speaker_after = self.bus.switches.contains(Switches::SPEAKER_CLICK);
        if speaker_after != speaker_before {
            self.audio.click(self.cpu.total_cycles);
        }

        self.disk.borrow_mut().run(cycles);

        let scaled = ((cycles as f32) * self.cpu.speed).round() as u32;
        // `TimerWheel::tick` needs `&mut self` for callbacks (VBL touches
        // `self.bus`/`self.video`); taking the wheel out avoids aliasing
        // the field it's about to be handed back into, the same idiom
        // `Bus::dispatch_trap` uses for its own trap table.
        let mut timers = std::mem::take(&mut self.timers);
        timers.tick(scaled, self);
        self.timers = timers;

        let vapor = (self.bus.scanline as u8) ^ (self.timers.nearest_remaining() as u8);
        self.bus.set_vapor_byte(vapor);
    }

    /// Runs CPU instructions until one full frame's worth of cycles
    /// (§4.F `CYCLES_PER_FRAME`) has elapsed, then flushes any disk
    /// write-back and polls the block card's video-dirty flag (§4.I
    /// "a SmartPort read landing in hi-res page 2 redraws the picture
    /// next frame").
    pub fn run_frame(&mut self) {
        let target = self.cpu.total_cycles + video::CYCLES_PER_FRAME as u64;
        while self.cpu.total_cycles < target {
            self.step_one();
        }
        self.flush_dirty_tracks();
        if self.block_card.take_video_dirty() {
            self.video.mark_dirty();
        }
    }

    /// Renders the current picture into `sink` (§4.F two-step
    /// `render`/`finish_into` contract).
    pub fn render_frame<F: FrameSink>(&mut self, sink: &mut F) {
        self.video.render(&mut self.bus, &mut self.frame_buf);
        self.video.finish_into(&mut self.frame_buf);
        sink.present(&self.frame_buf);
    }

    /// Drains whatever the audio mixer has ready into `sink`, in chunks
    /// of up to `max_samples` interleaved stereo frames.
    pub fn drain_audio_into<A: AudioSink>(&mut self, sink: &mut A, max_samples: usize) {
        let count = self.audio.ready_samples().min(max_samples);
        if count == 0 {
            return;
        }
        let mut buf = vec![0i16; count * 2];
        self.audio.drain_interleaved(&mut buf, count);
        sink.push_samples(&buf);
    }

    /// Latches a key press the way `$C000`/`$C010` expect it (§4.D):
    /// high bit set, strobe held until `$C010` is read.
    pub fn keypress(&mut self, ascii: u8) {
        self.bus.keyboard_strobe = ascii | 0x80;
    }

    /// Updates one game-port paddle position (0-3) and the cycle it was
    /// last read, for the `$C064-$C067` RC-decay reads (§4.D).
    pub fn paddle_input(&mut self, index: usize, value: u8) {
        if index < self.bus.paddle.len() {
            self.bus.paddle[index] = value;
        }
    }
}

impl<S: SwapBackend, B: BlockStorage> TimerTarget for Emu<S, B> {
    fn fire(&mut self, id: TimerId, _name: &'static str) -> i64 {
        if id == self.vbl_timer {
            self.video.on_vbl_timer(&mut self.bus)
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vram::{SwapBackend, PAGE_SIZE};
    use std::collections::HashMap;

    #[derive(Clone)]
    struct MemSwap(Rc<RefCell<HashMap<u8, [u8; PAGE_SIZE]>>>);
    impl MemSwap {
        fn new() -> Self {
            MemSwap(Rc::new(RefCell::new(HashMap::new())))
        }
    }
    impl SwapBackend for MemSwap {
        fn read_page(&mut self, p: u8, out: &mut [u8; PAGE_SIZE]) -> Result<()> {
            if let Some(data) = self.0.borrow().get(&p) {
                *out = *data;
            }
            Ok(())
        }
        fn write_page(&mut self, p: u8, data: &[u8; PAGE_SIZE]) -> Result<()> {
            self.0.borrow_mut().insert(p, *data);
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemStorage {
        files: HashMap<String, Vec<u8>>,
    }
    impl BlockStorage for MemStorage {
        fn read_file(&mut self, path: &str) -> Result<Vec<u8>> {
            self.files.get(path).cloned().ok_or_else(|| crate::error::MiiError::Io {
                path: path.to_string(),
                reason: "not found".into(),
            })
        }
        fn write_file(&mut self, path: &str, data: &[u8]) -> Result<()> {
            self.files.insert(path.to_string(), data.to_vec());
            Ok(())
        }
        fn exists(&mut self, path: &str) -> bool {
            self.files.contains_key(path)
        }
        fn list_dir(&mut self, _path: &str) -> Result<Vec<crate::loader::DirEntry>> {
            Ok(Vec::new())
        }
    }

    struct VecSink(Vec<u8>);
    impl FrameSink for VecSink {
        fn present(&mut self, frame: &[u8]) {
            self.0 = frame.to_vec();
        }
    }

    fn new_emu() -> Emu<MemSwap, MemStorage> {
        let main = Vram::new(256, MemSwap::new()).unwrap();
        Emu::new(main, None, true, 44_100, 0, MemStorage::default())
    }

    #[test]
    fn fresh_machine_resets_pc_from_the_reset_vector() {
        let mut emu = new_emu();
        emu.bus.write(0xFFFC, 0x00);
        emu.bus.write(0xFFFD, 0x30);
        emu.cpu.reset(&mut emu.bus);
        assert_eq!(emu.cpu.regs.pc, 0x3000);
    }

    #[test]
    fn run_frame_advances_total_cycles_by_one_frame_budget() {
        let mut emu = new_emu();
        // A field of NOPs so the frame loop has something harmless to run.
        for addr in 0x3000u16..0x3100 {
            emu.bus.write(addr, 0xEA);
        }
        emu.bus.write(0xFFFC, 0x00);
        emu.bus.write(0xFFFD, 0x30);
        emu.cpu.reset(&mut emu.bus);
        let start = emu.cpu.total_cycles;
        emu.run_frame();
        assert!(emu.cpu.total_cycles - start >= video::CYCLES_PER_FRAME as u64);
    }

    #[test]
    fn render_frame_delivers_a_full_size_buffer_to_the_sink() {
        let mut emu = new_emu();
        let mut sink = VecSink(Vec::new());
        emu.render_frame(&mut sink);
        assert_eq!(sink.0.len(), video::SCREEN_WIDTH * video::SCREEN_HEIGHT);
    }

    #[test]
    fn keypress_sets_the_high_bit_strobe() {
        let mut emu = new_emu();
        emu.keypress(b'A');
        assert_eq!(emu.bus.keyboard_strobe, b'A' | 0x80);
    }

    #[test]
    fn mounting_a_blank_image_arms_the_vbl_timer() {
        let mut emu = new_emu();
        emu.storage.files.insert("/apple/a.dsk".to_string(), vec![0u8; crate::disk::convert::DSK_SIZE]);
        emu.mount(0, "/apple/a.dsk", false, MountMode::Reset).unwrap();
        assert_eq!(emu.timers.remaining(emu.vbl_timer), video::VISIBLE_CYCLES);
    }
}
