//! System bus (§4.D).
//!
//! Owns the address decode for the full 64 KiB CPU address space: main/aux
//! banks (paged through [`crate::vram::Vram`]), the language-card RAM, ROM,
//! slot ROM, the soft-switch register block, and the card trap table. This
//! replaces the teacher's single flat `Memory` struct in `memory.rs` with
//! the `Bank`-based layout the spec's §9 redesign calls for, so that paged
//! RAM (§4.A) is just another bank rather than a special case baked into
//! the bus.

use bitflags::bitflags;

use crate::bank::Bank;
use crate::cpu::{MemoryBus, Registers};
use crate::rom::{RomClass, RomRegistry};
use crate::vram::{SwapBackend, Vram, GUEST_PAGES};

bitflags! {
    /// The packed boolean soft-switches (§4.D), one bit per switch.
    /// Grounded on the teacher's `memory::SoftSwitches`, repacked from a
    /// struct-of-bools into a `bitflags` register the way a real Apple IIe
    /// video/memory ASIC exposes its latches.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Switches: u32 {
        const TEXT_MODE      = 1 << 0;
        const MIXED_MODE     = 1 << 1;
        const PAGE2          = 1 << 2;
        const HIRES          = 1 << 3;
        const STORE_80       = 1 << 4;
        const COL_80         = 1 << 5;
        const ALT_CHAR       = 1 << 6;
        const DHIRES         = 1 << 7;
        const IOUDIS         = 1 << 8;
        const LC_BANK2       = 1 << 9;
        const LC_READ_ENABLE = 1 << 10;
        const LC_WRITE_ENABLE= 1 << 11;
        const LC_PREWRITE    = 1 << 12;
        const RAMRD          = 1 << 13;
        const RAMWRT         = 1 << 14;
        const ALTZP          = 1 << 15;
        const SPEAKER_CLICK  = 1 << 16;
        const ANNUNCIATOR0   = 1 << 17;
        const ANNUNCIATOR1   = 1 << 18;
        const ANNUNCIATOR2   = 1 << 19;
        const ANNUNCIATOR3   = 1 << 20;
        const BUTTON0        = 1 << 21;
        const BUTTON1        = 1 << 22;
        const BUTTON2        = 1 << 23;
    }
}

impl Default for Switches {
    fn default() -> Self {
        // Cold boot: text mode, IOU disabled, everything else clear —
        // matches `memory::SoftSwitches::default()`.
        Switches::TEXT_MODE | Switches::IOUDIS
    }
}

/// The memory surface a card trap is allowed to touch (§4.C "may read/write
/// CPU registers and memory"). Kept narrower than the full `Bus` so a trap
/// closure can be called with `&mut self` reborrowed out from under the
/// trap table it's stored in (see `dispatch_trap`) without the closure type
/// itself needing to know `Bus`'s `S: SwapBackend` parameter beyond this
/// trait bound.
pub trait TrapMemory {
    fn trap_read(&mut self, addr: u16) -> u8;
    fn trap_write(&mut self, addr: u16, value: u8);
}

impl<S: SwapBackend> TrapMemory for Bus<S> {
    fn trap_read(&mut self, addr: u16) -> u8 {
        MemoryBus::read(self, addr)
    }

    /// §4.D: a trap's buffer copy is DMA from the CPU's point of view, but
    /// the video renderer redraws the whole frame from live memory every
    /// call (§4.F), so it always picks up whatever a trap just wrote —
    /// no separate dirty-notification is needed here.
    fn trap_write(&mut self, addr: u16, value: u8) {
        MemoryBus::write(self, addr, value);
    }
}

/// A card trap (§4.C/§9). Registered against a `BRK <index>` index byte;
/// receives the CPU registers and a [`TrapMemory`] handle for reading/
/// writing guest RAM (the block-device traps in §4.I use this to pull
/// their parameter block and copy sector buffers), and reports back through
/// `A` and the carry flag the way the 6502 convention for ProDOS/SmartPort
/// calls does.
pub type Trap = Box<dyn FnMut(&mut Registers, &mut dyn TrapMemory) + 'static>;

/// A card occupying the per-slot I/O window `$C0n0-$C0nF` (§4.D, §4.H).
/// Unlike [`Trap`], which intercepts a `BRK` index byte for ProDOS/SmartPort
/// calls, `SlotIo` is wired straight into the soft-switch address decode —
/// this is how the Disk II controller's phase/motor/Q6/Q7 registers are
/// reached.
pub trait SlotIo {
    fn io_read(&mut self, reg: u8) -> u8;
    fn io_write(&mut self, reg: u8, value: u8);
}

/// The system bus: address decode plus the card trap table (§4.C, §4.D).
pub struct Bus<S: SwapBackend> {
    main: Bank<S>,
    aux: Option<Bank<S>>,
    lc_bank1: Bank<S>,
    lc_bank2: Bank<S>,
    lc_common: Bank<S>,
    rom: Vec<u8>,
    slot_rom: Vec<[u8; 256]>,
    pub switches: Switches,
    pub keyboard_strobe: u8,
    pub paddle: [u8; 4],
    pub paddle_read_cycle: u64,
    pub paddle_trigger_cycle: u64,
    pub scanline: u16,
    is_iie: bool,
    trap_table: [Option<Trap>; 256],
    slot_io: [Option<Box<dyn SlotIo>>; 8],
    /// SPEC_FULL.md §4.F vapor read: a byte `Emu` refreshes once per CPU
    /// step from `video`/`timer` state, returned in place of a fixed 0 for
    /// the soft-switch addresses that have no real latch behind them.
    vapor_byte: u8,
}

impl<S: SwapBackend> Bus<S> {
    /// `main_vram`/`aux_vram` are the already-sized paged pools (§4.A); a
    /// machine with no aux card (Apple II/II+) passes `None` for `aux`.
    pub fn new(main_vram: Vram<S>, aux_vram: Option<Vram<S>>, is_iie: bool) -> Self {
        const NONE_TRAP: Option<Trap> = None;
        Bus {
            main: Bank::new_paged(0x0000, (GUEST_PAGES) as u16, main_vram),
            aux: aux_vram.map(|v| Bank::new_paged(0x0000, GUEST_PAGES as u16, v)),
            lc_bank1: Bank::new_raw(0xD000, 16, false),
            lc_bank2: Bank::new_raw(0xD000, 16, false),
            lc_common: Bank::new_raw(0xE000, 32, false),
            rom: Vec::new(),
            slot_rom: vec![[0u8; 256]; 8],
            switches: Switches::default(),
            keyboard_strobe: 0,
            paddle: [128; 4],
            paddle_read_cycle: 0,
            paddle_trigger_cycle: 0,
            scanline: 0,
            is_iie,
            trap_table: [NONE_TRAP; 256],
            slot_io: [None, None, None, None, None, None, None, None],
            vapor_byte: 0,
        }
    }

    /// Feeds this step's vapor-read byte (§4.F Open Question resolution:
    /// `video.line_addr(line) ^ timer.remaining()`'s low byte). `Emu` calls
    /// this once per CPU step; nothing here computes it directly since the
    /// bus doesn't own video or timer state.
    pub fn set_vapor_byte(&mut self, value: u8) {
        self.vapor_byte = value;
    }

    /// Plugs a card into slot `slot`'s (1..=7) `$C0n0-$C0nF` I/O window.
    pub fn install_slot_io(&mut self, slot: usize, handler: Box<dyn SlotIo>) {
        if slot < self.slot_io.len() {
            self.slot_io[slot] = Some(handler);
        }
    }

    /// Loads the main CPU ROM from the registry (§4.K), keeping the
    /// teacher's size-dispatch logic (`memory::Memory::load_rom`) for the
    /// 2/12/16/20/32 KiB blob layouts a real Disk II boot ROM ships in.
    pub fn load_rom_from_registry(&mut self, registry: &RomRegistry, name: &str) {
        if let Some(data) = registry.get(RomClass::Main, name) {
            self.load_rom(data);
        } else {
            log::error!("bus: no main ROM registered under {name:?}");
        }
    }

    fn load_rom(&mut self, rom_data: &[u8]) {
        match rom_data.len() {
            16384 => self.rom = rom_data.to_vec(),
            12288 => {
                let mut rom = vec![0xFFu8; 16384];
                rom[0x1000..0x1000 + 12288].copy_from_slice(rom_data);
                self.rom = rom;
            }
            2048 => {
                let mut rom = vec![0xFFu8; 16384];
                rom[0x3800..0x3800 + 2048].copy_from_slice(rom_data);
                self.rom = rom;
            }
            20480 => {
                let mut rom = vec![0xFFu8; 16384];
                rom[0x0600..0x0700].copy_from_slice(&rom_data[0x0600..0x0700]);
                rom[0x1000..0x1000 + 12288].copy_from_slice(&rom_data[0x2000..0x5000]);
                self.rom = rom;
            }
            32768 => self.rom = rom_data[0x4000..0x8000].to_vec(),
            other => {
                log::warn!("bus: unrecognised main ROM size {other} bytes, loading verbatim");
                self.rom = rom_data.to_vec();
            }
        }
    }

    pub fn load_slot_rom(&mut self, slot: usize, data: &[u8; 256]) {
        if slot < self.slot_rom.len() {
            self.slot_rom[slot] = *data;
        }
    }

    /// Registers a trap at `index` (§4.C). Installing `None` (by calling
    /// again with an index already in use) replaces the previous trap.
    pub fn install_trap(&mut self, index: u8, trap: Trap) {
        self.trap_table[index as usize] = Some(trap);
    }

    fn read_soft_switch(&mut self, address: u16) -> u8 {
        let addr = (address & 0xFF) as u8;
        match addr {
            0x00..=0x0F => self.keyboard_strobe,
            0x10 => {
                let r = self.keyboard_strobe;
                self.keyboard_strobe &= 0x7F;
                r
            }
            0x11 if self.is_iie => self.bit(Switches::LC_BANK2),
            0x12 if self.is_iie => self.bit(Switches::LC_READ_ENABLE),
            0x13 if self.is_iie => self.bit(Switches::RAMRD),
            0x14 if self.is_iie => self.bit(Switches::RAMWRT),
            0x15 if self.is_iie => 0x00,
            0x16 if self.is_iie => self.bit(Switches::ALTZP),
            0x17 if self.is_iie => 0x00,
            0x18 if self.is_iie => self.bit(Switches::STORE_80),
            // §4.D SWVBL / glossary "VBL": bit 7 is set for the duration
            // of the blanking window and clear during the visible period.
            0x19 if self.is_iie => if self.scanline >= 192 { 0x80 } else { 0x00 },
            0x1A if self.is_iie => self.bit(Switches::TEXT_MODE),
            0x1B if self.is_iie => self.bit(Switches::MIXED_MODE),
            0x1C if self.is_iie => self.bit(Switches::PAGE2),
            0x1D if self.is_iie => self.bit(Switches::HIRES),
            0x1E if self.is_iie => self.bit(Switches::ALT_CHAR),
            0x1F if self.is_iie => self.bit(Switches::COL_80),
            0x11..=0x1F => {
                let r = self.keyboard_strobe;
                self.keyboard_strobe &= 0x7F;
                r
            }
            // No latch behind these addresses; a real machine would read
            // whatever the video shifter last put on the data bus (§4.F
            // vapor read), approximated here from `vapor_byte`.
            0x20..=0x2F => self.vapor_byte,
            0x30..=0x3F => {
                self.switches.toggle(Switches::SPEAKER_CLICK);
                0x00
            }
            0x40..=0x4F => self.vapor_byte,
            0x50 => { self.switches.remove(Switches::TEXT_MODE); 0x00 }
            0x51 => { self.switches.insert(Switches::TEXT_MODE); 0x00 }
            0x52 => { self.switches.remove(Switches::MIXED_MODE); 0x00 }
            0x53 => { self.switches.insert(Switches::MIXED_MODE); 0x00 }
            0x54 => { self.switches.remove(Switches::PAGE2); 0x00 }
            0x55 => { self.switches.insert(Switches::PAGE2); 0x00 }
            0x56 => { self.switches.remove(Switches::HIRES); 0x00 }
            0x57 => { self.switches.insert(Switches::HIRES); 0x00 }
            0x58 => { self.switches.remove(Switches::ANNUNCIATOR0); 0x00 }
            0x59 => { self.switches.insert(Switches::ANNUNCIATOR0); 0x00 }
            0x5A => { self.switches.remove(Switches::ANNUNCIATOR1); 0x00 }
            0x5B => { self.switches.insert(Switches::ANNUNCIATOR1); 0x00 }
            0x5C => { self.switches.remove(Switches::ANNUNCIATOR2); 0x00 }
            0x5D => { self.switches.insert(Switches::ANNUNCIATOR2); 0x00 }
            0x5E => {
                if self.is_iie && !self.switches.contains(Switches::IOUDIS) {
                    self.switches.insert(Switches::DHIRES);
                } else {
                    self.switches.remove(Switches::ANNUNCIATOR3);
                }
                0x00
            }
            0x5F => {
                if self.is_iie && !self.switches.contains(Switches::IOUDIS) {
                    self.switches.remove(Switches::DHIRES);
                } else {
                    self.switches.insert(Switches::ANNUNCIATOR3);
                }
                0x00
            }
            0x60 => self.vapor_byte,
            0x61 => self.bit(Switches::BUTTON0),
            0x62 => self.bit(Switches::BUTTON1),
            0x63 => self.bit(Switches::BUTTON2),
            0x64..=0x67 => {
                let idx = (addr - 0x64) as usize;
                let timeout = self.paddle[idx] as u64 * 11;
                let elapsed = self
                    .paddle_read_cycle
                    .saturating_sub(self.paddle_trigger_cycle);
                if elapsed < timeout { 0x80 } else { 0x00 }
            }
            0x70..=0x7D => {
                self.paddle_trigger_cycle = self.paddle_read_cycle;
                0x00
            }
            0x7E if self.is_iie => self.bit(Switches::IOUDIS),
            0x7F if self.is_iie => self.bit(Switches::DHIRES),
            0x7E | 0x7F => {
                self.paddle_trigger_cycle = self.paddle_read_cycle;
                0x00
            }
            0x80..=0x8F => self.handle_language_card(addr),
            0x90..=0xFF => {
                let slot = ((addr - 0x90) >> 4) as usize + 1;
                let reg = addr & 0x0F;
                match self.slot_io.get_mut(slot) {
                    Some(Some(card)) => card.io_read(reg),
                    _ => 0x00,
                }
            }
        }
    }

    fn write_soft_switch(&mut self, address: u16, value: u8) {
        let addr = (address & 0xFF) as u8;
        match addr {
            0x10..=0x1F => self.keyboard_strobe &= 0x7F,
            0x00 if self.is_iie => self.switches.remove(Switches::STORE_80),
            0x01 if self.is_iie => self.switches.insert(Switches::STORE_80),
            0x02 if self.is_iie => self.switches.remove(Switches::RAMRD),
            0x03 if self.is_iie => self.switches.insert(Switches::RAMRD),
            0x04 if self.is_iie => self.switches.remove(Switches::RAMWRT),
            0x05 if self.is_iie => self.switches.insert(Switches::RAMWRT),
            0x08 if self.is_iie => self.switches.remove(Switches::ALTZP),
            0x09 if self.is_iie => self.switches.insert(Switches::ALTZP),
            0x0C if self.is_iie => self.switches.remove(Switches::COL_80),
            0x0D if self.is_iie => self.switches.insert(Switches::COL_80),
            0x0E if self.is_iie => self.switches.remove(Switches::ALT_CHAR),
            0x0F if self.is_iie => self.switches.insert(Switches::ALT_CHAR),
            0x30 => self.switches.toggle(Switches::SPEAKER_CLICK),
            0x50 => self.switches.remove(Switches::TEXT_MODE),
            0x51 => self.switches.insert(Switches::TEXT_MODE),
            0x52 => self.switches.remove(Switches::MIXED_MODE),
            0x53 => self.switches.insert(Switches::MIXED_MODE),
            0x54 => self.switches.remove(Switches::PAGE2),
            0x55 => self.switches.insert(Switches::PAGE2),
            0x56 => self.switches.remove(Switches::HIRES),
            0x57 => self.switches.insert(Switches::HIRES),
            0x5E if self.is_iie && !self.switches.contains(Switches::IOUDIS) => {
                self.switches.insert(Switches::DHIRES)
            }
            0x5F if self.is_iie && !self.switches.contains(Switches::IOUDIS) => {
                self.switches.remove(Switches::DHIRES)
            }
            0x7E if self.is_iie => self.switches.insert(Switches::IOUDIS),
            0x7F if self.is_iie => self.switches.remove(Switches::IOUDIS),
            0x80..=0x8F => {
                self.handle_language_card(addr);
            }
            0x90..=0xFF => {
                let slot = ((addr - 0x90) >> 4) as usize + 1;
                let reg = addr & 0x0F;
                if let Some(Some(card)) = self.slot_io.get_mut(slot) {
                    card.io_write(reg, value);
                }
            }
            _ => {}
        }
    }

    /// §4.D language-card bank/pre-write state machine, unchanged from the
    /// teacher's `handle_language_card` (an odd-address double-read/write
    /// toggles `lc_write_enable`, grounded on the real LC firmware
    /// sequence).
    fn handle_language_card(&mut self, addr: u8) -> u8 {
        let sw = &mut self.switches;
        match addr & 0x0F {
            0x0 | 0x4 => {
                sw.insert(Switches::LC_BANK2);
                sw.insert(Switches::LC_READ_ENABLE);
                sw.remove(Switches::LC_WRITE_ENABLE);
                sw.remove(Switches::LC_PREWRITE);
            }
            0x1 | 0x5 => {
                sw.insert(Switches::LC_BANK2);
                sw.remove(Switches::LC_READ_ENABLE);
                if sw.contains(Switches::LC_PREWRITE) {
                    sw.insert(Switches::LC_WRITE_ENABLE);
                }
                sw.toggle(Switches::LC_PREWRITE);
            }
            0x2 | 0x6 => {
                sw.insert(Switches::LC_BANK2);
                sw.remove(Switches::LC_READ_ENABLE);
                sw.remove(Switches::LC_WRITE_ENABLE);
                sw.remove(Switches::LC_PREWRITE);
            }
            0x3 | 0x7 => {
                sw.insert(Switches::LC_BANK2);
                sw.insert(Switches::LC_READ_ENABLE);
                if sw.contains(Switches::LC_PREWRITE) {
                    sw.insert(Switches::LC_WRITE_ENABLE);
                }
                sw.toggle(Switches::LC_PREWRITE);
            }
            0x8 | 0xC => {
                sw.remove(Switches::LC_BANK2);
                sw.insert(Switches::LC_READ_ENABLE);
                sw.remove(Switches::LC_WRITE_ENABLE);
                sw.remove(Switches::LC_PREWRITE);
            }
            0x9 | 0xD => {
                sw.remove(Switches::LC_BANK2);
                sw.remove(Switches::LC_READ_ENABLE);
                if sw.contains(Switches::LC_PREWRITE) {
                    sw.insert(Switches::LC_WRITE_ENABLE);
                }
                sw.toggle(Switches::LC_PREWRITE);
            }
            0xA | 0xE => {
                sw.remove(Switches::LC_BANK2);
                sw.remove(Switches::LC_READ_ENABLE);
                sw.remove(Switches::LC_WRITE_ENABLE);
                sw.remove(Switches::LC_PREWRITE);
            }
            0xB | 0xF => {
                sw.remove(Switches::LC_BANK2);
                sw.insert(Switches::LC_READ_ENABLE);
                if sw.contains(Switches::LC_PREWRITE) {
                    sw.insert(Switches::LC_WRITE_ENABLE);
                }
                sw.toggle(Switches::LC_PREWRITE);
            }
            _ => {}
        }
        0x00
    }

    fn bit(&self, flag: Switches) -> u8 {
        if self.switches.contains(flag) { 0x80 } else { 0x00 }
    }

    fn rom_byte(&self, address: u16) -> u8 {
        let offset = (address - 0xC000) as usize;
        if offset < self.rom.len() { self.rom[offset] } else { 0xFF }
    }

    /// Direct main-bank read, bypassing RAMRD/ALTZP dispatch (§4.F text/
    /// lores/hires rendering always reads main memory's display pages
    /// regardless of which bank the CPU currently sees at that address).
    pub fn peek_main(&mut self, addr: u16) -> u8 {
        self.main.peek(addr)
    }

    /// Direct aux-bank read for 80-column text and DHGR interleave
    /// (§4.F "Text 80-col" / "DHGR color"); returns 0 on a II/II+ with no
    /// aux card installed.
    pub fn peek_aux(&mut self, addr: u16) -> u8 {
        self.aux.as_mut().map(|a| a.peek(addr)).unwrap_or(0)
    }

    pub fn is_iie(&self) -> bool {
        self.is_iie
    }

    /// §4.A pinning entry point forwarded from the future-frame video/disk
    /// DMA walk to whichever bank is currently mapped at `addr`.
    pub fn pin_range(&mut self, addr: u16, len: u32) {
        self.main.pin_range(addr, len);
        if let Some(aux) = &mut self.aux {
            aux.pin_range(addr, len);
        }
    }
}

impl<S: SwapBackend> MemoryBus for Bus<S> {
    fn read(&mut self, address: u16) -> u8 {
        match address {
            0x0000..=0x01FF => {
                if self.is_iie && self.switches.contains(Switches::ALTZP) {
                    self.aux.as_mut().map(|a| a.peek(address)).unwrap_or(0)
                } else {
                    self.main.peek(address)
                }
            }
            0x0200..=0xBFFF => {
                if self.is_iie && self.switches.contains(Switches::RAMRD) {
                    self.aux.as_mut().map(|a| a.peek(address)).unwrap_or(0)
                } else {
                    self.main.peek(address)
                }
            }
            0xC000..=0xC0FF => self.read_soft_switch(address),
            0xC100..=0xC7FF => {
                if !self.rom.is_empty() && self.rom.len() >= 16384 {
                    self.rom_byte(address)
                } else {
                    let slot = ((address - 0xC100) / 256) as usize;
                    let offset = (address & 0xFF) as usize;
                    self.slot_rom.get(slot).map(|p| p[offset]).unwrap_or(0)
                }
            }
            0xC800..=0xCFFF => {
                if !self.rom.is_empty() && self.rom.len() >= 16384 {
                    self.rom_byte(address)
                } else {
                    0x00
                }
            }
            0xD000..=0xDFFF => {
                if self.switches.contains(Switches::LC_READ_ENABLE) {
                    if self.switches.contains(Switches::LC_BANK2) {
                        self.lc_bank2.peek(address)
                    } else {
                        self.lc_bank1.peek(address)
                    }
                } else if !self.rom.is_empty() {
                    self.rom_byte(address)
                } else {
                    0xFF
                }
            }
            0xE000..=0xFFFF => {
                if self.switches.contains(Switches::LC_READ_ENABLE) {
                    self.lc_common.peek(address)
                } else if !self.rom.is_empty() {
                    self.rom_byte(address)
                } else {
                    0xFF
                }
            }
        }
    }

    fn write(&mut self, address: u16, value: u8) {
        match address {
            0x0000..=0x01FF => {
                if self.is_iie && self.switches.contains(Switches::ALTZP) {
                    if let Some(a) = &mut self.aux {
                        a.poke(address, value);
                    }
                } else {
                    self.main.poke(address, value);
                }
            }
            0x0200..=0xBFFF => {
                if self.is_iie && self.switches.contains(Switches::RAMWRT) {
                    if let Some(a) = &mut self.aux {
                        a.poke(address, value);
                    }
                } else {
                    self.main.poke(address, value);
                }
            }
            0xC000..=0xC0FF => self.write_soft_switch(address, value),
            0xC100..=0xCFFF => {}
            0xD000..=0xDFFF => {
                if self.switches.contains(Switches::LC_WRITE_ENABLE) {
                    if self.switches.contains(Switches::LC_BANK2) {
                        self.lc_bank2.poke(address, value);
                    } else {
                        self.lc_bank1.poke(address, value);
                    }
                }
            }
            0xE000..=0xFFFF => {
                if self.switches.contains(Switches::LC_WRITE_ENABLE) {
                    self.lc_common.poke(address, value);
                }
            }
        }
    }

    fn dispatch_trap(&mut self, index: u8, regs: &mut Registers) -> bool {
        // Taken out of the table for the duration of the call so the
        // closure can be handed `&mut self` (for memory access) without
        // aliasing the slot it's stored in; reinserted afterward.
        if let Some(mut trap) = self.trap_table[index as usize].take() {
            trap(regs, self);
            self.trap_table[index as usize] = Some(trap);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vram::StdSwapFile;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Clone)]
    struct MemSwap(Rc<RefCell<[[u8; 256]; GUEST_PAGES]>>);
    impl MemSwap {
        fn new() -> Self {
            MemSwap(Rc::new(RefCell::new([[0u8; 256]; GUEST_PAGES])))
        }
    }
    impl SwapBackend for MemSwap {
        fn read_page(&mut self, p: u8, out: &mut [u8; 256]) -> crate::error::Result<()> {
            *out = self.0.borrow()[p as usize];
            Ok(())
        }
        fn write_page(&mut self, p: u8, data: &[u8; 256]) -> crate::error::Result<()> {
            self.0.borrow_mut()[p as usize] = *data;
            Ok(())
        }
    }

    fn test_bus() -> Bus<MemSwap> {
        let main = Vram::new(256, MemSwap::new()).unwrap();
        Bus::new(main, None, true)
    }

    #[test]
    fn cold_boot_is_text_mode_with_iou_disabled() {
        let bus = test_bus();
        assert!(bus.switches.contains(Switches::TEXT_MODE));
        assert!(bus.switches.contains(Switches::IOUDIS));
    }

    #[test]
    fn c050_c051_toggle_text_mode() {
        let mut bus = test_bus();
        bus.read(0xC050);
        assert!(!bus.switches.contains(Switches::TEXT_MODE));
        bus.read(0xC051);
        assert!(bus.switches.contains(Switches::TEXT_MODE));
    }

    #[test]
    fn main_ram_round_trips_through_bus() {
        let mut bus = test_bus();
        bus.write(0x2000, 0x42);
        assert_eq!(bus.read(0x2000), 0x42);
    }

    #[test]
    fn trap_dispatch_runs_registered_trap_and_consumes_no_other_state() {
        let mut bus = test_bus();
        bus.install_trap(0x10, Box::new(|regs, _mem| regs.a = 0xAA));
        let mut regs = Registers::default();
        assert!(MemoryBus::dispatch_trap(&mut bus, 0x10, &mut regs));
        assert_eq!(regs.a, 0xAA);
        assert!(!MemoryBus::dispatch_trap(&mut bus, 0x11, &mut regs));
    }

    #[test]
    fn unmapped_register_reads_the_vapor_byte() {
        let mut bus = test_bus();
        bus.set_vapor_byte(0x5A);
        assert_eq!(bus.read(0xC020), 0x5A);
        assert_eq!(bus.read(0xC045), 0x5A);
        assert_eq!(bus.read(0xC060), 0x5A);
    }

    #[test]
    fn swvbl_tracks_scanline() {
        let mut bus = test_bus();
        bus.scanline = 50;
        assert_eq!(bus.read(0xC019) & 0x80, 0x00);
        bus.scanline = 200;
        assert_eq!(bus.read(0xC019) & 0x80, 0x80);
    }
}
