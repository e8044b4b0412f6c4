//! SmartPort/ProDOS block-device card (§4.I).
//!
//! The teacher has no card-ROM trap mechanism at all (its `disk.rs` only
//! ever drives the bit-level Disk II protocol), so this module is built
//! straight from §9's `TrapKind` redesign note: a pair of `BRK`-indexed
//! traps plumbed through [`crate::bus::Bus::install_trap`] rather than a
//! byte-addressable I/O register block. One trap answers the classic
//! ProDOS "HD card" zero-page calling convention (`$42`-`$47`); the other
//! answers a SmartPort call, whose command byte and parameter-list pointer
//! follow the trap inline the way a real `JSR $C65C` call's operand bytes
//! would.
//!
//! Both traps share one [`BlockCard`] (`Rc<RefCell<..>>`, the same pattern
//! `emu.rs` uses to let the Disk II controller sit behind both `SlotIo` and
//! a direct `run()` call) so up to [`MII_SM_DRIVE_COUNT`] backing
//! [`BlockDevice`]s can be attached after the traps are installed.

use std::cell::RefCell;
use std::rc::Rc;

use crate::bus::{Bus, TrapMemory};
use crate::cpu::{flags, Registers};
use crate::error::{MiiError, Result};
use crate::vram::SwapBackend;

/// How many logical drives the card answers for (§4.I).
pub const MII_SM_DRIVE_COUNT: usize = 2;

pub const BLOCK_SIZE: usize = 512;

/// HD-trap command codes, read from zero page `$42` (§4.I).
pub mod hd_command {
    pub const STATUS: u8 = 0x00;
    pub const READ_BLOCK: u8 = 0x01;
    pub const WRITE_BLOCK: u8 = 0x02;
}

/// SmartPort command codes, the first byte following the trap index (§4.I,
/// the 1984 SmartPort technote convention).
pub mod sp_command {
    pub const STATUS: u8 = 0x00;
    pub const READ_BLOCK: u8 = 0x01;
    pub const WRITE_BLOCK: u8 = 0x02;
}

/// SmartPort `STATUS` sub-codes (§4.I "Get Status (codes 0 and 3)").
pub mod status_code {
    /// Device status byte only.
    pub const DEVICE_STATUS: u8 = 0x00;
    /// Device Info Block: device status byte plus block count and a name.
    pub const DEVICE_INFO_BLOCK: u8 = 0x03;
}

/// Error codes returned in `A` with carry set (§4.I).
pub mod error_code {
    /// Unsupported status/control code.
    pub const BAD_STATUS: u8 = 0x21;
    /// Unit number out of range or unattached.
    pub const BAD_UNIT: u8 = 0x28;
    /// Read/write failed against the backing device.
    pub const IO_ERROR: u8 = 0x2D;
    /// No device attached to the requested unit.
    pub const NO_DEVICE: u8 = 0x2F;
}

/// A 512-byte-addressable backing store. `mii_host`/a board binary attach a
/// concrete implementation per mounted HD image; the card itself never
/// touches storage directly (§1 "external collaborators").
pub trait BlockDevice {
    fn block_count(&self) -> u32;
    fn read_block(&mut self, block: u32, buf: &mut [u8; BLOCK_SIZE]) -> Result<()>;
    fn write_block(&mut self, block: u32, data: &[u8; BLOCK_SIZE]) -> Result<()>;
}

/// A whole HD image held resident (desktop tooling, or a board with enough
/// RAM for a small volume); real boards would more likely stream through a
/// `BlockStorage`-backed adapter instead, but the card only needs the
/// narrower [`BlockDevice`] seam.
pub struct MemoryBlockDevice {
    data: Vec<u8>,
    read_only: bool,
}

impl MemoryBlockDevice {
    pub fn new(data: Vec<u8>, read_only: bool) -> Self {
        let padded_len = (data.len() + BLOCK_SIZE - 1) / BLOCK_SIZE * BLOCK_SIZE;
        let mut data = data;
        data.resize(padded_len, 0);
        MemoryBlockDevice { data, read_only }
    }
}

impl BlockDevice for MemoryBlockDevice {
    fn block_count(&self) -> u32 {
        (self.data.len() / BLOCK_SIZE) as u32
    }

    fn read_block(&mut self, block: u32, buf: &mut [u8; BLOCK_SIZE]) -> Result<()> {
        let off = block as usize * BLOCK_SIZE;
        if off + BLOCK_SIZE > self.data.len() {
            return Err(MiiError::Io { path: String::new(), reason: format!("block {block} out of range") });
        }
        buf.copy_from_slice(&self.data[off..off + BLOCK_SIZE]);
        Ok(())
    }

    fn write_block(&mut self, block: u32, value: &[u8; BLOCK_SIZE]) -> Result<()> {
        if self.read_only {
            return Err(MiiError::Io { path: String::new(), reason: "device is read-only".into() });
        }
        let off = block as usize * BLOCK_SIZE;
        if off + BLOCK_SIZE > self.data.len() {
            return Err(MiiError::Io { path: String::new(), reason: format!("block {block} out of range") });
        }
        self.data[off..off + BLOCK_SIZE].copy_from_slice(value);
        Ok(())
    }
}

/// Guest address ranges that back the text/lores and hi-res display pages
/// (both halves), used only to decide whether a block transfer needs to
/// mark the video renderer dirty (§4.D, §8 scenario 6: "a SmartPort read
/// landing in hi-res page 2 redraws the picture next frame").
const VIDEO_RANGES: [(u16, u16); 2] = [(0x0400, 0x0C00), (0x2000, 0x6000)];

fn touches_video_ram(addr: u16, len: u16) -> bool {
    let end = addr.saturating_add(len);
    VIDEO_RANGES.iter().any(|&(lo, hi)| addr < hi && end > lo)
}

struct BlockCardState {
    devices: [Option<Box<dyn BlockDevice>>; MII_SM_DRIVE_COUNT],
    video_dirty: bool,
}

/// Owns the attached devices; cheap to clone (an `Rc`), so both the HD trap
/// closure and the SmartPort trap closure installed by
/// [`BlockCard::install_traps`] share one instance.
#[derive(Clone)]
pub struct BlockCard(Rc<RefCell<BlockCardState>>);

impl BlockCard {
    pub fn new() -> Self {
        BlockCard(Rc::new(RefCell::new(BlockCardState {
            devices: [None, None],
            video_dirty: false,
        })))
    }

    /// Attaches a device to `unit` (0-based). Replaces whatever was there.
    pub fn attach(&self, unit: usize, device: Box<dyn BlockDevice>) {
        if unit < MII_SM_DRIVE_COUNT {
            self.0.borrow_mut().devices[unit] = Some(device);
        }
    }

    pub fn detach(&self, unit: usize) {
        if unit < MII_SM_DRIVE_COUNT {
            self.0.borrow_mut().devices[unit] = None;
        }
    }

    /// Checks and clears the "a block transfer touched video RAM" flag;
    /// `Emu` polls this once per frame and calls `video.mark_dirty()`.
    pub fn take_video_dirty(&self) -> bool {
        std::mem::replace(&mut self.0.borrow_mut().video_dirty, false)
    }

    /// Installs the HD trap at `hd_trap_index` and the SmartPort trap at
    /// `sp_trap_index` (§4.C `BRK <index>` convention).
    pub fn install_traps<S: SwapBackend + 'static>(
        &self,
        bus: &mut Bus<S>,
        hd_trap_index: u8,
        sp_trap_index: u8,
    ) {
        let hd_state = self.0.clone();
        bus.install_trap(
            hd_trap_index,
            Box::new(move |regs, mem| hd_trap(&hd_state, regs, mem)),
        );
        let sp_state = self.0.clone();
        bus.install_trap(
            sp_trap_index,
            Box::new(move |regs, mem| smartport_trap(&sp_state, regs, mem)),
        );
    }
}

impl Default for BlockCard {
    fn default() -> Self {
        Self::new()
    }
}

fn set_result(regs: &mut Registers, error: u8) {
    regs.a = error;
    regs.set_flag(flags::CARRY, error != 0);
}

fn read_word(mem: &mut dyn TrapMemory, addr: u16) -> u16 {
    let lo = mem.trap_read(addr) as u16;
    let hi = mem.trap_read(addr.wrapping_add(1)) as u16;
    lo | (hi << 8)
}

fn do_read_block(
    state: &Rc<RefCell<BlockCardState>>,
    mem: &mut dyn TrapMemory,
    unit: usize,
    block: u32,
    buffer: u16,
) -> u8 {
    if unit >= MII_SM_DRIVE_COUNT {
        return error_code::BAD_UNIT;
    }
    let mut data = [0u8; BLOCK_SIZE];
    let result = {
        let mut s = state.borrow_mut();
        match &mut s.devices[unit] {
            None => return error_code::NO_DEVICE,
            Some(dev) => dev.read_block(block, &mut data),
        }
    };
    if result.is_err() {
        return error_code::IO_ERROR;
    }
    for (i, byte) in data.iter().enumerate() {
        mem.trap_write(buffer.wrapping_add(i as u16), *byte);
    }
    if touches_video_ram(buffer, BLOCK_SIZE as u16) {
        state.borrow_mut().video_dirty = true;
    }
    0
}

fn do_write_block(
    state: &Rc<RefCell<BlockCardState>>,
    mem: &mut dyn TrapMemory,
    unit: usize,
    block: u32,
    buffer: u16,
) -> u8 {
    if unit >= MII_SM_DRIVE_COUNT {
        return error_code::BAD_UNIT;
    }
    let mut data = [0u8; BLOCK_SIZE];
    for (i, byte) in data.iter_mut().enumerate() {
        *byte = mem.trap_read(buffer.wrapping_add(i as u16));
    }
    let mut s = state.borrow_mut();
    match &mut s.devices[unit] {
        None => error_code::NO_DEVICE,
        Some(dev) => {
            if dev.write_block(block, &data).is_err() {
                error_code::IO_ERROR
            } else {
                0
            }
        }
    }
}

fn do_status(state: &Rc<RefCell<BlockCardState>>, unit: usize, status_list: u16, code: u8, mem: &mut dyn TrapMemory) -> u8 {
    if unit >= MII_SM_DRIVE_COUNT {
        return error_code::BAD_UNIT;
    }
    let s = state.borrow();
    let count = match &s.devices[unit] {
        None => return error_code::NO_DEVICE,
        Some(dev) => dev.block_count(),
    };
    match code {
        status_code::DEVICE_STATUS => {
            // bit0 set = online/non-removable block device, per SmartPort convention.
            mem.trap_write(status_list, 0x01);
            0
        }
        status_code::DEVICE_INFO_BLOCK => {
            mem.trap_write(status_list, 0x01);
            mem.trap_write(status_list.wrapping_add(1), (count & 0xFF) as u8);
            mem.trap_write(status_list.wrapping_add(2), ((count >> 8) & 0xFF) as u8);
            mem.trap_write(status_list.wrapping_add(3), ((count >> 16) & 0xFF) as u8);
            0
        }
        _ => error_code::BAD_STATUS,
    }
}

/// HD trap: parameters sit in zero page `$42`-`$47` (command, unit, buffer
/// lo/hi, block lo/hi), the classic ProDOS-era "RAM card with a disk"
/// firmware convention.
fn hd_trap(state: &Rc<RefCell<BlockCardState>>, regs: &mut Registers, mem: &mut dyn TrapMemory) {
    let command = mem.trap_read(0x42);
    let unit = mem.trap_read(0x43) as usize;
    let buffer = read_word(mem, 0x44);
    let block = read_word(mem, 0x46) as u32;

    let error = match command {
        hd_command::STATUS => do_status(state, unit, buffer, status_code::DEVICE_INFO_BLOCK, mem),
        hd_command::READ_BLOCK => do_read_block(state, mem, unit, block, buffer),
        hd_command::WRITE_BLOCK => do_write_block(state, mem, unit, block, buffer),
        _ => error_code::BAD_STATUS,
    };
    set_result(regs, error);
}

/// SmartPort trap: the call convention is `BRK <index>` followed inline by
/// a command byte and a little-endian pointer to the parameter list (the
/// same shape as a real `JSR $C65C` call's operand bytes). `Emu` advances
/// `regs.pc` past the trap's own index byte before invoking this (§4.C); we
/// advance it the further 3 bytes for our own inline operands before
/// returning, so execution resumes right after the parameter-list pointer.
fn smartport_trap(state: &Rc<RefCell<BlockCardState>>, regs: &mut Registers, mem: &mut dyn TrapMemory) {
    let command = mem.trap_read(regs.pc);
    let paramlist = read_word(mem, regs.pc.wrapping_add(1));
    regs.pc = regs.pc.wrapping_add(3);

    let pcount = mem.trap_read(paramlist);
    let unit = mem.trap_read(paramlist.wrapping_add(1)) as usize;
    // Unit is 1-based in the real SmartPort convention (0 addresses the
    // host itself); the card only answers 1..=MII_SM_DRIVE_COUNT.
    let unit0 = unit.wrapping_sub(1);

    let error = match command {
        // Unit 0 addresses the host bus itself rather than a drive (§4.I
        // "unit=0 returns drive count"): Get Status reports how many
        // logical units this card answers for, with no device attached.
        sp_command::STATUS if pcount >= 3 && unit == 0 => {
            let status_list = read_word(mem, paramlist.wrapping_add(2));
            mem.trap_write(status_list, MII_SM_DRIVE_COUNT as u8);
            0
        }
        sp_command::STATUS if pcount >= 3 => {
            let status_list = read_word(mem, paramlist.wrapping_add(2));
            let code = mem.trap_read(paramlist.wrapping_add(4));
            do_status(state, unit0, status_list, code, mem)
        }
        sp_command::READ_BLOCK if pcount >= 4 => {
            let buffer = read_word(mem, paramlist.wrapping_add(2));
            let block = read_word(mem, paramlist.wrapping_add(4)) as u32;
            do_read_block(state, mem, unit0, block, buffer)
        }
        sp_command::WRITE_BLOCK if pcount >= 4 => {
            let buffer = read_word(mem, paramlist.wrapping_add(2));
            let block = read_word(mem, paramlist.wrapping_add(4)) as u32;
            do_write_block(state, mem, unit0, block, buffer)
        }
        _ => error_code::BAD_STATUS,
    };
    set_result(regs, error);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeMem {
        ram: [u8; 65536],
    }
    impl FakeMem {
        fn new() -> Self {
            FakeMem { ram: [0u8; 65536] }
        }
    }
    impl TrapMemory for FakeMem {
        fn trap_read(&mut self, addr: u16) -> u8 {
            self.ram[addr as usize]
        }
        fn trap_write(&mut self, addr: u16, value: u8) {
            self.ram[addr as usize] = value;
        }
    }

    fn device_with_pattern() -> Box<dyn BlockDevice> {
        let mut data = vec![0u8; BLOCK_SIZE * 4];
        for (i, b) in data.iter_mut().enumerate() {
            *b = (i % 256) as u8;
        }
        Box::new(MemoryBlockDevice::new(data, false))
    }

    #[test]
    fn hd_trap_reads_a_block_into_guest_memory() {
        let card = BlockCard::new();
        card.attach(0, device_with_pattern());
        let mut mem = FakeMem::new();
        mem.ram[0x42] = hd_command::READ_BLOCK;
        mem.ram[0x43] = 0;
        mem.ram[0x44] = 0x00;
        mem.ram[0x45] = 0x60; // buffer $6000
        mem.ram[0x46] = 1;
        mem.ram[0x47] = 0;
        let mut regs = Registers::default();
        hd_trap(&card.0, &mut regs, &mut mem);
        assert_eq!(regs.a, 0);
        assert!(!regs.get_flag(flags::CARRY));
        assert_eq!(mem.ram[0x6000], 0);
        assert_eq!(mem.ram[0x6001], 1);
    }

    #[test]
    fn hd_trap_unattached_unit_reports_no_device() {
        let card = BlockCard::new();
        let mut mem = FakeMem::new();
        mem.ram[0x42] = hd_command::READ_BLOCK;
        let mut regs = Registers::default();
        hd_trap(&card.0, &mut regs, &mut mem);
        assert_eq!(regs.a, error_code::NO_DEVICE);
        assert!(regs.get_flag(flags::CARRY));
    }

    #[test]
    fn reading_into_hires_page_marks_video_dirty() {
        let card = BlockCard::new();
        card.attach(0, device_with_pattern());
        let mut mem = FakeMem::new();
        mem.ram[0x42] = hd_command::READ_BLOCK;
        mem.ram[0x44] = 0x00;
        mem.ram[0x45] = 0x20; // buffer $2000, inside hi-res page 1
        let mut regs = Registers::default();
        hd_trap(&card.0, &mut regs, &mut mem);
        assert!(card.take_video_dirty());
        assert!(!card.take_video_dirty());
    }

    #[test]
    fn smartport_read_block_follows_the_inline_calling_convention() {
        let card = BlockCard::new();
        card.attach(0, device_with_pattern());
        let mut mem = FakeMem::new();
        // Trap dispatch has already consumed the index byte; PC points at
        // the command byte that follows it.
        let trap_pc = 0x0300u16;
        mem.ram[trap_pc as usize] = sp_command::READ_BLOCK;
        mem.ram[trap_pc as usize + 1] = 0x00;
        mem.ram[trap_pc as usize + 2] = 0x04; // paramlist at $0400
        let paramlist = 0x0400u16;
        mem.ram[paramlist as usize] = 3; // pcount
        mem.ram[paramlist as usize + 1] = 1; // unit 1 (=> index 0)
        mem.ram[paramlist as usize + 2] = 0x00;
        mem.ram[paramlist as usize + 3] = 0x70; // buffer $7000
        mem.ram[paramlist as usize + 4] = 2; // block 2
        mem.ram[paramlist as usize + 5] = 0;

        let mut regs = Registers::default();
        regs.pc = trap_pc;
        smartport_trap(&card.0, &mut regs, &mut mem);

        assert_eq!(regs.a, 0);
        assert_eq!(regs.pc, trap_pc + 3);
        assert_eq!(mem.ram[0x7000], 0);
        assert_eq!(mem.ram[0x7001], 1);
    }

    #[test]
    fn smartport_status_reports_block_count_in_the_device_info_block() {
        let card = BlockCard::new();
        card.attach(0, device_with_pattern()); // 4 blocks
        let mut mem = FakeMem::new();
        let trap_pc = 0x0300u16;
        mem.ram[trap_pc as usize] = sp_command::STATUS;
        mem.ram[trap_pc as usize + 1] = 0x00;
        mem.ram[trap_pc as usize + 2] = 0x04;
        let paramlist = 0x0400u16;
        mem.ram[paramlist as usize] = 3;
        mem.ram[paramlist as usize + 1] = 1;
        mem.ram[paramlist as usize + 2] = 0x00;
        mem.ram[paramlist as usize + 3] = 0x50; // status list $5000
        mem.ram[paramlist as usize + 4] = status_code::DEVICE_INFO_BLOCK;

        let mut regs = Registers::default();
        regs.pc = trap_pc;
        smartport_trap(&card.0, &mut regs, &mut mem);

        assert_eq!(regs.a, 0);
        assert_eq!(mem.ram[0x5001], 4);
    }

    #[test]
    fn smartport_status_on_unit_zero_reports_the_card_drive_count() {
        let card = BlockCard::new(); // no devices attached at all
        let mut mem = FakeMem::new();
        let trap_pc = 0x0300u16;
        mem.ram[trap_pc as usize] = sp_command::STATUS;
        mem.ram[trap_pc as usize + 1] = 0x00;
        mem.ram[trap_pc as usize + 2] = 0x04;
        let paramlist = 0x0400u16;
        mem.ram[paramlist as usize] = 3;
        mem.ram[paramlist as usize + 1] = 0; // unit 0: the host bus itself
        mem.ram[paramlist as usize + 2] = 0x00;
        mem.ram[paramlist as usize + 3] = 0x50;

        let mut regs = Registers::default();
        regs.pc = trap_pc;
        smartport_trap(&card.0, &mut regs, &mut mem);

        assert_eq!(regs.a, 0);
        assert_eq!(mem.ram[0x5000], MII_SM_DRIVE_COUNT as u8);
    }

    #[test]
    fn write_block_rejected_by_a_read_only_device() {
        let card = BlockCard::new();
        card.attach(0, Box::new(MemoryBlockDevice::new(vec![0u8; BLOCK_SIZE], true)));
        let mut mem = FakeMem::new();
        mem.ram[0x42] = hd_command::WRITE_BLOCK;
        mem.ram[0x43] = 0;
        mem.ram[0x44] = 0x00;
        mem.ram[0x45] = 0x60;
        let mut regs = Registers::default();
        hd_trap(&card.0, &mut regs, &mut mem);
        assert_eq!(regs.a, error_code::IO_ERROR);
        assert!(regs.get_flag(flags::CARRY));
    }
}
