//! §8 end-to-end scenario 6 ("Trap-driven block read"): a real `BRK <index>`
//! instruction fetched and executed by the CPU drives the SmartPort trap,
//! distinct from `block.rs`'s own unit tests, which call `smartport_trap`
//! directly rather than through instruction dispatch.

mod common;

use common::MemSwap;

use mii_core::block::{sp_command, BlockCard, MemoryBlockDevice, BLOCK_SIZE, MII_SM_DRIVE_COUNT};
use mii_core::bus::Bus;
use mii_core::cpu::{Cpu, CpuType, MemoryBus};
use mii_core::vram::Vram;

const HD_TRAP_INDEX: u8 = 0x00;
const SP_TRAP_INDEX: u8 = 0x01;

fn device_image() -> Vec<u8> {
    let mut data = vec![0u8; BLOCK_SIZE * 4];
    for (i, b) in data.iter_mut().enumerate() {
        *b = (i % 256) as u8;
    }
    data
}

#[test]
fn a_real_brk_instruction_drives_a_smartport_block_read() {
    let main = Vram::new(256, MemSwap::new()).unwrap();
    let mut bus = Bus::new(main, None, true);

    let card = BlockCard::new();
    card.attach(0, Box::new(MemoryBlockDevice::new(device_image(), false)));
    card.install_traps(&mut bus, HD_TRAP_INDEX, SP_TRAP_INDEX);

    // Instruction stream: BRK, trap index, command, paramlist ptr (lo/hi).
    const TRAP_PC: u16 = 0x0300;
    const PARAMLIST: u16 = 0x0400;
    const BUFFER: u16 = 0x7000;
    bus.write(TRAP_PC, 0x00);
    bus.write(TRAP_PC + 1, SP_TRAP_INDEX);
    bus.write(TRAP_PC + 2, sp_command::READ_BLOCK);
    bus.write(TRAP_PC + 3, (PARAMLIST & 0xFF) as u8);
    bus.write(TRAP_PC + 4, (PARAMLIST >> 8) as u8);

    bus.write(PARAMLIST, 3); // pcount
    bus.write(PARAMLIST + 1, 1); // unit 1 -> card index 0
    bus.write(PARAMLIST + 2, (BUFFER & 0xFF) as u8);
    bus.write(PARAMLIST + 3, (BUFFER >> 8) as u8);
    bus.write(PARAMLIST + 4, 2); // block 2
    bus.write(PARAMLIST + 5, 0);

    let mut cpu = Cpu::new(CpuType::Cpu65C02);
    cpu.regs.pc = TRAP_PC;
    let cycles = cpu.step(&mut bus);

    // A: 0 / carry clear reports success; PC resumes right after the
    // paramlist pointer, five bytes past where the BRK itself sat.
    assert_eq!(cpu.regs.a, 0);
    assert_eq!(cpu.regs.pc, TRAP_PC + 5);
    assert!(cycles > 0);

    // Block 2 of the pattern starts at byte 1024, which is congruent to 0
    // mod 256, so the copied bytes read back 0, 1, 2, ...
    assert_eq!(bus.read(BUFFER), 0);
    assert_eq!(bus.read(BUFFER + 1), 1);
    assert_eq!(bus.read(BUFFER + 255), 255);

    // The transfer landed outside both video page ranges.
    assert!(!card.take_video_dirty());
}

#[test]
fn get_status_on_unit_zero_reports_the_card_drive_count_through_a_real_brk() {
    let main = Vram::new(256, MemSwap::new()).unwrap();
    let mut bus = Bus::new(main, None, true);

    let card = BlockCard::new();
    card.install_traps(&mut bus, HD_TRAP_INDEX, SP_TRAP_INDEX);

    const TRAP_PC: u16 = 0x0300;
    const PARAMLIST: u16 = 0x0400;
    const STATUS_LIST: u16 = 0x0500;
    bus.write(TRAP_PC, 0x00);
    bus.write(TRAP_PC + 1, SP_TRAP_INDEX);
    bus.write(TRAP_PC + 2, sp_command::STATUS);
    bus.write(TRAP_PC + 3, (PARAMLIST & 0xFF) as u8);
    bus.write(TRAP_PC + 4, (PARAMLIST >> 8) as u8);
    bus.write(PARAMLIST, 3); // pcount
    bus.write(PARAMLIST + 1, 0); // unit 0: the host bus itself
    bus.write(PARAMLIST + 2, (STATUS_LIST & 0xFF) as u8);
    bus.write(PARAMLIST + 3, (STATUS_LIST >> 8) as u8);

    let mut cpu = Cpu::new(CpuType::Cpu65C02);
    cpu.regs.pc = TRAP_PC;
    cpu.step(&mut bus);

    assert_eq!(cpu.regs.a, 0);
    assert_eq!(bus.read(STATUS_LIST), MII_SM_DRIVE_COUNT as u8);
}

#[test]
fn a_real_brk_instruction_reports_no_device_for_an_unattached_unit() {
    let main = Vram::new(256, MemSwap::new()).unwrap();
    let mut bus = Bus::new(main, None, true);

    let card = BlockCard::new();
    card.install_traps(&mut bus, HD_TRAP_INDEX, SP_TRAP_INDEX);

    const TRAP_PC: u16 = 0x0300;
    const PARAMLIST: u16 = 0x0400;
    bus.write(TRAP_PC, 0x00);
    bus.write(TRAP_PC + 1, SP_TRAP_INDEX);
    bus.write(TRAP_PC + 2, sp_command::READ_BLOCK);
    bus.write(TRAP_PC + 3, (PARAMLIST & 0xFF) as u8);
    bus.write(TRAP_PC + 4, (PARAMLIST >> 8) as u8);
    bus.write(PARAMLIST, 3);
    bus.write(PARAMLIST + 1, 1);
    bus.write(PARAMLIST + 2, 0x00);
    bus.write(PARAMLIST + 3, 0x70);
    bus.write(PARAMLIST + 4, 0);
    bus.write(PARAMLIST + 5, 0);

    let mut cpu = Cpu::new(CpuType::Cpu65C02);
    cpu.regs.pc = TRAP_PC;
    cpu.step(&mut bus);

    assert_eq!(cpu.regs.a, mii_core::block::error_code::NO_DEVICE);
}
