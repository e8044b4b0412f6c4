//! Disk II controller card (§3 "Disk controller", §4.H).
//!
//! Owns the LSS, up to two drives, and the `$C0n0..$C0nF` slot I/O decode
//! (phase control / motor / drive select / Q6 / Q7). Grounded on the
//! teacher's `Disk2InterfaceCard::io_read`/`io_write` register layout in
//! `a2rs/src/disk.rs`, rebuilt on top of the bit-level `Lss`/`Drive` pair
//! instead of the teacher's byte-at-a-time nibble image.

use super::drive::{Drive, BIT_TIMING};
use super::lss::{Lss, LssMode};
use super::track::Track;
use crate::bus::SlotIo;

/// How many LSS cycles fire per CPU cycle the host advances it by — the
/// sequencer runs at the card's own bit clock (§4.H), decoupled from the
/// CPU's cycle rate by this constant.
const LSS_CYCLES_PER_CPU_CYCLE: u32 = 4;

/// A track that left the head dirty — (drive index, physical track
/// number, bitstream), queued for the loader to persist to the mounted
/// BDSK file (§8 invariant 5). The controller only collects these; it
/// never touches storage itself.
pub struct FlushedTrack {
    pub drive: usize,
    pub physical_track: u8,
    pub data: Track,
}

pub struct DiskController {
    pub lss: Lss,
    pub drives: [Drive; 2],
    pub selected: usize,
    pending_bit_budget: u32,
    pending_flushes: Vec<FlushedTrack>,
}

impl DiskController {
    pub fn new() -> Self {
        DiskController {
            lss: Lss::new(),
            drives: [Drive::new(1), Drive::new(2)],
            selected: 0,
            pending_bit_budget: 0,
            pending_flushes: Vec::new(),
        }
    }

    /// Drains tracks that fell dirty off the head since the last call, for
    /// the loader to write back to the mounted BDSK file.
    pub fn take_pending_flushes(&mut self) -> Vec<FlushedTrack> {
        std::mem::take(&mut self.pending_flushes)
    }

    fn selected_drive(&mut self) -> &mut Drive {
        &mut self.drives[self.selected]
    }

    /// Advances the LSS by `cpu_cycles` worth of bit-clock ticks (§4.H
    /// "every emulator tick advances `bit_position` ... drives the LSS
    /// through as many state updates as match the target timing").
    pub fn run(&mut self, cpu_cycles: u32) {
        if !self.drives[self.selected].motor {
            return;
        }
        self.pending_bit_budget += cpu_cycles * LSS_CYCLES_PER_CPU_CYCLE;
        while self.pending_bit_budget >= BIT_TIMING {
            self.pending_bit_budget -= BIT_TIMING;
            let write_protect = self.drives[self.selected].write_protected;
            let pulse = if self.lss.mode.q7 {
                // write path: LSS shifts the write_register bit out, the
                // drive writes it onto the current track.
                let bit = (self.lss.data_register & 0x80) != 0;
                self.lss.tick(false, write_protect);
                self.drives[self.selected].write_head_bit(bit);
                continue;
            } else {
                self.drives[self.selected].read_head_bit()
            };
            self.lss.tick(pulse, write_protect);
        }
    }

}

impl Default for DiskController {
    fn default() -> Self {
        Self::new()
    }
}

impl SlotIo for DiskController {
    fn io_read(&mut self, reg: u8) -> u8 {
        self.io_access(reg, None)
    }

    fn io_write(&mut self, reg: u8, value: u8) {
        self.io_access(reg, Some(value));
    }
}

impl DiskController {
    fn io_access(&mut self, reg: u8, write_value: Option<u8>) -> u8 {
        match reg {
            0x0..=0x7 => {
                let phase = reg / 2;
                let on = reg % 2 == 1;
                let selected = self.selected;
                if let Some((physical_track, data)) = self.drives[selected].set_phase(phase, on) {
                    self.pending_flushes.push(FlushedTrack {
                        drive: selected,
                        physical_track,
                        data,
                    });
                }
                0
            }
            0x8 => {
                self.selected_drive().motor = false;
                0
            }
            0x9 => {
                self.selected_drive().motor = true;
                self.selected_drive().reset_noise_position();
                0
            }
            0xA => {
                self.selected = 0;
                0
            }
            0xB => {
                self.selected = 1;
                0
            }
            0xC => {
                self.lss.mode = LssMode { q6: false, q7: self.lss.mode.q7 };
                self.lss.data_register
            }
            0xD => {
                self.lss.mode = LssMode { q6: true, q7: self.lss.mode.q7 };
                if let Some(v) = write_value {
                    self.lss.write_register = v;
                }
                self.lss.data_register
            }
            0xE => {
                self.lss.mode = LssMode { q6: self.lss.mode.q6, q7: false };
                self.lss.data_register
            }
            0xF => {
                self.lss.mode = LssMode { q6: self.lss.mode.q6, q7: true };
                self.lss.data_register
            }
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drive_select_switches_active_drive() {
        let mut c = DiskController::new();
        assert_eq!(c.selected, 0);
        c.io_write(0xB, 0);
        assert_eq!(c.selected, 1);
        c.io_write(0xA, 0);
        assert_eq!(c.selected, 0);
    }

    #[test]
    fn motor_on_off_toggles_drive_motor() {
        let mut c = DiskController::new();
        c.io_write(0x9, 0);
        assert!(c.drives[0].motor);
        c.io_write(0x8, 0);
        assert!(!c.drives[0].motor);
    }

    #[test]
    fn q6_q7_select_lss_mode() {
        let mut c = DiskController::new();
        c.io_write(0xD, 0);
        c.io_write(0xF, 0);
        assert!(c.lss.mode.q6);
        assert!(c.lss.mode.q7);
        c.io_write(0xC, 0);
        assert!(!c.lss.mode.q6);
    }
}
