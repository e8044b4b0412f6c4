//! Floppy drive (§3 "Floppy drive", §4.H "Head model" / "Random noise
//! track").
//!
//! Grounded on the teacher's `FloppyDrive`/`Disk2InterfaceCard` stepper and
//! spin-down bookkeeping in `a2rs/src/disk.rs`, rebuilt around the spec's
//! bit-level `curr_track_data` cache (only the current track's bitstream is
//! held resident; `tracks[]` holds the rest) instead of the teacher's
//! fully-resident per-track NIB buffers.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use super::track::{Track, MAX_TRACK_BITS};

/// Quarter-track positions: 160 per §3, physical tracks at `4*N`.
pub const QUARTER_TRACKS: usize = 160;
pub const PHYSICAL_TRACKS: usize = 35;

/// Sentinel in `track_id[]` for a quarter-track with no real data backing
/// it — reads return LFSR noise (§4.H "Random noise track").
pub const NOISE: u8 = 0xFF;

pub const BIT_TIMING: u32 = 32;

pub struct Drive {
    pub track_id: [u8; QUARTER_TRACKS],
    tracks: Vec<Track>,
    /// Only the current track's bitstream is resident; §3 invariant: "at
    /// most one track's bytes reside in `curr_track_data`".
    current: Track,
    current_track_index: Option<u8>,
    pub motor: bool,
    /// 4-bit stepper phase energization mask (bit N = phase N on).
    stepper: u8,
    pub qtrack: usize,
    pub bit_position: u32,
    pub write_protected: bool,
    pub seed_dirty: bool,
    pub seed_saved: bool,
    noise_rng: StdRng,
    random_position: u64,
}

impl Drive {
    pub fn new(noise_seed: u64) -> Self {
        let mut track_id = [NOISE; QUARTER_TRACKS];
        for phys in 0..PHYSICAL_TRACKS {
            track_id[phys * 4] = phys as u8;
        }
        Drive {
            track_id,
            tracks: vec![Track::empty(); PHYSICAL_TRACKS],
            current: Track::empty(),
            current_track_index: None,
            motor: false,
            stepper: 0,
            qtrack: 0,
            bit_position: 0,
            write_protected: false,
            seed_dirty: false,
            seed_saved: true,
            noise_rng: StdRng::seed_from_u64(noise_seed),
            random_position: 0,
        }
    }

    pub fn tracks_mut(&mut self) -> &mut [Track] {
        &mut self.tracks
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Loads `track_id[qtrack]`'s bitstream into `curr_track_data`, first
    /// flushing whatever was there into `self.tracks` if it was dirty
    /// (§3 invariant, §4.H "Track write-back"). Returns the flushed
    /// track's physical index and bitstream so the caller can persist it
    /// to the mounted BDSK file; `None` if nothing needed flushing.
    fn swap_in_current_track(&mut self) -> Option<(u8, Track)> {
        let flushed = if let Some(prev) = self.current_track_index {
            if self.current.dirty {
                self.current.dirty = false;
                self.tracks[prev as usize] = self.current.clone();
                Some((prev, self.current.clone()))
            } else {
                None
            }
        } else {
            None
        };

        let phys = self.track_id[self.qtrack];
        if phys == NOISE {
            self.current = Track::empty();
            self.current_track_index = None;
        } else {
            self.current = self.tracks[phys as usize].clone();
            self.current_track_index = Some(phys);
        }
        self.bit_position = self.bit_position % self.current.bit_count().max(1);
        flushed
    }

    /// Re-derives `current`/`current_track_index` from `track_id[qtrack]`,
    /// flushing whatever was previously resident if it was dirty. Used by
    /// the loader after a mount/eject to (re)populate the head's current
    /// track without going through `set_phase`'s stepping logic.
    pub fn reload_current_track(&mut self) -> Option<(u8, Track)> {
        self.swap_in_current_track()
    }

    /// Engages/disengages stepper `phase` (0..=3). Direction follows the
    /// standard Disk II stepper-phase table: a low-to-high transition on
    /// phase `i` moves `qtrack` by `+1` when `i == (qtrack + 1) mod 4`, by
    /// `-1` when `i == (qtrack + 3) mod 4`, and not at all otherwise.
    /// Returns a flushed track (see `swap_in_current_track`) when
    /// stepping moves off a dirty one.
    pub fn set_phase(&mut self, phase: u8, on: bool) -> Option<(u8, Track)> {
        if !on {
            self.stepper &= !(1 << phase);
            return None;
        }
        let was_on = self.stepper & (1 << phase) != 0;
        self.stepper |= 1 << phase;
        if was_on {
            return None;
        }

        let current_phase = (self.qtrack % 4) as u8;
        let direction = if phase == (current_phase + 1) % 4 {
            1i32
        } else if phase == (current_phase + 3) % 4 {
            -1i32
        } else {
            0i32
        };
        if direction == 0 {
            return None;
        }
        let new_q = self.qtrack as i32 + direction;
        // §8 boundary: qtrack stays within [0, 139] (35 tracks * 4).
        self.qtrack = new_q.clamp(0, (QUARTER_TRACKS - 1) as i32) as usize;
        self.swap_in_current_track()
    }

    /// One LSS tick's worth of head advance (§4.H "bit_position advances
    /// ... by bit_timing"). Returns the bit currently under the head.
    pub fn read_head_bit(&mut self) -> bool {
        if self.current_track_index.is_some() {
            let bit = self.current.read_bit(self.bit_position);
            self.advance_head();
            bit
        } else {
            self.advance_head();
            self.noise_bit()
        }
    }

    pub fn write_head_bit(&mut self, value: bool) {
        if self.current_track_index.is_some() {
            self.current.write_bit(self.bit_position, value);
            self.seed_dirty = true;
            self.seed_saved = false;
        }
        self.advance_head();
    }

    fn advance_head(&mut self) {
        self.bit_position = self.bit_position.wrapping_add(1);
        let count = self.current.bit_count().max(1);
        if self.bit_position >= count {
            self.bit_position %= count;
        }
        self.random_position = self.random_position.wrapping_add(1);
    }

    /// LFSR-style synthetic noise for unformatted quarter-tracks (§4.H).
    fn noise_bit(&mut self) -> bool {
        if self.random_position % BIT_TIMING as u64 == 0 {
            (self.noise_rng.next_u32() & 1) != 0
        } else {
            false
        }
    }

    pub fn current_track_physical(&self) -> Option<u8> {
        self.current_track_index
    }

    pub fn current_track(&self) -> &Track {
        &self.current
    }

    pub fn current_track_mut(&mut self) -> &mut Track {
        self.current.dirty = true;
        &mut self.current
    }

    /// Flushes the current track unconditionally (used on eject / mount
    /// swap), returning its physical index and data if it was dirty, for
    /// the caller to persist to the mounted BDSK file.
    pub fn flush_current(&mut self) -> Option<(u8, Track)> {
        if let (Some(phys), true) = (self.current_track_index, self.current.dirty) {
            self.current.dirty = false;
            self.tracks[phys as usize] = self.current.clone();
            Some((phys, self.current.clone()))
        } else {
            None
        }
    }

    /// Replaces track `phys`'s stored bitstream (used when loading a BDSK
    /// file); if it's the currently-resident track, also refreshes
    /// `curr_track_data`.
    pub fn install_track(&mut self, phys: usize, track: Track) {
        self.tracks[phys] = track.clone();
        if self.current_track_index == Some(phys as u8) {
            self.current = track;
        }
    }

    pub fn reset_noise_position(&mut self) {
        self.random_position = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qtrack_stays_within_bounds_at_edges() {
        let mut d = Drive::new(1);
        d.qtrack = 0;
        for _ in 0..10 {
            d.set_phase(2, true);
            d.set_phase(2, false);
        }
        assert!(d.qtrack <= QUARTER_TRACKS - 1);

        d.qtrack = QUARTER_TRACKS - 1;
        for _ in 0..10 {
            d.set_phase(1, true);
            d.set_phase(1, false);
        }
        assert!(d.qtrack <= QUARTER_TRACKS - 1);
    }

    #[test]
    fn stepping_follows_the_phase_table() {
        // At qtrack 0, energizing phase 1 (= (0+1)%4) steps inward by one;
        // energizing phase 3 (= (0+3)%4) from there steps back out.
        let mut d = Drive::new(1);
        d.qtrack = 0;
        d.set_phase(1, true);
        assert_eq!(d.qtrack, 1);
        d.set_phase(1, false);
        d.set_phase(0, true);
        // current_phase is now 1 (= 1 % 4); phase 0 == (1+3)%4, so -1.
        assert_eq!(d.qtrack, 0);
    }

    #[test]
    fn re_energizing_the_same_phase_without_toggling_off_is_a_no_op() {
        let mut d = Drive::new(1);
        d.qtrack = 0;
        d.set_phase(1, true);
        assert_eq!(d.qtrack, 1);
        // still on: a second "on" with no intervening "off" must not step again.
        d.set_phase(1, true);
        assert_eq!(d.qtrack, 1);
    }

    #[test]
    fn noise_track_read_never_panics() {
        let mut d = Drive::new(42);
        d.track_id[10] = NOISE;
        d.qtrack = 10;
        d.swap_in_current_track();
        for _ in 0..100 {
            let _ = d.read_head_bit();
        }
    }

    #[test]
    fn max_track_bits_matches_spec_ceiling() {
        assert_eq!(MAX_TRACK_BITS, 6656 * 8);
    }
}
