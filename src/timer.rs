//! Cooperative timer wheel (§4.E).
//!
//! Timers are cycle-denominated and cooperative: every executed CPU
//! instruction decrements each active timer's `remaining` by the
//! instruction's cycle cost (scaled by the CPU's `speed`), and a timer
//! whose `remaining` reaches zero or below fires, with its return value
//! becoming the new `remaining`. Grounded on the registration/"fires in
//! order" bookkeeping pattern of a scanline/cycle timer list (the kind of
//! thing `gregbell-lib6502`'s C64 `system.rs` keeps for VIC raster and CIA
//! timers), generalised here to arbitrary named callbacks rather than a
//! fixed set of hardware timers.

/// Implemented by whatever owns the timers (`Emu`) so a callback can reach
/// video/audio/disk state without the wheel itself knowing their types.
pub trait TimerTarget {
    fn fire(&mut self, id: TimerId, timer_name: &'static str) -> i64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(usize);

struct TimerEntry {
    remaining: i64,
    name: &'static str,
    enabled: bool,
}

/// §3 "Timer entry": `{remaining, callback, name}`. The callback itself is
/// not stored here — `fire` is dispatched back through `TimerTarget` so the
/// wheel stays independent of what it's driving (VBL, disk LSS tick, audio
/// refill).
#[derive(Default)]
pub struct TimerWheel {
    entries: Vec<TimerEntry>,
}

impl TimerWheel {
    pub fn new() -> Self {
        TimerWheel { entries: Vec::new() }
    }

    /// Registers a new timer, in registration order (§4.E same-cycle tie
    /// break is by this order). Returns the id used to reference it later.
    pub fn register(&mut self, name: &'static str, initial_remaining: i64) -> TimerId {
        let id = self.entries.len();
        self.entries.push(TimerEntry {
            remaining: initial_remaining,
            name,
            enabled: initial_remaining != 0,
        });
        TimerId(id)
    }

    /// §3 invariant: `remaining == 0` disables the timer until this is
    /// called with a positive value.
    pub fn set(&mut self, id: TimerId, remaining: i64) {
        let e = &mut self.entries[id.0];
        e.remaining = remaining;
        e.enabled = remaining != 0;
    }

    pub fn remaining(&self, id: TimerId) -> i64 {
        self.entries[id.0].remaining
    }

    /// Smallest `remaining` among active timers (SPEC_FULL.md §4
    /// "vapor-read timer coupling") — the bus's vapor-read path folds
    /// this into the byte it fabricates for an unmapped soft-switch read.
    pub fn nearest_remaining(&self) -> i64 {
        self.entries
            .iter()
            .filter(|e| e.enabled)
            .map(|e| e.remaining)
            .min()
            .unwrap_or(0)
    }

    /// Advances every active timer by `cycles` (already scaled by CPU
    /// speed by the caller) and fires any whose `remaining` reached zero
    /// or below, in registration order. `target` is whatever owns the
    /// emulator state the callbacks mutate.
    pub fn tick<T: TimerTarget>(&mut self, cycles: u32, target: &mut T) {
        if cycles == 0 {
            return;
        }
        for i in 0..self.entries.len() {
            if !self.entries[i].enabled {
                continue;
            }
            self.entries[i].remaining -= cycles as i64;
            while self.entries[i].enabled && self.entries[i].remaining <= 0 {
                let name = self.entries[i].name;
                let next = target.fire(TimerId(i), name);
                let e = &mut self.entries[i];
                e.remaining += next;
                e.enabled = next != 0;
                if next <= 0 {
                    // A callback returning <= 0 disables immediately
                    // rather than looping forever on a catch-up debt.
                    e.enabled = false;
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        fires: Vec<(usize, &'static str)>,
    }
    impl TimerTarget for Counter {
        fn fire(&mut self, id: TimerId, name: &'static str) -> i64 {
            self.fires.push((id.0, name));
            100
        }
    }

    #[test]
    fn fires_in_registration_order_on_same_cycle() {
        let mut wheel = TimerWheel::new();
        let a = wheel.register("a", 10);
        let b = wheel.register("b", 10);
        let mut target = Counter { fires: Vec::new() };
        wheel.tick(10, &mut target);
        assert_eq!(target.fires, vec![(a.0, "a"), (b.0, "b")]);
    }

    #[test]
    fn nearest_remaining_ignores_disabled_timers() {
        let mut wheel = TimerWheel::new();
        wheel.register("disabled", 0);
        let b = wheel.register("b", 40);
        assert_eq!(wheel.nearest_remaining(), 40);
        let _ = b;
    }

    #[test]
    fn zero_remaining_disables_until_set() {
        let mut wheel = TimerWheel::new();
        let id = wheel.register("t", 0);
        let mut target = Counter { fires: Vec::new() };
        wheel.tick(1_000_000, &mut target);
        assert!(target.fires.is_empty());
        wheel.set(id, 5);
        wheel.tick(5, &mut target);
        assert_eq!(target.fires.len(), 1);
    }
}
