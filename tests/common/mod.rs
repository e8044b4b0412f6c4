//! Shared fixtures for the crate-level integration tests (SPEC_FULL.md §1
//! "crate-level integration tests live under `tests/`, one file per
//! end-to-end scenario in §8"). Each scenario file wires these in-memory
//! `SwapBackend`/`BlockStorage` stand-ins into a real [`mii_core::emu::Emu`]
//! rather than reaching into crate internals, the same boundary a desktop
//! or board host would cross.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use mii_core::disk::convert::DSK_SIZE;
use mii_core::emu::{AudioSink, Emu, FrameSink};
use mii_core::error::{MiiError, Result};
use mii_core::loader::{BlockStorage, DirEntry};
use mii_core::vram::{SwapBackend, Vram, PAGE_SIZE};

/// An in-memory swap "file" (§4.A) — a desktop/board swap file is just
/// 256 pages addressed by guest page number; `HashMap` stands in for the
/// SD-backed file a real `StdSwapFile` would use.
#[derive(Clone)]
pub struct MemSwap(Rc<RefCell<HashMap<u8, [u8; PAGE_SIZE]>>>);

impl MemSwap {
    pub fn new() -> Self {
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

/// An in-memory removable-storage stand-in (§4.J "mounts the removable
/// storage (FAT)") — `/apple/*.dsk` image files plus their `.bdsk` side
/// files, all held in a map rather than on an SD card.
#[derive(Default)]
pub struct MemStorage {
    pub files: HashMap<String, Vec<u8>>,
}

impl BlockStorage for MemStorage {
    fn read_file(&mut self, path: &str) -> Result<Vec<u8>> {
        self.files.get(path).cloned().ok_or_else(|| MiiError::Io {
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
    fn list_dir(&mut self, _path: &str) -> Result<Vec<DirEntry>> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
pub struct VecFrameSink(pub Vec<u8>);
impl FrameSink for VecFrameSink {
    fn present(&mut self, frame: &[u8]) {
        self.0 = frame.to_vec();
    }
}

#[derive(Default)]
pub struct VecAudioSink(pub Vec<i16>);
impl AudioSink for VecAudioSink {
    fn push_samples(&mut self, interleaved: &[i16]) {
        self.0.extend_from_slice(interleaved);
    }
}

pub fn new_emu() -> Emu<MemSwap, MemStorage> {
    let main = Vram::new(256, MemSwap::new()).unwrap();
    Emu::new(main, None, true, 44_100, 0, MemStorage::default())
}

/// A blank, correctly-sized DSK image (§6 "exactly 35 * 16 * 256 bytes"),
/// every sector filled with its own track/sector number so a converted
/// BDSK can be checked sector-by-sector instead of just by length.
pub fn patterned_dsk_image() -> Vec<u8> {
    let mut data = vec![0u8; DSK_SIZE];
    for track in 0..35usize {
        for sector in 0..16usize {
            let off = (track * 16 + sector) * 256;
            for i in 0..256 {
                data[off + i] = (track as u8).wrapping_mul(16).wrapping_add(sector as u8).wrapping_add(i as u8);
            }
        }
    }
    data
}
