//! ROM registry (§4.K).
//!
//! Process-wide named lookup of ROM blobs: the main 65C02 ROM, the
//! character-generator ROM(s), and per-slot card firmware. ROMs
//! self-register at init (the host binary calls `RomRegistry::register`
//! after reading the blob off SD/the filesystem); the CPU bus and the
//! text renderer look them up by name rather than holding a path.

use std::collections::HashMap;

/// ROM classes, matching the `(class, name)` key from §4.K.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RomClass {
    Main,
    Video,
    Card,
}

#[derive(Default)]
pub struct RomRegistry {
    blobs: HashMap<(RomClass, String), Vec<u8>>,
}

impl RomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, class: RomClass, name: &str, data: Vec<u8>) {
        log::info!("rom: registered {:?}/{} ({} bytes)", class, name, data.len());
        self.blobs.insert((class, name.to_string()), data);
    }

    pub fn get(&self, class: RomClass, name: &str) -> Option<&[u8]> {
        self.blobs.get(&(class, name.to_string())).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_class_and_name() {
        let mut reg = RomRegistry::new();
        reg.register(RomClass::Main, "iiee", vec![1, 2, 3]);
        reg.register(RomClass::Video, "iiee_video", vec![4, 5]);
        assert_eq!(reg.get(RomClass::Main, "iiee"), Some(&[1, 2, 3][..]));
        assert_eq!(reg.get(RomClass::Video, "iiee_video"), Some(&[4, 5][..]));
        assert_eq!(reg.get(RomClass::Main, "missing"), None);
    }
}
