//! §8 end-to-end scenario 2 ("DSK mount and boot") and invariant 4 /
//! the `convert_dsk` round-trip property: mounting a 143_360-byte DSK
//! image writes a `232_988`-byte BDSK side file (§6), and every one of
//! the 35 tracks now resident on the drive decodes back to the original
//! 256-byte sectors exactly.

mod common;

use common::{patterned_dsk_image, MemStorage};

use mii_core::disk::convert::BDSK_FILE_LEN;
use mii_core::disk::DiskController;
use mii_core::loader::{Loader, MountMode};

#[test]
fn mounting_a_dsk_image_produces_a_bit_exact_bdsk_side_file() {
    let image = patterned_dsk_image();
    let mut storage = MemStorage::default();
    storage.files.insert("/apple/dos33master.dsk".to_string(), image.clone());

    let mut controller = DiskController::new();
    let mut loader = Loader::new();
    loader
        .mount(&mut storage, &mut controller, 0, "/apple/dos33master.dsk", false, MountMode::Reset)
        .unwrap();

    let bdsk = storage.files.get("/apple/dos33master.dsk.bdsk").expect("BDSK side file written");
    assert_eq!(bdsk.len(), BDSK_FILE_LEN);
    assert_eq!(bdsk.len(), 232_988);

    // Invariant 4 / round-trip: decoding every one of the 35 tracks now
    // resident on drive 0 back to flat DSK bytes reproduces the original
    // image exactly.
    let roundtrip = Loader::decode_to_dsk(&controller, 0, "/apple/dos33master.dsk").unwrap();
    assert_eq!(roundtrip, image);

    assert!(!controller.drives[0].write_protected);
}

#[test]
fn mounting_a_read_only_image_marks_the_drive_write_protected() {
    let image = patterned_dsk_image();
    let mut storage = MemStorage::default();
    storage.files.insert("/apple/readonly.dsk".to_string(), image);

    let mut controller = DiskController::new();
    let mut loader = Loader::new();
    loader
        .mount(&mut storage, &mut controller, 1, "/apple/readonly.dsk", true, MountMode::Reset)
        .unwrap();

    assert!(controller.drives[1].write_protected);
    // A read-only mount still produces the BDSK conversion in memory but
    // must not persist it (§4.H write-protect policy).
    assert!(!storage.files.contains_key("/apple/readonly.dsk.bdsk"));
}
