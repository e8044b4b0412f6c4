//! §8 end-to-end scenario 3 ("Disk swap during play"): mounting a second
//! image over a drive that's mid-spin with `MountMode::Preserve` must leave
//! the drive's mechanical state (motor, head position, stepper quarter-
//! track) exactly as it was; `MountMode::Reset` rewinds it instead.

mod common;

use common::{patterned_dsk_image, MemStorage};

use mii_core::disk::DiskController;
use mii_core::loader::{Loader, MountMode};

#[test]
fn preserve_mode_leaves_the_head_exactly_where_play_left_it() {
    let mut storage = MemStorage::default();
    storage.files.insert("/apple/a.dsk".to_string(), patterned_dsk_image());
    storage.files.insert("/apple/b.dsk".to_string(), patterned_dsk_image());
    let mut controller = DiskController::new();
    let mut loader = Loader::new();

    loader.mount(&mut storage, &mut controller, 0, "/apple/a.dsk", false, MountMode::Reset).unwrap();

    // Simulate a game mid-spin: motor running, head stepped off track 0,
    // partway through the current track's bitstream.
    controller.drives[0].motor = true;
    controller.drives[0].qtrack = 22;
    controller.drives[0].bit_position = 4_096;

    loader.mount(&mut storage, &mut controller, 0, "/apple/b.dsk", false, MountMode::Preserve).unwrap();

    assert!(controller.drives[0].motor);
    assert_eq!(controller.drives[0].qtrack, 22);
    assert_eq!(controller.drives[0].bit_position, 4_096);
    // The swap itself did take: drive 1's descriptor now points at b.dsk.
    assert_eq!(loader.descriptor(0).unwrap().path, "/apple/b.dsk");
}

#[test]
fn reset_mode_rewinds_the_head_to_track_zero_on_swap() {
    let mut storage = MemStorage::default();
    storage.files.insert("/apple/a.dsk".to_string(), patterned_dsk_image());
    storage.files.insert("/apple/b.dsk".to_string(), patterned_dsk_image());
    let mut controller = DiskController::new();
    let mut loader = Loader::new();

    loader.mount(&mut storage, &mut controller, 0, "/apple/a.dsk", false, MountMode::Reset).unwrap();
    controller.drives[0].motor = true;
    controller.drives[0].qtrack = 22;
    controller.drives[0].bit_position = 4_096;

    loader.mount(&mut storage, &mut controller, 0, "/apple/b.dsk", false, MountMode::Reset).unwrap();

    assert_eq!(controller.drives[0].qtrack, 0);
    assert_eq!(controller.drives[0].bit_position, 0);
}

#[test]
fn swapping_one_drive_does_not_disturb_the_other() {
    let mut storage = MemStorage::default();
    storage.files.insert("/apple/a.dsk".to_string(), patterned_dsk_image());
    storage.files.insert("/apple/b.dsk".to_string(), patterned_dsk_image());
    storage.files.insert("/apple/c.dsk".to_string(), patterned_dsk_image());
    let mut controller = DiskController::new();
    let mut loader = Loader::new();

    loader.mount(&mut storage, &mut controller, 0, "/apple/a.dsk", false, MountMode::Reset).unwrap();
    loader.mount(&mut storage, &mut controller, 1, "/apple/b.dsk", false, MountMode::Reset).unwrap();
    controller.drives[1].motor = true;
    controller.drives[1].qtrack = 90;

    loader.mount(&mut storage, &mut controller, 0, "/apple/c.dsk", false, MountMode::Preserve).unwrap();

    assert!(controller.drives[1].motor);
    assert_eq!(controller.drives[1].qtrack, 90);
}
