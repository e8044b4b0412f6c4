//! Disk II subsystem (§3 "Floppy track"/"Floppy drive"/"Disk controller",
//! §4.H, §6 disk image formats).

pub mod controller;
pub mod convert;
pub mod drive;
pub mod lss;
pub mod track;

pub use controller::DiskController;
pub use drive::Drive;
pub use track::Track;
