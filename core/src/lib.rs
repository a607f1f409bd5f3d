pub mod device;
pub mod error;

pub use device::{FileDevice, Geometry, MemoryDevice, SectorDevice, DEFAULT_SECTOR_SIZE};
pub use error::SalvageError;
