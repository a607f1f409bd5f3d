// Sector I/O port used by every filesystem component
// Addresses are logical sectors relative to the start of the volume

use crate::SalvageError;
use log::trace;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub const DEFAULT_SECTOR_SIZE: u32 = 512;

/// Media geometry as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    pub bytes_per_sector: u32,
    pub total_sectors: u64,
}

/// Synchronous fixed-size sector access.
pub trait SectorDevice {
    fn geometry(&self) -> Geometry;

    /// Reads `count` sectors starting at `lba`; the result is exactly
    /// `count * bytes_per_sector` bytes long.
    fn read_sectors(&mut self, lba: u64, count: u32) -> Result<Vec<u8>, SalvageError>;

    /// Writes `count` sectors from the front of `data`, returning the number
    /// of bytes written.
    fn write_sectors(&mut self, lba: u64, data: &[u8], count: u32) -> Result<usize, SalvageError>;
}

impl<D: SectorDevice + ?Sized> SectorDevice for &mut D {
    fn geometry(&self) -> Geometry {
        (**self).geometry()
    }

    fn read_sectors(&mut self, lba: u64, count: u32) -> Result<Vec<u8>, SalvageError> {
        (**self).read_sectors(lba, count)
    }

    fn write_sectors(&mut self, lba: u64, data: &[u8], count: u32) -> Result<usize, SalvageError> {
        (**self).write_sectors(lba, data, count)
    }
}

impl<D: SectorDevice + ?Sized> SectorDevice for Box<D> {
    fn geometry(&self) -> Geometry {
        (**self).geometry()
    }

    fn read_sectors(&mut self, lba: u64, count: u32) -> Result<Vec<u8>, SalvageError> {
        (**self).read_sectors(lba, count)
    }

    fn write_sectors(&mut self, lba: u64, data: &[u8], count: u32) -> Result<usize, SalvageError> {
        (**self).write_sectors(lba, data, count)
    }
}

fn check_write_len(data: &[u8], count: u32, bytes_per_sector: u32) -> Result<usize, SalvageError> {
    let needed = count as usize * bytes_per_sector as usize;
    if data.len() < needed {
        return Err(SalvageError::Other(format!(
            "Write buffer holds {} bytes, {} sectors need {}",
            data.len(),
            count,
            needed
        )));
    }
    Ok(needed)
}

/// Disk image or raw device accessed through a regular file handle.
///
/// `offset` shifts every sector address, for volumes embedded in a larger
/// container (e.g. a partition inside a whole-disk image).
pub struct FileDevice {
    path: PathBuf,
    file: File,
    len: u64,
    offset: u64,
    bytes_per_sector: u32,
}

impl FileDevice {
    pub fn open<P: AsRef<Path>>(path: P, writable: bool) -> Result<Self, SalvageError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(writable)
            .open(&path)
            .map_err(|source| SalvageError::DeviceOpen {
                path: path.clone(),
                source,
            })?;

        let len = file
            .metadata()
            .map_err(|e| SalvageError::Geometry(format!("{}: {}", path.display(), e)))?
            .len();

        Ok(Self {
            path,
            file,
            len,
            offset: 0,
            bytes_per_sector: DEFAULT_SECTOR_SIZE,
        })
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_sector_size(mut self, bytes_per_sector: u32) -> Result<Self, SalvageError> {
        if bytes_per_sector == 0 {
            return Err(SalvageError::Geometry(format!(
                "{}: sector size cannot be 0",
                self.path.display()
            )));
        }
        self.bytes_per_sector = bytes_per_sector;
        Ok(self)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn byte_offset(&self, lba: u64) -> u64 {
        self.offset + lba * self.bytes_per_sector as u64
    }
}

impl SectorDevice for FileDevice {
    fn geometry(&self) -> Geometry {
        Geometry {
            bytes_per_sector: self.bytes_per_sector,
            total_sectors: self.len.saturating_sub(self.offset) / self.bytes_per_sector as u64,
        }
    }

    fn read_sectors(&mut self, lba: u64, count: u32) -> Result<Vec<u8>, SalvageError> {
        let offset = self.byte_offset(lba);
        trace!("Reading {} sectors at lba {} (offset {:#x})", count, lba, offset);

        let mut buffer = vec![0u8; count as usize * self.bytes_per_sector as usize];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn write_sectors(&mut self, lba: u64, data: &[u8], count: u32) -> Result<usize, SalvageError> {
        let size = check_write_len(data, count, self.bytes_per_sector)?;
        let offset = self.byte_offset(lba);
        trace!("Writing {} sectors at lba {} (offset {:#x})", count, lba, offset);

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&data[..size])?;
        self.file.flush()?;
        Ok(size)
    }
}

/// Volume image held in memory, with call counters for instrumentation.
#[derive(Debug, Clone)]
pub struct MemoryDevice {
    data: Vec<u8>,
    bytes_per_sector: u32,
    read_calls: usize,
    write_calls: usize,
}

impl MemoryDevice {
    pub fn new(data: Vec<u8>, bytes_per_sector: u32) -> Self {
        Self {
            data,
            bytes_per_sector,
            read_calls: 0,
            write_calls: 0,
        }
    }

    pub fn read_calls(&self) -> usize {
        self.read_calls
    }

    pub fn write_calls(&self) -> usize {
        self.write_calls
    }

    pub fn reset_counters(&mut self) {
        self.read_calls = 0;
        self.write_calls = 0;
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    fn span(&self, lba: u64, count: u32) -> Result<(usize, usize), SalvageError> {
        let start = lba as usize * self.bytes_per_sector as usize;
        let end = start + count as usize * self.bytes_per_sector as usize;
        if end > self.data.len() {
            return Err(SalvageError::OutOfRange {
                lba,
                count,
                total: self.geometry().total_sectors,
            });
        }
        Ok((start, end))
    }
}

impl SectorDevice for MemoryDevice {
    fn geometry(&self) -> Geometry {
        Geometry {
            bytes_per_sector: self.bytes_per_sector,
            total_sectors: self.data.len() as u64 / self.bytes_per_sector as u64,
        }
    }

    fn read_sectors(&mut self, lba: u64, count: u32) -> Result<Vec<u8>, SalvageError> {
        self.read_calls += 1;
        let (start, end) = self.span(lba, count)?;
        Ok(self.data[start..end].to_vec())
    }

    fn write_sectors(&mut self, lba: u64, data: &[u8], count: u32) -> Result<usize, SalvageError> {
        self.write_calls += 1;
        let size = check_write_len(data, count, self.bytes_per_sector)?;
        let (start, end) = self.span(lba, count)?;
        self.data[start..end].copy_from_slice(&data[..size]);
        Ok(size)
    }
}
