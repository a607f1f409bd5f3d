// FAT volume session
// Parses the boot sector once and serves reads, listings and writes on top of it

pub mod chain;
pub mod enumerator;
pub mod file_ops;
pub mod free_space;
pub mod path_resolver;
pub mod walk;

pub use enumerator::{Enumeration, Listing};
pub use free_space::{FreeSpace, ScrubPattern};
pub use path_resolver::split_path;
pub use walk::WalkState;

use crate::diagnostics::{Diagnostic, DiagnosticSink, LogSink};
use crate::fat_common::{BootSector, ClusterRef, DirectoryEntry, FatWidth, VolumeLayout};
use log::{debug, info};
use salvage_core::{SalvageError, SectorDevice};
use serde::{Deserialize, Serialize};

/// Session configuration, fixed when the volume is opened.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeOptions {
    /// Allow FAT updates and scrubbing.
    pub write_enabled: bool,
    /// Load the whole FAT in memory at open time.
    pub cache_enabled: bool,
    /// Show erased entries in listings.
    pub list_deleted: bool,
}

impl VolumeOptions {
    /// Parses options from JSON. Missing fields keep their defaults.
    pub fn from_json(text: &str) -> Result<Self, SalvageError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Summary of the volume as derived from the boot sector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeInfo {
    pub fs_type: String,
    pub width: FatWidth,
    pub oem_name: String,
    pub volume_label: String,
    pub total_sectors: u64,
    pub total_clusters: u32,
    pub data_size: u64,
    pub disk_size: u64,
    pub bytes_per_sector: u32,
    pub sectors_per_cluster: u32,
    pub bytes_per_cluster: u32,
    pub reserved_sectors: u32,
    /// Fixed root directory (FAT12/16 only).
    pub root_entries: Option<u32>,
    pub root_sectors: Option<u32>,
    pub sectors_per_fat: u32,
    pub fat_size: u64,
    pub fat1_start: u64,
    pub fat2_start: u64,
    pub data_start: u64,
    pub root_cluster: u32,
    pub strangeness: u32,
    pub free_space: FreeSpace,
}

/// Enough bytes for every boot-sector field, whatever the device sector size.
const BOOT_READ_BYTES: u32 = 512;

/// Device-side location of a run of volume sectors.
#[derive(Debug, Clone, Copy)]
struct DeviceSpan {
    lba: u64,
    count: u32,
    /// Offset of the first volume byte inside the first device sector.
    skip: usize,
    len: usize,
}

/// A FAT12/16/32 volume bound to one sector device.
pub struct FatVolume<D: SectorDevice> {
    device: D,
    boot: BootSector,
    layout: VolumeLayout,
    options: VolumeOptions,
    strangeness: u32,
    /// Sector size of the device, which may differ from the header's.
    device_bps: u32,
    /// Decoded FAT copy 0, indexed by cluster number.
    /// May stop short of the last cluster when the table runs past the device.
    cache: Option<Vec<ClusterRef>>,
    free_space: Option<FreeSpace>,
    sink: Box<dyn DiagnosticSink>,
}

impl<D: SectorDevice> FatVolume<D> {
    /// Opens a session that reports diagnostics through the `log` facade.
    pub fn open(device: D, options: VolumeOptions) -> Result<Self, SalvageError> {
        Self::open_with_sink(device, options, Box::new(LogSink))
    }

    pub fn open_with_sink(
        mut device: D,
        options: VolumeOptions,
        mut sink: Box<dyn DiagnosticSink>,
    ) -> Result<Self, SalvageError> {
        let geometry = device.geometry();
        if geometry.bytes_per_sector == 0 {
            return Err(SalvageError::Geometry("device reports 0 bytes per sector".to_string()));
        }

        let boot_count = (BOOT_READ_BYTES + geometry.bytes_per_sector - 1) / geometry.bytes_per_sector;
        let boot_data = device
            .read_sectors(0, boot_count)
            .map_err(|e| SalvageError::InvalidBootSector(format!("unable to read sector 0: {}", e)))?;
        let boot = BootSector::parse(&boot_data)?;
        let layout = VolumeLayout::from_boot_sector(&boot);

        let anomalies = boot.anomalies(geometry.bytes_per_sector);
        let strangeness = anomalies.len() as u32;
        for anomaly in anomalies {
            sink.emit(Diagnostic::HeaderAnomaly(anomaly));
        }

        info!(
            "{} volume: {} clusters of {} bytes, FAT at sector {}, data at sector {}",
            layout.width,
            layout.total_clusters,
            layout.bytes_per_cluster(),
            layout.fat_start,
            layout.data_start
        );

        let mut volume = Self {
            device,
            boot,
            layout,
            options,
            strangeness,
            device_bps: geometry.bytes_per_sector,
            cache: None,
            free_space: None,
            sink,
        };

        if volume.options.cache_enabled {
            volume.enable_cache();
        }

        Ok(volume)
    }

    pub fn layout(&self) -> &VolumeLayout {
        &self.layout
    }

    pub fn boot_sector(&self) -> &BootSector {
        &self.boot
    }

    pub fn options(&self) -> &VolumeOptions {
        &self.options
    }

    /// Number of header plausibility warnings raised at open time.
    pub fn strangeness(&self) -> u32 {
        self.strangeness
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Closes the session and hands the device back.
    pub fn into_device(self) -> D {
        self.device
    }

    /// Synthetic entry for the root directory.
    pub fn root_entry(&self) -> DirectoryEntry {
        DirectoryEntry::root(self.layout.root_cluster)
    }

    pub fn info(&mut self) -> VolumeInfo {
        let free_space = self.compute_free_space();
        let layout = &self.layout;
        let fixed_root = layout.has_fixed_root();

        VolumeInfo {
            fs_type: self.boot.fs_type.clone(),
            width: layout.width,
            oem_name: self.boot.oem_name.clone(),
            volume_label: self.boot.volume_label.clone(),
            total_sectors: layout.total_sectors,
            total_clusters: layout.total_clusters,
            data_size: layout.data_size(),
            disk_size: layout.disk_size(),
            bytes_per_sector: layout.bytes_per_sector,
            sectors_per_cluster: layout.sectors_per_cluster,
            bytes_per_cluster: layout.bytes_per_cluster(),
            reserved_sectors: layout.reserved_sectors,
            root_entries: fixed_root.then_some(layout.root_entries),
            root_sectors: fixed_root.then_some(layout.root_sectors),
            sectors_per_fat: layout.sectors_per_fat,
            fat_size: layout.fat_size_bytes(),
            fat1_start: layout.fat_copy_start(0),
            fat2_start: layout.fat_copy_start(1),
            data_start: layout.data_start,
            root_cluster: layout.root_cluster,
            strangeness: self.strangeness,
            free_space,
        }
    }

    pub(crate) fn emit(&mut self, diagnostic: Diagnostic) {
        self.sink.emit(diagnostic);
    }

    /// Maps `count` volume sectors at `lba` onto the device's own sectors.
    fn device_span(&self, lba: u64, count: u32) -> DeviceSpan {
        let volume_bps = self.layout.bytes_per_sector as u64;
        let device_bps = self.device_bps as u64;
        let start = lba * volume_bps;
        let len = count as u64 * volume_bps;
        let first = start / device_bps;
        let end = (start + len + device_bps - 1) / device_bps;

        DeviceSpan {
            lba: first,
            count: (end - first) as u32,
            skip: (start - first * device_bps) as usize,
            len: len as usize,
        }
    }

    /// Reads volume sectors (header-sized) whatever the device sector size.
    pub(crate) fn read_volume_sectors(&mut self, lba: u64, count: u32) -> Result<Vec<u8>, SalvageError> {
        let span = self.device_span(lba, count);
        let data = self.device.read_sectors(span.lba, span.count)?;
        if span.skip == 0 && data.len() == span.len {
            return Ok(data);
        }

        data.get(span.skip..span.skip + span.len)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| SalvageError::Other(format!("Short read at sector {}: {} bytes", lba, data.len())))
    }

    /// Best-effort read: failures are reported and yield zeroed sectors.
    pub(crate) fn read_sectors(&mut self, lba: u64, count: u32) -> Vec<u8> {
        if lba + count as u64 > self.layout.total_sectors {
            self.emit(Diagnostic::ReadOutsideVolume {
                lba,
                total_sectors: self.layout.total_sectors,
            });
        }

        match self.read_volume_sectors(lba, count) {
            Ok(data) => data,
            Err(e) => {
                self.emit(Diagnostic::ReadFailed { lba, count, reason: e.to_string() });
                vec![0u8; count as usize * self.layout.bytes_per_sector as usize]
            }
        }
    }

    /// Writes volume sectors. Partial device sectors are read back and
    /// patched first.
    pub(crate) fn write_sectors(&mut self, lba: u64, data: &[u8], count: u32) -> Result<usize, SalvageError> {
        if !self.options.write_enabled {
            return Err(SalvageError::WriteDisabled);
        }

        let span = self.device_span(lba, count);
        let payload = data.get(..span.len).ok_or_else(|| {
            SalvageError::Other(format!("Write buffer holds {} bytes, {} sectors need {}", data.len(), count, span.len))
        })?;
        debug!("Writing {} sector(s) at {}", count, lba);

        if span.skip == 0 && span.len % self.device_bps as usize == 0 {
            self.device.write_sectors(span.lba, payload, span.count)?;
        } else {
            let mut buffer = self.device.read_sectors(span.lba, span.count)?;
            buffer
                .get_mut(span.skip..span.skip + span.len)
                .ok_or_else(|| SalvageError::Other(format!("Short read at sector {}", lba)))?
                .copy_from_slice(payload);
            self.device.write_sectors(span.lba, &buffer, span.count)?;
        }

        Ok(span.len)
    }

    /// Reads every sector of a data cluster.
    pub(crate) fn read_cluster(&mut self, cluster: u32) -> Vec<u8> {
        let sector = self.layout.cluster_sector(cluster);
        self.read_sectors(sector, self.layout.sectors_per_cluster)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fat_common::HeaderAnomaly;
    use crate::test_helpers::{pattern, shared_sink, ImageBuilder};
    use salvage_core::MemoryDevice;

    #[test]
    fn test_open_fat16_image() {
        let image = ImageBuilder::fat16().build();
        let volume = FatVolume::open(image, VolumeOptions::default()).unwrap();
        let layout = volume.layout();
        assert_eq!(layout.width, FatWidth::Fat16);
        assert_eq!(layout.fat_start, 1);
        assert!(layout.has_fixed_root());
        assert_eq!(volume.strangeness(), 0);
        assert_eq!(volume.root_entry().cluster, 0);
    }

    #[test]
    fn test_fat32_root_entry_points_at_root_cluster() {
        let image = ImageBuilder::fat32().build();
        let volume = FatVolume::open(image, VolumeOptions::default()).unwrap();
        let root = volume.root_entry();
        assert_eq!(root.cluster, 2);
        assert_eq!(root.name(), "/");
        assert!(root.is_directory());
    }

    #[test]
    fn test_header_anomalies_are_reported() {
        let image = ImageBuilder::fat16().fat_count(1).build();
        let (sink, events) = shared_sink();
        let volume = FatVolume::open_with_sink(image, VolumeOptions::default(), sink).unwrap();
        assert_eq!(volume.strangeness(), 1);
        assert_eq!(
            *events.borrow(),
            vec![Diagnostic::HeaderAnomaly(HeaderAnomaly::FatCopies(1))]
        );
    }

    #[test]
    fn test_unreadable_boot_sector_is_fatal() {
        let device = MemoryDevice::new(Vec::new(), 512);
        let err = FatVolume::open(device, VolumeOptions::default()).err().unwrap();
        assert!(matches!(err, SalvageError::InvalidBootSector(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_info_reports_layout_and_free_space() {
        let mut blank = FatVolume::open(ImageBuilder::fat16().build(), VolumeOptions::default()).unwrap();
        let baseline = blank.info().free_space.free_clusters;

        let image = ImageBuilder::fat16().chain(&[3, 4]).build();
        let mut volume = FatVolume::open(image, VolumeOptions::default()).unwrap();
        let info = volume.info();
        assert_eq!(info.fs_type, "FAT16");
        assert_eq!(info.fat2_start, info.fat1_start + info.sectors_per_fat as u64);
        assert_eq!(info.root_entries, Some(ImageBuilder::ROOT_ENTRIES as u32));
        assert_eq!(info.free_space.total_clusters, info.total_clusters);
        assert_eq!(info.free_space.free_clusters, baseline - 2);
    }

    #[test]
    fn test_read_outside_volume_is_reported() {
        let image = ImageBuilder::fat16().build();
        let (sink, events) = shared_sink();
        let mut volume = FatVolume::open_with_sink(image, VolumeOptions::default(), sink).unwrap();
        let total = volume.layout().total_sectors;
        let data = volume.read_sectors(total, 1);
        assert_eq!(data.len(), 512);
        let events = events.borrow();
        assert!(events.contains(&Diagnostic::ReadOutsideVolume { lba: total, total_sectors: total }));
        assert!(events.iter().any(|e| matches!(e, Diagnostic::ReadFailed { .. })));
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options = VolumeOptions::from_json(r#"{"list_deleted": true}"#).unwrap();
        assert!(options.list_deleted);
        assert!(!options.write_enabled);
        assert!(!options.cache_enabled);
    }

    #[test]
    fn test_malformed_options_are_serialization_errors() {
        let err = VolumeOptions::from_json(r#"{"write_enabled": "yes"}"#).unwrap_err();
        assert!(matches!(err, SalvageError::Serialization(_)));
        assert!(!err.is_fatal());
        assert!(matches!(VolumeOptions::from_json("{"), Err(SalvageError::Serialization(_))));
    }

    fn resized(device: MemoryDevice, bytes_per_sector: u32) -> MemoryDevice {
        MemoryDevice::new(device.into_inner(), bytes_per_sector)
    }

    #[test]
    fn test_small_device_sectors_are_translated() {
        let image = ImageBuilder::fat16().chain(&[5]).cluster_bytes(5, &pattern(5, 512)).build();
        let (sink, events) = shared_sink();
        let mut volume = FatVolume::open_with_sink(resized(image, 256), VolumeOptions::default(), sink).unwrap();
        assert_eq!(volume.strangeness(), 1);
        assert_eq!(volume.layout().bytes_per_sector, 512);

        assert_eq!(volume.read_cluster(5), pattern(5, 512));
        let fat = volume.read_sectors(volume.layout().fat_start, 1);
        assert_eq!(fat.len(), 512);
        assert!(!events.borrow().iter().any(|e| matches!(e, Diagnostic::ReadFailed { .. })));
    }

    #[test]
    fn test_large_device_sectors_are_translated() {
        let image = ImageBuilder::fat16()
            .cluster_bytes(4, &pattern(4, 512))
            .cluster_bytes(5, &pattern(5, 512))
            .cluster_bytes(6, &pattern(6, 512))
            .build();
        let options = VolumeOptions { write_enabled: true, ..Default::default() };
        let mut volume = FatVolume::open(resized(image, 1024), options).unwrap();
        assert_eq!(volume.read_cluster(5), pattern(5, 512));

        let sector = volume.layout().cluster_sector(5);
        volume.write_sectors(sector, &pattern(50, 512), 1).unwrap();
        assert_eq!(volume.read_cluster(4), pattern(4, 512));
        assert_eq!(volume.read_cluster(5), pattern(50, 512));
        assert_eq!(volume.read_cluster(6), pattern(6, 512));
    }

    #[test]
    fn test_short_write_buffer_is_rejected() {
        let options = VolumeOptions { write_enabled: true, ..Default::default() };
        let mut volume = FatVolume::open(ImageBuilder::fat16().build(), options).unwrap();
        let sector = volume.layout().cluster_sector(5);
        assert!(volume.write_sectors(sector, &[0u8; 100], 1).is_err());
        assert_eq!(volume.device().write_calls(), 0);
    }
}
