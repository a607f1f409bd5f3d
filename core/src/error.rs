use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SalvageError {
    #[error("Unable to open {path}: {source}")]
    DeviceOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to determine device geometry: {0}")]
    Geometry(String),

    #[error("Invalid boot sector: {0}")]
    InvalidBootSector(String),

    #[error("Trying to write data while write mode is disabled")]
    WriteDisabled,

    #[error("Cluster {cluster} is outside bounds (valid range 2..={max})")]
    ClusterOutOfBounds { cluster: u32, max: u32 },

    #[error("Access outside the device: sector {lba} + {count} > {total}")]
    OutOfRange { lba: u64, count: u32, total: u64 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Is a directory: {0}")]
    IsADirectory(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(String),
}

impl SalvageError {
    /// Construction-time failures that leave no usable session behind.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SalvageError::DeviceOpen { .. }
                | SalvageError::Geometry(_)
                | SalvageError::InvalidBootSector(_)
        )
    }
}
