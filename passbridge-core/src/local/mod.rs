//! Local credential sources.
//!
//! Everything here produces flat [`RawLoginRow`]s for the import path:
//! the Chrome `Login Data` database and plaintext CSV files (our own format
//! or a LastPass export).

pub mod chrome;
pub mod keys;

pub use chrome::{find_login_data, ChromeLoginStore};
pub use keys::{provider_for, KeyProviderKind, LocalKeyProvider};

use crate::import_export::{convert_lastpass_csv, import_from_csv};
use crate::records::SourceRows;
use crate::{PassbridgeError, Result};
use std::path::PathBuf;

/// A finite source of login rows.
///
/// Rows the source cannot parse are counted in [`SourceRows::skipped`]
/// rather than failing the read.
pub trait RecordSource {
    fn read_rows(&self) -> Result<SourceRows>;
}

/// CSV file in the passbridge row format.
#[derive(Debug, Clone)]
pub struct CsvFile(pub PathBuf);

impl RecordSource for CsvFile {
    fn read_rows(&self) -> Result<SourceRows> {
        import_from_csv(&self.0)
    }
}

/// LastPass CSV export.
#[derive(Debug, Clone)]
pub struct LastPassExport(pub PathBuf);

impl RecordSource for LastPassExport {
    fn read_rows(&self) -> Result<SourceRows> {
        let file = std::fs::File::open(&self.0).map_err(|e| {
            PassbridgeError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to open {}: {}", self.0.display(), e),
            ))
        })?;
        convert_lastpass_csv(file)
    }
}
