//! CSV import/export of flat login rows
//!
//! The row format uses the sync field names as the header:
//! `hostname,formSubmitURL,usernameField,passwordField,username,password`.
//! Written files quote every field.

use crate::records::{RawLoginRow, SourceRows};
use crate::{PassbridgeError, Result};
use serde::Deserialize;
use std::io::{Read, Write};
use std::path::Path;
use tracing::{debug, warn};
use url::Url;

/// Read rows from CSV with a header line.
///
/// Short rows are allowed; a row that still lacks `hostname` or `password`
/// (or fails to parse) is logged and skipped. A bad header or a read error
/// is fatal.
pub fn read_rows_csv<R: Read>(input: R) -> Result<SourceRows> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(input);
    reader.headers()?;

    let mut source = SourceRows::default();
    for (index, row) in reader.deserialize::<RawLoginRow>().enumerate() {
        match row {
            Ok(row) => source.rows.push(row),
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                warn!(row = index + 1, "Skipping CSV row: {}", e);
                source.skipped += 1;
            }
        }
    }
    debug!(
        "Read {} rows from CSV ({} skipped)",
        source.rows.len(),
        source.skipped
    );
    Ok(source)
}

/// Write rows as CSV with a header line and every field quoted.
pub fn write_rows_csv<W: Write>(output: W, rows: &[RawLoginRow]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .from_writer(output);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read rows from a CSV file.
pub fn import_from_csv(input: &Path) -> Result<SourceRows> {
    let file = std::fs::File::open(input).map_err(|e| {
        PassbridgeError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to open {}: {}", input.display(), e),
        ))
    })?;
    read_rows_csv(file)
}

/// Write rows to a CSV file, replacing it.
pub fn export_to_csv(output: &Path, rows: &[RawLoginRow]) -> Result<()> {
    let file = std::fs::File::create(output).map_err(|e| {
        PassbridgeError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to create {}: {}", output.display(), e),
        ))
    })?;
    write_rows_csv(file, rows)
}

/// One line of a LastPass CSV export. Extra columns are ignored.
#[derive(Debug, Deserialize)]
struct LastPassRow {
    url: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

/// Convert a LastPass CSV export into login rows.
///
/// `hostname` is the scheme and authority of `url`; `formSubmitURL` is `url`
/// unchanged. Rows that do not parse or whose `url` has no origin are
/// skipped.
pub fn convert_lastpass_csv<R: Read>(input: R) -> Result<SourceRows> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(input);
    reader.headers()?;

    let mut source = SourceRows::default();
    for (index, entry) in reader.deserialize::<LastPassRow>().enumerate() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                warn!(row = index + 1, "Skipping LastPass row: {}", e);
                source.skipped += 1;
                continue;
            }
        };
        match lastpass_origin(&entry.url) {
            Some(hostname) => source.rows.push(RawLoginRow {
                hostname,
                form_submit_url: entry.url,
                username_field: None,
                password_field: None,
                username: Some(entry.username).filter(|u| !u.is_empty()),
                password: entry.password,
            }),
            None => {
                warn!(url = %entry.url, "Skipping LastPass entry without a usable URL");
                source.skipped += 1;
            }
        }
    }
    Ok(source)
}

fn lastpass_origin(url: &str) -> Option<String> {
    let url = Url::parse(url).ok()?;
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    })
}
