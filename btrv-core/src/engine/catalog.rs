//! File catalog for the reference engine.
//!
//! A catalog is JSON, either `{ "files": [...] }` or a bare array of file
//! definitions:
//!
//! ```json
//! { "files": [ { "name": "USERS.DAT", "recordLength": 128, "pageSize": 512,
//!                "records": 10,
//!                "keys": [ { "position": 1, "length": 32, "flags": 257, "dataType": 11 } ] } ] }
//! ```

use std::io::Read;

use serde::{Deserialize, Serialize};

use crate::btrieve::stat::{FileSpecification, KeySpecification, StatBuffer};
use crate::error::{BtrvError, BtrvResult};

fn default_page_size() -> i16 {
    512
}

/// One key of a cataloged file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyDefinition {
    /// 1-based position within the record.
    pub position: i16,
    pub length: i16,
    #[serde(default)]
    pub flags: i16,
    #[serde(default)]
    pub data_type: u8,
    #[serde(default)]
    pub null_value: u8,
    /// Key uses an alternate collating sequence.
    #[serde(default)]
    pub acs: bool,
}

impl KeyDefinition {
    pub fn key_spec(&self) -> KeySpecification {
        KeySpecification {
            position: self.position,
            length: self.length,
            flags: self.flags,
            data_type: self.data_type,
            null_value: self.null_value,
            acs_number: u8::from(self.acs),
            ..Default::default()
        }
    }
}

/// One cataloged file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDefinition {
    pub name: String,
    pub record_length: i16,
    #[serde(default = "default_page_size")]
    pub page_size: i16,
    /// Number of records the file reports.
    #[serde(default)]
    pub records: i32,
    #[serde(default)]
    pub variable_length: bool,
    #[serde(default)]
    pub keys: Vec<KeyDefinition>,
}

impl FileDefinition {
    /// Metadata a Stat call reports for this file.
    pub fn stat_buffer(&self) -> BtrvResult<StatBuffer> {
        let spec = FileSpecification {
            record_length: self.record_length,
            page_size: self.page_size,
            number_of_records: self.records,
            flags: i16::from(self.variable_length),
            ..Default::default()
        };
        let keys: Vec<_> = self.keys.iter().map(KeyDefinition::key_spec).collect();
        StatBuffer::with_keys(spec, &keys)
    }
}

/// The set of files an engine can open.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub files: Vec<FileDefinition>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_files(files: Vec<FileDefinition>) -> Self {
        Self { files }
    }

    /// Find a file by caller path. Directories and drive letters are
    /// ignored, and matching is case-insensitive.
    pub fn find(&self, path: &str) -> Option<&FileDefinition> {
        let wanted = file_name(path);
        self.files.iter().find(|f| file_name(&f.name) == wanted)
    }

    /// Check every file against the stat limits.
    pub fn validate(&self) -> BtrvResult<()> {
        for file in &self.files {
            file.stat_buffer()?;
        }
        Ok(())
    }
}

/// Final path component, uppercased. Accepts DOS and Unix separators.
pub fn file_name(path: &str) -> String {
    path.rsplit(['\\', '/', ':'])
        .next()
        .unwrap_or(path)
        .trim()
        .to_uppercase()
}

/// Load a catalog from JSON.
pub fn load_catalog<R: Read>(reader: R) -> BtrvResult<Catalog> {
    let value: serde_json::Value = serde_json::from_reader(reader)?;
    let catalog = if value.is_array() {
        Catalog::with_files(serde_json::from_value(value)?)
    } else {
        serde_json::from_value(value)?
    };
    catalog.validate()?;
    Ok(catalog)
}

/// Load a catalog from a file path.
pub fn load_catalog_from_path(path: &std::path::Path) -> BtrvResult<Catalog> {
    let file = std::fs::File::open(path)?;
    load_catalog(std::io::BufReader::new(file))
}

impl TryFrom<&str> for Catalog {
    type Error = BtrvError;

    fn try_from(json: &str) -> BtrvResult<Self> {
        load_catalog(json.as_bytes())
    }
}
