use thiserror::Error;

pub mod checksum;
pub mod cipher;
pub mod files;
pub mod map;
pub mod reader;
pub mod schema;
pub mod variant;
pub mod writer;

pub use checksum::ChecksumStatus;
pub use files::{find_map_files, load_map, save_map};
pub use map::{ExtraInfo, Header, LinkIssue, Map, RecordKind, Sector, Sprite, Wall};
pub use reader::MapReader;
pub use schema::Record;
pub use variant::{Variant, VariantConfig};
pub use writer::MapWriter;

#[derive(Debug, Error)]
pub enum MapError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("format error: {0}")]
    Format(String),
    #[error("truncated input: {section} needs {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        section: &'static str,
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("unsupported variant: {0}")]
    UnsupportedVariant(String),
    #[error("value {value} does not fit the on-disk width of '{field}'")]
    FieldOverflow { field: String, value: i64 },
    #[error("{record} {index} has a {actual}-byte payload, header declares {expected}")]
    PayloadSize {
        record: &'static str,
        index: usize,
        expected: usize,
        actual: usize,
    },
    #[error("{block} must have length {expected}, got {actual}")]
    BlockSize {
        block: &'static str,
        expected: usize,
        actual: usize,
    },
}

pub type Result<T> = std::result::Result<T, MapError>;

pub fn read_map(data: &[u8], variant: Variant) -> Result<Map> {
    MapReader::new(variant).read(data)
}

pub fn write_map(map: &Map, variant: Variant) -> Result<Vec<u8>> {
    MapWriter::new(variant).write(map)
}

pub fn map_to_json(map: &Map, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(map)?
    } else {
        serde_json::to_string(map)?
    };
    Ok(json)
}

pub fn map_from_json(json: &str) -> Result<Map> {
    Ok(serde_json::from_str(json)?)
}
