use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::cipher;
use crate::map::{ExtraInfo, Header, RecordKind, Sector, Sprite};
use crate::schema::{FieldKind, FieldSpec, Record, RecordSchema};
use crate::{MapError, Result};

pub const BLOOD_SIGNATURE: [u8; 4] = *b"BLM\x1a";
pub const BLOOD_MASTER_KEY: u32 = 0x7474_614d;

/// Largest `skybits` whose offset table we will allocate.
pub const MAX_SKY_BITS: i16 = 15;

pub static BUILD_HEADER: RecordSchema = RecordSchema {
    name: "header",
    fields: &[
        FieldSpec::new("version", FieldKind::I32),
        FieldSpec::new("posx", FieldKind::I32),
        FieldSpec::new("posy", FieldKind::I32),
        FieldSpec::new("posz", FieldKind::I32),
        FieldSpec::new("ang", FieldKind::I16),
        FieldSpec::new("cursectnum", FieldKind::I16),
    ],
};

pub static BLOOD_HEADER: RecordSchema = RecordSchema {
    name: "header",
    fields: &[
        FieldSpec::new("posx", FieldKind::I32),
        FieldSpec::new("posy", FieldKind::I32),
        FieldSpec::new("posz", FieldKind::I32),
        FieldSpec::new("ang", FieldKind::I16),
        FieldSpec::new("cursectnum", FieldKind::I16),
        FieldSpec::new("skybits", FieldKind::I16),
        FieldSpec::new("visibility", FieldKind::I32),
        FieldSpec::new("songid", FieldKind::I32),
        FieldSpec::new("parallaxtype", FieldKind::U8),
        FieldSpec::new("revision", FieldKind::I32),
        FieldSpec::new("numsectors", FieldKind::U16),
        FieldSpec::new("numwalls", FieldKind::U16),
        FieldSpec::new("numsprites", FieldKind::U16),
    ],
};

/// How the key for one encrypted section is obtained. Every rule except
/// `Fixed` reads header values, so the header must be fully decoded (or, on
/// write, final) before the key is computed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum KeyRule {
    Plain,
    Fixed(u32),
    /// The decoded wall count.
    WallCount,
    /// Byte length of the parallax offset table, `2 << skybits`.
    SkyTableLen,
    /// `(revision * record_size) | mask`.
    Revision { record_size: usize, mask: u32 },
}

impl KeyRule {
    pub fn derive(self, header: &Header) -> Option<u8> {
        let wide = match self {
            KeyRule::Plain => return None,
            KeyRule::Fixed(key) => key,
            KeyRule::WallCount => header.numwalls as u32,
            KeyRule::SkyTableLen => 2u32.wrapping_shl(header.skybits as u32),
            KeyRule::Revision { record_size, mask } => {
                (header.revision as u32).wrapping_mul(record_size as u32) | mask
            }
        };
        Some(cipher::seed(wide))
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SectionKeys {
    pub header: KeyRule,
    pub extra_info: KeyRule,
    pub sky_table: KeyRule,
    pub sector: KeyRule,
    pub wall: KeyRule,
    pub sprite: KeyRule,
}

impl SectionKeys {
    pub const PLAIN: SectionKeys = SectionKeys {
        header: KeyRule::Plain,
        extra_info: KeyRule::Plain,
        sky_table: KeyRule::Plain,
        sector: KeyRule::Plain,
        wall: KeyRule::Plain,
        sprite: KeyRule::Plain,
    };

    pub fn record(&self, kind: RecordKind) -> KeyRule {
        match kind {
            RecordKind::Sector => self.sector,
            RecordKind::Wall => self.wall,
            RecordKind::Sprite => self.sprite,
        }
    }
}

/// Where the record counts live.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CountSource {
    /// A u16 immediately before each table.
    Inline,
    /// The header's `numsectors`/`numwalls`/`numsprites` fields.
    Header,
}

/// Everything that distinguishes one game's map layout from another. The
/// reader and writer are the same algorithm for every variant; only this
/// value changes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct VariantConfig {
    pub name: &'static str,
    /// Signature of the pre-header. When present it is followed by a u16
    /// whose high byte is the version; the low byte is reserved.
    pub signature: Option<[u8; 4]>,
    pub header: &'static RecordSchema,
    pub counts: CountSource,
    pub extra_info: bool,
    pub sky_table: bool,
    /// Records with a positive discriminant own a payload sized by the
    /// extra-info block. Requires `extra_info`.
    pub record_payloads: bool,
    pub checksum: bool,
    pub keys: SectionKeys,
}

impl VariantConfig {
    pub fn pre_header_size(&self) -> usize {
        if self.signature.is_some() {
            6
        } else {
            0
        }
    }

    /// Payload size for `kind` under this variant and header, or `None` when
    /// records of this variant never carry payloads.
    pub fn payload_size(&self, header: &Header, kind: RecordKind) -> Result<Option<usize>> {
        if !self.record_payloads {
            return Ok(None);
        }
        if !self.extra_info {
            return Err(MapError::UnsupportedVariant(format!(
                "{}: record payloads need an extra info block to size them",
                self.name
            )));
        }
        match header.extra_info.as_ref() {
            Some(info) => info.payload_size(kind).map(Some),
            None => ExtraInfo::default().payload_size(kind).map(Some),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Baseline Build v7 layout (Duke Nukem 3D and its siblings).
    Duke3d,
    Blood,
}

impl Variant {
    pub const ALL: [Variant; 2] = [Variant::Duke3d, Variant::Blood];

    pub fn name(self) -> &'static str {
        match self {
            Variant::Duke3d => "duke3d",
            Variant::Blood => "blood",
        }
    }

    pub fn config(self) -> VariantConfig {
        match self {
            Variant::Duke3d => VariantConfig {
                name: "duke3d",
                signature: None,
                header: &BUILD_HEADER,
                counts: CountSource::Inline,
                extra_info: false,
                sky_table: false,
                record_payloads: false,
                checksum: false,
                keys: SectionKeys::PLAIN,
            },
            Variant::Blood => VariantConfig {
                name: "blood",
                signature: Some(BLOOD_SIGNATURE),
                header: &BLOOD_HEADER,
                counts: CountSource::Header,
                extra_info: true,
                sky_table: true,
                record_payloads: true,
                checksum: true,
                keys: SectionKeys {
                    header: KeyRule::Fixed(BLOOD_MASTER_KEY),
                    extra_info: KeyRule::WallCount,
                    sky_table: KeyRule::SkyTableLen,
                    sector: KeyRule::Revision {
                        record_size: Sector::SIZE,
                        mask: 0,
                    },
                    wall: KeyRule::Revision {
                        record_size: Sector::SIZE,
                        mask: BLOOD_MASTER_KEY,
                    },
                    sprite: KeyRule::Revision {
                        record_size: Sprite::SIZE,
                        mask: BLOOD_MASTER_KEY,
                    },
                },
            },
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Variant {
    type Err = MapError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "duke3d" | "duke" | "build" | "build7" => Ok(Variant::Duke3d),
            "blood" => Ok(Variant::Blood),
            other => Err(MapError::UnsupportedVariant(format!(
                "unknown map variant '{other}'"
            ))),
        }
    }
}
