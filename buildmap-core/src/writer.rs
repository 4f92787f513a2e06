use log::{debug, warn};
use std::io::Write;

use crate::checksum;
use crate::cipher;
use crate::map::{count_u16, ExtraInfo, Header, Map, RecordKind};
use crate::schema::{FieldKind, Record, RecordSchema};
use crate::variant::{CountSource, Variant, VariantConfig, MAX_SKY_BITS};
use crate::{MapError, Result};

/// Encodes maps for one variant. Like [`crate::MapReader`] it carries only
/// configuration.
#[derive(Copy, Clone, Debug)]
pub struct MapWriter {
    config: VariantConfig,
}

impl MapWriter {
    pub fn new(variant: Variant) -> Self {
        Self::with_config(variant.config())
    }

    pub fn with_config(config: VariantConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &VariantConfig {
        &self.config
    }

    /// Appends the encoded map to `w`. The whole file is assembled in memory
    /// first, so a failure never leaves a partial map in `w`.
    pub fn write_to<W: Write>(&self, map: &Map, w: &mut W) -> Result<()> {
        let bytes = self.write(map)?;
        w.write_all(&bytes)?;
        Ok(())
    }

    pub fn write(&self, map: &Map) -> Result<Vec<u8>> {
        let config = &self.config;

        // Stored counts are stale by definition; the sequences are the truth.
        let mut header = map.header.clone();
        header.numsectors = count_u16("numsectors", map.sectors.len())?;
        header.numwalls = count_u16("numwalls", map.walls.len())?;
        header.numsprites = count_u16("numsprites", map.sprites.len())?;
        if config.extra_info && header.extra_info.is_none() {
            header.extra_info = Some(ExtraInfo::default());
        }

        let mut out = Vec::new();

        if let Some(signature) = config.signature {
            if !(0..=0xFF).contains(&header.version) {
                return Err(MapError::FieldOverflow {
                    field: "version".to_string(),
                    value: header.version as i64,
                });
            }
            out.extend_from_slice(&signature);
            out.extend_from_slice(&((header.version as u16) << 8).to_le_bytes());
        }

        let mut raw = encode_header(config.header, &header)?;
        if let Some(key) = config.keys.header.derive(&header) {
            cipher::apply_keystream(&mut raw, key);
        }
        out.extend(raw);

        if let Some(info) = header.extra_info.as_ref().filter(|_| config.extra_info) {
            let mut raw = Vec::with_capacity(ExtraInfo::SIZE);
            info.encode_into(&mut raw)?;
            if let Some(key) = config.keys.extra_info.derive(&header) {
                cipher::apply_keystream(&mut raw, key);
            }
            out.extend(raw);
        }

        if config.sky_table {
            let mut raw = encode_sky_table(&header)?;
            if let Some(key) = config.keys.sky_table.derive(&header) {
                cipher::apply_keystream(&mut raw, key);
            }
            out.extend(raw);
        }

        self.write_table(&mut out, &header, RecordKind::Sector, &map.sectors)?;
        self.write_table(&mut out, &header, RecordKind::Wall, &map.walls)?;
        self.write_table(&mut out, &header, RecordKind::Sprite, &map.sprites)?;

        if config.checksum {
            checksum::append_trailer(&mut out);
        }

        debug!(
            "{}: wrote {} bytes ({} sectors, {} walls, {} sprites)",
            config.name,
            out.len(),
            header.numsectors,
            header.numwalls,
            header.numsprites
        );
        Ok(out)
    }

    fn write_table<T: Record>(
        &self,
        out: &mut Vec<u8>,
        header: &Header,
        kind: RecordKind,
        records: &[T],
    ) -> Result<()> {
        if self.config.counts == CountSource::Inline {
            // Already range-checked when the header counts were derived.
            out.extend_from_slice(&(records.len() as u16).to_le_bytes());
        }

        let key = self.config.keys.record(kind).derive(header);
        let payload_size = self.config.payload_size(header, kind)?;
        debug!(
            "{}: writing {} {}s at offset {} (key {:?})",
            self.config.name,
            records.len(),
            kind.name(),
            out.len(),
            key
        );

        let mut raw = Vec::with_capacity(T::SIZE);
        for (index, record) in records.iter().enumerate() {
            raw.clear();
            record.encode_into(&mut raw)?;
            if let Some(key) = key {
                cipher::apply_keystream(&mut raw, key);
            }
            out.extend_from_slice(&raw);

            let owns_payload = payload_size.is_some() && record.discriminant() > 0;
            match (owns_payload, payload_size, record.payload()) {
                (true, Some(size), Some(payload)) => {
                    if payload.len() != size {
                        return Err(MapError::PayloadSize {
                            record: kind.name(),
                            index,
                            expected: size,
                            actual: payload.len(),
                        });
                    }
                    out.extend_from_slice(payload);
                }
                (true, Some(size), None) => {
                    out.resize(out.len() + size, 0);
                }
                (false, _, Some(payload)) => {
                    warn!(
                        "{}: dropping {}-byte payload of {} {} (extra={})",
                        self.config.name,
                        payload.len(),
                        kind.name(),
                        index,
                        record.discriminant()
                    );
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn encode_header(schema: &RecordSchema, header: &Header) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(schema.encoded_size());
    for field in schema.fields {
        if !field.kind.is_scalar() {
            return Err(MapError::UnsupportedVariant(format!(
                "header field '{}' is not a scalar",
                field.name
            )));
        }
        let value = header.field(field.name)?;
        if !field.kind.fits(value) {
            return Err(MapError::FieldOverflow {
                field: field.name.to_string(),
                value,
            });
        }
        field.kind.write_value(&mut out, value)?;
    }
    Ok(out)
}

fn encode_sky_table(header: &Header) -> Result<Vec<u8>> {
    if !(0..=MAX_SKY_BITS).contains(&header.skybits) {
        return Err(MapError::FieldOverflow {
            field: "skybits".to_string(),
            value: header.skybits as i64,
        });
    }
    let count = 1usize << header.skybits;
    let mut out = Vec::with_capacity(count * FieldKind::I16.width());
    if header.sky_offsets.is_empty() {
        out.resize(count * 2, 0);
        return Ok(out);
    }
    if header.sky_offsets.len() != count {
        return Err(MapError::BlockSize {
            block: "sky offsets",
            expected: count,
            actual: header.sky_offsets.len(),
        });
    }
    for offset in &header.sky_offsets {
        out.extend_from_slice(&offset.to_le_bytes());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::{Sector, Sprite, Wall};
    use crate::reader::MapReader;

    fn room(extra: i16) -> Map {
        let mut map = Map::new();
        let square = [(-512, -512), (512, -512), (512, 512), (-512, 512)];
        map.push_sector_loop(
            Sector {
                ceilingz: -32768,
                extra,
                ..Sector::default()
            },
            &square,
            &Wall::default(),
        )
        .unwrap();
        map.sprites.push(Sprite {
            picnum: 1,
            extra,
            ..Sprite::default()
        });
        map
    }

    #[test]
    fn duke3d_layout_has_inline_counts() {
        let bytes = MapWriter::new(Variant::Duke3d).write(&room(-1)).unwrap();
        assert_eq!(bytes.len(), 20 + 2 + 40 + 2 + 4 * 32 + 2 + 44);
        assert_eq!(&bytes[0..4], &7i32.to_le_bytes());
        assert_eq!(&bytes[20..22], &1u16.to_le_bytes());
        assert_eq!(&bytes[62..64], &4u16.to_le_bytes());
        assert_eq!(&bytes[192..194], &1u16.to_le_bytes());
    }

    #[test]
    fn blood_layout_and_checksum() {
        let bytes = MapWriter::new(Variant::Blood).write(&room(0)).unwrap();
        assert_eq!(bytes.len(), 6 + 37 + 128 + 2 + 40 + 4 * 32 + 44 + 4);
        assert_eq!(&bytes[0..6], b"BLM\x1a\x00\x07");
        assert!(checksum::verify(&bytes).is_valid());
    }

    #[test]
    fn counts_are_recomputed_from_sequences() {
        let data = MapWriter::new(Variant::Blood).write(&room(0)).unwrap();
        let mut map = MapReader::new(Variant::Blood).read(&data).unwrap();
        assert_eq!(map.header.numsprites, 1);

        map.sprites.push(Sprite::default());
        map.sprites.push(Sprite::default());
        map.walls.truncate(3);
        for variant in Variant::ALL {
            let bytes = MapWriter::new(variant).write(&map).unwrap();
            let back = MapReader::new(variant).read(&bytes).unwrap();
            assert_eq!(back.header.numsectors, 1);
            assert_eq!(back.header.numwalls, 3);
            assert_eq!(back.header.numsprites, 3);
            assert_eq!(back.sprites.len(), 3);
        }
        // The model itself is untouched.
        assert_eq!(map.header.numsprites, 1);
    }

    #[test]
    fn positive_discriminant_always_emits_declared_size() {
        let writer = MapWriter::new(Variant::Blood);
        let plain = writer.write(&room(0)).unwrap();
        let flagged = writer.write(&room(1)).unwrap();
        // One sector payload (60) and one sprite payload (56).
        assert_eq!(flagged.len(), plain.len() + 60 + 56);

        let map = MapReader::new(Variant::Blood).read(&flagged).unwrap();
        assert_eq!(map.sectors[0].payload.as_deref(), Some(&[0u8; 60][..]));
        assert_eq!(map.sprites[0].payload.as_ref().map(Vec::len), Some(56));
    }

    #[test]
    fn payload_of_wrong_length_is_rejected() {
        let mut map = room(0);
        map.walls[2].extra = 1;
        map.walls[2].payload = Some(vec![1; 10]);
        match MapWriter::new(Variant::Blood).write(&map) {
            Err(MapError::PayloadSize { record: "wall", index: 2, expected: 24, actual: 10 }) => {}
            other => panic!("expected payload size error, got {other:?}"),
        }
    }

    #[test]
    fn payload_on_unflagged_record_is_not_written() {
        let mut map = room(0);
        map.walls[0].payload = Some(vec![9; 24]);
        let with = MapWriter::new(Variant::Blood).write(&map).unwrap();
        let without = MapWriter::new(Variant::Blood).write(&room(0)).unwrap();
        assert_eq!(with, without);
    }

    #[test]
    fn duke3d_never_writes_payloads() {
        let mut map = room(1);
        map.sectors[0].payload = Some(vec![1; 60]);
        let bytes = MapWriter::new(Variant::Duke3d).write(&map).unwrap();
        assert_eq!(bytes.len(), 20 + 2 + 40 + 2 + 4 * 32 + 2 + 44);
    }

    #[test]
    fn version_must_fit_the_shifted_field() {
        let mut map = room(0);
        map.header.version = 0x1FF;
        assert!(matches!(
            MapWriter::new(Variant::Blood).write(&map),
            Err(MapError::FieldOverflow { .. })
        ));
        // The Build header stores it as a full i32.
        assert!(MapWriter::new(Variant::Duke3d).write(&map).is_ok());
    }

    #[test]
    fn version_survives_the_low_byte_mask() {
        let writer = MapWriter::new(Variant::Blood);
        let reader = MapReader::new(Variant::Blood);
        for version in 0..=0xFF {
            let mut map = Map::new();
            map.header.version = version;
            let bytes = writer.write(&map).unwrap();
            assert_eq!(bytes[4], 0);
            assert_eq!(bytes[5] as i32, version);
            assert_eq!(reader.read(&bytes).unwrap().header.version, version);
        }
    }

    #[test]
    fn sky_table_follows_skybits() {
        let mut map = room(0);
        map.header.skybits = 2;
        map.header.sky_offsets = vec![0, 1, 2, 3];
        let bytes = MapWriter::new(Variant::Blood).write(&map).unwrap();
        let back = MapReader::new(Variant::Blood).read(&bytes).unwrap();
        assert_eq!(back.header.sky_offsets, vec![0, 1, 2, 3]);

        map.header.sky_offsets = vec![0, 1];
        assert!(matches!(
            MapWriter::new(Variant::Blood).write(&map),
            Err(MapError::BlockSize { expected: 4, actual: 2, .. })
        ));
    }

    #[test]
    fn write_to_appends() {
        let mut sink = b"prefix".to_vec();
        MapWriter::new(Variant::Duke3d).write_to(&room(0), &mut sink).unwrap();
        assert_eq!(&sink[..6], b"prefix");
        let map = MapReader::new(Variant::Duke3d).read(&sink[6..]).unwrap();
        assert_eq!(map.walls.len(), 4);
    }
}
