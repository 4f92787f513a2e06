use log::{debug, trace, warn};
use std::io::Read;

use crate::cipher;
use crate::map::{ExtraInfo, Header, Map, RecordKind};
use crate::schema::{Record, RecordSchema};
use crate::variant::{CountSource, KeyRule, Variant, VariantConfig, MAX_SKY_BITS};
use crate::{MapError, Result};

/// Forward-only source that pulls exactly the bytes each section asks for
/// and tracks how far into the map it has read.
struct ByteStream<R> {
    inner: R,
    pos: usize,
}

impl<R: Read> ByteStream<R> {
    fn new(inner: R) -> Self {
        Self { inner, pos: 0 }
    }

    fn take(&mut self, needed: usize, section: &'static str) -> Result<Vec<u8>> {
        // Sizes come from the file itself; grow as bytes arrive.
        let mut out = Vec::with_capacity(needed.min(0x10000));
        self.inner.by_ref().take(needed as u64).read_to_end(&mut out)?;
        if out.len() < needed {
            return Err(MapError::Truncated {
                section,
                offset: self.pos,
                needed,
                available: out.len(),
            });
        }
        self.pos += needed;
        Ok(out)
    }

    /// Takes `needed` bytes and unscrambles them with `key`.
    fn take_decrypted(&mut self, needed: usize, section: &'static str, key: Option<u8>) -> Result<Vec<u8>> {
        let mut raw = self.take(needed, section)?;
        if let Some(key) = key {
            cipher::apply_keystream(&mut raw, key);
        }
        Ok(raw)
    }

    fn take_u16(&mut self, section: &'static str) -> Result<u16> {
        let b = self.take(2, section)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }
}

/// Decodes map files of one variant. Holds nothing but its configuration, so
/// one reader can be reused for any number of files.
#[derive(Copy, Clone, Debug)]
pub struct MapReader {
    config: VariantConfig,
}

impl MapReader {
    pub fn new(variant: Variant) -> Self {
        Self::with_config(variant.config())
    }

    pub fn with_config(config: VariantConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &VariantConfig {
        &self.config
    }

    pub fn read(&self, data: &[u8]) -> Result<Map> {
        let (map, consumed) = self.read_with_len(data)?;
        let trailing = data.len() - consumed;
        if trailing > 0 && !(self.config.checksum && trailing == crate::checksum::TRAILER_LEN) {
            warn!("{}: ignoring {} trailing bytes after sprite table", self.config.name, trailing);
        }
        Ok(map)
    }

    /// Decodes a map from `r`, pulling only the bytes the map occupies. A
    /// checksum trailer, or anything else that follows, stays unread in `r`.
    pub fn read_from<R: Read>(&self, r: &mut R) -> Result<Map> {
        let mut stream = ByteStream::new(r);
        self.decode(&mut stream)
    }

    /// Decodes a map and reports how many bytes it occupied. Any checksum
    /// trailer is left unread.
    pub fn read_with_len(&self, data: &[u8]) -> Result<(Map, usize)> {
        let mut stream = ByteStream::new(data);
        let map = self.decode(&mut stream)?;
        debug!("{}: consumed {} of {} bytes", self.config.name, stream.pos, data.len());
        Ok((map, stream.pos))
    }

    fn decode<R: Read>(&self, stream: &mut ByteStream<R>) -> Result<Map> {
        let config = &self.config;
        let mut header = Header::default();

        if let Some(signature) = config.signature {
            let magic = stream.take(4, "signature")?;
            if magic != signature {
                return Err(MapError::Format(format!(
                    "{}: bad signature {:02X?}, expected {:02X?}",
                    config.name, magic, signature
                )));
            }
            // Only the high byte carries the version.
            header.version = (stream.take_u16("version")? >> 8) as i32;
        }

        let key = config.keys.header.derive(&header);
        let raw = stream.take_decrypted(config.header.encoded_size(), "header", key)?;
        decode_header(config.header, &raw, &mut header)?;
        debug!(
            "{}: header version={} revision={} counts={}/{}/{}",
            config.name, header.version, header.revision, header.numsectors, header.numwalls, header.numsprites
        );

        if config.extra_info {
            let key = config.keys.extra_info.derive(&header);
            let raw = stream.take_decrypted(ExtraInfo::SIZE, "extra info", key)?;
            let info = ExtraInfo::decode(&raw)?;
            debug!(
                "{}: extra payload sizes sector={} wall={} sprite={}",
                config.name, info.xsector_size, info.xwall_size, info.xsprite_size
            );
            header.extra_info = Some(info);
        }

        if config.sky_table {
            header.sky_offsets = read_sky_table(stream, config.keys.sky_table, &header)?;
        }

        let num_sectors = self.table_count(stream, &mut header, RecordKind::Sector)?;
        let sectors = self.read_table(stream, &header, RecordKind::Sector, num_sectors)?;
        let num_walls = self.table_count(stream, &mut header, RecordKind::Wall)?;
        let walls = self.read_table(stream, &header, RecordKind::Wall, num_walls)?;
        let num_sprites = self.table_count(stream, &mut header, RecordKind::Sprite)?;
        let sprites = self.read_table(stream, &header, RecordKind::Sprite, num_sprites)?;

        Ok(Map {
            header,
            sectors,
            walls,
            sprites,
        })
    }

    fn table_count<R: Read>(&self, stream: &mut ByteStream<R>, header: &mut Header, kind: RecordKind) -> Result<usize> {
        match self.config.counts {
            CountSource::Header => {
                let count = match kind {
                    RecordKind::Sector => header.numsectors,
                    RecordKind::Wall => header.numwalls,
                    RecordKind::Sprite => header.numsprites,
                };
                Ok(count as usize)
            }
            CountSource::Inline => {
                let section = match kind {
                    RecordKind::Sector => "sector count",
                    RecordKind::Wall => "wall count",
                    RecordKind::Sprite => "sprite count",
                };
                let count = stream.take_u16(section)?;
                match kind {
                    RecordKind::Sector => header.numsectors = count,
                    RecordKind::Wall => header.numwalls = count,
                    RecordKind::Sprite => header.numsprites = count,
                }
                Ok(count as usize)
            }
        }
    }

    fn read_table<T: Record, R: Read>(
        &self,
        stream: &mut ByteStream<R>,
        header: &Header,
        kind: RecordKind,
        count: usize,
    ) -> Result<Vec<T>> {
        let key = self.config.keys.record(kind).derive(header);
        let payload_size = self.config.payload_size(header, kind)?;
        let (section, payload_section) = match kind {
            RecordKind::Sector => ("sectors", "sector payload"),
            RecordKind::Wall => ("walls", "wall payload"),
            RecordKind::Sprite => ("sprites", "sprite payload"),
        };
        debug!(
            "{}: reading {} {}s at offset {} (key {:?})",
            self.config.name,
            count,
            kind.name(),
            stream.pos,
            key
        );

        let mut records = Vec::with_capacity(count);
        for index in 0..count {
            // Each record is its own encrypted region.
            let raw = stream.take_decrypted(T::SIZE, section, key)?;
            let mut record = T::decode(&raw)?;
            if let Some(size) = payload_size {
                if record.discriminant() > 0 {
                    trace!("{} {} owns a {}-byte payload", kind.name(), index, size);
                    let payload = stream.take(size, payload_section)?;
                    record.set_payload(Some(payload));
                }
            }
            records.push(record);
        }
        Ok(records)
    }
}

fn decode_header(schema: &RecordSchema, raw: &[u8], header: &mut Header) -> Result<()> {
    let mut cursor = raw;
    for field in schema.fields {
        if !field.kind.is_scalar() {
            return Err(MapError::UnsupportedVariant(format!(
                "header field '{}' is not a scalar",
                field.name
            )));
        }
        let value = field.kind.read_value(&mut cursor)?;
        header.set_field(field.name, value)?;
    }
    Ok(())
}

fn read_sky_table<R: Read>(stream: &mut ByteStream<R>, rule: KeyRule, header: &Header) -> Result<Vec<i16>> {
    if !(0..=MAX_SKY_BITS).contains(&header.skybits) {
        return Err(MapError::Format(format!(
            "sky bits {} outside 0..={}",
            header.skybits, MAX_SKY_BITS
        )));
    }
    let count = 1usize << header.skybits;
    let raw = stream.take_decrypted(count * 2, "sky offsets", rule.derive(header))?;
    Ok(raw
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect())
}
