use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

use crate::schema::{record, FieldKind, FieldSpec, Record, RecordSchema};
use crate::{MapError, Result};

record! {
    /// A closed floor/ceiling region bounded by `walls[wallptr..wallptr + wallnum]`.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Sector as "sector" {
        wallptr: i16,
        wallnum: i16,
        ceilingz: i32,
        floorz: i32,
        ceilingstat: i16,
        floorstat: i16,
        ceilingpicnum: i16,
        ceilingheinum: i16,
        ceilingshade: i8,
        ceilingpal: u8,
        ceilingxpanning: u8,
        ceilingypanning: u8,
        floorpicnum: i16,
        floorheinum: i16,
        floorshade: i8,
        floorpal: u8,
        floorxpanning: u8,
        floorypanning: u8,
        visibility: u8,
        filler: u8,
        lotag: i16,
        hitag: i16,
        extra: i16,
    }
}

record! {
    /// One edge of a sector boundary. `point2` is the index of the next wall
    /// in the loop; `nextwall`/`nextsector` are -1 unless the wall is a portal.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Wall as "wall" {
        x: i32,
        y: i32,
        point2: i16,
        nextwall: i16,
        nextsector: i16,
        cstat: i16,
        picnum: i16,
        overpicnum: i16,
        shade: i8,
        pal: u8,
        xrepeat: u8,
        yrepeat: u8,
        xpanning: u8,
        ypanning: u8,
        lotag: i16,
        hitag: i16,
        extra: i16,
    }
}

record! {
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Sprite as "sprite" {
        x: i32,
        y: i32,
        z: i32,
        cstat: i16,
        picnum: i16,
        shade: i8,
        pal: u8,
        clipdist: u8,
        filler: u8,
        xrepeat: u8,
        yrepeat: u8,
        xoffset: i8,
        yoffset: i8,
        sectnum: i16,
        statnum: i16,
        ang: i16,
        owner: i16,
        xvel: i16,
        yvel: i16,
        zvel: i16,
        lotag: i16,
        hitag: i16,
        extra: i16,
    }
}

impl Default for Sector {
    fn default() -> Self {
        Self {
            wallptr: 0,
            wallnum: 0,
            ceilingz: 0,
            floorz: 0,
            ceilingstat: 0,
            floorstat: 0,
            ceilingpicnum: 0,
            ceilingheinum: 0,
            ceilingshade: 0,
            ceilingpal: 0,
            ceilingxpanning: 0,
            ceilingypanning: 0,
            floorpicnum: 0,
            floorheinum: 0,
            floorshade: 0,
            floorpal: 0,
            floorxpanning: 0,
            floorypanning: 0,
            visibility: 0,
            filler: 0,
            lotag: 0,
            hitag: 0,
            extra: -1,
            payload: None,
        }
    }
}

impl Default for Wall {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            point2: 0,
            nextwall: -1,
            nextsector: -1,
            cstat: 0,
            picnum: 0,
            overpicnum: 0,
            shade: 0,
            pal: 0,
            xrepeat: 8,
            yrepeat: 8,
            xpanning: 0,
            ypanning: 0,
            lotag: 0,
            hitag: 0,
            extra: -1,
            payload: None,
        }
    }
}

impl Default for Sprite {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            z: 0,
            cstat: 0,
            picnum: 0,
            shade: 0,
            pal: 0,
            clipdist: 32,
            filler: 0,
            xrepeat: 64,
            yrepeat: 64,
            xoffset: 0,
            yoffset: 0,
            sectnum: 0,
            statnum: 0,
            ang: 0,
            owner: -1,
            xvel: 0,
            yvel: 0,
            zvel: 0,
            lotag: 0,
            hitag: 0,
            extra: -1,
            payload: None,
        }
    }
}

pub const COPYRIGHT_LEN: usize = 64;
pub const EXTRA_INFO_PADDING_LEN: usize = 52;

pub const DEFAULT_COPYRIGHT: &[u8] = b"Copyright 1997 Monolith Productions.  All Rights Reserved";

pub const EXTRA_INFO_SCHEMA: RecordSchema = RecordSchema {
    name: "extra info",
    fields: &[
        FieldSpec::new("copyright", FieldKind::Bytes(COPYRIGHT_LEN)),
        FieldSpec::new("xsprite_size", FieldKind::I32),
        FieldSpec::new("xwall_size", FieldKind::I32),
        FieldSpec::new("xsector_size", FieldKind::I32),
        FieldSpec::new("padding", FieldKind::Bytes(EXTRA_INFO_PADDING_LEN)),
    ],
};

/// The metadata block that follows the header in variants that carry it.
/// The three sizes gate the opaque payloads of sprites, walls and sectors;
/// copyright and padding are kept byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraInfo {
    pub copyright: Vec<u8>,
    pub xsprite_size: i32,
    pub xwall_size: i32,
    pub xsector_size: i32,
    pub padding: Vec<u8>,
}

impl Default for ExtraInfo {
    fn default() -> Self {
        let mut copyright = DEFAULT_COPYRIGHT.to_vec();
        copyright.resize(COPYRIGHT_LEN, 0);
        Self {
            copyright,
            xsprite_size: 56,
            xwall_size: 24,
            xsector_size: 60,
            padding: vec![0; EXTRA_INFO_PADDING_LEN],
        }
    }
}

impl ExtraInfo {
    pub const SIZE: usize = EXTRA_INFO_SCHEMA.encoded_size();

    pub(crate) fn decode(buf: &[u8]) -> Result<Self> {
        let mut r = buf;
        let mut copyright = vec![0u8; COPYRIGHT_LEN];
        r.read_exact(&mut copyright)?;
        let xsprite_size = r.read_i32::<LittleEndian>()?;
        let xwall_size = r.read_i32::<LittleEndian>()?;
        let xsector_size = r.read_i32::<LittleEndian>()?;
        let mut padding = vec![0u8; EXTRA_INFO_PADDING_LEN];
        r.read_exact(&mut padding)?;
        Ok(Self {
            copyright,
            xsprite_size,
            xwall_size,
            xsector_size,
            padding,
        })
    }

    pub(crate) fn encode_into(&self, out: &mut Vec<u8>) -> Result<()> {
        if self.copyright.len() != COPYRIGHT_LEN {
            return Err(MapError::BlockSize {
                block: "extra info copyright",
                expected: COPYRIGHT_LEN,
                actual: self.copyright.len(),
            });
        }
        if self.padding.len() != EXTRA_INFO_PADDING_LEN {
            return Err(MapError::BlockSize {
                block: "extra info padding",
                expected: EXTRA_INFO_PADDING_LEN,
                actual: self.padding.len(),
            });
        }
        out.write_all(&self.copyright)?;
        out.write_i32::<LittleEndian>(self.xsprite_size)?;
        out.write_i32::<LittleEndian>(self.xwall_size)?;
        out.write_i32::<LittleEndian>(self.xsector_size)?;
        out.write_all(&self.padding)?;
        Ok(())
    }

    /// Payload size for `kind`, or a format error if the block declares a
    /// negative size.
    pub fn payload_size(&self, kind: RecordKind) -> Result<usize> {
        let size = match kind {
            RecordKind::Sector => self.xsector_size,
            RecordKind::Wall => self.xwall_size,
            RecordKind::Sprite => self.xsprite_size,
        };
        usize::try_from(size).map_err(|_| {
            MapError::Format(format!("negative {} payload size {}", kind.name(), size))
        })
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum RecordKind {
    Sector,
    Wall,
    Sprite,
}

impl RecordKind {
    pub const ALL: [RecordKind; 3] = [RecordKind::Sector, RecordKind::Wall, RecordKind::Sprite];

    pub fn name(self) -> &'static str {
        match self {
            RecordKind::Sector => "sector",
            RecordKind::Wall => "wall",
            RecordKind::Sprite => "sprite",
        }
    }

    pub fn schema(self) -> RecordSchema {
        match self {
            RecordKind::Sector => Sector::SCHEMA,
            RecordKind::Wall => Wall::SCHEMA,
            RecordKind::Sprite => Sprite::SCHEMA,
        }
    }
}

/// Union of every header field any supported variant stores. A variant's
/// header schema picks the subset (and order) it encodes; fields it does not
/// store keep whatever the model holds.
///
/// `numsectors`/`numwalls`/`numsprites` are only meaningful right after a
/// read. Writers derive them from the record sequences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub version: i32,
    pub posx: i32,
    pub posy: i32,
    pub posz: i32,
    pub ang: i16,
    pub cursectnum: i16,
    pub skybits: i16,
    pub visibility: i32,
    pub songid: i32,
    pub parallaxtype: u8,
    pub revision: i32,
    pub numsectors: u16,
    pub numwalls: u16,
    pub numsprites: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_info: Option<ExtraInfo>,
    /// Parallax sky tile offsets, `1 << skybits` entries when present.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sky_offsets: Vec<i16>,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            version: 7,
            posx: 0,
            posy: 0,
            posz: 0,
            ang: 0,
            cursectnum: 0,
            skybits: 0,
            visibility: 0,
            songid: 0,
            parallaxtype: 2,
            revision: 0,
            numsectors: 0,
            numwalls: 0,
            numsprites: 0,
            extra_info: None,
            sky_offsets: Vec::new(),
        }
    }
}

impl Header {
    /// Scalar value of the field a header schema calls `name`.
    pub fn field(&self, name: &str) -> Result<i64> {
        let value = match name {
            "version" => self.version as i64,
            "posx" => self.posx as i64,
            "posy" => self.posy as i64,
            "posz" => self.posz as i64,
            "ang" => self.ang as i64,
            "cursectnum" => self.cursectnum as i64,
            "skybits" => self.skybits as i64,
            "visibility" => self.visibility as i64,
            "songid" => self.songid as i64,
            "parallaxtype" => self.parallaxtype as i64,
            "revision" => self.revision as i64,
            "numsectors" => self.numsectors as i64,
            "numwalls" => self.numwalls as i64,
            "numsprites" => self.numsprites as i64,
            other => return Err(unknown_field(other)),
        };
        Ok(value)
    }

    pub fn set_field(&mut self, name: &str, value: i64) -> Result<()> {
        match name {
            "version" => self.version = narrow(name, value)?,
            "posx" => self.posx = narrow(name, value)?,
            "posy" => self.posy = narrow(name, value)?,
            "posz" => self.posz = narrow(name, value)?,
            "ang" => self.ang = narrow(name, value)?,
            "cursectnum" => self.cursectnum = narrow(name, value)?,
            "skybits" => self.skybits = narrow(name, value)?,
            "visibility" => self.visibility = narrow(name, value)?,
            "songid" => self.songid = narrow(name, value)?,
            "parallaxtype" => self.parallaxtype = narrow(name, value)?,
            "revision" => self.revision = narrow(name, value)?,
            "numsectors" => self.numsectors = narrow(name, value)?,
            "numwalls" => self.numwalls = narrow(name, value)?,
            "numsprites" => self.numsprites = narrow(name, value)?,
            other => return Err(unknown_field(other)),
        }
        Ok(())
    }
}

fn unknown_field(name: &str) -> MapError {
    MapError::UnsupportedVariant(format!("header has no field named '{name}'"))
}

fn narrow<T: TryFrom<i64>>(field: &str, value: i64) -> Result<T> {
    T::try_from(value).map_err(|_| MapError::FieldOverflow {
        field: field.to_string(),
        value,
    })
}

/// A reference between records that points outside the map. Reported by
/// [`Map::check_links`]; the codec itself never rejects these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkIssue {
    SectorWalls { sector: usize, wallptr: i16, wallnum: i16 },
    Point2 { wall: usize, point2: i16 },
    NextWall { wall: usize, nextwall: i16 },
    NextSector { wall: usize, nextsector: i16 },
    SpriteSector { sprite: usize, sectnum: i16 },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Map {
    pub header: Header,
    pub sectors: Vec<Sector>,
    pub walls: Vec<Wall>,
    pub sprites: Vec<Sprite>,
}

impl Map {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites the header counts with the current sequence lengths.
    pub fn sync_counts(&mut self) -> Result<()> {
        self.header.numsectors = count_u16("numsectors", self.sectors.len())?;
        self.header.numwalls = count_u16("numwalls", self.walls.len())?;
        self.header.numsprites = count_u16("numsprites", self.sprites.len())?;
        Ok(())
    }

    /// Appends `sector` together with a closed loop of walls through
    /// `points`, wiring `wallptr`, `wallnum` and each `point2`. Returns the
    /// new sector's index.
    pub fn push_sector_loop(&mut self, mut sector: Sector, points: &[(i32, i32)], template: &Wall) -> Result<usize> {
        let first = self.walls.len();
        let last = first + points.len();
        sector.wallptr = narrow("wallptr", first as i64)?;
        sector.wallnum = narrow("wallnum", points.len() as i64)?;

        for (i, &(x, y)) in points.iter().enumerate() {
            let next = if first + i + 1 == last { first } else { first + i + 1 };
            let mut wall = template.clone();
            wall.x = x;
            wall.y = y;
            wall.point2 = narrow("point2", next as i64)?;
            self.walls.push(wall);
        }

        self.sectors.push(sector);
        Ok(self.sectors.len() - 1)
    }

    pub fn check_links(&self) -> Vec<LinkIssue> {
        let num_walls = self.walls.len() as i64;
        let num_sectors = self.sectors.len() as i64;
        let mut issues = Vec::new();

        for (i, s) in self.sectors.iter().enumerate() {
            let start = s.wallptr as i64;
            let end = start + s.wallnum as i64;
            if start < 0 || s.wallnum < 0 || end > num_walls {
                issues.push(LinkIssue::SectorWalls {
                    sector: i,
                    wallptr: s.wallptr,
                    wallnum: s.wallnum,
                });
            }
        }

        for (i, w) in self.walls.iter().enumerate() {
            if !(0..num_walls).contains(&(w.point2 as i64)) {
                issues.push(LinkIssue::Point2 { wall: i, point2: w.point2 });
            }
            if w.nextwall != -1 && !(0..num_walls).contains(&(w.nextwall as i64)) {
                issues.push(LinkIssue::NextWall { wall: i, nextwall: w.nextwall });
            }
            if w.nextsector != -1 && !(0..num_sectors).contains(&(w.nextsector as i64)) {
                issues.push(LinkIssue::NextSector { wall: i, nextsector: w.nextsector });
            }
        }

        for (i, s) in self.sprites.iter().enumerate() {
            if !(0..num_sectors).contains(&(s.sectnum as i64)) {
                issues.push(LinkIssue::SpriteSector { sprite: i, sectnum: s.sectnum });
            }
        }

        issues
    }
}

pub(crate) fn count_u16(field: &str, len: usize) -> Result<u16> {
    u16::try_from(len).map_err(|_| MapError::FieldOverflow {
        field: field.to_string(),
        value: len as i64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_sizes_match_build_layout() {
        assert_eq!(Sector::SIZE, 40);
        assert_eq!(Wall::SIZE, 32);
        assert_eq!(Sprite::SIZE, 44);
        assert_eq!(ExtraInfo::SIZE, 128);
    }

    #[test]
    fn wall_field_order_is_explicit() {
        let names: Vec<_> = Wall::SCHEMA.field_names().collect();
        assert_eq!(
            names,
            vec![
                "x", "y", "point2", "nextwall", "nextsector", "cstat", "picnum", "overpicnum",
                "shade", "pal", "xrepeat", "yrepeat", "xpanning", "ypanning", "lotag", "hitag",
                "extra",
            ]
        );
        assert_eq!(Wall::SCHEMA.offset_of("shade"), Some(20));
        assert_eq!(Wall::SCHEMA.offset_of("extra"), Some(30));
    }

    #[test]
    fn sector_and_sprite_offsets() {
        assert_eq!(Sector::SCHEMA.offset_of("ceilingshade"), Some(20));
        assert_eq!(Sector::SCHEMA.offset_of("visibility"), Some(32));
        assert_eq!(Sector::SCHEMA.offset_of("extra"), Some(38));
        assert_eq!(Sprite::SCHEMA.offset_of("sectnum"), Some(24));
        assert_eq!(Sprite::SCHEMA.offset_of("extra"), Some(42));
    }

    #[test]
    fn wall_decodes_positionally() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&(-512i32).to_le_bytes());
        raw.extend_from_slice(&1024i32.to_le_bytes());
        for v in [3i16, -1, -1, 0x41, 0, 0] {
            raw.extend_from_slice(&v.to_le_bytes());
        }
        raw.extend_from_slice(&[0xF0, 5, 32, 8, 1, 2]);
        for v in [7i16, 9, 2] {
            raw.extend_from_slice(&v.to_le_bytes());
        }
        assert_eq!(raw.len(), Wall::SIZE);

        let wall = Wall::decode(&raw).unwrap();
        assert_eq!(wall.x, -512);
        assert_eq!(wall.y, 1024);
        assert_eq!(wall.point2, 3);
        assert_eq!(wall.nextwall, -1);
        assert_eq!(wall.cstat, 0x41);
        assert_eq!(wall.shade, -16);
        assert_eq!(wall.pal, 5);
        assert_eq!(wall.xrepeat, 32);
        assert_eq!(wall.ypanning, 2);
        assert_eq!(wall.lotag, 7);
        assert_eq!(wall.hitag, 9);
        assert_eq!(wall.extra, 2);
        assert_eq!(wall.payload, None);

        let mut out = Vec::new();
        wall.encode_into(&mut out).unwrap();
        assert_eq!(out, raw);
    }

    #[test]
    fn extra_info_keeps_opaque_bytes() {
        let mut info = ExtraInfo::default();
        info.padding[51] = 0xAA;
        let mut out = Vec::new();
        info.encode_into(&mut out).unwrap();
        assert_eq!(out.len(), ExtraInfo::SIZE);
        assert_eq!(&out[..DEFAULT_COPYRIGHT.len()], DEFAULT_COPYRIGHT);
        assert_eq!(ExtraInfo::decode(&out).unwrap(), info);
    }

    #[test]
    fn extra_info_rejects_wrong_block_lengths() {
        let info = ExtraInfo {
            copyright: vec![0; 10],
            ..ExtraInfo::default()
        };
        let err = info.encode_into(&mut Vec::new()).unwrap_err();
        assert!(matches!(err, MapError::BlockSize { expected: 64, actual: 10, .. }));
    }

    #[test]
    fn negative_payload_size_is_a_format_error() {
        let info = ExtraInfo {
            xwall_size: -4,
            ..ExtraInfo::default()
        };
        assert_eq!(info.payload_size(RecordKind::Sector).unwrap(), 60);
        assert!(matches!(info.payload_size(RecordKind::Wall), Err(MapError::Format(_))));
    }

    #[test]
    fn header_fields_by_name() {
        let mut header = Header::default();
        header.set_field("posx", -100).unwrap();
        header.set_field("numwalls", 4).unwrap();
        assert_eq!(header.field("posx").unwrap(), -100);
        assert_eq!(header.numwalls, 4);
        assert!(matches!(header.field("nosuch"), Err(MapError::UnsupportedVariant(_))));
        assert!(matches!(
            header.set_field("ang", 70_000),
            Err(MapError::FieldOverflow { .. })
        ));
    }

    #[test]
    fn push_sector_loop_closes_the_polygon() {
        let mut map = Map::new();
        let square = [(0, 0), (512, 0), (512, 512), (0, 512)];
        map.push_sector_loop(Sector::default(), &square, &Wall::default()).unwrap();
        let second = map
            .push_sector_loop(Sector::default(), &square, &Wall::default())
            .unwrap();

        assert_eq!(second, 1);
        assert_eq!(map.sectors[1].wallptr, 4);
        assert_eq!(map.sectors[1].wallnum, 4);
        let loop_links: Vec<_> = map.walls[4..].iter().map(|w| w.point2).collect();
        assert_eq!(loop_links, vec![5, 6, 7, 4]);
        assert!(map.check_links().is_empty());
    }

    #[test]
    fn check_links_reports_without_failing() {
        let mut map = Map::new();
        map.sectors.push(Sector {
            wallptr: 2,
            wallnum: 4,
            ..Sector::default()
        });
        map.walls.push(Wall {
            point2: 9,
            nextsector: 3,
            ..Wall::default()
        });
        map.sprites.push(Sprite {
            sectnum: -1,
            ..Sprite::default()
        });

        let issues = map.check_links();
        assert_eq!(
            issues,
            vec![
                LinkIssue::SectorWalls { sector: 0, wallptr: 2, wallnum: 4 },
                LinkIssue::Point2 { wall: 0, point2: 9 },
                LinkIssue::NextSector { wall: 0, nextsector: 3 },
                LinkIssue::SpriteSector { sprite: 0, sectnum: -1 },
            ]
        );
    }

    #[test]
    fn sync_counts_overwrites_stale_values() {
        let mut map = Map::new();
        map.header.numwalls = 99;
        map.walls.push(Wall::default());
        map.sync_counts().unwrap();
        assert_eq!(map.header.numwalls, 1);
        assert_eq!(map.header.numsectors, 0);
    }
}
