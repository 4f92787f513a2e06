use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

/// On-disk width and signedness of a single field.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FieldKind {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    /// Opaque run of bytes, stored verbatim.
    Bytes(usize),
}

impl FieldKind {
    pub const fn width(self) -> usize {
        match self {
            FieldKind::I8 | FieldKind::U8 => 1,
            FieldKind::I16 | FieldKind::U16 => 2,
            FieldKind::I32 | FieldKind::U32 => 4,
            FieldKind::Bytes(n) => n,
        }
    }

    pub const fn is_signed(self) -> bool {
        matches!(self, FieldKind::I8 | FieldKind::I16 | FieldKind::I32)
    }

    pub const fn is_scalar(self) -> bool {
        !matches!(self, FieldKind::Bytes(_))
    }

    /// Whether `value` can be stored in this field without truncation.
    pub fn fits(self, value: i64) -> bool {
        let (min, max) = match self {
            FieldKind::I8 => (i8::MIN as i64, i8::MAX as i64),
            FieldKind::U8 => (0, u8::MAX as i64),
            FieldKind::I16 => (i16::MIN as i64, i16::MAX as i64),
            FieldKind::U16 => (0, u16::MAX as i64),
            FieldKind::I32 => (i32::MIN as i64, i32::MAX as i64),
            FieldKind::U32 => (0, u32::MAX as i64),
            FieldKind::Bytes(_) => return false,
        };
        value >= min && value <= max
    }

    pub fn read_value<R: Read>(self, r: &mut R) -> io::Result<i64> {
        let value = match self {
            FieldKind::I8 => r.read_i8()? as i64,
            FieldKind::U8 => r.read_u8()? as i64,
            FieldKind::I16 => r.read_i16::<LittleEndian>()? as i64,
            FieldKind::U16 => r.read_u16::<LittleEndian>()? as i64,
            FieldKind::I32 => r.read_i32::<LittleEndian>()? as i64,
            FieldKind::U32 => r.read_u32::<LittleEndian>()? as i64,
            FieldKind::Bytes(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "opaque byte fields have no scalar value",
                ))
            }
        };
        Ok(value)
    }

    /// Writes `value` truncated to this width. Callers range-check with
    /// [`FieldKind::fits`] first.
    pub fn write_value<W: Write>(self, w: &mut W, value: i64) -> io::Result<()> {
        match self {
            FieldKind::I8 => w.write_i8(value as i8),
            FieldKind::U8 => w.write_u8(value as u8),
            FieldKind::I16 => w.write_i16::<LittleEndian>(value as i16),
            FieldKind::U16 => w.write_u16::<LittleEndian>(value as u16),
            FieldKind::I32 => w.write_i32::<LittleEndian>(value as i32),
            FieldKind::U32 => w.write_u32::<LittleEndian>(value as u32),
            FieldKind::Bytes(_) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "opaque byte fields have no scalar value",
            )),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind }
    }
}

/// Ordered, positional layout of one record kind. Field `i` always occupies
/// the same byte range; there are no tags or lengths in the encoding.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RecordSchema {
    pub name: &'static str,
    pub fields: &'static [FieldSpec],
}

impl RecordSchema {
    pub const fn encoded_size(&self) -> usize {
        let mut total = 0;
        let mut i = 0;
        while i < self.fields.len() {
            total += self.fields[i].kind.width();
            i += 1;
        }
        total
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Byte offset of `name` from the start of the record.
    pub fn offset_of(&self, name: &str) -> Option<usize> {
        let mut offset = 0;
        for f in self.fields {
            if f.name == name {
                return Some(offset);
            }
            offset += f.kind.width();
        }
        None
    }

    pub fn field_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|f| f.name)
    }
}

/// Rust integer types that map one-to-one onto a scalar [`FieldKind`].
pub trait Primitive: Copy {
    const KIND: FieldKind;

    fn read_le<R: Read>(r: &mut R) -> io::Result<Self>;
    fn write_le<W: Write>(self, w: &mut W) -> io::Result<()>;
}

impl Primitive for i8 {
    const KIND: FieldKind = FieldKind::I8;

    fn read_le<R: Read>(r: &mut R) -> io::Result<Self> {
        r.read_i8()
    }

    fn write_le<W: Write>(self, w: &mut W) -> io::Result<()> {
        w.write_i8(self)
    }
}

impl Primitive for u8 {
    const KIND: FieldKind = FieldKind::U8;

    fn read_le<R: Read>(r: &mut R) -> io::Result<Self> {
        r.read_u8()
    }

    fn write_le<W: Write>(self, w: &mut W) -> io::Result<()> {
        w.write_u8(self)
    }
}

macro_rules! wide_primitive {
    ($ty:ty, $kind:ident, $read:ident, $write:ident) => {
        impl Primitive for $ty {
            const KIND: FieldKind = FieldKind::$kind;

            fn read_le<R: Read>(r: &mut R) -> io::Result<Self> {
                r.$read::<LittleEndian>()
            }

            fn write_le<W: Write>(self, w: &mut W) -> io::Result<()> {
                w.$write::<LittleEndian>(self)
            }
        }
    };
}

wide_primitive!(i16, I16, read_i16, write_i16);
wide_primitive!(u16, U16, read_u16, write_u16);
wide_primitive!(i32, I32, read_i32, write_i32);
wide_primitive!(u32, U32, read_u32, write_u32);

/// A fixed-shape map record (sector, wall or sprite) with an optional opaque
/// payload slot that lives outside the fixed layout.
pub trait Record: Sized {
    const SCHEMA: RecordSchema;
    const SIZE: usize = Self::SCHEMA.encoded_size();

    fn read_fields<R: Read>(r: &mut R) -> io::Result<Self>;
    fn write_fields<W: Write>(&self, w: &mut W) -> io::Result<()>;

    /// The "extra" discriminant; a positive value means a payload follows.
    fn discriminant(&self) -> i16;
    fn payload(&self) -> Option<&[u8]>;
    fn set_payload(&mut self, payload: Option<Vec<u8>>);

    fn decode(buf: &[u8]) -> io::Result<Self> {
        let mut cursor = buf;
        Self::read_fields(&mut cursor)
    }

    fn encode_into(&self, out: &mut Vec<u8>) -> io::Result<()> {
        self.write_fields(out)
    }
}

/// Declares a record struct whose field order *is* its on-disk order. The
/// schema, decoder and encoder are all generated from the one declaration.
/// Every record must declare an `extra: i16` discriminant.
macro_rules! record {
    (
        $(#[$meta:meta])*
        pub struct $name:ident as $label:literal {
            $( $(#[$fmeta:meta])* $field:ident : $ty:ty, )+
        }
    ) => {
        $(#[$meta])*
        pub struct $name {
            $( $(#[$fmeta])* pub $field: $ty, )+
            /// Opaque trailing block, owned only when `extra > 0` under a
            /// variant that carries payloads.
            #[serde(default, skip_serializing_if = "Option::is_none")]
            pub payload: Option<Vec<u8>>,
        }

        impl $crate::schema::Record for $name {
            const SCHEMA: $crate::schema::RecordSchema = $crate::schema::RecordSchema {
                name: $label,
                fields: &[
                    $( $crate::schema::FieldSpec::new(
                        stringify!($field),
                        <$ty as $crate::schema::Primitive>::KIND,
                    ), )+
                ],
            };

            fn read_fields<R: std::io::Read>(r: &mut R) -> std::io::Result<Self> {
                Ok(Self {
                    $( $field: <$ty as $crate::schema::Primitive>::read_le(r)?, )+
                    payload: None,
                })
            }

            fn write_fields<W: std::io::Write>(&self, w: &mut W) -> std::io::Result<()> {
                $( $crate::schema::Primitive::write_le(self.$field, w)?; )+
                Ok(())
            }

            fn discriminant(&self) -> i16 {
                self.extra
            }

            fn payload(&self) -> Option<&[u8]> {
                self.payload.as_deref()
            }

            fn set_payload(&mut self, payload: Option<Vec<u8>>) {
                self.payload = payload;
            }
        }
    };
}

pub(crate) use record;
