//! Auxiliary tag views and the two-pass aux parser.
//!
//! Aux data is a self-describing stream of typed fields: two tag bytes, one
//! type byte, then a payload whose length the type determines. The parser
//! walks a raw byte range twice -- a count pass to size the record's field
//! directory, then an index pass recording each field's sub-slice -- without
//! copying any payload. [`Aux`] decodes a single field in place.

use std::fmt;

use bstr::ByteSlice;
use itertools::Itertools;

use crate::errors::{BamRecError, Result};

/// A two-byte aux tag id.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag(pub [u8; 2]);

impl Tag {
    /// The tag bytes.
    #[inline]
    #[must_use]
    pub fn bytes(self) -> [u8; 2] {
        self.0
    }
}

impl From<[u8; 2]> for Tag {
    fn from(bytes: [u8; 2]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.0[0] as char, self.0[1] as char)
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Fixed payload sizes indexed by type byte. 0 = variable or unknown.
pub(crate) const TAG_FIXED_SIZES: [u8; 256] = {
    let mut table = [0u8; 256];
    table[b'A' as usize] = 1;
    table[b'c' as usize] = 1;
    table[b'C' as usize] = 1;
    table[b's' as usize] = 2;
    table[b'S' as usize] = 2;
    table[b'i' as usize] = 4;
    table[b'I' as usize] = 4;
    table[b'f' as usize] = 4;
    table
};

/// Payload size for a field of type `val_type` whose payload starts `data`.
///
/// For Z/H the size includes the NUL terminator; for B it covers the element
/// type byte, the count, and all elements. `None` if the type is unknown, a
/// NUL is missing, or a B header is truncated or has a non-scalar subtype.
#[must_use]
pub fn tag_value_size(val_type: u8, data: &[u8]) -> Option<usize> {
    let fixed = TAG_FIXED_SIZES[val_type as usize];
    if fixed > 0 {
        return Some(fixed as usize);
    }
    match val_type {
        b'Z' | b'H' => Some(data.iter().position(|&b| b == 0)? + 1),
        b'B' => {
            if data.len() < 5 {
                return None;
            }
            let elem_type = data[0];
            let count = u32::from_le_bytes([data[1], data[2], data[3], data[4]]) as usize;
            let elem_size = TAG_FIXED_SIZES[elem_type as usize] as usize;
            if elem_size == 0 || elem_type == b'A' {
                return None;
            }
            Some(5 + count.checked_mul(elem_size)?)
        }
        _ => None,
    }
}

/// Walk a raw aux byte range, invoking `visit` with each field's `[start,
/// end)` offsets. Shared by the count and index passes.
fn walk_aux_fields<F>(aux: &[u8], mut visit: F) -> Result<usize>
where
    F: FnMut(usize, usize),
{
    let mut n = 0;
    let mut p = 0;
    // Trailing fragments of fewer than 3 bytes cannot open a field.
    while p + 2 < aux.len() {
        let val_type = aux[p + 2];
        let size = tag_value_size(val_type, &aux[p + 3..])
            .ok_or(BamRecError::CorruptAuxField("unrecognized type or truncated header"))?;
        let end = p + 3 + size;
        if end > aux.len() {
            return Err(BamRecError::CorruptAuxField("field payload extends past buffer"));
        }
        visit(p, end);
        n += 1;
        p = end;
    }
    Ok(n)
}

/// Count pass: the number of fields in a raw aux byte range.
pub fn count_aux_fields(aux: &[u8]) -> Result<usize> {
    walk_aux_fields(aux, |_, _| {})
}

/// Index pass: report each field's `[start, end)` sub-slice offsets.
///
/// Z/H sub-slices include the trailing NUL; B sub-slices include the header
/// and all elements.
pub fn index_aux_fields<F>(aux: &[u8], visit: F) -> Result<usize>
where
    F: FnMut(usize, usize),
{
    walk_aux_fields(aux, visit)
}

/// The canonical value of an aux field.
///
/// Integer widths all promote to `Int`; `Hex` carries the raw hex digits
/// undecoded.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AuxValue<'a> {
    /// `A`: a single printable character.
    Char(u8),
    /// `c`/`C`/`s`/`S`/`i`/`I`: any integer width, promoted.
    Int(i64),
    /// `f`: a 32-bit float.
    Float(f32),
    /// `Z`: printable bytes, NUL stripped.
    String(&'a [u8]),
    /// `H`: hex-digit bytes, NUL stripped.
    Hex(&'a [u8]),
    /// `B`: a typed scalar array.
    Array(AuxArray<'a>),
}

/// Zero-copy view of a B-type array payload.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AuxArray<'a> {
    elem_type: u8,
    data: &'a [u8],
}

impl<'a> AuxArray<'a> {
    /// The scalar element type byte (`c`, `C`, `s`, `S`, `i`, `I`, or `f`).
    #[inline]
    #[must_use]
    pub fn elem_type(&self) -> u8 {
        self.elem_type
    }

    /// Number of elements.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len() / TAG_FIXED_SIZES[self.elem_type as usize].max(1) as usize
    }

    /// Whether the array is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The raw little-endian element bytes.
    #[inline]
    #[must_use]
    pub fn raw(&self) -> &'a [u8] {
        self.data
    }

    /// The `i`th element as an integer; `None` for float arrays or out-of-
    /// range indexes.
    #[must_use]
    pub fn int(&self, i: usize) -> Option<i64> {
        if i >= self.len() {
            return None;
        }
        let off = i * TAG_FIXED_SIZES[self.elem_type as usize] as usize;
        let d = self.data;
        match self.elem_type {
            b'c' => Some(i64::from(d[off].cast_signed())),
            b'C' => Some(i64::from(d[off])),
            b's' => Some(i64::from(i16::from_le_bytes([d[off], d[off + 1]]))),
            b'S' => Some(i64::from(u16::from_le_bytes([d[off], d[off + 1]]))),
            b'i' => Some(i64::from(i32::from_le_bytes([d[off], d[off + 1], d[off + 2], d[off + 3]]))),
            b'I' => Some(i64::from(u32::from_le_bytes([d[off], d[off + 1], d[off + 2], d[off + 3]]))),
            _ => None,
        }
    }

    /// The `i`th element as a float; `None` unless the subtype is `f`.
    #[must_use]
    pub fn float(&self, i: usize) -> Option<f32> {
        if self.elem_type != b'f' || i >= self.len() {
            return None;
        }
        let off = i * 4;
        let d = self.data;
        Some(f32::from_le_bytes([d[off], d[off + 1], d[off + 2], d[off + 3]]))
    }
}

/// A zero-copy view over one aux field: tag (2 bytes), type byte, payload.
///
/// For Z/H fields the view includes the trailing NUL.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Aux<'a>(&'a [u8]);

impl<'a> Aux<'a> {
    /// Wrap a validated field sub-slice.
    #[inline]
    #[must_use]
    pub(crate) fn new_unchecked(bytes: &'a [u8]) -> Self {
        Self(bytes)
    }

    /// Wrap a byte slice holding exactly one field, validating its layout.
    pub fn from_bytes(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() < 4 {
            return Err(BamRecError::CorruptAuxField("field shorter than 4 bytes"));
        }
        let size = tag_value_size(bytes[2], &bytes[3..])
            .ok_or(BamRecError::CorruptAuxField("unrecognized type or truncated header"))?;
        if bytes.len() != 3 + size {
            return Err(BamRecError::CorruptAuxField("field length disagrees with type"));
        }
        Ok(Self(bytes))
    }

    /// The raw field bytes, tag and type byte included.
    #[inline]
    #[must_use]
    pub fn bytes(&self) -> &'a [u8] {
        self.0
    }

    /// The two-byte tag id.
    #[inline]
    #[must_use]
    pub fn tag(&self) -> Tag {
        Tag([self.0[0], self.0[1]])
    }

    /// The type byte.
    #[inline]
    #[must_use]
    pub fn type_byte(&self) -> u8 {
        self.0[2]
    }

    /// Whether the underlying type is one of the integer widths.
    #[inline]
    #[must_use]
    pub fn is_int(&self) -> bool {
        matches!(self.type_byte(), b'c' | b'C' | b's' | b'S' | b'i' | b'I')
    }

    /// Decode the canonical value.
    pub fn value(&self) -> Result<AuxValue<'a>> {
        let payload = &self.0[3..];
        match self.type_byte() {
            b'A' => Ok(AuxValue::Char(payload[0])),
            b'c' => Ok(AuxValue::Int(i64::from(payload[0].cast_signed()))),
            b'C' => Ok(AuxValue::Int(i64::from(payload[0]))),
            b's' => Ok(AuxValue::Int(i64::from(i16::from_le_bytes([payload[0], payload[1]])))),
            b'S' => Ok(AuxValue::Int(i64::from(u16::from_le_bytes([payload[0], payload[1]])))),
            b'i' => Ok(AuxValue::Int(i64::from(i32::from_le_bytes([
                payload[0], payload[1], payload[2], payload[3],
            ])))),
            b'I' => Ok(AuxValue::Int(i64::from(u32::from_le_bytes([
                payload[0], payload[1], payload[2], payload[3],
            ])))),
            b'f' => Ok(AuxValue::Float(f32::from_le_bytes([
                payload[0], payload[1], payload[2], payload[3],
            ]))),
            b'Z' => Ok(AuxValue::String(&payload[..payload.len() - 1])),
            b'H' => Ok(AuxValue::Hex(&payload[..payload.len() - 1])),
            b'B' => Ok(AuxValue::Array(AuxArray { elem_type: payload[0], data: &payload[5..] })),
            _ => Err(BamRecError::CorruptAuxField("unrecognized type byte")),
        }
    }

    /// The promoted integer value; `TypeMismatch` for non-integer types.
    pub fn int_value(&self) -> Result<i64> {
        match self.value()? {
            AuxValue::Int(v) => Ok(v),
            _ => Err(BamRecError::TypeMismatch {
                tag: self.tag(),
                found: self.type_byte() as char,
            }),
        }
    }

    /// Render the field as a SAM text column (`TAG:TYPE:VALUE`).
    pub fn push_sam(&self, out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(&self.0[..2]);
        out.push(b':');
        match self.value()? {
            AuxValue::Char(c) => {
                out.extend_from_slice(b"A:");
                out.push(c);
            }
            AuxValue::Int(v) => {
                out.extend_from_slice(b"i:");
                out.extend_from_slice(v.to_string().as_bytes());
            }
            AuxValue::Float(v) => {
                out.extend_from_slice(b"f:");
                out.extend_from_slice(v.to_string().as_bytes());
            }
            AuxValue::String(s) => {
                out.extend_from_slice(b"Z:");
                out.extend_from_slice(s);
            }
            AuxValue::Hex(h) => {
                out.extend_from_slice(b"H:");
                out.extend_from_slice(h);
            }
            AuxValue::Array(array) => {
                out.extend_from_slice(b"B:");
                out.push(array.elem_type());
                for i in 0..array.len() {
                    out.push(b',');
                    if array.elem_type() == b'f' {
                        let v = array.float(i).unwrap_or(0.0);
                        out.extend_from_slice(v.to_string().as_bytes());
                    } else {
                        let v = array.int(i).unwrap_or(0);
                        out.extend_from_slice(v.to_string().as_bytes());
                    }
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for Aux<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buf = Vec::new();
        match self.push_sam(&mut buf) {
            Ok(()) => f.write_str(buf.as_bstr().to_string().as_str()),
            Err(_) => write!(f, "{}:?", self.tag()),
        }
    }
}

impl fmt::Debug for Aux<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// The ordered aux fields of a record: the scratch buffer plus the record's
/// field directory (native-endian `u32` start/end pairs, 8 bytes per field).
#[derive(Clone, Copy)]
pub struct AuxFields<'a> {
    scratch: &'a [u8],
    dir: &'a [u8],
}

impl<'a> AuxFields<'a> {
    #[must_use]
    pub(crate) fn new(scratch: &'a [u8], dir: &'a [u8]) -> Self {
        debug_assert!(dir.len().is_multiple_of(8));
        Self { scratch, dir }
    }

    /// Number of aux fields.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.dir.len() / 8
    }

    /// Whether the record carries no aux fields.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dir.is_empty()
    }

    /// The `i`th field. Requires `i < len()`.
    #[inline]
    #[must_use]
    pub fn get(&self, i: usize) -> Aux<'a> {
        let e = &self.dir[i * 8..i * 8 + 8];
        let start = u32::from_ne_bytes([e[0], e[1], e[2], e[3]]) as usize;
        let end = u32::from_ne_bytes([e[4], e[5], e[6], e[7]]) as usize;
        Aux::new_unchecked(&self.scratch[start..end])
    }

    /// Iterate over the fields in record order.
    pub fn iter(&self) -> impl Iterator<Item = Aux<'a>> + '_ {
        (0..self.len()).map(|i| self.get(i))
    }

    /// The first field with the given tag, if any.
    #[must_use]
    pub fn find(&self, tag: Tag) -> Option<Aux<'a>> {
        self.iter().find(|aux| aux.tag() == tag)
    }

    /// The single field with the given tag: `None` on zero matches, the field
    /// on one, `AmbiguousTag` on two or more.
    pub fn get_unique(&self, tag: Tag) -> Result<Option<Aux<'a>>> {
        let mut matches = self.iter().filter(|aux| aux.tag() == tag);
        let first = matches.next();
        if first.is_some() && matches.next().is_some() {
            return Err(BamRecError::AmbiguousTag(tag));
        }
        Ok(first)
    }
}

/// Parse one SAM text aux column (`TAG:TYPE:VALUE`) into wire form, appending
/// to `dst`.
///
/// Integer values are encoded in the smallest signed width that fits (`c`,
/// `s`, `i`), or `I` for values above `i32::MAX`.
pub fn parse_aux_text(field: &[u8], dst: &mut Vec<u8>) -> Result<()> {
    if field.len() < 5 || field[2] != b':' || field[4] != b':' {
        return Err(BamRecError::parse("aux field", "expected TAG:TYPE:VALUE"));
    }
    let tag = &field[..2];
    let val_type = field[3];
    let value = &field[5..];
    dst.extend_from_slice(tag);
    match val_type {
        b'A' => {
            if value.len() != 1 {
                return Err(BamRecError::parse("aux field", "A value must be one character"));
            }
            dst.push(b'A');
            dst.push(value[0]);
        }
        b'i' => {
            let v = parse_decimal_i64(value, "aux field")?;
            push_int_payload(dst, v).map_err(|()| {
                BamRecError::parse("aux field", format!("integer out of range: {v}"))
            })?;
        }
        b'f' => {
            let v: f32 = value
                .to_str()
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| BamRecError::parse("aux field", "bad float value"))?;
            dst.push(b'f');
            dst.extend_from_slice(&v.to_le_bytes());
        }
        b'Z' => {
            dst.push(b'Z');
            dst.extend_from_slice(value);
            dst.push(0);
        }
        b'H' => {
            if !value.len().is_multiple_of(2) || !value.iter().all(u8::is_ascii_hexdigit) {
                return Err(BamRecError::parse("aux field", "bad hex value"));
            }
            dst.push(b'H');
            dst.extend_from_slice(value);
            dst.push(0);
        }
        b'B' => {
            let mut parts = value.split(|&b| b == b',');
            let subtype = parts
                .next()
                .filter(|s| s.len() == 1)
                .map(|s| s[0])
                .filter(|&t| matches!(t, b'c' | b'C' | b's' | b'S' | b'i' | b'I' | b'f'))
                .ok_or_else(|| BamRecError::parse("aux field", "bad array subtype"))?;
            dst.push(b'B');
            dst.push(subtype);
            let count_at = dst.len();
            dst.extend_from_slice(&[0; 4]);
            let mut count: u32 = 0;
            for part in parts {
                push_array_element(dst, subtype, part)?;
                count += 1;
            }
            dst[count_at..count_at + 4].copy_from_slice(&count.to_le_bytes());
        }
        _ => {
            return Err(BamRecError::parse(
                "aux field",
                format!("unknown type '{}'", val_type as char),
            ));
        }
    }
    Ok(())
}

fn parse_decimal_i64(value: &[u8], what: &'static str) -> Result<i64> {
    value
        .to_str()
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| BamRecError::parse(what, format!("bad integer {:?}", value.as_bstr())))
}

/// Append the type byte and payload for an integer aux value, using the
/// smallest signed width that fits, then `I` up to `u32::MAX`.
fn push_int_payload(dst: &mut Vec<u8>, v: i64) -> std::result::Result<(), ()> {
    if let Ok(v) = i8::try_from(v) {
        dst.push(b'c');
        dst.push(v.cast_unsigned());
    } else if let Ok(v) = i16::try_from(v) {
        dst.push(b's');
        dst.extend_from_slice(&v.to_le_bytes());
    } else if let Ok(v) = i32::try_from(v) {
        dst.push(b'i');
        dst.extend_from_slice(&v.to_le_bytes());
    } else if let Ok(v) = u32::try_from(v) {
        dst.push(b'I');
        dst.extend_from_slice(&v.to_le_bytes());
    } else {
        return Err(());
    }
    Ok(())
}

fn push_array_element(dst: &mut Vec<u8>, subtype: u8, part: &[u8]) -> Result<()> {
    if subtype == b'f' {
        let v: f32 = part
            .to_str()
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| BamRecError::parse("aux field", "bad array element"))?;
        dst.extend_from_slice(&v.to_le_bytes());
        return Ok(());
    }
    let v = parse_decimal_i64(part, "aux field")?;
    let fit = match subtype {
        b'c' => i8::try_from(v).map(|v| dst.push(v.cast_unsigned())).is_ok(),
        b'C' => u8::try_from(v).map(|v| dst.push(v)).is_ok(),
        b's' => i16::try_from(v).map(|v| dst.extend_from_slice(&v.to_le_bytes())).is_ok(),
        b'S' => u16::try_from(v).map(|v| dst.extend_from_slice(&v.to_le_bytes())).is_ok(),
        b'i' => i32::try_from(v).map(|v| dst.extend_from_slice(&v.to_le_bytes())).is_ok(),
        b'I' => u32::try_from(v).map(|v| dst.extend_from_slice(&v.to_le_bytes())).is_ok(),
        _ => false,
    };
    if fit {
        Ok(())
    } else {
        Err(BamRecError::parse("aux field", format!("array element out of range: {v}")))
    }
}

/// Render the aux fields of a record as a debug list.
pub(crate) fn format_fields_debug(fields: &AuxFields<'_>) -> String {
    fields.iter().map(|aux| aux.to_string()).join(" ")
}
