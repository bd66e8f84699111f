//! Line-at-a-time SAM text parsing and rendering.
//!
//! A SAM line is at least 11 tab-separated fields followed by zero or more
//! aux columns. Positions convert between the text's 1-based convention and
//! the record's 0-based one; `*` marks absent references, sequences, and
//! qualities; `=` in the mate-reference column means "same as primary".

use std::sync::Arc;

use bstr::ByteSlice;

use crate::aux;
use crate::cigar::{self, parse_cigar};
use crate::decoder::Omit;
use crate::errors::{BamRecError, Result};
use crate::header::{Header, Reference};
use crate::pool;
use crate::record::{assemble_wire_variable, flags, Record};

/// Offset between raw Phred scores and their textual encoding.
pub const PHRED_OFFSET: u8 = 33;

/// How to render the flag column.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FlagFormat {
    /// Plain decimal.
    #[default]
    Decimal,
    /// `0x` plus lowercase hex.
    Hex,
    /// Ordered letters from `pPuUrR12sfdS`, one per set bit.
    String,
}

impl FlagFormat {
    /// Map the public 0/1/2 selector onto a format.
    pub fn from_int(v: i32) -> Result<Self> {
        match v {
            0 => Ok(Self::Decimal),
            1 => Ok(Self::Hex),
            2 => Ok(Self::String),
            _ => Err(BamRecError::OutOfRange { what: "flag format", value: i64::from(v) }),
        }
    }

    /// The selector value for this format.
    #[must_use]
    pub fn as_int(self) -> i32 {
        self as i32
    }
}

/// Parse one SAM alignment line.
///
/// Reference names resolve against `header` when given; without a header,
/// names other than `*` get placeholder references with id -1. The record
/// comes from the freelist.
pub fn parse_record(header: Option<&Header>, line: &[u8]) -> Result<Record> {
    let fields: Vec<&[u8]> = line.split(|&b| b == b'\t').collect();
    if fields.len() < 11 {
        return Err(BamRecError::parse("line", format!("{} of 11 fields", fields.len())));
    }

    let name = fields[0];
    if name.is_empty() || name.len() > 254 {
        return Err(BamRecError::OutOfRange { what: "name length", value: name.len() as i64 });
    }
    let flag_word = parse_flags(fields[1])?;
    let reference = reference_for_name(header, fields[2])?;
    let pos = parse_i32(fields[3], "position")? - 1;
    let map_q = parse_i32(fields[4], "map quality")?;
    let map_q = u8::try_from(map_q)
        .map_err(|_| BamRecError::parse("map quality", format!("{map_q} exceeds 255")))?;
    let cigar_ops = parse_cigar(fields[5])?;
    let mate_reference = if fields[6] == fields[2] || fields[6] == b"=" {
        reference.clone()
    } else {
        reference_for_name(header, fields[6])?
    };
    let mate_pos = parse_i32(fields[7], "mate position")? - 1;
    let template_len = parse_i32(fields[8], "template length")?;

    let seq = if fields[9] == b"*" { &[][..] } else { fields[9] };
    if !cigar_ops.is_empty() && !seq.is_empty() {
        let consumed = cigar::query_consumed(cigar_ops.iter().copied());
        if consumed != seq.len() {
            return Err(BamRecError::CigarSeqMismatch { cigar: consumed, seq: seq.len() });
        }
    }

    let mut qual = Vec::new();
    if fields[10] != b"*" {
        qual.extend(fields[10].iter().map(|&b| b.wrapping_sub(PHRED_OFFSET)));
        if qual.len() != seq.len() {
            return Err(BamRecError::SeqQualMismatch { qual: qual.len(), seq: seq.len() });
        }
    }

    let mut aux = Vec::new();
    for field in &fields[11..] {
        aux::parse_aux_text(field, &mut aux)?;
    }

    let mut rec = pool::acquire();
    rec.reference = reference;
    rec.mate_reference = mate_reference;
    rec.pos = pos;
    rec.mate_pos = mate_pos;
    rec.template_len = template_len;
    rec.map_q = map_q;
    rec.flags = flag_word;
    let var = assemble_wire_variable(name, &cigar_ops, seq, &qual, &aux);
    match rec.load_wire_variable(name.len() + 1, cigar_ops.len(), seq.len(), &var, Omit::None) {
        Ok(()) => Ok(rec),
        Err(e) => {
            pool::release(rec);
            Err(e)
        }
    }
}

/// Render a record as one SAM line (no trailing newline), appending to `out`.
pub fn format_record(rec: &Record, format: FlagFormat, out: &mut Vec<u8>) -> Result<()> {
    if !rec.qual().is_empty() && rec.qual().len() != rec.seq().len() {
        return Err(BamRecError::SeqQualMismatch { qual: rec.qual().len(), seq: rec.seq().len() });
    }
    out.extend_from_slice(rec.name());
    out.push(b'\t');
    push_flags(out, rec.flags(), format);
    out.push(b'\t');
    out.extend_from_slice(rec.reference().map_or("*", |r| r.name()).as_bytes());
    out.push(b'\t');
    push_decimal(out, i64::from(rec.pos()) + 1);
    out.push(b'\t');
    push_decimal(out, i64::from(rec.map_q()));
    out.push(b'\t');
    out.extend_from_slice(rec.cigar().to_string().as_bytes());
    out.push(b'\t');
    push_mate_reference(out, rec);
    out.push(b'\t');
    push_decimal(out, i64::from(rec.mate_pos()) + 1);
    out.push(b'\t');
    push_decimal(out, i64::from(rec.template_len()));
    out.push(b'\t');
    if rec.seq().is_empty() {
        out.push(b'*');
    } else {
        out.extend_from_slice(&rec.seq().expand());
    }
    out.push(b'\t');
    push_qual(out, rec.qual());
    for field in rec.aux_fields().iter() {
        out.push(b'\t');
        field.push_sam(out)?;
    }
    Ok(())
}

/// Parse the flag column: decimal, or hex with a `0x` prefix.
pub fn parse_flags(text: &[u8]) -> Result<u16> {
    let parsed = if let Some(hex) = text.strip_prefix(b"0x").or_else(|| text.strip_prefix(b"0X")) {
        hex.to_str().ok().and_then(|s| u16::from_str_radix(s, 16).ok())
    } else {
        text.to_str().ok().and_then(|s| s.parse().ok())
    };
    parsed.ok_or_else(|| BamRecError::parse("flags", format!("bad value {:?}", text.as_bstr())))
}

/// Letters of the flag-string alphabet, one per bit.
const FLAG_LETTERS: &[u8; 12] = b"pPuUrR12sfdS";

/// Bits meaningless when the Paired bit is clear.
const PAIRED_ONLY_MASK: u16 =
    flags::PROPER_PAIR | flags::MATE_UNMAPPED | flags::MATE_REVERSE | flags::READ1 | flags::READ2;

fn push_flags(out: &mut Vec<u8>, flag_word: u16, format: FlagFormat) {
    match format {
        FlagFormat::Decimal => push_decimal(out, i64::from(flag_word)),
        FlagFormat::Hex => {
            out.extend_from_slice(format!("{flag_word:#x}").as_bytes());
        }
        FlagFormat::String => {
            let mut masked = flag_word;
            if masked & flags::PAIRED == 0 {
                masked &= !PAIRED_ONLY_MASK;
            }
            for (i, &letter) in FLAG_LETTERS.iter().enumerate() {
                if masked & (1 << i) != 0 {
                    out.push(letter);
                }
            }
        }
    }
}

fn push_mate_reference(out: &mut Vec<u8>, rec: &Record) {
    match (rec.reference(), rec.mate_reference()) {
        (Some(r), Some(m)) if Arc::ptr_eq(r, m) => out.push(b'='),
        (_, Some(m)) => out.extend_from_slice(m.name().as_bytes()),
        (_, None) => out.push(b'*'),
    }
}

fn push_qual(out: &mut Vec<u8>, qual: &[u8]) {
    if qual.iter().any(|&q| q != 0xFF) {
        out.extend(qual.iter().map(|&q| q.wrapping_add(PHRED_OFFSET)));
    } else {
        out.push(b'*');
    }
}

fn push_decimal(out: &mut Vec<u8>, v: i64) {
    out.extend_from_slice(v.to_string().as_bytes());
}

fn parse_i32(text: &[u8], what: &'static str) -> Result<i32> {
    text.to_str()
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| BamRecError::parse(what, format!("bad value {:?}", text.as_bstr())))
}

fn reference_for_name(header: Option<&Header>, name: &[u8]) -> Result<Option<Arc<Reference>>> {
    if name == b"*" {
        return Ok(None);
    }
    let name = name
        .to_str()
        .map_err(|_| BamRecError::parse("reference name", "not valid UTF-8"))?;
    match header {
        None => Ok(Some(Reference::placeholder(name))),
        Some(h) => h.reference_by_name(name).cloned().map(Some).ok_or_else(|| {
            BamRecError::parse("reference name", format!("no reference named {name:?}"))
        }),
    }
}
