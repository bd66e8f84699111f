//! CIGAR operations and consumed-length arithmetic.
//!
//! Each operation packs `length << 4 | op_code` in 32 bits over the fixed
//! 9-op alphabet. Record storage keeps the ops as native-endian words inside
//! the record's scratch buffer; [`Cigar`] reconstructs the view on access.

use std::fmt;

use itertools::Itertools;

use crate::errors::{BamRecError, Result};

/// Largest representable op length (28 bits).
pub const MAX_CIGAR_OP_LEN: u32 = (1 << 28) - 1;

/// The CIGAR operation alphabet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum CigarOpKind {
    /// M: alignment match or mismatch (consumes query and reference).
    Match = 0,
    /// I: insertion to the reference (consumes query).
    Insertion = 1,
    /// D: deletion from the reference (consumes reference).
    Deletion = 2,
    /// N: skipped region from the reference (consumes reference).
    Skip = 3,
    /// S: soft clipping (consumes query).
    SoftClip = 4,
    /// H: hard clipping (consumes neither).
    HardClip = 5,
    /// P: padding (consumes neither).
    Pad = 6,
    /// =: sequence match (consumes query and reference).
    SequenceMatch = 7,
    /// X: sequence mismatch (consumes query and reference).
    SequenceMismatch = 8,
}

impl CigarOpKind {
    /// Decode the low 4 bits of a packed op word.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Match),
            1 => Some(Self::Insertion),
            2 => Some(Self::Deletion),
            3 => Some(Self::Skip),
            4 => Some(Self::SoftClip),
            5 => Some(Self::HardClip),
            6 => Some(Self::Pad),
            7 => Some(Self::SequenceMatch),
            8 => Some(Self::SequenceMismatch),
            _ => None,
        }
    }

    /// Decode a SAM text op character.
    #[must_use]
    pub fn from_char(c: u8) -> Option<Self> {
        match c {
            b'M' => Some(Self::Match),
            b'I' => Some(Self::Insertion),
            b'D' => Some(Self::Deletion),
            b'N' => Some(Self::Skip),
            b'S' => Some(Self::SoftClip),
            b'H' => Some(Self::HardClip),
            b'P' => Some(Self::Pad),
            b'=' => Some(Self::SequenceMatch),
            b'X' => Some(Self::SequenceMismatch),
            _ => None,
        }
    }

    /// The SAM text character for this op.
    #[must_use]
    pub fn as_char(self) -> u8 {
        b"MIDNSHP=X"[self as usize]
    }

    /// Whether this op consumes query bases (M, I, S, =, X).
    #[inline]
    #[must_use]
    pub fn consumes_query(self) -> bool {
        matches!(
            self,
            Self::Match
                | Self::Insertion
                | Self::SoftClip
                | Self::SequenceMatch
                | Self::SequenceMismatch
        )
    }

    /// Whether this op consumes reference bases (M, D, N, =, X).
    #[inline]
    #[must_use]
    pub fn consumes_reference(self) -> bool {
        matches!(
            self,
            Self::Match
                | Self::Deletion
                | Self::Skip
                | Self::SequenceMatch
                | Self::SequenceMismatch
        )
    }
}

/// A single CIGAR operation: `length << 4 | op_code` in 32 bits.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CigarOp(u32);

impl CigarOp {
    /// Pack an operation. `length` must fit in 28 bits.
    #[must_use]
    pub fn new(kind: CigarOpKind, length: u32) -> Self {
        debug_assert!(length <= MAX_CIGAR_OP_LEN);
        Self((length << 4) | u32::from(kind as u8))
    }

    /// Wrap a raw packed word.
    #[inline]
    #[must_use]
    pub fn from_raw(word: u32) -> Self {
        Self(word)
    }

    /// The raw packed word.
    #[inline]
    #[must_use]
    pub fn as_raw(self) -> u32 {
        self.0
    }

    /// The op length.
    #[inline]
    #[must_use]
    pub fn length(self) -> u32 {
        self.0 >> 4
    }

    /// The op kind. Words with an undefined op code read as `Match`; the
    /// decoder and parser never produce one.
    #[inline]
    #[must_use]
    pub fn kind(self) -> CigarOpKind {
        CigarOpKind::from_code((self.0 & 0xF) as u8).unwrap_or(CigarOpKind::Match)
    }
}

impl fmt::Display for CigarOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.length(), self.kind().as_char() as char)
    }
}

impl fmt::Debug for CigarOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Sum of op lengths over query-consuming ops.
pub fn query_consumed<I>(ops: I) -> usize
where
    I: IntoIterator<Item = CigarOp>,
{
    ops.into_iter()
        .filter(|op| op.kind().consumes_query())
        .map(|op| op.length() as usize)
        .sum()
}

/// Sum of op lengths over reference-consuming ops.
pub fn reference_consumed<I>(ops: I) -> usize
where
    I: IntoIterator<Item = CigarOp>,
{
    ops.into_iter()
        .filter(|op| op.kind().consumes_reference())
        .map(|op| op.length() as usize)
        .sum()
}

/// A borrowed view over a record's CIGAR: native-endian packed words.
#[derive(Clone, Copy)]
pub struct Cigar<'a> {
    words: &'a [u8],
}

impl<'a> Cigar<'a> {
    /// Wrap native-endian word storage; `words.len()` must be a multiple of 4.
    #[must_use]
    pub(crate) fn from_words(words: &'a [u8]) -> Self {
        debug_assert!(words.len().is_multiple_of(4));
        Self { words }
    }

    /// Number of operations.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.words.len() / 4
    }

    /// Whether there are no operations.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// The `i`th operation. Requires `i < len()`.
    #[inline]
    #[must_use]
    pub fn op(&self, i: usize) -> CigarOp {
        let w = &self.words[i * 4..i * 4 + 4];
        CigarOp::from_raw(u32::from_ne_bytes([w[0], w[1], w[2], w[3]]))
    }

    /// Iterate over the operations.
    pub fn iter(&self) -> impl Iterator<Item = CigarOp> + 'a {
        self.words
            .chunks_exact(4)
            .map(|w| CigarOp::from_raw(u32::from_ne_bytes([w[0], w[1], w[2], w[3]])))
    }

    /// Sum of lengths over reference-consuming ops.
    #[must_use]
    pub fn reference_consumed(&self) -> usize {
        reference_consumed(self.iter())
    }

    /// Sum of lengths over query-consuming ops.
    #[must_use]
    pub fn query_consumed(&self) -> usize {
        query_consumed(self.iter())
    }

    /// True iff the query-consumed sum equals `seq_len`, or `seq_len` is zero.
    #[must_use]
    pub fn is_valid(&self, seq_len: usize) -> bool {
        seq_len == 0 || self.query_consumed() == seq_len
    }
}

impl fmt::Display for Cigar<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("*");
        }
        write!(f, "{}", self.iter().format(""))
    }
}

impl fmt::Debug for Cigar<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Parse a SAM text CIGAR column. `*` yields an empty op list.
pub fn parse_cigar(text: &[u8]) -> Result<Vec<CigarOp>> {
    if text == b"*" {
        return Ok(Vec::new());
    }
    if text.is_empty() {
        return Err(BamRecError::parse("CIGAR", "empty field"));
    }
    let mut ops = Vec::new();
    let mut length: u64 = 0;
    let mut have_digit = false;
    for &c in text {
        if c.is_ascii_digit() {
            length = length * 10 + u64::from(c - b'0');
            if length > u64::from(MAX_CIGAR_OP_LEN) {
                return Err(BamRecError::parse("CIGAR", "op length too large"));
            }
            have_digit = true;
        } else {
            let kind = CigarOpKind::from_char(c).ok_or_else(|| {
                BamRecError::parse("CIGAR", format!("unknown op '{}'", c as char))
            })?;
            if !have_digit {
                return Err(BamRecError::parse("CIGAR", "op without length"));
            }
            ops.push(CigarOp::new(kind, length as u32));
            length = 0;
            have_digit = false;
        }
    }
    if have_digit {
        return Err(BamRecError::parse("CIGAR", "trailing op length"));
    }
    Ok(ops)
}
