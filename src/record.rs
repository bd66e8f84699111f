//! The alignment record and its arena.
//!
//! A record is a handful of fixed scalars plus variable-length data (read
//! name, CIGAR, packed sequence, qualities, aux fields) that all live in one
//! reusable scratch buffer. Interior fields are `(offset, len)` spans into
//! that buffer, reconstructed as slices on access; growing or reusing the
//! scratch therefore re-derives every interior view instead of invalidating
//! it.
//!
//! Scratch layout, in order:
//!
//! ```text
//! [0 .. var_len)          wire-form variable bytes: name+NUL, little-endian
//!                         cigar words, packed seq, qual, aux data
//! [cigar_off ..)          native-endian cigar words, 8-aligned offset
//! [dir_off ..)            aux directory, 8 bytes per field, 8-aligned offset
//! ```

use std::fmt;
use std::sync::Arc;

use bstr::ByteSlice;

use crate::aux::{self, AuxFields, Tag};
use crate::cigar::{Cigar, CigarOp};
use crate::decoder::Omit;
use crate::errors::{BamRecError, Result};
use crate::header::Reference;
use crate::pool;
use crate::sequence::{self, Seq};

/// BAM flag bits.
pub mod flags {
    /// Read is paired in sequencing.
    pub const PAIRED: u16 = 0x1;
    /// Read is mapped in a proper pair.
    pub const PROPER_PAIR: u16 = 0x2;
    /// Read is unmapped.
    pub const UNMAPPED: u16 = 0x4;
    /// Mate is unmapped.
    pub const MATE_UNMAPPED: u16 = 0x8;
    /// Read is reverse complemented.
    pub const REVERSE: u16 = 0x10;
    /// Mate is reverse complemented.
    pub const MATE_REVERSE: u16 = 0x20;
    /// First read of the pair.
    pub const READ1: u16 = 0x40;
    /// Second read of the pair.
    pub const READ2: u16 = 0x80;
    /// Secondary alignment.
    pub const SECONDARY: u16 = 0x100;
    /// Not passing quality controls.
    pub const QC_FAIL: u16 = 0x200;
    /// PCR or optical duplicate.
    pub const DUPLICATE: u16 = 0x400;
    /// Supplementary alignment.
    pub const SUPPLEMENTARY: u16 = 0x800;
}

/// The bin assigned when both the read and its mate are unmapped;
/// `bin_for(-1, 0)`.
pub const UNMAPPED_BIN: i32 = 4680;

/// Largest 0-based position the binning index can address.
const MAX_INDEX_POS: i32 = (1 << 29) - 2;

/// An `(offset, len)` view into the record's scratch buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Span {
    start: u32,
    len: u32,
}

impl Span {
    fn new(start: usize, len: usize) -> Self {
        Self { start: start as u32, len: len as u32 }
    }

    fn slice<'a>(self, buf: &'a [u8]) -> &'a [u8] {
        &buf[self.start as usize..(self.start + self.len) as usize]
    }
}

/// A SAM/BAM alignment record.
#[derive(Debug)]
pub struct Record {
    pub(crate) reference: Option<Arc<Reference>>,
    pub(crate) mate_reference: Option<Arc<Reference>>,
    pub(crate) pos: i32,
    pub(crate) mate_pos: i32,
    pub(crate) template_len: i32,
    pub(crate) map_q: u8,
    pub(crate) flags: u16,
    pub(crate) seq_len: u32,
    name: Span,
    cigar: Span,
    seq: Span,
    qual: Span,
    aux_dir: Span,
    scratch: Vec<u8>,
}

impl Default for Record {
    fn default() -> Self {
        Self {
            reference: None,
            mate_reference: None,
            pos: -1,
            mate_pos: -1,
            template_len: 0,
            map_q: 0,
            flags: 0,
            seq_len: 0,
            name: Span::default(),
            cigar: Span::default(),
            seq: Span::default(),
            qual: Span::default(),
            aux_dir: Span::default(),
            scratch: Vec::new(),
        }
    }
}

impl Record {
    /// Build a record from its parts, checking them for consistency.
    ///
    /// `qual` may be empty when the base qualities are unknown; for a
    /// non-empty sequence the stored qualities are then filled with 0xFF.
    /// `aux` is raw wire-form aux data.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: &[u8],
        reference: Option<Arc<Reference>>,
        mate_reference: Option<Arc<Reference>>,
        pos: i32,
        mate_pos: i32,
        template_len: i32,
        map_q: u8,
        cigar: &[CigarOp],
        seq: &[u8],
        qual: &[u8],
        aux: &[u8],
    ) -> Result<Self> {
        if name.is_empty() || name.len() > 254 {
            return Err(BamRecError::OutOfRange { what: "name length", value: name.len() as i64 });
        }
        if pos < -1 {
            return Err(BamRecError::OutOfRange { what: "position", value: i64::from(pos) });
        }
        if mate_pos < -1 {
            return Err(BamRecError::OutOfRange {
                what: "mate position",
                value: i64::from(mate_pos),
            });
        }
        if !qual.is_empty() && qual.len() != seq.len() {
            return Err(BamRecError::SeqQualMismatch { qual: qual.len(), seq: seq.len() });
        }
        match &reference {
            Some(r) if r.id() < 0 => {
                return Err(BamRecError::BadReferenceId(r.id()));
            }
            None if pos != -1 => {
                return Err(BamRecError::OutOfRange { what: "position", value: i64::from(pos) });
            }
            _ => {}
        }
        match &mate_reference {
            Some(r) if r.id() < 0 => {
                return Err(BamRecError::BadReferenceId(r.id()));
            }
            None if mate_pos != -1 => {
                return Err(BamRecError::OutOfRange {
                    what: "mate position",
                    value: i64::from(mate_pos),
                });
            }
            _ => {}
        }

        let mut rec = pool::acquire();
        rec.reference = reference;
        rec.mate_reference = mate_reference;
        rec.pos = pos;
        rec.mate_pos = mate_pos;
        rec.template_len = template_len;
        rec.map_q = map_q;
        let var = assemble_wire_variable(name, cigar, seq, qual, aux);
        if let Err(e) = rec.load_wire_variable(name.len() + 1, cigar.len(), seq.len(), &var, Omit::None)
        {
            pool::release(rec);
            return Err(e);
        }
        Ok(rec)
    }

    // ------------------------------------------------------------------------
    // Field access
    // ------------------------------------------------------------------------

    /// The read name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &[u8] {
        self.name.slice(&self.scratch)
    }

    /// The linked reference, if placed.
    #[inline]
    #[must_use]
    pub fn reference(&self) -> Option<&Arc<Reference>> {
        self.reference.as_ref()
    }

    /// The mate's linked reference, if placed.
    #[inline]
    #[must_use]
    pub fn mate_reference(&self) -> Option<&Arc<Reference>> {
        self.mate_reference.as_ref()
    }

    /// The reference id, or -1 when unplaced.
    #[inline]
    #[must_use]
    pub fn ref_id(&self) -> i32 {
        self.reference.as_ref().map_or(-1, |r| r.id())
    }

    /// The 0-based leftmost position, or -1 when no reference is linked.
    #[inline]
    #[must_use]
    pub fn pos(&self) -> i32 {
        self.pos
    }

    /// The mate's 0-based position, or -1 when no mate reference is linked.
    #[inline]
    #[must_use]
    pub fn mate_pos(&self) -> i32 {
        self.mate_pos
    }

    /// The signed template length.
    #[inline]
    #[must_use]
    pub fn template_len(&self) -> i32 {
        self.template_len
    }

    /// The mapping quality.
    #[inline]
    #[must_use]
    pub fn map_q(&self) -> u8 {
        self.map_q
    }

    /// The 16-bit flag word; see [`flags`].
    #[inline]
    #[must_use]
    pub fn flags(&self) -> u16 {
        self.flags
    }

    /// The CIGAR operations.
    #[inline]
    #[must_use]
    pub fn cigar(&self) -> Cigar<'_> {
        Cigar::from_words(self.cigar.slice(&self.scratch))
    }

    /// The packed sequence.
    #[inline]
    #[must_use]
    pub fn seq(&self) -> Seq<'_> {
        Seq::new(self.seq_len as usize, self.seq.slice(&self.scratch))
    }

    /// The raw base qualities; 0xFF means unknown.
    #[inline]
    #[must_use]
    pub fn qual(&self) -> &[u8] {
        self.qual.slice(&self.scratch)
    }

    /// The ordered aux fields.
    #[inline]
    #[must_use]
    pub fn aux_fields(&self) -> AuxFields<'_> {
        AuxFields::new(&self.scratch, self.aux_dir.slice(&self.scratch))
    }

    /// The first aux field with the given tag.
    #[must_use]
    pub fn tag(&self, tag: Tag) -> Option<crate::aux::Aux<'_>> {
        self.aux_fields().find(tag)
    }

    // ------------------------------------------------------------------------
    // Derived quantities
    // ------------------------------------------------------------------------

    /// The lower-coordinate end of the alignment.
    #[inline]
    #[must_use]
    pub fn start(&self) -> i32 {
        self.pos
    }

    /// The highest reference coordinate reached by the alignment.
    ///
    /// Accumulates reference-consuming op lengths while tracking the running
    /// maximum, so unusually ordered operators cannot understate the end.
    /// Unmapped records and records without a CIGAR end at `pos + 1`.
    #[must_use]
    pub fn end(&self) -> i32 {
        if self.flags & flags::UNMAPPED != 0 || self.cigar.len == 0 {
            return self.pos + 1;
        }
        let mut pos = self.pos;
        let mut end = pos;
        for op in self.cigar().iter() {
            if op.kind().consumes_reference() {
                pos += op.length() as i32;
            }
            end = end.max(pos);
        }
        end
    }

    /// The length of the alignment: `end() - start()`.
    #[inline]
    #[must_use]
    pub fn alignment_len(&self) -> i32 {
        self.end() - self.start()
    }

    /// The UCSC index bin over `[pos, end)`.
    ///
    /// Both-unmapped pairs bin at [`UNMAPPED_BIN`]. A zero-length alignment
    /// is binned as length 1 by bumping `end` first. Endpoints outside the
    /// indexable range yield -1.
    #[must_use]
    pub fn bin(&self) -> i32 {
        if self.flags & (flags::UNMAPPED | flags::MATE_UNMAPPED)
            == flags::UNMAPPED | flags::MATE_UNMAPPED
        {
            return UNMAPPED_BIN;
        }
        let mut end = self.end();
        if end == self.pos {
            end += 1;
        }
        if !is_valid_index_pos(self.pos) || !is_valid_index_pos(end) {
            return -1;
        }
        i32::from(bin_for(self.pos, end))
    }

    /// +1 for forward-strand alignments, -1 for reverse.
    #[inline]
    #[must_use]
    pub fn strand(&self) -> i8 {
        if self.flags & flags::REVERSE != 0 { -1 } else { 1 }
    }

    /// Whether the record satisfies the cross-field flag, position, and
    /// length invariants. Advisory; decoding does not enforce it.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        if (self.reference.is_none() || self.pos == -1) && self.flags & flags::UNMAPPED == 0 {
            return false;
        }
        if self.flags & flags::PAIRED != 0
            && (self.mate_reference.is_none() || self.mate_pos == -1)
            && self.flags & flags::MATE_UNMAPPED == 0
        {
            return false;
        }
        if self.flags & (flags::UNMAPPED | flags::PROPER_PAIR)
            == flags::UNMAPPED | flags::PROPER_PAIR
        {
            return false;
        }
        if self.flags & (flags::PAIRED | flags::MATE_UNMAPPED | flags::PROPER_PAIR)
            == flags::PAIRED | flags::MATE_UNMAPPED | flags::PROPER_PAIR
        {
            return false;
        }
        let seq_len = self.seq_len as usize;
        if !self.qual().is_empty() && self.qual().len() != seq_len {
            return false;
        }
        if !self.cigar().is_empty() && seq_len != 0 && !self.cigar().is_valid(seq_len) {
            return false;
        }
        true
    }

    /// Sort-by-name comparison.
    #[must_use]
    pub fn less_by_name(&self, other: &Record) -> bool {
        self.name() < other.name()
    }

    /// Sort-by-coordinate comparison; unplaced references order last.
    #[must_use]
    pub fn less_by_coordinate(&self, other: &Record) -> bool {
        let self_name = self.reference.as_ref().map_or("*", |r| r.name());
        let other_name = other.reference.as_ref().map_or("*", |r| r.name());
        match (self_name, other_name) {
            (_, "*") => true,
            ("*", _) => false,
            (a, b) => a < b || (a == b && self.pos < other.pos),
        }
    }

    // ------------------------------------------------------------------------
    // Aux coercion accessors
    // ------------------------------------------------------------------------

    /// The integer value of the unique field with the given tag.
    ///
    /// Accepts types `c`, `C`, `s`, `S`, and `i`; other types are a
    /// `TypeMismatch`. `None` when the tag is absent.
    pub fn aux_int_value(&self, tag: Tag) -> Result<Option<i32>> {
        let Some(field) = self.aux_fields().get_unique(tag)? else {
            return Ok(None);
        };
        match field.type_byte() {
            b'c' | b'C' | b's' | b'S' | b'i' => Ok(Some(field.int_value()? as i32)),
            other => Err(BamRecError::TypeMismatch { tag, found: other as char }),
        }
    }

    /// Like [`aux_int_value`](Self::aux_int_value), widened to `i64` and also
    /// accepting a `Z` string holding a decimal integer.
    pub fn aux_int64_value(&self, tag: Tag) -> Result<Option<i64>> {
        let Some(field) = self.aux_fields().get_unique(tag)? else {
            return Ok(None);
        };
        match field.type_byte() {
            b'c' | b'C' | b's' | b'S' | b'i' => Ok(Some(field.int_value()?)),
            b'Z' => {
                let crate::aux::AuxValue::String(s) = field.value()? else {
                    return Err(BamRecError::CorruptAuxField("Z field without string value"));
                };
                let parsed = s.to_str().ok().and_then(|s| s.parse().ok()).ok_or_else(|| {
                    BamRecError::parse("aux integer", format!("bad decimal {:?}", s.as_bstr()))
                })?;
                Ok(Some(parsed))
            }
            other => Err(BamRecError::TypeMismatch { tag, found: other as char }),
        }
    }

    // ------------------------------------------------------------------------
    // Arena placement
    // ------------------------------------------------------------------------

    /// Populate the variable-length fields from wire-form bytes: name+NUL,
    /// little-endian cigar words, packed seq, qual, then aux data.
    ///
    /// Copies `var` into the scratch buffer, stores native-endian cigar words
    /// in the 8-aligned area that follows, and indexes aux fields into the
    /// trailing directory. `omit` selects how much to materialize.
    pub(crate) fn load_wire_variable(
        &mut self,
        l_read_name: usize,
        n_cigar: usize,
        l_seq: usize,
        var: &[u8],
        omit: Omit,
    ) -> Result<()> {
        if l_read_name == 0 {
            return Err(BamRecError::OutOfRange { what: "name length", value: 0 });
        }
        let n_doublets = l_seq.div_ceil(2);
        let aux_base = l_read_name + n_cigar * 4 + n_doublets + l_seq;
        if var.len() < aux_base {
            return Err(BamRecError::ShortRecord { len: 32 + var.len(), expected: 32 + aux_base });
        }

        // The count pass runs regardless of omission: it validates the aux
        // stream and sizes the directory.
        let n_aux = aux::count_aux_fields(&var[aux_base..])?;

        let cigar_off = var.len().next_multiple_of(8);
        let dir_off = (cigar_off + n_cigar * 4).next_multiple_of(8);
        resize_scratch(&mut self.scratch, dir_off + n_aux * 8);
        self.scratch[..var.len()].copy_from_slice(var);

        self.name = Span::new(0, l_read_name - 1);

        // Re-read each little-endian cigar word from the wire copy and store
        // it native-endian in the aligned area.
        for i in 0..n_cigar {
            let src = l_read_name + i * 4;
            let word = u32::from_le_bytes([
                self.scratch[src],
                self.scratch[src + 1],
                self.scratch[src + 2],
                self.scratch[src + 3],
            ]);
            self.scratch[cigar_off + i * 4..cigar_off + i * 4 + 4]
                .copy_from_slice(&word.to_ne_bytes());
        }
        self.cigar = Span::new(cigar_off, n_cigar * 4);

        if omit >= Omit::AllVariableLengthData {
            self.seq_len = 0;
            self.seq = Span::default();
            self.qual = Span::default();
            self.aux_dir = Span::default();
            return Ok(());
        }

        self.seq_len = l_seq as u32;
        self.seq = Span::new(l_read_name + n_cigar * 4, n_doublets);
        self.qual = Span::new(l_read_name + n_cigar * 4 + n_doublets, l_seq);

        if omit >= Omit::AuxTags || n_aux == 0 {
            self.aux_dir = Span::default();
            return Ok(());
        }

        let mut entry = dir_off;
        let scratch = &mut self.scratch;
        aux::index_aux_fields(&var[aux_base..], |start, end| {
            let start = (aux_base + start) as u32;
            let end = (aux_base + end) as u32;
            scratch[entry..entry + 4].copy_from_slice(&start.to_ne_bytes());
            scratch[entry + 4..entry + 8].copy_from_slice(&end.to_ne_bytes());
            entry += 8;
        })?;
        self.aux_dir = Span::new(dir_off, n_aux * 8);
        Ok(())
    }

    /// Reset every scalar field and interior span, retaining scratch capacity.
    pub(crate) fn reset(&mut self) {
        self.reference = None;
        self.mate_reference = None;
        self.pos = -1;
        self.mate_pos = -1;
        self.template_len = 0;
        self.map_q = 0;
        self.flags = 0;
        self.seq_len = 0;
        self.name = Span::default();
        self.cigar = Span::default();
        self.seq = Span::default();
        self.qual = Span::default();
        self.aux_dir = Span::default();
        self.scratch.clear();
    }
}

impl PartialEq for Record {
    /// Field-wise equality; the scratch buffer's identity and layout are not
    /// compared, and references compare by value.
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
            && self.reference.as_deref() == other.reference.as_deref()
            && self.pos == other.pos
            && self.map_q == other.map_q
            && self.flags == other.flags
            && self.mate_reference.as_deref() == other.mate_reference.as_deref()
            && self.mate_pos == other.mate_pos
            && self.template_len == other.template_len
            && self.seq_len == other.seq_len
            && self.seq.slice(&self.scratch) == other.seq.slice(&other.scratch)
            && self.qual() == other.qual()
            && self.cigar.slice(&self.scratch) == other.cigar.slice(&other.scratch)
            && self.aux_fields().len() == other.aux_fields().len()
            && self
                .aux_fields()
                .iter()
                .zip(other.aux_fields().iter())
                .all(|(a, b)| a.bytes() == b.bytes())
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let end = self.end();
        write!(
            f,
            "{} {:#x} {} {} {}:{}..{} ({}) {} {}:{} {} {} {:?} {}",
            self.name().as_bstr(),
            self.flags,
            self.cigar(),
            self.map_q,
            self.reference.as_ref().map_or("*", |r| r.name()),
            self.pos,
            end,
            self.bin(),
            end - self.pos,
            self.mate_reference.as_ref().map_or("*", |r| r.name()),
            self.mate_pos,
            self.template_len,
            self.seq().expand().as_bstr(),
            self.qual(),
            aux::format_fields_debug(&self.aux_fields()),
        )
    }
}

/// Assemble wire-form variable bytes (name+NUL, little-endian cigar, packed
/// seq, qual, aux) from record parts. Empty `qual` with a non-empty sequence
/// is filled with 0xFF.
pub(crate) fn assemble_wire_variable(
    name: &[u8],
    cigar: &[CigarOp],
    seq: &[u8],
    qual: &[u8],
    aux: &[u8],
) -> Vec<u8> {
    let mut var =
        Vec::with_capacity(name.len() + 1 + cigar.len() * 4 + seq.len().div_ceil(2) + seq.len() + aux.len());
    var.extend_from_slice(name);
    var.push(0);
    for op in cigar {
        var.extend_from_slice(&op.as_raw().to_le_bytes());
    }
    sequence::pack_sequence_into(&mut var, seq);
    if qual.is_empty() {
        var.resize(var.len() + seq.len(), 0xFF);
    } else {
        var.extend_from_slice(qual);
    }
    var.extend_from_slice(aux);
    var
}

/// Make `buf` exactly `n` bytes long, reallocating in 16-byte steps to avoid
/// frequent regrowth. Newly exposed bytes are zeroed.
pub(crate) fn resize_scratch(buf: &mut Vec<u8>, n: usize) {
    if buf.capacity() < n {
        buf.clear();
        buf.reserve_exact((n / 16 + 1) * 16);
    }
    buf.resize(n, 0);
}

fn is_valid_index_pos(p: i32) -> bool {
    (-1..=MAX_INDEX_POS).contains(&p)
}

/// The UCSC binning function over the 0-based half-open interval `[beg, end)`.
fn bin_for(beg: i32, end: i32) -> u16 {
    let end = end - 1;
    match () {
        () if beg >> 14 == end >> 14 => (((1 << 15) - 1) / 7 + (beg >> 14)) as u16,
        () if beg >> 17 == end >> 17 => (((1 << 12) - 1) / 7 + (beg >> 17)) as u16,
        () if beg >> 20 == end >> 20 => (((1 << 9) - 1) / 7 + (beg >> 20)) as u16,
        () if beg >> 23 == end >> 23 => (((1 << 6) - 1) / 7 + (beg >> 23)) as u16,
        () if beg >> 26 == end >> 26 => (((1 << 3) - 1) / 7 + (beg >> 26)) as u16,
        () => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cigar::{parse_cigar, query_consumed};
    use crate::header::Header;

    fn record_with_cigar(pos: i32, text: &[u8]) -> Record {
        let header = Header::from_references([("chr1", 10_000_000)]);
        let ops = parse_cigar(text).unwrap();
        let seq = vec![b'A'; query_consumed(ops.iter().copied())];
        Record::new(
            b"r1",
            Some(Arc::clone(&header.references()[0])),
            None,
            pos,
            -1,
            0,
            30,
            &ops,
            &seq,
            &[],
            &[],
        )
        .unwrap()
    }

    // ========================================================================
    // construction and validation tests
    // ========================================================================

    #[test]
    fn test_new_populates_views() {
        let header = Header::from_references([("chr1", 1000)]);
        let ops = parse_cigar(b"4M").unwrap();
        let rec = Record::new(
            b"read1",
            Some(Arc::clone(&header.references()[0])),
            None,
            99,
            -1,
            0,
            40,
            &ops,
            b"ACGT",
            &[30, 31, 32, 33],
            b"NMc\x01",
        )
        .unwrap();
        assert_eq!(rec.name(), b"read1");
        assert_eq!(rec.pos(), 99);
        assert_eq!(rec.map_q(), 40);
        assert_eq!(rec.cigar().to_string(), "4M");
        assert_eq!(rec.seq().expand(), b"ACGT");
        assert_eq!(rec.qual(), &[30, 31, 32, 33]);
        assert_eq!(rec.aux_fields().len(), 1);
        assert_eq!(rec.aux_int_value(Tag(*b"NM")).unwrap(), Some(1));
    }

    #[test]
    fn test_new_rejects_bad_args() {
        let header = Header::from_references([("chr1", 1000)]);
        let chr1 = || Some(Arc::clone(&header.references()[0]));
        // Empty and oversized names
        assert!(Record::new(b"", chr1(), None, 0, -1, 0, 0, &[], &[], &[], &[]).is_err());
        let long = vec![b'x'; 255];
        assert!(Record::new(&long, chr1(), None, 0, -1, 0, 0, &[], &[], &[], &[]).is_err());
        // Position without a reference
        assert!(Record::new(b"r", None, None, 5, -1, 0, 0, &[], &[], &[], &[]).is_err());
        // Quality/sequence mismatch
        assert!(Record::new(b"r", chr1(), None, 0, -1, 0, 0, &[], b"ACGT", &[30], &[]).is_err());
        // Unplaced reference link
        let fake = Reference::placeholder("contig");
        assert!(Record::new(b"r", Some(fake), None, 0, -1, 0, 0, &[], &[], &[], &[]).is_err());
    }

    #[test]
    fn test_unknown_qual_filled() {
        let header = Header::from_references([("chr1", 1000)]);
        let rec = Record::new(
            b"r",
            Some(Arc::clone(&header.references()[0])),
            None,
            0,
            -1,
            0,
            0,
            &[],
            b"ACGT",
            &[],
            &[],
        )
        .unwrap();
        assert_eq!(rec.qual(), &[0xFF; 4]);
    }

    // ========================================================================
    // end / alignment_len tests
    // ========================================================================

    #[test]
    fn test_end_sums_reference_ops() {
        let rec = record_with_cigar(99, b"10M");
        assert_eq!(rec.end(), 109);
        assert_eq!(rec.alignment_len(), 10);

        let rec = record_with_cigar(100, b"5S10M3D7M");
        // S consumes no reference; M+D+M = 20
        assert_eq!(rec.end(), 120);
    }

    #[test]
    fn test_end_unmapped_or_no_cigar() {
        let mut rec = record_with_cigar(50, b"10M");
        rec.flags |= flags::UNMAPPED;
        assert_eq!(rec.end(), 51);

        let rec = record_with_cigar(50, b"*");
        assert_eq!(rec.end(), 51);
        assert_eq!(rec.alignment_len(), 1);
    }

    #[test]
    fn test_end_running_max() {
        // Insert-only tail: position never advances past the M span.
        let rec = record_with_cigar(10, b"5M3I");
        assert_eq!(rec.end(), 15);
    }

    // ========================================================================
    // bin tests
    // ========================================================================

    #[test]
    fn test_bin_both_unmapped() {
        let mut rec = Record::default();
        rec.flags = flags::UNMAPPED | flags::MATE_UNMAPPED;
        assert_eq!(rec.bin(), UNMAPPED_BIN);
    }

    #[test]
    fn test_bin_unplaced_is_4680() {
        // pos=-1, end=0: the smallest-level bin offset by -1.
        let mut rec = Record::default();
        rec.flags = flags::UNMAPPED;
        assert_eq!(rec.bin(), 4680);
    }

    #[test]
    fn test_bin_small_interval() {
        let rec = record_with_cigar(99, b"10M");
        // [99, 109) fits in the finest 16kb tile 0.
        assert_eq!(rec.bin(), 4681);
    }

    #[test]
    fn test_bin_levels() {
        assert_eq!(bin_for(0, 0x4000), 4681);
        assert_eq!(bin_for(0x4000, 0x8000), 4682);
        assert_eq!(bin_for(0, 0x8000), 585);
        assert_eq!(bin_for(0, 1 << 29), 0);
        assert_eq!(bin_for(-1, 0), 4680);
    }

    #[test]
    fn test_bin_zero_length_bumps_end() {
        // A cigar of only insertions consumes no reference: end == pos.
        let header = Header::from_references([("chr1", 1000)]);
        let ops = parse_cigar(b"4I").unwrap();
        let rec = Record::new(
            b"r",
            Some(Arc::clone(&header.references()[0])),
            None,
            100,
            -1,
            0,
            0,
            &ops,
            b"ACGT",
            &[],
            &[],
        )
        .unwrap();
        assert_eq!(rec.end(), 100);
        assert_eq!(rec.bin(), i32::from(bin_for(100, 101)));
    }

    #[test]
    fn test_bin_out_of_range() {
        let mut rec = record_with_cigar(MAX_INDEX_POS, b"10M");
        assert_eq!(rec.bin(), -1);
        rec.flags |= flags::UNMAPPED;
        rec.pos = MAX_INDEX_POS + 1;
        assert_eq!(rec.bin(), -1);
    }

    // ========================================================================
    // validity tests
    // ========================================================================

    #[test]
    fn test_is_valid_placed_needs_mapped_flag() {
        let rec = record_with_cigar(10, b"10M");
        assert!(rec.is_valid());

        let mut rec = Record::default();
        rec.flags = 0; // unplaced but not flagged unmapped
        assert!(!rec.is_valid());
        rec.flags = flags::UNMAPPED;
        assert!(rec.is_valid());
    }

    #[test]
    fn test_is_valid_flag_exclusions() {
        let mut rec = Record::default();
        rec.flags = flags::UNMAPPED | flags::PROPER_PAIR;
        assert!(!rec.is_valid());

        let mut rec = record_with_cigar(10, b"10M");
        rec.flags |= flags::PAIRED | flags::MATE_UNMAPPED | flags::PROPER_PAIR;
        assert!(!rec.is_valid());
    }

    #[test]
    fn test_is_valid_paired_needs_mate() {
        let mut rec = record_with_cigar(10, b"10M");
        rec.flags |= flags::PAIRED;
        assert!(!rec.is_valid());
        rec.flags |= flags::MATE_UNMAPPED;
        assert!(rec.is_valid());
    }

    #[test]
    fn test_is_valid_cigar_seq() {
        let header = Header::from_references([("chr1", 1000)]);
        let ops = parse_cigar(b"3M").unwrap();
        let mut rec = Record::new(
            b"r",
            Some(Arc::clone(&header.references()[0])),
            None,
            0,
            -1,
            0,
            0,
            &ops,
            b"ACGT",
            &[],
            &[],
        )
        .unwrap();
        assert!(!rec.is_valid());
        rec.seq_len = 3; // pretend the sequence matches
        rec.qual = Span::default();
        rec.seq = Span::new(rec.seq.start as usize, 2);
        assert!(rec.is_valid());
    }

    // ========================================================================
    // comparator tests
    // ========================================================================

    #[test]
    fn test_less_by_coordinate() {
        let header = Header::from_references([("chr1", 1000), ("chr2", 1000)]);
        let a = record_with_cigar(10, b"5M");
        let mut b = record_with_cigar(20, b"5M");
        assert!(a.less_by_coordinate(&b));
        assert!(!b.less_by_coordinate(&a));

        b.reference = Some(Arc::clone(&header.references()[1]));
        assert!(a.less_by_coordinate(&b));

        // Unplaced sorts after everything.
        let unplaced = Record::default();
        assert!(a.less_by_coordinate(&unplaced));
        assert!(!unplaced.less_by_coordinate(&a));
    }

    // ========================================================================
    // equality and reset tests
    // ========================================================================

    #[test]
    fn test_equality_ignores_scratch_identity() {
        let a = record_with_cigar(10, b"5M2I3M");
        let b = record_with_cigar(10, b"5M2I3M");
        assert_eq!(a, b);
        let c = record_with_cigar(11, b"5M2I3M");
        assert_ne!(a, c);
    }

    #[test]
    fn test_reset_clears_views() {
        let mut rec = record_with_cigar(10, b"5M");
        rec.reset();
        assert!(rec.name().is_empty());
        assert!(rec.reference().is_none());
        assert_eq!(rec.pos(), -1);
        assert_eq!(rec.mate_pos(), -1);
        assert_eq!(rec.flags(), 0);
        assert!(rec.cigar().is_empty());
        assert!(rec.seq().is_empty());
        assert!(rec.qual().is_empty());
        assert!(rec.aux_fields().is_empty());
    }

    // ========================================================================
    // resize_scratch tests
    // ========================================================================

    #[test]
    fn test_resize_scratch_rounds_capacity() {
        let mut buf = Vec::new();
        resize_scratch(&mut buf, 10);
        assert_eq!(buf.len(), 10);
        assert!(buf.capacity() >= 16);
        let cap = buf.capacity();
        resize_scratch(&mut buf, 5);
        assert_eq!(buf.len(), 5);
        assert_eq!(buf.capacity(), cap);
    }
}
