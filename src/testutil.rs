//! Test fixtures: a wire-format record builder and an in-memory block
//! source.
//!
//! Available to this crate's tests and, behind the `test-utils` feature, to
//! downstream test code.

use std::io::{self, Read};

use crate::cigar::{parse_cigar, CigarOp};
use crate::decoder::BlockSource;
use crate::sequence::pack_sequence_into;

/// Assembles the wire bytes of one BAM record payload (without the
/// `block_size` prefix).
///
/// Starts out unplaced (both reference ids -1), flagless, with an empty
/// sequence. Quality bytes default to zeroes when bases are set without an
/// explicit quality string.
///
/// ```
/// use bamrec::testutil::RawRecordBuilder;
///
/// let payload = RawRecordBuilder::named(b"q1")
///     .placed(0, 99)
///     .cigar(b"4M")
///     .bases(b"ACGT")
///     .build();
/// assert_eq!(payload.len(), 32 + 3 + 4 + 2 + 4);
/// ```
pub struct RawRecordBuilder {
    name: Vec<u8>,
    ref_id: i32,
    pos: i32,
    map_q: u8,
    flag: u16,
    mate_ref_id: i32,
    mate_pos: i32,
    template_len: i32,
    ops: Vec<CigarOp>,
    bases: Vec<u8>,
    quals: Vec<u8>,
    aux: Vec<u8>,
}

impl RawRecordBuilder {
    /// Start a record with the given read name.
    #[must_use]
    pub fn named(name: &[u8]) -> Self {
        Self {
            name: name.to_vec(),
            ref_id: -1,
            pos: -1,
            map_q: 0,
            flag: 0,
            mate_ref_id: -1,
            mate_pos: -1,
            template_len: 0,
            ops: Vec::new(),
            bases: Vec::new(),
            quals: Vec::new(),
            aux: Vec::new(),
        }
    }

    /// Place the record at a reference id and 0-based position.
    #[must_use]
    pub fn placed(mut self, ref_id: i32, pos: i32) -> Self {
        self.ref_id = ref_id;
        self.pos = pos;
        self
    }

    /// Place the mate at a reference id and 0-based position.
    #[must_use]
    pub fn mate(mut self, ref_id: i32, pos: i32) -> Self {
        self.mate_ref_id = ref_id;
        self.mate_pos = pos;
        self
    }

    /// Set the flag word.
    #[must_use]
    pub fn flag(mut self, flag: u16) -> Self {
        self.flag = flag;
        self
    }

    /// Set the mapping quality.
    #[must_use]
    pub fn map_q(mut self, map_q: u8) -> Self {
        self.map_q = map_q;
        self
    }

    /// Set the template length.
    #[must_use]
    pub fn template_len(mut self, template_len: i32) -> Self {
        self.template_len = template_len;
        self
    }

    /// Set the CIGAR from its text form, e.g. `b"3S10M"`.
    ///
    /// # Panics
    ///
    /// Panics if the text does not parse.
    #[must_use]
    pub fn cigar(mut self, text: &[u8]) -> Self {
        self.ops = parse_cigar(text).expect("bad CIGAR text in test fixture");
        self
    }

    /// Set the sequence from ASCII bases.
    #[must_use]
    pub fn bases(mut self, bases: &[u8]) -> Self {
        self.bases = bases.to_vec();
        self
    }

    /// Set the raw (not Phred+33) quality bytes; must match the base count.
    #[must_use]
    pub fn quals(mut self, quals: &[u8]) -> Self {
        self.quals = quals.to_vec();
        self
    }

    /// Append wire-form aux data.
    #[must_use]
    pub fn aux(mut self, wire: &[u8]) -> Self {
        self.aux.extend_from_slice(wire);
        self
    }

    /// Produce the record payload.
    ///
    /// # Panics
    ///
    /// Panics if the name exceeds 254 bytes or a non-empty quality string
    /// disagrees with the base count.
    #[must_use]
    pub fn build(&self) -> Vec<u8> {
        assert!(self.name.len() <= 254, "name too long for a BAM record");
        assert!(
            self.quals.is_empty() || self.quals.len() == self.bases.len(),
            "quality/base count mismatch in test fixture"
        );
        let mut wire = Vec::new();
        wire.extend_from_slice(&self.ref_id.to_le_bytes());
        wire.extend_from_slice(&self.pos.to_le_bytes());
        wire.push(self.name.len() as u8 + 1);
        wire.push(self.map_q);
        wire.extend_from_slice(&0u16.to_le_bytes()); // bin, recomputable
        wire.extend_from_slice(&(self.ops.len() as u16).to_le_bytes());
        wire.extend_from_slice(&self.flag.to_le_bytes());
        wire.extend_from_slice(&(self.bases.len() as u32).to_le_bytes());
        wire.extend_from_slice(&self.mate_ref_id.to_le_bytes());
        wire.extend_from_slice(&self.mate_pos.to_le_bytes());
        wire.extend_from_slice(&self.template_len.to_le_bytes());
        wire.extend_from_slice(&self.name);
        wire.push(0);
        for op in &self.ops {
            wire.extend_from_slice(&op.as_raw().to_le_bytes());
        }
        pack_sequence_into(&mut wire, &self.bases);
        if self.quals.is_empty() {
            wire.resize(wire.len() + self.bases.len(), 0);
        } else {
            wire.extend_from_slice(&self.quals);
        }
        wire.extend_from_slice(&self.aux);
        wire
    }
}

/// Concatenate record payloads with their 4-byte `block_size` prefixes.
#[must_use]
pub fn frame_records(records: &[&[u8]]) -> Vec<u8> {
    let mut framed = Vec::new();
    for rec in records {
        framed.extend_from_slice(&(rec.len() as u32).to_le_bytes());
        framed.extend_from_slice(rec);
    }
    framed
}

/// An in-memory [`BlockSource`] whose chunk markers are plain byte offsets.
pub struct MemoryBlockSource {
    data: Vec<u8>,
    pos: usize,
}

impl MemoryBlockSource {
    /// Wrap a byte buffer.
    #[must_use]
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }
}

impl Read for MemoryBlockSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = &self.data[self.pos..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        Ok(n)
    }
}

impl BlockSource for MemoryBlockSource {
    fn begin_marker(&self) -> u64 {
        self.pos as u64
    }

    fn end_marker(&self) -> u64 {
        self.pos as u64
    }

    fn seek_to_marker(&mut self, marker: u64) -> io::Result<()> {
        if marker as usize > self.data.len() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "marker past end of data"));
        }
        self.pos = marker as usize;
        Ok(())
    }
}
