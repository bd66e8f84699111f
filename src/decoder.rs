//! The binary BAM record decoder and the streaming reader.
//!
//! # BAM record binary layout
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//! 0-3     4     refID (i32) - reference sequence id
//! 4-7     4     pos (i32) - 0-based leftmost position
//! 8       1     l_read_name (u8) - read name length + NUL
//! 9       1     mapq (u8) - mapping quality
//! 10-11   2     bin (u16) - index bin (recomputable)
//! 12-13   2     n_cigar_op (u16) - number of CIGAR operations
//! 14-15   2     flag (u16) - bitwise flags
//! 16-19   4     l_seq (u32) - sequence length
//! 20-23   4     next_refID (i32) - mate reference sequence id
//! 24-27   4     next_pos (i32) - mate 0-based position
//! 28-31   4     tlen (i32) - template length
//! 32+     var   read_name, cigar, seq, qual, aux
//! ```
//!
//! All multi-byte fields are little-endian; the decoder byteswaps explicitly
//! rather than relying on host endianness or unaligned reads.

use std::io::{self, Read};
use std::sync::Arc;

use crate::errors::{BamRecError, Result};
use crate::header::Header;
use crate::pool;
use crate::record::{resize_scratch, Record};

/// The 32-byte fixed prefix every record carries.
pub const MIN_BAM_RECORD_LEN: usize = 32;

/// Largest accepted record payload (16 MiB - 1).
pub const MAX_BAM_RECORD_LEN: usize = 0xff_ffff;

/// How much of each record to materialize during decoding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Omit {
    /// Decode the full record.
    #[default]
    None,
    /// Skip aux-field indexing; `aux_fields()` is empty.
    AuxTags,
    /// Also leave seq and qual empty; the CIGAR is still decoded.
    AllVariableLengthData,
}

impl Omit {
    /// Map the public 0/1/2 selector onto a mode.
    pub fn from_int(v: i32) -> Result<Self> {
        match v {
            0 => Ok(Self::None),
            1 => Ok(Self::AuxTags),
            2 => Ok(Self::AllVariableLengthData),
            _ => Err(BamRecError::OutOfRange { what: "omission mode", value: i64::from(v) }),
        }
    }

    /// The selector value for this mode.
    #[must_use]
    pub fn as_int(self) -> i32 {
        self as i32
    }
}

/// Decode one BAM record payload (block-size prefix already consumed).
///
/// The record is acquired from the freelist, its variable-length data placed
/// in the record's scratch arena, and its references linked by id against
/// `header`.
pub fn decode_record(buf: &[u8], header: &Header, omit: Omit) -> Result<Record> {
    if buf.len() > MAX_BAM_RECORD_LEN {
        return Err(BamRecError::RecordTooLarge(buf.len()));
    }
    if buf.len() < MIN_BAM_RECORD_LEN {
        return Err(BamRecError::ShortRecord { len: buf.len(), expected: MIN_BAM_RECORD_LEN });
    }
    let ref_id = i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let pos = i32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
    let l_read_name = buf[8] as usize;
    let map_q = buf[9];
    // bytes 10-11 hold the stored bin; it is recomputable and not retained.
    let n_cigar = u16::from_le_bytes([buf[12], buf[13]]) as usize;
    let flags = u16::from_le_bytes([buf[14], buf[15]]);
    let l_seq = u32::from_le_bytes([buf[16], buf[17], buf[18], buf[19]]) as usize;
    let mate_ref_id = i32::from_le_bytes([buf[20], buf[21], buf[22], buf[23]]);
    let mate_pos = i32::from_le_bytes([buf[24], buf[25], buf[26], buf[27]]);
    let template_len = i32::from_le_bytes([buf[28], buf[29], buf[30], buf[31]]);

    let mut rec = pool::acquire();
    rec.pos = pos;
    rec.mate_pos = mate_pos;
    rec.template_len = template_len;
    rec.map_q = map_q;
    rec.flags = flags;

    let result = rec
        .load_wire_variable(l_read_name, n_cigar, l_seq, &buf[MIN_BAM_RECORD_LEN..], omit)
        .and_then(|()| link_references(&mut rec, header, ref_id, mate_ref_id));
    match result {
        Ok(()) => Ok(rec),
        Err(e) => {
            pool::release(rec);
            Err(e)
        }
    }
}

/// Resolve `ref` and `mate_ref` by id. Ids of -1 leave the field unset; when
/// both ids match, the mate shares the primary's lookup.
fn link_references(
    rec: &mut Record,
    header: &Header,
    ref_id: i32,
    mate_ref_id: i32,
) -> Result<()> {
    let refs = header.references();
    if ref_id != -1 {
        if ref_id < -1 || ref_id as usize >= refs.len() {
            return Err(BamRecError::BadReferenceId(ref_id));
        }
        rec.reference = Some(Arc::clone(&refs[ref_id as usize]));
    }
    if mate_ref_id != -1 {
        if mate_ref_id == ref_id {
            rec.mate_reference = rec.reference.clone();
            return Ok(());
        }
        if mate_ref_id < -1 || mate_ref_id as usize >= refs.len() {
            return Err(BamRecError::BadReferenceId(mate_ref_id));
        }
        rec.mate_reference = Some(Arc::clone(&refs[mate_ref_id as usize]));
    }
    Ok(())
}

/// A blocking source of decompressed container bytes.
///
/// Implementations expose the current logical position as an opaque chunk
/// marker and support seeking back to a previously observed marker. The
/// block-compressed container itself is a collaborator concern.
pub trait BlockSource: Read {
    /// Marker for the start of the region the next read will come from.
    fn begin_marker(&self) -> u64;

    /// Marker just past the last byte read.
    fn end_marker(&self) -> u64;

    /// Reposition the source at a previously observed marker.
    fn seek_to_marker(&mut self, marker: u64) -> io::Result<()>;
}

/// A streaming BAM record reader over a [`BlockSource`].
///
/// Each record is framed by a 4-byte little-endian `block_size` prefix. The
/// read buffer is reused across records; decoded records come from the
/// freelist and should be released back to it when consumed.
pub struct Reader<S> {
    src: S,
    header: Arc<Header>,
    omit: Omit,
    buf: Vec<u8>,
    last_markers: (u64, u64),
}

impl<S: BlockSource> Reader<S> {
    /// Create a reader over `src` resolving references against `header`.
    #[must_use]
    pub fn new(src: S, header: Arc<Header>) -> Self {
        Self { src, header, omit: Omit::None, buf: Vec::new(), last_markers: (0, 0) }
    }

    /// The reference dictionary in use.
    #[must_use]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Select how much of each record to materialize.
    pub fn set_omit(&mut self, omit: Omit) {
        self.omit = omit;
    }

    /// Read the next record, or `None` at a clean end of stream.
    pub fn read_record(&mut self) -> Result<Option<Record>> {
        let mut size_buf = [0u8; 4];
        match read_exact_or_eof(&mut self.src, &mut size_buf)? {
            0 => return Ok(None),
            4 => {}
            n => return Err(BamRecError::ShortRecord { len: n, expected: 4 }),
        }
        // Chunk markers are only valid after a read from the source.
        let begin = self.src.begin_marker();
        let size = u32::from_le_bytes(size_buf) as usize;
        if size > MAX_BAM_RECORD_LEN {
            return Err(BamRecError::RecordTooLarge(size));
        }
        resize_scratch(&mut self.buf, size);
        self.src.read_exact(&mut self.buf)?;
        self.last_markers = (begin, self.src.end_marker());
        decode_record(&self.buf, &self.header, self.omit).map(Some)
    }

    /// Reposition the source at a previously observed marker.
    pub fn seek(&mut self, marker: u64) -> io::Result<()> {
        self.src.seek_to_marker(marker)
    }

    /// The `(begin, end)` markers spanning the last record read.
    #[must_use]
    pub fn last_record_markers(&self) -> (u64, u64) {
        self.last_markers
    }

    /// Iterate over the remaining records.
    pub fn records(&mut self) -> Records<'_, S> {
        Records { reader: self }
    }
}

/// Iterator over a reader's remaining records.
pub struct Records<'r, S> {
    reader: &'r mut Reader<S>,
}

impl<S: BlockSource> Iterator for Records<'_, S> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.read_record().transpose()
    }
}

/// Fill `buf`, tolerating a clean end of stream at the first byte. Returns
/// the number of bytes read.
fn read_exact_or_eof(src: &mut impl Read, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match src.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aux::AuxValue;
    use crate::record::flags;
    use crate::testutil::*;

    fn one_ref_header() -> Header {
        Header::from_references([("chr1", 100_000), ("chr2", 50_000)])
    }

    // ========================================================================
    // decode_record tests
    // ========================================================================

    #[test]
    fn test_decode_minimal_unplaced() {
        // refID=-1, pos=-1, name "*", unmapped, nothing else
        let buf = RawRecordBuilder::named(b"*").flag(flags::UNMAPPED).build();
        assert_eq!(buf.len(), 34);
        let header = one_ref_header();
        let rec = decode_record(&buf, &header, Omit::None).unwrap();
        assert!(rec.reference().is_none());
        assert_eq!(rec.pos(), -1);
        assert!(rec.cigar().is_empty());
        assert!(rec.seq().is_empty());
        assert!(rec.qual().is_empty());
        assert!(rec.aux_fields().is_empty());
        assert!(rec.is_valid());
        assert_eq!(rec.end(), 0);
        assert_eq!(rec.name(), b"*");
    }

    #[test]
    fn test_decode_full_record() {
        let buf = RawRecordBuilder::named(b"r1")
            .placed(0, 99)
            .flag(flags::PAIRED | flags::REVERSE)
            .map_q(37)
            .cigar(b"10M")
            .bases(b"AAAAACCCCC")
            .mate(1, 200)
            .template_len(-150)
            .aux(b"NMc\x02RGZrg1\x00")
            .build();
        let header = one_ref_header();
        let rec = decode_record(&buf, &header, Omit::None).unwrap();
        assert_eq!(rec.name(), b"r1");
        assert_eq!(rec.reference().unwrap().name(), "chr1");
        assert_eq!(rec.mate_reference().unwrap().name(), "chr2");
        assert_eq!(rec.pos(), 99);
        assert_eq!(rec.mate_pos(), 200);
        assert_eq!(rec.template_len(), -150);
        assert_eq!(rec.map_q(), 37);
        assert_eq!(rec.cigar().to_string(), "10M");
        assert_eq!(rec.seq().expand(), b"AAAAACCCCC");
        assert_eq!(rec.qual().len(), 10);
        assert_eq!(rec.aux_fields().len(), 2);
        assert_eq!(rec.end(), 109);
        assert_eq!(rec.alignment_len(), 10);
    }

    #[test]
    fn test_decode_aux_zero_copy_integrity() {
        let aux = b"NMc\x02RGZrg1\x00XBBS\x02\x00\x00\x00\x01\x00\x02\x00";
        let buf = RawRecordBuilder::named(b"rd").placed(0, 5).bases(b"ACGT").aux(aux).build();
        let header = one_ref_header();
        let rec = decode_record(&buf, &header, Omit::None).unwrap();
        let fields = rec.aux_fields();
        assert_eq!(fields.len(), 3);
        // Each field's bytes equal the on-wire bytes, NUL included.
        assert_eq!(fields.get(0).bytes(), b"NMc\x02");
        assert_eq!(fields.get(1).bytes(), b"RGZrg1\x00");
        assert_eq!(fields.get(2).bytes(), &aux[11..]);
        let AuxValue::Array(array) = fields.get(2).value().unwrap() else {
            panic!("expected array");
        };
        assert_eq!(array.int(1), Some(2));
    }

    #[test]
    fn test_decode_shared_mate_reference() {
        let buf =
            RawRecordBuilder::named(b"rd").placed(1, 10).flag(flags::PAIRED).mate(1, 30).build();
        let header = one_ref_header();
        let rec = decode_record(&buf, &header, Omit::None).unwrap();
        let (r, m) = (rec.reference().unwrap(), rec.mate_reference().unwrap());
        assert!(Arc::ptr_eq(r, m));
        assert_eq!(r.name(), "chr2");
    }

    #[test]
    fn test_decode_omission_modes() {
        let buf = RawRecordBuilder::named(b"rd")
            .placed(0, 5)
            .cigar(b"4M")
            .bases(b"ACGT")
            .aux(b"NMc\x02")
            .build();
        let header = one_ref_header();

        let rec = decode_record(&buf, &header, Omit::AuxTags).unwrap();
        assert_eq!(rec.seq().len(), 4);
        assert_eq!(rec.qual().len(), 4);
        assert!(rec.aux_fields().is_empty());
        assert_eq!(rec.cigar().to_string(), "4M");

        let rec = decode_record(&buf, &header, Omit::AllVariableLengthData).unwrap();
        assert!(rec.seq().is_empty());
        assert!(rec.qual().is_empty());
        assert!(rec.aux_fields().is_empty());
        assert_eq!(rec.cigar().to_string(), "4M");
    }

    #[test]
    fn test_decode_corrupt_aux_fails_even_when_omitted() {
        let buf = RawRecordBuilder::named(b"rd").placed(0, 5).aux(b"XX?\x00").build();
        let header = one_ref_header();
        assert!(matches!(
            decode_record(&buf, &header, Omit::AuxTags),
            Err(BamRecError::CorruptAuxField(_))
        ));
    }

    #[test]
    fn test_decode_short_record() {
        let header = one_ref_header();
        assert!(matches!(
            decode_record(&[0u8; 31], &header, Omit::None),
            Err(BamRecError::ShortRecord { .. })
        ));
        // Declared sizes larger than the payload
        let mut buf = RawRecordBuilder::named(b"rd").placed(0, 5).bases(b"ACGT").build();
        buf[16..20].copy_from_slice(&100u32.to_le_bytes());
        assert!(matches!(
            decode_record(&buf, &header, Omit::None),
            Err(BamRecError::ShortRecord { .. })
        ));
    }

    #[test]
    fn test_decode_bad_reference_ids() {
        let header = one_ref_header();
        let buf = RawRecordBuilder::named(b"rd").placed(2, 5).build();
        assert!(matches!(
            decode_record(&buf, &header, Omit::None),
            Err(BamRecError::BadReferenceId(2))
        ));
        let buf = RawRecordBuilder::named(b"rd").placed(-2, 5).build();
        assert!(matches!(
            decode_record(&buf, &header, Omit::None),
            Err(BamRecError::BadReferenceId(-2))
        ));
        let buf = RawRecordBuilder::named(b"rd").placed(0, 5).mate(7, 10).build();
        assert!(matches!(
            decode_record(&buf, &header, Omit::None),
            Err(BamRecError::BadReferenceId(7))
        ));
    }

    // ========================================================================
    // Omit selector tests
    // ========================================================================

    #[test]
    fn test_omit_from_int() {
        assert_eq!(Omit::from_int(0).unwrap(), Omit::None);
        assert_eq!(Omit::from_int(1).unwrap(), Omit::AuxTags);
        assert_eq!(Omit::from_int(2).unwrap(), Omit::AllVariableLengthData);
        assert!(Omit::from_int(3).is_err());
        assert_eq!(Omit::AuxTags.as_int(), 1);
    }

    // ========================================================================
    // Reader tests
    // ========================================================================

    #[test]
    fn test_reader_frames_records() {
        let a = RawRecordBuilder::named(b"ra").placed(0, 10).cigar(b"4M").bases(b"ACGT").build();
        let b = RawRecordBuilder::named(b"rb").placed(1, 20).build();
        let framed = frame_records(&[&a, &b]);
        let header = Arc::new(one_ref_header());
        let mut reader = Reader::new(MemoryBlockSource::new(framed), header);

        let rec = reader.read_record().unwrap().unwrap();
        assert_eq!(rec.name(), b"ra");
        let (begin, end) = reader.last_record_markers();
        assert_eq!(begin, 4);
        assert_eq!(end, 4 + a.len() as u64);

        let rec = reader.read_record().unwrap().unwrap();
        assert_eq!(rec.name(), b"rb");
        assert!(reader.read_record().unwrap().is_none());
    }

    #[test]
    fn test_reader_seek_replays() {
        let a = RawRecordBuilder::named(b"ra").placed(0, 10).build();
        let framed = frame_records(&[&a]);
        let header = Arc::new(one_ref_header());
        let mut reader = Reader::new(MemoryBlockSource::new(framed), header);
        let first = reader.read_record().unwrap().unwrap();
        reader.seek(0).unwrap();
        let again = reader.read_record().unwrap().unwrap();
        assert_eq!(first, again);
    }

    #[test]
    fn test_reader_iterator() {
        let recs: Vec<Vec<u8>> = (0..3)
            .map(|i| RawRecordBuilder::named(b"rd").placed(0, i * 10).build())
            .collect();
        let framed = frame_records(&recs.iter().map(Vec::as_slice).collect::<Vec<_>>());
        let header = Arc::new(one_ref_header());
        let mut reader = Reader::new(MemoryBlockSource::new(framed), header);
        let decoded: Vec<_> = reader.records().collect::<Result<_>>().unwrap();
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[2].pos(), 20);
    }

    #[test]
    fn test_reader_truncated_prefix() {
        let header = Arc::new(one_ref_header());
        let mut reader = Reader::new(MemoryBlockSource::new(vec![1, 0]), header);
        assert!(matches!(
            reader.read_record(),
            Err(BamRecError::ShortRecord { len: 2, expected: 4 })
        ));
    }

    #[test]
    fn test_reader_rejects_oversized_block() {
        let mut framed = Vec::new();
        framed.extend_from_slice(&(MAX_BAM_RECORD_LEN as u32 + 1).to_le_bytes());
        let header = Arc::new(one_ref_header());
        let mut reader = Reader::new(MemoryBlockSource::new(framed), header);
        assert!(matches!(reader.read_record(), Err(BamRecError::RecordTooLarge(_))));
    }

    #[test]
    fn test_reader_truncated_payload() {
        let a = RawRecordBuilder::named(b"ra").placed(0, 10).build();
        let mut framed = frame_records(&[&a]);
        framed.truncate(framed.len() - 2);
        let header = Arc::new(one_ref_header());
        let mut reader = Reader::new(MemoryBlockSource::new(framed), header);
        assert!(matches!(reader.read_record(), Err(BamRecError::Io(_))));
    }
}
