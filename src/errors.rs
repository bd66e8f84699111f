//! Error types for record decoding, parsing, and aux-tag access.

use bstr::BString;
use thiserror::Error;

use crate::aux::Tag;

/// Result type alias for record operations.
pub type Result<T> = std::result::Result<T, BamRecError>;

/// Error type for record decoding, parsing, and aux-tag access.
#[derive(Error, Debug)]
pub enum BamRecError {
    /// A scalar argument fell outside its permitted range (position, template
    /// length, name length, quality length, flag-format or omission selector).
    #[error("{what} out of range: {value}")]
    OutOfRange {
        /// What was being validated
        what: &'static str,
        /// The offending value
        value: i64,
    },

    /// A binary record was shorter than its own layout declares.
    #[error("record too short: {len} bytes, expected at least {expected}")]
    ShortRecord {
        /// Actual payload length
        len: usize,
        /// Minimum length implied by the fixed header
        expected: usize,
    },

    /// A binary record exceeded the maximum supported block size.
    #[error("record too large: {0} bytes")]
    RecordTooLarge(usize),

    /// A reference id was below -1 or beyond the header's reference count.
    #[error("reference id out of range: {0}")]
    BadReferenceId(i32),

    /// The CIGAR's query-consumed length disagrees with the sequence length.
    #[error("sequence/CIGAR length mismatch: CIGAR consumes {cigar} query bases, sequence has {seq}")]
    CigarSeqMismatch {
        /// Query bases consumed by the CIGAR
        cigar: usize,
        /// Sequence length
        seq: usize,
    },

    /// A non-empty quality string whose length differs from the sequence.
    #[error("sequence/quality length mismatch: {qual} quality bytes for {seq} bases")]
    SeqQualMismatch {
        /// Quality string length
        qual: usize,
        /// Sequence length
        seq: usize,
    },

    /// Malformed aux data: unknown type byte, missing NUL terminator, or a
    /// truncated field or array header.
    #[error("corrupt aux field: {0}")]
    CorruptAuxField(&'static str),

    /// A tag queried as unique matched two or more aux fields.
    #[error("aux tag {0} matches more than one field")]
    AmbiguousTag(Tag),

    /// A coercion accessor was applied to an aux value of the wrong kind.
    #[error("aux tag {tag}: unexpected type '{found}'")]
    TypeMismatch {
        /// The tag that was queried
        tag: Tag,
        /// The type byte actually found
        found: char,
    },

    /// A pipeline-tag accessor saw a value outside its allowed vocabulary.
    #[error("aux tag {tag}: unexpected value {value}")]
    UnexpectedValue {
        /// The tag that was queried
        tag: Tag,
        /// The offending value
        value: BString,
    },

    /// SAM text could not be parsed.
    #[error("failed to parse SAM {what}: {reason}")]
    Parse {
        /// Which field or construct failed
        what: &'static str,
        /// Why it failed
        reason: String,
    },

    /// The underlying container source failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BamRecError {
    pub(crate) fn parse(what: &'static str, reason: impl Into<String>) -> Self {
        BamRecError::Parse { what, reason: reason.into() }
    }
}
