#![deny(unsafe_code)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

//! # bamrec - SAM/BAM alignment record model
//!
//! This crate models alignment records as stored in the BAM binary format and
//! its textual SAM counterpart: arena-backed records whose variable-length
//! fields (read name, CIGAR, packed sequence, qualities, aux tags) all live in
//! a single reusable scratch buffer, a zero-copy auxiliary-tag parser, and a
//! bounded record freelist for allocation-free streaming.
//!
//! ## Overview
//!
//! - **[`record`]** - the record type, its arena layout, and derived
//!   quantities (alignment end, span, index bin)
//! - **[`decoder`]** - the binary BAM record decoder and the streaming
//!   [`Reader`] over a block-compressed container source
//! - **[`sam`]** - line-at-a-time SAM text parsing and rendering
//! - **[`aux`]** - auxiliary tag views, typed values, and the two-pass parser
//! - **[`sequence`]** - the 4-bit packed nucleotide encoding
//! - **[`cigar`]** - CIGAR operations and consumed-length arithmetic
//! - **[`pool`]** - the process-wide record freelist
//! - **[`alignment_tags`]** - duplicate-marking pipeline tag accessors
//!
//! The block-compressed container itself and the header's binary decoding are
//! collaborator concerns: the decoder consumes any [`BlockSource`] plus a
//! [`Header`] reference dictionary.

pub mod alignment_tags;
pub mod aux;
pub mod cigar;
pub mod decoder;
pub mod errors;
pub mod header;
pub mod pool;
pub mod record;
pub mod sam;
pub mod sequence;

#[cfg(any(test, feature = "test-utils"))]
pub mod testutil;

// Flat re-exports -- callers use bamrec::Record, bamrec::decode_record, etc.
pub use alignment_tags::*;
pub use aux::*;
pub use cigar::*;
pub use decoder::*;
pub use errors::*;
pub use header::*;
pub use pool::*;
pub use record::*;
pub use sam::*;
pub use sequence::*;

#[cfg(any(test, feature = "test-utils"))]
pub use testutil::*;
