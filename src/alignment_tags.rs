//! Accessors for the duplicate-marking pipeline aux tags.
//!
//! Upstream tooling annotates records with bag membership and duplicate
//! state: DI/DS (bag id and size), DT (duplicate type), DL (library bag
//! size), and LD/LI/LS (linear duplicate state, bag id, and size). All
//! accessors treat a missing tag as absent rather than an error.

use bstr::BString;

use crate::aux::{AuxValue, Tag};
use crate::errors::{BamRecError, Result};
use crate::record::Record;

/// Bag id ("DI").
pub const BAG_ID_TAG: Tag = Tag(*b"DI");
/// Bag size ("DS").
pub const BAG_SIZE_TAG: Tag = Tag(*b"DS");
/// Duplicate type ("DT").
pub const DUP_TYPE_TAG: Tag = Tag(*b"DT");
/// Library bag size ("DL").
pub const LIBRARY_BAG_SIZE_TAG: Tag = Tag(*b"DL");
/// Linear duplicate state ("LD").
pub const LINEAR_DUP_TAG: Tag = Tag(*b"LD");
/// Linear bag id ("LI").
pub const LINEAR_BAG_ID_TAG: Tag = Tag(*b"LI");
/// Linear bag size ("LS").
pub const LINEAR_BAG_SIZE_TAG: Tag = Tag(*b"LS");

/// The duplicate type recorded in the DT tag.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DupType {
    /// Tag not present.
    #[default]
    None,
    /// "LB": library (PCR) duplicate.
    Lb,
    /// "SQ": sequencer (optical) duplicate.
    Sq,
}

/// The linear duplicate state recorded in the LD tag.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LinearDupState {
    /// Tag not present.
    #[default]
    None,
    /// "primary".
    Primary,
    /// "duplicate".
    Duplicate,
}

impl Record {
    /// The bag id from the DI tag; `None` when absent, rejecting negatives.
    pub fn bag_id(&self) -> Result<Option<i64>> {
        match self.aux_int64_value(BAG_ID_TAG)? {
            Some(v) if v < 0 => Err(unexpected(BAG_ID_TAG, v)),
            other => Ok(other),
        }
    }

    /// The bag size from the DS tag; `None` when absent, rejecting values
    /// below 1.
    pub fn bag_size(&self) -> Result<Option<i32>> {
        match self.aux_int_value(BAG_SIZE_TAG)? {
            Some(v) if v <= 0 => Err(unexpected(BAG_SIZE_TAG, i64::from(v))),
            other => Ok(other),
        }
    }

    /// The duplicate type from the DT tag.
    pub fn dup_type(&self) -> Result<DupType> {
        let Some(field) = self.aux_fields().get_unique(DUP_TYPE_TAG)? else {
            return Ok(DupType::None);
        };
        match field.value()? {
            AuxValue::String(b"SQ") => Ok(DupType::Sq),
            AuxValue::String(b"LB") => Ok(DupType::Lb),
            AuxValue::String(other) => Err(BamRecError::UnexpectedValue {
                tag: DUP_TYPE_TAG,
                value: BString::from(other),
            }),
            _ => Err(BamRecError::TypeMismatch {
                tag: DUP_TYPE_TAG,
                found: field.type_byte() as char,
            }),
        }
    }

    /// The number of library duplicate fragments in the bag, from the DL tag;
    /// `None` when absent, rejecting values below 1.
    pub fn library_bag_size(&self) -> Result<Option<i32>> {
        match self.aux_int_value(LIBRARY_BAG_SIZE_TAG)? {
            Some(v) if v < 1 => Err(unexpected(LIBRARY_BAG_SIZE_TAG, i64::from(v))),
            other => Ok(other),
        }
    }

    /// The linear duplicate state from the LD tag.
    pub fn linear_dup(&self) -> Result<LinearDupState> {
        let Some(field) = self.aux_fields().get_unique(LINEAR_DUP_TAG)? else {
            return Ok(LinearDupState::None);
        };
        match field.value()? {
            AuxValue::String(b"primary") => Ok(LinearDupState::Primary),
            AuxValue::String(b"duplicate") => Ok(LinearDupState::Duplicate),
            AuxValue::String(other) => Err(BamRecError::UnexpectedValue {
                tag: LINEAR_DUP_TAG,
                value: BString::from(other),
            }),
            _ => Err(BamRecError::TypeMismatch {
                tag: LINEAR_DUP_TAG,
                found: field.type_byte() as char,
            }),
        }
    }

    /// The linear bag id from the LI tag; `None` when absent, rejecting
    /// negatives.
    pub fn linear_bag_id(&self) -> Result<Option<i64>> {
        match self.aux_int64_value(LINEAR_BAG_ID_TAG)? {
            Some(v) if v < 0 => Err(unexpected(LINEAR_BAG_ID_TAG, v)),
            other => Ok(other),
        }
    }

    /// The linear bag size from the LS tag; `None` when absent, rejecting
    /// values below 1.
    pub fn linear_bag_size(&self) -> Result<Option<i32>> {
        match self.aux_int_value(LINEAR_BAG_SIZE_TAG)? {
            Some(v) if v <= 0 => Err(unexpected(LINEAR_BAG_SIZE_TAG, i64::from(v))),
            other => Ok(other),
        }
    }
}

fn unexpected(tag: Tag, value: i64) -> BamRecError {
    BamRecError::UnexpectedValue { tag, value: BString::from(value.to_string()) }
}
