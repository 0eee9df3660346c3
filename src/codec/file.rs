//! Per file index byte.
//!
//! ```text
//! bit     7 6 | 5 4  | 3 2 1 | 0
//! field   DP  | QUAL | TYPE  | PASS
//! ```

use super::range::range_code;
use crate::schema::IndexSchema;
use crate::types::VariantType;
use serde::{Deserialize, Serialize};

pub const FILTER_PASS_SHIFT: u8 = 0;
pub const FILTER_PASS_MASK: u8 = 1 << FILTER_PASS_SHIFT;

pub const TYPE_SHIFT: u8 = 1;
pub const TYPE_BITS: u8 = 3;
pub const TYPE_MASK: u8 = ((1 << TYPE_BITS) - 1) << TYPE_SHIFT;

pub const QUAL_SHIFT: u8 = 4;
pub const QUAL_BITS: u8 = 2;
pub const QUAL_MASK: u8 = ((1 << QUAL_BITS) - 1) << QUAL_SHIFT;

pub const DP_SHIFT: u8 = 6;
pub const DP_BITS: u8 = 2;
pub const DP_MASK: u8 = ((1 << DP_BITS) - 1) << DP_SHIFT;

pub const TYPE_OTHER_CODE: u8 = 0;
pub const TYPE_SNV_CODE: u8 = 1;
pub const TYPE_MNV_CODE: u8 = 2;
pub const TYPE_INDEL_CODE: u8 = 3;
pub const TYPE_INSERTION_CODE: u8 = 4;
pub const TYPE_DELETION_CODE: u8 = 5;
pub const TYPE_BREAKEND_CODE: u8 = 6;
pub const TYPE_COPY_NUMBER_CODE: u8 = 7;

pub const PASS: &str = "PASS";

/// Type code of a variant type. Types without a dedicated code share [`TYPE_OTHER_CODE`].
pub fn type_code(variant_type: VariantType) -> u8 {
    match variant_type {
        VariantType::Snv | VariantType::Snp => TYPE_SNV_CODE,
        VariantType::Mnv | VariantType::Mnp => TYPE_MNV_CODE,
        VariantType::Indel => TYPE_INDEL_CODE,
        VariantType::Insertion => TYPE_INSERTION_CODE,
        VariantType::Deletion => TYPE_DELETION_CODE,
        VariantType::Breakend => TYPE_BREAKEND_CODE,
        VariantType::CopyNumber | VariantType::CopyNumberGain | VariantType::CopyNumberLoss => {
            TYPE_COPY_NUMBER_CODE
        }
        _ => TYPE_OTHER_CODE,
    }
}

/// Codes shared by several variant types can not prove a TYPE filter
pub fn is_imprecise_type_code(code: u8) -> bool {
    matches!(code, TYPE_OTHER_CODE | TYPE_COPY_NUMBER_CODE)
}

pub fn is_pass(file_index: u8) -> bool {
    file_index & FILTER_PASS_MASK != 0
}

pub fn type_code_of(file_index: u8) -> u8 {
    (file_index & TYPE_MASK) >> TYPE_SHIFT
}

pub fn qual_code(file_index: u8) -> u8 {
    (file_index & QUAL_MASK) >> QUAL_SHIFT
}

pub fn dp_code(file_index: u8) -> u8 {
    (file_index & DP_MASK) >> DP_SHIFT
}

/// Compose a file byte from its fields
pub fn compose(pass: bool, type_code: u8, qual_code: u8, dp_code: u8) -> u8 {
    let mut file_index = 0;
    if pass {
        file_index |= FILTER_PASS_MASK;
    }
    file_index |= (type_code << TYPE_SHIFT) & TYPE_MASK;
    file_index |= (qual_code << QUAL_SHIFT) & QUAL_MASK;
    file_index |= (dp_code << DP_SHIFT) & DP_MASK;
    file_index
}

/// Per file attributes of a variant call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub qual: Option<f64>,
    #[serde(default)]
    pub dp: Option<f64>,
    pub variant_type: VariantType,
}

pub struct FileIndexEncoder<'a> {
    schema: &'a IndexSchema,
}

impl<'a> FileIndexEncoder<'a> {
    pub fn new(schema: &'a IndexSchema) -> Self {
        Self { schema }
    }

    /// Missing QUAL or DP take the lowest code
    pub fn encode(&self, record: &FileRecord) -> u8 {
        let pass = record.filter.as_deref() == Some(PASS);
        let qual = record
            .qual
            .map(|q| range_code(q, &self.schema.qual_thresholds))
            .unwrap_or(0);
        let dp = record
            .dp
            .map(|dp| range_code(dp, &self.schema.dp_thresholds))
            .unwrap_or(0);
        compose(pass, type_code(record.variant_type), qual, dp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(filter: Option<&str>, qual: Option<f64>, dp: Option<f64>, t: VariantType) -> FileRecord {
        FileRecord {
            filter: filter.map(str::to_string),
            qual,
            dp,
            variant_type: t,
        }
    }

    #[test]
    fn test_masks_are_disjoint() {
        let masks = [FILTER_PASS_MASK, TYPE_MASK, QUAL_MASK, DP_MASK];
        let mut all = 0u8;
        for mask in masks {
            assert_eq!(all & mask, 0);
            all |= mask;
        }
        assert_eq!(all, 0xFF);
    }

    #[test]
    fn test_encode_file_record() {
        let schema = IndexSchema::default();
        let encoder = FileIndexEncoder::new(&schema);

        let b = encoder.encode(&record(Some("PASS"), Some(35.0), Some(12.0), VariantType::Snv));
        assert!(is_pass(b));
        assert_eq!(type_code_of(b), TYPE_SNV_CODE);
        assert_eq!(qual_code(b), 2);
        assert_eq!(dp_code(b), 2);

        let b = encoder.encode(&record(Some("LowQual"), None, Some(20.0), VariantType::Deletion));
        assert!(!is_pass(b));
        assert_eq!(type_code_of(b), TYPE_DELETION_CODE);
        assert_eq!(qual_code(b), 0);
        assert_eq!(dp_code(b), 3);
    }

    #[test]
    fn test_type_aliases() {
        assert_eq!(type_code(VariantType::Snp), type_code(VariantType::Snv));
        assert_eq!(type_code(VariantType::Mnp), type_code(VariantType::Mnv));
        assert_eq!(type_code(VariantType::Inversion), TYPE_OTHER_CODE);
        assert!(is_imprecise_type_code(type_code(VariantType::CopyNumberGain)));
        assert!(!is_imprecise_type_code(type_code(VariantType::Indel)));
    }
}
