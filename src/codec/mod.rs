//! Fixed width codes stored in the sample index.
//!
//! - [`genotype`] - genotype codes and the parents byte
//! - [`annotation`] - annotation summary byte, consequence type / biotype masks and
//!   population frequency codes
//! - [`file`] - per file FILTER / type / QUAL / DP byte
//! - [`range`] - numeric predicates over threshold tables

pub mod annotation;
pub mod file;
pub mod genotype;
pub mod range;

/// Sentinel for "this value can not be represented in the index"
pub const EMPTY_MASK: u8 = 0;

/// Fixed width binary representation of a mask, most significant bit first
pub fn mask_to_string(mask: u8) -> String {
    format!("{:08b}", mask)
}
