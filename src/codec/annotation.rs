//! Annotation summary byte and per variant annotation codes.
//!
//! The summary byte holds independent flags that can be tested one at a time:
//!
//! ```text
//! bit 0  PROTEIN_CODING     any consequence type with a protein coding biotype
//! bit 1  POP_FREQ_ANY_001   alt frequency below 0.001 in at least one "any" population
//! bit 2  MISSENSE_VARIANT
//! bit 3  LOF                narrow loss of function set
//! bit 4  LOF_EXTENDED       loss of function set plus missense
//! bit 5  CLINICAL           any trait association
//! bit 6  INTERGENIC         no genic consequence type
//! bit 7  NON_SNV
//! ```
//!
//! Missing population frequencies count as 0.

use super::range::range_code;
use crate::schema::{IndexSchema, NON_GENIC_TERMS};
use crate::types::VariantType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const PROTEIN_CODING_MASK: u8 = 1 << 0;
pub const POP_FREQ_ANY_001_MASK: u8 = 1 << 1;
pub const MISSENSE_VARIANT_MASK: u8 = 1 << 2;
pub const LOF_MASK: u8 = 1 << 3;
pub const LOF_EXTENDED_MASK: u8 = 1 << 4;
pub const CLINICAL_MASK: u8 = 1 << 5;
pub const INTERGENIC_MASK: u8 = 1 << 6;
pub const NON_SNV_MASK: u8 = 1 << 7;

pub const NUM_SUMMARY_BITS: usize = 8;

pub const POP_FREQ_CODE_BITS: u8 = 2;
const POP_FREQ_CODE_MASK: u8 = (1 << POP_FREQ_CODE_BITS) - 1;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsequenceType {
    #[serde(default)]
    pub gene_name: Option<String>,
    #[serde(default)]
    pub biotype: Option<String>,
    #[serde(default)]
    pub sequence_ontology_terms: Vec<String>,
}

impl ConsequenceType {
    fn is_genic(&self) -> bool {
        self.gene_name.is_some()
            || self.biotype.is_some()
            || self
                .sequence_ontology_terms
                .iter()
                .any(|term| !NON_GENIC_TERMS.contains(&term.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationFrequency {
    pub study: String,
    pub population: String,
    pub alt_allele_freq: f64,
}

/// Annotation of a single variant, as produced by the annotation service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariantAnnotation {
    pub reference: String,
    pub alternate: String,
    #[serde(default)]
    pub consequence_types: Vec<ConsequenceType>,
    #[serde(default)]
    pub population_frequencies: Vec<PopulationFrequency>,
    #[serde(default)]
    pub trait_associations: Vec<String>,
}

/// All annotation codes of one variant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationIndexEntry {
    pub summary: u8,
    pub consequence_type: u16,
    pub biotype: u8,
    pub population_frequency: u8,
}

/// Population frequency code of a slot within the population frequency byte
pub fn pop_freq_code(population_frequency: u8, slot: usize) -> u8 {
    (population_frequency >> (slot as u8 * POP_FREQ_CODE_BITS)) & POP_FREQ_CODE_MASK
}

/// Number of variants with each summary bit set
pub fn count_per_bit(summaries: &[u8]) -> [u32; NUM_SUMMARY_BITS] {
    let mut counts = [0u32; NUM_SUMMARY_BITS];
    for summary in summaries {
        for (bit, count) in counts.iter_mut().enumerate() {
            if summary & (1 << bit) != 0 {
                *count += 1;
            }
        }
    }
    counts
}

pub struct AnnotationIndexEncoder<'a> {
    schema: &'a IndexSchema,
}

impl<'a> AnnotationIndexEncoder<'a> {
    pub fn new(schema: &'a IndexSchema) -> Self {
        Self { schema }
    }

    pub fn encode(&self, annotation: &VariantAnnotation) -> AnnotationIndexEntry {
        let schema = self.schema;
        let mut entry = AnnotationIndexEntry::default();

        if !matches!(
            VariantType::infer(&annotation.reference, &annotation.alternate),
            VariantType::Snv | VariantType::Snp
        ) {
            entry.summary |= NON_SNV_MASK;
        }

        let mut genic = false;
        for ct in &annotation.consequence_types {
            genic |= ct.is_genic();
            if let Some(biotype) = &ct.biotype {
                if schema.is_protein_coding_biotype(biotype) {
                    entry.summary |= PROTEIN_CODING_MASK;
                }
                entry.biotype |= schema.biotype_mask(biotype);
            }
            for term in &ct.sequence_ontology_terms {
                if term == crate::schema::MISSENSE_VARIANT {
                    entry.summary |= MISSENSE_VARIANT_MASK;
                }
                if schema.is_lof(term) {
                    entry.summary |= LOF_MASK;
                }
                if schema.is_lof_extended(term) {
                    entry.summary |= LOF_EXTENDED_MASK;
                }
                entry.consequence_type |= schema.consequence_type_mask(term);
            }
        }
        if !genic {
            entry.summary |= INTERGENIC_MASK;
        }

        let frequencies: HashMap<String, f64> = annotation
            .population_frequencies
            .iter()
            .map(|pf| (format!("{}:{}", pf.study, pf.population), pf.alt_allele_freq))
            .collect();
        let frequency = |key: &str| frequencies.get(key).copied().unwrap_or(0.0);

        let min_any = schema
            .pop_freq_any
            .iter()
            .map(|key| frequency(key))
            .fold(f64::INFINITY, f64::min);
        if min_any < schema.pop_freq_any_threshold {
            entry.summary |= POP_FREQ_ANY_001_MASK;
        }

        for (slot, range) in schema.population_ranges.iter().enumerate() {
            let code = range_code(frequency(&range.study_and_population()), &range.thresholds);
            entry.population_frequency |= code << (slot as u8 * POP_FREQ_CODE_BITS);
        }

        if !annotation.trait_associations.is_empty() {
            entry.summary |= CLINICAL_MASK;
        }

        entry
    }
}
