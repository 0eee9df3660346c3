//! Applies a single sample index query to a decoded entry.
//!
//! Codes missing from the entry pass every test. Clauses are only dropped from the
//! residual query when the sample index status guarantees the codes were written.

use crate::codec::genotype::{father_code, mother_code};
use crate::decoder::mendelian::is_de_novo;
use crate::decoder::{IndexedVariant, SampleIndexEntry, VariantCodes};
use crate::planner::SingleSampleIndexQuery;
use crate::types::SampleVariant;
use crate::Result;
use std::collections::BTreeSet;

pub struct SampleIndexEntryFilter<'a> {
    query: SingleSampleIndexQuery<'a>,
}

impl<'a> SampleIndexEntryFilter<'a> {
    pub fn new(query: SingleSampleIndexQuery<'a>) -> Self {
        Self { query }
    }

    /// Whether bucket counts alone answer the query
    pub fn is_count_only(&self) -> bool {
        let query = &self.query;
        query.regions.is_empty()
            && !query.mendelian_error
            && !query.has_parent_filter()
            && query.file_query.is_none_or(|f| f.is_empty())
            && query.annotation_query.is_empty()
    }

    /// Sum of the bucket counts of the queried genotypes
    pub fn count(&self, entry: &SampleIndexEntry) -> u64 {
        self.query
            .genotypes
            .iter()
            .filter_map(|gt| entry.genotype(gt))
            .map(|g| g.count as u64)
            .sum()
    }

    pub fn filter(&self, entry: &SampleIndexEntry) -> Result<BTreeSet<SampleVariant>> {
        if self.query.mendelian_error {
            return self.filter_mendelian_errors(entry);
        }

        let mut variants = BTreeSet::new();
        for gt in self.query.genotypes {
            let Some(bucket) = entry.genotype(gt) else {
                continue;
            };
            for indexed in bucket.iter() {
                let IndexedVariant { variant, codes, .. } = indexed?;
                let Some(variant) = variant else {
                    continue;
                };
                if self.test_region(&variant) && self.test_codes(&codes) && self.test_parents(&codes) {
                    variants.insert(variant);
                }
            }
        }
        Ok(variants)
    }

    fn filter_mendelian_errors(&self, entry: &SampleIndexEntry) -> Result<BTreeSet<SampleVariant>> {
        let mut variants = BTreeSet::new();
        let Some(errors) = &entry.mendelian_errors else {
            return Ok(variants);
        };
        for error in errors.iter() {
            let error = error?;
            if self.query.only_de_novo && !is_de_novo(error.code) {
                continue;
            }
            if self.test_region(&error.variant) && self.test_codes(&error.codes) {
                variants.insert(error.variant);
            }
        }
        Ok(variants)
    }

    fn test_region(&self, variant: &SampleVariant) -> bool {
        self.query.regions.is_empty()
            || self
                .query
                .regions
                .iter()
                .any(|r| r.contains(&variant.chromosome, variant.position))
    }

    fn test_codes(&self, codes: &VariantCodes) -> bool {
        let annotation = self.query.annotation_query;
        codes.annotation.is_none_or(|s| annotation.test_summary(s))
            && codes
                .consequence_type
                .is_none_or(|ct| annotation.test_consequence_type(ct))
            && codes.biotype.is_none_or(|bt| annotation.test_biotype(bt))
            && codes
                .population_frequency
                .is_none_or(|pf| annotation.test_population_frequency(pf))
            && match (self.query.file_query, codes.file) {
                (Some(file_query), Some(file)) => file_query.accepts(file),
                _ => true,
            }
    }

    fn test_parents(&self, codes: &VariantCodes) -> bool {
        let Some(parents) = codes.parents else {
            return true;
        };
        self.query
            .father_filter
            .is_none_or(|f| f[father_code(parents) as usize])
            && self
                .query
                .mother_filter
                .is_none_or(|f| f[mother_code(parents) as usize])
    }
}
