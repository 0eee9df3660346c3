use super::coverage::Coverage;
use crate::codec::annotation::pop_freq_code;
use crate::codec::genotype::NUM_CODES;
use crate::codec::range::RangeQuery;
use crate::codec::EMPTY_MASK;
use crate::query::{Query, QueryParam};
use crate::types::{QueryOperation, Region, VariantType};
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};

/// Genotype codes accepted for a parent, indexed by code
pub type ParentFilter = [bool; NUM_CODES];

pub const FILE_INDEX_CODES: usize = 1 << u8::BITS;

fn serialize_valid_codes<S: Serializer>(valid: &[bool], serializer: S) -> Result<S::Ok, S::Error> {
    let codes: Vec<usize> = valid
        .iter()
        .enumerate()
        .filter(|(_, v)| **v)
        .map(|(code, _)| code)
        .collect();
    codes.serialize(serializer)
}

/// File byte constraints for one sample
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleFileIndexQuery {
    pub sample: String,
    pub file_index_mask: u8,
    pub qual_query: Option<RangeQuery>,
    pub dp_query: Option<RangeQuery>,
    /// Masked file bytes accepted by the query
    #[serde(serialize_with = "serialize_valid_codes")]
    pub valid_file_index: Vec<bool>,
}

impl SampleFileIndexQuery {
    pub fn empty(sample: &str) -> Self {
        Self {
            sample: sample.to_string(),
            file_index_mask: EMPTY_MASK,
            qual_query: None,
            dp_query: None,
            valid_file_index: vec![false; FILE_INDEX_CODES],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.file_index_mask == EMPTY_MASK
    }

    pub fn accepts(&self, file_index: u8) -> bool {
        self.is_empty() || self.valid_file_index[(file_index & self.file_index_mask) as usize]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopulationFrequencyQuery {
    pub study: String,
    pub population: String,
    /// Slot of the population in the population frequency byte
    pub slot: usize,
    pub range: RangeQuery,
}

impl PopulationFrequencyQuery {
    pub fn accepts(&self, population_frequency: u8) -> bool {
        self.range
            .contains_code(pop_freq_code(population_frequency, self.slot))
    }
}

/// Annotation constraints shared by every sample of the query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleAnnotationIndexQuery {
    pub annotation_index_mask: u8,
    pub annotation_index: u8,
    pub consequence_type_mask: u16,
    pub biotype_mask: u8,
    pub population_frequency_operation: QueryOperation,
    pub population_frequency_queries: Vec<PopulationFrequencyQuery>,
    /// Some population of the query is not in the index
    pub population_frequency_partial: bool,
    pub intergenic: Option<bool>,
}

impl Default for SampleAnnotationIndexQuery {
    fn default() -> Self {
        Self {
            annotation_index_mask: EMPTY_MASK,
            annotation_index: EMPTY_MASK,
            consequence_type_mask: EMPTY_MASK as u16,
            biotype_mask: EMPTY_MASK,
            population_frequency_operation: QueryOperation::And,
            population_frequency_queries: Vec::new(),
            population_frequency_partial: false,
            intergenic: None,
        }
    }
}

impl SampleAnnotationIndexQuery {
    pub fn is_empty(&self) -> bool {
        self.annotation_index_mask == EMPTY_MASK
            && self.consequence_type_mask == EMPTY_MASK as u16
            && self.biotype_mask == EMPTY_MASK
            && self.population_frequency_queries.is_empty()
    }

    pub fn test_summary(&self, summary: u8) -> bool {
        summary & self.annotation_index_mask == self.annotation_index
    }

    pub fn test_consequence_type(&self, consequence_type: u16) -> bool {
        self.consequence_type_mask == EMPTY_MASK as u16
            || consequence_type & self.consequence_type_mask != 0
    }

    pub fn test_biotype(&self, biotype: u8) -> bool {
        self.biotype_mask == EMPTY_MASK || biotype & self.biotype_mask != 0
    }

    pub fn test_population_frequency(&self, population_frequency: u8) -> bool {
        if self.population_frequency_queries.is_empty() {
            return true;
        }
        let mut results = self
            .population_frequency_queries
            .iter()
            .map(|q| q.accepts(population_frequency));
        match self.population_frequency_operation {
            QueryOperation::And => results.all(|r| r),
            QueryOperation::Or => results.any(|r| r),
        }
    }
}

/// Index lookups for a query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleIndexQuery {
    pub regions: Vec<Region>,
    pub variant_types: Option<BTreeSet<VariantType>>,
    pub study: String,
    /// Genotype buckets to read for each sample
    pub samples: BTreeMap<String, Vec<String>>,
    pub father_filters: BTreeMap<String, ParentFilter>,
    pub mother_filters: BTreeMap<String, ParentFilter>,
    pub file_queries: BTreeMap<String, SampleFileIndexQuery>,
    pub annotation_query: SampleAnnotationIndexQuery,
    pub mendelian_error_samples: BTreeSet<String>,
    pub only_de_novo: bool,
    pub operation: QueryOperation,
    /// The index does not hold every variant the query may return
    pub partial: bool,
    /// Every looked up sample is fully annotated and the index is not partial
    pub complete_index: bool,
}

/// Per sample view over a [`SampleIndexQuery`]
#[derive(Debug, Clone, Copy)]
pub struct SingleSampleIndexQuery<'a> {
    pub study: &'a str,
    pub sample: &'a str,
    pub regions: &'a [Region],
    pub variant_types: Option<&'a BTreeSet<VariantType>>,
    pub genotypes: &'a [String],
    pub father_filter: Option<&'a ParentFilter>,
    pub mother_filter: Option<&'a ParentFilter>,
    pub file_query: Option<&'a SampleFileIndexQuery>,
    pub annotation_query: &'a SampleAnnotationIndexQuery,
    pub mendelian_error: bool,
    pub only_de_novo: bool,
}

impl SampleIndexQuery {
    pub fn for_sample<'a>(&'a self, sample: &'a str) -> Option<SingleSampleIndexQuery<'a>> {
        let genotypes = self.samples.get(sample)?;
        Some(SingleSampleIndexQuery {
            study: &self.study,
            sample,
            regions: &self.regions,
            variant_types: self.variant_types.as_ref(),
            genotypes,
            father_filter: self.father_filters.get(sample),
            mother_filter: self.mother_filters.get(sample),
            file_query: self.file_queries.get(sample),
            annotation_query: &self.annotation_query,
            mendelian_error: self.mendelian_error_samples.contains(sample),
            only_de_novo: self.only_de_novo,
        })
    }

    pub fn sample_names(&self) -> impl Iterator<Item = &str> {
        self.samples.keys().map(String::as_str)
    }
}

impl SingleSampleIndexQuery<'_> {
    pub fn has_parent_filter(&self) -> bool {
        self.father_filter.is_some() || self.mother_filter.is_some()
    }
}

/// Planner outcome
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "plan", rename_all = "snake_case")]
pub enum Plan {
    Indexed {
        index_query: SampleIndexQuery,
        residual: Query,
        coverage: BTreeMap<QueryParam, Coverage>,
    },
    /// The query must be answered by a full scan
    Ineligible { reason: String },
}

impl Plan {
    pub fn is_indexed(&self) -> bool {
        matches!(self, Plan::Indexed { .. })
    }

    pub fn index_query(&self) -> Option<&SampleIndexQuery> {
        match self {
            Plan::Indexed { index_query, .. } => Some(index_query),
            Plan::Ineligible { .. } => None,
        }
    }

    pub fn residual(&self) -> Option<&Query> {
        match self {
            Plan::Indexed { residual, .. } => Some(residual),
            Plan::Ineligible { .. } => None,
        }
    }

    pub fn coverage(&self, param: QueryParam) -> Option<&Coverage> {
        match self {
            Plan::Indexed { coverage, .. } => coverage.get(&param),
            Plan::Ineligible { .. } => None,
        }
    }
}
