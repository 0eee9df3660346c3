//! Sample index schema.
//!
//! Enumerated consequence type / biotype sets and threshold tables shared by the index
//! writer and the query planner. Both sides must use the same schema. The schema is
//! validated once and then only read.

use crate::codec::file::{DP_BITS, QUAL_BITS};
use crate::codec::{annotation::POP_FREQ_CODE_BITS, EMPTY_MASK};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

pub const MISSENSE_VARIANT: &str = "missense_variant";
pub const INTERGENIC_VARIANT: &str = "intergenic_variant";
pub const REGULATORY_REGION_VARIANT: &str = "regulatory_region_variant";
pub const TF_BINDING_SITE_VARIANT: &str = "TF_binding_site_variant";
pub const PROTEIN_CODING: &str = "protein_coding";

/// Consequence terms that do not imply a gene
pub const NON_GENIC_TERMS: [&str; 3] = [
    INTERGENIC_VARIANT,
    REGULATORY_REGION_VARIANT,
    TF_BINDING_SITE_VARIANT,
];

pub const MAX_CONSEQUENCE_TYPE_GROUPS: usize = 16;
pub const MAX_BIOTYPE_GROUPS: usize = 8;
pub const MAX_POPULATIONS: usize = 8 / POP_FREQ_CODE_BITS as usize;

const DEFAULT_BATCH_SIZE: u64 = 1_000_000;

/// Frequency thresholds indexed for one population
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationFrequencyRange {
    pub study: String,
    pub population: String,
    pub thresholds: Vec<f64>,
}

impl PopulationFrequencyRange {
    pub fn new(study: &str, population: &str, thresholds: &[f64]) -> Self {
        Self {
            study: study.to_string(),
            population: population.to_string(),
            thresholds: thresholds.to_vec(),
        }
    }

    pub fn study_and_population(&self) -> String {
        format!("{}:{}", self.study, self.population)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSchema {
    /// One bit per group of consequence type terms
    pub consequence_types: Vec<Vec<String>>,
    /// One bit per group of biotypes
    pub biotypes: Vec<Vec<String>>,
    pub lof: Vec<String>,
    pub lof_extended: Vec<String>,
    pub protein_coding_biotypes: Vec<String>,
    pub population_ranges: Vec<PopulationFrequencyRange>,
    /// Populations summarised by the "rare in any population" bit, as `study:population`
    pub pop_freq_any: Vec<String>,
    pub pop_freq_any_threshold: f64,
    pub qual_thresholds: Vec<f64>,
    pub dp_thresholds: Vec<f64>,
    pub batch_size: u64,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

impl Default for IndexSchema {
    fn default() -> Self {
        let lof = strings(&[
            "frameshift_variant",
            "inframe_deletion",
            "inframe_insertion",
            "start_lost",
            "stop_gained",
            "stop_lost",
            "splice_acceptor_variant",
            "splice_donor_variant",
            "transcript_ablation",
            "transcript_amplification",
        ]);
        let mut lof_extended = lof.clone();
        lof_extended.push(MISSENSE_VARIANT.to_string());

        let consequence_types = [
            &[MISSENSE_VARIANT][..],
            &["frameshift_variant"],
            &["inframe_deletion"],
            &["inframe_insertion"],
            &["start_lost"],
            &["stop_gained"],
            &["stop_lost"],
            &["splice_acceptor_variant"],
            &["splice_donor_variant"],
            &["transcript_ablation"],
            &["transcript_amplification"],
            &["initiator_codon_variant"],
            &["splice_region_variant"],
            &["incomplete_terminal_codon_variant"],
            &["3_prime_UTR_variant", "5_prime_UTR_variant"],
            &["mature_miRNA_variant", TF_BINDING_SITE_VARIANT],
        ]
        .iter()
        .map(|group| strings(group))
        .collect();

        let biotypes = [
            &[PROTEIN_CODING][..],
            &["nonsense_mediated_decay"],
            &[
                "lncRNA",
                "lincRNA",
                "antisense",
                "sense_intronic",
                "sense_overlapping",
            ],
            &["miRNA"],
            &["retained_intron"],
            &["snRNA"],
            &["snoRNA"],
            &[
                "processed_pseudogene",
                "unprocessed_pseudogene",
                "transcribed_unprocessed_pseudogene",
            ],
        ]
        .iter()
        .map(|group| strings(group))
        .collect();

        let thresholds = [0.001, 0.005, 0.01];
        Self {
            consequence_types,
            biotypes,
            lof,
            lof_extended,
            protein_coding_biotypes: strings(&[PROTEIN_CODING]),
            population_ranges: vec![
                PopulationFrequencyRange::new("1kG_phase3", "ALL", &thresholds),
                PopulationFrequencyRange::new("GNOMAD_GENOMES", "ALL", &thresholds),
            ],
            pop_freq_any: strings(&["1kG_phase3:ALL", "GNOMAD_GENOMES:ALL"]),
            pop_freq_any_threshold: 0.001,
            qual_thresholds: vec![10.0, 20.0, 40.0],
            dp_thresholds: vec![5.0, 10.0, 20.0],
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

fn validate_thresholds(name: &str, thresholds: &[f64], max: usize) -> Result<()> {
    if thresholds.len() > max {
        return Err(Error::Configuration(format!(
            "{} has {} thresholds, at most {} fit in the index",
            name,
            thresholds.len(),
            max
        )));
    }
    if thresholds.iter().any(|t| !t.is_finite()) {
        return Err(Error::Configuration(format!(
            "{} thresholds must be finite",
            name
        )));
    }
    if thresholds.windows(2).any(|w| w[0] >= w[1]) {
        return Err(Error::Configuration(format!(
            "{} thresholds must be strictly increasing",
            name
        )));
    }
    Ok(())
}

fn validate_groups(name: &str, groups: &[Vec<String>], max: usize) -> Result<()> {
    if groups.len() > max {
        return Err(Error::Configuration(format!(
            "{} has {} groups, at most {} fit in the index",
            name,
            groups.len(),
            max
        )));
    }
    let mut seen = HashSet::new();
    for group in groups {
        if group.is_empty() {
            return Err(Error::Configuration(format!("empty {} group", name)));
        }
        for term in group {
            if !seen.insert(term.as_str()) {
                return Err(Error::Configuration(format!(
                    "{} term '{}' listed twice",
                    name, term
                )));
            }
        }
    }
    Ok(())
}

impl IndexSchema {
    pub fn from_json(json: &str) -> Result<Self> {
        let schema: IndexSchema = serde_json::from_str(json)?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Check every enumerated set and table fits its bit budget
    pub fn validate(&self) -> Result<()> {
        validate_groups(
            "consequence type",
            &self.consequence_types,
            MAX_CONSEQUENCE_TYPE_GROUPS,
        )?;
        validate_groups("biotype", &self.biotypes, MAX_BIOTYPE_GROUPS)?;

        if self.population_ranges.len() > MAX_POPULATIONS {
            return Err(Error::Configuration(format!(
                "{} populations configured, at most {} fit in the index",
                self.population_ranges.len(),
                MAX_POPULATIONS
            )));
        }
        let max_pop_thresholds = (1 << POP_FREQ_CODE_BITS) - 1;
        let mut populations = HashSet::new();
        for range in &self.population_ranges {
            let key = range.study_and_population();
            if !populations.insert(key.clone()) {
                return Err(Error::Configuration(format!(
                    "population {} listed twice",
                    key
                )));
            }
            validate_thresholds(&key, &range.thresholds, max_pop_thresholds)?;
        }

        validate_thresholds("QUAL", &self.qual_thresholds, (1 << QUAL_BITS) - 1)?;
        validate_thresholds("DP", &self.dp_thresholds, (1 << DP_BITS) - 1)?;

        if let Some(term) = self.lof.iter().find(|t| !self.lof_extended.contains(t)) {
            return Err(Error::Configuration(format!(
                "loss of function term '{}' missing from the extended set",
                term
            )));
        }
        if self.pop_freq_any.is_empty() {
            return Err(Error::Configuration(
                "no populations for the rare variant summary".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(Error::Configuration("batch size must be positive".to_string()));
        }
        Ok(())
    }

    /// Consequence type mask for a term, or [`EMPTY_MASK`] if the term is not indexed
    pub fn consequence_type_mask(&self, term: &str) -> u16 {
        self.consequence_types
            .iter()
            .position(|group| group.iter().any(|t| t == term))
            .map(|bit| 1u16 << bit)
            .unwrap_or(EMPTY_MASK as u16)
    }

    /// Mask bits shared by more than one term can not tell those terms apart
    pub fn is_imprecise_consequence_type_mask(&self, mask: u16) -> bool {
        self.consequence_types
            .iter()
            .enumerate()
            .any(|(bit, group)| mask & (1 << bit) != 0 && group.len() > 1)
    }

    pub fn biotype_mask(&self, biotype: &str) -> u8 {
        self.biotypes
            .iter()
            .position(|group| group.iter().any(|b| b == biotype))
            .map(|bit| 1u8 << bit)
            .unwrap_or(EMPTY_MASK)
    }

    pub fn is_imprecise_biotype_mask(&self, mask: u8) -> bool {
        self.biotypes
            .iter()
            .enumerate()
            .any(|(bit, group)| mask & (1 << bit) != 0 && group.len() > 1)
    }

    pub fn is_lof(&self, term: &str) -> bool {
        self.lof.iter().any(|t| t == term)
    }

    pub fn is_lof_extended(&self, term: &str) -> bool {
        self.lof_extended.iter().any(|t| t == term)
    }

    pub fn is_protein_coding_biotype(&self, biotype: &str) -> bool {
        self.protein_coding_biotypes.iter().any(|b| b == biotype)
    }

    pub fn is_pop_freq_any(&self, study_population: &str) -> bool {
        self.pop_freq_any.iter().any(|p| p == study_population)
    }

    /// Slot of a `study:population` in the population frequency column
    pub fn population_index(&self, study_population: &str) -> Option<usize> {
        self.population_ranges
            .iter()
            .position(|r| r.study_and_population() == study_population)
    }

    pub fn batch_start(&self, position: u64) -> u64 {
        position - position % self.batch_size
    }
}
