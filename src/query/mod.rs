//! Logical variant filter.
//!
//! A [`Query`] maps each [`QueryParam`] to its raw string value. Values use a small
//! grammar: `;` joins terms with AND, `,` joins them with OR and a leading `!` negates a
//! term. See [`parse`] for the helpers splitting values.

pub mod parse;

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub use parse::{
    Xrefs, parse_consequence_type, parse_genotype_filter, parse_keyed_filters, parse_xrefs,
    split_operator, split_value,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryParam {
    Study,
    Region,
    Gene,
    GeneRegions,
    Id,
    Xref,
    Genotype,
    Sample,
    SampleMendelianError,
    SampleDeNovo,
    Format,
    Info,
    File,
    Filter,
    Qual,
    Type,
    ConsequenceType,
    Biotype,
    TranscriptFlag,
    ProteinSubstitution,
    PopulationAltFrequency,
}

impl QueryParam {
    pub const ALL: [QueryParam; 21] = [
        QueryParam::Study,
        QueryParam::Region,
        QueryParam::Gene,
        QueryParam::GeneRegions,
        QueryParam::Id,
        QueryParam::Xref,
        QueryParam::Genotype,
        QueryParam::Sample,
        QueryParam::SampleMendelianError,
        QueryParam::SampleDeNovo,
        QueryParam::Format,
        QueryParam::Info,
        QueryParam::File,
        QueryParam::Filter,
        QueryParam::Qual,
        QueryParam::Type,
        QueryParam::ConsequenceType,
        QueryParam::Biotype,
        QueryParam::TranscriptFlag,
        QueryParam::ProteinSubstitution,
        QueryParam::PopulationAltFrequency,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            QueryParam::Study => "STUDY",
            QueryParam::Region => "REGION",
            QueryParam::Gene => "GENE",
            QueryParam::GeneRegions => "GENE_REGIONS",
            QueryParam::Id => "ID",
            QueryParam::Xref => "XREF",
            QueryParam::Genotype => "GENOTYPE",
            QueryParam::Sample => "SAMPLE",
            QueryParam::SampleMendelianError => "SAMPLE_MENDELIAN_ERROR",
            QueryParam::SampleDeNovo => "SAMPLE_DE_NOVO",
            QueryParam::Format => "FORMAT",
            QueryParam::Info => "INFO",
            QueryParam::File => "FILE",
            QueryParam::Filter => "FILTER",
            QueryParam::Qual => "QUAL",
            QueryParam::Type => "TYPE",
            QueryParam::ConsequenceType => "CONSEQUENCE_TYPE",
            QueryParam::Biotype => "BIOTYPE",
            QueryParam::TranscriptFlag => "TRANSCRIPT_FLAG",
            QueryParam::ProteinSubstitution => "PROTEIN_SUBSTITUTION",
            QueryParam::PopulationAltFrequency => "POPULATION_ALT_FREQUENCY",
        }
    }
}

impl fmt::Display for QueryParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for QueryParam {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().to_ascii_uppercase().replace('-', "_");
        QueryParam::ALL
            .into_iter()
            .find(|p| p.key() == key)
            .ok_or_else(|| Error::InvalidQuery(format!("unknown query param: {}", s)))
    }
}

/// Logical filter over variants. Empty values are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Query(BTreeMap<QueryParam, String>);

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, param: QueryParam, value: impl Into<String>) -> Self {
        self.insert(param, value);
        self
    }

    pub fn insert(&mut self, param: QueryParam, value: impl Into<String>) {
        self.0.insert(param, value.into());
    }

    pub fn remove(&mut self, param: QueryParam) -> Option<String> {
        self.0.remove(&param)
    }

    /// Value of `param`, if present and not blank
    pub fn get(&self, param: QueryParam) -> Option<&str> {
        self.0
            .get(&param)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn contains(&self, param: QueryParam) -> bool {
        self.get(param).is_some()
    }

    /// Present with at least one non negated term
    pub fn contains_non_negated(&self, param: QueryParam) -> bool {
        self.get(param)
            .map(|v| {
                v.split([';', ','])
                    .map(str::trim)
                    .any(|t| !t.is_empty() && !t.starts_with('!'))
            })
            .unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = (QueryParam, &str)> {
        self.0.iter().map(|(k, v)| (*k, v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(QueryParam, String)> for Query {
    fn from_iter<I: IntoIterator<Item = (QueryParam, String)>>(iter: I) -> Self {
        Query(iter.into_iter().collect())
    }
}

/// Which of biotype, consequence type and transcript flag filters are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnotationCombination {
    pub biotype: bool,
    pub consequence_type: bool,
    pub transcript_flag: bool,
}

impl AnnotationCombination {
    pub fn from_query(query: &Query) -> Self {
        Self {
            biotype: query.contains(QueryParam::Biotype),
            consequence_type: query.contains(QueryParam::ConsequenceType),
            transcript_flag: query.contains(QueryParam::TranscriptFlag),
        }
    }

    /// A single biotype or consequence type filter, evaluated per variant rather than per transcript
    pub fn is_simple(&self) -> bool {
        !self.transcript_flag && (self.biotype != self.consequence_type)
    }
}
