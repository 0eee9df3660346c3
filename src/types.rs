use crate::{Error, Result};
use noodles::core::region::Interval;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Genomic region, 1-based with inclusive bounds
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Region {
    pub chromosome: String,
    pub start: u64,
    pub end: u64,
}

impl Region {
    pub fn new(chromosome: impl Into<String>, start: u64, end: u64) -> Self {
        Self {
            chromosome: chromosome.into(),
            start,
            end,
        }
    }

    pub fn whole_chromosome(chromosome: impl Into<String>) -> Self {
        Self::new(chromosome, 1, u64::MAX)
    }

    pub fn contains(&self, chromosome: &str, position: u64) -> bool {
        self.chromosome == chromosome && self.start <= position && position <= self.end
    }

    /// Whether any position in `[start, end]` of `chromosome` falls in this region
    pub fn overlaps(&self, chromosome: &str, start: u64, end: u64) -> bool {
        self.chromosome == chromosome && self.start <= end && start <= self.end
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start <= 1 && self.end == u64::MAX {
            write!(f, "{}", self.chromosome)
        } else if self.end == u64::MAX {
            write!(f, "{}:{}-", self.chromosome, self.start)
        } else {
            write!(f, "{}:{}-{}", self.chromosome, self.start, self.end)
        }
    }
}

impl FromStr for Region {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidQuery("empty region".to_string()));
        }

        // Contig names may contain ':' themselves, so only split when the tail is an interval
        if let Some((chromosome, raw_interval)) = s.rsplit_once(':') {
            if let Ok(interval) = raw_interval.parse::<Interval>() {
                let start = interval.start().map(|p| p.get() as u64).unwrap_or(1);
                let end = interval.end().map(|p| p.get() as u64).unwrap_or(u64::MAX);
                if end < start {
                    return Err(Error::InvalidQuery(format!("invalid region: {}", s)));
                }
                return Ok(Region::new(chromosome, start, end));
            }
        }

        Ok(Region::whole_chromosome(s))
    }
}

/// Parse a comma separated list of regions
pub fn parse_regions(value: &str) -> Result<Vec<Region>> {
    value
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(str::parse)
        .collect()
}

/// Merge overlapping or adjacent regions into a minimal set of disjoint regions
pub fn merge_regions(mut regions: Vec<Region>) -> Vec<Region> {
    if regions.is_empty() {
        return regions;
    }

    regions.sort();

    let mut merged: Vec<Region> = Vec::with_capacity(regions.len());
    for region in regions {
        match merged.last_mut() {
            Some(current)
                if current.chromosome == region.chromosome
                    && region.start <= current.end.saturating_add(1) =>
            {
                current.end = current.end.max(region.end);
            }
            _ => merged.push(region),
        }
    }
    merged
}

/// Logical operator combining the values of a multi-valued filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueryOperation {
    #[default]
    And,
    Or,
}

impl QueryOperation {
    pub const AND_SEPARATOR: char = ';';
    pub const OR_SEPARATOR: char = ',';

    pub fn separator(&self) -> char {
        match self {
            QueryOperation::And => Self::AND_SEPARATOR,
            QueryOperation::Or => Self::OR_SEPARATOR,
        }
    }
}

/// Build status of an index for a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndexStatus {
    #[default]
    NotBuilt,
    Building,
    Ready,
}

impl IndexStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, IndexStatus::Ready)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VariantType {
    Snv,
    Snp,
    Mnv,
    Mnp,
    Indel,
    Sv,
    Insertion,
    Deletion,
    Translocation,
    Inversion,
    CopyNumber,
    CopyNumberGain,
    CopyNumberLoss,
    Duplication,
    TandemDuplication,
    Breakend,
    NoVariation,
    Symbolic,
    Mixed,
}

impl VariantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariantType::Snv => "SNV",
            VariantType::Snp => "SNP",
            VariantType::Mnv => "MNV",
            VariantType::Mnp => "MNP",
            VariantType::Indel => "INDEL",
            VariantType::Sv => "SV",
            VariantType::Insertion => "INSERTION",
            VariantType::Deletion => "DELETION",
            VariantType::Translocation => "TRANSLOCATION",
            VariantType::Inversion => "INVERSION",
            VariantType::CopyNumber => "COPY_NUMBER",
            VariantType::CopyNumberGain => "COPY_NUMBER_GAIN",
            VariantType::CopyNumberLoss => "COPY_NUMBER_LOSS",
            VariantType::Duplication => "DUPLICATION",
            VariantType::TandemDuplication => "TANDEM_DUPLICATION",
            VariantType::Breakend => "BREAKEND",
            VariantType::NoVariation => "NO_VARIATION",
            VariantType::Symbolic => "SYMBOLIC",
            VariantType::Mixed => "MIXED",
        }
    }

    /// Infer the type of a variant from its alleles
    pub fn infer(reference: &str, alternate: &str) -> Self {
        if alternate.starts_with('<') && alternate.ends_with('>') {
            return match &alternate[1..alternate.len() - 1] {
                "DEL" => VariantType::Deletion,
                "INS" => VariantType::Insertion,
                "DUP" => VariantType::Duplication,
                "DUP:TANDEM" => VariantType::TandemDuplication,
                "INV" => VariantType::Inversion,
                "CNV" => VariantType::CopyNumber,
                "NON_REF" | "*" => VariantType::NoVariation,
                _ => VariantType::Symbolic,
            };
        }
        if alternate.contains('[') || alternate.contains(']') {
            return VariantType::Breakend;
        }
        if alternate == "." || alternate == reference {
            return VariantType::NoVariation;
        }
        if reference.len() == alternate.len() {
            if reference.len() == 1 {
                VariantType::Snv
            } else {
                VariantType::Mnv
            }
        } else {
            VariantType::Indel
        }
    }
}

impl fmt::Display for VariantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VariantType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let t = match s.trim().to_ascii_uppercase().as_str() {
            "SNV" => VariantType::Snv,
            "SNP" => VariantType::Snp,
            "MNV" => VariantType::Mnv,
            "MNP" => VariantType::Mnp,
            "INDEL" => VariantType::Indel,
            "SV" => VariantType::Sv,
            "INSERTION" => VariantType::Insertion,
            "DELETION" => VariantType::Deletion,
            "TRANSLOCATION" => VariantType::Translocation,
            "INVERSION" => VariantType::Inversion,
            "COPY_NUMBER" | "CNV" => VariantType::CopyNumber,
            "COPY_NUMBER_GAIN" => VariantType::CopyNumberGain,
            "COPY_NUMBER_LOSS" => VariantType::CopyNumberLoss,
            "DUPLICATION" => VariantType::Duplication,
            "TANDEM_DUPLICATION" => VariantType::TandemDuplication,
            "BREAKEND" => VariantType::Breakend,
            "NO_VARIATION" => VariantType::NoVariation,
            "SYMBOLIC" => VariantType::Symbolic,
            "MIXED" => VariantType::Mixed,
            other => {
                return Err(Error::InvalidQuery(format!("unknown variant type: {}", other)));
            }
        };
        Ok(t)
    }
}

/// A variant as stored in a sample index bucket
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SampleVariant {
    pub chromosome: String,
    pub position: u64,
    pub reference: String,
    pub alternate: String,
}

impl SampleVariant {
    pub fn new(
        chromosome: impl Into<String>,
        position: u64,
        reference: impl Into<String>,
        alternate: impl Into<String>,
    ) -> Self {
        Self {
            chromosome: chromosome.into(),
            position,
            reference: reference.into(),
            alternate: alternate.into(),
        }
    }

    pub fn variant_type(&self) -> VariantType {
        VariantType::infer(&self.reference, &self.alternate)
    }
}

impl fmt::Display for SampleVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.chromosome, self.position, self.reference, self.alternate
        )
    }
}
