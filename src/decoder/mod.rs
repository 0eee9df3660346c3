//! Sample index record decoding.
//!
//! A raw record holds the index of one sample over one batch of a chromosome. Cells are
//! keyed by column name: the genotype itself for the variant list, and prefixed columns
//! for the per variant codes of that genotype bucket.
//!
//! Decoding is lazy. Column values are kept as shared [`Bytes`] and variants are only
//! read when a sequence is iterated.

pub mod builder;
pub mod mendelian;
pub mod variants;

pub use builder::SampleIndexRecordBuilder;
pub use mendelian::{MendelianError, MendelianErrorSequence};
pub use variants::VariantSequence;

use crate::codec::annotation::{AnnotationIndexEntry, NUM_SUMMARY_BITS};
use crate::types::SampleVariant;
use crate::{Error, Result};
use bytes::{Buf, Bytes};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

pub const GENOTYPE_COUNT_PREFIX: &str = "_C_";
pub const ANNOTATION_PREFIX: &str = "_A_";
pub const ANNOTATION_COUNTS_PREFIX: &str = "_AC_";
pub const FILE_PREFIX: &str = "_F_";
pub const PARENTS_PREFIX: &str = "_P_";
pub const CONSEQUENCE_TYPE_PREFIX: &str = "_CT_";
pub const BIOTYPE_PREFIX: &str = "_BT_";
pub const POPULATION_FREQUENCY_PREFIX: &str = "_PF_";
pub const MENDELIAN_ERROR_COLUMN: &str = "ME";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub study: String,
    pub sample: String,
    pub chromosome: String,
    pub batch_start: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCell {
    pub column: String,
    pub value: Bytes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub key: RecordKey,
    pub cells: Vec<RawCell>,
}

enum Column<'a> {
    Variants(&'a str),
    Count(&'a str),
    Annotation(&'a str),
    AnnotationCounts(&'a str),
    File(&'a str),
    Parents(&'a str),
    ConsequenceType(&'a str),
    Biotype(&'a str),
    PopulationFrequency(&'a str),
    MendelianErrors,
}

impl<'a> Column<'a> {
    fn parse(column: &'a str) -> Option<Self> {
        if column == MENDELIAN_ERROR_COLUMN {
            return Some(Column::MendelianErrors);
        }
        let prefixed: [(&str, fn(&'a str) -> Column<'a>); 8] = [
            (GENOTYPE_COUNT_PREFIX, Column::Count),
            (ANNOTATION_COUNTS_PREFIX, Column::AnnotationCounts),
            (ANNOTATION_PREFIX, Column::Annotation),
            (FILE_PREFIX, Column::File),
            (PARENTS_PREFIX, Column::Parents),
            (CONSEQUENCE_TYPE_PREFIX, Column::ConsequenceType),
            (BIOTYPE_PREFIX, Column::Biotype),
            (POPULATION_FREQUENCY_PREFIX, Column::PopulationFrequency),
        ];
        for (prefix, column_type) in prefixed {
            if let Some(genotype) = column.strip_prefix(prefix) {
                return Some(column_type(genotype));
            }
        }
        if column.starts_with('_') {
            return None;
        }
        Some(Column::Variants(column))
    }
}

/// Codes of one variant. Missing columns decode as `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantCodes {
    pub annotation: Option<u8>,
    pub file: Option<u8>,
    pub parents: Option<u8>,
    pub consequence_type: Option<u16>,
    pub biotype: Option<u8>,
    pub population_frequency: Option<u8>,
}

impl VariantCodes {
    pub fn with_annotation(mut self, entry: AnnotationIndexEntry) -> Self {
        self.annotation = Some(entry.summary);
        self.consequence_type = Some(entry.consequence_type);
        self.biotype = Some(entry.biotype);
        self.population_frequency = Some(entry.population_frequency);
        self
    }

    pub fn with_file(mut self, file: u8) -> Self {
        self.file = Some(file);
        self
    }

    pub fn with_parents(mut self, parents: u8) -> Self {
        self.parents = Some(parents);
        self
    }
}

/// Per variant code columns of a genotype bucket
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenotypeColumns {
    pub annotation: Option<Bytes>,
    pub file: Option<Bytes>,
    pub parents: Option<Bytes>,
    pub consequence_type: Option<Bytes>,
    pub biotype: Option<Bytes>,
    pub population_frequency: Option<Bytes>,
}

fn byte_at(column: &Option<Bytes>, name: &str, index: usize) -> Result<Option<u8>> {
    match column {
        None => Ok(None),
        Some(bytes) => bytes.get(index).copied().map(Some).ok_or_else(|| {
            Error::Codec(format!(
                "{} column has {} codes, variant {} requested",
                name,
                bytes.len(),
                index
            ))
        }),
    }
}

impl GenotypeColumns {
    pub fn codes(&self, index: usize) -> Result<VariantCodes> {
        let consequence_type = match &self.consequence_type {
            None => None,
            Some(bytes) => {
                let pair = bytes.get(index * 2..index * 2 + 2).ok_or_else(|| {
                    Error::Codec(format!(
                        "consequence type column has {} codes, variant {} requested",
                        bytes.len() / 2,
                        index
                    ))
                })?;
                Some(u16::from_be_bytes([pair[0], pair[1]]))
            }
        };
        Ok(VariantCodes {
            annotation: byte_at(&self.annotation, "annotation", index)?,
            file: byte_at(&self.file, "file", index)?,
            parents: byte_at(&self.parents, "parents", index)?,
            consequence_type,
            biotype: byte_at(&self.biotype, "biotype", index)?,
            population_frequency: byte_at(&self.population_frequency, "population frequency", index)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexedVariant {
    /// Position of the variant in its genotype bucket
    pub index: usize,
    /// `None` in counts only mode
    pub variant: Option<SampleVariant>,
    pub codes: VariantCodes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenotypeEntry {
    pub genotype: String,
    pub variants: VariantSequence,
    pub count: u32,
    pub annotation_counts: Option<[u32; NUM_SUMMARY_BITS]>,
    pub columns: GenotypeColumns,
}

impl GenotypeEntry {
    /// Variants of the bucket with their codes. Each call restarts from the first variant.
    pub fn iter(&self) -> impl Iterator<Item = Result<IndexedVariant>> + '_ {
        self.variants.iter().enumerate().map(|(index, variant)| {
            Ok(IndexedVariant {
                index,
                variant: variant?,
                codes: self.columns.codes(index)?,
            })
        })
    }
}

/// Decoded index of a sample over one batch
#[derive(Debug, Clone, PartialEq)]
pub struct SampleIndexEntry {
    pub key: RecordKey,
    pub genotypes: BTreeMap<String, GenotypeEntry>,
    pub mendelian_errors: Option<MendelianErrorSequence>,
}

impl SampleIndexEntry {
    pub fn genotype(&self, genotype: &str) -> Option<&GenotypeEntry> {
        self.genotypes.get(genotype)
    }
}

#[derive(Default)]
struct PartialGenotypeEntry {
    variants: Option<Bytes>,
    count: Option<u32>,
    annotation_counts: Option<[u32; NUM_SUMMARY_BITS]>,
    columns: GenotypeColumns,
}

fn read_u32_column(name: &str, value: &Bytes) -> Result<u32> {
    if value.len() != 4 {
        return Err(Error::Codec(format!(
            "{} expects 4 bytes, found {}",
            name,
            value.len()
        )));
    }
    Ok(value.clone().get_u32())
}

fn read_annotation_counts(value: &Bytes) -> Result<[u32; NUM_SUMMARY_BITS]> {
    if value.len() != NUM_SUMMARY_BITS * 4 {
        return Err(Error::Codec(format!(
            "annotation counts expect {} bytes, found {}",
            NUM_SUMMARY_BITS * 4,
            value.len()
        )));
    }
    let mut data = value.clone();
    let mut counts = [0u32; NUM_SUMMARY_BITS];
    for count in counts.iter_mut() {
        *count = data.get_u32();
    }
    Ok(counts)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SampleIndexDecoder;

impl SampleIndexDecoder {
    pub fn new() -> Self {
        Self
    }

    pub fn decode(&self, record: &RawRecord) -> Result<SampleIndexEntry> {
        self.decode_record(record, false)
    }

    /// Decode without variant lists. Sequences yield one placeholder per variant.
    pub fn decode_counts_only(&self, record: &RawRecord) -> Result<SampleIndexEntry> {
        self.decode_record(record, true)
    }

    /// Number of variants of the record over every genotype
    pub fn count(&self, record: &RawRecord) -> Result<u64> {
        let entry = self.decode_counts_only(record)?;
        Ok(entry.genotypes.values().map(|g| g.count as u64).sum())
    }

    fn decode_record(&self, record: &RawRecord, counts_only: bool) -> Result<SampleIndexEntry> {
        let key = &record.key;
        let mut partial: BTreeMap<&str, PartialGenotypeEntry> = BTreeMap::new();
        let mut mendelian_data = None;

        for cell in &record.cells {
            let value = &cell.value;
            let Some(column) = Column::parse(&cell.column) else {
                debug!(column = %cell.column, "skip unknown column");
                continue;
            };
            match column {
                Column::MendelianErrors => mendelian_data = Some(value.clone()),
                Column::Variants(gt) => partial.entry(gt).or_default().variants = Some(value.clone()),
                Column::Count(gt) => {
                    partial.entry(gt).or_default().count = Some(read_u32_column(&cell.column, value)?)
                }
                Column::AnnotationCounts(gt) => {
                    partial.entry(gt).or_default().annotation_counts = Some(read_annotation_counts(value)?)
                }
                Column::Annotation(gt) => partial.entry(gt).or_default().columns.annotation = Some(value.clone()),
                Column::File(gt) => partial.entry(gt).or_default().columns.file = Some(value.clone()),
                Column::Parents(gt) => partial.entry(gt).or_default().columns.parents = Some(value.clone()),
                Column::ConsequenceType(gt) => {
                    partial.entry(gt).or_default().columns.consequence_type = Some(value.clone())
                }
                Column::Biotype(gt) => partial.entry(gt).or_default().columns.biotype = Some(value.clone()),
                Column::PopulationFrequency(gt) => {
                    partial.entry(gt).or_default().columns.population_frequency = Some(value.clone())
                }
            }
        }

        let mut genotypes = BTreeMap::new();
        for (gt, entry) in partial {
            let encoded = match entry.variants {
                Some(data) => VariantSequence::Encoded {
                    chromosome: key.chromosome.clone(),
                    batch_start: key.batch_start,
                    data,
                },
                None => VariantSequence::Empty,
            };
            let count = match entry.count {
                Some(count) => count,
                None => encoded.len()? as u32,
            };
            let variants = if counts_only {
                VariantSequence::Counted(count as usize)
            } else {
                encoded
            };
            genotypes.insert(
                gt.to_string(),
                GenotypeEntry {
                    genotype: gt.to_string(),
                    variants,
                    count,
                    annotation_counts: entry.annotation_counts,
                    columns: entry.columns,
                },
            );
        }

        let mendelian_errors = mendelian_data.map(|data| {
            let mut sequence = MendelianErrorSequence::new(&key.chromosome, key.batch_start, data);
            for (gt, entry) in &genotypes {
                sequence.add_annotation_index(gt, entry.columns.clone());
            }
            sequence
        });

        Ok(SampleIndexEntry {
            key: key.clone(),
            genotypes,
            mendelian_errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::annotation::{LOF_MASK, PROTEIN_CODING_MASK};

    fn record() -> RawRecord {
        let mut builder = SampleIndexRecordBuilder::new("study1", "s1", "1", 0);
        builder.add(
            "0/1",
            SampleVariant::new("1", 100, "A", "T"),
            VariantCodes {
                annotation: Some(PROTEIN_CODING_MASK | LOF_MASK),
                file: Some(0b0000_0011),
                ..Default::default()
            },
        );
        builder.add(
            "0/1",
            SampleVariant::new("1", 200, "C", "G"),
            VariantCodes {
                annotation: Some(PROTEIN_CODING_MASK),
                file: Some(0b0000_0010),
                ..Default::default()
            },
        );
        builder.add("1/1", SampleVariant::new("1", 300, "G", "A"), VariantCodes::default());
        builder.build().unwrap()
    }

    #[test]
    fn test_decode() {
        let entry = SampleIndexDecoder::new().decode(&record()).unwrap();
        assert_eq!(entry.genotypes.len(), 2);

        let het = entry.genotype("0/1").unwrap();
        assert_eq!(het.count, 2);
        let variants: Vec<IndexedVariant> = het.iter().map(|v| v.unwrap()).collect();
        assert_eq!(variants[1].variant, Some(SampleVariant::new("1", 200, "C", "G")));
        assert_eq!(variants[0].codes.annotation, Some(PROTEIN_CODING_MASK | LOF_MASK));
        assert_eq!(variants[1].codes.file, Some(0b0000_0010));
        assert_eq!(variants[1].codes.parents, None);

        let counts = het.annotation_counts.unwrap();
        assert_eq!(counts[0], 2);
        assert_eq!(counts[3], 1);

        let hom = entry.genotype("1/1").unwrap();
        assert_eq!(hom.columns, GenotypeColumns::default());
        assert!(entry.mendelian_errors.is_none());
    }

    #[test]
    fn test_decode_counts_only() {
        let decoder = SampleIndexDecoder::new();
        let entry = decoder.decode_counts_only(&record()).unwrap();
        let het = entry.genotype("0/1").unwrap();
        let slots: Vec<IndexedVariant> = het.iter().map(|v| v.unwrap()).collect();
        assert_eq!(slots.len(), 2);
        assert!(slots.iter().all(|s| s.variant.is_none()));
        assert_eq!(slots[0].codes.annotation, Some(PROTEIN_CODING_MASK | LOF_MASK));
        assert_eq!(decoder.count(&record()).unwrap(), 3);
    }

    #[test]
    fn test_count_without_count_column() {
        let mut record = record();
        record
            .cells
            .retain(|c| !c.column.starts_with(GENOTYPE_COUNT_PREFIX));
        assert_eq!(SampleIndexDecoder::new().count(&record).unwrap(), 3);
    }

    #[test]
    fn test_short_code_column_is_an_error() {
        let mut record = record();
        for cell in &mut record.cells {
            if cell.column == "_F_0/1" {
                cell.value = Bytes::from_static(&[0b0000_0011]);
            }
        }
        let entry = SampleIndexDecoder::new().decode(&record).unwrap();
        let results: Vec<_> = entry.genotype("0/1").unwrap().iter().collect();
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(Error::Codec(_))));
    }

    #[test]
    fn test_malformed_count_column() {
        let mut record = record();
        record.cells.push(RawCell {
            column: "_C_0/2".to_string(),
            value: Bytes::from_static(&[1, 2]),
        });
        assert!(matches!(
            SampleIndexDecoder::new().decode(&record),
            Err(Error::Codec(_))
        ));
    }

    #[test]
    fn test_unknown_columns_are_skipped() {
        let mut record = record();
        record.cells.push(RawCell {
            column: "_X_0/1".to_string(),
            value: Bytes::from_static(&[1]),
        });
        let entry = SampleIndexDecoder::new().decode(&record).unwrap();
        assert_eq!(entry.genotypes.len(), 2);
    }
}
