use super::mendelian::{NO_BUCKET_INDEX, write_mendelian_error};
use super::variants::encode_variants;
use super::{
    ANNOTATION_COUNTS_PREFIX, ANNOTATION_PREFIX, BIOTYPE_PREFIX, CONSEQUENCE_TYPE_PREFIX,
    FILE_PREFIX, GENOTYPE_COUNT_PREFIX, MENDELIAN_ERROR_COLUMN, PARENTS_PREFIX,
    POPULATION_FREQUENCY_PREFIX, RawCell, RawRecord, RecordKey, VariantCodes,
};
use crate::codec::annotation::count_per_bit;
use crate::types::SampleVariant;
use crate::{Error, Result};
use bytes::{BufMut, Bytes, BytesMut};
use std::collections::BTreeMap;

/// Writes raw records in the layout read by [`super::SampleIndexDecoder`].
///
/// A code column is only written when every variant of the bucket has that code, so a
/// partially annotated bucket reads as unannotated.
pub struct SampleIndexRecordBuilder {
    key: RecordKey,
    genotypes: BTreeMap<String, Vec<(SampleVariant, VariantCodes)>>,
    mendelian_errors: Vec<(String, u8, SampleVariant)>,
}

impl SampleIndexRecordBuilder {
    pub fn new(study: &str, sample: &str, chromosome: &str, batch_start: u64) -> Self {
        Self {
            key: RecordKey {
                study: study.to_string(),
                sample: sample.to_string(),
                chromosome: chromosome.to_string(),
                batch_start,
            },
            genotypes: BTreeMap::new(),
            mendelian_errors: Vec::new(),
        }
    }

    pub fn add(&mut self, genotype: &str, variant: SampleVariant, codes: VariantCodes) -> &mut Self {
        self.genotypes
            .entry(genotype.to_string())
            .or_default()
            .push((variant, codes));
        self
    }

    /// Genotypes without a bucket, such as `0/0`, may also carry Mendelian errors
    pub fn add_mendelian_error(&mut self, genotype: &str, variant: SampleVariant, code: u8) -> &mut Self {
        self.mendelian_errors
            .push((genotype.to_string(), code, variant));
        self
    }

    pub fn build(&self) -> Result<RawRecord> {
        let batch_start = self.key.batch_start;
        let mut cells = Vec::new();
        let mut buckets: BTreeMap<&str, Vec<&SampleVariant>> = BTreeMap::new();

        for (gt, entries) in &self.genotypes {
            let mut entries: Vec<&(SampleVariant, VariantCodes)> = entries.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            if let Some(other) = entries.iter().find(|(v, _)| v.chromosome != self.key.chromosome) {
                return Err(Error::Codec(format!(
                    "variant {} does not belong to chromosome {}",
                    other.0, self.key.chromosome
                )));
            }

            let variants: Vec<SampleVariant> = entries.iter().map(|(v, _)| v.clone()).collect();
            let count = u32::try_from(variants.len())
                .map_err(|_| Error::Codec(format!("too many variants for genotype {}", gt)))?;
            cells.push(cell(gt.to_string(), encode_variants(&variants, batch_start)?));
            cells.push(cell(
                format!("{}{}", GENOTYPE_COUNT_PREFIX, gt),
                Bytes::copy_from_slice(&count.to_be_bytes()),
            ));

            let codes: Vec<VariantCodes> = entries.iter().map(|(_, c)| *c).collect();
            if let Some(summaries) = all_codes(&codes, |c| c.annotation) {
                let mut counts = BytesMut::new();
                for n in count_per_bit(&summaries) {
                    counts.put_u32(n);
                }
                cells.push(cell(format!("{}{}", ANNOTATION_PREFIX, gt), Bytes::from(summaries)));
                cells.push(cell(format!("{}{}", ANNOTATION_COUNTS_PREFIX, gt), counts.freeze()));
            }
            if let Some(files) = all_codes(&codes, |c| c.file) {
                cells.push(cell(format!("{}{}", FILE_PREFIX, gt), Bytes::from(files)));
            }
            if let Some(parents) = all_codes(&codes, |c| c.parents) {
                cells.push(cell(format!("{}{}", PARENTS_PREFIX, gt), Bytes::from(parents)));
            }
            if let Some(cts) = all_codes(&codes, |c| c.consequence_type) {
                let mut buf = BytesMut::with_capacity(cts.len() * 2);
                for ct in cts {
                    buf.put_u16(ct);
                }
                cells.push(cell(format!("{}{}", CONSEQUENCE_TYPE_PREFIX, gt), buf.freeze()));
            }
            if let Some(biotypes) = all_codes(&codes, |c| c.biotype) {
                cells.push(cell(format!("{}{}", BIOTYPE_PREFIX, gt), Bytes::from(biotypes)));
            }
            if let Some(pfs) = all_codes(&codes, |c| c.population_frequency) {
                cells.push(cell(format!("{}{}", POPULATION_FREQUENCY_PREFIX, gt), Bytes::from(pfs)));
            }

            buckets.insert(gt, entries.into_iter().map(|(v, _)| v).collect());
        }

        if !self.mendelian_errors.is_empty() {
            let mut errors: Vec<&(String, u8, SampleVariant)> = self.mendelian_errors.iter().collect();
            errors.sort_by(|a, b| a.2.cmp(&b.2));
            let mut buf = BytesMut::new();
            for (gt, code, variant) in errors {
                let index = buckets
                    .get(gt.as_str())
                    .and_then(|variants| variants.iter().position(|v| *v == variant))
                    .map(|i| i as u32)
                    .unwrap_or(NO_BUCKET_INDEX);
                write_mendelian_error(&mut buf, gt, index, *code, variant, batch_start)?;
            }
            cells.push(cell(MENDELIAN_ERROR_COLUMN.to_string(), buf.freeze()));
        }

        Ok(RawRecord {
            key: self.key.clone(),
            cells,
        })
    }
}

fn cell(column: String, value: Bytes) -> RawCell {
    RawCell { column, value }
}

fn all_codes<T: Copy>(codes: &[VariantCodes], code: impl Fn(&VariantCodes) -> Option<T>) -> Option<Vec<T>> {
    codes.iter().map(code).collect()
}
