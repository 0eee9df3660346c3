//! Mendelian error column of a sample index record.
//!
//! Entries are `u16` length + genotype, `u32` index of the variant in its genotype bucket,
//! `u8` error code and the variant itself. Entries whose genotype has no bucket (reference
//! calls) carry [`NO_BUCKET_INDEX`].

use super::variants::{read_variant, write_variant};
use super::{GenotypeColumns, VariantCodes};
use crate::types::SampleVariant;
use crate::{Error, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::BTreeMap;

pub const NO_BUCKET_INDEX: u32 = u32::MAX;

/// Mendelian error codes where the child carries an allele absent from both parents
pub const DE_NOVO_CODES: [u8; 6] = [2, 3, 4, 5, 10, 12];

pub fn is_de_novo(code: u8) -> bool {
    DE_NOVO_CODES.contains(&code)
}

#[derive(Debug, Clone, PartialEq)]
pub struct MendelianError {
    pub genotype: String,
    pub index: u32,
    pub code: u8,
    pub variant: SampleVariant,
    /// Codes of the variant in its genotype bucket, when the bucket holds it
    pub codes: VariantCodes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MendelianErrorSequence {
    chromosome: String,
    batch_start: u64,
    data: Bytes,
    buckets: BTreeMap<String, GenotypeColumns>,
}

impl MendelianErrorSequence {
    pub fn new(chromosome: impl Into<String>, batch_start: u64, data: Bytes) -> Self {
        Self {
            chromosome: chromosome.into(),
            batch_start,
            data,
            buckets: BTreeMap::new(),
        }
    }

    /// Back-annotate entries of `genotype` with the codes of its bucket
    pub fn add_annotation_index(&mut self, genotype: &str, columns: GenotypeColumns) {
        self.buckets.insert(genotype.to_string(), columns);
    }

    pub fn iter(&self) -> MendelianErrorIter<'_> {
        MendelianErrorIter {
            sequence: self,
            data: self.data.clone(),
        }
    }

    fn read_entry(&self, data: &mut Bytes) -> Result<MendelianError> {
        if data.remaining() < 2 {
            return Err(Error::Codec("truncated mendelian error genotype".to_string()));
        }
        let len = data.get_u16() as usize;
        if data.remaining() < len + 5 {
            return Err(Error::Codec("truncated mendelian error entry".to_string()));
        }
        let genotype = String::from_utf8(data.split_to(len).to_vec())
            .map_err(|e| Error::Codec(format!("mendelian error genotype: {}", e)))?;
        let index = data.get_u32();
        let code = data.get_u8();
        let variant = read_variant(data, &self.chromosome, self.batch_start)?;

        let codes = match self.buckets.get(&genotype) {
            Some(columns) if index != NO_BUCKET_INDEX => columns.codes(index as usize)?,
            _ => VariantCodes::default(),
        };
        Ok(MendelianError {
            genotype,
            index,
            code,
            variant,
            codes,
        })
    }
}

pub struct MendelianErrorIter<'a> {
    sequence: &'a MendelianErrorSequence,
    data: Bytes,
}

impl Iterator for MendelianErrorIter<'_> {
    type Item = Result<MendelianError>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.data.has_remaining() {
            return None;
        }
        let result = self.sequence.read_entry(&mut self.data);
        if result.is_err() {
            self.data.clear();
        }
        Some(result)
    }
}

pub(crate) fn write_mendelian_error(
    buf: &mut BytesMut,
    genotype: &str,
    index: u32,
    code: u8,
    variant: &SampleVariant,
    batch_start: u64,
) -> Result<()> {
    let len = u16::try_from(genotype.len())
        .map_err(|_| Error::Codec(format!("genotype '{}' is too long", genotype)))?;
    buf.put_u16(len);
    buf.put_slice(genotype.as_bytes());
    buf.put_u32(index);
    buf.put_u8(code);
    write_variant(buf, variant, batch_start)
}
