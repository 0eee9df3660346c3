//! Variant lists of a genotype bucket.
//!
//! Each variant is a `u32` offset from the batch start followed by the reference and
//! alternate alleles, each prefixed by a `u16` length. All integers are big endian.

use crate::types::SampleVariant;
use crate::{Error, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};

fn read_allele(data: &mut Bytes) -> Result<String> {
    if data.remaining() < 2 {
        return Err(Error::Codec("truncated allele length".to_string()));
    }
    let len = data.get_u16() as usize;
    if data.remaining() < len {
        return Err(Error::Codec(format!(
            "allele of {} bytes with only {} left",
            len,
            data.remaining()
        )));
    }
    let allele = data.split_to(len);
    String::from_utf8(allele.to_vec()).map_err(|e| Error::Codec(format!("allele: {}", e)))
}

/// Read one variant, advancing `data` past it
pub(crate) fn read_variant(data: &mut Bytes, chromosome: &str, batch_start: u64) -> Result<SampleVariant> {
    if data.remaining() < 4 {
        return Err(Error::Codec("truncated variant offset".to_string()));
    }
    let offset = data.get_u32() as u64;
    let reference = read_allele(data)?;
    let alternate = read_allele(data)?;
    Ok(SampleVariant::new(
        chromosome,
        batch_start + offset,
        reference,
        alternate,
    ))
}

fn write_allele(buf: &mut BytesMut, allele: &str) -> Result<()> {
    let len = u16::try_from(allele.len())
        .map_err(|_| Error::Codec(format!("allele of {} bytes is too long", allele.len())))?;
    buf.put_u16(len);
    buf.put_slice(allele.as_bytes());
    Ok(())
}

pub(crate) fn write_variant(buf: &mut BytesMut, variant: &SampleVariant, batch_start: u64) -> Result<()> {
    let offset = variant
        .position
        .checked_sub(batch_start)
        .and_then(|o| u32::try_from(o).ok())
        .ok_or_else(|| {
            Error::Codec(format!(
                "variant {} outside of batch starting at {}",
                variant, batch_start
            ))
        })?;
    buf.put_u32(offset);
    write_allele(buf, &variant.reference)?;
    write_allele(buf, &variant.alternate)
}

/// Variants of a genotype bucket
#[derive(Debug, Clone, PartialEq)]
pub enum VariantSequence {
    Empty,
    /// Encoded variants, decoded lazily
    Encoded {
        chromosome: String,
        batch_start: u64,
        data: Bytes,
    },
    /// Counts only decoding: placeholder slots without positions
    Counted(usize),
}

impl VariantSequence {
    /// Fresh cursor over the sequence. Every call restarts from the first variant.
    pub fn iter(&self) -> VariantIter<'_> {
        let state = match self {
            VariantSequence::Empty => IterState::Done,
            VariantSequence::Encoded {
                chromosome,
                batch_start,
                data,
            } => IterState::Encoded {
                chromosome,
                batch_start: *batch_start,
                data: data.clone(),
            },
            VariantSequence::Counted(count) => IterState::Counted(*count),
        };
        VariantIter { state }
    }

    /// Number of variants, walking the encoded bytes if needed
    pub fn len(&self) -> Result<usize> {
        match self {
            VariantSequence::Counted(count) => Ok(*count),
            _ => self.iter().try_fold(0, |n, v| v.map(|_| n + 1)),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            VariantSequence::Empty => true,
            VariantSequence::Encoded { data, .. } => data.is_empty(),
            VariantSequence::Counted(count) => *count == 0,
        }
    }
}

enum IterState<'a> {
    Done,
    Encoded {
        chromosome: &'a str,
        batch_start: u64,
        data: Bytes,
    },
    Counted(usize),
}

pub struct VariantIter<'a> {
    state: IterState<'a>,
}

impl Iterator for VariantIter<'_> {
    /// `None` variants are counts only placeholders
    type Item = Result<Option<SampleVariant>>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.state {
            IterState::Done => None,
            IterState::Counted(0) => None,
            IterState::Counted(remaining) => {
                *remaining -= 1;
                Some(Ok(None))
            }
            IterState::Encoded {
                chromosome,
                batch_start,
                data,
            } => {
                if !data.has_remaining() {
                    self.state = IterState::Done;
                    return None;
                }
                let result = read_variant(data, chromosome, *batch_start);
                if result.is_err() {
                    self.state = IterState::Done;
                }
                Some(result.map(Some))
            }
        }
    }
}

/// Encode a list of variants of one batch
pub fn encode_variants(variants: &[SampleVariant], batch_start: u64) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    for variant in variants {
        write_variant(&mut buf, variant, batch_start)?;
    }
    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variants() -> Vec<SampleVariant> {
        vec![
            SampleVariant::new("1", 1_000_100, "A", "T"),
            SampleVariant::new("1", 1_000_250, "AC", "A"),
            SampleVariant::new("1", 1_999_999, "G", "<DEL>"),
        ]
    }

    fn sequence() -> VariantSequence {
        VariantSequence::Encoded {
            chromosome: "1".to_string(),
            batch_start: 1_000_000,
            data: encode_variants(&variants(), 1_000_000).unwrap(),
        }
    }

    #[test]
    fn test_decode_variants() {
        let decoded: Vec<SampleVariant> = sequence()
            .iter()
            .map(|v| v.unwrap().unwrap())
            .collect();
        assert_eq!(decoded, variants());
    }

    #[test]
    fn test_sequence_is_restartable() {
        let sequence = sequence();
        let first: Vec<_> = sequence.iter().take(2).map(|v| v.unwrap()).collect();
        let again: Vec<_> = sequence.iter().take(2).map(|v| v.unwrap()).collect();
        assert_eq!(first, again);
        assert_eq!(sequence.len().unwrap(), 3);
    }

    #[test]
    fn test_counted_placeholders() {
        let sequence = VariantSequence::Counted(2);
        let slots: Vec<_> = sequence.iter().map(|v| v.unwrap()).collect();
        assert_eq!(slots, vec![None, None]);
        assert_eq!(VariantSequence::Empty.iter().count(), 0);
    }

    #[test]
    fn test_truncated_variant_is_an_error() {
        let data = encode_variants(&variants(), 1_000_000).unwrap();
        let sequence = VariantSequence::Encoded {
            chromosome: "1".to_string(),
            batch_start: 1_000_000,
            data: data.slice(..data.len() - 1),
        };
        let results: Vec<_> = sequence.iter().collect();
        assert_eq!(results.len(), 3);
        assert!(matches!(results[2], Err(Error::Codec(_))));
        assert!(sequence.len().is_err());
    }

    #[test]
    fn test_variant_outside_batch() {
        let variant = SampleVariant::new("1", 10, "A", "T");
        assert!(encode_variants(&[variant], 1_000_000).is_err());
    }
}
