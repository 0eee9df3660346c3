//! Evaluates a planned [`SampleIndexQuery`] over a record store.

use crate::decoder::SampleIndexDecoder;
use crate::filter::SampleIndexEntryFilter;
use crate::planner::SampleIndexQuery;
use crate::storage::SampleIndexStore;
use crate::types::{QueryOperation, SampleVariant};
use crate::Result;
use std::collections::BTreeSet;
use tracing::debug;

pub struct SampleIndexReader<'a, S: SampleIndexStore + ?Sized> {
    store: &'a S,
    decoder: SampleIndexDecoder,
}

impl<'a, S: SampleIndexStore + ?Sized> SampleIndexReader<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            decoder: SampleIndexDecoder::new(),
        }
    }

    /// Variants of every sample combined with the query operator, in sorted order
    pub async fn read(&self, query: &SampleIndexQuery) -> Result<Vec<SampleVariant>> {
        let mut combined: Option<BTreeSet<SampleVariant>> = None;
        for sample in query.sample_names() {
            let variants = self.read_sample(query, sample).await?;
            debug!(sample, variants = variants.len(), "read sample index");
            combined = Some(match (combined, query.operation) {
                (None, _) => variants,
                (Some(acc), QueryOperation::And) => acc.intersection(&variants).cloned().collect(),
                (Some(mut acc), QueryOperation::Or) => {
                    acc.extend(variants);
                    acc
                }
            });
            if query.operation == QueryOperation::And && combined.as_ref().is_some_and(|c| c.is_empty()) {
                break;
            }
        }
        Ok(combined.unwrap_or_default().into_iter().collect())
    }

    /// Number of variants matching the query.
    ///
    /// A single sample without code filters is counted from the bucket counts alone.
    pub async fn count(&self, query: &SampleIndexQuery) -> Result<u64> {
        let mut samples = query.sample_names();
        if let (Some(sample), None) = (samples.next(), samples.next()) {
            if let Some(single) = query.for_sample(sample) {
                let filter = SampleIndexEntryFilter::new(single);
                if filter.is_count_only() {
                    let mut count = 0;
                    for record in self.store.records(&query.study, sample, &query.regions).await? {
                        count += filter.count(&self.decoder.decode_counts_only(&record)?);
                    }
                    return Ok(count);
                }
            }
        }
        Ok(self.read(query).await?.len() as u64)
    }

    async fn read_sample(&self, query: &SampleIndexQuery, sample: &str) -> Result<BTreeSet<SampleVariant>> {
        let mut variants = BTreeSet::new();
        let Some(single) = query.for_sample(sample) else {
            return Ok(variants);
        };
        let filter = SampleIndexEntryFilter::new(single);
        for record in self.store.records(&query.study, sample, &query.regions).await? {
            let entry = self.decoder.decode(&record)?;
            variants.extend(filter.filter(&entry)?);
        }
        Ok(variants)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{SampleIndexRecordBuilder, VariantCodes};
    use crate::planner::SampleAnnotationIndexQuery;
    use crate::storage::InMemoryStore;
    use std::collections::BTreeMap;

    fn store() -> InMemoryStore {
        let mut store = InMemoryStore::default();
        for (sample, positions) in [("s1", [100, 200]), ("s2", [200, 300])] {
            let mut builder = SampleIndexRecordBuilder::new("study1", sample, "1", 0);
            for position in positions {
                builder.add(
                    "0/1",
                    SampleVariant::new("1", position, "A", "T"),
                    VariantCodes::default(),
                );
            }
            store.insert(builder.build().unwrap());
        }
        store
    }

    fn query(samples: &[&str], operation: QueryOperation) -> SampleIndexQuery {
        SampleIndexQuery {
            regions: vec![],
            variant_types: None,
            study: "study1".to_string(),
            samples: samples
                .iter()
                .map(|s| (s.to_string(), vec!["0/1".to_string()]))
                .collect(),
            father_filters: BTreeMap::new(),
            mother_filters: BTreeMap::new(),
            file_queries: BTreeMap::new(),
            annotation_query: SampleAnnotationIndexQuery::default(),
            mendelian_error_samples: Default::default(),
            only_de_novo: false,
            operation,
            partial: false,
            complete_index: true,
        }
    }

    fn positions(variants: Vec<SampleVariant>) -> Vec<u64> {
        variants.into_iter().map(|v| v.position).collect()
    }

    #[tokio::test]
    async fn test_and_intersects_samples() {
        let store = store();
        let reader = SampleIndexReader::new(&store);
        let variants = reader.read(&query(&["s1", "s2"], QueryOperation::And)).await.unwrap();
        assert_eq!(positions(variants), vec![200]);
    }

    #[tokio::test]
    async fn test_or_unions_samples() {
        let store = store();
        let reader = SampleIndexReader::new(&store);
        let q = query(&["s1", "s2"], QueryOperation::Or);
        assert_eq!(positions(reader.read(&q).await.unwrap()), vec![100, 200, 300]);
        assert_eq!(reader.count(&q).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_single_sample_count() {
        let store = store();
        let reader = SampleIndexReader::new(&store);
        assert_eq!(reader.count(&query(&["s2"], QueryOperation::And)).await.unwrap(), 2);
        assert_eq!(reader.count(&query(&["nobody"], QueryOperation::And)).await.unwrap(), 0);
    }
}
