use super::SampleIndexStore;
use crate::decoder::RawRecord;
use crate::schema::IndexSchema;
use crate::types::Region;
use crate::Result;
use async_trait::async_trait;
use std::path::Path;
use tokio::fs;
use tracing::debug;

pub struct InMemoryStore {
    records: Vec<RawRecord>,
    batch_size: u64,
}

impl InMemoryStore {
    pub fn new(batch_size: u64) -> Self {
        Self {
            records: Vec::new(),
            batch_size,
        }
    }

    /// Load a JSON array of records
    pub async fn from_path(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).await?;
        let records: Vec<RawRecord> = serde_json::from_str(&json)?;
        debug!(path = %path.display(), records = records.len(), "loaded sample index records");
        let mut store = Self::new(IndexSchema::default().batch_size);
        for record in records {
            store.insert(record);
        }
        Ok(store)
    }

    pub fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn insert(&mut self, record: RawRecord) {
        let key = &record.key;
        let position = self
            .records
            .partition_point(|r| r.key < *key);
        if self.records.get(position).is_some_and(|r| r.key == *key) {
            debug!(sample = %key.sample, chromosome = %key.chromosome, batch = key.batch_start, "replace record");
            self.records[position] = record;
        } else {
            self.records.insert(position, record);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn overlaps(&self, record: &RawRecord, regions: &[Region]) -> bool {
        let key = &record.key;
        let batch_end = key.batch_start.saturating_add(self.batch_size - 1);
        regions.is_empty()
            || regions
                .iter()
                .any(|r| r.overlaps(&key.chromosome, key.batch_start, batch_end))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(IndexSchema::default().batch_size)
    }
}

#[async_trait]
impl SampleIndexStore for InMemoryStore {
    async fn records(&self, study: &str, sample: &str, regions: &[Region]) -> Result<Vec<RawRecord>> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.key.study == study && r.key.sample == sample)
            .filter(|r| self.overlaps(r, regions))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{SampleIndexRecordBuilder, VariantCodes};
    use crate::types::SampleVariant;
    use std::io::Write;

    fn record(sample: &str, chromosome: &str, batch_start: u64) -> RawRecord {
        let mut builder = SampleIndexRecordBuilder::new("study1", sample, chromosome, batch_start);
        builder.add(
            "0/1",
            SampleVariant::new(chromosome, batch_start + 10, "A", "T"),
            VariantCodes::default(),
        );
        builder.build().unwrap()
    }

    #[tokio::test]
    async fn test_records_by_region() {
        let mut store = InMemoryStore::default();
        store.insert(record("s1", "1", 1_000_000));
        store.insert(record("s1", "1", 0));
        store.insert(record("s1", "2", 0));
        store.insert(record("s2", "1", 0));

        let all = store.records("study1", "s1", &[]).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].key.batch_start, 0);
        assert_eq!(all[1].key.batch_start, 1_000_000);

        let regions = vec![Region::new("1", 999_000, 1_000_001)];
        let overlapping = store.records("study1", "s1", &regions).await.unwrap();
        assert_eq!(overlapping.len(), 2);

        let regions = vec![Region::new("1", 1_500_000, 1_600_000)];
        let overlapping = store.records("study1", "s1", &regions).await.unwrap();
        assert_eq!(overlapping.len(), 1);
        assert!(store.records("study2", "s1", &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_insert_replaces_same_key() {
        let mut store = InMemoryStore::default();
        store.insert(record("s1", "1", 0));
        store.insert(record("s1", "1", 0));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_from_path() {
        let records = vec![record("s1", "1", 0), record("s1", "X", 0)];
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(serde_json::to_string(&records).unwrap().as_bytes())
            .unwrap();

        let store = InMemoryStore::from_path(file.path()).await.unwrap();
        assert_eq!(store.len(), 2);
        let loaded = store.records("study1", "s1", &[]).await.unwrap();
        assert_eq!(loaded, records);
    }

    #[tokio::test]
    async fn test_from_missing_path() {
        let result = InMemoryStore::from_path(Path::new("/nonexistent/records.json")).await;
        assert!(matches!(result, Err(crate::Error::Io(_))));
    }
}
