//! Study and sample metadata needed to plan index queries.

use crate::types::IndexStatus;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Genotypes loaded when a study does not list its own
pub const DEFAULT_LOADED_GENOTYPES: [&str; 9] =
    ["0/1", "1/1", "0|1", "1|0", "1|1", "1/2", "0/2", "2/2", "1"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyMetadata {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub loaded_genotypes: Vec<String>,
}

impl StudyMetadata {
    pub fn loaded_genotypes(&self) -> Vec<String> {
        if self.loaded_genotypes.is_empty() {
            DEFAULT_LOADED_GENOTYPES.iter().map(|s| s.to_string()).collect()
        } else {
            self.loaded_genotypes.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleMetadata {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub father: Option<u32>,
    #[serde(default)]
    pub mother: Option<u32>,
    /// Genotype buckets of the sample index
    #[serde(default)]
    pub index_status: IndexStatus,
    /// Annotation columns of the sample index
    #[serde(default)]
    pub annotation_status: IndexStatus,
    /// Parents and Mendelian error columns
    #[serde(default)]
    pub family_index_status: IndexStatus,
    #[serde(default)]
    pub files: Vec<String>,
}

/// Catalog lookups used by the planner
pub trait MetadataProvider: Send + Sync {
    /// Study by name, or the only study when `name` is `None`
    fn study(&self, name: Option<&str>) -> Result<StudyMetadata>;

    fn sample(&self, study_id: u32, name: &str) -> Result<SampleMetadata>;

    fn sample_name(&self, study_id: u32, sample_id: u32) -> Result<String>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyEntry {
    #[serde(flatten)]
    pub study: StudyMetadata,
    #[serde(default)]
    pub samples: Vec<SampleMetadata>,
}

/// Metadata held in memory, loaded from JSON
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryMetadata {
    pub studies: Vec<StudyEntry>,
}

impl InMemoryMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn add_study(&mut self, study: StudyMetadata) {
        self.studies.push(StudyEntry {
            study,
            samples: Vec::new(),
        });
    }

    pub fn add_sample(&mut self, study_id: u32, sample: SampleMetadata) -> Result<()> {
        let entry = self
            .studies
            .iter_mut()
            .find(|e| e.study.id == study_id)
            .ok_or_else(|| Error::MissingStudy(study_id.to_string()))?;
        entry.samples.push(sample);
        Ok(())
    }

    fn entry(&self, study_id: u32) -> Result<&StudyEntry> {
        self.studies
            .iter()
            .find(|e| e.study.id == study_id)
            .ok_or_else(|| Error::MissingStudy(study_id.to_string()))
    }
}

impl MetadataProvider for InMemoryMetadata {
    fn study(&self, name: Option<&str>) -> Result<StudyMetadata> {
        match name {
            Some(name) => self
                .studies
                .iter()
                .find(|e| e.study.name == name || e.study.id.to_string() == name)
                .map(|e| e.study.clone())
                .ok_or_else(|| Error::MissingStudy(name.to_string())),
            None => match self.studies.as_slice() {
                [only] => Ok(only.study.clone()),
                [] => Err(Error::MissingStudy("no studies available".to_string())),
                _ => {
                    let names: Vec<&str> = self.studies.iter().map(|e| e.study.name.as_str()).collect();
                    Err(Error::MissingStudy(format!(
                        "study required, one of: {}",
                        names.join(", ")
                    )))
                }
            },
        }
    }

    fn sample(&self, study_id: u32, name: &str) -> Result<SampleMetadata> {
        let entry = self.entry(study_id)?;
        entry
            .samples
            .iter()
            .find(|s| s.name == name)
            .cloned()
            .ok_or_else(|| Error::MissingSample {
                study: entry.study.name.clone(),
                sample: name.to_string(),
            })
    }

    fn sample_name(&self, study_id: u32, sample_id: u32) -> Result<String> {
        let entry = self.entry(study_id)?;
        entry
            .samples
            .iter()
            .find(|s| s.id == sample_id)
            .map(|s| s.name.clone())
            .ok_or_else(|| Error::MissingSample {
                study: entry.study.name.clone(),
                sample: sample_id.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const METADATA: &str = r#"{
        "studies": [{
            "id": 1,
            "name": "study1",
            "samples": [
                {"id": 10, "name": "child", "father": 11, "mother": 12,
                 "index_status": "READY", "annotation_status": "READY",
                 "family_index_status": "READY", "files": ["trio.vcf.gz"]},
                {"id": 11, "name": "father", "index_status": "READY"},
                {"id": 12, "name": "mother", "index_status": "BUILDING"}
            ]
        }]
    }"#;

    #[test]
    fn test_from_json() {
        let metadata = InMemoryMetadata::from_json(METADATA).unwrap();
        let study = metadata.study(None).unwrap();
        assert_eq!(study.name, "study1");
        assert_eq!(study.loaded_genotypes().len(), DEFAULT_LOADED_GENOTYPES.len());

        let child = metadata.sample(1, "child").unwrap();
        assert_eq!(child.father, Some(11));
        assert!(child.family_index_status.is_ready());
        assert_eq!(metadata.sample_name(1, 12).unwrap(), "mother");

        let mother = metadata.sample(1, "mother").unwrap();
        assert_eq!(mother.index_status, IndexStatus::Building);
        assert_eq!(mother.annotation_status, IndexStatus::NotBuilt);
    }

    #[test]
    fn test_missing_sample() {
        let metadata = InMemoryMetadata::from_json(METADATA).unwrap();
        let err = metadata.sample(1, "nobody").unwrap_err();
        assert!(matches!(err, Error::MissingSample { .. }));
        assert!(matches!(metadata.study(Some("other")), Err(Error::MissingStudy(_))));
    }

    #[test]
    fn test_default_study_requires_single_study() {
        let mut metadata = InMemoryMetadata::new();
        assert!(metadata.study(None).is_err());
        metadata.add_study(StudyMetadata {
            id: 1,
            name: "a".to_string(),
            loaded_genotypes: vec![],
        });
        assert!(metadata.study(None).is_ok());
        metadata.add_study(StudyMetadata {
            id: 2,
            name: "b".to_string(),
            loaded_genotypes: vec![],
        });
        assert!(metadata.study(None).is_err());
        assert_eq!(metadata.study(Some("2")).unwrap().name, "b");
    }
}
