use crate::metadata::InMemoryMetadata;
use crate::query::{Query, QueryParam};
use crate::schema::IndexSchema;
use crate::{Error, Result};
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "sampleindex")]
#[command(about = "Plan variant queries over the sample index and optionally evaluate them")]
pub struct Config {
    /// JSON file with studies and samples
    #[arg(long, env = "SAMPLEINDEX_METADATA", default_value = "./metadata.json")]
    pub metadata: PathBuf,

    /// JSON index schema, the standard tables when absent
    #[arg(long, env = "SAMPLEINDEX_SCHEMA")]
    pub schema: Option<PathBuf>,

    /// JSON sample index records to evaluate the plan against
    #[arg(long, env = "SAMPLEINDEX_RECORDS")]
    pub records: Option<PathBuf>,

    /// Only count matching variants when evaluating
    #[arg(long, default_value = "false")]
    pub count: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    /// Query filter, repeatable (e.g. -f GENOTYPE=NA12878:0/1)
    #[arg(short = 'f', long = "filter", value_name = "KEY=VALUE")]
    pub filters: Vec<String>,
}

impl Config {
    pub fn query(&self) -> Result<Query> {
        let mut query = Query::new();
        for filter in &self.filters {
            let (key, value) = filter.split_once('=').ok_or_else(|| {
                Error::InvalidQuery(format!("filter '{}' is not KEY=VALUE", filter))
            })?;
            let param: QueryParam = key.parse()?;
            if query.contains(param) {
                return Err(Error::InvalidQuery(format!("duplicated filter {}", param)));
            }
            query.insert(param, value.trim());
        }
        Ok(query)
    }

    pub fn load_schema(&self) -> Result<IndexSchema> {
        match &self.schema {
            Some(path) => IndexSchema::from_path(path),
            None => Ok(IndexSchema::default()),
        }
    }

    pub fn load_metadata(&self) -> Result<InMemoryMetadata> {
        InMemoryMetadata::from_path(&self.metadata)
    }
}
