pub mod codec;
pub mod config;
pub mod decoder;
pub mod error;
pub mod filter;
pub mod metadata;
pub mod planner;
pub mod query;
pub mod reader;
pub mod schema;
pub mod storage;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use planner::{Plan, SampleIndexQuery, SampleIndexQueryParser};
pub use query::{Query, QueryParam};
pub use schema::IndexSchema;
