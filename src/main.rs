use clap::Parser;
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sampleindex::{
    Config, Plan, SampleIndexQueryParser,
    reader::SampleIndexReader,
    storage::InMemoryStore,
};

async fn run(config: &Config) -> sampleindex::Result<serde_json::Value> {
    let schema = config.load_schema()?;
    let metadata = config.load_metadata()?;
    let query = config.query()?;

    let parser = SampleIndexQueryParser::new(&metadata, &schema)?;
    let plan = parser.parse(&query)?;

    let (Some(records), Plan::Indexed { index_query, .. }) = (&config.records, &plan) else {
        return Ok(json!({ "plan": plan }));
    };

    let store = InMemoryStore::from_path(records)
        .await?
        .with_batch_size(schema.batch_size);
    let reader = SampleIndexReader::new(&store);
    if config.count {
        let count = reader.count(index_query).await?;
        tracing::info!(count, "counted sample index variants");
        Ok(json!({ "plan": plan, "count": count }))
    } else {
        let variants = reader.read(index_query).await?;
        tracing::info!(variants = variants.len(), "read sample index variants");
        let variants: Vec<String> = variants.iter().map(ToString::to_string).collect();
        Ok(json!({ "plan": plan, "variants": variants }))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Metadata: {:?}", config.metadata);

    match run(&config).await {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(err) => {
            tracing::error!("{}", err);
            println!("{}", serde_json::to_string_pretty(&err.to_body())?);
            std::process::exit(1);
        }
    }
}
