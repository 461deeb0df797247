use clap::Parser;
use std::path::PathBuf;

use dev_gateway::observability::logging;
use dev_gateway::OfflineStore;

#[derive(Parser)]
#[command(name = "kv-smoke")]
#[command(about = "Write a value to the offline store and read it back", long_about = None)]
struct Cli {
    /// Persist the store at this path instead of keeping it in memory
    #[arg(short, long)]
    path: Option<PathBuf>,

    #[arg(short, long, default_value = "somekey")]
    key: String,

    #[arg(short, long, default_value = "Hello")]
    value: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init("info");

    let store = match &cli.path {
        Some(path) => OfflineStore::open(path).await?,
        None => OfflineStore::in_memory(),
    };

    if let Err(e) = store.put(cli.key.as_str(), &cli.value).await {
        tracing::error!(key = %cli.key, error = %e, "Write failed");
        return Err(e.into());
    }

    match store.get(&cli.key).await {
        Ok(Some(value)) => tracing::info!(key = %cli.key, value = %value, "Read back"),
        Ok(None) => tracing::warn!(key = %cli.key, "Value missing after write"),
        Err(e) => {
            tracing::error!(key = %cli.key, error = %e, "Read failed");
            return Err(e.into());
        }
    }
    Ok(())
}
