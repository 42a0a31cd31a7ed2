use anyhow::{Context, Result};
use ingestion_service::{generator, observability};
use std::env;
use time::OffsetDateTime;

/// Writes a synthetic batch file. With no site count a random one is drawn;
/// with no output path the batch goes to stdout.
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    let mut rng = rand::thread_rng();

    let num_sites = match args.get(1) {
        Some(n) => n.parse::<usize>().with_context(|| format!("invalid site count '{n}'"))?,
        None => generator::random_site_count(&mut rng),
    };

    let now = OffsetDateTime::now_utc();
    let body = generator::to_ndjson(&generator::generate_readings(&mut rng, num_sites, now))?;

    match args.get(2) {
        Some(path) => {
            tokio::fs::write(path, body.as_bytes())
                .await
                .with_context(|| format!("failed to write batch to '{path}'"))?;
            tracing::info!(path = %path, sites = num_sites, suggested_key = %generator::batch_key(now), "batch written");
        }
        None => print!("{body}"),
    }

    Ok(())
}
