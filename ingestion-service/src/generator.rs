//! Synthetic batch files for demos and load tests.
//!
//! Produces one reading per site with ids `site_id001`, `site_id002`, ...,
//! a random instant between the Unix epoch and `now`, and energy values in
//! `[-20.00, 100.00]` with two decimals, so roughly one value in six is
//! negative and the batch exercises the anomaly path.

use energy_client::domain::Reading;
use rand::Rng;
use time::OffsetDateTime;

pub const MIN_SITES: usize = 1;
pub const MAX_SITES: usize = 100;

pub fn site_id(index: usize) -> String {
    format!("site_id{:03}", index + 1)
}

pub fn random_site_count<R: Rng>(rng: &mut R) -> usize {
    rng.gen_range(MIN_SITES..=MAX_SITES)
}

fn random_kwh<R: Rng>(rng: &mut R) -> f64 {
    rng.gen_range(-2_000_i64..=10_000) as f64 / 100.0
}

pub fn generate_readings<R: Rng>(rng: &mut R, num_sites: usize, now: OffsetDateTime) -> Vec<Reading> {
    let latest = now.unix_timestamp().max(0);
    (0..num_sites)
        .map(|i| {
            let secs = rng.gen_range(0..=latest);
            Reading {
                site_id: site_id(i),
                timestamp: OffsetDateTime::from_unix_timestamp(secs).unwrap_or(OffsetDateTime::UNIX_EPOCH),
                energy_generated_kwh: random_kwh(rng),
                energy_consumed_kwh: random_kwh(rng),
            }
        })
        .collect()
}

/// One JSON object per line, newline-terminated.
pub fn to_ndjson(readings: &[Reading]) -> Result<String, serde_json::Error> {
    let mut out = String::new();
    for r in readings {
        out.push_str(&serde_json::to_string(r)?);
        out.push('\n');
    }
    Ok(out)
}

/// Object key for a batch generated at `now`, in the landing-zone layout.
pub fn batch_key(now: OffsetDateTime) -> String {
    format!("rawdata/{}/part-00000.json", now.unix_timestamp_nanos())
}
