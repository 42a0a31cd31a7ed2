use energy_client::domain::{EnrichedReading, Reading};

/// Rounds to 2 decimal places, half away from zero, in IEEE-754 double.
///
/// `0.125 -> 0.13`, `-0.125 -> -0.13`.
pub fn round_kwh(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Pure metric computation for one reading.
///
/// Returns `(net_energy_kwh, anomaly)`. A reading is anomalous iff either raw
/// input is strictly negative; zero (including `-0.0`) is never anomalous.
pub fn compute_metrics(reading: &Reading) -> (f64, bool) {
    let generated = reading.energy_generated_kwh;
    let consumed = reading.energy_consumed_kwh;

    let net = round_kwh(generated - consumed);
    let anomaly = generated < 0.0 || consumed < 0.0;

    (net, anomaly)
}

pub fn enrich(reading: Reading) -> EnrichedReading {
    let (net_energy_kwh, anomaly) = compute_metrics(&reading);

    EnrichedReading {
        site_id: reading.site_id,
        timestamp: reading.timestamp,
        energy_generated_kwh: reading.energy_generated_kwh,
        energy_consumed_kwh: reading.energy_consumed_kwh,
        net_energy_kwh,
        anomaly,
    }
}
