use sqlx::PgPool;
use time::OffsetDateTime;

use crate::domain::EnrichedReading;

/// Readings for one site with `start <= ts <= end`, ordered by time.
pub async fn records_in_range(
    pool: &PgPool,
    site_id: &str,
    start: OffsetDateTime,
    end: OffsetDateTime,
) -> Result<Vec<EnrichedReading>, sqlx::Error> {
    sqlx::query_as::<_, EnrichedReading>(
        r#"
        SELECT
            site_id,
            ts,
            energy_generated_kwh,
            energy_consumed_kwh,
            net_energy_kwh,
            anomaly
        FROM energy_site_data
        WHERE site_id = $1
          AND ts >= $2
          AND ts <= $3
        ORDER BY ts
        "#,
    )
    .bind(site_id)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await
}

/// All anomalous readings for one site.
pub async fn anomalies_for_site(pool: &PgPool, site_id: &str) -> Result<Vec<EnrichedReading>, sqlx::Error> {
    sqlx::query_as::<_, EnrichedReading>(
        r#"
        SELECT
            site_id,
            ts,
            energy_generated_kwh,
            energy_consumed_kwh,
            net_energy_kwh,
            anomaly
        FROM energy_site_data
        WHERE site_id = $1
          AND anomaly = TRUE
        ORDER BY ts
        "#,
    )
    .bind(site_id)
    .fetch_all(pool)
    .await
}

/// Cross-site scan for readings that consumed more than they generated.
pub async fn net_negative_energy(pool: &PgPool) -> Result<Vec<EnrichedReading>, sqlx::Error> {
    // TODO: keyset pagination on (site_id, ts) once this outgrows one response.
    sqlx::query_as::<_, EnrichedReading>(
        r#"
        SELECT
            site_id,
            ts,
            energy_generated_kwh,
            energy_consumed_kwh,
            net_energy_kwh,
            anomaly
        FROM energy_site_data
        WHERE net_energy_kwh < 0
        ORDER BY site_id, ts
        "#,
    )
    .fetch_all(pool)
    .await
}
