use energy_client::{db::energy_site_queries, domain::EnrichedReading};
use sqlx::postgres::PgPool;
use time::OffsetDateTime;

use crate::pipeline::{ReadingStore, StoreError};

/// `ReadingStore` over the `energy_site_data` table (see `sql/schema`).
#[derive(Clone)]
pub struct PgReadingStore {
    pool: PgPool,
}

impl PgReadingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn is_transient_sqlstate(code: &str) -> bool {
    // 08: connection exception, 53: insufficient resources,
    // 57P0x: server shutting down / not accepting connections,
    // 40001 / 40P01: serialization failure, deadlock.
    code.starts_with("08") || code.starts_with("53") || code.starts_with("57P0") || code == "40001" || code == "40P01"
}

/// Maps driver errors onto the store taxonomy.
pub fn classify_sqlx(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StoreError::Transient(err.to_string()),
        sqlx::Error::Database(db) => {
            let code = db.code().map(|c| c.into_owned()).unwrap_or_default();
            if is_transient_sqlstate(&code) {
                StoreError::Transient(format!("{} (sqlstate {code})", db.message()))
            } else {
                StoreError::Fatal(format!("{} (sqlstate {code})", db.message()))
            }
        }
        other => StoreError::Unexpected(other.to_string()),
    }
}

#[async_trait::async_trait]
impl ReadingStore for PgReadingStore {
    async fn upsert(&self, r: &EnrichedReading) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO energy_site_data
                (site_id, ts, energy_generated_kwh, energy_consumed_kwh, net_energy_kwh, anomaly)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (site_id, ts) DO UPDATE SET
                energy_generated_kwh = EXCLUDED.energy_generated_kwh,
                energy_consumed_kwh  = EXCLUDED.energy_consumed_kwh,
                net_energy_kwh       = EXCLUDED.net_energy_kwh,
                anomaly              = EXCLUDED.anomaly
            "#,
        )
        .bind(&r.site_id)
        .bind(r.timestamp)
        .bind(r.energy_generated_kwh)
        .bind(r.energy_consumed_kwh)
        .bind(r.net_energy_kwh)
        .bind(r.anomaly)
        .execute(&self.pool)
        .await
        .map(|_| ())
        .map_err(classify_sqlx)
    }

    async fn query_range(
        &self,
        site_id: &str,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<EnrichedReading>, StoreError> {
        energy_site_queries::records_in_range(&self.pool, site_id, start, end)
            .await
            .map_err(classify_sqlx)
    }

    async fn query_anomalies(&self, site_id: &str) -> Result<Vec<EnrichedReading>, StoreError> {
        energy_site_queries::anomalies_for_site(&self.pool, site_id)
            .await
            .map_err(classify_sqlx)
    }

    async fn scan_net_negative(&self) -> Result<Vec<EnrichedReading>, StoreError> {
        energy_site_queries::net_negative_energy(&self.pool)
            .await
            .map_err(classify_sqlx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_and_io_errors_are_transient() {
        assert!(matches!(classify_sqlx(sqlx::Error::PoolTimedOut), StoreError::Transient(_)));
        assert!(matches!(classify_sqlx(sqlx::Error::PoolClosed), StoreError::Transient(_)));
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        assert!(matches!(classify_sqlx(sqlx::Error::Io(io)), StoreError::Transient(_)));
    }

    #[test]
    fn decode_problems_are_unexpected() {
        assert!(matches!(classify_sqlx(sqlx::Error::RowNotFound), StoreError::Unexpected(_)));
        assert!(matches!(
            classify_sqlx(sqlx::Error::ColumnNotFound("net_energy_kwh".to_string())),
            StoreError::Unexpected(_)
        ));
    }

    #[test]
    fn sqlstate_classes() {
        assert!(is_transient_sqlstate("08006"));
        assert!(is_transient_sqlstate("53300"));
        assert!(is_transient_sqlstate("57P03"));
        assert!(is_transient_sqlstate("40001"));
        assert!(!is_transient_sqlstate("23505"));
        assert!(!is_transient_sqlstate("22P02"));
        assert!(!is_transient_sqlstate(""));
    }
}
