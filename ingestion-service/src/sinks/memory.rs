use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicUsize, Ordering},
};

use energy_client::domain::{EnrichedReading, SiteKey};
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::pipeline::{ReadingStore, StoreError};

/// Ordered in-process store with the same keyed semantics as the SQL table.
#[derive(Default)]
pub struct InMemoryReadingStore {
    items: RwLock<BTreeMap<SiteKey, EnrichedReading>>,
    writes: AtomicUsize,
}

impl InMemoryReadingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `upsert` calls, including overwrites.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }

    pub async fn get(&self, key: &SiteKey) -> Option<EnrichedReading> {
        self.items.read().await.get(key).cloned()
    }

    pub async fn snapshot(&self) -> Vec<EnrichedReading> {
        self.items.read().await.values().cloned().collect()
    }
}

#[async_trait::async_trait]
impl ReadingStore for InMemoryReadingStore {
    async fn upsert(&self, reading: &EnrichedReading) -> Result<(), StoreError> {
        self.items.write().await.insert(reading.key(), reading.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn query_range(
        &self,
        site_id: &str,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<EnrichedReading>, StoreError> {
        if start > end {
            return Ok(Vec::new());
        }
        let lo = SiteKey {
            site_id: site_id.to_string(),
            timestamp: start,
        };
        let hi = SiteKey {
            site_id: site_id.to_string(),
            timestamp: end,
        };

        let items = self.items.read().await;
        Ok(items.range(lo..=hi).map(|(_, v)| v.clone()).collect())
    }

    async fn query_anomalies(&self, site_id: &str) -> Result<Vec<EnrichedReading>, StoreError> {
        let items = self.items.read().await;
        Ok(items
            .values()
            .filter(|r| r.site_id == site_id && r.anomaly)
            .cloned()
            .collect())
    }

    async fn scan_net_negative(&self) -> Result<Vec<EnrichedReading>, StoreError> {
        let items = self.items.read().await;
        Ok(items.values().filter(|r| r.net_energy_kwh < 0.0).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::enrich;
    use energy_client::domain::Reading;
    use time::macros::datetime;

    fn enriched(site: &str, ts: OffsetDateTime, generated: f64, consumed: f64) -> EnrichedReading {
        enrich(Reading {
            site_id: site.to_string(),
            timestamp: ts,
            energy_generated_kwh: generated,
            energy_consumed_kwh: consumed,
        })
    }

    #[tokio::test]
    async fn upserting_twice_leaves_one_identical_item() {
        let store = InMemoryReadingStore::new();
        let r = enriched("site_id001", datetime!(2025-01-01 00:00:00 UTC), -5.0, 10.0);

        store.upsert(&r).await.unwrap();
        let first = store.snapshot().await;
        store.upsert(&r).await.unwrap();

        assert_eq!(store.snapshot().await, first);
        assert_eq!(store.len().await, 1);
        assert_eq!(store.writes(), 2);
    }

    #[tokio::test]
    async fn later_write_with_same_key_overwrites() {
        let store = InMemoryReadingStore::new();
        let ts = datetime!(2025-01-01 00:00:00 UTC);
        store.upsert(&enriched("s", ts, 1.0, 2.0)).await.unwrap();
        store.upsert(&enriched("s", ts, 9.0, 2.0)).await.unwrap();

        let key = SiteKey::new("s", ts).unwrap();
        assert_eq!(store.get(&key).await.unwrap().net_energy_kwh, 7.0);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn range_is_inclusive_and_scoped_to_site() {
        let store = InMemoryReadingStore::new();
        for (site, hour) in [("a", 0), ("a", 1), ("a", 2), ("b", 1)] {
            let ts = datetime!(2025-01-01 00:00:00 UTC) + time::Duration::hours(hour);
            store.upsert(&enriched(site, ts, 1.0, 1.0)).await.unwrap();
        }

        let got = store
            .query_range("a", datetime!(2025-01-01 00:00:00 UTC), datetime!(2025-01-01 01:00:00 UTC))
            .await
            .unwrap();
        assert_eq!(got.len(), 2);
        assert!(got.iter().all(|r| r.site_id == "a"));
        assert!(got[0].timestamp < got[1].timestamp);

        let reversed = store
            .query_range("a", datetime!(2025-01-02 00:00:00 UTC), datetime!(2025-01-01 00:00:00 UTC))
            .await
            .unwrap();
        assert!(reversed.is_empty());
    }

    #[tokio::test]
    async fn filters_anomalies_and_negative_net() {
        let store = InMemoryReadingStore::new();
        store
            .upsert(&enriched("a", datetime!(2025-01-01 00:00:00 UTC), -5.0, 10.0))
            .await
            .unwrap();
        store
            .upsert(&enriched("a", datetime!(2025-01-01 01:00:00 UTC), 50.0, 20.0))
            .await
            .unwrap();
        store
            .upsert(&enriched("b", datetime!(2025-01-01 00:00:00 UTC), 1.0, 3.0))
            .await
            .unwrap();

        assert_eq!(store.query_anomalies("a").await.unwrap().len(), 1);
        assert!(store.query_anomalies("b").await.unwrap().is_empty());
        assert!(store.query_anomalies("unknown").await.unwrap().is_empty());

        let negative = store.scan_net_negative().await.unwrap();
        assert_eq!(negative.len(), 2);
        assert!(negative.iter().all(|r| r.net_energy_kwh < 0.0));
    }
}
