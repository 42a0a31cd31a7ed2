use time::OffsetDateTime;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("site_id must not be empty")]
    EmptySiteId,
}

/// Unique key of a stored reading.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SiteKey {
    pub site_id: String,
    pub timestamp: OffsetDateTime,
}

impl SiteKey {
    pub fn new(site_id: impl Into<String>, timestamp: OffsetDateTime) -> Result<Self, DomainError> {
        let site_id = site_id.into();
        if site_id.is_empty() {
            return Err(DomainError::EmptySiteId);
        }
        Ok(Self { site_id, timestamp })
    }
}

/// One raw telemetry record for a site at an instant, as it arrives in a batch file.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Reading {
    pub site_id: String,
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
    pub energy_generated_kwh: f64,
    pub energy_consumed_kwh: f64,
}

impl Reading {
    pub fn key(&self) -> SiteKey {
        SiteKey {
            site_id: self.site_id.clone(),
            timestamp: self.timestamp,
        }
    }
}

/// A reading with its derived metrics, as persisted in `energy_site_data`.
///
/// `net_energy_kwh` and `anomaly` are only ever produced from the two raw
/// energy fields; callers build this type through the metric computer rather
/// than setting them by hand.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EnrichedReading {
    pub site_id: String,
    #[sqlx(rename = "ts")]
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
    pub energy_generated_kwh: f64,
    pub energy_consumed_kwh: f64,
    pub net_energy_kwh: f64,
    pub anomaly: bool,
}

impl EnrichedReading {
    pub fn key(&self) -> SiteKey {
        SiteKey {
            site_id: self.site_id.clone(),
            timestamp: self.timestamp,
        }
    }
}
