mod reading;

pub use reading::{DomainError, EnrichedReading, Reading, SiteKey};
