pub mod alerts;
pub mod memory;
pub mod postgres;
pub mod store_writer;

pub use alerts::{AlertDispatcher, TracingAlertPublisher, WebhookAlertPublisher, DEFAULT_ALERT_SUBJECT};
pub use memory::InMemoryReadingStore;
pub use postgres::PgReadingStore;
pub use store_writer::StoreWriter;
