pub mod batch_parser;
pub mod object_fetch;
pub mod s3_event;

pub use batch_parser::parse_batch;
pub use object_fetch::{ObjectBackend, ObjectStoreFetcher};
pub use s3_event::{trigger_router, S3EventNotification};
