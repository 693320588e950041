pub mod config;
pub mod error;
pub mod metrics_export;
pub mod observability;
pub mod pipeline;
pub mod sinks;
pub mod sources;
pub mod transform;

pub use error::ImportError;
pub use pipeline::{ImportKind, ImportReport, ImportRequest, ImportSession};
