#[derive(thiserror::Error, Debug)]
pub enum ImportError {
    /// Missing or invalid settings (auth token, market area, timezone, dates).
    #[error("configuration error: {0}")]
    Configuration(String),
    /// ENTSO-E failed, answered with an error document or returned no data.
    #[error("external service error: {0}")]
    ExternalService(String),
    /// Input data that cannot be turned into a series (malformed mix, bad resolution).
    #[error("computation error: {0}")]
    Computation(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for ImportError {
    fn from(e: sqlx::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

pub type Result<T, E = ImportError> = std::result::Result<T, E>;
