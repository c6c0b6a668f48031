use thiserror::Error;

/// Failure of a lookup against the host product store.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog unavailable: {message}")]
    Unavailable { message: String },
}

impl CatalogError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}
