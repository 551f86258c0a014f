use rolegate_core::engine::ResolveError;
use rolegate_storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("resolution error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ApiError {
    /// Outages and timeouts, as opposed to bad input or corrupt data.
    pub fn is_infrastructure(&self) -> bool {
        match self {
            ApiError::Resolve(e) => e.is_infrastructure(),
            ApiError::Storage(e) => matches!(
                e,
                StorageError::Unavailable(_) | StorageError::Internal(_)
            ),
        }
    }
}
