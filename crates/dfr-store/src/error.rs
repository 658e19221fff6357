use crate::jsonl::JsonlError;
use dfr_kernel::SystemError;

/// Errors raised by report and audit stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Jsonl(#[from] JsonlError),

    #[error("store lock busy: {lock_path}")]
    LockBusy { lock_path: String },

    #[error("failed to acquire store lock {lock_path}: {message}")]
    LockIo { lock_path: String, message: String },

    #[error("store task failed: {0}")]
    Task(String),
}

impl From<StoreError> for SystemError {
    fn from(err: StoreError) -> Self {
        SystemError::Persistence(err.to_string())
    }
}
