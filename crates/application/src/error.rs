use std::time::Duration;

use domain::{DomainError, RepositoryError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
}

impl ApplicationError {
    /// 是否属于调用方输入错误
    pub fn is_validation(&self) -> bool {
        matches!(self, ApplicationError::Domain(_))
    }
}
