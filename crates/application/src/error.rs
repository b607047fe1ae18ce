use domain::{DomainError, RepositoryError};
use thiserror::Error;

/// 应用层错误分类
///
/// 只有持久化失败会阻断操作；缓存和广播的失败在各调用点
/// 被吞掉并记录日志，不会出现在这里。
#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("receiver not found: {0}")]
    ReceiverNotFound(String),
    #[error("malformed input: {0}")]
    MalformedInput(String),
    #[error("persist failed: {0}")]
    PersistFailed(#[from] RepositoryError),
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl ApplicationError {
    pub fn malformed(message: impl Into<String>) -> Self {
        ApplicationError::MalformedInput(message.into())
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        ApplicationError::Infrastructure(message.into())
    }
}
