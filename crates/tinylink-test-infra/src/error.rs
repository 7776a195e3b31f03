use thiserror::Error;

/// Failures while bringing up a disposable backend for a test.
#[derive(Debug, Error)]
pub enum TestInfraError {
    #[error("failed to start or inspect container: {0}")]
    Container(#[from] testcontainers::TestcontainersError),

    #[error("failed to open redis connection: {0}")]
    Redis(#[from] redis::RedisError),
}

pub type Result<T> = std::result::Result<T, TestInfraError>;
