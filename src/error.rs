use crate::config::ConfigError;
use thiserror::Error;

/// Errors raised while assembling an [`AppContext`](crate::AppContext).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("application context requires a materialized configuration")]
    MissingConfig,
}
