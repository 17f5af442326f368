//! Harness error type.

use etsan_core::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown scenario {0:?} (try `harness list`)")]
    UnknownScenario(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
