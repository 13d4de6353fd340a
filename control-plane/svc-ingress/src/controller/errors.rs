use tracing::error;

use super::builder::BuildError;
use super::client::ApiError;
use super::key::KeyError;
use super::store::CacheError;

/// Failure of one sync attempt. Every variant is retried by the worker
/// pool until the retry bound is exhausted.
#[derive(thiserror::Error, Debug)]
pub enum ReconcileErr {
    #[error("invalid key: {0}")]
    Key(#[from] KeyError),
    #[error("cache lookup failed: {0}")]
    Cache(#[from] CacheError),
    #[error("cannot build ingress: {0}")]
    Build(#[from] BuildError),
    #[error("remote call failed: {0}")]
    Api(#[from] ApiError),
}

/// Process-wide sink for errors nobody upstream can act on.
pub fn report_error(context: &str, err: &dyn std::error::Error) {
    error!(error = %err, "{context}");
}
