//! Error taxonomy for the request pipeline.
//!
//! Every variant degrades to "serve something correct": configuration errors
//! abort startup, everything else is recovered inside the pipeline.

use thiserror::Error;

pub use crate::config::ConfigError;

/// Failure talking to the cache store. Recovered as a MISS.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt cache entry for `{key}`: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Failure enqueueing a revalidation job. Logged, the job is dropped.
#[derive(Debug, Clone, Error)]
pub enum QueueDeliveryError {
    #[error("shard {0} is out of range")]
    UnknownShard(u32),

    #[error("queue closed")]
    Closed,

    #[error("broker rejected job: {0}")]
    Rejected(String),
}

/// Failure inside user middleware. Answered with the error page.
#[derive(Debug, Clone, Error)]
pub enum MiddlewareError {
    #[error("middleware failed: {0}")]
    Execution(String),

    #[error("middleware returned an invalid rewrite `{0}`")]
    InvalidRewrite(String),

    #[error("middleware timed out")]
    Timeout,
}

/// Destination template could not be instantiated. The literal destination is used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RewriteDestinationError {
    #[error("destination references unknown param `{0}`")]
    UnknownParam(String),

    #[error("destination `{0}` is not a valid URL")]
    InvalidUrl(String),
}

/// Failure from the page renderer.
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    #[error("renderer unreachable: {0}")]
    Upstream(String),

    #[error("renderer timed out")]
    Timeout,

    #[error("invalid render request: {0}")]
    InvalidRequest(String),
}

/// Failure proxying an external rewrite.
#[derive(Debug, Clone, Error)]
pub enum ProxyError {
    #[error("external request failed: {0}")]
    Request(String),

    #[error("invalid external destination `{0}`")]
    InvalidUrl(String),
}

/// Any stage failure that sends the request down the synthetic error path.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Middleware(#[from] MiddlewareError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Proxy(#[from] ProxyError),
}
