//! The origin executor collaborator boundary (§6) and the body type shared
//! across the origin call and the reconstructed-response path.

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use thiserror::Error;

use crate::error::Result;

/// The error type carried by [`CoreBody`] chunks; any failure while reading
/// an origin body surfaces as one of these, independent of the origin
/// executor's own transport error.
#[derive(Debug, Error)]
#[error("body stream error: {0}")]
pub struct BodyError(#[from] pub Box<dyn std::error::Error + Send + Sync>);

/// The universal streaming body type used for origin requests/responses and
/// for the reconstructed response produced when the
/// [Size-Limited Body Reader](crate::body) hits its cap. `http_body_util`'s
/// boxed combinator, matching the teacher crate's dependency on the same
/// `http-body`/`http-body-util` pair.
pub type CoreBody = BoxBody<Bytes, BodyError>;

/// Executes one request against the origin. Implementations are the
/// network/transport boundary; this crate makes no assumption about what
/// sits behind it (HTTP/1.1 client, HTTP/2, a test double).
///
/// Called at most once per logical request except for the single
/// unconditional retry the orchestrator may issue per §4.12.
#[async_trait]
pub trait OriginExecutor: Send + Sync + 'static {
    /// Sends `request` to the origin and returns its response.
    async fn execute(&self, request: http::Request<CoreBody>) -> Result<http::Response<CoreBody>>;
}

/// Builds an empty [`CoreBody`], used for requests with no entity (GET,
/// conditional revalidation requests, etc).
pub fn empty_body() -> CoreBody {
    use http_body_util::{BodyExt, Empty};
    Empty::<Bytes>::new().map_err(|never| match never {}).boxed()
}

/// Builds a [`CoreBody`] from a fully-buffered byte slice.
pub fn full_body(bytes: Bytes) -> CoreBody {
    use http_body_util::{BodyExt, Full};
    Full::new(bytes).map_err(|never| match never {}).boxed()
}
