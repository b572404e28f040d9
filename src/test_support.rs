//! A scriptable [`OriginExecutor`] double used by this crate's own tests and
//! doctests, in the manner of the teacher's mock-server-backed test suite
//! but without a real network stack, since none is in scope here.

use async_trait::async_trait;
use std::sync::Mutex;

use crate::error::{CacheCoreError, Result};
use crate::headers::HeaderList;
use crate::origin::{empty_body, full_body, CoreBody, OriginExecutor};

/// One canned response (or transport error) the [`ScriptedOrigin`] will hand
/// back in order.
#[derive(Debug)]
pub enum ScriptedOutcome {
    /// Hand back a successful response.
    Response {
        /// The response status.
        status: http::StatusCode,
        /// The response headers.
        headers: HeaderList,
        /// The response body.
        body: Vec<u8>,
    },
    /// Fail the call with an origin I/O error carrying this message.
    IoError(String),
}

/// An `OriginExecutor` that returns a queue of pre-scripted responses,
/// recording every request it was asked to execute for assertions.
#[derive(Debug)]
pub struct ScriptedOrigin {
    queue: Mutex<Vec<ScriptedOutcome>>,
    requests_seen: Mutex<Vec<http::Request<()>>>,
}

impl ScriptedOrigin {
    /// Builds a scripted origin that hands back `outcomes` in order.
    pub fn new(outcomes: Vec<ScriptedOutcome>) -> Self {
        Self { queue: Mutex::new(outcomes), requests_seen: Mutex::new(Vec::new()) }
    }

    /// The number of requests executed against this origin so far.
    pub fn requests_seen(&self) -> usize {
        self.requests_seen.lock().unwrap().len()
    }
}

#[async_trait]
impl OriginExecutor for ScriptedOrigin {
    async fn execute(&self, request: http::Request<CoreBody>) -> Result<http::Response<CoreBody>> {
        let (parts, _) = request.into_parts();
        self.requests_seen.lock().unwrap().push(http::Request::from_parts(parts, ()));

        let outcome = {
            let mut queue = self.queue.lock().unwrap();
            if queue.is_empty() {
                None
            } else {
                Some(queue.remove(0))
            }
        };

        match outcome {
            None => Err(CacheCoreError::OriginIoError("no scripted response left".into())),
            Some(ScriptedOutcome::IoError(msg)) => Err(CacheCoreError::OriginIoError(msg)),
            Some(ScriptedOutcome::Response { status, headers, body }) => {
                let mut builder = http::Response::builder().status(status);
                for h in headers.iter() {
                    builder = builder.header(h.name.as_str(), h.value.as_str());
                }
                let body = if body.is_empty() { empty_body() } else { full_body(body.into()) };
                builder.body(body).map_err(CacheCoreError::Http)
            }
        }
    }
}
