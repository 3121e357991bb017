//! Request, response and response-error hooks.

use std::sync::Arc;

use http::StatusCode;

use crate::error::{BoxError, Error, Result};
use crate::request::Request;
use crate::response::Response;

/// Runs before the request is sent; an error aborts the call.
pub type RequestMiddleware = Arc<dyn Fn(&mut Request) -> std::result::Result<(), BoxError> + Send + Sync>;

/// Runs on each successful response; an error is returned with the response.
pub type ResponseMiddleware = Arc<dyn Fn(&mut Response) -> std::result::Result<(), BoxError> + Send + Sync>;

/// Observes network failures; cannot alter the outcome.
pub type ResponseErrorMiddleware = Arc<dyn Fn(&Request, &Error) + Send + Sync>;

/// Validates the final status code.
pub type StatusValidator = Arc<dyn Fn(StatusCode) -> std::result::Result<(), BoxError> + Send + Sync>;

/// Ordered hook lists of a client configuration.
#[derive(Clone, Default)]
pub struct Middleware {
    pub(crate) request: Vec<RequestMiddleware>,
    pub(crate) response: Vec<ResponseMiddleware>,
    pub(crate) response_error: Vec<ResponseErrorMiddleware>,
}

impl Middleware {
    pub fn is_empty(&self) -> bool {
        self.request.is_empty() && self.response.is_empty() && self.response_error.is_empty()
    }

    /// Registration order; the first failure stops the chain.
    pub(crate) fn apply_request(&self, request: &mut Request) -> Result<()> {
        for hook in &self.request {
            hook(request).map_err(Error::RequestMiddleware)?;
        }
        Ok(())
    }

    /// Registration order; a failure hands back the response built so far.
    pub(crate) fn apply_response(&self, mut response: Response) -> Result<Response> {
        for hook in &self.response {
            if let Err(source) = hook(&mut response) {
                return Err(Error::ResponseMiddleware {
                    response: Box::new(response),
                    source,
                });
            }
        }
        Ok(response)
    }

    pub(crate) fn notify_error(&self, request: &Request, error: &Error) {
        for hook in &self.response_error {
            hook(request, error);
        }
    }
}

impl std::fmt::Debug for Middleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Middleware")
            .field("request", &self.request.len())
            .field("response", &self.response.len())
            .field("response_error", &self.response_error.len())
            .finish()
    }
}
