//! Request executors the browser drives: an in-process application or a
//! real HTTP client.

pub mod app;
#[cfg(feature = "http")]
pub mod http;
pub mod robots;

use crate::errors::{BrowserError, Result};
use crate::types::{Request, Response};
use async_trait::async_trait;

pub use app::{AppResponse, AppTransport, Application, Environ};
#[cfg(feature = "http")]
pub use http::HttpTransport;
pub use robots::{RobotsCache, RobotsRules};

/// Per-request switches the browser passes down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOptions {
    /// When false the application is asked to let its errors propagate.
    pub handle_errors: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            handle_errors: true,
        }
    }
}

/// Executes one request. Redirects are returned as-is; the browser follows
/// them.
#[async_trait(?Send)]
pub trait Transport {
    async fn send(&self, request: &Request, options: RequestOptions) -> Result<Response>;
}

/// True when `host` is one of `allowed` or a subdomain of one.
pub fn host_allowed(host: &str, allowed: &[&str]) -> bool {
    let host = host.to_lowercase();
    allowed
        .iter()
        .any(|a| host == *a || host.ends_with(&format!(".{}", a)))
}

pub(crate) fn check_host(request: &Request, allowed: &[&str]) -> Result<()> {
    let host = request.url.host_str().unwrap_or_default();
    if host_allowed(host, allowed) {
        Ok(())
    } else {
        Err(BrowserError::HostNotAllowed(request.url.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_allowed() {
        let allowed = ["localhost", "example.com"];
        assert!(host_allowed("localhost", &allowed));
        assert!(host_allowed("www.Example.com", &allowed));
        assert!(!host_allowed("example.com.evil.org", &allowed));
        assert!(!host_allowed("notexample.com", &allowed));
    }
}
