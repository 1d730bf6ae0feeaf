//! Raw text fetching for the loader's text tier.

use futures::future::{FutureExt, LocalBoxFuture};
use std::cell::RefCell;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} for URL: {url}")]
    Status { status: u16, url: String },

    #[error("No content available for URL: {0}")]
    NotFound(String),
}

pub trait TextFetcher {
    fn fetch_text(&self, url: &str) -> LocalBoxFuture<'static, Result<String, FetchError>>;
}

/// Fetches over HTTP(S) with `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("live-render-native/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl TextFetcher for ReqwestFetcher {
    fn fetch_text(&self, url: &str) -> LocalBoxFuture<'static, Result<String, FetchError>> {
        let client = self.client.clone();
        let url = url.to_string();
        async move {
            let response = client.get(&url).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status {
                    status: status.as_u16(),
                    url,
                });
            }
            Ok(response.text().await?)
        }
        .boxed_local()
    }
}

/// Serves fixed bodies from memory; for hosts that preload dependency text
/// and for tests.
#[derive(Debug, Default)]
pub struct StaticFetcher {
    bodies: HashMap<String, String>,
    requests: RefCell<Vec<String>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(mut self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.bodies.insert(url.into(), body.into());
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.borrow().clone()
    }
}

impl TextFetcher for StaticFetcher {
    fn fetch_text(&self, url: &str) -> LocalBoxFuture<'static, Result<String, FetchError>> {
        self.requests.borrow_mut().push(url.to_string());
        let result = self
            .bodies
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(url.to_string()));
        futures::future::ready(result).boxed_local()
    }
}
