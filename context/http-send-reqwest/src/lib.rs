//! HTTP transport implementation backed by `reqwest`.

use async_trait::async_trait;
use blobway_core::{Error, HttpSend, Result};
use bytes::Bytes;
use http_body_util::BodyExt;
use reqwest::{Client, Request};
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// ReqwestHttpSend sends requests with a shared `reqwest::Client`.
///
/// The configured timeout is applied to every request and reported through
/// [`HttpSend::timeout`] so the facade can copy it into its retry policy.
#[derive(Debug)]
pub struct ReqwestHttpSend {
    client: Client,
    timeout: Duration,
}

impl Default for ReqwestHttpSend {
    fn default() -> Self {
        Self::new(Client::new(), DEFAULT_TIMEOUT)
    }
}

impl ReqwestHttpSend {
    /// Create a new ReqwestHttpSend with a reqwest::Client and a per-request timeout.
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl HttpSend for ReqwestHttpSend {
    async fn http_send(&self, req: http::Request<Bytes>) -> Result<http::Response<Bytes>> {
        let mut req = Request::try_from(req)
            .map_err(|e| Error::request_invalid("request is rejected by reqwest").with_source(e))?;
        *req.timeout_mut() = Some(self.timeout);

        let resp: http::Response<_> = self
            .client
            .execute(req)
            .await
            .map_err(|e| Error::unexpected("http send failed").with_source(e))?
            .into();

        let (parts, body) = resp.into_parts();
        let bs = BodyExt::collect(body)
            .await
            .map(|buf| buf.to_bytes())
            .map_err(|e| Error::unexpected("reading response body failed").with_source(e))?;
        Ok(http::Response::from_parts(parts, bs))
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}
