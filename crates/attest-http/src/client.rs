//! Client for the assertions API.

use std::sync::Arc;

use reqwest::StatusCode;
use tracing::debug;

use attest_core::{Assertion, Decoder, TypeRegistry};

use crate::error::{HttpError, Result};
use crate::server::ASSERTIONS_COUNT_HEADER;

/// HTTP client submitting and fetching assertions.
pub struct AssertClient {
    base_url: String,
    registry: Arc<TypeRegistry>,
    http: reqwest::Client,
}

impl AssertClient {
    pub fn new(base_url: impl Into<String>, registry: Arc<TypeRegistry>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            registry,
            http: reqwest::Client::new(),
        }
    }

    /// Submit one encoded assertion.
    pub async fn submit(&self, encoded: Vec<u8>) -> Result<()> {
        let response = self
            .http
            .post(format!("{}/assertions", self.base_url))
            .body(encoded)
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    /// Fetch all assertions of a type matching the header filters.
    ///
    /// The response carries the expected bundle size in a header; a
    /// mismatch with the decoded bundle is an error.
    pub async fn assertions(
        &self,
        assert_type: &str,
        filters: &[(String, String)],
    ) -> Result<Vec<Assertion>> {
        let response = self
            .http
            .get(format!("{}/assertions/{}", self.base_url, assert_type))
            .query(filters)
            .send()
            .await?;

        let response = Self::check_status(response).await?;
        let expected: usize = response
            .headers()
            .get(ASSERTIONS_COUNT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .ok_or(HttpError::InvalidCount)?;
        let body = response.bytes().await?;

        let mut found = Vec::new();
        let mut decoder = Decoder::new(&body[..], &self.registry);
        while let Some(assertion) = decoder.decode()? {
            found.push(assertion);
        }
        if found.len() != expected {
            debug!(expected, got = found.len(), "bundle count mismatch");
            return Err(HttpError::CountMismatch);
        }
        Ok(found)
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status == StatusCode::OK {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(HttpError::Api {
            status: status.as_u16(),
            message,
        })
    }
}
