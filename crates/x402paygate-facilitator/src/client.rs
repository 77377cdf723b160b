//! A client for a remote x402 facilitator.
//!
//! This client handles the `/verify` and `/settle` endpoints of a remote
//! facilitator. Unlike a plain HTTP wrapper, [`FacilitatorClient::verify`]
//! and [`FacilitatorClient::settle`] never return a transport-level
//! `Result` to the caller: a network failure, timeout, or malformed
//! response is folded into the same structured outcome a rejected payment
//! would produce (`isValid: false` / `success: false`), so the proxy
//! pipeline always has a single shape to act on.
//!
//! This client is cheap to clone and internally shares a connection pool
//! via `reqwest::Client`, making it safe and efficient to reuse across
//! concurrent requests.

use reqwest::Client;
use std::time::Duration;
use url::Url;

use x402paygate_types::proto::{
    FacilitatorRequest, PaymentPayload, PaymentRequirements, SettleResponse, VerifyResponse,
    X402Version2,
};

/// Errors that can occur while constructing a [`FacilitatorClient`].
///
/// These are boot-time concerns (an unparsable base URL) -- the only
/// error shapes a caller should ever see while handling a request are
/// [`VerifyResponse`] and [`SettleResponse`] themselves.
#[derive(Debug, thiserror::Error)]
pub enum FacilitatorClientError {
    #[error("failed to construct {context} url: {source}")]
    UrlParse {
        context: &'static str,
        #[source]
        source: url::ParseError,
    },
}

#[derive(Clone, Debug)]
pub struct FacilitatorClient {
    base_url: Url,
    verify_url: Url,
    settle_url: Url,
    client: Client,
    timeout: Option<Duration>,
}

impl FacilitatorClient {
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Constructs a new [`FacilitatorClient`] from a base URL, setting up
    /// `./verify` and `./settle` endpoint URLs relative to it.
    pub fn try_new(base_url: Url) -> Result<Self, FacilitatorClientError> {
        let verify_url = base_url
            .join("./verify")
            .map_err(|e| FacilitatorClientError::UrlParse {
                context: "verify",
                source: e,
            })?;
        let settle_url = base_url
            .join("./settle")
            .map_err(|e| FacilitatorClientError::UrlParse {
                context: "settle",
                source: e,
            })?;
        Ok(Self {
            client: Client::new(),
            base_url,
            verify_url,
            settle_url,
            timeout: None,
        })
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let mut this = self.clone();
        this.timeout = Some(timeout);
        this
    }

    /// Asks the facilitator to verify a payment payload against a
    /// requirement. Never fails upward: any transport or parse error is
    /// reported as `isValid: false`.
    #[tracing::instrument(skip_all, fields(network = %requirements.network))]
    pub async fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> VerifyResponse {
        let body = FacilitatorRequest {
            x402_version: X402Version2,
            payment_payload: payload,
            payment_requirements: requirements,
        };
        match self.post_json::<_, VerifyResponse>(&self.verify_url, &body).await {
            Ok(response) => response,
            Err(reason) => {
                tracing::warn!(error = %reason, "facilitator verify failed");
                VerifyResponse {
                    is_valid: false,
                    invalid_reason: Some(reason),
                    payer: None,
                }
            }
        }
    }

    /// Asks the facilitator to settle a previously verified payment. Never
    /// fails upward: any transport or parse error is reported as
    /// `success: false`.
    #[tracing::instrument(skip_all, fields(network = %requirements.network))]
    pub async fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> SettleResponse {
        let body = FacilitatorRequest {
            x402_version: X402Version2,
            payment_payload: payload,
            payment_requirements: requirements,
        };
        match self.post_json::<_, SettleResponse>(&self.settle_url, &body).await {
            Ok(response) => response,
            Err(reason) => {
                tracing::warn!(error = %reason, "facilitator settle failed");
                SettleResponse {
                    success: false,
                    transaction: None,
                    error_reason: Some(reason),
                }
            }
        }
    }

    async fn post_json<T, R>(&self, url: &Url, payload: &T) -> Result<R, String>
    where
        T: serde::Serialize + ?Sized,
        R: serde::de::DeserializeOwned,
    {
        let mut req = self.client.post(url.clone()).json(payload);
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let response = req.send().await.map_err(|e| e.to_string())?;
        let status = response.status();
        if status.is_success() {
            response.json::<R>().await.map_err(|e| e.to_string())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(format!("facilitator returned {status}: {body}"))
        }
    }
}

impl TryFrom<&str> for FacilitatorClient {
    type Error = FacilitatorClientError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let mut normalized = value.trim_end_matches('/').to_string();
        normalized.push('/');
        let url = Url::parse(&normalized).map_err(|e| FacilitatorClientError::UrlParse {
            context: "base",
            source: e,
        })?;
        FacilitatorClient::try_new(url)
    }
}
