//! JWNET API client: the domain operations exposed to callers.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::ApiError;
use crate::http::Dispatcher;
use crate::retry::{RetryPolicy, with_retry};
use crate::types::{
    InquiryRequest, InquiryResponse, ManifestRegisterRequest, ManifestRegisterResponse,
    ReservationRequest, ReservationResponse,
};

pub const REGISTER_PATH: &str = "/manifest/register";
pub const RESERVATION_PATH: &str = "/reservation/create";
pub const INQUIRY_PATH: &str = "/manifest/inquiry";
pub const HEALTH_PATH: &str = "/health";

/// Operations offered by the JWNET network.
///
/// Registration and reservation are not idempotent. When `cancel` fires while
/// a request is in flight, the call fails with
/// [`ErrorKind::Cancelled`](crate::error::ErrorKind::Cancelled) and the
/// upstream effect must be treated as unknown.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ManifestApi: Send + Sync {
    async fn register_manifest(
        &self,
        request: &ManifestRegisterRequest,
        cancel: &CancellationToken,
    ) -> Result<ManifestRegisterResponse, ApiError>;

    async fn reserve_numbers(
        &self,
        request: &ReservationRequest,
        cancel: &CancellationToken,
    ) -> Result<ReservationResponse, ApiError>;

    async fn inquire_manifest(
        &self,
        request: &InquiryRequest,
        cancel: &CancellationToken,
    ) -> Result<InquiryResponse, ApiError>;

    /// Checks that the API is reachable. Failures are logged, never returned.
    async fn test_connection(&self) -> bool;
}

/// HTTP implementation of [`ManifestApi`].
#[derive(Clone)]
pub struct JwnetClient {
    dispatcher: Dispatcher,
    policy: RetryPolicy,
    extra_headers: HeaderMap,
}

impl JwnetClient {
    #[tracing::instrument(skip(config))]
    pub fn new(config: Config) -> Result<Self, ApiError> {
        let client = Client::builder()
            .user_agent(concat!("jwnet-client/", env!("JWNET_VERSION")))
            .build()
            .map_err(|e| ApiError::config("failed to build HTTP client").with_source(e))?;

        Self::with_http_client(client, config)
    }

    /// Uses an existing `reqwest` client, sharing its connection pool.
    pub fn with_http_client(client: Client, config: Config) -> Result<Self, ApiError> {
        let policy = config.retry_policy();
        let dispatcher = Dispatcher::new(client, Arc::new(config))?;
        Ok(Self {
            dispatcher,
            policy,
            extra_headers: HeaderMap::new(),
        })
    }

    /// Adds a header to every request. The JWNET credential headers and
    /// `Content-Type` always take precedence.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, ApiError> {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            ApiError::config(format!("invalid header name: {}", name)).with_source(e)
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| {
            ApiError::config(format!("invalid value for header {}", name)).with_source(e)
        })?;
        self.extra_headers.insert(name, value);
        Ok(self)
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn config(&self) -> &Config {
        self.dispatcher.config()
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// One logical call: POST `body` to `path`, retrying per the policy.
    async fn call<B, T>(
        &self,
        operation: &str,
        path: &str,
        body: &B,
        cancel: &CancellationToken,
    ) -> Result<T, ApiError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        debug!("{}: POST {}", operation, self.dispatcher.url(path));

        let dispatcher = &self.dispatcher;
        let headers = &self.extra_headers;
        with_retry(&self.policy, operation, cancel, move || {
            dispatcher.post_json(path, body, headers)
        })
        .await
    }
}

#[async_trait]
impl ManifestApi for JwnetClient {
    #[tracing::instrument(skip(self, request, cancel))]
    async fn register_manifest(
        &self,
        request: &ManifestRegisterRequest,
        cancel: &CancellationToken,
    ) -> Result<ManifestRegisterResponse, ApiError> {
        self.call("Registering manifest", REGISTER_PATH, request, cancel)
            .await
    }

    #[tracing::instrument(skip(self, request, cancel))]
    async fn reserve_numbers(
        &self,
        request: &ReservationRequest,
        cancel: &CancellationToken,
    ) -> Result<ReservationResponse, ApiError> {
        self.call("Reserving numbers", RESERVATION_PATH, request, cancel)
            .await
    }

    #[tracing::instrument(skip(self, request, cancel))]
    async fn inquire_manifest(
        &self,
        request: &InquiryRequest,
        cancel: &CancellationToken,
    ) -> Result<InquiryResponse, ApiError> {
        self.call("Inquiring manifest", INQUIRY_PATH, request, cancel)
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn test_connection(&self) -> bool {
        match self.dispatcher.probe(HEALTH_PATH, &self.extra_headers).await {
            Ok(status) => {
                debug!("JWNET health check answered HTTP {}", status.as_u16());
                true
            }
            Err(e) => {
                warn!("JWNET connection test failed: {}", e);
                false
            }
        }
    }
}
