//! Sends single HTTP attempts to the JWNET API.

use std::future::Future;
use std::sync::Arc;

use log::debug;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::classify::{
    classify_elapsed, classify_malformed, classify_status, classify_transport, classify_unread_body,
};
use crate::config::Config;
use crate::error::{ApiError, ErrorKind};

pub const API_KEY_HEADER: &str = "X-JWNET-API-Key";
pub const SUBSCRIBER_NO_HEADER: &str = "X-JWNET-Subscriber-No";
pub const PUBLIC_CONFIRM_NO_HEADER: &str = "X-JWNET-Public-Confirm-No";

/// Issues one attempt per call. Retrying is the caller's concern.
#[derive(Clone)]
pub struct Dispatcher {
    client: Client,
    config: Arc<Config>,
    standard_headers: HeaderMap,
}

impl Dispatcher {
    pub fn new(client: Client, config: Arc<Config>) -> Result<Self, ApiError> {
        let standard_headers = standard_headers(&config)?;
        Ok(Self {
            client,
            config,
            standard_headers,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_url(), path)
    }

    /// Caller headers first, then the standard headers on top so they cannot
    /// be overridden.
    fn headers(&self, extra: &HeaderMap) -> HeaderMap {
        let mut headers = extra.clone();
        for (name, value) in self.standard_headers.iter() {
            headers.insert(name.clone(), value.clone());
        }
        headers
    }

    /// POSTs `body` as JSON to `path` and decodes the 2xx body as `T`.
    #[tracing::instrument(skip(self, body, extra))]
    pub async fn post_json<B, T>(
        &self,
        path: &str,
        body: &B,
        extra: &HeaderMap,
    ) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let payload = serde_json::to_vec(body).map_err(|e| {
            ApiError::new(ErrorKind::ProtocolError, "failed to encode request body").with_source(e)
        })?;

        let url = self.url(path);
        debug!("POST {} ({} bytes)...", url, payload.len());

        let request = self
            .client
            .post(&url)
            .headers(self.headers(extra))
            .body(payload);

        let (status, body) = self.within_deadline(exchange(request)).await?;

        serde_json::from_str::<T>(&body).map_err(|e| classify_malformed(status, e, &body))
    }

    /// GETs `path`, discarding the body. Used for connectivity checks.
    #[tracing::instrument(skip(self, extra))]
    pub async fn probe(&self, path: &str, extra: &HeaderMap) -> Result<StatusCode, ApiError> {
        let url = self.url(path);
        debug!("GET {}...", url);

        let request = self.client.get(&url).headers(self.headers(extra));
        let (status, _) = self.within_deadline(exchange(request)).await?;
        Ok(status)
    }

    /// Drops `attempt` once the configured per-attempt timeout elapses, which
    /// aborts the underlying connection.
    async fn within_deadline<T>(
        &self,
        attempt: impl Future<Output = Result<T, ApiError>>,
    ) -> Result<T, ApiError> {
        let timeout = self.config.timeout();
        match tokio::time::timeout(timeout, attempt).await {
            Ok(outcome) => outcome,
            Err(_) => Err(classify_elapsed(timeout)),
        }
    }
}

/// Sends the request and reads the full body. Non-2xx statuses become errors.
async fn exchange(request: RequestBuilder) -> Result<(StatusCode, String), ApiError> {
    let response = request.send().await.map_err(classify_transport)?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| classify_unread_body(status, e))?;

    debug!("Upstream answered HTTP {} ({} bytes)", status.as_u16(), body.len());

    if !status.is_success() {
        return Err(classify_status(status, &body));
    }
    Ok((status, body))
}

fn standard_headers(config: &Config) -> Result<HeaderMap, ApiError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    let mut api_key = header_value(config.api_key(), "api_key")?;
    api_key.set_sensitive(true);
    headers.insert(HeaderName::from_static("x-jwnet-api-key"), api_key);
    headers.insert(
        HeaderName::from_static("x-jwnet-subscriber-no"),
        header_value(config.subscriber_no(), "subscriber_no")?,
    );
    headers.insert(
        HeaderName::from_static("x-jwnet-public-confirm-no"),
        header_value(config.public_confirm_no(), "public_confirm_no")?,
    );
    Ok(headers)
}

fn header_value(value: &str, setting: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(value).map_err(|e| {
        ApiError::config(format!("{} contains characters not allowed in a header", setting))
            .with_source(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigOptions;
    use crate::error::Diagnostic;
    use crate::test_utils::{refused_url, silent_upstream, test_config, truncating_upstream};
    use mockito::Matcher;
    use serde_json::{Value, json};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn dispatcher(config: Config) -> Dispatcher {
        Dispatcher::new(Client::new(), Arc::new(config)).unwrap()
    }

    #[tokio::test]
    async fn test_post_json_sends_standard_headers_and_body() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("POST", "/manifest/register")
            .match_header("content-type", "application/json")
            .match_header(API_KEY_HEADER, "test-api-key-0001")
            .match_header(SUBSCRIBER_NO_HEADER, "1234567")
            .match_header(PUBLIC_CONFIRM_NO_HEADER, "987654")
            .match_body(Matcher::Json(json!({"manifestNo": "M-1"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"result": "accepted"}"#)
            .create_async()
            .await;

        let dispatcher = dispatcher(test_config(&server.url()));
        let response: Value = dispatcher
            .post_json(
                "/manifest/register",
                &json!({"manifestNo": "M-1"}),
                &HeaderMap::new(),
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response, json!({"result": "accepted"}));
    }

    #[tokio::test]
    async fn test_caller_headers_cannot_override_standard_headers() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("POST", "/manifest/inquiry")
            .match_header(API_KEY_HEADER, "test-api-key-0001")
            .match_header("x-request-id", "req-42")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let mut extra = HeaderMap::new();
        extra.insert("x-jwnet-api-key", HeaderValue::from_static("forged"));
        extra.insert("x-request-id", HeaderValue::from_static("req-42"));

        let dispatcher = dispatcher(test_config(&server.url()));
        let _: Value = dispatcher
            .post_json("/manifest/inquiry", &json!({}), &extra)
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_client_error_carries_json_diagnostic() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("POST", "/manifest/register")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"errors": [{"field": "wasteType", "code": "E1203"}]}"#)
            .create_async()
            .await;

        let dispatcher = dispatcher(test_config(&server.url()));
        let err = dispatcher
            .post_json::<_, Value>("/manifest/register", &json!({}), &HeaderMap::new())
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert_eq!(err.kind(), ErrorKind::ClientError);
        assert_eq!(err.status(), Some(400));
        match err.diagnostic() {
            Some(Diagnostic::Json(body)) => assert_eq!(body["errors"][0]["code"], "E1203"),
            other => panic!("expected JSON diagnostic, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_server_error_carries_text_diagnostic() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("POST", "/reservation/create")
            .with_status(502)
            .with_body("Bad Gateway")
            .create_async()
            .await;

        let dispatcher = dispatcher(test_config(&server.url()));
        let err = dispatcher
            .post_json::<_, Value>("/reservation/create", &json!({}), &HeaderMap::new())
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert_eq!(err.kind(), ErrorKind::ServerError);
        assert_eq!(err.status(), Some(502));
        assert_eq!(
            err.diagnostic(),
            Some(&Diagnostic::Text("Bad Gateway".to_string()))
        );
    }

    #[tokio::test]
    async fn test_malformed_success_body() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("POST", "/manifest/inquiry")
            .with_status(200)
            .with_body("not json at all")
            .create_async()
            .await;

        let dispatcher = dispatcher(test_config(&server.url()));
        let err = dispatcher
            .post_json::<_, Value>("/manifest/inquiry", &json!({}), &HeaderMap::new())
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert_eq!(err.kind(), ErrorKind::ProtocolError);
        assert_eq!(err.status(), Some(200));
        assert_eq!(
            err.diagnostic(),
            Some(&Diagnostic::Text("not json at all".to_string()))
        );
    }

    #[tokio::test]
    async fn test_attempt_times_out() {
        let (url, accepted) = silent_upstream().await;
        let config = Config::from_options(ConfigOptions {
            timeout: Some(Duration::from_millis(100)),
            ..crate::test_utils::test_options(&url)
        })
        .unwrap();

        let err = dispatcher(config)
            .post_json::<_, Value>("/manifest/register", &json!({}), &HeaderMap::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(accepted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport() {
        let dispatcher = dispatcher(test_config(&refused_url()));
        let err = dispatcher
            .post_json::<_, Value>("/manifest/register", &json!({}), &HeaderMap::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[tokio::test]
    async fn test_truncated_success_body_is_protocol_error() {
        let (url, accepted) = truncating_upstream("HTTP/1.1 200 OK").await;

        let err = dispatcher(test_config(&url))
            .post_json::<_, Value>("/manifest/register", &json!({}), &HeaderMap::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ProtocolError);
        assert_eq!(err.status(), Some(200));
        assert!(!err.is_retryable());
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(accepted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_truncated_error_body_keeps_status() {
        for (status_line, kind, code) in [
            ("HTTP/1.1 400 Bad Request", ErrorKind::ClientError, 400),
            ("HTTP/1.1 503 Service Unavailable", ErrorKind::ServerError, 503),
        ] {
            let (url, _accepted) = truncating_upstream(status_line).await;

            let err = dispatcher(test_config(&url))
                .post_json::<_, Value>("/manifest/inquiry", &json!({}), &HeaderMap::new())
                .await
                .unwrap_err();

            assert_eq!(err.kind(), kind, "{}", status_line);
            assert_eq!(err.status(), Some(code));
            assert_eq!(err.diagnostic(), None);
        }
    }

    #[tokio::test]
    async fn test_probe() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("GET", "/health")
            .match_header(API_KEY_HEADER, "test-api-key-0001")
            .with_status(204)
            .create_async()
            .await;

        let dispatcher = dispatcher(test_config(&server.url()));
        let status = dispatcher.probe("/health", &HeaderMap::new()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[test]
    fn test_invalid_header_value_is_config_error() {
        let config = Config::from_options(ConfigOptions {
            subscriber_no: Some("123\n456".to_string()),
            ..crate::test_utils::test_options("http://localhost")
        })
        .unwrap();

        let err = Dispatcher::new(Client::new(), Arc::new(config))
            .err()
            .expect("newline must be rejected");
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}
