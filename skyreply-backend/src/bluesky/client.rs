//! Bluesky XRPC client
//!
//! Thin reqwest wrapper over the six endpoints the reply pipeline needs.
//! Every call except `create_session` is made with an explicit `Session`.

use super::types::{
    CreateRecordRequest, CreateRecordResponse, CreateSessionResponse, GetPostThreadResponse,
    ListNotificationsResponse, Notification, PostRecord, PostView, StrongRef, UploadBlobResponse,
    XrpcErrorBody, POST_COLLECTION,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;
use tokio::time::Instant;

/// Default PDS host
pub const DEFAULT_SERVICE: &str = "https://bsky.social";

/// XRPC error names that mean the session is unusable
const AUTH_ERROR_NAMES: &[&str] = &[
    "AuthenticationRequired",
    "ExpiredToken",
    "InvalidToken",
    "AuthMissing",
    "AccountTakedown",
];

#[derive(Debug, Clone, Error)]
pub enum FeedError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("failed to parse response: {0}")]
    Decode(String),
}

impl FeedError {
    /// True when the failure should invalidate the cached session
    pub fn is_auth(&self) -> bool {
        matches!(self, FeedError::Auth(_))
    }

    /// Classify a non-2xx XRPC response
    pub fn from_status(status: u16, body: &str) -> Self {
        let parsed: Option<XrpcErrorBody> = serde_json::from_str(body).ok();
        let name = parsed.as_ref().and_then(|b| b.error.clone()).unwrap_or_default();
        let message = parsed
            .and_then(|b| b.message)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| if name.is_empty() { body.to_string() } else { name.clone() });

        if status == 401 || AUTH_ERROR_NAMES.contains(&name.as_str()) {
            FeedError::Auth(message)
        } else if name == "NotFound" {
            FeedError::NotFound(message)
        } else {
            FeedError::Api { status, message }
        }
    }
}

/// Fixed login credentials (handle or DID plus app password)
#[derive(Clone)]
pub struct Credentials {
    pub identifier: String,
    pub password: String,
}

impl Credentials {
    pub fn new(identifier: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identifier", &self.identifier)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// An authenticated session. Validity is decided by `SessionManager`.
#[derive(Clone)]
pub struct Session {
    pub did: String,
    pub handle: String,
    pub access_jwt: String,
    pub refresh_jwt: String,
    pub issued_at: Instant,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("did", &self.did)
            .field("handle", &self.handle)
            .field("issued_at", &self.issued_at)
            .finish_non_exhaustive()
    }
}

/// The feed/identity service operations consumed by the pipeline
#[async_trait]
pub trait FeedService: Send + Sync {
    async fn create_session(&self, credentials: &Credentials) -> Result<Session, FeedError>;

    async fn list_notifications(
        &self,
        session: &Session,
        limit: u32,
    ) -> Result<Vec<Notification>, FeedError>;

    /// Fetch a post at thread depth 0. `Ok(None)` when the post is gone or hidden.
    async fn get_post_thread(
        &self,
        session: &Session,
        uri: &str,
    ) -> Result<Option<PostView>, FeedError>;

    /// Upload raw bytes, returning the opaque blob ref
    async fn upload_blob(
        &self,
        session: &Session,
        bytes: Vec<u8>,
        encoding: &str,
    ) -> Result<Value, FeedError>;

    async fn create_post(
        &self,
        session: &Session,
        record: &PostRecord,
    ) -> Result<StrongRef, FeedError>;

    async fn update_seen(&self, session: &Session, seen_at: &str) -> Result<(), FeedError>;
}

/// reqwest-backed implementation talking to `{service}/xrpc/<nsid>`
pub struct XrpcClient {
    client: reqwest::Client,
    service: String,
}

impl XrpcClient {
    pub fn new(client: reqwest::Client, service: impl Into<String>) -> Self {
        Self {
            client,
            service: service.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, nsid: &str) -> String {
        format!("{}/xrpc/{}", self.service, nsid)
    }

    /// Send a prepared request and decode a successful JSON body
    async fn send<T: DeserializeOwned>(
        &self,
        nsid: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, FeedError> {
        let body = self.send_raw(nsid, request).await?;
        serde_json::from_str(&body).map_err(|e| FeedError::Decode(format!("{}: {}", nsid, e)))
    }

    async fn send_raw(
        &self,
        nsid: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<String, FeedError> {
        let response = request
            .send()
            .await
            .map_err(|e| FeedError::Transport(format!("{}: {}", nsid, e)))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        log::debug!("Bluesky {} response ({})", nsid, status);

        if !status.is_success() {
            return Err(FeedError::from_status(status.as_u16(), &body));
        }

        Ok(body)
    }
}

#[async_trait]
impl FeedService for XrpcClient {
    async fn create_session(&self, credentials: &Credentials) -> Result<Session, FeedError> {
        let nsid = "com.atproto.server.createSession";
        let request = self.client.post(self.url(nsid)).json(&json!({
            "identifier": credentials.identifier,
            "password": credentials.password,
        }));

        // Any failure to log in leaves us without a usable session
        let data: CreateSessionResponse = self.send(nsid, request).await.map_err(|e| match e {
            FeedError::Auth(m) => FeedError::Auth(m),
            other => FeedError::Auth(other.to_string()),
        })?;

        Ok(Session {
            did: data.did,
            handle: data.handle,
            access_jwt: data.access_jwt,
            refresh_jwt: data.refresh_jwt,
            issued_at: Instant::now(),
        })
    }

    async fn list_notifications(
        &self,
        session: &Session,
        limit: u32,
    ) -> Result<Vec<Notification>, FeedError> {
        let nsid = "app.bsky.notification.listNotifications";
        let request = self
            .client
            .get(self.url(nsid))
            .bearer_auth(&session.access_jwt)
            .query(&[("limit", limit.to_string())]);

        let data: ListNotificationsResponse = self.send(nsid, request).await?;
        Ok(data.notifications)
    }

    async fn get_post_thread(
        &self,
        session: &Session,
        uri: &str,
    ) -> Result<Option<PostView>, FeedError> {
        let nsid = "app.bsky.feed.getPostThread";
        let request = self
            .client
            .get(self.url(nsid))
            .bearer_auth(&session.access_jwt)
            .query(&[("uri", uri), ("depth", "0")]);

        match self.send::<GetPostThreadResponse>(nsid, request).await {
            Ok(data) => Ok(data.thread.post),
            Err(FeedError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn upload_blob(
        &self,
        session: &Session,
        bytes: Vec<u8>,
        encoding: &str,
    ) -> Result<Value, FeedError> {
        let nsid = "com.atproto.repo.uploadBlob";
        let request = self
            .client
            .post(self.url(nsid))
            .bearer_auth(&session.access_jwt)
            .header(reqwest::header::CONTENT_TYPE, encoding)
            .body(bytes);

        let data: UploadBlobResponse = self.send(nsid, request).await?;
        Ok(data.blob)
    }

    async fn create_post(
        &self,
        session: &Session,
        record: &PostRecord,
    ) -> Result<StrongRef, FeedError> {
        let nsid = "com.atproto.repo.createRecord";
        let request = self
            .client
            .post(self.url(nsid))
            .bearer_auth(&session.access_jwt)
            .json(&CreateRecordRequest {
                repo: &session.did,
                collection: POST_COLLECTION,
                record,
            });

        let data: CreateRecordResponse = self.send(nsid, request).await?;
        Ok(StrongRef {
            uri: data.uri,
            cid: data.cid,
        })
    }

    async fn update_seen(&self, session: &Session, seen_at: &str) -> Result<(), FeedError> {
        let nsid = "app.bsky.notification.updateSeen";
        let request = self
            .client
            .post(self.url(nsid))
            .bearer_auth(&session.access_jwt)
            .json(&json!({ "seenAt": seen_at }));

        // Empty 200 body on success
        self.send_raw(nsid, request).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_unauthorized_is_auth() {
        let err = FeedError::from_status(401, "");
        assert!(err.is_auth());
    }

    #[test]
    fn test_from_status_expired_token_is_auth() {
        let body = r#"{"error":"ExpiredToken","message":"Token has expired"}"#;
        let err = FeedError::from_status(400, body);
        assert!(err.is_auth());
        assert_eq!(err.to_string(), "authentication failed: Token has expired");
    }

    #[test]
    fn test_from_status_not_found() {
        let body = r#"{"error":"NotFound","message":"Post not found: at://x"}"#;
        let err = FeedError::from_status(400, body);
        assert!(matches!(err, FeedError::NotFound(_)));
        assert!(!err.is_auth());
    }

    #[test]
    fn test_from_status_generic_api_error() {
        let err = FeedError::from_status(500, "upstream exploded");
        match err {
            FeedError::Api { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "upstream exploded");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_from_status_error_name_without_message() {
        let err = FeedError::from_status(400, r#"{"error":"InvalidRequest"}"#);
        assert_eq!(err.to_string(), "API error (400): InvalidRequest");
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials::new("bot.bsky.social", "hunter2");
        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("bot.bsky.social"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_xrpc_url_strips_trailing_slash() {
        let client = XrpcClient::new(reqwest::Client::new(), "https://bsky.social/");
        assert_eq!(
            client.url("app.bsky.feed.getPostThread"),
            "https://bsky.social/xrpc/app.bsky.feed.getPostThread"
        );
    }
}
