//! Session lifecycle for the bot account.
//!
//! A session is reused while younger than `ttl`, and re-created on expiry or
//! after `invalidate()`. The lock is held across login so concurrent mention
//! tasks never trigger more than one `createSession` call.

use super::client::{Credentials, FeedError, FeedService, Session};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Sessions are refreshed after one hour
pub const SESSION_TTL: Duration = Duration::from_secs(3600);

pub struct SessionManager {
    feed: Arc<dyn FeedService>,
    credentials: Credentials,
    ttl: Duration,
    current: Mutex<Option<Session>>,
}

impl SessionManager {
    pub fn new(feed: Arc<dyn FeedService>, credentials: Credentials) -> Self {
        Self::with_ttl(feed, credentials, SESSION_TTL)
    }

    pub fn with_ttl(feed: Arc<dyn FeedService>, credentials: Credentials, ttl: Duration) -> Self {
        Self {
            feed,
            credentials,
            ttl,
            current: Mutex::new(None),
        }
    }

    /// Return a valid session, logging in again if the cached one is stale or absent.
    ///
    /// Login failures surface as `FeedError::Auth` and leave no session cached.
    pub async fn ensure_session(&self) -> Result<Session, FeedError> {
        let mut current = self.current.lock().await;

        if let Some(session) = current.as_ref() {
            if Instant::now().duration_since(session.issued_at) < self.ttl {
                log::debug!("Using existing session for {}", session.handle);
                return Ok(session.clone());
            }
            log::info!("Session for {} expired, logging in again", session.handle);
        }

        *current = None;

        let session = match self.feed.create_session(&self.credentials).await {
            Ok(session) => session,
            Err(e) => {
                log::error!("Login failed for {}: {}", self.credentials.identifier, e);
                return Err(match e {
                    FeedError::Auth(m) => FeedError::Auth(m),
                    other => FeedError::Auth(other.to_string()),
                });
            }
        };

        log::info!("Logged in as: {}", session.handle);
        *current = Some(session.clone());
        Ok(session)
    }

    /// Drop the cached session so the next `ensure_session()` logs in again
    pub async fn invalidate(&self) {
        let mut current = self.current.lock().await;
        if current.take().is_some() {
            log::warn!("Session invalidated, next call will re-authenticate");
        }
    }

    /// Whether a session is cached and still inside its TTL
    #[cfg(test)]
    pub async fn is_valid(&self) -> bool {
        self.current
            .lock()
            .await
            .as_ref()
            .map(|s| Instant::now().duration_since(s.issued_at) < self.ttl)
            .unwrap_or(false)
    }
}
