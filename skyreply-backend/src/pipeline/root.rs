//! Root post resolution for a mention's thread parent.

use crate::bluesky::types::StrongRef;
use crate::bluesky::{FeedError, FeedService, Session};
use serde_json::Value;

/// Normalized originating post of a thread
#[derive(Debug, Clone, PartialEq)]
pub struct RootPost {
    pub uri: String,
    pub cid: String,
    pub text: String,
    pub embed: Option<Value>,
}

impl RootPost {
    pub fn strong_ref(&self) -> StrongRef {
        StrongRef {
            uri: self.uri.clone(),
            cid: self.cid.clone(),
        }
    }
}

/// Resolve the post a mention replied to.
///
/// `Ok(None)` means "reply to the mention itself": no parent, a missing or
/// hidden post, or any non-auth failure. Only auth-class errors are returned
/// so the batch can invalidate its session.
pub async fn resolve_root(
    feed: &dyn FeedService,
    session: &Session,
    parent_uri: Option<&str>,
) -> Result<Option<RootPost>, FeedError> {
    let Some(uri) = parent_uri else {
        return Ok(None);
    };

    match feed.get_post_thread(session, uri).await {
        Ok(Some(post)) => Ok(Some(RootPost {
            uri: post.uri,
            cid: post.cid,
            text: post.record.text.unwrap_or_default(),
            embed: post.record.embed,
        })),
        Ok(None) => {
            log::info!("Root post {} not available, replying to mention directly", uri);
            Ok(None)
        }
        Err(e) if e.is_auth() => Err(e),
        Err(e) => {
            log::warn!("Failed to resolve root post {}: {}", uri, e);
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::{post_view, MockFeed};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_no_parent_makes_no_call() {
        let feed = Arc::new(MockFeed::new());
        let session = feed.test_session();

        let root = resolve_root(feed.as_ref(), &session, None).await.unwrap();
        assert!(root.is_none());
        assert_eq!(feed.thread_fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_resolves_existing_post() {
        let feed = Arc::new(MockFeed::new());
        feed.add_post(post_view("at://root/1", "rootcid", "cats are liquid"));
        let session = feed.test_session();

        let root = resolve_root(feed.as_ref(), &session, Some("at://root/1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(root.text, "cats are liquid");
        assert_eq!(root.strong_ref(), StrongRef {
            uri: "at://root/1".to_string(),
            cid: "rootcid".to_string(),
        });
    }

    #[tokio::test]
    async fn test_missing_post_is_none() {
        let feed = Arc::new(MockFeed::new());
        let session = feed.test_session();

        let root = resolve_root(feed.as_ref(), &session, Some("at://gone/1")).await.unwrap();
        assert!(root.is_none());
        assert_eq!(feed.thread_fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_degrades_to_none() {
        let feed = Arc::new(MockFeed::new());
        feed.fail_thread_fetch(FeedError::Transport("timed out".to_string()));
        let session = feed.test_session();

        let root = resolve_root(feed.as_ref(), &session, Some("at://root/1")).await.unwrap();
        assert!(root.is_none());
    }

    #[tokio::test]
    async fn test_auth_failure_propagates() {
        let feed = Arc::new(MockFeed::new());
        feed.fail_thread_fetch(FeedError::Auth("ExpiredToken".to_string()));
        let session = feed.test_session();

        let err = resolve_root(feed.as_ref(), &session, Some("at://root/1"))
            .await
            .unwrap_err();
        assert!(err.is_auth());
    }
}
