//! Notification intake: list recent notifications and keep unread mentions.

use crate::bluesky::types::{Notification, StrongRef};
use crate::bluesky::{FeedError, FeedService, Session};

/// Page size for `listNotifications`
pub const NOTIFICATION_PAGE_SIZE: u32 = 50;

const MENTION_REASON: &str = "mention";

/// An unread mention of the bot account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mention {
    pub uri: String,
    pub cid: String,
    pub author_did: String,
    pub author_handle: String,
    /// The mention post's own text
    pub text: Option<String>,
    /// Post this mention replied to, if it was a reply
    pub parent_uri: Option<String>,
    pub indexed_at: Option<String>,
}

impl Mention {
    pub fn strong_ref(&self) -> StrongRef {
        StrongRef {
            uri: self.uri.clone(),
            cid: self.cid.clone(),
        }
    }
}

impl From<Notification> for Mention {
    fn from(n: Notification) -> Self {
        Mention {
            uri: n.uri,
            cid: n.cid,
            author_did: n.author.did,
            author_handle: n.author.handle,
            text: n.record.text,
            parent_uri: n.record.reply.map(|r| r.parent.uri),
            indexed_at: n.indexed_at,
        }
    }
}

/// Whether a notification should get a reply
pub fn is_actionable(notification: &Notification) -> bool {
    notification.reason == MENTION_REASON && !notification.is_read
}

/// Keep unread mentions in upstream order
pub fn filter_actionable(notifications: Vec<Notification>) -> Vec<Mention> {
    notifications
        .into_iter()
        .filter(is_actionable)
        .map(Mention::from)
        .collect()
}

/// Fetch one page of notifications and reduce it to actionable mentions
pub async fn fetch_actionable_mentions(
    feed: &dyn FeedService,
    session: &Session,
    limit: u32,
) -> Result<Vec<Mention>, FeedError> {
    let notifications = feed.list_notifications(session, limit).await?;
    let total = notifications.len();
    let mentions = filter_actionable(notifications);

    log::debug!(
        "Fetched {} notification(s), {} actionable mention(s)",
        total,
        mentions.len()
    );

    Ok(mentions)
}
