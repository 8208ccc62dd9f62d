//! Reply composition and submission.

use super::facets::HashtagFacets;
use super::images::ImageEmbed;
use super::intake::Mention;
use super::root::RootPost;
use crate::bluesky::types::{PostRecord, ReplyRef, StrongRef, POST_COLLECTION};
use crate::bluesky::{FeedError, FeedService, Session};
use chrono::{SecondsFormat, Utc};

/// Thread refs for a reply: parent is always the mention, root falls back to
/// the mention when the root post could not be resolved.
pub fn reply_refs(mention: &Mention, root: Option<&RootPost>) -> ReplyRef {
    ReplyRef {
        root: root
            .map(RootPost::strong_ref)
            .unwrap_or_else(|| mention.strong_ref()),
        parent: mention.strong_ref(),
    }
}

pub fn compose_reply(
    mention: &Mention,
    root: Option<&RootPost>,
    content: HashtagFacets,
    image: &ImageEmbed,
) -> PostRecord {
    PostRecord {
        kind: POST_COLLECTION,
        text: content.text,
        facets: content.facets,
        reply: Some(reply_refs(mention, root)),
        embed: Some(image.to_embed()),
        created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }
}

/// Build the reply record and submit it
pub async fn compose_and_post(
    feed: &dyn FeedService,
    session: &Session,
    mention: &Mention,
    root: Option<&RootPost>,
    content: HashtagFacets,
    image: &ImageEmbed,
) -> Result<StrongRef, FeedError> {
    let record = compose_reply(mention, root, content, image);
    let posted = feed.create_post(session, &record).await?;

    log::info!(
        "Replied to @{} ({}) with {}",
        mention.author_handle,
        mention.uri,
        posted.uri
    );

    Ok(posted)
}
