//! Wire types for the Bluesky XRPC endpoints the reply bot touches.
//!
//! Field names follow the lexicon (camelCase). Anything the bot only passes
//! through untouched (blob refs, embeds on root posts) stays a raw `Value`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const POST_COLLECTION: &str = "app.bsky.feed.post";
pub const FACET_TAG_TYPE: &str = "app.bsky.richtext.facet#tag";
pub const IMAGES_EMBED_TYPE: &str = "app.bsky.embed.images";

/// Response of `com.atproto.server.createSession`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub did: String,
    pub handle: String,
    pub access_jwt: String,
    pub refresh_jwt: String,
}

/// XRPC error body: `{"error": "...", "message": "..."}`
#[derive(Debug, Deserialize)]
pub struct XrpcErrorBody {
    pub error: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListNotificationsResponse {
    #[serde(default)]
    pub notifications: Vec<Notification>,
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub uri: String,
    pub cid: String,
    pub author: Author,
    pub reason: String,
    pub is_read: bool,
    /// Only post-shaped records carry text/reply; likes and follows leave both empty
    #[serde(default)]
    pub record: PostRecordView,
    pub indexed_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub did: String,
    pub handle: String,
    pub display_name: Option<String>,
}

/// The subset of an `app.bsky.feed.post` record the bot reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostRecordView {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub reply: Option<ReplyRef>,
    #[serde(default)]
    pub embed: Option<Value>,
}

/// uri + cid pair pointing at a specific version of a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrongRef {
    pub uri: String,
    pub cid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyRef {
    pub root: StrongRef,
    pub parent: StrongRef,
}

/// Response of `app.bsky.feed.getPostThread`
#[derive(Debug, Deserialize)]
pub struct GetPostThreadResponse {
    pub thread: ThreadView,
}

/// Covers threadViewPost, notFoundPost and blockedPost; only the first has `post`.
#[derive(Debug, Deserialize)]
pub struct ThreadView {
    #[serde(rename = "$type")]
    pub kind: Option<String>,
    pub post: Option<PostView>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostView {
    pub uri: String,
    pub cid: String,
    #[serde(default)]
    pub record: PostRecordView,
}

/// Response of `com.atproto.repo.uploadBlob`
#[derive(Debug, Deserialize)]
pub struct UploadBlobResponse {
    pub blob: Value,
}

/// Body of `com.atproto.repo.createRecord`
#[derive(Debug, Serialize)]
pub struct CreateRecordRequest<'a> {
    pub repo: &'a str,
    pub collection: &'a str,
    pub record: &'a PostRecord,
}

/// Response of `com.atproto.repo.createRecord`
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRecordResponse {
    pub uri: String,
    pub cid: String,
}

/// Outgoing `app.bsky.feed.post` record
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord {
    #[serde(rename = "$type")]
    pub kind: &'static str,
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub facets: Vec<Facet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<ReplyRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embed: Option<ImagesEmbed>,
    pub created_at: String,
}

/// Rich-text annotation over a UTF-8 byte range of the post text
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Facet {
    pub index: ByteSlice,
    pub features: Vec<FacetFeature>,
}

/// Half-open `[byteStart, byteEnd)` range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ByteSlice {
    pub byte_start: usize,
    pub byte_end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "$type")]
pub enum FacetFeature {
    #[serde(rename = "app.bsky.richtext.facet#tag")]
    Tag { tag: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ImagesEmbed {
    #[serde(rename = "$type")]
    pub kind: &'static str,
    pub images: Vec<EmbeddedImage>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedImage {
    pub alt: String,
    pub image: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<AspectRatio>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AspectRatio {
    pub width: u32,
    pub height: u32,
}
