//! In-memory test doubles for the feed service, content generator and image source.

use super::generator::{ContentGenerator, GeneratedContent, GenerationError};
use super::images::{ImageEmbed, ImageError, ImageSource, IMAGE_ENCODING};
use crate::bluesky::types::{
    Author, Notification, PostRecord, PostRecordView, PostView, ReplyRef, StrongRef,
};
use crate::bluesky::{Credentials, FeedError, FeedService, Session};
use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Build a notification. `id` doubles as the cid and the author handle prefix.
pub fn notification(id: &str, reason: &str, is_read: bool, parent: Option<&str>) -> Notification {
    Notification {
        uri: format!("at://did:plc:{}/app.bsky.feed.post/{}", id, id),
        cid: id.to_string(),
        author: Author {
            did: format!("did:plc:{}", id),
            handle: format!("{}.bsky.social", id),
            display_name: None,
        },
        reason: reason.to_string(),
        is_read,
        record: PostRecordView {
            text: Some(format!("@bot hello from {}", id)),
            reply: parent.map(|uri| ReplyRef {
                root: StrongRef {
                    uri: uri.to_string(),
                    cid: "parentcid".to_string(),
                },
                parent: StrongRef {
                    uri: uri.to_string(),
                    cid: "parentcid".to_string(),
                },
            }),
            embed: None,
        },
        indexed_at: Some("2024-11-20T10:00:00.000Z".to_string()),
    }
}

pub fn post_view(uri: &str, cid: &str, text: &str) -> PostView {
    PostView {
        uri: uri.to_string(),
        cid: cid.to_string(),
        record: PostRecordView {
            text: Some(text.to_string()),
            reply: None,
            embed: None,
        },
    }
}

/// PNG-encoded gradient of the given size
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]));
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .expect("encode test png");
    buf
}

pub fn test_embed() -> ImageEmbed {
    ImageEmbed {
        encoding: IMAGE_ENCODING.to_string(),
        size: 1234,
        width: 1000,
        height: 800,
        alt: "Default response image".to_string(),
        blob: blob_ref(1234),
    }
}

fn blob_ref(size: usize) -> Value {
    json!({
        "$type": "blob",
        "ref": { "$link": "bafkreitestblob" },
        "mimeType": IMAGE_ENCODING,
        "size": size
    })
}

/// Scriptable feed service that records every call
#[derive(Default)]
pub struct MockFeed {
    logins: AtomicUsize,
    thread_fetches: AtomicUsize,
    login_error: Mutex<Option<FeedError>>,
    list_error: Mutex<Option<FeedError>>,
    thread_error: Mutex<Option<FeedError>>,
    upload_error: Mutex<Option<FeedError>>,
    post_error: Mutex<Option<FeedError>>,
    seen_error: Mutex<Option<FeedError>>,
    seen_delay: Mutex<Option<Duration>>,
    notifications: Mutex<Vec<Notification>>,
    last_limit: Mutex<Option<u32>>,
    threads: Mutex<HashMap<String, PostView>>,
    uploads: Mutex<Vec<(usize, String)>>,
    posts: Mutex<Vec<PostRecord>>,
    seen: Mutex<Vec<String>>,
    /// Ordered log of side-effecting calls ("post:<parent uri>", "seen")
    events: Mutex<Vec<String>>,
}

impl MockFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn test_session(&self) -> Session {
        Session {
            did: "did:plc:bot".to_string(),
            handle: "bot.bsky.social".to_string(),
            access_jwt: "access-0".to_string(),
            refresh_jwt: "refresh-0".to_string(),
            issued_at: Instant::now(),
        }
    }

    pub fn fail_login(&self, err: FeedError) {
        *self.login_error.lock() = Some(err);
    }

    pub fn allow_login(&self) {
        *self.login_error.lock() = None;
    }

    pub fn fail_list(&self, err: FeedError) {
        *self.list_error.lock() = Some(err);
    }

    pub fn fail_thread_fetch(&self, err: FeedError) {
        *self.thread_error.lock() = Some(err);
    }

    pub fn fail_upload(&self, err: FeedError) {
        *self.upload_error.lock() = Some(err);
    }

    pub fn fail_post(&self, err: FeedError) {
        *self.post_error.lock() = Some(err);
    }

    pub fn fail_seen(&self, err: FeedError) {
        *self.seen_error.lock() = Some(err);
    }

    /// Make every `update_seen` call take `delay` before answering
    pub fn delay_seen(&self, delay: Duration) {
        *self.seen_delay.lock() = Some(delay);
    }

    pub fn set_notifications(&self, notifications: Vec<Notification>) {
        *self.notifications.lock() = notifications;
    }

    pub fn add_post(&self, post: PostView) {
        self.threads.lock().insert(post.uri.clone(), post);
    }

    pub fn login_count(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    pub fn thread_fetch_count(&self) -> usize {
        self.thread_fetches.load(Ordering::SeqCst)
    }

    pub fn last_list_limit(&self) -> Option<u32> {
        *self.last_limit.lock()
    }

    pub fn uploads(&self) -> Vec<(usize, String)> {
        self.uploads.lock().clone()
    }

    pub fn posts(&self) -> Vec<PostRecord> {
        self.posts.lock().clone()
    }

    pub fn seen_count(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl FeedService for MockFeed {
    async fn create_session(&self, _credentials: &Credentials) -> Result<Session, FeedError> {
        let n = self.logins.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.login_error.lock().clone() {
            return Err(err);
        }
        Ok(Session {
            access_jwt: format!("access-{}", n),
            refresh_jwt: format!("refresh-{}", n),
            ..self.test_session()
        })
    }

    async fn list_notifications(
        &self,
        _session: &Session,
        limit: u32,
    ) -> Result<Vec<Notification>, FeedError> {
        *self.last_limit.lock() = Some(limit);
        if let Some(err) = self.list_error.lock().clone() {
            return Err(err);
        }
        Ok(self.notifications.lock().clone())
    }

    async fn get_post_thread(
        &self,
        _session: &Session,
        uri: &str,
    ) -> Result<Option<PostView>, FeedError> {
        self.thread_fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.thread_error.lock().clone() {
            return Err(err);
        }
        Ok(self.threads.lock().get(uri).cloned())
    }

    async fn upload_blob(
        &self,
        _session: &Session,
        bytes: Vec<u8>,
        encoding: &str,
    ) -> Result<Value, FeedError> {
        if let Some(err) = self.upload_error.lock().clone() {
            return Err(err);
        }
        self.uploads.lock().push((bytes.len(), encoding.to_string()));
        Ok(blob_ref(bytes.len()))
    }

    async fn create_post(
        &self,
        _session: &Session,
        record: &PostRecord,
    ) -> Result<StrongRef, FeedError> {
        if let Some(err) = self.post_error.lock().clone() {
            return Err(err);
        }
        let mut posts = self.posts.lock();
        posts.push(record.clone());
        let parent = record
            .reply
            .as_ref()
            .map(|r| r.parent.uri.clone())
            .unwrap_or_default();
        self.events.lock().push(format!("post:{}", parent));
        Ok(StrongRef {
            uri: format!("at://did:plc:bot/app.bsky.feed.post/reply{}", posts.len()),
            cid: format!("replycid{}", posts.len()),
        })
    }

    async fn update_seen(&self, _session: &Session, seen_at: &str) -> Result<(), FeedError> {
        let delay = *self.seen_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.seen_error.lock().clone() {
            return Err(err);
        }
        self.seen.lock().push(seen_at.to_string());
        self.events.lock().push("seen".to_string());
        Ok(())
    }
}

/// Generator with canned results keyed by input text
#[derive(Default)]
pub struct MockGenerator {
    responses: Mutex<HashMap<String, Result<GeneratedContent, GenerationError>>>,
    fallback: Mutex<Option<GeneratedContent>>,
    calls: Mutex<Vec<String>>,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every unscripted text with `content`
    pub fn always(content: GeneratedContent) -> Self {
        let generator = Self::default();
        *generator.fallback.lock() = Some(content);
        generator
    }

    pub fn respond(&self, text: &str, result: Result<GeneratedContent, GenerationError>) {
        self.responses.lock().insert(text.to_string(), result);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ContentGenerator for MockGenerator {
    async fn generate(&self, text: &str) -> Result<GeneratedContent, GenerationError> {
        self.calls.lock().push(text.to_string());
        if let Some(result) = self.responses.lock().get(text) {
            return result.clone();
        }
        self.fallback
            .lock()
            .clone()
            .ok_or_else(|| GenerationError::Transport("no scripted response".to_string()))
    }
}

/// Image source serving bytes from memory
#[derive(Default)]
pub struct MockImageSource {
    images: Mutex<HashMap<String, Vec<u8>>>,
}

impl MockImageSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, url: &str, bytes: Vec<u8>) {
        self.images.lock().insert(url.to_string(), bytes);
    }
}

#[async_trait]
impl ImageSource for MockImageSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ImageError> {
        self.images
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| ImageError::Download(format!("{} returned 404 Not Found", url)))
    }
}
