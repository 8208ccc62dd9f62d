//! Mention-to-reply pipeline.
//!
//! One batch: ensure session, list notifications, then for each unread mention
//! resolve its root, generate hashtags + image, upload the image, post the
//! reply and mark notifications seen. Mentions run as independent tasks under
//! a bounded semaphore; a failing mention never takes siblings down. An
//! auth-class failure anywhere invalidates the session and stops the batch
//! from starting further mentions. The batch deadline does the same without
//! the abort: mentions already in flight always run through acknowledgment.

pub mod composer;
pub mod facets;
pub mod generator;
pub mod images;
pub mod intake;
pub mod root;
#[cfg(test)]
pub mod testing;

use crate::bluesky::{FeedError, FeedService, Session, SessionManager};
use chrono::{SecondsFormat, Utc};
use generator::{ContentGenerator, GenerationError};
use images::{ImageError, ImagePipeline};
use intake::{Mention, NOTIFICATION_PAGE_SIZE};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{sleep_until, Instant};

/// Tags appended after the generated ones on every reply
pub const TRAILING_HASHTAGS: &[&str] = &["#trending", "#meme"];

/// Default bound on concurrently processed mentions
pub const DEFAULT_MAX_IN_FLIGHT: usize = 4;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub notification_limit: u32,
    pub max_in_flight: usize,
    pub trailing_hashtags: Vec<String>,
    /// After this long no further mentions are started
    pub batch_timeout: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            notification_limit: NOTIFICATION_PAGE_SIZE,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            trailing_hashtags: TRAILING_HASHTAGS.iter().map(|t| t.to_string()).collect(),
            batch_timeout: None,
        }
    }
}

/// Why a single mention did not get a reply
#[derive(Debug, Error)]
pub enum MentionError {
    #[error("{0}")]
    Auth(FeedError),
    #[error("no text available to generate from")]
    MissingText,
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Image(ImageError),
    #[error("reply rejected: {0}")]
    Post(FeedError),
}

impl MentionError {
    pub fn is_auth(&self) -> bool {
        matches!(self, MentionError::Auth(_))
    }

    /// Short label for logs
    pub fn kind(&self) -> &'static str {
        match self {
            MentionError::Auth(_) => "auth",
            MentionError::MissingText => "missing_text",
            MentionError::Generation(_) => "generation",
            MentionError::Image(_) => "image",
            MentionError::Post(_) => "post",
        }
    }
}

impl From<ImageError> for MentionError {
    fn from(e: ImageError) -> Self {
        match e {
            ImageError::Upload(f) if f.is_auth() => MentionError::Auth(f),
            other => MentionError::Image(other),
        }
    }
}

/// Route auth-class feed errors to `Auth`, everything else through `wrap`
fn feed_error(e: FeedError, wrap: fn(FeedError) -> MentionError) -> MentionError {
    if e.is_auth() {
        MentionError::Auth(e)
    } else {
        wrap(e)
    }
}

/// Batch-level failures reported to the trigger (HTTP handler or scheduler)
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("authentication failed: {reason}")]
    Auth { reason: String, report: BatchReport },
    #[error("failed to list notifications: {0}")]
    Intake(FeedError),
    #[error("a batch is already running")]
    Busy,
    #[error("batch task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Actionable mentions in this batch
    pub fetched: usize,
    pub replied: usize,
    /// Not started because the batch was aborted
    pub skipped: usize,
    pub failed: usize,
}

enum MentionOutcome {
    /// Reply posted. Carries the auth error if acknowledging it failed that way.
    Replied(Option<FeedError>),
    Cancelled,
    Failed(MentionError),
}

pub struct MentionPipeline {
    feed: Arc<dyn FeedService>,
    sessions: Arc<SessionManager>,
    generator: Arc<dyn ContentGenerator>,
    images: ImagePipeline,
    config: PipelineConfig,
    batch_lock: Arc<Mutex<()>>,
}

impl MentionPipeline {
    pub fn new(
        feed: Arc<dyn FeedService>,
        sessions: Arc<SessionManager>,
        generator: Arc<dyn ContentGenerator>,
        images: ImagePipeline,
        config: PipelineConfig,
    ) -> Self {
        Self {
            feed,
            sessions,
            generator,
            images,
            config,
            batch_lock: Arc::new(Mutex::new(())),
        }
    }

    #[cfg(test)]
    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Run one polling batch to completion.
    ///
    /// The batch runs on its own task, so dropping this future never cancels a
    /// mention between its reply and its acknowledgment.
    pub async fn run_batch(self: &Arc<Self>) -> Result<BatchReport, PipelineError> {
        let guard = Arc::clone(&self.batch_lock)
            .try_lock_owned()
            .map_err(|_| PipelineError::Busy)?;

        let pipeline = Arc::clone(self);
        let batch = tokio::spawn(async move {
            let _guard = guard;
            pipeline.execute_batch().await
        });

        batch
            .await
            .unwrap_or_else(|e| Err(PipelineError::Task(e.to_string())))
    }

    async fn execute_batch(self: &Arc<Self>) -> Result<BatchReport, PipelineError> {
        let mut deadline = self.config.batch_timeout.map(|t| Instant::now() + t);

        let session = match self.sessions.ensure_session().await {
            Ok(session) => session,
            Err(e) => return Err(self.abort_auth(e.to_string(), BatchReport::default()).await),
        };

        let mentions = match intake::fetch_actionable_mentions(
            self.feed.as_ref(),
            &session,
            self.config.notification_limit,
        )
        .await
        {
            Ok(mentions) => mentions,
            Err(e) if e.is_auth() => {
                return Err(self.abort_auth(e.to_string(), BatchReport::default()).await);
            }
            Err(e) => return Err(PipelineError::Intake(e)),
        };

        let mut report = BatchReport {
            fetched: mentions.len(),
            ..Default::default()
        };

        if mentions.is_empty() {
            log::debug!("No unread mentions");
            return Ok(report);
        }

        log::info!("Found {} unread mention(s)", mentions.len());

        let semaphore = Arc::new(Semaphore::new(self.config.max_in_flight.max(1)));
        let mut workers = JoinSet::new();

        for mention in mentions {
            let pipeline = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            workers.spawn(async move {
                // Closed semaphore means the batch hit an auth failure or its deadline
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return MentionOutcome::Cancelled;
                };
                match pipeline.process_mention(&mention).await {
                    Ok(ack_auth) => MentionOutcome::Replied(ack_auth),
                    Err(e) => {
                        log::error!(
                            "Mention {} from @{} failed ({}): {}",
                            mention.uri,
                            mention.author_handle,
                            e.kind(),
                            e
                        );
                        MentionOutcome::Failed(e)
                    }
                }
            });
        }

        let mut auth_failure: Option<String> = None;

        loop {
            let joined = match deadline {
                Some(at) => tokio::select! {
                    joined = workers.join_next() => joined,
                    _ = sleep_until(at) => {
                        log::warn!("Batch deadline reached, not starting remaining mentions");
                        semaphore.close();
                        deadline = None;
                        continue;
                    }
                },
                None => workers.join_next().await,
            };
            let Some(joined) = joined else {
                break;
            };

            match joined {
                Ok(MentionOutcome::Replied(ack_auth)) => {
                    report.replied += 1;
                    if let Some(e) = ack_auth {
                        if auth_failure.is_none() {
                            semaphore.close();
                            auth_failure = Some(e.to_string());
                        }
                    }
                }
                Ok(MentionOutcome::Cancelled) => report.skipped += 1,
                Ok(MentionOutcome::Failed(e)) => {
                    report.failed += 1;
                    if e.is_auth() && auth_failure.is_none() {
                        semaphore.close();
                        auth_failure = Some(e.to_string());
                    }
                }
                Err(e) => {
                    log::error!("Mention task panicked: {}", e);
                    report.failed += 1;
                }
            }
        }

        if let Some(reason) = auth_failure {
            return Err(self.abort_auth(reason, report).await);
        }

        log::info!(
            "Batch complete: {} replied, {} failed, {} skipped of {}",
            report.replied,
            report.failed,
            report.skipped,
            report.fetched
        );

        Ok(report)
    }

    async fn abort_auth(&self, reason: String, report: BatchReport) -> PipelineError {
        log::warn!("Authentication error, aborting batch: {}", reason);
        self.sessions.invalidate().await;
        PipelineError::Auth { reason, report }
    }

    /// Resolve, generate, upload, reply, acknowledge.
    ///
    /// `Ok(Some(_))` means the reply went out but acknowledging it hit an
    /// auth-class error.
    async fn process_mention(&self, mention: &Mention) -> Result<Option<FeedError>, MentionError> {
        log::info!("Processing mention by @{}", mention.author_handle);

        let session = self
            .sessions
            .ensure_session()
            .await
            .map_err(MentionError::Auth)?;

        let root = root::resolve_root(self.feed.as_ref(), &session, mention.parent_uri.as_deref())
            .await
            .map_err(MentionError::Auth)?;

        let source_text = root
            .as_ref()
            .map(|r| r.text.as_str())
            .filter(|t| !t.trim().is_empty())
            .or_else(|| mention.text.as_deref().filter(|t| !t.trim().is_empty()))
            .ok_or(MentionError::MissingText)?;

        let generated = self.generator.generate(source_text).await?;

        let mut hashtags = facets::normalize_hashtags(&generated.hashtags);
        hashtags.extend(self.config.trailing_hashtags.iter().cloned());
        let content = facets::build_facets(&hashtags);

        let embed = self
            .images
            .fetch_and_upload(&session, &generated.image_url)
            .await?;

        composer::compose_and_post(
            self.feed.as_ref(),
            &session,
            mention,
            root.as_ref(),
            content,
            &embed,
        )
        .await
        .map_err(|e| feed_error(e, MentionError::Post))?;

        Ok(self.acknowledge(&session, mention).await)
    }

    /// Advance the seen watermark after a successful reply.
    ///
    /// The reply already exists, so failures never undo it. An auth-class
    /// failure is handed back so the batch can abort.
    async fn acknowledge(&self, session: &Session, mention: &Mention) -> Option<FeedError> {
        let seen_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        match self.feed.update_seen(session, &seen_at).await {
            Ok(()) => {
                log::info!("Marked notifications seen after replying to {}", mention.uri);
                None
            }
            Err(e) if e.is_auth() => {
                log::error!("Replied to {} but could not mark it seen: {}", mention.uri, e);
                Some(e)
            }
            Err(e) => {
                log::warn!("Failed to mark {} as seen: {}", mention.uri, e);
                None
            }
        }
    }
}
