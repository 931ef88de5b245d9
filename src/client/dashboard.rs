//! # Dashboard Controller
//!
//! Presentation state of the dashboard, independent of any UI toolkit: the
//! active tab, the create-post modal, the banners and the error state. Every
//! user action goes through the [`SyncContext`]; failures end up in the
//! controller's state and are never returned to the caller.
//!
//! ## Banners
//!
//! - **Offline**: shown while offline with the number of pending changes;
//!   the user may dismiss it until the next disconnection
//! - **Reconnected**: shown for a few seconds after connectivity returns
//! - **Welcome**: shown for a few seconds after the first load
//!
//! Call [`DashboardController::pump_events`] on every frame (or tick) to
//! apply the sync events received since the last call.

use crate::client::media::{MediaError, MediaFile};
use crate::client::remote::UploadProgress;
use crate::client::sync::{MutationOutcome, SyncContext, SyncStatus, UploadedMedia};
use crate::shared::error::SyncError;
use crate::shared::event::{SyncEvent, SyncEventKind};
use crate::shared::models::{Connection, Event, Post, Recommendation, UserProfile};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DashboardTab {
    #[default]
    Feed,
    Events,
    Network,
    Profile,
}

/// Banner currently shown above the dashboard
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Banner {
    Offline { pending_actions: usize },
    Reconnected,
    Welcome { name: String },
}

impl Banner {
    pub fn text(&self) -> String {
        match self {
            Banner::Offline { pending_actions: 0 } => {
                "You're offline. Some features may be limited.".to_string()
            }
            Banner::Offline { pending_actions } => format!(
                "You're offline. {} pending {} will sync when you reconnect.",
                pending_actions,
                if *pending_actions == 1 { "change" } else { "changes" }
            ),
            Banner::Reconnected => "You're back online!".to_string(),
            Banner::Welcome { name } => format!("Welcome back, {}!", name),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct OfflineBanner {
    pending_actions: usize,
    dismissed: bool,
}

/// State of the create-post modal
#[derive(Debug, Default)]
pub struct CreatePostModal {
    pub open: bool,
    pub content: String,
    media: Option<MediaFile>,
    progress: Arc<AtomicU8>,
    pub submitting: bool,
    pub error: Option<String>,
}

impl CreatePostModal {
    pub fn media(&self) -> Option<&MediaFile> {
        self.media.as_ref()
    }

    /// Upload progress of the attached media, 0 to 100
    pub fn upload_progress(&self) -> u8 {
        self.progress.load(Ordering::SeqCst)
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Dashboard presentation state driven by sync events
#[derive(Debug)]
pub struct DashboardController {
    context: SyncContext,
    events: broadcast::Receiver<SyncEvent>,
    pub active_tab: DashboardTab,
    pub create_post: CreatePostModal,
    offline_banner: Option<OfflineBanner>,
    reconnected_until: Option<Instant>,
    welcome_until: Option<Instant>,
    welcome_name: String,
    loaded_once: bool,
    loading: bool,
    error: Option<String>,
    notice: Option<String>,
}

impl DashboardController {
    pub fn new(context: SyncContext) -> Self {
        let events = context.subscribe();
        let offline_banner = (!context.is_online()).then_some(OfflineBanner {
            pending_actions: 0,
            dismissed: false,
        });
        Self {
            context,
            events,
            active_tab: DashboardTab::default(),
            create_post: CreatePostModal::default(),
            offline_banner,
            reconnected_until: None,
            welcome_until: None,
            welcome_name: String::new(),
            loaded_once: false,
            loading: false,
            error: None,
            notice: None,
        }
    }

    pub fn context(&self) -> &SyncContext {
        &self.context
    }

    /// Load every category. Failing categories fall back to the cache; the
    /// error state is set only when nothing at all could be shown.
    pub async fn load(&mut self) {
        self.loading = true;
        self.error = None;

        let report = self.context.refresh_all().await;
        self.loading = false;

        if report.loaded.is_empty() {
            let reason = report
                .failed
                .first()
                .map(|(_, e)| user_message(e))
                .unwrap_or_else(|| "Failed to load dashboard data".to_string());
            self.error = Some(reason);
            return;
        }

        if !self.loaded_once {
            self.loaded_once = true;
            self.welcome_name = self
                .context
                .local_state()
                .await
                .profile()
                .map(UserProfile::display_name)
                .unwrap_or_default();
            self.welcome_until = Some(Instant::now() + self.context.config().welcome_banner);
        }
        self.pump_events().await;
    }

    /// Retry affordance of the error state
    pub async fn retry(&mut self) {
        if !self.context.is_online() {
            if let Err(e) = self.context.retry_now().await {
                tracing::warn!(error = %e, "manual reconnection failed");
            }
        }
        self.load().await;
    }

    /// Apply the sync events received since the last call
    pub async fn pump_events(&mut self) {
        loop {
            let event = match self.events.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "dashboard missed sync events");
                    continue;
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            };
            self.apply_event(&event);
        }

        // The queue size may have changed without a queued event being seen
        if let Some(banner) = &mut self.offline_banner {
            banner.pending_actions = self.context.pending_count().await;
        }
    }

    fn apply_event(&mut self, event: &SyncEvent) {
        match &event.kind {
            SyncEventKind::WentOffline { pending_actions } => {
                self.reconnected_until = None;
                self.offline_banner = Some(OfflineBanner {
                    pending_actions: *pending_actions,
                    dismissed: false,
                });
            }
            SyncEventKind::Reconnected => {
                self.offline_banner = None;
                self.reconnected_until =
                    Some(Instant::now() + self.context.config().reconnected_banner);
            }
            SyncEventKind::QueueChanged { pending_actions } => {
                if let Some(banner) = &mut self.offline_banner {
                    banner.pending_actions = *pending_actions;
                }
            }
            SyncEventKind::DrainFinished { discarded, .. } if *discarded > 0 => {
                self.notice = Some(format!(
                    "{} offline {} could not be synced and {} undone",
                    discarded,
                    if *discarded == 1 { "change" } else { "changes" },
                    if *discarded == 1 { "was" } else { "were" }
                ));
            }
            _ => {}
        }
    }

    /// Banners to show right now, most important first
    pub fn banners(&self) -> Vec<Banner> {
        let now = Instant::now();
        let mut banners = Vec::new();
        if let Some(banner) = self.offline_banner.filter(|b| !b.dismissed) {
            banners.push(Banner::Offline {
                pending_actions: banner.pending_actions,
            });
        }
        if self.reconnected_until.is_some_and(|until| now < until) {
            banners.push(Banner::Reconnected);
        }
        if self.welcome_until.is_some_and(|until| now < until) {
            banners.push(Banner::Welcome {
                name: self.welcome_name.clone(),
            });
        }
        banners
    }

    pub fn dismiss_offline_banner(&mut self) {
        if let Some(banner) = &mut self.offline_banner {
            banner.dismissed = true;
        }
    }

    pub fn select_tab(&mut self, tab: DashboardTab) {
        self.active_tab = tab;
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Transient message about the last action, taken once
    pub fn take_notice(&mut self) -> Option<String> {
        self.notice.take()
    }

    pub async fn status(&self) -> SyncStatus {
        self.context.sync_status().await
    }

    // View data

    pub async fn posts(&self) -> Vec<Post> {
        self.context.local_state().await.posts().to_vec()
    }

    pub async fn events(&self) -> Vec<Event> {
        self.context.local_state().await.events().to_vec()
    }

    pub async fn connections(&self) -> Vec<Connection> {
        self.context.local_state().await.connections().to_vec()
    }

    pub async fn recommendations(&self) -> Vec<Recommendation> {
        self.context.local_state().await.recommendations().to_vec()
    }

    // Create-post modal

    pub fn open_create_post(&mut self) {
        self.create_post.reset();
        self.create_post.open = true;
    }

    pub fn close_create_post(&mut self) {
        self.create_post.reset();
    }

    /// Attach media to the draft; invalid files are rejected with a message
    pub fn attach_media(&mut self, file: MediaFile) {
        match file.validate() {
            Ok(_) => {
                self.create_post.error = None;
                self.create_post.media = Some(file);
            }
            Err(e) => {
                self.create_post.error = Some(media_message(&e));
                self.create_post.media = None;
            }
        }
    }

    pub fn remove_media(&mut self) {
        self.create_post.media = None;
        self.create_post.progress.store(0, Ordering::SeqCst);
    }

    /// Upload the attached media, if any, and publish the draft. The modal
    /// closes on success and shows the error otherwise.
    pub async fn submit_post(&mut self) {
        if self.create_post.submitting {
            return;
        }
        self.create_post.submitting = true;
        self.create_post.error = None;

        let media = match self.create_post.media.clone() {
            Some(file) => match self.upload(file).await {
                Ok(media) => Some(media),
                Err(e) => {
                    self.create_post.error = Some(media_message(&e));
                    self.create_post.submitting = false;
                    return;
                }
            },
            None => None,
        };

        let content = self.create_post.content.clone();
        match self.context.create_post(&content, media).await {
            Ok(outcome) => {
                self.note_outcome(&outcome, "Post");
                self.create_post.reset();
            }
            Err(e) => {
                self.create_post.error = Some(user_message(&e));
                self.create_post.submitting = false;
            }
        }
    }

    async fn upload(&self, file: MediaFile) -> Result<UploadedMedia, MediaError> {
        let progress = self.create_post.progress.clone();
        let (tx, mut rx) = mpsc::channel::<UploadProgress>(16);
        let watcher = tokio::spawn(async move {
            while let Some(update) = rx.recv().await {
                progress.store(update.percent(), Ordering::SeqCst);
            }
        });

        let result = self.context.upload_media(file, tx).await;
        // The sender is gone once the upload returns, so the watcher ends
        let _ = watcher.await;
        result
    }

    // Feed, events and network actions

    pub async fn toggle_like(&mut self, post_id: &str) {
        let result = self.context.toggle_like(post_id).await;
        self.settle(result, "Like");
    }

    pub async fn add_comment(&mut self, post_id: &str, content: &str) {
        let result = self.context.add_comment(post_id, content).await;
        self.settle(result, "Comment");
    }

    pub async fn toggle_attendance(&mut self, event_id: &str) {
        let result = self.context.toggle_attendance(event_id).await;
        self.settle(result, "RSVP");
    }

    pub async fn connect(&mut self, user_id: &str) {
        let result = self.context.connect_user(user_id).await;
        self.settle(result, "Connection request");
    }

    pub async fn delete_post(&mut self, post_id: &str) {
        let result = self.context.delete_post(post_id).await;
        self.settle(result, "Delete");
    }

    /// Discard every pending change
    pub async fn discard_pending(&mut self) {
        match self.context.clear_pending().await {
            Ok(0) => {}
            Ok(n) => self.notice = Some(format!("Discarded {} pending changes", n)),
            Err(e) => self.notice = Some(user_message(&e)),
        }
        self.pump_events().await;
    }

    /// End the session: stop syncing and sign out of the identity provider
    pub async fn sign_out(&mut self) {
        self.context.dispose().await;
        if let Err(e) = self.context.identity().sign_out().await {
            tracing::error!(error = %e, "sign out failed");
            self.error = Some("Failed to sign out".to_string());
            return;
        }
        tracing::info!("signed out");
    }

    fn settle(&mut self, result: Result<MutationOutcome, SyncError>, what: &str) {
        match result {
            Ok(outcome) => self.note_outcome(&outcome, what),
            Err(e) => {
                tracing::warn!(error = %e, "{} failed", what);
                self.notice = Some(user_message(&e));
            }
        }
    }

    fn note_outcome(&mut self, outcome: &MutationOutcome, what: &str) {
        if outcome.is_pending() {
            self.notice = Some(format!("{} saved offline and will sync later", what));
        }
    }
}

/// Message shown for a failed dashboard operation
pub fn user_message(error: &SyncError) -> String {
    match error {
        SyncError::NoCachedData { category, .. } => {
            format!("Unable to load {} while offline", category)
        }
        SyncError::Remote(remote) if remote.is_transient() => {
            "Unable to reach the server. Please check your connection.".to_string()
        }
        SyncError::Remote(remote) => format!("Something went wrong: {}", remote),
        SyncError::NotAuthenticated => "Please sign in again".to_string(),
        SyncError::OfflineUnavailable { operation } => {
            format!("{} is not available offline", operation)
        }
        SyncError::Forbidden { message } | SyncError::Validation { message, .. } => {
            message.clone()
        }
        SyncError::Disposed => "Your session has ended".to_string(),
    }
}

/// Message shown for rejected or failed media
pub fn media_message(error: &MediaError) -> String {
    match error {
        MediaError::TooLarge { .. } => "File size must be less than 5MB".to_string(),
        MediaError::UnsupportedType(_) => {
            "Unsupported file type. Please upload an image (JPG, PNG, GIF) or video (MP4, MOV)"
                .to_string()
        }
        MediaError::Offline => "Media uploads are not available offline".to_string(),
        MediaError::Upload(e) => format!("Upload failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::local_db::MemoryStorage;
    use crate::client::remote::{
        IdentityProvider, MemoryBlobStore, MemoryDocumentStore, Session, StaticIdentity,
    };
    use crate::client::sync::NetworkSignal;
    use crate::shared::config::SyncConfig;
    use serde_json::json;
    use std::time::Duration;

    async fn controller(
        online: bool,
    ) -> (DashboardController, Arc<MemoryDocumentStore>, Arc<StaticIdentity>) {
        let store = Arc::new(MemoryDocumentStore::new());
        store
            .insert("users", "u1", &json!({"firstName": "Ada", "lastName": "Lovelace"}))
            .await
            .unwrap();
        let identity = Arc::new(StaticIdentity::signed_in(Session {
            uid: "u1".to_string(),
            email: "ada@example.com".to_string(),
            display_name: None,
        }));
        let context = SyncContext::builder(
            SyncConfig::default(),
            Arc::new(MemoryStorage::new()),
            store.clone(),
            identity.clone(),
        )
        .blob_store(Arc::new(MemoryBlobStore::with_chunk_size(4)))
        .online(online)
        .build()
        .unwrap();
        context.init().await.unwrap();
        (DashboardController::new(context), store, identity)
    }

    #[tokio::test(start_paused = true)]
    async fn test_welcome_banner_expires() {
        let (mut dashboard, _, _) = controller(true).await;
        dashboard.load().await;
        assert!(dashboard.error().is_none());
        assert_eq!(
            dashboard.banners(),
            vec![Banner::Welcome {
                name: "Ada Lovelace".to_string()
            }]
        );

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(dashboard.banners().is_empty());
        dashboard.context().dispose().await;
    }

    #[tokio::test]
    async fn test_offline_banner_dismissal() {
        let (mut dashboard, _, _) = controller(true).await;
        dashboard.context().report_network(NetworkSignal::PlatformOffline);
        // Let the supervisor publish the transition
        tokio::time::sleep(Duration::from_millis(20)).await;
        dashboard.pump_events().await;
        assert_eq!(
            dashboard.banners(),
            vec![Banner::Offline { pending_actions: 0 }]
        );

        dashboard.dismiss_offline_banner();
        assert!(dashboard.banners().is_empty());
        dashboard.context().dispose().await;
    }

    #[tokio::test]
    async fn test_error_state_when_nothing_loads() {
        let (mut dashboard, _, _) = controller(false).await;
        dashboard.context().dispose().await;
        dashboard.load().await;
        assert_eq!(dashboard.error(), Some("Your session has ended"));
    }

    #[tokio::test]
    async fn test_invalid_media_shows_message() {
        let (mut dashboard, _, _) = controller(true).await;
        dashboard.open_create_post();
        dashboard.attach_media(MediaFile::new("doc.pdf", "application/pdf", vec![1]));
        assert_eq!(
            dashboard.create_post.error.as_deref(),
            Some("Unsupported file type. Please upload an image (JPG, PNG, GIF) or video (MP4, MOV)")
        );
        assert!(dashboard.create_post.media().is_none());
        dashboard.context().dispose().await;
    }

    #[tokio::test]
    async fn test_submit_post_with_media() {
        let (mut dashboard, store, _) = controller(true).await;
        dashboard.load().await;
        dashboard.open_create_post();
        dashboard.create_post.content = "sunset".to_string();
        dashboard.attach_media(MediaFile::new("sunset.jpg", "image/jpeg", vec![7u8; 10]));

        dashboard.submit_post().await;

        assert!(!dashboard.create_post.open);
        assert!(dashboard.create_post.error.is_none());
        assert_eq!(store.count("posts").await, 1);
        let posts = dashboard.posts().await;
        assert_eq!(posts[0].content, "sunset");
        assert!(posts[0].media_url.as_deref().unwrap().ends_with(".jpg"));
        dashboard.context().dispose().await;
    }

    #[tokio::test]
    async fn test_sign_out_disposes_context() {
        let (mut dashboard, _, identity) = controller(true).await;
        dashboard.sign_out().await;
        assert!(dashboard.context().is_disposed());
        assert!(identity.current_session().is_none());
    }
}
