//! Application bootstrap implementation.
//!
//! [`ArApp`] builds every component once, wires their notifications
//! together and owns the background tasks that drive them.

use std::collections::HashSet;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::AppConfig;
use super::error::AppError;
use crate::asset::{AssetCache, AssetKey, AssetLoader, AssetRecord, CacheError};
use crate::events::SubscriptionId;
use crate::fallback::{FailureEvent, FailureKind, FallbackAction, FallbackPolicy};
use crate::feed::{top_detection, Detection, RecognitionFeed};
use crate::preferences::{PreferenceStore, AR_ENABLED_KEY};
use crate::presentation::{PlacementHint, PresentationSurface};
use crate::session::{CapabilityProbe, CapabilityStatus, SessionLifecycle, SessionState};
use crate::thermal::{SeveritySource, SignalError, ThermalQualityController};

/// External collaborators the policy layer is built around.
pub struct Collaborators {
    pub loader: Arc<dyn AssetLoader>,
    pub severity: Arc<dyn SeveritySource>,
    pub probe: Arc<dyn CapabilityProbe>,
    pub preferences: Arc<dyn PreferenceStore>,
    pub surface: Arc<dyn PresentationSurface>,
    pub feed: Arc<dyn RecognitionFeed>,
}

/// What is currently detected and on screen.
#[derive(Debug, Default)]
struct Shown {
    /// Identifiers in the latest snapshot.
    detected: HashSet<String>,
    /// Record last sent to the surface, and its detection confidence.
    rendered: Option<(AssetKey, f32)>,
}

/// The AR policy layer with its background tasks.
///
/// Start with [`ArApp::start`] and stop with [`ArApp::shutdown`].
///
/// ```ignore
/// let app = ArApp::start(AppConfig::default(), collaborators).await?;
/// // detections arrive through the feed; failures through report_failure
/// app.backgrounded()?;
/// app.foregrounded()?;
/// app.shutdown().await;
/// ```
pub struct ArApp {
    config: AppConfig,
    cache: Arc<AssetCache>,
    thermal: Arc<ThermalQualityController>,
    policy: Arc<FallbackPolicy>,
    surface: Arc<dyn PresentationSurface>,
    preferences: Arc<dyn PreferenceStore>,
    probe: Arc<dyn CapabilityProbe>,
    feed: Arc<dyn RecognitionFeed>,
    session: RwLock<Option<Arc<SessionLifecycle>>>,
    // Serializes session creation.
    session_start: tokio::sync::Mutex<()>,
    shown: Mutex<Shown>,
    cancellation: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    // (thermal, policy) listener registrations.
    subscriptions: Mutex<Option<(SubscriptionId, SubscriptionId)>>,
}

impl std::fmt::Debug for ArApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArApp")
            .field("session", &self.session_state())
            .field("tier", &self.thermal.current_tier())
            .finish_non_exhaustive()
    }
}

impl ArApp {
    /// Build all components and start the background tasks.
    ///
    /// This method:
    /// 1. Creates the thermal controller, asset cache and fallback policy
    /// 2. Spawns the thermal sampling loop and the recognition feed loop
    ///    (the cache and sampler stay paused until a session is active)
    /// 3. Starts an AR session if the `ar_enabled` preference is set
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the preference
    /// store cannot be read.
    pub async fn start(config: AppConfig, collaborators: Collaborators) -> Result<Arc<Self>, AppError> {
        config.validate().map_err(AppError::Config)?;
        info!("Starting AR policy layer");

        let thermal = Arc::new(ThermalQualityController::new(
            config.thermal.clone(),
            collaborators.severity,
        ));
        let cache = Arc::new(AssetCache::new(
            config.cache.clone(),
            collaborators.loader,
            thermal.shared_tier(),
        ));
        let policy = Arc::new(FallbackPolicy::new(
            config.recovery.clone(),
            Arc::clone(&thermal),
            Arc::clone(&cache),
            Arc::clone(&collaborators.surface),
        ));

        info!(
            budget_bytes = config.cache.budget_bytes,
            load_timeout_ms = config.cache.load_timeout.as_millis() as u64,
            sample_interval_ms = config.thermal.sample_interval.as_millis() as u64,
            "Components created"
        );

        let app = Arc::new(Self {
            config,
            cache,
            thermal,
            policy,
            surface: collaborators.surface,
            preferences: collaborators.preferences,
            probe: collaborators.probe,
            feed: collaborators.feed,
            session: RwLock::new(None),
            session_start: tokio::sync::Mutex::new(()),
            shown: Mutex::new(Shown::default()),
            cancellation: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(None),
        });

        app.wire_notifications();
        app.spawn_thermal_loop();
        app.spawn_feed_loop();

        if app.preferences.get_bool(AR_ENABLED_KEY)? {
            app.begin_session().await?;
        } else {
            info!("AR disabled by preference, staying in non-AR mode");
        }

        Ok(app)
    }

    // =========================================================================
    // Wiring
    // =========================================================================

    fn wire_notifications(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let tier_sub = self.thermal.subscribe(move |change| {
            if let Some(app) = weak.upgrade() {
                let degraded = app.policy.on_tier_change(change);
                app.refresh_rendered(&degraded);
            }
        });

        let weak = Arc::downgrade(self);
        let decision_sub = self.policy.subscribe(move |decision| {
            if let FallbackAction::ApplyGracefulDegradation { degraded, .. } = &decision.action {
                if let Some(app) = weak.upgrade() {
                    app.refresh_rendered(degraded);
                }
            }
        });

        *self.subscriptions.lock() = Some((tier_sub, decision_sub));
    }

    fn spawn_thermal_loop(self: &Arc<Self>) {
        let (errors_tx, mut errors_rx) = mpsc::unbounded_channel::<SignalError>();
        let sampler = tokio::spawn(
            Arc::clone(&self.thermal).run(self.cancellation.child_token(), errors_tx),
        );

        // The sampler never handles its own errors; route them to the policy.
        let weak = Arc::downgrade(self);
        let router = tokio::spawn(async move {
            while let Some(error) = errors_rx.recv().await {
                let Some(app) = weak.upgrade() else { break };
                let event = FailureEvent::from_signal_error(&error, app.session_state());
                app.policy.handle(event);
            }
        });

        self.tasks.lock().extend([sampler, router]);
    }

    fn spawn_feed_loop(self: &Arc<Self>) {
        let mut rx = self.feed.subscribe();
        let cancellation = self.cancellation.child_token();
        let weak = Arc::downgrade(self);

        let handle = tokio::spawn(async move {
            let initial = rx.borrow_and_update().clone();
            if !initial.is_empty() {
                if let Some(app) = weak.upgrade() {
                    app.handle_detections(&initial).await;
                }
            }

            loop {
                tokio::select! {
                    biased;

                    _ = cancellation.cancelled() => break,

                    changed = rx.changed() => {
                        if changed.is_err() {
                            debug!("Recognition feed closed");
                            break;
                        }
                        let snapshot = rx.borrow_and_update().clone();
                        let Some(app) = weak.upgrade() else { break };
                        app.handle_detections(&snapshot).await;
                    }
                }
            }
        });

        self.tasks.lock().push(handle);
    }

    // =========================================================================
    // Session control
    // =========================================================================

    /// Create a session, run the capability check and start it.
    ///
    /// A new session starts with fresh retry budgets and no degradation
    /// ceiling. Does nothing if a live session already exists. Returns the state the
    /// session ended up in.
    pub async fn begin_session(self: &Arc<Self>) -> Result<SessionState, AppError> {
        let _guard = self.session_start.lock().await;
        if let Some(existing) = self.session() {
            if !existing.state().is_terminal() {
                return Ok(existing.state());
            }
        }

        let session = Arc::new(SessionLifecycle::new(
            Arc::clone(&self.cache),
            Arc::clone(&self.thermal),
        ));
        *self.session.write() = Some(Arc::clone(&session));
        self.policy.attach_session(Arc::clone(&session));
        self.policy.reset_retries();
        self.thermal.end_override();
        *self.shown.lock() = Shown::default();

        match session.run_check(&*self.probe).await? {
            CapabilityStatus::Supported => {
                session.start()?;
                info!(session = session.id(), "AR session active");
            }
            CapabilityStatus::Unsupported(reason) => {
                self.policy.handle(
                    FailureEvent::new(FailureKind::CapabilityUnsupported, session.state())
                        .with_detail(reason),
                );
            }
            CapabilityStatus::PermissionDenied => {
                self.policy.handle(
                    FailureEvent::new(FailureKind::PermissionDenied, session.state())
                        .with_detail("AR permission denied"),
                );
            }
        }
        Ok(session.state())
    }

    /// Persist the `ar_enabled` preference and start or end the session.
    pub async fn set_ar_enabled(self: &Arc<Self>, enabled: bool) -> Result<SessionState, AppError> {
        self.preferences.set_bool(AR_ENABLED_KEY, enabled)?;
        if enabled {
            self.begin_session().await
        } else {
            self.dispose();
            Ok(self.session_state())
        }
    }

    pub fn backgrounded(&self) -> Result<(), AppError> {
        self.require_session()?.backgrounded()?;
        Ok(())
    }

    pub fn foregrounded(&self) -> Result<(), AppError> {
        self.require_session()?.foregrounded()?;
        Ok(())
    }

    /// Dispose the current session, if any. The cache is cleared.
    pub fn dispose(&self) {
        if let Some(session) = self.session() {
            session.dispose();
        }
        *self.shown.lock() = Shown::default();
    }

    /// Cancel background tasks, dispose the session and wait for the tasks
    /// to finish.
    pub async fn shutdown(&self) {
        info!("Shutting down AR policy layer");
        self.cancellation.cancel();
        self.dispose();
        self.policy.detach_session();

        if let Some((tier_sub, decision_sub)) = self.subscriptions.lock().take() {
            self.thermal.unsubscribe(tier_sub);
            self.policy.unsubscribe(decision_sub);
        }

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                if e.is_panic() {
                    warn!(error = %e, "Background task panicked");
                }
            }
        }
        info!("AR policy layer stopped");
    }

    fn require_session(&self) -> Result<Arc<SessionLifecycle>, AppError> {
        self.session().ok_or(AppError::NoSession)
    }

    // =========================================================================
    // Detections and rendering
    // =========================================================================

    /// Process one recognition snapshot.
    ///
    /// Models that left the snapshot are released, the top detection is
    /// resolved at the current tier and rendered. Returns the rendered
    /// record, if any.
    pub async fn handle_detections(self: &Arc<Self>, snapshot: &[Detection]) -> Option<Arc<AssetRecord>> {
        if !self.session().is_some_and(|s| s.is_active()) {
            debug!(detections = snapshot.len(), "Ignoring detections, no active session");
            return None;
        }

        let current: HashSet<String> = snapshot.iter().map(|d| d.identifier.clone()).collect();
        let departed: Vec<String> = {
            let mut shown = self.shown.lock();
            let departed: Vec<String> = shown.detected.difference(&current).cloned().collect();
            if shown
                .rendered
                .as_ref()
                .is_some_and(|(key, _)| !current.contains(&key.identifier))
            {
                shown.rendered = None;
            }
            shown.detected = current;
            departed
        };
        for identifier in &departed {
            self.cache.release(identifier);
        }

        let top = top_detection(snapshot)?.clone();
        self.show(&top).await
    }

    async fn show(self: &Arc<Self>, detection: &Detection) -> Option<Arc<AssetRecord>> {
        match self.cache.resolve_current(&detection.identifier).await {
            Ok(record) => {
                self.render(Arc::clone(&record), detection.confidence);
                Some(record)
            }
            Err(error) => {
                let fallback = match &error {
                    CacheError::BudgetExceeded { key, .. } => key
                        .tier
                        .lower()
                        .and_then(|tier| self.cache.resident_at_or_below(&key.identifier, tier)),
                    _ => None,
                };
                if let Some(record) = &fallback {
                    debug!(key = %record.key(), "Serving resident lower tier");
                    self.render(Arc::clone(record), detection.confidence);
                }
                self.report_cache_error(&error, detection);
                fallback
            }
        }
    }

    fn render(&self, record: Arc<AssetRecord>, confidence: f32) {
        let previous = self
            .shown
            .lock()
            .rendered
            .replace((record.key().clone(), confidence));

        let same = previous.as_ref().is_some_and(|(key, _)| key == record.key());
        if !same {
            if let Some((key, _)) = previous {
                self.unpin_identifier(&key.identifier);
            }
            if !self.cache.pin(record.key()) {
                debug!(key = %record.key(), "Rendered record no longer resident");
            }
        }

        let hint = PlacementHint {
            confidence,
            lod: self.cache.lod().settings(record.tier()),
        };
        self.surface.render(record, hint);
    }

    fn unpin_identifier(&self, identifier: &str) {
        for key in self
            .cache
            .pinned_keys()
            .into_iter()
            .filter(|key| key.identifier == identifier)
        {
            self.cache.unpin(&key);
        }
    }

    /// Re-render if the record on screen was replaced by degradation.
    fn refresh_rendered(&self, degraded: &[AssetKey]) {
        let Some((current, confidence)) = self.shown.lock().rendered.clone() else {
            return;
        };
        // The last entry for an identifier is its final tier.
        let Some(replacement) = degraded
            .iter()
            .rev()
            .find(|key| key.identifier == current.identifier && **key != current)
        else {
            return;
        };
        let Some(record) = self.cache.get(replacement) else {
            return;
        };

        self.shown.lock().rendered = Some((replacement.clone(), confidence));
        let hint = PlacementHint {
            confidence,
            lod: self.cache.lod().settings(record.tier()),
        };
        self.surface.render(record, hint);
    }

    // =========================================================================
    // Failures and recovery
    // =========================================================================

    /// Report a failure observed outside the cache (renderer, platform).
    pub fn report_failure(&self, event: FailureEvent) -> FallbackAction {
        self.policy.handle(event)
    }

    /// Report a failure of `kind` stamped now in the current session state.
    pub fn report_failure_kind(&self, kind: FailureKind) -> FallbackAction {
        self.report_failure(FailureEvent::new(kind, self.session_state()))
    }

    fn report_cache_error(self: &Arc<Self>, error: &CacheError, detection: &Detection) {
        let Some(event) = FailureEvent::from_cache_error(error, self.session_state()) else {
            debug!(error = %error, "Resolve refused by cache gate");
            return;
        };
        if let FallbackAction::ScheduleAutoRecovery { delay, .. } = self.policy.handle(event) {
            self.schedule_retry(detection.clone(), delay);
        }
    }

    fn schedule_retry(self: &Arc<Self>, detection: Detection, delay: Duration) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let cancellation = self.cancellation.child_token();

        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancellation.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            let Some(app) = weak.upgrade() else { return };
            if !app.still_wanted(&detection.identifier) {
                debug!(identifier = %detection.identifier, "Retry dropped, no longer detected");
                return;
            }
            debug!(identifier = %detection.identifier, "Retrying resolve");
            app.show(&detection).await;
        });

        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    fn still_wanted(&self, identifier: &str) -> bool {
        self.session().is_some_and(|s| s.is_active()) && self.shown.lock().detected.contains(identifier)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<AssetCache> {
        &self.cache
    }

    pub fn thermal(&self) -> &Arc<ThermalQualityController> {
        &self.thermal
    }

    pub fn policy(&self) -> &Arc<FallbackPolicy> {
        &self.policy
    }

    pub fn session(&self) -> Option<Arc<SessionLifecycle>> {
        self.session.read().clone()
    }

    /// State of the current session, `Uninitialized` if there is none.
    pub fn session_state(&self) -> SessionState {
        self.session()
            .map_or(SessionState::Uninitialized, |s| s.state())
    }

    /// Key of the record currently on screen.
    pub fn rendered(&self) -> Option<AssetKey> {
        self.shown.lock().rendered.as_ref().map(|(key, _)| key.clone())
    }
}
