//! Failure classification and response.
//!
//! # Decision Order
//!
//! First match wins:
//!
//! | # | condition                                          | action                  |
//! |---|----------------------------------------------------|-------------------------|
//! | 1 | `CapabilityUnsupported`, `PermissionDenied`        | show fallback UI        |
//! | 2 | transient and retry budget left for the kind       | schedule auto-recovery  |
//! | 3 | `ResourceExhausted`, `RenderBudgetExceeded`        | graceful degradation    |
//! | 4 | anything else                                      | show minimal error      |
//!
//! The policy only decides on and applies the session, tier and cache
//! effects. Executing a scheduled retry is up to the caller, which gets the
//! attempt number and delay in [`FallbackAction::ScheduleAutoRecovery`].

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::failure::{FailureEvent, FailureKind};
use super::retry::{RecoveryConfig, RetryBudget, RetryGrant};
use crate::asset::{AssetCache, AssetKey};
use crate::events::{SubscriptionId, Subscribers};
use crate::presentation::PresentationSurface;
use crate::quality::QualityTier;
use crate::session::{SessionError, SessionLifecycle, SessionState};
use crate::thermal::{ThermalQualityController, TierChange, TierChangeCause};

/// Response chosen for one failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackAction {
    /// The session was failed and the non-AR presentation shown.
    ShowFallbackUi { reason: String },
    /// The failed operation should be retried after `delay`.
    ScheduleAutoRecovery { attempt: u32, delay: Duration },
    /// The tier was forced to `tier` and these pinned records degraded.
    ApplyGracefulDegradation {
        tier: QualityTier,
        degraded: Vec<AssetKey>,
    },
    /// A transient notice was shown.
    ShowMinimalError { message: String },
}

impl FallbackAction {
    pub fn name(&self) -> &'static str {
        match self {
            FallbackAction::ShowFallbackUi { .. } => "show_fallback_ui",
            FallbackAction::ScheduleAutoRecovery { .. } => "schedule_auto_recovery",
            FallbackAction::ApplyGracefulDegradation { .. } => "apply_graceful_degradation",
            FallbackAction::ShowMinimalError { .. } => "show_minimal_error",
        }
    }
}

/// A failure together with the response taken, delivered to subscribers.
#[derive(Debug, Clone)]
pub struct FallbackDecision {
    pub event: FailureEvent,
    pub action: FallbackAction,
}

/// Which rule matched, before its effects are applied.
enum Rule {
    FallbackUi,
    Recover(RetryGrant),
    Degrade,
    MinimalError,
}

struct PolicyState {
    retry: RetryBudget,
    history: VecDeque<FailureEvent>,
    history_size: usize,
}

impl PolicyState {
    fn record(&mut self, event: &FailureEvent) {
        if self.history_size == 0 {
            return;
        }
        while self.history.len() >= self.history_size {
            self.history.pop_front();
        }
        self.history.push_back(event.clone());
    }
}

/// Single decision point for recovery, degradation and user-visible errors.
pub struct FallbackPolicy {
    thermal: Arc<ThermalQualityController>,
    cache: Arc<AssetCache>,
    surface: Arc<dyn PresentationSurface>,
    session: RwLock<Option<Arc<SessionLifecycle>>>,
    state: Mutex<PolicyState>,
    subscribers: Subscribers<FallbackDecision>,
}

impl std::fmt::Debug for FallbackPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackPolicy")
            .field("history", &self.state.lock().history.len())
            .finish_non_exhaustive()
    }
}

impl FallbackPolicy {
    pub fn new(
        config: RecoveryConfig,
        thermal: Arc<ThermalQualityController>,
        cache: Arc<AssetCache>,
        surface: Arc<dyn PresentationSurface>,
    ) -> Self {
        let history_size = config.history_size;
        Self {
            thermal,
            cache,
            surface,
            session: RwLock::new(None),
            state: Mutex::new(PolicyState {
                retry: RetryBudget::new(config),
                history: VecDeque::with_capacity(history_size),
                history_size,
            }),
            subscribers: Subscribers::new(),
        }
    }

    /// Set the session that fallback-UI decisions fail.
    pub fn attach_session(&self, session: Arc<SessionLifecycle>) {
        *self.session.write() = Some(session);
    }

    pub fn detach_session(&self) {
        *self.session.write() = None;
    }

    fn session(&self) -> Option<Arc<SessionLifecycle>> {
        self.session.read().clone()
    }

    /// Classify `event`, apply its effects and return the action taken.
    pub fn handle(&self, event: FailureEvent) -> FallbackAction {
        let rule = {
            let mut state = self.state.lock();
            state.record(&event);
            Self::classify(&mut state.retry, &event)
        };

        let action = match rule {
            Rule::FallbackUi => self.show_fallback_ui(&event),
            Rule::Recover(grant) => {
                info!(
                    kind = %event.kind,
                    subject = ?event.subject,
                    attempt = grant.attempt,
                    delay_ms = grant.delay.as_millis() as u64,
                    "Scheduling auto-recovery"
                );
                FallbackAction::ScheduleAutoRecovery {
                    attempt: grant.attempt,
                    delay: grant.delay,
                }
            }
            Rule::Degrade => self.degrade(&event),
            Rule::MinimalError => {
                warn!(kind = %event.kind, detail = %event.detail, "AR failure");
                self.surface.show_minimal_error(&event.detail);
                FallbackAction::ShowMinimalError {
                    message: event.detail.clone(),
                }
            }
        };

        self.subscribers.publish(&FallbackDecision {
            event,
            action: action.clone(),
        });
        action
    }

    fn classify(retry: &mut RetryBudget, event: &FailureEvent) -> Rule {
        match event.kind {
            FailureKind::CapabilityUnsupported | FailureKind::PermissionDenied => {
                return Rule::FallbackUi
            }
            _ => {}
        }
        if event.transient {
            if let Some(grant) = retry.try_acquire(event.kind, event.timestamp) {
                return Rule::Recover(grant);
            }
            debug!(kind = %event.kind, "Retry budget exhausted");
        }
        match event.kind {
            FailureKind::ResourceExhausted | FailureKind::RenderBudgetExceeded => Rule::Degrade,
            _ => Rule::MinimalError,
        }
    }

    fn show_fallback_ui(&self, event: &FailureEvent) -> FallbackAction {
        let reason = event.detail.clone();
        if let Some(session) = self.session() {
            if let Err(SessionError::InvalidTransition { from, .. }) =
                session.fatal_failure(&reason)
            {
                // Outside Active/Suspended the session still has to end.
                match from {
                    SessionState::Checking => {
                        if let Err(e) = session.capability_absent(&reason) {
                            debug!(error = %e, "Session already left checking");
                        }
                    }
                    state if state.is_terminal() => {}
                    _ => session.dispose(),
                }
            }
        }
        warn!(kind = %event.kind, reason = %reason, "Falling back to non-AR presentation");
        self.surface.show_fallback_ui(&reason);
        FallbackAction::ShowFallbackUi { reason }
    }

    fn degrade(&self, event: &FailureEvent) -> FallbackAction {
        let target = self.thermal.current_tier().lower_clamped();
        let previous = self.thermal.force_tier(target);
        let degraded = self.degrade_pinned(target);

        info!(
            kind = %event.kind,
            from = %previous,
            to = %target,
            degraded = degraded.len(),
            "Applied graceful degradation"
        );
        FallbackAction::ApplyGracefulDegradation {
            tier: target,
            degraded,
        }
    }

    /// Degrade every pinned record above `target` until it is at `target`.
    ///
    /// Returns each record produced, in order.
    fn degrade_pinned(&self, target: QualityTier) -> Vec<AssetKey> {
        let identifiers: BTreeSet<String> = self
            .cache
            .pinned_keys()
            .into_iter()
            .filter(|key| key.tier > target)
            .map(|key| key.identifier)
            .collect();

        let mut degraded = Vec::new();
        for identifier in identifiers {
            loop {
                match self.cache.degrade(&identifier) {
                    Ok(record) => {
                        let tier = record.tier();
                        degraded.push(record.key().clone());
                        if tier <= target {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(identifier = %identifier, error = %e, "Could not degrade pinned asset");
                        break;
                    }
                }
            }
        }
        degraded
    }

    /// React to a tier change from the thermal sampler.
    ///
    /// A sampled step down degrades pinned records to the new tier. Forced
    /// changes are already handled by [`handle`](Self::handle) and restorations
    /// take effect on the next resolve.
    pub fn on_tier_change(&self, change: &TierChange) -> Vec<AssetKey> {
        if change.cause != TierChangeCause::Escalated {
            return Vec::new();
        }
        let degraded = self.degrade_pinned(change.current);
        if !degraded.is_empty() {
            info!(
                tier = %change.current,
                degraded = degraded.len(),
                "Degraded pinned assets after thermal step down"
            );
        }
        degraded
    }

    // =========================================================================
    // Observation
    // =========================================================================

    /// Failure events currently held in the history ring, oldest first.
    pub fn recent_failures(&self) -> Vec<FailureEvent> {
        self.state.lock().history.iter().cloned().collect()
    }

    /// Forget retry attempts, e.g. once a new session starts.
    pub fn reset_retries(&self) {
        self.state.lock().retry.reset();
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&FallbackDecision) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::test_support::ScriptedLoader;
    use crate::asset::CacheConfig;
    use crate::presentation::{ChannelSurface, PresentationEvent};
    use crate::session::{CapabilityStatus, StaticCapability};
    use crate::thermal::{SharedSeverity, ThermalConfig};
    use std::time::Instant;
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Fixture {
        policy: FallbackPolicy,
        session: Arc<SessionLifecycle>,
        cache: Arc<AssetCache>,
        thermal: Arc<ThermalQualityController>,
        events: UnboundedReceiver<PresentationEvent>,
    }

    async fn fixture() -> Fixture {
        let thermal = Arc::new(ThermalQualityController::new(
            ThermalConfig::default(),
            Arc::new(SharedSeverity::default()),
        ));
        let cache = Arc::new(AssetCache::new(
            CacheConfig::default(),
            Arc::new(ScriptedLoader::new(1000)),
            thermal.shared_tier(),
        ));
        let session = Arc::new(SessionLifecycle::new(
            Arc::clone(&cache),
            Arc::clone(&thermal),
        ));
        session
            .run_check(&StaticCapability(CapabilityStatus::Supported))
            .await
            .unwrap();
        session.start().unwrap();

        let (surface, events) = ChannelSurface::new();
        let policy = FallbackPolicy::new(
            RecoveryConfig::default(),
            Arc::clone(&thermal),
            Arc::clone(&cache),
            Arc::new(surface),
        );
        policy.attach_session(Arc::clone(&session));
        Fixture {
            policy,
            session,
            cache,
            thermal,
            events,
        }
    }

    fn failure(kind: FailureKind, at: Instant) -> FailureEvent {
        FailureEvent::new(kind, SessionState::Active).at(at)
    }

    // =========================================================================
    // Fallback UI
    // =========================================================================

    #[tokio::test]
    async fn test_permission_denied_fails_session() {
        let mut f = fixture().await;
        let action = f
            .policy
            .handle(failure(FailureKind::PermissionDenied, Instant::now()).with_detail("camera denied"));

        assert_eq!(
            action,
            FallbackAction::ShowFallbackUi {
                reason: "camera denied".into()
            }
        );
        assert_eq!(f.session.state(), SessionState::Unsupported);
        match f.events.try_recv().unwrap() {
            PresentationEvent::ShowFallbackUi { reason } => assert_eq!(reason, "camera denied"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_capability_unsupported_wins_over_transient() {
        let f = fixture().await;
        let action = f.policy.handle(
            failure(FailureKind::CapabilityUnsupported, Instant::now()).with_transient(true),
        );
        assert_eq!(action.name(), "show_fallback_ui");
    }

    #[tokio::test]
    async fn test_fallback_ui_from_ready_disposes() {
        let f = fixture().await;
        let session = Arc::new(SessionLifecycle::new(
            Arc::clone(&f.cache),
            Arc::clone(&f.thermal),
        ));
        session
            .run_check(&StaticCapability(CapabilityStatus::Supported))
            .await
            .unwrap();
        f.policy.attach_session(Arc::clone(&session));

        f.policy
            .handle(failure(FailureKind::CapabilityUnsupported, Instant::now()));
        assert_eq!(session.state(), SessionState::Disposed);
    }

    // =========================================================================
    // Auto-recovery
    // =========================================================================

    #[tokio::test]
    async fn test_load_error_retry_budget() {
        let mut f = fixture().await;
        let t0 = Instant::now();
        let at = |secs: u64| failure(FailureKind::LoadError, t0 + Duration::from_secs(secs)).with_subject("X");

        let actions: Vec<_> = [0, 4, 9, 14].into_iter().map(|s| f.policy.handle(at(s))).collect();

        assert_eq!(
            actions[..3],
            [
                FallbackAction::ScheduleAutoRecovery {
                    attempt: 1,
                    delay: Duration::from_secs(1)
                },
                FallbackAction::ScheduleAutoRecovery {
                    attempt: 2,
                    delay: Duration::from_secs(3)
                },
                FallbackAction::ScheduleAutoRecovery {
                    attempt: 3,
                    delay: Duration::from_secs(8)
                },
            ]
        );
        assert_eq!(actions[3].name(), "show_minimal_error");
        assert_eq!(f.session.state(), SessionState::Active);

        assert!(matches!(
            f.events.try_recv().unwrap(),
            PresentationEvent::ShowMinimalError { .. }
        ));
        assert!(f.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_retry_budget_is_per_kind() {
        let f = fixture().await;
        let t0 = Instant::now();
        for _ in 0..3 {
            f.policy.handle(failure(FailureKind::LoadTimeout, t0));
        }
        assert_eq!(
            f.policy.handle(failure(FailureKind::LoadTimeout, t0)).name(),
            "show_minimal_error"
        );
        assert_eq!(
            f.policy.handle(failure(FailureKind::LoadError, t0)),
            FallbackAction::ScheduleAutoRecovery {
                attempt: 1,
                delay: Duration::from_secs(1)
            }
        );
    }

    #[tokio::test]
    async fn test_transient_resource_exhaustion_degrades_once_budget_spent() {
        let f = fixture().await;
        let t0 = Instant::now();
        let event = || failure(FailureKind::ResourceExhausted, t0).with_transient(true);
        for _ in 0..3 {
            assert_eq!(f.policy.handle(event()).name(), "schedule_auto_recovery");
        }
        assert_eq!(f.policy.handle(event()).name(), "apply_graceful_degradation");
    }

    // =========================================================================
    // Graceful degradation
    // =========================================================================

    #[tokio::test]
    async fn test_resource_exhausted_steps_down_and_clamps() {
        let f = fixture().await;
        let record = f.cache.resolve("A", QualityTier::High).await.unwrap();
        f.cache.pin(record.key());

        let t0 = Instant::now();
        let mut tiers = Vec::new();
        for i in 0..3 {
            let action = f.policy.handle(failure(
                FailureKind::ResourceExhausted,
                t0 + Duration::from_millis(i * 1500),
            ));
            match action {
                FallbackAction::ApplyGracefulDegradation { tier, .. } => tiers.push(tier),
                other => panic!("unexpected {other:?}"),
            }
        }

        assert_eq!(
            tiers,
            vec![QualityTier::Medium, QualityTier::Low, QualityTier::Low]
        );
        assert_eq!(f.thermal.current_tier(), QualityTier::Low);
        assert!(f.thermal.is_overridden());
        assert_eq!(f.session.state(), SessionState::Active);

        assert!(!f.cache.contains(&AssetKey::new("A", QualityTier::High)));
        assert!(!f.cache.contains(&AssetKey::new("A", QualityTier::Medium)));
        assert!(f.cache.is_pinned(&AssetKey::new("A", QualityTier::Low)));
    }

    #[tokio::test]
    async fn test_degradation_reports_degraded_keys() {
        let f = fixture().await;
        let record = f.cache.resolve("A", QualityTier::High).await.unwrap();
        f.cache.pin(record.key());
        // Unpinned records are left alone.
        f.cache.resolve("B", QualityTier::High).await.unwrap();

        let action = f
            .policy
            .handle(failure(FailureKind::RenderBudgetExceeded, Instant::now()));
        assert_eq!(
            action,
            FallbackAction::ApplyGracefulDegradation {
                tier: QualityTier::Medium,
                degraded: vec![AssetKey::new("A", QualityTier::Medium)],
            }
        );
        assert!(f.cache.contains(&AssetKey::new("B", QualityTier::High)));
    }

    #[tokio::test]
    async fn test_degradation_below_forced_tier_catches_up() {
        let f = fixture().await;
        let record = f.cache.resolve("A", QualityTier::High).await.unwrap();
        f.cache.pin(record.key());
        f.thermal.force_tier(QualityTier::Medium);

        let action = f
            .policy
            .handle(failure(FailureKind::ResourceExhausted, Instant::now()));
        assert_eq!(
            action,
            FallbackAction::ApplyGracefulDegradation {
                tier: QualityTier::Low,
                degraded: vec![
                    AssetKey::new("A", QualityTier::Medium),
                    AssetKey::new("A", QualityTier::Low),
                ],
            }
        );
    }

    #[tokio::test]
    async fn test_sampled_step_down_degrades_pinned() {
        let f = fixture().await;
        let record = f.cache.resolve("A", QualityTier::High).await.unwrap();
        f.cache.pin(record.key());

        let forced = TierChange {
            previous: QualityTier::High,
            current: QualityTier::Medium,
            cause: TierChangeCause::Forced,
            severity: None,
        };
        assert!(f.policy.on_tier_change(&forced).is_empty());

        let sampled = TierChange {
            cause: TierChangeCause::Escalated,
            severity: Some(0.9),
            ..forced
        };
        assert_eq!(
            f.policy.on_tier_change(&sampled),
            vec![AssetKey::new("A", QualityTier::Medium)]
        );
        // The sampler owns the tier; no override is opened.
        assert!(!f.thermal.is_overridden());
    }

    // =========================================================================
    // Default and bookkeeping
    // =========================================================================

    #[tokio::test]
    async fn test_budget_exceeded_shows_minimal_error() {
        let mut f = fixture().await;
        let action = f.policy.handle(
            failure(FailureKind::BudgetExceeded, Instant::now()).with_detail("no room for A"),
        );
        assert_eq!(
            action,
            FallbackAction::ShowMinimalError {
                message: "no room for A".into()
            }
        );
        assert_eq!(f.thermal.current_tier(), QualityTier::High);
        assert!(matches!(
            f.events.try_recv().unwrap(),
            PresentationEvent::ShowMinimalError { .. }
        ));
    }

    #[tokio::test]
    async fn test_history_ring_is_bounded() {
        let thermal = Arc::new(ThermalQualityController::new(
            ThermalConfig::default(),
            Arc::new(SharedSeverity::default()),
        ));
        let cache = Arc::new(AssetCache::new(
            CacheConfig::default(),
            Arc::new(ScriptedLoader::new(1)),
            thermal.shared_tier(),
        ));
        let (surface, _events) = ChannelSurface::new();
        let policy = FallbackPolicy::new(
            RecoveryConfig {
                history_size: 2,
                ..RecoveryConfig::default()
            },
            thermal,
            cache,
            Arc::new(surface),
        );

        for kind in [
            FailureKind::LoadError,
            FailureKind::BudgetExceeded,
            FailureKind::SignalUnavailable,
        ] {
            policy.handle(failure(kind, Instant::now()));
        }
        let kinds: Vec<_> = policy.recent_failures().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![FailureKind::BudgetExceeded, FailureKind::SignalUnavailable]
        );
    }

    #[tokio::test]
    async fn test_subscribers_receive_decisions() {
        let f = fixture().await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        f.policy
            .subscribe(move |d: &FallbackDecision| sink.lock().push((d.event.kind, d.action.name())));

        f.policy
            .handle(failure(FailureKind::LoadError, Instant::now()));
        assert_eq!(
            *seen.lock(),
            vec![(FailureKind::LoadError, "schedule_auto_recovery")]
        );
    }
}
