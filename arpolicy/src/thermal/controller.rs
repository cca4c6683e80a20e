//! Hysteresis-based quality tier controller.
//!
//! # State Machine
//!
//! ```text
//! High --[severity > escalate for N samples]--> Medium --[...]--> Low
//! Low  --[severity < restore for N samples]---> Medium --[...]--> High
//! any  --[force_tier(t)]--> t   (restoration capped at t while the episode lasts)
//! ```
//!
//! A sample between the two thresholds resets both streaks, so a single
//! spike followed by a normal reading never moves the tier.
//!
//! A degradation episode ends on [`end_override`](ThermalQualityController::end_override)
//! or after `episode_clear_samples` consecutive readings below the restore
//! threshold while the tier sits at the ceiling.
//!
//! A new controller is paused. The session lifecycle resumes it when AR
//! becomes active.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::config::ThermalConfig;
use super::signal::{SeveritySource, SignalError};
use crate::events::{SubscriptionId, Subscribers};
use crate::quality::{QualityTier, SharedTier};

/// Why the tier changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierChangeCause {
    /// Sustained high severity stepped the tier down.
    Escalated,
    /// Sustained low severity stepped the tier up.
    Restored,
    /// Explicit override from the fallback policy.
    Forced,
}

/// Delivered to subscribers once per tier change.
#[derive(Debug, Clone, PartialEq)]
pub struct TierChange {
    pub previous: QualityTier,
    pub current: QualityTier,
    pub cause: TierChangeCause,
    /// Severity of the sample that caused the change (`None` when forced).
    pub severity: Option<f32>,
}

#[derive(Debug)]
struct ThermalInner {
    tier: QualityTier,
    above_streak: u32,
    below_streak: u32,
    /// Restoration ceiling for the current degradation episode.
    override_ceiling: Option<QualityTier>,
    /// Cool samples seen at the ceiling in the current episode.
    quiet_streak: u32,
    last_severity: Option<f32>,
    samples: u64,
}

/// Maps a noisy severity signal to a discrete quality tier.
pub struct ThermalQualityController {
    config: ThermalConfig,
    source: Arc<dyn SeveritySource>,
    tier: SharedTier,
    inner: Mutex<ThermalInner>,
    sampling: AtomicBool,
    subscribers: Subscribers<TierChange>,
}

impl std::fmt::Debug for ThermalQualityController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThermalQualityController")
            .field("config", &self.config)
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl ThermalQualityController {
    /// Create a paused controller starting at `config.max_tier`.
    pub fn new(config: ThermalConfig, source: Arc<dyn SeveritySource>) -> Self {
        let tier = SharedTier::new(config.max_tier);
        Self {
            inner: Mutex::new(ThermalInner {
                tier: config.max_tier,
                above_streak: 0,
                below_streak: 0,
                override_ceiling: None,
                quiet_streak: 0,
                last_severity: None,
                samples: 0,
            }),
            config,
            source,
            tier,
            sampling: AtomicBool::new(false),
            subscribers: Subscribers::new(),
        }
    }

    /// Read the signal once and apply hysteresis.
    ///
    /// Returns the tier after this sample. While sampling is paused the
    /// signal is not read and the current tier is returned unchanged.
    pub fn sample(&self) -> Result<QualityTier, SignalError> {
        if !self.is_sampling() {
            return Ok(self.tier.get());
        }

        let severity = self.source.read_severity()?;
        if !(0.0..=1.0).contains(&severity) {
            return Err(SignalError::OutOfRange(severity));
        }

        let (change, episode_ended) = {
            let mut inner = self.inner.lock();
            inner.samples += 1;
            inner.last_severity = Some(severity);

            let mut next = None;
            let mut episode_ended = false;
            if severity > self.config.escalate_threshold {
                inner.above_streak += 1;
                inner.below_streak = 0;
                inner.quiet_streak = 0;
                if inner.above_streak >= self.config.consecutive_samples {
                    inner.above_streak = 0;
                    next = inner.tier.lower().map(|t| (t, TierChangeCause::Escalated));
                }
            } else if severity < self.config.restore_threshold {
                inner.below_streak += 1;
                inner.above_streak = 0;
                if inner.override_ceiling.is_some_and(|ceiling| inner.tier >= ceiling) {
                    inner.quiet_streak += 1;
                    if inner.quiet_streak >= self.config.episode_clear_samples {
                        inner.override_ceiling = None;
                        inner.quiet_streak = 0;
                        episode_ended = true;
                    }
                }
                if inner.below_streak >= self.config.consecutive_samples {
                    inner.below_streak = 0;
                    let ceiling = inner.override_ceiling.unwrap_or(self.config.max_tier);
                    next = inner
                        .tier
                        .higher()
                        .filter(|t| *t <= ceiling)
                        .map(|t| (t, TierChangeCause::Restored));
                }
            } else {
                inner.above_streak = 0;
                inner.below_streak = 0;
                inner.quiet_streak = 0;
            }

            let change = next.map(|(current, cause)| {
                let previous = inner.tier;
                inner.tier = current;
                self.tier.set(current);
                TierChange {
                    previous,
                    current,
                    cause,
                    severity: Some(severity),
                }
            });
            (change, episode_ended)
        };

        if episode_ended {
            tracing::info!(
                severity = format!("{:.2}", severity),
                "Degradation episode ended, pressure cleared"
            );
        }

        match change {
            Some(change) => {
                tracing::info!(
                    from = %change.previous,
                    to = %change.current,
                    cause = ?change.cause,
                    severity = format!("{:.2}", severity),
                    "Quality tier changed"
                );
                self.subscribers.publish(&change);
                Ok(change.current)
            }
            None => {
                tracing::trace!(severity, tier = %self.tier.get(), "Thermal sample");
                Ok(self.tier.get())
            }
        }
    }

    /// Set the tier explicitly and open a degradation episode.
    ///
    /// Sampling continues from `tier` and may lower it further, but will not
    /// restore above `tier` until the episode ends. Returns the previous tier.
    pub fn force_tier(&self, tier: QualityTier) -> QualityTier {
        let previous = {
            let mut inner = self.inner.lock();
            let previous = inner.tier;
            inner.tier = tier;
            inner.above_streak = 0;
            inner.below_streak = 0;
            inner.quiet_streak = 0;
            inner.override_ceiling = Some(tier);
            self.tier.set(tier);
            previous
        };

        if previous != tier {
            tracing::info!(from = %previous, to = %tier, "Quality tier forced");
            self.subscribers.publish(&TierChange {
                previous,
                current: tier,
                cause: TierChangeCause::Forced,
                severity: None,
            });
        }
        previous
    }

    /// Close the current degradation episode so sampling may restore up to
    /// `max_tier` again.
    pub fn end_override(&self) {
        let mut inner = self.inner.lock();
        inner.quiet_streak = 0;
        if inner.override_ceiling.take().is_some() {
            tracing::debug!(tier = %inner.tier, "Degradation episode ended");
        }
    }

    pub fn is_overridden(&self) -> bool {
        self.inner.lock().override_ceiling.is_some()
    }

    /// Register a listener called once per tier change.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&TierChange) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    pub fn current_tier(&self) -> QualityTier {
        self.tier.get()
    }

    /// Handle on the current tier for readers such as the asset cache.
    pub fn shared_tier(&self) -> SharedTier {
        self.tier.clone()
    }

    pub fn last_severity(&self) -> Option<f32> {
        self.inner.lock().last_severity
    }

    pub fn sample_count(&self) -> u64 {
        self.inner.lock().samples
    }

    pub fn config(&self) -> &ThermalConfig {
        &self.config
    }

    /// Stop reading the signal (session suspended).
    pub fn pause(&self) {
        if self.sampling.swap(false, Ordering::AcqRel) {
            tracing::debug!("Thermal sampling paused");
        }
    }

    /// Resume reading the signal.
    pub fn resume(&self) {
        if !self.sampling.swap(true, Ordering::AcqRel) {
            tracing::debug!("Thermal sampling resumed");
        }
    }

    pub fn is_sampling(&self) -> bool {
        self.sampling.load(Ordering::Acquire)
    }

    /// Sample on `config.sample_interval` until cancelled.
    ///
    /// Signal errors are forwarded on `errors` rather than handled here.
    /// Only the first error of an outage is forwarded; a good reading (or a
    /// paused tick) ends the outage.
    pub async fn run(
        self: Arc<Self>,
        cancellation: CancellationToken,
        errors: mpsc::UnboundedSender<SignalError>,
    ) {
        let mut interval = tokio::time::interval(self.config.sample_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;

        tracing::info!(
            interval_ms = self.config.sample_interval.as_millis() as u64,
            "Thermal sampling started"
        );

        let mut outage = false;
        loop {
            tokio::select! {
                biased;

                _ = cancellation.cancelled() => break,

                _ = interval.tick() => match self.sample() {
                    Ok(_) => {
                        if outage {
                            tracing::info!("Thermal signal recovered");
                            outage = false;
                        }
                    }
                    Err(e) if outage => {
                        tracing::debug!(error = %e, "Thermal signal still unavailable");
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Thermal sample failed");
                        outage = true;
                        if errors.send(e).is_err() {
                            break;
                        }
                    }
                },
            }
        }

        tracing::info!("Thermal sampling stopped");
    }
}
