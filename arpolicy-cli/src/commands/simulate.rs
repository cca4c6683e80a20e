//! Simulate command - drive the policy layer with synthetic inputs.
//!
//! A synthetic loader, a triangle-shaped thermal ramp and a rotating set of
//! detections stand in for the platform. Every presentation instruction is
//! printed to stdout as one JSON object per line.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arpolicy::app::{AppConfig, ArApp, Collaborators};
use arpolicy::asset::{AssetLoader, BoxFuture, LoadError, LoadedAsset, PayloadHandle};
use arpolicy::config::{format_size, parse_size};
use arpolicy::feed::{Detection, WatchFeed};
use arpolicy::preferences::{IniPreferenceStore, MemoryPreferenceStore, PreferenceStore};
use arpolicy::presentation::{ChannelSurface, PresentationEvent};
use arpolicy::quality::{LodProfile, QualityTier};
use arpolicy::session::{CapabilityStatus, StaticCapability};
use arpolicy::thermal::SharedSeverity;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the simulate command.
pub struct SimulateArgs {
    pub duration_secs: u64,
    pub tick_ms: u64,
    pub models: Vec<String>,
    pub heat: f32,
    pub model_size: String,
    pub load_delay_ms: u64,
    pub budget: Option<String>,
    pub fail: Vec<String>,
    pub unsupported: bool,
    pub use_preferences: bool,
}

/// Loader producing placeholder payloads sized by tier.
struct SyntheticLoader {
    high_bytes: u64,
    lod: LodProfile,
    delay: Duration,
    failing: HashSet<String>,
}

impl AssetLoader for SyntheticLoader {
    fn load(
        &self,
        identifier: &str,
        tier: QualityTier,
    ) -> BoxFuture<'_, Result<LoadedAsset, LoadError>> {
        let identifier = identifier.to_string();
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            if self.failing.contains(&identifier) {
                return Err(LoadError::Io(format!("{identifier}: synthetic failure")));
            }
            let bytes = self
                .lod
                .rescale_bytes(self.high_bytes, QualityTier::High, tier);
            Ok(LoadedAsset::new(PayloadHandle::new(identifier), bytes))
        })
    }
}

/// Severity rising linearly to `peak` at the midpoint and back to zero.
fn triangle_severity(elapsed: Duration, total: Duration, peak: f32) -> f32 {
    if total.is_zero() {
        return 0.0;
    }
    let t = (elapsed.as_secs_f32() / total.as_secs_f32()).clamp(0.0, 1.0);
    peak * (1.0 - (2.0 * t - 1.0).abs())
}

/// Snapshot for tick `tick`: one model in focus, the others faint.
fn detections_at(models: &[String], tick: u64, ticks_per_model: u64) -> Vec<Detection> {
    if models.is_empty() {
        return Vec::new();
    }
    let focus = ((tick / ticks_per_model.max(1)) as usize) % models.len();
    models
        .iter()
        .enumerate()
        .map(|(i, id)| Detection::new(id.clone(), if i == focus { 0.9 } else { 0.4 }))
        .collect()
}

/// Run the simulate command.
pub fn run(args: SimulateArgs, runner: &CliRunner) -> Result<(), CliError> {
    runner.log_startup("simulate");
    let file = runner.config();

    let mut config = AppConfig::from_config_file(file);
    if let Some(budget) = &args.budget {
        config.cache.budget_bytes =
            parse_size(budget).map_err(|e| CliError::Config(e.to_string()))?;
    }
    let high_bytes =
        parse_size(&args.model_size).map_err(|e| CliError::Config(e.to_string()))?;
    if !(0.0..=1.0).contains(&args.heat) {
        return Err(CliError::Config(format!(
            "--heat must be between 0.0 and 1.0, got {}",
            args.heat
        )));
    }

    let preferences: Arc<dyn PreferenceStore> = if args.use_preferences {
        Arc::new(IniPreferenceStore::new(&file.preferences.file))
    } else {
        Arc::new(MemoryPreferenceStore::ar_enabled())
    };
    let capability = if args.unsupported {
        CapabilityStatus::Unsupported("simulated device without AR support".to_string())
    } else {
        CapabilityStatus::Supported
    };

    eprintln!(
        "Simulating {}s: {} model(s), budget {}, model size {}, peak heat {:.2}",
        args.duration_secs,
        args.models.len(),
        format_size(config.cache.budget_bytes),
        format_size(high_bytes),
        args.heat
    );
    eprintln!("Logging to {}", runner.log_path().display());

    let loader = SyntheticLoader {
        high_bytes,
        lod: config.cache.lod.clone(),
        delay: Duration::from_millis(args.load_delay_ms),
        failing: args.fail.iter().cloned().collect(),
    };

    let runtime = Runtime::new().map_err(CliError::Runtime)?;
    runtime.block_on(simulate(args, config, loader, preferences, capability))
}

async fn simulate(
    args: SimulateArgs,
    config: AppConfig,
    loader: SyntheticLoader,
    preferences: Arc<dyn PreferenceStore>,
    capability: CapabilityStatus,
) -> Result<(), CliError> {
    let cancellation = CancellationToken::new();
    let on_signal = cancellation.clone();
    ctrlc::set_handler(move || {
        eprintln!();
        eprintln!("Received shutdown signal, stopping simulation...");
        on_signal.cancel();
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

    let severity = SharedSeverity::new(0.0);
    let feed = Arc::new(WatchFeed::new());
    let (surface, events) = ChannelSurface::new();
    let printer = tokio::spawn(print_events(events));

    let app = ArApp::start(
        config,
        Collaborators {
            loader: Arc::new(loader),
            severity: Arc::new(severity.clone()),
            probe: Arc::new(StaticCapability(capability)),
            preferences,
            surface: Arc::new(surface),
            feed: Arc::clone(&feed) as _,
        },
    )
    .await?;
    info!(state = %app.session_state(), "Simulation started");

    let total = Duration::from_secs(args.duration_secs);
    let tick = Duration::from_millis(args.tick_ms.max(10));
    // Focus moves to the next model every ~3 seconds.
    let ticks_per_model = (3_000 / tick.as_millis().max(1) as u64).max(1);
    let started = Instant::now();

    let mut interval = tokio::time::interval(tick);
    let mut n = 0u64;
    loop {
        tokio::select! {
            biased;
            _ = cancellation.cancelled() => break,
            _ = interval.tick() => {}
        }
        let elapsed = started.elapsed();
        if elapsed >= total {
            break;
        }
        severity.set(triangle_severity(elapsed, total, args.heat));
        feed.publish(detections_at(&args.models, n, ticks_per_model));
        n += 1;
    }

    let stats = app.cache().stats();
    let tier = app.thermal().current_tier();
    let state = app.session_state();
    let failures = app.policy().recent_failures().len();
    app.shutdown().await;
    // Dropping the app closes the surface channel so the printer finishes.
    drop(app);
    let _ = printer.await;

    eprintln!();
    eprintln!("Session:  {}", state);
    eprintln!("Tier:     {}", tier);
    eprintln!("Cache:    {}", stats);
    eprintln!("Failures: {}", failures);
    Ok(())
}

async fn print_events(mut events: mpsc::UnboundedReceiver<PresentationEvent>) {
    while let Some(event) = events.recv().await {
        match serde_json::to_string(&event.view()) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::warn!(error = %e, "Failed to serialize presentation event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triangle_severity_peaks_at_midpoint() {
        let total = Duration::from_secs(10);
        assert_eq!(triangle_severity(Duration::ZERO, total, 0.8), 0.0);
        assert!((triangle_severity(Duration::from_secs(5), total, 0.8) - 0.8).abs() < 1e-6);
        assert!((triangle_severity(Duration::from_secs(10), total, 0.8)).abs() < 1e-6);
        assert_eq!(triangle_severity(Duration::from_secs(1), Duration::ZERO, 0.8), 0.0);
    }

    #[test]
    fn test_detections_rotate_focus() {
        let models = vec!["a".to_string(), "b".to_string()];
        let first = detections_at(&models, 0, 2);
        assert_eq!(first[0].confidence, 0.9);
        assert_eq!(first[1].confidence, 0.4);

        let later = detections_at(&models, 2, 2);
        assert_eq!(later[0].confidence, 0.4);
        assert_eq!(later[1].confidence, 0.9);

        assert!(detections_at(&[], 5, 2).is_empty());
    }

    #[tokio::test]
    async fn test_synthetic_loader_scales_by_tier() {
        let loader = SyntheticLoader {
            high_bytes: 8_000,
            lod: LodProfile::default(),
            delay: Duration::ZERO,
            failing: ["bad".to_string()].into_iter().collect(),
        };
        let high = loader.load("ok", QualityTier::High).await.unwrap();
        let low = loader.load("ok", QualityTier::Low).await.unwrap();
        assert_eq!(high.estimated_bytes, 8_000);
        assert_eq!(low.estimated_bytes, 2_000);
        assert!(loader.load("bad", QualityTier::High).await.is_err());
    }
}
