//! Application bootstrap and lifecycle management.
//!
//! This module provides the [`ArApp`] type which builds the policy
//! components in the right order, connects their notifications and owns the
//! background tasks that drive them.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                              ArApp                               │
//! │                                                                  │
//! │  SeveritySource ─► ThermalQualityController ──(SharedTier)──┐    │
//! │                      │ TierChange                           │    │
//! │                      ▼                                      ▼    │
//! │  RecognitionFeed ─► detections ─► AssetCache ◄─ AssetLoader      │
//! │                                      │                           │
//! │  failures ─────────► FallbackPolicy ◄┘                           │
//! │                          │                                       │
//! │  CapabilityProbe ─► SessionLifecycle ─► pause / resume / close   │
//! │                          │                                       │
//! │                          ▼                                       │
//! │                  PresentationSurface                             │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use arpolicy::app::{AppConfig, ArApp, Collaborators};
//!
//! let app = ArApp::start(AppConfig::default(), collaborators).await?;
//!
//! app.backgrounded()?;
//! app.foregrounded()?;
//!
//! app.shutdown().await;
//! ```

mod bootstrap;
mod config;
mod error;

pub use bootstrap::{ArApp, Collaborators};
pub use config::AppConfig;
pub use error::AppError;
