//! ARPolicy - resource and degradation policy for AR rendering clients
//!
//! This library decides which 3D model variant to keep in memory, lowers
//! visual quality under thermal pressure, tracks the AR session lifecycle
//! and chooses a response to every failure. Rendering, recognition and
//! platform capability checks stay with the host; they are reached through
//! the traits in [`asset`], [`thermal`], [`session`], [`feed`] and
//! [`presentation`].
//!
//! [`app::ArApp`] wires the components together.

pub mod app;
pub mod asset;
pub mod config;
pub mod events;
pub mod fallback;
pub mod feed;
pub mod logging;
pub mod preferences;
pub mod presentation;
pub mod quality;
pub mod session;
pub mod thermal;

pub use quality::QualityTier;
