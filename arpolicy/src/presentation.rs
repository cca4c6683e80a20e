//! Presentation surface boundary.
//!
//! The core never draws anything. It emits [`PresentationEvent`]s to a
//! [`PresentationSurface`] supplied by the host.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::asset::AssetRecord;
use crate::quality::{LodSettings, QualityTier};

/// Where and how a rendered model should be placed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlacementHint {
    /// Confidence of the detection that produced the render.
    pub confidence: f32,
    /// Quality settings for the record's tier.
    pub lod: LodSettings,
}

/// One instruction for the presentation layer.
#[derive(Debug, Clone)]
pub enum PresentationEvent {
    Render {
        record: Arc<AssetRecord>,
        hint: PlacementHint,
    },
    /// Persistent non-AR presentation; the AR path is over for this session.
    ShowFallbackUi { reason: String },
    /// Transient, non-blocking notice.
    ShowMinimalError { message: String },
}

impl PresentationEvent {
    pub fn view(&self) -> PresentationView {
        match self {
            PresentationEvent::Render { record, hint } => PresentationView::Render {
                identifier: record.identifier().to_string(),
                tier: record.tier(),
                estimated_bytes: record.estimated_bytes(),
                generation: record.generation(),
                hint: *hint,
            },
            PresentationEvent::ShowFallbackUi { reason } => PresentationView::ShowFallbackUi {
                reason: reason.clone(),
            },
            PresentationEvent::ShowMinimalError { message } => {
                PresentationView::ShowMinimalError {
                    message: message.clone(),
                }
            }
        }
    }
}

/// Serializable form of a [`PresentationEvent`], without the payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PresentationView {
    Render {
        identifier: String,
        tier: QualityTier,
        estimated_bytes: u64,
        generation: u64,
        hint: PlacementHint,
    },
    ShowFallbackUi {
        reason: String,
    },
    ShowMinimalError {
        message: String,
    },
}

/// Receiver of presentation instructions, implemented by the host UI.
pub trait PresentationSurface: Send + Sync {
    fn render(&self, record: Arc<AssetRecord>, hint: PlacementHint);

    fn show_fallback_ui(&self, reason: &str);

    fn show_minimal_error(&self, message: &str);
}

/// Surface that forwards every instruction into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSurface {
    tx: mpsc::UnboundedSender<PresentationEvent>,
}

impl ChannelSurface {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PresentationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn emit(&self, event: PresentationEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("Presentation receiver dropped, event discarded");
        }
    }
}

impl PresentationSurface for ChannelSurface {
    fn render(&self, record: Arc<AssetRecord>, hint: PlacementHint) {
        self.emit(PresentationEvent::Render { record, hint });
    }

    fn show_fallback_ui(&self, reason: &str) {
        self.emit(PresentationEvent::ShowFallbackUi {
            reason: reason.to_string(),
        });
    }

    fn show_minimal_error(&self, message: &str) {
        self.emit(PresentationEvent::ShowMinimalError {
            message: message.to_string(),
        });
    }
}
