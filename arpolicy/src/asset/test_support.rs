//! Scripted loader used by unit tests across the crate.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::loader::{AssetLoader, BoxFuture, LoadError};
use super::types::{AssetKey, LoadedAsset, PayloadHandle};
use crate::quality::QualityTier;

#[derive(Debug, Clone)]
pub(crate) enum ScriptedResponse {
    Bytes(u64),
    Fail(LoadError),
    Panic,
}

/// Loader returning a fixed size unless a per-identifier response is set.
pub(crate) struct ScriptedLoader {
    default_bytes: u64,
    delay: Option<Duration>,
    responses: HashMap<String, ScriptedResponse>,
    loads: Arc<Mutex<HashMap<AssetKey, usize>>>,
}

impl ScriptedLoader {
    pub(crate) fn new(default_bytes: u64) -> Self {
        Self {
            default_bytes,
            delay: None,
            responses: HashMap::new(),
            loads: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn respond(mut self, identifier: &str, response: ScriptedResponse) -> Self {
        self.responses.insert(identifier.to_string(), response);
        self
    }

    pub(crate) fn load_count(&self, key: &AssetKey) -> usize {
        self.loads.lock().get(key).copied().unwrap_or(0)
    }

    pub(crate) fn total_loads(&self) -> usize {
        self.loads.lock().values().sum()
    }
}

impl AssetLoader for ScriptedLoader {
    fn load(
        &self,
        identifier: &str,
        tier: QualityTier,
    ) -> BoxFuture<'_, Result<LoadedAsset, LoadError>> {
        let key = AssetKey::new(identifier, tier);
        let response = self
            .responses
            .get(identifier)
            .cloned()
            .unwrap_or(ScriptedResponse::Bytes(self.default_bytes));
        Box::pin(async move {
            *self.loads.lock().entry(key.clone()).or_insert(0) += 1;
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match response {
                ScriptedResponse::Bytes(bytes) => Ok(LoadedAsset::new(
                    PayloadHandle::new(key.to_string()),
                    bytes,
                )),
                ScriptedResponse::Fail(err) => Err(err),
                ScriptedResponse::Panic => panic!("scripted loader panic for {key}"),
            }
        })
    }
}
