//! Provider registry (C4): a fixed set of `EncoderProvider`s, selected by
//! priority and container support. Providers are process-launching backends
//! registered once at startup rather than per-user remote accounts.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::error::{ProviderError, Result};
use super::traits::{EncoderProvider, HardwareAccelerator, TranscodeHandle};
use crate::models::{Container, TranscodeSessionId};
use crate::session_manager::TranscodeProcessStopper;

pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn EncoderProvider>>,
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    pub fn register(&mut self, provider: Arc<dyn EncoderProvider>) {
        let id = provider.info().id;
        self.providers.insert(id, provider);
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<dyn EncoderProvider>> {
        self.providers.get(id).cloned()
    }

    /// Returns the highest-priority provider that supports `container`,
    /// tie-breaking by hardware-accelerator availability (§4.4).
    pub fn select(&self, container: Container) -> Result<Arc<dyn EncoderProvider>> {
        self.providers
            .values()
            .filter(|p| p.info().supported_containers.contains(&container))
            .max_by(|a, b| {
                let info_a = a.info();
                let info_b = b.info();
                info_a
                    .priority
                    .cmp(&info_b.priority)
                    .then_with(|| has_hardware(&info_a.hardware_accelerators).cmp(&has_hardware(&info_b.hardware_accelerators)))
            })
            .cloned()
            .ok_or_else(|| ProviderError::UnsupportedFormat(container.as_str().to_string()))
    }

    #[must_use]
    pub fn list(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}

fn has_hardware(accelerators: &[HardwareAccelerator]) -> bool {
    accelerators.iter().any(|a| *a != HardwareAccelerator::None)
}

#[async_trait]
impl TranscodeProcessStopper for ProviderRegistry {
    async fn stop_transcode_process(&self, provider: &str, session_id: TranscodeSessionId) {
        let Some(provider_handle) = self.get(provider) else {
            warn!(session_id = %session_id, provider, "provider no longer registered, cannot stop stale transcode");
            return;
        };
        let handle = TranscodeHandle { session_id: session_id.to_string(), pid: None };
        if let Err(err) = provider_handle.stop_transcode(&handle).await {
            warn!(session_id = %session_id, %err, "failed to stop stale transcode process");
        }
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TranscodeProgress, TranscodeRequest};
    use crate::provider::traits::{ProviderInfo, StreamHandle, TranscodeHandle};
    use async_trait::async_trait;

    struct StubProvider {
        id: &'static str,
        priority: i32,
        hardware: Vec<HardwareAccelerator>,
    }

    #[async_trait]
    impl EncoderProvider for StubProvider {
        fn info(&self) -> ProviderInfo {
            ProviderInfo {
                id: self.id.to_string(),
                priority: self.priority,
                supported_containers: vec![Container::Dash, Container::Mp4],
                hardware_accelerators: self.hardware.clone(),
                quality_presets: vec![],
            }
        }

        async fn start_transcode(
            &self,
            _request: &TranscodeRequest,
            _content_dir: &str,
        ) -> Result<TranscodeHandle> {
            unimplemented!()
        }

        async fn get_progress(&self, _handle: &TranscodeHandle) -> Result<TranscodeProgress> {
            unimplemented!()
        }

        async fn stop_transcode(&self, _handle: &TranscodeHandle) -> Result<()> {
            unimplemented!()
        }
    }

    #[test]
    fn selects_highest_priority() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(StubProvider {
            id: "software",
            priority: 1,
            hardware: vec![],
        }));
        registry.register(Arc::new(StubProvider {
            id: "hw-nvenc",
            priority: 10,
            hardware: vec![HardwareAccelerator::Nvenc],
        }));

        let selected = registry.select(Container::Dash).unwrap();
        assert_eq!(selected.info().id, "hw-nvenc");
    }

    #[test]
    fn ties_break_on_hardware_availability() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(StubProvider {
            id: "software",
            priority: 5,
            hardware: vec![],
        }));
        registry.register(Arc::new(StubProvider {
            id: "hw-vaapi",
            priority: 5,
            hardware: vec![HardwareAccelerator::Vaapi],
        }));

        let selected = registry.select(Container::Mp4).unwrap();
        assert_eq!(selected.info().id, "hw-vaapi");
    }

    #[test]
    fn unsupported_container_errors() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(StubProvider {
            id: "software",
            priority: 1,
            hardware: vec![],
        }));
        let err = registry.select(Container::Hls).unwrap_err();
        assert!(matches!(err, ProviderError::UnsupportedFormat(_)));
    }
}
