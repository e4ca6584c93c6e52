use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use tracing::debug;

use crate::errors::HarnessError;
use crate::model::ProviderId;
use crate::provider::ProviderAdapter;
use crate::session::{Session, SessionConfig};

/// Provider adapters keyed by id. Shared by every session of one harness.
pub(crate) struct HarnessInner {
    providers: HashMap<ProviderId, Arc<dyn ProviderAdapter>>,
}

impl HarnessInner {
    pub(crate) fn provider(&self, id: &ProviderId) -> Option<Arc<dyn ProviderAdapter>> {
        self.providers.get(id).cloned()
    }
}

/// Entry point for sessions and runs.
///
/// A harness is cheap to clone. Callers that need isolation between
/// conversations build one harness per conversation instead of sharing one.
#[derive(Clone)]
pub struct Harness {
    pub(crate) inner: Arc<HarnessInner>,
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }

    /// Harness over a single provider adapter.
    pub fn with_provider(provider: Arc<dyn ProviderAdapter>) -> Self {
        let id = provider.id();
        Self {
            inner: Arc::new(HarnessInner {
                providers: HashMap::from([(id, provider)]),
            }),
        }
    }

    /// Opens a session; runs started from it share its id.
    pub fn session(&self, config: SessionConfig) -> Session {
        Session::new(self.inner.clone(), config)
    }

    /// Registered provider ids, sorted.
    pub fn provider_ids(&self) -> Vec<ProviderId> {
        let mut ids: Vec<ProviderId> = self.inner.providers.keys().cloned().collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        ids
    }
}

#[derive(Default)]
pub struct HarnessBuilder {
    providers: Vec<Arc<dyn ProviderAdapter>>,
}

impl HarnessBuilder {
    pub fn register_provider(mut self, provider: Arc<dyn ProviderAdapter>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Fails when two adapters report the same id.
    pub fn build(self) -> Result<Harness, HarnessError> {
        let mut providers = HashMap::with_capacity(self.providers.len());
        for provider in self.providers {
            match providers.entry(provider.id()) {
                Entry::Occupied(slot) => {
                    return Err(HarnessError::Config(format!(
                        "duplicate provider registration: {}",
                        slot.key()
                    )));
                }
                Entry::Vacant(slot) => {
                    slot.insert(provider);
                }
            }
        }
        debug!(event = "harness.built", providers = providers.len());
        Ok(Harness {
            inner: Arc::new(HarnessInner { providers }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProviderError;
    use crate::provider::{ProviderRequest, ProviderStreamHandle};

    struct NamedProvider(&'static str);

    #[async_trait::async_trait]
    impl ProviderAdapter for NamedProvider {
        fn id(&self) -> ProviderId {
            ProviderId::new(self.0)
        }

        async fn start_stream(
            &self,
            _req: ProviderRequest,
        ) -> Result<ProviderStreamHandle, ProviderError> {
            Err(ProviderError::transport(self.0, "never started in these tests"))
        }
    }

    #[test]
    fn duplicate_provider_ids_are_rejected() {
        let result = Harness::builder()
            .register_provider(Arc::new(NamedProvider("openai")))
            .register_provider(Arc::new(NamedProvider("openai")))
            .build();
        assert!(
            matches!(result, Err(HarnessError::Config(message)) if message.contains("duplicate provider registration: openai"))
        );
    }

    #[test]
    fn provider_ids_are_sorted() {
        let harness = Harness::builder()
            .register_provider(Arc::new(NamedProvider("zeta")))
            .register_provider(Arc::new(NamedProvider("alpha")))
            .build()
            .expect("build");
        let ids: Vec<String> = harness
            .provider_ids()
            .into_iter()
            .map(|id| id.to_string())
            .collect();
        assert_eq!(ids, vec!["alpha", "zeta"]);
    }

    #[test]
    fn single_provider_harness_resolves_its_adapter() {
        let harness = Harness::with_provider(Arc::new(NamedProvider("openai")));
        assert!(harness.inner.provider(&ProviderId::new("openai")).is_some());
        assert!(harness.inner.provider(&ProviderId::new("other")).is_none());
    }
}
