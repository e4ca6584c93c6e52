use std::sync::Arc;

use crate::harness::HarnessInner;
use crate::model::ModelRef;
use crate::run::RunBuilder;

/// Configuration used to create a `Session`.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Human-readable session name, attached to run logs.
    pub name: String,
}

impl SessionConfig {
    /// Creates a named session config.
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Logical grouping for runs.
///
/// Sessions hold no conversation history: every run starts from its own
/// input parts and carries its tool transcript only for its own rounds.
#[derive(Clone)]
pub struct Session {
    pub(crate) harness: Arc<HarnessInner>,
    pub(crate) session_id: uuid::Uuid,
    pub(crate) config: SessionConfig,
}

impl Session {
    pub(crate) fn new(harness: Arc<HarnessInner>, config: SessionConfig) -> Self {
        Self {
            harness,
            session_id: uuid::Uuid::new_v4(),
            config,
        }
    }

    /// Starts building a run for the given model.
    pub fn run(&self, model: ModelRef) -> RunBuilder {
        RunBuilder::new(
            self.harness.clone(),
            self.session_id,
            self.config.name.clone(),
            model,
        )
    }

    /// Returns the generated session id.
    pub fn id(&self) -> uuid::Uuid {
        self.session_id
    }

    /// Returns the session name.
    pub fn name(&self) -> &str {
        &self.config.name
    }
}

#[cfg(test)]
mod tests {
    use crate::{Harness, SessionConfig};

    #[test]
    fn each_session_gets_a_fresh_id() {
        let harness = Harness::builder().build().expect("harness");
        let a = harness.session(SessionConfig::named("chat"));
        let b = harness.session(SessionConfig::named("chat"));
        assert_ne!(a.id(), b.id());
        assert_eq!(a.name(), "chat");
    }
}
