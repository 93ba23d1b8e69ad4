//! The public client facade.

use std::sync::Arc;

use serde_json::Value;

use crate::config::ClientConfig;
use crate::context::Context;
use crate::error::Result;
use crate::eval;
use crate::model::{Experiment, ExperimentResult, FeatureMap, FeatureResult};
use crate::repository::{FeatureRepository, SubscriberId};

/// A client for the GrowthBook features API.
///
/// The client owns a [`FeatureRepository`] that keeps feature definitions fresh in the
/// background. Evaluation happens locally against the repository's current snapshot and never
/// waits on the network.
///
/// # Examples
/// ```no_run
/// # use serde_json::json;
/// # use growthbook::{Client, ClientConfig};
/// let client = Client::init(ClientConfig::new("sdk-abc123"))?;
/// let context = client.context(json!({"id": "user-1", "country": "fr"}));
/// if client.feature(&context, "new-checkout").on {
///     // serve the new checkout
/// }
/// # growthbook::Result::Ok(())
/// ```
pub struct Client {
    repository: Arc<FeatureRepository>,
}

impl Client {
    /// Start the repository and block until the first feature fetch settles (or the configured
    /// initialization timeout elapses).
    pub fn init(config: ClientConfig) -> Result<Client> {
        let client = Client::init_deferred(config)?;
        client.repository.await_initialization()?;
        Ok(client)
    }

    /// Start the repository without waiting for the first fetch. Evaluations see an empty
    /// feature map until the fetch completes.
    pub fn init_deferred(config: ClientConfig) -> Result<Client> {
        Ok(Client {
            repository: Arc::new(FeatureRepository::new(&config)?),
        })
    }

    /// Build an evaluation context for the given user attributes, backed by this client's
    /// repository. The context picks up refreshed definitions automatically.
    pub fn context(&self, attributes: Value) -> Context {
        Context::with_repository(attributes, Arc::clone(&self.repository))
    }

    /// Evaluate a feature for a context. See [`eval_feature`](crate::eval_feature).
    pub fn feature(&self, context: &Context, feature_id: &str) -> FeatureResult {
        eval::eval_feature(context, feature_id)
    }

    /// Run an experiment for a context. See [`run_experiment`](crate::run_experiment).
    pub fn run_experiment(&self, context: &Context, experiment: &Experiment) -> ExperimentResult {
        eval::run_experiment(context, experiment)
    }

    /// Snapshot of the current feature definitions.
    pub fn features(&self) -> Arc<FeatureMap> {
        self.repository.get_features()
    }

    /// Request an asynchronous refresh of the feature definitions.
    pub fn refresh(&self) {
        self.repository.refresh();
    }

    /// Register a callback invoked after every successful refresh.
    pub fn subscribe(
        &self,
        subscriber: impl Fn(&FeatureMap) + Send + Sync + 'static,
    ) -> SubscriberId {
        self.repository.subscribe(subscriber)
    }

    /// Remove a previously registered refresh callback.
    pub fn unsubscribe(&self, id: SubscriberId) {
        self.repository.unsubscribe(id);
    }

    /// The repository backing this client, for direct use or injection elsewhere.
    pub fn repository(&self) -> &Arc<FeatureRepository> {
        &self.repository
    }

    /// Stop background refreshing and wait for the refresh thread to exit. Contexts created from
    /// this client keep evaluating against the last snapshot.
    pub fn shutdown(self) -> Result<()> {
        self.repository.shutdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::repository::RefreshStrategy;

    #[test]
    fn init_validates_configuration() {
        assert!(matches!(
            Client::init(ClientConfig::new("")),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn deferred_client_serves_empty_features() {
        let client = Client::init_deferred(
            ClientConfig::new("sdk-key")
                .api_host("http://127.0.0.1:1")
                .refresh_strategy(RefreshStrategy::Manual),
        )
        .unwrap();

        assert!(client.features().is_empty());
        let context = client.context(serde_json::json!({"id": "u1"}));
        let result = client.feature(&context, "anything");
        assert_eq!(result.source, crate::FeatureSource::UnknownFeature);

        client.shutdown().unwrap();
    }
}
