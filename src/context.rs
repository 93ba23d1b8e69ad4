//! Per-evaluation context: user attributes plus the source of feature definitions.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::model::FeatureMap;
use crate::repository::FeatureRepository;

/// Everything a single evaluation needs: the user's attributes, where feature definitions come
/// from, and evaluation switches.
///
/// A context is cheap to build and is not mutated by evaluation. Contexts backed by a
/// [`FeatureRepository`] read the repository's current snapshot at each evaluation, so a context
/// built before a refresh sees new definitions after it.
///
/// # Examples
/// ```
/// # use serde_json::json;
/// # use growthbook::Context;
/// let context = Context::new(json!({"id": "user-1", "country": "fr"}))
///     .url("https://example.com/checkout")
///     .force_variation("checkout-exp", 1);
/// ```
#[derive(Clone)]
pub struct Context {
    pub(crate) attributes: Value,
    pub(crate) provider: FeatureProvider,
    pub(crate) enabled: bool,
    pub(crate) url: Option<String>,
    pub(crate) qa_mode: bool,
    pub(crate) forced_variations: HashMap<String, i32>,
}

#[derive(Clone)]
pub(crate) enum FeatureProvider {
    Static(Arc<FeatureMap>),
    Repository(Arc<FeatureRepository>),
}

impl Context {
    /// Create a context with no feature definitions. Useful for running standalone experiments.
    pub fn new(attributes: Value) -> Context {
        Context::with_features(attributes, FeatureMap::new())
    }

    /// Create a context evaluating against a fixed feature map.
    pub fn with_features(attributes: Value, features: FeatureMap) -> Context {
        Context {
            attributes,
            provider: FeatureProvider::Static(Arc::new(features)),
            enabled: true,
            url: None,
            qa_mode: false,
            forced_variations: HashMap::new(),
        }
    }

    /// Create a context that reads the repository's current snapshot at each evaluation.
    pub fn with_repository(attributes: Value, repository: Arc<FeatureRepository>) -> Context {
        Context {
            attributes,
            provider: FeatureProvider::Repository(repository),
            enabled: true,
            url: None,
            qa_mode: false,
            forced_variations: HashMap::new(),
        }
    }

    /// Set the page URL used for query-string experiment overrides.
    pub fn url(mut self, url: impl Into<String>) -> Context {
        self.url = Some(url.into());
        self
    }

    /// Enable or disable all experiments. Disabled contexts never enroll.
    pub fn enabled(mut self, enabled: bool) -> Context {
        self.enabled = enabled;
        self
    }

    /// Put the context in QA mode: experiments evaluate but only forced variations enroll.
    pub fn qa_mode(mut self, qa_mode: bool) -> Context {
        self.qa_mode = qa_mode;
        self
    }

    /// Force the given experiment to the given variation index for this context.
    pub fn force_variation(mut self, experiment_key: impl Into<String>, variation: i32) -> Context {
        self.forced_variations.insert(experiment_key.into(), variation);
        self
    }

    /// The user attributes this context evaluates against.
    pub fn attributes(&self) -> &Value {
        &self.attributes
    }

    /// Snapshot of the feature definitions this context currently sees.
    pub fn features(&self) -> Arc<FeatureMap> {
        match &self.provider {
            FeatureProvider::Static(features) => Arc::clone(features),
            FeatureProvider::Repository(repository) => repository.get_features(),
        }
    }
}
