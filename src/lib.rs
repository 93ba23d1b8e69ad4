//! The Rust SDK for GrowthBook, an open-source feature flagging and experimentation platform.
//!
//! # Overview
//!
//! The SDK revolves around a [`Client`] that keeps feature definitions fresh in the background
//! and evaluates them locally: given a [`Context`] (user attributes plus evaluation switches),
//! [`Client::feature`] decides the value of a feature flag and [`Client::run_experiment`] assigns
//! an experiment variation. Evaluation is deterministic and never touches the network; the
//! [`FeatureRepository`] refreshes its cached definitions on a timer and serves stale data while
//! a refresh is in flight.
//!
//! Contexts can also be built against a fixed feature map with [`Context::with_features`], which
//! makes evaluation fully offline. This is useful for tests and for services that manage feature
//! payloads themselves.
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum and only ever surface from configuration and the
//! repository. Evaluation itself cannot fail: unknown features, prerequisite cycles, and
//! mis-configured rules degrade to well-defined results (see [`FeatureResult::source`]).
//!
//! # Logging
//!
//! The crate uses the [`log`](https://docs.rs/log/latest/log/) crate with target `growthbook`.
//! Consider integrating a `log`-compatible logger implementation for better visibility into
//! fetches, refreshes, and evaluation decisions.
//!
//! # Examples
//!
//! ```no_run
//! # use serde_json::json;
//! use growthbook::{Client, ClientConfig};
//!
//! let client = Client::init(ClientConfig::new("sdk-abc123"))?;
//!
//! let context = client.context(json!({"id": "user-1", "country": "fr"}));
//! if client.feature(&context, "new-checkout").on {
//!     // serve the new checkout
//! }
//! # growthbook::Result::Ok(())
//! ```

#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

mod bucketing;
mod client;
mod condition;
mod config;
mod context;
mod decrypt;
mod error;
mod eval;
mod feature_fetcher;
mod feature_store;
mod hashing;
mod model;
mod refresh_poller;
mod repository;

pub use client::Client;
pub use condition::eval_condition;
pub use config::ClientConfig;
pub use context::Context;
pub use error::{DecryptionError, Error, Result};
pub use eval::{eval_feature, run_experiment};
pub use model::{
    BucketRange, Experiment, ExperimentResult, Feature, FeatureMap, FeatureResult, FeatureRule,
    FeatureSource, Filter, Namespace, ParentCondition, TryParse, VariationMeta,
};
pub use repository::{FeatureRepository, RefreshStrategy, SubscriberId};
