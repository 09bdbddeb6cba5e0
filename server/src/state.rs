// nfviz/server/src/state.rs

use crate::config::AppConfig;
use crate::errors::Result;
use crate::steps::contexts::StepEnv;
use nfviz::{Collaborators, StatusAggregator, StepRegistry};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
  pub config: Arc<AppConfig>,
  pub registry: Arc<StepRegistry>,
  pub aggregator: Arc<StatusAggregator>,
}

impl AppState {
  /// Registers every step against `cloud` and builds the status aggregator
  /// over the same collaborators.
  pub fn new(config: Arc<AppConfig>, cloud: Collaborators) -> Result<Self> {
    let env = StepEnv::new(&config, cloud.clone());
    let registry = StepRegistry::new();
    crate::steps::register_all_steps(&registry, &env)?;
    let aggregator = StatusAggregator::new(env.run.clone(), &cloud);

    Ok(Self {
      config,
      registry: Arc::new(registry),
      aggregator: Arc::new(aggregator),
    })
  }
}
