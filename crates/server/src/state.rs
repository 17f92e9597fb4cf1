use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use postback::Pipeline;
use store::RealtimeStore;

use crate::config::ServerConfig;
use crate::error::ServerResult;

/// Shared application state
#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<ServerConfig>,

    pub pipeline: Pipeline,

    /// Renders `/metrics`; `None` when metrics are disabled.
    pub metrics: Option<PrometheusHandle>,
}

impl ServerState {
    pub fn new(config: ServerConfig, store: Arc<dyn RealtimeStore>) -> ServerResult<Self> {
        let pipeline = Pipeline::new(store, config.pipeline_config())?;
        Ok(Self {
            config: Arc::new(config),
            pipeline,
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}
