use portalflow_core::{IntentClassifier, Orchestrator};
use std::sync::Arc;

/// Everything the handlers share.
pub struct ServerCore {
    pub orchestrator: Orchestrator,
    pub classifier: Arc<dyn IntentClassifier>,
}

pub type AppState = Arc<ServerCore>;
