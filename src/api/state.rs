use std::sync::Arc;

use crate::api::session::SessionStore;
use crate::config::Config;
use crate::detect::Scorer;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: SessionStore,
    pub scorer: Arc<dyn Scorer>,
}

impl AppState {
    /// Build state with the Isolation Forest sized from `config`.
    pub fn new(config: Config) -> Self {
        let scorer = Arc::new(config.model.build());
        Self::with_scorer(config, scorer)
    }

    pub fn with_scorer(config: Config, scorer: Arc<dyn Scorer>) -> Self {
        let sessions = SessionStore::new(config.server.max_sessions);
        Self {
            config: Arc::new(config),
            sessions,
            scorer,
        }
    }
}
