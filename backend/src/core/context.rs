use std::sync::Arc;
use std::time::Duration;

use crate::auth::AuthService;
use crate::cfg;
use crate::db::Store;
use crate::services::gateway::OutboundGateway;
use crate::services::ingest::Ingestor;

pub type ArcContext = Arc<Context>;

/// Everything a request handler needs, built once at startup.
#[derive(Clone)]
pub struct Context {
    pub store: Arc<dyn Store>,
    pub auth: AuthService,
    pub ingestor: Ingestor,
    pub settings: cfg::AppSettings,
}

impl Context {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, gateway: Arc<dyn OutboundGateway>, settings: cfg::AppSettings) -> ArcContext {
        let auth = AuthService::new(store.clone(), settings.auth.clone());
        let call_timeout = Duration::from_secs(settings.gateway.request_timeout_secs);
        let ingestor = Ingestor::new(store.clone(), gateway, call_timeout);
        Self {
            store,
            auth,
            ingestor,
            settings,
        }
        .into()
    }
}
