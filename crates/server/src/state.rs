use std::sync::Arc;

use filmroom_core::{
    AuditStore, ClipTimeline, Config, GameFilmService, PollSupervisor, SanitizedConfig,
};

use crate::api::WsBroadcaster;

/// Shared application state
pub struct AppState {
    config: Config,
    service: Arc<GameFilmService>,
    timeline: Arc<ClipTimeline>,
    supervisor: Arc<PollSupervisor>,
    audit_store: Arc<dyn AuditStore>,
    ws_broadcaster: WsBroadcaster,
}

impl AppState {
    pub fn new(
        config: Config,
        service: Arc<GameFilmService>,
        timeline: Arc<ClipTimeline>,
        supervisor: Arc<PollSupervisor>,
        audit_store: Arc<dyn AuditStore>,
        ws_broadcaster: WsBroadcaster,
    ) -> Self {
        Self {
            config,
            service,
            timeline,
            supervisor,
            audit_store,
            ws_broadcaster,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn service(&self) -> &GameFilmService {
        self.service.as_ref()
    }

    pub fn timeline(&self) -> &ClipTimeline {
        self.timeline.as_ref()
    }

    pub fn supervisor(&self) -> &PollSupervisor {
        self.supervisor.as_ref()
    }

    pub fn audit_store(&self) -> &dyn AuditStore {
        self.audit_store.as_ref()
    }

    pub fn ws_broadcaster(&self) -> &WsBroadcaster {
        &self.ws_broadcaster
    }
}
