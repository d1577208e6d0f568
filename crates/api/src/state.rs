use std::sync::Arc;

use infra::clock::Clock;
use infra::engine::BookingEngine;
use infra::store::BookingStore;

use crate::auth::{AuthConfig, JwtService};

#[derive(Clone)]
pub struct AppState {
    engine: BookingEngine,
    jwt_service: JwtService,
}

impl AppState {
    pub fn new(store: Arc<dyn BookingStore>, clock: Arc<dyn Clock>, auth_config: &AuthConfig) -> Self {
        Self {
            engine: BookingEngine::new(store, clock),
            jwt_service: JwtService::new(auth_config),
        }
    }

    pub fn engine(&self) -> &BookingEngine {
        &self.engine
    }

    pub fn jwt_service(&self) -> &JwtService {
        &self.jwt_service
    }
}
