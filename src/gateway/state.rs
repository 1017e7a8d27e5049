use std::sync::Arc;

use crate::service::BankService;
use crate::user_auth::TokenMaker;

/// Gateway application state (shared)
#[derive(Clone)]
pub struct AppState {
    pub service: BankService,
}

impl AppState {
    pub fn new(service: BankService) -> Self {
        Self { service }
    }

    pub fn tokens(&self) -> &Arc<dyn TokenMaker> {
        self.service.tokens()
    }
}
