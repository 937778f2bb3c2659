use std::sync::Arc;

use crate::controller::RelayController;

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<RelayController>,
}

impl AppState {
    pub fn new(controller: Arc<RelayController>) -> Self {
        Self { controller }
    }
}
