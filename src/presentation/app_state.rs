// Application state for HTTP handlers
use crate::application::explorer_service::ExplorerService;

pub struct AppState {
    pub explorer_service: ExplorerService,
}
