use crate::config::settings::AppConfig;
use crate::infrastructure::store::SharedStore;
use crate::workers::dispatcher::DispatchSignal;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: SharedStore,
    pub dispatch: DispatchSignal,
}

impl AppState {
    pub fn new(config: AppConfig, store: SharedStore, dispatch: DispatchSignal) -> Self {
        Self {
            config,
            store,
            dispatch,
        }
    }
}
