use crate::store::SignalingStore;

#[derive(Clone)]
pub struct AppState {
    pub store: SignalingStore,
}

impl AppState {
    pub fn new(store: SignalingStore) -> Self {
        Self { store }
    }
}
