use std::sync::Arc;

use crate::{llm::LlmBackend, store::FilamentStore};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn FilamentStore>,
    pub llm: Arc<dyn LlmBackend>,
}

impl AppState {
    pub fn new(store: Arc<dyn FilamentStore>, llm: Arc<dyn LlmBackend>) -> Self {
        Self { store, llm }
    }
}
