use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::info;

use consent_slo::errors;

use crate::{
    services::consent::{registry::Registry, MemoryInteraction},
    AppConfig,
};

#[derive(Debug)]
pub struct App {
    pub config: AppConfig,
    pub interaction: MemoryInteraction,
}

impl App {
    pub fn new(config: AppConfig, registry: Registry) -> Self {
        info!(
            "initializing consent services with {} clients...",
            registry.clients.len()
        );
        let interaction = MemoryInteraction::new(registry, config.cache_size);
        info!("consent services successfully initialized!");
        Self {
            config,
            interaction,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState(pub Arc<App>);

// deref so you can still access the inner fields easily
impl Deref for AppState {
    type Target = App;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AppState
where
    Self: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = errors::WithBacktrace;
    async fn from_request_parts(
        _: &mut Parts,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self::from_ref(state))
    }
}
