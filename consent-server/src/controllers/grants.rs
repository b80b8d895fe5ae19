use axum::{extract::Path, routing::get, Json, Router};
use http::StatusCode;
use tracing::info;

use consent_slo::{errors, Result};

use crate::{
    models::ConsentQuery,
    services::consent::{DecisionRecord, RememberedGrant},
    valid::Valid,
    AppState,
};

pub fn new_router(state: AppState) -> Router {
    Router::new()
        .route("/decisions", get(get_decision))
        .route("/grants/:client_id", get(get_grant).delete(revoke_grant))
        .with_state(state)
}

/// Lets the authorization endpoint pick up what the user decided.
async fn get_decision(
    app: AppState,
    Valid(query): Valid<ConsentQuery>,
) -> Result<Json<DecisionRecord>> {
    app.interaction
        .decision(&query.return_url)?
        .map(Json)
        .ok_or_else(|| {
            errors::not_found(&format!("decision for {}", query.return_url))
        })
}

async fn get_grant(
    app: AppState,
    Path(client_id): Path<String>,
) -> Result<Json<RememberedGrant>> {
    app.interaction
        .remembered(&client_id)?
        .map(Json)
        .ok_or_else(|| errors::not_found(&format!("grant of {client_id}")))
}

async fn revoke_grant(
    app: AppState,
    Path(client_id): Path<String>,
) -> Result<StatusCode> {
    if app.interaction.revoke(&client_id)? {
        info!("revoked remembered consent of {}", client_id);
    }
    Ok(StatusCode::NO_CONTENT)
}
