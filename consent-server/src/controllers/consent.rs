use axum::{
    extract::RawForm,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use tracing::debug;

use consent_slo::{HtmlTemplate, Result};

use crate::{
    models::{ConsentForm, ConsentQuery},
    services::{
        consent::{process, Interaction, Outcome},
        templates::ConsentView,
    },
    valid::Valid,
    AppState,
};

pub fn new_router(state: AppState) -> Router {
    Router::new()
        .route("/consent", get(consent_html).post(consent))
        .with_state(state)
}

async fn consent_html(
    app: AppState,
    Valid(query): Valid<ConsentQuery>,
) -> Result<HtmlTemplate<ConsentView>> {
    let request = app.interaction.consent_request(&query.return_url).await?;
    debug!("{:?}", request);
    Ok(HtmlTemplate(ConsentView::new(request)))
}

/// Handles Allow/Deny, re-rendering the page when the controller rejects
/// the selection.
async fn consent(app: AppState, RawForm(bytes): RawForm) -> Result<Response> {
    let form = ConsentForm::parse(&bytes)?;
    let request = app.interaction.consent_request(&form.return_url).await?;
    let response = form.assemble(&request)?;
    debug!("{:?}", response);
    match process(&app.interaction, &response).await? {
        Outcome::Redirect(uri) => Ok(Redirect::to(&uri).into_response()),
        Outcome::Invalid(errors) => Ok(HtmlTemplate(
            ConsentView::new(request.with_selection(&response))
                .remember_consent(
                    response.remember_consent.unwrap_or_default(),
                )
                .errors(errors),
        )
        .into_response()),
    }
}
