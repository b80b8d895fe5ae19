mod memory;
pub mod registry;

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};
use tracing::info;

use consent_slo::Result;

use crate::{
    models::{Button, ConsentRequest, ConsentResponse},
    var::CONSENT_DECISIONS_TOTAL,
};

pub use memory::{DecisionRecord, MemoryInteraction, RememberedGrant};

pub const MUST_CHOOSE_ONE_PERMISSION: &str =
    "You must pick at least one permission";

/// The authorization controller the consent page answers to.
#[automock]
#[async_trait]
pub trait Interaction {
    /// Looks up the pending authorization request behind `return_url`.
    async fn consent_request(&self, return_url: &str) -> Result<ConsentRequest>;
    async fn decide(
        &self,
        return_url: &str,
        decision: &ConsentDecision,
    ) -> Result<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentDecision {
    pub granted: bool,
    pub scopes: Vec<String>,
    pub remember: bool,
}

impl ConsentDecision {
    pub fn denied() -> Self {
        Self::default()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Continue the authorization flow.
    Redirect(String),
    /// Show the form again with these messages.
    Invalid(Vec<String>),
}

pub async fn process<I: Interaction + Sync>(
    interaction: &I,
    response: &ConsentResponse,
) -> Result<Outcome> {
    let decision = match response.button {
        Button::No => ConsentDecision::denied(),
        Button::Yes => {
            if response.scopes_consented.is_empty() {
                return Ok(Outcome::Invalid(vec![
                    MUST_CHOOSE_ONE_PERMISSION.to_string(),
                ]));
            }
            ConsentDecision {
                granted: true,
                scopes: response.scopes_consented.clone(),
                remember: response.remember_consent.unwrap_or_default(),
            }
        }
    };
    interaction.decide(&response.return_url, &decision).await?;
    CONSENT_DECISIONS_TOTAL
        .with_label_values(&[response.button.as_str()])
        .inc();
    info!(
        "consent {} for {} with scopes {:?}",
        if decision.granted { "granted" } else { "denied" },
        response.return_url,
        decision.scopes
    );
    Ok(Outcome::Redirect(response.return_url.clone()))
}
