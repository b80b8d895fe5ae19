use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;
use validator::Validate;

use consent_slo::{
    errors::{self, Code, WithBacktrace},
    Result,
};

pub const PERSONAL_INFORMATION: &str = "Personal Information";
pub const APPLICATION_ACCESS: &str = "Application Access";

/// A single permission row on the consent page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeItem {
    /// Stable identifier, submitted back but never displayed.
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    /// Always part of the grant, the checkbox is rendered disabled.
    pub required: bool,
    pub checked: bool,
    pub emphasize: bool,
}

/// View data for one pending authorization attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRequest {
    pub client_name: String,
    pub client_logo_url: Option<String>,
    pub client_url: Option<String>,
    /// Opaque state owned by the authorization controller.
    pub return_url: String,
    pub identity_scopes: Vec<ScopeItem>,
    pub resource_scopes: Vec<ScopeItem>,
    pub allow_remember_consent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeRegion {
    pub label: &'static str,
    pub icon: &'static str,
    pub items: Vec<ScopeItem>,
}

impl ConsentRequest {
    /// Scope regions in display order, empty ones left out.
    pub fn regions(&self) -> Vec<ScopeRegion> {
        [
            (PERSONAL_INFORMATION, "user", &self.identity_scopes),
            (APPLICATION_ACCESS, "tasks", &self.resource_scopes),
        ]
        .into_iter()
        .filter(|(_, _, items)| !items.is_empty())
        .map(|(label, icon, items)| ScopeRegion {
            label,
            icon,
            items: items.clone(),
        })
        .collect()
    }

    pub fn scopes(&self) -> impl Iterator<Item = &ScopeItem> {
        self.identity_scopes.iter().chain(self.resource_scopes.iter())
    }

    /// Carries a rejected submission's choices over to the re-rendered page.
    pub fn with_selection(mut self, response: &ConsentResponse) -> Self {
        for item in self
            .identity_scopes
            .iter_mut()
            .chain(self.resource_scopes.iter_mut())
        {
            item.checked =
                item.required || response.scopes_consented.contains(&item.name);
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Button {
    Yes,
    No,
}

impl Button {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
        }
    }
}

impl FromStr for Button {
    type Err = WithBacktrace;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "yes" => Ok(Self::Yes),
            "no" => Ok(Self::No),
            _ => Err(errors::bad_request("Please choose either Allow or Deny")),
        }
    }
}

/// The user's decision as handed to the authorization controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentResponse {
    pub return_url: String,
    pub scopes_consented: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remember_consent: Option<bool>,
    pub button: Button,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ConsentQuery {
    #[serde(rename = "returnUrl")]
    #[validate(length(min = 1))]
    pub return_url: String,
}

/// Fields exactly as posted by the browser. Disabled checkboxes are never
/// posted, so this is not yet a [`ConsentResponse`].
#[derive(Debug, Default, Validate)]
pub struct ConsentForm {
    #[validate(length(min = 1))]
    pub return_url: String,
    pub scopes_consented: Vec<String>,
    pub remember_consent: bool,
    pub button: Option<String>,
}

impl ConsentForm {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(bytes)
            .map_err(|err| errors::bad_request(&err))?;
        let mut form = Self::default();
        for (key, value) in pairs {
            match key.as_str() {
                "returnUrl" => form.return_url = value,
                "scopesConsented" => form.scopes_consented.push(value),
                "rememberConsent" => {
                    form.remember_consent =
                        matches!(value.as_str(), "true" | "on")
                }
                "button" => form.button = Some(value),
                _ => {}
            }
        }
        form.validate().map_err(Code::Validates)?;
        Ok(form)
    }

    /// Builds the response against the request it answers. Required scopes
    /// are taken from the request, unknown names are dropped.
    pub fn assemble(self, request: &ConsentRequest) -> Result<ConsentResponse> {
        let button = self
            .button
            .as_deref()
            .unwrap_or_default()
            .parse::<Button>()?;
        for name in self.scopes_consented.iter() {
            if !request.scopes().any(|item| item.name.eq(name)) {
                warn!(
                    "discarding unknown scope {} for {}",
                    name, self.return_url
                );
            }
        }
        let scopes_consented = request
            .scopes()
            .filter(|item| {
                item.required || self.scopes_consented.contains(&item.name)
            })
            .map(|item| item.name.clone())
            .collect();
        Ok(ConsentResponse {
            return_url: self.return_url,
            scopes_consented,
            remember_consent: request
                .allow_remember_consent
                .then_some(self.remember_consent),
            button,
        })
    }
}
