use std::fs;

use anyhow::Context;
use serde::Deserialize;

use consent_slo::{errors, Result};

use crate::models::ScopeItem;

pub const SCOPE_OFFLINE_ACCESS: &str = "offline_access";

/// Clients and the resources they may ask for.
#[derive(Debug, Clone, Deserialize)]
pub struct Registry {
    #[serde(default)]
    pub clients: Vec<Client>,
    #[serde(default = "default_identity_resources")]
    pub identity_resources: Vec<Resource>,
    #[serde(default)]
    pub api_scopes: Vec<Resource>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Client {
    pub client_id: String,
    pub client_name: String,
    pub logo_uri: Option<String>,
    pub client_uri: Option<String>,
    #[serde(default = "default_true")]
    pub allow_remember_consent: bool,
    #[serde(default)]
    pub allow_offline_access: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Resource {
    pub name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub emphasize: bool,
}

impl Resource {
    fn to_scope_item(&self) -> ScopeItem {
        ScopeItem {
            name: self.name.clone(),
            display_name: self
                .display_name
                .clone()
                .unwrap_or_else(|| self.name.clone()),
            description: self.description.clone(),
            required: self.required,
            checked: true,
            emphasize: self.emphasize,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_identity_resources() -> Vec<Resource> {
    vec![
        Resource {
            name: "openid".to_string(),
            display_name: Some("Your user identifier".to_string()),
            description: None,
            required: true,
            emphasize: false,
        },
        Resource {
            name: "profile".to_string(),
            display_name: Some("User profile".to_string()),
            description: Some(
                "Your user profile information (first name, last name, etc.)"
                    .to_string(),
            ),
            required: false,
            emphasize: true,
        },
        Resource {
            name: "email".to_string(),
            display_name: Some("Your email address".to_string()),
            description: None,
            required: false,
            emphasize: true,
        },
    ]
}

fn offline_access() -> ScopeItem {
    ScopeItem {
        name: SCOPE_OFFLINE_ACCESS.to_string(),
        display_name: "Offline Access".to_string(),
        description: Some(
            "Access to your applications and resources, even when you are offline"
                .to_string(),
        ),
        required: false,
        checked: true,
        emphasize: true,
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            clients: Vec::new(),
            identity_resources: default_identity_resources(),
            api_scopes: Vec::new(),
        }
    }
}

impl Registry {
    pub fn client(&self, client_id: &str) -> Option<&Client> {
        self.clients.iter().find(|c| c.client_id.eq(client_id))
    }

    /// Splits the requested scopes into identity and resource rows, each in
    /// registry order.
    pub fn resolve(
        &self,
        client: &Client,
        requested: &[&str],
    ) -> Result<(Vec<ScopeItem>, Vec<ScopeItem>)> {
        for name in requested {
            if *name == SCOPE_OFFLINE_ACCESS {
                continue;
            }
            if !self
                .identity_resources
                .iter()
                .chain(self.api_scopes.iter())
                .any(|r| r.name == *name)
            {
                return Err(errors::bad_request(&format!(
                    "unknown scope: {name}"
                )));
            }
        }
        let identity = self
            .identity_resources
            .iter()
            .filter(|r| requested.contains(&r.name.as_str()))
            .map(Resource::to_scope_item)
            .collect();
        let mut resource: Vec<_> = self
            .api_scopes
            .iter()
            .filter(|r| requested.contains(&r.name.as_str()))
            .map(Resource::to_scope_item)
            .collect();
        if requested.contains(&SCOPE_OFFLINE_ACCESS) {
            if !client.allow_offline_access {
                return Err(errors::bad_request(&format!(
                    "client {} is not allowed offline access",
                    client.client_id
                )));
            }
            resource.push(offline_access());
        }
        Ok((identity, resource))
    }
}

pub fn load(path: &str) -> anyhow::Result<Registry> {
    let content =
        fs::read_to_string(path).context("could not read registry file")?;
    toml::from_str(&content).context("could not parse registry file")
}

#[cfg(test)]
mod tests {
    use super::*;

    const REGISTRY: &str = r#"
[[clients]]
client_id = "acme"
client_name = "Acme App"
client_uri = "https://acme.example"
allow_offline_access = true

[[clients]]
client_id = "kiosk"
client_name = "Kiosk"
allow_remember_consent = false

[[api_scopes]]
name = "api1"
display_name = "My API"

[[api_scopes]]
name = "api2"
"#;

    fn registry() -> Registry {
        toml::from_str(REGISTRY).unwrap()
    }

    #[test]
    fn test_parse_registry() {
        let r = registry();
        assert_eq!(r.clients.len(), 2);
        let acme = r.client("acme").unwrap();
        assert!(acme.allow_remember_consent);
        assert!(acme.allow_offline_access);
        assert_eq!(acme.logo_uri, None);
        assert!(!r.client("kiosk").unwrap().allow_remember_consent);
        assert!(r.client("nobody").is_none());
        // identity resources fall back to the standard set
        let names: Vec<_> =
            r.identity_resources.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["openid", "profile", "email"]);
    }

    #[test]
    fn test_resolve_in_registry_order() {
        let r = registry();
        let acme = r.client("acme").unwrap();
        let (identity, resource) = r
            .resolve(acme, &["api2", "email", "openid", "api1"])
            .unwrap();
        let names: Vec<_> = identity.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["openid", "email"]);
        assert!(identity[0].required);
        let names: Vec<_> = resource.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["api1", "api2"]);
        assert_eq!(resource[0].display_name, "My API");
        assert_eq!(resource[1].display_name, "api2");
        assert!(identity.iter().chain(resource.iter()).all(|s| s.checked));
    }

    #[test]
    fn test_resolve_offline_access() {
        let r = registry();
        let (_, resource) = r
            .resolve(
                r.client("acme").unwrap(),
                &["openid", SCOPE_OFFLINE_ACCESS],
            )
            .unwrap();
        assert_eq!(resource.len(), 1);
        assert_eq!(resource[0].display_name, "Offline Access");
        assert!(!resource[0].required);

        let err = r
            .resolve(
                r.client("kiosk").unwrap(),
                &["openid", SCOPE_OFFLINE_ACCESS],
            )
            .unwrap_err();
        assert_eq!(err, errors::bad_request(""));
    }

    #[test]
    fn test_resolve_unknown_scope() {
        let r = registry();
        let err = r
            .resolve(r.client("acme").unwrap(), &["openid", "calendar"])
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Please recheck the request.see: unknown scope: calendar"
        );
    }
}
