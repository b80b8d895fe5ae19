use std::{
    collections::HashMap,
    num::NonZeroUsize,
    sync::{Mutex, RwLock},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use http::Uri;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use consent_slo::{errors, Result};

use super::{registry::Registry, ConsentDecision, Interaction};
use crate::models::ConsentRequest;

/// Outcome recorded for a pending authorization request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub client_id: String,
    #[serde(flatten)]
    pub decision: ConsentDecision,
    pub decided_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RememberedGrant {
    pub client_id: String,
    pub scopes: Vec<String>,
    pub granted_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct AuthorizeParams {
    client_id: Option<String>,
    scope: Option<String>,
}

/// Authorization controller keeping decisions in process memory. The
/// authorization request itself travels in the return URL's query.
#[derive(Debug)]
pub struct MemoryInteraction {
    registry: Registry,
    decisions: Mutex<LruCache<String, DecisionRecord>>,
    grants: RwLock<HashMap<String, RememberedGrant>>,
}

impl MemoryInteraction {
    pub fn new(registry: Registry, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            registry,
            decisions: Mutex::new(LruCache::new(capacity)),
            grants: RwLock::new(HashMap::new()),
        }
    }

    pub fn decision(&self, return_url: &str) -> Result<Option<DecisionRecord>> {
        let mut decisions = self.decisions.lock().map_err(errors::any)?;
        Ok(decisions.get(return_url).cloned())
    }

    pub fn remembered(&self, client_id: &str) -> Result<Option<RememberedGrant>> {
        let grants = self.grants.read().map_err(errors::any)?;
        Ok(grants.get(client_id).cloned())
    }

    pub fn revoke(&self, client_id: &str) -> Result<bool> {
        let mut grants = self.grants.write().map_err(errors::any)?;
        Ok(grants.remove(client_id).is_some())
    }
}

#[async_trait]
impl Interaction for MemoryInteraction {
    async fn consent_request(&self, return_url: &str) -> Result<ConsentRequest> {
        let params = parse_return_url(return_url)?;
        let client_id = client_id(&params)?;
        let client = self.registry.client(client_id).ok_or_else(|| {
            errors::not_found(&format!("client {client_id}"))
        })?;
        let requested: Vec<&str> = params
            .scope
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
            .collect();
        if requested.is_empty() {
            return Err(errors::bad_request("return URL carries no scope"));
        }
        let (identity_scopes, resource_scopes) =
            self.registry.resolve(client, &requested)?;
        debug!("consent request for {} with {:?}", client_id, requested);
        Ok(ConsentRequest {
            client_name: client.client_name.clone(),
            client_logo_url: client.logo_uri.clone(),
            client_url: client.client_uri.clone(),
            return_url: return_url.to_string(),
            identity_scopes,
            resource_scopes,
            allow_remember_consent: client.allow_remember_consent,
        })
    }

    async fn decide(
        &self,
        return_url: &str,
        decision: &ConsentDecision,
    ) -> Result<()> {
        let params = parse_return_url(return_url)?;
        let client_id = client_id(&params)?.to_string();
        let now = Utc::now();
        {
            let mut grants = self.grants.write().map_err(errors::any)?;
            if decision.granted && decision.remember {
                grants.insert(
                    client_id.clone(),
                    RememberedGrant {
                        client_id: client_id.clone(),
                        scopes: decision.scopes.clone(),
                        granted_at: now,
                    },
                );
            } else if grants.remove(&client_id).is_some() {
                info!("forgot remembered consent of {}", client_id);
            }
        }
        let mut decisions = self.decisions.lock().map_err(errors::any)?;
        decisions.put(
            return_url.to_string(),
            DecisionRecord {
                client_id,
                decision: decision.clone(),
                decided_at: now,
            },
        );
        Ok(())
    }
}

fn client_id(params: &AuthorizeParams) -> Result<&str> {
    params
        .client_id
        .as_deref()
        .ok_or_else(|| errors::bad_request("return URL carries no client_id"))
}

fn parse_return_url(return_url: &str) -> Result<AuthorizeParams> {
    if !is_local_url(return_url) {
        return Err(errors::bad_request("invalid return URL"));
    }
    let uri = return_url
        .parse::<Uri>()
        .map_err(|err| errors::bad_request(&err))?;
    serde_urlencoded::from_str(uri.query().unwrap_or_default())
        .map_err(|err| errors::bad_request(&err))
}

/// Only paths on this host, never `//host` or `/\host`.
pub fn is_local_url(url: &str) -> bool {
    let mut chars = url.chars();
    match (chars.next(), chars.next()) {
        (Some('/'), Some('/' | '\\')) => false,
        (Some('/'), _) => true,
        _ => false,
    }
}
