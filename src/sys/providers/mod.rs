// src/sys/providers/mod.rs
//
// One `CloudProvider` implementation per backend. The factory is the only
// place a `ProviderKind` is turned into a concrete client.

pub mod digitalocean;
pub mod hetzner;
pub mod linode;
pub mod vultr;

use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::error::{FleetError, Result};
use crate::models::ProviderKind;
use crate::sys::secrets::ProviderCredential;
use crate::sys::traits::{CloudProvider, ProviderFactory};

const API_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_ERROR_BODY: usize = 300;

pub struct HttpProviderFactory;

impl ProviderFactory for HttpProviderFactory {
    fn connect(&self, kind: ProviderKind, credential: ProviderCredential) -> Box<dyn CloudProvider> {
        match kind {
            ProviderKind::Hetzner => Box::new(hetzner::HetznerProvider::new(credential)),
            ProviderKind::DigitalOcean => Box::new(digitalocean::DigitalOceanProvider::new(credential)),
            ProviderKind::Vultr => Box::new(vultr::VultrProvider::new(credential)),
            ProviderKind::Linode => Box::new(linode::LinodeProvider::new(credential)),
        }
    }
}

// ==============================================================================
// Shared REST plumbing
// ==============================================================================

pub(crate) struct ApiClient {
    http: Client,
    base_url: &'static str,
    credential: ProviderCredential,
}

impl ApiClient {
    pub(crate) fn new(base_url: &'static str, credential: ProviderCredential) -> Self {
        let http = Client::builder()
            .timeout(API_TIMEOUT)
            .user_agent(concat!("fleetkeeper/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url,
            credential,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let mut auth = HeaderValue::from_str(self.credential.bearer_header().as_str())
            .map_err(|_| FleetError::Auth("API token contains characters not allowed in an HTTP header".into()))?;
        auth.set_sensitive(true);

        let response = request
            .header(AUTHORIZATION, auth)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(FleetError::Http {
            status: status.as_u16(),
            message: error_message(&body).unwrap_or_else(|| {
                status.canonical_reason().unwrap_or("request failed").to_string()
            }),
        })
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        debug!(path, "GET");
        let response = self.send(self.http.get(self.url(path)).query(query)).await?;
        response.json::<T>().await.map_err(decode_error)
    }

    pub(crate) async fn post_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        debug!(path, "POST");
        let response = self.send(self.http.post(self.url(path)).json(body)).await?;
        response.json::<T>().await.map_err(decode_error)
    }

    pub(crate) async fn delete(&self, path: &str) -> Result<()> {
        debug!(path, "DELETE");
        self.send(self.http.delete(self.url(path))).await.map(|_| ())
    }

    /// `true` for 2xx, `false` when the API rejects the token, error otherwise.
    pub(crate) async fn probe(&self, path: &str, query: &[(&str, &str)]) -> Result<bool> {
        match self.send(self.http.get(self.url(path)).query(query)).await {
            Ok(_) => Ok(true),
            Err(FleetError::Http { status: 401 | 403, .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

fn transport_error(e: reqwest::Error) -> FleetError {
    let code = if e.is_timeout() {
        Some("ETIMEDOUT".to_string())
    } else {
        None
    };
    FleetError::Transport {
        code,
        message: format!("Provider API request failed: {}", e),
    }
}

fn decode_error(e: reqwest::Error) -> FleetError {
    FleetError::Http {
        status: 502,
        message: format!("Unexpected provider response: {}", e),
    }
}

/// Pulls the human message out of the error envelopes the four APIs use.
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .pointer("/error/message")
        .or_else(|| value.get("message"))
        .or_else(|| value.get("error").filter(|v| v.is_string()))
        .or_else(|| value.pointer("/errors/0/reason"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| (!body.trim().is_empty()).then(|| body.chars().take(MAX_ERROR_BODY).collect()))
}

/// Provider ids arrive as numbers or strings.
pub(crate) fn id_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// 🛡️ Ids are interpolated into URL paths; only plain tokens are accepted.
pub(crate) fn path_segment(id: &str) -> Result<&str> {
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(FleetError::Validation(format!("Invalid provider resource id: '{}'", id)));
    }
    Ok(id)
}
