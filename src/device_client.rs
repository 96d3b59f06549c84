use anyhow::{anyhow, Context};
use async_trait::async_trait;
use hyper::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use hyper::{Body, Client, Method, Request};
use hyper::client::HttpConnector;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use url::form_urlencoded;

#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }
}

/// One-shot request/response access to the device.
#[async_trait]
pub trait DeviceApi: Send + Sync {
    async fn get(&self, path: &str) -> anyhow::Result<HttpReply>;
    async fn post_form(&self, path: &str, fields: &[(&str, String)]) -> anyhow::Result<HttpReply>;
}

pub type SharedApi = Arc<dyn DeviceApi>;

pub struct HttpDeviceClient {
    client: Client<HttpConnector>,
    origin: String,
    request_timeout: Duration,
}

impl HttpDeviceClient {
    pub fn new(origin: &str, request_timeout: Duration) -> HttpDeviceClient {
        HttpDeviceClient {
            client: Client::new(),
            origin: origin.trim_end_matches('/').to_string(),
            request_timeout,
        }
    }

    async fn send(&self, request: Request<Body>) -> anyhow::Result<HttpReply> {
        let uri = request.uri().clone();
        let response = tokio::time::timeout(self.request_timeout, self.client.request(request))
            .await
            .with_context(|| format!("request {} timeout expired.", uri))??;
        let status = response.status().as_u16();
        let body = tokio::time::timeout(
            self.request_timeout,
            hyper::body::to_bytes(response.into_body()),
        )
        .await
        .with_context(|| format!("read {} timeout expired.", uri))??;

        debug!("{} -> {} ({} bytes)", uri, status, body.len());
        Ok(HttpReply {
            status,
            body: body.to_vec(),
        })
    }
}

#[async_trait]
impl DeviceApi for HttpDeviceClient {
    async fn get(&self, path: &str) -> anyhow::Result<HttpReply> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(format!("{}{}", self.origin, path))
            .header(USER_AGENT, "heater-sync")
            .header(ACCEPT, "application/json")
            .body(Body::empty())?;
        self.send(request).await
    }

    async fn post_form(&self, path: &str, fields: &[(&str, String)]) -> anyhow::Result<HttpReply> {
        let request = Request::builder()
            .method(Method::POST)
            .uri(format!("{}{}", self.origin, path))
            .header(USER_AGENT, "heater-sync")
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(encode_form(fields)))?;
        self.send(request).await
    }
}

pub fn encode_form(fields: &[(&str, String)]) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (k, v) in fields {
        serializer.append_pair(k, v);
    }
    serializer.finish()
}

/// Failure of a user-initiated operation.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Rejected(String),
    #[error("device answered HTTP {0}")]
    Http(u16),
    #[error("not connected, {0} needs the socket")]
    NotConnected(&'static str),
    #[error("error talking to device: {0:#}")]
    Transport(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandReply {
    #[serde(default = "reply_ok_default")]
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn reply_ok_default() -> bool {
    true
}

impl Default for CommandReply {
    fn default() -> Self {
        CommandReply {
            ok: true,
            error: None,
            extra: serde_json::Map::new(),
        }
    }
}

impl CommandReply {
    pub fn field<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.extra
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Pulls a JSON document. Non-2xx statuses and unparseable bodies are errors.
pub async fn get_json<T: DeserializeOwned>(api: &dyn DeviceApi, path: &str) -> anyhow::Result<T> {
    let reply = api.get(path).await?;
    if !reply.is_success() {
        return Err(anyhow!("GET {} returned HTTP {}", path, reply.status));
    }
    serde_json::from_slice(&reply.body).with_context(|| format!("GET {}: parse body", path))
}

/// Posts a form command and interprets the `{ok, error}` envelope.
///
/// A 2xx or redirect with a body that is not a JSON object counts as success.
pub async fn post_command(
    api: &dyn DeviceApi,
    path: &str,
    fields: &[(&str, String)],
) -> Result<CommandReply, CommandError> {
    let reply = api.post_form(path, fields).await?;
    let parsed = serde_json::from_slice::<CommandReply>(&reply.body).ok();

    if reply.is_success() || reply.is_redirect() {
        let parsed = parsed.unwrap_or_default();
        if parsed.ok {
            return Ok(CommandReply { ok: true, ..parsed });
        }
        let message = parsed
            .error
            .unwrap_or_else(|| "request failed".to_string());
        warn!("POST {} rejected ({})", path, message);
        return Err(CommandError::Rejected(message));
    }

    match parsed.and_then(|p| p.error) {
        Some(message) => {
            warn!("POST {} rejected with HTTP {} ({})", path, reply.status, message);
            Err(CommandError::Rejected(message))
        }
        None => {
            warn!("POST {} returned HTTP {}", path, reply.status);
            Err(CommandError::Http(reply.status))
        }
    }
}
