//! HTTP client for the remote outliner API.
//!
//! One client is built per request and dropped with it. Every call carries
//! the bearer credential and a fixed timeout. Any non-2xx status is an
//! error; 429 gets its own variant so callers can back off instead of
//! failing.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::Settings;
use crate::types::{Position, RemoteNode};

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ClientError {
    /// The export endpoint allows roughly one call per minute.
    #[error("remote API rate limit reached, retry in about a minute")]
    RateLimited,

    #[error("remote API returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("remote API request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid API key header value")]
    InvalidCredential,
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Deserialize)]
struct NodesEnvelope {
    #[serde(default)]
    nodes: Vec<RemoteNode>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NodeEnvelope {
    Wrapped { node: RemoteNode },
    Bare(RemoteNode),
}

#[derive(Deserialize)]
struct TargetsEnvelope {
    #[serde(default)]
    targets: Vec<Value>,
}

pub struct WorkflowyClient {
    http: reqwest::Client,
    base_url: String,
}

impl WorkflowyClient {
    pub fn new(api_key: &str, base_url: &str) -> Result<Self> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|_| ClientError::InvalidCredential)?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(&settings.wf_api_key, &settings.wf_api_base_url)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// GET /nodes-export: every node in one flat list.
    pub async fn export_all_nodes(&self) -> Result<Vec<RemoteNode>> {
        let resp = self.http.get(self.url("/nodes-export")).send().await?;
        let envelope: NodesEnvelope = check(resp).await?.json().await?;
        Ok(envelope.nodes)
    }

    pub async fn get_node(&self, node_id: &str) -> Result<RemoteNode> {
        let resp = self.http.get(self.url(&format!("/nodes/{node_id}"))).send().await?;
        let node = match check(resp).await?.json::<NodeEnvelope>().await? {
            NodeEnvelope::Wrapped { node } => node,
            NodeEnvelope::Bare(node) => node,
        };
        Ok(node)
    }

    pub async fn list_children(&self, parent_id: &str) -> Result<Vec<RemoteNode>> {
        let resp = self
            .http
            .get(self.url("/nodes"))
            .query(&[("parent_id", parent_id)])
            .send()
            .await?;
        let envelope: NodesEnvelope = check(resp).await?.json().await?;
        Ok(envelope.nodes)
    }

    pub async fn complete_node(&self, node_id: &str) -> Result<()> {
        let resp = self
            .http
            .post(self.url(&format!("/nodes/{node_id}/complete")))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    pub async fn uncomplete_node(&self, node_id: &str) -> Result<()> {
        let resp = self
            .http
            .post(self.url(&format!("/nodes/{node_id}/uncomplete")))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    /// POST /nodes/:id with whichever of name / note is given.
    pub async fn update_node(
        &self,
        node_id: &str,
        name: Option<&str>,
        note: Option<&str>,
    ) -> Result<()> {
        let mut body = serde_json::Map::new();
        if let Some(name) = name {
            body.insert("name".into(), json!(name));
        }
        if let Some(note) = note {
            body.insert("note".into(), json!(note));
        }
        let resp = self
            .http
            .post(self.url(&format!("/nodes/{node_id}")))
            .json(&body)
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    pub async fn create_node(
        &self,
        parent_id: &str,
        name: &str,
        note: Option<&str>,
        position: Position,
    ) -> Result<Value> {
        let mut body = json!({
            "parent_id": parent_id,
            "name": name,
            "position": position,
        });
        if let Some(note) = note {
            body["note"] = json!(note);
        }
        let resp = self.http.post(self.url("/nodes")).json(&body).send().await?;
        Ok(check(resp).await?.json().await?)
    }

    pub async fn move_node(&self, node_id: &str, parent_id: &str, position: Position) -> Result<()> {
        let resp = self
            .http
            .post(self.url(&format!("/nodes/{node_id}/move")))
            .json(&json!({ "parent_id": parent_id, "position": position }))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    pub async fn delete_node(&self, node_id: &str) -> Result<()> {
        let resp = self
            .http
            .delete(self.url(&format!("/nodes/{node_id}")))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    /// GET /targets: shortcuts and system targets, passed through as-is.
    pub async fn get_targets(&self) -> Result<Vec<Value>> {
        let resp = self.http.get(self.url("/targets")).send().await?;
        let envelope: TargetsEnvelope = check(resp).await?.json().await?;
        Ok(envelope.targets)
    }
}

async fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(ClientError::RateLimited);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ClientError::Status { status, body })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_dropped() {
        let client = WorkflowyClient::new("key", "http://example.test/api/v1/").unwrap();
        assert_eq!(client.url("/targets"), "http://example.test/api/v1/targets");
    }

    #[test]
    fn newline_in_key_is_rejected() {
        assert!(matches!(
            WorkflowyClient::new("bad\nkey", "http://example.test"),
            Err(ClientError::InvalidCredential)
        ));
    }

    #[test]
    fn node_envelope_accepts_both_shapes() {
        let wrapped: NodeEnvelope =
            serde_json::from_str(r#"{"node":{"id":"a","name":"A"}}"#).unwrap();
        assert!(matches!(wrapped, NodeEnvelope::Wrapped { node } if node.id == "a"));
        let bare: NodeEnvelope = serde_json::from_str(r#"{"id":"b","name":"B"}"#).unwrap();
        assert!(matches!(bare, NodeEnvelope::Bare(node) if node.id == "b"));
    }
}
