use super::{EsLikeStore, NestedArrayOp};
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};

/// Talks to an Elasticsearch-compatible cluster over its plain HTTP API.
/// There's no first-party Elasticsearch crate in wide use here; the
/// surface this pipeline needs (get, update, delete, scripted update) is
/// small enough that a thin `reqwest` client is the idiomatic choice,
/// the same crate already used for outbound webhook delivery.
pub struct EsHttpStore {
    client: reqwest::Client,
    base_url: String,
    auth: Option<(String, String)>,
}

impl EsHttpStore {
    pub fn new(base_url: impl Into<String>, auth: Option<(String, String)>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into(), auth }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut req = self.client.request(method, self.url(path));
        if let Some((user, pass)) = &self.auth {
            req = req.basic_auth(user, Some(pass));
        }
        req
    }
}

#[async_trait]
impl EsLikeStore for EsHttpStore {
    async fn get_with_version(&self, index: &str, id: &str) -> Result<Option<(Value, i64)>> {
        let resp = self.request(reqwest::Method::GET, &format!("{index}/_doc/{id}")).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = resp.error_for_status()?;
        let body: Value = resp.json().await?;
        let version = body.get("_version").and_then(Value::as_i64).unwrap_or(0);
        let source = body.get("_source").cloned().unwrap_or(Value::Null);
        Ok(Some((source, version)))
    }

    async fn upsert(&self, index: &str, id: &str, doc: &Value) -> Result<()> {
        let body = json!({ "doc": doc, "doc_as_upsert": true });
        let resp = self
            .request(reqwest::Method::POST, &format!("{index}/_update/{id}"))
            .json(&body)
            .send()
            .await?;
        resp.error_for_status()?;
        Ok(())
    }

    async fn delete(&self, index: &str, id: &str) -> Result<()> {
        let resp = self.request(reqwest::Method::DELETE, &format!("{index}/_doc/{id}")).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        resp.error_for_status()?;
        Ok(())
    }

    async fn scripted_update(&self, index: &str, id: &str, version: i64, op: &NestedArrayOp) -> Result<()> {
        let script = build_script(op);
        let resp = self
            .request(reqwest::Method::POST, &format!("{index}/_update/{id}?version={version}"))
            .json(&json!({ "script": script }))
            .send()
            .await?;

        match resp.status() {
            StatusCode::NOT_FOUND => Err(SyncError::MissingDocument { doc_id: id.to_string() }),
            StatusCode::CONFLICT => Err(SyncError::VersionConflict { doc_id: id.to_string() }),
            _ => {
                resp.error_for_status()?;
                Ok(())
            }
        }
    }

    async fn search(&self, index: &str, query: &Value) -> Result<Vec<Value>> {
        let resp = self
            .request(reqwest::Method::POST, &format!("{index}/_search"))
            .json(query)
            .send()
            .await?
            .error_for_status()?;
        let body: Value = resp.json().await?;
        Ok(body
            .get("hits")
            .and_then(|h| h.get("hits"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|hit| hit.get("_source").cloned())
            .collect())
    }
}

/// Builds the Painless-shaped script body for a nested-array mutation,
/// matching the upsert-by-id / remove-by-id scripts the source pipeline
/// used to mutate satellite arrays atomically on the server.
fn build_script(op: &NestedArrayOp) -> Value {
    match op {
        NestedArrayOp::UpsertById { field, entry } => json!({
            "source": format!(
                "if (ctx._source.{field} == null) {{ ctx._source.{field} = [] }} \
                 def found = false; \
                 for (int i = 0; i < ctx._source.{field}.size(); i++) {{ \
                   if (ctx._source.{field}[i].Id == params.entry.Id) {{ \
                     ctx._source.{field}[i] = params.entry; found = true; break; \
                   }} \
                 }} \
                 if (!found) {{ ctx._source.{field}.add(params.entry) }}",
                field = field
            ),
            "params": { "entry": entry },
        }),
        NestedArrayOp::RemoveById { field, entry_id } => json!({
            "source": format!(
                "if (ctx._source.{field} != null) {{ \
                   ctx._source.{field}.removeIf(item -> item.Id == params.entry_id); \
                 }}",
                field = field
            ),
            "params": { "entry_id": entry_id },
        }),
    }
}
