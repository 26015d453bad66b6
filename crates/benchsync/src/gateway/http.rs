//! REST gateway implementation over a blocking HTTP client.

use std::collections::HashSet;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};

use super::{
    EntityType, Filter, Gateway, GatewayError, GatewayResult, Record, SampleBatch,
    XrefKind, XrefMeasurements,
};

/// Gateway talking to a LIMS REST API.
///
/// Routes follow the resource layout: `GET /{resource}?where=...`,
/// `POST /{resource}`, `POST /{resource}/{id}/archive`,
/// `POST /{resource}/{id}/contents`, `POST /experiments/{id}/samples`,
/// `POST /samples/{id}/xref-measurements`, `GET /xrefs/{kind}/identifiers`.
pub struct HttpGateway {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpGateway {
    /// Create a gateway for the given API root and bearer token.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| GatewayError::Transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn headers(&self) -> GatewayResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let bearer = format!("Bearer {}", self.token);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&bearer)
                .map_err(|e| GatewayError::Transport(format!("invalid token: {e}")))?,
        );
        Ok(headers)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn check_status(response: Response) -> GatewayResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().unwrap_or_default();
        Err(GatewayError::Remote {
            status: status.as_u16(),
            message,
        })
    }

    fn get_json(&self, path: &str, query: &[(&str, String)]) -> GatewayResult<Value> {
        let response = self
            .client
            .get(self.url(path))
            .headers(self.headers()?)
            .query(query)
            .send()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Self::check_status(response)?
            .json()
            .map_err(|e| GatewayError::Transport(format!("failed to parse response: {e}")))
    }

    fn post_json(&self, path: &str, body: &Value) -> GatewayResult<Value> {
        let response = self
            .client
            .post(self.url(path))
            .headers(self.headers()?)
            .json(body)
            .send()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Self::check_status(response)?
            .json()
            .map_err(|e| GatewayError::Transport(format!("failed to parse response: {e}")))
    }

    fn record_from_value(entity: EntityType, value: Value) -> GatewayResult<Record> {
        let id = value
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| value.get("id").and_then(Value::as_i64).map(|n| n.to_string()))
            .ok_or_else(|| GatewayError::Transport(format!("{entity} record without id")))?;
        Ok(Record {
            id,
            entity,
            fields: value,
        })
    }
}

impl Gateway for HttpGateway {
    fn query(&self, entity: EntityType, filter: &Filter) -> GatewayResult<Vec<Record>> {
        let where_clause = serde_json::to_string(&filter.0)
            .map_err(|e| GatewayError::Transport(format!("failed to encode filter: {e}")))?;
        let body = self.get_json(entity.resource(), &[("where", where_clause)])?;
        let items = body
            .as_array()
            .cloned()
            .ok_or_else(|| GatewayError::Transport(format!("{entity} query returned non-array")))?;
        items
            .into_iter()
            .map(|item| Self::record_from_value(entity, item))
            .collect()
    }

    fn create(&self, entity: EntityType, fields: Value) -> GatewayResult<Record> {
        let body = self.post_json(entity.resource(), &fields)?;
        Self::record_from_value(entity, body)
    }

    fn update_contents(&self, record: &Record, contents: Value) -> GatewayResult<()> {
        let path = format!("{}/{}/contents", record.entity.resource(), record.id);
        self.post_json(&path, &contents)?;
        Ok(())
    }

    fn archive(&self, record: &Record) -> GatewayResult<()> {
        let path = format!("{}/{}/archive", record.entity.resource(), record.id);
        self.post_json(&path, &json!({}))?;
        Ok(())
    }

    fn add_samples(&self, experiment: &Record, batch: &SampleBatch) -> GatewayResult<()> {
        let path = format!("experiments/{}/samples", experiment.id);
        let body = serde_json::to_value(batch)
            .map_err(|e| GatewayError::Transport(format!("failed to encode batch: {e}")))?;
        self.post_json(&path, &body)?;
        Ok(())
    }

    fn add_xref_measurements(
        &self,
        sample: &Record,
        measurements: &XrefMeasurements,
    ) -> GatewayResult<()> {
        let path = format!("samples/{}/xref-measurements", sample.id);
        let body = serde_json::to_value(measurements)
            .map_err(|e| GatewayError::Transport(format!("failed to encode measurements: {e}")))?;
        self.post_json(&path, &body)?;
        Ok(())
    }

    fn subset(&self, kind: XrefKind) -> GatewayResult<HashSet<String>> {
        let path = format!("xrefs/{}/identifiers", kind.as_str());
        let body = self.get_json(&path, &[])?;
        let items = body
            .as_array()
            .ok_or_else(|| GatewayError::Transport("xref subset returned non-array".to_string()))?;
        Ok(items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect())
    }
}
