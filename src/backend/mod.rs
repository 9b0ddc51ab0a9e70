//! Authenticated HTTP client for the record-oriented backend API.
//!
//! Fixed endpoints only: login, data CRUD, find, aggregate, file, and schema
//! description. Every method surfaces the backend's raw status distinctions
//! (404/403/5xx) so callers can map them to the right IRC-visible behavior.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::error::BackendError;

#[derive(Debug, Clone)]
pub struct LoginResult {
    pub token: String,
    pub access: String,
}

pub struct BackendClient {
    http: Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Self {
        let http = Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("tenantircd/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("reqwest client builder is infallible for this configuration");
        BackendClient {
            http,
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn status_to_error(resp: reqwest::Response) -> BackendError {
        match resp.status() {
            StatusCode::NOT_FOUND => BackendError::NotFound,
            StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => BackendError::Forbidden,
            status => BackendError::Unexpected(status.as_u16()),
        }
    }

    /// `POST /auth/login {tenant, username}`. Accepts both `{data: {token|jwt,
    /// access}}` and a flat `{token|jwt, access}` response shape.
    pub async fn login(&self, tenant: &str, username: &str) -> Result<LoginResult, BackendError> {
        let resp = self
            .http
            .post(self.url("/auth/login"))
            .json(&serde_json::json!({ "tenant": tenant, "username": username }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::status_to_error(resp).await);
        }
        let body: Value = resp.json().await.map_err(|e| BackendError::Malformed(e.to_string()))?;
        let payload = body.get("data").unwrap_or(&body);
        let token = payload
            .get("token")
            .or_else(|| payload.get("jwt"))
            .and_then(Value::as_str)
            .ok_or_else(|| BackendError::Malformed("missing token/jwt in login response".into()))?
            .to_string();
        let access = payload
            .get("access")
            .and_then(Value::as_str)
            .ok_or_else(|| BackendError::Malformed("missing access in login response".into()))?
            .to_string();
        Ok(LoginResult { token, access })
    }

    fn authed(&self, builder: reqwest::RequestBuilder, token: &str) -> reqwest::RequestBuilder {
        builder.bearer_auth(token)
    }

    /// `GET /api/data/{schema}[/{id}][?limit=N]`.
    pub async fn get_data(
        &self,
        token: &str,
        schema: &str,
        record_id: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Value, BackendError> {
        let mut path = format!("/api/data/{schema}");
        if let Some(id) = record_id {
            path.push('/');
            path.push_str(id);
        }
        let mut req = self.authed(self.http.get(self.url(&path)), token);
        if let Some(limit) = limit {
            req = req.query(&[("limit", limit)]);
        }
        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(Self::status_to_error(resp).await);
        }
        resp.json().await.map_err(|e| BackendError::Malformed(e.to_string()))
    }

    /// `POST /api/find/{schema}` with `{where, limit, select?}`.
    pub async fn find(
        &self,
        token: &str,
        schema: &str,
        condition: &Value,
        limit: u32,
        select: Option<&[String]>,
    ) -> Result<Value, BackendError> {
        let mut body = serde_json::json!({ "where": condition, "limit": limit });
        if let Some(select) = select {
            body["select"] = serde_json::json!(select);
        }
        let resp = self
            .authed(self.http.post(self.url(&format!("/api/find/{schema}"))), token)
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::status_to_error(resp).await);
        }
        resp.json().await.map_err(|e| BackendError::Malformed(e.to_string()))
    }

    /// `POST /api/aggregate/{schema}` with `{aggregate:{total:{$count:'*'}}, where?}`.
    pub async fn count(
        &self,
        token: &str,
        schema: &str,
        condition: Option<&Value>,
    ) -> Result<u64, BackendError> {
        let mut body = serde_json::json!({ "aggregate": { "total": { "$count": "*" } } });
        if let Some(condition) = condition {
            body["where"] = condition.clone();
        }
        let resp = self
            .authed(
                self.http.post(self.url(&format!("/api/aggregate/{schema}"))),
                token,
            )
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::status_to_error(resp).await);
        }
        let value: Value = resp.json().await.map_err(|e| BackendError::Malformed(e.to_string()))?;
        extract_total(&value)
            .ok_or_else(|| BackendError::Malformed("missing total in aggregate response".into()))
    }

    /// Aggregate metadata cached on a schema channel when it's first created:
    /// record count plus created/updated timestamp bounds.
    pub async fn fetch_schema_meta(
        &self,
        token: &str,
        schema: &str,
    ) -> Result<crate::state::SchemaMeta, BackendError> {
        let body = serde_json::json!({
            "aggregate": {
                "total": { "$count": "*" },
                "min_created": { "$min": "created_at" },
                "max_created": { "$max": "created_at" },
                "max_updated": { "$max": "updated_at" },
            }
        });
        let resp = self
            .authed(
                self.http.post(self.url(&format!("/api/aggregate/{schema}"))),
                token,
            )
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::status_to_error(resp).await);
        }
        let value: Value = resp.json().await.map_err(|e| BackendError::Malformed(e.to_string()))?;
        let row = value
            .get("data")
            .and_then(Value::as_array)
            .and_then(|rows| rows.first())
            .ok_or_else(|| BackendError::Malformed("missing data row in aggregate response".into()))?;
        Ok(crate::state::SchemaMeta {
            record_count: row.get("total").and_then(Value::as_u64).unwrap_or(0),
            min_created: row.get("min_created").and_then(Value::as_str).map(str::to_string),
            max_created: row.get("max_created").and_then(Value::as_str).map(str::to_string),
            max_updated: row.get("max_updated").and_then(Value::as_str).map(str::to_string),
        })
    }

    /// `GET /api/describe/schema/{schema}`, used for the KICK permission
    /// fallback and schema-channel join validation.
    pub async fn describe_schema(&self, token: &str, schema: &str) -> Result<Value, BackendError> {
        let resp = self
            .authed(
                self.http
                    .get(self.url(&format!("/api/describe/schema/{schema}"))),
                token,
            )
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::status_to_error(resp).await);
        }
        resp.json().await.map_err(|e| BackendError::Malformed(e.to_string()))
    }

    /// `POST /api/file/{retrieve|store|delete}`.
    pub async fn file_op(
        &self,
        token: &str,
        op: &str,
        body: &Value,
    ) -> Result<Value, BackendError> {
        let resp = self
            .authed(self.http.post(self.url(&format!("/api/file/{op}"))), token)
            .json(body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::status_to_error(resp).await);
        }
        resp.json().await.map_err(|e| BackendError::Malformed(e.to_string()))
    }
}

fn extract_total(value: &Value) -> Option<u64> {
    let rows = value.get("data")?.as_array()?;
    let first = rows.first()?;
    first
        .get("total")
        .or_else(|| first.get("total_records"))
        .and_then(Value::as_u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_total_from_aggregate_shape() {
        let value = serde_json::json!({ "data": [{ "total": 7 }] });
        assert_eq!(extract_total(&value), Some(7));
    }

    #[test]
    fn extracts_total_records_alias() {
        let value = serde_json::json!({ "data": [{ "total_records": 3 }] });
        assert_eq!(extract_total(&value), Some(3));
    }

    #[test]
    fn missing_data_yields_none() {
        let value = serde_json::json!({ "oops": true });
        assert_eq!(extract_total(&value), None);
    }
}
