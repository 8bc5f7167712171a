//! API client for communicating with the predictor server

use anyhow::{Context, Result};
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use url::Url;

/// Error reported by the server for a rejected request
#[derive(Debug, thiserror::Error)]
#[error("{message} ({code}, HTTP {status})")]
pub struct ApiError {
    pub status: u16,
    pub code: String,
    pub message: String,
}

/// API client for the predictor server
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;
        parse_response(response).await
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;
        parse_response(response).await
    }

    /// Make a PUT request with JSON body
    pub async fn put<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;
        let response = self
            .client
            .put(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;
        parse_response(response).await
    }

    /// Make a DELETE request
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;
        let response = self
            .client
            .delete(url)
            .send()
            .await
            .context("Failed to send request")?;
        parse_response(response).await
    }

    pub async fn execute(&self, statement: &Statement) -> Result<StatementOutcome> {
        self.post("statements", statement).await
    }

    pub async fn tables(&self) -> Result<TableList> {
        self.get("tables").await
    }

    pub async fn datasources(&self) -> Result<Vec<DatasourceInfo>> {
        self.get("datasources").await
    }

    pub async fn save_datasource(&self, name: &str, rows: RowData) -> Result<DatasourceInfo> {
        let body = DatasourceUpload::Rows { rows };
        self.put(&format!("datasources/{}", name), &body).await
    }

    pub async fn link_datasource(
        &self,
        name: &str,
        integration: &str,
        query: &str,
    ) -> Result<DatasourceInfo> {
        let body = DatasourceUpload::Integration {
            integration: integration.to_string(),
            query: query.to_string(),
        };
        self.put(&format!("datasources/{}", name), &body).await
    }

    pub async fn delete_datasource(&self, name: &str) -> Result<DatasourceInfo> {
        self.delete(&format!("datasources/{}", name)).await
    }
}

async fn parse_response<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(error) => ApiError {
                status: status.as_u16(),
                code: error.code,
                message: error.message,
            }
            .into(),
            Err(_) => anyhow::anyhow!("API error ({}): {}", status, body),
        });
    }

    response.json().await.context("Failed to parse response")
}

// API request and response types

/// Statement as accepted by `POST /statements`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Statement {
    Insert {
        table: String,
        columns: Vec<String>,
        values: Vec<Value>,
    },
    Select {
        table: String,
        projection: Vec<String>,
        #[serde(rename = "where")]
        conditions: Vec<Condition>,
    },
    Delete {
        table: String,
        #[serde(rename = "where")]
        conditions: Vec<Condition>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub column: String,
    pub value: Value,
}

impl Condition {
    pub fn new(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatementOutcome {
    Rows {
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
    },
    Affected {
        count: usize,
    },
    Passthrough,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableList {
    pub database: String,
    pub tables: Vec<String>,
}

/// Column-ordered rows, as uploaded for a file datasource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowData {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum DatasourceUpload {
    Rows { rows: RowData },
    Integration { integration: String, query: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasourceInfo {
    pub name: String,
    pub kind: String,
    pub row_count: usize,
    pub location: String,
    pub saved_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}
