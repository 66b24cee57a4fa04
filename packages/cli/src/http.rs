//! HTTP client for a Direktiv API.
//!
//! Sends [`MutationRequest`]s and answers query fetches. Transport errors
//! become [`MutationFailure::Network`], non-2xx responses
//! [`MutationFailure::Rejected`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use pages_evaluator::{MutationClient, MutationFailure, MutationRequest};
use pages_schema::HttpMethod;
use reqwest::{Client, Method};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn url_for(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else if endpoint.starts_with('/') {
            format!("{}{}", self.base_url, endpoint)
        } else {
            format!("{}/{}", self.base_url, endpoint)
        }
    }

    /// GET a query endpoint
    #[instrument(skip(self))]
    pub async fn fetch(&self, endpoint: &str) -> Result<Value, MutationFailure> {
        let url = self.url_for(endpoint);
        let response = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| MutationFailure::network(e.to_string()))?;
        read_response(response).await
    }
}

fn method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

#[async_trait(?Send)]
impl MutationClient for ApiClient {
    #[instrument(skip(self, request), fields(method = %request.method, endpoint = %request.endpoint))]
    async fn submit(&self, request: &MutationRequest) -> Result<Value, MutationFailure> {
        let url = self.url_for(&request.endpoint);

        let mut builder = self
            .http
            .request(method(request.method), &url)
            .header("Accept", "application/json");
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| MutationFailure::network(e.to_string()))?;

        read_response(response).await
    }
}

async fn read_response(response: reqwest::Response) -> Result<Value, MutationFailure> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| MutationFailure::network(e.to_string()))?;
    debug!(status = status.as_u16(), bytes = text.len(), "Response received");

    // Empty or non-JSON bodies are kept as a string (or null)
    let body = if text.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).unwrap_or(Value::String(text))
    };

    if !status.is_success() {
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
        return Err(MutationFailure::Rejected {
            status: status.as_u16(),
            message,
            body: (!body.is_null()).then_some(body),
        });
    }

    Ok(body)
}
