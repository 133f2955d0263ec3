use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::{AppError, AppResult};
use crate::types::ApiErrorResponse;

/// JSON client for the platform's REST API.
///
/// Paths are joined onto `base_url` (`moderation/incident/12` becomes
/// `{base_url}/moderation/incident/12`). Non-2xx responses become
/// `AppError::Upstream` carrying the status and the best message we can
/// pull out of the body.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>, timeout: Duration) -> AppResult<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> AppResult<T> {
        let req = self.http.get(self.url(path));
        self.send(req).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> AppResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let req = self.http.post(self.url(path)).json(body);
        self.send(req).await
    }

    async fn send<T: DeserializeOwned>(&self, mut req: RequestBuilder) -> AppResult<T> {
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(upstream_error(resp).await);
        }

        Ok(resp.json::<T>().await?)
    }
}

async fn upstream_error(resp: Response) -> AppError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorResponse>(&body)
        .map(|e| e.error.message)
        .or_else(|_| {
            serde_json::from_str::<serde_json::Value>(&body).map(|v| {
                v.get("error")
                    .and_then(|e| e.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| v.to_string())
            })
        })
        .unwrap_or(body);

    AppError::Upstream { status, message }
}
