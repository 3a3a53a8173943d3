use std::time::Duration;

use http::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::types::ApiConfig;

use super::error::ApiError;

/// HTTP client for one backend base URL.
///
/// Cheap to clone: the inner `reqwest::Client` is reference-counted, so a
/// clone can be moved into each spawned request task.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: reqwest::Url,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .user_agent(concat!("modfeed/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let base_url = reqwest::Url::parse(&config.base_url).map_err(|e| ApiError::BaseUrl {
            url: config.base_url.clone(),
            reason: e.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::BaseUrl {
                url: config.base_url.clone(),
                reason: "not a hierarchical URL".to_owned(),
            });
        }
        Ok(Self {
            http,
            base_url,
            token: config.resolved_token(),
        })
    }

    /// Base URL with `segments` appended, each percent-encoded, so ids can
    /// never add path components or a query.
    fn url(&self, segments: &[&str]) -> reqwest::Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token {
            Some(ref token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// `GET path?query`, returning the success body.
    pub async fn get_json(
        &self,
        path: &[&str],
        query: &[(&str, String)],
        what: &str,
    ) -> Result<serde_json::Value, ApiError> {
        let url = self.url(path);
        tracing::debug!("api: GET {url} {query:?}");
        let req = self.authorize(self.http.get(url).query(query));
        let resp = req.send().await?;
        decode(resp, what).await
    }

    /// `POST path` with a JSON body, returning the success body.
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &[&str],
        body: &B,
        what: &str,
    ) -> Result<serde_json::Value, ApiError> {
        let url = self.url(path);
        tracing::debug!("api: POST {url}");
        let req = self.authorize(self.http.post(url).json(body));
        let resp = req.send().await?;
        decode(resp, what).await
    }
}

/// Apply the backend's error contract to a response.
///
/// Any non-success status or `{ success: false }` body becomes an error;
/// "not found" is told apart from other failures.
async fn decode(resp: reqwest::Response, what: &str) -> Result<serde_json::Value, ApiError> {
    let status = resp.status();
    let text = resp.text().await?;
    let body: Option<serde_json::Value> = serde_json::from_str(&text).ok();

    if status == StatusCode::NOT_FOUND {
        return Err(ApiError::NotFound {
            what: what.to_owned(),
        });
    }

    if let Some(ref body) = body {
        let failed = body.get("success").and_then(serde_json::Value::as_bool) == Some(false);
        if failed || !status.is_success() {
            match structured_error(body, what) {
                Some(err) => return Err(err),
                None if failed => {
                    return Err(ApiError::Application {
                        code: None,
                        message: String::new(),
                    });
                }
                None => {}
            }
        }
    }

    if !status.is_success() {
        return Err(ApiError::Http { status });
    }

    match body {
        Some(body) => Ok(body),
        // Re-parse to surface the real serde error.
        None => Ok(serde_json::from_str(&text)?),
    }
}

fn structured_error(body: &serde_json::Value, what: &str) -> Option<ApiError> {
    let error = body.get("error");
    let code = error
        .and_then(|e| e.get("code"))
        .or_else(|| body.get("code"))
        .and_then(serde_json::Value::as_str)
        .map(str::to_owned);
    let message = error
        .and_then(|e| e.as_str().or_else(|| e.get("message").and_then(serde_json::Value::as_str)))
        .or_else(|| body.get("message").and_then(serde_json::Value::as_str))
        .map(str::to_owned);

    if code.is_none() && message.is_none() {
        return None;
    }
    let is_not_found = [code.as_deref(), message.as_deref()]
        .into_iter()
        .flatten()
        .any(|s| {
            let s = s.to_lowercase();
            s == "not_found" || s == "notfound" || s.ends_with("not found")
        });
    if is_not_found {
        return Some(ApiError::NotFound {
            what: what.to_owned(),
        });
    }
    Some(ApiError::Application {
        code,
        message: message.unwrap_or_default(),
    })
}

/// Deserialize `body[key]`, treating a missing key as a shape mismatch.
pub(crate) fn take_field<T: DeserializeOwned>(
    mut body: serde_json::Value,
    key: &str,
) -> Result<T, ApiError> {
    let value = body
        .get_mut(key)
        .map(serde_json::Value::take)
        .unwrap_or(serde_json::Value::Null);
    Ok(serde_json::from_value(value)?)
}
