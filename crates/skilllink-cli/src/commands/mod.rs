//! CLI command implementations.

pub mod jobs;
pub mod session;

use anyhow::{Context, Result, anyhow, bail};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

/// Thin wrapper over the Skilllink HTTP API.
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    kind: String,
}

impl ApiClient {
    pub fn new(api_url: &str, token: Option<String>) -> Result<Self> {
        let mut base =
            Url::parse(api_url).with_context(|| format!("invalid API url: {}", api_url))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base,
            token,
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base
            .join(path.trim_start_matches('/'))
            .with_context(|| format!("invalid API path: {}", path))
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = self.url(path)?;
        debug!(%method, %url, "API request");
        let mut req = self.http.request(method, url);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        Ok(req)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = send(self.request(Method::GET, path)?).await?;
        Ok(resp.json().await?)
    }

    pub async fn get_with_query<T, Q>(&self, path: &str, query: &Q) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let resp = send(self.request(Method::GET, path)?.query(query)).await?;
        Ok(resp.json().await?)
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let resp = send(self.request(Method::POST, path)?.json(body)).await?;
        Ok(resp.json().await?)
    }

    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let resp = send(self.request(Method::PUT, path)?.json(body)).await?;
        Ok(resp.json().await?)
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        send(self.request(Method::DELETE, path)?).await?;
        Ok(())
    }
}

async fn send(req: RequestBuilder) -> Result<Response> {
    let resp = req.send().await.context("could not reach the Skilllink API")?;
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let text = resp.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => Err(describe_error(status, &body)),
        Err(_) => bail!("request failed with {}: {}", status, text),
    }
}

fn describe_error(status: StatusCode, body: &ErrorBody) -> anyhow::Error {
    match body.kind.as_str() {
        "unauthenticated" => anyhow!("{} (run `skilllink login` first)", body.error),
        "unauthorized" => anyhow!("not allowed: {}", body.error),
        "conflict" => anyhow!(
            "{}; the job changed while the request was in flight, \
             check its state with `skilllink jobs show <id>`",
            body.error
        ),
        "invalid_transition" => anyhow!("not possible right now: {}", body.error),
        _ => anyhow!("{} ({})", body.error, status),
    }
}
