//! REST mirror
//!
//! `GET {url}/progress` returns every mirrored course as a JSON array;
//! `PUT {url}/progress/{course_id}` upserts one. The bearer token comes from
//! `COURSEGATE_MIRROR_TOKEN` and is never written to config.
//!
//! Requires the `remote` feature; without it the mirror can be configured
//! but every call fails with a `RemoteSync` error.

use async_trait::async_trait;

#[cfg(feature = "remote")]
use tracing::debug;

use super::RemoteMirror;
use crate::error::{EngineError, Result};
use crate::progress::RemoteProgress;

pub const TOKEN_ENV: &str = "COURSEGATE_MIRROR_TOKEN";

pub struct HttpMirror {
    url: String,
    #[cfg_attr(not(feature = "remote"), allow(dead_code))]
    token: Option<String>,
    #[cfg(feature = "remote")]
    client: reqwest::Client,
}

impl HttpMirror {
    pub fn new(url: &str, token: Option<String>) -> Result<Self> {
        if url.trim().is_empty() {
            return Err(EngineError::RemoteSync("mirror url is empty".to_string()));
        }
        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            token,
            #[cfg(feature = "remote")]
            client: reqwest::Client::new(),
        })
    }

    pub fn from_env(url: &str) -> Result<Self> {
        Self::new(url, std::env::var(TOKEN_ENV).ok())
    }

    #[cfg_attr(not(feature = "remote"), allow(dead_code))]
    fn progress_url(&self) -> String {
        format!("{}/progress", self.url)
    }

    #[cfg_attr(not(feature = "remote"), allow(dead_code))]
    fn course_url(&self, course_id: &str) -> String {
        format!("{}/progress/{}", self.url, course_id)
    }
}

#[cfg(feature = "remote")]
impl HttpMirror {
    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

fn remote_err(e: impl std::fmt::Display) -> EngineError {
    EngineError::RemoteSync(e.to_string())
}

#[cfg(feature = "remote")]
#[async_trait]
impl RemoteMirror for HttpMirror {
    fn name(&self) -> &str {
        "http"
    }

    async fn get_progress(&self) -> Result<Vec<RemoteProgress>> {
        let response = self
            .request(reqwest::Method::GET, &self.progress_url())
            .send()
            .await
            .map_err(remote_err)?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(remote_err(format!("GET progress: {} - {}", status, body)));
        }

        let rows: Vec<RemoteProgress> = response.json().await.map_err(remote_err)?;
        debug!("Fetched {} courses from mirror", rows.len());
        Ok(rows)
    }

    async fn update_progress(&self, course_id: &str, update: &RemoteProgress) -> Result<()> {
        let response = self
            .request(reqwest::Method::PUT, &self.course_url(course_id))
            .json(update)
            .send()
            .await
            .map_err(remote_err)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(remote_err(format!("PUT {}: {} - {}", course_id, status, body)));
        }
        Ok(())
    }
}

#[cfg(not(feature = "remote"))]
#[async_trait]
impl RemoteMirror for HttpMirror {
    fn name(&self) -> &str {
        "http"
    }

    async fn get_progress(&self) -> Result<Vec<RemoteProgress>> {
        Err(remote_err("HTTP mirror not available. Rebuild with --features remote"))
    }

    async fn update_progress(&self, _course_id: &str, _update: &RemoteProgress) -> Result<()> {
        Err(remote_err("HTTP mirror not available. Rebuild with --features remote"))
    }
}
