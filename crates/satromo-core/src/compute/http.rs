//! Blocking JSON-over-HTTP client for the compute service.
//!
//! | call              | request                                   |
//! |-------------------|-------------------------------------------|
//! | submit export     | `POST /exports`                           |
//! | submit generation | `POST /generations`                       |
//! | job status        | `GET /jobs/{id}`                          |
//! | list jobs         | `GET /jobs`                               |
//! | list assets       | `GET /assets?parent=<collection>`         |
//! | delete asset      | `DELETE /assets?id=<asset>`               |
//! | scene statistics  | `GET /scenes?collection=&start=&end=`     |

use super::{
    Asset, ComputeService, ExportRequest, GenerationOutcome, GenerationRequest, SceneStats,
};
use crate::config::ServiceConfig;
use crate::error::{Result, SatromoError};
use crate::job::JobStatus;
use chrono::NaiveDate;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

const USER_AGENT: &str = concat!("satromo/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    no_source_data: bool,
}

pub struct HttpComputeService {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpComputeService {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| SatromoError::Service(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Build a client from configuration, reading the bearer token from the
    /// configured environment variable when one is named.
    pub fn from_config(service: &ServiceConfig) -> Result<Self> {
        let token = service
            .token_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|t| !t.is_empty());
        if token.is_none() {
            if let Some(var) = &service.token_env {
                tracing::warn!(var = %var, "compute service token variable is not set");
            }
        }
        Self::new(
            &service.base_url,
            token,
            Duration::from_secs(service.timeout_seconds),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// `path` with `id` appended as one percent-encoded segment.
    fn item_url(&self, path: &str, id: &str) -> Result<Url> {
        let mut url = Url::parse(&self.url(path))
            .map_err(|e| SatromoError::Service(format!("invalid base url '{}': {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|_| SatromoError::Service(format!("base url '{}' cannot take a path", self.base_url)))?
            .push(id);
        Ok(url)
    }

    fn send(&self, endpoint: &str, request: RequestBuilder) -> Result<Response> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request
            .send()
            .map_err(|e| SatromoError::Service(format!("{endpoint}: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(SatromoError::ServiceStatus {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }
        Ok(response)
    }

    fn send_json<T: DeserializeOwned>(&self, endpoint: &str, request: RequestBuilder) -> Result<T> {
        self.send(endpoint, request)?
            .json()
            .map_err(|e| SatromoError::Service(format!("{endpoint}: invalid response body: {e}")))
    }
}

impl ComputeService for HttpComputeService {
    fn submit_export(&self, request: &ExportRequest) -> Result<String> {
        let req = self.client.post(self.url("/exports")).json(request);
        let resp: SubmitResponse = self.send_json("POST /exports", req)?;
        tracing::debug!(job_id = %resp.id, prefix = %request.filename_prefix, "export submitted");
        Ok(resp.id)
    }

    fn submit_generation(&self, request: &GenerationRequest) -> Result<GenerationOutcome> {
        let req = self.client.post(self.url("/generations")).json(request);
        let resp: GenerationResponse = self.send_json("POST /generations", req)?;
        match resp.id {
            Some(id) if !resp.no_source_data => Ok(GenerationOutcome::Submitted(id)),
            _ if resp.no_source_data => Ok(GenerationOutcome::NoSourceData),
            _ => Err(SatromoError::Service(
                "POST /generations: response carries neither id nor no_source_data".to_string(),
            )),
        }
    }

    fn job_status(&self, job_id: &str) -> Result<JobStatus> {
        let endpoint = format!("GET /jobs/{job_id}");
        let req = self.client.get(self.item_url("/jobs", job_id)?);
        self.send_json(&endpoint, req)
    }

    fn list_jobs(&self) -> Result<Vec<JobStatus>> {
        let req = self.client.get(self.url("/jobs"));
        self.send_json("GET /jobs", req)
    }

    fn list_assets(&self, collection: &str) -> Result<Vec<Asset>> {
        let req = self
            .client
            .get(self.url("/assets"))
            .query(&[("parent", collection)]);
        self.send_json("GET /assets", req)
    }

    fn delete_asset(&self, asset_id: &str) -> Result<()> {
        let req = self
            .client
            .delete(self.url("/assets"))
            .query(&[("id", asset_id)]);
        self.send("DELETE /assets", req)?;
        Ok(())
    }

    fn scene_stats(
        &self,
        collection: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Option<SceneStats>> {
        let req = self.client.get(self.url("/scenes")).query(&[
            ("collection", collection.to_string()),
            ("start", start.to_string()),
            ("end", end.to_string()),
        ]);
        let stats: Option<SceneStats> = self.send_json("GET /scenes", req)?;
        Ok(stats.filter(|s| s.count > 0))
    }
}
