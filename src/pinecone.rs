//! Pinecone REST client implementing [`VectorIndex`].
//!
//! Index management goes through the control plane; upserts and queries go
//! to the per-index data-plane host, which is looked up once per index and
//! cached.

use std::{collections::HashMap, sync::Mutex, time::Duration};

use reqwest::{
    Client,
    Response,
    StatusCode,
    header::{CONTENT_TYPE, HeaderMap, HeaderValue},
};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    index::{
        IndexDescription,
        IndexRecord,
        IndexSpec,
        Metric,
        QueryMatch,
        QueryRequest,
        RecordMetadata,
        VectorIndex,
    },
};

pub const DEFAULT_CONTROL_URL: &str = "https://api.pinecone.io";
pub const API_VERSION: &str = "2024-07";

/// Where serverless indexes are created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerlessSpec {
    pub cloud: String,
    pub region: String,
}

impl Default for ServerlessSpec {
    fn default() -> Self {
        Self {
            cloud: "aws".into(),
            region: "us-east-1".into(),
        }
    }
}

pub struct PineconeIndex {
    client: Client,
    control_url: String,
    serverless: ServerlessSpec,
    namespace: Option<String>,
    hosts: Mutex<HashMap<String, String>>,
}

impl std::fmt::Debug for PineconeIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PineconeIndex")
            .field("control_url", &self.control_url)
            .field("serverless", &self.serverless)
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl PineconeIndex {
    pub fn new(
        api_key: &str,
        control_url: &str,
        serverless: ServerlessSpec,
        namespace: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(Error::Config("missing Pinecone API key".into()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            "api-key",
            HeaderValue::from_str(api_key.trim())
                .map_err(|_| Error::Config("invalid Pinecone API key".into()))?,
        );
        headers.insert(
            "x-pinecone-api-version",
            HeaderValue::from_static(API_VERSION),
        );
        headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            control_url: control_url.trim_end_matches('/').to_string(),
            serverless,
            namespace,
            hosts: Mutex::new(HashMap::new()),
        })
    }

    fn cached_host(&self, index: &str) -> Option<String> {
        self.hosts.lock().ok()?.get(index).cloned()
    }

    fn forget_host(&self, index: &str) {
        if let Ok(mut hosts) = self.hosts.lock() {
            hosts.remove(index);
        }
    }

    async fn fetch_index(&self, name: &str) -> Result<Option<IndexModel>> {
        let resp = self
            .client
            .get(format!("{}/indexes/{name}", self.control_url))
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let model: IndexModel = checked(resp).await?.json().await?;
        Ok(Some(model))
    }

    async fn data_url(&self, index: &str, path: &str) -> Result<String> {
        let host = match self.cached_host(index) {
            Some(host) => host,
            None => {
                let model = self
                    .fetch_index(index)
                    .await?
                    .ok_or_else(|| {
                        Error::Index(format!("index '{index}' not found"))
                    })?;
                let host = model.host.filter(|h| !h.is_empty()).ok_or_else(
                    || Error::Index(format!("index '{index}' has no host yet")),
                )?;
                if let Ok(mut hosts) = self.hosts.lock() {
                    hosts.insert(index.to_string(), host.clone());
                }
                host
            }
        };

        if host.starts_with("http://") || host.starts_with("https://") {
            Ok(format!("{}/{path}", host.trim_end_matches('/')))
        } else {
            Ok(format!("https://{host}/{path}"))
        }
    }
}

/// Turn a non-success response into an error carrying the body.
async fn checked(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp
        .text()
        .await
        .unwrap_or_else(|_| "<body unavailable>".to_string());
    Err(Error::Index(format!("Pinecone returned {status}: {body}")))
}

impl VectorIndex for PineconeIndex {
    async fn list_indexes(&self) -> Result<Vec<String>> {
        let resp = self
            .client
            .get(format!("{}/indexes", self.control_url))
            .send()
            .await?;
        let list: IndexList = checked(resp).await?.json().await?;
        Ok(list.indexes.into_iter().map(|i| i.name).collect())
    }

    async fn describe_index(
        &self,
        name: &str,
    ) -> Result<Option<IndexDescription>> {
        Ok(self.fetch_index(name).await?.map(|model| IndexDescription {
            name: model.name,
            dimension: model.dimension,
            metric: model.metric,
        }))
    }

    async fn create_index(&self, spec: &IndexSpec) -> Result<()> {
        let body = CreateIndexRequest {
            name: &spec.name,
            dimension: spec.dimension,
            metric: spec.metric,
            spec: CreateSpec {
                serverless: ServerlessBody {
                    cloud: &self.serverless.cloud,
                    region: &self.serverless.region,
                },
            },
        };
        let resp = self
            .client
            .post(format!("{}/indexes", self.control_url))
            .json(&body)
            .send()
            .await?;
        checked(resp).await?;
        Ok(())
    }

    async fn delete_index(&self, name: &str) -> Result<()> {
        let resp = self
            .client
            .delete(format!("{}/indexes/{name}", self.control_url))
            .send()
            .await?;
        checked(resp).await?;
        self.forget_host(name);
        Ok(())
    }

    async fn upsert(&self, index: &str, records: &[IndexRecord]) -> Result<()> {
        let url = self.data_url(index, "vectors/upsert").await?;
        let body = UpsertRequest {
            vectors: records
                .iter()
                .map(|r| WireVector {
                    id: &r.id,
                    values: &r.values,
                    metadata: &r.metadata,
                })
                .collect(),
            namespace: self.namespace.as_deref(),
        };
        let resp = self.client.post(url).json(&body).send().await?;
        checked(resp).await?;
        Ok(())
    }

    async fn query(
        &self,
        index: &str,
        request: &QueryRequest,
    ) -> Result<Vec<QueryMatch>> {
        let url = self.data_url(index, "query").await?;
        let body = WireQuery {
            vector: &request.vector,
            top_k: request.top_k,
            include_values: request.include_values,
            include_metadata: request.include_metadata,
            namespace: self.namespace.as_deref(),
        };
        let resp = self.client.post(url).json(&body).send().await?;
        let parsed: QueryResponse = checked(resp).await?.json().await?;
        Ok(parsed.into_matches())
    }
}

#[derive(Debug, Deserialize)]
struct IndexList {
    #[serde(default)]
    indexes: Vec<IndexModel>,
}

#[derive(Debug, Deserialize)]
struct IndexModel {
    name: String,
    dimension: usize,
    metric: Metric,
    #[serde(default)]
    host: Option<String>,
}

#[derive(Serialize)]
struct CreateIndexRequest<'a> {
    name: &'a str,
    dimension: usize,
    metric: Metric,
    spec: CreateSpec<'a>,
}

#[derive(Serialize)]
struct CreateSpec<'a> {
    serverless: ServerlessBody<'a>,
}

#[derive(Serialize)]
struct ServerlessBody<'a> {
    cloud: &'a str,
    region: &'a str,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<WireVector<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Serialize)]
struct WireVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: &'a RecordMetadata,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireQuery<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_values: bool,
    include_metadata: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<WireMatch>,
}

#[derive(Debug, Deserialize)]
struct WireMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    values: Vec<f32>,
    #[serde(default)]
    metadata: Option<RecordMetadata>,
}

impl QueryResponse {
    fn into_matches(self) -> Vec<QueryMatch> {
        self.matches
            .into_iter()
            .map(|m| QueryMatch {
                id: m.id,
                score: m.score,
                values: m.values,
                metadata: m.metadata,
            })
            .collect()
    }
}
