//! Minimal Consul HTTP API client for blocking catalog and KV reads.
//!
//! Both reads are Consul blocking queries: the request carries the last
//! seen index and a wait time, and the agent holds the request open until
//! the data changes or the wait elapses. The index of the returned data
//! comes back in the `X-Consul-Index` header.

use std::collections::BTreeMap;
use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::HeaderMap;
use hyper::StatusCode;
use serde::Deserialize;
use url::Url;

use crate::error::IngressError;
use crate::server::{self, HttpClient};

const INDEX_HEADER: &str = "x-consul-index";
const TOKEN_HEADER: &str = "x-consul-token";

/// Extra time on top of the wait before a read is considered hung.
/// Consul adds up to wait/16 of jitter to blocking queries.
const READ_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
pub struct BlockingQuery {
    pub index: u64,
    pub wait: Duration,
}

impl BlockingQuery {
    fn read_timeout(&self) -> Duration {
        self.wait + self.wait / 16 + READ_GRACE
    }
}

/// A value together with the registry index it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Indexed<T> {
    pub index: u64,
    pub value: T,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvPair {
    pub key: String,
    pub value: Vec<u8>,
}

#[derive(Deserialize)]
struct RawKvPair {
    #[serde(rename = "Key")]
    key: String,
    #[serde(rename = "Value", default)]
    value: Option<String>,
}

pub struct ConsulClient {
    base: Url,
    token: Option<String>,
    client: HttpClient,
}

impl ConsulClient {
    /// Creates a client for the agent at `address`. No connection is made until the first read.
    pub fn new(address: &str, token: &str) -> Result<Self, IngressError> {
        let mut base = Url::parse(address).map_err(|e| IngressError::UriParse {
            source: Box::new(e),
        })?;
        if base.scheme() != "http" && base.scheme() != "https" {
            return Err(IngressError::InvalidSetting {
                name: "consul-address",
                message: format!("unsupported scheme '{}' (expected http or https)", base.scheme()),
            });
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            base,
            token: (!token.is_empty()).then(|| token.to_string()),
            client: server::build_http_client(),
        })
    }

    /// Lists every registered service with its tags.
    pub async fn catalog_services(
        &self,
        query: &BlockingQuery,
    ) -> Result<Indexed<BTreeMap<String, Vec<String>>>, IngressError> {
        let endpoint = "v1/catalog/services";
        let (status, headers, body) = self.get(endpoint, query, false).await?;
        if !status.is_success() {
            return Err(IngressError::RegistryStatus {
                endpoint: endpoint.into(),
                status,
            });
        }

        let index = parse_index(endpoint, &headers)?;
        let services: BTreeMap<String, Option<Vec<String>>> =
            serde_json::from_slice(&body).map_err(|e| IngressError::RegistryResponse {
                endpoint: endpoint.into(),
                message: e.to_string(),
            })?;

        Ok(Indexed {
            index,
            value: services
                .into_iter()
                .map(|(name, tags)| (name, tags.unwrap_or_default()))
                .collect(),
        })
    }

    /// Lists every key under `prefix` with its decoded value.
    ///
    /// A missing prefix is reported by Consul as 404 and yields an empty list.
    pub async fn kv_list(
        &self,
        prefix: &str,
        query: &BlockingQuery,
    ) -> Result<Indexed<Vec<KvPair>>, IngressError> {
        let endpoint = format!("v1/kv/{}", prefix.trim_start_matches('/'));
        let (status, headers, body) = self.get(&endpoint, query, true).await?;

        if status == StatusCode::NOT_FOUND {
            let index = parse_index(&endpoint, &headers)?;
            return Ok(Indexed {
                index,
                value: Vec::new(),
            });
        }
        if !status.is_success() {
            return Err(IngressError::RegistryStatus { endpoint, status });
        }

        let index = parse_index(&endpoint, &headers)?;
        let raw: Vec<RawKvPair> =
            serde_json::from_slice(&body).map_err(|e| IngressError::RegistryResponse {
                endpoint: endpoint.clone(),
                message: e.to_string(),
            })?;

        let mut pairs = Vec::with_capacity(raw.len());
        for pair in raw {
            let value = match pair.value {
                Some(encoded) => general_purpose::STANDARD.decode(encoded).map_err(|e| {
                    IngressError::RegistryResponse {
                        endpoint: endpoint.clone(),
                        message: format!("key {}: {e}", pair.key),
                    }
                })?,
                None => Vec::new(),
            };
            pairs.push(KvPair {
                key: pair.key,
                value,
            });
        }

        Ok(Indexed {
            index,
            value: pairs,
        })
    }

    async fn get(
        &self,
        endpoint: &str,
        query: &BlockingQuery,
        recurse: bool,
    ) -> Result<(StatusCode, HeaderMap, Bytes), IngressError> {
        let registry_err = |source: Box<dyn std::error::Error + Send + Sync>| {
            IngressError::Registry {
                endpoint: endpoint.to_string(),
                source,
            }
        };

        let mut url = self.base.join(endpoint).map_err(|e| IngressError::UriParse {
            source: Box::new(e),
        })?;
        {
            let mut pairs = url.query_pairs_mut();
            if recurse {
                pairs.append_pair("recurse", "true");
            }
            pairs
                .append_pair("index", &query.index.to_string())
                .append_pair("wait", &format!("{}s", query.wait.as_secs()))
                .append_key_only("consistent");
        }

        let uri: hyper::Uri = url.as_str().parse().map_err(
            |e: hyper::http::uri::InvalidUri| IngressError::UriParse {
                source: Box::new(e),
            },
        )?;

        let mut builder = hyper::Request::builder().method(hyper::Method::GET).uri(uri);
        if let Some(token) = &self.token {
            builder = builder.header(TOKEN_HEADER, token);
        }
        let req = builder
            .body(Full::new(Bytes::new()))
            .map_err(|e| registry_err(Box::new(e)))?;

        let response = tokio::time::timeout(query.read_timeout(), self.client.request(req))
            .await
            .map_err(|_| registry_err("blocking query timed out".into()))?
            .map_err(|e| registry_err(Box::new(e)))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| registry_err(Box::new(e)))?
            .to_bytes();

        Ok((status, headers, body))
    }
}

fn parse_index(endpoint: &str, headers: &HeaderMap) -> Result<u64, IngressError> {
    headers
        .get(INDEX_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| IngressError::RegistryResponse {
            endpoint: endpoint.to_string(),
            message: "missing or invalid X-Consul-Index header".into(),
        })
}
