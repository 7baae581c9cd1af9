//! Typed HTTP client for the inventory source's filtered query API
//! (NetBox-style REST: dcim, tenancy, virtualization).

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{FilterConfig, InventoryConfig};
use crate::domain::types::{InventoryRecord, RecordKind, VersionInfo};
use crate::error::FetchError;

/// The inventory source as seen by the reconciliation engine: an
/// availability probe and a filtered record fetch.
#[async_trait]
pub trait InventorySource: Send + Sync {
    async fn probe(&self) -> Result<VersionInfo, FetchError>;

    async fn fetch(
        &self,
        kind: RecordKind,
        filter: &FilterConfig,
    ) -> Result<Vec<InventoryRecord>, FetchError>;
}

pub struct InventoryClient {
    base_url: String,
    token: String,
    http: Client,
}

impl InventoryClient {
    pub fn new(config: &InventoryConfig) -> Result<Self, FetchError> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .danger_accept_invalid_certs(config.bypass_cert_verify)
            .build()
            .map_err(|e| FetchError::Unreachable {
                url: config.url.clone(),
                cause: e.to_string(),
            })?;
        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.api_token.clone(),
            http,
        })
    }
}

#[async_trait]
impl InventorySource for InventoryClient {
    /// Availability probe. Prefers the status endpoint; a source without one
    /// (older releases) is still considered reachable if a minimal device
    /// fetch succeeds, just without version detail.
    async fn probe(&self) -> Result<VersionInfo, FetchError> {
        match self.get_json("/api/status/", &[]).await {
            Ok(status) => Ok(VersionInfo {
                version: status["netbox-version"].as_str().map(|s| s.to_string()),
                summary: format!(
                    "NetBox Version: {}, Python Version: {}, Plugins: {}, Workers Running: {}",
                    status["netbox-version"].as_str().unwrap_or("unknown"),
                    status["python-version"].as_str().unwrap_or("unknown"),
                    status["plugins"],
                    status["rq-workers-running"],
                ),
            }),
            Err(e @ FetchError::Unreachable { .. }) => Err(e),
            Err(_) => {
                // No status API; confirm connectivity with a minimal fetch.
                self.get_json("/api/dcim/devices/", &[("limit".into(), "1".into())])
                    .await?;
                Ok(VersionInfo {
                    version: None,
                    summary: "Successfully connected to inventory source to query devices."
                        .to_string(),
                })
            }
        }
    }

    /// Fetch all records of `kind` matching `filter`. Filter names are
    /// resolved to ids first, one reference query per non-empty dimension;
    /// an empty dimension adds nothing to the query. Zero records is a
    /// valid, successful result.
    async fn fetch(
        &self,
        kind: RecordKind,
        filter: &FilterConfig,
    ) -> Result<Vec<InventoryRecord>, FetchError> {
        let mut query: Vec<(String, String)> = Vec::new();
        for reference in reference_queries(kind, filter) {
            debug!(path = reference.path, "resolving filter names to ids");
            let results = self.get_all_pages(reference.path, &reference.query).await?;
            if append_ids(&mut query, reference.id_param, &results) == 0 {
                // A dimension that matches nothing adds no query param, so
                // it widens the fetch instead of narrowing it.
                warn!(
                    path = reference.path,
                    "filter names matched no ids; dimension left unconstrained"
                );
            }
        }

        let list_path = match kind {
            RecordKind::Physical => "/api/dcim/devices/",
            RecordKind::Virtual => "/api/virtualization/virtual-machines/",
        };
        debug!(path = list_path, ?query, "fetching inventory records");

        let results = self.get_all_pages(list_path, &query).await?;
        let records = results
            .iter()
            .filter_map(|item| parse_record(item, kind))
            .collect();
        Ok(records)
    }
}

/// One name→id reference lookup needed before the record query.
#[derive(Debug, PartialEq, Eq)]
struct ReferenceQuery {
    id_param: &'static str,
    path: &'static str,
    query: Vec<(String, String)>,
}

/// Plan the reference lookups for a fetch: one per non-empty filter
/// dimension, nothing for empty ones. Device types only constrain physical
/// records; role lookups for virtual machines are additionally scoped to
/// roles usable on VMs.
fn reference_queries(kind: RecordKind, filter: &FilterConfig) -> Vec<ReferenceQuery> {
    fn by_name(param: &str, names: &[String]) -> Vec<(String, String)> {
        names
            .iter()
            .map(|name| (param.to_string(), name.clone()))
            .collect()
    }

    let mut plan = Vec::new();

    if !filter.sites.is_empty() {
        plan.push(ReferenceQuery {
            id_param: "site_id",
            path: "/api/dcim/sites/",
            query: by_name("name", &filter.sites),
        });
    }
    if !filter.tenants.is_empty() {
        plan.push(ReferenceQuery {
            id_param: "tenant_id",
            path: "/api/tenancy/tenants/",
            query: by_name("name", &filter.tenants),
        });
    }
    if kind == RecordKind::Physical && !filter.device_types.is_empty() {
        plan.push(ReferenceQuery {
            id_param: "device_type_id",
            path: "/api/dcim/device-types/",
            query: by_name("model", &filter.device_types),
        });
    }
    if !filter.roles.is_empty() {
        let mut query = by_name("name", &filter.roles);
        if kind == RecordKind::Virtual {
            query.push(("vm_role".to_string(), "true".to_string()));
        }
        plan.push(ReferenceQuery {
            id_param: "role_id",
            path: "/api/dcim/device-roles/",
            query,
        });
    }

    plan
}

/// Append the ids a reference lookup returned to the record query. Returns
/// how many ids matched.
fn append_ids(query: &mut Vec<(String, String)>, id_param: &str, results: &[Value]) -> usize {
    let mut matched = 0;
    for item in results {
        if let Some(id) = item["id"].as_u64() {
            query.push((id_param.to_string(), id.to_string()));
            matched += 1;
        }
    }
    matched
}

impl InventoryClient {
    /// GET a paginated list endpoint, following `next` links.
    async fn get_all_pages(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<Vec<Value>, FetchError> {
        let mut results = Vec::new();
        let mut page = self.get_json(path, query).await?;

        loop {
            if let Some(items) = page["results"].as_array() {
                results.extend(items.iter().cloned());
            }
            let Some(next) = page["next"].as_str().map(|s| s.to_string()) else {
                break;
            };
            page = self.get_url(&next).await?;
        }
        Ok(results)
    }

    async fn get_json(&self, path: &str, query: &[(String, String)]) -> Result<Value, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .get(&url)
            .query(query)
            .header("Authorization", format!("Token {}", self.token))
            .send()
            .await
            .map_err(|e| FetchError::Unreachable {
                url: url.clone(),
                cause: e.to_string(),
            })?;
        self.decode(url, resp).await
    }

    async fn get_url(&self, url: &str) -> Result<Value, FetchError> {
        let resp = self
            .http
            .get(url)
            .header("Authorization", format!("Token {}", self.token))
            .send()
            .await
            .map_err(|e| FetchError::Unreachable {
                url: url.to_string(),
                cause: e.to_string(),
            })?;
        self.decode(url.to_string(), resp).await
    }

    async fn decode(&self, url: String, resp: reqwest::Response) -> Result<Value, FetchError> {
        if resp.status() == StatusCode::OK {
            resp.json()
                .await
                .map_err(|e| FetchError::BadResponse {
                    url,
                    cause: e.to_string(),
                })
        } else {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            Err(FetchError::QueryRejected {
                query: url,
                cause: format!("{status} {body}"),
            })
        }
    }
}

/// Build an [`InventoryRecord`] from one raw API item. Records the source
/// can't describe fully (no name) are skipped rather than failing the run.
fn parse_record(item: &Value, kind: RecordKind) -> Option<InventoryRecord> {
    let name = item["name"].as_str()?.to_string();

    // Older API releases call this field device_role.
    let role_name = item["role"]["name"]
        .as_str()
        .or_else(|| item["device_role"]["name"].as_str())
        .unwrap_or_default()
        .to_string();

    // primary_ip carries a CIDR; only the host part matters here.
    let primary_address = item["primary_ip"]["address"]
        .as_str()
        .and_then(|cidr| cidr.split('/').next())
        .and_then(|addr| addr.parse().ok());

    Some(InventoryRecord {
        name,
        kind,
        status: item["status"]["value"].as_str().unwrap_or_default().to_string(),
        primary_address,
        role_name,
        type_model: item["device_type"]["model"].as_str().map(|s| s.to_string()),
        tenant_name: item["tenant"]["name"].as_str().map(|s| s.to_string()),
        source_url: item["url"].as_str().unwrap_or_default().to_string(),
    })
}
