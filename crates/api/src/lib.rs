//! Kanso public API facade (in-process).
//!
//! The stable surface a transport layer serves: list operations returning
//! UI-ready views, an in-process implementation that aggregates straight
//! from the cluster, and a mock for tests and demos.

#![forbid(unsafe_code)]

mod errors;
pub mod resource;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::SecondsFormat;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

pub use errors::{absorb, classify, ApiError, ApiResult};
pub use resource::deployment::{DeploymentList, DeploymentView, PodInfo};
pub use resource::event::{EventList, EventView};
pub use resource::namespace::{NamespaceList, NamespaceView};
pub use resource::node::{NodeList, NodeView};
pub use resource::pod::{PodList, PodView};
pub use resource::raw::{RawList, RawView};
pub use resource::workloads::Workloads;

pub use kanso_core::{PropertyName, ResourceKind};
pub use kanso_fetch::{KindRegistry, NamespaceQuery};
pub use kanso_metrics::{
    Aggregation, Metric, MetricClient, MetricName, MetricQuery, MockMetrics, NoMetrics,
    UsageClient,
};
pub use kanso_select::{FilterQuery, ListQuery, Pagination, SortQuery};

// ---- view scaffolding ----

/// List-level metadata: the filtered total, independent of paging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListMeta {
    pub total_items: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeMetaView {
    pub kind: ResourceKind,
}

impl TypeMetaView {
    pub fn new(kind: ResourceKind) -> Self {
        Self { kind }
    }
}

/// Object metadata as the UI consumes it. Timestamps render as RFC 3339.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMetaView {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    pub creation_timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

pub fn object_meta_view(meta: &ObjectMeta) -> ObjectMetaView {
    ObjectMetaView {
        name: meta.name.clone().unwrap_or_default(),
        namespace: meta.namespace.clone(),
        uid: meta.uid.clone(),
        creation_timestamp: meta
            .creation_timestamp
            .as_ref()
            .map(|t| t.0.to_rfc3339_opts(SecondsFormat::Secs, true)),
        labels: meta.labels.clone().unwrap_or_default(),
    }
}

// ---- facade ----

/// Console list operations.
///
/// Object-safe so callers hold `Arc<dyn KansoApi>` and tests swap in
/// [`MockApi`].
#[async_trait::async_trait]
pub trait KansoApi: Send + Sync {
    async fn pods(&self, ns: &NamespaceQuery, query: &ListQuery) -> ApiResult<PodList>;
    async fn deployments(
        &self,
        ns: &NamespaceQuery,
        query: &ListQuery,
    ) -> ApiResult<DeploymentList>;
    async fn events(&self, ns: &NamespaceQuery, query: &ListQuery) -> ApiResult<EventList>;
    async fn nodes(&self, query: &ListQuery) -> ApiResult<NodeList>;
    async fn namespaces(&self, query: &ListQuery) -> ApiResult<NamespaceList>;
    /// Metadata-only listing for any registered kind.
    async fn raw_list(
        &self,
        kind: ResourceKind,
        ns: &NamespaceQuery,
        query: &ListQuery,
    ) -> ApiResult<RawList>;
    /// Pod and deployment lists from shared fetches.
    async fn workloads(&self, ns: &NamespaceQuery, query: &ListQuery) -> ApiResult<Workloads>;
}

/// In-process implementation backed by a live cluster connection.
pub struct InProcApi {
    client: Client,
    metric_client: Arc<dyn MetricClient>,
    registry: KindRegistry,
}

impl InProcApi {
    pub fn new(client: Client, metric_client: Arc<dyn MetricClient>) -> Self {
        Self {
            client,
            metric_client,
            registry: KindRegistry::builtin(),
        }
    }

    /// Connect with ambient kube config and the metrics.k8s.io usage
    /// client.
    pub async fn connect() -> ApiResult<Self> {
        let client = Client::try_default()
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        let usage = UsageClient::new(client.clone());
        Ok(Self::new(client, Arc::new(usage)))
    }

    pub fn registry(&self) -> &KindRegistry {
        &self.registry
    }
}

#[async_trait::async_trait]
impl KansoApi for InProcApi {
    async fn pods(&self, ns: &NamespaceQuery, query: &ListQuery) -> ApiResult<PodList> {
        let t0 = Instant::now();
        info!(ns = %ns, "api: pods start");
        let out =
            resource::pod::pod_list(self.client.clone(), ns, query, self.metric_client.as_ref())
                .await?;
        info!(
            total = out.list_meta.total_items,
            page = out.pods.len(),
            took_ms = %t0.elapsed().as_millis(),
            "api: pods ok"
        );
        Ok(out)
    }

    async fn deployments(
        &self,
        ns: &NamespaceQuery,
        query: &ListQuery,
    ) -> ApiResult<DeploymentList> {
        let t0 = Instant::now();
        info!(ns = %ns, "api: deployments start");
        let out = resource::deployment::deployment_list(self.client.clone(), ns, query).await?;
        info!(
            total = out.list_meta.total_items,
            page = out.deployments.len(),
            took_ms = %t0.elapsed().as_millis(),
            "api: deployments ok"
        );
        Ok(out)
    }

    async fn events(&self, ns: &NamespaceQuery, query: &ListQuery) -> ApiResult<EventList> {
        let t0 = Instant::now();
        info!(ns = %ns, "api: events start");
        let out = resource::event::event_list(self.client.clone(), ns, query).await?;
        info!(
            total = out.list_meta.total_items,
            page = out.events.len(),
            took_ms = %t0.elapsed().as_millis(),
            "api: events ok"
        );
        Ok(out)
    }

    async fn nodes(&self, query: &ListQuery) -> ApiResult<NodeList> {
        let t0 = Instant::now();
        info!("api: nodes start");
        let out =
            resource::node::node_list(self.client.clone(), query, self.metric_client.as_ref())
                .await?;
        info!(
            total = out.list_meta.total_items,
            page = out.nodes.len(),
            took_ms = %t0.elapsed().as_millis(),
            "api: nodes ok"
        );
        Ok(out)
    }

    async fn namespaces(&self, query: &ListQuery) -> ApiResult<NamespaceList> {
        let t0 = Instant::now();
        info!("api: namespaces start");
        let out = resource::namespace::namespace_list(self.client.clone(), query).await?;
        info!(
            total = out.list_meta.total_items,
            page = out.namespaces.len(),
            took_ms = %t0.elapsed().as_millis(),
            "api: namespaces ok"
        );
        Ok(out)
    }

    async fn raw_list(
        &self,
        kind: ResourceKind,
        ns: &NamespaceQuery,
        query: &ListQuery,
    ) -> ApiResult<RawList> {
        let t0 = Instant::now();
        info!(kind = %kind, ns = %ns, "api: raw list start");
        let out =
            resource::raw::raw_list(self.client.clone(), &self.registry, kind, ns, query).await?;
        info!(
            kind = %kind,
            total = out.list_meta.total_items,
            page = out.items.len(),
            took_ms = %t0.elapsed().as_millis(),
            "api: raw list ok"
        );
        Ok(out)
    }

    async fn workloads(&self, ns: &NamespaceQuery, query: &ListQuery) -> ApiResult<Workloads> {
        let t0 = Instant::now();
        info!(ns = %ns, "api: workloads start");
        let out = resource::workloads::workloads(
            self.client.clone(),
            ns,
            query,
            self.metric_client.as_ref(),
        )
        .await?;
        info!(
            pods = out.pods.list_meta.total_items,
            deployments = out.deployments.list_meta.total_items,
            took_ms = %t0.elapsed().as_millis(),
            "api: workloads ok"
        );
        Ok(out)
    }
}

// ---- mock ----

/// Canned responses for tests and demos. Unset operations answer
/// `not found`.
#[derive(Default)]
pub struct MockApi {
    pub pods: Option<PodList>,
    pub deployments: Option<DeploymentList>,
    pub events: Option<EventList>,
    pub nodes: Option<NodeList>,
    pub namespaces: Option<NamespaceList>,
    pub raw: Option<RawList>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn canned<T: Clone>(slot: &Option<T>, what: &str) -> ApiResult<T> {
        slot.clone()
            .ok_or_else(|| ApiError::NotFound(format!("no {what} fixture")))
    }
}

#[async_trait::async_trait]
impl KansoApi for MockApi {
    async fn pods(&self, _ns: &NamespaceQuery, _query: &ListQuery) -> ApiResult<PodList> {
        Self::canned(&self.pods, "pod")
    }

    async fn deployments(
        &self,
        _ns: &NamespaceQuery,
        _query: &ListQuery,
    ) -> ApiResult<DeploymentList> {
        Self::canned(&self.deployments, "deployment")
    }

    async fn events(&self, _ns: &NamespaceQuery, _query: &ListQuery) -> ApiResult<EventList> {
        Self::canned(&self.events, "event")
    }

    async fn nodes(&self, _query: &ListQuery) -> ApiResult<NodeList> {
        Self::canned(&self.nodes, "node")
    }

    async fn namespaces(&self, _query: &ListQuery) -> ApiResult<NamespaceList> {
        Self::canned(&self.namespaces, "namespace")
    }

    async fn raw_list(
        &self,
        _kind: ResourceKind,
        _ns: &NamespaceQuery,
        _query: &ListQuery,
    ) -> ApiResult<RawList> {
        Self::canned(&self.raw, "raw")
    }

    async fn workloads(&self, _ns: &NamespaceQuery, _query: &ListQuery) -> ApiResult<Workloads> {
        Ok(Workloads {
            pods: Self::canned(&self.pods, "pod")?,
            deployments: Self::canned(&self.deployments, "deployment")?,
        })
    }
}
