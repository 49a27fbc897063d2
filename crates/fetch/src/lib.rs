//! Kanso fetch: one-shot resource listing and the fetch-once/deliver-N
//! broadcast that shares a single listing across consumers.

#![forbid(unsafe_code)]

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use kube::api::{Api, DynamicObject, ListParams};
use kube::core::ApiResource;
use kube::{Client, Resource};
use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use kanso_core::ResourceKind;

// ---- namespace selection ----

/// Which namespaces a list request covers: one, several, or all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceQuery {
    namespaces: Vec<String>,
}

impl NamespaceQuery {
    /// Every namespace in the cluster.
    pub fn all() -> Self {
        Self { namespaces: Vec::new() }
    }

    pub fn one(namespace: impl Into<String>) -> Self {
        Self { namespaces: vec![namespace.into()] }
    }

    pub fn new(mut namespaces: Vec<String>) -> Self {
        namespaces.retain(|ns| !ns.is_empty());
        Self { namespaces }
    }

    pub fn is_all(&self) -> bool {
        self.namespaces.is_empty()
    }

    /// The single selected namespace, if exactly one.
    pub fn single(&self) -> Option<&str> {
        match self.namespaces.as_slice() {
            [ns] => Some(ns),
            _ => None,
        }
    }

    /// Whether an object in `namespace` belongs to this query.
    pub fn matches(&self, namespace: Option<&str>) -> bool {
        self.is_all() || namespace.is_some_and(|ns| self.namespaces.iter().any(|sel| sel == ns))
    }
}

impl fmt::Display for NamespaceQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_all() {
            f.write_str("(all)")
        } else {
            f.write_str(&self.namespaces.join(","))
        }
    }
}

// ---- broadcast: fetch once, deliver N ----

type Outcome<T> = std::result::Result<Arc<T>, FetchError>;

/// A fetch failure shared by every consumer of one broadcast.
#[derive(Clone)]
pub struct FetchError(Arc<anyhow::Error>);

impl FetchError {
    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }
}

impl From<anyhow::Error> for FetchError {
    fn from(e: anyhow::Error) -> Self {
        Self(Arc::new(e))
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl fmt::Debug for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

/// One consumer's view of a broadcast fetch. Read `list()` first, then
/// `error()`. Both resolve from the same memoized outcome, so a second read
/// returns the same value and an unread handle is harmless.
pub struct FetchHandle<T> {
    outcome: Shared<BoxFuture<'static, Outcome<T>>>,
}

impl<T> FetchHandle<T> {
    /// The fetched collection, or `None` when the fetch failed.
    pub async fn list(&mut self) -> Option<Arc<T>> {
        self.outcome.clone().await.ok()
    }

    /// The fetch failure, or `None` when the fetch succeeded.
    pub async fn error(&mut self) -> Option<FetchError> {
        self.outcome.clone().await.err()
    }
}

/// Spawn `fetch` immediately and split its outcome into N handles, one per
/// consumer. The consumer count is fixed here and handles are not cloneable;
/// dropping handles never cancels the spawned fetch.
///
/// Must be called within a Tokio runtime.
pub fn fan_out<const N: usize, T, F>(fetch: F) -> [FetchHandle<T>; N]
where
    T: Send + Sync + 'static,
    F: std::future::Future<Output = Result<T>> + Send + 'static,
{
    let task = tokio::spawn(async move {
        let t0 = Instant::now();
        let out = fetch.await;
        metrics::histogram!("fetch_ms", t0.elapsed().as_secs_f64() * 1000.0);
        if out.is_err() {
            metrics::counter!("fetch_errors_total", 1u64);
        }
        out
    });
    let outcome = async move {
        match task.await {
            Ok(Ok(v)) => Ok(Arc::new(v)),
            Ok(Err(e)) => Err(FetchError::from(e)),
            Err(e) => Err(FetchError::from(anyhow!("fetch task failed: {e}"))),
        }
    }
    .boxed()
    .shared();
    std::array::from_fn(|_| FetchHandle { outcome: outcome.clone() })
}

/// `fan_out` for the common single-consumer case.
pub fn spawn_fetch<T, F>(fetch: F) -> FetchHandle<T>
where
    T: Send + Sync + 'static,
    F: std::future::Future<Output = Result<T>> + Send + 'static,
{
    let [handle] = fan_out::<1, T, F>(fetch);
    handle
}

// ---- one-shot typed listing ----

/// List a namespaced resource kind across the query's namespaces. One
/// upstream call; multi-namespace queries list everywhere and retain the
/// matches.
pub async fn list_namespaced<K>(client: Client, ns: &NamespaceQuery) -> Result<Vec<K>>
where
    K: Resource<Scope = k8s_openapi::NamespaceResourceScope>
        + Clone
        + DeserializeOwned
        + fmt::Debug,
    K::DynamicType: Default,
{
    let t0 = Instant::now();
    let kind = K::kind(&K::DynamicType::default()).to_string();
    let api: Api<K> = match ns.single() {
        Some(one) => Api::namespaced(client, one),
        None => Api::all(client),
    };
    let list = api
        .list(&ListParams::default())
        .await
        .with_context(|| format!("listing {kind}"))?;
    let mut items = list.items;
    if !ns.is_all() && ns.single().is_none() {
        items.retain(|o| ns.matches(o.meta().namespace.as_deref()));
    }
    debug!(
        kind = %kind,
        ns = %ns,
        count = items.len(),
        took_ms = %t0.elapsed().as_millis(),
        "fetch: listed"
    );
    Ok(items)
}

/// List a cluster-scoped resource kind.
pub async fn list_cluster<K>(client: Client) -> Result<Vec<K>>
where
    K: Resource<Scope = k8s_openapi::ClusterResourceScope>
        + Clone
        + DeserializeOwned
        + fmt::Debug,
    K::DynamicType: Default,
{
    let t0 = Instant::now();
    let kind = K::kind(&K::DynamicType::default()).to_string();
    let api: Api<K> = Api::all(client);
    let list = api
        .list(&ListParams::default())
        .await
        .with_context(|| format!("listing {kind}"))?;
    debug!(
        kind = %kind,
        count = list.items.len(),
        took_ms = %t0.elapsed().as_millis(),
        "fetch: listed"
    );
    Ok(list.items)
}

// ---- kind registry ----

/// How to reach one resource kind: API coordinates plus scope.
#[derive(Debug, Clone)]
pub struct KindEntry {
    pub resource: ApiResource,
    pub namespaced: bool,
}

/// Immutable map from resource kind to API coordinates, built once at
/// startup and passed by reference wherever dynamic listing happens.
#[derive(Debug, Clone)]
pub struct KindRegistry {
    entries: FxHashMap<ResourceKind, KindEntry>,
}

impl KindRegistry {
    /// The kinds the console serves out of the box.
    pub fn builtin() -> Self {
        let mut entries = FxHashMap::default();
        entries.insert(ResourceKind::Pod, core_v1("Pod", "pods", true));
        entries.insert(ResourceKind::Event, core_v1("Event", "events", true));
        entries.insert(ResourceKind::Service, core_v1("Service", "services", true));
        entries.insert(ResourceKind::ConfigMap, core_v1("ConfigMap", "configmaps", true));
        entries.insert(ResourceKind::Node, core_v1("Node", "nodes", false));
        entries.insert(ResourceKind::Namespace, core_v1("Namespace", "namespaces", false));
        entries.insert(
            ResourceKind::Deployment,
            KindEntry {
                resource: ApiResource {
                    group: "apps".into(),
                    version: "v1".into(),
                    api_version: "apps/v1".into(),
                    kind: "Deployment".into(),
                    plural: "deployments".into(),
                },
                namespaced: true,
            },
        );
        Self { entries }
    }

    pub fn get(&self, kind: ResourceKind) -> Option<&KindEntry> {
        self.entries.get(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = ResourceKind> + '_ {
        self.entries.keys().copied()
    }
}

fn core_v1(kind: &str, plural: &str, namespaced: bool) -> KindEntry {
    KindEntry {
        resource: ApiResource {
            group: String::new(),
            version: "v1".into(),
            api_version: "v1".into(),
            kind: kind.into(),
            plural: plural.into(),
        },
        namespaced,
    }
}

/// List via the registry, for kinds without a typed adapter.
pub async fn list_dynamic(
    client: Client,
    registry: &KindRegistry,
    kind: ResourceKind,
    ns: &NamespaceQuery,
) -> Result<Vec<DynamicObject>> {
    let entry = registry
        .get(kind)
        .ok_or_else(|| anyhow!("kind not registered: {kind}"))?;
    let t0 = Instant::now();
    let api: Api<DynamicObject> = if entry.namespaced {
        match ns.single() {
            Some(one) => Api::namespaced_with(client, one, &entry.resource),
            None => Api::all_with(client, &entry.resource),
        }
    } else {
        Api::all_with(client, &entry.resource)
    };
    let list = api
        .list(&ListParams::default())
        .await
        .with_context(|| format!("listing {kind}"))?;
    let mut items = list.items;
    if entry.namespaced && !ns.is_all() && ns.single().is_none() {
        items.retain(|o| ns.matches(o.metadata.namespace.as_deref()));
    }
    debug!(
        kind = %kind,
        ns = %ns,
        count = items.len(),
        took_ms = %t0.elapsed().as_millis(),
        "fetch: listed dynamic"
    );
    Ok(items)
}
