//! Kanso usage metrics: per-cell fetch promises reduced to cumulative values.
//!
//! Metric data is supplementary display data. Every path here either yields
//! samples or an error the caller downgrades to an empty result; a broken
//! metrics backend never blocks or invalidates a resource list.

#![forbid(unsafe_code)]

use std::fmt;
use std::time::Instant;

use anyhow::{Context, Result};
use kube::api::{Api, ApiResource, DynamicObject};
use kube::Client;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};
use tokio::task::JoinHandle;
use tracing::debug;

use kanso_core::{quantity, ResourceKind, ResourceSelector};

/// Metric kinds the console can resolve for a page of cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricName {
    #[serde(rename = "cpu-usage")]
    CpuUsage,
    #[serde(rename = "memory-usage")]
    MemoryUsage,
}

impl MetricName {
    pub const ALL: [MetricName; 2] = [MetricName::CpuUsage, MetricName::MemoryUsage];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::CpuUsage => "cpu-usage",
            MetricName::MemoryUsage => "memory-usage",
        }
    }

    /// Wire form used by the `metric` query parameter.
    pub fn parse(s: &str) -> Option<MetricName> {
        match s.trim() {
            "cpu-usage" => Some(MetricName::CpuUsage),
            "memory-usage" => Some(MetricName::MemoryUsage),
            _ => None,
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How per-cell samples reduce into one cumulative value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    #[default]
    Sum,
    Average,
    Min,
    Max,
}

impl Aggregation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregation::Sum => "sum",
            Aggregation::Average => "average",
            Aggregation::Min => "min",
            Aggregation::Max => "max",
        }
    }

    pub fn parse(s: &str) -> Option<Aggregation> {
        match s.trim() {
            "sum" => Some(Aggregation::Sum),
            "average" => Some(Aggregation::Average),
            "min" => Some(Aggregation::Min),
            "max" => Some(Aggregation::Max),
            _ => None,
        }
    }

    pub fn apply(&self, values: &[u64]) -> u64 {
        match self {
            Aggregation::Sum => values.iter().sum(),
            Aggregation::Average => {
                if values.is_empty() {
                    0
                } else {
                    values.iter().sum::<u64>() / values.len() as u64
                }
            }
            Aggregation::Min => values.iter().copied().min().unwrap_or(0),
            Aggregation::Max => values.iter().copied().max().unwrap_or(0),
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observation for one cell. Cpu is in millicores, memory in bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub name: MetricName,
    /// Unix seconds of the scrape.
    pub timestamp: i64,
    pub value: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPoint {
    pub timestamp: i64,
    pub value: u64,
}

/// A cumulative metric over the selected page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    pub name: MetricName,
    pub aggregation: Aggregation,
    pub data_points: Vec<DataPoint>,
}

/// Which metrics a query wants and how to reduce them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricQuery {
    pub names: SmallVec<[MetricName; 2]>,
    /// Reduction modes applied to every requested name; empty means sum.
    pub aggregations: SmallVec<[Aggregation; 2]>,
}

impl MetricQuery {
    /// No metric resolution at all.
    pub fn none() -> Self {
        Self { names: SmallVec::new(), aggregations: SmallVec::new() }
    }

    /// Cpu and memory usage, summed over the page.
    pub fn standard() -> Self {
        Self {
            names: SmallVec::from_slice(&MetricName::ALL),
            aggregations: smallvec![Aggregation::Sum],
        }
    }

    /// Parse the comma-separated wire form ("cpu-usage,memory-usage").
    /// Unknown names are dropped; an empty result means no resolution.
    pub fn parse(metric_names: &str) -> Self {
        let names = metric_names.split(',').filter_map(MetricName::parse).collect();
        Self { names, aggregations: smallvec![Aggregation::Sum] }
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    fn modes(&self) -> SmallVec<[Aggregation; 2]> {
        if self.aggregations.is_empty() {
            smallvec![Aggregation::Sum]
        } else {
            self.aggregations.clone()
        }
    }
}

impl Default for MetricQuery {
    fn default() -> Self {
        Self::none()
    }
}

/// N pending per-cell usage fetches plus the reduction into cumulative
/// values. Dropping it detaches the fetch tasks.
pub struct PendingMetrics {
    tasks: Vec<JoinHandle<Result<Vec<Sample>>>>,
    modes: SmallVec<[Aggregation; 2]>,
}

impl PendingMetrics {
    /// An immediately-ready, empty promise.
    pub fn empty() -> Self {
        Self { tasks: Vec::new(), modes: SmallVec::new() }
    }

    pub fn new(
        tasks: Vec<JoinHandle<Result<Vec<Sample>>>>,
        modes: SmallVec<[Aggregation; 2]>,
    ) -> Self {
        Self { tasks, modes }
    }

    /// Await every fetch and reduce the samples. A single failed fetch fails
    /// the whole set; callers substitute an empty list and keep the page.
    pub async fn get(self) -> Result<Vec<Metric>> {
        if self.tasks.is_empty() {
            return Ok(Vec::new());
        }
        let t0 = Instant::now();
        let mut samples: Vec<Sample> = Vec::new();
        for joined in futures::future::join_all(self.tasks).await {
            let batch = joined.context("usage fetch task panicked")??;
            samples.extend(batch);
        }
        let reduced = reduce(samples, &self.modes);
        metrics::histogram!("metrics_resolve_ms", t0.elapsed().as_secs_f64() * 1000.0);
        debug!(
            metrics = reduced.len(),
            took_ms = %t0.elapsed().as_millis(),
            "metrics: reduced"
        );
        Ok(reduced)
    }
}

fn reduce(samples: Vec<Sample>, modes: &[Aggregation]) -> Vec<Metric> {
    if samples.is_empty() {
        return Vec::new();
    }
    let modes: &[Aggregation] = if modes.is_empty() { &[Aggregation::Sum] } else { modes };
    let mut by_name: FxHashMap<MetricName, Vec<Sample>> = FxHashMap::default();
    for s in samples {
        by_name.entry(s.name).or_default().push(s);
    }
    let mut out = Vec::new();
    // Declaration order keeps the output deterministic across runs.
    for name in MetricName::ALL {
        let Some(group) = by_name.get(&name) else { continue };
        let newest = group.iter().map(|s| s.timestamp).max().unwrap_or(0);
        let values: Vec<u64> = group.iter().map(|s| s.value).collect();
        for mode in modes {
            out.push(Metric {
                name,
                aggregation: *mode,
                data_points: vec![DataPoint { timestamp: newest, value: mode.apply(&values) }],
            });
        }
    }
    out
}

/// Source of per-cell usage samples. `spawn_usage` fires the fetches eagerly
/// on the ambient runtime and returns a promise; it never blocks.
pub trait MetricClient: Send + Sync {
    fn spawn_usage(&self, selectors: Vec<ResourceSelector>, query: &MetricQuery)
        -> PendingMetrics;
}

/// Client used when no metrics backend is available: every promise is empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMetrics;

impl MetricClient for NoMetrics {
    fn spawn_usage(
        &self,
        _selectors: Vec<ResourceSelector>,
        _query: &MetricQuery,
    ) -> PendingMetrics {
        PendingMetrics::empty()
    }
}

/// Fixed per-cell values, for tests and demos.
#[derive(Debug, Clone, Copy)]
pub struct MockMetrics {
    pub cpu_millis: u64,
    pub memory_bytes: u64,
}

impl MetricClient for MockMetrics {
    fn spawn_usage(&self, selectors: Vec<ResourceSelector>, query: &MetricQuery)
        -> PendingMetrics {
        if query.is_empty() || selectors.is_empty() {
            return PendingMetrics::empty();
        }
        let mut tasks = Vec::with_capacity(selectors.len());
        for _ in &selectors {
            let names = query.names.clone();
            let (cpu, mem) = (self.cpu_millis, self.memory_bytes);
            tasks.push(tokio::spawn(async move {
                Ok(names
                    .iter()
                    .map(|n| Sample {
                        name: *n,
                        timestamp: 0,
                        value: match n {
                            MetricName::CpuUsage => cpu,
                            MetricName::MemoryUsage => mem,
                        },
                    })
                    .collect())
            }));
        }
        PendingMetrics::new(tasks, query.modes())
    }
}

/// Reads instantaneous usage from the `metrics.k8s.io/v1beta1` API.
///
/// Pods and nodes are served; other kinds yield no samples.
#[derive(Clone)]
pub struct UsageClient {
    client: Client,
}

impl UsageClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl MetricClient for UsageClient {
    fn spawn_usage(&self, selectors: Vec<ResourceSelector>, query: &MetricQuery)
        -> PendingMetrics {
        if query.is_empty() || selectors.is_empty() {
            return PendingMetrics::empty();
        }
        let mut tasks = Vec::with_capacity(selectors.len());
        for sel in selectors {
            let client = self.client.clone();
            let names = query.names.clone();
            tasks.push(tokio::spawn(async move { fetch_usage(client, sel, &names).await }));
        }
        PendingMetrics::new(tasks, query.modes())
    }
}

async fn fetch_usage(
    client: Client,
    sel: ResourceSelector,
    names: &[MetricName],
) -> Result<Vec<Sample>> {
    let t0 = Instant::now();
    let obj = match sel.kind {
        ResourceKind::Pod => {
            let api: Api<DynamicObject> =
                Api::namespaced_with(client, &sel.namespace, &pod_metrics_resource());
            api.get(&sel.name)
                .await
                .with_context(|| format!("pod metrics for {}/{}", sel.namespace, sel.name))?
        }
        ResourceKind::Node => {
            let api: Api<DynamicObject> = Api::all_with(client, &node_metrics_resource());
            api.get(&sel.name)
                .await
                .with_context(|| format!("node metrics for {}", sel.name))?
        }
        _ => return Ok(Vec::new()),
    };
    let timestamp = scrape_timestamp(&obj);
    let mut samples = Vec::with_capacity(names.len());
    for name in names {
        let value = match sel.kind {
            ResourceKind::Pod => pod_usage(&obj, *name),
            _ => node_usage(&obj, *name),
        };
        if let Some(value) = value {
            samples.push(Sample { name: *name, timestamp, value });
        }
    }
    metrics::counter!("metrics_samples_total", samples.len() as u64);
    debug!(
        kind = %sel.kind,
        name = %sel.name,
        took_ms = %t0.elapsed().as_millis(),
        "metrics: usage fetched"
    );
    Ok(samples)
}

fn pod_usage(obj: &DynamicObject, name: MetricName) -> Option<u64> {
    let containers = obj.data.pointer("/containers")?.as_array()?;
    let mut total = 0u64;
    let mut seen = false;
    for c in containers {
        if let Some(v) = c.pointer("/usage").and_then(|u| usage_field(u, name)) {
            total += v;
            seen = true;
        }
    }
    seen.then_some(total)
}

fn node_usage(obj: &DynamicObject, name: MetricName) -> Option<u64> {
    usage_field(obj.data.pointer("/usage")?, name)
}

fn usage_field(usage: &serde_json::Value, name: MetricName) -> Option<u64> {
    match name {
        MetricName::CpuUsage => quantity::parse_millis(usage.pointer("/cpu")?.as_str()?),
        MetricName::MemoryUsage => quantity::parse_whole(usage.pointer("/memory")?.as_str()?),
    }
}

fn scrape_timestamp(obj: &DynamicObject) -> i64 {
    obj.data
        .pointer("/timestamp")
        .and_then(|v| v.as_str())
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.timestamp())
        .unwrap_or(0)
}

fn pod_metrics_resource() -> ApiResource {
    ApiResource {
        group: "metrics.k8s.io".into(),
        version: "v1beta1".into(),
        api_version: "metrics.k8s.io/v1beta1".into(),
        kind: "PodMetrics".into(),
        plural: "pods".into(),
    }
}

fn node_metrics_resource() -> ApiResource {
    ApiResource {
        group: "metrics.k8s.io".into(),
        version: "v1beta1".into(),
        api_version: "metrics.k8s.io/v1beta1".into(),
        kind: "NodeMetrics".into(),
        plural: "nodes".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    fn sel(n: u32) -> ResourceSelector {
        ResourceSelector {
            kind: ResourceKind::Pod,
            namespace: "default".into(),
            name: format!("pod-{n}"),
            uid: None,
        }
    }

    fn sample(name: MetricName, timestamp: i64, value: u64) -> Sample {
        Sample { name, timestamp, value }
    }

    #[test]
    fn reduce_sums_per_metric_name() {
        let samples = vec![
            sample(MetricName::CpuUsage, 10, 100),
            sample(MetricName::MemoryUsage, 12, 7),
            sample(MetricName::CpuUsage, 11, 200),
            sample(MetricName::CpuUsage, 9, 300),
        ];
        let out = reduce(samples, &[Aggregation::Sum]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].name, MetricName::CpuUsage);
        assert_eq!(out[0].data_points, vec![DataPoint { timestamp: 11, value: 600 }]);
        assert_eq!(out[1].name, MetricName::MemoryUsage);
        assert_eq!(out[1].data_points, vec![DataPoint { timestamp: 12, value: 7 }]);
    }

    #[test]
    fn reduce_emits_one_metric_per_requested_mode() {
        let samples = vec![
            sample(MetricName::CpuUsage, 0, 10),
            sample(MetricName::CpuUsage, 0, 30),
        ];
        let out = reduce(samples, &[Aggregation::Average, Aggregation::Max]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].aggregation, Aggregation::Average);
        assert_eq!(out[0].data_points[0].value, 20);
        assert_eq!(out[1].aggregation, Aggregation::Max);
        assert_eq!(out[1].data_points[0].value, 30);
    }

    #[test]
    fn reduce_of_nothing_is_empty() {
        assert!(reduce(Vec::new(), &[Aggregation::Sum]).is_empty());
    }

    #[tokio::test]
    async fn mock_client_sums_over_the_page() {
        let client = MockMetrics { cpu_millis: 5, memory_bytes: 10 };
        let pending = client.spawn_usage(vec![sel(1), sel(2), sel(3)], &MetricQuery::standard());
        let out = pending.get().await.unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].name, MetricName::CpuUsage);
        assert_eq!(out[0].data_points[0].value, 15);
        assert_eq!(out[1].name, MetricName::MemoryUsage);
        assert_eq!(out[1].data_points[0].value, 30);
    }

    #[tokio::test]
    async fn no_metrics_client_resolves_empty() {
        let pending = NoMetrics.spawn_usage(vec![sel(1)], &MetricQuery::standard());
        assert!(pending.get().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_fetch_fails_the_whole_set() {
        let tasks: Vec<JoinHandle<Result<Vec<Sample>>>> = vec![
            tokio::spawn(async { Ok(vec![sample(MetricName::CpuUsage, 0, 1)]) }),
            tokio::spawn(async { Err(anyhow!("metrics-server unavailable")) }),
        ];
        let pending = PendingMetrics::new(tasks, SmallVec::new());
        assert!(pending.get().await.is_err());
    }

    #[test]
    fn pod_usage_sums_containers() {
        let obj = DynamicObject {
            types: None,
            metadata: Default::default(),
            data: serde_json::json!({
                "timestamp": "2024-05-01T10:00:00Z",
                "containers": [
                    { "name": "app", "usage": { "cpu": "100m", "memory": "64Mi" } },
                    { "name": "sidecar", "usage": { "cpu": "50m", "memory": "1Mi" } },
                ],
            }),
        };
        assert_eq!(pod_usage(&obj, MetricName::CpuUsage), Some(150));
        assert_eq!(pod_usage(&obj, MetricName::MemoryUsage), Some(65 * 1024 * 1024));
        assert_eq!(scrape_timestamp(&obj), 1_714_557_600);
    }

    #[test]
    fn node_usage_reads_the_top_level_block() {
        let obj = DynamicObject {
            types: None,
            metadata: Default::default(),
            data: serde_json::json!({ "usage": { "cpu": "2", "memory": "8Gi" } }),
        };
        assert_eq!(node_usage(&obj, MetricName::CpuUsage), Some(2000));
        assert_eq!(node_usage(&obj, MetricName::MemoryUsage), Some(8 * 1024 * 1024 * 1024));
    }

    #[test]
    fn wire_parse_drops_unknown_names() {
        let q = MetricQuery::parse("cpu-usage,bogus");
        assert_eq!(q.names.as_slice(), &[MetricName::CpuUsage]);
        assert!(MetricQuery::parse("bogus").is_empty());
    }
}
