//! End-to-end selection scenarios over a realistic cell type.

use chrono::{DateTime, TimeZone, Utc};

use kanso_core::{DataCell, MetricCell, PropertyName, PropertyValue, ResourceKind, ResourceSelector};
use kanso_metrics::{MetricName, MetricQuery, MockMetrics};
use kanso_select::{select, select_with_metrics, FilterQuery, ListQuery, Pagination, SortQuery};

#[derive(Debug, Clone)]
struct Workload {
    name: &'static str,
    namespace: &'static str,
    created: DateTime<Utc>,
}

fn row(name: &'static str, namespace: &'static str, created_secs: i64) -> Workload {
    Workload { name, namespace, created: Utc.timestamp_opt(created_secs, 0).unwrap() }
}

impl DataCell for Workload {
    fn property(&self, name: &PropertyName) -> PropertyValue {
        match name {
            PropertyName::Name => PropertyValue::text(self.name),
            PropertyName::Namespace => PropertyValue::text(self.namespace),
            PropertyName::CreationTimestamp => PropertyValue::timestamp(self.created),
            _ => PropertyValue::Missing,
        }
    }
}

impl MetricCell for Workload {
    fn resource_selector(&self) -> ResourceSelector {
        ResourceSelector {
            kind: ResourceKind::Pod,
            namespace: self.namespace.into(),
            name: self.name.into(),
            uid: None,
        }
    }
}

fn names(rows: &[Workload]) -> Vec<&'static str> {
    rows.iter().map(|r| r.name).collect()
}

fn five_rows() -> Vec<Workload> {
    vec![
        row("a", "prod", 100),
        row("b", "prod", 200),
        row("c", "dev", 300),
        row("d", "prod", 400),
        row("e", "dev", 500),
    ]
}

fn mixed_namespaces() -> Vec<Workload> {
    vec![
        row("api-0", "prod", 10),
        row("api-1", "prod", 20),
        row("cache-0", "dev", 30),
        row("cache-1", "staging", 40),
        row("web-0", "prod", 50),
        row("web-1", "dev", 60),
        row("web-2", "prod", 70),
        row("worker-0", "dev", 80),
        row("worker-1", "staging", 90),
        row("worker-2", "dev", 100),
    ]
}

#[test]
fn newest_first_page_zero() {
    let query = ListQuery {
        sort: SortQuery::parse("d,creationTimestamp"),
        pagination: Pagination::new(2, 0),
        ..Default::default()
    };
    let (page, total) = select(five_rows(), &query);
    assert_eq!(total, 5);
    assert_eq!(names(&page), vec!["e", "d"]);
}

#[test]
fn filter_total_is_pagination_independent() {
    let unpaged = ListQuery {
        filter: FilterQuery::by(PropertyName::Namespace, "prod"),
        ..Default::default()
    };
    let (page, total) = select(mixed_namespaces(), &unpaged);
    assert_eq!(total, 4);
    assert_eq!(page.len(), 4);

    let paged = ListQuery {
        filter: FilterQuery::by(PropertyName::Namespace, "prod"),
        pagination: Pagination::new(3, 0),
        ..Default::default()
    };
    let (page, total) = select(mixed_namespaces(), &paged);
    assert_eq!(total, 4);
    assert_eq!(page.len(), 3);
}

#[test]
fn zero_criteria_returns_upstream_order_unchanged() {
    let (page, total) = select(five_rows(), &ListQuery::all());
    assert_eq!(total, 5);
    assert_eq!(names(&page), vec!["a", "b", "c", "d", "e"]);
}

#[test]
fn equal_keys_keep_upstream_order_in_both_directions() {
    let rows = || vec![row("a", "prod", 1), row("b", "prod", 2), row("c", "prod", 3)];
    let asc = ListQuery { sort: SortQuery::by(PropertyName::Namespace, true), ..Default::default() };
    let desc = ListQuery { sort: SortQuery::by(PropertyName::Namespace, false), ..Default::default() };
    let (up, _) = select(rows(), &asc);
    let (down, _) = select(rows(), &desc);
    // All keys are equal; reversing the comparator must not reverse the list.
    assert_eq!(names(&up), vec!["a", "b", "c"]);
    assert_eq!(names(&down), vec!["a", "b", "c"]);
}

#[test]
fn sorting_is_idempotent() {
    let query = ListQuery { sort: SortQuery::parse("d,creationTimestamp"), ..Default::default() };
    let (once, _) = select(five_rows(), &query);
    let (twice, _) = select(once.clone(), &query);
    assert_eq!(names(&once), names(&twice));
}

#[test]
fn multi_key_sort_breaks_ties_with_later_criteria() {
    let rows = vec![row("a", "prod", 1), row("b", "dev", 2), row("c", "prod", 3)];
    let query = ListQuery {
        sort: SortQuery::parse("a,namespace,d,creationTimestamp"),
        ..Default::default()
    };
    let (page, _) = select(rows, &query);
    assert_eq!(names(&page), vec!["b", "c", "a"]);
}

#[test]
fn in_range_page_length_is_bounded() {
    for (page_no, expect) in [(0usize, 2usize), (1, 2), (2, 1)] {
        let query = ListQuery {
            pagination: Pagination::new(2, page_no),
            ..Default::default()
        };
        let (page, total) = select(five_rows(), &query);
        assert_eq!(total, 5);
        assert_eq!(page.len(), expect, "page {page_no}");
    }
}

#[test]
fn out_of_range_page_falls_back_to_full_set() {
    let query = ListQuery {
        sort: SortQuery::by(PropertyName::Name, true),
        pagination: Pagination::new(2, 7),
        ..Default::default()
    };
    let (page, total) = select(five_rows(), &query);
    assert_eq!(total, 5);
    // Pages past the end return the whole list, not an empty page.
    assert_eq!(page.len(), 5);
}

#[tokio::test]
async fn metrics_cover_the_page_only() {
    let client = MockMetrics { cpu_millis: 5, memory_bytes: 100 };
    let query = ListQuery {
        sort: SortQuery::parse("d,creationTimestamp"),
        pagination: Pagination::new(2, 0),
        metrics: MetricQuery::standard(),
        ..Default::default()
    };
    let (page, total, pending) = select_with_metrics(five_rows(), &query, &client);
    assert_eq!((page.len(), total), (2, 5));
    let cumulative = pending.get().await.unwrap();
    assert_eq!(cumulative[0].name, MetricName::CpuUsage);
    // 2 cells on the page at 5m each; the other 3 rows contribute nothing.
    assert_eq!(cumulative[0].data_points[0].value, 10);
    assert_eq!(cumulative[1].name, MetricName::MemoryUsage);
    assert_eq!(cumulative[1].data_points[0].value, 200);
}

#[tokio::test]
async fn no_metric_query_resolves_instantly_empty() {
    let client = MockMetrics { cpu_millis: 1, memory_bytes: 1 };
    let (_, _, pending) = select_with_metrics(five_rows(), &ListQuery::all(), &client);
    assert!(pending.get().await.unwrap().is_empty());
}
