//! Kanso selection: the generic filter -> sort -> paginate -> metrics
//! pipeline every list endpoint runs over its cells.

#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};
use tracing::debug;

use kanso_core::{DataCell, MetricCell, PropertyName};
use kanso_metrics::{MetricClient, MetricQuery, PendingMetrics};

/// One sort criterion: order by `property`, ascending or descending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortBy {
    pub property: PropertyName,
    pub ascending: bool,
}

/// Ordered multi-key sort; earlier criteria win, later ones break ties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SortQuery {
    pub sort_by: SmallVec<[SortBy; 2]>,
}

impl SortQuery {
    /// No sorting: cells keep their upstream order.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn by(property: impl Into<PropertyName>, ascending: bool) -> Self {
        Self { sort_by: smallvec![SortBy { property: property.into(), ascending }] }
    }

    /// Parse the wire form: comma-separated `(a|d),property` token pairs
    /// applied left to right ("d,creationTimestamp,a,name"). An odd token
    /// count or an unknown order token yields the empty sort.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return Self::default();
        }
        let tokens: Vec<&str> = raw.split(',').collect();
        if tokens.len() % 2 != 0 {
            return Self::default();
        }
        let mut sort_by = SmallVec::new();
        for pair in tokens.chunks(2) {
            let ascending = match pair[0].trim() {
                "a" => true,
                "d" => false,
                _ => return Self::default(),
            };
            sort_by.push(SortBy { property: PropertyName::from(pair[1].trim()), ascending });
        }
        Self { sort_by }
    }

    pub fn is_empty(&self) -> bool {
        self.sort_by.is_empty()
    }
}

/// One filter criterion: keep cells whose `property` contains `value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterBy {
    pub property: PropertyName,
    pub value: String,
}

/// AND-combined filter criteria.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FilterQuery {
    pub filter_by: SmallVec<[FilterBy; 2]>,
}

impl FilterQuery {
    /// No filtering: every cell passes.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn by(property: impl Into<PropertyName>, value: impl Into<String>) -> Self {
        Self {
            filter_by: smallvec![FilterBy { property: property.into(), value: value.into() }],
        }
    }

    /// Parse the wire form: comma-separated `property,needle` pairs,
    /// AND-combined ("namespace,prod,name,web"). An odd token count yields
    /// the empty filter.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return Self::default();
        }
        let tokens: Vec<&str> = raw.split(',').collect();
        if tokens.len() % 2 != 0 {
            return Self::default();
        }
        let mut filter_by = SmallVec::new();
        for pair in tokens.chunks(2) {
            filter_by.push(FilterBy {
                property: PropertyName::from(pair[0].trim()),
                value: pair[1].to_string(),
            });
        }
        Self { filter_by }
    }

    pub fn is_empty(&self) -> bool {
        self.filter_by.is_empty()
    }

    /// A cell passes when every criterion matches. Properties the cell does
    /// not support answer `Missing` and never exclude it.
    pub fn matches<C: DataCell>(&self, cell: &C) -> bool {
        self.filter_by.iter().all(|f| {
            let value = cell.property(&f.property);
            value.is_missing() || value.contains(&f.value)
        })
    }
}

/// Page selection over the filtered, sorted set. `items_per_page == 0`
/// disables pagination; `page` is 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub items_per_page: usize,
    pub page: usize,
}

impl Pagination {
    pub const NONE: Pagination = Pagination { items_per_page: 0, page: 0 };

    pub fn new(items_per_page: usize, page: usize) -> Self {
        Self { items_per_page, page }
    }

    /// Index range of the requested page, or `None` when the whole set is
    /// returned: pagination disabled, or the page starts past the end.
    /// Callers rely on the past-the-end fallback yielding the entire list
    /// rather than an empty page; it is kept for compatibility.
    pub fn slice(&self, total: usize) -> Option<std::ops::Range<usize>> {
        if self.items_per_page == 0 {
            return None;
        }
        let start = self.items_per_page.checked_mul(self.page)?;
        if start >= total {
            return None;
        }
        Some(start..(start + self.items_per_page).min(total))
    }
}

/// Immutable description of one list request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ListQuery {
    pub filter: FilterQuery,
    pub sort: SortQuery,
    pub pagination: Pagination,
    pub metrics: MetricQuery,
}

impl ListQuery {
    /// Everything: no filter, no sort, no pagination, no metrics.
    pub fn all() -> Self {
        Self::default()
    }
}

/// Run the fixed pipeline: filter, count, stable multi-key sort, paginate.
/// Returns the selected page and the filtered total (the `totalItems` a
/// list reports).
pub fn select<C: DataCell>(cells: Vec<C>, query: &ListQuery) -> (Vec<C>, usize) {
    let t0 = Instant::now();
    let upstream = cells.len();
    let mut kept: Vec<C> = cells.into_iter().filter(|c| query.filter.matches(c)).collect();
    let total = kept.len();
    if !query.sort.is_empty() {
        kept.sort_by(|a, b| compare(a, b, &query.sort));
    }
    let page = match query.pagination.slice(total) {
        Some(range) => kept.drain(range).collect(),
        None => kept,
    };
    metrics::histogram!("select_eval_ms", t0.elapsed().as_secs_f64() * 1000.0);
    metrics::gauge!("select_docs", upstream as f64);
    debug!(upstream, total, page = page.len(), "select: done");
    (page, total)
}

/// `select`, then fire metric fetches for the selected page only.
pub fn select_with_metrics<C: MetricCell>(
    cells: Vec<C>,
    query: &ListQuery,
    client: &dyn MetricClient,
) -> (Vec<C>, usize, PendingMetrics) {
    let (page, total) = select(cells, query);
    if query.metrics.is_empty() {
        return (page, total, PendingMetrics::empty());
    }
    let selectors = page.iter().map(|c| c.resource_selector()).collect();
    let pending = client.spawn_usage(selectors, &query.metrics);
    (page, total, pending)
}

/// Stable comparator over the sort criteria. Descending reverses the
/// comparator result, never the final list, so equal-key cells keep their
/// upstream relative order in both directions. A `Missing` side skips that
/// one criterion and moves on to the next.
fn compare<C: DataCell>(a: &C, b: &C, sort: &SortQuery) -> Ordering {
    for s in &sort.sort_by {
        let va = a.property(&s.property);
        let vb = b.property(&s.property);
        if va.is_missing() || vb.is_missing() {
            continue;
        }
        let ord = va.cmp_value(&vb);
        let ord = if s.ascending { ord } else { ord.reverse() };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use kanso_core::PropertyValue;

    struct Row {
        name: &'static str,
        restarts: Option<i64>,
    }

    impl DataCell for Row {
        fn property(&self, name: &PropertyName) -> PropertyValue {
            match name {
                PropertyName::Name => PropertyValue::text(self.name),
                PropertyName::Count => match self.restarts {
                    Some(n) => PropertyValue::count(n),
                    None => PropertyValue::Missing,
                },
                _ => PropertyValue::Missing,
            }
        }
    }

    fn names(rows: &[Row]) -> Vec<&'static str> {
        rows.iter().map(|r| r.name).collect()
    }

    #[test]
    fn sort_parse_accepts_pairs() {
        let q = SortQuery::parse("d,creationTimestamp,a,name");
        assert_eq!(q.sort_by.len(), 2);
        assert_eq!(q.sort_by[0].property, PropertyName::CreationTimestamp);
        assert!(!q.sort_by[0].ascending);
        assert_eq!(q.sort_by[1].property, PropertyName::Name);
        assert!(q.sort_by[1].ascending);
    }

    #[test]
    fn sort_parse_rejects_malformed_input() {
        assert!(SortQuery::parse("").is_empty());
        assert!(SortQuery::parse("d,creationTimestamp,a").is_empty());
        assert!(SortQuery::parse("x,name").is_empty());
    }

    #[test]
    fn filter_parse_accepts_pairs_and_rejects_odd_counts() {
        let q = FilterQuery::parse("namespace,prod,name,web");
        assert_eq!(q.filter_by.len(), 2);
        assert_eq!(q.filter_by[0].property, PropertyName::Namespace);
        assert_eq!(q.filter_by[0].value, "prod");
        assert!(FilterQuery::parse("namespace").is_empty());
        assert!(FilterQuery::parse("").is_empty());
    }

    #[test]
    fn pagination_slices() {
        assert_eq!(Pagination::NONE.slice(10), None);
        assert_eq!(Pagination::new(3, 0).slice(10), Some(0..3));
        assert_eq!(Pagination::new(3, 3).slice(10), Some(9..10));
        assert_eq!(Pagination::new(3, 4).slice(10), None);
        assert_eq!(Pagination::new(usize::MAX, 2).slice(10), None);
    }

    #[test]
    fn missing_skips_one_criterion_not_the_rest() {
        // First key is unsupported on one side; the second key still orders.
        let rows = vec![
            Row { name: "b", restarts: None },
            Row { name: "a", restarts: Some(3) },
        ];
        let query = ListQuery {
            sort: SortQuery {
                sort_by: smallvec![
                    SortBy { property: PropertyName::Count, ascending: true },
                    SortBy { property: PropertyName::Name, ascending: true },
                ],
            },
            ..Default::default()
        };
        let (page, total) = select(rows, &query);
        assert_eq!(total, 2);
        assert_eq!(names(&page), vec!["a", "b"]);
    }

    #[test]
    fn missing_filter_property_never_excludes() {
        let rows = vec![
            Row { name: "a", restarts: None },
            Row { name: "b", restarts: Some(2) },
        ];
        let query = ListQuery {
            filter: FilterQuery::by(PropertyName::Count, "2"),
            ..Default::default()
        };
        let (page, total) = select(rows, &query);
        // The cell without the property is not excluded by it.
        assert_eq!(total, 2);
        assert_eq!(names(&page), vec!["a", "b"]);
    }
}
