//! Kanso core types: comparable property values and the data cell traits.

#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

pub mod quantity;

pub type Uid = [u8; 16];

/// Parse a Kubernetes `metadata.uid` string into a compact binary uid.
pub fn parse_uid(s: &str) -> anyhow::Result<Uid> {
    let u = uuid::Uuid::parse_str(s)?;
    Ok(*u.as_bytes())
}

/// Resource kinds the console knows how to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Pod,
    Deployment,
    Event,
    Node,
    Namespace,
    Service,
    ConfigMap,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 7] = [
        ResourceKind::Pod,
        ResourceKind::Deployment,
        ResourceKind::Event,
        ResourceKind::Node,
        ResourceKind::Namespace,
        ResourceKind::Service,
        ResourceKind::ConfigMap,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Pod => "pod",
            ResourceKind::Deployment => "deployment",
            ResourceKind::Event => "event",
            ResourceKind::Node => "node",
            ResourceKind::Namespace => "namespace",
            ResourceKind::Service => "service",
            ResourceKind::ConfigMap => "configmap",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown resource kind: {0}")]
pub struct UnknownKind(pub String);

impl FromStr for ResourceKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pod" | "pods" => Ok(ResourceKind::Pod),
            "deployment" | "deployments" => Ok(ResourceKind::Deployment),
            "event" | "events" => Ok(ResourceKind::Event),
            "node" | "nodes" => Ok(ResourceKind::Node),
            "namespace" | "namespaces" => Ok(ResourceKind::Namespace),
            "service" | "services" => Ok(ResourceKind::Service),
            "configmap" | "configmaps" => Ok(ResourceKind::ConfigMap),
            _ => Err(UnknownKind(s.to_string())),
        }
    }
}

/// Identifies one resource instance, used to correlate usage metrics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceSelector {
    pub kind: ResourceKind,
    /// Empty for cluster-scoped resources.
    pub namespace: String,
    pub name: String,
    pub uid: Option<Uid>,
}

/// Stable string key addressing one property uniformly across resource kinds.
///
/// Unknown keys parse into `Other`; adapters answer `Missing` for keys they
/// do not support.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PropertyName {
    Name,
    Namespace,
    CreationTimestamp,
    Status,
    Type,
    Reason,
    Message,
    Count,
    FirstSeen,
    LastSeen,
    NodeName,
    Capacity,
    Other(String),
}

impl PropertyName {
    fn known(s: &str) -> Option<PropertyName> {
        Some(match s {
            "name" => PropertyName::Name,
            "namespace" => PropertyName::Namespace,
            "creationTimestamp" => PropertyName::CreationTimestamp,
            "status" => PropertyName::Status,
            "type" => PropertyName::Type,
            "reason" => PropertyName::Reason,
            "message" => PropertyName::Message,
            "count" => PropertyName::Count,
            "firstSeen" => PropertyName::FirstSeen,
            "lastSeen" => PropertyName::LastSeen,
            "nodeName" => PropertyName::NodeName,
            "capacity" => PropertyName::Capacity,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &str {
        match self {
            PropertyName::Name => "name",
            PropertyName::Namespace => "namespace",
            PropertyName::CreationTimestamp => "creationTimestamp",
            PropertyName::Status => "status",
            PropertyName::Type => "type",
            PropertyName::Reason => "reason",
            PropertyName::Message => "message",
            PropertyName::Count => "count",
            PropertyName::FirstSeen => "firstSeen",
            PropertyName::LastSeen => "lastSeen",
            PropertyName::NodeName => "nodeName",
            PropertyName::Capacity => "capacity",
            PropertyName::Other(s) => s,
        }
    }
}

impl From<&str> for PropertyName {
    fn from(s: &str) -> Self {
        PropertyName::known(s).unwrap_or_else(|| PropertyName::Other(s.to_string()))
    }
}

impl From<String> for PropertyName {
    fn from(s: String) -> Self {
        PropertyName::known(&s).unwrap_or(PropertyName::Other(s))
    }
}

impl From<PropertyName> for String {
    fn from(p: PropertyName) -> String {
        p.as_str().to_string()
    }
}

impl fmt::Display for PropertyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A quantity kept alongside its parsed magnitude.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuantity {
    pub raw: String,
    pub magnitude: f64,
}

/// A property value with a total ordering and a containment contract.
///
/// `Missing` is the defined answer for properties a resource kind does not
/// support; the selection engine skips it in both sorting and filtering.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Text(String),
    Timestamp(DateTime<Utc>),
    Quantity(ParsedQuantity),
    Count(i64),
    Missing,
}

impl PropertyValue {
    pub fn text(s: impl Into<String>) -> Self {
        PropertyValue::Text(s.into())
    }

    pub fn timestamp(t: DateTime<Utc>) -> Self {
        PropertyValue::Timestamp(t)
    }

    pub fn count(n: i64) -> Self {
        PropertyValue::Count(n)
    }

    /// Parse a quantity string; text that is not a quantity degrades to
    /// `Missing` so it can never poison an ordering.
    pub fn quantity(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        match quantity::parse(&raw) {
            Some(magnitude) => PropertyValue::Quantity(ParsedQuantity { raw, magnitude }),
            None => PropertyValue::Missing,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, PropertyValue::Missing)
    }

    /// Total order: lexicographic for text, chronological for timestamps,
    /// parsed magnitude for quantities (so "2Gi" sorts below "10Gi"), numeric
    /// for counts. Mixed kinds fall back to a fixed kind rank; collections
    /// are homogeneous per property, the fallback only keeps the order total.
    pub fn cmp_value(&self, other: &Self) -> Ordering {
        match (self, other) {
            (PropertyValue::Text(a), PropertyValue::Text(b)) => a.cmp(b),
            (PropertyValue::Timestamp(a), PropertyValue::Timestamp(b)) => a.cmp(b),
            (PropertyValue::Quantity(a), PropertyValue::Quantity(b)) => {
                a.magnitude.total_cmp(&b.magnitude)
            }
            (PropertyValue::Count(a), PropertyValue::Count(b)) => a.cmp(b),
            (PropertyValue::Missing, PropertyValue::Missing) => Ordering::Equal,
            _ => self.rank().cmp(&other.rank()),
        }
    }

    /// Containment used by filtering: substring for text, substring over the
    /// RFC 3339 rendering for timestamps, substring over the original text
    /// for quantities, numeric equality for counts. `Missing` matches
    /// nothing.
    pub fn contains(&self, needle: &str) -> bool {
        match self {
            PropertyValue::Text(s) => s.contains(needle),
            PropertyValue::Timestamp(t) => t
                .to_rfc3339_opts(SecondsFormat::Secs, true)
                .contains(needle),
            PropertyValue::Quantity(q) => q.raw.contains(needle),
            PropertyValue::Count(n) => needle.trim().parse::<i64>() == Ok(*n),
            PropertyValue::Missing => false,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            PropertyValue::Missing => 0,
            PropertyValue::Count(_) => 1,
            PropertyValue::Quantity(_) => 2,
            PropertyValue::Timestamp(_) => 3,
            PropertyValue::Text(_) => 4,
        }
    }
}

/// Uniform read access to one named property of a backing resource.
pub trait DataCell {
    fn property(&self, name: &PropertyName) -> PropertyValue;
}

/// Cells that can be correlated with usage metrics.
pub trait MetricCell: DataCell {
    fn resource_selector(&self) -> ResourceSelector;
}

pub mod prelude {
    pub use super::{
        parse_uid, quantity, DataCell, MetricCell, PropertyName, PropertyValue, ResourceKind,
        ResourceSelector, Uid,
    };
}
