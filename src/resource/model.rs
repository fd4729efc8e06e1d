//! Resource data model
//!
//! The normalized record every service adapter produces, and the index that
//! one aggregation run persists.

use super::environment::Environment;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Supported AWS services
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    Lambda,
    S3,
    Sqs,
    Kinesis,
    Dynamodb,
    Rds,
    Apigateway,
}

impl Service {
    /// All services, in canonical order
    pub const ALL: [Service; 7] = [
        Service::Lambda,
        Service::S3,
        Service::Sqs,
        Service::Kinesis,
        Service::Dynamodb,
        Service::Rds,
        Service::Apigateway,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lambda => "lambda",
            Self::S3 => "s3",
            Self::Sqs => "sqs",
            Self::Kinesis => "kinesis",
            Self::Dynamodb => "dynamodb",
            Self::Rds => "rds",
            Self::Apigateway => "apigateway",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for a service tag that is not one of [`Service::ALL`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown service '{0}'")]
pub struct UnknownService(pub String);

impl FromStr for Service {
    type Err = UnknownService;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Service::ALL
            .into_iter()
            .find(|svc| svc.as_str() == lower)
            .ok_or_else(|| UnknownService(s.to_string()))
    }
}

/// A discovered AWS resource, normalized across services
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Service-specific unique identifier (ARN, URL or name)
    pub id: String,
    pub name: String,
    pub service: Service,
    /// Absent for global services
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default)]
    pub environment: Environment,
    /// Service-specific fields, informational only
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    /// Which console URL template applies
    pub console_path_template_key: String,
}

impl Resource {
    /// Identity of the resource across refreshes
    pub fn key(&self) -> ResourceKey {
        ResourceKey {
            service: self.service,
            id: self.id.clone(),
        }
    }
}

/// (service, id) identity of a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub service: Service,
    pub id: String,
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.service, self.id)
    }
}

/// Snapshot of all resources discovered by one aggregation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceIndex {
    pub resources: Vec<Resource>,
    pub generated_at: DateTime<Utc>,
    pub source_region: String,
    #[serde(default)]
    pub source_profile: Option<String>,
    /// True when at least one service failed during the run
    #[serde(default)]
    pub partial: bool,
    #[serde(default)]
    pub failed_services: Vec<Service>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Keys added and removed between two snapshots
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexDiff {
    pub added: Vec<ResourceKey>,
    pub removed: Vec<ResourceKey>,
}

impl IndexDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

impl ResourceIndex {
    /// Create an empty index for a region/profile pair
    pub fn new(source_region: &str, source_profile: Option<&str>) -> Self {
        Self {
            resources: Vec::new(),
            generated_at: Utc::now(),
            source_region: source_region.to_string(),
            source_profile: source_profile.map(|p| p.to_string()),
            partial: false,
            failed_services: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Look up a resource by its identity
    pub fn find(&self, service: Service, id: &str) -> Option<&Resource> {
        self.resources
            .iter()
            .find(|r| r.service == service && r.id == id)
    }

    pub fn keys(&self) -> HashSet<ResourceKey> {
        self.resources.iter().map(Resource::key).collect()
    }

    /// Compare against a previous snapshot
    pub fn diff(&self, previous: &ResourceIndex) -> IndexDiff {
        let current = self.keys();
        let before = previous.keys();

        let mut added: Vec<ResourceKey> = current.difference(&before).cloned().collect();
        let mut removed: Vec<ResourceKey> = before.difference(&current).cloned().collect();
        added.sort();
        removed.sort();

        IndexDiff { added, removed }
    }

    /// Resource counts per service, in the order services first appear
    pub fn counts_by_service(&self) -> Vec<(Service, usize)> {
        let mut counts: Vec<(Service, usize)> = Vec::new();
        for resource in &self.resources {
            match counts.iter_mut().find(|(svc, _)| *svc == resource.service) {
                Some((_, count)) => *count += 1,
                None => counts.push((resource.service, 1)),
            }
        }
        counts
    }

    /// Whether the snapshot is older than `max_age` at `now`
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        match chrono::Duration::from_std(max_age) {
            Ok(max_age) => now.signed_duration_since(self.generated_at) > max_age,
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(service: Service, id: &str) -> Resource {
        Resource {
            id: id.to_string(),
            name: id.to_string(),
            service,
            region: Some("us-east-1".to_string()),
            environment: Environment::Unknown,
            metadata: BTreeMap::new(),
            console_path_template_key: "default".to_string(),
        }
    }

    #[test]
    fn test_service_parse_case_insensitive() {
        assert_eq!("Lambda".parse::<Service>(), Ok(Service::Lambda));
        assert_eq!(" DYNAMODB ".parse::<Service>(), Ok(Service::Dynamodb));
        assert!("iam".parse::<Service>().is_err());
    }

    #[test]
    fn test_service_display_matches_serde() {
        for service in Service::ALL {
            let json = serde_json::to_string(&service).unwrap();
            assert_eq!(json, format!("\"{}\"", service));
        }
    }

    #[test]
    fn test_diff_reports_added_and_removed() {
        let mut old = ResourceIndex::new("us-east-1", None);
        old.resources = vec![resource(Service::Lambda, "a"), resource(Service::S3, "b")];

        let mut new = ResourceIndex::new("us-east-1", None);
        new.resources = vec![resource(Service::Lambda, "a"), resource(Service::Sqs, "c")];

        let diff = new.diff(&old);
        assert_eq!(diff.added.len(), 1);
        assert_eq!(diff.added[0].to_string(), "sqs:c");
        assert_eq!(diff.removed.len(), 1);
        assert_eq!(diff.removed[0].to_string(), "s3:b");
    }

    #[test]
    fn test_same_id_in_different_services_is_distinct() {
        let mut index = ResourceIndex::new("us-east-1", None);
        index.resources = vec![resource(Service::Sqs, "orders"), resource(Service::Kinesis, "orders")];
        assert_eq!(index.keys().len(), 2);
        assert!(index.find(Service::Kinesis, "orders").is_some());
        assert!(index.find(Service::Lambda, "orders").is_none());
    }

    #[test]
    fn test_counts_by_service_keeps_index_order() {
        let mut index = ResourceIndex::new("us-east-1", None);
        index.resources = vec![
            resource(Service::Rds, "db-1"),
            resource(Service::Rds, "db-2"),
            resource(Service::Lambda, "fn"),
        ];
        assert_eq!(
            index.counts_by_service(),
            vec![(Service::Rds, 2), (Service::Lambda, 1)]
        );
    }

    #[test]
    fn test_is_stale() {
        let mut index = ResourceIndex::new("us-east-1", None);
        let now = Utc::now();
        index.generated_at = now - chrono::Duration::hours(25);
        assert!(index.is_stale(now, Duration::from_secs(24 * 3600)));
        index.generated_at = now - chrono::Duration::hours(1);
        assert!(!index.is_stale(now, Duration::from_secs(24 * 3600)));
    }

    #[test]
    fn test_missing_environment_defaults_to_unknown() {
        let json = r#"{
            "id": "arn:aws:lambda:us-east-1:1:function:x",
            "name": "x",
            "service": "lambda",
            "console_path_template_key": "function"
        }"#;
        let resource: Resource = serde_json::from_str(json).unwrap();
        assert_eq!(resource.environment, Environment::Unknown);
        assert!(resource.region.is_none());
    }
}
