//! Resource Fetcher
//!
//! The contract every service adapter implements, the pagination and
//! describe fan-out helpers they share, and the normalization of raw API
//! records into [`Resource`]s.

use super::environment::classify;
use super::model::{Resource, Service};
use super::registry::get_service;
use crate::aws::error::FetchError;
use crate::aws::retry::RetryPolicy;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::{Map, Value};
use std::fmt::Display;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// One raw API object, keyed by the service's own field names
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// Console template key within the service (e.g. "instance", "cluster")
    pub kind: String,
    pub fields: Map<String, Value>,
}

impl RawRecord {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            fields: Map::new(),
        }
    }

    /// Add a field. Null values (absent optionals) are not stored.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        if !value.is_null() {
            self.fields.insert(key.to_string(), value);
        }
        self
    }
}

/// What one adapter run produced
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub records: Vec<RawRecord>,
    /// Soft failures that did not stop the adapter (skipped items)
    pub warnings: Vec<String>,
    /// Set when the adapter stopped early; `records` holds what was fetched
    pub failure: Option<FetchError>,
}

impl FetchOutcome {
    pub fn failed(failure: FetchError) -> Self {
        Self {
            failure: Some(failure),
            ..Self::default()
        }
    }

    /// Fold another listing of the same service into this one. The first
    /// failure is kept.
    pub fn merge(&mut self, other: FetchOutcome) {
        self.records.extend(other.records);
        self.warnings.extend(other.warnings);
        if self.failure.is_none() {
            self.failure = other.failure;
        }
    }
}

/// Per-run settings shared by all adapters
#[derive(Debug, Clone)]
pub struct FetchContext {
    pub region: String,
    /// Cancelled when the overall refresh budget is exhausted
    pub cancel: CancellationToken,
    pub retry: RetryPolicy,
    /// Concurrent describe calls within one service
    pub describe_concurrency: usize,
}

impl FetchContext {
    pub fn new(region: &str) -> Self {
        Self {
            region: region.to_string(),
            cancel: CancellationToken::new(),
            retry: RetryPolicy::default(),
            describe_concurrency: 8,
        }
    }
}

/// Source of raw records for a service
#[async_trait]
pub trait ResourceSource: Send + Sync {
    async fn fetch(&self, service: Service, ctx: &FetchContext) -> FetchOutcome;
}

/// Result of paginated fetch
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

/// Fetch every page of a listing (auto-paginate)
///
/// Each page is retried per the context's policy. On a failure or
/// cancellation the items gathered so far are returned with the error.
pub async fn fetch_all_pages<T, F, Fut>(
    ctx: &FetchContext,
    what: &str,
    mut fetch_page: F,
) -> (Vec<T>, Option<FetchError>)
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<PaginatedResult<T>, FetchError>>,
{
    let mut all_items = Vec::new();
    let mut page_token: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let result = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => Err(FetchError::Cancelled),
            result = ctx.retry.run(|| fetch_page(page_token.clone())) => result,
        };

        let page = match result {
            Ok(page) => page,
            Err(err) => {
                tracing::warn!(
                    "{}: stopped after {} page(s), {} item(s): {}",
                    what,
                    pages,
                    all_items.len(),
                    err
                );
                return (all_items, Some(err));
            }
        };

        pages += 1;
        tracing::debug!("{}: page {} returned {} item(s)", what, pages, page.items.len());
        all_items.extend(page.items);

        match page.next_token.filter(|t| !t.is_empty()) {
            None => break,
            Some(next) if page_token.as_deref() == Some(next.as_str()) => {
                tracing::warn!("{}: continuation token repeated, stopping", what);
                break;
            }
            Some(next) => page_token = Some(next),
        }
    }

    (all_items, None)
}

/// Items described by a fan-out
pub struct Described<T> {
    pub items: Vec<T>,
    pub warnings: Vec<String>,
    /// Set when cancellation cut the fan-out short
    pub interrupted: Option<FetchError>,
}

/// Describe each listed item with bounded concurrency
///
/// Items whose describe fails are skipped with a warning. Output keeps the
/// input order.
pub async fn describe_each<I, T, F, Fut>(
    ctx: &FetchContext,
    what: &str,
    items: Vec<I>,
    describe: F,
) -> Described<T>
where
    I: Display + Clone,
    F: Fn(I) -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let total = items.len();
    let describe = &describe;
    let retry = ctx.retry;

    let results: Vec<(String, Result<T, FetchError>)> = stream::iter(items)
        .map(|item| {
            let label = item.to_string();
            async move {
                let result = retry.run(|| describe(item.clone())).await;
                (label, result)
            }
        })
        .buffered(ctx.describe_concurrency.max(1))
        .take_until(ctx.cancel.cancelled())
        .collect()
        .await;

    let interrupted = if results.len() < total {
        tracing::warn!("{}: describe cancelled after {} of {}", what, results.len(), total);
        Some(FetchError::Cancelled)
    } else {
        None
    };

    let mut described = Vec::with_capacity(results.len());
    let mut warnings = Vec::new();
    for (label, result) in results {
        match result {
            Ok(item) => described.push(item),
            Err(err) => {
                tracing::warn!("{}: skipping {}: {}", what, label, err);
                warnings.push(format!("{}: skipped {}: {}", what, label, err));
            }
        }
    }

    Described {
        items: described,
        warnings,
        interrupted,
    }
}

/// Map a raw record to a [`Resource`]
///
/// The registry decides which raw fields hold the id and name; every other
/// field is kept as metadata. Fails only for malformed records (no usable id
/// or name, or a kind the registry does not know).
pub fn normalize(service: Service, record: RawRecord, region: &str) -> Result<Resource, String> {
    let service_def =
        get_service(service).ok_or_else(|| format!("{}: no registry entry", service))?;
    let kind = service_def
        .kinds
        .get(&record.kind)
        .ok_or_else(|| format!("{}: unknown resource kind '{}'", service, record.kind))?;

    let mut fields = record.fields;
    let id = required_string(&fields, &kind.id_field)
        .ok_or_else(|| format!("{}: record without {}", service, kind.id_field))?;
    let name = required_string(&fields, &kind.name_field)
        .ok_or_else(|| format!("{}: {} without {}", service, id, kind.name_field))?;

    fields.remove(&kind.id_field);
    fields.remove(&kind.name_field);

    Ok(Resource {
        environment: classify(&name),
        id,
        name,
        service,
        region: (!service_def.is_global).then(|| region.to_string()),
        metadata: fields.into_iter().collect(),
        console_path_template_key: record.kind,
    })
}

/// Normalize an adapter's records, skipping malformed ones with a warning
pub fn normalize_all(
    service: Service,
    records: Vec<RawRecord>,
    region: &str,
) -> (Vec<Resource>, Vec<String>) {
    let mut resources = Vec::with_capacity(records.len());
    let mut warnings = Vec::new();

    for record in records {
        match normalize(service, record, region) {
            Ok(resource) => resources.push(resource),
            Err(reason) => {
                tracing::warn!("Skipping malformed record: {}", reason);
                warnings.push(format!("skipped malformed record: {}", reason));
            }
        }
    }

    (resources, warnings)
}

/// Id and name are kept verbatim; blank values count as missing
fn required_string(fields: &Map<String, Value>, key: &str) -> Option<String> {
    match fields.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::environment::Environment;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn ctx() -> FetchContext {
        FetchContext {
            retry: RetryPolicy::immediate(3),
            ..FetchContext::new("eu-west-1")
        }
    }

    #[test]
    fn test_normalize_lambda_keeps_extra_fields() {
        let record = RawRecord::new("function")
            .with("FunctionArn", "arn:aws:lambda:eu-west-1:1:function:svc-prod-auth")
            .with("FunctionName", "svc-prod-auth")
            .with("Runtime", "python3.12")
            .with("MemorySize", 256)
            .with("Description", Option::<&str>::None);

        let resource = normalize(Service::Lambda, record, "eu-west-1").unwrap();
        assert_eq!(resource.id, "arn:aws:lambda:eu-west-1:1:function:svc-prod-auth");
        assert_eq!(resource.name, "svc-prod-auth");
        assert_eq!(resource.environment, Environment::Prod);
        assert_eq!(resource.region.as_deref(), Some("eu-west-1"));
        assert_eq!(resource.metadata["Runtime"], "python3.12");
        assert_eq!(resource.metadata["MemorySize"], 256);
        assert!(!resource.metadata.contains_key("Description"));
        assert!(!resource.metadata.contains_key("FunctionName"));
    }

    #[test]
    fn test_normalize_global_service_has_no_region() {
        let record = RawRecord::new("bucket").with("Name", "media-stage");
        let resource = normalize(Service::S3, record, "eu-west-1").unwrap();
        assert_eq!(resource.id, "media-stage");
        assert_eq!(resource.name, "media-stage");
        assert!(resource.region.is_none());
        assert_eq!(resource.environment, Environment::Stage);
    }

    #[test]
    fn test_normalize_rejects_malformed() {
        let no_id = RawRecord::new("function").with("FunctionName", "x");
        assert!(normalize(Service::Lambda, no_id, "r").is_err());

        let empty_name = RawRecord::new("function")
            .with("FunctionArn", "arn")
            .with("FunctionName", "  ");
        assert!(normalize(Service::Lambda, empty_name, "r").is_err());

        let bad_kind = RawRecord::new("layer").with("FunctionArn", "a").with("FunctionName", "b");
        assert!(normalize(Service::Lambda, bad_kind, "r").is_err());
    }

    #[test]
    fn test_normalize_keeps_id_and_name_verbatim() {
        let record = RawRecord::new("rest_api")
            .with("id", "a1b2c3")
            .with("name", " Orders API ");

        let resource = normalize(Service::Apigateway, record, "us-east-1").unwrap();
        assert_eq!(resource.id, "a1b2c3");
        assert_eq!(resource.name, " Orders API ");
    }

    #[test]
    fn test_normalize_all_skips_and_warns() {
        let records = vec![
            RawRecord::new("queue")
                .with("QueueUrl", "https://sqs.eu-west-1.amazonaws.com/1/orders-dev")
                .with("QueueName", "orders-dev"),
            RawRecord::new("queue").with("QueueName", "broken"),
        ];
        let (resources, warnings) = normalize_all(Service::Sqs, records, "eu-west-1");
        assert_eq!(resources.len(), 1);
        assert_eq!(warnings.len(), 1);
        assert_eq!(resources[0].environment, Environment::Dev);
    }

    #[tokio::test]
    async fn test_fetch_all_pages_follows_tokens() {
        let ctx = ctx();
        let seen = Mutex::new(Vec::new());

        let (items, failure) = fetch_all_pages(&ctx, "test", |token| {
            seen.lock().unwrap().push(token.clone());
            async move {
                Ok::<_, FetchError>(match token.as_deref() {
                    None => PaginatedResult { items: vec![1, 2], next_token: Some("a".into()) },
                    Some("a") => PaginatedResult { items: vec![3], next_token: Some("b".into()) },
                    _ => PaginatedResult { items: vec![4], next_token: None },
                })
            }
        })
        .await;

        assert_eq!(items, vec![1, 2, 3, 4]);
        assert!(failure.is_none());
        assert_eq!(
            *seen.lock().unwrap(),
            vec![None, Some("a".to_string()), Some("b".to_string())]
        );
    }

    #[tokio::test]
    async fn test_fetch_all_pages_keeps_partial_on_throttling() {
        let ctx = ctx();
        let calls = AtomicU32::new(0);

        let (items, failure) = fetch_all_pages(&ctx, "test", |token| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                match token {
                    None => Ok(PaginatedResult { items: vec!["a"], next_token: Some("p2".into()) }),
                    Some(_) => Err(FetchError::Throttled("slow down".into())),
                }
            }
        })
        .await;

        assert_eq!(items, vec!["a"]);
        assert!(matches!(failure, Some(FetchError::Throttled(_))));
        // one first page plus three attempts at the second
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_fetch_all_pages_stops_on_repeated_token() {
        let ctx = ctx();
        let (items, failure) = fetch_all_pages(&ctx, "test", |_| async {
            Ok::<_, FetchError>(PaginatedResult { items: vec![0], next_token: Some("same".into()) })
        })
        .await;

        assert_eq!(items.len(), 2);
        assert!(failure.is_none());
    }

    #[tokio::test]
    async fn test_fetch_all_pages_cancelled() {
        let ctx = ctx();
        ctx.cancel.cancel();
        let (items, failure) = fetch_all_pages(&ctx, "test", |_| async {
            Ok::<_, FetchError>(PaginatedResult { items: vec![0], next_token: None })
        })
        .await;

        assert!(items.is_empty());
        assert_eq!(failure, Some(FetchError::Cancelled));
    }

    #[tokio::test]
    async fn test_describe_each_skips_failures_in_order() {
        let ctx = FetchContext {
            describe_concurrency: 2,
            ..ctx()
        };
        let names = vec!["a".to_string(), "bad".to_string(), "c".to_string()];

        let described = describe_each(&ctx, "test", names, |name| async move {
            if name == "bad" {
                Err(FetchError::Request("ResourceNotFoundException".into()))
            } else {
                Ok(name.to_uppercase())
            }
        })
        .await;

        assert_eq!(described.items, vec!["A", "C"]);
        assert_eq!(described.warnings.len(), 1);
        assert!(described.warnings[0].contains("bad"));
        assert!(described.interrupted.is_none());
    }

    #[tokio::test]
    async fn test_describe_each_cancelled() {
        let ctx = ctx();
        ctx.cancel.cancel();

        let described = describe_each(&ctx, "test", vec![1, 2, 3], |n| async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            Ok::<_, FetchError>(n)
        })
        .await;

        assert!(described.items.is_empty());
        assert_eq!(described.interrupted, Some(FetchError::Cancelled));
    }

    #[test]
    fn test_merge_keeps_first_failure() {
        let mut a = FetchOutcome {
            records: vec![RawRecord::new("instance")],
            warnings: vec![],
            failure: None,
        };
        let b = FetchOutcome {
            records: vec![RawRecord::new("cluster")],
            warnings: vec!["w".into()],
            failure: Some(FetchError::Throttled("x".into())),
        };
        a.merge(b);
        a.merge(FetchOutcome::failed(FetchError::Cancelled));
        assert_eq!(a.records.len(), 2);
        assert_eq!(a.warnings.len(), 1);
        assert!(matches!(a.failure, Some(FetchError::Throttled(_))));
    }
}
