//! Aggregator
//!
//! Runs one adapter task per enabled service, joins them, and merges their
//! output into a [`ResourceIndex`] in enabled-service order.
//!
//! Failure handling per service:
//! - authorization failure or per-service timeout: zero resources
//! - throttling, cancellation or other errors after some pages: the records
//!   fetched so far are kept
//!
//! In every case the service is listed in `failed_services` and the index is
//! marked partial.

use crate::aws::error::FetchError;
use crate::config::ServiceConfig;
use crate::resource::fetcher::{normalize_all, FetchContext, FetchOutcome, ResourceSource};
use crate::resource::model::{ResourceIndex, Service};
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

pub struct Aggregator {
    source: Arc<dyn ResourceSource>,
}

impl Aggregator {
    pub fn new(source: Arc<dyn ResourceSource>) -> Self {
        Self { source }
    }

    /// Build a full index for the configured services
    pub async fn aggregate(&self, config: &ServiceConfig) -> ResourceIndex {
        self.aggregate_with_cancel(config, CancellationToken::new())
            .await
    }

    /// Build a full index; cancelling `cancel` stops in-flight services,
    /// which then contribute what they fetched so far
    pub async fn aggregate_with_cancel(
        &self,
        config: &ServiceConfig,
        cancel: CancellationToken,
    ) -> ResourceIndex {
        let started = Instant::now();
        tracing::info!(
            "Aggregating {} service(s) in {}",
            config.enabled_services.len(),
            config.aws_region
        );

        let watchdog = spawn_watchdog(cancel.clone(), config.refresh_timeout);

        let handles: Vec<_> = config
            .enabled_services
            .iter()
            .map(|&service| {
                let source = Arc::clone(&self.source);
                let ctx = FetchContext {
                    region: config.aws_region.clone(),
                    cancel: cancel.child_token(),
                    retry: config.retry,
                    describe_concurrency: config.describe_concurrency,
                };
                let budget = config.service_timeout;

                tokio::spawn(async move {
                    let started = Instant::now();
                    let fetch = source.fetch(service, &ctx);
                    let outcome = match tokio::time::timeout(budget, fetch).await {
                        Ok(outcome) => outcome,
                        Err(_) => FetchOutcome::failed(FetchError::Timeout(format!(
                            "no result within {}s",
                            budget.as_secs()
                        ))),
                    };
                    tracing::debug!(
                        "{}: adapter finished in {:?} with {} record(s)",
                        service,
                        started.elapsed(),
                        outcome.records.len()
                    );
                    outcome
                })
            })
            .collect();

        let results = join_all(handles).await;
        watchdog.abort();

        let mut index =
            ResourceIndex::new(&config.aws_region, config.aws_profile.as_deref());

        for (&service, joined) in config.enabled_services.iter().zip(results) {
            let outcome = joined.unwrap_or_else(|e| {
                tracing::error!("{}: adapter task failed: {}", service, e);
                FetchOutcome::failed(FetchError::Request(format!("adapter task failed: {}", e)))
            });
            merge_service(&mut index, service, outcome);
        }

        index.partial = !index.failed_services.is_empty();
        tracing::info!(
            "Aggregated {} resource(s) in {:?} (failed services: {})",
            index.resources.len(),
            started.elapsed(),
            index.failed_services.len()
        );
        index
    }
}

/// Cancel `cancel` once the refresh budget runs out
fn spawn_watchdog(
    cancel: CancellationToken,
    budget: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(budget) => {
                tracing::warn!("Refresh exceeded {:?}, cancelling in-flight services", budget);
                cancel.cancel();
            }
            _ = cancel.cancelled() => {}
        }
    })
}

/// Append one service's output to the index
fn merge_service(index: &mut ResourceIndex, service: Service, outcome: FetchOutcome) {
    let FetchOutcome {
        records,
        warnings,
        failure,
    } = outcome;

    index.warnings.extend(warnings);

    let records = match &failure {
        Some(FetchError::Unauthorized(_)) => Vec::new(),
        _ => records,
    };

    let (resources, skipped) = normalize_all(service, records, &index.source_region);
    index.warnings.extend(skipped);

    let mut seen: HashSet<String> = HashSet::with_capacity(resources.len());
    let mut added = 0usize;
    for resource in resources {
        if !seen.insert(resource.id.clone()) {
            tracing::warn!("{}: duplicate id {}, keeping the first", service, resource.id);
            index
                .warnings
                .push(format!("{}: dropped duplicate id {}", service, resource.id));
            continue;
        }
        index.resources.push(resource);
        added += 1;
    }

    match failure {
        Some(err) => {
            tracing::warn!("{}: failed after {} resource(s): {}", service, added, err);
            index.warnings.push(format!("{}: {}", service, err));
            index.failed_services.push(service);
        }
        None => tracing::info!("{}: {} resource(s)", service, added),
    }
}
