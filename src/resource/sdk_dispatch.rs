//! SDK Dispatch
//!
//! One adapter per AWS service, selected by a `match` on [`Service`]. Each
//! adapter drains its listing, describes items where the listing is too thin,
//! and maps SDK output into [`RawRecord`]s using the API's own field names.

use super::fetcher::{
    describe_each, fetch_all_pages, FetchContext, FetchOutcome, PaginatedResult, RawRecord,
    ResourceSource,
};
use super::model::Service;
use crate::aws::client::AwsClients;
use crate::aws::error::{classify_sdk_error, FetchError};
use async_trait::async_trait;
use aws_smithy_types::date_time::{DateTime, Format};

const LAMBDA_PAGE_SIZE: i32 = 50;
const S3_PAGE_SIZE: i32 = 1000;
const SQS_PAGE_SIZE: i32 = 1000;
const KINESIS_PAGE_SIZE: i32 = 100;
const DYNAMODB_PAGE_SIZE: i32 = 100;
const RDS_PAGE_SIZE: i32 = 100;
const APIGATEWAY_PAGE_SIZE: i32 = 500;

/// Resource source backed by the AWS SDK
#[derive(Debug, Clone)]
pub struct AwsSource {
    clients: AwsClients,
}

impl AwsSource {
    pub fn new(clients: AwsClients) -> Self {
        Self { clients }
    }
}

#[async_trait]
impl ResourceSource for AwsSource {
    async fn fetch(&self, service: Service, ctx: &FetchContext) -> FetchOutcome {
        tracing::debug!("fetch: service={}, region={}", service, ctx.region);

        match service {
            Service::Lambda => fetch_lambda(&self.clients.lambda, ctx).await,
            Service::S3 => fetch_s3(&self.clients.s3, ctx).await,
            Service::Sqs => fetch_sqs(&self.clients.sqs, ctx).await,
            Service::Kinesis => fetch_kinesis(&self.clients.kinesis, ctx).await,
            Service::Dynamodb => fetch_dynamodb(&self.clients.dynamodb, ctx).await,
            Service::Rds => fetch_rds(&self.clients.rds, ctx).await,
            Service::Apigateway => fetch_apigateway(&self.clients.apigateway, ctx).await,
        }
    }
}

fn outcome(records: Vec<RawRecord>, failure: Option<FetchError>) -> FetchOutcome {
    FetchOutcome {
        records,
        warnings: Vec::new(),
        failure,
    }
}

// =============================================================================
// Lambda
// =============================================================================

pub async fn fetch_lambda(client: &aws_sdk_lambda::Client, ctx: &FetchContext) -> FetchOutcome {
    let (records, failure) = fetch_all_pages(ctx, "lambda", |marker| async move {
        let output = client
            .list_functions()
            .set_marker(marker)
            .max_items(LAMBDA_PAGE_SIZE)
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;

        Ok::<_, FetchError>(PaginatedResult {
            items: output.functions().iter().map(lambda_record).collect(),
            next_token: output.next_marker().map(|s| s.to_string()),
        })
    })
    .await;

    outcome(records, failure)
}

fn lambda_record(function: &aws_sdk_lambda::types::FunctionConfiguration) -> RawRecord {
    RawRecord::new("function")
        .with("FunctionArn", function.function_arn())
        .with("FunctionName", function.function_name())
        .with("Runtime", function.runtime().map(|r| r.as_str()))
        .with("Handler", function.handler())
        .with("MemorySize", function.memory_size())
        .with("Timeout", function.timeout())
        .with("LastModified", function.last_modified())
        .with("PackageType", function.package_type().map(|p| p.as_str()))
        .with("Description", function.description().filter(|d| !d.is_empty()))
        .with("Role", function.role())
        .with("Version", function.version())
        .with("CodeSize", function.code_size())
        .with("CodeSha256", function.code_sha256())
        .with("State", function.state().map(|s| s.as_str()))
        .with(
            "LastUpdateStatus",
            function.last_update_status().map(|s| s.as_str()),
        )
        .with(
            "Architectures",
            non_empty(function.architectures().iter().map(|a| a.as_str().to_string())),
        )
        .with(
            "Layers",
            non_empty(
                function
                    .layers()
                    .iter()
                    .filter_map(|l| l.arn().map(|a| a.to_string())),
            ),
        )
        .with("VpcId", function.vpc_config().and_then(|v| v.vpc_id()))
        .with("KMSKeyArn", function.kms_key_arn())
        .with(
            "TracingMode",
            function
                .tracing_config()
                .and_then(|t| t.mode())
                .map(|m| m.as_str()),
        )
}

// =============================================================================
// S3
// =============================================================================

pub async fn fetch_s3(client: &aws_sdk_s3::Client, ctx: &FetchContext) -> FetchOutcome {
    let (records, failure) = fetch_all_pages(ctx, "s3", |token| async move {
        let output = client
            .list_buckets()
            .set_continuation_token(token)
            .max_buckets(S3_PAGE_SIZE)
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;

        Ok::<_, FetchError>(PaginatedResult {
            items: output.buckets().iter().map(s3_record).collect(),
            next_token: output.continuation_token().map(|s| s.to_string()),
        })
    })
    .await;

    outcome(records, failure)
}

fn s3_record(bucket: &aws_sdk_s3::types::Bucket) -> RawRecord {
    RawRecord::new("bucket")
        .with("Name", bucket.name())
        .with("CreationDate", bucket.creation_date().and_then(format_date))
        .with("BucketRegion", bucket.bucket_region())
}

// =============================================================================
// SQS
// =============================================================================

pub async fn fetch_sqs(client: &aws_sdk_sqs::Client, ctx: &FetchContext) -> FetchOutcome {
    let (records, failure) = fetch_all_pages(ctx, "sqs", |token| async move {
        let output = client
            .list_queues()
            .set_next_token(token)
            .max_results(SQS_PAGE_SIZE)
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;

        Ok::<_, FetchError>(PaginatedResult {
            items: output.queue_urls().iter().map(|url| sqs_record(url)).collect(),
            next_token: output.next_token().map(|s| s.to_string()),
        })
    })
    .await;

    outcome(records, failure)
}

fn sqs_record(queue_url: &str) -> RawRecord {
    RawRecord::new("queue")
        .with("QueueUrl", queue_url)
        .with("QueueName", queue_name(queue_url))
        .with("FifoQueue", queue_url.ends_with(".fifo"))
}

/// Queue name is the last path segment of its URL
fn queue_name(queue_url: &str) -> Option<String> {
    let from_url = url::Url::parse(queue_url).ok().and_then(|url| {
        url.path_segments()?
            .filter(|s| !s.is_empty())
            .last()
            .map(|s| s.to_string())
    });

    from_url.or_else(|| {
        queue_url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
    })
}

// =============================================================================
// Kinesis
// =============================================================================

pub async fn fetch_kinesis(client: &aws_sdk_kinesis::Client, ctx: &FetchContext) -> FetchOutcome {
    let (names, failure) = fetch_all_pages(ctx, "kinesis", |token| async move {
        let output = client
            .list_streams()
            .set_next_token(token)
            .limit(KINESIS_PAGE_SIZE)
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;

        Ok::<_, FetchError>(PaginatedResult {
            items: output.stream_names().to_vec(),
            next_token: output.next_token().map(|s| s.to_string()),
        })
    })
    .await;

    let described = describe_each(ctx, "kinesis", names, |name: String| async move {
        let output = client
            .describe_stream_summary()
            .stream_name(&name)
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;

        member(output.stream_description_summary())
            .map(kinesis_record)
            .ok_or_else(|| FetchError::Request(format!("empty summary for stream {}", name)))
    })
    .await;

    FetchOutcome {
        records: described.items,
        warnings: described.warnings,
        failure: failure.or(described.interrupted),
    }
}

fn kinesis_record(summary: &aws_sdk_kinesis::types::StreamDescriptionSummary) -> RawRecord {
    RawRecord::new("stream")
        .with("StreamARN", summary.stream_arn())
        .with("StreamName", summary.stream_name())
        .with(
            "StreamStatus",
            member(summary.stream_status()).map(|s| s.as_str()),
        )
        .with("RetentionPeriodHours", summary.retention_period_hours())
        .with("OpenShardCount", summary.open_shard_count())
        .with(
            "StreamMode",
            summary
                .stream_mode_details()
                .and_then(|d| member(d.stream_mode()))
                .map(|m| m.as_str()),
        )
        .with(
            "EncryptionType",
            summary.encryption_type().map(|e| e.as_str()),
        )
        .with("KeyId", summary.key_id())
        .with("ConsumerCount", summary.consumer_count())
        .with(
            "StreamCreationTimestamp",
            member(summary.stream_creation_timestamp()).and_then(format_date),
        )
}

// =============================================================================
// DynamoDB
// =============================================================================

pub async fn fetch_dynamodb(
    client: &aws_sdk_dynamodb::Client,
    ctx: &FetchContext,
) -> FetchOutcome {
    let (names, failure) = fetch_all_pages(ctx, "dynamodb", |start| async move {
        let output = client
            .list_tables()
            .set_exclusive_start_table_name(start)
            .limit(DYNAMODB_PAGE_SIZE)
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;

        Ok::<_, FetchError>(PaginatedResult {
            items: output.table_names().to_vec(),
            next_token: output.last_evaluated_table_name().map(|s| s.to_string()),
        })
    })
    .await;

    let described = describe_each(ctx, "dynamodb", names, |name: String| async move {
        let output = client
            .describe_table()
            .table_name(&name)
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;

        output
            .table()
            .map(dynamodb_record)
            .ok_or_else(|| FetchError::Request(format!("empty description for table {}", name)))
    })
    .await;

    FetchOutcome {
        records: described.items,
        warnings: described.warnings,
        failure: failure.or(described.interrupted),
    }
}

fn dynamodb_record(table: &aws_sdk_dynamodb::types::TableDescription) -> RawRecord {
    RawRecord::new("table")
        .with("TableArn", table.table_arn())
        .with("TableName", table.table_name())
        .with("TableStatus", table.table_status().map(|s| s.as_str()))
        .with("ItemCount", table.item_count())
        .with("TableSizeBytes", table.table_size_bytes())
        .with("CreationDateTime", table.creation_date_time().and_then(format_date))
        .with(
            "BillingMode",
            table
                .billing_mode_summary()
                .and_then(|b| b.billing_mode())
                .map(|m| m.as_str()),
        )
        .with(
            "KeySchema",
            non_empty(table.key_schema().iter().filter_map(|k| {
                Some(format!(
                    "{} {}",
                    member(k.attribute_name())?,
                    member(k.key_type())?.as_str()
                ))
            })),
        )
        .with(
            "GlobalSecondaryIndexes",
            non_empty(
                table
                    .global_secondary_indexes()
                    .iter()
                    .filter_map(|i| i.index_name().map(|n| n.to_string())),
            ),
        )
        .with("LatestStreamArn", table.latest_stream_arn())
        .with("DeletionProtectionEnabled", table.deletion_protection_enabled())
}

// =============================================================================
// RDS
// =============================================================================

/// Instances and clusters are listed independently; a failure of one
/// listing, access denied included, keeps the other's records.
pub async fn fetch_rds(client: &aws_sdk_rds::Client, ctx: &FetchContext) -> FetchOutcome {
    let (instances, failure) = fetch_all_pages(ctx, "rds instances", |marker| async move {
        let output = client
            .describe_db_instances()
            .set_marker(marker)
            .max_records(RDS_PAGE_SIZE)
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;

        Ok::<_, FetchError>(PaginatedResult {
            items: output.db_instances().iter().map(rds_instance_record).collect(),
            next_token: output.marker().map(|s| s.to_string()),
        })
    })
    .await;

    let instances = outcome(instances, failure);

    let (clusters, failure) = fetch_all_pages(ctx, "rds clusters", |marker| async move {
        let output = client
            .describe_db_clusters()
            .set_marker(marker)
            .max_records(RDS_PAGE_SIZE)
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;

        Ok::<_, FetchError>(PaginatedResult {
            items: output.db_clusters().iter().map(rds_cluster_record).collect(),
            next_token: output.marker().map(|s| s.to_string()),
        })
    })
    .await;

    merge_rds_listings(instances, outcome(clusters, failure))
}

/// Combine the two RDS listings
///
/// Access denied on one listing only costs that listing: it is downgraded to
/// a plain failure so the records of the other listing survive aggregation.
/// Only when both are denied does the service count as unauthorized.
fn merge_rds_listings(instances: FetchOutcome, clusters: FetchOutcome) -> FetchOutcome {
    let denied = |o: &FetchOutcome| matches!(o.failure, Some(FetchError::Unauthorized(_)));
    if denied(&instances) && denied(&clusters) {
        let mut result = instances;
        result.merge(clusters);
        return result;
    }

    let mut result = FetchOutcome::default();
    for (operation, listing) in [
        ("DescribeDBInstances", instances),
        ("DescribeDBClusters", clusters),
    ] {
        let failure = match listing.failure {
            Some(FetchError::Unauthorized(msg)) => {
                tracing::warn!("rds: {} denied, keeping the other listing", operation);
                Some(FetchError::Request(format!("{} not authorized: {}", operation, msg)))
            }
            other => other,
        };
        result.merge(FetchOutcome {
            records: listing.records,
            warnings: listing.warnings,
            failure,
        });
    }
    result
}

fn rds_instance_record(instance: &aws_sdk_rds::types::DbInstance) -> RawRecord {
    RawRecord::new("instance")
        .with("DBInstanceArn", instance.db_instance_arn())
        .with("DBInstanceIdentifier", instance.db_instance_identifier())
        .with("Engine", instance.engine())
        .with("EngineVersion", instance.engine_version())
        .with("DBInstanceClass", instance.db_instance_class())
        .with("DBInstanceStatus", instance.db_instance_status())
        .with("DBClusterIdentifier", instance.db_cluster_identifier())
        .with("Endpoint", instance.endpoint().and_then(|e| e.address()))
        .with("Port", instance.endpoint().and_then(|e| e.port()))
        .with("MultiAZ", instance.multi_az())
        .with("AvailabilityZone", instance.availability_zone())
        .with("AllocatedStorage", instance.allocated_storage())
        .with("StorageType", instance.storage_type())
        .with("StorageEncrypted", instance.storage_encrypted())
        .with("PubliclyAccessible", instance.publicly_accessible())
        .with("DeletionProtection", instance.deletion_protection())
        .with(
            "VpcId",
            instance.db_subnet_group().and_then(|g| g.vpc_id()),
        )
        .with(
            "InstanceCreateTime",
            instance.instance_create_time().and_then(format_date),
        )
}

fn rds_cluster_record(cluster: &aws_sdk_rds::types::DbCluster) -> RawRecord {
    RawRecord::new("cluster")
        .with("DBClusterArn", cluster.db_cluster_arn())
        .with("DBClusterIdentifier", cluster.db_cluster_identifier())
        .with("Engine", cluster.engine())
        .with("EngineVersion", cluster.engine_version())
        .with("Status", cluster.status())
        .with("MemberCount", cluster.db_cluster_members().len())
        .with("EngineMode", cluster.engine_mode())
        .with("Endpoint", cluster.endpoint())
        .with("ReaderEndpoint", cluster.reader_endpoint())
        .with("Port", cluster.port())
        .with("MultiAZ", cluster.multi_az())
        .with("DatabaseName", cluster.database_name())
        .with("StorageEncrypted", cluster.storage_encrypted())
        .with("DeletionProtection", cluster.deletion_protection())
        .with(
            "ClusterCreateTime",
            cluster.cluster_create_time().and_then(format_date),
        )
}

// =============================================================================
// API Gateway
// =============================================================================

pub async fn fetch_apigateway(
    client: &aws_sdk_apigateway::Client,
    ctx: &FetchContext,
) -> FetchOutcome {
    let (records, failure) = fetch_all_pages(ctx, "apigateway", |position| async move {
        let output = client
            .get_rest_apis()
            .set_position(position)
            .limit(APIGATEWAY_PAGE_SIZE)
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;

        Ok::<_, FetchError>(PaginatedResult {
            items: output.items().iter().map(apigateway_record).collect(),
            next_token: output.position().map(|s| s.to_string()),
        })
    })
    .await;

    outcome(records, failure)
}

fn apigateway_record(api: &aws_sdk_apigateway::types::RestApi) -> RawRecord {
    RawRecord::new("rest_api")
        .with("id", api.id())
        .with("name", api.name())
        .with("description", api.description().filter(|d| !d.is_empty()))
        .with("createdDate", api.created_date().and_then(format_date))
        .with("version", api.version())
        .with(
            "endpointTypes",
            non_empty(
                api.endpoint_configuration()
                    .map(|c| c.types())
                    .unwrap_or_default()
                    .iter()
                    .map(|t| t.as_str().to_string()),
            ),
        )
        .with("apiKeySource", api.api_key_source().map(|s| s.as_str()))
        .with(
            "tags",
            api.tags()
                .filter(|t| !t.is_empty())
                .and_then(|t| serde_json::to_value(t).ok()),
        )
}

// =============================================================================
// Helper Functions
// =============================================================================

/// SDK getters return `&T` for required members and `Option<&T>` for
/// optional ones; this accepts either.
trait Member<'a, T: ?Sized> {
    fn member(self) -> Option<&'a T>;
}

impl<'a, T: ?Sized> Member<'a, T> for &'a T {
    fn member(self) -> Option<&'a T> {
        Some(self)
    }
}

impl<'a, T: ?Sized> Member<'a, T> for Option<&'a T> {
    fn member(self) -> Option<&'a T> {
        self
    }
}

fn member<'a, T: ?Sized>(value: impl Member<'a, T>) -> Option<&'a T> {
    value.member()
}

/// List-valued field, absent when empty
fn non_empty(values: impl Iterator<Item = String>) -> Option<Vec<String>> {
    let values: Vec<String> = values.collect();
    (!values.is_empty()).then_some(values)
}

/// RFC 3339 timestamp
fn format_date(date: &DateTime) -> Option<String> {
    date.fmt(Format::DateTime).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::environment::Environment;
    use crate::resource::fetcher::normalize;

    #[test]
    fn test_queue_name_from_url() {
        assert_eq!(
            queue_name("https://sqs.eu-west-1.amazonaws.com/123456789012/orders-prod").as_deref(),
            Some("orders-prod")
        );
        assert_eq!(
            queue_name("https://sqs.eu-west-1.amazonaws.com/123456789012/jobs.fifo/").as_deref(),
            Some("jobs.fifo")
        );
        assert_eq!(queue_name("not a url/events").as_deref(), Some("events"));
    }

    #[test]
    fn test_sqs_record_normalizes() {
        let record = sqs_record("https://sqs.us-east-1.amazonaws.com/1/billing-staging.fifo");
        let resource = normalize(Service::Sqs, record, "us-east-1").unwrap();
        assert_eq!(resource.name, "billing-staging.fifo");
        assert_eq!(resource.environment, Environment::Stage);
        assert_eq!(resource.metadata["FifoQueue"], true);
    }

    #[test]
    fn test_lambda_record_fields() {
        let function = aws_sdk_lambda::types::FunctionConfiguration::builder()
            .function_name("svc-dev-auth")
            .function_arn("arn:aws:lambda:us-east-1:1:function:svc-dev-auth")
            .runtime(aws_sdk_lambda::types::Runtime::from("nodejs20.x"))
            .memory_size(128)
            .description("")
            .build();

        let record = lambda_record(&function);
        assert_eq!(record.kind, "function");
        assert_eq!(record.fields["Runtime"], "nodejs20.x");
        assert_eq!(record.fields["MemorySize"], 128);
        assert!(!record.fields.contains_key("Description"));
        assert!(!record.fields.contains_key("Handler"));
    }

    #[test]
    fn test_rds_cluster_uses_cluster_template() {
        let cluster = aws_sdk_rds::types::DbCluster::builder()
            .db_cluster_identifier("orders-prod")
            .db_cluster_arn("arn:aws:rds:us-east-1:1:cluster:orders-prod")
            .engine("aurora-postgresql")
            .build();

        let resource = normalize(Service::Rds, rds_cluster_record(&cluster), "us-east-1").unwrap();
        assert_eq!(resource.console_path_template_key, "cluster");
        assert_eq!(resource.metadata["MemberCount"], 0);
        assert_eq!(resource.environment, Environment::Prod);
    }

    #[test]
    fn test_apigateway_record_uses_api_id() {
        let api = aws_sdk_apigateway::types::RestApi::builder()
            .id("a1b2c3")
            .name("public-api")
            .build();

        let resource = normalize(Service::Apigateway, apigateway_record(&api), "us-east-1").unwrap();
        assert_eq!(resource.id, "a1b2c3");
        assert_eq!(resource.name, "public-api");
        assert_eq!(resource.environment, Environment::Unknown);
    }

    #[test]
    fn test_rds_instance_record_keeps_connection_details() {
        let instance = aws_sdk_rds::types::DbInstance::builder()
            .db_instance_identifier("billing-dev")
            .db_instance_arn("arn:aws:rds:us-east-1:1:db:billing-dev")
            .endpoint(
                aws_sdk_rds::types::Endpoint::builder()
                    .address("billing-dev.abc.us-east-1.rds.amazonaws.com")
                    .port(5432)
                    .build(),
            )
            .multi_az(true)
            .build();

        let record = rds_instance_record(&instance);
        assert_eq!(
            record.fields["Endpoint"],
            "billing-dev.abc.us-east-1.rds.amazonaws.com"
        );
        assert_eq!(record.fields["Port"], 5432);
        assert_eq!(record.fields["MultiAZ"], true);
    }

    fn listing(names: &[&str], failure: Option<FetchError>) -> FetchOutcome {
        FetchOutcome {
            records: names
                .iter()
                .map(|n| {
                    RawRecord::new("cluster")
                        .with("DBClusterArn", format!("arn:aws:rds:us-east-1:1:cluster:{}", n))
                        .with("DBClusterIdentifier", *n)
                })
                .collect(),
            warnings: vec![],
            failure,
        }
    }

    #[test]
    fn test_rds_denied_listing_keeps_the_other() {
        let merged = merge_rds_listings(
            listing(&[], Some(FetchError::Unauthorized("AccessDenied".into()))),
            listing(&["orders-prod"], None),
        );

        assert_eq!(merged.records.len(), 1);
        match merged.failure {
            Some(FetchError::Request(msg)) => assert!(msg.contains("DescribeDBInstances")),
            other => panic!("expected a downgraded failure, got {:?}", other),
        }
    }

    #[test]
    fn test_rds_both_listings_denied_is_unauthorized() {
        let merged = merge_rds_listings(
            listing(&[], Some(FetchError::Unauthorized("AccessDenied".into()))),
            listing(&[], Some(FetchError::Unauthorized("AccessDenied".into()))),
        );
        assert!(matches!(merged.failure, Some(FetchError::Unauthorized(_))));
    }

    #[test]
    fn test_rds_first_failure_wins() {
        let merged = merge_rds_listings(
            listing(&["a"], Some(FetchError::Throttled("slow".into()))),
            listing(&["b"], Some(FetchError::Unauthorized("AccessDenied".into()))),
        );
        assert_eq!(merged.records.len(), 2);
        assert!(matches!(merged.failure, Some(FetchError::Throttled(_))));
    }

    #[test]
    fn test_member_accepts_both_shapes() {
        let value = String::from("x");
        assert_eq!(member(value.as_str()), Some("x"));
        assert_eq!(member(Some(value.as_str())), Some("x"));
        assert_eq!(member(None::<&str>), None);
    }
}
