//! Search front-end glue
//!
//! Renders index entries as tab-delimited lines for an external fuzzy
//! matcher, maps a selected line back to its resource, and implements the
//! plain substring search with "did you mean" suggestions.

use crate::resource::model::{Resource, ResourceIndex, ResourceKey, Service};
use crate::resource::registry::get_service;

/// Maximum number of suggestions offered for a query without matches
const MAX_SUGGESTIONS: usize = 3;
/// Minimum similarity (0..1) for a name to be suggested
const SUGGESTION_CUTOFF: f64 = 0.3;

/// A parsed search query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub service: Option<Service>,
    pub text: Option<String>,
}

/// Parse `[SERVICE] [WORDS...]`
///
/// The first word selects a service only if it is a service tag.
pub fn parse_query(args: &[String]) -> Query {
    let (service, words) = match args.split_first() {
        Some((first, rest)) => match first.parse::<Service>() {
            Ok(service) => (Some(service), rest),
            Err(_) => (None, args),
        },
        None => (None, args),
    };

    let text = words.join(" ").trim().to_string();
    Query {
        service,
        text: (!text.is_empty()).then_some(text),
    }
}

/// Resources of enabled services, optionally narrowed to one service
pub fn visible_resources<'a>(
    index: &'a ResourceIndex,
    enabled: &[Service],
    service: Option<Service>,
) -> Vec<&'a Resource> {
    index
        .resources
        .iter()
        .filter(|r| enabled.contains(&r.service))
        .filter(|r| service.map_or(true, |s| r.service == s))
        .collect()
}

/// Case-insensitive substring match on the resource name
pub fn matches(resource: &Resource, text: &str) -> bool {
    resource.name.to_lowercase().contains(&text.to_lowercase())
}

/// Names most similar to `text`, best first
pub fn suggestions<'a>(resources: &[&'a Resource], text: &str) -> Vec<&'a Resource> {
    let text = text.to_lowercase();
    let mut scored: Vec<(f64, &Resource)> = resources
        .iter()
        .map(|r| (strsim::normalized_levenshtein(&r.name.to_lowercase(), &text), *r))
        .filter(|(score, _)| *score >= SUGGESTION_CUTOFF)
        .collect();

    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.name.cmp(&b.1.name)));
    scored.dedup_by(|a, b| a.1.name == b.1.name);
    scored
        .into_iter()
        .take(MAX_SUGGESTIONS)
        .map(|(_, r)| r)
        .collect()
}

/// Service column: icon, display name and kind label
pub fn service_display(resource: &Resource) -> String {
    let Some(def) = get_service(resource.service) else {
        return resource.service.to_string();
    };

    let label = def
        .kinds
        .get(&resource.console_path_template_key)
        .and_then(|k| k.label.as_deref());

    match label {
        Some(label) => format!("{} {} {}", def.icon, def.display_name, label),
        None => format!("{} {}", def.icon, def.display_name),
    }
}

/// One matcher line: name, service, environment, `service:id` token
pub fn render_line(resource: &Resource) -> String {
    format!(
        "{}\t{}\t{}\t{}",
        clean(&resource.name),
        service_display(resource),
        resource.environment.indicator(),
        clean(&resource.key().to_string())
    )
}

/// Lines for a set of resources, sorted by name
pub fn render_lines(resources: &[&Resource]) -> Vec<String> {
    let mut sorted: Vec<&Resource> = resources.to_vec();
    sorted.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.key().cmp(&b.key()))
    });
    sorted.into_iter().map(render_line).collect()
}

/// Recover the resource identity from a selected line
pub fn parse_selection(line: &str) -> Option<ResourceKey> {
    let token = line.trim_end_matches(['\r', '\n']).rsplit('\t').next()?;
    let (service, id) = token.split_once(':')?;
    let service = service.parse::<Service>().ok()?;
    (!id.is_empty()).then(|| ResourceKey {
        service,
        id: id.to_string(),
    })
}

/// Find the resource a selected line refers to
pub fn resolve_selection<'a>(index: &'a ResourceIndex, line: &str) -> Option<&'a Resource> {
    let key = parse_selection(line)?;
    index.find(key.service, &key.id)
}

/// Tabs and newlines would break the line format
fn clean(value: &str) -> String {
    value.replace(['\t', '\n', '\r'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::environment::classify;
    use std::collections::BTreeMap;

    fn resource(service: Service, id: &str, name: &str, key: &str) -> Resource {
        Resource {
            id: id.to_string(),
            name: name.to_string(),
            service,
            region: Some("us-east-1".to_string()),
            environment: classify(name),
            metadata: BTreeMap::new(),
            console_path_template_key: key.to_string(),
        }
    }

    fn args(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_parse_query_with_service() {
        let q = parse_query(&args(&["Lambda", "auth", "svc"]));
        assert_eq!(q.service, Some(Service::Lambda));
        assert_eq!(q.text.as_deref(), Some("auth svc"));
    }

    #[test]
    fn test_parse_query_without_service() {
        let q = parse_query(&args(&["orders", "queue"]));
        assert_eq!(q.service, None);
        assert_eq!(q.text.as_deref(), Some("orders queue"));

        assert_eq!(parse_query(&args(&["s3"])), Query { service: Some(Service::S3), text: None });
        assert_eq!(parse_query(&[]), Query::default());
    }

    #[test]
    fn test_visible_resources_respects_enabled_and_filter() {
        let mut index = ResourceIndex::new("us-east-1", None);
        index.resources = vec![
            resource(Service::Lambda, "arn:1", "a", "function"),
            resource(Service::S3, "b", "b", "bucket"),
            resource(Service::Sqs, "https://q/c", "c", "queue"),
        ];

        let enabled = [Service::Lambda, Service::S3];
        assert_eq!(visible_resources(&index, &enabled, None).len(), 2);
        assert_eq!(visible_resources(&index, &enabled, Some(Service::S3)).len(), 1);
        assert!(visible_resources(&index, &enabled, Some(Service::Sqs)).is_empty());
    }

    #[test]
    fn test_matches_case_insensitive() {
        let r = resource(Service::Lambda, "arn", "Svc-Prod-Auth", "function");
        assert!(matches(&r, "prod-auth"));
        assert!(!matches(&r, "billing"));
    }

    #[test]
    fn test_suggestions_ranked_and_capped() {
        let all = [
            resource(Service::Lambda, "1", "payment-service", "function"),
            resource(Service::Lambda, "2", "payments-service", "function"),
            resource(Service::Lambda, "3", "payment-svc", "function"),
            resource(Service::Lambda, "4", "payment-servic", "function"),
            resource(Service::Lambda, "5", "zzzz", "function"),
        ];
        let refs: Vec<&Resource> = all.iter().collect();

        let found = suggestions(&refs, "paymnt-service");
        assert_eq!(found.len(), 3);
        assert_eq!(found[0].name, "payment-service");
        assert!(found.iter().all(|r| r.name != "zzzz"));
    }

    #[test]
    fn test_render_line_and_parse_back() {
        let r = resource(Service::Rds, "arn:aws:rds:us-east-1:1:cluster:orders-prod", "orders-prod", "cluster");
        let line = render_line(&r);

        let fields: Vec<&str> = line.split('\t').collect();
        assert_eq!(fields.len(), 4);
        assert_eq!(fields[0], "orders-prod");
        assert!(fields[1].ends_with("RDS Cluster"));
        assert_eq!(fields[2], "🟢 PROD");

        let key = parse_selection(&format!("{}\n", line)).unwrap();
        assert_eq!(key, r.key());
    }

    #[test]
    fn test_render_lines_sorted_by_name() {
        let a = resource(Service::S3, "zeta", "zeta", "bucket");
        let b = resource(Service::S3, "Alpha", "Alpha", "bucket");
        let lines = render_lines(&[&a, &b]);
        assert!(lines[0].starts_with("Alpha\t"));
    }

    #[test]
    fn test_parse_selection_rejects_garbage() {
        assert!(parse_selection("no tabs here").is_none());
        assert!(parse_selection("name\tsvc\tenv\tiam:thing").is_none());
        assert!(parse_selection("name\tsvc\tenv\tlambda:").is_none());
    }

    #[test]
    fn test_resolve_selection() {
        let mut index = ResourceIndex::new("us-east-1", None);
        index.resources = vec![resource(Service::Sqs, "https://sqs/1/jobs", "jobs", "queue")];
        let line = render_line(&index.resources[0]);
        assert_eq!(resolve_selection(&index, &line).unwrap().name, "jobs");
    }
}
