//! Service Registry - Load service definitions from JSON
//!
//! Every supported service is described in an embedded JSON file: how to
//! display it, which raw fields hold the id and name of each resource kind,
//! and the console URL template for that kind.

use super::model::Service;
use crate::config::ConfigError;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Embedded service definitions (compiled into the binary)
const SERVICES_JSON: &str = include_str!("../resources/services.json");

/// Placeholders a console URL template may use
pub const PLACEHOLDERS: &[&str] = &["region", "id", "name", "id_encoded", "name_encoded"];

/// One kind of resource within a service (e.g. RDS instance vs cluster)
#[derive(Debug, Clone, Deserialize)]
pub struct KindDef {
    /// Raw field holding the unique id
    pub id_field: String,
    /// Raw field holding the display name
    pub name_field: String,
    /// Suffix shown after the service name in search results
    #[serde(default)]
    pub label: Option<String>,
    pub console_url: String,
}

/// Service definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceDef {
    pub display_name: String,
    pub icon: String,
    /// Global services have no region on their resources
    #[serde(default)]
    pub is_global: bool,
    pub kinds: HashMap<String, KindDef>,
}

/// Root structure of resources/services.json
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceRegistry {
    pub services: HashMap<Service, ServiceDef>,
}

/// Global registry loaded from JSON
static REGISTRY: OnceLock<ServiceRegistry> = OnceLock::new();

/// Get the service registry (loads from embedded JSON on first access)
pub fn get_registry() -> &'static ServiceRegistry {
    REGISTRY.get_or_init(|| {
        serde_json::from_str(SERVICES_JSON)
            .unwrap_or_else(|e| panic!("Failed to parse embedded service JSON: {}", e))
    })
}

/// Get a service definition
pub fn get_service(service: Service) -> Option<&'static ServiceDef> {
    get_registry().services.get(&service)
}

/// Get a resource kind definition
pub fn get_kind(service: Service, key: &str) -> Option<&'static KindDef> {
    get_service(service)?.kinds.get(key)
}

/// Check that every service has a definition and every template is usable
pub fn validate_registry() -> Result<(), ConfigError> {
    for service in Service::ALL {
        let def = get_service(service).ok_or_else(|| ConfigError::MissingTemplate {
            service,
            key: "*".to_string(),
        })?;

        if def.kinds.is_empty() {
            return Err(ConfigError::MissingTemplate {
                service,
                key: "*".to_string(),
            });
        }

        for (key, kind) in &def.kinds {
            validate_template(&kind.console_url).map_err(|reason| {
                ConfigError::InvalidTemplate {
                    service,
                    key: key.clone(),
                    reason,
                }
            })?;
        }
    }
    Ok(())
}

/// Check a template's placeholders and scheme
pub fn validate_template(template: &str) -> Result<(), String> {
    if !template.starts_with("https://") {
        return Err("must start with https://".to_string());
    }

    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        let end = after
            .find('}')
            .ok_or_else(|| "unterminated placeholder".to_string())?;
        let name = &after[..end];
        if !PLACEHOLDERS.contains(&name) {
            return Err(format!("unknown placeholder {{{}}}", name));
        }
        rest = &after[end + 1..];
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_loads_successfully() {
        assert_eq!(get_registry().services.len(), Service::ALL.len());
        validate_registry().unwrap();
    }

    #[test]
    fn test_rds_has_instance_and_cluster() {
        let rds = get_service(Service::Rds).unwrap();
        assert_eq!(rds.display_name, "RDS");
        assert!(get_kind(Service::Rds, "instance").is_some());
        assert_eq!(
            get_kind(Service::Rds, "cluster").unwrap().label.as_deref(),
            Some("Cluster")
        );
    }

    #[test]
    fn test_s3_is_global() {
        assert!(get_service(Service::S3).unwrap().is_global);
        assert!(!get_service(Service::Lambda).unwrap().is_global);
    }

    #[test]
    fn test_unknown_kind() {
        assert!(get_kind(Service::Lambda, "layer").is_none());
    }

    #[test]
    fn test_validate_template() {
        assert!(validate_template("https://x/{region}/{id_encoded}").is_ok());
        assert!(validate_template("https://x/{account}").is_err());
        assert!(validate_template("https://x/{region").is_err());
        assert!(validate_template("http://x/{region}").is_err());
    }
}
