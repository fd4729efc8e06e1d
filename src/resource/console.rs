//! Console URL Resolver
//!
//! Fills the registry's console URL template for a resource. Templates are
//! validated at startup, so a failure here means the registry and the
//! resource disagree on the template key.

use super::model::Resource;
use super::registry::get_kind;
use crate::config::ConfigError;

/// Build the console deep link for a resource
///
/// `region` is used for global services too; their consoles still take a
/// region parameter.
pub fn resolve(resource: &Resource, region: &str) -> Result<String, ConfigError> {
    let kind = get_kind(resource.service, &resource.console_path_template_key).ok_or_else(|| {
        ConfigError::MissingTemplate {
            service: resource.service,
            key: resource.console_path_template_key.clone(),
        }
    })?;

    let region = resource.region.as_deref().unwrap_or(region);
    let invalid = |reason: String| ConfigError::InvalidTemplate {
        service: resource.service,
        key: resource.console_path_template_key.clone(),
        reason,
    };

    // Single pass, so substituted values are never re-expanded
    let mut url = String::with_capacity(kind.console_url.len() + resource.id.len());
    let mut rest = kind.console_url.as_str();
    while let Some(start) = rest.find('{') {
        url.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after
            .find('}')
            .ok_or_else(|| invalid("unterminated placeholder".to_string()))?;

        match &after[..end] {
            "region" => url.push_str(region),
            "id" => url.push_str(&resource.id),
            "name" => url.push_str(&resource.name),
            "id_encoded" => url.push_str(&urlencoding::encode(&resource.id)),
            "name_encoded" => url.push_str(&urlencoding::encode(&resource.name)),
            other => return Err(invalid(format!("unknown placeholder {{{}}}", other))),
        }
        rest = &after[end + 1..];
    }
    url.push_str(rest);

    Ok(url)
}
