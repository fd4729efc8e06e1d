//! Environment Classifier
//!
//! Infers a deployment environment from a resource name. Names are matched
//! case-insensitively against marker substrings; when a name carries markers
//! for several environments, the most critical one wins (prod, then stage,
//! then dev).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Deployment environment inferred from a resource name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Prod,
    Stage,
    Dev,
    #[default]
    Unknown,
}

/// Marker table, in precedence order. The first environment with any marker
/// present in the name is the result.
const MARKERS: &[(Environment, &[&str])] = &[
    (Environment::Prod, &["prod", "production"]),
    (Environment::Stage, &["stag", "stage", "staging"]),
    (Environment::Dev, &["dev", "development"]),
];

/// Classify a resource name into an environment
pub fn classify(name: &str) -> Environment {
    let name = name.to_lowercase();

    MARKERS
        .iter()
        .find(|(_, markers)| markers.iter().any(|m| name.contains(m)))
        .map(|(env, _)| *env)
        .unwrap_or(Environment::Unknown)
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prod => "prod",
            Self::Stage => "stage",
            Self::Dev => "dev",
            Self::Unknown => "unknown",
        }
    }

    /// Indicator shown next to a resource in search results
    pub fn indicator(&self) -> &'static str {
        match self {
            Self::Prod => "🟢 PROD",
            Self::Stage => "🟡 STAGE",
            Self::Dev => "🔵 DEV",
            Self::Unknown => "⚪ OTHER",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
