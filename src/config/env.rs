//! Environment variable snapshot used by the settings resolver.

use std::collections::HashMap;

pub const ENV_PROVIDER: &str = "SECRETS_PROVIDER";
pub const ENV_GCP_PROJECT_ID: &str = "GCP_PROJECT_ID";
pub const ENV_GOOGLE_CLOUD_PROJECT: &str = "GOOGLE_CLOUD_PROJECT";
pub const ENV_AWS_REGION: &str = "AWS_REGION";
pub const ENV_STORE_NAME: &str = "SECRETS_STORE_NAME";
pub const ENV_ROOT: &str = "SECRETS_ROOT";
pub const ENV_KEY_DIR: &str = "SECRETS_KEY_DIR";
pub const ENV_KUBECONFIG: &str = "KUBECONFIG";
pub const ENV_GCP_ENDPOINT: &str = "GCP_SECRET_MANAGER_ENDPOINT";
pub const ENV_HOME: &str = "HOME";

/// Captured environment
///
/// Captured once so resolution is consistent for the whole run and tests can supply
/// their own variables without touching the process environment.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: HashMap<String, String>,
}

impl Environment {
    /// Snapshot the process environment
    #[must_use]
    pub fn capture() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    #[must_use]
    pub fn from_pairs<K: Into<String>, V: Into<String>>(
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Non-empty value of `key`
    #[must_use]
    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// First non-empty value among `keys`, with the key it came from
    #[must_use]
    pub fn first_of<'a>(&'a self, keys: &[&'static str]) -> Option<(&'static str, &'a str)> {
        keys.iter().find_map(|k| self.var(k).map(|v| (*k, v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_values_are_ignored() {
        let env = Environment::from_pairs([(ENV_GCP_PROJECT_ID, "  "), (ENV_GOOGLE_CLOUD_PROJECT, "p2")]);
        assert_eq!(env.var(ENV_GCP_PROJECT_ID), None);
        assert_eq!(
            env.first_of(&[ENV_GCP_PROJECT_ID, ENV_GOOGLE_CLOUD_PROJECT]),
            Some((ENV_GOOGLE_CLOUD_PROJECT, "p2"))
        );
    }
}
