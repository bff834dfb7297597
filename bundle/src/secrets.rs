use bundle_model::{Plan, Spec};
use log::debug;
use serde::{Deserialize, Serialize};
use snafu::{ensure, Snafu};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A secret configuration entry is missing a field.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SecretsError {
    #[snafu(display("Secret rule '{}' has no {}", name, field))]
    MissingField { name: String, field: &'static str },
}

/// Secret `secret` in the broker namespace is given to every run of bundle `bundle_name`.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociationRule {
    pub bundle_name: String,
    pub secret: String,
}

/// One entry of the broker's `secrets` configuration.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SecretsConfig {
    pub name: String,
    pub bundle_name: String,
    pub secret: String,
}

impl SecretsConfig {
    pub fn validate(&self) -> Result<(), SecretsError> {
        ensure!(
            !self.name.is_empty(),
            MissingFieldSnafu {
                name: "<unnamed>",
                field: "name"
            }
        );
        ensure!(
            !self.bundle_name.is_empty(),
            MissingFieldSnafu {
                name: &self.name,
                field: "bundle name"
            }
        );
        ensure!(
            !self.secret.is_empty(),
            MissingFieldSnafu {
                name: &self.name,
                field: "secret"
            }
        );
        Ok(())
    }
}

/// The secrets to mount into bundle pods, by bundle. Shared by every executor, so reads and writes
/// go through a lock.
#[derive(Debug, Default)]
pub struct SecretsCache {
    rules: RwLock<Vec<AssociationRule>>,
}

impl SecretsCache {
    /// Builds a cache from the broker configuration, rejecting incomplete entries.
    pub fn new(configs: &[SecretsConfig]) -> Result<Self, SecretsError> {
        let cache = Self::default();
        for config in configs {
            config.validate()?;
            cache.add_rule(AssociationRule {
                bundle_name: config.bundle_name.clone(),
                secret: config.secret.clone(),
            });
        }
        Ok(cache)
    }

    pub fn add_rule(&self, rule: AssociationRule) {
        let mut rules = self.write();
        if !rules.contains(&rule) {
            debug!(
                "Associating secret '{}' with bundle '{}'",
                rule.secret, rule.bundle_name
            );
            rules.push(rule);
        }
    }

    pub fn remove_rule(&self, rule: &AssociationRule) {
        self.write().retain(|existing| existing != rule);
    }

    pub fn rules(&self) -> Vec<AssociationRule> {
        self.read().clone()
    }

    /// The secrets associated with `spec`.
    pub fn get_secrets(&self, spec: &Spec) -> Vec<String> {
        self.read()
            .iter()
            .filter(|rule| rule.bundle_name == spec.fq_name)
            .map(|rule| rule.secret.clone())
            .collect()
    }

    // A writer that panicked leaves the rules intact, so a poisoned lock is still usable.
    fn read(&self) -> RwLockReadGuard<'_, Vec<AssociationRule>> {
        self.rules
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<AssociationRule>> {
        self.rules
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Removes the parameters that secrets supply from the plans shown to users. `secret_keys` are the
/// keys of the secrets associated with the bundle.
pub fn filter_secret_parameters(plans: &mut [Plan], secret_keys: &[String]) {
    for plan in plans {
        plan.parameters
            .retain(|parameter| !secret_keys.contains(&parameter.name));
    }
}
