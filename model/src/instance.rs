use crate::{Parameters, Spec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// The kind of cluster a service instance is deployed to.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Kubernetes,
    Openshift,
}

serde_plain::derive_display_from_serialize!(Platform);
serde_plain::derive_fromstr_from_deserialize!(Platform);

/// Where a service instance lives.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Context {
    pub platform: Platform,
    pub namespace: String,
}

/// An active deployment of a bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInstance {
    pub id: Uuid,
    pub spec: Spec,
    pub context: Context,
    #[serde(default)]
    pub parameters: Parameters,
    /// Binding id to `true` while the binding is active, `false` once it is being removed.
    #[serde(default)]
    pub binding_ids: BTreeMap<String, bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dashboard_url: Option<String>,
}

impl ServiceInstance {
    pub fn new(spec: Spec, context: Context, parameters: Parameters) -> Self {
        Self {
            id: Uuid::new_v4(),
            spec,
            context,
            parameters,
            binding_ids: BTreeMap::new(),
            dashboard_url: None,
        }
    }

    pub fn add_binding<S: Into<String>>(&mut self, binding_id: S) {
        self.binding_ids.insert(binding_id.into(), true);
    }

    /// Marks the binding as being removed. The entry itself is kept until the broker forgets the
    /// binding.
    pub fn remove_binding<S: Into<String>>(&mut self, binding_id: S) {
        self.binding_ids.insert(binding_id.into(), false);
    }
}

/// A binding of a service instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindInstance {
    pub id: Uuid,
    pub service_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Parameters>,
}

impl BindInstance {
    /// The binding parameters without the reserved keys, or `None` if the binding has none.
    pub fn user_parameters(&self) -> Option<Parameters> {
        self.parameters.as_ref().map(Parameters::user_parameters)
    }
}
