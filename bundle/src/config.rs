use bundle_model::constants::{DEFAULT_IMAGE_PULL_POLICY, DEFAULT_NAMESPACE, DEFAULT_SANDBOX_ROLE};
use bundle_runtime::ProxyConfig;
use serde::{Deserialize, Serialize};

/// How an [`Executor`](crate::Executor) runs bundles.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExecutorConfig {
    /// Run the bundle pod in the instance's own namespace instead of a generated one.
    pub skip_create_ns: bool,
    /// The cluster role the sandbox service account is bound to.
    pub sandbox_role: String,
    /// The broker namespace. Secrets are copied from here and credentials are stored here.
    pub namespace: String,
    pub keep_namespace: bool,
    pub keep_namespace_on_error: bool,
    pub image_pull_policy: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxyConfig>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            skip_create_ns: false,
            sandbox_role: DEFAULT_SANDBOX_ROLE.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            keep_namespace: false,
            keep_namespace_on_error: false,
            image_pull_policy: DEFAULT_IMAGE_PULL_POLICY.to_string(),
            proxy: None,
        }
    }
}

impl ExecutorConfig {
    /// The default configuration with the proxy taken from the environment.
    pub fn from_env() -> Self {
        Self {
            proxy: ProxyConfig::from_env(),
            ..Self::default()
        }
    }
}
