use bundle_model::Action;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything needed to start one bundle pod. The executor fills it in and the runtime returns it
/// once the pod has been submitted.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionContext {
    /// The name of the bundle pod.
    pub pod_name: String,
    /// The namespace the pod runs in.
    pub location: String,
    /// The namespaces the bundle is allowed to act on.
    pub targets: Vec<String>,
    /// Secrets to mount into the pod.
    pub secrets: Vec<String>,
    pub service_account: String,
    pub image: String,
    pub action: Action,
    pub image_pull_policy: String,
    /// JSON object passed to the bundle as `--extra-vars`.
    pub extra_vars: String,
    pub proxy: Option<ProxyConfig>,
    /// The master name of the instance's state.
    pub state_name: String,
    /// The namespace holding the instance's master state.
    pub state_location: String,
    /// Whether the instance already had persisted state when the action started.
    pub state_present: bool,
    pub metadata: BTreeMap<String, String>,
}

/// Proxy settings passed on to bundle pods.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    pub http_proxy: String,
    pub https_proxy: String,
    pub no_proxy: String,
}

impl ProxyConfig {
    /// Reads `HTTP_PROXY`, `HTTPS_PROXY` and `NO_PROXY` from the environment.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Returns `None` unless an HTTP or HTTPS proxy is set. `NO_PROXY` on its own means nothing.
    pub fn from_lookup<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).unwrap_or_default();
        let config = Self {
            http_proxy: read("HTTP_PROXY"),
            https_proxy: read("HTTPS_PROXY"),
            no_proxy: read("NO_PROXY"),
        };
        if config.http_proxy.is_empty() && config.https_proxy.is_empty() {
            None
        } else {
            Some(config)
        }
    }

    /// The environment variables to set in a bundle pod. Tools disagree on the case of proxy
    /// variables so both are set.
    pub fn env_vars(&self) -> Vec<(String, String)> {
        [
            ("HTTP_PROXY", &self.http_proxy),
            ("HTTPS_PROXY", &self.https_proxy),
            ("NO_PROXY", &self.no_proxy),
        ]
        .iter()
        .flat_map(|(name, value)| {
            [
                (name.to_string(), value.to_string()),
                (name.to_lowercase(), value.to_string()),
            ]
        })
        .collect()
    }
}
