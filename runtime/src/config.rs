use crate::SandboxHook;
use bundle_model::constants::{DEFAULT_NAMESPACE, DEFAULT_STATE_MOUNT_LOCATION};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;

/// Settings for [`KubeRuntime`](crate::KubeRuntime).
#[derive(Clone)]
pub struct RuntimeConfig {
    /// The namespace holding master state and extracted credentials.
    pub state_namespace: String,
    /// Where bundle pods find their state on disk.
    pub state_mount_location: String,
    /// How often a running bundle pod is checked.
    pub watch_interval: Duration,
    /// How many consecutive failures to read a running pod are tolerated.
    pub watch_retries: u32,
    pub hooks: Vec<Arc<dyn SandboxHook>>,
}

impl RuntimeConfig {
    pub fn with_hook(mut self, hook: Arc<dyn SandboxHook>) -> Self {
        self.hooks.push(hook);
        self
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            state_namespace: DEFAULT_NAMESPACE.to_string(),
            state_mount_location: DEFAULT_STATE_MOUNT_LOCATION.to_string(),
            watch_interval: Duration::from_secs(5),
            watch_retries: 5,
            hooks: Vec::new(),
        }
    }
}

impl Debug for RuntimeConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeConfig")
            .field("state_namespace", &self.state_namespace)
            .field("state_mount_location", &self.state_mount_location)
            .field("watch_interval", &self.watch_interval)
            .field("watch_retries", &self.watch_retries)
            .field(
                "hooks",
                &self.hooks.iter().map(|hook| hook.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
