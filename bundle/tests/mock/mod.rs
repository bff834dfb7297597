/*!

A [`Runtime`] that keeps everything in memory, records the calls made to it and can be told to fail
any of them. Shared by the executor tests.

!*/

#![allow(dead_code)]

use async_trait::async_trait;
use bundle::StatusMessage;
use bundle_model::{Context, Parameters, Platform, ServiceInstance, Spec};
use bundle_runtime::{
    Error, ExecutionContext, ExtractedCredentialStore, Result, Runtime, StateStore, UpdateFn,
};
use futures::StreamExt;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

pub const TARGET_NAMESPACE: &str = "target";
pub const BROKER_NAMESPACE: &str = "ansible-service-broker";
pub const CREDENTIALS: &[u8] = br#"{"db":"n","user":"u"}"#;

/// Appended by the mock to generated namespace prefixes, the way the API server would.
pub const GENERATED_SUFFIX: &str = "x7k2p";

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateSandbox {
        pod_name: String,
        namespace: String,
        targets: Vec<String>,
        role: String,
    },
    DestroySandbox {
        pod_name: String,
        namespace: String,
        secrets: Vec<String>,
        config_namespace: String,
    },
    CopySecrets {
        location: String,
        secrets: Vec<String>,
    },
    StateIsPresent {
        name: String,
    },
    RunBundle(Box<ExecutionContext>),
    Watch {
        pod_name: String,
        namespace: String,
    },
    CopyState {
        name: String,
        from_namespace: String,
        to_namespace: String,
    },
    DeleteState {
        name: String,
    },
    ExtractCredentials {
        runtime_version: u32,
    },
    CreateCredential {
        id: String,
        namespace: String,
        credentials: Map<String, Value>,
        labels: BTreeMap<String, String>,
    },
    UpdateCredential {
        id: String,
    },
    DeleteCredential {
        id: String,
    },
}

#[derive(Default)]
pub struct MockRuntime {
    failing: HashSet<&'static str>,
    credentials: Vec<u8>,
    state_present: bool,
    block_watch: bool,
    progress: Option<(String, String)>,
    /// Notified once the bundle is being watched.
    pub watch_started: Notify,
    calls: Mutex<Vec<Call>>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self {
            credentials: CREDENTIALS.to_vec(),
            ..Self::default()
        }
    }

    /// Makes the runtime call named `call` return an error.
    pub fn failing(mut self, call: &'static str) -> Self {
        self.failing.insert(call);
        self
    }

    pub fn with_credentials(mut self, payload: &[u8]) -> Self {
        self.credentials = payload.to_vec();
        self
    }

    pub fn with_state(mut self) -> Self {
        self.state_present = true;
        self
    }

    /// The watch reports `description` and `dashboard_url` before the bundle finishes.
    pub fn with_progress(mut self, description: &str, dashboard_url: &str) -> Self {
        self.progress = Some((description.to_string(), dashboard_url.to_string()));
        self
    }

    /// The watch only ends when it is cancelled.
    pub fn blocking_watch(mut self) -> Self {
        self.block_watch = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn destroy_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::DestroySandbox { .. }))
            .count()
    }

    pub fn created_sandbox(&self) -> Option<Call> {
        self.calls()
            .into_iter()
            .find(|call| matches!(call, Call::CreateSandbox { .. }))
    }

    pub fn run_context(&self) -> Option<ExecutionContext> {
        self.calls().into_iter().find_map(|call| match call {
            Call::RunBundle(context) => Some(*context),
            _ => None,
        })
    }

    fn record(&self, call: Call, name: &str) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        if self.failing.contains(name) {
            Err(Error::message(format!("{} failed", name)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StateStore for MockRuntime {
    fn master_name(&self, instance_id: &str) -> String {
        format!("{}-state", instance_id)
    }

    fn master_namespace(&self) -> String {
        BROKER_NAMESPACE.to_string()
    }

    fn mount_location(&self) -> String {
        "/var/tmp/bundle".to_string()
    }

    async fn state_is_present(&self, name: &str) -> Result<bool> {
        self.record(
            Call::StateIsPresent {
                name: name.to_string(),
            },
            "state_is_present",
        )?;
        Ok(self.state_present)
    }

    async fn copy_state(
        &self,
        from_name: &str,
        _to_name: &str,
        from_namespace: &str,
        to_namespace: &str,
    ) -> Result<()> {
        self.record(
            Call::CopyState {
                name: from_name.to_string(),
                from_namespace: from_namespace.to_string(),
                to_namespace: to_namespace.to_string(),
            },
            "copy_state",
        )
    }

    async fn delete_state(&self, name: &str) -> Result<()> {
        self.record(
            Call::DeleteState {
                name: name.to_string(),
            },
            "delete_state",
        )
    }
}

#[async_trait]
impl ExtractedCredentialStore for MockRuntime {
    async fn create_extracted_credential(
        &self,
        id: &str,
        namespace: &str,
        credentials: &Map<String, Value>,
        labels: &BTreeMap<String, String>,
    ) -> Result<()> {
        self.record(
            Call::CreateCredential {
                id: id.to_string(),
                namespace: namespace.to_string(),
                credentials: credentials.clone(),
                labels: labels.clone(),
            },
            "create_extracted_credential",
        )
    }

    async fn update_extracted_credential(
        &self,
        id: &str,
        _namespace: &str,
        _credentials: &Map<String, Value>,
        _labels: &BTreeMap<String, String>,
    ) -> Result<()> {
        self.record(
            Call::UpdateCredential { id: id.to_string() },
            "update_extracted_credential",
        )
    }

    async fn get_extracted_credential(
        &self,
        _id: &str,
        _namespace: &str,
    ) -> Result<Option<Map<String, Value>>> {
        Ok(None)
    }

    async fn delete_extracted_credential(&self, id: &str, _namespace: &str) -> Result<()> {
        self.record(
            Call::DeleteCredential { id: id.to_string() },
            "delete_extracted_credential",
        )
    }
}

#[async_trait]
impl Runtime for MockRuntime {
    async fn create_sandbox(
        &self,
        pod_name: &str,
        namespace: &str,
        targets: &[String],
        role: &str,
        _metadata: &BTreeMap<String, String>,
    ) -> Result<(String, String)> {
        self.record(
            Call::CreateSandbox {
                pod_name: pod_name.to_string(),
                namespace: namespace.to_string(),
                targets: targets.to_vec(),
                role: role.to_string(),
            },
            "create_sandbox",
        )?;
        let location = if targets.iter().any(|target| target == namespace) {
            namespace.to_string()
        } else {
            format!("{}{}", namespace, GENERATED_SUFFIX)
        };
        Ok((pod_name.to_string(), location))
    }

    async fn destroy_sandbox(
        &self,
        pod_name: &str,
        namespace: &str,
        _targets: &[String],
        secrets: &[String],
        config_namespace: &str,
        _keep_namespace: bool,
        _keep_namespace_on_error: bool,
    ) -> Result<()> {
        self.record(
            Call::DestroySandbox {
                pod_name: pod_name.to_string(),
                namespace: namespace.to_string(),
                secrets: secrets.to_vec(),
                config_namespace: config_namespace.to_string(),
            },
            "destroy_sandbox",
        )
    }

    async fn run_bundle(&self, context: ExecutionContext) -> Result<ExecutionContext> {
        self.record(Call::RunBundle(Box::new(context.clone())), "run_bundle")?;
        Ok(context)
    }

    async fn watch_running_bundle(
        &self,
        pod_name: &str,
        namespace: &str,
        update: UpdateFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.record(
            Call::Watch {
                pod_name: pod_name.to_string(),
                namespace: namespace.to_string(),
            },
            "watch_running_bundle",
        )?;
        self.watch_started.notify_one();
        if let Some((description, dashboard_url)) = &self.progress {
            update(description.as_str(), dashboard_url.as_str());
        }
        if self.block_watch {
            cancel.cancelled().await;
            return Err(Error::Cancelled {});
        }
        Ok(())
    }

    async fn extract_credentials(
        &self,
        _pod_name: &str,
        _namespace: &str,
        runtime_version: u32,
    ) -> Result<Vec<u8>> {
        self.record(
            Call::ExtractCredentials { runtime_version },
            "extract_credentials",
        )?;
        Ok(self.credentials.clone())
    }

    async fn copy_secrets_to_namespace(
        &self,
        context: &ExecutionContext,
        _cluster_namespace: &str,
        secrets: &[String],
    ) -> Result<()> {
        self.record(
            Call::CopySecrets {
                location: context.location.clone(),
                secrets: secrets.to_vec(),
            },
            "copy_secrets_to_namespace",
        )
    }

    fn get_runtime(&self) -> Platform {
        Platform::Kubernetes
    }
}

/// A bindable postgresql service instance living in [`TARGET_NAMESPACE`].
pub fn instance() -> ServiceInstance {
    let spec = Spec {
        id: "55c53a5d65d4a1a97ec0a0e2b1a4fdb0".to_string(),
        runtime: 2,
        version: "1.0".to_string(),
        fq_name: "postgresql-apb".to_string(),
        image: "docker.io/ansibleplaybookbundle/postgresql-apb:latest".to_string(),
        bindable: true,
        ..Spec::default()
    };
    ServiceInstance::new(
        spec,
        Context {
            platform: Platform::Kubernetes,
            namespace: TARGET_NAMESPACE.to_string(),
        },
        Parameters::new(),
    )
}

/// Reads every message of a run.
pub async fn collect(mut status: bundle::StatusStream) -> Vec<StatusMessage> {
    let mut messages = Vec::new();
    while let Some(message) = status.next().await {
        messages.push(message);
    }
    messages
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
