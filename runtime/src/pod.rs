use crate::ExecutionContext;
use bundle_model::constants::LABEL_SANDBOX_POD;
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, EnvVar, EnvVarSource, ObjectFieldSelector, Pod, PodSpec,
    SecretVolumeSource, Volume, VolumeMount,
};
use kube::api::ObjectMeta;

const CONTAINER_NAME: &str = "bundle";
const SECRETS_PATH: &str = "/etc/bundle-secrets";
const STATE_VOLUME: &str = "bundle-state";

/// Waiting reasons that mean the pod will never start.
const IMAGE_PULL_FAILURES: [&str; 4] = [
    "ErrImagePull",
    "ErrImageNeverPull",
    "ImagePullBackOff",
    "InvalidImageName",
];

/// A bundle pod runs a single container once, so its phase and that container's state are folded
/// into a simple enumeration.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum PodState {
    /// The pod has no status yet.
    Unknown,
    /// The pod is accepted but the container has not started.
    Pending,
    Running,
    /// The container exited with `0`.
    Succeeded,
    /// The container exited with a failure, or the pod was evicted.
    Failed { reason: String },
    /// The image cannot be pulled. Kubernetes keeps retrying but the bundle will never run.
    ImagePullFailure { reason: String },
}

impl PodState {
    pub fn from_pod(pod: &Pod) -> Self {
        let status = match &pod.status {
            None => return PodState::Unknown,
            Some(some) => some,
        };

        let waiting_reason = status
            .container_statuses
            .iter()
            .flatten()
            .filter_map(|container| container.state.as_ref()?.waiting.as_ref())
            .find(|waiting| {
                waiting
                    .reason
                    .as_deref()
                    .map(|reason| IMAGE_PULL_FAILURES.contains(&reason))
                    .unwrap_or_default()
            });
        if let Some(waiting) = waiting_reason {
            return PodState::ImagePullFailure {
                reason: join_reason(waiting.reason.as_deref(), waiting.message.as_deref()),
            };
        }

        match status.phase.as_deref() {
            Some("Pending") => PodState::Pending,
            Some("Running") => PodState::Running,
            Some("Succeeded") => PodState::Succeeded,
            Some("Failed") => {
                let terminated = status
                    .container_statuses
                    .iter()
                    .flatten()
                    .find_map(|container| container.state.as_ref()?.terminated.as_ref());
                let reason = match terminated {
                    Some(terminated) if status.reason.is_none() => format!(
                        "{} (exit code {})",
                        join_reason(terminated.reason.as_deref(), terminated.message.as_deref()),
                        terminated.exit_code
                    ),
                    _ => join_reason(status.reason.as_deref(), status.message.as_deref()),
                };
                PodState::Failed { reason }
            }
            _ => PodState::Unknown,
        }
    }
}

fn join_reason(reason: Option<&str>, message: Option<&str>) -> String {
    match (reason, message) {
        (Some(reason), Some(message)) => format!("{}: {}", reason, message),
        (Some(only), None) | (None, Some(only)) => only.to_string(),
        (None, None) => "unknown reason".to_string(),
    }
}

/// Builds the pod that runs `context.action` of a bundle. The container gets the action and the
/// extra vars as arguments, the secrets it was given, its own name and namespace so that it can
/// report progress, and the instance's state when there is some.
pub(crate) fn bundle_pod(context: &ExecutionContext, state_mount_location: &str) -> Pod {
    let mut labels = context.metadata.clone();
    labels.insert(LABEL_SANDBOX_POD.to_string(), context.pod_name.clone());

    let mut volumes: Vec<Volume> = context
        .secrets
        .iter()
        .map(|name| Volume {
            name: name.clone(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(name.clone()),
                ..SecretVolumeSource::default()
            }),
            ..Volume::default()
        })
        .collect();
    let mut mounts: Vec<VolumeMount> = context
        .secrets
        .iter()
        .map(|name| VolumeMount {
            mount_path: format!("{}/{}", SECRETS_PATH, name),
            name: name.clone(),
            read_only: Some(true),
            ..VolumeMount::default()
        })
        .collect();
    if context.state_present {
        volumes.push(Volume {
            name: STATE_VOLUME.to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: Some(context.state_name.clone()),
                ..ConfigMapVolumeSource::default()
            }),
            ..Volume::default()
        });
        mounts.push(VolumeMount {
            mount_path: state_mount_location.to_string(),
            name: STATE_VOLUME.to_string(),
            ..VolumeMount::default()
        });
    }

    Pod {
        metadata: ObjectMeta {
            name: Some(context.pod_name.clone()),
            namespace: Some(context.location.clone()),
            labels: Some(labels),
            ..ObjectMeta::default()
        },
        spec: Some(PodSpec {
            containers: vec![Container {
                name: CONTAINER_NAME.to_string(),
                image: Some(context.image.clone()),
                image_pull_policy: Some(context.image_pull_policy.clone()),
                args: Some(vec![
                    context.action.to_string(),
                    "--extra-vars".to_string(),
                    context.extra_vars.clone(),
                ]),
                env: Some(env_vars(context)),
                volume_mounts: if mounts.is_empty() { None } else { Some(mounts) },
                ..Container::default()
            }],
            restart_policy: Some(String::from("Never")),
            service_account_name: Some(context.service_account.clone()),
            volumes: if volumes.is_empty() {
                None
            } else {
                Some(volumes)
            },
            ..PodSpec::default()
        }),
        ..Pod::default()
    }
}

fn env_vars(context: &ExecutionContext) -> Vec<EnvVar> {
    let field = |name: &str, path: &str| EnvVar {
        name: name.to_string(),
        value: None,
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                field_path: path.to_string(),
                ..ObjectFieldSelector::default()
            }),
            ..EnvVarSource::default()
        }),
    };
    let mut vars = vec![
        field("POD_NAME", "metadata.name"),
        field("POD_NAMESPACE", "metadata.namespace"),
    ];
    vars.extend(
        context
            .proxy
            .iter()
            .flat_map(|proxy| proxy.env_vars())
            .map(|(name, value)| EnvVar {
                name,
                value: Some(value),
                value_from: None,
            }),
    );
    vars
}
