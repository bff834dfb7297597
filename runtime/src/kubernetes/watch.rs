use crate::error::{self, Result};
use crate::pod::PodState;
use crate::UpdateFn;
use bundle_model::constants::{ANNOTATION_DASHBOARD_URL, ANNOTATION_LAST_OPERATION};
use k8s_openapi::api::core::v1::Pod;
use kube::Api;
use log::{debug, trace, warn};
use snafu::ResultExt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Polls the bundle pod until it finishes, reporting the progress annotations it sets along the
/// way. Failing to read the pod is tolerated `retries` times in a row.
pub(super) async fn watch_pod(
    api: Api<Pod>,
    pod_name: &str,
    interval: Duration,
    retries: u32,
    update: UpdateFn<'_>,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut failures = 0;
    let mut last_progress = (String::new(), String::new());
    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => return error::CancelledSnafu.fail(),
            result = api.get(pod_name) => result,
        };
        match result {
            Ok(pod) => {
                failures = 0;
                let progress = progress(&pod);
                if progress != last_progress {
                    update(&progress.0, &progress.1);
                    last_progress = progress;
                }
                match PodState::from_pod(&pod) {
                    PodState::Succeeded => {
                        debug!("Pod '{}' completed", pod_name);
                        return Ok(());
                    }
                    PodState::Failed { reason } => {
                        return error::PodFailedSnafu {
                            pod: pod_name,
                            reason,
                        }
                        .fail()
                    }
                    PodState::ImagePullFailure { reason } => {
                        return error::ImagePullSnafu {
                            pod: pod_name,
                            reason,
                        }
                        .fail()
                    }
                    state => trace!("Pod '{}' is {:?}", pod_name, state),
                }
            }
            Err(e) => {
                failures += 1;
                if failures >= retries {
                    return Err(e).context(error::WatchRetriesSnafu {
                        pod: pod_name,
                        attempts: failures,
                    });
                }
                warn!(
                    "Unable to get pod '{}' ({} of {} attempts): {}",
                    pod_name, failures, retries, e
                );
            }
        }
        tokio::select! {
            _ = cancel.cancelled() => return error::CancelledSnafu.fail(),
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

/// The last operation and dashboard URL annotations of `pod`, empty when unset.
fn progress(pod: &Pod) -> (String, String) {
    let annotation = |key: &str| {
        pod.metadata
            .annotations
            .as_ref()
            .and_then(|annotations| annotations.get(key))
            .cloned()
            .unwrap_or_default()
    };
    (
        annotation(ANNOTATION_LAST_OPERATION),
        annotation(ANNOTATION_DASHBOARD_URL),
    )
}
