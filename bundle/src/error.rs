use bundle_model::{Action, CredentialsError};
use snafu::Snafu;

pub type Result<T> = std::result::Result<T, ExecutorError>;

/// Why a bundle action failed. Each variant names the step that failed; the terminal
/// [`StatusMessage`](crate::StatusMessage) of a failed run carries one of these.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ExecutorError {
    #[snafu(display("The {} was cancelled", action))]
    Cancelled { action: Action },

    #[snafu(display("Unable to copy secrets for {}: {}", action, source))]
    CopySecrets {
        action: Action,
        source: bundle_runtime::Error,
    },

    #[snafu(display("Unable to copy state '{}' to '{}': {}", name, namespace, source))]
    CopyState {
        name: String,
        namespace: String,
        source: bundle_runtime::Error,
    },

    #[snafu(display("Unable to create sandbox for {}: {}", action, source))]
    CreateSandbox {
        action: Action,
        source: bundle_runtime::Error,
    },

    #[snafu(display("Unable to delete state '{}': {}", name, source))]
    DeleteState {
        name: String,
        source: bundle_runtime::Error,
    },

    #[snafu(display("Unable to extract credentials from pod '{}': {}", pod, source))]
    ExtractCredentials {
        pod: String,
        source: bundle_runtime::Error,
    },

    #[snafu(display("Unable to build extra vars: {}", source))]
    ExtraVars { source: bundle_model::Error },

    #[snafu(display("{}", source))]
    MalformedCredentials { source: CredentialsError },

    #[snafu(display("failed to run bundle: {}", source))]
    RunBundle { source: bundle_runtime::Error },

    #[snafu(display("Unable to check state '{}': {}", name, source))]
    StateCheck {
        name: String,
        source: bundle_runtime::Error,
    },

    #[snafu(display("Unable to store credentials '{}': {}", id, source))]
    StoreCredentials {
        id: String,
        source: bundle_runtime::Error,
    },

    #[snafu(display("failed to watch bundle: {}", source))]
    WatchBundle { source: bundle_runtime::Error },
}
