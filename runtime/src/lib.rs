/*!

The runtime is everything a bundle executor needs from the cluster: creating and tearing down the
sandbox a bundle pod runs in, running and watching that pod, moving bundle state between
namespaces and storing the credentials a bundle produces.

The [`Runtime`] trait is the seam. [`KubeRuntime`] implements it against a Kubernetes or OpenShift
API server, and tests provide their own implementation.

!*/

#![deny(
    clippy::expect_used,
    clippy::get_unwrap,
    clippy::panic,
    clippy::panic_in_result_fn,
    clippy::panicking_unwrap,
    clippy::unwrap_in_result,
    clippy::unwrap_used
)]

pub use config::RuntimeConfig;
pub use context::{ExecutionContext, ProxyConfig};
pub use error::{Error, Result};
pub use http_status_code::{AllowNotFound, HttpStatusCode, StatusCode};
pub use kubernetes::KubeRuntime;
pub use pod::PodState;
pub use provider::{ExtractedCredentialStore, Runtime, SandboxHook, StateStore, UpdateFn};
pub use sandbox::SandboxPlan;

mod config;
mod context;
mod error;
mod http_status_code;
mod kubernetes;
mod pod;
mod provider;
mod sandbox;
