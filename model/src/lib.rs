/*!

This library provides the plain data types shared by the bundle runtime and the bundle executor:
bundle specs and plans, service instances and bindings, action parameters, and the credentials a
bundle hands back when it finishes.

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

pub use action::Action;
pub use credentials::{CredentialsError, ExtractedCredentials};
pub use error::{Error, Result};
pub use instance::{BindInstance, Context, Platform, ServiceInstance};
pub use parameters::Parameters;
pub use spec::{Dependency, ParameterDescriptor, Plan, Spec};

mod action;
pub mod constants;
mod credentials;
mod error;
mod instance;
mod parameters;
mod spec;
