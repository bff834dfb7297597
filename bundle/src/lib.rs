/*!

The bundle executor drives one lifecycle action of a bundle (provision, update, deprovision, bind
or unbind) to completion on a cluster. Every action follows the same skeleton: create a sandbox,
run the bundle pod in it, watch the pod, save the bundle's state and credentials, and tear the
sandbox down again. Progress is reported as a [`StatusStream`] of [`StatusMessage`]s.

```no_run
# use bundle::{Executor, ExecutorConfig};
# use bundle_model::{Parameters, ServiceInstance};
# use bundle_runtime::Runtime;
# use futures::StreamExt;
# use std::sync::Arc;
# async fn bind(runtime: Arc<dyn Runtime>, instance: ServiceInstance) {
let executor = Executor::new(runtime, ExecutorConfig::from_env());
let mut status = executor.bind(&instance, Parameters::new(), "binding-1");
while let Some(message) = status.next().await {
    println!("{}", message.state);
}
let credentials = executor.extracted_credentials();
# }
```

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

pub use config::ExecutorConfig;
pub use error::{ExecutorError, Result};
pub use executor::Executor;
pub use secrets::{
    filter_secret_parameters, AssociationRule, SecretsCache, SecretsConfig, SecretsError,
};
pub use status::{State, StatusMessage};
pub use stream::StatusStream;

mod config;
mod error;
mod executor;
mod naming;
mod secrets;
mod status;
mod stream;
