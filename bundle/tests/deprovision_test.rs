mod mock;

use bundle::{Executor, ExecutorConfig, ExecutorError, State};
use bundle_model::Parameters;
use mock::{collect, init_logger, instance, Call, MockRuntime};
use std::sync::Arc;

#[tokio::test]
async fn deprovision_removes_state_and_credentials() {
    init_logger();
    let runtime = Arc::new(MockRuntime::new().with_state());
    let executor = Executor::new(runtime.clone(), ExecutorConfig::default());
    let instance = instance();
    let messages = collect(executor.deprovision(&instance, Parameters::new())).await;

    assert_eq!(messages[1].state, State::Succeeded);
    let calls = runtime.calls();
    assert!(calls.contains(&Call::DeleteState {
        name: format!("{}-state", instance.id)
    }));
    assert!(calls.contains(&Call::DeleteCredential {
        id: instance.id.to_string()
    }));
    assert!(!calls
        .iter()
        .any(|call| matches!(call, Call::CopyState { .. })));
    assert_eq!(runtime.destroy_count(), 1);
}

#[tokio::test]
async fn deprovision_state_failure_is_fatal() {
    init_logger();
    let runtime = Arc::new(MockRuntime::new().failing("delete_state"));
    let executor = Executor::new(runtime.clone(), ExecutorConfig::default());
    let messages = collect(executor.deprovision(&instance(), Parameters::new())).await;

    assert_eq!(messages[1].state, State::Failed);
    assert!(matches!(
        messages[1].error.as_deref(),
        Some(ExecutorError::DeleteState { .. })
    ));
    assert_eq!(runtime.destroy_count(), 1);
}

#[tokio::test]
async fn deprovision_tolerates_credential_delete_failure() {
    init_logger();
    let runtime = Arc::new(MockRuntime::new().failing("delete_extracted_credential"));
    let executor = Executor::new(runtime, ExecutorConfig::default());
    let messages = collect(executor.deprovision(&instance(), Parameters::new())).await;
    assert_eq!(messages[1].state, State::Succeeded);
}
