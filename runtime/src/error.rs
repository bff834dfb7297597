use snafu::Snafu;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("The operation was cancelled"))]
    Cancelled {},

    #[snafu(display("Unable to {} the credential payload for '{}': {}", action, id, source))]
    CredentialSerde {
        action: &'static str,
        id: String,
        source: serde_json::Error,
    },

    #[snafu(display("Sandbox hook '{}' failed: {}", hook, message))]
    Hook { hook: String, message: String },

    #[snafu(display("Unable to build request for '{}': {}", uri, source))]
    HttpRequest { uri: String, source: http::Error },

    #[snafu(display("Pod '{}' is unable to pull its image: {}", pod, reason))]
    ImagePull { pod: String, reason: String },

    #[snafu(display("Unable to read output of '{}': {}", what, source))]
    Io {
        what: String,
        source: std::io::Error,
    },

    #[snafu(display("Unable to {}: {}", action, source))]
    Kube {
        action: String,
        source: kube::Error,
    },

    /// A free form error. Runtime implementations outside of this crate, for example test
    /// doubles, can use this variant to report their own failures.
    #[snafu(display("{}", message))]
    Message { message: String },

    #[snafu(display("{} is missing '{}'", what, key))]
    MissingData { what: String, key: String },

    #[snafu(display("Unable to determine the cluster platform: {}", source))]
    Platform { source: kube::Error },

    #[snafu(display("Pod '{}' failed: {}", pod, reason))]
    PodFailed { pod: String, reason: String },

    #[snafu(display("Unable to {} state '{}': {}", action, name, source))]
    State {
        action: &'static str,
        name: String,
        source: kube::Error,
    },

    #[snafu(display(
        "Gave up watching pod '{}' after {} consecutive failures: {}",
        pod,
        attempts,
        source
    ))]
    WatchRetries {
        pod: String,
        attempts: u32,
        source: kube::Error,
    },
}

impl Error {
    /// Creates a free form error.
    pub fn message<S: Into<String>>(message: S) -> Self {
        Error::Message {
            message: message.into(),
        }
    }
}
