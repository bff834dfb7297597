use snafu::Snafu;

#[derive(Debug, Snafu)]
pub struct Error(InnerError);
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub(crate) enum InnerError {
    #[snafu(display("Unable to decode base64 encoded spec: {}", source))]
    SpecBase64 { source: base64::DecodeError },

    #[snafu(display("Unable to deserialize spec from json: {}", source))]
    SpecJson { source: serde_json::Error },

    #[snafu(display("Unable to deserialize spec from yaml: {}", source))]
    SpecYaml { source: serde_yaml::Error },

    #[snafu(display("Unable to serialize '{}': {}", what, source))]
    Serialization {
        what: String,
        source: serde_json::Error,
    },
}
