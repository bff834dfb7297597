use crate::error::{self, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use snafu::ResultExt;

/// The description of a bundle as published in its image labels: what it is, which image runs it
/// and the plans a user can pick from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Spec {
    pub id: String,
    /// The version of the bundle runtime contract the image implements. Images older than version
    /// `2` report their credentials on stdout instead of in a secret.
    pub runtime: u32,
    pub version: String,
    /// The fully qualified name of the bundle.
    #[serde(rename = "name")]
    pub fq_name: String,
    pub image: String,
    pub tags: Vec<String>,
    pub bindable: bool,
    pub description: String,
    pub metadata: Map<String, Value>,
    #[serde(rename = "async")]
    pub async_mode: String,
    pub delete: bool,
    pub plans: Vec<Plan>,
    /// Experimental features the bundle opts into.
    pub alpha: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Plan {
    pub id: String,
    pub name: String,
    pub description: String,
    pub metadata: Map<String, Value>,
    pub free: bool,
    pub bindable: bool,
    pub parameters: Vec<ParameterDescriptor>,
    pub bind_parameters: Vec<ParameterDescriptor>,
    pub updates_to: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterDescriptor {
    pub name: String,
    pub title: String,
    #[serde(rename = "type")]
    pub param_type: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(rename = "maxlength", skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    pub pattern: String,
    #[serde(rename = "enum")]
    pub enum_values: Vec<String>,
    pub required: bool,
    pub updatable: bool,
    pub display_type: String,
    pub display_group: String,
    pub dependencies: Vec<Dependency>,
}

/// A parameter that is only shown when another parameter has the given value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
    pub key: String,
    pub value: Value,
}

impl Spec {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml).context(error::SpecYamlSnafu)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json).context(error::SpecJsonSnafu)?)
    }

    /// Registries carry the spec as base64 encoded yaml in an image label.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let decoded = base64::decode(encoded.trim().as_bytes()).context(error::SpecBase64Snafu)?;
        Ok(serde_yaml::from_slice(&decoded).context(error::SpecYamlSnafu)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self).context(error::SerializationSnafu { what: "spec" })?)
    }

    pub fn get_plan(&self, name: &str) -> Option<&Plan> {
        self.plans.iter().find(|plan| plan.name == name)
    }

    pub fn get_plan_from_id(&self, id: &str) -> Option<&Plan> {
        self.plans.iter().find(|plan| plan.id == id)
    }
}

impl Plan {
    pub fn get_parameter(&self, name: &str) -> Option<&ParameterDescriptor> {
        self.parameters.iter().find(|param| param.name == name)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    const MEDIAWIKI: &str = r#"
version: "1.0"
name: mediawiki123-apb
description: Mediawiki123 apb implementation
bindable: false
async: optional
runtime: 2
image: ansibleplaybookbundle/mediawiki123-apb
alpha:
  dashboard_redirect: true
plans:
  - id: 5e4bcc9f
    name: dev
    description: Mediawiki123 apb implementation
    free: true
    bindable: true
    metadata:
      displayName: Development
    updates_to:
      - foo
    parameters:
      - name: mediawiki_db_schema
        title: Mediawiki DB Schema
        type: string
        default: mediawiki
        required: true
      - name: mediawiki_site_name
        title: Mediawiki Site Name
        type: string
        default: MediaWiki
        updatable: true
        required: true
      - name: mediawiki_site_lang
        title: Mediawiki Site Language
        type: string
        default: en
        required: true
      - name: mediawiki_mock_enum
        title: Mediawiki Fake Enum Param
        type: enum
        enum: ["Yes", "No"]
        default: "Yes"
      - name: mediawiki_conditional_show
        title: Mediawiki Example Conditional Default Shown
        type: string
        dependencies:
          - key: mediawiki_mock_enum
            value: "Yes"
"#;

    #[test]
    fn load_yaml() {
        let spec = Spec::from_yaml(MEDIAWIKI).unwrap();
        assert_eq!(spec.fq_name, "mediawiki123-apb");
        assert_eq!(spec.runtime, 2);
        assert_eq!(spec.async_mode, "optional");
        assert_eq!(spec.alpha.get("dashboard_redirect"), Some(&json!(true)));
        let plan = &spec.plans[0];
        assert_eq!(plan.parameters.len(), 5);
        assert_eq!(plan.updates_to, vec!["foo".to_string()]);

        let site_lang = &plan.parameters[2];
        assert_eq!(site_lang.name, "mediawiki_site_lang");
        assert_eq!(site_lang.param_type, "string");
        assert_eq!(site_lang.default, Some(json!("en")));
        assert!(site_lang.description.is_empty());
        assert!(site_lang.max_length.is_none());
        assert!(site_lang.enum_values.is_empty());

        let conditional = &plan.parameters[4];
        assert_eq!(conditional.dependencies[0].key, "mediawiki_mock_enum");
    }

    #[test]
    fn load_base64() {
        let encoded = base64::encode(MEDIAWIKI);
        let spec = Spec::from_base64(&encoded).unwrap();
        assert_eq!(spec, Spec::from_yaml(MEDIAWIKI).unwrap());
        assert!(Spec::from_base64("not base64!").is_err());
    }

    #[test]
    fn json_round_trip_keeps_wire_names() {
        let spec = Spec::from_yaml(MEDIAWIKI).unwrap();
        let json = spec.to_json().unwrap();
        assert!(json.contains(r#""name":"mediawiki123-apb""#));
        assert!(json.contains(r#""async":"optional""#));
        assert_eq!(Spec::from_json(&json).unwrap(), spec);
    }

    #[test]
    fn plan_lookup() {
        let spec = Spec::from_yaml(MEDIAWIKI).unwrap();
        assert_eq!(spec.get_plan("dev").map(|p| p.id.as_str()), Some("5e4bcc9f"));
        assert_eq!(spec.get_plan_from_id("5e4bcc9f").map(|p| p.name.as_str()), Some("dev"));
        assert!(spec.get_plan("prod").is_none());
        assert!(Spec::default().get_plan_from_id("5e4bcc9f").is_none());
    }

    #[test]
    fn parameter_lookup() {
        let spec = Spec::from_yaml(MEDIAWIKI).unwrap();
        let plan = spec.get_plan("dev").unwrap();
        assert_eq!(
            plan.get_parameter("mediawiki_site_name").map(|p| p.updatable),
            Some(true)
        );
        assert!(plan.get_parameter("missing").is_none());
        assert!(Plan::default().get_parameter("mediawiki_site_name").is_none());
    }
}
