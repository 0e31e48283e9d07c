use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a template build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Waiting,
    Building,
    Ready,
    Error,
}

/// Level of a build log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Build instruction kinds understood by the build service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionType {
    Copy,
    Run,
    Env,
    Workdir,
    User,
}

impl InstructionType {
    pub fn as_str(self) -> &'static str {
        match self {
            InstructionType::Copy => "COPY",
            InstructionType::Run => "RUN",
            InstructionType::Env => "ENV",
            InstructionType::Workdir => "WORKDIR",
            InstructionType::User => "USER",
        }
    }
}

/// One step of the image-layer build graph.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateStep {
    #[serde(rename = "type")]
    pub step_type: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Content hash of the files used by COPY steps.
    #[serde(rename = "filesHash", skip_serializing_if = "Option::is_none")]
    pub files_hash: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub force: bool,
}

/// Registry credentials for pulling a private base image. Serialized with
/// the `type` tag the build service dispatches on.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum RegistryAuth {
    #[serde(rename = "registry")]
    General { username: String, password: String },
    #[serde(rename = "aws")]
    Aws {
        #[serde(rename = "awsAccessKeyId")]
        access_key_id: String,
        #[serde(rename = "awsSecretAccessKey")]
        secret_access_key: String,
        #[serde(rename = "awsRegion")]
        region: String,
    },
    #[serde(rename = "gcp")]
    Gcp {
        #[serde(rename = "serviceAccountJson")]
        service_account_json: String,
    },
}

/// Serialized build specification sent to the build service.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateBuildSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_image_registry: Option<RegistryAuth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_cmd: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready_cmd: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<TemplateStep>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub force: bool,
}

/// Result of requesting a build slot.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildInfo {
    #[serde(rename = "templateID")]
    pub template_id: String,
    #[serde(rename = "buildID")]
    pub build_id: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub public: bool,
}

/// One log line from the build service.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildLogEntry {
    pub level: LogLevel,
    pub message: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub step: Option<String>,
}

/// Reason attached to a failed build.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildStatusReason {
    pub message: String,
    #[serde(default)]
    pub step: Option<String>,
    #[serde(default)]
    pub log_entries: Vec<BuildLogEntry>,
}

/// Status-poll response for a build.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateBuildInfo {
    #[serde(rename = "templateID", default)]
    pub template_id: String,
    #[serde(rename = "buildID", default)]
    pub build_id: String,
    pub status: BuildStatus,
    #[serde(default)]
    pub log_entries: Vec<BuildLogEntry>,
    #[serde(default)]
    pub reason: Option<BuildStatusReason>,
}

/// A template owned by the caller.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateInfo {
    #[serde(rename = "templateID")]
    pub template_id: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(rename = "buildID", default)]
    pub build_id: String,
    #[serde(default)]
    pub build_count: u32,
    #[serde(default)]
    pub spawn_count: u64,
    #[serde(default)]
    pub cpu_count: u32,
    #[serde(rename = "memoryMB", default)]
    pub memory_mb: u64,
    #[serde(rename = "diskSizeMB", default)]
    pub disk_size_mb: u64,
    #[serde(default)]
    pub envd_version: String,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_spawned_at: Option<DateTime<Utc>>,
}

/// One historic build of a template.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateBuild {
    #[serde(rename = "buildID")]
    pub build_id: String,
    pub status: BuildStatus,
    #[serde(default)]
    pub cpu_count: u32,
    #[serde(rename = "memoryMB", default)]
    pub memory_mb: u64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

/// A template together with its build history.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateWithBuilds {
    #[serde(rename = "templateID")]
    pub template_id: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub builds: Vec<TemplateBuild>,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub spawn_count: u64,
}

/// Whether a COPY layer's files are already cached, and where to upload
/// them when not.
#[derive(Debug, Clone, Deserialize)]
pub struct FileUploadInfo {
    pub present: bool,
    #[serde(default)]
    pub url: Option<String>,
}

/// Mutable template properties.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TemplateUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public: Option<bool>,
}

#[derive(Serialize)]
pub(crate) struct RequestBuildBody<'a> {
    #[serde(skip_serializing_if = "str::is_empty")]
    pub alias: &'a str,
    #[serde(rename = "cpuCount")]
    pub cpu_count: u32,
    #[serde(rename = "memoryMB")]
    pub memory_mb: u64,
    #[serde(rename = "teamID", skip_serializing_if = "Option::is_none")]
    pub team_id: Option<&'a str>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn registry_auth_is_tagged() {
        let general = RegistryAuth::General {
            username: "u".into(),
            password: "p".into(),
        };
        assert_eq!(
            serde_json::to_value(&general).unwrap(),
            json!({"type": "registry", "username": "u", "password": "p"})
        );

        let aws = RegistryAuth::Aws {
            access_key_id: "AKIA".into(),
            secret_access_key: "s".into(),
            region: "us-west-2".into(),
        };
        assert_eq!(
            serde_json::to_value(&aws).unwrap(),
            json!({
                "type": "aws",
                "awsAccessKeyId": "AKIA",
                "awsSecretAccessKey": "s",
                "awsRegion": "us-west-2"
            })
        );

        let gcp = RegistryAuth::Gcp {
            service_account_json: "{}".into(),
        };
        assert_eq!(
            serde_json::to_value(&gcp).unwrap(),
            json!({"type": "gcp", "serviceAccountJson": "{}"})
        );
    }

    #[test]
    fn step_serialization_omits_empty_fields() {
        let step = TemplateStep {
            step_type: InstructionType::Run.as_str().into(),
            args: vec!["apt-get update".into()],
            files_hash: None,
            force: false,
        };
        assert_eq!(
            serde_json::to_value(&step).unwrap(),
            json!({"type": "RUN", "args": ["apt-get update"]})
        );
    }

    #[test]
    fn build_spec_uses_camel_case() {
        let spec = TemplateBuildSpec {
            from_image: Some("python:3.11".into()),
            start_cmd: Some("python -m http.server".into()),
            ..TemplateBuildSpec::default()
        };
        let wire = serde_json::to_value(&spec).unwrap();
        assert_eq!(wire["fromImage"], "python:3.11");
        assert_eq!(wire["startCmd"], "python -m http.server");
        assert!(wire.get("fromTemplate").is_none());
    }
}
