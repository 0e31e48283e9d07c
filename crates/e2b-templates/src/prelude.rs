pub use crate::api::TemplatesClient;
pub use crate::builder::TemplateBuilder;
pub use crate::options::{BuildOptions, CopyOptions, StepOptions, TemplateOptions};
pub use crate::types::{
    BuildInfo, BuildLogEntry, BuildStatus, RegistryAuth, TemplateBuildInfo, TemplateBuildSpec,
};
