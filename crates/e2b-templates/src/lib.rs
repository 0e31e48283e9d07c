//! Template build orchestration for E2B sandboxes.
//!
//! A [`TemplateBuilder`] accumulates an ordered list of image-layer steps
//! (COPY, RUN, ENV, WORKDIR, USER) on top of a base image or template, then
//! [`TemplateBuilder::build`] drives the three remote phases: request a
//! build slot, submit the specification, and poll the status endpoint
//! until the build is `ready` or `error`, streaming log entries to the
//! caller.
//!
//! ```no_run
//! use e2b_templates::{BuildOptions, TemplateBuilder, TemplateOptions};
//!
//! # async fn demo() -> e2b_core::Result<()> {
//! let info = TemplateBuilder::new()
//!     .from_image("python:3.11")
//!     .run_cmd("pip install numpy")
//!     .set_start_cmd("python -m http.server 8080")
//!     .build(
//!         "my-template",
//!         BuildOptions::new().on_logs(|entry| println!("{}", entry.message)),
//!         TemplateOptions::new(),
//!     )
//!     .await?;
//! println!("built {}", info.template_id);
//! # Ok(())
//! # }
//! ```

mod api;
mod builder;
mod options;
mod types;

pub mod prelude;

pub use api::TemplatesClient;
pub use builder::{TemplateBuilder, DEFAULT_BASE_IMAGE};
pub use options::{
    BuildLogHandler, BuildOptions, CopyOptions, StepOptions, TemplateOptions,
    DEFAULT_BUILD_POLL_INTERVAL, DEFAULT_TEMPLATE_CPU, DEFAULT_TEMPLATE_MEMORY_MB,
};
pub use types::{
    BuildInfo, BuildLogEntry, BuildStatus, BuildStatusReason, FileUploadInfo, InstructionType,
    LogLevel, RegistryAuth, TemplateBuild, TemplateBuildInfo, TemplateBuildSpec, TemplateInfo,
    TemplateStep, TemplateUpdate, TemplateWithBuilds,
};
