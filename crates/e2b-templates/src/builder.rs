//! Fluent builder for image-layer build graphs.

use e2b_core::Result;

use crate::api::TemplatesClient;
use crate::options::{BuildOptions, CopyOptions, StepOptions, TemplateOptions};
use crate::types::{BuildInfo, InstructionType, RegistryAuth, TemplateBuildSpec, TemplateStep};

/// E2B's default base image.
pub const DEFAULT_BASE_IMAGE: &str = "e2bdev/base";

/// Accumulates an ordered list of build steps on top of a base image or
/// base template, then drives the three build phases (request, trigger,
/// wait) against the control plane.
#[derive(Clone, Default)]
pub struct TemplateBuilder {
    base_image: Option<String>,
    base_template: Option<String>,
    registry_auth: Option<RegistryAuth>,
    start_cmd: Option<String>,
    ready_cmd: Option<String>,
    force: bool,
    force_next_layer: bool,
    steps: Vec<TemplateStep>,
}

impl TemplateBuilder {
    /// Starts a build graph from the default base image.
    pub fn new() -> Self {
        TemplateBuilder {
            base_image: Some(DEFAULT_BASE_IMAGE.to_string()),
            ..TemplateBuilder::default()
        }
    }

    /// Bases the template on a Docker image.
    pub fn from_image(mut self, image: impl Into<String>) -> Self {
        self.base_image = Some(image.into());
        self.base_template = None;
        self
    }

    /// Bases the template on a private Docker image.
    pub fn from_image_with_registry(
        mut self,
        image: impl Into<String>,
        auth: RegistryAuth,
    ) -> Self {
        self.base_image = Some(image.into());
        self.base_template = None;
        self.registry_auth = Some(auth);
        self
    }

    /// Bases the template on another template.
    pub fn from_template(mut self, template_id: impl Into<String>) -> Self {
        self.base_template = Some(template_id.into());
        self.base_image = None;
        self.registry_auth = None;
        self
    }

    /// Appends a RUN step executing a shell command.
    pub fn run_cmd(self, cmd: impl Into<String>) -> Self {
        self.run_cmd_with(cmd, StepOptions::new())
    }

    pub fn run_cmd_with(mut self, cmd: impl Into<String>, options: StepOptions) -> Self {
        let mut args = vec![cmd.into()];
        if let Some(user) = options.user {
            args.insert(0, user);
        }
        let force = options.force || self.force_next_layer;
        self.push_step(InstructionType::Run, args, None, force)
    }

    /// Appends a COPY step. The files hash is computed during the build
    /// when the layer is uploaded.
    pub fn copy(self, src: impl Into<String>, dest: impl Into<String>) -> Self {
        self.copy_with(src, dest, CopyOptions::new())
    }

    pub fn copy_with(
        mut self,
        src: impl Into<String>,
        dest: impl Into<String>,
        options: CopyOptions,
    ) -> Self {
        let mut args = vec![src.into(), dest.into()];
        if let Some(user) = options.user {
            args.push(user);
        }
        if let Some(mode) = options.mode {
            args.push(format!("{mode:o}"));
        }
        let force = options.force_upload || self.force_next_layer;
        self.push_step(InstructionType::Copy, args, None, force)
    }

    /// Appends an ENV step.
    pub fn set_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let force = self.force_next_layer;
        self.push_step(InstructionType::Env, vec![key.into(), value.into()], None, force)
    }

    pub fn set_envs<K, V>(mut self, envs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in envs {
            self = self.set_env(key, value);
        }
        self
    }

    /// Appends a WORKDIR step.
    pub fn set_workdir(mut self, dir: impl Into<String>) -> Self {
        let force = self.force_next_layer;
        self.push_step(InstructionType::Workdir, vec![dir.into()], None, force)
    }

    /// Appends a USER step for subsequent commands.
    pub fn set_user(mut self, user: impl Into<String>) -> Self {
        let force = self.force_next_layer;
        self.push_step(InstructionType::User, vec![user.into()], None, force)
    }

    /// Command started when a sandbox boots from the template.
    pub fn set_start_cmd(mut self, cmd: impl Into<String>) -> Self {
        self.start_cmd = Some(cmd.into());
        self
    }

    /// Command probed to decide the sandbox is ready.
    pub fn set_ready_cmd(mut self, cmd: impl Into<String>) -> Self {
        self.ready_cmd = Some(cmd.into());
        self
    }

    /// Rebuilds every subsequent layer regardless of cache.
    pub fn skip_cache(mut self) -> Self {
        self.force = true;
        self.force_next_layer = true;
        self
    }

    fn push_step(
        mut self,
        instruction: InstructionType,
        args: Vec<String>,
        files_hash: Option<String>,
        force: bool,
    ) -> Self {
        self.steps.push(TemplateStep {
            step_type: instruction.as_str().to_string(),
            args,
            files_hash,
            force,
        });
        self.force_next_layer = false;
        self
    }

    /// The serialized build specification.
    pub fn to_build_spec(&self) -> TemplateBuildSpec {
        TemplateBuildSpec {
            from_image: self.base_image.clone(),
            from_template: self.base_template.clone(),
            from_image_registry: if self.base_template.is_none() {
                self.registry_auth.clone()
            } else {
                None
            },
            start_cmd: self.start_cmd.clone(),
            ready_cmd: self.ready_cmd.clone(),
            steps: self.steps.clone(),
            force: self.force,
        }
    }

    /// Runs all three build phases and waits for completion.
    pub async fn build(
        &self,
        alias: impl AsRef<str>,
        build_options: BuildOptions,
        template_options: TemplateOptions,
    ) -> Result<BuildInfo> {
        let client = TemplatesClient::new(template_options)?;
        let info = client.request_build(alias.as_ref(), &build_options).await?;
        client
            .trigger_build(&info.template_id, &info.build_id, &self.to_build_spec())
            .await?;
        client
            .wait_for_build(&info.template_id, &info.build_id, &build_options)
            .await?;
        Ok(info)
    }

    /// Requests and triggers the build without waiting for it to finish.
    /// Poll with [`TemplatesClient::get_build_status`].
    pub async fn build_in_background(
        &self,
        alias: impl AsRef<str>,
        build_options: BuildOptions,
        template_options: TemplateOptions,
    ) -> Result<BuildInfo> {
        let client = TemplatesClient::new(template_options)?;
        let info = client.request_build(alias.as_ref(), &build_options).await?;
        client
            .trigger_build(&info.template_id, &info.build_id, &self.to_build_spec())
            .await?;
        Ok(info)
    }
}
