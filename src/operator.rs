//! One operator project: its settings, the container runtime chosen for it,
//! and the external commands that scaffold and build it.

use tracing::info;

use crate::error::Result;
use crate::installer::{SdkInstaller, SdkPaths};
use crate::runner::{FailurePolicy, ProcessRunner, Runner};
use crate::runtime::{ContainerRuntime, detect_runtime};
use crate::settings::OperatorSettings;

/// Settings bound to a runner and a detected container runtime.
#[derive(Debug)]
pub struct Operator<R = ProcessRunner> {
    settings: OperatorSettings,
    runtime: ContainerRuntime,
    runner: R,
}

impl<R: Runner> Operator<R> {
    /// Bind `settings` to `runner`, detecting the container runtime.
    ///
    /// Fails with [`OperateError::NoRuntime`](crate::error::OperateError::NoRuntime) when neither docker nor podman
    /// is usable.
    pub fn new(settings: OperatorSettings, runner: R) -> Result<Self> {
        let runtime = detect_runtime(&runner)?;
        Ok(Self {
            settings,
            runtime,
            runner,
        })
    }

    pub fn settings(&self) -> &OperatorSettings {
        &self.settings
    }

    pub fn runtime(&self) -> ContainerRuntime {
        self.runtime
    }

    /// Install operator-sdk at the standard location under `$HOME`.
    pub fn install_operator_sdk<I: SdkInstaller>(
        &self,
        installer: &I,
        version: &str,
    ) -> Result<String> {
        let paths = SdkPaths::from_home()?;
        self.install_operator_sdk_at(installer, &paths, version)
    }

    /// Install operator-sdk at explicit paths.
    pub fn install_operator_sdk_at<I: SdkInstaller>(
        &self,
        installer: &I,
        paths: &SdkPaths,
        version: &str,
    ) -> Result<String> {
        let installed = installer.ensure_installed(&paths.directory, &paths.target, version)?;
        info!("Operator SDK version {} installed", installed);
        Ok(installed)
    }

    /// Scaffold an Ansible operator and create one API per Kind.
    ///
    /// Does nothing once the project is initialized. Commands run strictly in
    /// order and any failure stops the sequence with the project still
    /// uninitialized.
    pub fn initialize_operator(&mut self) -> Result<()> {
        if self.settings.is_initialized() {
            return Ok(());
        }

        let domain = OperatorSettings::require(&self.settings.domain, "domain")?;
        let mut commands = vec![format!(
            "operator-sdk init --plugins=ansible --domain={}",
            domain
        )];
        if !self.settings.kinds.is_empty() {
            let group = OperatorSettings::require(&self.settings.group, "group")?;
            let api_version =
                OperatorSettings::require(&self.settings.api_version, "api-version")?;
            commands.extend(self.settings.kinds.iter().map(|kind| {
                format!(
                    "operator-sdk create api --group={} --version={} --kind={}",
                    group, api_version, kind
                )
            }));
        }

        for command in &commands {
            self.runner.run_all(command, FailurePolicy::Fail)?;
        }

        info!(
            "Initialized operator for domain {} with {} API(s)",
            domain,
            self.settings.kinds.len()
        );
        self.settings.mark_initialized();
        Ok(())
    }

    /// Image reference the build produces: `<image>:<version>[-<extension>]`.
    pub fn image_reference(&self, tag_extension: Option<&str>) -> Result<String> {
        let image = OperatorSettings::require(&self.settings.image, "image")?;
        let version = OperatorSettings::require(&self.settings.version, "version")?;
        Ok(match tag_extension {
            Some(extension) if !extension.is_empty() => {
                format!("{}:{}-{}", image, version, extension)
            }
            _ => format!("{}:{}", image, version),
        })
    }

    /// Build the operator image with the detected runtime.
    pub fn build_operator(&self, tag_extension: Option<&str>) -> Result<String> {
        let reference = self.image_reference(tag_extension)?;
        info!("Building {}", reference);
        let command = format!("{} build -t {} .", self.runtime.binary(), reference);
        self.runner.run_all(&command, FailurePolicy::Fail)?;
        Ok(reference)
    }
}

impl Operator<ProcessRunner> {
    /// Load settings from `path` and bind them to real subprocesses.
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Self::new(OperatorSettings::load(path)?, ProcessRunner::new())
    }
}
