//! Runs the configured provisioners on the instance.

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};

use crate::error::BuildError;
use crate::remote::{CommandRunner, script_command};
use crate::runner::{Step, StepAction, StepContext, StepFuture};
use crate::state::BuildState;

use super::{SharedShell, fail, identity, remote_error, run_remote};

/// Commands and local script files to run, in order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Provisioners {
    /// Shell commands run verbatim by the remote login shell.
    pub commands: Vec<String>,
    /// Local scripts whose contents are run with `sh -c`.
    pub scripts: Vec<Utf8PathBuf>,
}

impl Provisioners {
    /// Returns `true` when nothing is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.scripts.is_empty()
    }
}

/// Runs every provisioner over SSH, halting on the first failure.
pub struct ProvisionStep<R: CommandRunner> {
    shell: SharedShell<R>,
    provisioners: Provisioners,
}

impl<R: CommandRunner> ProvisionStep<R> {
    /// Creates the step.
    #[must_use]
    pub const fn new(shell: SharedShell<R>, provisioners: Provisioners) -> Self {
        Self {
            shell,
            provisioners,
        }
    }

    async fn provision(&self, state: &BuildState, ctx: &StepContext) -> Result<(), BuildError> {
        for command in &self.provisioners.commands {
            if ctx.cancel().is_cancelled() {
                return Err(BuildError::Cancelled);
            }
            ctx.ui()
                .say(&format!("Provisioning with command: {command}"));
            run_remote(&self.shell, state, ctx, command).await?;
        }

        for script in &self.provisioners.scripts {
            if ctx.cancel().is_cancelled() {
                return Err(BuildError::Cancelled);
            }
            ctx.ui()
                .say(&format!("Provisioning with script: {script}"));
            let contents = read_script(script)?;
            self.run_script(state, ctx, script, &contents).await?;
        }
        Ok(())
    }

    async fn run_script(
        &self,
        state: &BuildState,
        ctx: &StepContext,
        script: &Utf8Path,
        contents: &str,
    ) -> Result<(), BuildError> {
        let host = state.require_instance_ip()?;
        let command = script_command(contents);
        let output = tokio::select! {
            biased;
            () = ctx.cancel().cancelled() => return Err(BuildError::Cancelled),
            outcome = self.shell.run(host, identity(state), &command) => {
                outcome.map_err(|err| remote_error(&err))?
            }
        };
        if output.is_success() {
            return Ok(());
        }
        Err(BuildError::Remote {
            message: format!(
                "script {script} exited with status {}: {}",
                output.status_text(),
                output.stderr.trim()
            ),
        })
    }
}

fn read_script(path: &Utf8Path) -> Result<String, BuildError> {
    let script_error = |message: String| BuildError::Script {
        path: path.to_path_buf(),
        message,
    };
    let (dir_path, file_path) = if path.is_absolute() {
        let parent = path
            .parent()
            .ok_or_else(|| script_error(String::from("path has no parent directory")))?;
        let file_name = path
            .file_name()
            .ok_or_else(|| script_error(String::from("path has no file name")))?;
        (parent, Utf8Path::new(file_name))
    } else {
        (Utf8Path::new("."), path)
    };

    let dir = Dir::open_ambient_dir(dir_path, ambient_authority())
        .map_err(|err| script_error(err.to_string()))?;
    dir.read_to_string(file_path)
        .map_err(|err| script_error(err.to_string()))
}

impl<R: CommandRunner> Step for ProvisionStep<R> {
    fn name(&self) -> &'static str {
        "provision"
    }

    fn run<'a>(
        &'a mut self,
        state: &'a mut BuildState,
        ctx: &'a StepContext,
    ) -> StepFuture<'a, StepAction> {
        Box::pin(async move {
            if self.provisioners.is_empty() {
                ctx.ui().say("No provisioners configured");
                return StepAction::Continue;
            }
            match self.provision(state, ctx).await {
                Ok(()) => StepAction::Continue,
                Err(err) => fail(state, ctx, err),
            }
        })
    }
}
