//! Process-backed executor and builders

use crate::error::{HarnessError, IoResultExt, Result};
use crate::harness::strategy::{Builder, CommandOutput, CommandSpec, ExecutionEnvironment, Executor};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// Runs commands as child processes, blocking until they exit
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExecutor;

impl Executor for ProcessExecutor {
    fn execute(&self, command: &CommandSpec, env: &ExecutionEnvironment) -> Result<CommandOutput> {
        let mut child = Command::new(&command.program);
        child.args(&command.args).envs(env.iter());
        if let Some(dir) = &command.workdir {
            child.current_dir(dir);
        }

        debug!("exec: {}", command);
        let output = child.output().map_err(|e| HarnessError::Execution {
            command: command.to_string(),
            exit_code: None,
            stderr: e.to_string(),
        })?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }
}

/// Builds the target by running a list of commands in order
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    target: PathBuf,
    steps: Vec<CommandSpec>,
    log: Option<PathBuf>,
}

impl CommandBuilder {
    /// Builder producing `target`
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            steps: Vec::new(),
            log: None,
        }
    }

    /// Append a build step
    pub fn step(mut self, command: CommandSpec) -> Self {
        self.steps.push(command);
        self
    }

    /// Append the output of every step to `path`
    pub fn log_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.log = Some(path.into());
        self
    }

    fn append_log(&self, command: &CommandSpec, output: &CommandOutput) -> Result<()> {
        let Some(path) = &self.log else {
            return Ok(());
        };
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_path(path)?;
        write!(file, "=> {}\n{}", command, output.combined()).with_path(path)
    }
}

impl Builder for CommandBuilder {
    fn target(&self) -> &Path {
        &self.target
    }

    fn build(&self) -> Result<()> {
        let target = self.target.display().to_string();

        for step in &self.steps {
            info!("=> {}", step);
            let output = ProcessExecutor
                .execute(step, &ExecutionEnvironment::new())
                .map_err(|e| HarnessError::Build {
                    target: target.clone(),
                    stderr: e.to_string(),
                })?;
            self.append_log(step, &output)?;

            if output.exit_code != Some(0) {
                return Err(HarnessError::Build {
                    target,
                    stderr: output.stderr,
                });
            }
        }

        if !self.target.exists() {
            return Err(HarnessError::Build {
                target,
                stderr: "build finished without producing the target".to_string(),
            });
        }
        Ok(())
    }
}

/// A binary or image that is installed out of band and cannot be built here
#[derive(Debug, Clone)]
pub struct Prebuilt {
    target: PathBuf,
}

impl Prebuilt {
    /// Expect `target` to exist already
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

impl Builder for Prebuilt {
    fn target(&self) -> &Path {
        &self.target
    }

    fn build(&self) -> Result<()> {
        Err(HarnessError::Build {
            target: self.target.display().to_string(),
            stderr: "not found and no build recipe is configured".to_string(),
        })
    }
}
