//! The harness state machine
//!
//! One [`Harness`] drives a benchmark through
//! `CREATED -> PREREQUISITES_CHECKED -> BUILT -> CONFIGURED -> RUNNING ->
//! PARSED -> RECORDED`, once for prerequisites and build and then once per
//! run configuration. Every collaborator failure moves it to `FAILED`.

use crate::config::{HarnessSettings, RunConfiguration};
use crate::error::{HarnessError, IoResultExt, Result};
use crate::harness::prerequisite::Requirement;
use crate::harness::state::HarnessState;
use crate::harness::strategy::{Builder, CommandOutput, Configurator, Executor, Parser};
use crate::results::{ResultKey, ResultStore, Sample};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Outcome of one run configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// Key the samples were recorded under
    pub key: ResultKey,
    /// Captured output of every repeat
    pub outputs: Vec<PathBuf>,
    /// Repeats whose output held no parseable metrics
    pub parse_misses: usize,
}

/// Benchmark harness parameterized by its strategies
pub struct Harness {
    settings: HarnessSettings,
    requirements: Vec<Requirement>,
    configurator: Box<dyn Configurator>,
    builder: Box<dyn Builder>,
    executor: Box<dyn Executor>,
    parser: Box<dyn Parser>,
    state: HarnessState,
    ready: bool,
    store: ResultStore,
}

impl Harness {
    /// Create a harness; requirements come from the configurator
    pub fn new(
        settings: HarnessSettings,
        configurator: Box<dyn Configurator>,
        builder: Box<dyn Builder>,
        executor: Box<dyn Executor>,
        parser: Box<dyn Parser>,
    ) -> Self {
        Self {
            settings,
            requirements: configurator.requirements(),
            configurator,
            builder,
            executor,
            parser,
            state: HarnessState::Created,
            ready: false,
            store: ResultStore::new(),
        }
    }

    /// Do not probe tool versions
    pub fn skip_prerequisites(mut self) -> Self {
        self.requirements.clear();
        self
    }

    /// Current lifecycle state
    pub fn state(&self) -> HarnessState {
        self.state
    }

    /// Settings in effect
    pub fn settings(&self) -> &HarnessSettings {
        &self.settings
    }

    /// Metrics tracked by the parser
    pub fn metrics(&self) -> Vec<String> {
        self.parser.metrics()
    }

    /// Samples recorded so far
    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    /// Consume the harness, keeping its results
    pub fn into_store(self) -> ResultStore {
        self.store
    }

    fn transition(&mut self, next: HarnessState) -> Result<()> {
        if !self.state.can_transition(next) {
            return Err(HarnessError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        debug!("{}: {} -> {}", self.configurator.name(), self.state, next);
        self.state = next;
        Ok(())
    }

    fn ensure(&self, next: HarnessState) -> Result<()> {
        if self.state.can_transition(next) {
            Ok(())
        } else {
            Err(HarnessError::InvalidTransition {
                from: self.state,
                to: next,
            })
        }
    }

    fn fail(&mut self, err: HarnessError) -> HarnessError {
        if err.is_fatal() {
            error!("{}: {}", self.configurator.name(), err);
        } else {
            warn!("{}: {}", self.configurator.name(), err);
        }
        self.state = HarnessState::Failed;
        err
    }

    /// Probe every required tool against its minimum version
    pub fn check_prerequisites(&mut self) -> Result<()> {
        self.ensure(HarnessState::PrerequisitesChecked)?;

        let failure = self
            .requirements
            .iter()
            .find_map(|requirement| requirement.check(self.executor.as_ref()).err());
        if let Some(err) = failure {
            return Err(self.fail(err));
        }
        self.transition(HarnessState::PrerequisitesChecked)
    }

    /// Build the benchmark unless its binary already exists
    pub fn build(&mut self) -> Result<()> {
        self.ensure(HarnessState::Built)?;

        let target = self.builder.target().to_path_buf();
        if target.exists() {
            info!("{} already built, skipping", target.display());
        } else {
            info!("Building {}", target.display());
            if let Err(err) = self.builder.build() {
                return Err(self.fail(err));
            }
            if !target.exists() {
                let err = HarnessError::Build {
                    target: target.display().to_string(),
                    stderr: "build reported success but the target is missing".to_string(),
                };
                return Err(self.fail(err));
            }
        }

        self.transition(HarnessState::Built)?;
        self.ready = true;
        Ok(())
    }

    /// Check prerequisites and build, once per harness
    pub fn prepare(&mut self) -> Result<()> {
        if self.ready {
            return Ok(());
        }
        self.check_prerequisites()?;
        self.build()
    }

    /// Write the input artifacts of `run`
    pub fn configure(&mut self, run: &RunConfiguration) -> Result<Vec<PathBuf>> {
        if !self.ready {
            return Err(HarnessError::InvalidTransition {
                from: self.state,
                to: HarnessState::Configured,
            });
        }
        self.ensure(HarnessState::Configured)?;

        let dir = run.paths().work_dir().to_path_buf();
        if let Err(err) = std::fs::create_dir_all(&dir).with_path(&dir) {
            return Err(self.fail(err));
        }

        let artifacts = match self.configurator.write_artifacts(run) {
            Ok(artifacts) => artifacts,
            Err(err) => return Err(self.fail(err)),
        };
        for artifact in &artifacts {
            info!("=> {}", artifact.display());
        }

        self.transition(HarnessState::Configured)?;
        Ok(artifacts)
    }

    /// Run the configured benchmark `repeat` times, parse and record
    pub fn run(&mut self, run: &RunConfiguration) -> Result<RunReport> {
        self.measure(run, self.settings.repeat, self.settings.append_output)
    }

    /// Full lifecycle for one run configuration
    pub fn execute(&mut self, run: &RunConfiguration) -> Result<RunReport> {
        self.prepare()?;
        self.configure(run)?;
        self.run(run)
    }

    /// Full lifecycle with a single repeat appended to the output log
    pub fn execute_once(&mut self, run: &RunConfiguration) -> Result<RunReport> {
        self.prepare()?;
        self.configure(run)?;
        self.measure(run, 1, true)
    }

    fn measure(&mut self, run: &RunConfiguration, count: usize, append: bool) -> Result<RunReport> {
        if self.state != HarnessState::Configured {
            return Err(HarnessError::InvalidTransition {
                from: self.state,
                to: HarnessState::Running,
            });
        }

        let (command, env) = match self.configurator.command(run) {
            Ok(assembled) => assembled,
            Err(err) => return Err(self.fail(err)),
        };
        let key = ResultKey::from(run);
        let metrics = self.parser.metrics();
        let mut report = RunReport {
            key: key.clone(),
            outputs: Vec::with_capacity(count),
            parse_misses: 0,
        };

        for repeat in 1..=count {
            if repeat > 1 && !self.settings.cooldown.is_zero() {
                debug!("Cooling down for {:?}", self.settings.cooldown);
                std::thread::sleep(self.settings.cooldown);
            }

            self.transition(HarnessState::Running)?;
            let log = repeat_path(&run.paths().output_log, repeat, count);
            info!("=> {} ({}/{})", log.display(), repeat, count);
            debug!("{}", command);

            let output = match self.executor.execute(&command, &env) {
                Ok(output) => output,
                Err(err) => return Err(self.fail(err)),
            };

            let accepted = output
                .exit_code
                .map_or(false, |code| self.settings.accepts(code));
            if !accepted {
                let failed_log = failed_path(&log);
                if let Err(err) = write_output(&failed_log, &output, append) {
                    return Err(self.fail(err));
                }
                let err = HarnessError::Execution {
                    command: command.to_string(),
                    exit_code: output.exit_code,
                    stderr: output.stderr,
                };
                return Err(self.fail(err));
            }

            if let Err(err) = write_output(&log, &output, append) {
                return Err(self.fail(err));
            }
            report.outputs.push(log.clone());
            self.transition(HarnessState::Parsed)?;

            match self.parser.parse(&output.combined()) {
                Ok(values) => {
                    for metric in &metrics {
                        let sample = values
                            .iter()
                            .find(|(name, _)| name == metric)
                            .map_or(Sample::Missing, |(_, v)| Sample::Value(*v));
                        self.store.record(&key, metric, sample);
                    }
                }
                Err(err) => {
                    warn!("{}: {}", log.display(), err);
                    report.parse_misses += 1;
                    for metric in &metrics {
                        self.store.record(&key, metric, Sample::Missing);
                    }
                }
            }
            self.transition(HarnessState::Recorded)?;
        }

        Ok(report)
    }
}

/// Output path of one repeat: suffixed with the index when repeating
pub fn repeat_path(base: &Path, repeat: usize, count: usize) -> PathBuf {
    if count > 1 {
        let mut name = base.as_os_str().to_os_string();
        name.push(format!(".{}", repeat));
        PathBuf::from(name)
    } else {
        base.to_path_buf()
    }
}

/// Where the output of a rejected execution is kept
pub fn failed_path(log: &Path) -> PathBuf {
    let mut name = log.as_os_str().to_os_string();
    name.push(".failed");
    PathBuf::from(name)
}

fn write_output(path: &Path, output: &CommandOutput, append: bool) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(path)
        .with_path(path)?;
    file.write_all(output.combined().as_bytes()).with_path(path)
}
