//! HPL launch: input artifacts and the MPI command line

use crate::config::RunConfiguration;
use crate::error::{HarnessError, IoResultExt, Result};
use crate::harness::prerequisite::Requirement;
use crate::harness::strategy::{CommandSpec, Configurator, ExecutionEnvironment};
use crate::hpl::deck::HplDeck;
use crate::system::hpc::Hostfile;
use crate::system::topology::{format_affinity, SocketTopology};
use std::path::PathBuf;
use tracing::debug;

/// Name of the generated hostfile
pub const HOSTFILE: &str = "hostfile";

/// Name of the generated launch script
pub const RUN_SCRIPT: &str = "run.sh";

/// How the benchmark binary is started
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchMode {
    /// A native `xhpl` binary on the CPUs
    Native {
        /// Path of the binary
        binary: PathBuf,
    },
    /// The NVIDIA HPL container on the GPUs; the image is the run's
    /// `container_image`
    Container,
}

/// One physical line of the launch command
#[derive(Debug, Clone, PartialEq, Eq)]
struct LaunchLine {
    indent: usize,
    words: Vec<String>,
}

fn launch_line(indent: usize, words: &[&str]) -> LaunchLine {
    LaunchLine {
        indent,
        words: words.iter().map(|w| w.to_string()).collect(),
    }
}

/// HPL workload: writes HPL.dat, the hostfile and run.sh, and assembles
/// the `mpirun` command
#[derive(Debug, Clone)]
pub struct HplWorkload {
    mode: LaunchMode,
    hosts: Vec<String>,
    sockets: SocketTopology,
    ai: bool,
}

impl HplWorkload {
    /// Native CPU workload
    pub fn native(binary: impl Into<PathBuf>, hosts: Vec<String>, sockets: SocketTopology) -> Self {
        Self {
            mode: LaunchMode::Native {
                binary: binary.into(),
            },
            hosts,
            sockets,
            ai: false,
        }
    }

    /// Containerised GPU workload
    pub fn container(hosts: Vec<String>, sockets: SocketTopology) -> Self {
        Self {
            mode: LaunchMode::Container,
            hosts,
            sockets,
            ai: false,
        }
    }

    /// Run the mixed-precision HPL-AI variant (container only)
    pub fn with_ai(mut self, ai: bool) -> Self {
        self.ai = ai;
        self
    }

    /// Launch mode
    pub fn mode(&self) -> &LaunchMode {
        &self.mode
    }

    fn hostfile(&self, run: &RunConfiguration) -> Result<Hostfile> {
        if self.hosts.len() < run.nodes() {
            return Err(HarnessError::config(format!(
                "{} nodes requested but only {} hosts are available",
                run.nodes(),
                self.hosts.len()
            )));
        }
        Ok(Hostfile::new(&self.hosts, run.nodes(), run.tasks_per_node()))
    }

    fn environment(&self, run: &RunConfiguration) -> ExecutionEnvironment {
        let env = ExecutionEnvironment::new().set("OMP_NUM_THREADS", run.omp_threads());
        match self.mode {
            LaunchMode::Container => {
                let devices: Vec<String> = (0..run.gpu_count()).map(|d| d.to_string()).collect();
                env.set("CUDA_VISIBLE_DEVICES", devices.join(","))
            }
            LaunchMode::Native { .. } => env
                .set("OMP_PLACES", "threads")
                .set("OMP_PROC_BIND", "spread"),
        }
    }

    fn lines(&self, run: &RunConfiguration) -> Result<Vec<LaunchLine>> {
        let ranks = run.ranks().to_string();
        let mut lines = vec![
            launch_line(0, &["mpirun"]),
            launch_line(4, &["--np", ranks.as_str()]),
            launch_line(4, &["--hostfile", HOSTFILE]),
            launch_line(4, &["--mca", "btl", "^openib"]),
        ];

        match &self.mode {
            LaunchMode::Container => {
                let image = run.paths().container_image.as_ref().ok_or_else(|| {
                    HarnessError::config("the HPL container launch needs a container image")
                })?;
                if !run.uses_gpus() {
                    return Err(HarnessError::config(
                        "the HPL container needs at least one GPU per node",
                    ));
                }
                if run.tasks_per_node() != run.gpu_count() {
                    return Err(HarnessError::config(format!(
                        "HPL requires one rank per GPU ({} tasks, {} GPUs per node)",
                        run.tasks_per_node(),
                        run.gpu_count()
                    )));
                }

                let affinity = format_affinity(&self.sockets.affinity(run.gpu_count())?);
                let gpus: Vec<usize> = (0..run.gpu_count()).collect();
                let gpu_affinity = format_affinity(&gpus);
                let deck = run
                    .paths()
                    .input_deck
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "HPL.dat".to_string());
                let image = image.display().to_string();
                let omp = run.omp_threads().to_string();

                lines.extend([
                    launch_line(4, &["singularity"]),
                    launch_line(8, &["run"]),
                    launch_line(8, &["--nv"]),
                    launch_line(8, &[image.as_str()]),
                    launch_line(8, &["hpl.sh"]),
                    launch_line(12, &["--dat", deck.as_str()]),
                    launch_line(12, &["--cpu-cores-per-rank", omp.as_str()]),
                    launch_line(12, &["--cpu-affinity", affinity.as_str()]),
                    launch_line(12, &["--mem-affinity", affinity.as_str()]),
                    launch_line(12, &["--gpu-affinity", gpu_affinity.as_str()]),
                ]);
                if self.ai {
                    lines.push(launch_line(12, &["--xhpl-ai"]));
                }
            }
            LaunchMode::Native { binary } => {
                if run.uses_gpus() {
                    return Err(HarnessError::config(
                        "the native xhpl binary runs on CPUs only; use a container image for GPUs",
                    ));
                }
                if run.paths().input_deck.file_name().map_or(true, |n| n != "HPL.dat") {
                    return Err(HarnessError::config("xhpl reads its input from ./HPL.dat"));
                }

                // Ranks must fit the CPU slots of the socket layout; mpirun does the binding
                let affinity = self.sockets.affinity(run.tasks_per_node())?;
                debug!("rank to socket map: {}", format_affinity(&affinity));

                let ppr = format!("ppr:{}:node:pe={}", run.tasks_per_node(), run.omp_threads());
                let binary = binary.display().to_string();
                lines.extend([
                    launch_line(4, &["--map-by", ppr.as_str()]),
                    launch_line(4, &["--bind-to", "core"]),
                    launch_line(4, &[binary.as_str()]),
                ]);
            }
        }

        Ok(lines)
    }

    /// Command for `run` with its working directory set to the deck directory
    pub fn launch_command(&self, run: &RunConfiguration) -> Result<CommandSpec> {
        let lines = self.lines(run)?;
        let mut words = lines.into_iter().flat_map(|l| l.words);
        let program = words
            .next()
            .ok_or_else(|| HarnessError::config("empty launch command"))?;
        Ok(CommandSpec::new(program)
            .args(words)
            .current_dir(run.paths().work_dir()))
    }

    /// Shell script reproducing the launch: environment exports followed by
    /// the command, one column-aligned line per option
    pub fn script(&self, run: &RunConfiguration) -> Result<String> {
        let lines: Vec<String> = self
            .lines(run)?
            .into_iter()
            .map(|l| format!("{}{}", " ".repeat(l.indent), l.words.join(" ")))
            .collect();
        let width = lines.iter().map(String::len).max().unwrap_or(0);

        let mut script = String::new();
        for (name, value) in self.environment(run).iter() {
            script.push_str(&format!("export {}={}\n", name, value));
        }
        script.push('\n');
        script.push_str(
            &lines
                .iter()
                .map(|l| format!("{:<width$} ", l, width = width))
                .collect::<Vec<_>>()
                .join("\\\n"),
        );
        script.push('\n');

        Ok(script)
    }
}

impl Configurator for HplWorkload {
    fn name(&self) -> &str {
        if self.ai {
            "HPL-AI"
        } else {
            "HPL"
        }
    }

    fn requirements(&self) -> Vec<Requirement> {
        match self.mode {
            LaunchMode::Container => vec![
                Requirement::new("singularity", "3.4.1"),
                Requirement::new("openmpi", "4.0.0"),
                Requirement::new("nvidia", "450.36"),
                Requirement::new("connectx", "4"),
            ],
            LaunchMode::Native { .. } => vec![Requirement::new("openmpi", "4.0.0")],
        }
    }

    fn write_artifacts(&self, run: &RunConfiguration) -> Result<Vec<PathBuf>> {
        let dir = run.paths().work_dir();
        let deck_path = run.paths().input_deck.clone();
        let hostfile_path = dir.join(HOSTFILE);
        let script_path = dir.join(RUN_SCRIPT);

        // Assemble everything first so a bad configuration writes nothing
        let deck = HplDeck::from_run(run);
        deck.render()?;
        let hostfile = self.hostfile(run)?;
        let script = self.script(run)?;

        deck.write(&deck_path)?;
        hostfile.write(&hostfile_path)?;
        std::fs::write(&script_path, script).with_path(&script_path)?;

        Ok(vec![deck_path, hostfile_path, script_path])
    }

    fn command(&self, run: &RunConfiguration) -> Result<(CommandSpec, ExecutionEnvironment)> {
        self.hostfile(run)?;
        Ok((self.launch_command(run)?, self.environment(run)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn hosts() -> Vec<String> {
        vec!["gpu01".to_string(), "gpu02".to_string()]
    }

    fn gpu_run(dir: &Path) -> RunConfiguration {
        RunConfiguration::builder()
            .nodes(2)
            .tasks_per_node(2)
            .omp_threads(4)
            .gpu_count(2)
            .problem_size(100_000)
            .block_size(288)
            .container_image("/opt/hpl.sif")
            .input_deck(dir.join("HPL.dat"))
            .output_log(dir.join("HPL.log"))
            .build()
            .unwrap()
    }

    fn cpu_run(dir: &Path) -> RunConfiguration {
        RunConfiguration::builder()
            .tasks_per_node(4)
            .omp_threads(8)
            .problem_size(60_000)
            .input_deck(dir.join("HPL.dat"))
            .output_log(dir.join("HPL.log"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_container_command() {
        let workload =
            HplWorkload::container(hosts(), SocketTopology::new(vec![0, 2]));
        let run = gpu_run(Path::new("/out"));
        let (cmd, env) = workload.command(&run).unwrap();

        assert_eq!(
            cmd.to_string(),
            "mpirun --np 4 --hostfile hostfile --mca btl ^openib singularity run --nv \
             /opt/hpl.sif hpl.sh --dat HPL.dat --cpu-cores-per-rank 4 --cpu-affinity 1:1 \
             --mem-affinity 1:1 --gpu-affinity 0:1"
        );
        assert_eq!(cmd.workdir.as_deref(), Some(Path::new("/out")));
        assert_eq!(env.get("CUDA_VISIBLE_DEVICES"), Some("0,1"));
        assert_eq!(env.get("OMP_NUM_THREADS"), Some("4"));
    }

    #[test]
    fn test_ai_flag() {
        let workload = HplWorkload::container(hosts(), SocketTopology::new(vec![1, 1]))
            .with_ai(true);
        let cmd = workload.launch_command(&gpu_run(Path::new("/out"))).unwrap();
        assert_eq!(cmd.args.last().map(String::as_str), Some("--xhpl-ai"));
        assert_eq!(workload.name(), "HPL-AI");
    }

    #[test]
    fn test_one_rank_per_gpu() {
        let workload = HplWorkload::container(hosts(), SocketTopology::new(vec![2, 2]));
        let run = RunConfiguration::builder()
            .tasks_per_node(4)
            .gpu_count(2)
            .problem_size(1000)
            .container_image("hpl.sif")
            .input_deck("HPL.dat")
            .output_log("HPL.log")
            .build()
            .unwrap();
        assert!(matches!(workload.command(&run), Err(HarnessError::Configuration(_))));
    }

    #[test]
    fn test_too_few_devices_on_sockets() {
        let workload = HplWorkload::container(hosts(), SocketTopology::new(vec![0, 1]));
        assert!(workload.command(&gpu_run(Path::new("/out"))).is_err());
    }

    #[test]
    fn test_native_command() {
        let workload = HplWorkload::native("/prefix/bin/xhpl", hosts(), SocketTopology::new(vec![2, 2]));
        let (cmd, env) = workload.command(&cpu_run(Path::new("/out"))).unwrap();

        assert_eq!(
            cmd.to_string(),
            "mpirun --np 4 --hostfile hostfile --mca btl ^openib --map-by ppr:4:node:pe=8 \
             --bind-to core /prefix/bin/xhpl"
        );
        assert_eq!(env.get("OMP_PROC_BIND"), Some("spread"));
        assert!(env.get("CUDA_VISIBLE_DEVICES").is_none());
    }

    #[test]
    fn test_native_ranks_exceed_cpu_slots() {
        let workload = HplWorkload::native("xhpl", hosts(), SocketTopology::new(vec![2, 1]));
        let err = workload.command(&cpu_run(Path::new("/out"))).unwrap_err();
        assert!(matches!(err, HarnessError::Configuration(_)));
    }

    #[test]
    fn test_container_needs_image() {
        let workload = HplWorkload::container(hosts(), SocketTopology::new(vec![1, 1]));
        let run = RunConfiguration::builder()
            .tasks_per_node(2)
            .gpu_count(2)
            .problem_size(1000)
            .input_deck("HPL.dat")
            .output_log("HPL.log")
            .build()
            .unwrap();
        assert!(matches!(workload.command(&run), Err(HarnessError::Configuration(_))));
        assert_eq!(workload.mode(), &LaunchMode::Container);
    }

    #[test]
    fn test_native_rejects_gpus() {
        let workload = HplWorkload::native("xhpl", hosts(), SocketTopology::new(vec![2, 2]));
        assert!(workload.command(&gpu_run(Path::new("/out"))).is_err());
    }

    #[test]
    fn test_not_enough_hosts() {
        let workload = HplWorkload::container(vec!["gpu01".into()], SocketTopology::new(vec![1, 1]));
        assert!(workload.command(&gpu_run(Path::new("/out"))).is_err());
    }

    #[test]
    fn test_script_alignment() {
        let workload = HplWorkload::container(hosts(), SocketTopology::new(vec![1, 1]));
        let script = workload.script(&gpu_run(Path::new("/out"))).unwrap();
        let mut parts = script.split("\n\n");
        let exports = parts.next().unwrap();
        let command = parts.next().unwrap();

        assert_eq!(exports, "export CUDA_VISIBLE_DEVICES=0,1\nexport OMP_NUM_THREADS=4");
        let lines: Vec<&str> = command.lines().collect();
        assert!(lines[0].starts_with("mpirun "));
        assert!(lines[1].starts_with("    --np 4"));
        assert!(lines.iter().take(lines.len() - 1).all(|l| l.ends_with(" \\")));
        let width = lines[0].len();
        assert!(lines.iter().take(lines.len() - 1).all(|l| l.len() == width));
        assert!(lines.last().unwrap().trim_end().ends_with("--gpu-affinity 0:1"));
    }

    #[test]
    fn test_artifacts_are_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let workload = HplWorkload::container(hosts(), SocketTopology::new(vec![1, 1]));
        let run = gpu_run(dir.path());

        let paths = workload.write_artifacts(&run).unwrap();
        let first: Vec<Vec<u8>> = paths.iter().map(|p| std::fs::read(p).unwrap()).collect();
        workload.write_artifacts(&run).unwrap();
        let second: Vec<Vec<u8>> = paths.iter().map(|p| std::fs::read(p).unwrap()).collect();

        assert_eq!(first, second);
        assert_eq!(
            std::fs::read_to_string(dir.path().join(HOSTFILE)).unwrap(),
            "gpu01 slots=2\ngpu02 slots=2\n"
        );
    }

    #[test]
    fn test_bad_run_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let workload = HplWorkload::container(hosts(), SocketTopology::new(vec![0, 1]));
        assert!(workload.write_artifacts(&gpu_run(dir.path())).is_err());
        assert!(!dir.path().join("HPL.dat").exists());
    }

    #[test]
    fn test_requirements() {
        let container = HplWorkload::container(hosts(), SocketTopology::default());
        let tools: Vec<String> = container.requirements().into_iter().map(|r| r.tool).collect();
        assert_eq!(tools, vec!["singularity", "openmpi", "nvidia", "connectx"]);
    }
}
