//! hpcbench CLI - Benchmark Orchestration for HPC Clusters
//!
//! Runs and auto-tunes HPL, and exposes the planners behind it.

use clap::Parser;
use hpcbench::config::{
    CliArgs, Commands, HarnessSettings, HplArgs, OutputFormat, RunConfiguration, SessionLayout,
};
use hpcbench::error::{HarnessError, Result};
use hpcbench::harness::{
    Builder, CommandBuilder, CommandSpec, ExecutionEnvironment, Executor, Harness, Prebuilt,
    ProcessExecutor,
};
use hpcbench::hpl::{HplParser, HplWorkload};
use hpcbench::results::render_as;
use hpcbench::system::{
    allocated_hosts, format_affinity, host_memory_bytes, matrix_dimension, parse_gpu_numa,
    process_grid, total_memory_bytes, NumaTopology, SchedulerType, SocketTopology,
};
use hpcbench::tuner::{AutoTuner, MemoryBudget, SweepSpace};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Initialize logging; RUST_LOG wins over -v/-q
    let directive = match (args.quiet, args.verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive)),
        )
        .with_target(false)
        .init();

    // Handle result
    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        if let Some(tail) = e.stderr_tail(20) {
            eprintln!("{}", tail);
        }
        std::process::exit(1);
    }
}

fn run(args: CliArgs) -> Result<()> {
    match &args.command {
        Commands::Hpl(hpl) => cmd_hpl(&args, hpl),
        Commands::Grid { ranks } => cmd_grid(*ranks, args.output_format),
        Commands::Size {
            memory,
            devices,
            nodes,
            utilization,
            element_bytes,
            rounding,
        } => cmd_size(memory.as_deref(), *devices, *nodes, *utilization, *element_bytes, *rounding),
        Commands::Affinity { devices, sockets, gpu } => cmd_affinity(*devices, sockets, *gpu),
        Commands::Topology => cmd_topology(),
    }
}

fn cmd_grid(ranks: usize, format: OutputFormat) -> Result<()> {
    let grid = process_grid(ranks)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(&grid)?),
        OutputFormat::Csv => println!("p,q\n{},{}", grid.p, grid.q),
        OutputFormat::Text => println!("{}", grid),
    }
    Ok(())
}

fn memory_bytes(memory: Option<&str>) -> Result<f64> {
    match memory {
        Some(size) => hpcbench::config::parse_size(size)
            .map(|bytes| bytes as f64)
            .map_err(HarnessError::config),
        None => Ok(host_memory_bytes() as f64),
    }
}

fn cmd_size(
    memory: Option<&str>,
    devices: usize,
    nodes: usize,
    utilization: f64,
    element_bytes: u64,
    rounding: u64,
) -> Result<()> {
    let total = total_memory_bytes(memory_bytes(memory)?, devices, nodes);
    let n = matrix_dimension(total, utilization, element_bytes, rounding)?;

    println!("Memory:    {}", humansize::format_size(total as u64, humansize::BINARY));
    println!("Used:      {:.0}%", utilization * 100.0);
    println!("N:         {}", n);
    Ok(())
}

fn gpu_sockets() -> Result<SocketTopology> {
    let command = CommandSpec::new("nvidia-smi").args(["topo", "-m"]);
    let output = ProcessExecutor.execute(&command, &ExecutionEnvironment::new())?;
    let nodes = parse_gpu_numa(&output.stdout);
    if nodes.is_empty() {
        return Err(HarnessError::config(
            "no GPU rows in `nvidia-smi topo -m`; pass the layout explicitly",
        ));
    }
    Ok(SocketTopology::from_device_nodes(&nodes))
}

fn cmd_affinity(devices: usize, sockets: &[usize], gpu: bool) -> Result<()> {
    let topology = if !sockets.is_empty() {
        SocketTopology::new(sockets.to_vec())
    } else if gpu {
        gpu_sockets()?
    } else {
        NumaTopology::detect().socket_topology()
    };

    println!("{}", format_affinity(&topology.affinity(devices)?));
    Ok(())
}

fn cmd_topology() -> Result<()> {
    NumaTopology::detect().print_summary();

    println!();
    println!("Host memory: {}", humansize::format_size(host_memory_bytes(), humansize::BINARY));
    println!("Scheduler:   {}", SchedulerType::detect().name());
    println!("Hosts:       {}", allocated_hosts().join(","));
    Ok(())
}

fn cmd_hpl(cli: &CliArgs, hpl: &HplArgs) -> Result<()> {
    let settings = HarnessSettings::from_cli(cli)?;
    let layout = SessionLayout::new(&cli.prefix, cli.outdir.as_deref());
    layout.create()?;
    info!("Session output: {}", layout.output.display());

    let hosts = if hpl.hosts.is_empty() {
        allocated_hosts()
    } else {
        hpl.hosts.clone()
    };
    let nodes = hpl.nodes.unwrap_or(hosts.len());

    // GPU mode places one rank per GPU; CPU mode defaults to one rank per
    // NUMA node and checks ranks against the detected CPU slots
    let (tasks, sockets) = if hpl.gpu > 0 {
        let sockets = if hpl.device_per_socket.is_empty() {
            gpu_sockets()?
        } else {
            SocketTopology::new(hpl.device_per_socket.clone())
        };
        (hpl.tasks.unwrap_or(hpl.gpu), sockets)
    } else {
        let numa = NumaTopology::detect();
        (hpl.tasks.unwrap_or(numa.nodes.len()), numa.socket_topology())
    };

    let (workload, builder): (HplWorkload, Box<dyn Builder>) = match &hpl.sif {
        Some(sif) => (
            HplWorkload::container(hosts, sockets).with_ai(hpl.ai),
            Box::new(Prebuilt::new(sif)) as Box<dyn Builder>,
        ),
        None if hpl.ai => {
            return Err(HarnessError::config("HPL-AI is only available through --sif"));
        }
        None => {
            let binary = hpl.binary.clone().unwrap_or_else(|| layout.bin.join("xhpl"));
            let builder: Box<dyn Builder> = match &hpl.build_script {
                Some(script) => Box::new(
                    CommandBuilder::new(&binary)
                        .step(CommandSpec::new("sh").arg(script.display().to_string()))
                        .log_to(layout.build.join("build.log")),
                ),
                None => Box::new(Prebuilt::new(&binary)),
            };
            (HplWorkload::native(binary, hosts, sockets), builder)
        }
    };

    let mut harness = Harness::new(
        settings,
        Box::new(workload),
        builder,
        Box::new(ProcessExecutor),
        Box::new(HplParser),
    );
    if hpl.skip_prerequisites {
        harness = harness.skip_prerequisites();
    }

    let mut run = RunConfiguration::builder()
        .nodes(nodes)
        .tasks_per_node(tasks)
        .omp_threads(hpl.omp)
        .gpu_count(hpl.gpu)
        .block_size(hpl.blocksize)
        .knobs(&hpl.knobs());
    if let (Some(p), Some(q)) = (hpl.pgrid, hpl.qgrid) {
        run = run.grid(hpcbench::system::ProcessGrid { p, q });
    }
    if let Some(size) = hpl.size {
        run = run.problem_size(size);
    }
    if let Some(sif) = &hpl.sif {
        run = run.container_image(sif);
    }

    let space = match &hpl.sweep {
        Some(path) => SweepSpace::from_file(path)?,
        None => SweepSpace::hpl_default(),
    };
    let tuner = AutoTuner::new(space, layout.output.join("tuned")).with_utilization(hpl.utilization);

    let budget = if hpl.size.is_some() {
        None
    } else if hpl.gpu > 0 && hpl.memory.is_none() {
        return Err(HarnessError::config(
            "--size or --memory (per GPU) is required with GPUs",
        ));
    } else {
        Some(MemoryBudget {
            per_device_bytes: memory_bytes(hpl.memory.as_deref())?,
            devices_per_node: hpl.gpu.max(1),
            nodes,
        })
    };

    if hpl.autotune {
        let sweep_dir = layout.output.join("sweep");
        run = run
            .input_deck(sweep_dir.join("HPL.dat"))
            .output_log(sweep_dir.join("HPL.log"));

        let outcome = match &budget {
            Some(budget) => tuner.tune(&mut harness, run, budget)?,
            None => tuner.sweep(&mut harness, &run.build()?)?,
        };

        if !cli.quiet {
            println!("{}", render_as(&outcome.ranking_store()?, cli.output_format)?.trim_end());
        }
        info!(
            "Skipped {} of {} sweep points",
            outcome.skipped,
            tuner.space().len()
        );
        for artifact in &outcome.artifacts {
            println!("Tuned: {}", artifact.display());
        }
        return Ok(());
    }

    if let Some(budget) = &budget {
        run = tuner.size(run, budget)?;
    }
    let name = if hpl.ai { "HPL-AI" } else { "HPL" };
    let run = run
        .input_deck(layout.output.join("HPL.dat"))
        .output_log(layout.output.join(format!("{}.out", name)))
        .build()?;

    harness.execute(&run)?;
    if !cli.quiet {
        println!("{}", render_as(harness.store(), cli.output_format)?.trim_end());
    }
    Ok(())
}
