//! simkernel launcher
//!
//! Loads a configuration, boots the kernel with its workload and runs the
//! kernel loop to completion.

use clap::{Parser, Subcommand};
use simkernel::sys::SchedulingPolicy;
use simkernel::{Kernel, KernelConfig, KernelResult};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Kernel control plane simulator
#[derive(Parser)]
#[command(name = "simkernel")]
#[command(author = "μOS Project")]
#[command(version)]
#[command(about = "Kernel control plane simulator", long_about = None)]
struct Cli {
    /// Verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file path (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Scheduling policy (fcfs, srtf, hrrn)
    #[arg(short, long, global = true)]
    policy: Option<SchedulingPolicy>,

    /// Timer interval, e.g. "50ms"
    #[arg(long, global = true, value_parser = humantime_serde::re::humantime::parse_duration)]
    interval: Option<Duration>,

    /// Disable the interval timer
    #[arg(long, global = true)]
    no_timer: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Boot the configured workload and run it to completion
    Run,
    /// Validate the configuration and print it
    Check,
    /// Write the default configuration to a file
    Init {
        /// Output path
        output: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(cli.verbose, &config.log_level);

    let result = match &cli.command {
        Some(Commands::Check) => check_config(&config),
        Some(Commands::Init { output }) => KernelConfig::default().save(output).map(|()| {
            println!("Wrote default configuration to {}", output.display());
        }),
        Some(Commands::Run) | None => run_kernel(config),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8, configured: &str) {
    let log_level = match verbose {
        0 => configured,
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(log_level)))
        .init();
}

fn load_config(cli: &Cli) -> KernelResult<KernelConfig> {
    let mut config = match &cli.config {
        Some(path) => KernelConfig::load(path)?,
        None => KernelConfig::default(),
    };

    // Override with CLI args
    if let Some(policy) = cli.policy {
        config.scheduler.policy = policy;
    }

    if let Some(interval) = cli.interval {
        config.timer.interval = interval;
    }

    if cli.no_timer {
        config.timer.enabled = false;
    }

    config.validate()?;

    Ok(config)
}

fn check_config(config: &KernelConfig) -> KernelResult<()> {
    println!("Configuration check:");
    println!("  Memory:    {} frames x {} KB", config.memory.total_frames, config.memory.frame_size_kb);
    println!(
        "  Resources: CPU={} Disk={} Printer={}",
        config.resources.cpu, config.resources.disk, config.resources.printer
    );
    println!("  Policy:    {} (max {} steps)", config.scheduler.policy, config.scheduler.max_steps);
    println!(
        "  Timer:     {} every {:?}",
        if config.timer.enabled { "enabled" } else { "disabled" },
        config.timer.interval
    );
    println!("  Workload:  {} processes", config.workload.len());
    println!("Configuration OK");
    Ok(())
}

fn run_kernel(config: KernelConfig) -> KernelResult<()> {
    let policy = config.scheduler.policy;
    let mut kernel = Kernel::new(config)?;
    kernel.boot()?;

    println!("Initial resources:");
    for pool in kernel.scheduler().resource_pool_status() {
        println!("  {:<8} {:>5}/{:<5}", pool.kind.to_string(), pool.available, pool.total);
    }
    println!("Memory utilization: {:.1}%", kernel.scheduler().memory_utilization());

    let summary = kernel.run(policy)?;
    let timer_ticks = kernel.interrupts().timer_ticks();
    kernel.shutdown();

    println!();
    println!("{} run finished at t={} after {} steps", policy, summary.final_time, summary.steps);
    for (pid, finished_at) in &summary.completed {
        println!("  process {:<6} completed at t={}", pid, finished_at);
    }
    println!("Timer interrupts: {}", timer_ticks);

    let pending = kernel.scheduler().process_count();
    if pending > 0 {
        println!("{} processes still pending", pending);
    }

    Ok(())
}
