//! Thin demo binary (spec.md §6 "external collaborator"): the full
//! `stat`/`sample`/`record`/`list`/... CLI grammar is out of scope here,
//! so this only exercises `Engine` end to end — open the device, assign
//! a named metric to one core, run it for a timeout, print the result.

use clap::Parser;
use std::sync::Arc;
use wperf_agent::config::convert_timeout_arg_to_seconds;
use wperf_agent::metrics::lookup_builtin;
use wperf_agent::{AgentError, Engine, Result};
use wperf_core::CoreSlot;
use wperf_raw::SimBackend;

#[derive(Parser, Debug)]
#[command(name = "wperf-agent")]
#[command(about = "WindowsPerf metric-composition demo harness")]
struct Args {
    #[arg(short, long, default_value = "dcache", help = "Named metric to evaluate")]
    metric: String,

    #[arg(short, long, default_value_t = 0, help = "Core index to monitor")]
    core: u32,

    #[arg(long, default_value = "1s", help = "How long to collect before reading back")]
    timeout: String,

    #[arg(long, help = "Preempt an existing session lock holder")]
    force_lock: bool,

    #[arg(short, long, help = "Enable verbose logging")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt().with_max_level(log_level).init();

    let metric = lookup_builtin(&args.metric)
        .cloned()
        .ok_or_else(|| AgentError::UnknownEvent(args.metric.clone()))?;

    let timeout_secs = convert_timeout_arg_to_seconds(&args.timeout)?;

    tracing::info!(metric = %metric.name, core = args.core, "starting metric collection");

    let slots = vec![Arc::new(CoreSlot::new(args.core, SimBackend::new(), SimBackend::new()))];
    let spe_backends = vec![SimBackend::new()];
    let engine = Engine::new(slots, spe_backends);

    engine.open(args.force_lock)?;
    engine.assign_metric(0, metric, 0b1111_1111)?;
    engine.start(0, 100)?;

    tokio::time::sleep(std::time::Duration::from_secs_f64(timeout_secs)).await;

    engine.stop(0)?;
    let value = engine.read_metric_value(0)?;
    println!("{}: {value}", args.metric);

    engine.close()?;
    Ok(())
}
