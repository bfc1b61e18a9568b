//! Command implementations behind the CLI surface.

use std::error::Error;
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::time::{Duration, Instant};

use l1ne_common::config::{Config, ConfigLoader, ScenarioConfig};
use l1ne_common::consts::{SYSTEMD_BUFFER_SIZE_CAP, WAL_FILE_NAME};
use l1ne_sim::{ScenarioRunner, SimMetrics};
use l1ne_wal::{Payload, WalReader};
use l1ne_wal::WalWriter;
use tracing::{debug, info, warn};

use crate::cgroup::CgroupReader;
use crate::process::{ProcessSupervisor, SystemdRun, pid_alive};
use crate::proxy::Proxy;
use crate::supervisor::Orchestrator;

/// Poll interval while following a log [ms].
const FOLLOW_POLL_MS: u64 = 200;

/// `start`: load the config, deploy the fleet, accept and proxy.
///
/// Runs until the process is terminated — clean shutdown is the service
/// manager's job, and the WAL is append-only so a hard stop loses nothing
/// acknowledged.
pub fn start(config_path: &Path, bind: &str, state_dir: &Path) -> Result<(), Box<dyn Error>> {
    let config = Config::load(config_path)?;
    std::fs::create_dir_all(state_dir)?;
    let wal = WalWriter::create(&state_dir.join(WAL_FILE_NAME))?;

    let supervisor = SystemdRun::new(config.limits.systemd_buffer_size());
    let mut orchestrator = Orchestrator::new(config.limits, Box::new(supervisor), wal);
    orchestrator.deploy_all(&config)?;
    debug!(monitors = orchestrator.monitors().len(), "cgroup monitors active");

    let listener = TcpListener::bind(bind)?;
    info!(%bind, services = config.services.len(), "orchestrator up");
    let proxy = Proxy::new(
        orchestrator.limits(),
        orchestrator.instances(),
        orchestrator.wal(),
        orchestrator.clock(),
    );

    // Supervision pass once a second beside the acceptor.
    let orchestrator = std::sync::Arc::new(orchestrator);
    let watchdog = std::sync::Arc::clone(&orchestrator);
    std::thread::Builder::new()
        .name("l1ne-health".to_string())
        .spawn(move || {
            loop {
                watchdog.health_check();
                std::thread::sleep(Duration::from_secs(1));
            }
        })?;

    proxy.run_acceptor(listener)?;
    Ok(())
}

/// `status`: report every `l1ne-*` unit the service manager knows.
pub fn status() -> Result<(), Box<dyn Error>> {
    let supervisor = SystemdRun::new(SYSTEMD_BUFFER_SIZE_CAP);
    let units = supervisor.list_units("l1ne-*")?;
    if units.is_empty() {
        println!("no l1ne services running");
        return Ok(());
    }

    println!(
        "{:<28} {:<10} {:<10} {:<12} {:>12} {:>12}",
        "UNIT", "LOAD", "ACTIVE", "SUB", "MEMORY", "CPU µs"
    );
    for unit in &units {
        let status = supervisor.query_status(unit)?;
        let alive = status.main_pid.map(pid_alive).unwrap_or(false);
        let usage = CgroupReader::new(unit).usage().ok();
        println!(
            "{:<28} {:<10} {:<10} {:<12} {:>12} {:>12}",
            unit,
            status.load_state,
            if alive {
                status.active_state.clone()
            } else {
                format!("{} (gone)", status.active_state)
            },
            status.sub_state,
            usage
                .map(|u| format!("{}", u.memory_bytes))
                .unwrap_or_else(|| "-".to_string()),
            usage
                .map(|u| format!("{}", u.cpu_usage_usec))
                .unwrap_or_else(|| "-".to_string()),
        );
    }
    Ok(())
}

/// `wal`: pretty-print up to `lines` records; `--follow` keeps tailing.
pub fn wal(
    path: &Path,
    lines: usize,
    follow: bool,
    node: Option<&str>,
) -> Result<(), Box<dyn Error>> {
    if let Some(node) = node {
        // Single-node deployment: the filter exists for CLI compatibility.
        debug!(node, "node filter ignored");
    }

    let mut reader = WalReader::open(path)?;
    let mut printed = 0usize;
    loop {
        if !follow && printed >= lines {
            return Ok(());
        }
        match reader.read_entry()? {
            Some(entry) => {
                print_entry(reader.entries_read(), &entry);
                printed += 1;
            }
            None if follow => std::thread::sleep(Duration::from_millis(FOLLOW_POLL_MS)),
            None => return Ok(()),
        }
    }
}

fn print_entry(sequence: u64, entry: &l1ne_wal::WalEntry) {
    let detail = match entry.payload() {
        Payload::ServiceStart { service_id, port } => {
            format!("service {service_id} port {port}")
        }
        Payload::ServiceStop {
            service_id,
            exit_code,
        } => format!("service {service_id} exit {exit_code}"),
        Payload::ProxyAccept {
            connection_id,
            service_id,
            client_port,
        } => format!("conn {connection_id} -> service {service_id} (client port {client_port})"),
        Payload::ProxyClose {
            connection_id,
            bytes_sent,
            bytes_received,
        } => format!("conn {connection_id} sent {bytes_sent} B received {bytes_received} B"),
        Payload::ConfigReload => String::new(),
        Payload::Checkpoint => String::new(),
        Payload::TxBegin { tx_id, event_count } => format!("tx {tx_id} ({event_count} events)"),
        Payload::TxCommit { tx_id, event_count } => format!("tx {tx_id} ({event_count} events)"),
        Payload::TxAbort { tx_id, reason_code } => format!("tx {tx_id} reason {reason_code}"),
    };
    println!(
        "{:>6}  {:>14} µs  {:<13} {}",
        sequence,
        entry.timestamp_us,
        format!("{:?}", entry.entry_type),
        detail
    );
}

/// Output rendering for `simulate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// `simulate`: run one scenario deterministically and report.
pub fn simulate(
    config_path: &Path,
    seed: Option<u64>,
    output: OutputFormat,
) -> Result<(), Box<dyn Error>> {
    let mut config = ScenarioConfig::load(config_path)?;
    if let Some(seed) = seed {
        config.seed = seed;
        config.validate()?;
    }

    let name = config.name.clone();
    let scenario_type = config.scenario_type;
    let seed = config.seed;
    let mut runner = ScenarioRunner::new(config)?;
    let result = runner.run();

    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => {
            println!("Scenario:          {name} ({scenario_type:?})");
            println!("Seed:              {seed}");
            println!("Success:           {}", result.success);
            println!("Events processed:  {}", result.events_processed);
            println!("Faults injected:   {}", result.faults_injected);
            println!("Services started:  {}", result.services_started);
            println!("Services stopped:  {}", result.services_stopped);
            println!("Duration:          {} µs", result.duration_us);
            for violation in runner.verifier().violations() {
                println!(
                    "Violation:         {:?} at {} µs: {}",
                    violation.kind, violation.timestamp_us, violation.message
                );
            }
        }
    }

    if !result.success {
        return Err(result
            .error_message
            .unwrap_or_else(|| "scenario failed".to_string())
            .into());
    }
    Ok(())
}

/// `version`: report the build.
pub fn version(verbose: bool) {
    println!("l1ne {}", env!("CARGO_PKG_VERSION"));
    if verbose {
        println!("{}", env!("CARGO_PKG_DESCRIPTION"));
        println!("{}", env!("CARGO_PKG_REPOSITORY"));
    }
}

/// `benchmark`: sequential connect/echo rounds against a target,
/// latencies collected into the bounded reservoir.
pub fn benchmark(
    duration_secs: u64,
    connections: u32,
    target: &str,
) -> Result<(), Box<dyn Error>> {
    let addr: std::net::SocketAddr = target.parse()?;
    let mut metrics = SimMetrics::new();
    let mut attempts = 0u64;
    let mut failures = 0u64;

    info!(%addr, duration_secs, connections, "benchmark starting");
    let deadline = Instant::now() + Duration::from_secs(duration_secs);
    while Instant::now() < deadline {
        for _ in 0..connections {
            attempts += 1;
            let started = Instant::now();
            match bench_round(&addr) {
                Ok(()) => metrics.record_latency_us(started.elapsed().as_micros() as u64),
                Err(e) => {
                    failures += 1;
                    warn!(error = %e, "benchmark round failed");
                }
            }
        }
    }

    let stats = metrics.latency_stats();
    println!("Attempts:   {attempts}");
    println!("Failures:   {failures}");
    println!("Samples:    {}", metrics.latency_samples());
    println!("Latency:    min {} µs / avg {} µs / max {} µs", stats.min_us, stats.avg_us, stats.max_us);
    Ok(())
}

fn bench_round(addr: &std::net::SocketAddr) -> std::io::Result<()> {
    use std::io::{Read, Write};
    let mut stream = TcpStream::connect_timeout(addr, Duration::from_millis(1000))?;
    stream.set_read_timeout(Some(Duration::from_millis(1000)))?;
    stream.write_all(b"ping")?;
    let mut response = [0u8; 16];
    let _ = stream.read(&mut response)?;
    Ok(())
}
