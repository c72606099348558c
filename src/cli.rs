use std::future::Future;
use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{ArgAction, Args, Parser, Subcommand};
use searchload_target::{TargetConfig, TargetServer};
use serde_json::json;
use tracing::{info, warn};

use crate::client::{HttpSearchClient, SmokeSummary, run_smoke};
use crate::config::{SearchLoadSettings, SwarmSettings, default_config_path};
use crate::generator::SearchTrafficGenerator;
use crate::swarm::{SwarmSummary, run_swarm};
use crate::telemetry::{ServiceTelemetry, current_trace_file, init_tracing};
use crate::terms::RngTermSource;

#[derive(Parser, Debug)]
#[command(name = "searchload", author, version, about = "Search endpoint load generator", long_about = None)]
pub struct Cli {
    /// Increase logging verbosity.
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    pub verbose: bool,

    /// Custom config path.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Drive the search endpoint with a goose swarm.
    Swarm(SwarmCommand),
    /// Print generated requests without sending them.
    Preview(PreviewCommand),
    /// Send a short sequence of searches through a plain HTTP client.
    Smoke(SmokeCommand),
    /// Serve the local product search target.
    Serve(ServeCommand),
}

impl Command {
    fn service_name(&self) -> &'static str {
        match self {
            Command::Swarm(_) => "swarm",
            Command::Preview(_) => "preview",
            Command::Smoke(_) => "smoke",
            Command::Serve(_) => "target",
        }
    }
}

#[derive(Args, Debug, Default)]
pub struct SwarmCommand {
    /// Base URL of the search service.
    #[arg(long)]
    pub host: Option<String>,

    /// Number of concurrent users.
    #[arg(long)]
    pub users: Option<usize>,

    /// Users launched per second.
    #[arg(long, value_name = "RATE")]
    pub hatch_rate: Option<String>,

    /// Run time in seconds (0 runs until Ctrl-C).
    #[arg(long, value_name = "SECS")]
    pub run_time: Option<u64>,

    /// Base seed for reproducible term sequences.
    #[arg(long)]
    pub seed: Option<u64>,
}

impl SwarmCommand {
    fn apply(&self, settings: &mut SwarmSettings) {
        if let Some(host) = &self.host {
            settings.host = host.clone();
        }
        if let Some(users) = self.users {
            settings.users = users;
        }
        if let Some(rate) = &self.hatch_rate {
            settings.hatch_rate = rate.clone();
        }
        if let Some(run_time) = self.run_time {
            settings.run_time_secs = run_time;
        }
        if self.seed.is_some() {
            settings.seed = self.seed;
        }
    }
}

#[derive(Args, Debug)]
pub struct PreviewCommand {
    /// Number of requests to generate.
    #[arg(long, default_value_t = 10)]
    pub count: usize,

    /// Seed for a reproducible sequence.
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Args, Debug)]
pub struct SmokeCommand {
    /// Base URL of the search service (defaults to the swarm host).
    #[arg(long)]
    pub host: Option<String>,

    /// Number of requests to send.
    #[arg(long, default_value_t = 10)]
    pub count: usize,

    /// Seed for a reproducible sequence.
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Args, Debug, Default)]
pub struct ServeCommand {
    /// Address to listen on.
    #[arg(long)]
    pub listen: Option<String>,

    /// Number of products to generate at start-up.
    #[arg(long)]
    pub catalog_size: Option<usize>,

    /// Seed for catalog generation.
    #[arg(long)]
    pub seed: Option<u64>,
}

impl ServeCommand {
    fn apply(&self, config: &mut TargetConfig) {
        if let Some(listen) = &self.listen {
            config.listen = listen.clone();
        }
        if let Some(size) = self.catalog_size {
            config.catalog_size = size;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
    }
}

fn term_source(seed: Option<u64>) -> RngTermSource {
    match seed {
        Some(seed) => RngTermSource::seeded(seed),
        None => RngTermSource::from_entropy(),
    }
}

fn preview_lines(count: usize, seed: Option<u64>) -> Vec<String> {
    let generator = SearchTrafficGenerator::new();
    let mut source = term_source(seed);
    (0..count)
        .map(|_| generator.next_request(&mut source).to_string())
        .collect()
}

fn print_swarm_summary(summary: &SwarmSummary) {
    println!("Swarm finished after {:.1}s", summary.elapsed_secs);
    for entry in &summary.requests {
        println!(
            "  {:<16} ok {:>8}  failed {:>8}",
            entry.label, entry.success_count, entry.fail_count
        );
    }
    println!("  throughput       {:.1} req/s", summary.requests_per_second());
}

fn print_smoke_summary(host: &str, summary: &SmokeSummary) {
    println!(
        "Smoke run against {host}: {} sent, {} ok, {} failed ({} transport errors)",
        summary.sent,
        summary.succeeded,
        summary.failed(),
        summary.errors
    );
    for (status, count) in &summary.statuses {
        println!("  HTTP {status}: {count}");
    }
    if let Some(max) = summary.max_latency_ms {
        println!("  slowest response: {max} ms");
    }
}

pub async fn run() -> Result<()> {
    execute(Cli::parse()).await
}

pub async fn execute(cli: Cli) -> Result<()> {
    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => default_config_path()?,
    };
    let settings = SearchLoadSettings::load_or_default(&config_path)?;

    init_tracing(cli.command.service_name(), cli.verbose, &settings.telemetry)?;
    if let Some(path) = current_trace_file() {
        info!(path = %path.display(), "Writing trace file");
    }

    match &cli.command {
        Command::Swarm(cmd) => handle_swarm(cmd, &settings).await,
        Command::Preview(cmd) => {
            for line in preview_lines(cmd.count, cmd.seed) {
                println!("{line}");
            }
            Ok(())
        }
        Command::Smoke(cmd) => handle_smoke(cmd, &settings).await,
        Command::Serve(cmd) => handle_serve(cmd, &settings, ctrl_c()).await,
    }
}

async fn handle_swarm(cmd: &SwarmCommand, settings: &SearchLoadSettings) -> Result<()> {
    let mut swarm = settings.swarm.clone();
    cmd.apply(&mut swarm);

    let telemetry = ServiceTelemetry::new("swarm", &settings.telemetry);
    telemetry.record_startup(json!({
        "host": swarm.host,
        "users": swarm.users,
        "hatch_rate": swarm.hatch_rate,
        "run_time_secs": swarm.run_time_secs,
        "seeded": swarm.seed.is_some(),
    }));

    let result = run_swarm(&swarm).await;
    match &result {
        Ok(summary) => {
            match serde_json::to_value(summary) {
                Ok(details) => telemetry.record_metric("swarm_summary", details),
                Err(err) => warn!(error = %err, "Unable to serialise swarm summary"),
            }
            print_swarm_summary(summary);
        }
        Err(err) => telemetry.record_error(err),
    }
    telemetry.record_shutdown();
    result.map(|_| ())
}

async fn handle_smoke(cmd: &SmokeCommand, settings: &SearchLoadSettings) -> Result<()> {
    let host = cmd.host.as_deref().unwrap_or(&settings.swarm.host);
    let mut client = HttpSearchClient::new(host)?;
    let target = client.base().to_string();
    let mut source = term_source(cmd.seed);

    let summary = run_smoke(
        &SearchTrafficGenerator::new(),
        &mut client,
        &mut source,
        cmd.count,
    )
    .await;
    print_smoke_summary(&target, &summary);

    if summary.sent > 0 && summary.succeeded == 0 {
        bail!("no search request succeeded against {target}");
    }
    Ok(())
}

async fn ctrl_c() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received; stopping search target");
}

async fn handle_serve<F>(
    cmd: &ServeCommand,
    settings: &SearchLoadSettings,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let mut config = settings.target.clone();
    cmd.apply(&mut config);

    let telemetry = ServiceTelemetry::new("target", &settings.telemetry);
    let server = match TargetServer::bind(&config).await {
        Ok(server) => server,
        Err(err) => {
            telemetry.record_error(&err);
            return Err(err);
        }
    };
    telemetry.record_startup(json!({
        "listen": server.local_addr().to_string(),
        "catalog_size": config.catalog_size,
        "metrics": config.metrics,
    }));

    let result = server.run_until(shutdown).await;
    if let Err(err) = &result {
        telemetry.record_error(err);
    }
    telemetry.record_shutdown();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TelemetrySettings;
    use serde_json::Value;
    use std::path::Path;
    use tempfile::tempdir;
    use tokio::sync::oneshot;

    fn telemetry_into(dir: &Path) -> SearchLoadSettings {
        SearchLoadSettings {
            telemetry: TelemetrySettings {
                enabled: true,
                buffer_dir: Some(dir.to_path_buf()),
                ..TelemetrySettings::default()
            },
            ..SearchLoadSettings::default()
        }
    }

    fn read_events(path: &Path) -> Vec<Value> {
        std::fs::read_to_string(path)
            .expect("telemetry file")
            .lines()
            .map(|line| serde_json::from_str(line).expect("event json"))
            .collect()
    }

    #[test]
    fn swarm_flags_override_settings() {
        let cli = Cli::parse_from([
            "searchload",
            "swarm",
            "--host",
            "http://search.internal:9000",
            "--users",
            "50",
            "--hatch-rate",
            "2.5",
            "--run-time",
            "0",
            "--seed",
            "8",
        ]);
        let Command::Swarm(cmd) = cli.command else {
            panic!("expected swarm command");
        };

        let mut settings = SwarmSettings::default();
        cmd.apply(&mut settings);
        assert_eq!(settings.host, "http://search.internal:9000");
        assert_eq!(settings.users, 50);
        assert_eq!(settings.hatch_rate, "2.5");
        assert_eq!(settings.run_time_secs, 0);
        assert_eq!(settings.seed, Some(8));
    }

    #[test]
    fn swarm_without_flags_keeps_file_values() {
        let mut settings = SwarmSettings {
            users: 3,
            seed: Some(1),
            ..SwarmSettings::default()
        };
        SwarmCommand::default().apply(&mut settings);
        assert_eq!(settings.users, 3);
        assert_eq!(settings.seed, Some(1));
        assert_eq!(settings.host, "http://127.0.0.1:8080");
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::parse_from(["searchload", "preview", "--verbose", "--config", "/tmp/s.toml"]);
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/s.toml")));
        let Command::Preview(cmd) = cli.command else {
            panic!("expected preview command");
        };
        assert_eq!(cmd.count, 10);
        assert_eq!(cmd.seed, None);
    }

    #[test]
    fn serve_flags_override_target_config() {
        let cli = Cli::parse_from([
            "searchload",
            "serve",
            "--listen",
            "0.0.0.0:9090",
            "--catalog-size",
            "2000",
        ]);
        let Command::Serve(cmd) = cli.command else {
            panic!("expected serve command");
        };
        let mut config = TargetConfig::default();
        cmd.apply(&mut config);
        assert_eq!(config.listen, "0.0.0.0:9090");
        assert_eq!(config.catalog_size, 2000);
        assert_eq!(config.seed, None);
        assert!(config.metrics);
    }

    #[test]
    fn seeded_preview_is_reproducible() {
        let first = preview_lines(25, Some(99));
        let second = preview_lines(25, Some(99));
        assert_eq!(first.len(), 25);
        assert_eq!(first, second);
        assert!(
            first
                .iter()
                .all(|line| line.starts_with("GET /search?q=") && line.ends_with(" [/search]"))
        );
    }

    #[tokio::test]
    async fn preview_runs_with_a_fresh_config_file() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("searchload.toml");
        let path_arg = path.to_string_lossy().into_owned();
        let cli = Cli::parse_from([
            "searchload",
            "--config",
            path_arg.as_str(),
            "preview",
            "--count",
            "3",
            "--seed",
            "4",
        ]);

        execute(cli).await.expect("preview");
        assert!(path.exists());
    }

    #[tokio::test]
    async fn smoke_fails_when_nothing_answers() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let host = format!("http://{}", listener.local_addr().expect("addr"));
        drop(listener);

        let cmd = SmokeCommand {
            host: Some(host),
            count: 2,
            seed: Some(1),
        };
        let error = handle_smoke(&cmd, &SearchLoadSettings::default())
            .await
            .unwrap_err();
        assert!(error.to_string().contains("no search request succeeded"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn swarm_run_records_startup_summary_and_shutdown() {
        let config = TargetConfig {
            listen: "127.0.0.1:0".into(),
            catalog_size: 1_000,
            seed: Some(9),
            metrics: false,
        };
        let server = TargetServer::bind(&config).await.expect("bind target");
        let host = format!("http://{}", server.local_addr());
        let target_metrics = server.metrics();
        let (stop, stopped) = oneshot::channel::<()>();
        tokio::spawn(server.run_until(async move {
            let _ = stopped.await;
        }));

        let dir = tempdir().expect("temp dir");
        let settings = telemetry_into(dir.path());
        let cmd = SwarmCommand {
            host: Some(host),
            users: Some(2),
            hatch_rate: Some("4".into()),
            run_time: Some(1),
            seed: Some(42),
        };
        handle_swarm(&cmd, &settings).await.expect("swarm run");
        let _ = stop.send(());

        let events = read_events(&dir.path().join("swarm.jsonl"));
        let kinds: Vec<&str> = events
            .iter()
            .map(|event| event["kind"].as_str().expect("kind"))
            .collect();
        assert_eq!(kinds, ["startup", "message", "shutdown"]);
        assert_eq!(events[0]["details"]["users"], 2);
        assert_eq!(events[1]["message"], "swarm_summary");
        assert!(events.iter().all(|event| event["run_id"] == events[0]["run_id"]));

        let requests = events[1]["details"]["requests"]
            .as_array()
            .expect("per-label requests");
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0]["label"], "GET /search");
        assert_eq!(requests[0]["fail_count"], 0);
        assert!(requests[0]["success_count"].as_u64().expect("success count") > 0);
        assert!(target_metrics.search_requests() > 0);
    }

    #[tokio::test]
    async fn serve_records_startup_and_shutdown() {
        let dir = tempdir().expect("temp dir");
        let settings = telemetry_into(dir.path());
        let cmd = ServeCommand {
            listen: Some("127.0.0.1:0".into()),
            catalog_size: Some(150),
            seed: Some(2),
        };

        handle_serve(&cmd, &settings, async {})
            .await
            .expect("serve until shutdown");

        let events = read_events(&dir.path().join("target.jsonl"));
        let kinds: Vec<&str> = events
            .iter()
            .map(|event| event["kind"].as_str().expect("kind"))
            .collect();
        assert_eq!(kinds, ["startup", "shutdown"]);
        assert_eq!(events[0]["details"]["catalog_size"], 150);
        assert_eq!(events[0]["run_id"], events[1]["run_id"]);
    }
}
