use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use provdash_api::ProvApi;
use provdash_core::{BackendConfig, Instance, NewInstance, Snapshot, Stats};
use provdash_http::HttpApi;
use provdash_ui::{
    format_timestamp, status_glyph, tab_glyph, Dashboard, UiIntent, ViewerPhase,
};

#[derive(Parser, Debug)]
#[command(name = "provdash", version, about = "Dashboard client for the auto-provisioner backend")]
struct Cli {
    /// Backend base URL
    #[arg(
        long = "url",
        env = "PROVDASH_URL",
        global = true,
        default_value = "http://127.0.0.1:8080"
    )]
    url: String,

    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output {
    Human,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Poll the backend and render each snapshot until Ctrl-C
    Watch {
        /// Seconds between scheduled refreshes
        #[arg(long = "interval", default_value_t = 5)]
        interval: u64,
    },
    /// List instances
    Instances,
    /// Aggregate counters
    Stats,
    /// Backend daemon configuration
    Config,
    /// Backend liveness
    Health,
    /// Full detail for one instance
    Get { id: String },
    /// Register an instance
    Add {
        id: String,
        ip: String,
        #[arg(long = "groups", value_delimiter = ',')]
        groups: Vec<String>,
        #[arg(long = "playbooks", value_delimiter = ',')]
        playbooks: Vec<String>,
    },
    /// Restart provisioning for one instance
    Retry { id: String },
    /// Restart a single playbook for one instance
    RetryPlaybook { id: String, playbook: String },
    /// Restart every instance, one at a time, and report the outcome
    RetryAll,
    /// Remove an instance
    Delete { id: String },
    /// Resolve and print the per-playbook logs for one instance
    Logs {
        id: String,
        /// Only print this playbook's tab
        #[arg(long = "playbook")]
        playbook: Option<String>,
    },
}

fn init_tracing() {
    let env = std::env::var("PROVDASH_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let api: Arc<dyn ProvApi> = Arc::new(HttpApi::new(cli.url.clone()));

    match cli.command {
        Commands::Watch { interval } => {
            let dash = Dashboard::new(api, Duration::from_secs(interval.max(1)));
            run_watch(dash, cli.output).await?;
        }
        Commands::Instances => {
            let instances = fail_on_error(api.instances().await);
            match cli.output {
                Output::Json => println!("{}", serde_json::to_string_pretty(&instances)?),
                Output::Human => render_instances(&instances),
            }
        }
        Commands::Stats => {
            let stats = fail_on_error(api.stats().await);
            match cli.output {
                Output::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
                Output::Human => render_stats(&stats),
            }
        }
        Commands::Config => {
            let config = fail_on_error(api.config().await);
            match cli.output {
                Output::Json => println!("{}", serde_json::to_string_pretty(&config)?),
                Output::Human => render_config(&config),
            }
        }
        Commands::Health => {
            let health = fail_on_error(api.health().await);
            println!("{}", serde_json::to_string_pretty(&health)?);
        }
        Commands::Get { id } => {
            let inst = fail_on_error(api.instance(&id).await);
            println!("{}", serde_json::to_string_pretty(&inst)?);
        }
        Commands::Add { id, ip, groups, playbooks } => {
            let req = NewInstance {
                instance_id: id.clone(),
                ip_address: ip,
                groups,
                playbooks,
            };
            let res = api
                .create_instance(&req)
                .await
                .and_then(|r| r.ok_or("Failed to add instance"));
            let resp = fail_on_error(res);
            println!(
                "{}",
                resp.message.unwrap_or_else(|| format!("instance {} added", id))
            );
        }
        Commands::Retry { id } => {
            let res = api
                .retry_instance(&id)
                .await
                .and_then(|r| r.ok_or("Restart failed"));
            let resp = fail_on_error(res);
            println!(
                "{}",
                resp.message
                    .unwrap_or_else(|| format!("retry triggered for {}", id))
            );
        }
        Commands::RetryPlaybook { id, playbook } => {
            let res = api
                .retry_playbook(&id, &playbook)
                .await
                .and_then(|r| r.ok_or("Restart failed"));
            let resp = fail_on_error(res);
            println!(
                "{}",
                resp.message
                    .unwrap_or_else(|| format!("retry triggered for {}/{}", id, playbook))
            );
        }
        Commands::RetryAll => {
            // Bulk restart goes through the dispatcher so the sequencing and
            // aggregate reporting are the same the dashboard uses.
            let mut dash = Dashboard::new(api, Duration::from_secs(5));
            dash.dispatch(UiIntent::RetryAll);
            if let Some(task) = dash.actions.task.take() {
                let _ = task.await;
            }
            dash.pump();
            println!("{}", dash.last_message.as_deref().unwrap_or("nothing to do"));
        }
        Commands::Delete { id } => {
            let res = api
                .delete_instance(&id)
                .await
                .and_then(|r| r.ok_or("Delete failed"));
            fail_on_error(res);
            println!("instance {} deleted", id);
        }
        Commands::Logs { id, playbook } => {
            let mut dash = Dashboard::new(api, Duration::from_secs(5));
            run_logs(&mut dash, &id, playbook.as_deref(), cli.output).await?;
        }
    }
    Ok(())
}

fn fail_on_error<T>(res: provdash_api::ApiResult<T>) -> T {
    match res {
        Ok(v) => v,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run_watch(mut dash: Dashboard, output: Output) -> Result<()> {
    // Immediate fetch, then the recurring schedule.
    dash.sync.manual_refresh();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("watch: interrupted");
                break;
            }
            _ = tokio::time::sleep(Duration::from_millis(200)) => {
                if dash.pump() {
                    render_frame(&mut dash, output)?;
                }
            }
        }
    }
    dash.sync.stop();
    Ok(())
}

fn render_frame(dash: &mut Dashboard, output: Output) -> Result<()> {
    let snap = dash.snapshot();
    match output {
        Output::Json => println!("{}", serde_json::to_string_pretty(&*snap)?),
        Output::Human => render_snapshot(&snap),
    }
    if let Some(indicator) = dash.indicator() {
        println!("{}", indicator);
    }
    if let Some(msg) = dash.last_message.take() {
        println!("note: {}", msg);
    }
    println!();
    Ok(())
}

fn render_snapshot(snap: &Snapshot) {
    if snap.is_empty() {
        println!("(no data yet)");
        return;
    }
    render_stats(&snap.stats);
    render_instances(&snap.instances);
}

fn render_stats(stats: &Stats) {
    println!(
        "instances: {}  successful: {}  failed: {}  pending: {}",
        stats.total_instances, stats.successful, stats.failed, stats.pending
    );
    if let Some(up) = &stats.uptime_human {
        println!("backend uptime: {}", up);
    }
}

fn render_instances(instances: &[Instance]) {
    if instances.is_empty() {
        println!("no instances detected yet");
        return;
    }
    println!(
        "{} instance{}",
        instances.len(),
        if instances.len() == 1 { "" } else { "s" }
    );
    for inst in instances {
        let groups: Vec<&str> = inst.groups.iter().map(|g| g.name()).collect();
        println!(
            "{} {:<20} {:<15} {:<16} [{}] {} playbook(s)  {}",
            status_glyph(inst.overall_status),
            inst.instance_id,
            inst.ip_address.as_deref().unwrap_or("N/A"),
            inst.overall_status.as_str().to_uppercase(),
            groups.join(","),
            inst.playbooks.len(),
            format_timestamp(inst.updated_at),
        );
    }
}

fn render_config(config: &BackendConfig) {
    let dash = "-".to_string();
    println!(
        "interval: {}s",
        config
            .interval
            .map(|v| v.to_string())
            .unwrap_or_else(|| dash.clone())
    );
    println!(
        "max retries: {}",
        config
            .max_retries
            .map(|v| v.to_string())
            .unwrap_or_else(|| dash.clone())
    );
    println!("state file: {}", config.state_file.as_deref().unwrap_or("-"));
    println!("log dir: {}", config.log_dir.as_deref().unwrap_or("-"));
    println!(
        "rules: {}",
        config
            .rules_count
            .map(|v| v.to_string())
            .unwrap_or_else(|| dash.clone())
    );
    println!("ui: {}", if config.ui { "yes" } else { "no" });
    if config.detectors.is_empty() {
        println!("no detectors configured");
        return;
    }
    for d in &config.detectors {
        let opts = d.options().map(|o| o.len()).unwrap_or(0);
        println!("detector: {} ({} option{})", d.name(), opts, if opts == 1 { "" } else { "s" });
        if let Some(options) = d.options() {
            for (k, v) in options {
                println!("  {} = {}", k, v);
            }
        }
    }
}

async fn run_logs(
    dash: &mut Dashboard,
    id: &str,
    only: Option<&str>,
    output: Output,
) -> Result<()> {
    dash.dispatch(UiIntent::ShowLogs(id.to_string()));
    if let Some(task) = dash.viewer.task.take() {
        let _ = task.await;
    }
    dash.pump();
    if dash.viewer.phase() != ViewerPhase::Open {
        let reason = dash
            .last_message
            .clone()
            .unwrap_or_else(|| "no logs available".to_string());
        anyhow::bail!(reason);
    }
    for tab in dash.viewer.tabs() {
        if let Some(p) = only {
            if tab.playbook != p {
                continue;
            }
        }
        match output {
            Output::Json => println!(
                "{}",
                serde_json::json!({
                    "playbook": tab.playbook,
                    "status": tab.status.as_str(),
                    "error": tab.error,
                    "fetched_at": tab.fetched_at.to_rfc3339(),
                    "content": tab.content,
                })
            ),
            Output::Human => {
                println!(
                    "--- {} {} ({})",
                    tab_glyph(tab.status, tab.error),
                    tab.playbook,
                    tab.status
                );
                println!("{}", tab.content);
            }
        }
    }
    Ok(())
}
