// src/main.rs - Sand table host entry point
use clap::Parser;
use tokio::io::AsyncBufReadExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::LocalSet;
use tokio::time::{Duration, MissedTickBehavior};

use sandtable_rs::config::Config;
use sandtable_rs::file_manager::FileManager;
use sandtable_rs::robot::RobotController;
use sandtable_rs::work::WorkManager;

#[derive(Parser)]
#[command(name = "table-host", about = "Host process for a polar sand-drawing table")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "table.toml")]
    config: String,

    /// Override the pattern/playlist directory from the config
    #[arg(long)]
    data_dir: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

/// Requests crossing the transport boundary into the pipeline task.
enum HostRequest {
    Submit {
        line: String,
        respond_to: oneshot::Sender<String>,
    },
    Status {
        respond_to: oneshot::Sender<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    tracing::info!("Starting sand table host");

    let mut config = Config::load(&args.config)?;
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }
    tracing::info!(
        "Table: {} ({}), data dir '{}'",
        config.name,
        config.robot.model,
        config.data_dir
    );

    let file_manager = FileManager::new(&config.data_dir);
    let mut robot = RobotController::new(&config.robot);
    let mut work_manager = WorkManager::new(&config, file_manager);
    work_manager.reconfigure(&config, &mut robot);
    work_manager.handle_startup_commands(&config, &mut robot);

    let (host_tx, mut host_rx) = mpsc::channel::<HostRequest>(16);

    let local = LocalSet::new();

    // The pipeline task: one cooperative tick loop, interleaved with
    // transport requests. Everything inside a tick runs to completion.
    local.spawn_local(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(20));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                request = host_rx.recv() => {
                    match request {
                        Some(HostRequest::Submit { line, respond_to }) => {
                            let result = work_manager.process_request(&mut robot, &line);
                            let _ = respond_to
                                .send(format!("{{\"rslt\":\"{}\"}}", result.as_str()));
                        }
                        Some(HostRequest::Status { respond_to }) => {
                            let status = work_manager.query_status(&robot);
                            let body = serde_json::to_string(&status)
                                .unwrap_or_else(|_| "{}".to_string());
                            let _ = respond_to.send(body);
                        }
                        None => break,
                    }
                }
                _ = interval.tick() => {
                    work_manager.service(&mut robot);
                    robot.service();
                }
            }
        }
    });

    // Minimal console transport: each stdin line is a command, "status"
    // returns the snapshot. The REST layer plugs into the same channel.
    local.spawn_local(async move {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        let mut lines = stdin.lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim().to_string();
            if line.is_empty() {
                continue;
            }
            let (tx, rx) = oneshot::channel();
            let request = if line.eq_ignore_ascii_case("status") {
                HostRequest::Status { respond_to: tx }
            } else {
                HostRequest::Submit {
                    line,
                    respond_to: tx,
                }
            };
            if host_tx.send(request).await.is_err() {
                break;
            }
            if let Ok(response) = rx.await {
                println!("{response}");
            }
        }
    });

    local.await;
    Ok(())
}
