use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use visa_watcher::checker::AppointmentChecker;
use visa_watcher::config::AppConfig;
use visa_watcher::notify::NotificationFanout;
use visa_watcher::scheduler::PollingScheduler;
use visa_watcher::session::ChromeSessionFactory;

#[derive(Parser, Debug)]
#[command(name = "visa-watcher", about = "Watches visa appointment availability and alerts on openings")]
struct Cli {
    /// Run a single availability check and exit
    #[arg(long)]
    once: bool,

    /// Monitor continuously without the interactive prompt
    #[arg(long)]
    monitor: bool,

    /// Run the browser with a visible window
    #[arg(long)]
    headed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunMode {
    Single,
    Continuous,
}

fn prompt_run_mode() -> RunMode {
    print!("Select mode: [1] single check  [2] continuous monitoring (default): ");
    let _ = std::io::stdout().flush();

    let mut line = String::new();
    if std::io::stdin().read_line(&mut line).is_err() {
        return RunMode::Continuous;
    }
    match line.trim() {
        "1" => RunMode::Single,
        _ => RunMode::Continuous,
    }
}

fn init_tracing(log_dir: &str) -> tracing_appender::non_blocking::WorkerGuard {
    let file_appender = tracing_appender::rolling::daily(log_dir, "visa-watcher.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,visa_watcher=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let mut config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            eprintln!("Check your .env file and ensure all required values are set");
            std::process::exit(1);
        }
    };
    if cli.headed {
        config.browser.headless = false;
    }
    let config = Arc::new(config);

    let _log_guard = init_tracing(&config.logging.log_dir);

    info!("{}", "=".repeat(60));
    info!("US Visa Appointment Watcher starting");
    info!("{}", "=".repeat(60));
    info!(
        post = %config.target.consular_post,
        month = config.target.month,
        year = config.target.year,
        "target"
    );
    info!(
        min = config.schedule.check_interval_min,
        max = config.schedule.check_interval_max,
        "check interval (minutes)"
    );

    let mode = if cli.once {
        RunMode::Single
    } else if cli.monitor {
        RunMode::Continuous
    } else {
        prompt_run_mode()
    };

    let factory = Arc::new(ChromeSessionFactory::new(config.browser.clone()));
    let checker = AppointmentChecker::new(Arc::clone(&config), factory);
    let fanout = NotificationFanout::from_config(&config);

    match mode {
        RunMode::Single => {
            let result = checker.run_check().await?;
            info!(message = %result.message, success = result.success, "single check finished");
            if result.appointments_found {
                fanout.notify_appointments_found(&result.appointments).await;
            }
            if !result.success {
                error!("single check failed");
                std::process::exit(1);
            }
        }
        RunMode::Continuous => {
            let scheduler = PollingScheduler::new(checker, fanout, Arc::clone(&config));

            let cancel = CancellationToken::new();
            let canceller = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("interrupt received, stopping after the current wait");
                    canceller.cancel();
                }
            });

            let report = scheduler.run(cancel).await;
            info!(
                checks_performed = report.checks_performed,
                "shut down cleanly"
            );
        }
    }

    Ok(())
}
