use clap::Parser;
use std::sync::Arc;
use taskpulse_cli::commands::{cli, jobs, tasks};
use taskpulse_core::api::{AppContext, CliError, CommandError, LoggingConfig};
use taskpulse_plugins::services::HttpBackendsFactory;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static LOG_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

#[tokio::main]
async fn main() {
    let exit = match real_main().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            exit_code_for_error(&e)
        }
    };

    std::process::exit(exit);
}

async fn real_main() -> Result<i32, CliError> {
    let args = cli::Args::parse();
    let mut cfg = taskpulse_core::api::load_default().map_err(|e| CliError::Config(e.to_string()))?;
    init_tracing(&cfg.logging).map_err(CliError::Config)?;

    // CLI flags beat file and env.
    if let Some(url) = args.base_url.as_deref().filter(|s| !s.trim().is_empty()) {
        cfg.backend.base_url = url.to_string();
    }
    if let Some(key) = args.api_key.as_deref() {
        cfg.backend.api_key = key.to_string();
    }
    if let cli::Commands::Tasks(cli::TasksCommand::Watch(w)) = &args.command {
        if let Some(ms) = w.interval_ms {
            cfg.polling.task_interval_ms = ms;
        }
    }

    let ctx = AppContext::new(cfg, Some(Arc::new(HttpBackendsFactory)))?;
    let engine = ctx.build_engine().await?;

    let result = match args.command {
        cli::Commands::Tasks(cmd) => tasks::handle(&engine, cmd, args.json).await,
        cli::Commands::Jobs(cmd) => jobs::handle(&engine, cmd, args.json).await,
    };
    engine.shutdown();
    result
}

fn exit_code_for_error(e: &CliError) -> i32 {
    // 0: success
    // 11: config / invalid argument
    // 20: backend unreachable or command rejected
    // 30: task already exists (conflict)
    // 50: internal/uncategorized
    match e {
        CliError::Config(_) | CliError::InvalidArgument(_) => 11,
        CliError::Command(CommandError::Conflict(_)) => 30,
        CliError::Command(CommandError::Failed { .. }) => 20,
        CliError::Backend(_) => 20,
        CliError::Io(_) => 20,
        CliError::Anyhow(_) => 50,
    }
}

fn init_tracing(logging: &LoggingConfig) -> Result<(), String> {
    if !logging.enabled {
        return Ok(());
    }

    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::try_new(logging.level.clone()).map_err(|e| e.to_string())?,
    };

    let mut maybe_writer = None;

    if logging.file {
        let dir = match logging
            .directory
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(d) => std::path::PathBuf::from(d),
            None => std::env::temp_dir().join("taskpulse"),
        };

        std::fs::create_dir_all(&dir).map_err(|e| format!("create log dir failed: {e}"))?;
        let appender = tracing_appender::rolling::daily(dir, "taskpulse.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let _ = LOG_GUARD.set(guard);
        maybe_writer = Some(non_blocking);
    }

    if !logging.console && maybe_writer.is_none() {
        return Err("logging disabled for both console and file".to_string());
    }

    let console_layer = logging.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(atty::is(atty::Stream::Stderr))
            .with_target(false)
    });

    let file_layer = maybe_writer.map(|w| {
        tracing_subscriber::fmt::layer()
            .with_writer(w)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}
