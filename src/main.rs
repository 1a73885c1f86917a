//! droidfrpd - run and manage the supervised FRP binary
//!
//! Usage:
//!   droidfrpd [--config <path>] run [--mode <client|server>]
//!   droidfrpd [--config <path>] import <mode> <file>
//!   droidfrpd [--config <path>] show-config <mode>
//!   droidfrpd [--config <path>] write-config <mode> < frpc.toml
//!   droidfrpd [--config <path>] settings
//!   droidfrpd [--config <path>] set auto-start <on|off>
//!   droidfrpd [--config <path>] set mode <client|server>
//!   droidfrpd [--config <path>] set log-level <trace|debug|info|warn|error>

use anyhow::Context;
use droidfrpd::autostart::AutoStartPolicy;
use droidfrpd::clock::{Clock, TokioClock};
use droidfrpd::config::Config;
use droidfrpd::config_store::ConfigStore;
use droidfrpd::log_view::LogView;
use droidfrpd::provision::BinaryAssets;
use droidfrpd::settings::{LogLevel, SettingsStore};
use droidfrpd::{Mode, Supervisor};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const PKG_NAME: &str = env!("CARGO_PKG_NAME");

/// Interval at which the log buffer is drained to the terminal
const LOG_PUMP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug)]
enum Command {
    Run { mode: Option<Mode> },
    Import { mode: Mode, source: PathBuf },
    ShowConfig { mode: Mode },
    WriteConfig { mode: Mode },
    Settings,
    Set(SetCommand),
    Help,
    Version,
}

#[derive(Debug)]
enum SetCommand {
    AutoStart(bool),
    Mode(Mode),
    LogLevel(LogLevel),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("droidfrpd=debug".parse().expect("valid log directive")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (config_path, rest) = split_config_flag(&args)?;

    let config = match &config_path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => Config::load_or_default(default_config_path())?,
    };

    match parse_command(&rest)? {
        Command::Help => print_help(),
        Command::Version => println!("{} {}", PKG_NAME, VERSION),
        Command::Run { mode } => run(&config, mode).await?,
        Command::Import { mode, source } => {
            let store = ConfigStore::new(config.data_dir());
            let dest = store.import(mode, &source)?;
            println!("Imported {} into {}", source.display(), dest.display());
        }
        Command::ShowConfig { mode } => {
            let store = ConfigStore::new(config.data_dir());
            store.ensure_default(mode)?;
            print!("{}", store.read_to_string(mode)?);
        }
        Command::WriteConfig { mode } => {
            let mut contents = Vec::new();
            std::io::stdin()
                .read_to_end(&mut contents)
                .context("Failed to read configuration from stdin")?;
            let store = ConfigStore::new(config.data_dir());
            store.write(mode, &contents)?;
            println!(
                "Wrote {} bytes to {}",
                contents.len(),
                store.path_for(mode).display()
            );
        }
        Command::Settings => {
            let settings = SettingsStore::in_dir(&config.data_dir()).load()?;
            println!("auto_start = {}", settings.auto_start);
            println!("mode       = {}", settings.mode);
            println!("log_level  = {}", settings.log_level);
        }
        Command::Set(cmd) => {
            let store = SettingsStore::in_dir(&config.data_dir());
            let settings = store.update(|s| match cmd {
                SetCommand::AutoStart(enabled) => s.auto_start = enabled,
                SetCommand::Mode(mode) => s.mode = mode,
                SetCommand::LogLevel(level) => s.log_level = level,
            })?;
            info!(
                auto_start = settings.auto_start,
                mode = %settings.mode,
                log_level = %settings.log_level,
                "Settings saved"
            );
        }
    }

    Ok(())
}

async fn run(config: &Config, mode: Option<Mode>) -> anyhow::Result<()> {
    let data_dir = config.data_dir();
    let assets_dir = config.assets_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

    info!(name = PKG_NAME, version = VERSION, "Starting supervisor");
    info!(
        data_dir = %data_dir.display(),
        assets_dir = %assets_dir.display(),
        early_exit_window_ms = config.supervisor.early_exit_window_ms,
        liveness_interval_secs = config.supervisor.liveness_interval_secs,
        log_capacity = config.supervisor.log_capacity,
        "Supervisor configuration"
    );

    let assets = BinaryAssets::from_dir(&assets_dir)?;
    let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());
    let supervisor = Supervisor::builder(&data_dir, assets)
        .config(config.supervisor.clone())
        .clock(Arc::clone(&clock))
        .build();

    // Boot signal: the policy decides whether to start on its own
    let policy = AutoStartPolicy::new(SettingsStore::in_dir(&data_dir), clock)
        .with_delay(config.auto_start.delay());
    let pending_auto_start = policy.on_system_ready(&supervisor);

    if let Some(mode) = mode {
        supervisor.start(mode).await;
    }

    let view = supervisor.view();
    let log_pump = tokio::spawn(async move {
        let mut log_view = LogView::new();
        let mut interval = tokio::time::interval(LOG_PUMP_INTERVAL);
        loop {
            interval.tick().await;
            for entry in log_view.refresh(&view) {
                println!("{}", entry);
            }
        }
    });

    wait_for_shutdown_signal().await?;

    if let Some(pending) = pending_auto_start {
        pending.cancel();
    }
    supervisor.stop().await;

    log_pump.abort();
    for entry in supervisor.view().drain_log() {
        println!("{}", entry);
    }

    info!("Shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Received SIGINT (Ctrl+C), shutting down...");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down...");
        }
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down...");
    Ok(())
}

fn default_config_path() -> PathBuf {
    dirs_next::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(PKG_NAME)
        .join("config.toml")
}

/// Pull a `--config <path>` pair out of the arguments
fn split_config_flag(args: &[String]) -> anyhow::Result<(Option<PathBuf>, Vec<String>)> {
    let mut config = None;
    let mut rest = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" || arg == "-c" {
            let path = iter
                .next()
                .ok_or_else(|| anyhow::anyhow!("{} requires a path", arg))?;
            config = Some(PathBuf::from(path));
        } else {
            rest.push(arg.clone());
        }
    }
    debug!(config = ?config, "Parsed global flags");
    Ok((config, rest))
}

fn parse_command(args: &[String]) -> anyhow::Result<Command> {
    let Some(first) = args.first() else {
        return Ok(Command::Help);
    };

    let command = match first.as_str() {
        "help" | "--help" | "-h" => Command::Help,
        "version" | "--version" | "-v" => Command::Version,
        "run" | "start" => {
            let mode = match args.iter().position(|a| a == "--mode" || a == "-m") {
                Some(i) => Some(
                    args.get(i + 1)
                        .ok_or_else(|| anyhow::anyhow!("--mode requires a value"))?
                        .parse()?,
                ),
                None => None,
            };
            Command::Run { mode }
        }
        "import" => {
            let mode = required(args, 1, "mode")?.parse()?;
            let source = PathBuf::from(required(args, 2, "file")?);
            Command::Import { mode, source }
        }
        "show-config" | "config" => Command::ShowConfig {
            mode: required(args, 1, "mode")?.parse()?,
        },
        "write-config" => Command::WriteConfig {
            mode: required(args, 1, "mode")?.parse()?,
        },
        "settings" => Command::Settings,
        "set" => {
            let key = required(args, 1, "key")?;
            let value = required(args, 2, "value")?;
            let cmd = match key {
                "auto-start" | "auto_start" => SetCommand::AutoStart(parse_switch(value)?),
                "mode" => SetCommand::Mode(value.parse()?),
                "log-level" | "log_level" => SetCommand::LogLevel(value.parse()?),
                other => anyhow::bail!("Unknown setting '{}'", other),
            };
            Command::Set(cmd)
        }
        other => anyhow::bail!("Unknown command '{}' (try 'help')", other),
    };
    Ok(command)
}

fn required<'a>(args: &'a [String], index: usize, name: &str) -> anyhow::Result<&'a str> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| anyhow::anyhow!("Missing <{}> argument", name))
}

fn parse_switch(value: &str) -> anyhow::Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        other => anyhow::bail!("Expected on/off, got '{}'", other),
    }
}

fn print_help() {
    println!("{} {} - FRP supervisor", PKG_NAME, VERSION);
    println!();
    println!("USAGE:");
    println!("  {} [--config <path>] <command>", PKG_NAME);
    println!();
    println!("COMMANDS:");
    println!("  run [--mode <client|server>]   Run the supervisor until Ctrl+C");
    println!("  import <mode> <file>           Replace the configuration for a mode");
    println!("  show-config <mode>             Print the configuration for a mode");
    println!("  write-config <mode>            Replace the configuration from stdin");
    println!("  settings                       Show persisted settings");
    println!("  set auto-start <on|off>        Start on boot");
    println!("  set mode <client|server>       Mode used for auto-start");
    println!("  set log-level <level>          Stored log level (trace..error)");
    println!("  help | version");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_split_config_flag() {
        let (config, rest) =
            split_config_flag(&args(&["--config", "/etc/frp.toml", "run"])).unwrap();
        assert_eq!(config, Some(PathBuf::from("/etc/frp.toml")));
        assert_eq!(rest, vec!["run"]);

        assert!(split_config_flag(&args(&["run", "--config"])).is_err());
    }

    #[test]
    fn test_parse_run() {
        match parse_command(&args(&["run", "--mode", "server"])).unwrap() {
            Command::Run { mode } => assert_eq!(mode, Some(Mode::Server)),
            other => panic!("unexpected {:?}", other),
        }
        match parse_command(&args(&["run"])).unwrap() {
            Command::Run { mode } => assert_eq!(mode, None),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_import_and_set() {
        match parse_command(&args(&["import", "client", "/tmp/frpc.toml"])).unwrap() {
            Command::Import { mode, source } => {
                assert_eq!(mode, Mode::Client);
                assert_eq!(source, PathBuf::from("/tmp/frpc.toml"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            parse_command(&args(&["set", "auto-start", "on"])).unwrap(),
            Command::Set(SetCommand::AutoStart(true))
        ));
        assert!(matches!(
            parse_command(&args(&["set", "log-level", "warn"])).unwrap(),
            Command::Set(SetCommand::LogLevel(LogLevel::Warn))
        ));
    }

    #[test]
    fn test_parse_write_config() {
        assert!(matches!(
            parse_command(&args(&["write-config", "frps"])).unwrap(),
            Command::WriteConfig { mode: Mode::Server }
        ));
        assert!(parse_command(&args(&["write-config"])).is_err());
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_command(&args(&["import", "client"])).is_err());
        assert!(parse_command(&args(&["set", "colour", "blue"])).is_err());
        assert!(parse_command(&args(&["frobnicate"])).is_err());
        assert!(matches!(parse_command(&[]).unwrap(), Command::Help));
    }
}
