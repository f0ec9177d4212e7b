mod config;
mod handler;
mod tap;
mod trace;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use keybounce_filter::{FilterConfig, Keycode};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::handler::{FilterHandler, KeyLogger};
use crate::tap::TapOptions;

#[derive(Parser)]
#[command(name = "keybounce")]
#[command(about = "Suppress hardware bounce on a single keyboard key")]
struct Cli {
    /// Log every suppressed press
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Intercept global keyboard input and drop bounces of one key
    Run {
        /// Keycode of the bouncing key (see `keybounce keys`)
        #[arg(short, long)]
        key: Option<Keycode>,
        /// Debounce window in milliseconds [default: 200]
        #[arg(short, long)]
        window: Option<u64>,
        /// Input device to grab (Linux only)
        #[arg(short, long)]
        device: Option<PathBuf>,
        /// Config file [default: <config dir>/keybounce/config.toml]
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the keycode of every key pressed, without filtering
    Keys {
        /// Input device to grab (Linux only)
        #[arg(short, long)]
        device: Option<PathBuf>,
    },
    /// Replay a recorded key trace through the filter
    Replay {
        /// Trace file: one `<keycode> <time_ms>` per line
        trace: PathBuf,
        /// Keycode of the bouncing key
        #[arg(short, long)]
        key: Keycode,
        /// Debounce window in milliseconds
        #[arg(short, long, default_value_t = 200)]
        window: u64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Run {
            key,
            window,
            device,
            config,
        } => {
            let file = config::load(config.as_deref())?;
            let settings = config::resolve(
                file,
                config::Overrides {
                    keycode: key,
                    window_ms: window,
                    device,
                },
            )?;

            info!(
                keycode = settings.filter.target_keycode,
                window_ms = settings.filter.window.as_millis() as u64,
                "starting debounce filter"
            );

            let options = TapOptions {
                device: settings.device,
            };
            tap::run(FilterHandler::new(settings.filter), &options)
                .context("event tap failed")?;
        }
        Command::Keys { device } => {
            println!("Press keys to see their codes. Ctrl-C to quit.");
            tap::run(KeyLogger::default(), &TapOptions { device }).context("event tap failed")?;
        }
        Command::Replay { trace, key, window } => {
            let contents =
                fs::read_to_string(&trace).with_context(|| format!("reading {}", trace.display()))?;
            let observations = trace::parse_trace(&contents).context("parsing key trace")?;

            let config = FilterConfig::new(key).with_window(Duration::from_millis(window));
            let result = trace::replay(config, &observations);

            for (observation, decision) in &result.decisions {
                println!("{}", trace::format_line(observation, *decision));
            }
            println!(
                "{} observations, {} suppressed",
                result.decisions.len(),
                result.suppressed
            );
        }
    }

    Ok(())
}

/// Log to stderr. `RUST_LOG` wins; otherwise `info`, or `debug` with `-v`.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
