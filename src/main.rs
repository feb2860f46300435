use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use veda_assistant::actions::{self, LogOpener, ResourceOpener, SystemOpener};
use veda_assistant::console::{ConsoleCapture, ConsoleMic, ConsoleSink};
use veda_assistant::session::{self, DetachReason, Devices, Services, SessionHandle};
use veda_assistant::voice::Capability;
use veda_assistant::{Config, HttpBackend, UserProfile};

/// Veda - voice assistant console
#[derive(Parser)]
#[command(name = "veda", version, about)]
struct Cli {
    /// Config file (default: ~/.config/veda/config.toml)
    #[arg(short, long, env = "VEDA_CONFIG")]
    config: Option<PathBuf>,

    /// Backend URL, overrides the config file and environment
    #[arg(long)]
    server_url: Option<String>,

    /// Log resources instead of opening them
    #[arg(long)]
    no_open: bool,

    /// Skip the greeting
    #[arg(long)]
    no_greeting: bool,

    /// Use the configured profile instead of fetching it from the backend
    #[arg(long)]
    offline: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print the resource a command type would open
    Dispatch {
        /// Command type (e.g. "youtube-search")
        kind: String,
        /// User input the action applies to
        #[arg(default_value = "")]
        input: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn,veda_assistant=info",
        1 => "info,veda_assistant=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(Command::Dispatch { kind, input }) = cli.command {
        return dispatch(&kind, &input);
    }

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(url) = cli.server_url {
        config.server_url = url;
    }
    if cli.no_open {
        config.open_resources = false;
    }
    if cli.no_greeting {
        config.voice.greeting = false;
    }
    tracing::debug!(?config, "loaded configuration");

    let backend = Arc::new(HttpBackend::new(
        &config.server_url,
        config.session_token.clone(),
    )?);

    let profile = if cli.offline {
        config.offline_profile()
    } else {
        load_profile(&backend, &config).await
    };

    let opener: Arc<dyn ResourceOpener> = if config.open_resources {
        match SystemOpener::detect() {
            Ok(opener) => Arc::new(opener),
            Err(e) => {
                tracing::warn!(error = %e, "no URL handler, resources will only be logged");
                Arc::new(LogOpener)
            }
        }
    } else {
        Arc::new(LogOpener)
    };

    let (capture, mic) = ConsoleCapture::new(config.voice.capture_locale.clone());
    let devices = Devices {
        capture: Capability::Available(Box::new(capture)),
        sink: Capability::Available(Box::new(ConsoleSink::new())),
    };
    let services = Services {
        resolver: Arc::clone(&backend) as Arc<dyn veda_assistant::CommandResolver>,
        store: backend,
        opener,
    };

    let handle = session::spawn(&profile, devices, services, config.session_options());
    tracing::debug!(session = %handle.id(), "console session attached");

    match profile.wake_phrase().phrase() {
        Some(phrase) => tracing::info!("veda ready - type, or say \"~{phrase} ...\""),
        None => tracing::info!("veda ready (no wake phrase, typed input only)"),
    }

    console(&handle, &mic).await
}

/// Fetch the profile, falling back to the configured one
async fn load_profile(backend: &HttpBackend, config: &Config) -> UserProfile {
    match backend.fetch_profile().await {
        Ok(mut profile) => {
            if profile.assistant_name.is_none() {
                profile.assistant_name.clone_from(&config.assistant_name);
            }
            profile
        }
        Err(e) => {
            tracing::warn!(error = %e, "could not fetch profile, using configured profile");
            config.offline_profile()
        }
    }
}

/// Read console lines until quit, logout or end of input
async fn console(handle: &SessionHandle, mic: &ConsoleMic) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };

        let Some(line) = line else {
            handle.detach(DetachReason::NavigatedAway).await?;
            return Ok(());
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(heard) = line.strip_prefix('~') {
            if !mic.hear(heard) {
                eprintln!("! not listening right now");
            }
            continue;
        }

        match line.split_once(' ').unwrap_or((line, "")) {
            (":quit", _) => {
                handle.detach(DetachReason::NavigatedAway).await?;
                return Ok(());
            }
            (":logout", _) => {
                if let Err(e) = handle.logout().await {
                    eprintln!("! {e}");
                }
                return Ok(());
            }
            (":history", _) => {
                for (i, entry) in handle.snapshot().history.iter().enumerate() {
                    println!("{i:>3}  {entry}");
                }
            }
            (":delete", index) => match index.trim().parse::<usize>() {
                Ok(index) => match handle.delete_history(index).await {
                    Ok(removed) => println!("deleted: {removed}"),
                    Err(e) => eprintln!("! {e}"),
                },
                Err(_) => eprintln!("! usage: :delete <index>"),
            },
            _ => {
                let handle = handle.clone();
                let text = line.to_string();
                tokio::spawn(async move {
                    match handle.submit(text).await {
                        Ok(command) => tracing::debug!(kind = %command.kind, "turn settled"),
                        Err(e) => eprintln!("! {e}"),
                    }
                });
            }
        }
    }
}

/// Print the locator the action table produces
fn dispatch(kind: &str, input: &str) -> anyhow::Result<()> {
    match actions::dispatch(kind, input) {
        Some(locator) => println!("{locator}"),
        None => {
            let known: Vec<&str> = actions::known_types().collect();
            anyhow::bail!("no action for type {kind:?} (known: {})", known.join(", "));
        }
    }
    Ok(())
}
