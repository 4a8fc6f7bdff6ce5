//! QuickMark command line.
//!
//! - `serve`: run the relay in front of the automation API
//! - `mark`: mark attendance through a running relay, reusing saved
//!   credentials or prompting for them
//! - `forget`: delete saved credentials

mod render;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Input, Password};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use quickmark::config::{DEFAULT_CREDENTIALS_PATH, DEFAULT_RELAY_URL};
use quickmark::form::CredentialForm;
use quickmark::progress::{self, Phase, ProgressView};
use quickmark::subscription::RelaySubscriber;
use quickmark::{
    ClientConfig, Consumer, CredentialBundle, CredentialStore, FileKeyValueStore, RelayConfig,
    RunState,
};

#[derive(Parser)]
#[command(name = "quickmark")]
#[command(version)]
#[command(about = "QuickMark attendance relay and terminal client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay server
    Serve(ServeArgs),
    /// Mark attendance through a relay
    Mark(MarkArgs),
    /// Delete saved credentials
    Forget(ForgetArgs),
}

#[derive(Parser)]
struct ServeArgs {
    /// Optional TOML config file; flags and environment take precedence
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, env = "QUICKMARK_BIND_ADDR")]
    bind_addr: Option<String>,

    /// Upstream automation endpoint
    #[arg(long, env = "QUICKMARK_API_URL")]
    api_url: Option<String>,
}

#[derive(Parser)]
struct MarkArgs {
    #[arg(long, env = "QUICKMARK_RELAY_URL", default_value = DEFAULT_RELAY_URL)]
    relay_url: String,

    #[arg(long, env = "QUICKMARK_CREDENTIALS", default_value = DEFAULT_CREDENTIALS_PATH)]
    credentials: PathBuf,

    /// Ignore saved credentials and prompt again
    #[arg(long)]
    fresh: bool,

    /// Prefill the account email when prompting
    #[arg(long)]
    email: Option<String>,
}

#[derive(Parser)]
struct ForgetArgs {
    #[arg(long, env = "QUICKMARK_CREDENTIALS", default_value = DEFAULT_CREDENTIALS_PATH)]
    credentials: PathBuf,
}

fn init_tracing(default_directive: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => {
            init_tracing("info");
            serve(args).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Mark(args) => {
            init_tracing("warn");
            mark(args).await
        }
        Commands::Forget(args) => {
            init_tracing("warn");
            let store = CredentialStore::new(FileKeyValueStore::new(args.credentials));
            render::forgotten(store.clear()?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let base = match &args.config {
        Some(path) => RelayConfig::from_file(path)?,
        None => RelayConfig::default(),
    };
    let config = base.with_overrides(args.bind_addr, args.api_url);

    quickmark::relay::serve(config)
        .await
        .context("relay server failed")?;
    Ok(())
}

enum Step {
    Pumped(bool),
    Interrupted,
}

async fn mark(args: MarkArgs) -> anyhow::Result<ExitCode> {
    let config = ClientConfig {
        relay_url: args.relay_url,
        credentials_path: args.credentials,
    };

    debug!(relay = %config.relay_url, credentials = %config.credentials_path.display(), "marking attendance");
    let subscriber = Arc::new(RelaySubscriber::new(&config.relay_url)?);
    let store = CredentialStore::new(FileKeyValueStore::new(&config.credentials_path));
    let mut consumer = Consumer::new(subscriber, store);

    if args.fresh {
        consumer.forget()?;
    }
    consumer.load_stored()?;

    let bundle = match progress::phase(consumer.state(), consumer.bundle()) {
        Phase::Ready { account_email } => {
            render::ready(&account_email);
            consumer.bundle().cloned()
        }
        Phase::Form | Phase::Progress => None,
    };
    let bundle = match bundle {
        Some(bundle) => bundle,
        None => match prompt_credentials(args.email)? {
            Some(bundle) => bundle,
            None => return Ok(ExitCode::FAILURE),
        },
    };

    consumer.start_run(bundle);

    let mut shown = 0;
    loop {
        shown = render::events_since(consumer.log(), shown);
        let step = tokio::select! {
            more = consumer.pump() => Step::Pumped(more),
            _ = tokio::signal::ctrl_c() => Step::Interrupted,
        };
        match step {
            Step::Pumped(true) => continue,
            Step::Pumped(false) => break,
            Step::Interrupted => {
                consumer.close_subscription();
                render::interrupted();
                return Ok(ExitCode::FAILURE);
            }
        }
    }
    render::events_since(consumer.log(), shown);

    render::progress_bar(&ProgressView::from_log(consumer.log()));
    if let Some(outcome) = progress::outcome(consumer.state(), consumer.log()) {
        render::outcome(&outcome);
    }

    Ok(match consumer.state() {
        RunState::Succeeded => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    })
}

/// Ask for the three credential fields. `None` when the input is rejected.
fn prompt_credentials(email: Option<String>) -> anyhow::Result<Option<CredentialBundle>> {
    let theme = ColorfulTheme::default();

    let mut email_input = Input::<String>::with_theme(&theme).with_prompt("QuickChex email");
    if let Some(email) = email {
        email_input = email_input.with_initial_text(email);
    }
    let email = email_input.interact_text()?;
    let password = Password::with_theme(&theme)
        .with_prompt("QuickChex password")
        .interact()?;
    let app_password = Password::with_theme(&theme)
        .with_prompt("Gmail app password")
        .interact()?;

    match CredentialForm::new(email, password, app_password).validate() {
        Ok(bundle) => Ok(Some(bundle)),
        Err(e) => {
            render::validation_error(&e.to_string());
            Ok(None)
        }
    }
}
