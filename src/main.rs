use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use capdriver::config::Config;
use capdriver::resolver::{self, CoordinateResolver, ResolveOptions};
use capdriver::solver::{self, CaptchaTask, SolverClient};
use capdriver::ui::{locators, AppiumClient, ChallengeWalker, WalkLimits};
use capdriver::{CapdriverError, Result};

#[derive(Parser)]
#[command(name = "capdriver", version, about = "CAPTCHA solving automation")]
struct Cli {
    /// Configuration file (defaults to the user config directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the account balance, in US cents.
    Balance,
    /// Upload a CAPTCHA image and wait for the solved text.
    Decode {
        image: PathBuf,
        /// Decode deadline in seconds.
        #[arg(long)]
        timeout: Option<u64>,
        /// Treat the image as a coordinates challenge.
        #[arg(long)]
        coordinates: bool,
    },
    /// Report a job as incorrectly solved.
    Report { id: u64 },
    /// Walk a live challenge through the configured Appium session.
    Solve {
        #[arg(long, value_enum, default_value = "funcaptcha")]
        variant: Variant,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Variant {
    Funcaptcha,
    Recaptcha,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("{} {err}", "error:".red().bold());
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load_from(cli.config.as_deref())?;
    let transport = solver::transport_from_config(&config)?;
    let client = SolverClient::new(transport);

    match cli.command {
        Command::Balance => {
            let balance = client.balance().await?;
            println!("  {}  balance: {balance} US cents", "◆".cyan());
        }

        Command::Decode {
            image,
            timeout,
            coordinates,
        } => {
            let bytes = tokio::fs::read(&image).await?;
            let task = if coordinates {
                CaptchaTask::Coordinates {
                    image: bytes,
                    hint: None,
                }
            } else {
                CaptchaTask::Image(bytes)
            };
            match client.decode(&task, timeout.map(Duration::from_secs)).await? {
                Some(job) => println!(
                    "  {}  job {} solved: {}",
                    "✓".green(),
                    job.id,
                    job.text.unwrap_or_default()
                ),
                None => println!("  {}  not solved before the deadline", "!".yellow()),
            }
        }

        Command::Report { id } => {
            if client.report_incorrect(id).await? {
                println!("  {}  job {id} reported as incorrect", "✓".green());
            } else {
                println!("  {}  the service refused the report for job {id}", "!".yellow());
            }
        }

        Command::Solve { variant } => {
            let session_id = config.appium.session_id.clone().ok_or_else(|| {
                CapdriverError::Config("appium.session_id is required for solve".into())
            })?;
            let driver = AppiumClient::attach(&config.appium.server_url, session_id)?;

            let spec = match variant {
                Variant::Funcaptcha => locators::funcaptcha(),
                Variant::Recaptcha => locators::recaptcha(),
            };
            let opts = ResolveOptions {
                byte_budget: config
                    .resolver
                    .byte_budget
                    .unwrap_or_else(|| resolver::budget_for(config.service.provider)),
                reduce_step: config.resolver.reduce_step,
                initial_factor: spec.initial_reduction,
                report_blank: spec.report_blank,
                timeout: config.service.timeout_secs.map(Duration::from_secs),
                hint: None,
            };
            let limits = WalkLimits {
                resolve_retries: config.resolver.retry_times,
                all_resolve_retries: config.walker.all_resolve_retries,
                error_retries: config.walker.error_retries,
                max_transitions: config.walker.max_transitions,
            };

            let resolver = CoordinateResolver::new(client);
            let walker = ChallengeWalker::new(&driver, &resolver, spec)
                .with_resolve_options(opts)
                .with_limits(limits);

            if walker.run().await? {
                println!("  {}  challenge solved", "✓".green());
            } else {
                println!("  {}  challenge not solved", "!".yellow());
                std::process::exit(2);
            }
        }
    }

    Ok(())
}
