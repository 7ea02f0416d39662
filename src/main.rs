use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pocket::cli::banner::display_banner;
use pocket::core::config::Config;
use pocket::core::options::{OPT_THREADS, OPT_TIMEOUT};
use pocket::{CancelToken, ModuleRegistry, Outcome, RunMode, RunReport, Session};

#[derive(Parser)]
#[command(name = "pocket")]
#[command(about = "Run pluggable exploit modules against one or many targets", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long)]
    verbose: bool,

    /// Path to the TOML configuration file
    #[arg(long, default_value = "config/pocket.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// List every module in the catalog
    List,

    /// Search the catalog by field=value pairs
    Search {
        /// e.g. service_name=http check=true
        #[arg(required = true)]
        terms: Vec<String>,
    },

    /// Show a module's info and options
    Info {
        #[arg(short, long)]
        module: String,
    },

    /// Select a module, configure it, and run it
    Run {
        #[arg(short, long)]
        module: String,

        /// NAME=VALUE option assignments; point HOST/URL at file://<path>
        /// to fan out over a target list
        #[arg(short = 'o', long = "option")]
        options: Vec<String>,

        #[arg(long, value_enum, default_value_t = Mode::Exploit)]
        mode: Mode,

        /// Emit the run report as JSON instead of formatted text
        #[arg(long)]
        json: bool,
    },
}

#[derive(ValueEnum, Clone, Copy)]
enum Mode {
    Check,
    Exploit,
}

impl From<Mode> for RunMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Check => RunMode::Check,
            Mode::Exploit => RunMode::Exploit,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let show_full_banner = args.len() == 1
        || args.contains(&"--help".to_string())
        || args.contains(&"-h".to_string())
        || args.contains(&"help".to_string());

    if show_full_banner {
        display_banner();
    }

    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("pocket={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load_or_default(&cli.config)?;
    let registry = Arc::new(ModuleRegistry::new());

    match cli.command {
        Commands::List => {
            handle_list(&registry);
        }
        Commands::Search { terms } => {
            handle_search(&registry, terms)?;
        }
        Commands::Info { module } => {
            handle_info(&registry, &module)?;
        }
        Commands::Run {
            module,
            options,
            mode,
            json,
        } => {
            handle_run(registry, &config, &module, options, mode.into(), json).await?;
        }
    }

    Ok(())
}

fn handle_list(registry: &ModuleRegistry) {
    println!();
    println!("{}", "Module List".bright_cyan().bold());
    println!();
    for descriptor in registry.list() {
        println!(
            "  {} {} {} {}",
            "›".bright_black(),
            descriptor.module_name.bright_white(),
            if descriptor.check {
                "[check]".green()
            } else {
                "[no-check]".bright_black()
            },
            descriptor.description.bright_black()
        );
    }
    println!();
}

fn handle_search(registry: &ModuleRegistry, terms: Vec<String>) -> Result<()> {
    let criteria: Vec<(String, String)> = terms
        .iter()
        .map(|term| {
            term.split_once('=')
                .map(|(f, v)| (f.to_string(), v.to_string()))
                .with_context(|| format!("Search term must be field=value, got '{term}'"))
        })
        .collect::<Result<_>>()?;

    let hits = registry.search(&criteria)?;

    println!();
    if hits.is_empty() {
        println!("  {} no modules matched", "◦".bright_black());
    } else {
        for descriptor in hits {
            println!(
                "  {} {} ({}, {}) - {}",
                "›".bright_black(),
                descriptor.module_name.bright_white(),
                descriptor.service_name,
                descriptor.disclosure_date,
                descriptor.description.bright_black()
            );
        }
    }
    println!();
    Ok(())
}

fn handle_info(registry: &Arc<ModuleRegistry>, module: &str) -> Result<()> {
    let mut session = Session::new(Arc::clone(registry));
    session.select(module)?;

    println!();
    println!("{}", "Module info".bright_cyan().bold());
    println!();
    for (key, value) in session.module_info()? {
        println!("  {:>16}: {}", key.bright_yellow(), value);
    }

    println!();
    println!("{}", "Module options".bright_cyan().bold());
    println!();
    println!(
        "  {:>10} {} {}",
        "name".bright_black(),
        "req".bright_black(),
        "value".bright_black()
    );
    for option in session.show_options()? {
        println!(
            "  {:>10} {} {}  {}",
            option.name.bright_white(),
            if option.required {
                "yes".yellow()
            } else {
                "no ".bright_black()
            },
            option
                .value
                .as_deref()
                .unwrap_or("<unset>")
                .bright_black(),
            option.description
        );
    }
    println!();
    Ok(())
}

async fn handle_run(
    registry: Arc<ModuleRegistry>,
    config: &Config,
    module: &str,
    options: Vec<String>,
    mode: RunMode,
    json: bool,
) -> Result<()> {
    let mut session = Session::new(registry);
    session.select(module)?;

    // Config-file defaults apply first so explicit -o pairs win.
    seed_config_defaults(&mut session, config);

    for assignment in options {
        let (name, value) = assignment
            .split_once('=')
            .with_context(|| format!("Option must be NAME=VALUE, got '{assignment}'"))?;
        session.configure(name, value)?;
    }

    let cancel = CancelToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!(
                "\n{} interrupt received, draining in-flight targets",
                "[!]".yellow().bold()
            );
            interrupt.cancel();
        }
    });

    let report = session.run(mode, &cancel).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        render_report(&report);
    }
    Ok(())
}

fn seed_config_defaults(session: &mut Session, config: &Config) {
    let defaults = [
        (OPT_THREADS, config.modules.default_threads.to_string()),
        (OPT_TIMEOUT, config.modules.default_timeout_seconds.to_string()),
    ];
    for (name, value) in defaults {
        // Modules that don't define the option just skip the default.
        let _ = session.configure(name, &value);
    }
}

fn render_report(report: &RunReport) {
    println!();
    for target_outcome in &report.outcomes {
        match &target_outcome.outcome {
            Outcome::Result(result) if result.status => {
                println!(
                    "{} {} {}",
                    "[+]".yellow().bold(),
                    target_outcome.target.bright_white(),
                    result.success_message
                );
            }
            Outcome::Result(result) => {
                println!(
                    "{} {} {}",
                    "[-]".red().bold(),
                    target_outcome.target.bright_white(),
                    result.error_message
                );
            }
            Outcome::NoResult => {
                println!(
                    "{} {} check returned no result",
                    "[*]".blue().bold(),
                    target_outcome.target.bright_white()
                );
            }
        }
    }

    println!();
    if report.interrupted {
        println!(
            "{} module execution interrupted, {} in-flight targets drained",
            "[!]".yellow().bold(),
            report.outcomes.len()
        );
    } else {
        println!("{} module execution completed", "[*]".blue().bold());
    }
}
