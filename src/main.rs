//! qmreport: live test-run report viewer CLI

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use colored::Colorize;
use qmreport::config::{load_config, write_default_config, Config};
use qmreport::reporter::{ConsoleReporter, JsonReporter};
use qmreport::session::{run_session, run_single_cycle, Session, SessionOptions, UserAction};
use qmreport::source::{open_source, ReportSource};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::mpsc;
use tracing_subscriber::EnvFilter;

/// qmreport: render and follow test-run reports
#[derive(Parser, Debug)]
#[command(name = "qmreport")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(ClapArgs, Debug)]
struct PageArgs {
    /// Report directory (or http(s) URL with the `http` feature)
    source: String,

    /// Output HTML file
    #[arg(long, short, default_value = "report.html")]
    output: PathBuf,

    /// Show passing tests too
    #[arg(long)]
    all: bool,

    /// Page title
    #[arg(long)]
    title: Option<String>,

    /// Path to config file (default: search .qmreportrc.json in current dir and parents)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch the report once and write the HTML page
    Render {
        #[command(flatten)]
        page: PageArgs,
    },

    /// Keep the page current while the run is in progress; reads commands from stdin
    Watch {
        #[command(flatten)]
        page: PageArgs,

        /// Seconds between polls
        #[arg(long, value_name = "SECS")]
        interval: Option<u64>,
    },

    /// Print outcome counts and the tests that did not pass
    Summary {
        /// Report directory (or http(s) URL with the `http` feature)
        source: String,

        /// Output format as JSON
        #[arg(long, short)]
        json: bool,

        /// Exit 1 if any test did not pass
        #[arg(long)]
        strict: bool,

        /// List every test and all annotations
        #[arg(long, short)]
        verbose: bool,

        /// Path to config file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Create .qmreportrc.json with the default settings
    Init {
        /// Directory in which to create config (default: current)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    init_logging();
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {:#}", "Error".red().bold(), e);
            ExitCode::from(2)
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("QMREPORT_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run() -> Result<ExitCode> {
    match Args::parse().command {
        Commands::Render { page } => run_render(&page),
        Commands::Watch { page, interval } => run_watch(&page, interval),
        Commands::Summary {
            source,
            json,
            strict,
            verbose,
            config,
        } => run_summary(&source, json, strict, verbose, config.as_deref()),
        Commands::Init { dir } => run_init(dir.as_deref()),
    }
}

fn resolve_config(custom: Option<&Path>) -> Result<Config> {
    let work_dir = std::env::current_dir().context("Failed to read current directory")?;
    load_config(&work_dir, custom)
}

fn session_options(config: &Config, source: &dyn ReportSource) -> Result<SessionOptions> {
    Ok(SessionOptions {
        title: config.title().to_string(),
        interval: config.poll_interval(),
        scope: config.scope(),
        tree: config
            .tree_options()
            .context("Invalid ignoreFields pattern in config")?,
        bundle_base: Some(source.base_url()),
    })
}

/// Write via a sibling temp file so a refreshing browser never sees a partial page
fn write_page(path: &Path, html: &str) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, html)?;
    std::fs::rename(&tmp, path)
}

fn warn_fetch_errors(session: &Session) {
    for error in session.errors() {
        eprintln!("{}: {}", "Warning".yellow(), error);
    }
    if !session.rejected().is_empty() {
        eprintln!(
            "{}: {} malformed summary record(s) skipped",
            "Warning".yellow(),
            session.rejected().len()
        );
    }
}

fn run_render(page: &PageArgs) -> Result<ExitCode> {
    let config = resolve_config(page.config.as_deref())?.merge_with_cli(
        None,
        page.all,
        page.title.as_deref(),
    );
    let source = open_source(&page.source)?;
    let mut session = Session::new(session_options(&config, source.as_ref())?);

    run_single_cycle(&mut session, source.as_ref());
    warn_fetch_errors(&session);

    write_page(&page.output, &session.render_page())
        .with_context(|| format!("Failed to write {}", page.output.display()))?;
    eprintln!(
        "{}: Wrote {} ({} tests)",
        "Info".blue(),
        page.output.display(),
        session.store().counters().total
    );

    if session.store().is_empty() && !session.errors().is_empty() {
        return Ok(ExitCode::from(2));
    }
    Ok(ExitCode::SUCCESS)
}

/// Forward parsed stdin commands until EOF
fn spawn_command_reader() -> mpsc::Receiver<UserAction> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<UserAction>() {
                Ok(action) => {
                    if tx.send(action).is_err() {
                        break;
                    }
                }
                Err(e) => eprintln!("{}: {}", "Warning".yellow(), e),
            }
        }
    });
    rx
}

fn run_watch(page: &PageArgs, interval: Option<u64>) -> Result<ExitCode> {
    let config = resolve_config(page.config.as_deref())?.merge_with_cli(
        interval,
        page.all,
        page.title.as_deref(),
    );
    let source = open_source(&page.source)?;
    let mut session = Session::new(session_options(&config, source.as_ref())?);

    eprintln!(
        "{}: Following {} every {}s, writing {} (type `stop` or `quit`)",
        "Info".blue(),
        source.location(),
        config.poll_interval().as_secs(),
        page.output.display()
    );

    let commands = spawn_command_reader();
    run_session(&mut session, source.as_ref(), &commands, |html| {
        write_page(&page.output, html)
    })
    .with_context(|| format!("Failed to write {}", page.output.display()))?;

    warn_fetch_errors(&session);
    let status = if session.controller().is_running() {
        "polling stopped"
    } else {
        "run finished"
    };
    eprintln!("{}: {}, final page at {}", "Info".blue(), status, page.output.display());
    Ok(ExitCode::SUCCESS)
}

fn run_summary(
    location: &str,
    json: bool,
    strict: bool,
    verbose: bool,
    config_path: Option<&Path>,
) -> Result<ExitCode> {
    let config = resolve_config(config_path)?;
    let source: Box<dyn ReportSource> = open_source(location)?;
    let mut session = Session::new(session_options(&config, source.as_ref())?);
    run_single_cycle(&mut session, source.as_ref());

    if json {
        println!("{}", JsonReporter::new().pretty().report(location, &session));
    } else {
        let reporter = ConsoleReporter::new();
        let reporter = if verbose { reporter.verbose() } else { reporter };
        reporter.report(location, &session);
    }

    if session.store().is_empty() && !session.errors().is_empty() {
        return Ok(ExitCode::from(2));
    }
    if strict && !session.store().not_passed_ids().is_empty() {
        return Ok(ExitCode::from(1));
    }
    Ok(ExitCode::SUCCESS)
}

fn run_init(dir: Option<&Path>) -> Result<ExitCode> {
    let dir = dir.unwrap_or(Path::new("."));
    if dir.join(qmreport::config::CONFIG_FILENAME).exists() {
        eprintln!(
            "{}: {} already exists in {}",
            "Warning".yellow(),
            qmreport::config::CONFIG_FILENAME,
            dir.display()
        );
        return Ok(ExitCode::SUCCESS);
    }
    let path = write_default_config(dir)?;
    eprintln!("{}: Created {}", "Info".blue(), path.display());
    Ok(ExitCode::SUCCESS)
}
