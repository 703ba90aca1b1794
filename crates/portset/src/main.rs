use clap::{Parser, Subcommand};
use std::path::PathBuf;

use portset::config::BuildConfig;
use portset::executor::{PassSink, StdoutSink, TracingSink};
use portset::make::SystemMake;
use portset::pass::{OptionsPass, PassReport};
use portset::{Error, ErrorKind, Result, pkglist, poudriere, tools};

#[derive(Debug, Parser)]
#[command(author, version, about = "Build sets of FreeBSD ports with poudriere")]
struct Args {
    /// Path to the ports.toml config (default: /usr/local/etc/ports/ports.toml)
    #[arg(long, short, global = true, env = "PORTSET_CONFIG")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, clap::Args)]
struct PassArgs {
    /// Max number of make queries to run concurrently (0 = use CPU count)
    #[arg(long)]
    max_parallel: Option<usize>,
    /// Also check the ports named in the package lists, not only their dependencies
    #[arg(long)]
    include_seeds: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Find ports whose saved options are stale and run `make config` for them
    Options {
        #[command(flatten)]
        pass: PassArgs,
        /// Report stale ports without running `make config`
        #[arg(long)]
        dry_run: bool,
        /// Print the pass report as JSON on stdout
        #[arg(long)]
        json: bool,
    },
    /// Sync options, then run `poudriere bulk` over the package lists
    Build {
        #[command(flatten)]
        pass: PassArgs,
        /// Go straight to the bulk build
        #[arg(long)]
        skip_options: bool,
    },
    /// Run `poudriere pkgclean` over the package lists
    Clean,
    /// Create the poudriere jail and ports tree
    Setup,
    /// Update the ports tree and remove the configured leftovers
    Update,
    /// Print the ports found in the package lists
    Lists,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let cfg = portset::config::load_build_config(args.config.as_deref())?;

    match args.cmd {
        Command::Options {
            pass,
            dry_run,
            json,
        } => cmd_options(&cfg, &pass, dry_run, json),
        Command::Build { pass, skip_options } => cmd_build(&cfg, &pass, skip_options),
        Command::Clean => {
            let lists = pkglist::list_files(&cfg)?;
            poudriere::pkgclean(&cfg, &lists)
        }
        Command::Setup => poudriere::setup(&cfg),
        Command::Update => poudriere::update_ports(&cfg),
        Command::Lists => cmd_lists(&cfg),
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

// Rejected list lines are already logged by the loader.
fn run_pass(
    cfg: &BuildConfig,
    pass: &PassArgs,
    dry_run: bool,
    sink: &dyn PassSink,
) -> Result<PassReport> {
    let make = SystemMake::new(tools::require(tools::MAKE)?);
    let lists = pkglist::load(cfg)?;

    let mut options_pass = OptionsPass::new(cfg, &make, sink).dry_run(dry_run);
    if let Some(n) = pass.max_parallel {
        let n = if n == 0 { num_cpus::get() } else { n };
        options_pass = options_pass.max_parallel(n);
    }
    if pass.include_seeds {
        options_pass = options_pass.include_seeds(true);
    }
    Ok(options_pass.run(&lists.ports))
}

fn check_report(report: &PassReport) -> Result<()> {
    if report.ok() {
        return Ok(());
    }
    Err(Error::new(
        ErrorKind::ReconfigurationFailed,
        format!("{} port(s) failed to reconfigure", report.failed.len()),
    ))
}

fn cmd_options(cfg: &BuildConfig, pass: &PassArgs, dry_run: bool, json: bool) -> Result<()> {
    let report = if json {
        let report = run_pass(cfg, pass, dry_run, &TracingSink)?;
        let s = serde_json::to_string_pretty(&report)
            .map_err(|e| Error::msg(format!("json encode error: {e}")))?;
        println!("{s}");
        report
    } else {
        run_pass(cfg, pass, dry_run, &StdoutSink::default())?
    };
    check_report(&report)
}

fn cmd_build(cfg: &BuildConfig, pass: &PassArgs, skip_options: bool) -> Result<()> {
    if skip_options {
        tools::require(tools::POUDRIERE)?;
    } else {
        tools::require_all(&[tools::POUDRIERE, tools::MAKE])?;
        let report = run_pass(cfg, pass, false, &StdoutSink::default())?;
        check_report(&report)?;
    }
    let lists = pkglist::list_files(cfg)?;
    poudriere::bulk(cfg, &lists)
}

fn cmd_lists(cfg: &BuildConfig) -> Result<()> {
    let lists = pkglist::load(cfg)?;
    for file in &lists.files {
        println!("# {}", file.display());
    }
    for port in &lists.ports {
        println!("{port}");
    }
    for r in &lists.rejected {
        println!(
            "REJECTED: {}:{} '{}': {}",
            r.file.display(),
            r.line,
            r.text,
            r.error
        );
    }
    Ok(())
}
