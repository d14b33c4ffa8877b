//! Command line entry point for bootprep.

use bootprep::alias::AliasTable;
use bootprep::classify::Classifier;
use bootprep::config::Config;
use bootprep::download::HttpTransfer;
use bootprep::errors::Fatal;
use bootprep::output::Published;
use bootprep::resolve::Pipeline;
use bootprep::retry::Countdown;
use bootprep_tools::HostTools;
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use color_eyre::eyre::eyre;
use color_eyre::{Report, Result};
use tracing::instrument;

#[derive(Parser)]
#[command(version, about = "Prepare a boot image for a virtual machine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Parser)]
struct ResolveOpts {
    #[clap(flatten)]
    config: Config,

    /// Also write the results to this file as shell variables
    #[clap(long)]
    output: Option<Utf8PathBuf>,

    /// Print the results as JSON instead of shell variables
    #[clap(long)]
    json: bool,
}

#[derive(Parser)]
struct InspectOpts {
    /// Image to inspect
    file: Utf8PathBuf,

    /// Print the result as JSON
    #[clap(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Find, download and prepare the boot image
    Resolve(ResolveOpts),
    /// Report the kind and boot mode of an image without moving it
    Inspect(InspectOpts),
}

fn install_tracing() {
    use tracing_error::ErrorLayer;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let fmt_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .init();
}

fn resolve(opts: ResolveOpts) -> Result<()> {
    let config = &opts.config;
    let tools = HostTools::new();
    let transfer = HttpTransfer::default();
    let aliases = AliasTable::new(config.aliases.clone());
    let outcome = Pipeline::new(config, &tools, &transfer, &aliases, &Countdown).run()?;

    let published = Published::new(&outcome, config.forced_boot_mode());
    if opts.json {
        println!("{}", published.to_json()?);
    } else {
        print!("{}", published.to_env()?);
    }
    if let Some(path) = opts.output.as_deref() {
        published.write_env_file(path)?;
    }
    Ok(())
}

fn inspect(opts: InspectOpts) -> Result<()> {
    let tools = HostTools::new();
    let dir = opts.file.parent().unwrap_or(camino::Utf8Path::new("."));
    let inspection = Classifier::new(&tools, dir, dir, false)
        .inspect(&opts.file)?
        .ok_or_else(|| eyre!("{} is not a usable boot image", opts.file))?;
    if opts.json {
        println!("{}", serde_json::to_string_pretty(&inspection)?);
    } else {
        let mode = inspection
            .mode
            .map(|m| m.to_string())
            .unwrap_or_else(|| "uefi (default)".to_owned());
        println!("kind: {}", inspection.kind);
        println!("boot mode: {mode}");
    }
    Ok(())
}

#[instrument]
fn run() -> Result<(), Report> {
    install_tracing();
    color_eyre::install()?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Resolve(opts) => resolve(opts)?,
        Commands::Inspect(opts) => inspect(opts)?,
    }
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e:?}");
        std::process::exit(Fatal::of(&e).map_or(1, Fatal::code));
    }
}
