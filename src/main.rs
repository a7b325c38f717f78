use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use hummingbird::config::{self, Configuration, Settings};
use hummingbird::runtime::logger;
use hummingbird::store::TableContext;

pub mod app;

#[derive(Parser)]
#[command(name = "hummingbird", version, about = "Inspect and move stored sparse tables")]
struct Cli {
    #[arg(
        long = "config",
        short = 'c',
        global = true,
        help = "Properties or JSON configuration file (default: <config dir>/hummingbird/hummingbird.properties)"
    )]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a stored table as a grid
    Show {
        #[arg(help = "Local path or user[.password]@host[:port]:path")]
        path: String,

        #[arg(long = "sort", short = 's', help = "Sort rows and columns by their text")]
        sort: bool,

        #[arg(
            long = "types",
            short = 't',
            default_value = app::DEFAULT_TYPES,
            help = "Type tags of row keys, column keys and values: int, long, double, string, json-object, json-array"
        )]
        types: String,
    },

    /// Copy a table between csv and binary (.hbt) storage, locally or remotely
    Convert {
        from: String,
        to: String,

        #[arg(long = "types", short = 't', default_value = app::DEFAULT_TYPES)]
        types: String,
    },
}

fn load_settings(path: Option<PathBuf>) -> anyhow::Result<Settings> {
    let locations: Vec<PathBuf> = path.or_else(config::default_location).into_iter().collect();
    let configuration = Configuration::load(&locations)
        .with_context(|| format!("cannot read configuration from {locations:?}"))?;
    Ok(Settings::from_configuration(&configuration)?)
}

pub fn main() -> anyhow::Result<()> {
    // Reset SIGPIPE to default so writing to a broken pipe exits cleanly
    // instead of panicking.
    #[cfg(unix)]
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }

    logger::init("hummingbird=info");
    let cli = Cli::parse();

    let settings = load_settings(cli.config)?;
    info!(staging = %settings.staging_dir.display(), "starting hummingbird");
    let context = TableContext::with_openssh(settings);

    match cli.command {
        Command::Show { path, sort, types } => {
            println!("{}", app::show(&context, &path, &types, sort)?);
        }
        Command::Convert { from, to, types } => {
            app::convert(&context, &from, &to, &types)?;
        }
    }
    Ok(())
}
