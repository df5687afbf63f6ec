// src/main.rs
//! osmos CLI entry point.

use clap::{Parser, Subcommand};
use osmos::{
    install_bundles, query, remove_bundles, CliProgress, Context, DirectoryFetcher, Fetcher,
    HttpFetcher, ManifestStore, RemoveOptions, RequiredBy,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

#[derive(Parser)]
#[command(name = "osmos")]
#[command(version)]
#[command(about = "Content-addressed OS image updater client", long_about = None)]
struct Cli {
    /// Target filesystem root
    #[arg(long, default_value = "/", global = true)]
    path: PathBuf,

    /// State directory for staged content and tracking files
    #[arg(long, default_value = "/var/lib/osmos", global = true)]
    statedir: PathBuf,

    /// Content source: an HTTP(S) base URL or a local directory
    #[arg(long, default_value = "https://cdn.osmos.dev/update", global = true)]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install one or more bundles and their dependencies
    Install {
        /// Bundle names
        #[arg(required = true)]
        bundles: Vec<String>,

        /// Do not install optional (also-add) bundles
        #[arg(long)]
        skip_optional: bool,

        /// Skip the free-space check on <path>/usr
        #[arg(long)]
        skip_diskspace_check: bool,
    },

    /// Remove one or more bundles
    Remove {
        /// Bundle names
        #[arg(required = true)]
        bundles: Vec<String>,

        /// Also remove every bundle that depends on the targets
        #[arg(long)]
        force: bool,
    },

    /// List installed bundles (or all installable bundles)
    List {
        /// List every bundle the current release publishes
        #[arg(long)]
        all: bool,
    },

    /// Show the bundles a bundle includes, recursively
    Includes {
        /// Bundle name
        bundle: String,
    },

    /// Show which bundles require a bundle
    RequiredBy {
        /// Bundle name
        bundle: String,

        /// Consider every installable bundle, not just installed ones
        #[arg(long)]
        all: bool,

        /// Print the full dependency tree
        #[arg(short, long)]
        verbose: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::from(e.exit_code().clamp(1, 255) as u8)
        }
    }
}

fn run(cli: Cli) -> osmos::Result<()> {
    let mut ctx = Context::new(cli.path, cli.statedir);

    let fetcher: Box<dyn Fetcher> =
        if cli.url.starts_with("http://") || cli.url.starts_with("https://") {
            Box::new(HttpFetcher::new(&cli.url)?)
        } else {
            Box::new(DirectoryFetcher::new(PathBuf::from(&cli.url)))
        };

    let mut store = ManifestStore::new(fetcher.as_ref());

    // A populated mix directory enables the local overlay.
    let mix_dir = ctx.mix_dir();
    if mix_dir.is_dir() {
        store = store.with_mix(DirectoryFetcher::new(mix_dir));
    }

    match cli.command {
        Commands::Install {
            bundles,
            skip_optional,
            skip_diskspace_check,
        } => {
            ctx.skip_optional = skip_optional;
            ctx.skip_diskspace_check = skip_diskspace_check;
            let progress = CliProgress::new();
            install_bundles(&ctx, &store, &bundles, &progress)?;
            Ok(())
        }

        Commands::Remove { bundles, force } => {
            let progress = CliProgress::new();
            remove_bundles(&ctx, &store, &bundles, &RemoveOptions { force }, &progress)?;
            Ok(())
        }

        Commands::List { all } => {
            let listings = if all {
                query::installable_bundles(&ctx, &store)?
            } else {
                query::local_bundles(&ctx, &store)?
            };
            for listing in listings {
                println!("{}", listing.printable());
            }
            Ok(())
        }

        Commands::Includes { bundle } => {
            let included = query::included_bundles(&ctx, &store, &bundle)?;
            if included.is_empty() {
                println!("No included bundles");
            } else {
                println!("Bundles included by {}:\n", bundle);
                for name in included {
                    println!("{}", name);
                }
            }
            Ok(())
        }

        Commands::RequiredBy {
            bundle,
            all,
            verbose,
        } => {
            let report = query::required_by_report(&ctx, &store, &bundle, all)?;
            if report.is_empty() {
                println!("No bundles have {} as a dependency", bundle);
                return Ok(());
            }

            println!(
                "{} bundles that have {} as a dependency:",
                if all {
                    "All installable and installed"
                } else {
                    "Installed"
                },
                bundle
            );
            if verbose {
                println!("\nformat:");
                println!(" # * is-required-by");
                println!(" #   |-- is-required-by");
                println!(" # * is-also-required-by # ...\n");
                for row in &report.tree {
                    println!("{}", RequiredBy::render_row(row));
                }
            } else {
                for name in &report.names {
                    println!(" - {}", name);
                }
            }
            println!(
                "\nBundle '{}' is required by {} bundle{}",
                bundle,
                report.count(),
                if report.count() == 1 { "" } else { "s" }
            );
            Ok(())
        }
    }
}
