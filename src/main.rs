use anyhow::Context;
use clap::{Parser, Subcommand};
use modsync::{
    serve, synchronize, AutoConfirm, ClientConfig, Confirm, Phase, ServerConfig,
    DEFAULT_CONCURRENCY, DEFAULT_DELETE_FILE, DEFAULT_DOWNLOAD_ENDPOINT, DEFAULT_LIST_ENDPOINT,
    DEFAULT_MODS_FOLDER, DEFAULT_SERVER_PORT,
};
use std::io::{BufRead, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "modsync")]
#[command(about = "Keep a mods folder in sync with a server", long_about = None)]
#[command(version)]
struct Args {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Publish a mods folder
    Serve {
        /// Folder to publish
        #[arg(short, long, default_value = DEFAULT_MODS_FOLDER)]
        mods_folder: PathBuf,

        /// JSON file of tombstones (file name -> hash)
        #[arg(short, long, default_value = DEFAULT_DELETE_FILE)]
        delete_file: PathBuf,

        /// Port to listen on
        #[arg(short = 'P', long, default_value_t = DEFAULT_SERVER_PORT)]
        port: u16,

        /// Path of the manifest endpoint
        #[arg(long, default_value = DEFAULT_LIST_ENDPOINT)]
        list_endpoint: String,

        /// Path of the download endpoint
        #[arg(long, default_value = DEFAULT_DOWNLOAD_ENDPOINT)]
        download_endpoint: String,
    },

    /// Bring a local mods folder up to date
    Sync {
        /// Local folder to update
        #[arg(short, long, default_value = DEFAULT_MODS_FOLDER)]
        mods_folder: PathBuf,

        /// Server base URL
        #[arg(short, long, default_value_t = format!("http://localhost:{}", DEFAULT_SERVER_PORT))]
        server: String,

        /// Number of parallel downloads
        #[arg(short = 'j', long, default_value_t = DEFAULT_CONCURRENCY)]
        concurrency: usize,

        /// Do not ask before deleting or downloading
        #[arg(short, long)]
        yes: bool,

        /// Path of the manifest endpoint
        #[arg(long, default_value = DEFAULT_LIST_ENDPOINT)]
        list_endpoint: String,

        /// Path of the download endpoint
        #[arg(long, default_value = DEFAULT_DOWNLOAD_ENDPOINT)]
        download_endpoint: String,
    },
}

/// Asks on stdin before each phase.
///
/// The read blocks, so it runs through `block_in_place` to hand the worker
/// thread's other tasks to the rest of the runtime while waiting.
struct TerminalPrompt;

impl Confirm for TerminalPrompt {
    fn confirm(&self, phase: Phase, names: &[String]) -> bool {
        let verb = match phase {
            Phase::Delete => "deleted",
            Phase::Download => "downloaded",
        };
        println!("The following files will be {}:", verb);
        for name in names {
            println!("  - {}", name);
        }
        print!("Proceed? (y/n): ");
        let _ = std::io::stdout().flush();

        tokio::task::block_in_place(|| read_answer(&mut std::io::stdin().lock()))
    }
}

fn read_answer(input: &mut impl BufRead) -> bool {
    let mut answer = String::new();
    if input.read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim(), "y" | "Y" | "yes")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("modsync={}", log_level))
        .init();

    match args.command {
        Command::Serve {
            mods_folder,
            delete_file,
            port,
            list_endpoint,
            download_endpoint,
        } => {
            let config = ServerConfig {
                mods_folder,
                delete_file,
                listen_addr: SocketAddr::from(([0, 0, 0, 0], port)),
                list_endpoint,
                download_endpoint,
            };
            info!("Publishing {:?}", config.mods_folder);
            serve(&config).await.context("server failed")?;
        }
        Command::Sync {
            mods_folder,
            server,
            concurrency,
            yes,
            list_endpoint,
            download_endpoint,
        } => {
            let config = ClientConfig {
                server_address: server,
                list_endpoint,
                download_endpoint,
                mods_folder,
                max_concurrent_downloads: concurrency,
            };
            info!("Syncing {:?} from {}", config.mods_folder, config.server_address);

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, finishing downloads in progress (Ctrl-C again to abort)");
                    on_interrupt.cancel();
                }
                if tokio::signal::ctrl_c().await.is_ok() {
                    std::process::exit(130);
                }
            });

            let confirm: &dyn Confirm = if yes { &AutoConfirm } else { &TerminalPrompt };
            let summary = synchronize(&config, confirm, cancel)
                .await
                .context("sync failed")?;

            if !summary.is_clean() {
                anyhow::bail!(
                    "{} deletions and {} downloads failed",
                    summary.delete_failed,
                    summary.download_failed.len()
                );
            }
        }
    }

    Ok(())
}
