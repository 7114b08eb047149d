use clap::{Parser, Subcommand};
use p2pfile::{Config, FileManager, Node, PeerClient, PullOutcome, PushOutcome, Result};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "p2pfile")]
#[command(about = "Share files with peers on the local network")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive peer node
    Start {
        /// JSON config file; flags below override its values
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Name announced to other peers
        #[arg(short, long)]
        name: Option<String>,
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
        /// Directory to share files from
        #[arg(short, long)]
        dir: Option<PathBuf>,
        /// Address to announce instead of the detected LAN address
        #[arg(long)]
        advertise_ip: Option<IpAddr>,
        /// Seconds to wait for an answer before denying an inbound transfer
        #[arg(long)]
        consent_timeout: Option<u64>,
        /// Seconds allowed for each outbound connect and read
        #[arg(long)]
        io_timeout: Option<u64>,
    },
    /// List the files a peer shares
    List {
        /// Peer address (host:port)
        #[arg(long)]
        peer: SocketAddr,
        #[arg(short, long, default_value = "./shared")]
        dir: PathBuf,
    },
    /// Download a file from a peer
    Request {
        /// Peer address (host:port)
        #[arg(long)]
        peer: SocketAddr,
        /// File name in the peer's shared directory
        #[arg(short, long)]
        file: String,
        /// Directory the file is saved into
        #[arg(short, long, default_value = "./shared")]
        dir: PathBuf,
    },
    /// Offer a file from the shared directory to a peer
    Send {
        /// Peer address (host:port)
        #[arg(long)]
        peer: SocketAddr,
        #[arg(short, long)]
        file: String,
        #[arg(short, long, default_value = "./shared")]
        dir: PathBuf,
    },
}

async fn one_shot_client(dir: PathBuf) -> Result<PeerClient> {
    let files = Arc::new(FileManager::new(dir).await?);
    Ok(PeerClient::new(files, Config::default().io_timeout()))
}

#[tokio::main]
async fn main() -> Result<()> {
    p2pfile::utils::setup_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            config,
            name,
            port,
            dir,
            advertise_ip,
            consent_timeout,
            io_timeout,
        } => {
            let mut config = match config {
                Some(path) => Config::load(&path)?,
                None => Config::default(),
            };
            if let Some(name) = name {
                config.node_name = name;
            }
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(dir) = dir {
                config.shared_dir = dir;
            }
            if advertise_ip.is_some() {
                config.advertise_ip = advertise_ip;
            }
            if let Some(secs) = consent_timeout {
                config.consent_timeout_secs = secs;
            }
            if let Some(secs) = io_timeout {
                config.io_timeout_secs = secs;
            }

            let mut node = Node::new(config).await?;
            node.start().await?;
        }
        Commands::List { peer, dir } => {
            let client = one_shot_client(dir).await?;
            let files = client.list(peer).await?;

            if files.is_empty() {
                println!("No files available from {}", peer);
            } else {
                println!("Files available from {}:", peer);
                for file in files {
                    println!("  {}", file);
                }
            }
        }
        Commands::Request { peer, file, dir } => {
            let client = one_shot_client(dir).await?;
            match client.pull(peer, &file).await? {
                PullOutcome::Received { path, bytes } => {
                    println!("Received {} ({} bytes), saved to {}", file, bytes, path.display())
                }
                PullOutcome::Denied { .. } => println!("Request for {} denied by {}", file, peer),
            }
        }
        Commands::Send { peer, file, dir } => {
            let client = one_shot_client(dir).await?;
            match client.push(peer, &file).await? {
                PushOutcome::Sent { bytes } => println!("Sent {} ({} bytes) to {}", file, bytes, peer),
                PushOutcome::Denied { .. } => println!("Offer for {} denied by {}", file, peer),
            }
        }
    }

    Ok(())
}
