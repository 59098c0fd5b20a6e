//! async-socket - command line front end for the socket library

use std::io::Write;
use std::path::PathBuf;

use futures_util::StreamExt;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use async_socket::config::Config;
use async_socket::error::{Error, Result};
use async_socket::transport::{resolve, Purpose};
use async_socket::{AsyncSocket, Connection, SocketConfig};

fn main() -> Result<()> {
    let args = Args::parse();

    if args.version {
        print_version();
        return Ok(());
    }

    let Some(command) = args.command.clone() else {
        print_help();
        std::process::exit(1);
    };

    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if args.broadcast {
        config.socket.broadcast = true;
    }

    // Initialize logging
    let log_level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse().ok())
        .or_else(|| config.log.level.parse().ok())
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| Error::Config(format!("Failed to set tracing subscriber: {}", e)))?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(command, config.socket))
}

async fn run(command: Command, config: SocketConfig) -> Result<()> {
    match command {
        Command::Listen { host, port } => serve(&host, port, config).await,
        Command::Connect { host, port, text } => {
            let conn = AsyncSocket::connect_with(&host, port, &config).await?;
            info!("Connected to {}", host_port(&conn));
            conn.print(&text).await?;
            print_text(&conn).await
        }
        Command::UdpRecv { host, port } => {
            let conn = AsyncSocket::bind_udp_with(&host, port, &config).await?;
            info!("Receiving datagrams on {}", conn.local_endpoint());
            loop {
                // A bad datagram ends one stream; the next one keeps going
                if let Err(e) = print_text(&conn).await {
                    warn!("{}", e);
                }
            }
        }
        Command::UdpSend { host, port, text } => {
            let conn = AsyncSocket::udp_with(&config).await?;
            let target = resolve(&host, port, Purpose::Connect).await?;
            let sent = conn.print_to(&target, &text).await?;
            info!("Sent {} bytes to {}", sent, target);
            conn.close();
            Ok(())
        }
    }
}

async fn serve(host: &str, port: u16, config: SocketConfig) -> Result<()> {
    let mut listener = AsyncSocket::listen_with(host, port, config);
    let local = listener.bound().await?;
    info!("Listening on {}", local);

    let mut conn_count: u64 = 0;
    while let Some(accepted) = listener.next().await {
        let conn = accepted?;
        conn_count += 1;
        let conn_id = conn_count;
        info!("New connection #{} from {}", conn_id, host_port(&conn));

        tokio::spawn(async move {
            if let Err(e) = print_text(&conn).await {
                warn!("Connection #{} error: {}", conn_id, e);
            }
            conn.close();
        });
    }
    Ok(())
}

/// Print decoded text until the stream ends
async fn print_text(conn: &Connection) -> Result<()> {
    let mut text = conn.text();
    while let Some(item) = text.next().await {
        let item = item?;
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(item.as_bytes())?;
        stdout.flush()?;
    }
    Ok(())
}

fn host_port(conn: &Connection) -> String {
    match conn.remote_endpoint() {
        Some(remote) => remote.to_string(),
        None => "-".to_string(),
    }
}

#[derive(Debug, Clone)]
enum Command {
    Listen { host: String, port: u16 },
    Connect { host: String, port: u16, text: String },
    UdpRecv { host: String, port: u16 },
    UdpSend { host: String, port: u16, text: String },
}

/// Command line arguments
struct Args {
    command: Option<Command>,
    config: Option<PathBuf>,
    broadcast: bool,
    version: bool,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let mut config = None;
        let mut broadcast = false;
        let mut version = false;
        let mut positional = Vec::new();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "-c" | "--config" => {
                    if i + 1 < args.len() {
                        config = Some(PathBuf::from(&args[i + 1]));
                        i += 1;
                    }
                }
                "--broadcast" => broadcast = true,
                "-v" | "--version" => version = true,
                "-h" | "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                arg => positional.push(arg.to_string()),
            }
            i += 1;
        }

        Self {
            command: Self::command(&positional),
            config,
            broadcast,
            version,
        }
    }

    fn command(positional: &[String]) -> Option<Command> {
        let (name, rest) = positional.split_first()?;
        let host = rest.first()?.clone();
        let port = rest.get(1)?.parse().ok()?;
        let text = rest.get(2).cloned();

        match name.as_str() {
            "listen" => Some(Command::Listen { host, port }),
            "connect" => Some(Command::Connect { host, port, text: text? }),
            "udp-recv" => Some(Command::UdpRecv { host, port }),
            "udp-send" => Some(Command::UdpSend { host, port, text: text? }),
            _ => None,
        }
    }
}

fn print_help() {
    println!(
        r#"async-socket - async TCP/UDP sockets with grapheme-aware decoding

USAGE:
    async-socket [OPTIONS] <COMMAND> <HOST> <PORT> [TEXT]

COMMANDS:
    listen <HOST> <PORT>            Accept TCP connections and print received text
    connect <HOST> <PORT> <TEXT>    Send text over TCP and print the reply
    udp-recv <HOST> <PORT>          Print every datagram received on HOST:PORT
    udp-send <HOST> <PORT> <TEXT>   Send one datagram

OPTIONS:
    -c, --config <FILE>     Path to JSON configuration file
    --broadcast             Allow sending to the broadcast address
    -v, --version           Print version information
    -h, --help              Print help information

EXAMPLES:
    async-socket listen 127.0.0.1 7000
    async-socket connect 127.0.0.1 7000 "hello"
    async-socket udp-send 255.255.255.255 7001 "ping" --broadcast
"#
    );
}

fn print_version() {
    println!("async-socket v{}", env!("CARGO_PKG_VERSION"));
}
