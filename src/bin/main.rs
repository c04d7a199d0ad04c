use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

use attendance_relay::relay::{RelayController, RelayPort};
use attendance_relay::session::DurableStorage;
use attendance_relay::stream::{StreamUrlParams, filter_rooms};
use attendance_relay::{
    ApiClient, AuthSession, DEFAULT_API_BASE, DEFAULT_RELAY_BIND, FileStorage, RelayConfig,
    RemoteRelay, Role, RoomId, SessionToken, SessionUser, parse_api_host, resolve_session_path,
    start_relay_http, stream_url,
};

#[derive(Parser)]
#[command(name = "attendance-relay")]
#[command(about = "Access-token relay for authenticated attendance camera streams")]
struct Cli {
    /// Backend origin
    #[arg(long, global = true, env = "ATTENDANCE_API_BASE", default_value = DEFAULT_API_BASE)]
    api_base: String,
    /// Relay server used by the session commands
    #[arg(long, global = true, env = "ATTENDANCE_RELAY_URL", default_value = "http://127.0.0.1:5173")]
    relay_url: String,
    /// Session storage file
    #[arg(long, global = true, env = "ATTENDANCE_SESSION_PATH")]
    session_path: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay HTTP server
    Serve {
        /// Bind address, e.g. 0.0.0.0:5173
        #[arg(long, env = "ATTENDANCE_RELAY_BIND", default_value = DEFAULT_RELAY_BIND)]
        bind: String,
    },
    /// Store a session and push its token to the relay
    Login {
        #[arg(long)]
        token: String,
        #[arg(long, default_value = "Admin")]
        role: Role,
    },
    /// Clear the stored session and the relay's copy of the token
    Logout,
    /// Show the stored session
    Whoami,
    /// Ask the relay which token it currently holds
    RelayToken,
    /// Print the stream URL for a room
    StreamUrl {
        room: String,
        /// Leave the token out of the query string
        #[arg(long, default_value_t = false)]
        no_query_token: bool,
    },
    /// List rooms from the backend
    Rooms {
        #[arg(short, long)]
        search: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("attendance_relay=info".parse()?)
                .add_directive("hyper=warn".parse()?),
        )
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();
    let api_host = parse_api_host(&cli.api_base)?;

    match cli.command {
        Commands::Serve { bind } => {
            info!("Starting relay on {}", bind);
            start_relay_http(RelayConfig::new(api_host, bind)).await?;
        }
        Commands::Login { token, role } => {
            let Some(token) = SessionToken::parse(token) else {
                return Err(anyhow::anyhow!("Token must not be empty"));
            };
            let session = open_session(cli.session_path, &cli.relay_url).await?;
            let outcome = session.login(SessionUser::new(token, role)).await?;
            println!("Signed in as {} ({:?})", role, outcome);
            println!("Landing page: {}", session.current_route().path());
        }
        Commands::Logout => {
            let session = open_session(cli.session_path, &cli.relay_url).await?;
            let outcome = session.logout().await?;
            println!("Signed out ({:?})", outcome);
        }
        Commands::Whoami => {
            let storage = FileStorage::new(resolve_session_path(cli.session_path));
            match AuthSession::restore(&storage)? {
                Some(user) => {
                    println!("Role: {}", user.role());
                    println!("Token: {:?}", user.token());
                }
                None => println!("Not signed in"),
            }
        }
        Commands::RelayToken => {
            let relay = RemoteRelay::new(parse_api_host(&cli.relay_url)?)?;
            match relay.controller().await {
                Some(port) => match port.query_token().await? {
                    Some(token) => println!("Relay holds a token ({} bytes)", token.as_str().len()),
                    None => println!("Relay holds no token"),
                },
                None => println!("No relay worker is active at {}", cli.relay_url),
            }
        }
        Commands::StreamUrl {
            room,
            no_query_token,
        } => {
            let room = room.trim();
            if room.is_empty() {
                return Err(anyhow::anyhow!("Please enter a roomId"));
            }
            let storage = FileStorage::new(resolve_session_path(cli.session_path));
            let token = if no_query_token {
                None
            } else {
                AuthSession::restore(&storage)?.map(|user| user.token().clone())
            };
            let url = StreamUrlParams::now(token).apply(stream_url(&api_host, &RoomId::new(room))?);
            println!("{}", url);
        }
        Commands::Rooms { search } => {
            let session = open_session(cli.session_path, &cli.relay_url).await?;
            let client = ApiClient::new(&api_host, session)?;
            let rooms = client.list_rooms().await?;
            let matches = filter_rooms(&rooms, search.as_deref().unwrap_or(""));
            if matches.is_empty() {
                println!("No rooms found");
            }
            for room in matches {
                println!(
                    "{}\t{}\t{}",
                    room.id,
                    room.name,
                    room.first_camera().unwrap_or("-")
                );
            }
        }
    }

    Ok(())
}

/// Open the file-backed session, mirrored to the relay at `relay_url`.
async fn open_session(session_path: Option<PathBuf>, relay_url: &str) -> Result<Arc<AuthSession>> {
    let path = resolve_session_path(session_path);
    let storage: Arc<dyn DurableStorage> = Arc::new(FileStorage::new(path));
    let relay: Arc<dyn RelayController> = Arc::new(RemoteRelay::new(parse_api_host(relay_url)?)?);
    Ok(Arc::new(AuthSession::load(storage, relay).await?))
}
