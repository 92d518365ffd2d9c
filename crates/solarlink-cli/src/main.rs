//! Command-line entry point for the solarlink telemetry bridge.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing::{info, warn};

use solarlink_api::{spawn_broadcast_pump, LocalBroadcastHub, ServerState};
use solarlink_bridge::{
    run_broker_session, BrokerSession, SessionCredentials, StateCache, TelemetryBridge,
};
use solarlink_cloud::cache::files;
use solarlink_cloud::{
    token_is_fresh, CloudClient, DiskCache, HousesResponse, LoginTokens, UserResponse,
};
use solarlink_core::config::{defaults, env_vars, json_logging, BridgeSettings};
use solarlink_core::{Device, EventBus, SharedEventBus};

/// Bridge a cloud device telemetry broker to local consumers.
#[derive(Parser, Debug)]
#[command(name = "solarlink")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Vendor account username.
    #[arg(long, env = env_vars::USERNAME)]
    username: String,

    /// Vendor account password.
    #[arg(long, env = env_vars::PASSWORD)]
    password: String,

    /// Base URL of the vendor login endpoint.
    #[arg(long, env = env_vars::LOGIN_API)]
    login_api: String,

    /// Host to bind the local endpoint to.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind the local endpoint to.
    #[arg(short, long, default_value_t = defaults::LISTEN_PORT)]
    port: u16,

    /// Remote broker host.
    #[arg(long, default_value = defaults::BROKER_HOST)]
    broker_host: String,

    /// Remote broker region.
    #[arg(long, default_value = defaults::BROKER_REGION)]
    broker_region: String,

    /// Directory for cached vendor responses.
    #[arg(long, default_value = defaults::CACHE_DIR)]
    cache_dir: PathBuf,

    /// Verbose output.
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn into_settings(self) -> BridgeSettings {
        BridgeSettings {
            username: self.username,
            password: self.password,
            login_api: self.login_api,
            broker_host: self.broker_host,
            broker_region: self.broker_region,
            listen_host: self.host,
            listen_port: self.port,
            cache_dir: self.cache_dir,
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "solarlink=debug,info" } else { "solarlink=info,warn" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    if json_logging() {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let verbose = args.verbose;
    init_tracing(verbose);

    run(args.into_settings()).await
}

async fn run(settings: BridgeSettings) -> Result<()> {
    let cloud = CloudClient::new(&settings.login_api)?;
    let disk = DiskCache::new(&settings.cache_dir);

    // Vendor bootstrap: cached where possible, fetched where not.
    let tokens = load_tokens(&cloud, &disk, &settings).await?;
    let user = load_user(&cloud, &disk, &tokens).await?;

    // Broker credentials are time-limited and never cached.
    let federated = cloud
        .get_federated_credentials(&tokens.id_token, &user.user.identity_id)
        .await
        .context("federated credential exchange failed")?
        .credentials;

    let houses = load_houses(&cloud, &disk, &tokens).await?;
    let devices = load_devices(&cloud, &disk, &tokens, &houses).await?;
    if devices.is_empty() {
        warn!("vendor inventory is empty; the bridge will idle");
    }

    // Assemble the bridge.
    let events: SharedEventBus = Arc::new(EventBus::new());
    let cache = Arc::new(StateCache::new());
    let hub = Arc::new(LocalBroadcastHub::new());

    let session = BrokerSession::new(
        &settings.broker_host,
        &settings.broker_region,
        SessionCredentials {
            access_key_id: federated.access_key_id,
            secret_key: federated.secret_key,
            session_token: federated.session_token,
        },
    );
    info!("opening broker session as {}", session.client_id);
    let (client, eventloop) = session.open();

    let bridge = Arc::new(TelemetryBridge::new(
        client,
        devices,
        cache.clone(),
        events.clone(),
    ));
    let _pump = spawn_broadcast_pump(events.clone(), hub.clone());

    let server_state = ServerState {
        cache,
        hub,
        connection: bridge.connection(),
    };
    let addr: SocketAddr = format!("{}:{}", settings.listen_host, settings.listen_port)
        .parse()
        .context("invalid listen address")?;

    let bridge_task = tokio::spawn(run_broker_session(bridge.clone(), eventloop));

    tokio::select! {
        result = solarlink_api::serve(server_state, addr) => {
            result.context("local endpoint failed")
        }
        result = bridge_task => {
            // A finished session is fatal: refreshed credentials and a
            // fresh process are needed. Exit non-zero for the supervisor.
            let session_result = result.context("bridge task panicked")?;
            session_result
                .map_err(|e| anyhow!(e))
                .context("broker session ended")
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
            bridge.shutdown().await;
            Ok(())
        }
    }
}

async fn load_tokens(
    cloud: &CloudClient,
    disk: &DiskCache,
    settings: &BridgeSettings,
) -> Result<LoginTokens> {
    if let Some(tokens) = disk.read::<LoginTokens>(files::CREDENTIALS).await {
        if token_is_fresh(&tokens.id_token) {
            info!("using cached vendor credentials");
            return Ok(tokens);
        }
    }
    let tokens = cloud
        .login(&settings.username, &settings.password)
        .await
        .context("vendor login failed")?;
    disk.write(files::CREDENTIALS, &tokens).await?;
    Ok(tokens)
}

async fn load_user(
    cloud: &CloudClient,
    disk: &DiskCache,
    tokens: &LoginTokens,
) -> Result<UserResponse> {
    if let Some(user) = disk.read::<UserResponse>(files::USER).await {
        return Ok(user);
    }
    let user = cloud
        .get_user(&tokens.id_token)
        .await
        .context("user lookup failed")?;
    disk.write(files::USER, &user).await?;
    Ok(user)
}

async fn load_houses(
    cloud: &CloudClient,
    disk: &DiskCache,
    tokens: &LoginTokens,
) -> Result<HousesResponse> {
    if let Some(houses) = disk.read::<HousesResponse>(files::HOUSES).await {
        return Ok(houses);
    }
    let houses = cloud
        .get_houses(&tokens.id_token)
        .await
        .context("house enumeration failed")?;
    disk.write(files::HOUSES, &houses).await?;
    Ok(houses)
}

async fn load_devices(
    cloud: &CloudClient,
    disk: &DiskCache,
    tokens: &LoginTokens,
    houses: &HousesResponse,
) -> Result<Vec<Device>> {
    if let Some(devices) = disk.read::<Vec<Device>>(files::DEVICES).await {
        info!("using cached device inventory ({} devices)", devices.len());
        return Ok(devices);
    }
    let devices = cloud
        .load_inventory(&tokens.id_token, houses)
        .await
        .context("device enumeration failed")?;
    disk.write(files::DEVICES, &devices).await?;
    Ok(devices)
}
