use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use party_bridge::{
    host_party, PartyVoiceBridge, SessionLifecycleEvent, StaticSessionDirectory, PARTY_SESSION,
};
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use voice_backend::{LoopbackVoiceBackend, NullVoiceBackend, VoiceBackend};
use voice_core::{
    load_settings, spawn_service, DevTokenExchange, HttpTokenExchange, TokenExchange, VoiceEvent,
    VoiceOrchestrator, VoiceSettings,
};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendKind {
    Loopback,
    None,
}

#[derive(Parser, Debug)]
struct Args {
    #[arg(long)]
    username: String,
    /// Party session id used as the voice channel name.
    #[arg(long, default_value = "party-1")]
    party: String,
    #[arg(long, value_enum, default_value_t = BackendKind::Loopback)]
    backend: BackendKind,
    /// Bearer token for the HTTP token service. Without it tokens are issued locally.
    #[arg(long)]
    access_token: Option<String>,
}

const LOCAL_USER: u32 = 0;
const LOGIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let args = Args::parse();
    let settings = load_settings();

    let backend: Arc<dyn VoiceBackend> = match args.backend {
        BackendKind::Loopback => Arc::new(LoopbackVoiceBackend::new()),
        BackendKind::None => Arc::new(NullVoiceBackend),
    };
    let (voice, service) = spawn_service(
        VoiceOrchestrator::new(backend, &settings),
        settings.event_capacity,
    );
    if let Err(err) = voice.initialize().await {
        warn!("voice: continuing without a voice backend: {err}");
    }

    let directory = Arc::new(StaticSessionDirectory::new());
    directory.set_token_exchange(LOCAL_USER, token_exchange(&settings, args.access_token)?);
    directory.set_session(PARTY_SESSION, args.party.clone());

    let printer = tokio::spawn(print_events(voice.subscribe_events()));
    let mut login_events = voice.subscribe_events();
    let (sessions, rx) = mpsc::channel(16);
    let bridge = tokio::spawn(PartyVoiceBridge::new(voice.clone(), directory.clone()).run(rx));

    if let Err(err) = host_party(
        &sessions,
        &mut login_events,
        LOCAL_USER,
        &args.username,
        PARTY_SESSION,
        LOGIN_TIMEOUT,
    )
    .await
    {
        warn!("voice: party voice channel not joined: {err}");
    }
    drop(login_events);

    info!("voice: running user={} party={}, press ctrl-c to leave", args.username, args.party);
    tokio::signal::ctrl_c().await?;

    sessions
        .send(SessionLifecycleEvent::DestroySessionCompleted {
            session_name: PARTY_SESSION.to_string(),
            success: true,
        })
        .await?;
    drop(sessions);
    bridge.await?;

    voice.shutdown().await?;
    service.await?;
    printer.abort();
    Ok(())
}

fn token_exchange(
    settings: &VoiceSettings,
    access_token: Option<String>,
) -> Result<Arc<dyn TokenExchange>> {
    match (&settings.token_service_url, access_token) {
        (Some(base_url), Some(access_token)) => {
            let exchange = HttpTokenExchange::new(base_url, &settings.token_path, access_token)
                .with_context(|| format!("invalid token service url {base_url}"))?;
            info!("voice: using token service endpoint={}", exchange.endpoint());
            Ok(Arc::new(exchange))
        }
        (Some(_), None) => {
            warn!("voice: token service configured but no access token given, issuing tokens locally");
            Ok(Arc::new(DevTokenExchange::from_settings(settings)))
        }
        (None, _) => Ok(Arc::new(DevTokenExchange::from_settings(settings))),
    }
}

async fn print_events(mut events: broadcast::Receiver<VoiceEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => println!("{event:?}"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("voice: event printer lagged skipped={skipped}");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
