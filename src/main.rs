use nowplaying_sync::config::Settings;
use nowplaying_sync::display::{
    ChainedDiscovery, DisplayClient, DisplayCommand, DisplayOptions, EndpointDiscovery, NoDiscovery, PortFileDiscovery, PortScanDiscovery,
};
use nowplaying_sync::player::{HeadlessCapability, Player, PlayerCommand, PlayerOptions};
use nowplaying_sync::resolve::resolve_video_id;
use nowplaying_sync::storage::{JsonFileStore, KeyValueStore, MemoryStore};
use nowplaying_sync::sync::bridge::{
    bind_listener, remove_port_file, run_local_server, run_websocket_server, write_port_file,
};
use nowplaying_sync::sync::{into_player_command, ControllerLink};
use nowplaying_sync::transport::{Endpoint, LocalHub, WsConnector};
use nowplaying_sync::ui::{
    Cli, ConsoleCommand, ConsoleInput, ConsoleView, ControlPanel, ControllerArgs, DisplayArgs, Role, HELP_TEXT,
};
use nowplaying_sync::{init_app_dirs, init_tracing};
use std::error::Error;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{info, warn};

const MAIN_LOG_TARGET: &str = "nowplaying_sync::main";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Parse command-line arguments and initialize CLI
    let cli = Cli::new();
    let args = &cli.args;

    // Load configuration from file, then apply flag overrides
    let config_path = args.config_path();
    let mut settings = Settings::load(&config_path)?;
    args.apply_to(&mut settings);
    settings.validate()?;

    init_app_dirs(&settings)?;
    if let Err(e) = init_tracing(&settings.log_level, settings.log_json) {
        eprintln!("Failed to initialize logging: {}", e);
    }
    info!(target: MAIN_LOG_TARGET, config = %config_path.display(), "Settings loaded.");

    match &args.role {
        Role::Controller(controller_args) => run_controller(settings, controller_args.clone()).await,
        Role::Display(display_args) => run_display(settings, display_args.clone()).await,
    }
}

fn display_options(settings: &Settings, endpoint: Endpoint) -> DisplayOptions {
    let mut options = DisplayOptions::new(endpoint);
    options.heartbeat = settings.heartbeat_interval();
    options.snapshot_retry = settings.snapshot_retry();
    options.backoff = settings.backoff_policy();
    options
}

/// Adds a video through the player and reports rejected input inline.
async fn add_video(command_tx: &mpsc::Sender<PlayerCommand>, url: String) -> Result<Option<usize>, Box<dyn Error>> {
    let (reply_tx, reply_rx) = oneshot::channel();
    command_tx
        .send(PlayerCommand::AddVideo {
            url,
            reply: Some(reply_tx),
        })
        .await?;
    match reply_rx.await? {
        Ok(index) => Ok(Some(index)),
        Err(e) => {
            println!("Could not add video: {}", e);
            Ok(None)
        }
    }
}

async fn run_controller(settings: Settings, args: ControllerArgs) -> Result<(), Box<dyn Error>> {
    // --- Player ---
    let store: Arc<dyn KeyValueStore> = Arc::new(JsonFileStore::new(&settings.state_path));
    let (capability, capability_rx) = HeadlessCapability::new();
    let capability = Arc::new(capability);
    let options = PlayerOptions {
        metadata_poll_interval: settings.metadata_poll_interval(),
        ..PlayerOptions::default()
    };
    let (mut player, command_tx) = Player::new(capability, capability_rx, store, options);
    let link = ControllerLink::new(command_tx.clone(), player.state_update_sender());
    let player_handle = tokio::spawn(async move {
        player.run().await;
    });

    // --- Startup parameters ---
    if let Some(video) = args.video.clone() {
        // Adding to an empty playlist starts it; otherwise jump to the new entry.
        if let Some(index) = add_video(&command_tx, video).await? {
            if index > 0 {
                command_tx.send(PlayerCommand::Load { index }).await?;
            }
        }
    } else if args.autostart {
        command_tx.send(PlayerCommand::Play).await?;
    }

    // --- Servers ---
    let (listener, port) = match bind_listener(&settings.host, settings.port, settings.auto_port).await {
        Ok(bound) => bound,
        Err(e) => {
            command_tx.send(PlayerCommand::Shutdown).await?;
            return Err(format!(
                "Could not listen on {}:{}: {}. Use --auto-port or pick another --port.",
                settings.host, settings.port, e
            )
            .into());
        }
    };
    if let Err(e) = write_port_file(&settings.port_file, port) {
        warn!(target: MAIN_LOG_TARGET, "Failed to write port file {}: {}", settings.port_file.display(), e);
    }
    let (shutdown_tx, _) = broadcast::channel(1);
    let server_handle = tokio::spawn(run_websocket_server(listener, link.clone(), shutdown_tx.subscribe()));

    let panel = ControlPanel::new(args.autostart);
    let local_display = if args.local_display {
        let (connector, acceptor) = LocalHub::open();
        tokio::spawn(run_local_server(acceptor, link.clone()));
        let (mut client, display_tx) = DisplayClient::new(
            Arc::new(connector),
            Box::new(NoDiscovery),
            Arc::new(MemoryStore::new()),
            Box::new(ConsoleView::new(panel.clone())),
            display_options(&settings, Endpoint::new("local", port)),
        );
        let handle = tokio::spawn(async move {
            client.run().await;
        });
        Some((display_tx, handle))
    } else {
        None
    };

    println!("Controller listening on ws://{}:{}", settings.host, port);
    if panel.is_visible() {
        println!("{}", HELP_TEXT);
    }

    // --- Console loop ---
    let mut input = ConsoleInput::stdin();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!(target: MAIN_LOG_TARGET, "Interrupted, shutting down.");
                break;
            }
            command = input.next_command() => match command {
                None => {
                    // No console attached; keep serving until interrupted.
                    let _ = tokio::signal::ctrl_c().await;
                    break;
                }
                Some(Err(e)) => println!("{}", e),
                Some(Ok(ConsoleCommand::Quit)) => break,
                Some(Ok(ConsoleCommand::Help)) => println!("{}", HELP_TEXT),
                Some(Ok(ConsoleCommand::TogglePanel)) => {
                    let visible = panel.toggle();
                    println!("Control panel {}", if visible { "shown" } else { "hidden" });
                }
                Some(Ok(ConsoleCommand::Reconnect)) => match &local_display {
                    Some((display_tx, _)) => {
                        let _ = display_tx.send(DisplayCommand::Reconnect).await;
                    }
                    None => println!("No local display attached."),
                },
                Some(Ok(ConsoleCommand::Stop)) => command_tx.send(PlayerCommand::Stop).await?,
                Some(Ok(ConsoleCommand::Add(url))) => {
                    if let Some(index) = add_video(&command_tx, url).await? {
                        println!("Added at position {}", index + 1);
                    }
                }
                Some(Ok(other)) => match other.to_message().and_then(into_player_command) {
                    Some(player_command) => command_tx.send(player_command).await?,
                    None => println!("Nothing to do for {:?}", other),
                },
            }
        }
    }

    // --- Shutdown ---
    if let Some((display_tx, handle)) = local_display {
        let _ = display_tx.send(DisplayCommand::Shutdown).await;
        let _ = handle.await;
    }
    let _ = shutdown_tx.send(());
    let _ = command_tx.send(PlayerCommand::Shutdown).await;
    if let Err(e) = player_handle.await {
        warn!(target: MAIN_LOG_TARGET, "Player task failed: {}", e);
    }
    let _ = server_handle.await;
    remove_port_file(&settings.port_file);
    Ok(())
}

async fn run_display(settings: Settings, args: DisplayArgs) -> Result<(), Box<dyn Error>> {
    let endpoint = Endpoint::new(settings.host.clone(), settings.port);
    let strategies: Vec<Box<dyn EndpointDiscovery>> = vec![
        Box::new(PortFileDiscovery::new(&settings.port_file)),
        Box::new(PortScanDiscovery::auto_port_range(settings.port)),
    ];
    let discovery = ChainedDiscovery::new(strategies);
    let store: Arc<dyn KeyValueStore> = Arc::new(JsonFileStore::new(&settings.display_state_path));
    let panel = ControlPanel::new(args.autostart);

    let (mut client, display_tx) = DisplayClient::new(
        Arc::new(WsConnector),
        Box::new(discovery),
        store,
        Box::new(ConsoleView::new(panel.clone())),
        display_options(&settings, endpoint.clone()),
    );
    let client_handle = tokio::spawn(async move {
        client.run().await;
    });

    println!("Display connecting to ws://{}", endpoint);
    if panel.is_visible() {
        println!("{}", HELP_TEXT);
    }

    let mut input = ConsoleInput::stdin();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            command = input.next_command() => match command {
                None => {
                    let _ = tokio::signal::ctrl_c().await;
                    break;
                }
                Some(Err(e)) => println!("{}", e),
                Some(Ok(ConsoleCommand::Quit)) => break,
                Some(Ok(ConsoleCommand::Help)) => println!("{}", HELP_TEXT),
                Some(Ok(ConsoleCommand::TogglePanel)) => {
                    let visible = panel.toggle();
                    println!("Control panel {}", if visible { "shown" } else { "hidden" });
                }
                Some(Ok(ConsoleCommand::Reconnect)) => {
                    let _ = display_tx.send(DisplayCommand::Reconnect).await;
                }
                Some(Ok(ConsoleCommand::Stop)) => println!("Stop is only available on the controller."),
                Some(Ok(command)) => {
                    // The controller drops unresolvable URLs silently; catch them here.
                    if let ConsoleCommand::Add(url) = &command {
                        if let Err(e) = resolve_video_id(url) {
                            println!("Could not add video: {}", e);
                            continue;
                        }
                    }
                    if let Some(message) = command.to_message() {
                        if display_tx.send(DisplayCommand::Send(message)).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }

    let _ = display_tx.send(DisplayCommand::Shutdown).await;
    let _ = client_handle.await;
    Ok(())
}
