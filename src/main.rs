//! DragonBot - command line controller
//!
//! Main entry point for the application.

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use dragonbot::ble::{
    BtleplugRadio, CommandLink, Communicator, ConnectionState, DeviceId, RadioEvent, RequestQueue,
};
use dragonbot::drills::{DrillSequencer, DrillTick, LoopMode};
use dragonbot::protocol::{Command, SwapChannel, SwapConfig};
use dragonbot::storage::config::{self, AppConfig, BleSettings};
use dragonbot::storage::{ShotConfig, ShotStore};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// How long to wait for connection and discovery to finish.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Parser)]
#[command(name = "dragonbot", version, about = "Control a DragonBot tennis-ball launcher")]
struct Args {
    /// Configuration file (defaults to the platform data directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// List nearby devices
    Scan,
    /// Fire one saved shot
    Shoot {
        shot: u32,
        #[arg(long)]
        device: Option<String>,
    },
    /// Run the saved shots as a drill
    Drill {
        #[arg(long)]
        device: Option<String>,
        /// Seconds between shots (1-10)
        #[arg(long)]
        interval: Option<u32>,
        /// Passes over the shot list (1-99)
        #[arg(long, conflicts_with = "infinite")]
        loops: Option<u32>,
        /// Repeat until interrupted
        #[arg(long)]
        infinite: bool,
    },
    /// Arm and fire a two-channel swap
    Swap {
        speed_1: f64,
        delay_1: f64,
        speed_2: f64,
        delay_2: f64,
        #[arg(long)]
        device: Option<String>,
    },
    /// Send a raw protocol token such as "[Z]"
    Send {
        token: String,
        #[arg(long)]
        device: Option<String>,
    },
    /// Manage saved shots
    Shots {
        #[command(subcommand)]
        action: ShotsCmd,
    },
}

#[derive(Subcommand)]
enum ShotsCmd {
    /// List saved shots
    List,
    /// Save a new shot
    Add(ShotArgs),
    /// Delete a saved shot
    Delete { shot: u32 },
}

#[derive(clap::Args)]
struct ShotArgs {
    /// First wheel speed (0-255)
    #[arg(long)]
    speed_a: Option<f64>,
    /// Second wheel speed (0-255)
    #[arg(long)]
    speed_b: Option<f64>,
    /// Combined speed used by drills (0-255)
    #[arg(long)]
    speed: Option<f64>,
    /// Delay in milliseconds (0-2000)
    #[arg(long)]
    delay: Option<f64>,
    /// Horizontal target (0-255)
    #[arg(long)]
    x: Option<f64>,
    /// Vertical target (0-255)
    #[arg(long)]
    y: Option<f64>,
    #[arg(long)]
    carriage_x: Option<f64>,
    #[arg(long)]
    carriage_y: Option<f64>,
    /// Rotation (0-255, 127.5 is centred)
    #[arg(long)]
    rotation: Option<f64>,
}

impl ShotArgs {
    fn apply(&self, shot: &mut ShotConfig) {
        let fields = [
            (self.speed_a, &mut shot.speed_a),
            (self.speed_b, &mut shot.speed_b),
            (self.speed, &mut shot.speed_ab),
            (self.delay, &mut shot.delay_e),
            (self.x, &mut shot.target_d),
            (self.y, &mut shot.target_c),
            (self.carriage_x, &mut shot.target_f),
            (self.carriage_y, &mut shot.target_g),
            (self.rotation, &mut shot.target_h),
        ];
        for (value, field) in fields {
            if let Some(value) = value {
                *field = value;
            }
        }
    }
}

/// Owns the communicator and drains radio events into it.
struct Session {
    communicator: Communicator<RequestQueue>,
    events: UnboundedReceiver<RadioEvent>,
}

impl Session {
    async fn open() -> anyhow::Result<Self> {
        let (tx, events) = mpsc::unbounded_channel();
        let radio = BtleplugRadio::initialize(tx).await?;
        Ok(Self {
            communicator: Communicator::new(radio),
            events,
        })
    }

    /// Dispatch radio events until `done` holds or `timeout` elapses.
    async fn pump_until<F>(&mut self, timeout: Duration, mut done: F) -> bool
    where
        F: FnMut(&Communicator<RequestQueue>) -> bool,
    {
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            if done(&self.communicator) {
                return true;
            }
            tokio::select! {
                _ = &mut deadline => return false,
                event = self.events.recv() => match event {
                    Some(event) => event.dispatch(&mut self.communicator),
                    None => return false,
                },
            }
        }
    }

    async fn scan(&mut self, settings: &BleSettings) {
        self.communicator.request_scan();
        let timeout = Duration::from_secs(settings.scan_timeout_secs as u64);
        self.pump_until(timeout, |_| false).await;
        self.communicator.stop_scan();
    }

    /// Scan for the requested device, or the first one matching the name
    /// filter, and connect to it.
    async fn connect(&mut self, device: Option<&str>, settings: &BleSettings) -> anyhow::Result<()> {
        let wanted = device.map(DeviceId::new);
        let filter = settings.device_name_filter.as_str();

        self.communicator.request_scan();
        let timeout = Duration::from_secs(settings.scan_timeout_secs as u64);
        self.pump_until(timeout, |c| match &wanted {
            Some(id) => c.registry().get(id).is_some(),
            None => c.registry().find_by_name(filter).is_some(),
        })
        .await;

        let target = match &wanted {
            Some(id) => self.communicator.registry().get(id).map(|d| d.id.clone()),
            None => self
                .communicator
                .registry()
                .find_by_name(filter)
                .map(|d| d.id.clone()),
        };
        let Some(target) = target else {
            self.communicator.stop_scan();
            bail!("No device found matching {:?}", device.unwrap_or(filter));
        };

        self.communicator.connect(&target)?;
        self.pump_until(CONNECT_TIMEOUT, |c| {
            c.is_ready() || c.state() == ConnectionState::Disconnected
        })
        .await;

        if !self.communicator.is_ready() {
            self.communicator.disconnect();
            bail!("Could not connect to {}", target);
        }
        Ok(())
    }

    /// Disconnect after every queued write has gone out.
    async fn close(mut self) {
        self.communicator.disconnect();
        self.communicator.radio().flush().await;
    }
}

async fn run_drill(
    session: &mut Session,
    sequencer: &mut DrillSequencer,
    store: &ShotStore,
) -> anyhow::Result<()> {
    sequencer.start(&store.sorted(), &mut session.communicator)?;

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if sequencer.tick(&mut session.communicator) == DrillTick::Finished {
                    break;
                }
                let status = sequencer.status();
                tracing::debug!(
                    "Next shot {:?} in {}s, {} passes done",
                    status.next_shot,
                    status.countdown,
                    status.loops_completed
                );
            }
            event = session.events.recv() => match event {
                Some(event) => event.dispatch(&mut session.communicator),
                None => bail!("Radio event channel closed"),
            },
            _ = &mut ctrl_c => {
                tracing::info!("Interrupted");
                sequencer.stop(&mut session.communicator);
                break;
            }
        }

        if !session.communicator.is_ready() {
            tracing::warn!("Connection lost during drill");
            sequencer.stop(&mut session.communicator);
            break;
        }
    }

    Ok(())
}

fn print_shots(store: &ShotStore) {
    if store.is_empty() {
        println!("No saved shots");
        return;
    }
    for shot in store.sorted() {
        println!(
            "#{:<3} A {:>5.1}  B {:>5.1}  AB {:>5.1}  delay {:>6.0}ms  {}",
            shot.shot_number,
            shot.speed_a,
            shot.speed_b,
            shot.speed_ab,
            shot.delay_e,
            shot.to_command()
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let app_config: AppConfig = match &args.config {
        Some(path) => config::load_config_from(path),
        None => config::load_config(),
    }
    .context("Failed to load configuration")?;

    tracing::info!("Starting DragonBot v{}", env!("CARGO_PKG_VERSION"));

    let mut store = ShotStore::open(app_config.shots_path());

    match args.command {
        Cmd::Scan => {
            let mut session = Session::open().await?;
            session.scan(&app_config.ble).await;
            for device in session.communicator.devices() {
                println!("{:>5} dBm  {}  {}", device.rssi, device.id, device.display_name());
            }
        }
        Cmd::Shoot { shot, device } => {
            let command = store
                .get(shot)
                .map(ShotConfig::to_command)
                .ok_or_else(|| anyhow!("Shot {} not found", shot))?;

            let mut session = Session::open().await?;
            session.connect(device.as_deref(), &app_config.ble).await?;
            session.communicator.send(&command);
            session.close().await;
        }
        Cmd::Drill {
            device,
            interval,
            loops,
            infinite,
        } => {
            let mut sequencer = DrillSequencer::from_settings(&app_config.drill);
            if let Some(interval) = interval {
                sequencer.set_interval(interval);
            }
            if infinite {
                sequencer.set_loop_mode(LoopMode::Infinite);
            } else if let Some(loops) = loops {
                sequencer.set_loop_mode(LoopMode::finite(loops));
            }

            let mut session = Session::open().await?;
            session.connect(device.as_deref(), &app_config.ble).await?;
            let result = run_drill(&mut session, &mut sequencer, &store).await;
            session.close().await;
            result?;
        }
        Cmd::Swap {
            speed_1,
            delay_1,
            speed_2,
            delay_2,
            device,
        } => {
            let swap = SwapConfig {
                first: SwapChannel {
                    speed: speed_1,
                    delay: delay_1,
                },
                second: SwapChannel {
                    speed: speed_2,
                    delay: delay_2,
                },
            };

            let mut session = Session::open().await?;
            session.connect(device.as_deref(), &app_config.ble).await?;
            for command in swap.commands() {
                session.communicator.send(&command);
            }
            session.close().await;
        }
        Cmd::Send { token, device } => {
            let command: Command = token.parse()?;

            let mut session = Session::open().await?;
            session.connect(device.as_deref(), &app_config.ble).await?;
            session.communicator.send(&command);
            session.close().await;
        }
        Cmd::Shots { action } => match action {
            ShotsCmd::List => print_shots(&store),
            ShotsCmd::Add(shot_args) => {
                let mut shot = ShotConfig::new(0);
                shot_args.apply(&mut shot);
                let number = store.add(shot)?;
                println!("Saved shot #{}", number);
            }
            ShotsCmd::Delete { shot } => {
                store.delete(shot)?;
                println!("Deleted shot #{}", shot);
            }
        },
    }

    Ok(())
}
