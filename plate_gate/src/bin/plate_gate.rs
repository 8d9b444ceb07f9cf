use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use clap::Subcommand;
use crossbeam::channel;
use crossbeam::channel::Receiver;
use plate_gate::devices::OpenCvDevices;
use plate_gate::plate_detection::TesseractReader;
use plate_gate::settings::ScanArgs;
use plate_gate::settings::Settings;
use plate_gate::metrics;
use plate_gate::shared_recognizer;
use plate_gate::status_channel;
use plate_gate::FileRegistry;
use plate_gate::Gate;
use plate_gate::Outcome;
use plate_gate::PlateEntry;
use plate_gate::PlateRegistry;
use plate_gate::ScanContext;
use plate_gate::SessionExit;
use plate_gate::SessionHandle;
use plate_gate::StartOutcome;
use tracing::info;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "plate_gate",
    about = "Grant or deny access by reading license plates from a camera",
    disable_help_subcommand = true
)]
struct Cli {
    /// Override the configuration file path
    #[arg(long = "config", global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. "plate_gate=debug" (defaults to RUST_LOG)
    #[arg(long = "log-filter", global = true)]
    log_filter: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the camera and check plates against the registry
    Scan {
        #[command(flatten)]
        args: ScanArgs,

        /// Print collected metrics on exit
        #[arg(long = "print-metrics")]
        print_metrics: bool,
    },
    /// Manage authorized plates
    #[command(subcommand)]
    Plates(PlatesCommand),
}

#[derive(Debug, Subcommand)]
enum PlatesCommand {
    /// List every registered plate
    List,
    /// Register a plate
    Add {
        plate: String,
        #[arg(long, default_value = "")]
        owner: String,
        #[arg(long, default_value = "")]
        vehicle: String,
        #[arg(long, default_value = "")]
        note: String,
    },
    /// Replace the record with the given id
    Update {
        id: u64,
        plate: String,
        #[arg(long, default_value = "")]
        owner: String,
        #[arg(long, default_value = "")]
        vehicle: String,
        #[arg(long, default_value = "")]
        note: String,
    },
    /// Remove the record with the given id
    Delete { id: u64 },
}

fn init_logging(filter: Option<&str>) {
    let filter = match filter {
        Some(filter) => EnvFilter::new(filter),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("plate_gate=info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_filter.as_deref());

    match cli.command {
        Command::Scan {
            args,
            print_metrics,
        } => {
            let settings = Settings::resolve(cli.config.as_deref(), &args)?;
            run_scan(&settings)?;
            if print_metrics {
                print!("{}", metrics::render());
            }
            Ok(())
        }
        Command::Plates(command) => {
            let settings = Settings::from_file(cli.config.as_deref())?;
            run_plates(&settings, command)
        }
    }
}

fn run_plates(settings: &Settings, command: PlatesCommand) -> anyhow::Result<()> {
    let registry = FileRegistry::open(&settings.registry)?;
    match command {
        PlatesCommand::List => {
            println!("{:>4}  {:<10}  {:<20}  {:<16}  NOTE", "ID", "PLATE", "OWNER", "VEHICLE");
            for record in registry.list_all()? {
                println!(
                    "{:>4}  {:<10}  {:<20}  {:<16}  {}",
                    record.id, record.plate, record.owner, record.vehicle, record.note
                );
            }
        }
        PlatesCommand::Add {
            plate,
            owner,
            vehicle,
            note,
        } => {
            let id = registry.insert(PlateEntry {
                plate,
                owner,
                vehicle,
                note,
            })?;
            println!("Plate registered with id {id}.");
        }
        PlatesCommand::Update {
            id,
            plate,
            owner,
            vehicle,
            note,
        } => {
            registry.update(
                id,
                PlateEntry {
                    plate,
                    owner,
                    vehicle,
                    note,
                },
            )?;
            println!("Plate {id} updated.");
        }
        PlatesCommand::Delete { id } => {
            registry.delete(id)?;
            println!("Plate {id} deleted.");
        }
    }
    Ok(())
}

fn run_scan(settings: &Settings) -> anyhow::Result<()> {
    let recognizer = TesseractReader::new(settings.tessdata.as_deref(), &settings.language)
        .context("text recognition is unavailable")?;
    let registry = Arc::new(FileRegistry::open(&settings.registry)?);
    let (publisher, mut status) = status_channel();
    let ctx = ScanContext::new(shared_recognizer(recognizer), registry, publisher)
        .with_geometry(settings.geometry)
        .with_params(settings.preprocess)
        .with_debounce(settings.debounce);
    let gate = Gate::new(ctx, Arc::new(OpenCvDevices::from_settings(settings)));
    let events = gate.events();

    println!("{}", status.latest());
    println!("Commands: start, stop, status, quit");

    let mut session = None;
    start(&gate, &mut session);

    let mut commands = spawn_stdin_reader();
    let ticker = channel::tick(Duration::from_millis(100));
    let mut stdin_open = true;
    loop {
        let mut stdin_closed = false;
        let mut quit = false;
        crossbeam::select! {
            recv(commands) -> line => match line {
                Ok(line) => match line.trim() {
                    "start" => start(&gate, &mut session),
                    "stop" => gate.stop(),
                    "status" => println!("{} [{:?}]", status.latest(), gate.state()),
                    "quit" | "q" => quit = true,
                    "" => {}
                    other => println!("Unknown command '{other}'. Use start, stop, status or quit."),
                },
                Err(_) => stdin_closed = true,
            },
            recv(events) -> event => {
                if let Ok(event) = event {
                    let verdict = match event.outcome {
                        Outcome::Granted => "granted",
                        Outcome::Denied => "denied",
                    };
                    info!(plate = %event.identifier, verdict, "Access decision");
                }
            },
            recv(ticker) -> _ => {
                if let Some(current) = status.poll() {
                    println!("{current}");
                }
                if !stdin_open && !gate.is_running() {
                    quit = true;
                }
            },
        }

        if stdin_closed {
            stdin_open = false;
            commands = channel::never();
        }
        if quit {
            break;
        }
    }

    gate.stop();
    if let Some(handle) = session {
        report_exit(handle.join());
    }
    if let Some(current) = status.poll() {
        println!("{current}");
    }
    Ok(())
}

fn start(gate: &Gate, session: &mut Option<SessionHandle>) {
    match gate.start() {
        StartOutcome::Started(handle) => *session = Some(handle),
        StartOutcome::AlreadyRunning => println!("The camera is already on."),
        StartOutcome::SpawnFailed(err) => warn!(%err, "Scanner did not start"),
    }
}

fn report_exit(exit: SessionExit) {
    match exit {
        SessionExit::Stopped | SessionExit::Quit => info!("Session ended"),
        SessionExit::Failed(err) => warn!(%err, "Session ended with an error"),
        SessionExit::Panicked => warn!("Scanner thread panicked"),
    }
}

fn spawn_stdin_reader() -> Receiver<String> {
    let (sender, receiver) = channel::unbounded();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if sender.send(line).is_err() {
                break;
            }
        }
    });
    receiver
}
