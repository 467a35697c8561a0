use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc,
    },
    thread,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use clap::{Parser, Subcommand};
use gallop::{
    FileBasedStorage, GallopError, ProgramRun, RaceConfig, RaceDirector, RaceOutcome, RacePhase,
    RaceSession, ResumePlan, SessionLifecycle, writer,
};
use log::{error, info, warn};

/// How often the leader of a running race is logged.
const LEADER_LOG_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Args {
    /// Directory holding saved sessions
    #[arg(short, long, global = true)]
    storage: Option<PathBuf>,

    /// Multiplier applied to every delay and race duration, 0.1 runs ten times faster
    #[arg(short, long, global = true)]
    pace: Option<f64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start a new race day and run all six races
    New {
        name: String,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Resume a session, by default the most recently interrupted one
    Resume {
        id: Option<String>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List saved sessions
    List,
    /// Show the results of a session
    Show { id: String },
    /// Delete a saved session
    Delete { id: String },
    /// Print a results file written with --output
    Results { input: PathBuf },
    /// Print the configuration in use
    Config {
        /// Also save it, with any --pace and --storage overrides, as the config file
        #[arg(long)]
        save: bool,
    },
}

fn load_config(args: &Args) -> Result<RaceConfig, GallopError> {
    let mut config = RaceConfig::from_local_file()?.unwrap_or_default();
    if let Some(pace) = args.pace {
        config.pace = pace;
    }
    if let Some(storage) = &args.storage {
        config.storage_dir = Some(storage.clone());
    }
    config.validate()?;
    Ok(config)
}

fn open_lifecycle(config: &RaceConfig) -> Result<SessionLifecycle, GallopError> {
    let storage = match &config.storage_dir {
        Some(dir) => FileBasedStorage::new(dir.clone())?,
        None => FileBasedStorage::new_default()?,
    };
    info!("Sessions stored in {}", storage.storage_path().display());
    Ok(SessionLifecycle::new(Box::new(storage)))
}

fn build_director(
    config: RaceConfig,
    output: Option<&PathBuf>,
) -> Result<RaceDirector, GallopError> {
    let director = RaceDirector::new(open_lifecycle(&config)?, config);

    // if we need to write an output file the director also sends every result to the writer thread
    let Some(output_file) = output.cloned() else {
        return Ok(director);
    };
    let (results_tx, results_rx) = mpsc::channel::<RaceOutcome>();
    thread::spawn(move || {
        if let Err(e) = writer::write_results(&output_file, results_rx) {
            error!("Error while writing results: {}", e);
        }
    });
    Ok(director.with_results_feed(results_tx))
}

fn install_exit_handler(director: &RaceDirector) -> Result<(), GallopError> {
    let director = director.clone();
    let exiting = Arc::new(AtomicBool::new(false));
    ctrlc::set_handler(move || {
        if exiting.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
        println!("Exiting, saving progress...");
        if let Err(e) = director.exit_to_welcome() {
            error!("Could not save progress on exit: {}", e);
        }
    })
    .map_err(|e| GallopError::FileOperationError {
        operation: "install_ctrlc_handler".to_string(),
        reason: e.to_string(),
    })
}

fn runtime() -> Result<tokio::runtime::Runtime, GallopError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(|e| GallopError::FileOperationError {
            operation: "start_runtime".to_string(),
            reason: e.to_string(),
        })
}

/// Run every remaining race, logging the leader now and then.
async fn race_day(director: &RaceDirector) -> Result<ProgramRun, GallopError> {
    let watcher = director.clone();
    let leader_log = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(LEADER_LOG_INTERVAL);
        loop {
            ticker.tick().await;
            if watcher.phase() != RacePhase::Running {
                continue;
            }
            if let (Some(race), Some((horse, position))) = (watcher.current_race(), watcher.leader()) {
                info!(
                    "{}: {} leads at {:.0}m after {:.1}s",
                    race.title(),
                    horse.name,
                    position.distance.min(f64::from(race.distance)),
                    watcher.race_clock().as_secs_f64()
                );
            }
        }
    });

    let run = director.start_all_races().await;
    leader_log.abort();
    run
}

fn report(run: ProgramRun, session_id: &str) {
    match run {
        ProgramRun::Completed => println!("Race day complete."),
        ProgramRun::Cancelled => {
            println!("Race day interrupted, continue with: gallop resume {}", session_id)
        }
    }
}

fn new_day(config: RaceConfig, name: &str, output: Option<&PathBuf>) -> Result<(), GallopError> {
    let director = build_director(config, output)?;
    install_exit_handler(&director)?;

    let session = director.initialize_game(name)?;
    println!("Created session {} ({})", session.name(), session.id());
    for race in session.program() {
        println!("  {}", race.title());
    }

    let run = runtime()?.block_on(race_day(&director))?;
    report(run, session.id());
    Ok(())
}

fn resume(config: RaceConfig, id: Option<&str>, output: Option<&PathBuf>) -> Result<(), GallopError> {
    let director = build_director(config, output)?;
    let id = match id {
        Some(id) => id.to_string(),
        None => match director.last_interrupted_session() {
            Some(session) => session.id().to_string(),
            None => {
                println!("No interrupted session to resume.");
                return Ok(());
            }
        },
    };
    install_exit_handler(&director)?;

    let resumption = director.open_session(&id)?;
    match resumption.plan {
        ResumePlan::Finished => {
            println!("Session {} is already complete.", resumption.session.name());
            print_results(&resumption.session);
            return Ok(());
        }
        ResumePlan::Restart { index } => println!("Restarting race {}", index + 1),
        ResumePlan::Continue { .. } | ResumePlan::Fresh => println!(
            "Resuming {} after {} of {} races",
            resumption.session.name(),
            resumption.session.completed_races(),
            resumption.session.total_races()
        ),
    }

    let run = runtime()?.block_on(race_day(&director))?;
    report(run, &id);
    Ok(())
}

fn seconds_since_epoch(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

fn list(config: RaceConfig) -> Result<(), GallopError> {
    let lifecycle = open_lifecycle(&config)?;
    let mut sessions: Vec<&RaceSession> = lifecycle.all_sessions().iter().collect();
    sessions.sort_by_key(|s| std::cmp::Reverse(s.last_accessed_at()));

    if sessions.is_empty() {
        println!("No saved sessions.");
    }
    for session in sessions {
        println!(
            "{}  {:<24} {:<12} {}/{} races  last played {}",
            session.id(),
            session.name(),
            session.status(),
            session.completed_races(),
            session.total_races(),
            seconds_since_epoch(session.last_accessed_at())
        );
    }
    Ok(())
}

fn print_results(session: &RaceSession) {
    for outcome in session.results() {
        println!("{}", outcome);
    }
}

fn show(config: RaceConfig, id: &str) -> Result<(), GallopError> {
    let lifecycle = open_lifecycle(&config)?;
    let session = lifecycle
        .session(id)
        .ok_or_else(|| GallopError::SessionNotFound { id: id.to_string() })?;

    println!(
        "{} ({}) - {}, {}/{} races",
        session.name(),
        session.id(),
        session.status(),
        session.completed_races(),
        session.total_races()
    );
    print_results(session);
    Ok(())
}

fn delete(config: RaceConfig, id: &str) -> Result<(), GallopError> {
    open_lifecycle(&config)?.delete_session(id)?;
    println!("Deleted session {}", id);
    Ok(())
}

fn results(input: &PathBuf) -> Result<(), GallopError> {
    let outcomes = writer::read_results(input)?;
    if outcomes.is_empty() {
        warn!("No results in {}", input.display());
    }
    for outcome in outcomes {
        println!("{}", outcome);
    }
    Ok(())
}

fn show_config(config: &RaceConfig, save: bool) -> Result<(), GallopError> {
    let json = serde_json::to_string_pretty(config)
        .map_err(|e| GallopError::ConfigSerializeError { source: e })?;
    println!("{}", json);
    if save {
        let path = config.save()?;
        println!("Saved config to {}", path.display());
    }
    Ok(())
}

fn run(cli: Args) -> Result<(), GallopError> {
    let config = load_config(&cli)?;
    match &cli.command {
        Commands::New { name, output } => new_day(config, name, output.as_ref()),
        Commands::Resume { id, output } => resume(config, id.as_deref(), output.as_ref()),
        Commands::List => list(config),
        Commands::Show { id } => show(config, id),
        Commands::Delete { id } => delete(config, id),
        Commands::Results { input } => results(input),
        Commands::Config { save } => show_config(&config, *save),
    }
}

fn main() {
    colog::init();

    let cli = Args::parse();
    if let Err(e) = run(cli) {
        error!("{}", e);
        std::process::exit(1);
    }
}
