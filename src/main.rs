/// Debug entry point for the habit data layer
///
/// Opens (or creates) the local database and prints its state: habits,
/// streak counters, the pending-operation backlog, and the sync watermark.
/// The real remote store lives in the embedding application, so this binary
/// only exercises the local side.

use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use habit_sync::store::{LocalStore, SqliteStore};

/// Get the default database path with robust fallback strategy
fn get_default_database_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
    // Try various locations in order of preference
    let potential_paths = [
        dirs::home_dir().map(|mut p| {
            p.push(".habit_sync");
            p
        }),
        dirs::data_dir().map(|mut p| {
            p.push("habit_sync");
            p
        }),
        dirs::config_dir().map(|mut p| {
            p.push("habit_sync");
            p
        }),
        std::env::current_dir().ok().map(|mut p| {
            p.push(".habit_sync");
            p
        }),
    ];

    for potential_path in potential_paths.iter().flatten() {
        if let Ok(()) = std::fs::create_dir_all(potential_path) {
            // Only settle on a directory we can actually write to
            let test_file = potential_path.join(".test_write");
            if std::fs::write(&test_file, "test").is_ok() {
                let _ = std::fs::remove_file(&test_file);
                let mut db_path = potential_path.clone();
                db_path.push("habits.db");
                return Ok(db_path);
            }
        }
    }

    // Ultimate fallback: use a temporary directory
    let mut temp_path = std::env::temp_dir();
    temp_path.push("habit_sync");
    std::fs::create_dir_all(&temp_path)?;
    temp_path.push("habits.db");

    tracing::warn!("Using temporary directory for database: {}", temp_path.display());
    Ok(temp_path)
}

/// Command line arguments for the habit data inspector
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the SQLite database file
    /// If not provided, uses a default location in the user's home directory
    #[arg(long)]
    database: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable verbose output (implies debug)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let log_level = if args.verbose {
        "debug"
    } else if args.debug {
        "info"
    } else {
        "warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(format!("habit_sync={}", log_level))
        .with_writer(std::io::stderr)
        .init();

    let db_path = match args.database {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.exists() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            path
        }
        None => get_default_database_path()?,
    };

    info!("Using database at: {}", db_path.display());
    let store = SqliteStore::new(db_path)?;

    let habits = store.list_habits()?;
    println!("{} habit(s):", habits.len());
    for habit in &habits {
        println!(
            "  {}  {}  active={}  starts {}",
            habit.id, habit.name, habit.is_active, habit.start_date
        );
    }

    let streak = store.streak_state()?;
    println!(
        "streak: current={} max={} achievements={:?}",
        streak.current_streak, streak.max_streak, streak.achievements
    );

    let pending = store.list_pending()?;
    println!("{} pending operation(s)", pending.len());
    for op in &pending {
        println!(
            "  {}  retries={}  last_attempt={:?}",
            op.id, op.retry_count, op.last_attempt_at
        );
    }

    match store.last_sync_time()? {
        Some(at) => println!("last sync: {}", at),
        None => println!("last sync: never"),
    }

    Ok(())
}
