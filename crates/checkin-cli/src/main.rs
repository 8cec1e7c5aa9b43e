use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use checkin_core::{Capture, Descriptor, DetectedFace};
use checkin_service::{CheckInService, Config, Location, SqliteStore};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "checkin", about = "Biometric attendance check-in CLI")]
struct Cli {
    /// Override the database path from configuration
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a user from a JSON file holding an array of descriptors
    Enroll {
        #[arg(short, long)]
        user: String,
        /// JSON array of descriptor arrays, one per pose
        samples: PathBuf,
    },
    /// Verify a descriptor against a user's enrolled templates
    Verify {
        #[arg(short, long)]
        user: String,
        /// JSON array of descriptor values
        descriptor: PathBuf,
    },
    /// Run a check-in from detector output
    ///
    /// Guard state lives in the running service, so each invocation starts
    /// with a clean rate-limit and burst history. Use the daemon's CheckIn
    /// method when attempts must be throttled across calls.
    CheckIn {
        #[arg(short, long)]
        user: String,
        /// JSON array of detected faces
        faces: PathBuf,
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
        #[arg(long, default_value_t = 0.0)]
        accuracy: f64,
    },
    /// Show a user's stored template set
    Templates {
        #[arg(short, long)]
        user: String,
    },
    /// Remove a user's enrollment
    Remove {
        #[arg(short, long)]
        user: String,
    },
    /// List a user's attendance records
    History {
        #[arg(short, long)]
        user: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    let store = SqliteStore::open(&config.db_path)
        .with_context(|| format!("opening {}", config.db_path.display()))?;
    let service = CheckInService::new(&config, store);

    match cli.command {
        Commands::Enroll { user, samples } => {
            let samples: Vec<Vec<f32>> = read_json(&samples)?;
            println!("Enrolling {} sample(s) for {user}", samples.len());
            for sample in samples {
                let outcome = service.enroll(&user, &Descriptor::new(sample))?;
                println!("{}", serde_json::to_string(&outcome)?);
            }
        }
        Commands::Verify { user, descriptor } => {
            let values: Vec<f32> = read_json(&descriptor)?;
            let outcome = service.verify(&user, &Descriptor::new(values))?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Commands::CheckIn {
            user,
            faces,
            lat,
            lng,
            accuracy,
        } => {
            let detections: Vec<DetectedFace> = read_json(&faces)?;
            let capture = Capture::from_detections(detections);
            let outcome = service.check_in(&user, &capture, Location { lat, lng, accuracy })?;
            match outcome.reason {
                Some(reason) => println!("Rejected: {} ({})", reason.message(), reason),
                None => println!(
                    "Attendance recorded (similarity {:.1}%)",
                    outcome.similarity * 100.0
                ),
            }
            if let Some(previous) = outcome.previous_at {
                println!("Note: attendance was already recorded at {}", previous.to_rfc3339());
            }
        }
        Commands::Templates { user } => match service.template_count(&user)? {
            Some(count) => {
                let enrolled_at = service
                    .store()
                    .enrolled_at(&user)?
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default();
                println!("{user}: {count} template(s), enrolled {enrolled_at}");
            }
            None => println!("{user}: not enrolled"),
        },
        Commands::Remove { user } => {
            if service.remove_enrollment(&user)? {
                println!("Removed enrollment for {user}");
            } else {
                println!("No enrollment for {user}");
            }
        }
        Commands::History { user } => {
            let records = service.attendance_history(&user)?;
            if records.is_empty() {
                println!("No attendance records for {user}");
            }
            for r in records {
                println!(
                    "{}  {:.5},{:.5} (±{:.0}m)  similarity {:.1}%",
                    r.timestamp.to_rfc3339(),
                    r.location.lat,
                    r.location.lng,
                    r.location.accuracy,
                    r.similarity * 100.0
                );
            }
        }
    }

    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}
