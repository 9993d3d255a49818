use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Parser, Subcommand};
use image::RgbImage;
use rollcall_core::{DistanceMatcher, FaceEncoder, Matcher, OnnxFaceEncoder};
use rollcall_server::Config;
use rollcall_store::{AttendanceRecord, Role, Store, TemplateCipher};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall attendance administration CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store the face in an image as a user's template
    Enroll {
        #[arg(long)]
        reg_id: String,
        /// Image file containing the user's face
        #[arg(long)]
        image: PathBuf,
    },
    /// Compare the face in an image with a user's template
    Verify {
        #[arg(long)]
        reg_id: String,
        #[arg(long)]
        image: PathBuf,
    },
    /// Name every face in an image
    Identify {
        #[arg(long)]
        image: PathBuf,
    },
    /// List accounts
    Users {
        /// Only this role (student or faculty)
        #[arg(long)]
        role: Option<Role>,
    },
    /// Delete an account with its face template and sessions
    Remove {
        #[arg(long)]
        reg_id: String,
    },
    /// Attendance marks, newest first
    #[command(group(ArgGroup::new("who").required(true).args(["faculty", "student"])))]
    Attendance {
        /// Marks collected by this faculty member
        #[arg(long)]
        faculty: Option<String>,
        /// Marks of this student
        #[arg(long)]
        student: Option<String>,
    },
    /// Show configuration, model files and database counts
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Enroll { reg_id, image } => {
            let store = open_store(&config).await?;
            let frame = load_image(&image)?;
            let capture = load_encoder(&config)?
                .encode(&frame)?
                .with_context(|| format!("no face detected in {}", image.display()))?;

            store.put_face_encoding(&reg_id, &capture.embedding).await?;
            println!(
                "Enrolled {reg_id} (confidence {:.2}, model {})",
                capture.face.confidence,
                capture.embedding.model_version.as_deref().unwrap_or("unknown")
            );
        }
        Commands::Verify { reg_id, image } => {
            let store = open_store(&config).await?;
            let Some(stored) = store.get_face_encoding(&reg_id).await? else {
                bail!("no face template stored for {reg_id}");
            };
            let frame = load_image(&image)?;
            let Some(probe) = load_encoder(&config)?.encode(&frame)? else {
                bail!("no face detected in {}", image.display());
            };

            let matched = DistanceMatcher.verify(&probe.embedding, &stored, config.verify_tolerance);
            match probe.embedding.euclidean_distance(&stored) {
                Some(d) => println!("distance {d:.4} (tolerance {:.2})", config.verify_tolerance),
                None => println!("template dimension mismatch"),
            }
            println!("{}", if matched { "MATCH" } else { "NO MATCH" });
            if !matched {
                std::process::exit(1);
            }
        }
        Commands::Identify { image } => {
            let store = open_store(&config).await?;
            let gallery = store.load_templates().await?;
            let frame = load_image(&image)?;
            let captures = load_encoder(&config)?.encode_all(&frame)?;
            if captures.is_empty() {
                println!("No faces found");
            }

            for (i, capture) in captures.iter().enumerate() {
                let result = DistanceMatcher.compare(&capture.embedding, &gallery, config.identify_threshold);
                let distance = result
                    .distance
                    .map_or_else(|| "-".to_string(), |d| format!("{d:.4}"));
                let who = match result.index.and_then(|idx| gallery.get(idx)).filter(|_| result.matched) {
                    Some(t) => format!("{} ({}, {})", t.reg_id, t.name, t.role),
                    None => "Unknown".to_string(),
                };
                let b = &capture.face;
                println!(
                    "face {i}: {who}  distance {distance}  box [{:.0},{:.0} {:.0}x{:.0}]",
                    b.x, b.y, b.width, b.height
                );
            }
        }
        Commands::Users { role } => {
            let store = open_store(&config).await?;
            let users = store.list_users(role).await?;
            if users.is_empty() {
                println!("No users");
            }
            for u in users {
                println!("{:<12} {:<8} {:<24} {}", u.reg_id, u.role.as_str(), u.name, u.email);
            }
        }
        Commands::Remove { reg_id } => {
            let store = open_store(&config).await?;
            if !store.delete_user(&reg_id).await? {
                bail!("no user with reg id {reg_id}");
            }
            println!("Removed {reg_id}");
        }
        Commands::Attendance { faculty, student } => {
            let store = open_store(&config).await?;
            let records = match (faculty, student) {
                (Some(f), _) => store.attendance_for_faculty(&f).await?,
                (None, Some(s)) => store.attendance_for_student(&s).await?,
                (None, None) => bail!("pass --faculty or --student"),
            };
            print_attendance(&records);
        }
        Commands::Status => {
            let store = open_store(&config).await?;
            let counts = store.counts().await?;
            let detector = config.detector_model_path();
            let recognizer = config.recognizer_model_path();
            let status = serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "bind": config.bind,
                "db_path": config.db_path,
                "templates_sealed": config.template_key.is_some(),
                "verify_tolerance": config.verify_tolerance,
                "identify_threshold": config.identify_threshold,
                "models": {
                    "detector": { "path": detector, "present": Path::new(&detector).exists() },
                    "recognizer": { "path": recognizer, "present": Path::new(&recognizer).exists() },
                },
                "counts": counts,
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }

    Ok(())
}

async fn open_store(config: &Config) -> Result<Store> {
    let cipher = config.template_key.as_deref().map(TemplateCipher::from_secret);
    Store::open(&config.db_path, cipher)
        .await
        .with_context(|| format!("opening {}", config.db_path.display()))
}

fn load_encoder(config: &Config) -> Result<OnnxFaceEncoder> {
    OnnxFaceEncoder::load(&config.detector_model_path(), &config.recognizer_model_path())
        .with_context(|| format!("loading face models from {}", config.model_dir.display()))
}

fn load_image(path: &Path) -> Result<RgbImage> {
    let image = image::open(path)
        .with_context(|| format!("reading {}", path.display()))?
        .to_rgb8();
    tracing::debug!(path = %path.display(), width = image.width(), height = image.height(), "loaded image");
    Ok(image)
}

fn print_attendance(records: &[AttendanceRecord]) {
    if records.is_empty() {
        println!("No attendance records");
        return;
    }
    for r in records {
        println!(
            "{}  {:<12} {:<24} {:<12} {}",
            r.timestamp.format("%Y-%m-%d %H:%M:%S"),
            r.student_reg_id,
            r.student_name.as_deref().unwrap_or("-"),
            r.faculty_reg_id,
            r.subject
        );
    }
}
