use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

// D-Bus proxy — generated client for the rollcalld attendance daemon.
#[zbus::proxy(
    interface = "org.rollcall.Attendance1",
    default_service = "org.rollcall.Attendance1",
    default_path = "/org/rollcall/Attendance1"
)]
trait Attendance {
    async fn register_faculty(
        &self,
        code: &str,
        name: &str,
        department: &str,
        email: &str,
        phone: &str,
    ) -> zbus::Result<i64>;
    async fn enroll_sample(&self, faculty_id: i64, image: Vec<u8>) -> zbus::Result<String>;
    async fn recognize_frame(&self, image: Vec<u8>) -> zbus::Result<String>;
    async fn retrain(&self) -> zbus::Result<String>;
    async fn today_report(&self) -> zbus::Result<String>;
    async fn monthly_report(&self, year: i32, month: u32) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall attendance CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a faculty member
    Register {
        /// Faculty code (e.g., "CS-014")
        #[arg(short, long)]
        code: String,
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        department: String,
        #[arg(long, default_value = "")]
        email: String,
        #[arg(long, default_value = "")]
        phone: String,
    },
    /// Enroll a face image for a registered faculty member
    Enroll {
        /// Faculty id returned by `register`
        faculty_id: i64,
        /// Path to an encoded image (JPEG/PNG) containing the face
        image: PathBuf,
    },
    /// Recognize faces in a frame and record attendance
    Recognize {
        /// Path to an encoded frame image
        image: PathBuf,
    },
    /// Rebuild the appearance model from all stored samples
    Retrain,
    /// Show today's attendance report
    Today,
    /// Show the monthly attendance summary
    Month {
        year: i32,
        month: u32,
    },
    /// Show daemon status
    Status,
}

/// Re-emit a JSON payload from the daemon in pretty form.
fn print_json(payload: &str) -> Result<()> {
    let value: serde_json::Value =
        serde_json::from_str(payload).context("daemon returned malformed JSON")?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn read_image(path: &PathBuf) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let conn = zbus::Connection::session()
        .await
        .context("failed to connect to the session bus — is rollcalld running?")?;
    let proxy = AttendanceProxy::new(&conn).await?;

    match cli.command {
        Commands::Register {
            code,
            name,
            department,
            email,
            phone,
        } => {
            let id = proxy
                .register_faculty(&code, &name, &department, &email, &phone)
                .await?;
            println!("registered faculty id {id}");
        }
        Commands::Enroll { faculty_id, image } => {
            let bytes = read_image(&image)?;
            let outcome = proxy.enroll_sample(faculty_id, bytes).await?;
            print_json(&outcome)?;
        }
        Commands::Recognize { image } => {
            let bytes = read_image(&image)?;
            let detected = proxy.recognize_frame(bytes).await?;
            print_json(&detected)?;
        }
        Commands::Retrain => {
            let outcome = proxy.retrain().await?;
            print_json(&outcome)?;
        }
        Commands::Today => {
            let report = proxy.today_report().await?;
            print_json(&report)?;
        }
        Commands::Month { year, month } => {
            let report = proxy.monthly_report(year, month).await?;
            print_json(&report)?;
        }
        Commands::Status => {
            let status = proxy.status().await?;
            print_json(&status)?;
        }
    }

    Ok(())
}
