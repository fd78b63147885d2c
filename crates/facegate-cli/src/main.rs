use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use facegate_hw::Camera;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "facegate", about = "facegate face verification CLI")]
struct Cli {
    /// Base URL of the facegated HTTP server
    #[arg(long, global = true, default_value = "http://127.0.0.1:8080")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a reference photo as the enrollment
    Enroll {
        /// Image file (PNG, JPEG, ...)
        image: PathBuf,
    },
    /// Show daemon and session status
    Status,
    /// Follow the live match result until the session is verified
    Watch {
        /// Poll interval in milliseconds
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
    },
    /// Clear the enrollment and the session verification
    Reset,
    /// Run camera diagnostics (bypasses the daemon)
    Test {
        /// V4L2 device path
        #[arg(short, long, default_value = "/dev/video0")]
        device: String,
        /// Save the captured frame as a PNG
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let base = cli.url.trim_end_matches('/').to_string();
    let http = reqwest::Client::new();

    match cli.command {
        Commands::Enroll { image } => enroll(&http, &base, &image).await,
        Commands::Status => {
            let status = get_status(&http, &base).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
        Commands::Watch { interval_ms } => watch(&http, &base, Duration::from_millis(interval_ms)).await,
        Commands::Reset => {
            let resp = http
                .post(format!("{base}/api/session/reset"))
                .send()
                .await
                .with_context(|| format!("cannot reach facegated at {base}"))?;
            if !resp.status().is_success() {
                bail!("reset failed: HTTP {}", resp.status());
            }
            println!("Session reset");
            Ok(())
        }
        Commands::Test { device, output } => camera_test(&device, output),
    }
}

async fn enroll(http: &reqwest::Client, base: &str, path: &Path) -> Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let format = image::guess_format(&bytes)
        .with_context(|| format!("{} is not a recognized image", path.display()))?;
    tracing::debug!(path = %path.display(), ?format, bytes = bytes.len(), "uploading reference image");
    println!("Uploading {} ({} bytes)...", path.display(), bytes.len());

    let resp = http
        .post(format!("{base}/api/enroll"))
        .body(bytes)
        .send()
        .await
        .with_context(|| format!("cannot reach facegated at {base}"))?;
    let status = resp.status();
    let body: serde_json::Value = resp.json().await.context("invalid response from facegated")?;

    if !status.is_success() {
        bail!("enrollment failed ({status}): {}", body["error"].as_str().unwrap_or("unknown error"));
    }
    println!(
        "Enrolled as {} ({} dimensions)",
        body["label"].as_str().unwrap_or("?"),
        body["dimensions"]
    );
    Ok(())
}

async fn get_status(http: &reqwest::Client, base: &str) -> Result<serde_json::Value> {
    tracing::debug!(%base, "fetching status");
    let resp = http
        .get(format!("{base}/api/status"))
        .send()
        .await
        .with_context(|| format!("cannot reach facegated at {base}"))?;
    if !resp.status().is_success() {
        bail!("status failed: HTTP {}", resp.status());
    }
    resp.json().await.context("invalid status from facegated")
}

async fn watch(http: &reqwest::Client, base: &str, interval: Duration) -> Result<()> {
    let mut ticker = tokio::time::interval(interval);
    let mut last_tick = None;

    loop {
        ticker.tick().await;
        let status = get_status(http, base).await?;

        if status["enrollment"].is_null() {
            println!("waiting for enrollment ({})", status["state"].as_str().unwrap_or("?"));
            continue;
        }

        // Only print when the loop has produced something new.
        let ticks = status["ticks"].as_u64();
        if ticks == last_tick {
            continue;
        }
        last_tick = ticks;

        match status.get("last_result").filter(|r| !r.is_null()) {
            Some(result) => println!(
                "{:<14} distance {:.3}  {:>4}%  {}",
                result["label"].as_str().unwrap_or("?"),
                result["distance"].as_f64().unwrap_or(f64::NAN),
                result["percentage"].as_i64().unwrap_or(0),
                if result["is_match"] == true { "match" } else { "no match" }
            ),
            None => println!("no face yet"),
        }

        if status["verified"] == true {
            println!("Verified");
            return Ok(());
        }
    }
}

fn camera_test(device: &str, output: Option<PathBuf>) -> Result<()> {
    println!("Running camera diagnostics...");

    let devices = Camera::list_devices();
    if devices.is_empty() {
        println!("No V4L2 capture devices found");
    }
    for info in &devices {
        println!("  {}  {} [{}] {}", info.path, info.name, info.driver, info.bus);
    }

    let camera = Camera::open(device).with_context(|| format!("failed to open {device}"))?;
    println!(
        "Opened {}: {}x{} {}",
        camera.device_path, camera.width, camera.height, camera.fourcc
    );
    camera.warm_up(4)?;
    let frame = camera.capture_frame()?;
    println!(
        "Captured frame #{}: average brightness {:.1}{}",
        frame.sequence,
        frame.avg_brightness(),
        if frame.is_dark(0.95) { " (dark)" } else { "" }
    );

    if let Some(path) = output {
        let img = frame
            .to_gray_image()
            .context("captured frame has inconsistent dimensions")?;
        img.save(&path)
            .with_context(|| format!("failed to save {}", path.display()))?;
        println!("Saved {}", path.display());
    }
    Ok(())
}
