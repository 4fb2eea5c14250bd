//! Smart Screen Control Tool
//!
//! CLI for driving a USB serial smart screen panel directly.

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use smartscreen_hw::{
    Command, CommandOutcome, DeviceSession, Orientation, PixelBuffer, Rect, SerialTransport,
};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;

#[derive(Parser)]
#[command(name = "smartscreenctl")]
#[command(about = "Control tool for USB serial smart screen panels")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial port, overrides the configuration
    #[arg(long)]
    port: Option<String>,

    /// Hardware revision (a, b, c, d), overrides the configuration
    #[arg(long)]
    revision: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Restart the panel
    Reset,
    /// Blank the screen
    Clear,
    /// Turn the screen on
    On,
    /// Turn the screen off
    Off,
    /// Set backlight brightness
    Brightness {
        /// Brightness in percent (0-100)
        #[arg(allow_hyphen_values = true)]
        level: i32,
    },
    /// Set display orientation
    Orientation {
        /// Orientation: portrait, landscape, reverse-portrait, reverse-landscape
        orientation: String,
    },
    /// Show an image file
    Show {
        /// Image path (any format the image crate decodes)
        path: PathBuf,

        /// Left edge on the panel
        #[arg(long, default_value = "0")]
        x: u16,

        /// Top edge on the panel
        #[arg(long, default_value = "0")]
        y: u16,

        /// Orientation to set before drawing
        #[arg(long)]
        orientation: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(revision) = cli.revision {
        config.revision = revision;
    }

    let revision = config.revision()?;
    let transport = SerialTransport::new(&config.port, config.baud_rate);
    let session = DeviceSession::new(transport, revision, config.session.clone());
    session
        .connect()
        .with_context(|| format!("Failed to open {}. Is the panel plugged in?", config.port))?;
    info!(
        "Connected to {} on {}",
        session.profile().name,
        config.port
    );

    match cli.command {
        Commands::Reset => {
            run(&session, Command::Reset)?;
            println!("Panel reset");
        }
        Commands::Clear => {
            run(&session, Command::Clear)?;
            println!("Display cleared");
        }
        Commands::On => {
            run(&session, Command::ScreenOn)?;
            println!("Screen on");
        }
        Commands::Off => {
            run(&session, Command::ScreenOff)?;
            println!("Screen off");
        }
        Commands::Brightness { level } => {
            run(&session, Command::SetBrightness(level))?;
            println!("Brightness set to: {}%", level);
        }
        Commands::Orientation { orientation } => {
            let orientation: Orientation = orientation.parse()?;
            run(&session, Command::SetOrientation(orientation))?;
            println!("Orientation set to: {}", orientation);
        }
        Commands::Show {
            path,
            x,
            y,
            orientation,
        } => {
            if let Some(orientation) = orientation {
                let orientation: Orientation = orientation.parse()?;
                run(&session, Command::SetOrientation(orientation))?;
            }
            let (buffer, rect) = load_image(&path, x, y, session.dimensions())?;
            report(session.display_region(&buffer, rect)?)?;
            println!("Displayed {} at {}", path.display(), rect);
        }
    }

    Ok(())
}

fn run(session: &DeviceSession<SerialTransport>, command: Command) -> Result<()> {
    report(session.execute(&command)?)
}

fn report(outcome: CommandOutcome) -> Result<()> {
    if let CommandOutcome::RetriedSuccess(retries) = outcome {
        info!("Succeeded after {} retries", retries);
    }
    outcome.into_result().context("Panel did not accept the command")
}

/// Places an image at (x, y) on a panel-sized buffer, clipped to the panel.
fn load_image(
    path: &Path,
    x: u16,
    y: u16,
    (panel_width, panel_height): (u16, u16),
) -> Result<(PixelBuffer, Rect)> {
    let image = image::open(path)
        .with_context(|| format!("Failed to decode {}", path.display()))?
        .to_rgb8();

    if x >= panel_width || y >= panel_height {
        anyhow::bail!(
            "Position {},{} is outside the {}x{} panel",
            x,
            y,
            panel_width,
            panel_height
        );
    }

    let width = image.width().min(u32::from(panel_width - x)) as u16;
    let height = image.height().min(u32::from(panel_height - y)) as u16;
    if width == 0 || height == 0 {
        anyhow::bail!("Image {} is empty", path.display());
    }

    let mut buffer = PixelBuffer::new(panel_width, panel_height);
    for dy in 0..height {
        for dx in 0..width {
            let pixel = image.get_pixel(u32::from(dx), u32::from(dy));
            buffer.set_pixel(x + dx, y + dy, pixel.0);
        }
    }

    Ok((buffer, Rect::new(x, y, width, height)))
}
