//! # Panelstream CLI
//!
//! Command-line interface for driving USB LCD panels.
//!
//! ## Usage
//!
//! ```bash
//! # Scan the HID bus for known panels
//! panelstream list
//!
//! # Run the diagnostic probe for a device
//! panelstream diagnose --device 0416:5406
//!
//! # Render one frame of a theme to disk
//! panelstream render theme.json --out frame.jpg
//!
//! # Stream a theme to every detected panel
//! panelstream stream theme.json --fps 20
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use panelstream::{
    device::DeviceManager,
    error::PanelError,
    render::FrameProducer,
    sensors::{HardwareMonitor, SensorCache, SystemPoller},
    stream::StreamScheduler,
    theme::Theme,
};

/// Panelstream - USB LCD panel streaming utility
#[derive(Parser, Debug)]
#[command(name = "panelstream")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan the HID bus for known panels
    List,

    /// Run a device's diagnostic probe without streaming
    Diagnose {
        /// Device id as vid:pid hex (e.g. 0416:5406)
        #[arg(long, value_name = "VID:PID")]
        device: String,
    },

    /// Render one frame of a theme and save it
    Render {
        /// Theme JSON file
        theme: PathBuf,

        /// Output image path
        #[arg(long, default_value = "frame.jpg")]
        out: PathBuf,
    },

    /// Stream a theme to connected panels
    Stream {
        /// Theme JSON file
        theme: PathBuf,

        /// Target frame rate
        #[arg(long, default_value = "10")]
        fps: u32,

        /// Stream only to this device (vid:pid hex); default is every
        /// detected panel
        #[arg(long, value_name = "VID:PID")]
        device: Option<String>,

        /// Path to the hardware monitor helper executable
        #[arg(long, value_name = "FILE")]
        hwmon: Option<PathBuf>,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(e) = run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), PanelError> {
    let cli = Cli::parse();

    match cli.command {
        Commands::List => {
            let mut manager = DeviceManager::new()?;
            let found = manager.enumerate_devices();
            if found.is_empty() {
                println!("No known panels detected.");
                return Ok(());
            }
            println!("Detected panels:");
            for dev in found {
                println!(
                    "  {:04x}:{:04x}  {} ({}x{})",
                    dev.vendor_id, dev.product_id, dev.name, dev.width, dev.height
                );
            }
        }

        Commands::Diagnose { device } => {
            let (vid, pid) = parse_device_id(&device)?;
            let manager = DeviceManager::new()?;
            manager.diagnose(vid, pid);
        }

        Commands::Render { theme, out } => {
            let theme = load_theme(&theme)?;
            let mut producer = FrameProducer::new();
            let frame = producer.render(&theme, &SensorCache::new().snapshot());
            let jpeg = FrameProducer::encode_jpeg(&frame)?;
            std::fs::write(&out, jpeg)?;
            println!("Saved {}x{} frame to {}", frame.width(), frame.height(), out.display());
        }

        Commands::Stream {
            theme,
            fps,
            device,
            hwmon,
        } => {
            stream(&theme, fps, device.as_deref(), hwmon)?;
        }
    }

    Ok(())
}

fn stream(theme_path: &PathBuf, fps: u32, device: Option<&str>, hwmon: Option<PathBuf>) -> Result<(), PanelError> {
    let theme = load_theme(theme_path)?;

    let cache = SensorCache::new();
    let poller = SystemPoller::spawn(cache.system_slot());
    let monitor = hwmon.map(|path| HardwareMonitor::spawn(path, cache.hardware_slot()));

    let mut manager = DeviceManager::new()?;
    let targets: Vec<(u16, u16)> = match device {
        Some(id) => vec![parse_device_id(id)?],
        None => manager
            .enumerate_devices()
            .iter()
            .map(|d| (d.vendor_id, d.product_id))
            .collect(),
    };
    if targets.is_empty() {
        poller.stop();
        if let Some(m) = monitor {
            m.stop();
        }
        return Err(PanelError::Connection(
            "no panels detected; specify --device to force one".to_string(),
        ));
    }
    for (vid, pid) in targets {
        match manager.connect(vid, pid) {
            Ok(Some(key)) => println!("Streaming to {key}"),
            Ok(None) => println!("Skipping {vid:04x}:{pid:04x} (no streamable driver)"),
            Err(e) => eprintln!("Connect failed for {vid:04x}:{pid:04x}: {e}"),
        }
    }
    if !manager.is_connected() {
        poller.stop();
        if let Some(m) = monitor {
            m.stop();
        }
        return Err(PanelError::Connection("no devices connected".to_string()));
    }

    let manager = Arc::new(Mutex::new(manager));
    let scheduler = StreamScheduler::start(
        Arc::clone(&manager),
        Arc::new(Mutex::new(theme)),
        cache,
        fps,
    );

    // Run until Ctrl-C
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        flag.store(false, Ordering::SeqCst);
    })
    .map_err(|e| PanelError::Connection(format!("cannot install signal handler: {e}")))?;

    println!("Streaming at {} FPS; press Ctrl-C to stop.", scheduler.target_fps());
    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(200));
    }

    println!("Stopping...");
    scheduler.stop();
    poller.stop();
    if let Some(m) = monitor {
        m.stop();
    }
    manager
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .disconnect_all();
    Ok(())
}

fn load_theme(path: &PathBuf) -> Result<Theme, PanelError> {
    let json = std::fs::read_to_string(path)?;
    Theme::from_json(&json)
        .map_err(|e| PanelError::Decode(format!("bad theme {}: {e}", path.display())))
}

/// Parse `"vid:pid"` hex notation.
fn parse_device_id(id: &str) -> Result<(u16, u16), PanelError> {
    let err = || PanelError::Connection(format!("invalid device id '{id}' (expected vid:pid hex)"));
    let (vid, pid) = id.split_once(':').ok_or_else(err)?;
    Ok((
        u16::from_str_radix(vid, 16).map_err(|_| err())?,
        u16::from_str_radix(pid, 16).map_err(|_| err())?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_device_id() {
        assert_eq!(parse_device_id("0416:5302").unwrap(), (0x0416, 0x5302));
        assert_eq!(parse_device_id("ffff:1").unwrap(), (0xFFFF, 0x0001));
        assert!(parse_device_id("nope").is_err());
        assert!(parse_device_id("zz:01").is_err());
    }
}
