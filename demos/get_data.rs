// Single-shot capture
//
// Grabs one acquisition from a Rigol (USBTMC) or a Waverunner (GPIB bridge)
// and writes it as tab-separated text to a file or stdout.

use clap::{Parser, Subcommand};
use oscope_rs::{ChannelMask, GpibBridge, RigolScope, Scope, Transport, WaveformDecoder, WaverunnerScope};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "get_data")]
#[command(version = "1.0")]
#[command(about = "Capture one acquisition from an oscilloscope")]
struct Args {
    #[command(subcommand)]
    instrument: Instrument,

    /// Bitmask of channels to read (bit 0 = channel 1); all channels if omitted
    #[arg(short, long)]
    channels: Option<u32>,

    /// Output file; stdout if omitted
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Free-form comment written at the top of the file
    #[arg(long, default_value = "")]
    comment: String,

    /// Enable verbose logging
    #[arg(short, long, help = "Show debug information and detailed logs")]
    verbose: bool,
}

#[derive(Subcommand)]
enum Instrument {
    /// Rigol DS1000 attached through the USBTMC driver
    Rigol {
        #[arg(default_value = "/dev/usbtmc0")]
        device: PathBuf,
    },
    /// LeCroy Waverunner behind a GPIB-Ethernet bridge
    Waverunner {
        host: String,

        #[arg(long, default_value_t = 1234)]
        port: u16,

        /// GPIB primary address of the scope
        #[arg(long, default_value_t = 5)]
        pad: u8,

        /// Samples per channel
        #[arg(short, long, default_value_t = 5000)]
        memory: usize,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }

    match &args.instrument {
        Instrument::Rigol { device } => {
            let mut scope: RigolScope = RigolScope::open(device)?;
            capture(&mut scope, &args)?;
            scope.close()?;
        }
        Instrument::Waverunner {
            host,
            port,
            pad,
            memory,
        } => {
            let bridge = GpibBridge::builder(host)
                .port(*port)
                .pad(*pad)
                .timeout(Duration::from_secs(2));
            let mut scope: WaverunnerScope = WaverunnerScope::connect(bridge, *memory)?;
            capture(&mut scope, &args)?;
            scope.close()?;
        }
    }

    Ok(())
}

fn capture<T: Transport, D: WaveformDecoder>(
    scope: &mut Scope<T, D>,
    args: &Args,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("✓ Connected to {}", scope.name());

    if let Some(bits) = args.channels {
        scope.set_active_channels(ChannelMask::from_bits(scope.channel_count(), bits))?;
    }
    eprintln!("Reading {}", scope.active_channels());

    scope.grab_data()?;
    eprintln!(
        "✓ {} samples, {:e} s/sample",
        scope.sample_count(),
        scope.sample_interval()
    );

    let header = if args.comment.is_empty() {
        String::new()
    } else {
        format!("# {}\n", args.comment)
    };

    match &args.output {
        Some(path) => scope.save_waveforms(path, &header)?,
        None => scope.write_waveforms(std::io::stdout().lock(), &header)?,
    }
    Ok(())
}
