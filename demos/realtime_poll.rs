// Continuous acquisition
//
// Forces a trigger on a Rigol scope, grabs both channels and lets a
// listener print a short summary of every new trace.

use clap::Parser;
use oscope_rs::RigolScope;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "realtime_poll")]
#[command(version = "1.0")]
#[command(about = "Poll a Rigol oscilloscope and print every acquisition")]
struct Args {
    /// USBTMC device node
    #[arg(default_value = "/dev/usbtmc0")]
    device: PathBuf,

    /// Pause between acquisitions in milliseconds
    #[arg(short, long, default_value_t = 200)]
    interval: u64,

    /// Stop after this many acquisitions; run forever if omitted
    #[arg(short, long)]
    count: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long, help = "Show debug information and detailed logs")]
    verbose: bool,
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

    let mut scope: RigolScope = RigolScope::open(&args.device)?;
    println!("✓ Connected to {}", scope.name());
    println!("Press Ctrl+C to stop\n");

    let start_time = Instant::now();
    scope.add_listener(move |scope| {
        let summary: Vec<String> = scope
            .last_grabbed()
            .channels()
            .filter_map(|channel| scope.scaled_waveform(channel).ok())
            .map(|volts| {
                let min = volts.iter().copied().fold(f64::INFINITY, f64::min);
                let max = volts.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                format!("{min:+.3}..{max:+.3} V")
            })
            .collect();
        print!(
            "\r[{:7.2}s] {} samples | {}",
            start_time.elapsed().as_secs_f64(),
            scope.sample_count(),
            summary.join(" | ")
        );
        let _ = io::stdout().flush();
    });

    let mut acquisitions = 0u64;
    while args.count.map_or(true, |count| acquisitions < count) {
        scope.force_trigger()?;
        match scope.grab_data() {
            Ok(()) => acquisitions += 1,
            Err(e) => {
                eprintln!("\nError reading data: {e}");
                eprintln!("Retrying...");
            }
        }
        std::thread::sleep(Duration::from_millis(args.interval));
    }

    println!();
    scope.close()?;
    Ok(())
}
