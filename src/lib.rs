//! # oscope-rs
//!
//! A Rust library for pulling waveform traces off bench oscilloscopes.
//!
//! Every instrument is driven through the same [`Scope`] type: a
//! [`Transport`] that moves bytes (USBTMC character device, RS-232 line or a
//! GPIB-to-Ethernet bridge) combined with a [`WaveformDecoder`] that knows
//! how one instrument family encodes its traces. After an acquisition the
//! scope holds per-channel samples, the scaling constants that turn them
//! into volts and a shared time axis.
//!
//! ## Features
//!
//! - **Rigol DS1000 series** over `/dev/usbtmc*` or a serial line
//! - **LeCroy Waverunner** through a GPIB-Ethernet bridge, with the binary
//!   `WAVEDESC` header validated before any sample is trusted
//! - **Transactional acquisition**: a failed grab leaves the previous data intact
//! - **Listeners** called after every acquisition
//! - **DataFrame output** via `polars`, plus a tab-separated text format
//! - **Type safety**: explicit channel masks and typed errors throughout
//!
//! ## Examples
//!
//! ### Rigol over USBTMC
//!
//! ```rust,no_run
//! use oscope_rs::RigolScope;
//!
//! let mut scope: RigolScope = RigolScope::open("/dev/usbtmc0")?;
//! println!("Connected to {}", scope.name());
//!
//! scope.grab_data()?;
//! let volts = scope.scaled_waveform(1)?;
//! println!("CH1: {} samples, first at {:e} s", volts.len(), scope.time_axis()[0]);
//!
//! // Give the front panel back to the user
//! scope.close()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Waverunner through a GPIB bridge
//!
//! ```rust,no_run
//! use oscope_rs::{ChannelMask, GpibBridge, WaverunnerScope};
//! use std::time::Duration;
//!
//! let bridge = GpibBridge::builder("192.168.1.50")
//!     .pad(5)
//!     .timeout(Duration::from_secs(2));
//! let mut scope: WaverunnerScope = WaverunnerScope::connect(bridge, 10_000)?;
//!
//! // Only channels 1 and 3 are wired up
//! scope.set_active_channels(ChannelMask::none(4).with(1)?.with(3)?)?;
//! scope.grab_data()?;
//!
//! let df = scope.to_dataframe()?;
//! println!("{df}");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Listening for new data
//!
//! ```rust,no_run
//! use oscope_rs::{Rigol, Scope, SerialTerminal};
//!
//! let terminal = SerialTerminal::builder("/dev/ttyUSB0").baud_rate(38_400).open()?;
//! let mut scope = Scope::new(terminal, Rigol)?;
//!
//! let id = scope.add_listener(|scope| {
//!     println!("{} samples at {:?}", scope.sample_count(), scope.acquired_at());
//! });
//! for _ in 0..10 {
//!     scope.grab_data()?;
//! }
//! scope.remove_listener(id);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Decoding without hardware
//!
//! ```rust
//! use oscope_rs::{LoopbackTransport, Rigol, Scope};
//!
//! let mut trace = b"#800000003".to_vec();
//! trace.extend_from_slice(&[125, 100, 150]);
//!
//! let transport = LoopbackTransport::new()
//!     .respond("*IDN?", "Rigol Technologies,DS1052E,DS1ET0000,00.04.01\n")
//!     .respond(":WAV:DATA? CHAN1", trace.clone())
//!     .respond(":WAV:DATA? CHAN2", trace)
//!     .respond(":CHAN1:SCAL?", "2.5e+01\n")
//!     .respond(":CHAN1:OFFS?", "0\n")
//!     .respond(":CHAN2:SCAL?", "2.5e+01\n")
//!     .respond(":CHAN2:OFFS?", "0\n")
//!     .respond(":TIM:SCAL?", "1e-06\n")
//!     .respond(":TIM:OFFS?", "0\n");
//!
//! let mut scope = Scope::new(transport, Rigol)?;
//! scope.grab_data()?;
//! assert_eq!(scope.scaled_waveform(1)?, [0.0, 25.0, -25.0]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod channel_mask;
pub mod frame;
pub mod gpib_bridge;
pub mod listener;
pub mod rigol;
pub mod scope;
pub mod serial_terminal;
pub mod transport;
pub mod usbtmc;
pub mod waveform;
pub mod waveform_file;
pub mod waverunner;

// Re-export the main types for convenience
pub use channel_mask::{ChannelMask, MAX_CHANNELS};

pub use scope::{Scope, ScopeChannel, ScopeError};

pub use listener::ListenerId;

pub use transport::{LoopbackTransport, Transport, TransportError};

pub use usbtmc::UsbtmcDevice;

pub use serial_terminal::{SerialTerminal, SerialTerminalBuilder};

pub use gpib_bridge::{GpibBridge, GpibBridgeBuilder};

pub use waveform::{DecodedWaveform, Timebase, WaveformDecoder, WaveformError};

pub use rigol::{Rigol, RigolScope};

pub use waverunner::{WaveDescriptor, Waverunner, WaverunnerScope};
