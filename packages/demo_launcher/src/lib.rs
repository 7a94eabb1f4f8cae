//! Demo Launcher - starts registered demo programs for the preview bridge
//!
//! A [`DemoRegistry`] maps demo names to [`LaunchSpec`]s. A [`Launcher`]
//! turns a name and a [`TermSize`] into a running process: stdio wired up,
//! the size and color settings injected into its environment, and an actor
//! that owns the child until it is reaped.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use demo_launcher::{DemoRegistry, LaunchOptions, LaunchSpec, Launcher, NativeLauncher, TermSize};
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry: DemoRegistry = [(
//!         "hello".to_string(),
//!         LaunchSpec::new("/bin/sh").args(["-c", "echo \"$COLUMNS columns\""]),
//!     )]
//!     .into_iter()
//!     .collect();
//!
//!     let launcher = NativeLauncher::new(Arc::new(registry), LaunchOptions::default());
//!     let mut spawned = launcher.launch("hello", TermSize::new(40, 20).unwrap()).unwrap();
//!
//!     while let Some(chunk) = spawned.output.recv().await {
//!         print!("{}", String::from_utf8_lossy(&chunk));
//!     }
//!     println!("exited: {}", spawned.handle.wait().await);
//! }
//! ```

mod error;
mod launcher;
mod process;
mod pty;
mod registry;
mod size;

pub use error::LaunchError;
pub use launcher::{LaunchOptions, Launcher, NativeLauncher};
pub use process::{ExitStatus, ExitWatch, ProcessHandle, Spawned};
pub use registry::{Backend, DemoRegistry, LaunchSpec};
pub use size::TermSize;
