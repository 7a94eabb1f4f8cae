use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::LaunchError;
use crate::process::{self, Spawned};
use crate::pty;
use crate::registry::{Backend, DemoRegistry};
use crate::size::TermSize;

/// Tunables shared by every process a launcher starts
#[derive(Clone, Debug)]
pub struct LaunchOptions {
    /// Time between SIGTERM and SIGKILL
    pub kill_grace: Duration,
    /// Output chunks buffered before the readers stop pulling from the child
    pub output_capacity: usize,
    /// Bytes per read from the child's output
    pub read_chunk: usize,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            kill_grace: Duration::from_millis(500),
            output_capacity: 256,
            read_chunk: 4096,
        }
    }
}

/// Starts demo programs by name.
///
/// Implementations must be called from within a tokio runtime.
pub trait Launcher: Send + Sync {
    /// Names that `launch` accepts, sorted.
    fn demos(&self) -> Vec<String>;

    /// Fail fast with `UnknownDemo` without starting anything.
    fn check(&self, demo: &str) -> Result<(), LaunchError>;

    /// Human readable blurb for listings
    fn description(&self, _demo: &str) -> Option<String> {
        None
    }

    fn launch(&self, demo: &str, size: TermSize) -> Result<Spawned, LaunchError>;
}

/// Launches OS processes described by a [`DemoRegistry`].
pub struct NativeLauncher {
    registry: Arc<DemoRegistry>,
    options: LaunchOptions,
}

impl NativeLauncher {
    pub fn new(registry: Arc<DemoRegistry>, options: LaunchOptions) -> Self {
        Self { registry, options }
    }
}

impl Launcher for NativeLauncher {
    fn demos(&self) -> Vec<String> {
        self.registry.names()
    }

    fn check(&self, demo: &str) -> Result<(), LaunchError> {
        self.registry.resolve(demo).map(|_| ())
    }

    fn description(&self, demo: &str) -> Option<String> {
        self.registry
            .resolve(demo)
            .ok()
            .and_then(|spec| spec.description.clone())
    }

    fn launch(&self, demo: &str, size: TermSize) -> Result<Spawned, LaunchError> {
        let spec = self.registry.resolve(demo)?;
        debug!(
            "Launching demo '{}': {} {:?} ({:?})",
            demo, spec.command, spec.args, spec.backend
        );

        match spec.backend {
            Backend::Pipes => process::spawn_piped(demo, spec, size, &self.options),
            Backend::Pty => pty::spawn_pty(demo, spec, size, &self.options),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::LaunchSpec;

    fn launcher() -> NativeLauncher {
        let registry: DemoRegistry = [
            (
                "hello".to_string(),
                LaunchSpec::new("/bin/sh").args(["-c", "echo hello"]),
            ),
            (
                "broken".to_string(),
                LaunchSpec::new("/nonexistent/demo-binary"),
            ),
        ]
        .into_iter()
        .collect();
        NativeLauncher::new(Arc::new(registry), LaunchOptions::default())
    }

    #[test]
    fn test_demos_sorted() {
        assert_eq!(launcher().demos(), vec!["broken", "hello"]);
    }

    #[test]
    fn test_check_unknown() {
        let launcher = launcher();
        assert!(launcher.check("hello").is_ok());
        assert_eq!(
            launcher.check("missing"),
            Err(LaunchError::UnknownDemo("missing".to_string()))
        );
    }

    #[tokio::test]
    async fn test_unknown_demo_spawns_nothing() {
        let err = launcher()
            .launch("missing", TermSize::default())
            .unwrap_err();
        assert_eq!(err, LaunchError::UnknownDemo("missing".to_string()));
    }

    #[tokio::test]
    async fn test_launch_registered_demo() {
        let mut spawned = launcher().launch("hello", TermSize::default()).unwrap();
        let first = spawned.output.recv().await.unwrap();
        assert_eq!(String::from_utf8_lossy(&first), "hello\n");
        assert!(spawned.handle.wait().await.success());
    }

    #[tokio::test]
    async fn test_spawn_failure_surfaces() {
        let err = launcher()
            .launch("broken", TermSize::default())
            .unwrap_err();
        assert!(matches!(err, LaunchError::SpawnFailed { .. }));
    }
}
