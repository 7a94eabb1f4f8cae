//! One connection's demo session and the task that streams its output.
//!
//! A [`SessionManager`] owns at most one live child. Starting a new demo
//! retires the previous one completely (forwarder cancelled, process killed
//! and reaped) before the replacement is spawned, and every event carries the
//! [`SessionId`] it belongs to so late output can still be told apart.

use chrono::{DateTime, Utc};
use demo_launcher::{
    ExitStatus, ExitWatch, LaunchError, Launcher, ProcessHandle, Spawned, TermSize,
};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::BridgeError;

/// Identifies one spawned child within a connection. Never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    Starting,
    Running,
    /// Exited with code 0
    Exited,
    /// Non-zero exit or killed by a signal
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Exited | Self::Failed)
    }

    fn from_exit(status: &ExitStatus) -> Self {
        if status.success() {
            Self::Exited
        } else {
            Self::Failed
        }
    }
}

/// Everything a connection's writer may need to send, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    Demos(Vec<String>),
    Started { session: SessionId, demo: String },
    Output { session: SessionId, data: Vec<u8> },
    Exited { session: SessionId, status: ExitStatus },
    Error(BridgeError),
}

#[derive(Clone, Debug)]
pub struct SessionSettings {
    /// Upper bound on waiting for a killed child to be reaped
    pub exit_timeout: Duration,
    /// Output still forwarded after the child has exited
    pub drain_timeout: Duration,
    /// Events buffered between the session and the socket writer
    pub outbound_capacity: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            exit_timeout: Duration::from_secs(2),
            drain_timeout: Duration::from_millis(100),
            outbound_capacity: 256,
        }
    }
}

/// Point-in-time view of the active session
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: SessionId,
    pub demo: String,
    pub size: TermSize,
    /// Last size the client asked for after start
    pub requested_size: Option<TermSize>,
    pub status: SessionStatus,
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
}

struct Session {
    id: SessionId,
    demo: String,
    size: TermSize,
    requested_size: Option<TermSize>,
    started_at: DateTime<Utc>,
    status: Arc<watch::Sender<SessionStatus>>,
    /// Set by whoever reports this session's exit first
    exit_reported: Arc<AtomicBool>,
    cancel: CancellationToken,
    forwarder: Option<JoinHandle<()>>,
    process: ProcessHandle,
}

impl Session {
    fn new(id: SessionId, demo: &str, size: TermSize, process: ProcessHandle) -> Self {
        let (status, _) = watch::channel(SessionStatus::Starting);
        Self {
            id,
            demo: demo.to_string(),
            size,
            requested_size: None,
            started_at: Utc::now(),
            status: Arc::new(status),
            exit_reported: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
            forwarder: None,
            process,
        }
    }

    fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id,
            demo: self.demo.clone(),
            size: self.size,
            requested_size: self.requested_size,
            status: self.status(),
            pid: self.process.pid(),
            started_at: self.started_at,
        }
    }

    fn attach_forwarder(
        &mut self,
        events: mpsc::Sender<BridgeEvent>,
        output: mpsc::Receiver<Vec<u8>>,
        drain_timeout: Duration,
    ) {
        self.status.send_replace(SessionStatus::Running);
        let forwarder = OutputForwarder {
            session: self.id,
            output,
            exit: self.process.exit_watch(),
            events,
            cancel: self.cancel.clone(),
            status: self.status.clone(),
            exit_reported: self.exit_reported.clone(),
            drain_timeout,
        };
        self.forwarder = Some(tokio::spawn(forwarder.run()));
    }
}

/// Streams one child's output into the connection's event queue and reports
/// its exit. Stops sending as soon as it is cancelled.
struct OutputForwarder {
    session: SessionId,
    output: mpsc::Receiver<Vec<u8>>,
    exit: ExitWatch,
    events: mpsc::Sender<BridgeEvent>,
    cancel: CancellationToken,
    status: Arc<watch::Sender<SessionStatus>>,
    exit_reported: Arc<AtomicBool>,
    drain_timeout: Duration,
}

impl OutputForwarder {
    async fn run(mut self) {
        let session = self.session;
        let mut drain_deadline: Option<Instant> = None;
        let mut exit = self.exit.clone();

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                chunk = self.output.recv() => match chunk {
                    Some(data) => {
                        let event = BridgeEvent::Output { session, data };
                        tokio::select! {
                            biased;
                            _ = self.cancel.cancelled() => return,
                            sent = self.events.send(event) => {
                                if sent.is_err() {
                                    debug!(%session, "Event queue closed, stopping forwarder");
                                    return;
                                }
                            }
                        }
                    }
                    None => break,
                },
                _ = exit.wait(), if drain_deadline.is_none() => {
                    // Child is gone; give its last writes a moment to arrive
                    drain_deadline = Some(Instant::now() + self.drain_timeout);
                }
                _ = sleep_until_opt(drain_deadline) => {
                    debug!(%session, "Output still open after exit, giving up on drain");
                    break;
                }
            }
        }

        let status = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return,
            status = self.exit.wait() => status,
        };

        self.status.send_replace(SessionStatus::from_exit(&status));
        if self.exit_reported.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(%session, "Demo exited: {}", status);
        let _ = self
            .events
            .send(BridgeEvent::Exited { session, status })
            .await;
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Owns the single live session of one connection.
pub struct SessionManager {
    launcher: Arc<dyn Launcher>,
    events: mpsc::Sender<BridgeEvent>,
    settings: SessionSettings,
    /// Held across retire + spawn so concurrent starts serialize
    active: Mutex<Option<Session>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl SessionManager {
    pub fn new(
        launcher: Arc<dyn Launcher>,
        events: mpsc::Sender<BridgeEvent>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            launcher,
            events,
            settings,
            active: Mutex::new(None),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Start `demo` at exactly `cols` x `rows`, replacing any current session.
    ///
    /// Invalid dimensions or an unknown demo are rejected before the current
    /// session is touched. A spawn failure after the old session has been
    /// retired leaves the connection with no session.
    pub async fn start_demo(
        &self,
        demo: &str,
        cols: i64,
        rows: i64,
    ) -> Result<SessionInfo, BridgeError> {
        let mut active = self.active.lock().await;
        if self.closed.load(Ordering::SeqCst) {
            return Err(BridgeError::ConnectionClosed);
        }

        let size = TermSize::new(cols, rows)?;
        self.launcher.check(demo)?;

        if let Some(previous) = active.take() {
            info!(session = %previous.id, "Replacing '{}' with '{}'", previous.demo, demo);
            self.retire(previous, false).await;
        }

        let id = SessionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let Spawned { handle, output } = self.launcher.launch(demo, size)?;
        let mut session = Session::new(id, demo, size, handle);

        // `started` must reach the writer before any of this child's output
        if self
            .events
            .send(BridgeEvent::Started {
                session: id,
                demo: demo.to_string(),
            })
            .await
            .is_err()
        {
            debug!(session = %id, "Event queue closed before start was announced");
        }

        session.attach_forwarder(self.events.clone(), output, self.settings.drain_timeout);
        info!(session = %id, "Started demo '{}' at {} (pid {:?})", demo, size, session.process.pid());

        let info = session.info();
        *active = Some(session);
        Ok(info)
    }

    /// Deliver keystrokes to the live child. Without one this does nothing.
    pub async fn forward_input(&self, data: &[u8]) {
        let active = self.active.lock().await;
        let Some(session) = active.as_ref() else {
            debug!("Dropping {} bytes of input: no session", data.len());
            return;
        };
        if session.status().is_terminal() {
            debug!(session = %session.id, "Dropping input for exited demo");
            return;
        }

        match session.process.write(data) {
            Ok(_) => {}
            Err(LaunchError::InputFull) => {
                warn!(session = %session.id, "Demo is not reading input, dropping keystrokes")
            }
            Err(e) => debug!(session = %session.id, "Input not delivered: {}", e),
        }
    }

    /// Record a resize request and pass it on to the child.
    ///
    /// Returns whether the child can observe the new size. Only dimension
    /// validation is an error; the resize itself is best-effort.
    pub async fn forward_resize(&self, cols: i64, rows: i64) -> Result<bool, BridgeError> {
        let size = TermSize::new(cols, rows)?;
        let mut active = self.active.lock().await;
        let Some(session) = active.as_mut() else {
            return Ok(false);
        };

        session.requested_size = Some(size);
        match session.process.resize(size).await {
            Ok(applied) => {
                debug!(session = %session.id, "Resize to {} applied: {}", size, applied);
                Ok(applied)
            }
            Err(e) => {
                warn!(session = %session.id, "Resize to {} failed: {}", size, e);
                Ok(false)
            }
        }
    }

    /// Terminate the live session and report its exit, unless the exit was
    /// already reported. Calling this with no session does nothing.
    pub async fn stop(&self) -> Option<ExitStatus> {
        let previous = self.active.lock().await.take();
        match previous {
            Some(session) => {
                info!(session = %session.id, "Stopping demo '{}'", session.demo);
                self.retire(session, true).await
            }
            None => None,
        }
    }

    /// Connection is going away: kill the child without reporting anything
    /// and refuse further starts.
    pub async fn teardown(&self) {
        let mut active = self.active.lock().await;
        self.closed.store(true, Ordering::SeqCst);
        if let Some(session) = active.take() {
            debug!(session = %session.id, "Tearing down demo '{}'", session.demo);
            self.retire(session, false).await;
        }
    }

    pub async fn has_session(&self) -> bool {
        self.active.lock().await.is_some()
    }

    pub async fn info(&self) -> Option<SessionInfo> {
        self.active.lock().await.as_ref().map(Session::info)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Cancel forwarding, kill the process and wait (bounded) for it to be
    /// reaped. When `report` is set, an exit event is emitted unless the
    /// forwarder already sent one.
    async fn retire(&self, mut session: Session, report: bool) -> Option<ExitStatus> {
        session.cancel.cancel();
        session.process.kill().await;

        let status = match timeout(self.settings.exit_timeout, session.process.wait()).await {
            Ok(status) => Some(status),
            Err(_) => {
                warn!(
                    session = %session.id,
                    "Demo '{}' not reaped within {:?}", session.demo, self.settings.exit_timeout
                );
                None
            }
        };

        if let Some(mut forwarder) = session.forwarder.take() {
            // A forwarder mid-way through reporting the exit gets to finish
            if timeout(self.settings.exit_timeout, &mut forwarder).await.is_err() {
                warn!(session = %session.id, "Output forwarder did not stop in time");
                forwarder.abort();
            }
        }

        if let Some(status) = &status {
            session.status.send_replace(SessionStatus::from_exit(status));
        }

        if report && !session.exit_reported.swap(true, Ordering::SeqCst) {
            let status = status.unwrap_or_else(ExitStatus::unknown);
            let _ = self
                .events
                .send(BridgeEvent::Exited {
                    session: session.id,
                    status,
                })
                .await;
        }

        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use demo_launcher::{DemoRegistry, LaunchOptions, LaunchSpec, NativeLauncher};

    fn sh(script: &str) -> LaunchSpec {
        LaunchSpec::new("/bin/sh").args(["-c", script])
    }

    fn manager() -> (SessionManager, mpsc::Receiver<BridgeEvent>) {
        let registry: DemoRegistry = [
            ("hello".to_string(), sh("echo hello")),
            ("sleeper".to_string(), sh("echo ready; exec sleep 30")),
            ("cat".to_string(), LaunchSpec::new("/bin/cat")),
            ("size".to_string(), sh("echo \"$COLUMNS x $LINES\"")),
            ("broken".to_string(), LaunchSpec::new("/nonexistent/demo")),
            (
                "forker".to_string(),
                sh("sleep 30 >/dev/null 2>&1 & echo $!"),
            ),
        ]
        .into_iter()
        .collect();
        let launcher = NativeLauncher::new(
            Arc::new(registry),
            LaunchOptions {
                kill_grace: Duration::from_millis(200),
                ..Default::default()
            },
        );
        let (tx, rx) = mpsc::channel(64);
        (
            SessionManager::new(Arc::new(launcher), tx, SessionSettings::default()),
            rx,
        )
    }

    async fn next_event(rx: &mut mpsc::Receiver<BridgeEvent>) -> BridgeEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    /// Collect output for `session` until it contains `needle`
    async fn read_output(
        rx: &mut mpsc::Receiver<BridgeEvent>,
        session: SessionId,
        needle: &str,
    ) -> String {
        let mut seen = String::new();
        while !seen.contains(needle) {
            match next_event(rx).await {
                BridgeEvent::Output { session: s, data } if s == session => {
                    seen.push_str(&String::from_utf8_lossy(&data))
                }
                other => panic!("unexpected event {other:?} while waiting for {needle:?}"),
            }
        }
        seen
    }

    #[tokio::test]
    async fn test_started_precedes_output_and_exit() {
        let (manager, mut rx) = manager();
        let info = manager.start_demo("hello", 40, 20).await.unwrap();
        assert_eq!(info.size, TermSize { cols: 40, rows: 20 });

        assert_eq!(
            next_event(&mut rx).await,
            BridgeEvent::Started {
                session: info.id,
                demo: "hello".into()
            }
        );
        assert_eq!(read_output(&mut rx, info.id, "hello").await, "hello\n");

        match next_event(&mut rx).await {
            BridgeEvent::Exited { session, status } => {
                assert_eq!(session, info.id);
                assert!(status.success());
            }
            other => panic!("expected exit, got {other:?}"),
        }
        assert_eq!(manager.info().await.unwrap().status, SessionStatus::Exited);
    }

    #[tokio::test]
    async fn test_size_reaches_child_environment() {
        let (manager, mut rx) = manager();
        let info = manager.start_demo("size", 33, 11).await.unwrap();
        next_event(&mut rx).await;
        assert_eq!(read_output(&mut rx, info.id, "\n").await, "33 x 11\n");
    }

    #[tokio::test]
    async fn test_invalid_dimensions_leave_session_untouched() {
        let (manager, mut rx) = manager();
        let info = manager.start_demo("sleeper", 80, 24).await.unwrap();
        next_event(&mut rx).await;

        let err = manager.start_demo("hello", 0, 24).await.unwrap_err();
        assert_eq!(err.error_code(), "invalid_dimensions");
        let err = manager.start_demo("hello", 80, 70000).await.unwrap_err();
        assert_eq!(err.error_code(), "invalid_dimensions");

        let current = manager.info().await.unwrap();
        assert_eq!(current.id, info.id);
        assert_eq!(current.status, SessionStatus::Running);
        manager.teardown().await;
    }

    #[tokio::test]
    async fn test_unknown_demo_spawns_nothing() {
        let (manager, _rx) = manager();
        let err = manager.start_demo("nope", 80, 24).await.unwrap_err();
        assert_eq!(err, BridgeError::Launch(LaunchError::UnknownDemo("nope".into())));
        assert!(!manager.has_session().await);
    }

    #[tokio::test]
    async fn test_spawn_failure_after_replace_leaves_no_session() {
        let (manager, mut rx) = manager();
        manager.start_demo("sleeper", 80, 24).await.unwrap();
        next_event(&mut rx).await;

        let err = manager.start_demo("broken", 80, 24).await.unwrap_err();
        assert_eq!(err.error_code(), "spawn_failed");
        assert!(!manager.has_session().await);
    }

    #[tokio::test]
    async fn test_replace_kills_previous_child() {
        let (manager, mut rx) = manager();
        let first = manager.start_demo("sleeper", 80, 24).await.unwrap();
        assert!(matches!(next_event(&mut rx).await, BridgeEvent::Started { .. }));
        read_output(&mut rx, first.id, "ready").await;

        let second = manager.start_demo("hello", 80, 24).await.unwrap();
        assert_ne!(first.id, second.id);

        #[cfg(unix)]
        {
            let pid = nix::unistd::Pid::from_raw(first.pid.unwrap() as i32);
            assert_eq!(
                nix::sys::signal::kill(pid, None),
                Err(nix::errno::Errno::ESRCH),
                "previous child must be gone before the next one starts"
            );
        }

        // Nothing from the first session follows the second `started`
        loop {
            match next_event(&mut rx).await {
                BridgeEvent::Started { session, .. } => {
                    assert_eq!(session, second.id);
                    break;
                }
                BridgeEvent::Output { session, .. } => assert_eq!(session, first.id),
                other => panic!("unexpected event {other:?}"),
            }
        }
        loop {
            match next_event(&mut rx).await {
                BridgeEvent::Output { session, .. } => assert_eq!(session, second.id),
                BridgeEvent::Exited { session, .. } => {
                    assert_eq!(session, second.id);
                    break;
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_stop_reports_exit_once() {
        let (manager, mut rx) = manager();
        let info = manager.start_demo("sleeper", 80, 24).await.unwrap();
        next_event(&mut rx).await;
        read_output(&mut rx, info.id, "ready").await;

        let status = manager.stop().await.expect("child should be reaped");
        assert!(status.is_crash());

        match next_event(&mut rx).await {
            BridgeEvent::Exited { session, status } => {
                assert_eq!(session, info.id);
                assert_eq!(status.code, None);
            }
            other => panic!("expected exit, got {other:?}"),
        }

        // Second stop is a no-op
        assert_eq!(manager.stop().await, None);
        assert!(
            tokio::time::timeout(Duration::from_millis(200), rx.recv())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_stop_after_natural_exit_does_not_duplicate() {
        let (manager, mut rx) = manager();
        let info = manager.start_demo("hello", 80, 24).await.unwrap();
        next_event(&mut rx).await;
        read_output(&mut rx, info.id, "hello").await;
        assert!(matches!(next_event(&mut rx).await, BridgeEvent::Exited { .. }));

        manager.stop().await;
        assert!(
            tokio::time::timeout(Duration::from_millis(200), rx.recv())
                .await
                .is_err()
        );

        // The dead session does not get in the way of the next one
        let next = manager.start_demo("hello", 80, 24).await.unwrap();
        assert_ne!(next.id, info.id);
        assert_eq!(
            next_event(&mut rx).await,
            BridgeEvent::Started {
                session: next.id,
                demo: "hello".into()
            }
        );
        assert_eq!(read_output(&mut rx, next.id, "hello").await, "hello\n");
        assert!(matches!(
            next_event(&mut rx).await,
            BridgeEvent::Exited { session, .. } if session == next.id
        ));
    }

    /// Alive and not a zombie waiting for its new parent to reap it
    #[cfg(target_os = "linux")]
    fn is_running(pid: i32) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => stat
                .rsplit_once(')')
                .map(|(_, rest)| !rest.trim_start().starts_with('Z'))
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_teardown_kills_what_an_exited_demo_left_behind() {
        let (manager, mut rx) = manager();
        let info = manager.start_demo("forker", 80, 24).await.unwrap();
        next_event(&mut rx).await;
        let line = read_output(&mut rx, info.id, "\n").await;
        let orphan: i32 = line.trim().parse().unwrap();
        assert!(matches!(next_event(&mut rx).await, BridgeEvent::Exited { .. }));
        assert!(is_running(orphan));

        manager.teardown().await;

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while is_running(orphan) {
            assert!(
                tokio::time::Instant::now() < deadline,
                "background process {orphan} outlived teardown"
            );
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    #[tokio::test]
    async fn test_input_reaches_child() {
        let (manager, mut rx) = manager();
        let info = manager.start_demo("cat", 80, 24).await.unwrap();
        next_event(&mut rx).await;

        manager.forward_input(b"echo me\n").await;
        assert_eq!(read_output(&mut rx, info.id, "\n").await, "echo me\n");
        manager.teardown().await;
    }

    #[tokio::test]
    async fn test_input_without_session_is_noop() {
        let (manager, mut rx) = manager();
        manager.forward_input(b"lost").await;
        assert!(!manager.has_session().await);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_resize_is_recorded() {
        let (manager, mut rx) = manager();
        assert_eq!(manager.forward_resize(100, 30).await, Ok(false));

        manager.start_demo("sleeper", 80, 24).await.unwrap();
        next_event(&mut rx).await;

        // Pipes cannot carry a window size to the child
        assert_eq!(manager.forward_resize(100, 30).await, Ok(false));
        let info = manager.info().await.unwrap();
        assert_eq!(info.size, TermSize { cols: 80, rows: 24 });
        assert_eq!(info.requested_size, Some(TermSize { cols: 100, rows: 30 }));

        let err = manager.forward_resize(-1, 30).await.unwrap_err();
        assert_eq!(err.error_code(), "invalid_dimensions");
        manager.teardown().await;
    }

    #[tokio::test]
    async fn test_teardown_is_silent_and_final() {
        let (manager, mut rx) = manager();
        let info = manager.start_demo("sleeper", 80, 24).await.unwrap();
        next_event(&mut rx).await;
        read_output(&mut rx, info.id, "ready").await;

        manager.teardown().await;
        assert!(manager.is_closed());
        assert!(!manager.has_session().await);
        assert!(
            tokio::time::timeout(Duration::from_millis(200), rx.recv())
                .await
                .is_err(),
            "teardown must not emit events"
        );

        assert_eq!(
            manager.start_demo("hello", 80, 24).await.unwrap_err(),
            BridgeError::ConnectionClosed
        );
    }

    #[tokio::test]
    async fn test_concurrent_starts_leave_one_session() {
        let (manager, mut rx) = manager();
        let manager = Arc::new(manager);

        let a = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.start_demo("sleeper", 80, 24).await })
        };
        let b = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.start_demo("sleeper", 80, 24).await })
        };
        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();

        let live = manager.info().await.unwrap();
        let (loser, winner) = if live.id == a.id { (b, a) } else { (a, b) };
        assert_eq!(live.id, winner.id);

        #[cfg(unix)]
        {
            let pid = nix::unistd::Pid::from_raw(loser.pid.unwrap() as i32);
            assert_eq!(nix::sys::signal::kill(pid, None), Err(nix::errno::Errno::ESRCH));
        }

        manager.teardown().await;
        while rx.try_recv().is_ok() {}
    }
}
