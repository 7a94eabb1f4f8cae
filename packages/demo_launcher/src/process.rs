use std::fmt;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, warn};

use crate::error::LaunchError;
use crate::launcher::LaunchOptions;
use crate::registry::LaunchSpec;
use crate::size::TermSize;

/// Keystrokes queued for a child that is not reading them yet
const INPUT_QUEUE: usize = 64;

/// How a demo process ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExitStatus {
    /// Exit code, `None` when the process was terminated by a signal
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Non-zero exit or death by signal
    pub fn is_crash(&self) -> bool {
        !self.success()
    }

    /// Status of a process whose end could not be observed
    pub fn unknown() -> Self {
        Self {
            code: None,
            signal: None,
        }
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {}", code),
            (None, Some(signal)) => write!(f, "signal {}", signal),
            (None, None) => write!(f, "unknown status"),
        }
    }
}

/// Read-only view of a process's exit.
#[derive(Clone, Debug)]
pub struct ExitWatch {
    rx: watch::Receiver<Option<ExitStatus>>,
}

impl ExitWatch {
    pub(crate) fn new(rx: watch::Receiver<Option<ExitStatus>>) -> Self {
        Self { rx }
    }

    pub fn current(&self) -> Option<ExitStatus> {
        *self.rx.borrow()
    }

    /// Resolve once the process has been reaped.
    pub async fn wait(&mut self) -> ExitStatus {
        let seen = self.rx.wait_for(Option::is_some).await.map(|status| *status);
        match seen {
            Ok(Some(status)) => status,
            _ => self.current().unwrap_or_else(ExitStatus::unknown),
        }
    }
}

/// Control messages handled by a process actor
pub(crate) enum ProcessMessage {
    Resize {
        size: TermSize,
        respond_to: oneshot::Sender<Result<bool, LaunchError>>,
    },
    Kill,
}

/// Exclusive handle to a running demo process.
///
/// Dropping the handle terminates the process.
#[derive(Debug)]
pub struct ProcessHandle {
    control: mpsc::Sender<ProcessMessage>,
    input: mpsc::Sender<Vec<u8>>,
    exit: ExitWatch,
    pid: Option<u32>,
}

impl fmt::Debug for ProcessMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resize { size, .. } => write!(f, "Resize({})", size),
            Self::Kill => write!(f, "Kill"),
        }
    }
}

impl ProcessHandle {
    pub(crate) fn new(
        control: mpsc::Sender<ProcessMessage>,
        input: mpsc::Sender<Vec<u8>>,
        exit: ExitWatch,
        pid: Option<u32>,
    ) -> Self {
        Self {
            control,
            input,
            exit,
            pid,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Queue bytes for the child's stdin. Never waits on the child.
    pub fn write(&self, data: &[u8]) -> Result<usize, LaunchError> {
        match self.input.try_send(data.to_vec()) {
            Ok(()) => Ok(data.len()),
            Err(TrySendError::Closed(_)) => Err(LaunchError::InputClosed),
            Err(TrySendError::Full(_)) => Err(LaunchError::InputFull),
        }
    }

    /// Ask the process to adopt a new size. Returns whether the child can
    /// observe it (only a PTY can); `false` once the process is gone.
    pub async fn resize(&self, size: TermSize) -> Result<bool, LaunchError> {
        let (tx, rx) = oneshot::channel();
        if self
            .control
            .send(ProcessMessage::Resize {
                size,
                respond_to: tx,
            })
            .await
            .is_err()
        {
            return Ok(false);
        }
        rx.await.unwrap_or(Ok(false))
    }

    /// Terminate the process and anything left in its process group. Safe
    /// to call any number of times, including after the process has exited.
    pub async fn kill(&self) {
        if self.control.send(ProcessMessage::Kill).await.is_err() {
            debug!("Kill requested for pid {:?} after its actor stopped", self.pid);
        }
    }

    pub async fn wait(&self) -> ExitStatus {
        self.exit.clone().wait().await
    }

    pub fn try_status(&self) -> Option<ExitStatus> {
        self.exit.current()
    }

    pub fn exit_watch(&self) -> ExitWatch {
        self.exit.clone()
    }
}

/// A freshly started process and the merged stdout+stderr stream.
#[derive(Debug)]
pub struct Spawned {
    pub handle: ProcessHandle,
    pub output: mpsc::Receiver<Vec<u8>>,
}

/// Escalation state shared by both actor flavors
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum KillState {
    Alive,
    Terminating { deadline: Instant },
    Killed,
}

impl KillState {
    pub(crate) fn deadline(&self) -> Option<Instant> {
        match self {
            Self::Terminating { deadline } => Some(*deadline),
            _ => None,
        }
    }
}

pub(crate) async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Send `signal` to the whole process group led by `pid`.
#[cfg(unix)]
pub(crate) fn signal_group(pid: Option<u32>, signal: nix::sys::signal::Signal) {
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    let Some(pid) = pid else { return };
    if let Err(e) = killpg(Pid::from_raw(pid as i32), signal) {
        // ESRCH: the group is already gone
        debug!("killpg({}, {:?}) failed: {}", pid, signal, e);
    }
}

/// Whether any process still carries the group id `pid`.
#[cfg(unix)]
fn group_has_members(pid: Option<u32>) -> bool {
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    let Some(pid) = pid else { return false };
    killpg(Pid::from_raw(pid as i32), None).is_ok()
}

#[cfg(not(unix))]
fn group_has_members(_pid: Option<u32>) -> bool {
    false
}

fn sweep_group(demo: &str, pid: Option<u32>) {
    debug!("Killing processes left behind by demo '{}' (group {:?})", demo, pid);
    #[cfg(unix)]
    signal_group(pid, nix::sys::signal::Signal::SIGKILL);
}

/// Keep answering a handle after the group leader was reaped.
///
/// Children the demo forked stay in its process group; they are killed when
/// a kill was already requested, on a later kill, or once the handle is
/// dropped. Returns at once when the group is empty, since its id may then
/// be reused.
pub(crate) async fn serve_reaped(
    demo: &str,
    pid: Option<u32>,
    receiver: &mut mpsc::Receiver<ProcessMessage>,
    kill_requested: bool,
    detached: bool,
) {
    if !group_has_members(pid) {
        return;
    }
    if kill_requested || detached {
        sweep_group(demo, pid);
        if detached {
            return;
        }
    }

    while let Some(msg) = receiver.recv().await {
        match msg {
            ProcessMessage::Resize { respond_to, .. } => {
                let _ = respond_to.send(Ok(false));
            }
            ProcessMessage::Kill => sweep_group(demo, pid),
        }
    }
    sweep_group(demo, pid);
}

pub(crate) fn spawn_piped(
    demo: &str,
    spec: &LaunchSpec,
    size: TermSize,
    options: &LaunchOptions,
) -> Result<Spawned, LaunchError> {
    let mut std_cmd = std::process::Command::new(&spec.command);
    std_cmd
        .args(spec.expand_args(size))
        .envs(spec.environment(size))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    if let Some(dir) = &spec.cwd {
        std_cmd.current_dir(dir);
    }

    // Own process group so a kill also reaches anything the demo forks
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        std_cmd.process_group(0);
    }

    let mut cmd = Command::from(std_cmd);
    cmd.kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| {
        error!("Failed to spawn demo '{}' ({}): {}", demo, spec.command, e);
        LaunchError::spawn_failed(demo, e)
    })?;

    let pid = child.id();
    info!("Demo '{}' started with PID {:?} at {}", demo, pid, size);

    let (output_tx, output_rx) = mpsc::channel(options.output_capacity.max(1));
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(pump_output(stdout, output_tx.clone(), options.read_chunk));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(pump_output(stderr, output_tx, options.read_chunk));
    }

    let (input_tx, input_rx) = mpsc::channel(INPUT_QUEUE);
    if let Some(stdin) = child.stdin.take() {
        tokio::spawn(feed_stdin(stdin, input_rx));
    }

    let (control_tx, control_rx) = mpsc::channel(32);
    let (exit_tx, exit_rx) = watch::channel(None);

    let actor = PipedActor {
        demo: demo.to_string(),
        child,
        pid,
        receiver: control_rx,
        exit_tx,
        kill_grace: options.kill_grace,
    };
    tokio::spawn(actor.run());

    Ok(Spawned {
        handle: ProcessHandle::new(
            control_tx,
            input_tx,
            ExitWatch::new(exit_rx),
            pid,
        ),
        output: output_rx,
    })
}

async fn pump_output<R: AsyncRead + Unpin>(
    mut reader: R,
    tx: mpsc::Sender<Vec<u8>>,
    chunk: usize,
) {
    let mut buffer = vec![0u8; chunk.max(1)];
    loop {
        match reader.read(&mut buffer).await {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(buffer[..n].to_vec()).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!("Error reading demo output: {}", e);
                break;
            }
        }
    }
}

async fn feed_stdin(mut stdin: ChildStdin, mut rx: mpsc::Receiver<Vec<u8>>) {
    while let Some(data) = rx.recv().await {
        if let Err(e) = stdin.write_all(&data).await {
            debug!("Demo stdin closed: {}", e);
            break;
        }
        if stdin.flush().await.is_err() {
            break;
        }
    }
}

/// Owns a piped child until it has been reaped
struct PipedActor {
    demo: String,
    child: Child,
    pid: Option<u32>,
    receiver: mpsc::Receiver<ProcessMessage>,
    exit_tx: watch::Sender<Option<ExitStatus>>,
    kill_grace: Duration,
}

impl PipedActor {
    async fn run(mut self) {
        let mut kill = KillState::Alive;
        let mut detached = false;

        let status = loop {
            tokio::select! {
                status = self.child.wait() => {
                    break match status {
                        Ok(status) => ExitStatus::from(status),
                        Err(e) => {
                            warn!("Failed to wait for demo '{}': {}", self.demo, e);
                            ExitStatus::unknown()
                        }
                    };
                }
                msg = self.receiver.recv(), if !detached => match msg {
                    Some(ProcessMessage::Resize { size, respond_to }) => {
                        debug!("Demo '{}' has no TTY, recording size {} only", self.demo, size);
                        let _ = respond_to.send(Ok(false));
                    }
                    Some(ProcessMessage::Kill) => self.terminate(&mut kill),
                    None => {
                        // Handle dropped: nobody can stop this child any more
                        detached = true;
                        self.terminate(&mut kill);
                    }
                },
                _ = sleep_until_opt(kill.deadline()) => {
                    warn!("Demo '{}' ignored SIGTERM, killing", self.demo);
                    self.force_kill();
                    kill = KillState::Killed;
                }
            }
        };

        info!("Demo '{}' (PID {:?}) exited: {}", self.demo, self.pid, status);
        let _ = self.exit_tx.send(Some(status));

        serve_reaped(
            &self.demo,
            self.pid,
            &mut self.receiver,
            kill != KillState::Alive,
            detached,
        )
        .await;
    }

    fn terminate(&mut self, kill: &mut KillState) {
        if *kill != KillState::Alive {
            return;
        }

        #[cfg(unix)]
        signal_group(self.pid, nix::sys::signal::Signal::SIGTERM);
        #[cfg(not(unix))]
        {
            let _ = self.child.start_kill();
        }

        *kill = KillState::Terminating {
            deadline: Instant::now() + self.kill_grace,
        };
    }

    fn force_kill(&mut self) {
        #[cfg(unix)]
        signal_group(self.pid, nix::sys::signal::Signal::SIGKILL);
        if let Err(e) = self.child.start_kill() {
            debug!("start_kill for demo '{}' failed: {}", self.demo, e);
        }
    }
}
