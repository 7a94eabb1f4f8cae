use portable_pty::{Child, ChildKiller, CommandBuilder, MasterPty, PtySize, native_pty_system};
use std::io::{Read, Write};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::LaunchError;
use crate::launcher::LaunchOptions;
use crate::process::{
    ExitStatus, ExitWatch, KillState, ProcessHandle, ProcessMessage, Spawned, serve_reaped,
    sleep_until_opt,
};
use crate::registry::LaunchSpec;
use crate::size::TermSize;

const INPUT_QUEUE: usize = 64;

/// Block until the PTY child is reaped.
///
/// portable-pty folds a signal death into exit code 1, so on unix the child
/// is reaped with `waitpid` to keep the signal number.
#[cfg(unix)]
fn reap(mut child: Box<dyn Child + Send + Sync>) -> ExitStatus {
    use nix::errno::Errno;
    use nix::sys::wait::{WaitStatus, waitpid};
    use nix::unistd::Pid;

    let Some(pid) = child.process_id() else {
        return match child.wait() {
            Ok(status) => ExitStatus {
                code: Some(status.exit_code() as i32),
                signal: None,
            },
            Err(e) => {
                warn!("Failed to wait for PTY child: {}", e);
                ExitStatus::unknown()
            }
        };
    };

    loop {
        match waitpid(Pid::from_raw(pid as i32), None) {
            Ok(WaitStatus::Exited(_, code)) => {
                return ExitStatus {
                    code: Some(code),
                    signal: None,
                };
            }
            Ok(WaitStatus::Signaled(_, signal, _)) => {
                return ExitStatus {
                    code: None,
                    signal: Some(signal as i32),
                };
            }
            Ok(_) | Err(Errno::EINTR) => continue,
            Err(e) => {
                warn!("Failed to wait for PTY child {}: {}", pid, e);
                return ExitStatus::unknown();
            }
        }
    }
}

#[cfg(not(unix))]
fn reap(mut child: Box<dyn Child + Send + Sync>) -> ExitStatus {
    match child.wait() {
        Ok(status) => ExitStatus {
            code: Some(status.exit_code() as i32),
            signal: None,
        },
        Err(e) => {
            warn!("Failed to wait for PTY child: {}", e);
            ExitStatus::unknown()
        }
    }
}

fn pty_size(size: TermSize) -> PtySize {
    PtySize {
        rows: size.rows,
        cols: size.cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

/// Spawn a demo attached to a pseudo-terminal of exactly `size`.
pub(crate) fn spawn_pty(
    demo: &str,
    spec: &LaunchSpec,
    size: TermSize,
    options: &LaunchOptions,
) -> Result<Spawned, LaunchError> {
    let pty_system = native_pty_system();

    let pair = pty_system
        .openpty(pty_size(size))
        .map_err(|e| LaunchError::spawn_failed(demo, format!("failed to open PTY: {e}")))?;

    let mut cmd = CommandBuilder::new(&spec.command);
    for arg in spec.expand_args(size) {
        cmd.arg(arg);
    }

    if let Some(dir) = &spec.cwd {
        info!("Setting working directory: {}", dir.display());
        cmd.cwd(dir);
    }

    for (key, value) in spec.environment(size) {
        cmd.env(key, value);
    }

    let child = pair.slave.spawn_command(cmd).map_err(|e| {
        error!("Failed to spawn demo '{}' ({}): {}", demo, spec.command, e);
        LaunchError::spawn_failed(demo, e)
    })?;
    // Only the child may hold the slave side, or the master never sees EOF
    drop(pair.slave);

    let pid = child.process_id();
    info!("Demo '{}' started on a PTY with PID {:?} at {}", demo, pid, size);

    let mut reader = pair
        .master
        .try_clone_reader()
        .map_err(|e| LaunchError::spawn_failed(demo, format!("failed to clone PTY reader: {e}")))?;
    let mut writer = pair
        .master
        .take_writer()
        .map_err(|e| LaunchError::spawn_failed(demo, format!("failed to take PTY writer: {e}")))?;

    let (output_tx, output_rx) = mpsc::channel(options.output_capacity.max(1));
    let chunk = options.read_chunk.max(1);
    std::thread::spawn(move || {
        let mut buffer = vec![0u8; chunk];
        loop {
            match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => {
                    if output_tx.blocking_send(buffer[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    // EIO once the child side is closed
                    debug!("PTY read ended: {}", e);
                    break;
                }
            }
        }
        debug!("PTY reader thread exiting");
    });

    let (input_tx, mut input_rx) = mpsc::channel::<Vec<u8>>(INPUT_QUEUE);
    std::thread::spawn(move || {
        while let Some(data) = input_rx.blocking_recv() {
            if writer.write_all(&data).and_then(|_| writer.flush()).is_err() {
                break;
            }
        }
    });

    let killer = child.clone_killer();
    let (reaped_tx, reaped_rx) = oneshot::channel();
    std::thread::spawn(move || {
        let _ = reaped_tx.send(reap(child));
    });

    let (control_tx, control_rx) = mpsc::channel(32);
    let (exit_tx, exit_rx) = watch::channel(None);

    let actor = PtyActor {
        demo: demo.to_string(),
        master: pair.master,
        killer,
        pid,
        receiver: control_rx,
        reaped: reaped_rx,
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

/// Owns the PTY master and the kill switch for one child
struct PtyActor {
    demo: String,
    master: Box<dyn MasterPty + Send>,
    killer: Box<dyn ChildKiller + Send + Sync>,
    pid: Option<u32>,
    receiver: mpsc::Receiver<ProcessMessage>,
    reaped: oneshot::Receiver<ExitStatus>,
    exit_tx: watch::Sender<Option<ExitStatus>>,
    kill_grace: Duration,
}

impl PtyActor {
    async fn run(mut self) {
        let mut kill = KillState::Alive;
        let mut detached = false;

        let status = loop {
            tokio::select! {
                status = &mut self.reaped => {
                    break status.unwrap_or_else(|_| ExitStatus::unknown());
                }
                msg = self.receiver.recv(), if !detached => match msg {
                    Some(ProcessMessage::Resize { size, respond_to }) => {
                        let result = self
                            .master
                            .resize(pty_size(size))
                            .map(|_| true)
                            .map_err(|e| LaunchError::ResizeFailed(e.to_string()));
                        let _ = respond_to.send(result);
                    }
                    Some(ProcessMessage::Kill) => self.terminate(&mut kill),
                    None => {
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

        // The PTY child is a session leader, so its pid is also its group id
        #[cfg(unix)]
        crate::process::signal_group(self.pid, nix::sys::signal::Signal::SIGTERM);
        #[cfg(not(unix))]
        {
            let _ = self.killer.kill();
        }

        *kill = KillState::Terminating {
            deadline: Instant::now() + self.kill_grace,
        };
    }

    fn force_kill(&mut self) {
        #[cfg(unix)]
        crate::process::signal_group(self.pid, nix::sys::signal::Signal::SIGKILL);
        if let Err(e) = self.killer.kill() {
            debug!("PTY kill for demo '{}' failed: {}", self.demo, e);
        }
    }
}
