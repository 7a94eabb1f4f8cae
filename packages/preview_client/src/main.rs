use anyhow::{Context, Result, bail};
use clap::Parser;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use preview_client::{AnsiSurface, PreviewInput, fetch_demos, run_preview};

const DETACH_BYTE: u8 = 0x1D; // Ctrl-]

#[derive(Parser)]
#[command(name = "demo-preview")]
#[command(about = "Run a demo from a demo bridge in this terminal")]
struct Args {
    /// Demo to start
    demo: Option<String>,

    /// Bridge WebSocket URL
    #[arg(short, long, default_value = "ws://127.0.0.1:7681/ws")]
    url: String,

    /// Columns to start the demo with (defaults to this terminal's width)
    #[arg(long)]
    cols: Option<u16>,

    /// Rows to start the demo with (defaults to this terminal's height)
    #[arg(long)]
    rows: Option<u16>,

    /// List the available demos and exit
    #[arg(short, long)]
    list: bool,

    /// Enable debug logging (to stderr)
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_directive = if args.debug {
        "preview_client=debug,demo_preview=debug,warn"
    } else {
        "warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();

    if args.list {
        let demos = fetch_demos(&args.url)
            .await
            .with_context(|| format!("Failed to reach bridge at {}", args.url))?;
        for demo in demos {
            println!("{demo}");
        }
        return Ok(());
    }

    let Some(demo) = args.demo else {
        bail!("No demo given; use --list to see what the bridge offers");
    };

    let (term_cols, term_rows) = tty::terminal_size().unwrap_or((80, 24));
    let cols = args.cols.unwrap_or(term_cols);
    let rows = args.rows.unwrap_or(term_rows);

    let (input_tx, input_rx) = mpsc::channel::<PreviewInput>(64);
    let stdin_shutdown = Arc::new(AtomicBool::new(false));

    let guard = tty::TerminalGuard::new();
    guard.enter_raw_mode();
    tty::spawn_stdin_reader(input_tx.clone(), stdin_shutdown.clone());
    #[cfg(unix)]
    tokio::spawn(tty::forward_window_changes(input_tx));
    #[cfg(not(unix))]
    drop(input_tx);

    let surface = AnsiSurface::new(std::io::stdout(), cols, rows);
    let result = run_preview(&args.url, &demo, surface, input_rx).await;

    stdin_shutdown.store(true, Ordering::Relaxed);
    drop(guard);

    let (outcome, _) = result.with_context(|| format!("Preview of '{demo}' failed"))?;
    eprintln!("\r\n[demo-preview: {demo} {outcome}]");
    Ok(())
}

#[cfg(unix)]
mod tty {
    use anyhow::Result;
    use nix::libc;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::mpsc;

    use super::DETACH_BYTE;
    use preview_client::PreviewInput;

    /// Saves terminal settings and restores them on drop.
    pub struct TerminalGuard {
        original: Option<nix::sys::termios::Termios>,
    }

    impl TerminalGuard {
        pub fn new() -> Self {
            use nix::sys::termios;
            let stdin = std::io::stdin();
            let original = termios::tcgetattr(&stdin).ok();
            Self { original }
        }

        pub fn enter_raw_mode(&self) {
            if let Some(ref original) = self.original {
                use nix::sys::termios;
                let stdin = std::io::stdin();
                let mut raw = original.clone();
                termios::cfmakeraw(&mut raw);
                let _ = termios::tcsetattr(&stdin, termios::SetArg::TCSANOW, &raw);
            }
        }
    }

    impl Drop for TerminalGuard {
        fn drop(&mut self) {
            if let Some(ref original) = self.original {
                use nix::sys::termios;
                let stdin = std::io::stdin();
                let _ = termios::tcsetattr(&stdin, termios::SetArg::TCSANOW, original);
            }
        }
    }

    /// `(cols, rows)` of the terminal on stdout
    pub fn terminal_size() -> Result<(u16, u16)> {
        let mut ws = libc::winsize {
            ws_row: 0,
            ws_col: 0,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        let ret = unsafe { libc::ioctl(libc::STDOUT_FILENO, libc::TIOCGWINSZ, &mut ws) };
        if ret == -1 || ws.ws_col == 0 || ws.ws_row == 0 {
            anyhow::bail!("ioctl TIOCGWINSZ failed");
        }
        Ok((ws.ws_col, ws.ws_row))
    }

    /// Read stdin on a blocking thread. Ctrl-] ends input, which detaches.
    pub fn spawn_stdin_reader(tx: mpsc::Sender<PreviewInput>, shutdown: Arc<AtomicBool>) {
        std::thread::spawn(move || {
            use std::io::Read;
            use std::os::fd::AsRawFd;
            let stdin = std::io::stdin();
            let stdin_fd = stdin.as_raw_fd();
            let mut buf = [0u8; 4096];
            loop {
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }
                // Poll with a timeout so the shutdown flag is noticed
                let mut pfd = libc::pollfd {
                    fd: stdin_fd,
                    events: libc::POLLIN,
                    revents: 0,
                };
                let ret = unsafe { libc::poll(&mut pfd, 1, 100) };
                if ret <= 0 {
                    continue;
                }
                let n = match stdin.lock().read(&mut buf) {
                    Ok(0) | Err(_) => {
                        let _ = tx.blocking_send(PreviewInput::Detach);
                        break;
                    }
                    Ok(n) => n,
                };

                if let Some(pos) = buf[..n].iter().position(|&b| b == DETACH_BYTE) {
                    if pos > 0 {
                        let _ = tx.blocking_send(PreviewInput::Key(buf[..pos].to_vec()));
                    }
                    let _ = tx.blocking_send(PreviewInput::Detach);
                    break;
                }
                if tx.blocking_send(PreviewInput::Key(buf[..n].to_vec())).is_err() {
                    break;
                }
            }
        });
    }

    /// Report SIGWINCH as resize requests. The demo keeps its start size.
    pub async fn forward_window_changes(tx: mpsc::Sender<PreviewInput>) {
        use tokio::signal::unix::{SignalKind, signal};
        let Ok(mut sigwinch) = signal(SignalKind::window_change()) else {
            return;
        };
        while sigwinch.recv().await.is_some() {
            if let Ok((cols, rows)) = terminal_size() {
                if tx.send(PreviewInput::Resize { cols, rows }).await.is_err() {
                    break;
                }
            }
        }
    }
}

#[cfg(not(unix))]
mod tty {
    use anyhow::Result;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;
    use tokio::sync::mpsc;

    use preview_client::PreviewInput;

    pub struct TerminalGuard;

    impl TerminalGuard {
        pub fn new() -> Self {
            Self
        }

        pub fn enter_raw_mode(&self) {}
    }

    pub fn terminal_size() -> Result<(u16, u16)> {
        anyhow::bail!("terminal size is not available on this platform")
    }

    pub fn spawn_stdin_reader(_tx: mpsc::Sender<PreviewInput>, _shutdown: Arc<AtomicBool>) {}
}
