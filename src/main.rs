use sandbench::kernel::services::adapters::{
    load_config, load_mount_tree, JsonPreferenceStore, LocalSandbox, MemoryPreferenceStore,
    RecordingCodeIntel, StdoutTerminal, TokioExecutor,
};
use sandbench::kernel::services::ports::PreferenceStore;
use sandbench::{SessionContext, Workbench};
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

mod logging;

const USAGE: &str = "usage: sandbench <project-dir> [--scratch=<dir>]";

enum Shutdown {
    Signal(u8),
    Quit,
}

struct Args {
    project: PathBuf,
    scratch: Option<PathBuf>,
}

fn parse_args() -> Option<Args> {
    let mut project = None;
    let mut scratch = None;
    for arg in std::env::args().skip(1) {
        if let Some(value) = arg.strip_prefix("--scratch=") {
            scratch = Some(PathBuf::from(value));
        } else if project.is_none() && !arg.starts_with("--") {
            project = Some(PathBuf::from(arg));
        } else {
            return None;
        }
    }
    Some(Args {
        project: project?,
        scratch,
    })
}

fn main() -> ExitCode {
    let Some(args) = parse_args() else {
        eprintln!("{USAGE}");
        return ExitCode::from(2);
    };
    let _logging = logging::init();

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "sandbench failed");
            eprintln!("sandbench: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> io::Result<ExitCode> {
    let config = load_config(&args.project).map_err(io::Error::other)?;
    let files = load_mount_tree(&args.project)?;
    let scratch = args.scratch.unwrap_or_else(|| {
        std::env::temp_dir().join(format!("sandbench-{}", std::process::id()))
    });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()?;

    let preferences: Arc<dyn PreferenceStore> = match JsonPreferenceStore::open_default() {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::warn!(error = %e, "preferences are not persisted");
            Arc::new(MemoryPreferenceStore::new())
        }
    };
    let ctx = SessionContext::new(
        Arc::new(LocalSandbox::new(scratch.clone())?),
        Arc::new(StdoutTerminal),
        Arc::new(RecordingCodeIntel::new()),
        preferences,
        Arc::new(TokioExecutor::new(runtime.handle().clone())),
    )
    .with_config(config);
    let workbench = Workbench::new(ctx);

    let (shutdown_tx, shutdown_rx) = mpsc::channel();
    install_termination_signals(shutdown_tx.clone())?;

    tracing::info!(project = %args.project.display(), scratch = %scratch.display(), "starting workspace");
    let ready = match runtime.block_on(workbench.start(&files)) {
        Ok(ready) => ready,
        Err(e) => {
            eprintln!("sandbench: {e}");
            return Ok(ExitCode::FAILURE);
        }
    };
    eprintln!("ready on port {}: {}", ready.port, ready.url);

    spawn_console(&workbench, shutdown_tx);
    let code = match shutdown_rx.recv() {
        Ok(Shutdown::Signal(code)) => ExitCode::from(code),
        Ok(Shutdown::Quit) | Err(_) => ExitCode::SUCCESS,
    };

    drop(workbench);
    runtime.shutdown_timeout(Duration::from_secs(2));
    Ok(code)
}

/// Forwards stdin to the workspace shell. `:url`, `:restart` and `:quit`
/// are handled here; end of input leaves the workspace running.
fn spawn_console(workbench: &Workbench, shutdown: mpsc::Sender<Shutdown>) {
    let session = workbench.session().clone();
    let workspace = workbench.workspace().clone();
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            match line.trim() {
                ":quit" => {
                    let _ = shutdown.send(Shutdown::Quit);
                    return;
                }
                ":url" => match workspace.live_url(session.base_url().as_deref()) {
                    Some(url) => eprintln!("{url}"),
                    None => eprintln!("{}", session.progress_message().unwrap_or("not running")),
                },
                ":restart" => {
                    if session.restart() {
                        session.on_frame();
                    }
                }
                _ => {
                    if !session.terminal_input(&format!("{line}\n")) {
                        tracing::warn!("shell is not running");
                    }
                }
            }
        }
        tracing::debug!("console input closed");
    });
}

#[cfg(unix)]
fn install_termination_signals(tx: mpsc::Sender<Shutdown>) -> io::Result<()> {
    use signal_hook::consts::signal::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    std::thread::spawn(move || {
        for sig in signals.forever() {
            let code = match sig {
                SIGINT => 130,
                SIGTERM => 143,
                _ => continue,
            };
            tracing::info!(signal = sig, "terminating");
            let _ = tx.send(Shutdown::Signal(code));

            // Still starting up: the main thread is not listening yet.
            std::thread::sleep(Duration::from_secs(2));
            std::process::exit(i32::from(code));
        }
    });
    Ok(())
}

#[cfg(not(unix))]
fn install_termination_signals(_tx: mpsc::Sender<Shutdown>) -> io::Result<()> {
    Ok(())
}
