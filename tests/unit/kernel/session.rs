use super::*;
use crate::kernel::services::adapters::ScriptedProcess;
use crate::kernel::services::ports::WorkspaceConfig;
use crate::test_support::{block_on, Harness};

fn tree() -> MountTree {
    MountTree::from_flat([("package.json", "{}"), ("src/app.tsx", "")])
}

fn script_defaults(harness: &Harness) {
    harness.sandbox.script(
        "npm install",
        ScriptedProcess::exits(0).with_output(["added 12 packages", "done"]),
    );
    harness.sandbox.script(
        "npm run dev",
        ScriptedProcess::running()
            .with_output(["VITE ready\r\n"])
            .with_server_ready(5173, "https://abc.local-corp.webcontainer-api.io"),
    );
}

fn record(session: &SessionController) -> (Arc<Mutex<Vec<SessionEvent>>>, Subscription) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sub = {
        let events = events.clone();
        session.subscribe(move |event| lock(&events).push(event.clone()))
    };
    (events, sub)
}

#[test]
fn boot_install_serve_reaches_ready() {
    let harness = Harness::new();
    script_defaults(&harness);
    let session = SessionController::new(harness.ctx.clone());
    let (events, _sub) = record(&session);

    assert_eq!(session.progress_message(), Some("Booting Web Container!"));
    block_on(session.boot(&tree())).unwrap();
    assert_eq!(session.phase(), Phase::Installing);
    assert_eq!(session.progress_message(), Some("Installing Node Modules!"));

    assert_eq!(block_on(session.install()).unwrap(), 0);
    assert_eq!(session.phase(), Phase::Starting);
    assert!(session.packages_installed());
    assert_eq!(
        harness.terminal.lines(),
        ["npm install", "added 12 packages", "done"]
    );

    let ready = block_on(session.serve()).unwrap();
    assert_eq!(ready.port, 5173);
    assert_eq!(session.phase(), Phase::Ready);
    assert_eq!(session.progress_message(), None);
    assert_eq!(
        session.base_url().as_deref(),
        Some("https://abc.local-corp.webcontainer-api.io")
    );

    block_on(harness.executor.run_pending());
    assert!(harness.terminal.text().ends_with("npm run dev\r\nVITE ready\r\n"));

    let phases: Vec<Phase> = lock(&events)
        .iter()
        .filter_map(|event| match event {
            SessionEvent::PhaseChanged(phase) => Some(phase.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(
        phases,
        [Phase::Booting, Phase::Installing, Phase::Starting, Phase::Ready]
    );
    assert!(lock(&events).contains(&SessionEvent::PackagesInstalled));
    assert_eq!(harness.sandbox.mounted(), [tree()]);
}

#[test]
fn boot_is_one_shot() {
    let harness = Harness::new();
    let session = SessionController::new(harness.ctx.clone());
    block_on(session.boot(&tree())).unwrap();
    assert!(matches!(
        block_on(session.boot(&tree())),
        Err(SessionError::AlreadyBooted)
    ));
    assert_eq!(harness.sandbox.boot_calls(), 1);
}

#[test]
fn boot_failure_is_final() {
    let harness = Harness::new();
    harness.sandbox.fail_boot("SharedArrayBuffer unavailable");
    let session = SessionController::new(harness.ctx.clone());

    let Err(err) = block_on(session.boot(&tree())) else {
        panic!("boot should fail");
    };
    assert!(matches!(err, SessionError::Failed(FailureReason::Boot(_))));
    assert!(session.phase().is_failed());
    assert_eq!(session.progress_message(), None);
    assert!(matches!(
        block_on(session.install()),
        Err(SessionError::NotBooted)
    ));
    assert!(matches!(
        block_on(session.boot(&tree())),
        Err(SessionError::AlreadyBooted)
    ));
}

#[test]
fn failed_install_blocks_serve_by_default() {
    let harness = Harness::new();
    harness.sandbox.script(
        "npm install",
        ScriptedProcess::exits(1).with_output(["ERR! 404"]),
    );
    let session = SessionController::new(harness.ctx.clone());
    let (events, _sub) = record(&session);
    block_on(session.boot(&tree())).unwrap();

    let err = block_on(session.install()).unwrap_err();
    assert!(matches!(
        err,
        SessionError::Failed(FailureReason::Install { code: 1 })
    ));
    assert!(lock(&events).contains(&SessionEvent::PackagesInstalled));
    assert!(matches!(block_on(session.serve()), Err(SessionError::Failed(_))));
    assert!(harness.sandbox.spawned().iter().all(|c| c != "npm run dev"));
}

#[test]
fn failed_install_can_proceed_when_configured() {
    let mut config = WorkspaceConfig::default();
    config.install.fail_on_error = false;
    let harness = Harness::with_config(config);
    script_defaults(&harness);
    harness
        .sandbox
        .script("npm install", ScriptedProcess::exits(2));
    let session = SessionController::new(harness.ctx.clone());

    block_on(session.boot(&tree())).unwrap();
    assert_eq!(block_on(session.install()).unwrap(), 2);
    assert_eq!(session.phase(), Phase::Starting);
    block_on(session.serve()).unwrap();
    assert_eq!(session.phase(), Phase::Ready);
}

#[test]
fn serve_requires_install() {
    let harness = Harness::new();
    let session = SessionController::new(harness.ctx.clone());
    block_on(session.boot(&tree())).unwrap();
    assert!(matches!(
        block_on(session.serve()),
        Err(SessionError::NotInstalled)
    ));
}

#[test]
fn serve_times_out_when_configured() {
    let mut config = WorkspaceConfig::default();
    config.serve.ready_timeout_ms = Some(20);
    let harness = Harness::with_config(config);
    harness
        .sandbox
        .script("npm install", ScriptedProcess::exits(0));
    let session = SessionController::new(harness.ctx.clone());

    block_on(async {
        session.boot(&tree()).await.unwrap();
        session.install().await.unwrap();
        let err = session.serve().await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Failed(FailureReason::ServeTimeout)
        ));
    });
    assert_eq!(session.phase(), Phase::Failed(FailureReason::ServeTimeout));
    assert_eq!(session.base_url(), None);
}

#[test]
fn restart_clears_url_until_next_frame() {
    let harness = Harness::new();
    script_defaults(&harness);
    let session = SessionController::new(harness.ctx.clone());
    block_on(async {
        session.boot(&tree()).await.unwrap();
        session.install().await.unwrap();
        session.serve().await.unwrap();
    });
    let spawned = harness.sandbox.spawned().len();
    let (events, _sub) = record(&session);

    assert!(session.restart());
    assert_eq!(session.base_url(), None);
    assert!(session.is_reloading());

    session.on_frame();
    assert!(!session.is_reloading());
    assert_eq!(
        session.base_url().as_deref(),
        Some("https://abc.local-corp.webcontainer-api.io")
    );
    assert_eq!(harness.sandbox.spawned().len(), spawned);
    assert_eq!(
        *lock(&events),
        [
            SessionEvent::BaseUrlChanged(None),
            SessionEvent::BaseUrlChanged(Some(
                "https://abc.local-corp.webcontainer-api.io".to_string()
            )),
        ]
    );
}

#[test]
fn restart_without_url_is_noop() {
    let harness = Harness::new();
    let session = SessionController::new(harness.ctx.clone());
    assert!(!session.restart());
    session.on_frame();
    assert_eq!(session.base_url(), None);
}

#[test]
fn shell_receives_terminal_input() {
    let harness = Harness::new();
    harness.sandbox.script(
        "jsh",
        ScriptedProcess::running().with_output(["~/project $ "]),
    );
    let session = SessionController::new(harness.ctx.clone());
    assert!(!session.terminal_input("ls\r"));

    block_on(async {
        session.boot(&tree()).await.unwrap();
        session.open_shell().await.unwrap();
        harness.executor.run_pending().await;
    });
    assert!(session.terminal_input("ls\r"));
    assert_eq!(harness.sandbox.take_stdin("jsh"), ["ls\r"]);
    assert_eq!(harness.terminal.text(), "~/project $ ");
}
