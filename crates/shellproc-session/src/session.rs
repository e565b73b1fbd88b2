//! Shell session: one command, its streamed output and its lifecycle

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

use futures::StreamExt;
use parking_lot::Mutex;
use shellproc_process::{
    platform_kill_strategy, ChildController, ExitOutcome, KillStrategy, LaunchedShell, Launcher,
    OutputStream, PidResolver, ProcessTree, ShellLauncher, SysinfoProcessTree,
};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::abort::TerminationCascade;
use crate::error::{Result, SessionError};
use crate::events::{EventBus, LineBus, SessionEvent, ShellExecutionDetails};
use crate::hot::HotTimer;
use crate::output::OutputBuffer;
use crate::settings::SessionSettings;
use crate::terminal::{ActiveStream, TerminalId, TerminalRef};

/// Process-facing dependencies of a session
#[derive(Clone)]
pub struct SessionCollaborators {
    pub launcher: Arc<dyn Launcher>,
    pub process_tree: Arc<dyn ProcessTree>,
    pub kill_strategy: Arc<dyn KillStrategy>,
}

impl SessionCollaborators {
    /// Real OS implementations for the current platform
    pub fn platform(settings: &SessionSettings) -> Self {
        Self {
            launcher: Arc::new(ShellLauncher::new()),
            process_tree: Arc::new(SysinfoProcessTree::new()),
            kill_strategy: platform_kill_strategy(settings.tree_kill_timeout()),
        }
    }
}

/// Progress of the background PID lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    Idle,
    InFlight,
    Settled,
}

/// Shell PID plus the command PID found beneath it. 0 means unset.
#[derive(Debug, Default)]
struct PidSlot {
    shell: AtomicU32,
    resolved: AtomicU32,
}

impl PidSlot {
    fn set_shell(&self, pid: u32) {
        self.shell.store(pid, Ordering::SeqCst);
    }

    /// Record the resolved PID; later writes are ignored
    fn set_resolved(&self, pid: u32) -> bool {
        self.resolved
            .compare_exchange(0, pid, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn current(&self) -> Option<u32> {
        match self.resolved.load(Ordering::SeqCst) {
            0 => match self.shell.load(Ordering::SeqCst) {
                0 => None,
                pid => Some(pid),
            },
            pid => Some(pid),
        }
    }
}

struct SessionInner {
    id: Uuid,
    terminal: TerminalRef,
    settings: SessionSettings,
    launcher: Arc<dyn Launcher>,
    resolver: PidResolver,
    cascade: TerminationCascade,
    command: OnceLock<String>,
    started: AtomicBool,
    completed: AtomicBool,
    abort_requested: AtomicBool,
    cascade_started: AtomicBool,
    listening: AtomicBool,
    aborted: CancellationToken,
    output: Mutex<OutputBuffer>,
    hot: HotTimer,
    controller: Mutex<Option<ChildController>>,
    pids: PidSlot,
    resolution: watch::Sender<ResolutionState>,
    /// Whether the terminal currently shows our stream; guards registration
    stream_registered: Mutex<bool>,
    events: EventBus,
    lines: LineBus,
    runtime: Mutex<Option<Handle>>,
}

/// One shell command run against a terminal.
///
/// Cloning is cheap; clones share the same session.
#[derive(Clone)]
pub struct ShellSession {
    inner: Arc<SessionInner>,
}

impl ShellSession {
    /// Create a session using the real launcher, process table and kill
    /// strategy
    pub fn new(terminal: TerminalRef, settings: SessionSettings) -> Self {
        let collaborators = SessionCollaborators::platform(&settings);
        Self::with_collaborators(terminal, settings, collaborators)
    }

    /// Create a session with injected process dependencies
    pub fn with_collaborators(
        terminal: TerminalRef,
        settings: SessionSettings,
        collaborators: SessionCollaborators,
    ) -> Self {
        let resolver = PidResolver::new(Arc::clone(&collaborators.process_tree)).with_retry(
            settings.pid_resolve_attempts,
            settings.pid_resolve_base_delay(),
        );
        let cascade = TerminationCascade::new(
            Arc::clone(&collaborators.process_tree),
            Arc::clone(&collaborators.kill_strategy),
        );
        let hot = HotTimer::new(settings.hot_timeout_normal(), settings.hot_timeout_compiling());
        let (resolution, _) = watch::channel(ResolutionState::Idle);

        Self {
            inner: Arc::new(SessionInner {
                id: Uuid::new_v4(),
                terminal,
                settings,
                launcher: collaborators.launcher,
                resolver,
                cascade,
                command: OnceLock::new(),
                started: AtomicBool::new(false),
                completed: AtomicBool::new(false),
                abort_requested: AtomicBool::new(false),
                cascade_started: AtomicBool::new(false),
                listening: AtomicBool::new(true),
                aborted: CancellationToken::new(),
                output: Mutex::new(OutputBuffer::new()),
                hot,
                controller: Mutex::new(None),
                pids: PidSlot::default(),
                resolution,
                stream_registered: Mutex::new(false),
                events: EventBus::new(),
                lines: LineBus::new(),
                runtime: Mutex::new(None),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn terminal_id(&self) -> TerminalId {
        self.inner.terminal.id()
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.inner.settings
    }

    /// Command text, once `run` has been called
    pub fn command(&self) -> Option<&str> {
        self.inner.command.get().map(String::as_str)
    }

    pub fn is_hot(&self) -> bool {
        self.inner.hot.is_hot()
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.is_cancelled()
    }

    pub fn is_listening(&self) -> bool {
        self.inner.listening.load(Ordering::SeqCst)
    }

    pub fn is_completed(&self) -> bool {
        self.inner.completed.load(Ordering::SeqCst)
    }

    /// Best-known PID of the command: the resolved one, else the shell's
    pub fn pid(&self) -> Option<u32> {
        self.inner.pids.current()
    }

    pub fn resolution_state(&self) -> ResolutionState {
        *self.inner.resolution.borrow()
    }

    /// Everything the command has written so far
    pub fn full_output(&self) -> String {
        self.inner.output.lock().full_output().to_string()
    }

    /// Lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Pushed output lines; closed by [`continue_listening`](Self::continue_listening)
    pub fn subscribe_lines(&self) -> broadcast::Receiver<String> {
        self.inner.lines.subscribe()
    }

    pub fn has_unretrieved_output(&self) -> bool {
        self.inner.output.lock().has_unretrieved()
    }

    /// Complete lines not yet handed out, advancing the cursor past them
    pub fn get_unretrieved_output(&self) -> String {
        self.inner.output.lock().take_unretrieved()
    }

    /// Stop pushing line notifications and detach line subscribers.
    ///
    /// The command keeps running and output keeps being collected.
    pub fn continue_listening(&self) {
        self.emit_pending_lines();
        self.inner.listening.store(false, Ordering::SeqCst);
        self.inner.lines.detach_all();
        debug!(session = %self.inner.id, "Stopped listening");
    }

    /// Run `command` to completion.
    ///
    /// Returns once `Completed` and `Continue` have been published. Launch
    /// failures are reported through `ShellExecutionComplete` with exit code
    /// 1, not as an error.
    pub async fn run(&self, command: impl Into<String>) -> Result<()> {
        let inner = &self.inner;
        if inner.started.swap(true, Ordering::SeqCst) {
            return Err(SessionError::AlreadyStarted);
        }

        let command = command.into();
        let _ = inner.command.set(command.clone());
        *inner.runtime.lock() = Some(Handle::current());

        let cwd = inner.terminal.resolve()?.current_working_directory();
        inner.hot.mark_hot();

        let launch = inner.settings.launch_config(cwd.as_deref());
        let launched = match inner.launcher.launch(&launch, &command) {
            Ok(launched) => launched,
            Err(e) => {
                error!(session = %inner.id, command = %command, error = %e, "Failed to launch command");
                inner
                    .events
                    .publish(SessionEvent::ShellExecutionComplete(ShellExecutionDetails::launch_failed()));
                return self.finish();
            }
        };

        let LaunchedShell {
            pid,
            controller,
            output,
        } = launched;

        // an abort that sees the shell PID must also see the controller and
        // the pending resolution
        *inner.controller.lock() = Some(controller.clone());
        inner.resolution.send_replace(ResolutionState::InFlight);
        inner.pids.set_shell(pid);
        if let Ok(terminal) = inner.terminal.resolve() {
            terminal.set_busy(true);
        }
        self.register_stream(pid);
        self.spawn_pid_resolution(pid);

        self.stream_output(output).await;

        let outcome = if inner.aborted.is_cancelled() {
            self.await_aborted_exit(&controller).await
        } else {
            tokio::select! {
                outcome = controller.wait() => outcome,
                _ = inner.aborted.cancelled() => self.await_aborted_exit(&controller).await,
            }
        };

        let details = ShellExecutionDetails {
            exit_code: outcome.exit_code(),
            signal_name: outcome.signal_name(),
        };
        info!(
            session = %inner.id,
            pid = %pid,
            exit_code = details.exit_code,
            signal = ?details.signal_name,
            aborted = inner.aborted.is_cancelled(),
            "Shell execution complete"
        );
        inner
            .events
            .publish(SessionEvent::ShellExecutionComplete(details));

        self.finish()
    }

    /// Abort the running command.
    ///
    /// Returns immediately; the process tree is torn down in the background
    /// and `run` concludes within the abort kill timeout. Calls after the
    /// first have no effect.
    pub fn abort(&self) {
        let inner = &self.inner;
        if inner.abort_requested.swap(true, Ordering::SeqCst) {
            return;
        }
        inner.aborted.cancel();

        if inner.completed.load(Ordering::SeqCst) {
            debug!(session = %inner.id, "Abort after completion, nothing to kill");
            return;
        }
        self.start_cascade();
    }

    async fn stream_output(&self, mut output: OutputStream) {
        let inner = &self.inner;
        let throttle = inner.settings.throttle_interval();
        let mut last_emit: Option<Instant> = None;

        loop {
            tokio::select! {
                biased;
                _ = inner.aborted.cancelled() => {
                    debug!(session = %inner.id, "Stopped reading output after abort");
                    break;
                }
                chunk = output.next() => {
                    let Some(chunk) = chunk else { break };
                    inner.output.lock().append(&chunk);

                    if inner.listening.load(Ordering::SeqCst)
                        && last_emit.map_or(true, |at| at.elapsed() >= throttle)
                    {
                        self.emit_pending_lines();
                        last_emit = Some(Instant::now());
                    }

                    inner.hot.touch(&chunk);
                }
            }
        }
    }

    async fn await_aborted_exit(&self, controller: &ChildController) -> ExitOutcome {
        self.start_cascade();

        let timeout = self.inner.settings.abort_kill_timeout();
        match tokio::time::timeout(timeout, controller.wait()).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(
                    session = %self.inner.id,
                    pid = %controller.pid(),
                    timeout_ms = timeout.as_millis() as u64,
                    "Process did not exit after abort, sending final kill"
                );
                controller.kill();
                controller.exit_outcome().unwrap_or_default()
            }
        }
    }

    fn start_cascade(&self) {
        let inner = &self.inner;
        if inner.pids.current().is_none() {
            // nothing launched yet; run starts the cascade once it sees the flag
            return;
        }
        if inner.cascade_started.swap(true, Ordering::SeqCst) {
            return;
        }

        let handle = inner
            .runtime
            .lock()
            .clone()
            .or_else(|| Handle::try_current().ok());
        let Some(handle) = handle else {
            warn!(session = %inner.id, "No runtime available to run the abort cascade");
            return;
        };

        let task_inner = Arc::clone(inner);
        handle.spawn(async move {
            let mut resolution = task_inner.resolution.subscribe();
            if *resolution.borrow() == ResolutionState::InFlight {
                debug!(session = %task_inner.id, "Waiting for PID resolution before killing");
            }
            let _ = resolution
                .wait_for(|state| *state != ResolutionState::InFlight)
                .await;

            let controller = task_inner.controller.lock().clone();
            let Some(target) = task_inner.pids.current() else {
                return;
            };
            task_inner.cascade.execute(controller.as_ref(), target).await;
        });
    }

    fn spawn_pid_resolution(&self, shell_pid: u32) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            if let Some(pid) = inner.resolver.resolve(shell_pid).await {
                if inner.pids.set_resolved(pid) {
                    let registered = inner.stream_registered.lock();
                    if *registered {
                        if let Ok(terminal) = inner.terminal.resolve() {
                            terminal.set_active_stream(Some(ActiveStream {
                                session_id: inner.id,
                                pid,
                            }));
                        }
                    }
                }
            }
            inner.resolution.send_replace(ResolutionState::Settled);
        });
    }

    fn register_stream(&self, pid: u32) {
        let inner = &self.inner;
        let mut registered = inner.stream_registered.lock();
        if let Ok(terminal) = inner.terminal.resolve() {
            terminal.set_active_stream(Some(ActiveStream {
                session_id: inner.id,
                pid,
            }));
            *registered = true;
        }
    }

    fn unregister_stream(&self) -> Result<()> {
        let inner = &self.inner;
        let mut registered = inner.stream_registered.lock();
        *registered = false;
        inner.terminal.resolve()?.set_active_stream(None);
        Ok(())
    }

    fn emit_pending_lines(&self) {
        if !self.inner.listening.load(Ordering::SeqCst) {
            return;
        }
        let lines = self.inner.output.lock().take_unretrieved();
        if !lines.is_empty() {
            self.inner.lines.publish(lines);
        }
    }

    /// Final flush and completion events; always publishes `Completed` then
    /// `Continue`
    fn finish(&self) -> Result<()> {
        let inner = &self.inner;

        let terminal_result = self.unregister_stream();
        self.emit_pending_lines();
        inner.hot.stop();

        inner.completed.store(true, Ordering::SeqCst);
        let full_output = self.full_output();
        inner.events.publish(SessionEvent::Completed(full_output));

        let terminal_result = terminal_result.and_then(|()| {
            inner.terminal.resolve()?.set_busy(false);
            Ok(())
        });

        inner.events.publish(SessionEvent::Continue);
        *inner.controller.lock() = None;

        if let Err(e) = &terminal_result {
            error!(session = %inner.id, error = %e, "Lost terminal while finishing session");
        }
        terminal_result
    }
}

impl std::fmt::Debug for ShellSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellSession")
            .field("id", &self.inner.id)
            .field("terminal", &self.inner.terminal)
            .field("command", &self.command())
            .field("pid", &self.pid())
            .field("aborted", &self.is_aborted())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::{BasicTerminal, Terminal, TerminalRegistry};
    use async_trait::async_trait;
    use shellproc_process::{collect_descendants, LaunchConfig, ProcessError, ProcessInfo, SimulatedChild};
    use std::time::Duration;
    use tokio::sync::mpsc;

    const SHELL_PID: u32 = 4242;

    struct ScriptedLauncher {
        launched: Mutex<Option<LaunchedShell>>,
    }

    impl Launcher for ScriptedLauncher {
        fn launch(&self, _config: &LaunchConfig, _command: &str) -> shellproc_process::Result<LaunchedShell> {
            self.launched.lock().take().ok_or_else(|| {
                ProcessError::SpawnFailed(std::io::Error::new(std::io::ErrorKind::NotFound, "no such shell"))
            })
        }
    }

    /// Static process table
    struct FixedTree(Vec<ProcessInfo>);

    impl ProcessTree for FixedTree {
        fn descendants(&self, root: u32) -> shellproc_process::Result<Vec<ProcessInfo>> {
            Ok(collect_descendants(&self.0, root))
        }
    }

    #[derive(Default)]
    struct RecordingStrategy {
        killed: Mutex<Vec<u32>>,
    }

    #[async_trait]
    impl KillStrategy for RecordingStrategy {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn kill(&self, pid: u32) -> shellproc_process::Result<()> {
            self.killed.lock().push(pid);
            Ok(())
        }
    }

    struct Harness {
        session: ShellSession,
        terminal: Arc<BasicTerminal>,
        registry: Arc<TerminalRegistry>,
        chunks: Option<mpsc::Sender<String>>,
        child: SimulatedChild,
        strategy: Arc<RecordingStrategy>,
    }

    impl Harness {
        fn new(tree: Vec<ProcessInfo>) -> Self {
            Self::with_settings(tree, SessionSettings::default())
        }

        fn with_settings(tree: Vec<ProcessInfo>, settings: SessionSettings) -> Self {
            let (tx, rx) = mpsc::channel(64);
            let (controller, child) = ChildController::simulated(SHELL_PID);
            let launcher = Arc::new(ScriptedLauncher {
                launched: Mutex::new(Some(LaunchedShell {
                    pid: SHELL_PID,
                    controller,
                    output: OutputStream::from_receiver(rx),
                })),
            });
            let strategy = Arc::new(RecordingStrategy::default());

            let registry = TerminalRegistry::new();
            let terminal = BasicTerminal::new(None);
            let reference = registry.register(terminal.clone());

            let session = ShellSession::with_collaborators(
                reference,
                settings,
                SessionCollaborators {
                    launcher,
                    process_tree: Arc::new(FixedTree(tree)),
                    kill_strategy: strategy.clone(),
                },
            );

            Self {
                session,
                terminal,
                registry,
                chunks: Some(tx),
                child,
                strategy,
            }
        }

        fn start(&self) -> tokio::task::JoinHandle<Result<()>> {
            let session = self.session.clone();
            tokio::spawn(async move { session.run("build").await })
        }

        async fn send(&self, chunk: &str) {
            let expected = self.session.full_output().len() + chunk.len();
            if let Some(tx) = &self.chunks {
                tx.send(chunk.to_string()).await.unwrap();
            }
            wait_until(|| self.session.full_output().len() == expected).await;
        }

        fn close_stream(&mut self) {
            self.chunks = None;
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..1_000 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("condition not met");
    }

    fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn test_lines_scenario_without_listener() {
        let mut h = Harness::new(vec![]);
        h.session.continue_listening();
        let task = h.start();

        h.send("a\n").await;
        h.send("b\n").await;
        assert_eq!(h.session.get_unretrieved_output(), "a\nb\n");

        h.send("c").await;
        h.close_stream();
        h.child.exit(ExitOutcome::exited(0));
        task.await.unwrap().unwrap();

        assert_eq!(h.session.full_output(), "a\nb\nc");
        assert_eq!(h.session.get_unretrieved_output(), "");
        assert!(h.session.has_unretrieved_output());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pushed_lines_are_throttled() {
        let mut h = Harness::new(vec![]);
        let mut lines = h.session.subscribe_lines();
        let task = h.start();

        h.send("1\n").await;
        assert_eq!(lines.try_recv().unwrap(), "1\n");

        tokio::time::sleep(Duration::from_millis(100)).await;
        h.send("2\n").await;
        assert!(lines.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(500)).await;
        h.send("3\n").await;
        assert_eq!(lines.try_recv().unwrap(), "2\n3\n");

        h.send("4").await;
        h.close_stream();
        h.child.exit(ExitOutcome::exited(0));
        task.await.unwrap().unwrap();

        // trailing partial line is never pushed
        assert!(lines.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_final_flush_bypasses_throttle() {
        let mut h = Harness::new(vec![]);
        let mut lines = h.session.subscribe_lines();
        let task = h.start();

        h.send("first\n").await;
        h.send("second\n").await;
        h.close_stream();
        h.child.exit(ExitOutcome::exited(0));
        task.await.unwrap().unwrap();

        assert_eq!(lines.try_recv().unwrap(), "first\n");
        assert_eq!(lines.try_recv().unwrap(), "second\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_waits_for_stream_end() {
        let mut h = Harness::new(vec![]);
        let mut events = h.session.subscribe();
        let task = h.start();

        h.send("out\n").await;
        h.child.exit(ExitOutcome::exited(2));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(drain(&mut events).is_empty());

        h.close_stream();
        task.await.unwrap().unwrap();

        assert_eq!(
            drain(&mut events),
            vec![
                SessionEvent::ShellExecutionComplete(ShellExecutionDetails {
                    exit_code: 2,
                    signal_name: None,
                }),
                SessionEvent::Completed("out\n".to_string()),
                SessionEvent::Continue,
            ]
        );
        assert!(h.session.is_completed());
        assert!(!h.session.is_hot());
    }

    #[tokio::test(start_paused = true)]
    async fn test_continue_listening_detaches_lines() {
        let mut h = Harness::new(vec![]);
        let mut lines = h.session.subscribe_lines();
        let mut events = h.session.subscribe();
        let task = h.start();

        h.send("x\n").await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        h.send("y\n").await;
        h.session.continue_listening();
        assert!(!h.session.is_listening());

        h.send("z\n").await;
        h.close_stream();
        h.child.exit(ExitOutcome::exited(0));
        task.await.unwrap().unwrap();

        assert_eq!(lines.recv().await.unwrap(), "x\n");
        assert_eq!(lines.recv().await.unwrap(), "y\n");
        assert!(matches!(
            lines.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
        assert_eq!(h.session.get_unretrieved_output(), "z\n");

        let continues = drain(&mut events)
            .into_iter()
            .filter(|event| *event == SessionEvent::Continue)
            .count();
        assert_eq!(continues, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_completes_when_process_ignores_kill() {
        let h = Harness::new(vec![]);
        let mut events = h.session.subscribe();
        let mut lines = h.session.subscribe_lines();
        let task = h.start();

        h.send("working\n").await;
        let started = Instant::now();
        h.session.abort();
        h.session.abort();

        if let Some(tx) = &h.chunks {
            let _ = tx.send("late\n".to_string()).await;
        }

        task.await.unwrap().unwrap();
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(5) && elapsed < Duration::from_secs(6));

        let events = drain(&mut events);
        assert!(matches!(events[0], SessionEvent::ShellExecutionComplete(_)));
        assert_eq!(events[1], SessionEvent::Completed("working\n".to_string()));
        assert_eq!(events[2], SessionEvent::Continue);

        assert_eq!(lines.try_recv().unwrap(), "working\n");
        assert!(lines.try_recv().is_err());
        assert!(h.session.is_aborted());

        // resolution found nothing, so the shell PID is the kill target
        wait_until(|| !h.strategy.killed.lock().is_empty()).await;
        assert_eq!(*h.strategy.killed.lock(), vec![SHELL_PID]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_reports_signal_when_process_dies() {
        let mut h = Harness::new(vec![]);
        let mut events = h.session.subscribe();
        let task = h.start();

        h.send("spinning\n").await;
        h.session.abort();

        assert_eq!(h.child.kill_requested().await, Some(()));
        h.child.exit(ExitOutcome::signaled(9));
        task.await.unwrap().unwrap();

        match drain(&mut events).first() {
            Some(SessionEvent::ShellExecutionComplete(details)) => {
                assert_eq!(details.exit_code, 0);
                assert!(details.signal_name.is_some());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolved_pid_is_kill_target() {
        let h = Harness::new(vec![
            ProcessInfo::new(5000, Some(SHELL_PID), "node"),
            ProcessInfo::new(5002, Some(5000), "esbuild"),
        ]);
        let task = h.start();

        wait_until(|| h.session.resolution_state() == ResolutionState::Settled).await;
        assert_eq!(h.session.pid(), Some(5000));

        h.session.abort();
        task.await.unwrap().unwrap();

        wait_until(|| h.strategy.killed.lock().len() == 2).await;
        let mut killed = h.strategy.killed.lock().clone();
        killed.sort_unstable();
        assert_eq!(killed, vec![5000, 5002]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_during_resolution_waits_for_resolved_pid() {
        let h = Harness::new(vec![
            ProcessInfo::new(200, Some(SHELL_PID), "make"),
            ProcessInfo::new(300, Some(200), "cc"),
        ]);
        let task = h.start();

        wait_until(|| h.session.pid().is_some()).await;
        assert_eq!(h.session.resolution_state(), ResolutionState::InFlight);
        assert_eq!(h.session.pid(), Some(SHELL_PID));

        h.session.abort();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(h.strategy.killed.lock().is_empty());

        task.await.unwrap().unwrap();
        assert_eq!(h.session.resolution_state(), ResolutionState::Settled);
        assert_eq!(h.session.pid(), Some(200));

        wait_until(|| h.strategy.killed.lock().len() == 2).await;
        let mut killed = h.strategy.killed.lock().clone();
        killed.sort_unstable();
        assert_eq!(killed, vec![200, 300]);
        assert!(!killed.contains(&SHELL_PID));
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_stream_and_busy_tracking() {
        let mut h = Harness::new(vec![ProcessInfo::new(5001, Some(SHELL_PID), "cargo")]);
        let task = h.start();

        wait_until(|| h.terminal.is_busy()).await;
        wait_until(|| h.session.resolution_state() == ResolutionState::Settled).await;

        h.close_stream();
        h.child.exit(ExitOutcome::exited(0));
        task.await.unwrap().unwrap();

        assert!(!h.terminal.is_busy());
        let history: Vec<Option<u32>> = h
            .terminal
            .stream_history()
            .into_iter()
            .map(|stream| stream.map(|s| s.pid))
            .collect();
        assert_eq!(history, vec![Some(SHELL_PID), Some(5001), None]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_run_is_rejected() {
        let mut h = Harness::new(vec![]);
        let task = h.start();
        wait_until(|| h.session.command().is_some()).await;

        let mut events = h.session.subscribe();
        let err = h.session.run("again").await.unwrap_err();
        assert!(matches!(err, SessionError::AlreadyStarted));
        assert!(drain(&mut events).is_empty());

        h.close_stream();
        h.child.exit(ExitOutcome::exited(0));
        task.await.unwrap().unwrap();
        assert_eq!(h.session.command(), Some("build"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_failure_reports_exit_code_one() {
        let registry = TerminalRegistry::new();
        let terminal = BasicTerminal::new(None);
        let session = ShellSession::with_collaborators(
            registry.register(terminal.clone()),
            SessionSettings::default(),
            SessionCollaborators {
                launcher: Arc::new(ScriptedLauncher {
                    launched: Mutex::new(None),
                    }),
                process_tree: Arc::new(FixedTree(vec![])),
                kill_strategy: Arc::new(RecordingStrategy::default()),
            },
        );
        let mut events = session.subscribe();

        session.run("missing-binary").await.unwrap();

        assert_eq!(
            drain(&mut events),
            vec![
                SessionEvent::ShellExecutionComplete(ShellExecutionDetails::launch_failed()),
                SessionEvent::Completed(String::new()),
                SessionEvent::Continue,
            ]
        );
        assert!(!terminal.is_busy());
        assert!(session.pid().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_terminal_is_reported_after_completion() {
        let mut h = Harness::new(vec![]);
        let mut events = h.session.subscribe();
        let task = h.start();

        h.send("partial\n").await;
        h.registry.unregister(h.terminal.id());
        h.close_stream();
        h.child.exit(ExitOutcome::exited(0));

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, SessionError::TerminalUnavailable(_)));

        let events = drain(&mut events);
        assert_eq!(events.len(), 3);
        assert_eq!(events[2], SessionEvent::Continue);
    }

    #[tokio::test]
    async fn test_missing_terminal_fails_before_launch() {
        let h = Harness::new(vec![]);
        h.registry.unregister(h.terminal.id());

        let err = h.session.run("ls").await.unwrap_err();
        assert!(matches!(err, SessionError::TerminalUnavailable(_)));
        assert!(h.session.pid().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_after_completion_only_sets_flag() {
        let mut h = Harness::new(vec![]);
        let task = h.start();
        h.close_stream();
        h.child.exit(ExitOutcome::exited(0));
        task.await.unwrap().unwrap();

        h.session.abort();
        assert!(h.session.is_aborted());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(h.strategy.killed.lock().is_empty());
    }

    #[test]
    fn test_pid_slot_written_once() {
        let slot = PidSlot::default();
        assert_eq!(slot.current(), None);
        slot.set_shell(10);
        assert_eq!(slot.current(), Some(10));
        assert!(slot.set_resolved(11));
        assert!(!slot.set_resolved(12));
        assert_eq!(slot.current(), Some(11));
    }
}
