//! Terminal collaborator
//!
//! A session reports its live process and busy state to the terminal that
//! owns it. Sessions never hold the terminal itself: they keep a
//! [`TerminalRef`] (id + registry) and resolve it each time, so a terminal that
//! is closed mid-run simply stops being reachable.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SessionError};

/// Terminal identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TerminalId(pub u64);

impl fmt::Display for TerminalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "terminal-{}", self.0)
    }
}

/// The process currently streaming into a terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveStream {
    /// Session producing the stream
    pub session_id: Uuid,
    /// Best-known PID of the command
    pub pid: u32,
}

/// What a session needs from its terminal
pub trait Terminal: Send + Sync {
    fn id(&self) -> TerminalId;

    /// Directory commands run in; `None` means the current directory
    fn current_working_directory(&self) -> Option<PathBuf>;

    /// Register or clear the live stream
    fn set_active_stream(&self, stream: Option<ActiveStream>);

    fn set_busy(&self, busy: bool);
}

/// Registry of live terminals, keyed by id
#[derive(Default)]
pub struct TerminalRegistry {
    terminals: RwLock<HashMap<TerminalId, Arc<dyn Terminal>>>,
}

impl TerminalRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register `terminal` and get a reference sessions can hold
    pub fn register(self: &Arc<Self>, terminal: Arc<dyn Terminal>) -> TerminalRef {
        let id = terminal.id();
        self.terminals.write().insert(id, terminal);
        TerminalRef {
            id,
            registry: Arc::clone(self),
        }
    }

    /// Remove a terminal; references to it stop resolving
    pub fn unregister(&self, id: TerminalId) -> Option<Arc<dyn Terminal>> {
        self.terminals.write().remove(&id)
    }

    pub fn get(&self, id: TerminalId) -> Option<Arc<dyn Terminal>> {
        self.terminals.read().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.terminals.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.terminals.read().is_empty()
    }
}

/// Non-owning handle to a registered terminal
#[derive(Clone)]
pub struct TerminalRef {
    id: TerminalId,
    registry: Arc<TerminalRegistry>,
}

impl TerminalRef {
    pub fn id(&self) -> TerminalId {
        self.id
    }

    /// Look the terminal up; [`SessionError::TerminalUnavailable`] once it is
    /// gone
    pub fn resolve(&self) -> Result<Arc<dyn Terminal>> {
        self.registry
            .get(self.id)
            .ok_or(SessionError::TerminalUnavailable(self.id))
    }
}

impl fmt::Debug for TerminalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerminalRef").field("id", &self.id).finish()
    }
}

static NEXT_TERMINAL_ID: AtomicU64 = AtomicU64::new(1);

/// In-memory terminal used by the CLI and tests
pub struct BasicTerminal {
    id: TerminalId,
    cwd: Option<PathBuf>,
    busy: AtomicBool,
    active_stream: Mutex<Option<ActiveStream>>,
    stream_history: Mutex<Vec<Option<ActiveStream>>>,
}

impl BasicTerminal {
    pub fn new(cwd: Option<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            id: TerminalId(NEXT_TERMINAL_ID.fetch_add(1, Ordering::Relaxed)),
            cwd,
            busy: AtomicBool::new(false),
            active_stream: Mutex::new(None),
            stream_history: Mutex::new(Vec::new()),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn active_stream(&self) -> Option<ActiveStream> {
        *self.active_stream.lock()
    }

    /// Every value passed to `set_active_stream`, oldest first
    pub fn stream_history(&self) -> Vec<Option<ActiveStream>> {
        self.stream_history.lock().clone()
    }
}

impl Terminal for BasicTerminal {
    fn id(&self) -> TerminalId {
        self.id
    }

    fn current_working_directory(&self) -> Option<PathBuf> {
        self.cwd.clone()
    }

    fn set_active_stream(&self, stream: Option<ActiveStream>) {
        *self.active_stream.lock() = stream;
        self.stream_history.lock().push(stream);
    }

    fn set_busy(&self, busy: bool) {
        self.busy.store(busy, Ordering::SeqCst);
    }
}
