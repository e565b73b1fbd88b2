//! "Hot" state: is the command actively producing output?
//!
//! Every chunk marks the session hot and restarts an idle timer. Output that
//! looks like a compiler/bundler at work gets a longer idle window.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::trace;

/// Idle timeout for ordinary output
pub const HOT_TIMEOUT_NORMAL: Duration = Duration::from_millis(2_000);

/// Idle timeout while output suggests a compilation step is running
pub const HOT_TIMEOUT_COMPILING: Duration = Duration::from_millis(15_000);

const COMPILING_MARKERS: &[&str] = &[
    "compiling",
    "building",
    "bundling",
    "transpiling",
    "generating",
    "starting",
];

const MARKER_NULLIFIERS: &[&str] = &[
    "compiled",
    "success",
    "finish",
    "complete",
    "succeed",
    "done",
    "end",
    "stop",
    "exit",
    "terminate",
    "error",
    "fail",
];

/// Whether a chunk reads like an in-progress compilation
pub fn is_compiling(chunk: &str) -> bool {
    let lower = chunk.to_lowercase();
    COMPILING_MARKERS.iter().any(|m| lower.contains(m))
        && !MARKER_NULLIFIERS.iter().any(|n| lower.contains(n))
}

#[derive(Default)]
struct TimerState {
    generation: u64,
    pending: Option<JoinHandle<()>>,
}

struct HotInner {
    hot: AtomicBool,
    state: Mutex<TimerState>,
}

/// Hot flag with an adaptive idle timer
pub struct HotTimer {
    inner: Arc<HotInner>,
    normal: Duration,
    compiling: Duration,
}

impl HotTimer {
    /// Create a cold timer with the given idle windows
    pub fn new(normal: Duration, compiling: Duration) -> Self {
        Self {
            inner: Arc::new(HotInner {
                hot: AtomicBool::new(false),
                state: Mutex::new(TimerState::default()),
            }),
            normal,
            compiling,
        }
    }

    /// Whether output arrived recently
    pub fn is_hot(&self) -> bool {
        self.inner.hot.load(Ordering::SeqCst)
    }

    /// Mark hot without arming the idle timer
    pub fn mark_hot(&self) {
        let mut state = self.inner.state.lock();
        state.generation += 1;
        if let Some(handle) = state.pending.take() {
            handle.abort();
        }
        self.inner.hot.store(true, Ordering::SeqCst);
    }

    /// Idle window applied after `chunk`
    pub fn timeout_for(&self, chunk: &str) -> Duration {
        if is_compiling(chunk) {
            self.compiling
        } else {
            self.normal
        }
    }

    /// Record a chunk: mark hot and restart the idle timer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn touch(&self, chunk: &str) {
        let timeout = self.timeout_for(chunk);
        let mut state = self.inner.state.lock();
        state.generation += 1;
        let generation = state.generation;
        if let Some(handle) = state.pending.take() {
            handle.abort();
        }
        self.inner.hot.store(true, Ordering::SeqCst);

        let inner = Arc::clone(&self.inner);
        state.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let mut state = inner.state.lock();
            // a later touch/stop owns the flag now
            if state.generation == generation {
                inner.hot.store(false, Ordering::SeqCst);
                state.pending = None;
                trace!(timeout_ms = timeout.as_millis() as u64, "Output went idle");
            }
        }));
    }

    /// Cancel the timer and clear the flag
    pub fn stop(&self) {
        let mut state = self.inner.state.lock();
        state.generation += 1;
        if let Some(handle) = state.pending.take() {
            handle.abort();
        }
        self.inner.hot.store(false, Ordering::SeqCst);
    }
}

impl Default for HotTimer {
    fn default() -> Self {
        Self::new(HOT_TIMEOUT_NORMAL, HOT_TIMEOUT_COMPILING)
    }
}

impl Drop for HotTimer {
    fn drop(&mut self) {
        if let Some(handle) = self.inner.state.lock().pending.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_markers() {
        assert!(is_compiling("Compiling shellproc v0.1.0"));
        assert!(is_compiling("webpack: Building modules..."));
        assert!(!is_compiling("Compiled successfully"));
        assert!(!is_compiling("Building failed with error"));
        assert!(!is_compiling("plain output"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_goes_idle_after_normal_timeout() {
        let timer = HotTimer::default();
        timer.touch("hello\n");
        assert!(timer.is_hot());

        tokio::time::sleep(Duration::from_millis(1_900)).await;
        assert!(timer.is_hot());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!timer.is_hot());
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_chunk_restarts_timer() {
        let timer = HotTimer::default();
        timer.touch("a");
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        timer.touch("b");
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert!(timer.is_hot());
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(!timer.is_hot());
    }

    #[tokio::test(start_paused = true)]
    async fn test_compiling_output_stays_hot_longer() {
        let timer = HotTimer::default();
        timer.touch("Compiling foo v1.0.0\n");
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(timer.is_hot());
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(!timer.is_hot());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_clears_immediately() {
        let timer = HotTimer::default();
        timer.touch("x");
        timer.stop();
        assert!(!timer.is_hot());

        timer.mark_hot();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(timer.is_hot());
    }
}
