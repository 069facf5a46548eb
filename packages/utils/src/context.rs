use std::sync::{atomic::AtomicBool, Arc};

use tokio::runtime::{Handle, Runtime};
use tracing::instrument;

/// Owns the async runtime and a process-wide kill switch
/// every long-running loop holds a receiver and exits when it fires
#[derive(Clone)]
pub struct AppContext {
    pub rt: AnyRuntime,
    killed: Arc<AtomicBool>,
    kill_sender: tokio::sync::broadcast::Sender<()>,
    // just to make sure we don't send in the case of "no receivers" accidentally
    _kill_receiver: Arc<tokio::sync::broadcast::Receiver<()>>,
}

#[derive(Clone)]
pub enum AnyRuntime {
    Tokio(Arc<Runtime>),
    TokioHandle(Handle),
}

impl AnyRuntime {
    pub fn block_on<F: std::future::Future>(&self, fut: F) -> F::Output {
        match self {
            AnyRuntime::Tokio(rt) => rt.block_on(fut),
            AnyRuntime::TokioHandle(handle) => handle.block_on(fut),
        }
    }

    pub fn spawn<F>(&self, fut: F) -> tokio::task::JoinHandle<F::Output>
    where
        F: std::future::Future + Send + 'static,
        F::Output: Send + 'static,
    {
        match self {
            AnyRuntime::Tokio(rt) => rt.spawn(fut),
            AnyRuntime::TokioHandle(handle) => handle.spawn(fut),
        }
    }
}

impl AppContext {
    pub fn new() -> std::io::Result<Self> {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;

        Ok(Self::new_with_runtime(AnyRuntime::Tokio(Arc::new(rt))))
    }

    /// Useful from within `#[tokio::test]`, where a runtime already exists
    pub fn new_with_current_handle() -> Self {
        Self::new_with_runtime(AnyRuntime::TokioHandle(Handle::current()))
    }

    pub fn new_with_runtime(rt: AnyRuntime) -> Self {
        let (kill_sender, kill_receiver) = tokio::sync::broadcast::channel(1);

        Self {
            rt,
            kill_sender,
            _kill_receiver: Arc::new(kill_receiver),
            killed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Every subscriber is notified once when `kill` is called
    #[instrument(skip(self), fields(subsys = "AppContext"))]
    pub fn get_kill_receiver(&self) -> tokio::sync::broadcast::Receiver<()> {
        self.kill_sender.subscribe()
    }

    /// Typically called from a ctrl-c handler or tests
    #[instrument(skip(self), fields(subsys = "AppContext"))]
    pub fn kill(&self) {
        if !self.killed.swap(true, std::sync::atomic::Ordering::SeqCst) {
            // the held receiver guarantees at least one subscriber
            let _ = self.kill_sender.send(());
        }
    }

    pub fn killed(&self) -> bool {
        self.killed.load(std::sync::atomic::Ordering::SeqCst)
    }
}
