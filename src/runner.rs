use std::sync::Arc;
use tokio::task::JoinHandle;

/// A component with a background loop
///
/// `start` spawns the loop and hands back its handle. `stop` only signals the
/// loop; await the handle to know when it drained.
pub trait Runner: Send + Sync + 'static {
    fn start(self: Arc<Self>) -> JoinHandle<()>;

    fn stop(&self);
}
