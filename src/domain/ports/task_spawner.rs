use futures::future::BoxFuture;

/// Runs background work (scheduler loop, event listener) off the caller's task
pub trait TaskSpawner: Send + Sync {
    fn spawn(&self, future: BoxFuture<'static, ()>);
}
