use std::future::Future;
use std::pin::Pin;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait AsyncExecutor: Send + Sync {
    fn spawn(&self, task: BoxFuture<'static, ()>);
}
