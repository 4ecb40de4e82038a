use std::future::Future;

use crossbeam_channel::bounded;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;

use burstcam_core::error::Result;

/// 相机回调专用的后台执行上下文
///
/// 每个会话管理器独占一个 Runtime，与宿主的 UI 线程隔离。
/// 驱动回调、会话配置和重复请求的提交都在这里执行。
pub(crate) struct BackgroundContext {
    runtime: Option<Runtime>,
}

impl BackgroundContext {
    pub(crate) fn new(thread_name: &str, worker_threads: usize) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .worker_threads(worker_threads.max(1))
            .thread_name(thread_name)
            .build()?;
        tracing::debug!(
            "Background context '{}' started with {} worker(s)",
            thread_name,
            worker_threads.max(1)
        );
        Ok(Self {
            runtime: Some(runtime),
        })
    }

    fn runtime(&self) -> &Runtime {
        // 只有 Drop 会取走 runtime
        self.runtime
            .as_ref()
            .unwrap_or_else(|| unreachable!("background runtime used after drop"))
    }

    pub(crate) fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.runtime().spawn(future)
    }

    /// 把 Future 交给后台执行，调用方线程同步等待结果
    ///
    /// Future 跑在后台 Runtime 上，调用方只阻塞在 channel 上，
    /// 所以调用方自己处在任意 async 上下文里也可以用。
    /// 后台在给出结果前被关闭时返回 None。
    pub(crate) fn call<F>(&self, future: F) -> Option<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let (reply_tx, reply_rx) = bounded(1);
        self.runtime().spawn(async move {
            let _ = reply_tx.send(future.await);
        });
        reply_rx.recv().ok()
    }
}

impl Drop for BackgroundContext {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            // 不等待挂起的回调，直接放弃
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for BackgroundContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundContext")
            .field("running", &self.runtime.is_some())
            .finish()
    }
}
