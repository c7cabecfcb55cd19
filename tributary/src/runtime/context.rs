use std::cell::RefCell;
use std::sync::Arc;

/// Identity of a scheduler worker thread.
#[derive(Clone)]
pub(crate) struct WorkerContext {
    /// Name of the owning scheduler.
    pub(crate) scheduler: Arc<str>,

    /// Index of the worker within its scheduler.
    pub(crate) id: usize,
}

thread_local! {
    /// Identity of the worker running on this thread, if any.
    ///
    /// Set for the lifetime of every scheduler worker thread so that blocking
    /// consumers can refuse to park a thread the stream itself depends on.
    static CURRENT_WORKER: RefCell<Option<WorkerContext>> = const { RefCell::new(None) };
}

/// Enters the worker context for the current thread.
///
/// The context is installed for the duration of the closure `f`, then the
/// previous one is restored.
///
/// # Arguments
///
/// * `context` - Identity of the worker.
/// * `f` - Closure executed inside the context.
pub(crate) fn enter_context<R>(context: WorkerContext, f: impl FnOnce() -> R) -> R {
    let previous = CURRENT_WORKER.with(|c| c.replace(Some(context)));

    let out = f();

    CURRENT_WORKER.with(|c| c.replace(previous));

    out
}

/// Returns the thread name of the current scheduler worker, or `None` when
/// called outside any scheduler.
pub(crate) fn current_worker() -> Option<String> {
    CURRENT_WORKER.with(|c| {
        c.borrow()
            .as_ref()
            .map(|ctx| format!("{}-{}", ctx.scheduler, ctx.id))
    })
}
