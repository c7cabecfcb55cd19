use std::sync::atomic::{AtomicUsize, Ordering};

/// Work-in-progress counter serializing a drain routine.
///
/// Any thread may ask for a drain with [`run`](Self::run). Only one caller
/// executes the routine at a time; callers arriving while it runs only bump
/// the counter, and the running caller loops once more before leaving. This
/// turns reentrant calls (a `request` made from inside `on_next`) into loop
/// iterations instead of recursion.
pub(crate) struct Trampoline {
    wip: AtomicUsize,
}

impl Trampoline {
    /// Creates an idle trampoline.
    pub(crate) fn new() -> Self {
        Self {
            wip: AtomicUsize::new(0),
        }
    }

    /// Creates a trampoline that is already held.
    ///
    /// Drain requests made before [`release`](Self::release) are recorded and
    /// executed by `release`. Used to hold deliveries back while
    /// `on_subscribe` runs.
    pub(crate) fn held() -> Self {
        Self {
            wip: AtomicUsize::new(1),
        }
    }

    /// Runs `drain` now, or schedules one more pass of the caller already
    /// running it.
    pub(crate) fn run(&self, drain: impl FnMut()) {
        if self.wip.fetch_add(1, Ordering::AcqRel) != 0 {
            return;
        }

        self.drain_loop(drain);
    }

    /// Releases a trampoline created with [`held`](Self::held).
    ///
    /// Must be called exactly once.
    pub(crate) fn release(&self, drain: impl FnMut()) {
        self.drain_loop(drain);
    }

    fn drain_loop(&self, mut drain: impl FnMut()) {
        let mut missed = 1;

        loop {
            drain();

            let previous = self.wip.fetch_sub(missed, Ordering::AcqRel);
            missed = previous - missed;

            if missed == 0 {
                break;
            }
        }
    }
}
