//! 生命周期守卫 - 原子关闭标志与完成信号
//! Lifecycle guard - atomic closed flag and completion signal

use super::state::LifecycleState;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use tokio::sync::Semaphore;
use tracing::{debug, trace};

/// Shared liveness state of one connection.
///
/// `closed` is read without any lock by every operation and every transport
/// callback. `state` refines it into the lifecycle state machine. The
/// completion signal is a counting semaphore posted by the disconnect
/// completion and consumed by the closer.
///
/// 单个连接的共享存活状态。
#[derive(Debug)]
pub struct LifecycleGuard {
    closed: AtomicBool,
    state: AtomicU8,
    completion: Semaphore,
}

impl Default for LifecycleGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleGuard {
    /// Creates a guard in the pre-connected state: closed, idle, no pending signal.
    pub fn new() -> Self {
        Self {
            closed: AtomicBool::new(true),
            state: AtomicU8::new(LifecycleState::Idle as u8),
            completion: Semaphore::new(0),
        }
    }

    /// 检查连接是否已关闭
    /// Check whether the connection is closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Moves the state machine to `next` if the transition is legal.
    ///
    /// Returns the previous state on success, or the state that blocked the
    /// transition.
    pub fn transition(&self, next: LifecycleState) -> Result<LifecycleState, LifecycleState> {
        let mut current = self.state();
        loop {
            if !current.can_transition_to(next) {
                trace!(from = ?current, to = ?next, "Lifecycle transition rejected");
                return Err(current);
            }
            match self.state.compare_exchange_weak(
                current as u8,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    debug!(from = ?current, to = ?next, "Lifecycle transition");
                    return Ok(current);
                }
                Err(raw) => current = LifecycleState::from_u8(raw),
            }
        }
    }

    /// Opens a new cycle: `Idle`/`Closed` → `Connecting`, clears `closed`.
    ///
    /// Any completion left over from a previous cycle is discarded so that the
    /// next close waits for its own disconnect.
    ///
    /// 开启新的周期。
    pub fn open(&self) -> Result<(), LifecycleState> {
        self.transition(LifecycleState::Connecting)?;
        let stale = self.completion.available_permits();
        if stale > 0 {
            self.completion.forget_permits(stale);
        }
        self.closed.store(false, Ordering::Release);
        Ok(())
    }

    /// Claims the close of this cycle. Only one caller wins.
    ///
    /// 声明本周期的关闭，只有一个调用者能成功。
    pub fn begin_closing(&self) -> bool {
        !self.is_closed() && self.transition(LifecycleState::Closing).is_ok()
    }

    /// `Closing` → `Closed` and raises `closed`. Returns `false` if this cycle
    /// was not closing or another thread already finished it.
    ///
    /// 完成关闭，每个周期只会成功一次。
    pub fn finish_close(&self) -> bool {
        if self.transition(LifecycleState::Closed).is_err() {
            return false;
        }
        self.closed.store(true, Ordering::Release);
        true
    }

    /// Posts the completion signal.
    pub fn post_completion(&self) {
        self.completion.add_permits(1);
    }

    /// Waits for one completion post and consumes it.
    ///
    /// 等待一次完成信号并消耗它。
    pub async fn wait_for_completion(&self) {
        // The semaphore is never closed, so acquire only fails if that changes.
        if let Ok(permit) = self.completion.acquire().await {
            permit.forget();
        }
    }

    #[cfg(test)]
    pub(crate) fn pending_completions(&self) -> usize {
        self.completion.available_permits()
    }

    #[cfg(test)]
    pub(crate) fn force_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
