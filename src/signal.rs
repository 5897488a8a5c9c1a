use std::{
    ptr, sync::atomic::AtomicU32, sync::atomic::Ordering::Acquire, sync::atomic::Ordering::Release,
};

#[cfg(feature = "native-wait")]
use atomic_wait::{wait, wake_one};

#[cfg(not(feature = "native-wait"))]
use std::{hint, thread, time::Duration};

/// Iterations of the spin phase before the backoff waiter starts sleeping.
/// Only meaningful without the `native-wait` feature.
pub const SPIN_COUNT: usize = 1 << 14;

/// Upper bound on the backoff exponent: sleeps grow from 1 µs up to
/// 2^`SLEEP_MAX_USEC_LOG2` µs (about 0.26 s) and stay there. Only
/// meaningful without the `native-wait` feature.
pub const SLEEP_MAX_USEC_LOG2: u32 = 18;

const PENDING: u32 = 1;
const FIRED: u32 = 0;

/// One-shot event separating "some strong handle is still out there" from
/// "the last one is gone". Starts pending; the final strong release fires
/// it exactly once per arm cycle.
pub(crate) struct Signal {
    state: AtomicU32,
}

impl Signal {
    pub(crate) const fn pending() -> Self {
        Signal {
            state: AtomicU32::new(PENDING),
        }
    }

    /// Marks the event fired and wakes the waiter.
    ///
    /// The flag is still alive for the whole call: the waiter cannot return
    /// (and the storage cannot be repurposed) before this store becomes
    /// visible to it.
    pub(crate) unsafe fn fire(this: *const Signal) {
        let state = ptr::addr_of!((*this).state);
        (*state).store(FIRED, Release);

        #[cfg(feature = "native-wait")]
        wake_one(&*state);
    }

    #[cfg(feature = "native-wait")]
    pub(crate) fn wait_fired(&self) {
        while self.state.load(Acquire) != FIRED {
            wait(&self.state, PENDING);
        }
    }

    /// Spin, then sleep with exponential backoff. The common case is that
    /// the waiter itself just released the last strong handle, so the first
    /// load already observes the fired state and nothing sleeps.
    #[cfg(not(feature = "native-wait"))]
    pub(crate) fn wait_fired(&self) {
        for _ in 0..SPIN_COUNT {
            if self.state.load(Acquire) == FIRED {
                return;
            }
            hint::spin_loop();
        }

        let mut exp: u32 = 0;
        while self.state.load(Acquire) != FIRED {
            thread::sleep(Duration::from_micros(
                1u64 << exp.min(SLEEP_MAX_USEC_LOG2),
            ));
            exp += 1;
        }
    }
}
