use std::{
    cell::UnsafeCell, fmt, hint, mem::ManuallyDrop, ptr, ptr::NonNull,
    sync::atomic::AtomicUsize, sync::atomic::Ordering::Acquire, sync::atomic::Ordering::Relaxed,
    sync::atomic::Ordering::Release,
};

use crate::observer::{Strong, Weak};
use crate::retainer::Retainer;
use crate::signal::Signal;

/// Storage shared by the two phases of an arm cycle. While armed it holds
/// the retainer; during disarm the same bytes hold the signal the deleter
/// fires. The interpretations never overlap in time — the guard word and
/// the disarm sequence decide which one is live.
union Slot {
    retainer: ManuallyDrop<Retainer>,
    signal: ManuallyDrop<Signal>,
}

// Guard word layout: two state bits plus, above them, the number of minters
// currently reading the slot.
const EMPTY: usize = 0;
const ARMED: usize = 1;
const DISARMING: usize = 2;
const STATE_MASK: usize = 0b11;
const MINTER_ONE: usize = 4;

/// A one-shot lifetime barrier.
///
/// An armed `Gate` hands out [`Strong`] and [`Weak`] observers for a value
/// it does not own — the value can live on the stack, in a struct field, or
/// in a heap cell; its allocation is none of the gate's business. What the
/// gate guarantees is ordering at the end of life: [`disarm`](Gate::disarm)
/// (and the gate's drop) blocks until every `Strong` minted from it has
/// been released. The owner then knows no other thread can still be
/// touching the value and may destroy it wherever and however it likes.
///
/// A shared `&Gate` may mint observers from any number of threads, even
/// while the owner is inside `disarm`: a mint that loses that race simply
/// returns `None`, and one that wins produces an observer whose release the
/// disarm waits for.
///
/// The raw `Gate` is an unsafe building block: it works with bare pointers
/// and leaves the referent's validity to the caller. For a safe package of
/// value-plus-gate see [`Gated`](crate::Gated).
///
/// # Examples
///
/// ```
/// use lifegate::Gate;
///
/// let value = 5u32;
/// let mut gate = Gate::new();
///
/// unsafe {
///     gate.arm(&value);
///
///     let strong = gate.strong(&value).unwrap();
///     assert!(strong.get() == &5);
///     drop(strong);
///
///     // Would block here if `strong` were still alive.
///     gate.disarm();
/// }
/// ```
///
/// # Deadlock
///
/// If the disarming thread itself holds a `Strong` (or a live
/// [`Retainer`]) minted from the same gate, `disarm` waits on itself,
/// forever. This is defined behavior, not defended against.
pub struct Gate {
    slot: UnsafeCell<Slot>,
    guard: AtomicUsize,
}

// The slot is only restructured by the thread that claimed the guard's
// disarming state, after the registered minters have drained; the signal
// bytes the deleter thread writes and the waiter reads are atomics.
unsafe impl Send for Gate {}

unsafe impl Sync for Gate {}

impl fmt::Debug for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gate")
            .field("armed", &self.is_armed())
            .finish()
    }
}

impl Gate {
    /// Creates an empty gate. Arming it later is what allocates.
    pub const fn new() -> Self {
        Gate {
            slot: UnsafeCell::new(Slot {
                retainer: ManuallyDrop::new(Retainer::empty()),
            }),
            guard: AtomicUsize::new(EMPTY),
        }
    }

    /// Checks whether the gate is armed. Reports `false` from the moment a
    /// disarm begins.
    pub fn is_armed(&self) -> bool {
        self.guard.load(Acquire) & STATE_MASK == ARMED
    }

    /// Registers as a minter while the gate is armed. On success the slot's
    /// retainer stays in place until [`exit_mint`](Gate::exit_mint).
    fn enter_mint(&self) -> bool {
        let mut guard = self.guard.load(Acquire);
        loop {
            if guard & STATE_MASK != ARMED {
                return false;
            }

            match self
                .guard
                .compare_exchange_weak(guard, guard + MINTER_ONE, Acquire, Relaxed)
            {
                Ok(_) => return true,
                Err(current) => guard = current,
            }
        }
    }

    fn exit_mint(&self) {
        self.guard.fetch_sub(MINTER_ONE, Release);
    }

    /// Arms the gate on `object`: allocates a shared count and takes one
    /// reference on it, to be given back by [`disarm`](Gate::disarm). A
    /// null `object` is rejected and the gate stays empty.
    ///
    /// Arm before sharing the gate (or any observer) with other threads.
    ///
    /// # Panics
    ///
    /// Panics if the gate is already armed.
    ///
    /// # Safety
    ///
    /// `*object` must remain valid until `disarm` has returned (or, if the
    /// gate is leaked, forever). Observers minted for other pointers carry
    /// their own validity contract; see [`Retainer::strong`].
    pub unsafe fn arm<T>(&mut self, object: *const T) {
        assert!(
            self.guard.load(Relaxed) & STATE_MASK == EMPTY,
            "arming a gate that is already armed"
        );

        let Some(ptr) = NonNull::new(object.cast_mut()) else {
            return;
        };

        let first = Strong::first(ptr);
        self.slot.get().write(Slot {
            retainer: ManuallyDrop::new(Retainer::new(first)),
        });
        self.guard.store(ARMED, Release);
    }

    /// Mints a weak observer for `object`, or `None` while the gate is
    /// empty or already tearing down.
    ///
    /// # Safety
    ///
    /// Same contract as [`Retainer::weak`].
    pub unsafe fn weak<T>(&self, object: *const T) -> Option<Weak<T>> {
        if !self.enter_mint() {
            return None;
        }

        let minted = (*self.slot.get()).retainer.weak(object);
        self.exit_mint();
        minted
    }

    /// Mints a strong observer for `object`, or `None` while the gate is
    /// empty or already tearing down. The observer delays `disarm` until it
    /// is dropped.
    ///
    /// # Safety
    ///
    /// Same contract as [`Retainer::strong`].
    pub unsafe fn strong<T>(&self, object: *const T) -> Option<Strong<T>> {
        if !self.enter_mint() {
            return None;
        }

        let minted = (*self.slot.get()).retainer.strong(object);
        self.exit_mint();
        minted
    }

    /// Gives back the reference taken by [`arm`](Gate::arm) and waits until
    /// every strong observer is gone. A no-op on an empty gate; afterwards
    /// the gate is empty again and may be re-armed on a fresh address.
    ///
    /// Minting from other threads may race with this call freely: mints
    /// that get in before the teardown claims the gate produce observers
    /// this call then waits for, later ones return `None`. Disarming the
    /// same gate from two threads at once is a misuse; the losing call
    /// returns immediately without waiting.
    ///
    /// Weak observers minted before the disarm survive it, but their
    /// upgrades return `None` from here on.
    pub fn disarm(&self) {
        // Claim the armed payload. An empty gate, or one that some other
        // thread is already tearing down, is left alone.
        let mut guard = self.guard.load(Relaxed);
        loop {
            if guard & STATE_MASK != ARMED {
                return;
            }

            let claimed = (guard & !STATE_MASK) | DISARMING;
            match self
                .guard
                .compare_exchange_weak(guard, claimed, Acquire, Relaxed)
            {
                Ok(_) => break,
                Err(current) => guard = current,
            }
        }

        // New minters now bounce off; wait out the ones still holding the
        // retainer. Each leaves within a few atomic operations.
        while self.guard.load(Acquire) & !STATE_MASK != 0 {
            hint::spin_loop();
        }

        let this = self as *const Gate;
        let slot = self.slot.get();

        unsafe {
            // Keep the strong count above zero while the slot changes
            // interpretation.
            let tmp = (*slot).retainer.strong::<Gate>(this).unwrap_unchecked();
            ManuallyDrop::drop(&mut (*slot).retainer);

            // The vacated bytes become the signal, pending until the last
            // release. Publish it while `tmp` still pins the count, so the
            // zero transition always sees where to report.
            ptr::addr_of_mut!((*slot).signal).write(ManuallyDrop::new(Signal::pending()));
            let signal = ptr::addr_of!((*slot).signal).cast::<Signal>();
            tmp.publish_signal(signal);

            // Possibly the last strong reference. Then the deleter runs
            // right here and the wait below returns on its first load.
            drop(tmp);

            (*slot).signal.wait_fired();
        }

        self.guard.store(EMPTY, Release);
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Gate {
    fn drop(&mut self) {
        self.disarm();
    }
}
