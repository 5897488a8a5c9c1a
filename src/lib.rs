//! Weak and strong references to values that live anywhere.
//!
//! The provided [`Strong`] and [`Weak`] observer handles look a lot like
//! [`std::sync::Arc`] and [`std::sync::Weak`], with one inversion: they
//! never own their referent. The value stays wherever its owner put it — on
//! the stack, inside another struct, in a heap cell — and the owner keeps
//! the exclusive right to destroy it. What a `Strong` buys its holder is a
//! delay: the owner's teardown ([`Gate::disarm`], or dropping a [`Gated`])
//! blocks until every outstanding `Strong` has been released. A `Weak`
//! costs nothing to hand out and upgrades to a `Strong` only while the
//! owner has not started tearing the value down.
//!
//! This was designed for asynchronous callbacks: observers can be destroyed
//! at will, on whichever thread owns them, while in-flight callbacks briefly
//! pin them through an upgrade. The one-shot handshake is far lighter than a
//! mutex — arming costs one allocation for the shared count, minting an
//! observer costs one atomic increment, and in the common case the
//! disarming thread finds the count already drained and never blocks.
//!
//! [`Gated`] wraps a value together with its gate and is the safe,
//! recommended entry point. The raw [`Gate`] (and the [`Retainer`] it is
//! built from) works on bare pointers for values embedded elsewhere.
//!
//! ```
//! use lifegate::Gated;
//! use std::sync::Mutex;
//!
//! let mut journal = Gated::new(Mutex::new(Vec::new()));
//! let weak = journal.weak().unwrap();
//!
//! let writer = std::thread::spawn(move || {
//!     // The upgrade pins the journal alive for the duration of the push;
//!     // a failed upgrade means the owner is already tearing it down.
//!     if let Some(journal) = weak.upgrade() {
//!         journal.get().lock().unwrap().push("entry");
//!     }
//! });
//!
//! // Waits for the writer's strong handle, if any, then destroys the
//! // journal. No entry can arrive after this line.
//! journal.reset();
//! writer.join().unwrap();
//! ```
//!
//! Two cargo features tune the crate. `native-wait` (default) parks the
//! disarming thread in the OS until the last strong handle is gone;
//! without it the wait is a spin phase followed by exponentially backed-off
//! sleeps, tuned by [`SPIN_COUNT`] and [`SLEEP_MAX_USEC_LOG2`].
//! `compressed` (off by default) shrinks [`Retainer`] — and with it every
//! [`Gate`] — to a single pointer-sized word.
//!
//! One hazard is worth repeating: a thread that disarms a gate while itself
//! holding a `Strong` minted from that gate waits for itself, forever. Drop
//! your handles before tearing down, or tear down from a different thread.

mod gate;
mod gated;
mod observer;
mod retainer;
mod signal;

pub use crate::gate::Gate;
pub use crate::gated::Gated;
pub use crate::observer::{Strong, Weak};
pub use crate::retainer::Retainer;
pub use crate::signal::{SLEEP_MAX_USEC_LOG2, SPIN_COUNT};

#[cfg(test)]
mod test;
