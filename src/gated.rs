use std::{fmt, ptr};

use crate::gate::Gate;
use crate::observer::{Strong, Weak};

/// A value packaged with its own [`Gate`] so the ordering cannot go wrong.
///
/// `Gated<T>` owns a `T` and arms a gate on it, in that order; on
/// [`reset`](Gated::reset) (or drop) it disarms first and destroys the
/// value second. Other threads observe the value through [`Weak`] and
/// [`Strong`] handles; any strong handle they hold delays the teardown
/// until it is released. Like `Option`, a `Gated` can also be empty.
///
/// The value sits in its own heap cell, which keeps its address stable
/// while the `Gated` itself moves around freely.
///
/// # Examples
///
/// ```
/// use lifegate::Gated;
/// use std::sync::Mutex;
///
/// let mut log = Gated::new(Mutex::new(Vec::new()));
/// let weak = log.weak().unwrap();
///
/// let writer = std::thread::spawn(move || {
///     if let Some(log) = weak.upgrade() {
///         log.get().lock().unwrap().push("entry");
///     }
/// });
///
/// // Blocks until the writer's strong handle (if it got one) is gone,
/// // then destroys the log. Nothing can be pushed after this line.
/// log.reset();
/// writer.join().unwrap();
/// ```
pub struct Gated<T> {
    gate: Gate,
    value: Option<Box<T>>,
}

impl<T> fmt::Debug for Gated<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut f = f.debug_tuple("Gated");
        if let Some(value) = self.get() {
            f.field(value);
        }
        f.finish()
    }
}

impl<T> Gated<T> {
    /// Creates an empty cell. Nothing is allocated until a value goes in.
    pub const fn empty() -> Self {
        Gated {
            gate: Gate::new(),
            value: None,
        }
    }

    /// Creates a cell holding `value`, armed and ready to mint observers.
    pub fn new(value: T) -> Self {
        let mut cell = Gated::empty();
        cell.set(value);
        cell
    }

    /// Replaces the contents. Any previous value is torn down first, with
    /// the usual blocking handshake.
    pub fn set(&mut self, value: T) {
        self.reset();

        let value = self.value.insert(Box::new(value));
        // The box pins the value's address, upholding the arm contract for
        // as long as `reset` disarms before releasing it.
        unsafe { self.gate.arm::<T>(&**value) };
    }

    /// Checks whether the cell holds a value.
    pub fn has_value(&self) -> bool {
        self.gate.is_armed()
    }

    /// Gets a reference to the value, or `None` when empty.
    pub fn get(&self) -> Option<&T> {
        self.value.as_deref()
    }

    /// Gets a raw pointer to the value; null when empty.
    pub fn as_ptr(&self) -> *const T {
        match &self.value {
            Some(value) => &**value,
            None => ptr::null(),
        }
    }

    /// Mints a weak observer for the value, or `None` when empty.
    ///
    /// # Examples
    ///
    /// ```
    /// # use lifegate::Gated;
    /// let mut cell = Gated::new(1u32);
    /// let weak = cell.weak().unwrap();
    ///
    /// assert!(weak.upgrade().is_some());
    /// cell.reset();
    /// assert!(weak.upgrade().is_none());
    /// ```
    pub fn weak(&self) -> Option<Weak<T>> {
        let value = self.value.as_deref()?;
        unsafe { self.gate.weak(value) }
    }

    /// Mints a strong observer for the value, or `None` when empty. The
    /// observer delays [`reset`](Gated::reset) until it is dropped —
    /// including a `reset` on the thread holding it, which then deadlocks.
    ///
    /// # Examples
    ///
    /// ```
    /// # use lifegate::Gated;
    /// let cell = Gated::new(vec![1, 2, 3]);
    /// let strong = cell.strong().unwrap();
    ///
    /// assert!(strong.get().len() == 3);
    /// ```
    pub fn strong(&self) -> Option<Strong<T>> {
        let value = self.value.as_deref()?;
        unsafe { self.gate.strong(value) }
    }

    /// Empties the cell: waits for all strong observers to be released,
    /// then destroys the value, strictly in that order. A no-op when
    /// already empty.
    pub fn reset(&mut self) {
        self.gate.disarm();
        self.value = None;
    }

    /// Like [`reset`](Gated::reset), but the value is handed back instead
    /// of destroyed.
    pub fn take(&mut self) -> Option<T> {
        self.gate.disarm();
        self.value.take().map(|value| *value)
    }
}

impl<T> Default for Gated<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> Drop for Gated<T> {
    fn drop(&mut self) {
        self.reset();
    }
}
