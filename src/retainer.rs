use std::{fmt, ptr::NonNull};

#[cfg(feature = "compressed")]
use std::{mem, ptr};

use crate::observer::{Core, Strong, Weak};

/// The ownership half of a strong observer, with the referent stripped off.
///
/// A `Retainer` holds zero or one strong count on a control block and can
/// mint [`Strong`] and [`Weak`] observers for *any* caller-supplied pointer
/// that share that block. It is how a [`Gate`](crate::Gate) keeps a value
/// pinned without remembering the value's type or address.
///
/// By default a `Retainer` stores an erased [`Strong`] and is two pointers
/// wide. With the `compressed` cargo feature it keeps only the control
/// block word and shrinks to one.
///
/// # Examples
///
/// ```
/// # use lifegate::{Gated, Retainer};
/// let mut cell = Gated::new(7u32);
/// let retainer = Retainer::new(cell.strong().unwrap());
///
/// // The retainer alone keeps the cell's teardown blocked, even though it
/// // has no idea what it is retaining.
/// let observer = unsafe { retainer.strong(cell.as_ptr()) }.unwrap();
/// assert!(observer.get() == &7);
///
/// drop(observer);
/// drop(retainer);
/// cell.reset();
/// ```
pub struct Retainer {
    #[cfg(not(feature = "compressed"))]
    held: Option<Strong<()>>,
    #[cfg(feature = "compressed")]
    core: *mut Core,
}

// A Retainer is only a count on the control block; it carries no referent
// and dereferences nothing.
unsafe impl Send for Retainer {}

unsafe impl Sync for Retainer {}

impl fmt::Debug for Retainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retainer")
            .field("armed", &self.is_armed())
            .finish()
    }
}

impl Retainer {
    /// Creates a retainer holding nothing.
    pub const fn empty() -> Self {
        #[cfg(not(feature = "compressed"))]
        {
            Retainer { held: None }
        }
        #[cfg(feature = "compressed")]
        {
            Retainer {
                core: ptr::null_mut(),
            }
        }
    }

    /// Consumes a strong observer, keeping only its control block part. The
    /// referent pointer inside `observer` is discarded.
    pub fn new<T>(observer: Strong<T>) -> Self {
        #[cfg(not(feature = "compressed"))]
        {
            Retainer {
                held: Some(observer.erase()),
            }
        }
        #[cfg(feature = "compressed")]
        {
            Retainer {
                core: observer.into_core().as_ptr(),
            }
        }
    }

    #[cfg(not(feature = "compressed"))]
    fn core(&self) -> Option<NonNull<Core>> {
        self.held.as_ref().map(|held| held.core_ptr())
    }

    #[cfg(feature = "compressed")]
    fn core(&self) -> Option<NonNull<Core>> {
        NonNull::new(self.core)
    }

    #[cfg(not(feature = "compressed"))]
    fn from_core(core: NonNull<Core>) -> Self {
        Retainer {
            held: Some(Strong::erased(core)),
        }
    }

    #[cfg(feature = "compressed")]
    fn from_core(core: NonNull<Core>) -> Self {
        Retainer {
            core: core.as_ptr(),
        }
    }

    /// Checks whether a count is held.
    pub fn is_armed(&self) -> bool {
        self.core().is_some()
    }

    /// Mints a strong observer carrying `object` as its referent but
    /// sharing this retainer's control block. Returns `None` when the
    /// retainer is empty or `object` is null.
    ///
    /// The retainer's own count keeps the block's strong count positive, so
    /// this is a plain increment, never a failing promotion.
    ///
    /// # Safety
    ///
    /// `*object` must remain valid for reads for as long as the returned
    /// observer (or anything cloned or upgraded from it) can be
    /// dereferenced.
    pub unsafe fn strong<T>(&self, object: *const T) -> Option<Strong<T>> {
        let core = self.core()?;
        let ptr = NonNull::new(object.cast_mut())?;

        core.as_ref().retain_strong();
        Some(Strong::from_raw_parts(ptr, core))
    }

    /// Mints a weak observer for `object` on this retainer's control block.
    /// Returns `None` when the retainer is empty or `object` is null.
    ///
    /// # Safety
    ///
    /// Same contract as [`strong`](Retainer::strong): `*object` must stay
    /// valid for as long as an upgrade of the returned observer can be
    /// dereferenced.
    pub unsafe fn weak<T>(&self, object: *const T) -> Option<Weak<T>> {
        let core = self.core()?;
        let ptr = NonNull::new(object.cast_mut())?;

        core.as_ref().retain_weak();
        Some(Weak::from_raw_parts(ptr, core))
    }

    /// Releases the held count. If it was the last strong reference on the
    /// block, the deleter fires synchronously before `reset` returns.
    pub fn reset(&mut self) {
        #[cfg(not(feature = "compressed"))]
        {
            self.held = None;
        }
        #[cfg(feature = "compressed")]
        {
            if let Some(core) = NonNull::new(mem::replace(&mut self.core, ptr::null_mut())) {
                unsafe { Core::release_strong(core) };
            }
        }
    }
}

impl Clone for Retainer {
    /// Cloning a live retainer adds one strong count; cloning an empty one
    /// yields another empty one.
    fn clone(&self) -> Self {
        match self.core() {
            Some(core) => {
                unsafe { core.as_ref() }.retain_strong();
                Retainer::from_core(core)
            }
            None => Retainer::empty(),
        }
    }
}

impl Default for Retainer {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(feature = "compressed")]
impl Drop for Retainer {
    fn drop(&mut self) {
        self.reset();
    }
}
