//! The non-owning observer handle.

use crate::control::{Header, RawHandle};
use crate::shared::Shared;

/// A non-owning observer of an object managed by [`Shared`] handles.
///
/// A `Weak` never keeps the object alive and never raises its
/// [`use_count`](Shared::use_count); it only pins the control block's
/// bookkeeping memory, so that expiry can still be answered after the
/// object is gone. It is the designated way to break cycles of owning
/// handles: store one direction of the cycle as a `Weak` and
/// [`upgrade`](Weak::upgrade) it on use.
///
/// The element pointer held by a `Weak` may be stale; the only way to
/// reach the object is a successful `upgrade`.
pub struct Weak<T: ?Sized> {
    raw: Option<RawHandle<T>>,
}

// SAFETY: same reasoning as for `Shared`; a `Weak` can produce a `Shared`
// on any thread via `upgrade`.
unsafe impl<T: ?Sized + Send + Sync> Send for Weak<T> {}
unsafe impl<T: ?Sized + Send + Sync> Sync for Weak<T> {}

impl<T: ?Sized> Weak<T> {
    /// The empty observer: refers to no block at all, reports itself
    /// expired forever.
    #[must_use]
    pub const fn new() -> Self {
        Self { raw: None }
    }

    /// Number of owning handles still keeping the object alive; 0 if the
    /// object is gone or this observer is empty.
    #[must_use]
    pub fn use_count(&self) -> usize {
        self.raw
            // SAFETY: our weak reference keeps the block alive
            .map_or(0, |raw| unsafe { raw.block.as_ref() }.strong_count())
    }

    /// Whether the observed object has been disposed (or was never there).
    #[must_use]
    pub fn expired(&self) -> bool {
        self.use_count() == 0
    }

    /// Attempts to produce an owning handle to the observed object.
    ///
    /// The strong count is raised with a single increment-if-nonzero
    /// operation, so the returned handle either extended the object's
    /// lifetime as one more concurrent owner, or the object was already
    /// gone and [`None`] is returned. A disposed object is never observed.
    #[must_use]
    pub fn upgrade(&self) -> Option<Shared<T>> {
        let raw = self.raw?;
        // SAFETY: our weak reference keeps the block alive
        if unsafe { raw.block.as_ref() }.try_acquire_strong() {
            Some(Shared::from_parts(raw))
        } else {
            None
        }
    }

    /// Drops this observer's interest, leaving it empty.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Assembles an observer from a pointer pair whose weak count has
    /// already been acquired by the caller.
    pub(crate) fn from_parts(raw: RawHandle<T>) -> Self {
        Self { raw: Some(raw) }
    }
}

impl<T: ?Sized> Clone for Weak<T> {
    fn clone(&self) -> Self {
        if let Some(raw) = self.raw {
            // SAFETY: our weak reference keeps the block alive
            unsafe { raw.block.as_ref() }.acquire_weak();
        }
        Self { raw: self.raw }
    }
}

impl<T: ?Sized> Drop for Weak<T> {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            // SAFETY: we held one weak reference and give it up; the block
            // pointer is not used again
            unsafe {
                Header::release_weak(raw.block);
            }
        }
    }
}

impl<T: ?Sized> Default for Weak<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> core::fmt::Debug for Weak<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("(Weak)")
    }
}
