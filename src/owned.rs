//! The move-only exclusive-ownership handle.

use core::ops::{Deref, DerefMut};
use core::ptr::NonNull;

use crate::alloc::AllocError;
use crate::control::PtrBlock;
use crate::shared::Shared;

/// A move-only handle owning a single separately-allocated object.
///
/// No counting, no concurrency: exactly one `Owned` holds the object, and
/// the cleanup function runs when the handle drops, is reset, or is
/// converted into a [`Shared`]. The handle may be empty (after
/// [`Owned::release`] or default construction); dereferencing an empty
/// handle panics.
pub struct Owned<T> {
    ptr: Option<NonNull<T>>,
    drop_fn: unsafe fn(*mut T),
}

// SAFETY: `Owned` is a unique owner, so sending it sends the `T`; sharing
// it only shares `&T`.
unsafe impl<T: Send> Send for Owned<T> {}
unsafe impl<T: Sync> Sync for Owned<T> {}

impl<T> Owned<T> {
    /// Boxes `value` and takes exclusive ownership of the allocation.
    #[must_use]
    pub fn new(value: T) -> Self {
        // SAFETY: the pointer came from `Box::into_raw` and matches the
        // default cleanup
        unsafe { Self::from_raw(Box::into_raw(Box::new(value))) }
    }

    /// The empty handle.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            ptr: None,
            drop_fn: drop_via_box::<T>,
        }
    }

    /// Takes ownership of `ptr`, to be released with the default cleanup
    /// (`Box::from_raw` + drop). A null `ptr` yields the empty handle.
    ///
    /// # Safety
    /// `ptr` must be null or have come from `Box::into_raw`, and must not
    /// be aliased or accessed after this call.
    #[must_use]
    pub unsafe fn from_raw(ptr: *mut T) -> Self {
        // SAFETY: forwarded caller contract
        unsafe { Self::from_raw_with(ptr, drop_via_box::<T>) }
    }

    /// Takes ownership of `ptr` with a caller-supplied cleanup function.
    ///
    /// # Safety
    /// `ptr` must be null or valid for `drop_fn` to release exactly once,
    /// and must not be aliased or accessed after this call.
    #[must_use]
    pub unsafe fn from_raw_with(ptr: *mut T, drop_fn: unsafe fn(*mut T)) -> Self {
        Self {
            ptr: NonNull::new(ptr),
            drop_fn,
        }
    }

    /// Gives up ownership and returns the raw pointer (null if empty). The
    /// caller becomes responsible for releasing it.
    pub fn release(&mut self) -> *mut T {
        self.ptr
            .take()
            .map_or(core::ptr::null_mut(), NonNull::as_ptr)
    }

    /// Releases the owned object (if any), leaving the handle empty.
    pub fn reset(&mut self) {
        if let Some(ptr) = self.ptr.take() {
            // SAFETY: we owned the object and release it exactly once
            unsafe { (self.drop_fn)(ptr.as_ptr()) }
        }
    }

    /// Releases the owned object (if any) and takes ownership of `ptr` in
    /// its place.
    ///
    /// # Safety
    /// Same contract as [`Owned::from_raw`]; the cleanup function is kept.
    pub unsafe fn reset_raw(&mut self, ptr: *mut T) {
        self.reset();
        self.ptr = NonNull::new(ptr);
    }

    /// Raw element pointer; null iff the handle is empty.
    #[must_use]
    pub fn as_ptr(&self) -> *const T {
        self.ptr
            .map_or(core::ptr::null(), |ptr| ptr.as_ptr().cast_const())
    }

    /// Shared reference to the owned object, or [`None`] if empty.
    #[must_use]
    pub fn get(&self) -> Option<&T> {
        // SAFETY: we exclusively own the object
        self.ptr.map(|ptr| unsafe { &*ptr.as_ptr() })
    }

    /// Mutable reference to the owned object, or [`None`] if empty.
    #[must_use]
    pub fn get_mut(&mut self) -> Option<&mut T> {
        // SAFETY: we exclusively own the object and hold `&mut self`
        self.ptr.map(|ptr| unsafe { &mut *ptr.as_ptr() })
    }

    /// Whether this handle owns nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ptr.is_none()
    }
}

impl<T> Drop for Owned<T> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<T> Deref for Owned<T> {
    type Target = T;

    /// # Panics
    /// Dereferencing an empty handle is a caller contract violation and
    /// panics.
    fn deref(&self) -> &T {
        match self.get() {
            Some(value) => value,
            None => panic!("dereferenced an empty Owned handle"),
        }
    }
}

impl<T> DerefMut for Owned<T> {
    fn deref_mut(&mut self) -> &mut T {
        match self.get_mut() {
            Some(value) => value,
            None => panic!("dereferenced an empty Owned handle"),
        }
    }
}

impl<T> Default for Owned<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> From<Owned<T>> for Shared<T> {
    /// Hands the owned object over to the shared subsystem, keeping the
    /// exclusive handle's cleanup function for eventual disposal. An empty
    /// `Owned` becomes the empty `Shared`.
    fn from(mut owned: Owned<T>) -> Self {
        let drop_fn = owned.drop_fn;
        let ptr = owned.release();
        if ptr.is_null() {
            return Self::empty();
        }
        // SAFETY: `owned` held the object exclusively and has given it up;
        // `drop_fn` is the cleanup it was created with
        match unsafe { Self::adopt_raw_with(ptr, drop_fn) } {
            Ok(this) => this,
            Err(AllocError(())) => crate::alloc::handle_alloc_error::<PtrBlock<T>>(),
        }
    }
}

impl<T: core::fmt::Debug> core::fmt::Debug for Owned<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.get() {
            Some(value) => value.fmt(f),
            None => f.write_str("<empty>"),
        }
    }
}

unsafe fn drop_via_box<T>(ptr: *mut T) {
    // SAFETY: `ptr` came from `Box::into_raw` per the construction contract
    drop(unsafe { Box::from_raw(ptr) });
}
