//! The owning shared-reference handle.

use core::marker::PhantomData;
use core::ops::Deref;
use core::ptr::NonNull;

use crate::alloc::{self, AllocError};
use crate::control::{Header, PtrBlock, RawHandle, ValueBlock};
use crate::weak::Weak;

/// A reference-counted owning handle to a `T`.
///
/// Every clone shares one control block and keeps the managed object alive;
/// the object is disposed exactly once, when the last owning handle is
/// dropped or reset. [`Weak`] observers never delay disposal, only the
/// reclamation of the block's own bookkeeping memory.
///
/// A handle may be *empty* (no object, no block): the result of
/// [`Shared::empty`], [`Default::default`], or a failed dynamic cast.
/// Dereferencing an empty handle is a precondition violation and panics.
///
/// Cycles of owning handles are never collected; the escape hatch is
/// storing one direction of the cycle as a [`Weak`].
pub struct Shared<T: ?Sized> {
    raw: Option<RawHandle<T>>,
    _own: PhantomData<T>,
}

// SAFETY: a clone may be dropped (and thus drop the `T`) on any thread, and
// every handle can reach the shared `T` by reference, so both bounds are
// required, as for std's Arc.
unsafe impl<T: ?Sized + Send + Sync> Send for Shared<T> {}
unsafe impl<T: ?Sized + Send + Sync> Sync for Shared<T> {}

impl<T> Shared<T> {
    /// Allocates a control block with `value` constructed inside it.
    ///
    /// This is the preferred way to create a new object: one allocation
    /// holds both the counts and the storage, instead of the two-allocation
    /// pattern of [`Shared::adopt_raw`].
    ///
    /// Diverts to [`std::alloc::handle_alloc_error`] on allocation failure.
    #[must_use]
    pub fn new(value: T) -> Self {
        match Self::try_new(value) {
            Ok(this) => this,
            Err(AllocError(())) => alloc::handle_alloc_error::<ValueBlock<T>>(),
        }
    }

    /// Fallible form of [`Shared::new`].
    ///
    /// # Errors
    /// Returns [`AllocError`] if the block allocation fails; `value` is
    /// dropped in that case.
    pub fn try_new(value: T) -> Result<Self, AllocError> {
        match ValueBlock::allocate(value) {
            Some(raw) => Ok(Self {
                raw: Some(raw),
                _own: PhantomData,
            }),
            None => Err(AllocError(())),
        }
    }

    /// Adopts a separately-allocated object, releasing it with the default
    /// cleanup (`Box::from_raw` + drop) when the last owner drops.
    ///
    /// # Errors
    /// Returns [`AllocError`] if the bookkeeping allocation fails. The
    /// adopted allocation has already been released when the error is
    /// returned; `ptr` must not be used again either way.
    ///
    /// # Safety
    /// `ptr` must have come from `Box::into_raw` and must not be aliased or
    /// accessed after this call.
    pub unsafe fn adopt_raw(ptr: *mut T) -> Result<Self, AllocError> {
        // SAFETY: forwarded caller contract; the cleanup matches the
        // required provenance
        unsafe { Self::adopt_raw_with(ptr, drop_via_box::<T>) }
    }

    /// Adopts a separately-allocated object with a caller-supplied cleanup
    /// function.
    ///
    /// # Errors
    /// Returns [`AllocError`] if the bookkeeping allocation fails; on that
    /// path `drop_fn` has already been run on `ptr` (the adopted
    /// allocation never leaks).
    ///
    /// # Safety
    /// `ptr` must be non-null, valid for `drop_fn` to release exactly once,
    /// and must not be aliased or accessed after this call.
    pub unsafe fn adopt_raw_with(
        ptr: *mut T,
        drop_fn: unsafe fn(*mut T),
    ) -> Result<Self, AllocError> {
        match PtrBlock::allocate(ptr, drop_fn) {
            Some(block) => Ok(Self {
                raw: Some(RawHandle {
                    // SAFETY: non-null per the caller contract
                    ptr: unsafe { NonNull::new_unchecked(ptr) },
                    block,
                }),
                _own: PhantomData,
            }),
            None => {
                // SAFETY: we own the adopted allocation and release it
                // exactly once before reporting the failure
                unsafe { drop_fn(ptr) };
                Err(AllocError(()))
            }
        }
    }

    /// Replaces the referent with a freshly adopted allocation, releasing
    /// the previous one (if any).
    ///
    /// # Errors
    /// Returns [`AllocError`] if the bookkeeping allocation fails; the
    /// handle is left unchanged and the adopted allocation has already been
    /// released.
    ///
    /// # Safety
    /// Same contract as [`Shared::adopt_raw`].
    pub unsafe fn reset_raw(&mut self, ptr: *mut T) -> Result<(), AllocError> {
        // SAFETY: forwarded caller contract
        *self = unsafe { Self::adopt_raw(ptr)? };
        Ok(())
    }

    /// Raw element pointer; null iff the handle is empty.
    #[must_use]
    pub fn as_ptr(&self) -> *const T {
        self.raw
            .map_or(core::ptr::null(), |raw| raw.ptr.as_ptr().cast_const())
    }
}

impl<T: ?Sized> Shared<T> {
    /// The empty handle: no object, no control block.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            raw: None,
            _own: PhantomData,
        }
    }

    /// Whether this handle refers to nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.raw.is_none()
    }

    /// Shared reference to the managed object, or [`None`] for the empty
    /// handle.
    #[must_use]
    pub fn get(&self) -> Option<&T> {
        // SAFETY: a non-empty handle holds a strong reference, so the
        // object outlives `self`
        self.raw.map(|raw| unsafe { raw.ptr.as_ref() })
    }

    /// Number of owning handles sharing this object; 0 for the empty
    /// handle.
    #[must_use]
    pub fn use_count(&self) -> usize {
        self.raw
            // SAFETY: a non-empty handle keeps its block alive
            .map_or(0, |raw| unsafe { raw.block.as_ref() }.strong_count())
    }

    /// Whether both handles share one control block (and hence one object).
    /// Two empty handles compare equal.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self.raw, other.raw) {
            (Some(a), Some(b)) => a.block == b.block,
            (None, None) => true,
            _ => false,
        }
    }

    /// Drops this handle's ownership, leaving it empty.
    pub fn reset(&mut self) {
        *self = Self::empty();
    }

    /// Creates a non-owning observer of the managed object.
    ///
    /// The observer never extends the object's lifetime; it can only
    /// report expiry or be upgraded back into an owner while one still
    /// exists.
    #[must_use]
    pub fn downgrade(&self) -> Weak<T> {
        match self.raw {
            Some(raw) => {
                // SAFETY: our strong reference keeps the block alive
                unsafe { raw.block.as_ref() }.acquire_weak();
                Weak::from_parts(raw)
            }
            None => Weak::new(),
        }
    }

    /// Assembles a handle from a pointer pair whose strong count has
    /// already been acquired by the caller.
    pub(crate) fn from_parts(raw: RawHandle<T>) -> Self {
        Self {
            raw: Some(raw),
            _own: PhantomData,
        }
    }

    pub(crate) fn parts(&self) -> Option<RawHandle<T>> {
        self.raw
    }
}

impl<T: ?Sized> Clone for Shared<T> {
    fn clone(&self) -> Self {
        if let Some(raw) = self.raw {
            // SAFETY: our strong reference keeps the block alive
            unsafe { raw.block.as_ref() }.acquire_strong();
        }
        Self {
            raw: self.raw,
            _own: PhantomData,
        }
    }
}

impl<T: ?Sized> Drop for Shared<T> {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            // SAFETY: we held one strong reference and give it up; the
            // block pointer is not used again
            unsafe {
                Header::release_strong(raw.block);
            }
        }
    }
}

impl<T: ?Sized> Deref for Shared<T> {
    type Target = T;

    /// # Panics
    /// Dereferencing an empty handle is a caller contract violation and
    /// panics.
    fn deref(&self) -> &T {
        match self.get() {
            Some(value) => value,
            None => panic!("dereferenced an empty Shared handle"),
        }
    }
}

impl<T: ?Sized> Default for Shared<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> From<Box<T>> for Shared<T> {
    /// Adopts a boxed object. Diverts to the allocation failure handler if
    /// the bookkeeping allocation fails (the box is released first).
    fn from(boxed: Box<T>) -> Self {
        let ptr = Box::into_raw(boxed);
        // SAFETY: `ptr` came from `Box::into_raw` and is not used again
        match unsafe { Self::adopt_raw(ptr) } {
            Ok(this) => this,
            Err(AllocError(())) => alloc::handle_alloc_error::<PtrBlock<T>>(),
        }
    }
}

impl<T: ?Sized + core::fmt::Debug> core::fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.get() {
            Some(value) => value.fmt(f),
            None => f.write_str("<empty>"),
        }
    }
}

unsafe fn drop_via_box<T>(ptr: *mut T) {
    // SAFETY: `ptr` came from `Box::into_raw` per the adopt contract
    drop(unsafe { Box::from_raw(ptr) });
}
