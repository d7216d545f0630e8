//! Allocation plumbing for control blocks.
//!
//! Handles always allocate their bookkeeping from the global allocator;
//! pluggable allocators are deliberately out of scope. Allocation failure is
//! reported as [`None`] and surfaced to fallible constructors as
//! [`AllocError`]; infallible constructors divert to
//! [`std::alloc::handle_alloc_error`].

use core::alloc::Layout;
use core::ptr::NonNull;

/// Error returned when a bookkeeping or object allocation fails.
///
/// The constructors that return this error guarantee that any allocation
/// adopted by the failed call has already been released.
#[derive(Debug, Hash, PartialEq, Eq, Clone, Copy)]
pub struct AllocError(pub(crate) ());

impl core::fmt::Display for AllocError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("control block allocation failed")
    }
}

impl std::error::Error for AllocError {}

/// Allocates uninitialized storage for a `B` from the global allocator.
///
/// Returns [`None`] on allocation failure.
pub(crate) fn allocate<B>() -> Option<NonNull<B>> {
    let layout = Layout::new::<B>();
    // Every block type embeds a count header, so the layout is never
    // zero-sized.
    debug_assert!(layout.size() != 0);
    // SAFETY: layout has a non-zero size
    let ptr = unsafe { std::alloc::alloc(layout) };
    NonNull::new(ptr.cast::<B>())
}

/// Returns storage obtained from [`allocate`] to the global allocator.
///
/// # Safety
/// `ptr` must have been returned from [`allocate::<B>`] and must not be used
/// after this call.
pub(crate) unsafe fn deallocate<B>(ptr: NonNull<B>) {
    // SAFETY: the caller promises `ptr` came from `allocate::<B>`, which
    // used this exact layout
    unsafe { std::alloc::dealloc(ptr.as_ptr().cast::<u8>(), Layout::new::<B>()) }
}

/// Diverts to the global allocation failure handler for block type `B`.
pub(crate) fn handle_alloc_error<B>() -> ! {
    std::alloc::handle_alloc_error(Layout::new::<B>())
}
