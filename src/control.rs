//! The reference-counted control block shared by owning and observing
//! handles.
//!
//! A block is one allocation beginning with a [`Header`]: the strong and
//! weak counts plus a two-entry vtable chosen at construction time. The two
//! concrete layouts are [`PtrBlock`] (wraps a separately-allocated object
//! and a cleanup function) and [`ValueBlock`] (co-locates the object's
//! storage with the counts). Handles only ever hold a `NonNull<Header>`;
//! the vtable recovers the concrete layout when the counts drain.
//!
//! Lifecycle invariants:
//! * the managed object is alive iff the strong count is non-zero;
//! * `dispose` runs exactly once, on the strong 1→0 transition;
//! * `destroy` runs exactly once, when the weak count also drains.
//!
//! The strong handles jointly hold one weak reference. This folds the
//! "both counts are now zero" decision into a single atomic decrement, so
//! no two threads can each conclude they were the last one out.

use core::mem::ManuallyDrop;
use core::ptr::NonNull;
use core::sync::atomic::{fence, AtomicUsize, Ordering};

use crate::alloc;

/// Count ledger and disposal interface at the head of every control block.
///
/// `#[repr(C)]` blocks place this first, so a pointer to the block and a
/// pointer to its header are interchangeable.
pub(crate) struct Header {
    strong: AtomicUsize,
    weak: AtomicUsize,
    vtable: &'static BlockVTable,
}

/// The two operations a block layout must provide, selected when the block
/// is allocated.
///
/// `dispose` tears down the managed object; `destroy` frees the block's own
/// storage. They are distinct because disposal must happen as soon as the
/// last owner drops, while the counts may need to outlive the object for
/// the sake of weak observers.
pub(crate) struct BlockVTable {
    /// Runs the managed object's cleanup. Called exactly once, with the
    /// strong count at zero.
    pub(crate) dispose: unsafe fn(NonNull<Header>),
    /// Frees the block allocation. Called exactly once, with both counts at
    /// zero; the block must not be touched afterwards.
    pub(crate) destroy: unsafe fn(NonNull<Header>),
}

impl Header {
    fn new(vtable: &'static BlockVTable) -> Self {
        Self {
            strong: AtomicUsize::new(1),
            // The implicit weak reference held jointly by all strong
            // handles.
            weak: AtomicUsize::new(1),
            vtable,
        }
    }

    /// Current strong count. Zero means the managed object is gone.
    pub(crate) fn strong_count(&self) -> usize {
        self.strong.load(Ordering::Relaxed)
    }

    /// Adds an owning reference. Infallible; the caller already holds one,
    /// so the count cannot be observed at zero here.
    pub(crate) fn acquire_strong(&self) {
        self.strong.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds an owning reference iff the object is still alive.
    ///
    /// The check and the increment are a single compare-exchange; a plain
    /// load followed by `acquire_strong` would race the final release on
    /// another thread and resurrect a disposed object.
    pub(crate) fn try_acquire_strong(&self) -> bool {
        let mut count = self.strong.load(Ordering::Relaxed);
        while count != 0 {
            // Acquire on success synchronizes with the Release decrement of
            // whichever handle we are succeeding.
            match self.strong.compare_exchange_weak(
                count,
                count + 1,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(observed) => count = observed,
            }
        }
        false
    }

    /// Adds an observing reference.
    pub(crate) fn acquire_weak(&self) {
        self.weak.fetch_add(1, Ordering::Relaxed);
    }

    /// Drops one owning reference. On the last one, disposes the managed
    /// object and releases the strong handles' shared weak reference.
    ///
    /// Returns true iff the block itself was destroyed; the caller must not
    /// touch it again in that case.
    ///
    /// # Safety
    /// The caller must hold a strong reference on `block`, and gives it up.
    pub(crate) unsafe fn release_strong(block: NonNull<Header>) -> bool {
        // Release orders all prior uses of the object before the decrement
        // observed by whichever thread ends up running `dispose`.
        // SAFETY: the caller's strong reference keeps the header alive.
        if unsafe { block.as_ref() }.strong.fetch_sub(1, Ordering::Release) != 1 {
            return false;
        }
        // Pairs with the Release above: nothing below may be reordered
        // before the decrement that brought the count to zero.
        fence(Ordering::Acquire);
        // SAFETY: strong hit zero and we won the transition, so we are the
        // unique disposer; the header stays alive through our weak share.
        unsafe {
            (block.as_ref().vtable.dispose)(block);
            Self::release_weak(block)
        }
    }

    /// Drops one observing reference. On the last one (only reachable once
    /// the strong side has drained), destroys the block.
    ///
    /// Returns true iff the block was destroyed.
    ///
    /// # Safety
    /// The caller must hold a weak reference on `block`, and gives it up.
    pub(crate) unsafe fn release_weak(block: NonNull<Header>) -> bool {
        // SAFETY: the caller's weak reference keeps the header alive.
        if unsafe { block.as_ref() }.weak.fetch_sub(1, Ordering::Release) != 1 {
            return false;
        }
        fence(Ordering::Acquire);
        // SAFETY: both counts are zero and we won the final transition;
        // `destroy` is called exactly once. Read the entry before the call
        // frees the header.
        unsafe {
            let destroy = block.as_ref().vtable.destroy;
            destroy(block);
        }
        true
    }
}

/// A live element-and-block pointer pair, the payload of a non-empty
/// handle.
pub(crate) struct RawHandle<T: ?Sized> {
    pub(crate) ptr: NonNull<T>,
    pub(crate) block: NonNull<Header>,
}

impl<T: ?Sized> Clone for RawHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Copy for RawHandle<T> {}

/// Control block wrapping a separately-allocated object.
///
/// `dispose` hands the adopted pointer to the cleanup function, which is
/// responsible for the object's own storage; `destroy` frees only this
/// block.
#[repr(C)]
pub(crate) struct PtrBlock<T> {
    header: Header,
    ptr: *mut T,
    drop_fn: unsafe fn(*mut T),
}

impl<T> PtrBlock<T> {
    const VTABLE: BlockVTable = BlockVTable {
        dispose: dispose_adopted::<T>,
        destroy: destroy_block::<Self>,
    };

    /// Allocates a block adopting `ptr`, with both counts at their initial
    /// values. Returns [`None`] on allocation failure without touching
    /// `ptr`; releasing the adopted allocation on that path is the
    /// caller's job.
    pub(crate) fn allocate(ptr: *mut T, drop_fn: unsafe fn(*mut T)) -> Option<NonNull<Header>> {
        let block = alloc::allocate::<Self>()?;
        // SAFETY: fresh allocation with the layout of `Self`
        unsafe {
            block.as_ptr().write(Self {
                header: Header::new(&Self::VTABLE),
                ptr,
                drop_fn,
            });
        }
        Some(block.cast::<Header>())
    }
}

/// Control block co-locating the object's storage with the counts.
///
/// `dispose` drops the value in place; its storage is only reclaimed by
/// `destroy`, together with the counts.
#[repr(C)]
pub(crate) struct ValueBlock<T> {
    header: Header,
    value: ManuallyDrop<T>,
}

impl<T> ValueBlock<T> {
    const VTABLE: BlockVTable = BlockVTable {
        dispose: dispose_in_place::<T>,
        destroy: destroy_block::<Self>,
    };

    /// Allocates a block and constructs `value` inside it, in one
    /// allocation. Returns the element pointer alongside the header.
    ///
    /// On allocation failure `value` is dropped in place here and [`None`]
    /// is returned.
    pub(crate) fn allocate(value: T) -> Option<RawHandle<T>> {
        let block = alloc::allocate::<Self>()?;
        // SAFETY: fresh allocation with the layout of `Self`
        let ptr = unsafe {
            block.as_ptr().write(Self {
                header: Header::new(&Self::VTABLE),
                value: ManuallyDrop::new(value),
            });
            NonNull::new_unchecked(core::ptr::addr_of_mut!((*block.as_ptr()).value).cast::<T>())
        };
        Some(RawHandle {
            ptr,
            block: block.cast::<Header>(),
        })
    }
}

unsafe fn dispose_adopted<T>(block: NonNull<Header>) {
    let block = block.cast::<PtrBlock<T>>().as_ptr();
    // SAFETY: called exactly once while the block is still allocated
    unsafe {
        let ptr = (*block).ptr;
        ((*block).drop_fn)(ptr);
    }
}

unsafe fn dispose_in_place<T>(block: NonNull<Header>) {
    let block = block.cast::<ValueBlock<T>>().as_ptr();
    // SAFETY: called exactly once, with the value still initialized
    unsafe { ManuallyDrop::drop(&mut (*block).value) }
}

unsafe fn destroy_block<B>(block: NonNull<Header>) {
    // All remaining block fields (pointers, counts, fn pointers) are
    // trivially destructible, so freeing the storage suffices.
    // SAFETY: the block was obtained from `alloc::allocate::<B>` and both
    // counts have drained
    unsafe { alloc::deallocate(block.cast::<B>()) }
}
