//! Lifecycle tests for the owning handle, adapted scenario-for-scenario
//! from the exercised behaviors of the shared subsystem: counting across
//! clones and drops, single disposal, adoption, casts, and cycles.

use std::cell::{Cell, RefCell};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use sptr_kit::cast::{cast_any, cast_dynamic};
use sptr_kit::{Shared, Weak};

/// The managed object under test; reports its disposal into a counter the
/// test owns.
struct Resource<'a> {
    value: i32,
    drops: &'a Cell<u32>,
}

impl<'a> Resource<'a> {
    fn new(value: i32, drops: &'a Cell<u32>) -> Self {
        Self { value, drops }
    }
}

impl Drop for Resource<'_> {
    fn drop(&mut self) {
        self.drops.set(self.drops.get() + 1);
    }
}

#[test]
fn default_construction() {
    let ptr = Shared::<Resource<'_>>::default();
    assert!(ptr.is_empty());
    assert!(ptr.as_ptr().is_null());
    assert_eq!(ptr.use_count(), 0);
}

#[test]
fn in_place_construction() {
    let drops = Cell::new(0);
    let ptr = Shared::new(Resource::new(42, &drops));

    assert!(!ptr.is_empty());
    assert_eq!(ptr.value, 42);
    assert_eq!(ptr.use_count(), 1);
}

#[test]
fn adoption_of_separate_allocation() {
    let drops = Cell::new(0);
    let raw = Box::into_raw(Box::new(Resource::new(123, &drops)));
    let ptr = unsafe { Shared::adopt_raw(raw) }.unwrap();

    assert_eq!(ptr.value, 123);
    assert_eq!(ptr.use_count(), 1);
    assert!(core::ptr::eq(ptr.as_ptr(), raw));

    drop(ptr);
    assert_eq!(drops.get(), 1);
}

#[test]
fn clone_shares_the_object() {
    let drops = Cell::new(0);
    let ptr1 = Shared::new(Resource::new(123, &drops));
    let ptr2 = ptr1.clone();

    assert!(ptr1.ptr_eq(&ptr2));
    assert_eq!(ptr1.use_count(), 2);
    assert_eq!(ptr2.use_count(), 2);
}

#[test]
fn move_leaves_source_empty() {
    let drops = Cell::new(0);
    let mut ptr1 = Shared::new(Resource::new(123, &drops));
    let ptr2 = std::mem::take(&mut ptr1);

    assert!(ptr1.is_empty());
    assert_eq!(ptr1.use_count(), 0);
    assert_eq!(ptr2.use_count(), 1);
    assert_eq!(ptr2.value, 123);
    assert_eq!(drops.get(), 0);
}

#[test]
fn reset_releases_ownership() {
    let drops = Cell::new(0);
    let mut ptr = Shared::new(Resource::new(1, &drops));

    let second = Box::into_raw(Box::new(Resource::new(2, &drops)));
    unsafe { ptr.reset_raw(second) }.unwrap();
    assert_eq!(drops.get(), 1);
    assert_eq!(ptr.value, 2);
    assert_eq!(ptr.use_count(), 1);

    ptr.reset();
    assert_eq!(drops.get(), 2);
    assert!(ptr.is_empty());
    assert_eq!(ptr.use_count(), 0);
}

#[test]
fn disposal_runs_exactly_once_at_scope_end() {
    let drops = Cell::new(0);
    {
        let _ptr = Shared::new(Resource::new(0, &drops));
        assert_eq!(drops.get(), 0);
    }
    assert_eq!(drops.get(), 1);
}

#[test]
fn count_follows_live_owners() {
    let drops = Cell::new(0);

    let a = Shared::new(Resource::new(7, &drops));
    assert_eq!(a.use_count(), 1);

    let b = a.clone();
    assert_eq!(b.use_count(), 2);

    drop(a);
    assert_eq!(b.use_count(), 1);
    assert_eq!(drops.get(), 0);

    drop(b);
    assert_eq!(drops.get(), 1);
}

#[test]
fn failed_dynamic_cast_yields_empty_handle() {
    let erased = cast_any(&Shared::new(String::from("abc")));

    let ok = cast_dynamic::<String>(&erased);
    assert_eq!(*ok, "abc");
    assert_eq!(erased.use_count(), 2);
    drop(ok);

    let bad = cast_dynamic::<i64>(&erased);
    assert!(bad.is_empty());
    assert_eq!(bad.use_count(), 0);
    assert_eq!(erased.use_count(), 1);
}

/// Two nodes owning each other are never collected; the drop counter stays
/// at zero even after the external handles are gone. This is the accepted
/// limitation, not a defect.
#[test]
fn strong_cycle_is_not_collected() {
    struct Node<'a> {
        _res: Resource<'a>,
        next: RefCell<Option<Shared<Node<'a>>>>,
    }

    let drops = Cell::new(0);
    {
        let node1 = Shared::new(Node {
            _res: Resource::new(1, &drops),
            next: RefCell::new(None),
        });
        let node2 = Shared::new(Node {
            _res: Resource::new(2, &drops),
            next: RefCell::new(None),
        });

        *node1.next.borrow_mut() = Some(node2.clone());
        *node2.next.borrow_mut() = Some(node1.clone());

        assert_eq!(node1.use_count(), 2);
        assert_eq!(node2.use_count(), 2);
    }
    // Both nodes keep each other alive; nothing was disposed.
    assert_eq!(drops.get(), 0);
}

/// Storing one direction of the link as a weak observer breaks the cycle:
/// both nodes are disposed once the external owners drop.
#[test]
fn weak_link_breaks_the_cycle() {
    struct Node<'a> {
        value: i32,
        _res: Resource<'a>,
        next: RefCell<Weak<Node<'a>>>,
    }

    let drops = Cell::new(0);
    {
        let node1 = Shared::new(Node {
            value: 1,
            _res: Resource::new(1, &drops),
            next: RefCell::new(Weak::new()),
        });
        let node2 = Shared::new(Node {
            value: 2,
            _res: Resource::new(2, &drops),
            next: RefCell::new(Weak::new()),
        });

        *node1.next.borrow_mut() = node2.downgrade();
        *node2.next.borrow_mut() = node1.downgrade();

        assert_eq!(node1.use_count(), 1);
        assert_eq!(node2.use_count(), 1);

        // The links are still traversable while the owners live.
        let across = node1.next.borrow().upgrade().unwrap();
        assert_eq!(across.value, 2);
        let back = node2.next.borrow().upgrade().unwrap();
        assert_eq!(back.value, 1);
    }
    assert_eq!(drops.get(), 2);
}

/// The managed object for concurrency scenarios; the counter must be
/// shareable across threads.
struct SyncResource<'a> {
    drops: &'a AtomicUsize,
}

impl Drop for SyncResource<'_> {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn concurrent_clone_and_drop_keeps_the_count_exact() {
    let drops = AtomicUsize::new(0);
    let handle = Shared::new(SyncResource { drops: &drops });

    thread::scope(|s| {
        for _ in 0..8 {
            let local = handle.clone();
            s.spawn(move || {
                let mut clones = Vec::with_capacity(512);
                for _ in 0..512 {
                    clones.push(local.clone());
                }
                drop(clones);
            });
        }
    });

    assert_eq!(handle.use_count(), 1);
    assert_eq!(drops.load(Ordering::SeqCst), 0);

    drop(handle);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}
