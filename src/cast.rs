//! Conversion casts between shared handles.
//!
//! Every cast produces a new handle sharing the source's control block,
//! with the strong count raised; the source is left untouched. A failed
//! [`cast_dynamic`] is not an error, it yields the empty handle.
//!
//! There is no const-removal cast: constness lives in references rather
//! than element types, so the operation would be vacuous; anything in that
//! direction is subsumed by [`cast_reinterpret`].

use std::any::{Any, TypeId};

use crate::control::RawHandle;
use crate::shared::Shared;

/// A shared handle erased to its most general object form.
pub type SharedAny = Shared<dyn Any + Send + Sync>;

/// Upcast: erases the element type, sharing the block.
#[must_use]
pub fn cast_any<T: Any + Send + Sync>(this: &Shared<T>) -> SharedAny {
    match this.parts() {
        Some(raw) => {
            // SAFETY: `this` keeps the block alive
            unsafe { raw.block.as_ref() }.acquire_strong();
            Shared::from_parts(RawHandle {
                ptr: raw.ptr,
                block: raw.block,
            })
        }
        None => Shared::empty(),
    }
}

/// Checked downcast to the concrete element type `U`.
///
/// If the runtime type of the managed object is not `U` (or the source is
/// empty), returns the empty handle; the source handle and its count are
/// unchanged either way.
#[must_use]
pub fn cast_dynamic<U: Any>(this: &SharedAny) -> Shared<U> {
    match this.parts() {
        // SAFETY: `this` holds a strong reference, so the object is alive
        // and its type_id may be read through the vtable
        Some(raw) if unsafe { raw.ptr.as_ref() }.type_id() == TypeId::of::<U>() => {
            // SAFETY: as above
            unsafe { raw.block.as_ref() }.acquire_strong();
            Shared::from_parts(RawHandle {
                ptr: raw.ptr.cast::<U>(),
                block: raw.block,
            })
        }
        _ => Shared::empty(),
    }
}

/// Unchecked downcast to `U`.
///
/// # Safety
/// The runtime type of the managed object must be exactly `U`; this is not
/// validated (beyond a debug assertion).
#[must_use]
pub unsafe fn cast_static<U: Any>(this: &SharedAny) -> Shared<U> {
    match this.parts() {
        Some(raw) => {
            debug_assert_eq!(
                // SAFETY: `this` holds a strong reference
                unsafe { raw.ptr.as_ref() }.type_id(),
                TypeId::of::<U>()
            );
            // SAFETY: `this` keeps the block alive
            unsafe { raw.block.as_ref() }.acquire_strong();
            Shared::from_parts(RawHandle {
                ptr: raw.ptr.cast::<U>(),
                block: raw.block,
            })
        }
        None => Shared::empty(),
    }
}

/// Reinterprets the element pointer as a `U`, with no validation of any
/// kind. The new handle shares the block, and disposal still runs for the
/// element type the block was created with.
///
/// # Safety
/// Type compatibility is entirely the caller's responsibility: every use of
/// the returned handle's element must be valid for the object that is
/// actually there.
#[must_use]
pub unsafe fn cast_reinterpret<U, T: ?Sized>(this: &Shared<T>) -> Shared<U> {
    match this.parts() {
        Some(raw) => {
            // SAFETY: `this` keeps the block alive
            unsafe { raw.block.as_ref() }.acquire_strong();
            Shared::from_parts(RawHandle {
                ptr: raw.ptr.cast::<U>(),
                block: raw.block,
            })
        }
        None => Shared::empty(),
    }
}

#[cfg(test)]
mod test {
    use super::{cast_any, cast_dynamic, cast_reinterpret, cast_static};
    use crate::shared::Shared;

    #[test]
    fn test_upcast_shares_block() {
        let concrete = Shared::new(41i32);
        let erased = cast_any(&concrete);

        assert_eq!(concrete.use_count(), 2);
        assert_eq!(erased.use_count(), 2);
    }

    #[test]
    fn test_dynamic_cast_success_and_failure() {
        let erased = cast_any(&Shared::new(41i32));

        let back = cast_dynamic::<i32>(&erased);
        assert_eq!(*back, 41);
        assert_eq!(erased.use_count(), 2);

        let wrong = cast_dynamic::<String>(&erased);
        assert!(wrong.is_empty());
        // A failed cast leaves the source count unchanged.
        assert_eq!(erased.use_count(), 2);
    }

    #[test]
    fn test_static_cast() {
        let erased = cast_any(&Shared::new(7u64));
        let back = unsafe { cast_static::<u64>(&erased) };
        assert_eq!(*back, 7);
    }

    #[test]
    fn test_reinterpret_cast() {
        let bits = Shared::new(0x3FF0_0000_0000_0000u64);
        let float = unsafe { cast_reinterpret::<f64, u64>(&bits) };
        assert!((*float - 1.0).abs() < f64::EPSILON);
        assert_eq!(bits.use_count(), 2);
    }

    #[test]
    fn test_casting_empty_handles() {
        let empty = Shared::<i32>::empty();
        assert!(cast_any(&empty).is_empty());
        assert!(cast_dynamic::<i32>(&cast_any(&empty)).is_empty());
    }
}
