#![deny(warnings, clippy::all, clippy::pedantic, clippy::nursery)]
//! Hand-built ownership primitives.
//!
//! The core is the shared-ownership subsystem: [`Shared`] owning handles
//! and [`Weak`] observers over a reference-counted control block with two
//! storage strategies (a separately-allocated object with a cleanup
//! function, or the object constructed in place next to its counts). All
//! counting is lock-free and safe under concurrent cloning, dropping and
//! upgrading. [`Owned`] is the companion move-only exclusive handle.
//!
//! Cycles of `Shared` handles are never collected; break them by storing
//! one direction as a [`Weak`].
//!
//! ```
//! use sptr_kit::Shared;
//!
//! let strong = Shared::new(5i32);
//! let weak = strong.downgrade();
//!
//! let second = weak.upgrade().unwrap();
//! assert_eq!(*second, 5);
//! assert_eq!(strong.use_count(), 2);
//!
//! drop(strong);
//! drop(second);
//! assert!(weak.expired());
//! assert!(weak.upgrade().is_none());
//! ```

pub mod alloc;
pub mod cast;
mod control;
pub mod owned;
pub mod shared;
pub mod weak;

pub use self::alloc::AllocError;
pub use self::cast::SharedAny;
pub use self::owned::Owned;
pub use self::shared::Shared;
pub use self::weak::Weak;
