//! A reference-counted cell whose payload is reclaimed by a destructor of the caller's choosing.
//!
//! A [`SharedCell`] owns one payload together with the function that knows how to dispose of it.
//! Every handle to the cell is an equal owner. Handles are created with [`SharedCell::new`] and
//! [`SharedCell::duplicate`], and given up with [`SharedCell::release`] (or by dropping them). The
//! destructor runs exactly once, when the last handle is released.
//!
//! A missing handle is spelled `Option<SharedCell<T>>::None`, so the null-handle behaviour of every
//! operation falls out of the usual `Option` combinators:
//!
//! ```
//! use shared_cell::SharedCell;
//!
//! let handle: Option<SharedCell<u8>> = None;
//! assert!(handle.as_ref().map(SharedCell::duplicate).is_none());
//! assert!(handle.as_ref().map(SharedCell::peek).is_none());
//! assert!(handle.and_then(SharedCell::release).is_none());
//! ```
//!
//! Cells are not thread-safe and do not detect cycles.
#![no_std]
extern crate maybe_std as base;

use base::num::NonZeroUsize;

/// A smart pointer that keeps track of how many pointers refer to the same allocation and
/// exposes this information in its API.
pub trait ReferenceCounted<T: ?Sized>: Clone {
    /// Get the number of owning pointers referring to the same allocation.
    ///
    /// A live pointer always counts itself, so the result is never zero.
    fn reference_count(this: &Self) -> NonZeroUsize;
}

mod shared_cell;
pub use shared_cell::*;
