// The counting scheme is adapted from the rust standard library Rc. Instead of dropping the
// payload in place, the last owner hands it to a destructor stored alongside it.

use base::any::type_name;
use base::borrow;
use base::cell::Cell;
use base::cmp::Ordering;
use base::convert::From;
use base::fmt;
use base::hash::{Hash, Hasher};
use base::marker::{PhantomData, Unpin};
use base::mem;
use base::num::NonZeroUsize;
use base::ops::Deref;
use base::ptr::NonNull;

use base::prelude::v1::*;

use log::trace;

use crate::ReferenceCounted;

type Destructor<T> = Box<dyn FnOnce(T)>;

/// A non-thread-safe reference-counted cell with a custom destructor.
///
/// All handles to the same cell are equal owners. The cell only knows *how many* handles exist,
/// not who holds them. When the last one is released, the payload is passed to the destructor that
/// was supplied to [`SharedCell::new`].
///
/// `SharedCell` is neither `Send` nor `Sync`: the count is a plain counter.
pub struct SharedCell<T> {
    ptr: NonNull<CellBox<T>>,
    phantom: PhantomData<CellBox<T>>,
}

struct CellBox<T> {
    count: Cell<usize>,
    payload: T,
    destructor: Destructor<T>,
}

impl<T> SharedCell<T> {
    /// Wraps `payload` in a new cell with a reference count of one.
    ///
    /// `destructor` receives the payload once the last handle is released, and is responsible for
    /// reclaiming everything the payload owns.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::cell::Cell;
    /// use std::rc::Rc;
    /// use shared_cell::SharedCell;
    ///
    /// let closed = Rc::new(Cell::new(false));
    /// let flag = Rc::clone(&closed);
    /// let file = SharedCell::new("doc1.txt", move |_| flag.set(true));
    ///
    /// assert_eq!(SharedCell::reference_count(&file).get(), 1);
    /// assert_eq!(SharedCell::release(file), None);
    /// assert!(closed.get());
    /// ```
    pub fn new<D>(payload: T, destructor: D) -> Self
    where
        D: FnOnce(T) + 'static,
    {
        trace!("creating SharedCell<{}>", type_name::<T>());
        let inner = Box::new(CellBox {
            count: Cell::new(1),
            payload,
            destructor: Box::new(destructor),
        });
        Self::from_inner(Box::leak(inner).into())
    }

    fn from_inner(ptr: NonNull<CellBox<T>>) -> Self {
        Self { ptr, phantom: PhantomData }
    }

    #[inline]
    fn inner(&self) -> &CellBox<T> {
        // While this handle is alive the count is at least one, so the allocation is valid.
        unsafe { self.ptr.as_ref() }
    }

    fn ref_count(&self) -> usize {
        self.inner().count.get()
    }

    #[inline]
    fn inc_count(&self) {
        let count = self.ref_count();

        // A live handle never sees zero. Overflow would let a later release free the payload
        // while owners remain.
        if count == 0 || count == usize::MAX {
            panic!("SharedCell reference count out of range: {}", count);
        }
        self.inner().count.set(count + 1);
    }

    /// Returns the count left after removing this handle.
    #[inline]
    fn dec_count(&self) -> usize {
        let count = self.ref_count();
        if count == 0 {
            panic!("SharedCell released after its payload was destroyed");
        }
        self.inner().count.set(count - 1);
        count - 1
    }

    /// Frees the cell's storage, then hands the payload to the destructor.
    ///
    /// Safety: the count of the cell behind `ptr` must have just reached zero, and no handle may
    /// touch it afterwards.
    unsafe fn destroy(ptr: NonNull<CellBox<T>>) {
        let inner = *Box::from_raw(ptr.as_ptr());
        let CellBox { payload, destructor, .. } = inner;
        trace!("destroying SharedCell<{}>", type_name::<T>());
        destructor(payload);
    }

    /// Creates another owning handle to the same cell, increasing the reference count.
    ///
    /// The payload is not copied: both handles see the same value.
    ///
    /// # Panics
    ///
    /// Panics if the count would overflow `usize`.
    ///
    /// # Examples
    ///
    /// ```
    /// use shared_cell::SharedCell;
    ///
    /// let a = SharedCell::new(String::from("doc1.txt"), drop);
    /// let b = SharedCell::duplicate(&a);
    ///
    /// assert!(SharedCell::ptr_eq(&a, &b));
    /// assert_eq!(SharedCell::reference_count(&b).get(), 2);
    /// ```
    #[inline]
    pub fn duplicate(this: &Self) -> Self {
        this.inc_count();
        Self::from_inner(this.ptr)
    }

    /// Gives up this handle.
    ///
    /// Returns the number of owners that remain, or `None` if this was the last one. In that case
    /// the destructor has run and the cell is gone by the time this returns.
    ///
    /// Dropping a handle does the same thing and discards the result.
    ///
    /// # Examples
    ///
    /// ```
    /// use shared_cell::SharedCell;
    ///
    /// let a = SharedCell::new(7u32, drop);
    /// let b = SharedCell::duplicate(&a);
    ///
    /// assert_eq!(SharedCell::release(a).map(|n| n.get()), Some(1));
    /// assert_eq!(*SharedCell::peek(&b), 7);
    /// assert_eq!(SharedCell::release(b), None);
    /// ```
    ///
    /// A released handle is consumed, so it cannot be released twice:
    ///
    /// ```compile_fail
    /// use shared_cell::SharedCell;
    ///
    /// let a = SharedCell::new(7u32, drop);
    /// SharedCell::release(a);
    /// SharedCell::release(a);
    /// ```
    pub fn release(this: Self) -> Option<NonZeroUsize> {
        // Not dropped even if the guard in `dec_count` panics.
        let this = mem::ManuallyDrop::new(this);
        let remaining = this.dec_count();
        let ptr = this.ptr;

        let remaining = NonZeroUsize::new(remaining);
        if remaining.is_none() {
            unsafe { Self::destroy(ptr) };
        }
        remaining
    }

    /// Borrows the payload without touching the reference count.
    ///
    /// The borrow cannot outlive the handle it came from.
    #[inline]
    pub fn peek(this: &Self) -> &T {
        &this.inner().payload
    }

    /// Returns a mutable reference to the payload if this is the only handle.
    ///
    /// # Examples
    ///
    /// ```
    /// use shared_cell::SharedCell;
    ///
    /// let mut a = SharedCell::new(false, drop);
    /// *SharedCell::get_mut(&mut a).unwrap() = true;
    ///
    /// let b = SharedCell::duplicate(&a);
    /// assert!(SharedCell::get_mut(&mut a).is_none());
    /// assert!(*b);
    /// ```
    pub fn get_mut(this: &mut Self) -> Option<&mut T> {
        if this.ref_count() == 1 {
            // We are careful to *not* create a reference covering the count field.
            Some(unsafe { &mut (*this.ptr.as_ptr()).payload })
        } else {
            None
        }
    }

    /// Get the number of handles currently referring to this cell.
    pub fn reference_count(this: &Self) -> NonZeroUsize {
        unsafe { NonZeroUsize::new_unchecked(this.ref_count()) }
    }

    /// Returns `true` if both handles refer to the same cell.
    ///
    /// Unlike `==`, this compares identity rather than payload values.
    #[inline]
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        this.ptr == other.ptr
    }
}

impl<T> Clone for SharedCell<T> {
    /// Same as [`SharedCell::duplicate`].
    #[inline]
    fn clone(&self) -> SharedCell<T> {
        SharedCell::duplicate(self)
    }
}

impl<T> Drop for SharedCell<T> {
    /// Releases this handle, running the destructor if it was the last one.
    #[inline]
    fn drop(&mut self) {
        if self.dec_count() == 0 {
            unsafe { Self::destroy(self.ptr) };
        }
    }
}

impl<T> Deref for SharedCell<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        SharedCell::peek(self)
    }
}

impl<T> borrow::Borrow<T> for SharedCell<T> {
    fn borrow(&self) -> &T {
        &**self
    }
}

impl<T> AsRef<T> for SharedCell<T> {
    fn as_ref(&self) -> &T {
        &**self
    }
}

impl<T> ReferenceCounted<T> for SharedCell<T> {
    fn reference_count(this: &Self) -> NonZeroUsize {
        SharedCell::reference_count(this)
    }
}

impl<T: fmt::Display> fmt::Display for SharedCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&**self, f)
    }
}

impl<T: fmt::Debug> fmt::Debug for SharedCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedCell")
            .field("payload", &**self)
            .field("count", &self.ref_count())
            .finish()
    }
}

impl<T> fmt::Pointer for SharedCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&(&**self as *const T), f)
    }
}

impl<T: 'static> From<T> for SharedCell<T> {
    /// Wraps `t` in a cell whose destructor just drops it.
    fn from(t: T) -> Self {
        SharedCell::new(t, mem::drop)
    }
}

impl<T: Default + 'static> Default for SharedCell<T> {
    /// Creates a new `SharedCell<T>` holding the `Default` value for `T`, dropped on destruction.
    fn default() -> SharedCell<T> {
        SharedCell::from(T::default())
    }
}

impl<T: PartialEq> PartialEq for SharedCell<T> {
    /// Two `SharedCell`s are equal if their payloads are equal, even if they are different cells.
    /// Use [`SharedCell::ptr_eq`] for identity.
    #[inline]
    fn eq(&self, other: &SharedCell<T>) -> bool {
        (**self).eq(&**other)
    }
}

impl<T: Eq> Eq for SharedCell<T> {}

impl<T: PartialOrd> PartialOrd for SharedCell<T> {
    /// The two are compared by calling `partial_cmp()` on their payloads.
    fn partial_cmp(&self, other: &SharedCell<T>) -> Option<Ordering> {
        (**self).partial_cmp(&**other)
    }
}

impl<T: Ord> Ord for SharedCell<T> {
    fn cmp(&self, other: &SharedCell<T>) -> Ordering {
        (**self).cmp(&**other)
    }
}

impl<T: Hash> Hash for SharedCell<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (**self).hash(state)
    }
}

impl<T> Unpin for SharedCell<T> {}
