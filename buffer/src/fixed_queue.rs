//! Fixed-capacity append-only container.

use std::fmt;
use std::mem::MaybeUninit;
use std::ptr;
use std::slice;

use crate::error::BufferError;

/// An inline array of up to `N` items that is filled front to back.
///
/// `FixedQueue` is meant as a buffer payload: it is cheap to default-construct,
/// never allocates, and reports [`BufferError::Overflow`] instead of growing.
/// Slots beyond [`len`](Self::len) are uninitialized and never read.
///
/// A failed push leaves the container unchanged, so it stays usable after an
/// overflow.
///
/// # Example
///
/// ```
/// use rabotnik_buffer::{BufferError, FixedQueue};
///
/// let mut queue = FixedQueue::<u32, 2>::new();
/// queue.push(1).unwrap();
/// queue.push(2).unwrap();
/// assert_eq!(queue.push(3), Err(BufferError::Overflow { capacity: 2 }));
/// assert_eq!(queue.as_slice(), &[1, 2]);
/// ```
pub struct FixedQueue<T, const N: usize> {
    items: [MaybeUninit<T>; N],
    len: usize,
}

impl<T, const N: usize> FixedQueue<T, N> {
    /// Creates an empty queue.
    pub const fn new() -> Self {
        FixedQueue {
            items: [const { MaybeUninit::uninit() }; N],
            len: 0,
        }
    }

    /// Returns the number of items.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns the maximum number of items.
    pub fn capacity(&self) -> usize {
        N
    }

    /// Returns the number of items that can still be pushed.
    pub fn remaining(&self) -> usize {
        N - self.len
    }

    /// Returns `true` if no items were pushed.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns `true` if no more items fit.
    pub fn is_full(&self) -> bool {
        self.len == N
    }

    /// Appends an item.
    pub fn push(&mut self, value: T) -> Result<(), BufferError> {
        if self.len == N {
            return Err(BufferError::Overflow { capacity: N });
        }
        self.items[self.len].write(value);
        self.len += 1;
        Ok(())
    }

    /// Appends a default item and returns it for in-place filling.
    pub fn push_default(&mut self) -> Result<&mut T, BufferError>
    where
        T: Default,
    {
        if self.len == N {
            return Err(BufferError::Overflow { capacity: N });
        }
        let index = self.len;
        self.items[index].write(T::default());
        self.len += 1;
        // SAFETY: just initialized.
        Ok(unsafe { self.items[index].assume_init_mut() })
    }

    /// Drops all items.
    pub fn clear(&mut self) {
        let len = self.len;
        // Shrink first so a panicking destructor cannot cause a double drop.
        self.len = 0;
        // SAFETY: the first `len` slots were initialized.
        unsafe {
            ptr::drop_in_place(ptr::slice_from_raw_parts_mut(
                self.items.as_mut_ptr().cast::<T>(),
                len,
            ));
        }
    }

    /// Returns the items as a slice.
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: the first `len` slots are initialized.
        unsafe { slice::from_raw_parts(self.items.as_ptr().cast::<T>(), self.len) }
    }

    /// Returns the items as a mutable slice.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: the first `len` slots are initialized.
        unsafe { slice::from_raw_parts_mut(self.items.as_mut_ptr().cast::<T>(), self.len) }
    }

    /// Iterates over the items in push order.
    pub fn iter(&self) -> slice::Iter<'_, T> {
        self.as_slice().iter()
    }

    /// Iterates mutably over the items in push order.
    pub fn iter_mut(&mut self) -> slice::IterMut<'_, T> {
        self.as_mut_slice().iter_mut()
    }

    /// Starts a batched write.
    ///
    /// The writer caches the write position and the remaining capacity;
    /// pushed items become part of the queue when it is finished or dropped.
    pub fn begin_writing(&mut self) -> FixedQueueWriter<'_, T, N> {
        let len = self.len;
        FixedQueueWriter { queue: self, len }
    }
}

impl<T, const N: usize> Default for FixedQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> Drop for FixedQueue<T, N> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T: fmt::Debug, const N: usize> fmt::Debug for FixedQueue<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T: PartialEq, const N: usize> PartialEq for FixedQueue<T, N> {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<'a, T, const N: usize> IntoIterator for &'a FixedQueue<T, N> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, T, const N: usize> IntoIterator for &'a mut FixedQueue<T, N> {
    type Item = &'a mut T;
    type IntoIter = slice::IterMut<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

/// A batched writer returned by [`FixedQueue::begin_writing`].
pub struct FixedQueueWriter<'a, T, const N: usize> {
    queue: &'a mut FixedQueue<T, N>,
    len: usize,
}

impl<T, const N: usize> FixedQueueWriter<'_, T, N> {
    /// Returns the number of items that can still be pushed.
    pub fn remaining(&self) -> usize {
        N - self.len
    }

    /// Appends an item after the cached write position.
    pub fn push(&mut self, value: T) -> Result<(), BufferError> {
        if self.len == N {
            return Err(BufferError::Overflow { capacity: N });
        }
        self.queue.items[self.len].write(value);
        self.len += 1;
        Ok(())
    }

    /// Appends a default item and returns it for in-place filling.
    pub fn push_default(&mut self) -> Result<&mut T, BufferError>
    where
        T: Default,
    {
        if self.len == N {
            return Err(BufferError::Overflow { capacity: N });
        }
        let index = self.len;
        self.queue.items[index].write(T::default());
        self.len += 1;
        // SAFETY: just initialized.
        Ok(unsafe { self.queue.items[index].assume_init_mut() })
    }

    /// Commits the pushed items.
    pub fn finish(self) {}
}

impl<T, const N: usize> Drop for FixedQueueWriter<'_, T, N> {
    fn drop(&mut self) {
        self.queue.len = self.len;
    }
}
