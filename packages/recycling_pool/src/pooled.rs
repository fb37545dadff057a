use std::any::type_name;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use crate::PooledMut;
use crate::constants::ERR_VACANT_HANDLE;

/// Shared access to one instance borrowed from a recycling pool.
///
/// Created from a [`PooledMut<T>`] via [`PooledMut::into_shared()`]. Clones alias the same
/// instance and only hand out shared references to it. The instance returns to its pool,
/// exactly once, when the last clone is dropped or reset, regardless of which thread that
/// happens on.
///
/// # Thread safety
///
/// The handle is [`Send`] and [`Sync`] if `T` is both, so clones may be dropped concurrently
/// from different threads.
pub struct Pooled<T> {
    inner: Option<Arc<PooledMut<T>>>,
}

impl<T> Pooled<T> {
    #[must_use]
    pub(crate) fn new(pooled: PooledMut<T>) -> Self {
        if pooled.is_vacant() {
            return Self::default();
        }

        Self {
            inner: Some(Arc::new(pooled)),
        }
    }

    /// Returns `true` if the handle refers to no instance.
    #[must_use]
    #[inline]
    pub fn is_vacant(&self) -> bool {
        self.inner.is_none()
    }

    /// Returns a reference to the instance, or `None` if the handle is vacant.
    #[must_use]
    #[inline]
    pub fn get(&self) -> Option<&T> {
        self.inner.as_deref().and_then(PooledMut::get)
    }

    /// Releases this handle's reference, leaving it vacant. The instance returns to its pool
    /// if this was the last reference.
    pub fn reset(&mut self) {
        self.inner = None;
    }

    /// Returns the number of handles that share the instance, or zero if this one is vacant.
    #[must_use]
    pub fn handle_count(&self) -> usize {
        self.inner.as_ref().map_or(0, Arc::strong_count)
    }
}

impl<T> Clone for Pooled<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for Pooled<T> {
    /// Creates a vacant handle.
    fn default() -> Self {
        Self { inner: None }
    }
}

impl<T> From<PooledMut<T>> for Pooled<T> {
    fn from(pooled: PooledMut<T>) -> Self {
        Self::new(pooled)
    }
}

impl<T> Deref for Pooled<T> {
    type Target = T;

    /// # Panics
    ///
    /// Panics if the handle is vacant.
    #[inline]
    fn deref(&self) -> &Self::Target {
        self.get().expect(ERR_VACANT_HANDLE)
    }
}

impl<T> fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pooled")
            .field("item_type", &format_args!("{}", type_name::<T>()))
            .field("handle_count", &self.handle_count())
            .field("pooled", &self.inner.as_deref())
            .finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::cell::Cell;
    use std::convert::Infallible;
    use std::thread;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;
    use crate::{BoundedPool, Recyclable, VisitMode};

    struct Widget {
        id: i32,
    }

    impl Recyclable for Widget {
        type Args = i32;
        type Error = Infallible;

        fn make(id: i32) -> Result<Self, Infallible> {
            Ok(Self { id })
        }
    }

    #[test]
    fn thread_safety_assertions() {
        assert_impl_all!(Pooled<u32>: Send, Sync, Clone);
        assert_not_impl_any!(Pooled<Cell<u32>>: Send, Sync);
    }

    #[test]
    fn last_clone_returns_instance() {
        let pool = BoundedPool::<Widget>::new(1);

        let shared = pool.emplace(1).into_shared();
        let clone = shared.clone();
        assert_eq!(shared.handle_count(), 2);

        drop(shared);
        assert_eq!(clone.handle_count(), 1);

        let mut visited = 0;
        pool.visit(VisitMode::Shared, |_| {
            visited += 1;
            true
        });
        assert_eq!(visited, 0, "slot must still be busy while a clone is alive");

        drop(clone);

        pool.visit(VisitMode::Shared, |_| {
            visited += 1;
            true
        });
        assert_eq!(visited, 1);
    }

    #[test]
    fn reset_vacates_only_this_clone() {
        let pool = BoundedPool::<Widget>::new(1);

        let mut shared = pool.emplace(1).into_shared();
        let clone = shared.clone();

        shared.reset();
        assert!(shared.is_vacant());
        assert_eq!(shared.handle_count(), 0);
        assert!(shared.get().is_none());
        assert_eq!(clone.id, 1);
    }

    #[test]
    fn clones_dropped_on_many_threads_return_once() {
        let pool = BoundedPool::<Widget>::new(1);

        let shared = pool.emplace(1).into_shared();

        thread::scope(|scope| {
            for _ in 0..8 {
                let clone = shared.clone();
                scope.spawn(move || {
                    assert_eq!(clone.id, 1);
                    drop(clone);
                });
            }
        });

        drop(shared);

        // A double return would have tripped the busy slot accounting.
        let reused = pool.emplace(2);
        assert_eq!(reused.id, 1);
    }

    #[test]
    #[should_panic(expected = "dereferenced a vacant pooled handle")]
    fn deref_vacant_panics() {
        let shared = Pooled::<Widget>::default();

        let _id = shared.id;
    }

    #[test]
    fn from_pooled_matches_into_shared() {
        let pool = BoundedPool::<Widget>::new(1);

        let shared = Pooled::from(pool.emplace(3));
        assert_eq!(shared.get().map(|widget| widget.id), Some(3));
    }
}
