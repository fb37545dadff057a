use std::any::type_name;
use std::fmt;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::constants::ERR_VACANT_HANDLE;
use crate::{Lease, Origin, Pooled, SlotSet};

/// Exclusive access to one instance borrowed from a recycling pool.
///
/// A [`PooledMut<T>`] is either vacant or the only owner of exactly one instance. When it is
/// dropped or [`reset()`][Self::reset], the instance goes back to the pool it came from
/// according to that pool's return policy. This happens exactly once per checkout.
///
/// Moving the handle moves the borrow; [`take()`][Self::take] does the same while leaving a
/// vacant handle behind. The handle cannot be cloned. To share the instance, convert the
/// handle with [`into_shared()`][Self::into_shared].
///
/// The handle keeps the pool's storage alive, so it remains valid even if the pool object
/// that issued it has been dropped.
///
/// # Thread safety
///
/// The handle is [`Send`] if `T` is [`Send`], so a borrowed instance can be returned from
/// any thread.
///
/// # Example
///
/// ```rust
/// use std::convert::Infallible;
///
/// use recycling_pool::{PooledMut, Recyclable, UnboundedPool};
///
/// struct Buffer(Vec<u8>);
///
/// impl Recyclable for Buffer {
///     type Args = usize;
///     type Error = Infallible;
///
///     fn make(size: usize) -> Result<Self, Infallible> {
///         Ok(Self(vec![0; size]))
///     }
/// }
///
/// let pool = UnboundedPool::<Buffer>::new(1);
///
/// let mut buffer = pool.emplace(1024);
/// buffer.0[0] = 42;
///
/// // Hand the borrow over, leaving a vacant handle behind.
/// let moved = buffer.take();
/// assert!(buffer.is_vacant());
/// assert_eq!(moved.0[0], 42);
///
/// // Returning a vacant handle does nothing.
/// buffer.reset();
/// assert!(PooledMut::<Buffer>::default().is_vacant());
/// ```
pub struct PooledMut<T> {
    loan: Option<Loan<T>>,
}

struct Loan<T> {
    instance: Box<T>,
    lease: Lease,
    home: Arc<SlotSet<T>>,
}

impl<T> PooledMut<T> {
    #[must_use]
    pub(crate) fn new(instance: Box<T>, lease: Lease, home: Arc<SlotSet<T>>) -> Self {
        Self {
            loan: Some(Loan {
                instance,
                lease,
                home,
            }),
        }
    }

    /// Returns `true` if the handle holds no instance.
    #[must_use]
    #[inline]
    pub fn is_vacant(&self) -> bool {
        self.loan.is_none()
    }

    /// Returns `true` if the instance was manufactured outside the pool's slots because every
    /// slot was busy. Vacant handles return `false`.
    #[must_use]
    pub fn is_overflow(&self) -> bool {
        self.loan
            .as_ref()
            .is_some_and(|loan| loan.lease.origin == Origin::Overflow)
    }

    /// Returns a reference to the instance, or `None` if the handle is vacant.
    #[must_use]
    #[inline]
    pub fn get(&self) -> Option<&T> {
        self.loan.as_ref().map(|loan| &*loan.instance)
    }

    /// Returns a mutable reference to the instance, or `None` if the handle is vacant.
    #[must_use]
    #[inline]
    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.loan.as_mut().map(|loan| &mut *loan.instance)
    }

    /// Returns the instance to its pool now instead of when the handle is dropped.
    ///
    /// The handle is vacant afterwards. Calling this on a vacant handle does nothing.
    pub fn reset(&mut self) {
        if let Some(loan) = self.loan.take() {
            loan.home.restore(loan.instance, loan.lease);
        }
    }

    /// Moves the borrow into a new handle, leaving this one vacant.
    #[must_use]
    pub fn take(&mut self) -> Self {
        mem::take(self)
    }

    /// Converts the handle into a [`Pooled<T>`] that can be cloned.
    ///
    /// The instance returns to its pool when the last clone of the shared handle is dropped.
    /// Converting a vacant handle yields a vacant shared handle.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::convert::Infallible;
    ///
    /// use recycling_pool::{BoundedPool, Recyclable};
    ///
    /// struct Model(u32);
    ///
    /// impl Recyclable for Model {
    ///     type Args = u32;
    ///     type Error = Infallible;
    ///
    ///     fn make(id: u32) -> Result<Self, Infallible> {
    ///         Ok(Self(id))
    ///     }
    /// }
    ///
    /// let pool = BoundedPool::<Model>::new(1);
    ///
    /// let shared = pool.emplace(7).into_shared();
    /// let also_shared = shared.clone();
    /// assert_eq!(also_shared.0, 7);
    ///
    /// // The slot is released once both clones are gone.
    /// drop(shared);
    /// drop(also_shared);
    /// assert_eq!(pool.emplace(8).0, 7);
    /// ```
    #[must_use]
    pub fn into_shared(self) -> Pooled<T> {
        Pooled::new(self)
    }
}

impl<T> Default for PooledMut<T> {
    /// Creates a vacant handle.
    fn default() -> Self {
        Self { loan: None }
    }
}

impl<T> Deref for PooledMut<T> {
    type Target = T;

    /// # Panics
    ///
    /// Panics if the handle is vacant.
    #[inline]
    fn deref(&self) -> &Self::Target {
        self.get().expect(ERR_VACANT_HANDLE)
    }
}

impl<T> DerefMut for PooledMut<T> {
    /// # Panics
    ///
    /// Panics if the handle is vacant.
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.get_mut().expect(ERR_VACANT_HANDLE)
    }
}

impl<T> Drop for PooledMut<T> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<T> fmt::Debug for PooledMut<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("PooledMut");
        debug.field("item_type", &format_args!("{}", type_name::<T>()));

        match &self.loan {
            Some(loan) => debug
                .field("origin", &loan.lease.origin)
                .field("generation", &loan.lease.generation)
                .field("pool", &loan.home.name())
                .finish(),
            None => debug.field("vacant", &true).finish(),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::cell::Cell;
    use std::convert::Infallible;
    use std::ptr;
    use std::rc::Rc;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;
    use crate::{Recyclable, UnboundedPool};

    #[derive(Debug)]
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
        assert_impl_all!(PooledMut<u32>: Send, Sync);
        assert_impl_all!(PooledMut<Vec<u8>>: Send, Sync);

        // Cell is Send but not Sync, so the handle can move but not be shared.
        assert_impl_all!(PooledMut<Cell<u32>>: Send);
        assert_not_impl_any!(PooledMut<Cell<u32>>: Sync);

        assert_not_impl_any!(PooledMut<Rc<u32>>: Send, Sync);

        assert_not_impl_any!(PooledMut<u32>: Clone);
    }

    #[test]
    fn default_is_vacant() {
        let pooled = PooledMut::<Widget>::default();

        assert!(pooled.is_vacant());
        assert!(!pooled.is_overflow());
        assert!(pooled.get().is_none());
    }

    #[test]
    #[should_panic(expected = "dereferenced a vacant pooled handle")]
    fn deref_vacant_panics() {
        let pooled = PooledMut::<Widget>::default();

        let _id = pooled.id;
    }

    #[test]
    fn reset_returns_instance_and_vacates() {
        let pool = UnboundedPool::<Widget>::new(1);

        let mut pooled = pool.emplace(1);
        assert!(!pooled.is_vacant());

        pooled.reset();
        assert!(pooled.is_vacant());
        assert!(pooled.get().is_none());

        // Second reset is a no-op.
        pooled.reset();
        assert!(pooled.is_vacant());

        assert_eq!(pool.emplace(2).id, 1);
    }

    #[test]
    fn take_moves_borrow_without_returning() {
        let pool = UnboundedPool::<Widget>::new(1);

        let mut source = pool.emplace(1);
        let address = ptr::from_ref(&*source);

        let target = source.take();
        assert!(source.is_vacant());
        assert_eq!(target.id, 1);
        assert_eq!(ptr::from_ref(&*target), address);

        // The slot is still busy, so the next instance is an overflow one.
        let other = pool.emplace(2);
        assert!(other.is_overflow());
        assert_eq!(other.id, 2);
    }

    #[test]
    fn assignment_returns_the_overwritten_instance() {
        let pool = UnboundedPool::<Widget>::new(2);

        let moved = pool.emplace(1);
        let moved_address = ptr::from_ref(&*moved);

        let mut target = pool.emplace(2);
        assert_eq!(target.id, 2);

        target = moved;
        assert_eq!(target.id, 1);
        assert_eq!(ptr::from_ref(&*target), moved_address);

        // Instance 2 went back to its slot when it was overwritten.
        let reused = pool.emplace(3);
        assert_eq!(reused.id, 2);
    }

    #[test]
    fn mutation_survives_reuse() {
        let pool = UnboundedPool::<Widget>::new(1);

        let mut pooled = pool.emplace(1);
        pooled.id = 100;
        drop(pooled);

        let reused = pool.emplace(5);
        assert_eq!(reused.id, 100);
    }

    #[test]
    fn into_shared_of_vacant_is_vacant() {
        let shared = PooledMut::<Widget>::default().into_shared();

        assert!(shared.is_vacant());
    }

    #[test]
    fn debug_output_names_origin() {
        let pool = UnboundedPool::<Widget>::builder().capacity(1).name("widgets").build();

        let resident = pool.emplace(1);
        let overflow = pool.emplace(2);

        let resident_debug = format!("{resident:?}");
        assert!(resident_debug.contains("Slot(0)"));
        assert!(resident_debug.contains("widgets"));
        assert!(format!("{overflow:?}").contains("Overflow"));
        assert!(format!("{:?}", PooledMut::<Widget>::default()).contains("vacant"));
    }
}
