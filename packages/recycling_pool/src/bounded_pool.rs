use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;

use crate::{PoolBuilder, PooledMut, Recyclable, SlotSet, VisitMode};

/// A pool of at most `capacity` instances that blocks callers while every instance is
/// checked out.
///
/// Each slot is populated the first time it is acquired, by calling [`Recyclable::make()`]
/// with the arguments of that acquisition. From then on the instance stays in the pool and is
/// handed out again as-is: **arguments passed to later acquisitions are ignored** for a slot
/// that already holds an instance. This is what keeps construction cost to once per slot.
///
/// Acquisition blocks without a timeout until a slot is free; no ordering among waiting
/// threads is guaranteed. A pool with zero capacity blocks every acquisition forever.
///
/// # Thread safety
///
/// The pool is [`Send`] and [`Sync`] if `T` is [`Send`]. Share it by reference (e.g. scoped
/// threads) or wrap it in an [`Arc`].
///
/// # Example
///
/// ```rust
/// use std::convert::Infallible;
///
/// use recycling_pool::{BoundedPool, Recyclable};
///
/// struct Session {
///     user: String,
/// }
///
/// impl Recyclable for Session {
///     type Args = &'static str;
///     type Error = Infallible;
///
///     fn make(user: &'static str) -> Result<Self, Infallible> {
///         Ok(Self { user: user.to_string() })
///     }
/// }
///
/// let pool = BoundedPool::<Session>::new(1);
///
/// let session = pool.emplace("alice");
/// assert_eq!(session.user, "alice");
/// drop(session);
///
/// // The slot is reused, so the new arguments are ignored.
/// let session = pool.emplace("bob");
/// assert_eq!(session.user, "alice");
/// ```
pub struct BoundedPool<T> {
    slots: Arc<SlotSet<T>>,
}

impl<T> BoundedPool<T> {
    /// Creates a pool with `capacity` slots.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::builder().capacity(capacity).build()
    }

    /// Returns a builder for creating a pool with custom configuration.
    pub fn builder() -> PoolBuilder<Self> {
        PoolBuilder::new()
    }

    pub(crate) fn from_slot_set(slots: Arc<SlotSet<T>>) -> Self {
        Self { slots }
    }

    /// Returns the number of slots, which is the most instances the pool will ever hold.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    /// Returns the name attached to the pool's log events.
    #[must_use]
    pub fn name(&self) -> &str {
        self.slots.name()
    }

    /// Visits the instances in the pool until `visitor` returns `false`.
    ///
    /// With [`VisitMode::Shared`] only the instances that are idle at the time of the call are
    /// visited and the call never waits for checked-out instances.
    ///
    /// With [`VisitMode::Exclusive`] the call blocks until every checked-out instance has been
    /// returned and then visits every instance while no acquisition can succeed.
    ///
    /// Slots that have never been populated hold nothing to visit. The pool's lock is held
    /// while `visitor` runs, so the visitor must not acquire from or return to this pool.
    ///
    /// The pool has a single lock for every mode. A shared visit therefore also runs one at a
    /// time with other visits, and acquisitions and returns on other threads wait until it
    /// finishes.
    ///
    /// # Example
    ///
    /// ```rust
    /// use recycling_pool::{BoundedPool, VisitMode};
    ///
    /// let pool = BoundedPool::<String>::new(2);
    ///
    /// let mut lengths = Vec::new();
    /// pool.visit(VisitMode::Exclusive, |text| {
    ///     lengths.push(text.len());
    ///     true
    /// });
    ///
    /// // Nothing has been constructed yet.
    /// assert!(lengths.is_empty());
    /// ```
    pub fn visit(&self, mode: VisitMode, mut visitor: impl FnMut(&T) -> bool) {
        match mode {
            VisitMode::Shared => self.slots.visit_idle(visitor),
            VisitMode::Exclusive => self.slots.visit_all(|instance| visitor(instance)),
        }
    }

    /// Like an [exclusive visit][VisitMode::Exclusive] but with mutable access to each
    /// instance, e.g. to reset pooled state in bulk.
    pub fn visit_exclusive_mut(&self, visitor: impl FnMut(&mut T) -> bool) {
        self.slots.visit_all(visitor);
    }
}

impl<T: Recyclable> BoundedPool<T> {
    /// Acquires an instance, blocking while every slot is busy.
    ///
    /// If the acquired slot already holds an instance, that instance is returned unchanged and
    /// `args` is dropped unused. Otherwise the instance is constructed from `args`.
    ///
    /// # Errors
    ///
    /// Returns the factory's error if the instance had to be constructed and construction
    /// failed. The slot is released empty and another waiting thread is woken.
    pub fn try_emplace(&self, args: T::Args) -> Result<PooledMut<T>, T::Error> {
        let claim = self.slots.claim_blocking();

        self.slots.populate(claim, || T::make(args))
    }
}

impl<T: Recyclable<Error = Infallible>> BoundedPool<T> {
    /// Acquires an instance, blocking while every slot is busy.
    ///
    /// If the acquired slot already holds an instance, that instance is returned unchanged and
    /// `args` is dropped unused. Otherwise the instance is constructed from `args`.
    #[must_use]
    pub fn emplace(&self, args: T::Args) -> PooledMut<T> {
        self.try_emplace(args).unwrap_or_else(|never| match never {})
    }
}

impl<T> fmt::Debug for BoundedPool<T> {
    #[cfg_attr(test, mutants::skip)] // No API contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedPool")
            .field("slots", &self.slots)
            .finish()
    }
}
