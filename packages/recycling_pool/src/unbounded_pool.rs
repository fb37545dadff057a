use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;

use crate::{GenerationChange, PoolBuilder, PooledMut, Recyclable, SlotSet};

/// An elastic pool that keeps up to `capacity` instances resident and never blocks.
///
/// Acquisition reuses an idle resident instance if there is one, constructs a new instance in
/// an idle empty slot otherwise and, if every slot is busy, manufactures an overflow instance
/// that lives outside the slots.
///
/// When an overflow instance is returned it takes an idle empty slot if one exists. Failing
/// that it replaces the instance resident in an idle slot, which is destroyed. If every slot
/// is busy, the overflow instance itself is destroyed. The number of resident instances
/// therefore never exceeds the capacity, while the number of live instances may.
///
/// Arguments passed to an acquisition are only used if a new instance is constructed.
///
/// # Example
///
/// ```rust
/// use std::convert::Infallible;
///
/// use recycling_pool::{Recyclable, UnboundedPool};
///
/// struct Connection {
///     endpoint: String,
/// }
///
/// impl Recyclable for Connection {
///     type Args = String;
///     type Error = Infallible;
///
///     fn make(endpoint: String) -> Result<Self, Infallible> {
///         Ok(Self { endpoint })
///     }
/// }
///
/// let pool = UnboundedPool::<Connection>::new(1);
///
/// let first = pool.emplace("db-1".to_string());
///
/// // The only slot is busy, so this does not block.
/// let second = pool.emplace("db-2".to_string());
/// assert!(second.is_overflow());
/// assert_eq!(second.endpoint, "db-2");
///
/// drop(first);
/// drop(second);
/// ```
pub struct UnboundedPool<T> {
    slots: Arc<SlotSet<T>>,
}

impl<T> UnboundedPool<T> {
    /// Creates a pool that keeps up to `capacity` instances resident.
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

    /// Returns the number of slots, which is the most instances the pool keeps resident.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    /// Returns the name attached to the pool's log events.
    #[must_use]
    pub fn name(&self) -> &str {
        self.slots.name()
    }

    /// Destroys every idle resident instance, leaving its slot empty.
    ///
    /// The next acquisition of an emptied slot constructs a fresh instance from its arguments.
    /// Checked-out instances are not affected and return to the pool as usual.
    pub fn clear(&self) {
        self.slots.clear(GenerationChange::Keep);
    }
}

impl<T: Recyclable> UnboundedPool<T> {
    /// Acquires an instance without blocking.
    ///
    /// # Errors
    ///
    /// Returns the factory's error if a new instance had to be constructed and construction
    /// failed. A slot claimed for the attempt is released empty.
    pub fn try_emplace(&self, args: T::Args) -> Result<PooledMut<T>, T::Error> {
        match self.slots.try_claim() {
            Some(claim) => self.slots.populate(claim, || T::make(args)),
            None => self.slots.manufacture(|| T::make(args)),
        }
    }
}

impl<T: Recyclable<Error = Infallible>> UnboundedPool<T> {
    /// Acquires an instance without blocking.
    #[must_use]
    pub fn emplace(&self, args: T::Args) -> PooledMut<T> {
        self.try_emplace(args).unwrap_or_else(|never| match never {})
    }
}

impl<T> Default for UnboundedPool<T> {
    /// Creates a pool with zero capacity, in which every instance is an overflow instance.
    fn default() -> Self {
        Self::new(0)
    }
}

impl<T> fmt::Debug for UnboundedPool<T> {
    #[cfg_attr(test, mutants::skip)] // No API contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnboundedPool")
            .field("slots", &self.slots)
            .finish()
    }
}
