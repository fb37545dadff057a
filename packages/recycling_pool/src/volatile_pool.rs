use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;

use crate::{GenerationChange, PoolBuilder, PooledMut, Recyclable, SlotSet};

/// An elastic pool whose contents can be invalidated wholesale by starting a new generation.
///
/// Acquisition and return behave exactly as in [`UnboundedPool`][crate::UnboundedPool]: the
/// pool never blocks, keeps up to `capacity` instances resident and manufactures overflow
/// instances when every slot is busy.
///
/// In addition, every instance is stamped with the generation it was constructed in (or last
/// returned in). [`clear()`][Self::clear] starts a new generation and destroys the idle
/// instances of the outgoing one. A forced clear also retires every instance that is checked
/// out at the time: the handles stay usable, but their instances are destroyed instead of
/// pooled when they come back.
///
/// # Example
///
/// ```rust
/// use std::convert::Infallible;
///
/// use recycling_pool::{Recyclable, VolatilePool};
///
/// struct Config {
///     revision: u32,
/// }
///
/// impl Recyclable for Config {
///     type Args = u32;
///     type Error = Infallible;
///
///     fn make(revision: u32) -> Result<Self, Infallible> {
///         Ok(Self { revision })
///     }
/// }
///
/// let pool = VolatilePool::<Config>::new(1);
///
/// let config = pool.emplace(1);
/// assert_eq!(pool.generation_size(), 1);
///
/// // Retire everything, including the instance that is checked out.
/// pool.clear(true);
/// assert_eq!(pool.generation(), 1);
/// assert_eq!(pool.generation_size(), 0);
///
/// // The retired instance is destroyed on return, so new arguments apply.
/// drop(config);
/// assert_eq!(pool.emplace(2).revision, 2);
/// ```
pub struct VolatilePool<T> {
    slots: Arc<SlotSet<T>>,
}

impl<T> VolatilePool<T> {
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

    /// Returns the current generation. Starts at zero and grows by one with every
    /// [`clear()`][Self::clear].
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.slots.generation()
    }

    /// Returns the number of live instances attributed to the pool.
    ///
    /// This counts idle resident instances, checked-out resident instances and outstanding
    /// overflow instances. It grows when an instance is constructed and shrinks when one is
    /// destroyed, but does not change when an instance is merely returned.
    ///
    /// Instances retired by a forced clear stop counting at the moment of the clear, even
    /// though they stay alive in their handles until returned. The count therefore covers
    /// exactly the live instances that can still end up resident in the pool.
    #[must_use]
    pub fn generation_size(&self) -> usize {
        self.slots.attributed()
    }

    /// Starts a new generation and destroys every idle resident instance.
    ///
    /// If `force` is `false`, checked-out instances stay eligible for pooling and join the new
    /// generation when they are returned.
    ///
    /// If `force` is `true`, every checked-out instance is retired. Its handle remains valid
    /// and usable, but the instance is destroyed instead of pooled when it is returned.
    pub fn clear(&self, force: bool) {
        let change = if force {
            GenerationChange::Retire
        } else {
            GenerationChange::Advance
        };

        self.slots.clear(change);
    }
}

impl<T: Recyclable> VolatilePool<T> {
    /// Acquires an instance without blocking.
    ///
    /// # Errors
    ///
    /// Returns the factory's error if a new instance had to be constructed and construction
    /// failed. A slot claimed for the attempt is released empty and nothing is attributed to
    /// the pool.
    pub fn try_emplace(&self, args: T::Args) -> Result<PooledMut<T>, T::Error> {
        match self.slots.try_claim() {
            Some(claim) => self.slots.populate(claim, || T::make(args)),
            None => self.slots.manufacture(|| T::make(args)),
        }
    }
}

impl<T: Recyclable<Error = Infallible>> VolatilePool<T> {
    /// Acquires an instance without blocking.
    #[must_use]
    pub fn emplace(&self, args: T::Args) -> PooledMut<T> {
        self.try_emplace(args).unwrap_or_else(|never| match never {})
    }
}

impl<T> Default for VolatilePool<T> {
    /// Creates a pool with zero capacity, in which every instance is an overflow instance.
    fn default() -> Self {
        Self::new(0)
    }
}

impl<T> fmt::Debug for VolatilePool<T> {
    #[cfg_attr(test, mutants::skip)] // No API contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VolatilePool")
            .field("slots", &self.slots)
            .finish()
    }
}
