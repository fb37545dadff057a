use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::{BoundedPool, SlotSet, UnboundedPool, VolatilePool};

/// Builder for creating a recycling pool with custom configuration.
///
/// Obtained from [`BoundedPool::builder()`], [`UnboundedPool::builder()`] or
/// [`VolatilePool::builder()`]. The `new(capacity)` constructors of the pools are sufficient
/// unless you also want to name the pool.
///
/// # Examples
///
/// ```
/// use recycling_pool::BoundedPool;
///
/// let pool = BoundedPool::<String>::builder()
///     .capacity(4)
///     .name("request-buffers")
///     .build();
///
/// assert_eq!(pool.capacity(), 4);
/// assert_eq!(pool.name(), "request-buffers");
/// ```
#[must_use]
pub struct PoolBuilder<P> {
    capacity: usize,
    name: Option<String>,

    _pool: PhantomData<fn() -> P>,
}

impl<P> PoolBuilder<P> {
    pub(crate) fn new() -> Self {
        Self {
            capacity: 0,
            name: None,
            _pool: PhantomData,
        }
    }

    /// Sets the number of slots in the pool. Defaults to zero.
    ///
    /// A bounded pool never holds more than this many instances. The elastic pools keep at
    /// most this many instances resident and manufacture the rest on demand.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the name attached to every log event the pool emits.
    ///
    /// Defaults to the name of the pooled type.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    fn into_slot_set<T>(self) -> Arc<SlotSet<T>> {
        let name = self.name.unwrap_or_else(|| type_name::<T>().to_string());

        Arc::new(SlotSet::new(self.capacity, name))
    }
}

impl<T> PoolBuilder<BoundedPool<T>> {
    /// Builds the pool with the configured settings.
    #[must_use]
    pub fn build(self) -> BoundedPool<T> {
        BoundedPool::from_slot_set(self.into_slot_set())
    }
}

impl<T> PoolBuilder<UnboundedPool<T>> {
    /// Builds the pool with the configured settings.
    #[must_use]
    pub fn build(self) -> UnboundedPool<T> {
        UnboundedPool::from_slot_set(self.into_slot_set())
    }
}

impl<T> PoolBuilder<VolatilePool<T>> {
    /// Builds the pool with the configured settings.
    #[must_use]
    pub fn build(self) -> VolatilePool<T> {
        VolatilePool::from_slot_set(self.into_slot_set())
    }
}

impl<P> fmt::Debug for PoolBuilder<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolBuilder")
            .field("pool_type", &format_args!("{}", type_name::<P>()))
            .field("capacity", &self.capacity)
            .field("name", &self.name)
            .finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_zero_capacity_and_type_name() {
        let pool = UnboundedPool::<u64>::builder().build();

        assert_eq!(pool.capacity(), 0);
        assert_eq!(pool.name(), "u64");
    }

    #[test]
    fn applies_capacity_and_name() {
        let pool = VolatilePool::<u64>::builder()
            .capacity(3)
            .name("parsers")
            .build();

        assert_eq!(pool.capacity(), 3);
        assert_eq!(pool.name(), "parsers");
    }

    #[test]
    fn debug_mentions_target_pool() {
        let builder = BoundedPool::<u64>::builder().capacity(2);

        let rendered = format!("{builder:?}");
        assert!(rendered.contains("BoundedPool"));
        assert!(rendered.contains("capacity: 2"));
    }
}
