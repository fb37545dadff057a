use std::fmt;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use scopeguard::ScopeGuard;
use tracing::{debug, trace};

use crate::PooledMut;
use crate::constants::ERR_SLOT_OUT_OF_RANGE;

/// Identifies where a checked-out instance goes when it is returned.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Origin {
    /// The instance belongs to the slot with this index, which stays busy until the return.
    Slot(usize),

    /// The instance was manufactured outside the slot set because every slot was busy.
    Overflow,
}

/// The return ticket carried by every non-vacant handle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct Lease {
    pub(crate) origin: Origin,

    /// The generation the instance was stamped with at construction or at its last return.
    pub(crate) generation: u64,
}

/// How a `clear()` affects the generation bookkeeping of the slot set.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum GenerationChange {
    /// Only idle instances are destroyed. Outstanding instances return normally.
    Keep,

    /// A new generation begins. Outstanding instances remain poolable and are
    /// restamped with the new generation when they return.
    Advance,

    /// A new generation begins and every outstanding instance is retired: it is
    /// destroyed instead of pooled when it returns.
    Retire,
}

/// A slot reserved for one caller. The slot stays busy until the claim is turned into
/// a handle (and that handle returns) or the claim is abandoned.
pub(crate) struct Claim<T> {
    index: usize,

    /// The instance that was resident in the slot, with its generation stamp.
    resident: Option<(Box<T>, u64)>,
}

/// The fixed-capacity storage shared by a pool and every handle it has issued.
///
/// Idle instances are resident in their slot. A checked-out instance is moved (boxed) into
/// its handle, so the handle can use it without holding any lock; the slot remains marked
/// busy until the instance comes back.
///
/// All slot state transitions happen under one mutex. Two condition variables hang off it:
/// `slot_freed` wakes one blocked acquirer whenever a busy slot becomes idle and `drained`
/// wakes every exclusive visitor once no slot is busy anymore.
pub(crate) struct SlotSet<T> {
    name: String,
    capacity: usize,

    table: Mutex<SlotTable<T>>,

    slot_freed: Condvar,
    drained: Condvar,
}

struct SlotTable<T> {
    slots: Vec<Slot<T>>,
    busy_count: usize,

    generation: u64,

    // Instances stamped with a generation below this are destroyed when they return.
    retired_below: u64,

    // Live instances stamped with a generation that is not retired, wherever they are.
    attributed: usize,
}

struct Slot<T> {
    instance: Option<Box<T>>,
    busy: bool,
    generation: u64,
}

/// What happened to a returned instance. Only used for logging.
#[derive(Clone, Copy, Debug)]
enum Outcome {
    Pooled(usize),
    Adopted(usize),
    Replaced(usize),
    Surplus,
    Retired(u64),
}

/// The result of returning an instance, applied by the caller once the lock is released.
struct Restored<T> {
    outcome: Outcome,

    // Instances are never dropped under the lock: a destructor may use the pool again.
    doomed: Option<Box<T>>,

    freed_slot: bool,
    drained: bool,
}

impl<T> SlotSet<T> {
    pub(crate) fn new(capacity: usize, name: String) -> Self {
        let slots = (0..capacity).map(|_| Slot::vacant()).collect();

        Self {
            name,
            capacity,
            table: Mutex::new(SlotTable {
                slots,
                busy_count: 0,
                generation: 0,
                retired_below: 0,
                attributed: 0,
            }),
            slot_freed: Condvar::new(),
            drained: Condvar::new(),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn generation(&self) -> u64 {
        self.table.lock().generation
    }

    pub(crate) fn attributed(&self) -> usize {
        self.table.lock().attributed
    }

    /// Reserves an idle slot if there is one, preferring slots that already hold an instance.
    pub(crate) fn try_claim(&self) -> Option<Claim<T>> {
        self.table.lock().claim_idle()
    }

    /// Reserves an idle slot, blocking the calling thread for as long as every slot is busy.
    ///
    /// With zero capacity this never returns.
    pub(crate) fn claim_blocking(&self) -> Claim<T> {
        let mut table = self.table.lock();

        loop {
            if let Some(claim) = table.claim_idle() {
                return claim;
            }

            trace!(pool = %self.name, "all slots busy, waiting for a slot to be released");
            self.slot_freed.wait(&mut table);
        }
    }

    /// Turns a claim into a handle, constructing the instance if the slot holds none.
    ///
    /// A resident instance is handed out as-is and `make` is not called. If `make` fails or
    /// panics, the slot is released empty and one waiter is woken before the failure propagates.
    pub(crate) fn populate<E>(
        self: &Arc<Self>,
        claim: Claim<T>,
        make: impl FnOnce() -> Result<T, E>,
    ) -> Result<PooledMut<T>, E> {
        let Claim { index, resident } = claim;

        if let Some((instance, generation)) = resident {
            trace!(pool = %self.name, index, generation, "reusing resident instance");

            return Ok(self.lend(instance, Origin::Slot(index), generation));
        }

        let claim_guard = scopeguard::guard(index, |index| self.abandon(index));

        let instance = make().inspect_err(|_| {
            debug!(pool = %self.name, index, "factory failed, releasing the claimed slot");
        })?;

        let index = ScopeGuard::into_inner(claim_guard);
        let generation = self.table.lock().register();

        trace!(pool = %self.name, index, generation, "constructed instance in empty slot");

        Ok(self.lend(Box::new(instance), Origin::Slot(index), generation))
    }

    /// Constructs an instance that lives outside the slot set.
    pub(crate) fn manufacture<E>(
        self: &Arc<Self>,
        make: impl FnOnce() -> Result<T, E>,
    ) -> Result<PooledMut<T>, E> {
        let instance = make().inspect_err(|_| {
            debug!(pool = %self.name, "factory failed for overflow instance");
        })?;

        let generation = self.table.lock().register();

        trace!(pool = %self.name, generation, "manufactured overflow instance");

        Ok(self.lend(Box::new(instance), Origin::Overflow, generation))
    }

    /// Applies the return policy to an instance coming back from a handle.
    pub(crate) fn restore(&self, instance: Box<T>, lease: Lease) {
        let restored = self.table.lock().restore(instance, lease);

        if restored.freed_slot {
            self.slot_freed.notify_one();
        }

        if restored.drained {
            self.drained.notify_all();
        }

        match restored.outcome {
            Outcome::Pooled(index) => {
                trace!(pool = %self.name, index, "instance returned to its slot");
            }
            Outcome::Adopted(index) => {
                trace!(pool = %self.name, index, "overflow instance adopted into an empty slot");
            }
            Outcome::Replaced(index) => {
                debug!(
                    pool = %self.name,
                    index,
                    "overflow instance replaced the resident instance of an idle slot"
                );
            }
            Outcome::Surplus => {
                debug!(pool = %self.name, "no idle slot for overflow instance, discarding it");
            }
            Outcome::Retired(generation) => {
                debug!(
                    pool = %self.name,
                    generation,
                    "discarding returned instance from a retired generation"
                );
            }
        }

        drop(restored.doomed);
    }

    /// Destroys every idle resident instance and applies the generation change.
    pub(crate) fn clear(&self, change: GenerationChange) {
        let (destroyed, generation) = {
            let mut table = self.table.lock();
            let destroyed = table.clear(change);
            (destroyed, table.generation)
        };

        // Emptied slots are still idle, but acquirers re-check anyway.
        self.slot_freed.notify_all();

        debug!(
            pool = %self.name,
            destroyed = destroyed.len(),
            generation,
            ?change,
            "cleared idle instances"
        );

        drop(destroyed);
    }

    /// Visits the instances resident in idle slots, in slot order, until `visitor` returns
    /// `false`. Busy slots and empty slots are skipped; this never waits for a busy slot.
    ///
    /// The lock is held for the traversal, so acquisitions and returns wait for it to end.
    pub(crate) fn visit_idle(&self, mut visitor: impl FnMut(&T) -> bool) {
        let table = self.table.lock();

        for instance in table
            .slots
            .iter()
            .filter(|slot| !slot.busy)
            .filter_map(|slot| slot.instance.as_deref())
        {
            if !visitor(instance) {
                break;
            }
        }
    }

    /// Waits until no slot is busy, then visits every resident instance in slot order until
    /// `visitor` returns `false`.
    ///
    /// The lock is held from the moment the set drains until the traversal ends, so no
    /// acquisition can succeed while the visitor runs.
    pub(crate) fn visit_all(&self, mut visitor: impl FnMut(&mut T) -> bool) {
        let mut table = self.table.lock();

        while table.busy_count > 0 {
            trace!(
                pool = %self.name,
                busy = table.busy_count,
                "exclusive visit waiting for busy slots to be released"
            );
            self.drained.wait(&mut table);
        }

        for instance in table
            .slots
            .iter_mut()
            .filter_map(|slot| slot.instance.as_deref_mut())
        {
            if !visitor(instance) {
                break;
            }
        }
    }

    fn lend(self: &Arc<Self>, instance: Box<T>, origin: Origin, generation: u64) -> PooledMut<T> {
        PooledMut::new(instance, Lease { origin, generation }, Arc::clone(self))
    }

    fn abandon(&self, index: usize) {
        let drained = self.table.lock().release(index);

        self.slot_freed.notify_one();

        if drained {
            self.drained.notify_all();
        }
    }
}

impl<T> fmt::Debug for SlotSet<T> {
    #[cfg_attr(test, mutants::skip)] // No API contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("SlotSet");
        debug
            .field("name", &self.name)
            .field("capacity", &self.capacity);

        // The formatting thread may already hold the lock (e.g. inside a visitor).
        if let Some(table) = self.table.try_lock() {
            debug
                .field("busy", &table.busy_count)
                .field("generation", &table.generation)
                .field("attributed", &table.attributed);
        }

        debug.finish_non_exhaustive()
    }
}

impl<T> SlotTable<T> {
    fn slot_mut(&mut self, index: usize) -> &mut Slot<T> {
        self.slots.get_mut(index).expect(ERR_SLOT_OUT_OF_RANGE)
    }

    fn find_idle(&self, prefer_resident: bool) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| !slot.busy && slot.instance.is_some() == prefer_resident)
            .or_else(|| self.slots.iter().position(|slot| !slot.busy))
    }

    fn claim_idle(&mut self) -> Option<Claim<T>> {
        let index = self.find_idle(true)?;

        let slot = self.slot_mut(index);
        slot.busy = true;
        let resident = slot
            .instance
            .take()
            .map(|instance| (instance, slot.generation));

        self.busy_count = self
            .busy_count
            .checked_add(1)
            .expect("more slots busy than exist - this indicates corrupted slot bookkeeping");

        Some(Claim { index, resident })
    }

    /// Marks a busy slot idle. Returns whether the set is now fully drained.
    fn release(&mut self, index: usize) -> bool {
        let slot = self.slot_mut(index);
        debug_assert!(slot.busy, "only a busy slot can be released");
        slot.busy = false;

        self.busy_count = self
            .busy_count
            .checked_sub(1)
            .expect("released more slots than were claimed - this indicates a double return");

        self.busy_count == 0
    }

    fn register(&mut self) -> u64 {
        self.attributed = self
            .attributed
            .checked_add(1)
            .expect("live instance count overflows usize - this indicates an unrealistic scenario");

        self.generation
    }

    fn forget(&mut self, count: usize) {
        self.attributed = self
            .attributed
            .checked_sub(count)
            .expect("destroyed more instances than were constructed");
    }

    fn restore(&mut self, instance: Box<T>, lease: Lease) -> Restored<T> {
        let retired = lease.generation < self.retired_below;

        match lease.origin {
            Origin::Slot(index) => {
                let (outcome, doomed) = if retired {
                    (Outcome::Retired(lease.generation), Some(instance))
                } else {
                    let generation = self.generation;
                    let slot = self.slot_mut(index);
                    slot.instance = Some(instance);
                    slot.generation = generation;

                    (Outcome::Pooled(index), None)
                };

                let drained = self.release(index);

                Restored {
                    outcome,
                    doomed,
                    freed_slot: true,
                    drained,
                }
            }
            Origin::Overflow if retired => {
                Restored::discarded(Outcome::Retired(lease.generation), instance)
            }
            Origin::Overflow => self.adopt(instance),
        }
    }

    fn adopt(&mut self, instance: Box<T>) -> Restored<T> {
        let Some(index) = self.find_idle(false) else {
            self.forget(1);
            return Restored::discarded(Outcome::Surplus, instance);
        };

        let generation = self.generation;
        let slot = self.slot_mut(index);
        slot.generation = generation;
        let evicted = slot.instance.replace(instance);

        let outcome = if evicted.is_some() {
            self.forget(1);
            Outcome::Replaced(index)
        } else {
            Outcome::Adopted(index)
        };

        Restored {
            outcome,
            doomed: evicted,
            freed_slot: false,
            drained: false,
        }
    }

    fn clear(&mut self, change: GenerationChange) -> Vec<Box<T>> {
        let destroyed: Vec<Box<T>> = self
            .slots
            .iter_mut()
            .filter(|slot| !slot.busy)
            .filter_map(|slot| slot.instance.take())
            .collect();

        self.forget(destroyed.len());

        match change {
            GenerationChange::Keep => {}
            GenerationChange::Advance => {
                self.generation = self.next_generation();
            }
            GenerationChange::Retire => {
                self.generation = self.next_generation();
                self.retired_below = self.generation;

                // Outstanding instances are no longer attributed to the pool.
                self.attributed = 0;
            }
        }

        destroyed
    }

    fn next_generation(&self) -> u64 {
        self.generation
            .checked_add(1)
            .expect("generation counter overflows u64 - this indicates an unrealistic scenario")
    }
}

impl<T> Slot<T> {
    fn vacant() -> Self {
        Self {
            instance: None,
            busy: false,
            generation: 0,
        }
    }
}

impl<T> Restored<T> {
    fn discarded(outcome: Outcome, instance: Box<T>) -> Self {
        Self {
            outcome,
            doomed: Some(instance),
            freed_slot: false,
            drained: false,
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::convert::Infallible;
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    fn slot_set(capacity: usize) -> Arc<SlotSet<u32>> {
        Arc::new(SlotSet::new(capacity, "test".to_string()))
    }

    fn ok(value: u32) -> impl FnOnce() -> Result<u32, Infallible> {
        move || Ok(value)
    }

    fn claim_and_populate(slots: &Arc<SlotSet<u32>>, value: u32) -> PooledMut<u32> {
        let claim = slots.try_claim().expect("an idle slot should be available");
        slots.populate(claim, ok(value)).unwrap()
    }

    #[test]
    fn claim_marks_slot_busy_until_returned() {
        let slots = slot_set(1);

        let pooled = claim_and_populate(&slots, 1);
        assert!(slots.try_claim().is_none());

        drop(pooled);
        assert!(slots.try_claim().is_some());
    }

    #[test]
    fn zero_capacity_never_has_an_idle_slot() {
        let slots = slot_set(0);

        assert!(slots.try_claim().is_none());
        assert_eq!(slots.capacity(), 0);
    }

    #[test]
    fn claim_prefers_slot_with_resident_instance() {
        let slots = slot_set(2);

        {
            let mut table = slots.table.lock();
            let warm = table.slot_mut(1);
            warm.instance = Some(Box::new(7));
        }

        let claim = slots.try_claim().unwrap();
        assert_eq!(claim.index, 1);
        let warm = slots.populate(claim, ok(99)).unwrap();
        assert_eq!(warm.get(), Some(&7));

        // Only the empty slot is left while the warm one is checked out.
        let claim = slots.try_claim().unwrap();
        assert_eq!(claim.index, 0);
        assert!(claim.resident.is_none());

        drop(warm);
    }

    #[test]
    fn returned_resident_is_claimed_again_before_empty_slot() {
        let slots = slot_set(2);

        {
            let mut table = slots.table.lock();
            table.slot_mut(1).instance = Some(Box::new(7));
        }

        let claim = slots.try_claim().unwrap();
        drop(slots.populate(claim, ok(99)).unwrap());

        let claim = slots.try_claim().unwrap();
        assert_eq!(claim.index, 1);
        assert!(claim.resident.is_some());
    }

    #[test]
    fn resident_instance_ignores_new_arguments() {
        let slots = slot_set(1);

        drop(claim_and_populate(&slots, 1));

        let claim = slots.try_claim().unwrap();
        let reused = slots
            .populate(claim, || -> Result<u32, Infallible> {
                panic!("factory must not run for a resident instance")
            })
            .unwrap();

        assert_eq!(*reused, 1);
    }

    #[test]
    fn factory_error_leaves_slot_idle_and_empty() {
        let slots = slot_set(1);

        let claim = slots.try_claim().unwrap();
        let result = slots.populate(claim, || Err::<u32, _>("boom"));
        assert_eq!(result.unwrap_err(), "boom");

        let claim = slots.try_claim().expect("slot must be idle after a failed construction");
        assert!(claim.resident.is_none());
        assert_eq!(slots.attributed(), 0);
    }

    #[test]
    fn factory_panic_leaves_slot_idle_and_empty() {
        let slots = slot_set(1);

        let claim = slots.try_claim().unwrap();
        let result = catch_unwind(AssertUnwindSafe(|| {
            slots.populate(claim, || -> Result<u32, Infallible> { panic!("factory panic") })
        }));
        assert!(result.is_err());

        let claim = slots.try_claim().expect("slot must be idle after a panicking factory");
        assert!(claim.resident.is_none());
    }

    #[test]
    fn overflow_prefers_empty_idle_slot() {
        let slots = slot_set(2);

        let resident = claim_and_populate(&slots, 1);
        drop(resident);

        // Slot 0 idle with instance 1, slot 1 idle and empty.
        let overflow = slots.manufacture(ok(2)).unwrap();
        drop(overflow);

        let mut seen = Vec::new();
        slots.visit_idle(|value| {
            seen.push(*value);
            true
        });
        assert_eq!(seen, vec![1, 2]);
        assert_eq!(slots.attributed(), 2);
    }

    #[test]
    fn overflow_replaces_resident_instance_when_no_slot_is_empty() {
        let slots = slot_set(1);

        drop(claim_and_populate(&slots, 1));
        let overflow = slots.manufacture(ok(2)).unwrap();
        assert_eq!(slots.attributed(), 2);

        drop(overflow);

        let mut seen = Vec::new();
        slots.visit_idle(|value| {
            seen.push(*value);
            true
        });
        assert_eq!(seen, vec![2]);
        assert_eq!(slots.attributed(), 1);
    }

    #[test]
    fn overflow_discarded_when_all_slots_busy() {
        let slots = slot_set(1);

        let resident = claim_and_populate(&slots, 1);
        let overflow = slots.manufacture(ok(2)).unwrap();
        assert_eq!(slots.attributed(), 2);

        drop(overflow);
        assert_eq!(slots.attributed(), 1);

        drop(resident);
        assert_eq!(slots.attributed(), 1);
    }

    #[test]
    fn retire_discards_outstanding_instances_on_return() {
        let slots = slot_set(1);

        let resident = claim_and_populate(&slots, 1);
        let overflow = slots.manufacture(ok(2)).unwrap();

        slots.clear(GenerationChange::Retire);
        assert_eq!(slots.generation(), 1);
        assert_eq!(slots.attributed(), 0);

        drop(overflow);
        drop(resident);
        assert_eq!(slots.attributed(), 0);

        let claim = slots.try_claim().unwrap();
        assert!(claim.resident.is_none(), "retired instance must not be pooled");
    }

    #[test]
    fn advance_keeps_outstanding_instances_poolable() {
        let slots = slot_set(1);

        let resident = claim_and_populate(&slots, 1);
        slots.clear(GenerationChange::Advance);
        assert_eq!(slots.generation(), 1);
        assert_eq!(slots.attributed(), 1);

        drop(resident);

        let claim = slots.try_claim().unwrap();
        let (instance, generation) = claim.resident.as_ref().unwrap();
        assert_eq!(**instance, 1);
        assert_eq!(*generation, 1, "returned instance is restamped with the new generation");
    }

    #[test]
    fn clear_keep_destroys_only_idle_instances() {
        let slots = slot_set(2);

        let busy = claim_and_populate(&slots, 1);
        drop(claim_and_populate(&slots, 2));
        assert_eq!(slots.attributed(), 2);

        slots.clear(GenerationChange::Keep);
        assert_eq!(slots.generation(), 0);
        assert_eq!(slots.attributed(), 1);

        drop(busy);

        let mut seen = Vec::new();
        slots.visit_idle(|value| {
            seen.push(*value);
            true
        });
        assert_eq!(seen, vec![1]);
    }

    #[test]
    fn visit_idle_skips_busy_slots_and_stops_early() {
        let slots = slot_set(3);

        let busy = claim_and_populate(&slots, 1);
        let idle_a = claim_and_populate(&slots, 2);
        let idle_b = claim_and_populate(&slots, 3);
        drop(idle_a);
        drop(idle_b);

        let mut seen = Vec::new();
        slots.visit_idle(|value| {
            seen.push(*value);
            false
        });
        assert_eq!(seen, vec![2]);

        drop(busy);
    }

    #[test]
    fn visit_all_sees_every_resident_instance_mutably() {
        let slots = slot_set(2);

        let first = claim_and_populate(&slots, 1);
        let second = claim_and_populate(&slots, 2);
        drop(first);
        drop(second);

        slots.visit_all(|value| {
            *value = value.wrapping_mul(10);
            true
        });

        let mut seen = Vec::new();
        slots.visit_idle(|value| {
            seen.push(*value);
            true
        });
        assert_eq!(seen, vec![10, 20]);
    }

    #[test]
    fn debug_output_does_not_deadlock_inside_visitor() {
        let slots = slot_set(1);
        drop(claim_and_populate(&slots, 1));

        slots.visit_idle(|_| {
            let rendered = format!("{slots:?}");
            assert!(rendered.contains("SlotSet"));
            true
        });
    }
}
