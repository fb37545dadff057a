/// Determines which instances a visit over a [`BoundedPool`][crate::BoundedPool] sees and
/// whether the visit waits for checked-out instances.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum VisitMode {
    /// Visits only the instances that are idle right now. Never waits for busy slots.
    #[default]
    Shared,

    /// Waits until every checked-out instance has been returned, then visits every instance
    /// in the pool. Acquisitions attempted during the traversal block until it ends.
    Exclusive,
}
