// Dereferencing a vacant handle is a caller bug, not a recoverable condition.
pub(crate) const ERR_VACANT_HANDLE: &str = "dereferenced a vacant pooled handle - the handle \
    was reset, taken from or never held an instance";

pub(crate) const ERR_SLOT_OUT_OF_RANGE: &str = "lease refers to a slot that does not exist \
    in its slot set - the slot set must never shrink while leases are outstanding";
