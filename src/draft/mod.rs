// In-progress metric editing for the active player: the draft store and the
// pure validation predicates computed over it.

pub mod store;
pub mod validate;
