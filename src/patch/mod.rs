/// Single text edits and their outcomes.
pub mod ops;
/// Patch-set files applied across a source tree.
pub mod set;

pub use ops::{apply_patch, PatchOp, PatchOutcome};
pub use set::{apply_patch_set, Patch, PatchReport, PatchResult, PatchSet};
