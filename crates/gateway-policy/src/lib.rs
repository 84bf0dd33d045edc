//! Shell-command policy (C1): classify and authorize a shell command string
//! before the `shell`/`bash` tools are allowed to run it.
//!
//! Grounded on `skynet-terminal/src/safety.rs`'s overall shape — constant
//! allow/deny tables, lowercase comparisons, one `#[cfg(test)]` module with a
//! named test per distinguishable behavior — but the classification
//! algorithm itself is rewritten: the teacher does a flat allowlist/denylist
//! substring scan with no compound-command splitting or autonomy levels,
//! while this module requires per-segment `base_command` extraction and
//! multi-level risk/autonomy gating that has no direct teacher analog.

mod allowlist;
pub mod safety;

pub use safety::{validate_bash_input, BashInput, PolicyError, Risk};
