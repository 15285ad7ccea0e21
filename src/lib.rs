//! Workspace-level package.
//!
//! Carries no code of its own; it exists so cargo-husky installs the
//! repository's git hooks. The actual crates live under `crates/`.
