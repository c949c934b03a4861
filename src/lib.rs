//! Workspace root package. Functionality lives in the member crates.
