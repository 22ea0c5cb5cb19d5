//! Integration-test crate: everything lives in `tests/`.
