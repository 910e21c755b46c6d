// Consolidated integration test suite, compiled by `tests/tests.rs` so the
// crate builds a single integration test binary.
mod attach;
mod disconnect;
mod initialize;
mod launch;
mod transport;
