//! Integration tests for Cuedeck
//!
//! These tests drive the session coordinator through its public handle
//! against the real JSON file store, the simulated collaborators and the
//! mocks, checking the cross-component behavior no unit test sees.

#[path = "integration/concurrent_requests.rs"]
mod concurrent_requests;
#[path = "integration/file_store_sessions.rs"]
mod file_store_sessions;
#[path = "integration/session_invariants.rs"]
mod session_invariants;
#[path = "integration/simulated_sessions.rs"]
mod simulated_sessions;
