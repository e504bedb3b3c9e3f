// Test modules for ai-manager crate
//
// Each source unit has a corresponding test file focused on business logic
// verification. HTTP-level behaviour of connectors is covered by the
// integration tests under tests/.

// Shared fixtures
pub mod helpers;

pub mod agent;
pub mod factory;
pub mod response_parser;
