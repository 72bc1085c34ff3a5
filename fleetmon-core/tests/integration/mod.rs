mod discovery_flow;
mod persistence_tests;
mod polling_tests;
mod session_lifecycle;
