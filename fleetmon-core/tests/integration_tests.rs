//! Integration tests for the `FleetMon` core library
//!
//! These tests drive the scanner, session manager, poller and config layer
//! together through the scripted transport and probe doubles.

// Allow common test patterns that Clippy warns about
#![allow(clippy::redundant_clone)]
#![allow(clippy::similar_names)]
#![allow(clippy::too_many_lines)]

mod integration;
