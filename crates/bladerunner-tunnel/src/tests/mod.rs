//! Test suites for the guest tunnel.
