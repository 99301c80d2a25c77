//! Test suites for the supervisor.
