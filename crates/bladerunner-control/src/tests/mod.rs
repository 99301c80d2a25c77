//! Test suites for the control plane.
