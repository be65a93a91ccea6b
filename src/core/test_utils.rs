//! Test utilities for arena-based testing.
//!
//! Functions and their quad lists borrow the session arena, so tests keep a
//! `TestContext` alive for as long as any function built from it.
