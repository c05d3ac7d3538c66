//! Shared test utilities for execution tests.
//!
//! This module provides:
//! - A scripted, recording mock `Channel`
//! - A backoff policy that records its delays
//! - An in-process test network and client builder

#![allow(dead_code)]

pub mod mock_transport;

pub use mock_transport::*;
