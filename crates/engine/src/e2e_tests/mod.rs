//! End-to-end tests.
//!
//! These drive a real server (ephemeral port, tempdir content root,
//! filesystem store and template source) through a WebSocket client,
//! covering the full gameplay loop: connect, AOI, collect/drop round trips,
//! admin visibility edits, and experience reset.

mod scenarios;
mod support;
