//! Browser-facing streaming: the SSE wire format and the per-turn relay.

pub mod framer;
pub mod sse;
