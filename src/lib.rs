//! Schema-driven runtime codec for Bond-style binary payloads.

/// Schema model, dynamic objects, protocols, and the decode/encode/transcode plans.
pub mod codec;
