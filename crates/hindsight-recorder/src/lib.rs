//! Library surface of the recorder binary: pipeline assembly, router,
//! control adapter, and the side-stage drains. Exposed so integration
//! tests (and an embedding shell) can drive the full stage graph.

pub mod control;
pub mod drain;
pub mod pipeline;
pub mod router;

pub use pipeline::Pipeline;
