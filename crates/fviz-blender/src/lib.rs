//! Formula Viz Blender export.
//!
//! Serializes a rendered session into the files the Blender import script
//! consumes: a scene manifest and a frame stream.

pub mod writer;

pub use writer::{ExportSummary, SceneManifest, SceneWriter};
