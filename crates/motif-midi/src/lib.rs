//! MIDI bridge for motif pattern graphs.
//!
//! Converts between [`motif_core::Pattern`] values and Standard MIDI Files:
//! import flattens an SMF into a single channel-free pattern, and a
//! [`Timeline`] arranges patterns on channels at absolute times for
//! rendering back out.
//!
//! # Modules
//!
//! - [`error`]: MidiError enum with all failure modes
//! - [`import`]: SMF to Pattern conversion
//! - [`timeline`]: pattern arrangement and SMF rendering

pub mod error;
pub mod import;
pub mod timeline;

// Re-export key types for ergonomic use.
pub use error::MidiError;
pub use import::{pattern_from_file, pattern_from_smf};
pub use timeline::{RenderConfig, Timeline};
