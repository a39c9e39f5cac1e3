//! Error types for MIDI import and rendering.

use thiserror::Error;

/// Errors produced while reading or writing Standard MIDI Files.
#[derive(Debug, Error)]
pub enum MidiError {
    /// Reading or writing the file failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The bytes are not a well-formed Standard MIDI File.
    #[error("malformed midi file: {0}")]
    Malformed(#[from] midly::Error),

    /// The file's timing mode carries no beat grid to map onto.
    #[error("unsupported timing: {0}")]
    UnsupportedTiming(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failure() {
        let err = MidiError::UnsupportedTiming("SMPTE timecode".to_string());
        assert_eq!(err.to_string(), "unsupported timing: SMPTE timecode");
    }
}
