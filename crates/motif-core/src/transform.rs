//! The capability interface and the stock transform library.
//!
//! A node's capability is anything implementing [`Modifier`]: one pure
//! function from resolved input patterns to one output pattern. The graph is
//! generic over the capability type and never looks inside it.
//!
//! [`Transform`] is the shipped implementor, a closed enum of the stock
//! pitch/time/velocity manipulations. All variants are deterministic, none
//! read the named inputs (those are reserved for custom capabilities), and
//! a missing or null input always behaves as the empty pattern.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::pattern::{Beat, Pattern};

/// A node capability: one pure function over resolved upstream values.
///
/// `inputs` holds the positional upstream patterns in declaration order and
/// `kwinputs` the named ones in insertion order; null references arrive as
/// empty patterns. Implementations must be deterministic and side-effect-free
/// with respect to graph state.
pub trait Modifier {
    fn apply(&self, inputs: &[Pattern], kwinputs: &IndexMap<String, Pattern>) -> Pattern;
}

/// Stock pattern transforms.
///
/// Single-input variants operate on the first positional input; extra
/// positional inputs are ignored and a missing one is treated as empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Transform {
    // -- Sources --
    /// Emits the embedded pattern, ignoring all inputs.
    Const { pattern: Pattern },

    // -- Combinators --
    /// Pointwise union of every input; length is the longest input's.
    Union,
    /// Inputs laid end to end: each input's starts shift by the summed
    /// length of the inputs before it; length is the total.
    Concat,

    // -- Time --
    /// Drops chords starting before zero or after the length. With
    /// `trim_end`, also clamps note durations to stop at the length.
    Trim { trim_end: bool },
    /// Re-frames the window `[start, end)` to begin at zero; `end` defaults
    /// to the input length. Notes outside the window are kept (their starts
    /// may go negative); trimming is a separate step.
    View { start: Beat, end: Option<Beat> },
    /// Multiplies every start, duration, and the length by `factor`.
    Stretch { factor: Beat },
    /// Snaps each chord start to the nearest multiple of `1/grid`.
    Quantize { grid: u32 },
    /// Mirrors chord starts in time: `start` becomes `length - start`.
    /// Durations are unchanged, so notes sound forward from the mirrored
    /// starts.
    Reverse,

    // -- Velocity --
    /// Multiplies every velocity by `factor`, truncated and clamped to
    /// 0..=127.
    ScaleVelocity { factor: f64 },
    /// Sets every velocity.
    SetVelocity { velocity: u8 },

    // -- Duration --
    /// Multiplies every note duration by `factor`.
    ScaleDuration { factor: Beat },
    /// Sets every note duration.
    SetDuration { duration: Beat },

    // -- Pitch --
    /// Shifts every key by `semitones`, clamped to 0..=127.
    Transpose { semitones: i8 },
    /// Reflects every key about `center`, clamped to 0..=127.
    Invert { center: u8 },
}

impl Modifier for Transform {
    fn apply(&self, inputs: &[Pattern], _kwinputs: &IndexMap<String, Pattern>) -> Pattern {
        match self {
            Transform::Const { pattern } => pattern.clone(),
            Transform::Union => union(inputs),
            Transform::Concat => concat(inputs),
            Transform::Trim { trim_end } => trim(single(inputs), *trim_end),
            Transform::View { start, end } => view(single(inputs), *start, *end),
            Transform::Stretch { factor } => stretch(single(inputs), *factor),
            Transform::Quantize { grid } => quantize(single(inputs), *grid),
            Transform::Reverse => reverse(single(inputs)),
            Transform::ScaleVelocity { factor } => {
                single(inputs).map_notes(|mut note| {
                    let scaled = (f64::from(note.velocity) * factor) as i64;
                    note.velocity = scaled.clamp(0, 127) as u8;
                    note
                })
            }
            Transform::SetVelocity { velocity } => {
                single(inputs).map_notes(|mut note| {
                    note.velocity = *velocity;
                    note
                })
            }
            Transform::ScaleDuration { factor } => {
                single(inputs).map_notes(|mut note| {
                    note.duration = note.duration * *factor;
                    note
                })
            }
            Transform::SetDuration { duration } => {
                single(inputs).map_notes(|mut note| {
                    note.duration = *duration;
                    note
                })
            }
            Transform::Transpose { semitones } => {
                single(inputs).map_notes(|mut note| {
                    let key = i16::from(note.key) + i16::from(*semitones);
                    note.key = key.clamp(0, 127) as u8;
                    note
                })
            }
            Transform::Invert { center } => {
                single(inputs).map_notes(|mut note| {
                    let key = 2 * i16::from(*center) - i16::from(note.key);
                    note.key = key.clamp(0, 127) as u8;
                    note
                })
            }
        }
    }
}

/// First positional input, or the empty pattern.
fn single(inputs: &[Pattern]) -> Pattern {
    inputs.first().cloned().unwrap_or_default()
}

fn union(inputs: &[Pattern]) -> Pattern {
    inputs
        .iter()
        .fold(Pattern::new(), |merged, input| merged.merge(input))
}

fn concat(inputs: &[Pattern]) -> Pattern {
    let mut out = Pattern::new();
    let mut offset = Beat::from_integer(0);
    for input in inputs {
        for (start, chord) in input.chords() {
            for &note in chord {
                out.add(start + offset, note);
            }
        }
        offset += input.length();
    }
    out.set_length(offset);
    out
}

fn trim(input: Pattern, trim_end: bool) -> Pattern {
    let zero = Beat::from_integer(0);
    let length = input.length();
    let mut out = Pattern::with_length(length);
    for (start, chord) in input.chords() {
        if start < zero || start > length {
            continue;
        }
        for &note in chord {
            let mut note = note;
            if trim_end && start + note.duration > length {
                note.duration = (length - start).max(zero);
            }
            out.add(start, note);
        }
    }
    out
}

fn view(input: Pattern, start: Beat, end: Option<Beat>) -> Pattern {
    let end = end.unwrap_or_else(|| input.length());
    let mut out = input.shifted(-start);
    out.set_length(end - start);
    out
}

fn stretch(input: Pattern, factor: Beat) -> Pattern {
    let mut out = input
        .map_starts(|start| start * factor)
        .map_notes(|mut note| {
            note.duration = note.duration * factor;
            note
        });
    out.set_length(input.length() * factor);
    out
}

fn quantize(input: Pattern, grid: u32) -> Pattern {
    let grid = Beat::from_integer(i64::from(grid.max(1)));
    input.map_starts(|start| (start * grid).round() / grid)
}

fn reverse(input: Pattern) -> Pattern {
    let length = input.length();
    input.map_starts(|start| length - start)
}
