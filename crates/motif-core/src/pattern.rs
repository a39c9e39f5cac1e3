//! Timed note patterns, the value type every graph node produces.
//!
//! Times and durations are exact rationals in whole-note units ([`Beat`]):
//! a quarter note is `1/4`, a dotted eighth is `3/16`. Exact arithmetic keeps
//! start times usable as ordered map keys; there is no float drift when
//! transforms stack.
//!
//! A [`Pattern`] maps start times to chords (all notes sharing a start) and
//! carries a nominal `length` independent of note extents: transforms create
//! notes before time zero and past the length, and trimming is an explicit
//! operation, never implicit.

use std::collections::BTreeMap;

use num_rational::Rational64;
use serde::{Deserialize, Serialize};

/// Exact musical time in whole-note units.
pub type Beat = Rational64;

/// Shorthand for `Beat::new(numer, denom)`.
///
/// Panics if `denom` is zero, as rational construction does.
pub fn beat(numer: i64, denom: i64) -> Beat {
    Rational64::new(numer, denom)
}

/// Velocity used by [`Note::new`].
pub const DEFAULT_VELOCITY: u8 = 64;

/// A single note: MIDI key number, velocity, and sounding duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// MIDI key number, 0..=127. Middle C is 60.
    pub key: u8,
    /// MIDI velocity, 0..=127.
    pub velocity: u8,
    /// Sounding duration in whole notes, never negative.
    pub duration: Beat,
}

impl Note {
    /// Creates a note at [`DEFAULT_VELOCITY`].
    pub fn new(key: u8, duration: Beat) -> Self {
        Note {
            key,
            velocity: DEFAULT_VELOCITY,
            duration,
        }
    }

    /// Creates a note with an explicit velocity.
    pub fn with_velocity(key: u8, duration: Beat, velocity: u8) -> Self {
        Note {
            key,
            velocity,
            duration,
        }
    }
}

/// A timed collection of chords plus a nominal length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pattern {
    /// Chords keyed by start time. Never holds an empty chord.
    #[serde(with = "chord_pairs")]
    notes: BTreeMap<Beat, Vec<Note>>,
    /// Nominal length in whole notes, independent of note extents.
    length: Beat,
}

impl Pattern {
    /// Creates an empty, zero-length pattern.
    pub fn new() -> Self {
        Pattern {
            notes: BTreeMap::new(),
            length: Beat::from_integer(0),
        }
    }

    /// Creates an empty pattern with the given nominal length.
    pub fn with_length(length: Beat) -> Self {
        Pattern {
            notes: BTreeMap::new(),
            length,
        }
    }

    /// Builds a pattern from `(start, chord)` pairs, merging duplicate
    /// starts and dropping empty chords.
    pub fn from_chords<I>(chords: I, length: Beat) -> Self
    where
        I: IntoIterator<Item = (Beat, Vec<Note>)>,
    {
        let mut pattern = Pattern::with_length(length);
        for (start, chord) in chords {
            for note in chord {
                pattern.add(start, note);
            }
        }
        pattern
    }

    /// Appends `note` to the chord starting at `start`.
    pub fn add(&mut self, start: Beat, note: Note) {
        self.notes.entry(start).or_default().push(note);
    }

    /// Nominal length in whole notes.
    pub fn length(&self) -> Beat {
        self.length
    }

    /// Replaces the nominal length, leaving notes untouched.
    pub fn set_length(&mut self, length: Beat) {
        self.length = length;
    }

    /// True if the pattern holds no notes (length may still be nonzero).
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Total number of notes across all chords.
    pub fn note_count(&self) -> usize {
        self.notes.values().map(Vec::len).sum()
    }

    /// Chords in start-time order.
    pub fn chords(&self) -> impl Iterator<Item = (Beat, &[Note])> {
        self.notes.iter().map(|(&start, chord)| (start, chord.as_slice()))
    }

    /// Notes of the chord starting exactly at `start`, if any.
    pub fn chord_at(&self, start: Beat) -> Option<&[Note]> {
        self.notes.get(&start).map(Vec::as_slice)
    }

    /// Pointwise union with `other`; the result's length is the longer of
    /// the two.
    pub fn merge(&self, other: &Pattern) -> Pattern {
        let mut merged = self.clone();
        for (start, chord) in other.chords() {
            for &note in chord {
                merged.add(start, note);
            }
        }
        merged.length = self.length.max(other.length);
        merged
    }

    /// Moves every start time by `offset`; length is unchanged.
    pub fn shifted(&self, offset: Beat) -> Pattern {
        self.map_starts(|start| start + offset)
    }

    /// Applies `f` to every note, keeping starts and length.
    pub fn map_notes(&self, f: impl Fn(Note) -> Note) -> Pattern {
        let notes = self
            .notes
            .iter()
            .map(|(&start, chord)| (start, chord.iter().map(|&n| f(n)).collect()))
            .collect();
        Pattern {
            notes,
            length: self.length,
        }
    }

    /// Applies `f` to every start time, keeping notes and length.
    ///
    /// Starts mapped onto each other merge into one chord.
    pub fn map_starts(&self, f: impl Fn(Beat) -> Beat) -> Pattern {
        let mut mapped = Pattern::with_length(self.length);
        for (start, chord) in self.chords() {
            for &note in chord {
                mapped.add(f(start), note);
            }
        }
        mapped
    }

    /// Earliest note start, or zero for an empty pattern. May be negative.
    pub fn real_start_time(&self) -> Beat {
        self.notes
            .keys()
            .next()
            .copied()
            .unwrap_or_else(|| Beat::from_integer(0))
    }

    /// Latest note end (`start + duration`), or zero for an empty pattern.
    /// May exceed the nominal length.
    pub fn real_end_time(&self) -> Beat {
        self.notes
            .iter()
            .flat_map(|(&start, chord)| chord.iter().map(move |n| start + n.duration))
            .max()
            .unwrap_or_else(|| Beat::from_integer(0))
    }
}

impl Default for Pattern {
    fn default() -> Self {
        Pattern::new()
    }
}

/// Serializes the chord map as a sequence of `(start, chord)` pairs.
/// JSON object keys are strings, so a rational-keyed map cannot serialize
/// directly.
mod chord_pairs {
    use std::collections::BTreeMap;

    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::{Beat, Note};

    pub fn serialize<S>(map: &BTreeMap<Beat, Vec<Note>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(map.len()))?;
        for entry in map {
            seq.serialize_element(&entry)?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<Beat, Vec<Note>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let pairs: Vec<(Beat, Vec<Note>)> = Deserialize::deserialize(deserializer)?;
        let mut map: BTreeMap<Beat, Vec<Note>> = BTreeMap::new();
        for (start, chord) in pairs {
            if chord.is_empty() {
                continue;
            }
            map.entry(start).or_default().extend(chord);
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_pattern_has_zero_extents() {
        let p = Pattern::new();
        assert!(p.is_empty());
        assert_eq!(p.length(), beat(0, 1));
        assert_eq!(p.real_start_time(), beat(0, 1));
        assert_eq!(p.real_end_time(), beat(0, 1));
    }

    #[test]
    fn add_groups_notes_into_chords() {
        let mut p = Pattern::with_length(beat(1, 1));
        p.add(beat(0, 1), Note::new(60, beat(1, 4)));
        p.add(beat(0, 1), Note::new(64, beat(1, 4)));
        p.add(beat(1, 2), Note::new(67, beat(1, 4)));

        assert_eq!(p.note_count(), 3);
        assert_eq!(p.chord_at(beat(0, 1)).unwrap().len(), 2);
        assert_eq!(p.chord_at(beat(1, 2)).unwrap().len(), 1);
    }

    #[test]
    fn chords_iterate_in_time_order() {
        let mut p = Pattern::new();
        p.add(beat(3, 4), Note::new(67, beat(1, 4)));
        p.add(beat(0, 1), Note::new(60, beat(1, 4)));
        p.add(beat(1, 4), Note::new(64, beat(1, 4)));

        let starts: Vec<Beat> = p.chords().map(|(start, _)| start).collect();
        assert_eq!(starts, vec![beat(0, 1), beat(1, 4), beat(3, 4)]);
    }

    #[test]
    fn merge_unions_chords_and_takes_longer_length() {
        let mut a = Pattern::with_length(beat(1, 1));
        a.add(beat(0, 1), Note::new(60, beat(1, 4)));
        let mut b = Pattern::with_length(beat(2, 1));
        b.add(beat(0, 1), Note::new(64, beat(1, 4)));
        b.add(beat(1, 1), Note::new(67, beat(1, 4)));

        let merged = a.merge(&b);
        assert_eq!(merged.length(), beat(2, 1));
        assert_eq!(merged.chord_at(beat(0, 1)).unwrap().len(), 2);
        assert_eq!(merged.note_count(), 3);
    }

    #[test]
    fn shifted_moves_starts_but_not_length() {
        let mut p = Pattern::with_length(beat(1, 1));
        p.add(beat(1, 4), Note::new(60, beat(1, 4)));

        let shifted = p.shifted(beat(1, 4));
        assert_eq!(shifted.length(), beat(1, 1));
        assert!(shifted.chord_at(beat(1, 4)).is_none());
        assert_eq!(shifted.chord_at(beat(1, 2)).unwrap().len(), 1);

        let back = shifted.shifted(beat(-1, 2));
        assert_eq!(back.chord_at(beat(0, 1)).unwrap().len(), 1);
    }

    #[test]
    fn map_starts_merges_collisions() {
        let mut p = Pattern::with_length(beat(1, 1));
        p.add(beat(1, 8), Note::new(60, beat(1, 4)));
        p.add(beat(3, 8), Note::new(64, beat(1, 4)));

        // Collapse everything onto time zero.
        let collapsed = p.map_starts(|_| beat(0, 1));
        assert_eq!(collapsed.note_count(), 2);
        assert_eq!(collapsed.chord_at(beat(0, 1)).unwrap().len(), 2);
    }

    #[test]
    fn real_extents_track_earliest_and_latest_notes() {
        let mut p = Pattern::with_length(beat(1, 1));
        p.add(beat(-1, 4), Note::new(60, beat(1, 8)));
        p.add(beat(7, 8), Note::new(64, beat(1, 2)));

        assert_eq!(p.real_start_time(), beat(-1, 4));
        // 7/8 + 1/2 runs past the nominal length.
        assert_eq!(p.real_end_time(), beat(11, 8));
        assert_eq!(p.length(), beat(1, 1));
    }

    #[test]
    fn from_chords_merges_duplicate_starts() {
        let p = Pattern::from_chords(
            vec![
                (beat(0, 1), vec![Note::new(60, beat(1, 4))]),
                (beat(0, 1), vec![Note::new(64, beat(1, 4))]),
                (beat(1, 2), vec![]),
            ],
            beat(1, 1),
        );
        assert_eq!(p.chord_at(beat(0, 1)).unwrap().len(), 2);
        assert!(p.chord_at(beat(1, 2)).is_none());
    }

    #[test]
    fn serde_roundtrip_preserves_rational_times() {
        let mut p = Pattern::with_length(beat(3, 4));
        p.add(beat(1, 3), Note::with_velocity(61, beat(1, 6), 90));
        p.add(beat(0, 1), Note::new(60, beat(1, 4)));

        let json = serde_json::to_string(&p).unwrap();
        let back: Pattern = serde_json::from_str(&json).unwrap();
        assert_eq!(p, back);
    }
}
