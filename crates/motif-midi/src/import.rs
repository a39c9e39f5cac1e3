//! Standard MIDI File import.
//!
//! Flattens an SMF into a single [`Pattern`]: every track is merged onto one
//! absolute-tick stream, note-on/note-off events pair up per (channel, key),
//! and ticks convert to whole-note [`Beat`] positions via `ticks / (ppq * 4)`.
//! Channels matter only for pairing; the resulting pattern is channel-free.

use std::collections::HashMap;
use std::path::Path;

use midly::{MidiMessage, Smf, Timing, TrackEventKind};
use motif_core::{beat, Note, Pattern};

use crate::error::MidiError;

/// Reads a Standard MIDI File from disk into a single merged pattern.
pub fn pattern_from_file(path: impl AsRef<Path>) -> Result<Pattern, MidiError> {
    let bytes = std::fs::read(path)?;
    let smf = Smf::parse(&bytes)?;
    pattern_from_smf(&smf)
}

/// Converts a parsed SMF into a single merged pattern.
///
/// Only metrical timing is supported; SMPTE timecode files are rejected
/// with [`MidiError::UnsupportedTiming`]. A note-on with velocity zero
/// closes a note, per common running-status practice, and closing picks the
/// most recently opened note for that (channel, key). Notes still open when
/// the stream ends are closed at the final event's time. The pattern length
/// is the latest note end rounded up to a whole note.
pub fn pattern_from_smf(smf: &Smf) -> Result<Pattern, MidiError> {
    let ppq = match smf.header.timing {
        Timing::Metrical(ppq) => i64::from(ppq.as_int()),
        Timing::Timecode(fps, subframe) => {
            return Err(MidiError::UnsupportedTiming(format!(
                "SMPTE timecode ({fps:?}, {subframe} subframes) has no beat grid"
            )));
        }
    };
    if ppq == 0 {
        return Err(MidiError::UnsupportedTiming(
            "zero ticks per quarter note".to_string(),
        ));
    }
    let ticks_per_whole = ppq * 4;

    // Merge all tracks onto one absolute-tick stream. The sort is stable,
    // so simultaneous events keep their track order.
    let mut events: Vec<(u64, &TrackEventKind)> = Vec::new();
    for track in &smf.tracks {
        let mut tick: u64 = 0;
        for event in track {
            tick += u64::from(event.delta.as_int());
            events.push((tick, &event.kind));
        }
    }
    events.sort_by_key(|&(tick, _)| tick);
    let final_tick = events.last().map(|&(tick, _)| tick).unwrap_or(0);

    // Open notes per (channel, key): start tick and velocity, most recent
    // last.
    let mut open: HashMap<(u8, u8), Vec<(u64, u8)>> = HashMap::new();
    let mut pattern = Pattern::new();

    for &(tick, kind) in &events {
        if let TrackEventKind::Midi { channel, message } = kind {
            match message {
                MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                    open.entry((channel.as_int(), key.as_int()))
                        .or_default()
                        .push((tick, vel.as_int()));
                }
                MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                    if let Some(stack) = open.get_mut(&(channel.as_int(), key.as_int())) {
                        if let Some((start_tick, velocity)) = stack.pop() {
                            add_note(
                                &mut pattern,
                                key.as_int(),
                                velocity,
                                start_tick,
                                tick,
                                ticks_per_whole,
                            );
                        }
                    }
                }
                _ => {}
            }
        }
    }

    // Close leftovers at the final event's time, in a deterministic order.
    let mut leftovers: Vec<(u64, u8, u8)> = Vec::new();
    for (&(_, key), stack) in &open {
        for &(start_tick, velocity) in stack {
            leftovers.push((start_tick, key, velocity));
        }
    }
    leftovers.sort_unstable();
    for (start_tick, key, velocity) in leftovers {
        add_note(&mut pattern, key, velocity, start_tick, final_tick, ticks_per_whole);
    }

    let length = pattern.real_end_time().ceil();
    pattern.set_length(length);
    Ok(pattern)
}

fn add_note(
    pattern: &mut Pattern,
    key: u8,
    velocity: u8,
    start_tick: u64,
    end_tick: u64,
    ticks_per_whole: i64,
) {
    let start = beat(start_tick as i64, ticks_per_whole);
    let duration = beat((end_tick - start_tick) as i64, ticks_per_whole);
    pattern.add(start, Note::with_velocity(key, duration, velocity));
}

#[cfg(test)]
mod tests {
    use midly::num::{u15, u28, u4, u7};
    use midly::{Format, Fps, Header, TrackEvent};
    use motif_core::Beat;

    use super::*;

    fn metrical_smf(ppq: u16) -> Smf<'static> {
        Smf::new(Header::new(
            Format::SingleTrack,
            Timing::Metrical(u15::new(ppq)),
        ))
    }

    fn on(delta: u32, key: u8, vel: u8) -> TrackEvent<'static> {
        TrackEvent {
            delta: u28::new(delta),
            kind: TrackEventKind::Midi {
                channel: u4::new(0),
                message: MidiMessage::NoteOn {
                    key: u7::new(key),
                    vel: u7::new(vel),
                },
            },
        }
    }

    fn off(delta: u32, key: u8) -> TrackEvent<'static> {
        TrackEvent {
            delta: u28::new(delta),
            kind: TrackEventKind::Midi {
                channel: u4::new(0),
                message: MidiMessage::NoteOff {
                    key: u7::new(key),
                    vel: u7::new(0),
                },
            },
        }
    }

    #[test]
    fn imports_a_quarter_note_at_480_ppq() {
        let mut smf = metrical_smf(480);
        smf.tracks.push(vec![on(0, 60, 90), off(480, 60)]);

        let pattern = pattern_from_smf(&smf).unwrap();
        assert_eq!(pattern.note_count(), 1);
        let chord = pattern.chord_at(beat(0, 1)).unwrap();
        assert_eq!(chord[0].key, 60);
        assert_eq!(chord[0].velocity, 90);
        assert_eq!(chord[0].duration, beat(1, 4));
        assert_eq!(pattern.length(), Beat::from_integer(1));
    }

    #[test]
    fn note_on_velocity_zero_closes_a_note() {
        let mut smf = metrical_smf(480);
        smf.tracks.push(vec![on(0, 72, 80), on(960, 72, 0)]);

        let pattern = pattern_from_smf(&smf).unwrap();
        let chord = pattern.chord_at(beat(0, 1)).unwrap();
        assert_eq!(chord[0].duration, beat(1, 2));
    }

    #[test]
    fn overlapping_same_key_notes_close_newest_first() {
        let mut smf = metrical_smf(480);
        smf.tracks
            .push(vec![on(0, 60, 80), on(480, 60, 80), off(480, 60), off(960, 60)]);

        let pattern = pattern_from_smf(&smf).unwrap();
        // The off at tick 960 closes the newer note (opened at 480); the
        // off at 1920 closes the original.
        assert_eq!(pattern.chord_at(beat(0, 1)).unwrap()[0].duration, Beat::from_integer(1));
        assert_eq!(pattern.chord_at(beat(1, 4)).unwrap()[0].duration, beat(1, 4));
    }

    #[test]
    fn unclosed_notes_end_at_the_final_event() {
        let mut smf = metrical_smf(480);
        smf.tracks.push(vec![on(0, 60, 80), on(480, 64, 80), off(480, 64)]);

        let pattern = pattern_from_smf(&smf).unwrap();
        // The C never got an off; it closes at tick 960 with the E's off.
        assert_eq!(pattern.chord_at(beat(0, 1)).unwrap()[0].duration, beat(1, 2));
        assert_eq!(pattern.chord_at(beat(1, 4)).unwrap()[0].duration, beat(1, 4));
    }

    #[test]
    fn merges_parallel_tracks_by_absolute_tick() {
        let mut smf = Smf::new(Header::new(
            Format::Parallel,
            Timing::Metrical(u15::new(480)),
        ));
        smf.tracks.push(vec![on(0, 60, 80), off(1920, 60)]);
        smf.tracks.push(vec![on(480, 67, 70), off(480, 67)]);

        let pattern = pattern_from_smf(&smf).unwrap();
        assert_eq!(pattern.note_count(), 2);
        assert_eq!(pattern.chord_at(beat(1, 4)).unwrap()[0].key, 67);
        assert_eq!(pattern.chord_at(beat(1, 4)).unwrap()[0].duration, beat(1, 4));
    }

    #[test]
    fn length_rounds_up_to_a_whole_note() {
        let mut smf = metrical_smf(480);
        smf.tracks.push(vec![on(0, 60, 80), off(2400, 60)]);

        let pattern = pattern_from_smf(&smf).unwrap();
        // 2400 ticks = 5/4 whole notes; length rounds up to 2.
        assert_eq!(pattern.chord_at(beat(0, 1)).unwrap()[0].duration, beat(5, 4));
        assert_eq!(pattern.length(), Beat::from_integer(2));
    }

    #[test]
    fn rejects_smpte_timecode() {
        let smf = Smf::new(Header::new(
            Format::SingleTrack,
            Timing::Timecode(Fps::Fps24, 4),
        ));
        let err = pattern_from_smf(&smf).unwrap_err();
        assert!(matches!(err, MidiError::UnsupportedTiming(_)));
    }

    #[test]
    fn empty_file_imports_as_the_empty_pattern() {
        let smf = metrical_smf(480);
        let pattern = pattern_from_smf(&smf).unwrap();
        assert!(pattern.is_empty());
        assert_eq!(pattern.length(), Beat::from_integer(0));
    }
}
