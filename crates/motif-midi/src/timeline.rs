//! Pattern arrangement and Standard MIDI File rendering.
//!
//! A [`Timeline`] places patterns (and program changes) on channels at
//! absolute [`Beat`] times and renders the whole arrangement to a format-0
//! SMF. Tick positions are computed from absolute times, never accumulated,
//! so rounding error cannot drift across a long arrangement.

use std::fs;
use std::path::Path;

use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use motif_core::{beat, Beat, Pattern};
use serde::{Deserialize, Serialize};

use crate::error::MidiError;

/// Rendering parameters for [`Timeline::to_smf`].
///
/// Serde-derived so configs can load from JSON; every field falls back to
/// its default when omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Microseconds per quarter note.
    #[serde(default = "default_tempo")]
    pub tempo: u32,
    /// Ticks per quarter note.
    #[serde(default = "default_ppq")]
    pub ppq: u16,
    /// Absolute time mapped to tick zero; earlier events are dropped.
    #[serde(default = "beat_zero")]
    pub start: Beat,
    /// Events at or after this time are dropped; sounding notes cut off
    /// here. Unbounded when absent.
    #[serde(default)]
    pub end: Option<Beat>,
}

fn default_tempo() -> u32 {
    500_000
}

fn default_ppq() -> u16 {
    480
}

fn beat_zero() -> Beat {
    beat(0, 1)
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            tempo: default_tempo(),
            ppq: default_ppq(),
            start: beat_zero(),
            end: None,
        }
    }
}

/// One placed arrangement entry.
#[derive(Debug, Clone)]
enum TimelineItem {
    Pattern {
        start: Beat,
        channel: u8,
        pattern: Pattern,
    },
    Program {
        start: Beat,
        channel: u8,
        program: u8,
    },
}

/// An arrangement of patterns on channels at absolute times.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    items: Vec<TimelineItem>,
}

impl Timeline {
    /// Creates an empty timeline.
    pub fn new() -> Self {
        Timeline { items: Vec::new() }
    }

    /// Places a pattern so that its time zero falls at `start`, sounding on
    /// `channel` (0..=15; higher values are clamped).
    pub fn place(&mut self, start: Beat, channel: u8, pattern: Pattern) {
        self.items.push(TimelineItem::Pattern {
            start,
            channel,
            pattern,
        });
    }

    /// Places a program (instrument) change on `channel` at `start`.
    ///
    /// At the same tick, program changes render after note-offs and before
    /// note-ons, so the new instrument applies to notes starting there.
    pub fn place_program(&mut self, start: Beat, channel: u8, program: u8) {
        self.items.push(TimelineItem::Program {
            start,
            channel,
            program,
        });
    }

    /// True if nothing has been placed.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Renders the arrangement to an in-memory format-0 SMF.
    ///
    /// The track opens with a tempo meta event and closes with end-of-track.
    /// Absolute ticks are `round((time - start) * ppq * 4)`; deltas derive
    /// from the rounded absolute ticks. Note-ons before `config.start` or at
    /// and after `config.end` are dropped with their offs; a kept note
    /// sounding past `end` is cut off there. Simultaneous events order as
    /// off, program change, on, so retriggered notes are not truncated.
    pub fn to_smf(&self, config: &RenderConfig) -> Smf<'static> {
        let ticks_per_whole = i64::from(config.ppq) * 4;
        let tick_for = |time: Beat| -> i64 { ((time - config.start) * ticks_per_whole).round().to_integer() };

        // (tick, order class, event); class: 0 = off, 1 = program, 2 = on.
        let mut timed: Vec<(i64, u8, TrackEventKind<'static>)> = Vec::new();
        for item in &self.items {
            match item {
                TimelineItem::Program {
                    start,
                    channel,
                    program,
                } => {
                    if !in_window(*start, config) {
                        continue;
                    }
                    timed.push((
                        tick_for(*start),
                        1,
                        TrackEventKind::Midi {
                            channel: u4::new((*channel).min(15)),
                            message: MidiMessage::ProgramChange {
                                program: u7::new((*program).min(127)),
                            },
                        },
                    ));
                }
                TimelineItem::Pattern {
                    start,
                    channel,
                    pattern,
                } => {
                    let channel = u4::new((*channel).min(15));
                    for (chord_start, chord) in pattern.chords() {
                        let on_time = *start + chord_start;
                        if !in_window(on_time, config) {
                            continue;
                        }
                        for note in chord {
                            let mut off_time = on_time + note.duration;
                            if let Some(end) = config.end {
                                if off_time > end {
                                    off_time = end;
                                }
                            }
                            let on_tick = tick_for(on_time);
                            let off_tick = tick_for(off_time).max(on_tick);
                            let key = u7::new(note.key.min(127));
                            timed.push((
                                on_tick,
                                2,
                                TrackEventKind::Midi {
                                    channel,
                                    message: MidiMessage::NoteOn {
                                        key,
                                        vel: u7::new(note.velocity.min(127)),
                                    },
                                },
                            ));
                            timed.push((
                                off_tick,
                                0,
                                TrackEventKind::Midi {
                                    channel,
                                    message: MidiMessage::NoteOff {
                                        key,
                                        vel: u7::new(0),
                                    },
                                },
                            ));
                        }
                    }
                }
            }
        }
        timed.sort_by_key(|&(tick, class, _)| (tick, class));

        let mut track: Vec<TrackEvent<'static>> = Vec::new();
        track.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(
                config.tempo.min(0xFF_FFFF),
            ))),
        });
        let mut last_tick: i64 = 0;
        for (tick, _, kind) in timed {
            let delta = (tick - last_tick).max(0) as u32;
            track.push(TrackEvent {
                delta: u28::new(delta),
                kind,
            });
            last_tick = tick;
        }
        track.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        });

        let mut smf = Smf::new(Header::new(
            Format::SingleTrack,
            Timing::Metrical(u15::new(config.ppq)),
        ));
        smf.tracks.push(track);
        smf
    }

    /// Renders to SMF bytes.
    pub fn render(&self, config: &RenderConfig) -> Result<Vec<u8>, MidiError> {
        let smf = self.to_smf(config);
        let mut bytes = Vec::new();
        smf.write_std(&mut bytes)?;
        Ok(bytes)
    }

    /// Renders and writes the bytes to `path`.
    pub fn save(&self, path: impl AsRef<Path>, config: &RenderConfig) -> Result<(), MidiError> {
        let bytes = self.render(config)?;
        fs::write(path, &bytes)?;
        Ok(())
    }
}

fn in_window(time: Beat, config: &RenderConfig) -> bool {
    if time < config.start {
        return false;
    }
    match config.end {
        Some(end) => time < end,
        None => true,
    }
}
