//! End-to-end integration tests for the pattern-to-MIDI pipeline.
//!
//! Each test builds a pattern graph with the motif-core mutation API,
//! synthesizes a node, renders it through a `Timeline` to Standard MIDI File
//! bytes (or a file on disk), and reads the result back with the importer to
//! verify the round trip.
//!
//! Tests cover:
//! - Graph synthesis feeding a timeline render
//! - File save/import through the filesystem
//! - Mutation (update) followed by a re-render
//! - Multi-channel arrangements with program changes

use midly::{MidiMessage, Smf, TrackEventKind};

use motif_core::{beat, Note, Pattern, PatternGraph, PatternNode, Transform};
use motif_midi::{pattern_from_file, pattern_from_smf, RenderConfig, Timeline};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// A one-note pattern: `key` for a quarter note at time zero.
fn quarter(key: u8) -> Pattern {
    let mut p = Pattern::with_length(beat(1, 4));
    p.add(beat(0, 1), Note::new(key, beat(1, 4)));
    p
}

fn const_node(pattern: Pattern) -> PatternNode<Transform> {
    PatternNode::leaf(Transform::Const { pattern })
}

/// Midi messages of the only track, in file order.
fn midi_messages(smf: &Smf) -> Vec<MidiMessage> {
    smf.tracks[0]
        .iter()
        .filter_map(|event| match event.kind {
            TrackEventKind::Midi { message, .. } => Some(message),
            _ => None,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn synthesized_graph_output_renders_and_imports_back() {
    // C and E quarters, concatenated, transposed up an octave.
    let mut graph = PatternGraph::new();
    let c = graph.create(const_node(quarter(60))).unwrap();
    let e = graph.create(const_node(quarter(64))).unwrap();
    let line = graph
        .create(PatternNode::with_inputs(
            Transform::Concat,
            vec![Some(c), Some(e)],
        ))
        .unwrap();
    let high = graph
        .create(PatternNode::with_inputs(
            Transform::Transpose { semitones: 12 },
            vec![Some(line)],
        ))
        .unwrap();

    let pattern = graph.synth(high).unwrap().clone();

    let mut timeline = Timeline::new();
    timeline.place(beat(0, 1), 0, pattern);
    let bytes = timeline.render(&RenderConfig::default()).unwrap();

    let smf = Smf::parse(&bytes).unwrap();
    let imported = pattern_from_smf(&smf).unwrap();
    assert_eq!(imported.note_count(), 2);
    assert_eq!(imported.chord_at(beat(0, 1)).unwrap()[0].key, 72);
    assert_eq!(imported.chord_at(beat(1, 4)).unwrap()[0].key, 76);
}

#[test]
fn save_writes_a_file_the_importer_reads() {
    let mut graph = PatternGraph::new();
    let a = graph.create(const_node(quarter(60))).unwrap();
    let b = graph.create(const_node(quarter(67))).unwrap();
    let chord = graph
        .create(PatternNode::with_inputs(
            Transform::Union,
            vec![Some(a), Some(b)],
        ))
        .unwrap();
    let pattern = graph.synth(chord).unwrap().clone();

    let mut timeline = Timeline::new();
    timeline.place(beat(0, 1), 0, pattern);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chord.mid");
    timeline.save(&path, &RenderConfig::default()).unwrap();

    let imported = pattern_from_file(&path).unwrap();
    assert_eq!(imported.note_count(), 2);
    assert_eq!(imported.chord_at(beat(0, 1)).unwrap().len(), 2);
}

#[test]
fn updating_the_graph_changes_the_next_render() {
    let mut graph = PatternGraph::new();
    let source = graph.create(const_node(quarter(60))).unwrap();
    let out = graph
        .create(PatternNode::with_inputs(
            Transform::Transpose { semitones: 7 },
            vec![Some(source)],
        ))
        .unwrap();

    let first = graph.synth(out).unwrap().clone();
    assert_eq!(first.chord_at(beat(0, 1)).unwrap()[0].key, 67);

    // Replacing the source repopulates the consumer before we render again.
    graph.update(source, const_node(quarter(62))).unwrap();
    let second = graph.cached(out).unwrap().clone();

    let mut timeline = Timeline::new();
    timeline.place(beat(0, 1), 0, second);
    let bytes = timeline.render(&RenderConfig::default()).unwrap();
    let imported = pattern_from_smf(&Smf::parse(&bytes).unwrap()).unwrap();
    assert_eq!(imported.chord_at(beat(0, 1)).unwrap()[0].key, 69);
}

#[test]
fn multi_channel_arrangement_keeps_channels_apart() {
    let mut timeline = Timeline::new();
    timeline.place_program(beat(0, 1), 0, 0); // piano
    timeline.place_program(beat(0, 1), 1, 32); // bass
    timeline.place(beat(0, 1), 0, quarter(72));
    timeline.place(beat(0, 1), 1, quarter(36));

    let smf = timeline.to_smf(&RenderConfig::default());
    let channels: Vec<u8> = smf.tracks[0]
        .iter()
        .filter_map(|event| match event.kind {
            TrackEventKind::Midi { channel, message } => match message {
                MidiMessage::NoteOn { .. } => Some(channel.as_int()),
                _ => None,
            },
            _ => None,
        })
        .collect();
    assert_eq!(channels, vec![0, 1]);

    // Both program changes land before any note-on.
    let messages = midi_messages(&smf);
    assert!(matches!(messages[0], MidiMessage::ProgramChange { .. }));
    assert!(matches!(messages[1], MidiMessage::ProgramChange { .. }));
}

#[test]
fn empty_timeline_renders_a_playable_file() {
    let timeline = Timeline::new();
    let bytes = timeline.render(&RenderConfig::default()).unwrap();

    let smf = Smf::parse(&bytes).unwrap();
    let imported = pattern_from_smf(&smf).unwrap();
    assert!(imported.is_empty());
}
