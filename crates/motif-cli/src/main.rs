//! Pattern graph CLI.
//!
//! Provides the `motif` binary with subcommands for validating graph files,
//! synthesizing node patterns, rendering patterns to Standard MIDI Files,
//! and importing MIDI files back into patterns.
//!
//! Graph files are the JSON serialization of a `PatternGraph<Transform>`;
//! loading validates referential integrity and acyclicity exactly like
//! in-memory construction.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};

use motif_core::{beat, NodeId, PatternGraph, Transform};
use motif_midi::{pattern_from_file, RenderConfig, Timeline};

/// Pattern graph tools for symbolic music.
#[derive(Parser)]
#[command(name = "motif", about = "Pattern graph tools for symbolic music")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Validate a graph file and print a structural summary.
    Check {
        /// Path to the graph JSON file.
        #[arg(short, long)]
        graph: PathBuf,
    },

    /// Synthesize one node's pattern and print it as JSON.
    Synth {
        /// Path to the graph JSON file.
        #[arg(short, long)]
        graph: PathBuf,

        /// Node id to synthesize.
        #[arg(short, long)]
        node: u32,

        /// Write the pattern JSON here instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Synthesize one node and render it to a Standard MIDI File.
    Render {
        /// Path to the graph JSON file.
        #[arg(short, long)]
        graph: PathBuf,

        /// Node id to render.
        #[arg(short, long)]
        node: u32,

        /// Output .mid path.
        #[arg(short, long)]
        out: PathBuf,

        /// Tempo in beats per minute.
        #[arg(short, long, default_value_t = 120)]
        tempo: u32,

        /// Ticks per quarter note.
        #[arg(short, long, default_value_t = 480)]
        ppq: u16,

        /// MIDI channel to sound on (0-15).
        #[arg(short, long, default_value_t = 0)]
        channel: u8,
    },

    /// Import a Standard MIDI File as a pattern.
    Import {
        /// Path to the .mid file.
        #[arg(short, long)]
        midi: PathBuf,

        /// Write the pattern JSON here instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let exit_code = match cli.command {
        Commands::Check { graph } => run_check(&graph),
        Commands::Synth { graph, node, out } => run_synth(&graph, NodeId(node), out.as_deref()),
        Commands::Render {
            graph,
            node,
            out,
            tempo,
            ppq,
            channel,
        } => run_render(&graph, NodeId(node), &out, tempo, ppq, channel),
        Commands::Import { midi, out } => run_import(&midi, out.as_deref()),
    };
    process::exit(exit_code);
}

/// Load and validate a graph file.
///
/// The error side carries the exit code: 1 for unreadable or syntactically
/// broken files, 2 when the JSON parses but fails graph validation
/// (dangling references or cycles).
fn load_graph(path: &Path) -> Result<PatternGraph<Transform>, i32> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Error: failed to read '{}': {}", path.display(), e);
            return Err(1);
        }
    };

    match serde_json::from_str::<PatternGraph<Transform>>(&text) {
        Ok(graph) => Ok(graph),
        Err(e) => {
            eprintln!("Error: invalid graph '{}': {}", path.display(), e);
            match e.classify() {
                serde_json::error::Category::Data => Err(2),
                _ => Err(1),
            }
        }
    }
}

/// Write `text` to `out`, or print it to stdout when no path is given.
fn write_or_print(text: &str, out: Option<&Path>) -> i32 {
    match out {
        Some(path) => {
            if let Err(e) = fs::write(path, text) {
                eprintln!("Error: failed to write '{}': {}", path.display(), e);
                return 1;
            }
            0
        }
        None => {
            println!("{}", text);
            0
        }
    }
}

/// Execute the check subcommand.
///
/// Returns exit code: 0 = valid, 1 = unreadable or malformed file,
/// 2 = validation failure.
fn run_check(path: &Path) -> i32 {
    let graph = match load_graph(path) {
        Ok(graph) => graph,
        Err(code) => return code,
    };

    let mut ids: Vec<NodeId> = graph.node_ids().collect();
    ids.sort_unstable();
    let consumers: serde_json::Map<String, serde_json::Value> = ids
        .iter()
        .map(|&id| {
            let count = graph.consumers(id).map(|set| set.len()).unwrap_or(0);
            (id.to_string(), serde_json::Value::from(count))
        })
        .collect();

    let summary = serde_json::json!({
        "nodes": graph.node_count(),
        "edges": graph.edge_count(),
        "consumers": consumers,
    });
    let json = serde_json::to_string_pretty(&summary)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize summary: {}\"}}", e));
    println!("{}", json);
    0
}

/// Execute the synth subcommand.
///
/// Returns exit code: 0 = success, 1 = file error, 2 = validation or
/// synthesis failure.
fn run_synth(path: &Path, node: NodeId, out: Option<&Path>) -> i32 {
    let mut graph = match load_graph(path) {
        Ok(graph) => graph,
        Err(code) => return code,
    };

    let pattern = match graph.synth(node) {
        Ok(pattern) => pattern,
        Err(e) => {
            eprintln!("Error: synthesis of node {} failed: {}", node, e);
            return 2;
        }
    };

    let json = match serde_json::to_string_pretty(pattern) {
        Ok(json) => json,
        Err(e) => {
            eprintln!("Error: failed to serialize pattern: {}", e);
            return 1;
        }
    };
    write_or_print(&json, out)
}

/// Execute the render subcommand.
///
/// Returns exit code: 0 = success, 1 = file error, 2 = validation or
/// synthesis failure.
fn run_render(
    path: &Path,
    node: NodeId,
    out: &Path,
    tempo_bpm: u32,
    ppq: u16,
    channel: u8,
) -> i32 {
    let mut graph = match load_graph(path) {
        Ok(graph) => graph,
        Err(code) => return code,
    };

    let pattern = match graph.synth(node) {
        Ok(pattern) => pattern,
        Err(e) => {
            eprintln!("Error: synthesis of node {} failed: {}", node, e);
            return 2;
        }
    };

    let mut timeline = Timeline::new();
    timeline.place(beat(0, 1), channel, pattern.clone());
    tracing::debug!(
        "rendering node {} ({} notes) to {}",
        node,
        pattern.note_count(),
        out.display()
    );

    let config = RenderConfig {
        tempo: 60_000_000 / tempo_bpm.max(1),
        ppq,
        ..RenderConfig::default()
    };
    if let Err(e) = timeline.save(out, &config) {
        eprintln!("Error: failed to write '{}': {}", out.display(), e);
        return 1;
    }
    0
}

/// Execute the import subcommand.
///
/// Returns exit code: 0 = success, 1 = file or format error.
fn run_import(midi: &Path, out: Option<&Path>) -> i32 {
    let pattern = match pattern_from_file(midi) {
        Ok(pattern) => pattern,
        Err(e) => {
            eprintln!("Error: failed to import '{}': {}", midi.display(), e);
            return 1;
        }
    };
    tracing::debug!(
        "imported {} notes from {}",
        pattern.note_count(),
        midi.display()
    );

    let json = match serde_json::to_string_pretty(&pattern) {
        Ok(json) => json,
        Err(e) => {
            eprintln!("Error: failed to serialize pattern: {}", e);
            return 1;
        }
    };
    write_or_print(&json, out)
}
