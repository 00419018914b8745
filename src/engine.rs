//! Runs the analysis engine and loads the state graph it produces.
//!
//! The engine is given an init descriptor, and writes its results to an
//! INI-like output file:
//!
//! ```text
//! [edges]
//! e0 = 0 -> 1
//! [node = 0]
//! address = 0x0
//! reg [eax] = 0xaaaa55aa
//! reg [cf] = 0x0?0x1
//! ```
//!
//! Node 0 is the initial state. Only `reg [...]` entries naming a general
//! register, a flag or `eflags` are loaded; anything else is skipped.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use regex::Regex;

use crate::config::Toolchain;
use crate::graph::{NodeId, Slot, StateGraph, StateNode};
use crate::process;
use crate::reference::write_file;
use crate::value::AbstractValue;
use crate::Error;

/// Init descriptor used unless the toolchain supplies its own.
///
/// `{entrypoint}`, `{code_length}` and `{filepath}` are substituted. Every
/// register and flag starts out fully unknown, as the hardware run doesn't
/// control them either.
pub const DEFAULT_INIT_TEMPLATE: &str = "\
[program]
mode = protected
call_conv = cdecl
mem_sz = 32
op_sz = 32
stack_width = 32
architecture = x86

[sections]
section[.text] = 0, {code_length}, 0, {code_length}

[analyzer]
analysis = forward_binary
ini_version = 1
unroll = 20

[binary]
filepath = {filepath}
format = raw
entrypoint = {entrypoint}

[state]
reg[eax] = 0?0xffffffff
reg[ecx] = 0?0xffffffff
reg[edx] = 0?0xffffffff
reg[ebx] = 0?0xffffffff
reg[esp] = 0?0xffffffff
reg[ebp] = 0?0xffffffff
reg[esi] = 0?0xffffffff
reg[edi] = 0?0xffffffff
reg[cf] = 0?1
reg[pf] = 0?1
reg[af] = 0?1
reg[zf] = 0?1
reg[sf] = 0?1
reg[df] = 0?1
reg[of] = 0?1
";

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InitDescriptor {
    pub entrypoint: u32,
    pub code_length: u64,
    pub code_path: PathBuf,
}

impl InitDescriptor {
    pub fn render(&self, template: &str) -> String {
        template
            .replace("{entrypoint}", &format!("{:#x}", self.entrypoint))
            .replace("{code_length}", &format!("{:#x}", self.code_length))
            .replace("{filepath}", &self.code_path.to_string_lossy())
    }
}

/// Analyzes the raw code at `code_path`, using `dir` for the engine's files.
pub fn run_engine(
    toolchain: &Toolchain,
    dir: &Path,
    code_path: &Path,
) -> Result<StateGraph, Error> {
    let code_length = fs::metadata(code_path)
        .map_err(|e| Error::IoWithFilename(e, code_path.into()))?
        .len();
    let descriptor = InitDescriptor {
        entrypoint: 0,
        code_length,
        code_path: code_path.into(),
    };
    let init = dir.join("init.ini");
    let output = dir.join("end.ini");
    let log = dir.join("log.txt");
    write_file(&init, &descriptor.render(&toolchain.init_template))?;
    process::run(
        Command::new(&toolchain.engine).arg(&init).arg(&output).arg(&log),
        toolchain.timeout,
    )?;
    debug!("Engine log at {}", log.display());
    let text = fs::read_to_string(&output)
        .map_err(|e| Error::IoWithFilename(e, output.clone()))?;
    parse_state_graph(&text)
}

struct LinePatterns {
    section: Regex,
    edge: Regex,
    reg: Regex,
}

fn line_patterns() -> &'static LinePatterns {
    static PATTERNS: OnceLock<LinePatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| LinePatterns {
        section: Regex::new(r"^\[\s*([A-Za-z_]+)\s*(?:=\s*(\S+?)\s*)?\]$").unwrap(),
        edge: Regex::new(r"^\w+\s*=\s*(\d+)\s*->\s*(\d+)$").unwrap(),
        reg: Regex::new(r"^reg\s*\[\s*(\w+)\s*\]\s*=\s*(.+)$").unwrap(),
    })
}

enum Section {
    Edges,
    Node(NodeId),
    Other,
}

pub fn parse_state_graph(text: &str) -> Result<StateGraph, Error> {
    let patterns = line_patterns();
    let mut graph = StateGraph::new(NodeId(0));
    let mut section = Section::Other;
    for (line_num, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        let malformed = |detail: &str| {
            Error::MalformedGraph(format!("line {}: {} ({:?})", line_num + 1, detail, line))
        };
        if let Some(caps) = patterns.section.captures(line) {
            section = match (&caps[1], caps.get(2)) {
                ("edges", None) => Section::Edges,
                ("node", Some(id)) => {
                    let id = id.as_str().parse::<u32>()
                        .map(NodeId)
                        .map_err(|_| malformed("Invalid node id"))?;
                    if graph.get(id).is_none() {
                        graph.add_node(StateNode::new(id));
                    }
                    Section::Node(id)
                }
                ("node", None) => return Err(malformed("Node section without id")),
                _ => Section::Other,
            };
            continue;
        }
        match section {
            Section::Edges => {
                let caps = patterns.edge.captures(line).ok_or_else(|| malformed("Invalid edge"))?;
                let from = caps[1].parse::<u32>().map_err(|_| malformed("Invalid edge"))?;
                let to = caps[2].parse::<u32>().map_err(|_| malformed("Invalid edge"))?;
                graph.add_edge(NodeId(from), NodeId(to));
            }
            Section::Node(id) => {
                let caps = match patterns.reg.captures(line) {
                    Some(s) => s,
                    None => {
                        trace!("Skipping {:?}", line);
                        continue;
                    }
                };
                let slot = match Slot::from_name(&caps[1].to_ascii_lowercase()) {
                    Some(s) => s,
                    None => {
                        trace!("Skipping unmodeled register {:?}", &caps[1]);
                        continue;
                    }
                };
                let value = AbstractValue::parse(&caps[2], slot.bits())
                    .map_err(|_| malformed("Invalid value"))?;
                if let Some(node) = graph.get_mut(id) {
                    node.set(slot, value);
                }
            }
            Section::Other => (),
        }
    }
    Ok(graph)
}
