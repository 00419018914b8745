//! Differential testing of an x86 abstract interpreter against hardware.
//!
//! A [`Scenario`] is a straight-line 32-bit instruction sequence together with
//! the registers and flags to check. The sequence is run natively to get the
//! real machine state, and analyzed by the engine to get an abstract one; every
//! bit that the engine claims to know must agree with the CPU.

#![allow(clippy::style, clippy::bool_comparison, clippy::needless_lifetimes)]

#[macro_use] extern crate log;

pub mod compare;
pub mod config;
pub mod engine;
pub mod extract;
pub mod graph;
pub mod location;
pub mod oracle;
mod process;
pub mod reference;
pub mod scenario;
pub mod scratch;
pub mod value;

pub use crate::compare::{compare, Mismatch, Report};
pub use crate::config::Toolchain;
pub use crate::extract::{extract, extract_all};
pub use crate::graph::{NodeId, Slot, StateGraph, StateNode};
pub use crate::location::{Flag, Location, Register, RegisterView, ALL_FLAGS, ALL_REGISTERS};
pub use crate::oracle::{verify, Failure, Oracle};
pub use crate::reference::ConcreteState;
pub use crate::scenario::{Scenario, Template, BOUNDARY_VALUES};
pub use crate::value::AbstractValue;

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use quick_error::quick_error;

quick_error! {
    #[derive(Debug)]
    pub enum Error {
        Io(e: io::Error) {
            display("I/O error {}", e)
            from()
        }
        IoWithFilename(e: io::Error, path: PathBuf) {
            display("I/O error {}, file {:?}", e, path)
        }
        InvalidConfig(detail: String) {
            display("Invalid configuration: {}", detail)
        }
        ToolNotFound(tool: String, detail: String) {
            display("Could not find {} ({})", tool, detail)
        }
        Spawn(command: String, e: io::Error) {
            display("Could not start {}: {}", command, e)
        }
        Toolchain(command: String, status: ExitStatus, stderr: String) {
            display("{} failed ({}): {}", command, status, stderr.trim_end())
        }
        TimedOut(command: String, limit: Duration) {
            display("{} timed out after {:?}", command, limit)
        }
        MalformedDump(detail: String) {
            display("Invalid register dump from hardware run: {}", detail)
        }
        MalformedGraph(detail: String) {
            display("Invalid state graph: {}", detail)
        }
        MalformedValue(text: String) {
            display("Invalid abstract value {:?}", text)
        }
        NonLinear(node: NodeId, successors: usize) {
            display("State {} has {} successors, expected straight-line code", node, successors)
        }
        NotTracked(node: NodeId, location: Location) {
            display("{} is not tracked in state {}", location, node)
        }
        Mismatch(report: Report) {
            display("{}", report)
        }
    }
}
