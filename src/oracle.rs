use std::fmt;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::compare::compare;
use crate::config::Toolchain;
use crate::engine;
use crate::extract::extract_all;
use crate::graph::StateGraph;
use crate::location::Location;
use crate::reference::{self, ConcreteState};
use crate::scenario::{prettify, Scenario};
use crate::scratch::{create_scratch_dir, ScratchKind};
use crate::value::AbstractValue;
use crate::Error;

/// A scenario that didn't pass, with the code that reproduces it.
#[derive(Debug)]
pub struct Failure {
    pub asm: String,
    pub error: Error,
}

impl Failure {
    pub fn is_mismatch(&self) -> bool {
        match self.error {
            Error::Mismatch(_) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "\n{}\n=========================\n{}", prettify(&self.asm), self.error)
    }
}

impl std::error::Error for Failure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Compares the engine's final state against `concrete`.
///
/// Fails if the graph isn't a single chain, if the engine didn't model one of
/// `locations`, or if any of them has a definite bit that differs from hardware.
pub fn verify(
    concrete: &ConcreteState,
    graph: &StateGraph,
    locations: &[Location],
) -> Result<(), Error> {
    let last = graph.terminal_state()?;
    let values = extract_all(last, locations)?;
    compare(concrete, &values).map_err(Error::Mismatch)
}

enum ScratchRoot {
    Temporary(TempDir),
    Kept(PathBuf),
}

/// Runs scenarios through both the hardware and the engine.
///
/// All files of a run live under one scratch root, with a subdirectory per
/// scenario and tool derived from the scenario's sequence number.
pub struct Oracle {
    toolchain: Toolchain,
    scratch: ScratchRoot,
}

impl Oracle {
    pub fn new(toolchain: Toolchain) -> Result<Oracle, Error> {
        let dir = tempfile::Builder::new().prefix("x86-oracle-").tempdir()?;
        let scratch = if toolchain.keep_scratch {
            let path = dir.into_path();
            warn!("Keeping scratch files in {}", path.display());
            ScratchRoot::Kept(path)
        } else {
            ScratchRoot::Temporary(dir)
        };
        Ok(Oracle {
            toolchain,
            scratch,
        })
    }

    pub fn from_env() -> Result<Oracle, Error> {
        Oracle::new(Toolchain::from_env()?)
    }

    pub fn toolchain(&self) -> &Toolchain {
        &self.toolchain
    }

    pub fn scratch_root(&self) -> &Path {
        match self.scratch {
            ScratchRoot::Temporary(ref dir) => dir.path(),
            ScratchRoot::Kept(ref path) => path,
        }
    }

    /// Runs a single scenario. `seq` must be unique among the scenarios
    /// checked with this `Oracle`.
    pub fn check(&self, scenario: &Scenario, seq: u32) -> Result<(), Failure> {
        self.check_inner(scenario, seq).map_err(|error| Failure {
            asm: scenario.asm.clone(),
            error,
        })
    }

    fn check_inner(&self, scenario: &Scenario, seq: u32) -> Result<(), Error> {
        debug!("Scenario {}: {}", seq, scenario);
        let root = self.scratch_root();
        let code = self.assemble(scenario, seq)?;
        let cc_dir = create_scratch_dir(root, ScratchKind::Compiler, seq)?;
        let concrete = reference::run_on_cpu(&self.toolchain, &cc_dir, &scenario.asm)?;
        let engine_dir = create_scratch_dir(root, ScratchKind::Engine, seq)?;
        let graph = engine::run_engine(&self.toolchain, &engine_dir, &code)?;
        verify(&concrete, &graph, &scenario.locations)
    }

    fn assemble(&self, scenario: &Scenario, seq: u32) -> Result<PathBuf, Error> {
        let dir = create_scratch_dir(self.scratch_root(), ScratchKind::Assembler, seq)?;
        reference::assemble(&self.toolchain, &dir, &scenario.asm)
    }

    /// Engine's values for the scenario's locations, without running it on hardware.
    pub fn abstract_values(
        &self,
        scenario: &Scenario,
        seq: u32,
    ) -> Result<Vec<(Location, AbstractValue)>, Failure> {
        let result = self.assemble(scenario, seq).and_then(|code| {
            let dir = create_scratch_dir(self.scratch_root(), ScratchKind::Engine, seq)?;
            let graph = engine::run_engine(&self.toolchain, &dir, &code)?;
            let last = graph.terminal_state()?;
            extract_all(last, &scenario.locations)
        });
        result.map_err(|error| Failure {
            asm: scenario.asm.clone(),
            error,
        })
    }

    /// Checks every scenario in order, using its index as the sequence number.
    ///
    /// Returns the failed ones along with their index.
    pub fn check_all(&self, scenarios: &[Scenario]) -> Vec<(usize, Failure)> {
        let failures = scenarios.iter()
            .enumerate()
            .filter_map(|(i, scenario)| self.check(scenario, i as u32).err().map(|e| (i, e)))
            .collect::<Vec<_>>();
        info!("{}/{} scenarios passed", scenarios.len() - failures.len(), scenarios.len());
        failures
    }

    /// Same as `check_all`, with scenarios spread over rayon's thread pool.
    #[cfg(feature = "parallel")]
    pub fn check_all_parallel(&self, scenarios: &[Scenario]) -> Vec<(usize, Failure)> {
        use rayon::prelude::*;

        let results = scenarios.par_iter()
            .enumerate()
            .map(|(i, scenario)| (i, self.check(scenario, i as u32)))
            .collect::<Vec<_>>();
        let failures = results.into_iter()
            .filter_map(|(i, result)| result.err().map(|e| (i, e)))
            .collect::<Vec<_>>();
        info!("{}/{} scenarios passed", scenarios.len() - failures.len(), scenarios.len());
        failures
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::graph::{NodeId, Slot, StateNode};
    use crate::location::{Flag, Register, ALL_FLAGS};

    // State graph for
    //   mov eax,0xaaaaffaa
    //   mov ebx,0xbbbbbbff
    //   cmp ah,bl
    fn cmp_graph(flags: AbstractValue) -> StateGraph {
        let mut graph = StateGraph::new(NodeId(0));
        for i in 0..4 {
            let mut node = StateNode::new(NodeId(i));
            if i >= 1 {
                node.set(Slot::Register(Register::Eax), AbstractValue::concrete(0xaaaa_ffaa, 32));
            }
            if i >= 2 {
                node.set(Slot::Register(Register::Ebx), AbstractValue::concrete(0xbbbb_bbff, 32));
            }
            if i == 3 {
                node.set(Slot::Flags, flags);
            }
            graph.add_node(node);
            if i != 0 {
                graph.add_edge(NodeId(i - 1), NodeId(i));
            }
        }
        graph
    }

    fn cmp_hardware() -> ConcreteState {
        let mut state = ConcreteState::default();
        state.set_register(Register::Eax, 0xaaaa_ffaa);
        state.set_register(Register::Ebx, 0xbbbb_bbff);
        // zf, pf, reserved bit 1, if
        state.eflags = 0x246;
        state
    }

    fn cmp_locations() -> Vec<Location> {
        let mut locs = vec![Location::reg32(Register::Eax), Location::reg32(Register::Ebx)];
        locs.extend_from_slice(&ALL_FLAGS);
        locs
    }

    #[test]
    fn cmp_matches() {
        let graph = cmp_graph(AbstractValue::concrete(0x44, 32));
        verify(&cmp_hardware(), &graph, &cmp_locations()).unwrap();
        // Engine not knowing af or pf is fine
        let graph = cmp_graph(AbstractValue::new(0x40, 0x14, 32));
        verify(&cmp_hardware(), &graph, &cmp_locations()).unwrap();
    }

    #[test]
    fn cmp_wrong_flags() {
        // cf set, zf clear
        let graph = cmp_graph(AbstractValue::concrete(0x05, 32));
        match verify(&cmp_hardware(), &graph, &cmp_locations()) {
            Err(Error::Mismatch(report)) => {
                let locs = report.mismatches.iter().map(|x| x.location).collect::<Vec<_>>();
                assert_eq!(locs, vec![Location::Flag(Flag::Carry), Location::Flag(Flag::Zero)]);
            }
            x => panic!("Expected mismatch, got {:?}", x),
        }
    }

    #[test]
    fn not_tracked_is_fatal() {
        let graph = cmp_graph(AbstractValue::concrete(0x44, 32));
        let locs = [Location::reg32(Register::Esi)];
        assert!(matches!(
            verify(&cmp_hardware(), &graph, &locs),
            Err(Error::NotTracked(NodeId(3), _)),
        ));
    }

    #[test]
    fn branches_are_fatal() {
        let mut graph = cmp_graph(AbstractValue::concrete(0x44, 32));
        graph.add_node(StateNode::new(NodeId(9)));
        graph.add_edge(NodeId(2), NodeId(9));
        assert!(matches!(
            verify(&cmp_hardware(), &graph, &cmp_locations()),
            Err(Error::NonLinear(NodeId(2), 2)),
        ));
    }

    #[test]
    fn failure_text() {
        let graph = cmp_graph(AbstractValue::concrete(0x05, 32));
        let error = verify(&cmp_hardware(), &graph, &cmp_locations()).unwrap_err();
        let failure = Failure {
            asm: "  mov eax,0xaaaaffaa\n  mov ebx,0xbbbbbbff\n  cmp ah,bl\n".into(),
            error,
        };
        assert!(failure.is_mismatch());
        let text = failure.to_string();
        assert!(text.starts_with("\n\tmov eax,0xaaaaffaa\n\tmov ebx,0xbbbbbbff\n\tcmp ah,bl\n====="));
        assert!(text.contains("- cpu   :  cf = 0\n+ engine:  cf = 1  0x1"));
        assert!(text.contains("- cpu   :  zf = 1\n+ engine:  zf = 0  0x0"));
    }

    #[test]
    fn scratch_is_removed() {
        let toolchain = Toolchain::new("nasm", "gcc", "engine");
        let oracle = Oracle::new(toolchain).unwrap();
        let root = oracle.scratch_root().to_path_buf();
        assert!(root.is_dir());
        drop(oracle);
        assert!(!root.exists());

        let toolchain = Toolchain::new("nasm", "gcc", "engine").with_keep_scratch(true);
        let oracle = Oracle::new(toolchain).unwrap();
        let root = oracle.scratch_root().to_path_buf();
        drop(oracle);
        assert!(root.is_dir());
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn missing_tools_fail_the_scenario() {
        let toolchain = Toolchain::new(
            "/nonexistent/nasm",
            "/nonexistent/gcc",
            "/nonexistent/engine",
        );
        let oracle = Oracle::new(toolchain).unwrap();
        let scenarios = [
            Scenario::new("nop", &[Location::reg32(Register::Eax)]),
            Scenario::new("nop\nnop", &[Location::reg32(Register::Eax)]),
        ];
        let failures = oracle.check_all(&scenarios);
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].0, 0);
        assert_eq!(failures[1].0, 1);
        assert!(matches!(failures[1].1.error, Error::Spawn(..)));
        assert_eq!(failures[1].1.asm, "nop\nnop");
        assert!(oracle.scratch_root().join("nasm-1").is_dir());
    }
}
