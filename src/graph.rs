use std::fmt;

use fxhash::FxHashMap;
use smallvec::SmallVec;

use crate::location::{Flag, Register};
use crate::value::AbstractValue;
use crate::Error;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeId(pub u32);

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the engine can report a value for.
///
/// Flags may be reported either one by one, or as the packed eflags word.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum Slot {
    Register(Register),
    Flag(Flag),
    Flags,
}

impl Slot {
    pub fn bits(self) -> u8 {
        match self {
            Slot::Register(_) | Slot::Flags => 32,
            Slot::Flag(_) => 1,
        }
    }

    pub fn from_name(name: &str) -> Option<Slot> {
        if name == "eflags" {
            Some(Slot::Flags)
        } else if let Some(reg) = Register::from_name(name) {
            Some(Slot::Register(reg))
        } else {
            Flag::from_name(name).map(Slot::Flag)
        }
    }
}

/// Machine state at one program point.
#[derive(Clone, Debug)]
pub struct StateNode {
    pub id: NodeId,
    slots: FxHashMap<Slot, AbstractValue>,
}

impl StateNode {
    pub fn new(id: NodeId) -> StateNode {
        StateNode {
            id,
            slots: FxHashMap::default(),
        }
    }

    pub fn get(&self, slot: Slot) -> Option<AbstractValue> {
        self.slots.get(&slot).cloned()
    }

    /// Panics if the value width doesn't match the slot.
    pub fn set(&mut self, slot: Slot, value: AbstractValue) {
        assert_eq!(slot.bits(), value.bits(), "Width mismatch for {:?}", slot);
        self.slots.insert(slot, value);
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}

/// Directed graph of analyzed states, joined by single-instruction transitions.
#[derive(Clone, Debug)]
pub struct StateGraph {
    // Sorted by id
    nodes: Vec<StateNode>,
    edges: FxHashMap<NodeId, SmallVec<[NodeId; 1]>>,
    root: NodeId,
}

impl StateGraph {
    pub fn new(root: NodeId) -> StateGraph {
        StateGraph {
            nodes: Vec::with_capacity(16),
            edges: FxHashMap::default(),
            root,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Replaces an existing node with same id.
    pub fn add_node(&mut self, node: StateNode) {
        match self.nodes.binary_search_by_key(&node.id, |x| x.id) {
            Ok(idx) => self.nodes[idx] = node,
            Err(idx) => self.nodes.insert(idx, node),
        }
    }

    pub fn add_edge(&mut self, from: NodeId, to: NodeId) {
        let out = self.edges.entry(from).or_insert_with(SmallVec::new);
        if !out.contains(&to) {
            out.push(to);
        }
    }

    pub fn get(&self, id: NodeId) -> Option<&StateNode> {
        match self.nodes.binary_search_by_key(&id, |x| x.id) {
            Ok(idx) => Some(&self.nodes[idx]),
            Err(_) => None,
        }
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut StateNode> {
        match self.nodes.binary_search_by_key(&id, |x| x.id) {
            Ok(idx) => Some(&mut self.nodes[idx]),
            Err(_) => None,
        }
    }

    pub fn successors(&self, id: NodeId) -> &[NodeId] {
        match self.edges.get(&id) {
            Some(out) => &out[..],
            None => &[],
        }
    }

    pub fn nodes<'a>(&'a self) -> impl Iterator<Item = &'a StateNode> + 'a {
        self.nodes.iter()
    }

    /// Follows the only successor of each node, starting from root, until a node
    /// without successors is reached.
    ///
    /// A node with more than one successor means that the analyzed code was not
    /// straight-line, and is an error. So is a chain that revisits a node or
    /// links to a node that doesn't exist.
    pub fn terminal_state(&self) -> Result<&StateNode, Error> {
        let mut current = self.get(self.root)
            .ok_or_else(|| Error::MalformedGraph(format!("Root node {} is missing", self.root)))?;
        let mut steps = 0;
        loop {
            match *self.successors(current.id) {
                [] => return Ok(current),
                [next] => {
                    steps += 1;
                    if steps > self.nodes.len() {
                        return Err(Error::MalformedGraph(
                            format!("Cycle through node {}", current.id)
                        ));
                    }
                    trace!("Step {} -> {}", current.id, next);
                    current = self.get(next).ok_or_else(|| Error::MalformedGraph(format!(
                        "Edge {} -> {} links to a missing node", current.id, next,
                    )))?;
                }
                ref many => return Err(Error::NonLinear(current.id, many.len())),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn chain(len: u32) -> StateGraph {
        let mut graph = StateGraph::new(NodeId(0));
        for i in 0..=len {
            graph.add_node(StateNode::new(NodeId(i)));
            if i != 0 {
                graph.add_edge(NodeId(i - 1), NodeId(i));
            }
        }
        graph
    }

    #[test]
    fn single_chains() {
        for len in 0..20 {
            let graph = chain(len);
            assert_eq!(graph.terminal_state().unwrap().id, NodeId(len));
        }
    }

    #[test]
    fn root_without_successors() {
        let graph = chain(0);
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.terminal_state().unwrap().id, graph.root());
    }

    #[test]
    fn out_of_order_ids() {
        let mut graph = StateGraph::new(NodeId(7));
        for &i in &[3, 7, 1] {
            graph.add_node(StateNode::new(NodeId(i)));
        }
        graph.add_edge(NodeId(7), NodeId(1));
        graph.add_edge(NodeId(1), NodeId(3));
        assert_eq!(graph.terminal_state().unwrap().id, NodeId(3));
    }

    #[test]
    fn branch_is_rejected() {
        let mut graph = chain(3);
        graph.add_node(StateNode::new(NodeId(10)));
        graph.add_edge(NodeId(1), NodeId(10));
        match graph.terminal_state() {
            Err(Error::NonLinear(node, count)) => {
                assert_eq!(node, NodeId(1));
                assert_eq!(count, 2);
            }
            x => panic!("Expected non-linear error, got {:?}", x.map(|x| x.id)),
        }
        // Branch right at root
        let mut graph = chain(0);
        for i in 1..4 {
            graph.add_node(StateNode::new(NodeId(i)));
            graph.add_edge(NodeId(0), NodeId(i));
        }
        match graph.terminal_state() {
            Err(Error::NonLinear(NodeId(0), 3)) => (),
            x => panic!("Expected non-linear error, got {:?}", x.map(|x| x.id)),
        }
    }

    #[test]
    fn branch_off_path_is_ignored() {
        let mut graph = chain(2);
        for i in 10..12 {
            graph.add_node(StateNode::new(NodeId(i)));
            graph.add_edge(NodeId(9), NodeId(i));
        }
        assert_eq!(graph.terminal_state().unwrap().id, NodeId(2));
    }

    #[test]
    fn duplicate_edges_count_once() {
        let mut graph = chain(1);
        graph.add_edge(NodeId(0), NodeId(1));
        assert_eq!(graph.successors(NodeId(0)), &[NodeId(1)]);
        assert_eq!(graph.terminal_state().unwrap().id, NodeId(1));
    }

    #[test]
    fn broken_graphs() {
        let mut graph = chain(2);
        graph.add_edge(NodeId(2), NodeId(0));
        assert!(matches!(graph.terminal_state(), Err(Error::MalformedGraph(_))));

        let mut graph = chain(2);
        graph.add_edge(NodeId(2), NodeId(5));
        assert!(matches!(graph.terminal_state(), Err(Error::MalformedGraph(_))));

        let graph = StateGraph::new(NodeId(0));
        assert!(graph.is_empty());
        assert!(matches!(graph.terminal_state(), Err(Error::MalformedGraph(_))));
    }

    #[test]
    fn slots() {
        let mut node = StateNode::new(NodeId(0));
        node.set(Slot::Register(Register::Eax), AbstractValue::concrete(5, 32));
        node.set(Slot::Flag(Flag::Zero), AbstractValue::unknown(1));
        assert_eq!(node.get(Slot::Register(Register::Eax)), Some(AbstractValue::concrete(5, 32)));
        assert_eq!(node.get(Slot::Register(Register::Ebx)), None);
        assert_eq!(node.slot_count(), 2);
        assert_eq!(Slot::from_name("eflags"), Some(Slot::Flags));
        assert_eq!(Slot::from_name("esi"), Some(Slot::Register(Register::Esi)));
        assert_eq!(Slot::from_name("af"), Some(Slot::Flag(Flag::Auxiliary)));
        assert_eq!(Slot::from_name("cs"), None);
    }
}
