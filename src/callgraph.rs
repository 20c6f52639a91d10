//! gmon-profile call graph.
//!
//! Vertices are the symbols taking part in at least one resolved arc. Mutually
//! recursive symbols are collapsed into cycles (strongly connected components),
//! which turns the graph into a DAG. Cumulative time then flows from callees
//! to callers over that DAG: a caller receives the share of the callee's
//! cumulative time equal to its share of the calls entering the callee.

use std::collections::VecDeque;

use crate::config::{Index, Map};
use crate::error::{Error, Result};
use crate::gmon::RawArc;
use crate::samples::Samples;
use crate::symbols::{SymbolId, SymbolTable};

/// Resolves both ends of every arc and sums arcs between the same symbols.
/// Arcs with an unknown end are reported as diagnostics and left out.
pub fn resolve_arcs(arcs: &[RawArc], table: &SymbolTable) -> Samples {
    let mut samples = Samples::default();

    for arc in arcs {
        let from = table.resolve(arc.from_pc);
        let to = table.resolve(arc.self_pc);
        if let (Some(from), Some(to)) = (from, to) {
            *samples.arcs.entry((from, to)).or_insert(0) += arc.count;
            continue;
        }

        let unresolved = [(from, arc.from_pc, "call site"), (to, arc.self_pc, "callee")];
        for (_, address, role) in unresolved.iter().filter(|(id, _, _)| id.is_none()) {
            let context = format!(
                "{} of arc 0x{:x} -> 0x{:x} with {} calls",
                role, arc.from_pc, arc.self_pc, arc.count
            );
            tracing::warn!("Unresolved address 0x{:x}: {}", address, &context);
            samples.diagnostics.push(Error::UnresolvedAddress {
                address: *address,
                context,
            });
        }
    }

    samples
}

/// Calls between two symbols.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    /// Symbol at the other end of the edge.
    pub peer: SymbolId,
    /// Number of calls.
    pub count: u64,
    /// Samples of the callee accounted to the caller through this edge;
    /// zero inside a cycle.
    pub propagated: f64,
}

/// A symbol of the call graph.
#[derive(Debug, Clone)]
pub struct CallGraphNode {
    symbol: SymbolId,
    self_samples: u64,
    cumulative: f64,
    calls_in: u64,
    calls_out: u64,
    self_calls: u64,
    callers: Vec<Edge>,
    callees: Vec<Edge>,
    component: Index,
    cycle: Option<usize>,
}

impl CallGraphNode {
    /// Symbol of the node.
    pub fn symbol(&self) -> SymbolId {
        self.symbol
    }

    /// Samples of the histogram attributed to the symbol.
    pub fn self_samples(&self) -> u64 {
        self.self_samples
    }

    /// Self samples plus the samples accounted from callees. For the head of a
    /// cycle this is the cumulative time of the whole cycle.
    pub fn cumulative_samples(&self) -> f64 {
        self.cumulative
    }

    /// Number of calls received from other symbols.
    pub fn calls_in(&self) -> u64 {
        self.calls_in
    }

    /// Number of calls made to other symbols.
    pub fn calls_out(&self) -> u64 {
        self.calls_out
    }

    /// Number of direct recursive calls.
    pub fn self_calls(&self) -> u64 {
        self.self_calls
    }

    /// Edges from the symbols calling this one.
    pub fn callers(&self) -> &[Edge] {
        &self.callers
    }

    /// Edges to the symbols called by this one.
    pub fn callees(&self) -> &[Edge] {
        &self.callees
    }

    /// Returns the number of the cycle the node belongs to.
    pub fn cycle(&self) -> Option<usize> {
        self.cycle
    }
}

/// Recursion cycle: a strongly connected component of the graph.
#[derive(Debug, Clone)]
pub struct Cycle {
    number: usize,
    members: Vec<SymbolId>,
    head: SymbolId,
    self_samples: u64,
    cumulative: f64,
    external_calls: u64,
    internal_calls: u64,
}

impl Cycle {
    /// Returns the number of the cycle, starting at 1.
    pub fn number(&self) -> usize {
        self.number
    }

    /// Members in address order.
    pub fn members(&self) -> &[SymbolId] {
        &self.members
    }

    /// Member representing the whole cycle.
    pub fn head(&self) -> SymbolId {
        self.head
    }

    /// Sum of the self samples of the members.
    pub fn self_samples(&self) -> u64 {
        self.self_samples
    }

    /// Self samples of the members plus the samples accounted from callees
    /// outside the cycle.
    pub fn cumulative_samples(&self) -> f64 {
        self.cumulative
    }

    /// Number of calls entering the cycle from outside.
    pub fn external_calls(&self) -> u64 {
        self.external_calls
    }

    /// Number of calls between members (including recursive calls).
    pub fn internal_calls(&self) -> u64 {
        self.internal_calls
    }
}

/// The call graph with cumulative times.
#[derive(Debug, Default)]
pub struct CallGraph {
    nodes: Vec<CallGraphNode>,
    index: Map<SymbolId, Index>,
    cycles: Vec<Cycle>,
}

/// Collapsed strongly connected component.
#[derive(Debug, Default)]
struct Component {
    members: Vec<Index>,
    self_samples: u64,
    external_calls: u64,
    internal_calls: u64,
    is_cycle: bool,
    cumulative: f64,
    /// Arcs leaving the component: (from node, to node, count).
    out_arcs: Vec<(Index, Index, u64)>,
    /// Components calling into this one, once per arc.
    callers: Vec<Index>,
}

impl CallGraph {
    /// Builds the graph from merged arcs and self samples.
    pub fn build(samples: &Samples) -> Result<Self> {
        let mut arcs: Vec<((SymbolId, SymbolId), u64)> =
            samples.arcs.iter().map(|(k, v)| (*k, *v)).collect();
        arcs.sort_unstable_by_key(|(pair, _)| *pair);

        let mut symbols: Vec<SymbolId> = arcs.iter().flat_map(|((f, t), _)| [*f, *t]).collect();
        symbols.sort_unstable();
        symbols.dedup();

        let index: Map<SymbolId, Index> =
            symbols.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let mut nodes: Vec<CallGraphNode> = symbols
            .iter()
            .map(|id| CallGraphNode {
                symbol: *id,
                self_samples: samples.self_samples(*id),
                cumulative: 0.0,
                calls_in: 0,
                calls_out: 0,
                self_calls: 0,
                callers: Vec::new(),
                callees: Vec::new(),
                component: 0,
                cycle: None,
            })
            .collect();

        let mut adjacency = vec![Vec::new(); nodes.len()];
        let mut edges = Vec::with_capacity(arcs.len());
        for ((from, to), count) in arcs {
            let (f, t) = (index[&from], index[&to]);
            adjacency[f].push(t);
            edges.push((f, t, count));
        }

        let (component_of, count) = strongly_connected(&adjacency)?;
        let mut components: Vec<Component> = (0..count).map(|_| Component::default()).collect();
        for (i, node) in nodes.iter_mut().enumerate() {
            node.component = component_of[i];
            let c = &mut components[node.component];
            c.members.push(i);
            c.self_samples += node.self_samples;
            c.is_cycle |= c.members.len() > 1;
        }

        for &(f, t, count) in &edges {
            let (cf, ct) = (component_of[f], component_of[t]);
            if f == t {
                nodes[f].self_calls += count;
            } else {
                nodes[f].calls_out += count;
                nodes[t].calls_in += count;
            }
            if cf == ct {
                components[cf].internal_calls += count;
                components[cf].is_cycle |= f == t;
            } else {
                components[ct].external_calls += count;
                components[ct].callers.push(cf);
                components[cf].out_arcs.push((f, t, count));
            }
        }

        propagate(&mut components, &component_of)?;

        // Per edge and per node shares
        for &(f, t, count) in &edges {
            let (cf, ct) = (component_of[f], component_of[t]);
            let propagated = if cf == ct {
                0.0
            } else {
                share(&components[ct], count)
            };
            let (caller, callee) = (nodes[f].symbol, nodes[t].symbol);
            nodes[f].callees.push(Edge {
                peer: callee,
                count,
                propagated,
            });
            nodes[t].callers.push(Edge {
                peer: caller,
                count,
                propagated,
            });
        }
        for node in nodes.iter_mut() {
            let from_callees: f64 = node.callees.iter().map(|e| e.propagated).sum();
            node.cumulative = node.self_samples as f64 + from_callees;
        }

        let cycles = collect_cycles(&mut nodes, &components);
        tracing::debug!(
            "Call graph: {} nodes, {} edges, {} cycles",
            nodes.len(),
            edges.len(),
            cycles.len()
        );

        Ok(CallGraph {
            nodes,
            index,
            cycles,
        })
    }

    /// Returns the node of a symbol, if the symbol takes part in any call.
    pub fn node(&self, id: SymbolId) -> Option<&CallGraphNode> {
        self.index.get(&id).map(|i| &self.nodes[*i])
    }

    /// Nodes in address order.
    pub fn nodes(&self) -> &[CallGraphNode] {
        &self.nodes
    }

    /// Cycles ordered by their number.
    pub fn cycles(&self) -> &[Cycle] {
        &self.cycles
    }

    /// Returns the cycle by its number.
    pub fn cycle(&self, number: usize) -> Option<&Cycle> {
        number.checked_sub(1).and_then(|i| self.cycles.get(i))
    }
}

/// Part of the callee component cumulative time accounted to `count` calls.
fn share(callee: &Component, count: u64) -> f64 {
    if callee.external_calls == 0 {
        return 0.0;
    }
    callee.cumulative * count as f64 / callee.external_calls as f64
}

/// Computes cumulative time of the components, callees first.
fn propagate(components: &mut [Component], component_of: &[Index]) -> Result<()> {
    let mut pending: Vec<usize> = components.iter().map(|c| c.out_arcs.len()).collect();
    let mut ready: VecDeque<Index> = pending
        .iter()
        .enumerate()
        .filter(|(_, n)| **n == 0)
        .map(|(i, _)| i)
        .collect();
    let mut done = 0_usize;

    while let Some(k) = ready.pop_front() {
        let from_callees: f64 = components[k]
            .out_arcs
            .iter()
            .map(|&(_, t, count)| share(&components[component_of[t]], count))
            .sum();
        components[k].cumulative = components[k].self_samples as f64 + from_callees;
        done += 1;

        for i in 0..components[k].callers.len() {
            let caller = components[k].callers[i];
            pending[caller] -= 1;
            if pending[caller] == 0 {
                ready.push_back(caller);
            }
        }
    }

    if done != components.len() {
        return Err(Error::InternalInconsistency(format!(
            "condensed call graph is not acyclic: ordered {} of {} components",
            done,
            components.len()
        )));
    }
    Ok(())
}

/// Numbers the cycles, picks their heads and marks their members.
fn collect_cycles(nodes: &mut [CallGraphNode], components: &[Component]) -> Vec<Cycle> {
    let mut cycles: Vec<Cycle> = components
        .iter()
        .filter(|c| c.is_cycle)
        .map(|c| {
            let head = c
                .members
                .iter()
                .copied()
                .max_by(|&x, &y| {
                    let rank = |i: Index| nodes[i].self_samples as f64 + nodes[i].cumulative;
                    rank(x)
                        .total_cmp(&rank(y))
                        .then(nodes[y].symbol.cmp(&nodes[x].symbol))
                })
                .unwrap_or(c.members[0]);
            Cycle {
                number: 0,
                members: c.members.iter().map(|i| nodes[*i].symbol).collect(),
                head: nodes[head].symbol,
                self_samples: c.self_samples,
                cumulative: c.cumulative,
                external_calls: c.external_calls,
                internal_calls: c.internal_calls,
            }
        })
        .collect();

    cycles.sort_by(|x, y| {
        y.cumulative
            .total_cmp(&x.cumulative)
            .then(x.head.cmp(&y.head))
    });

    let position: Map<SymbolId, Index> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.symbol, i))
        .collect();
    for (i, cycle) in cycles.iter_mut().enumerate() {
        cycle.number = i + 1;
        for member in &cycle.members {
            nodes[position[member]].cycle = Some(cycle.number);
        }
        nodes[position[&cycle.head]].cumulative = cycle.cumulative;
    }
    cycles
}

/// Tarjan's strongly connected components with explicit stacks.
/// Returns the component of every vertex and the number of components;
/// components are numbered callees first.
fn strongly_connected(adjacency: &[Vec<Index>]) -> Result<(Vec<Index>, usize)> {
    const UNVISITED: usize = usize::MAX;

    let n = adjacency.len();
    let mut order = vec![UNVISITED; n];
    let mut low = vec![0_usize; n];
    let mut on_stack = vec![false; n];
    let mut component = vec![UNVISITED; n];
    let mut stack: Vec<Index> = Vec::new();
    // Depth first search frames: vertex and position of its next edge
    let mut frames: Vec<(Index, usize)> = Vec::new();
    let mut next_order = 0_usize;
    let mut count = 0_usize;

    for root in 0..n {
        if order[root] != UNVISITED {
            continue;
        }
        order[root] = next_order;
        low[root] = next_order;
        next_order += 1;
        stack.push(root);
        on_stack[root] = true;
        frames.push((root, 0));

        while let Some(frame) = frames.last_mut() {
            let v = frame.0;
            if let Some(&w) = adjacency[v].get(frame.1) {
                frame.1 += 1;
                if order[w] == UNVISITED {
                    order[w] = next_order;
                    low[w] = next_order;
                    next_order += 1;
                    stack.push(w);
                    on_stack[w] = true;
                    frames.push((w, 0));
                } else if on_stack[w] {
                    low[v] = low[v].min(order[w]);
                }
                continue;
            }

            frames.pop();
            if let Some(&(parent, _)) = frames.last() {
                low[parent] = low[parent].min(low[v]);
            }
            if low[v] == order[v] {
                loop {
                    let w = stack.pop().ok_or_else(|| {
                        Error::InternalInconsistency(format!(
                            "component stack exhausted below vertex {}",
                            v
                        ))
                    })?;
                    on_stack[w] = false;
                    component[w] = count;
                    if w == v {
                        break;
                    }
                }
                count += 1;
            }
        }
    }

    Ok((component, count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gmon::{self, Layout};
    use crate::tests::mock::{program_gmon, program_table, symbol};

    /// Builds samples from (from, to, count) arcs over symbols named by their
    /// start address, with the given self samples.
    fn samples(arcs: &[(usize, usize, u64)], self_samples: &[u64]) -> (SymbolTable, Samples) {
        let table = SymbolTable::new(
            (0..self_samples.len())
                .map(|i| {
                    let start = 0x1000 * (i as u64 + 1);
                    symbol(&format!("f{}", i), start, start + 0x100, None)
                })
                .collect(),
        );
        let mut samples = Samples::default();
        for (i, s) in self_samples.iter().enumerate() {
            let id = table.find(&format!("f{}", i)).unwrap();
            samples.self_samples.insert(id, *s);
        }
        for &(f, t, count) in arcs {
            let from = table.find(&format!("f{}", f)).unwrap();
            let to = table.find(&format!("f{}", t)).unwrap();
            *samples.arcs.entry((from, to)).or_insert(0) += count;
        }
        (table, samples)
    }

    fn node<'g>(graph: &'g CallGraph, table: &SymbolTable, name: &str) -> &'g CallGraphNode {
        graph.node(table.find(name).unwrap()).unwrap()
    }

    #[test]
    fn two_node_cycle() {
        let (table, samples) = samples(&[(0, 1, 10), (1, 0, 4)], &[3, 1]);
        let graph = CallGraph::build(&samples).unwrap();

        assert_eq!(graph.cycles().len(), 1);
        let cycle = &graph.cycles()[0];
        assert_eq!(cycle.members().len(), 2);
        assert_eq!(cycle.internal_calls(), 14);
        assert_eq!(cycle.external_calls(), 0);
        assert_eq!(cycle.cumulative_samples(), 4.0);

        let head = graph.node(cycle.head()).unwrap();
        assert_eq!(head.symbol(), table.find("f0").unwrap());
        assert_eq!(head.cumulative_samples(), 4.0);
        assert_eq!(node(&graph, &table, "f0").cycle(), Some(1));
        assert_eq!(node(&graph, &table, "f1").cycle(), Some(1));
        assert_eq!(node(&graph, &table, "f1").cumulative_samples(), 1.0);
    }

    #[test]
    fn chain_apportions_by_calls() {
        // f0 -> f2 (1 call), f1 -> f2 (3 calls), f2 -> f3
        let (table, samples) = samples(&[(0, 2, 1), (1, 2, 3), (2, 3, 5)], &[1, 1, 4, 4]);
        let graph = CallGraph::build(&samples).unwrap();

        assert!(graph.cycles().is_empty());
        assert_eq!(node(&graph, &table, "f3").cumulative_samples(), 4.0);
        assert_eq!(node(&graph, &table, "f2").cumulative_samples(), 8.0);
        assert_eq!(node(&graph, &table, "f0").cumulative_samples(), 3.0);
        assert_eq!(node(&graph, &table, "f1").cumulative_samples(), 7.0);

        let f2 = node(&graph, &table, "f2");
        assert_eq!(f2.calls_in(), 4);
        assert_eq!(f2.calls_out(), 5);
        assert_eq!(f2.callers().len(), 2);
        assert_eq!(f2.callers()[1].propagated, 6.0);
    }

    #[test]
    fn self_recursion_is_a_cycle() {
        let (table, samples) = samples(&[(0, 1, 1), (1, 1, 7)], &[0, 2]);
        let graph = CallGraph::build(&samples).unwrap();
        assert_eq!(graph.cycles().len(), 1);
        let f1 = node(&graph, &table, "f1");
        assert_eq!(f1.self_calls(), 7);
        assert_eq!(f1.calls_in(), 1);
        assert_eq!(f1.cycle(), Some(1));
        assert_eq!(node(&graph, &table, "f0").cycle(), None);
        assert_eq!(node(&graph, &table, "f0").cumulative_samples(), 2.0);
    }

    #[test]
    fn disjoint_cycles_stay_apart() {
        // {f0, f1} and {f2, f3} joined by f1 -> f2 only
        let (table, samples) = samples(
            &[(0, 1, 1), (1, 0, 1), (1, 2, 2), (2, 3, 1), (3, 2, 1)],
            &[1, 1, 5, 5],
        );
        let graph = CallGraph::build(&samples).unwrap();
        assert_eq!(graph.cycles().len(), 2);
        let first = node(&graph, &table, "f0").cycle();
        let second = node(&graph, &table, "f2").cycle();
        assert_ne!(first, second);
        assert_eq!(node(&graph, &table, "f1").cycle(), first);
        assert_eq!(node(&graph, &table, "f3").cycle(), second);

        // Cycles are numbered by cumulative time
        assert_eq!(graph.cycle(1).unwrap().cumulative_samples(), 12.0);
        assert_eq!(graph.cycle(2).unwrap().cumulative_samples(), 10.0);
        assert!(graph.cycle(3).is_none());
    }

    #[test]
    fn cycle_receives_and_passes_time() {
        let table = program_table();
        let data = gmon::decode(&program_gmon(), &Layout::default()).unwrap();
        let samples = Samples::from_gmon(&data, &table);
        let graph = CallGraph::build(&samples).unwrap();

        // leaf: 4 samples, called twice by main and twice by b
        assert_eq!(node(&graph, &table, "leaf").cumulative_samples(), 4.0);
        // cycle {a, b}: 3 + 1 + half of leaf
        let cycle = &graph.cycles()[0];
        assert_eq!(cycle.cumulative_samples(), 6.0);
        assert_eq!(cycle.external_calls(), 1);
        assert_eq!(cycle.head(), table.find("a").unwrap());
        assert_eq!(node(&graph, &table, "a").cumulative_samples(), 6.0);
        assert_eq!(node(&graph, &table, "b").cumulative_samples(), 3.0);
        // main: 2 + whole cycle + half of leaf
        assert_eq!(node(&graph, &table, "main").cumulative_samples(), 10.0);
    }

    #[test]
    fn cumulative_floor() {
        let (_, samples) = samples(
            &[(0, 1, 3), (1, 2, 1), (2, 0, 1), (2, 3, 2), (3, 3, 1), (4, 0, 9)],
            &[2, 0, 7, 1, 0],
        );
        let graph = CallGraph::build(&samples).unwrap();
        for node in graph.nodes() {
            assert!(node.cumulative_samples() >= node.self_samples() as f64);
        }
    }

    #[test]
    fn deep_chain_does_not_overflow() {
        let depth = 100_000;
        let arcs: Vec<(usize, usize, u64)> = (0..depth - 1).map(|i| (i, i + 1, 1)).collect();
        let mut adjacency = vec![Vec::new(); depth];
        for (f, t, _) in &arcs {
            adjacency[*f].push(*t);
        }
        // Close the chain into one big cycle
        adjacency[depth - 1].push(0);
        let (component, count) = strongly_connected(&adjacency).unwrap();
        assert_eq!(count, 1);
        assert!(component.iter().all(|c| *c == 0));
    }
}
