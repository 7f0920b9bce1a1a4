//! s-t minimum cut with the Boykov–Kolmogorov augmenting-tree algorithm.
//!
//! Two search trees grow from the terminals and are kept between
//! augmentations; nodes cut off by a saturated edge are re-attached
//! ("adopted") instead of rebuilding the trees. This suits image graphs,
//! where paths are short and most nodes keep their parent.

use std::collections::VecDeque;

const NIL: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Parent {
    /// Not in either tree.
    Free,
    /// Root: linked straight to its tree's terminal.
    Terminal,
    /// Lost its parent edge, waiting for adoption.
    Orphan,
    /// Arc from this node to its parent.
    Arc(u32),
}

#[derive(Debug, Clone)]
struct Node {
    first: u32,
    /// Residual terminal capacity: positive toward the source, negative
    /// toward the sink.
    residual: f64,
    parent: Parent,
    in_sink_tree: bool,
    /// Distance to the tree root, valid when `stamp` is current.
    dist: u32,
    stamp: u32,
    active: bool,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            first: NIL,
            residual: 0.0,
            parent: Parent::Free,
            in_sink_tree: false,
            dist: 0,
            stamp: 0,
            active: false,
        }
    }
}

/// Flow network over pixel nodes with implicit source and sink terminals.
///
/// Arcs are stored in pairs, so the residual twin of arc `a` is `a ^ 1`.
pub(crate) struct FlowNetwork {
    nodes: Vec<Node>,
    to: Vec<u32>,
    next: Vec<u32>,
    cap: Vec<f64>,
    /// Flow pushed straight through a node's two terminal links.
    terminal_flow: f64,
}

impl FlowNetwork {
    pub(crate) fn new(nodes: usize, edge_hint: usize) -> Self {
        Self {
            nodes: vec![Node::default(); nodes],
            to: Vec::with_capacity(edge_hint),
            next: Vec::with_capacity(edge_hint),
            cap: Vec::with_capacity(edge_hint),
            terminal_flow: 0.0,
        }
    }

    fn push_arc(&mut self, from: usize, to: usize, cap: f64) {
        let id = self.to.len() as u32;
        self.to.push(to as u32);
        self.cap.push(cap);
        self.next.push(self.nodes[from].first);
        self.nodes[from].first = id;
    }

    /// Add terminal capacities to `node`. The shared part of both links is
    /// counted as flow immediately; only the difference is kept.
    pub(crate) fn set_terminal(&mut self, node: usize, source_cap: f64, sink_cap: f64) {
        let (mut source_cap, mut sink_cap) = (source_cap, sink_cap);
        let r = self.nodes[node].residual;
        if r > 0.0 {
            source_cap += r;
        } else {
            sink_cap -= r;
        }
        self.terminal_flow += source_cap.min(sink_cap);
        self.nodes[node].residual = source_cap - sink_cap;
    }

    /// Undirected neighbour link with capacity `cap` in both directions.
    pub(crate) fn add_edge(&mut self, a: usize, b: usize, cap: f64) {
        self.push_arc(a, b, cap);
        self.push_arc(b, a, cap);
    }

    fn head(&self, arc: u32) -> usize {
        self.to[arc as usize] as usize
    }

    /// Saturate the network and return the total flow.
    pub(crate) fn max_flow(&mut self) -> f64 {
        let mut flow = self.terminal_flow;
        let mut active = VecDeque::new();
        for (i, node) in self.nodes.iter_mut().enumerate() {
            node.stamp = 0;
            node.active = node.residual != 0.0;
            if node.active {
                node.parent = Parent::Terminal;
                node.in_sink_tree = node.residual < 0.0;
                node.dist = 1;
                active.push_back(i);
            } else {
                node.parent = Parent::Free;
            }
        }

        let mut orphans = Vec::new();
        let mut time = 0u32;
        while let Some(bridge) = self.grow(&mut active) {
            flow += self.augment(bridge, &mut orphans);
            time += 1;
            self.adopt(&mut orphans, &mut active, time);
        }
        flow
    }

    /// Grow both trees from the active nodes until they touch. Returns the
    /// arc leading from the source tree into the sink tree.
    fn grow(&mut self, active: &mut VecDeque<usize>) -> Option<u32> {
        while let Some(&v) = active.front() {
            if self.nodes[v].parent != Parent::Free {
                let side = self.nodes[v].in_sink_tree as u32;
                let (v_dist, v_stamp) = (self.nodes[v].dist, self.nodes[v].stamp);
                let mut a = self.nodes[v].first;
                while a != NIL {
                    if self.cap[(a ^ side) as usize] > 0.0 {
                        let u = self.head(a);
                        let node = &mut self.nodes[u];
                        if node.parent == Parent::Free {
                            node.in_sink_tree = side == 1;
                            node.parent = Parent::Arc(a ^ 1);
                            node.stamp = v_stamp;
                            node.dist = v_dist + 1;
                            if !node.active {
                                node.active = true;
                                active.push_back(u);
                            }
                        } else if node.in_sink_tree as u32 != side {
                            return Some(a ^ side);
                        } else if node.dist > v_dist + 1 && node.stamp <= v_stamp {
                            node.parent = Parent::Arc(a ^ 1);
                            node.stamp = v_stamp;
                            node.dist = v_dist + 1;
                        }
                    }
                    a = self.next[a as usize];
                }
            }
            active.pop_front();
            self.nodes[v].active = false;
        }
        None
    }

    /// Push the bottleneck along the path through `bridge`. Nodes whose parent
    /// link saturates become orphans.
    fn augment(&mut self, bridge: u32, orphans: &mut Vec<usize>) -> f64 {
        // side 1 walks the source tree from the bridge's tail, side 0 the
        // sink tree from its head.
        let mut bottleneck = self.cap[bridge as usize];
        for side in [1u32, 0] {
            let mut v = self.head(bridge ^ side);
            while let Parent::Arc(a) = self.nodes[v].parent {
                bottleneck = bottleneck.min(self.cap[(a ^ side) as usize]);
                v = self.head(a);
            }
            bottleneck = bottleneck.min(self.nodes[v].residual.abs());
        }

        self.cap[bridge as usize] -= bottleneck;
        self.cap[(bridge ^ 1) as usize] += bottleneck;
        for side in [1u32, 0] {
            let mut v = self.head(bridge ^ side);
            while let Parent::Arc(a) = self.nodes[v].parent {
                self.cap[(a ^ side ^ 1) as usize] += bottleneck;
                self.cap[(a ^ side) as usize] -= bottleneck;
                if self.cap[(a ^ side) as usize] <= 0.0 {
                    self.nodes[v].parent = Parent::Orphan;
                    orphans.push(v);
                }
                v = self.head(a);
            }
            let root = &mut self.nodes[v];
            root.residual += if side == 1 { -bottleneck } else { bottleneck };
            if root.residual == 0.0 {
                root.parent = Parent::Orphan;
                orphans.push(v);
            }
        }
        bottleneck
    }

    /// Length of the path from `u` to its tree root, or `None` if the path
    /// runs into an orphan. Nodes on a valid path get `time` stamped.
    fn root_distance(&mut self, u: usize, time: u32) -> Option<u32> {
        let mut d = 0;
        let mut w = u;
        loop {
            if self.nodes[w].stamp == time {
                d += self.nodes[w].dist;
                break;
            }
            d += 1;
            match self.nodes[w].parent {
                Parent::Arc(a) => w = self.head(a),
                Parent::Terminal => {
                    self.nodes[w].stamp = time;
                    self.nodes[w].dist = 1;
                    break;
                }
                Parent::Orphan | Parent::Free => return None,
            }
        }

        let mut dist = d;
        let mut w = u;
        while self.nodes[w].stamp != time {
            self.nodes[w].stamp = time;
            self.nodes[w].dist = dist;
            dist -= 1;
            match self.nodes[w].parent {
                Parent::Arc(a) => w = self.head(a),
                _ => break,
            }
        }
        Some(d + 1)
    }

    /// Re-attach each orphan to the closest valid parent in its own tree, or
    /// free it and orphan its children.
    fn adopt(&mut self, orphans: &mut Vec<usize>, active: &mut VecDeque<usize>, time: u32) {
        while let Some(v) = orphans.pop() {
            let in_sink = self.nodes[v].in_sink_tree;
            let toward_root = (in_sink as u32) ^ 1;

            let mut best: Option<(u32, u32)> = None;
            let mut a = self.nodes[v].first;
            while a != NIL {
                let u = self.head(a);
                let candidate = self.cap[(a ^ toward_root) as usize] > 0.0
                    && self.nodes[u].in_sink_tree == in_sink
                    && self.nodes[u].parent != Parent::Free;
                if candidate {
                    if let Some(d) = self.root_distance(u, time) {
                        if best.map_or(true, |(_, best_d)| d < best_d) {
                            best = Some((a, d));
                        }
                    }
                }
                a = self.next[a as usize];
            }

            if let Some((arc, dist)) = best {
                let node = &mut self.nodes[v];
                node.parent = Parent::Arc(arc);
                node.stamp = time;
                node.dist = dist;
                continue;
            }

            self.nodes[v].parent = Parent::Free;
            self.nodes[v].stamp = 0;
            let mut a = self.nodes[v].first;
            while a != NIL {
                let u = self.head(a);
                let parent = self.nodes[u].parent;
                if self.nodes[u].in_sink_tree == in_sink && parent != Parent::Free {
                    if self.cap[(a ^ toward_root) as usize] > 0.0 && !self.nodes[u].active {
                        self.nodes[u].active = true;
                        active.push_back(u);
                    }
                    if let Parent::Arc(pa) = parent {
                        if self.head(pa) == v {
                            self.nodes[u].parent = Parent::Orphan;
                            orphans.push(u);
                        }
                    }
                }
                a = self.next[a as usize];
            }
        }
    }

    /// After [`Self::max_flow`], which nodes the source can still reach
    /// through unsaturated links.
    pub(crate) fn source_side(&self) -> Vec<bool> {
        let mut seen: Vec<bool> = self.nodes.iter().map(|n| n.residual > 0.0).collect();
        let mut queue: VecDeque<usize> = (0..self.nodes.len()).filter(|&i| seen[i]).collect();
        while let Some(u) = queue.pop_front() {
            let mut a = self.nodes[u].first;
            while a != NIL {
                let v = self.head(a);
                if !seen[v] && self.cap[a as usize] > 0.0 {
                    seen[v] = true;
                    queue.push_back(v);
                }
                a = self.next[a as usize];
            }
        }
        seen
    }
}
