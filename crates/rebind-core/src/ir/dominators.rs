use super::{BlockId, IrCode};
use petgraph::algo::dominators::simple_fast;
use petgraph::graphmap::DiGraphMap;
use rustc_hash::FxHashMap;

/// Dominator relation over one snapshot of a method's block structure.
///
/// Dominance queries are answered in constant time from pre/post-order
/// numbers of the dominator tree. The tree remembers the structure version
/// it was computed for; once blocks are split it must be rebuilt.
#[derive(Debug, Clone)]
pub struct DominatorTree {
    entry: BlockId,
    idom: FxHashMap<BlockId, BlockId>,
    /// (preorder, postorder) numbers of reachable blocks
    numbering: FxHashMap<BlockId, (u32, u32)>,
    version: u64,
}

impl DominatorTree {
    pub fn new(code: &IrCode) -> Self {
        let mut graph: DiGraphMap<BlockId, ()> = DiGraphMap::new();
        for &block in code.block_order() {
            graph.add_node(block);
            for successor in code.successors(block) {
                graph.add_edge(block, successor, ());
            }
        }

        let entry = code.entry();
        let dominators = simple_fast(&graph, entry);

        let mut idom = FxHashMap::default();
        let mut children: FxHashMap<BlockId, Vec<BlockId>> = FxHashMap::default();
        for &block in code.block_order() {
            if block == entry {
                continue;
            }
            if let Some(parent) = dominators.immediate_dominator(block) {
                idom.insert(block, parent);
                children.entry(parent).or_default().push(block);
            }
        }

        let mut numbering = FxHashMap::default();
        let mut counter = 0u32;
        let mut pre = FxHashMap::default();
        // (block, children visited)
        let mut stack = vec![(entry, false)];
        while let Some((block, expanded)) = stack.pop() {
            if expanded {
                let start = pre.get(&block).copied().unwrap_or_default();
                numbering.insert(block, (start, counter));
                counter += 1;
                continue;
            }
            pre.insert(block, counter);
            counter += 1;
            stack.push((block, true));
            if let Some(kids) = children.get(&block) {
                stack.extend(kids.iter().rev().map(|&kid| (kid, false)));
            }
        }

        Self {
            entry,
            idom,
            numbering,
            version: code.structure_version(),
        }
    }

    pub fn entry(&self) -> BlockId {
        self.entry
    }

    pub fn is_reachable(&self, block: BlockId) -> bool {
        self.numbering.contains_key(&block)
    }

    /// Reflexive: every block dominates itself. Unreachable blocks are
    /// dominated by nothing but themselves.
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        if a == b {
            return true;
        }
        match (self.numbering.get(&a), self.numbering.get(&b)) {
            (Some(&(pre_a, post_a)), Some(&(pre_b, post_b))) => pre_a <= pre_b && post_b <= post_a,
            _ => false,
        }
    }

    pub fn strictly_dominates(&self, a: BlockId, b: BlockId) -> bool {
        a != b && self.dominates(a, b)
    }

    pub fn immediate_dominator(&self, block: BlockId) -> Option<BlockId> {
        self.idom.get(&block).copied()
    }

    /// Built for the current block structure of `code`
    pub fn is_current_for(&self, code: &IrCode) -> bool {
        self.version == code.structure_version()
    }
}
