//! The per-test decision tree.
//!
//! Edges are invocation records, nodes carry a verdict and the patch ids that
//! reached them. Patches whose invocations produced identical records are
//! folded onto the same child and share every execution below that point.
//! The tree persists across repeated executions of one test until no
//! `Expanding` leaf remains, then verdicts are collected and it is discarded.
//!
//! Nodes live in an arena addressed by `NodeId`; the parent link is an index,
//! so the bottom-up `expanding_count` maintenance needs no shared ownership.

use std::fmt;

use crate::core::record::InvocationRecord;

/// Identifier of one candidate patch, zero-based.
pub type PatchId = usize;

/// Status of a decision tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Leaf not yet executed through; the traversal may stop here.
    Expanding,
    /// All patches at this node have been invoked; children are meaningful.
    InvokeExpanded,
    /// The test passed along this path. Terminal.
    Passed,
    /// The test failed along this path. Terminal.
    Failed,
}

impl Verdict {
    pub fn is_terminal(self) -> bool {
        matches!(self, Verdict::Passed | Verdict::Failed)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Verdict::Expanding => "expanding",
            Verdict::InvokeExpanded => "invoke-expanded",
            Verdict::Passed => "passed",
            Verdict::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Arena index of a tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
struct Node {
    verdict: Verdict,
    patch_ids: Vec<PatchId>,
    parent: Option<NodeId>,
    /// Insertion-ordered; one entry per distinct record observed here.
    children: Vec<(InvocationRecord, NodeId)>,
    /// Number of `Expanding` nodes in this subtree, self included.
    expanding_count: usize,
}

#[derive(Debug, Clone)]
pub struct DecisionTree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionTree {
    /// A fresh tree: a single `Expanding` root with an empty patch set.
    pub fn new() -> Self {
        let root = Node {
            verdict: Verdict::Expanding,
            patch_ids: Vec::new(),
            parent: None,
            children: Vec::new(),
            expanding_count: 1,
        };
        Self {
            nodes: vec![root],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn verdict(&self, id: NodeId) -> Verdict {
        self.nodes[id.0].verdict
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn patch_ids(&self, id: NodeId) -> &[PatchId] {
        &self.nodes[id.0].patch_ids
    }

    pub fn children(&self, id: NodeId) -> &[(InvocationRecord, NodeId)] {
        &self.nodes[id.0].children
    }

    pub fn expanding_count(&self, id: NodeId) -> usize {
        self.nodes[id.0].expanding_count
    }

    /// Seed a patch id onto the root before the first execution.
    pub fn push_root_patch(&mut self, patch_id: PatchId) {
        let root = self.root;
        self.nodes[root.0].patch_ids.push(patch_id);
    }

    /// Replace a node's verdict, keeping every ancestor's `expanding_count`
    /// consistent with the number of `Expanding` nodes below it.
    pub fn set_verdict(&mut self, id: NodeId, verdict: Verdict) {
        if self.nodes[id.0].verdict == Verdict::Expanding {
            self.shift_expanding(id, -1);
        }
        self.nodes[id.0].verdict = verdict;
        if verdict == Verdict::Expanding {
            self.shift_expanding(id, 1);
        }
    }

    /// The merge point: the child keyed by `record` if one exists, otherwise
    /// a fresh child with `tentative` verdict. Either way `patch_id` is
    /// appended to the child's patch set.
    pub fn get_or_insert_child(
        &mut self,
        id: NodeId,
        record: InvocationRecord,
        tentative: Verdict,
        patch_id: PatchId,
    ) -> NodeId {
        if let Some(existing) = self.child_by_record(id, &record) {
            self.nodes[existing.0].patch_ids.push(patch_id);
            return existing;
        }

        let expanding = tentative == Verdict::Expanding;
        let child = NodeId(self.nodes.len());
        self.nodes.push(Node {
            verdict: tentative,
            patch_ids: vec![patch_id],
            parent: Some(id),
            children: Vec::new(),
            expanding_count: usize::from(expanding),
        });
        self.nodes[id.0].children.push((record, child));
        if expanding {
            self.shift_expanding(id, 1);
        }
        child
    }

    /// First child with unresolved descendants, in insertion order. `None`
    /// means no edge is expandable, which callers treat as an internal
    /// inconsistency.
    pub fn find_expandable_edge(&self, id: NodeId) -> Option<(&InvocationRecord, NodeId)> {
        self.nodes[id.0]
            .children
            .iter()
            .find(|(_, child)| self.expanding_count(*child) > 0)
            .map(|(record, child)| (record, *child))
    }

    fn child_by_record(&self, id: NodeId, record: &InvocationRecord) -> Option<NodeId> {
        self.nodes[id.0]
            .children
            .iter()
            .find(|(existing, _)| existing == record)
            .map(|(_, child)| *child)
    }

    fn shift_expanding(&mut self, start: NodeId, delta: isize) {
        let mut cursor = Some(start);
        while let Some(id) = cursor {
            let node = &mut self.nodes[id.0];
            debug_assert!(
                delta >= 0 || node.expanding_count > 0,
                "expanding_count underflow at node {id:?}"
            );
            node.expanding_count = node.expanding_count.saturating_add_signed(delta);
            cursor = node.parent;
        }
    }

    /// Human-readable dump for debug logging, one node per line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_node(self.root, 0, "entry", &mut out);
        out
    }

    fn render_node(&self, id: NodeId, depth: usize, edge: &str, out: &mut String) {
        let indent = "  ".repeat(depth);
        if depth > 20 {
            out.push_str(&format!(
                "|{indent}... (patches: {:?})\n",
                self.patch_ids(id)
            ));
            return;
        }
        let tag = match self.verdict(id) {
            Verdict::Expanding => "EXPD",
            Verdict::InvokeExpanded => "CALL",
            Verdict::Passed => "PASS",
            Verdict::Failed => "FAIL",
        };
        out.push_str(&format!("|{indent}= {tag} ({edge})\n"));
        let children = self.children(id);
        if children.is_empty() {
            out.push_str(&format!("|{indent}  (patches: {:?})\n", self.patch_ids(id)));
            return;
        }
        for (record, child) in children {
            self.render_node(*child, depth + 1, &record.to_string(), out);
        }
    }
}
