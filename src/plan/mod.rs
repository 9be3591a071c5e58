//! Logical execution plans.
//!
//! A plan is an arena of immutable nodes addressed by [`NodeId`], appended
//! bottom-up through a [`PlanBuilder`]. Rewrite passes never mutate a plan;
//! they rebuild a new arena from the old one.
mod builder;
mod expr;
mod fingerprint;
mod node;

pub use builder::PlanBuilder;
pub use expr::{BinaryOp, Expr, RowCount, ScalarFunction};
pub use fingerprint::PlanFingerprint;
pub use node::*;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::CompileError;

#[derive(Debug, Clone, PartialEq)]
pub struct PlanNode {
    pub kind: PlanKind,
    pub schema: Schema,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanArena {
    nodes: Vec<PlanNode>,
}

impl PlanArena {
    pub fn get(&self, id: NodeId) -> Result<&PlanNode, CompileError> {
        self.nodes
            .get(id.index())
            .ok_or_else(|| CompileError::InvalidPlan(format!("unknown node {}", id)))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// A validated plan: an arena plus the id of its root node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PlanRepr", into = "PlanRepr")]
pub struct Plan {
    arena: PlanArena,
    root: NodeId,
}

/// Serialized form: nodes in insertion order, children referenced by index.
#[derive(Serialize, Deserialize)]
struct PlanRepr {
    nodes: Vec<PlanKind>,
    root: NodeId,
}

impl TryFrom<PlanRepr> for Plan {
    type Error = CompileError;

    fn try_from(repr: PlanRepr) -> Result<Self, Self::Error> {
        let mut builder = PlanBuilder::new();
        for kind in repr.nodes {
            builder.add(kind)?;
        }
        builder.finish(repr.root)
    }
}

impl From<Plan> for PlanRepr {
    fn from(plan: Plan) -> Self {
        PlanRepr {
            nodes: plan.arena.nodes.into_iter().map(|n| n.kind).collect(),
            root: plan.root,
        }
    }
}

impl Plan {
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn arena(&self) -> &PlanArena {
        &self.arena
    }

    pub fn node(&self, id: NodeId) -> Result<&PlanNode, CompileError> {
        self.arena.get(id)
    }

    pub fn kind(&self, id: NodeId) -> Result<&PlanKind, CompileError> {
        self.arena.get(id).map(|n| &n.kind)
    }

    pub fn schema(&self, id: NodeId) -> Result<&Schema, CompileError> {
        self.arena.get(id).map(|n| &n.schema)
    }

    pub fn root_schema(&self) -> Result<&Schema, CompileError> {
        self.schema(self.root)
    }

    /// Nodes reachable from the root, children before parents, each once.
    pub fn post_order(&self) -> Vec<NodeId> {
        fn visit(plan: &Plan, id: NodeId, seen: &mut BTreeSet<NodeId>, out: &mut Vec<NodeId>) {
            if !seen.insert(id) {
                return;
            }
            if let Ok(kind) = plan.kind(id) {
                for child in kind.children() {
                    visit(plan, child, seen, out);
                }
            }
            out.push(id);
        }

        let mut out = Vec::new();
        visit(self, self.root, &mut BTreeSet::new(), &mut out);
        out
    }

    /// Rebuild the reachable plan bottom-up. `f` receives each node with its
    /// children already remapped into the new arena and returns the id that
    /// replaces it.
    pub fn rebuild<F>(&self, mut f: F) -> Result<Plan, CompileError>
    where
        F: FnMut(&mut PlanBuilder, PlanKind) -> Result<NodeId, CompileError>,
    {
        let mut builder = PlanBuilder::new();
        let mut mapping: BTreeMap<NodeId, NodeId> = BTreeMap::new();
        for id in self.post_order() {
            let kind = self
                .kind(id)?
                .map_children(|child| mapping.get(&child).copied().unwrap_or(child));
            let new_id = f(&mut builder, kind)?;
            mapping.insert(id, new_id);
        }
        let root = mapping
            .get(&self.root)
            .copied()
            .ok_or_else(|| CompileError::InvalidPlan("root was not rebuilt".into()))?;
        builder.finish(root)
    }

    /// Canonical copy: only reachable nodes, in post-order. Structurally
    /// identical plans normalize to equal arenas.
    pub fn normalized(&self) -> Result<Plan, CompileError> {
        self.rebuild(|builder, kind| builder.add(kind))
    }
}
