//! Architecture graph: an arena of component and resource nodes joined by
//! typed edges.
//!
//! Nodes are addressed by [`NodeIndex`], edges by [`EdgeIndex`]. Nothing holds
//! an owning reference to another node, so dependency cycles are just data.
//! The graph borrows the plan it was built from and lives for one evaluation.
//!
//! ```text
//! component ──contains──▶ resource
//! component ──calls/reads/…──▶ component      (one edge per relationship)
//! component ──depends_on──▶ component         (relationships + dependency lists)
//! ```

use crate::error::StructuralError;
use crate::plan::{Component, ComponentKind, Plan, RelationshipKind, Resource, ResourceKind};
use crate::property::PropertyBag;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeIndex(usize);

impl NodeIndex {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeIndex(usize);

/// Node payload, borrowed from the plan.
#[derive(Debug, Clone, Copy)]
pub enum Node<'p> {
    Component(&'p Component),
    Resource {
        owner: NodeIndex,
        resource: &'p Resource,
    },
}

impl<'p> Node<'p> {
    pub fn id(&self) -> &'p str {
        match self {
            Node::Component(c) => &c.id,
            Node::Resource { resource, .. } => &resource.id,
        }
    }

    pub fn as_component(&self) -> Option<&'p Component> {
        match self {
            Node::Component(c) => Some(c),
            Node::Resource { .. } => None,
        }
    }

    pub fn as_resource(&self) -> Option<&'p Resource> {
        match self {
            Node::Component(_) => None,
            Node::Resource { resource, .. } => Some(resource),
        }
    }
}

/// Edge label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EdgeKind {
    Contains,
    Relationship(RelationshipKind),
}

impl EdgeKind {
    pub fn is_dependency(&self) -> bool {
        matches!(self, EdgeKind::Relationship(RelationshipKind::DependsOn))
    }
}

/// Where an edge came from in the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeOrigin {
    /// Component owns resource.
    Ownership,
    /// `relationships[i]`.
    Relationship(usize),
    /// Materialized from a component's `dependencies` list.
    DependencyList,
}

#[derive(Debug, Clone, Copy)]
pub struct Edge<'p> {
    pub source: NodeIndex,
    pub target: NodeIndex,
    pub kind: EdgeKind,
    pub origin: EdgeOrigin,
    pub metadata: Option<&'p PropertyBag>,
}

/// Directed multigraph built from one plan.
#[derive(Debug, Clone)]
pub struct Graph<'p> {
    nodes: Vec<Node<'p>>,
    edges: Vec<Edge<'p>>,
    outgoing: Vec<Vec<EdgeIndex>>,
    incoming: Vec<Vec<EdgeIndex>>,
    components: BTreeMap<&'p str, NodeIndex>,
}

impl<'p> Graph<'p> {
    /// Build the graph for a validated plan.
    ///
    /// Unresolved references are reported as [`StructuralError`]. All state is
    /// local until the final value is returned, so a failure never leaves a
    /// partially built graph behind.
    pub fn build(plan: &'p Plan) -> Result<Self, StructuralError> {
        let mut builder = GraphBuilder::default();

        for component in &plan.components {
            let idx = builder.push_node(Node::Component(component));
            if builder.components.insert(&component.id, idx).is_some() {
                return Err(StructuralError::DuplicateComponent {
                    id: component.id.clone(),
                });
            }
        }

        for (ci, component) in plan.components.iter().enumerate() {
            let owner = NodeIndex(ci);
            for resource in &component.resources {
                let idx = builder.push_node(Node::Resource { owner, resource });
                builder.push_edge(Edge {
                    source: owner,
                    target: idx,
                    kind: EdgeKind::Contains,
                    origin: EdgeOrigin::Ownership,
                    metadata: None,
                });
            }
        }

        for (ri, rel) in plan.relationships.iter().enumerate() {
            let source = builder.resolve(&rel.source, || format!("relationships[{ri}].source"))?;
            let target = builder.resolve(&rel.target, || format!("relationships[{ri}].target"))?;
            builder.push_edge(Edge {
                source,
                target,
                kind: EdgeKind::Relationship(rel.kind),
                origin: EdgeOrigin::Relationship(ri),
                metadata: rel.metadata.as_ref(),
            });
        }

        for (ci, component) in plan.components.iter().enumerate() {
            let source = NodeIndex(ci);
            for dep in &component.dependencies {
                let target =
                    builder.resolve(dep, || format!("components[{ci}].dependencies"))?;
                builder.push_edge(Edge {
                    source,
                    target,
                    kind: EdgeKind::Relationship(RelationshipKind::DependsOn),
                    origin: EdgeOrigin::DependencyList,
                    metadata: None,
                });
            }
        }

        tracing::debug!(
            nodes = builder.nodes.len(),
            edges = builder.edges.len(),
            "architecture graph built"
        );

        Ok(Graph {
            nodes: builder.nodes,
            edges: builder.edges,
            outgoing: builder.outgoing,
            incoming: builder.incoming,
            components: builder.components,
        })
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn node(&self, idx: NodeIndex) -> Option<&Node<'p>> {
        self.nodes.get(idx.0)
    }

    pub fn edge(&self, idx: EdgeIndex) -> Option<&Edge<'p>> {
        self.edges.get(idx.0)
    }

    /// All edges in insertion order (ownership, relationships, dependency lists).
    pub fn edges(&self) -> impl Iterator<Item = &Edge<'p>> {
        self.edges.iter()
    }

    /// Relationship edges of one kind, in plan order.
    pub fn relationship_edges(&self, kind: RelationshipKind) -> impl Iterator<Item = &Edge<'p>> {
        self.edges.iter().filter(move |e| {
            e.kind == EdgeKind::Relationship(kind) && matches!(e.origin, EdgeOrigin::Relationship(_))
        })
    }

    /// Lookup a component node by id.
    pub fn component_index(&self, id: &str) -> Option<NodeIndex> {
        self.components.get(id).copied()
    }

    pub fn component(&self, idx: NodeIndex) -> Option<&'p Component> {
        self.node(idx).and_then(Node::as_component)
    }

    pub fn component_kind(&self, idx: NodeIndex) -> Option<ComponentKind> {
        self.component(idx).map(|c| c.kind)
    }

    pub fn outgoing(&self, idx: NodeIndex) -> impl Iterator<Item = &Edge<'p>> {
        self.outgoing
            .get(idx.0)
            .into_iter()
            .flatten()
            .filter_map(|e| self.edges.get(e.0))
    }

    pub fn incoming(&self, idx: NodeIndex) -> impl Iterator<Item = &Edge<'p>> {
        self.incoming
            .get(idx.0)
            .into_iter()
            .flatten()
            .filter_map(|e| self.edges.get(e.0))
    }

    /// Resources owned by a component, in declaration order.
    pub fn resources_of(&self, component: NodeIndex) -> impl Iterator<Item = (NodeIndex, &'p Resource)> {
        self.outgoing(component)
            .filter(|e| e.kind == EdgeKind::Contains)
            .filter_map(|e| {
                self.node(e.target)
                    .and_then(Node::as_resource)
                    .map(|r| (e.target, r))
            })
    }

    /// Resources of one kind owned by a component.
    pub fn resources_of_kind(
        &self,
        component: NodeIndex,
        kind: ResourceKind,
    ) -> impl Iterator<Item = (NodeIndex, &'p Resource)> {
        self.resources_of(component)
            .filter(move |(_, r)| r.kind == kind)
    }

    /// Owning component of a resource node.
    pub fn owner_of(&self, resource: NodeIndex) -> Option<NodeIndex> {
        match self.node(resource)? {
            Node::Resource { owner, .. } => Some(*owner),
            Node::Component(_) => None,
        }
    }

    /// Every component node, in plan order.
    pub fn component_nodes(&self) -> impl Iterator<Item = (NodeIndex, &'p Component)> {
        self.nodes.iter().enumerate().filter_map(|(i, n)| {
            n.as_component().map(|c| (NodeIndex(i), c))
        })
    }

    /// Every resource node in the graph, in plan order.
    pub fn resource_nodes(&self) -> impl Iterator<Item = (NodeIndex, &'p Resource)> {
        self.nodes.iter().enumerate().filter_map(|(i, n)| {
            n.as_resource().map(|r| (NodeIndex(i), r))
        })
    }

    /// Strongly connected components of the `depends_on` subgraph that
    /// contain a cycle (size > 1, or a self-loop).
    ///
    /// Iterative Tarjan: explicit work stack, `index`/`lowlink` per node and an
    /// on-stack mark. Each cycle is sorted by node index, and cycles are
    /// ordered by their smallest member.
    pub fn dependency_cycles(&self) -> Vec<Vec<NodeIndex>> {
        let n = self.nodes.len();
        let mut succ: Vec<Vec<usize>> = vec![Vec::new(); n];
        for edge in self.edges.iter().filter(|e| e.kind.is_dependency()) {
            succ[edge.source.0].push(edge.target.0);
        }

        let mut index: Vec<Option<usize>> = vec![None; n];
        let mut lowlink = vec![0usize; n];
        let mut on_stack = vec![false; n];
        let mut stack: Vec<usize> = Vec::new();
        let mut next = 0usize;
        let mut cycles = Vec::new();

        for root in 0..n {
            if index[root].is_some() {
                continue;
            }

            index[root] = Some(next);
            lowlink[root] = next;
            next += 1;
            stack.push(root);
            on_stack[root] = true;
            let mut work: Vec<(usize, usize)> = vec![(root, 0)];

            while let Some(&(v, pos)) = work.last() {
                if let Some(&w) = succ[v].get(pos) {
                    if let Some(top) = work.last_mut() {
                        top.1 += 1;
                    }
                    match index[w] {
                        None => {
                            index[w] = Some(next);
                            lowlink[w] = next;
                            next += 1;
                            stack.push(w);
                            on_stack[w] = true;
                            work.push((w, 0));
                        }
                        Some(wi) if on_stack[w] => {
                            lowlink[v] = lowlink[v].min(wi);
                        }
                        Some(_) => {}
                    }
                    continue;
                }

                work.pop();
                if let Some(&(parent, _)) = work.last() {
                    lowlink[parent] = lowlink[parent].min(lowlink[v]);
                }

                if index[v] == Some(lowlink[v]) {
                    let mut members = Vec::new();
                    while let Some(w) = stack.pop() {
                        on_stack[w] = false;
                        members.push(NodeIndex(w));
                        if w == v {
                            break;
                        }
                    }
                    if members.len() > 1 || succ[v].contains(&v) {
                        members.sort();
                        cycles.push(members);
                    }
                }
            }
        }

        cycles.sort();
        cycles
    }

    pub fn has_dependency_cycle(&self) -> bool {
        !self.dependency_cycles().is_empty()
    }
}

#[derive(Default)]
struct GraphBuilder<'p> {
    nodes: Vec<Node<'p>>,
    edges: Vec<Edge<'p>>,
    outgoing: Vec<Vec<EdgeIndex>>,
    incoming: Vec<Vec<EdgeIndex>>,
    components: BTreeMap<&'p str, NodeIndex>,
}

impl<'p> GraphBuilder<'p> {
    fn push_node(&mut self, node: Node<'p>) -> NodeIndex {
        self.nodes.push(node);
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
        NodeIndex(self.nodes.len() - 1)
    }

    fn push_edge(&mut self, edge: Edge<'p>) {
        let idx = EdgeIndex(self.edges.len());
        self.outgoing[edge.source.0].push(idx);
        self.incoming[edge.target.0].push(idx);
        self.edges.push(edge);
    }

    fn resolve(
        &self,
        id: &str,
        referenced_by: impl FnOnce() -> String,
    ) -> Result<NodeIndex, StructuralError> {
        self.components
            .get(id)
            .copied()
            .ok_or_else(|| StructuralError::UnknownComponent {
                referenced_by: referenced_by(),
                id: id.to_string(),
            })
    }
}
