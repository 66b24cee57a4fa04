use crate::capabilities::Capabilities;
use crate::validation::{FieldState, FormScopeId, Summary};
use pages_schema::{BlockPath, HeadlineLevel, Id};
use serde::Serialize;
use serde_json::Value;

/// Rendered node, one per block (plus placeholders for unsettled sources)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RenderNode {
    Headline {
        path: BlockPath,
        level: HeadlineLevel,
        label: String,
    },

    Text {
        path: BlockPath,
        content: String,
    },

    Card {
        path: BlockPath,
        children: Vec<RenderNode>,
    },

    /// Query whose source is ready
    Query {
        path: BlockPath,
        id: Id,
        children: Vec<RenderNode>,
    },

    /// Data block and the value it publishes
    Data {
        path: BlockPath,
        id: Id,
        value: Value,
    },

    Form {
        path: BlockPath,
        scope: FormScopeId,
        trigger: TriggerNode,
        children: Vec<RenderNode>,
        /// Present only when validation is surfaced (live mode)
        #[serde(skip_serializing_if = "Option::is_none")]
        summary: Option<Summary>,
    },

    Field {
        path: BlockPath,
        id: Id,
        #[serde(rename = "fieldType")]
        field_type: &'static str,
        label: String,
        value: Value,
        required: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        validity: Option<FieldState>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        options: Vec<String>,
    },

    /// Placeholder while a source is pending
    Loading { path: BlockPath, source: Id },

    /// Inline error (shows errors in place instead of failing the page)
    Error {
        path: BlockPath,
        #[serde(rename = "errorKind")]
        error_kind: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        source: Option<Id>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerNode {
    pub label: String,
    pub disabled: bool,
    /// The trigger renders but firing it executes nothing
    pub inert: bool,
}

impl RenderNode {
    pub fn error(path: BlockPath, kind: impl Into<String>, message: impl Into<String>) -> Self {
        RenderNode::Error {
            path,
            error_kind: kind.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn path(&self) -> &BlockPath {
        match self {
            RenderNode::Headline { path, .. }
            | RenderNode::Text { path, .. }
            | RenderNode::Card { path, .. }
            | RenderNode::Query { path, .. }
            | RenderNode::Data { path, .. }
            | RenderNode::Form { path, .. }
            | RenderNode::Field { path, .. }
            | RenderNode::Loading { path, .. }
            | RenderNode::Error { path, .. } => path,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RenderNode::Headline { .. } => "headline",
            RenderNode::Text { .. } => "text",
            RenderNode::Card { .. } => "card",
            RenderNode::Query { .. } => "query",
            RenderNode::Data { .. } => "data",
            RenderNode::Form { .. } => "form",
            RenderNode::Field { .. } => "field",
            RenderNode::Loading { .. } => "loading",
            RenderNode::Error { .. } => "error",
        }
    }

    pub fn children(&self) -> &[RenderNode] {
        match self {
            RenderNode::Card { children, .. }
            | RenderNode::Query { children, .. }
            | RenderNode::Form { children, .. } => children,
            _ => &[],
        }
    }

    fn children_mut(&mut self) -> Option<&mut Vec<RenderNode>> {
        match self {
            RenderNode::Card { children, .. }
            | RenderNode::Query { children, .. }
            | RenderNode::Form { children, .. } => Some(children),
            _ => None,
        }
    }

    /// Number of nodes in this subtree, this one included
    pub fn count(&self) -> usize {
        1 + self.children().iter().map(RenderNode::count).sum::<usize>()
    }
}

/// Output of a render pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderTree {
    pub capabilities: Capabilities,
    pub nodes: Vec<RenderNode>,
}

impl RenderTree {
    pub fn new(capabilities: Capabilities, nodes: Vec<RenderNode>) -> Self {
        Self { capabilities, nodes }
    }

    pub fn count(&self) -> usize {
        self.nodes.iter().map(RenderNode::count).sum()
    }

    pub fn find(&self, path: &BlockPath) -> Option<&RenderNode> {
        find_in(&self.nodes, path)
    }

    pub fn find_mut(&mut self, path: &BlockPath) -> Option<&mut RenderNode> {
        find_in_mut(&mut self.nodes, path)
    }

    /// Swap in a freshly rendered subtree. False if no node sits at its path.
    pub fn replace(&mut self, node: RenderNode) -> bool {
        match self.find_mut(node.path()) {
            Some(slot) => {
                *slot = node;
                true
            }
            None => false,
        }
    }

    pub fn walk<F: FnMut(&RenderNode)>(&self, mut f: F) {
        fn visit<F: FnMut(&RenderNode)>(nodes: &[RenderNode], f: &mut F) {
            for node in nodes {
                f(node);
                visit(node.children(), f);
            }
        }
        visit(&self.nodes, &mut f);
    }
}

// Node paths are block paths, but a pending query shows a Loading node in place
// of its children, so lookups match on the node's path rather than indexing.
fn find_in<'a>(nodes: &'a [RenderNode], path: &BlockPath) -> Option<&'a RenderNode> {
    for node in nodes {
        if node.path() == path {
            return Some(node);
        }
        if path.starts_with(node.path()) {
            return find_in(node.children(), path);
        }
    }
    None
}

fn find_in_mut<'a>(nodes: &'a mut [RenderNode], path: &BlockPath) -> Option<&'a mut RenderNode> {
    for node in nodes.iter_mut() {
        if node.path() == path {
            return Some(node);
        }
        if path.starts_with(node.path()) {
            return node
                .children_mut()
                .and_then(|children| find_in_mut(children, path));
        }
    }
    None
}
