//! # Block Walker
//!
//! Recursive traversal of the block tree into [`RenderNode`]s.
//!
//! The walker holds no business state of its own. The resolution context and
//! the validation aggregator are borrowed for the pass; the current form scope
//! is the only thing that changes as the walk descends.
//!
//! Every side effect a render has on the page (which sources a block read,
//! which fields and form scopes it mounted) is recorded in [`RenderEffects`]
//! so the runtime can subscribe, retract and unmount afterwards.
//!
//! Every `data` block is declared before the walk starts, including blocks
//! nested in a query that has not settled. A reference to one of them then
//! follows through to the query and reads as pending, not unresolved.

use crate::capabilities::Capabilities;
use crate::resolver::{
    resolve_declared, resolve_from, QueryRequest, Resolved, ResolutionContext, ResolutionError,
    SourceState,
};
use crate::template::{expand_template, TemplateParams};
use crate::validation::{
    empty_value, validate_field, FieldState, FormScopeId, ValidationAggregator,
};
use crate::vdom::{RenderNode, TriggerNode};
use pages_common::{find_block, BlockIndex};
use pages_schema::*;
use tracing::{debug, instrument, trace, warn};

/// Field block mounted during a render
#[derive(Debug, Clone, PartialEq)]
pub struct MountedField {
    pub path: BlockPath,
    pub scope: FormScopeId,
    pub id: Id,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderEffects {
    /// Every `(source id, block path)` pair a block resolved through
    pub dependencies: Vec<(Id, BlockPath)>,
    pub fields: Vec<MountedField>,
    /// Form scopes mounted, keyed by the form's path
    pub scopes: Vec<(BlockPath, FormScopeId)>,
}

/// Scope key of the form at `path`
pub fn form_scope_key(path: &BlockPath) -> String {
    format!("form@{}", path.to_dotted())
}

pub struct Walker<'a> {
    sources: &'a mut ResolutionContext,
    validation: &'a ValidationAggregator,
    params: &'a TemplateParams,
    capabilities: Capabilities,
    scope: FormScopeId,
    effects: RenderEffects,
}

impl<'a> Walker<'a> {
    pub fn new(
        sources: &'a mut ResolutionContext,
        validation: &'a ValidationAggregator,
        params: &'a TemplateParams,
        capabilities: Capabilities,
    ) -> Self {
        Self {
            sources,
            validation,
            params,
            capabilities,
            scope: FormScopeId::page(),
            effects: RenderEffects::default(),
        }
    }

    pub fn effects(&self) -> &RenderEffects {
        &self.effects
    }

    pub fn into_effects(self) -> RenderEffects {
        self.effects
    }

    #[instrument(skip(self, doc), fields(blocks = doc.blocks.len()))]
    pub fn render_document(&mut self, doc: &PageDocument) -> Vec<RenderNode> {
        self.declare_sources(doc);
        let nodes = self.render(&doc.blocks, &BlockPath::root());
        debug!(
            nodes = nodes.len(),
            dependencies = self.effects.dependencies.len(),
            fields = self.effects.fields.len(),
            "Rendered document"
        );
        nodes
    }

    /// Declare every `data` block of `doc` as a derived source.
    ///
    /// [`Walker::render_at`] relies on the declarations of the last full render.
    pub fn declare_sources(&mut self, doc: &PageDocument) {
        let index = BlockIndex::build(doc);
        for path in index.declarations.values() {
            if let Some(Block::Data(data)) = find_block(doc, path) {
                self.sources
                    .define(data.id.clone(), data.value.clone(), Some(path.clone()));
            }
        }
    }

    /// Render a block list whose parent sits at `parent`
    pub fn render(&mut self, blocks: &[Block], parent: &BlockPath) -> Vec<RenderNode> {
        blocks
            .iter()
            .enumerate()
            .map(|(index, block)| self.render_block(block, &parent.child(index)))
            .collect()
    }

    /// Re-render the single subtree at `path`.
    ///
    /// The form scope chain is rebuilt from the ancestors on the path, so a
    /// field re-rendered on its own still reports into its enclosing form.
    #[instrument(skip(self, doc))]
    pub fn render_at(&mut self, doc: &PageDocument, path: &BlockPath) -> RenderNode {
        let Some(block) = find_block(doc, path) else {
            warn!("No block to re-render");
            return RenderNode::error(path.clone(), "not-found", format!("No block at {}", path));
        };

        let outer = std::mem::replace(&mut self.scope, FormScopeId::page());
        for depth in 1..path.depth() {
            let ancestor = BlockPath::from_indices(path.indices()[..depth].to_vec());
            if let Some(Block::Form(_)) = find_block(doc, &ancestor) {
                self.scope = self.validation.mount_scope(&form_scope_key(&ancestor));
            }
        }

        let node = self.render_block(block, path);
        self.scope = outer;
        node
    }

    pub fn render_block(&mut self, block: &Block, path: &BlockPath) -> RenderNode {
        trace!(path = %path, block_type = block.type_name(), "Rendering block");

        match block {
            Block::Headline(headline) => RenderNode::Headline {
                path: path.clone(),
                level: headline.level,
                label: headline.label.clone(),
            },
            Block::Text(text) => RenderNode::Text {
                path: path.clone(),
                content: text.content.clone(),
            },
            Block::Card(card) => RenderNode::Card {
                path: path.clone(),
                children: self.render(&card.blocks, path),
            },
            Block::Query(query) => self.render_query(query, path),
            Block::Data(data) => self.render_data(data, path),
            Block::Form(form) => self.render_form(form, path),
            Block::StringInput(input) => self.render_field(FieldRef::String(input), path),
            Block::NumberInput(input) => self.render_field(FieldRef::Number(input), path),
            Block::Checkbox(input) => self.render_field(FieldRef::Checkbox(input), path),
            Block::Select(input) => self.render_field(FieldRef::Select(input), path),
        }
    }

    fn render_query(&mut self, query: &Query, path: &BlockPath) -> RenderNode {
        let params = self.params;
        let endpoint = match expand_template(&query.endpoint, |name| params.get(name).cloned()) {
            Ok(endpoint) => endpoint,
            Err(err) => return RenderNode::error(path.clone(), "template", err.to_string()),
        };

        let request = QueryRequest {
            id: query.id.clone(),
            endpoint,
        };
        let state = self.sources.request(request, path);
        self.record_dependency(query.id.clone(), path);

        match state {
            SourceState::Pending => RenderNode::Loading {
                path: path.clone(),
                source: query.id.clone(),
            },
            SourceState::Failed(message) => RenderNode::Error {
                path: path.clone(),
                error_kind: "source-failed".to_string(),
                message,
                source: Some(query.id.clone()),
            },
            SourceState::Ready(_) => RenderNode::Query {
                path: path.clone(),
                id: query.id.clone(),
                children: self.render(&query.blocks, path),
            },
        }
    }

    fn render_data(&mut self, data: &Data, path: &BlockPath) -> RenderNode {
        let mut touched = Vec::new();
        let resolved = resolve_declared(&data.id, self.sources, &mut touched);
        self.record_dependencies(touched, path);

        match resolved {
            Ok(Resolved::Value(value)) => RenderNode::Data {
                path: path.clone(),
                id: data.id.clone(),
                value,
            },
            Ok(Resolved::Pending { source }) => RenderNode::Loading {
                path: path.clone(),
                source,
            },
            Err(err) => resolution_error_node(path, err),
        }
    }

    fn render_form(&mut self, form: &Form, path: &BlockPath) -> RenderNode {
        let scope = self.validation.mount_scope(&form_scope_key(path));
        self.effects.scopes.push((path.clone(), scope.clone()));

        let outer = std::mem::replace(&mut self.scope, scope.clone());
        let children = self.render(&form.blocks, path);
        self.scope = outer;

        let summary = self
            .capabilities
            .surface_validation()
            .then(|| self.validation.summarize(&scope));
        let blocked = summary.as_ref().map_or(false, |summary| !summary.is_valid);

        RenderNode::Form {
            path: path.clone(),
            trigger: TriggerNode {
                label: form.trigger.label().to_string(),
                disabled: blocked || self.validation.is_in_flight(&scope),
                inert: !self.capabilities.execute_mutations(),
            },
            scope,
            children,
            summary,
        }
    }

    fn render_field(&mut self, field: FieldRef<'_>, path: &BlockPath) -> RenderNode {
        let id = field.id();

        let value = match self.validation.value(&self.scope, id) {
            Some(value) => value,
            None => match field.default_value() {
                None => empty_value(field),
                Some(default) => {
                    let mut touched = Vec::new();
                    let resolved = resolve_from(default, self.sources, path, &mut touched);
                    self.record_dependencies(touched, path);
                    match resolved {
                        Ok(Resolved::Value(value)) => value,
                        Ok(Resolved::Pending { source }) => {
                            let state = FieldState::invalid(format!("Waiting for \"{}\"", source));
                            self.mount_field(id, path, state);
                            return RenderNode::Loading {
                                path: path.clone(),
                                source,
                            };
                        }
                        Err(err) => {
                            self.mount_field(id, path, FieldState::invalid(err.to_string()));
                            return resolution_error_node(path, err);
                        }
                    }
                }
            },
        };

        let state = validate_field(field, &value);
        self.validation.set_value(&self.scope, id, value.clone());
        self.mount_field(id, path, state.clone());

        let options = match field {
            FieldRef::Select(select) => select.options.clone(),
            _ => Vec::new(),
        };

        RenderNode::Field {
            path: path.clone(),
            id: id.clone(),
            field_type: field.type_name(),
            label: field.label().to_string(),
            value,
            required: field.required(),
            validity: self.capabilities.surface_validation().then_some(state),
            options,
        }
    }

    /// Report a field into the current scope and record it as mounted.
    ///
    /// A field whose default has not resolved is mounted invalid, so its form
    /// cannot submit without it.
    fn mount_field(&mut self, id: &Id, path: &BlockPath, state: FieldState) {
        self.validation.report(&self.scope, id, Some(state));
        self.effects.fields.push(MountedField {
            path: path.clone(),
            scope: self.scope.clone(),
            id: id.clone(),
        });
    }

    fn record_dependency(&mut self, id: Id, path: &BlockPath) {
        self.effects.dependencies.push((id, path.clone()));
    }

    fn record_dependencies(&mut self, ids: Vec<Id>, path: &BlockPath) {
        for id in ids {
            self.record_dependency(id, path);
        }
    }
}

fn resolution_error_node(path: &BlockPath, err: ResolutionError) -> RenderNode {
    RenderNode::Error {
        path: path.clone(),
        error_kind: err.kind().to_string(),
        message: err.to_string(),
        source: Some(err.origin().clone()),
    }
}
