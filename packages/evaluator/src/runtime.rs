//! # Page Runtime
//!
//! Owns one loaded page: the document, its resolution context and validation
//! registry, the rendered tree and the map from source ids to the blocks that
//! read them.
//!
//! Publishing a source only queues the ids whose subscribers fired;
//! [`PageRuntime::flush`] then re-renders exactly the dependent subtrees and
//! leaves their siblings untouched.

use crate::capabilities::Capabilities;
use crate::executor::{ExecutionContext, MutationClient, MutationExecutor, MutationOutcome};
use crate::resolver::{QueryRequest, ResolutionContext, SourceState, SubscriptionId};
use crate::template::TemplateParams;
use crate::validation::{validate_field, FieldState, FormScopeId, ValidationAggregator};
use crate::vdom::{RenderNode, RenderTree};
use crate::walker::{MountedField, RenderEffects, Walker};
use pages_common::find_block;
use pages_schema::{Block, BlockPath, Id, MutationDescriptor, PageDocument};
use serde::Serialize;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use thiserror::Error;
use tracing::{debug, info, instrument};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("No field is mounted at {0}")]
    NotAField(BlockPath),

    #[error("No form is mounted at {0}")]
    NotAForm(BlockPath),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderStats {
    pub full_renders: usize,
    pub subtree_renders: usize,
    /// Subtrees re-rendered by the last flush
    pub last_flushed: Vec<BlockPath>,
}

/// Everything needed to execute one form's mutation, detached from the runtime
#[derive(Debug, Clone)]
pub struct Submission {
    pub form: BlockPath,
    pub descriptor: MutationDescriptor,
    pub scope: FormScopeId,
    pub values: BTreeMap<Id, Value>,
    validation: ValidationAggregator,
    params: TemplateParams,
    enabled: bool,
}

impl Submission {
    pub fn context(&self) -> ExecutionContext<'_> {
        ExecutionContext {
            scope: &self.scope,
            validation: &self.validation,
            params: &self.params,
            enabled: self.enabled,
        }
    }

    pub async fn execute<C: MutationClient>(&self, executor: &MutationExecutor<C>) -> MutationOutcome {
        executor
            .execute(&self.descriptor, &self.values, self.context())
            .await
    }
}

pub struct PageRuntime {
    document: PageDocument,
    sources: ResolutionContext,
    validation: ValidationAggregator,
    params: TemplateParams,
    capabilities: Capabilities,
    tree: RenderTree,
    dependencies: BTreeMap<Id, BTreeSet<BlockPath>>,
    fields: BTreeMap<BlockPath, MountedField>,
    scopes: BTreeMap<BlockPath, FormScopeId>,
    invalidated: Rc<RefCell<BTreeSet<Id>>>,
    subscriptions: BTreeMap<Id, SubscriptionId>,
    stats: RenderStats,
}

impl PageRuntime {
    pub fn new(document: PageDocument, params: TemplateParams, capabilities: Capabilities) -> Self {
        Self {
            document,
            sources: ResolutionContext::new(),
            validation: ValidationAggregator::new(),
            params,
            capabilities,
            tree: RenderTree::new(capabilities, Vec::new()),
            dependencies: BTreeMap::new(),
            fields: BTreeMap::new(),
            scopes: BTreeMap::new(),
            invalidated: Rc::new(RefCell::new(BTreeSet::new())),
            subscriptions: BTreeMap::new(),
            stats: RenderStats::default(),
        }
    }

    pub fn document(&self) -> &PageDocument {
        &self.document
    }

    pub fn tree(&self) -> &RenderTree {
        &self.tree
    }

    pub fn validation(&self) -> &ValidationAggregator {
        &self.validation
    }

    pub fn sources(&self) -> &ResolutionContext {
        &self.sources
    }

    pub fn params(&self) -> &TemplateParams {
        &self.params
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn stats(&self) -> &RenderStats {
        &self.stats
    }

    /// Blocks that read `id`, in document order
    pub fn dependents(&self, id: &Id) -> Vec<&BlockPath> {
        self.dependencies
            .get(id)
            .map(|paths| paths.iter().collect())
            .unwrap_or_default()
    }

    /// Ids published since the last flush that have dependents
    pub fn pending_invalidations(&self) -> Vec<Id> {
        self.invalidated.borrow().iter().cloned().collect()
    }

    /// Query requests the host still has to fetch
    pub fn take_query_requests(&mut self) -> Vec<QueryRequest> {
        self.sources.take_requests()
    }

    /// Full render pass over the whole document
    #[instrument(skip(self))]
    pub fn render(&mut self) -> &RenderTree {
        self.sources.clear_derived();

        let mut walker = Walker::new(
            &mut self.sources,
            &self.validation,
            &self.params,
            self.capabilities,
        );
        let nodes = walker.render_document(&self.document);
        let effects = walker.into_effects();

        let old_fields = std::mem::take(&mut self.fields);
        let old_scopes = std::mem::take(&mut self.scopes);
        self.dependencies.clear();
        self.apply_effects(effects);
        self.release_unmounted(old_fields, old_scopes);

        self.tree = RenderTree::new(self.capabilities, nodes);
        self.invalidated.borrow_mut().clear();
        self.sync_subscriptions();
        self.stats.full_renders += 1;

        info!(nodes = self.tree.count(), "Page rendered");
        &self.tree
    }

    /// Publish an external source's state. Dependent blocks re-render on the next flush.
    pub fn publish(&mut self, id: Id, state: SourceState) {
        self.sources.publish(id, state);
    }

    /// Re-render every subtree that depends on a source published since the last flush.
    ///
    /// Returns the paths that were re-rendered.
    #[instrument(skip(self))]
    pub fn flush(&mut self) -> Vec<BlockPath> {
        let ids = std::mem::take(&mut *self.invalidated.borrow_mut());
        if ids.is_empty() {
            return Vec::new();
        }

        let affected: BTreeSet<BlockPath> = ids
            .iter()
            .filter_map(|id| self.dependencies.get(id))
            .flatten()
            .cloned()
            .collect();

        // Ancestors sort before their descendants, so keeping only paths with no
        // kept prefix leaves the outermost subtrees.
        let mut roots: Vec<BlockPath> = Vec::new();
        for path in affected {
            if !roots.iter().any(|root| path.starts_with(root)) {
                roots.push(path);
            }
        }

        for path in &roots {
            self.rerender_subtree(path);
        }

        self.sync_forms();
        self.sync_subscriptions();
        self.stats.subtree_renders += roots.len();
        self.stats.last_flushed = roots.clone();

        debug!(ids = ids.len(), subtrees = roots.len(), "Flushed invalidated subtrees");
        roots
    }

    fn rerender_subtree(&mut self, path: &BlockPath) {
        for paths in self.dependencies.values_mut() {
            paths.retain(|dependent| !dependent.starts_with(path));
        }
        self.dependencies.retain(|_, paths| !paths.is_empty());

        let old_fields = split_under(&mut self.fields, path);
        let old_scopes = split_under(&mut self.scopes, path);

        let mut walker = Walker::new(
            &mut self.sources,
            &self.validation,
            &self.params,
            self.capabilities,
        );
        let node = walker.render_at(&self.document, path);
        let effects = walker.into_effects();

        self.apply_effects(effects);
        self.release_unmounted(old_fields, old_scopes);
        self.tree.replace(node);
    }

    fn apply_effects(&mut self, effects: RenderEffects) {
        for (id, path) in effects.dependencies {
            self.dependencies.entry(id).or_default().insert(path);
        }
        for field in effects.fields {
            self.fields.insert(field.path.clone(), field);
        }
        for (path, scope) in effects.scopes {
            self.scopes.insert(path, scope);
        }
    }

    /// Retract fields and unmount scopes that were not mounted again
    fn release_unmounted(
        &mut self,
        old_fields: BTreeMap<BlockPath, MountedField>,
        old_scopes: BTreeMap<BlockPath, FormScopeId>,
    ) {
        for (path, field) in old_fields {
            let remounted = self
                .fields
                .values()
                .any(|mounted| mounted.scope == field.scope && mounted.id == field.id);
            if !remounted {
                debug!(path = %path, field = %field.id, "Retracting field");
                self.validation.report(&field.scope, &field.id, None);
            }
        }
        for (path, scope) in old_scopes {
            if self.scopes.get(&path) != Some(&scope) {
                self.validation.unmount_scope(&scope);
            }
        }
    }

    fn sync_subscriptions(&mut self) {
        let stale: Vec<Id> = self
            .subscriptions
            .keys()
            .filter(|id| !self.dependencies.contains_key(*id))
            .cloned()
            .collect();
        for id in stale {
            if let Some(subscription) = self.subscriptions.remove(&id) {
                self.sources.unsubscribe(subscription);
            }
        }

        for id in self.dependencies.keys() {
            if self.subscriptions.contains_key(id) {
                continue;
            }
            let queue = Rc::clone(&self.invalidated);
            let subscription = self.sources.subscribe(id, move |id, _state| {
                queue.borrow_mut().insert(id.clone());
            });
            self.subscriptions.insert(id.clone(), subscription);
        }
    }

    /// Refresh every form node's summary and trigger from the registry
    pub fn sync_forms(&mut self) {
        let surface = self.capabilities.surface_validation();
        for (path, scope) in &self.scopes {
            if let Some(RenderNode::Form {
                summary, trigger, ..
            }) = self.tree.find_mut(path)
            {
                let current = self.validation.summarize(scope);
                trigger.disabled = (surface && !current.is_valid) || self.validation.is_in_flight(scope);
                *summary = surface.then_some(current);
            }
        }
    }

    /// Set a field's value, validate it and report into its scope
    #[instrument(skip(self, value))]
    pub fn set_field_value(&mut self, path: &BlockPath, value: Value) -> RuntimeResult<FieldState> {
        let mounted = self
            .fields
            .get(path)
            .ok_or_else(|| RuntimeError::NotAField(path.clone()))?;
        let field = find_block(&self.document, path)
            .and_then(Block::as_field)
            .ok_or_else(|| RuntimeError::NotAField(path.clone()))?;

        let state = validate_field(field, &value);
        self.validation.set_value(&mounted.scope, &mounted.id, value.clone());
        self.validation
            .report(&mounted.scope, &mounted.id, Some(state.clone()));

        let surface = self.capabilities.surface_validation();
        if let Some(RenderNode::Field {
            value: shown,
            validity,
            ..
        }) = self.tree.find_mut(path)
        {
            *shown = value;
            *validity = surface.then(|| state.clone());
        }

        self.sync_forms();
        Ok(state)
    }

    /// Current field values of the form at `form`
    pub fn form_values(&self, form: &BlockPath) -> RuntimeResult<BTreeMap<Id, Value>> {
        let scope = self
            .scopes
            .get(form)
            .ok_or_else(|| RuntimeError::NotAForm(form.clone()))?;
        Ok(self.validation.values(scope))
    }

    /// Snapshot what executing the form at `form` needs.
    ///
    /// The snapshot does not borrow the runtime, so the page can keep changing
    /// while the mutation is in flight.
    pub fn submission(&self, form: &BlockPath) -> RuntimeResult<Submission> {
        let scope = self
            .scopes
            .get(form)
            .ok_or_else(|| RuntimeError::NotAForm(form.clone()))?;
        let descriptor = match find_block(&self.document, form) {
            Some(Block::Form(block)) => block.mutation.clone(),
            _ => return Err(RuntimeError::NotAForm(form.clone())),
        };

        Ok(Submission {
            form: form.clone(),
            descriptor,
            scope: scope.clone(),
            values: self.validation.values(scope),
            validation: self.validation.clone(),
            params: self.params.clone(),
            enabled: self.capabilities.execute_mutations(),
        })
    }

    /// Load a new document and render it. Every form scope is discarded.
    pub fn replace_document(&mut self, document: PageDocument) -> &RenderTree {
        self.load_document(document);
        self.render()
    }

    /// Load a new document without rendering it; the tree stays empty until
    /// the next [`PageRuntime::render`].
    pub fn load_document(&mut self, document: PageDocument) {
        self.document = document;
        self.clear_rendered();
    }

    pub fn set_capabilities(&mut self, capabilities: Capabilities) -> &RenderTree {
        self.capabilities = capabilities;
        self.render()
    }

    /// Switch capabilities and stop rendering: the tree is emptied, every form
    /// scope is discarded and no block stays subscribed to a source.
    pub fn suspend(&mut self, capabilities: Capabilities) {
        self.capabilities = capabilities;
        self.clear_rendered();
        debug!("Rendering suspended");
    }

    fn clear_rendered(&mut self) {
        self.validation.reset();
        self.fields.clear();
        self.scopes.clear();
        self.dependencies.clear();
        self.invalidated.borrow_mut().clear();
        self.sync_subscriptions();
        self.tree = RenderTree::new(self.capabilities, Vec::new());
    }
}

/// Remove and return every entry whose path lies under `root` (inclusive)
fn split_under<T>(map: &mut BTreeMap<BlockPath, T>, root: &BlockPath) -> BTreeMap<BlockPath, T> {
    let keys: Vec<BlockPath> = map
        .range(root.clone()..)
        .map(|(path, _)| path)
        .take_while(|path| path.starts_with(root))
        .cloned()
        .collect();

    keys.into_iter()
        .filter_map(|path| map.remove(&path).map(|value| (path, value)))
        .collect()
}
