//! # Pages Evaluator
//!
//! Renders a [`pages_schema::PageDocument`] into a tree of [`RenderNode`]s.
//!
//! - [`resolver`]: dynamic values and the sources they point at
//! - [`validation`]: per-form validity registry
//! - [`walker`]: block tree traversal
//! - [`executor`]: form mutations
//! - [`runtime`]: one loaded page, with incremental re-render on publish

pub mod capabilities;
pub mod executor;
pub mod resolver;
pub mod runtime;
pub mod template;
pub mod validation;
pub mod vdom;
pub mod walker;

pub use capabilities::{Capabilities, Mode};
pub use executor::{
    BodyMapper, DeclarativeBodyMapper, ExecutionContext, MutationClient, MutationExecutor,
    MutationFailure, MutationOutcome, MutationRequest,
};
pub use resolver::{
    resolve, resolve_declared, resolve_from, QueryRequest, Resolved, ResolutionContext,
    ResolutionError, SourceState, SubscriptionId,
};
pub use runtime::{PageRuntime, RenderStats, RuntimeError, RuntimeResult, Submission};
pub use template::{expand_template, TemplateError, TemplateParams};
pub use validation::{
    empty_value, validate_field, FieldState, FormScopeId, Summary, ValidationAggregator,
};
pub use vdom::{RenderNode, RenderTree, TriggerNode};
pub use walker::{form_scope_key, MountedField, RenderEffects, Walker};
