//! # Mutation Executor
//!
//! Turns a form's [`MutationDescriptor`] plus the form's current values into a
//! [`MutationRequest`] and hands it to a [`MutationClient`].
//!
//! Nothing reaches the client unless execution is enabled, the scope is idle
//! and the scope's summary is valid. A response that arrives after the form
//! unmounted is discarded without touching any state.

use crate::template::{expand_template, scalar_to_string, TemplateError, TemplateParams};
use crate::validation::{FormScopeId, ValidationAggregator};
use async_trait::async_trait;
use pages_schema::{BodyMapping, BodySource, HttpMethod, Id, MutationDescriptor};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::rc::Rc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Wire-level description of one mutation call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MutationRequest {
    pub method: HttpMethod,
    pub endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MutationFailure {
    #[error("Endpoint template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Request body error: {message}")]
    Body { message: String },

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Rejected with status {status}: {message}")]
    Rejected {
        status: u16,
        message: String,
        body: Option<Value>,
    },
}

impl MutationFailure {
    pub fn body(message: impl Into<String>) -> Self {
        MutationFailure::Body {
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        MutationFailure::Network {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    Submitted {
        request: MutationRequest,
        response: Value,
    },
    /// The scope's summary is invalid; the client was never called
    ValidationBlocked { missing_fields: Vec<Id> },
    Failed {
        request: Option<MutationRequest>,
        failure: MutationFailure,
    },
    /// Execution is disabled (edit mode); carries the request that would have been sent
    Inert { request: Option<MutationRequest> },
    /// A submission for this scope is already in flight
    Busy,
    /// The form unmounted before the response arrived
    Discarded,
}

impl MutationOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            MutationOutcome::Submitted { .. } => "submitted",
            MutationOutcome::ValidationBlocked { .. } => "validation-blocked",
            MutationOutcome::Failed { .. } => "failed",
            MutationOutcome::Inert { .. } => "inert",
            MutationOutcome::Busy => "busy",
            MutationOutcome::Discarded => "discarded",
        }
    }

    pub fn is_submitted(&self) -> bool {
        matches!(self, MutationOutcome::Submitted { .. })
    }
}

/// Performs the actual request (HTTP in the CLI, fakes in tests)
#[async_trait(?Send)]
pub trait MutationClient {
    async fn submit(&self, request: &MutationRequest) -> Result<Value, MutationFailure>;
}

#[async_trait(?Send)]
impl<T: MutationClient + ?Sized> MutationClient for Rc<T> {
    async fn submit(&self, request: &MutationRequest) -> Result<Value, MutationFailure> {
        (**self).submit(request).await
    }
}

/// Rule that builds a request body from form values. Must be deterministic.
pub trait BodyMapper {
    fn map(
        &self,
        mapping: &BodyMapping,
        values: &BTreeMap<Id, Value>,
        params: &TemplateParams,
    ) -> Result<Option<Value>, MutationFailure>;
}

/// Default [`BodyMapper`] implementing the document's `body` grammar
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclarativeBodyMapper;

impl BodyMapper for DeclarativeBodyMapper {
    fn map(
        &self,
        mapping: &BodyMapping,
        values: &BTreeMap<Id, Value>,
        params: &TemplateParams,
    ) -> Result<Option<Value>, MutationFailure> {
        match mapping {
            BodyMapping::Empty => Ok(None),
            BodyMapping::FormValues => Ok(Some(Value::Object(
                values
                    .iter()
                    .map(|(id, value)| (id.to_string(), value.clone()))
                    .collect(),
            ))),
            BodyMapping::Object { entries } => {
                let mut body = Map::new();
                for entry in entries {
                    let value = match &entry.value {
                        BodySource::Field(id) => values.get(id).cloned().unwrap_or(Value::Null),
                        BodySource::Param(name) => params
                            .get(name)
                            .map(|param| Value::String(param.clone()))
                            .ok_or_else(|| {
                                MutationFailure::body(format!("No page parameter named \"{}\"", name))
                            })?,
                        BodySource::Literal(value) => value.clone(),
                    };
                    insert_dotted(&mut body, &entry.key, value)?;
                }
                Ok(Some(Value::Object(body)))
            }
        }
    }
}

fn insert_dotted(target: &mut Map<String, Value>, key: &str, value: Value) -> Result<(), MutationFailure> {
    let segments: Vec<&str> = key.split('.').collect();
    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(MutationFailure::body(format!("Invalid body key \"{}\"", key)));
    }

    let (last, parents) = match segments.split_last() {
        Some(split) => split,
        None => return Err(MutationFailure::body("Empty body key")),
    };

    let mut current = target;
    for segment in parents {
        let slot = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        current = match slot {
            Value::Object(map) => map,
            _ => {
                return Err(MutationFailure::body(format!(
                    "Body key \"{}\" conflicts with a value at \"{}\"",
                    key, segment
                )))
            }
        };
    }

    if current.contains_key(*last) {
        return Err(MutationFailure::body(format!("Body key \"{}\" is set twice", key)));
    }
    current.insert(last.to_string(), value);
    Ok(())
}

/// Percent-encode `value` so it cannot add segments, a query or a fragment
fn path_segment(value: &str) -> String {
    let encoded = urlencoding::encode(value);
    if !encoded.is_empty() && encoded.chars().all(|c| c == '.') {
        encoded.replace('.', "%2E")
    } else {
        encoded.into_owned()
    }
}

/// Everything the executor reads besides the descriptor and the values
#[derive(Debug, Clone, Copy)]
pub struct ExecutionContext<'a> {
    pub scope: &'a FormScopeId,
    pub validation: &'a ValidationAggregator,
    pub params: &'a TemplateParams,
    /// False outside live mode
    pub enabled: bool,
}

pub struct MutationExecutor<C> {
    client: C,
    mapper: Box<dyn BodyMapper>,
}

impl<C: MutationClient> MutationExecutor<C> {
    pub fn new(client: C) -> Self {
        Self::with_mapper(client, DeclarativeBodyMapper)
    }

    pub fn with_mapper(client: C, mapper: impl BodyMapper + 'static) -> Self {
        Self {
            client,
            mapper: Box::new(mapper),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Build the request without sending it.
    ///
    /// Endpoint placeholders are looked up in the page params first, then in
    /// the form values. A form value always fills exactly one path segment.
    pub fn prepare(
        &self,
        descriptor: &MutationDescriptor,
        values: &BTreeMap<Id, Value>,
        params: &TemplateParams,
    ) -> Result<MutationRequest, MutationFailure> {
        let endpoint = expand_template(&descriptor.endpoint, |name| {
            params.get(name).cloned().or_else(|| {
                values
                    .get(name)
                    .and_then(scalar_to_string)
                    .map(|value| path_segment(&value))
            })
        })?;
        let body = self.mapper.map(&descriptor.body, values, params)?;

        Ok(MutationRequest {
            method: descriptor.method,
            endpoint,
            body,
        })
    }

    #[instrument(skip_all, fields(method = %descriptor.method, scope = %ctx.scope))]
    pub async fn execute(
        &self,
        descriptor: &MutationDescriptor,
        values: &BTreeMap<Id, Value>,
        ctx: ExecutionContext<'_>,
    ) -> MutationOutcome {
        if !ctx.enabled {
            let request = self.prepare(descriptor, values, ctx.params).ok();
            debug!("Execution disabled, returning preview");
            return MutationOutcome::Inert { request };
        }

        if ctx.validation.is_in_flight(ctx.scope) {
            debug!("Submission already in flight");
            return MutationOutcome::Busy;
        }

        let summary = ctx.validation.summarize(ctx.scope);
        if !summary.is_valid {
            info!(missing = summary.missing_fields.len(), "Blocked by validation");
            return MutationOutcome::ValidationBlocked {
                missing_fields: summary.missing_fields,
            };
        }

        let request = match self.prepare(descriptor, values, ctx.params) {
            Ok(request) => request,
            Err(failure) => {
                warn!(error = %failure, "Could not build request");
                return MutationOutcome::Failed {
                    request: None,
                    failure,
                };
            }
        };

        if !ctx.validation.begin_submit(ctx.scope) {
            return if ctx.validation.is_mounted(ctx.scope) {
                MutationOutcome::Busy
            } else {
                MutationOutcome::Discarded
            };
        }

        info!(endpoint = %request.endpoint, "Submitting mutation");
        let result = self.client.submit(&request).await;

        if !ctx.validation.is_mounted(ctx.scope) {
            debug!("Scope unmounted while in flight, discarding result");
            return MutationOutcome::Discarded;
        }
        ctx.validation.finish_submit(ctx.scope);

        match result {
            Ok(response) => MutationOutcome::Submitted { request, response },
            Err(failure) => {
                warn!(error = %failure, "Mutation failed");
                MutationOutcome::Failed {
                    request: Some(request),
                    failure,
                }
            }
        }
    }
}
