//! # Value Resolver
//!
//! Turns a [`DynamicValue`] into a concrete JSON value at render time.
//!
//! Sources come in two flavours:
//! - **External**: published by the host's query layer (`pending`, `ready` or
//!   `failed`). The walker registers a request the first time it meets a
//!   `query` block and the host publishes the result later.
//! - **Derived**: a `data` block's own dynamic value, resolved on demand so a
//!   chain of data blocks follows its references back to the origin.
//!
//! ## Evaluation order
//!
//! A block may only see sources declared before it in document order (its
//! ancestors included). [`resolve_from`] enforces this; a reference to a later
//! or unknown id is [`ResolutionError::Unresolved`]. [`resolve`] ignores order
//! and is what hosts and tests use outside a render pass.
//!
//! ## Cycles and long chains
//!
//! Resolution follows references in a loop, never by recursion, so a chain of
//! any length costs no stack. The ids on the current chain are kept in a set
//! and meeting one again is [`ResolutionError::CyclicReference`].
//!
//! The result of every derived source reached along the way is memoized until
//! the context next changes, so rendering a chain of `n` data blocks in
//! document order resolves each link once.
//!
//! ## Subscriptions
//!
//! [`ResolutionContext::publish`] notifies every subscriber of the published
//! id. The page runtime subscribes to the ids its blocks depend on and
//! re-renders only those blocks.

use pages_schema::{BlockPath, DynamicValue, Id, Reference};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use thiserror::Error;
use tracing::{debug, trace};

/// State of an external source as reported by the query layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "kebab-case")]
pub enum SourceState {
    Pending,
    Ready(Value),
    Failed(String),
}

/// Outcome of a successful resolution
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Value(Value),
    /// The chain ends at an external source that has not settled yet
    Pending { source: Id },
}

#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ResolutionError {
    #[error("Reference to \"{id}\" does not resolve: nothing before this block publishes it")]
    Unresolved { id: Id },

    #[error("Source \"{id}\" failed: {message}")]
    SourceFailed { id: Id, message: String },

    #[error("Cyclic reference: {}", format_chain(chain))]
    CyclicReference { chain: Vec<Id> },

    #[error("Pointer \"{pointer}\" not found in \"{id}\"")]
    PointerNotFound { id: Id, pointer: String },
}

impl ResolutionError {
    pub fn kind(&self) -> &'static str {
        match self {
            ResolutionError::Unresolved { .. } => "unresolved",
            ResolutionError::SourceFailed { .. } => "source-failed",
            ResolutionError::CyclicReference { .. } => "cyclic-reference",
            ResolutionError::PointerNotFound { .. } => "pointer-not-found",
        }
    }

    /// Id the failure originates from
    pub fn origin(&self) -> &Id {
        match self {
            ResolutionError::Unresolved { id }
            | ResolutionError::SourceFailed { id, .. }
            | ResolutionError::PointerNotFound { id, .. } => id,
            ResolutionError::CyclicReference { chain } => &chain[chain.len() - 1],
        }
    }
}

fn format_chain(chain: &[Id]) -> String {
    chain
        .iter()
        .map(Id::as_str)
        .collect::<Vec<_>>()
        .join(" → ")
}

/// Request the host must fulfil for a `query` block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryRequest {
    pub id: Id,
    pub endpoint: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Subscriber = Box<dyn FnMut(&Id, &SourceState)>;

#[derive(Debug, Clone)]
enum SourceEntry {
    External {
        state: SourceState,
        declared_at: Option<BlockPath>,
        /// Endpoint last requested for this id; `None` if only the host published it
        endpoint: Option<String>,
    },
    Derived {
        value: DynamicValue,
        declared_at: Option<BlockPath>,
    },
}

impl SourceEntry {
    fn declared_at(&self) -> Option<&BlockPath> {
        match self {
            SourceEntry::External { declared_at, .. } | SourceEntry::Derived { declared_at, .. } => {
                declared_at.as_ref()
            }
        }
    }
}

/// Resolved output of a derived source and the ids that output hangs on
#[derive(Debug, Clone)]
struct Memo {
    result: Result<Resolved, ResolutionError>,
    touched: Vec<Id>,
}

/// Derived id plus whether it was resolved honouring document order
type MemoKey = (Id, bool);

/// Lookup from id to the latest published output of that id
#[derive(Default)]
pub struct ResolutionContext {
    sources: HashMap<Id, SourceEntry>,
    subscribers: HashMap<Id, Vec<(SubscriptionId, Subscriber)>>,
    next_subscription: u64,
    requests: Vec<QueryRequest>,
    memo: RefCell<HashMap<MemoKey, Memo>>,
}

impl fmt::Debug for ResolutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolutionContext")
            .field("sources", &self.sources)
            .field("subscribed_ids", &self.subscribers.keys().collect::<Vec<_>>())
            .field("requests", &self.requests)
            .field("memoized", &self.memo.borrow().len())
            .finish()
    }
}

impl ResolutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish an external source's state and notify its subscribers
    pub fn publish(&mut self, id: Id, state: SourceState) {
        debug!(id = %id, state = ?state, "Publishing source");
        self.invalidate();

        let (declared_at, endpoint) = match self.sources.get(&id) {
            Some(SourceEntry::External {
                declared_at,
                endpoint,
                ..
            }) => (declared_at.clone(), endpoint.clone()),
            _ => (None, None),
        };
        self.sources.insert(
            id.clone(),
            SourceEntry::External {
                state: state.clone(),
                declared_at,
                endpoint,
            },
        );

        if let Some(subscribers) = self.subscribers.get_mut(&id) {
            for (_, callback) in subscribers.iter_mut() {
                callback(&id, &state);
            }
        }
    }

    /// Register a query block's source.
    ///
    /// The first call for an id queues a [`QueryRequest`] and marks the source
    /// pending, and so does a call whose endpoint differs from the one last
    /// requested. Other calls only record where the query is declared and
    /// return whatever state the host has published since.
    pub fn request(&mut self, request: QueryRequest, declared_at: &BlockPath) -> SourceState {
        self.invalidate();
        match self.sources.get_mut(&request.id) {
            Some(SourceEntry::External {
                state,
                declared_at: slot,
                endpoint,
            }) if endpoint.as_deref().map_or(true, |last| last == request.endpoint) => {
                *slot = Some(declared_at.clone());
                *endpoint = Some(request.endpoint.clone());
                state.clone()
            }
            _ => {
                trace!(id = %request.id, endpoint = %request.endpoint, "Queueing query request");
                self.sources.insert(
                    request.id.clone(),
                    SourceEntry::External {
                        state: SourceState::Pending,
                        declared_at: Some(declared_at.clone()),
                        endpoint: Some(request.endpoint.clone()),
                    },
                );
                self.requests.push(request);
                SourceState::Pending
            }
        }
    }

    /// Requests queued since the last call
    pub fn take_requests(&mut self) -> Vec<QueryRequest> {
        std::mem::take(&mut self.requests)
    }

    /// Define a derived source (a `data` block's value)
    pub fn define(&mut self, id: Id, value: DynamicValue, declared_at: Option<BlockPath>) {
        self.invalidate();
        self.sources
            .insert(id, SourceEntry::Derived { value, declared_at });
    }

    /// Drop every derived source; they are re-declared by the next render pass
    pub fn clear_derived(&mut self) {
        self.invalidate();
        self.sources
            .retain(|_, entry| matches!(entry, SourceEntry::External { .. }));
    }

    fn invalidate(&mut self) {
        self.memo.get_mut().clear();
    }

    pub fn state(&self, id: &Id) -> Option<&SourceState> {
        match self.sources.get(id) {
            Some(SourceEntry::External { state, .. }) => Some(state),
            _ => None,
        }
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.sources.contains_key(id)
    }

    pub fn subscribe<F>(&mut self, id: &Id, callback: F) -> SubscriptionId
    where
        F: FnMut(&Id, &SourceState) + 'static,
    {
        let subscription = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers
            .entry(id.clone())
            .or_default()
            .push((subscription, Box::new(callback)));
        subscription
    }

    pub fn unsubscribe(&mut self, subscription: SubscriptionId) -> bool {
        let mut removed = false;
        self.subscribers.retain(|_, subscribers| {
            let before = subscribers.len();
            subscribers.retain(|(existing, _)| *existing != subscription);
            removed |= subscribers.len() != before;
            !subscribers.is_empty()
        });
        removed
    }

    pub fn subscriber_count(&self, id: &Id) -> usize {
        self.subscribers.get(id).map_or(0, Vec::len)
    }
}

/// Resolve `value` against every source in the context, ignoring document order
pub fn resolve(value: &DynamicValue, context: &ResolutionContext) -> Result<Resolved, ResolutionError> {
    resolve_chain(value, context, None, None).0
}

/// Resolve `value` for the block at `at`, seeing only sources declared before it.
///
/// Every id whose publication could change the outcome (the external sources
/// the chain ends at and ids that did not resolve) is appended to `touched`,
/// so the caller can subscribe the block to them.
pub fn resolve_from(
    value: &DynamicValue,
    context: &ResolutionContext,
    at: &BlockPath,
    touched: &mut Vec<Id>,
) -> Result<Resolved, ResolutionError> {
    let (result, below) = resolve_chain(value, context, Some(at), None);
    extend_touched(touched, below);
    result
}

/// Resolve the output published under `id`, as seen from where it is declared.
///
/// This is how a `data` block evaluates itself: the chain starts at `id`, so a
/// block that refers back to itself is a cycle rather than an unresolved id.
pub fn resolve_declared(
    id: &Id,
    context: &ResolutionContext,
    touched: &mut Vec<Id>,
) -> Result<Resolved, ResolutionError> {
    match context.sources.get(id) {
        Some(SourceEntry::Derived { value, declared_at }) => {
            let key = (id.clone(), declared_at.is_some());
            let cached = context.memo.borrow().get(&key).cloned();
            if let Some(memo) = cached {
                extend_touched(touched, memo.touched);
                return memo.result;
            }

            let (result, below) = resolve_chain(value, context, declared_at.as_ref(), Some(id));
            if !is_cycle(&result) {
                context.memo.borrow_mut().insert(
                    key,
                    Memo {
                        result: result.clone(),
                        touched: below.clone(),
                    },
                );
            }
            extend_touched(touched, below);
            result
        }
        Some(SourceEntry::External { .. }) => {
            let (result, below) =
                resolve_chain(&DynamicValue::reference(id.clone()), context, None, None);
            extend_touched(touched, below);
            result
        }
        None => {
            extend_touched(touched, vec![id.clone()]);
            Err(ResolutionError::Unresolved { id: id.clone() })
        }
    }
}

fn extend_touched(touched: &mut Vec<Id>, ids: Vec<Id>) {
    for id in ids {
        if !touched.contains(&id) {
            touched.push(id);
        }
    }
}

fn is_cycle(result: &Result<Resolved, ResolutionError>) -> bool {
    matches!(result, Err(ResolutionError::CyclicReference { .. }))
}

/// One reference followed on the way to the origin
struct Link<'c> {
    reference: &'c Reference,
    /// Memo slot to fill on the way back, for derived sources not served from the memo
    memo: Option<MemoKey>,
}

/// Follow references from `value` until a literal, an external source or an error.
///
/// Returns the outcome and the ids it hangs on. Pointers are applied on the
/// way back, innermost first, and every derived source passed is memoized
/// with the value it resolved to before its referrer's pointer applied.
fn resolve_chain<'c>(
    value: &'c DynamicValue,
    context: &'c ResolutionContext,
    at: Option<&'c BlockPath>,
    start: Option<&Id>,
) -> (Result<Resolved, ResolutionError>, Vec<Id>) {
    let mut chain: Vec<Id> = start.into_iter().cloned().collect();
    let mut on_chain: HashSet<Id> = chain.iter().cloned().collect();
    let mut links: Vec<Link<'c>> = Vec::new();
    let mut below: Vec<Id> = Vec::new();
    let mut current = value;
    let mut at = at;

    let origin = loop {
        let reference = match current {
            DynamicValue::Literal(literal) => break Ok(Resolved::Value(literal.clone())),
            DynamicValue::Reference(reference) => reference,
        };
        let id = &reference.source;

        if on_chain.contains(id) {
            let mut cycle = chain.clone();
            cycle.push(id.clone());
            break Err(ResolutionError::CyclicReference { chain: cycle });
        }

        let Some(entry) = context.sources.get(id).filter(|entry| is_visible(entry, at)) else {
            below.push(id.clone());
            break Err(ResolutionError::Unresolved { id: id.clone() });
        };

        match entry {
            SourceEntry::External { state, .. } => {
                below.push(id.clone());
                links.push(Link {
                    reference,
                    memo: None,
                });
                break match state {
                    SourceState::Pending => Ok(Resolved::Pending { source: id.clone() }),
                    SourceState::Ready(value) => Ok(Resolved::Value(value.clone())),
                    SourceState::Failed(message) => Err(ResolutionError::SourceFailed {
                        id: id.clone(),
                        message: message.clone(),
                    }),
                };
            }
            SourceEntry::Derived { value, declared_at } => {
                let inner_at = at.and(declared_at.as_ref());
                let key = (id.clone(), inner_at.is_some());

                let cached = context.memo.borrow().get(&key).cloned();
                if let Some(memo) = cached {
                    trace!(id = %id, "Memoized derived source");
                    links.push(Link {
                        reference,
                        memo: None,
                    });
                    below.extend(memo.touched);
                    break memo.result;
                }

                links.push(Link {
                    reference,
                    memo: Some(key),
                });
                chain.push(id.clone());
                on_chain.insert(id.clone());
                current = value;
                at = inner_at;
            }
        }
    };

    let memoize = !is_cycle(&origin);
    let mut result = origin;
    for link in links.into_iter().rev() {
        if let (true, Some(key)) = (memoize, link.memo) {
            context.memo.borrow_mut().insert(
                key,
                Memo {
                    result: result.clone(),
                    touched: below.clone(),
                },
            );
        }
        result = project(result, link.reference);
    }

    (result, below)
}

/// Apply a reference's pointer to the value its source resolved to
fn project(
    result: Result<Resolved, ResolutionError>,
    reference: &Reference,
) -> Result<Resolved, ResolutionError> {
    match (result?, &reference.pointer) {
        (Resolved::Value(value), Some(pointer)) => value
            .pointer(pointer)
            .cloned()
            .map(Resolved::Value)
            .ok_or_else(|| ResolutionError::PointerNotFound {
                id: reference.source.clone(),
                pointer: pointer.clone(),
            }),
        (resolved, _) => Ok(resolved),
    }
}

fn is_visible(entry: &SourceEntry, at: Option<&BlockPath>) -> bool {
    match (entry.declared_at(), at) {
        (Some(declared), Some(at)) => declared < at,
        _ => true,
    }
}
