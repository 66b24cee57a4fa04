//! # Validation Aggregator
//!
//! Registry of per-field validity, scoped per form instance.
//!
//! Field blocks report into the nearest enclosing form's scope however deep
//! they are nested; fields outside any form report into the page scope,
//! which has no submit action. A scope is created when its form mounts and
//! discarded when the form unmounts, so a form that leaves the tree and comes
//! back gets a fresh instance and nothing written against the old instance
//! reaches the new one.
//!
//! Rendering is single-threaded. The registry lives behind `Rc<RefCell<_>>`
//! and every method borrows it only for the duration of the call, so a handle
//! can be held across an `.await` safely.

use pages_schema::{FieldRef, Id};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;
use tracing::{debug, trace};

const PAGE_SCOPE_KEY: &str = "page";

/// Identity of one mounted form instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FormScopeId {
    key: String,
    instance: u64,
}

impl FormScopeId {
    /// Scope for fields that no form encloses
    pub fn page() -> Self {
        Self {
            key: PAGE_SCOPE_KEY.to_string(),
            instance: 0,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_page(&self) -> bool {
        self.key == PAGE_SCOPE_KEY
    }
}

impl fmt::Display for FormScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.key, self.instance)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldState {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl FieldState {
    pub fn valid() -> Self {
        Self {
            valid: true,
            message: None,
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub is_valid: bool,
    /// Invalid fields, sorted by id
    pub missing_fields: Vec<Id>,
}

impl Default for Summary {
    fn default() -> Self {
        Self {
            is_valid: true,
            missing_fields: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct ScopeState {
    instance: u64,
    fields: BTreeMap<Id, FieldState>,
    values: BTreeMap<Id, Value>,
    in_flight: bool,
}

#[derive(Debug)]
struct Registry {
    scopes: HashMap<String, ScopeState>,
    next_instance: u64,
}

impl Registry {
    fn new() -> Self {
        let mut scopes = HashMap::new();
        scopes.insert(PAGE_SCOPE_KEY.to_string(), ScopeState::default());
        Self {
            scopes,
            next_instance: 1,
        }
    }

    fn scope(&self, scope: &FormScopeId) -> Option<&ScopeState> {
        self.scopes
            .get(&scope.key)
            .filter(|state| state.instance == scope.instance)
    }

    fn scope_mut(&mut self, scope: &FormScopeId) -> Option<&mut ScopeState> {
        self.scopes
            .get_mut(&scope.key)
            .filter(|state| state.instance == scope.instance)
    }
}

/// Shared handle to the validation registry of one page render
#[derive(Clone)]
pub struct ValidationAggregator {
    inner: Rc<RefCell<Registry>>,
}

impl Default for ValidationAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ValidationAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationAggregator")
            .field("registry", &self.inner.borrow())
            .finish()
    }
}

impl ValidationAggregator {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Registry::new())),
        }
    }

    /// Mount the scope for the form identified by `key`.
    ///
    /// Idempotent while the scope stays mounted: re-rendering a form keeps its
    /// instance and the values typed into it.
    pub fn mount_scope(&self, key: &str) -> FormScopeId {
        let mut registry = self.inner.borrow_mut();
        if let Some(existing) = registry.scopes.get(key) {
            return FormScopeId {
                key: key.to_string(),
                instance: existing.instance,
            };
        }

        let instance = registry.next_instance;
        registry.next_instance += 1;
        registry.scopes.insert(
            key.to_string(),
            ScopeState {
                instance,
                ..ScopeState::default()
            },
        );
        debug!(scope = key, instance, "Mounted form scope");

        FormScopeId {
            key: key.to_string(),
            instance,
        }
    }

    /// Discard a form scope and everything reported into it
    pub fn unmount_scope(&self, scope: &FormScopeId) -> bool {
        if scope.is_page() {
            return false;
        }
        let mut registry = self.inner.borrow_mut();
        if registry.scope(scope).is_none() {
            return false;
        }
        registry.scopes.remove(&scope.key);
        debug!(scope = %scope, "Unmounted form scope");
        true
    }

    pub fn is_mounted(&self, scope: &FormScopeId) -> bool {
        self.inner.borrow().scope(scope).is_some()
    }

    /// Record a field's validity; `None` retracts the field entirely.
    ///
    /// The latest report for a `(scope, field)` pair replaces any earlier one.
    /// Reports against a scope that is no longer mounted are dropped.
    pub fn report(&self, scope: &FormScopeId, field: &Id, state: Option<FieldState>) {
        let mut registry = self.inner.borrow_mut();
        let Some(entry) = registry.scope_mut(scope) else {
            trace!(scope = %scope, field = %field, "Dropping report for unmounted scope");
            return;
        };

        match state {
            Some(state) => {
                entry.fields.insert(field.clone(), state);
            }
            None => {
                entry.fields.remove(field);
                entry.values.remove(field);
            }
        }
    }

    pub fn set_value(&self, scope: &FormScopeId, field: &Id, value: Value) {
        if let Some(entry) = self.inner.borrow_mut().scope_mut(scope) {
            entry.values.insert(field.clone(), value);
        }
    }

    pub fn value(&self, scope: &FormScopeId, field: &Id) -> Option<Value> {
        self.inner
            .borrow()
            .scope(scope)
            .and_then(|entry| entry.values.get(field).cloned())
    }

    /// Current values of every field mounted in `scope`
    pub fn values(&self, scope: &FormScopeId) -> BTreeMap<Id, Value> {
        self.inner
            .borrow()
            .scope(scope)
            .map(|entry| entry.values.clone())
            .unwrap_or_default()
    }

    pub fn field_state(&self, scope: &FormScopeId, field: &Id) -> Option<FieldState> {
        self.inner
            .borrow()
            .scope(scope)
            .and_then(|entry| entry.fields.get(field).cloned())
    }

    /// Validity of `scope` as it stands now.
    ///
    /// Reflects only fields currently reported; an unmounted scope summarizes
    /// as valid and empty.
    pub fn summarize(&self, scope: &FormScopeId) -> Summary {
        let registry = self.inner.borrow();
        let Some(entry) = registry.scope(scope) else {
            return Summary::default();
        };

        let missing_fields: Vec<Id> = entry
            .fields
            .iter()
            .filter(|(_, state)| !state.valid)
            .map(|(id, _)| id.clone())
            .collect();

        Summary {
            is_valid: missing_fields.is_empty(),
            missing_fields,
        }
    }

    /// Mark a submission in flight. False if one already is, or the scope is gone.
    pub fn begin_submit(&self, scope: &FormScopeId) -> bool {
        match self.inner.borrow_mut().scope_mut(scope) {
            Some(entry) if !entry.in_flight => {
                entry.in_flight = true;
                true
            }
            _ => false,
        }
    }

    pub fn finish_submit(&self, scope: &FormScopeId) {
        if let Some(entry) = self.inner.borrow_mut().scope_mut(scope) {
            entry.in_flight = false;
        }
    }

    pub fn is_in_flight(&self, scope: &FormScopeId) -> bool {
        self.inner
            .borrow()
            .scope(scope)
            .map_or(false, |entry| entry.in_flight)
    }

    /// Number of mounted scopes, the page scope included
    pub fn scope_count(&self) -> usize {
        self.inner.borrow().scopes.len()
    }

    /// Discard every scope (the document changed)
    pub fn reset(&self) {
        let mut registry = self.inner.borrow_mut();
        let next_instance = registry.next_instance;
        *registry = Registry::new();
        registry.next_instance = next_instance;
        debug!("Validation registry reset");
    }
}

/// Initial value of a field that has no default
pub fn empty_value(field: FieldRef<'_>) -> Value {
    match field {
        FieldRef::String(_) => Value::String(String::new()),
        FieldRef::Checkbox(_) => Value::Bool(false),
        FieldRef::Number(_) | FieldRef::Select(_) => Value::Null,
    }
}

/// Check `value` against the field's declared constraints
pub fn validate_field(field: FieldRef<'_>, value: &Value) -> FieldState {
    match field {
        FieldRef::String(input) => match value {
            Value::Null => required_or_valid(input.required),
            Value::String(text) if text.is_empty() => required_or_valid(input.required),
            Value::String(text) => {
                let length = text.chars().count();
                match (input.min_length, input.max_length) {
                    (Some(min), _) if length < min => {
                        FieldState::invalid(format!("Must be at least {} characters", min))
                    }
                    (_, Some(max)) if length > max => {
                        FieldState::invalid(format!("Must be at most {} characters", max))
                    }
                    _ => FieldState::valid(),
                }
            }
            _ => FieldState::invalid("Expected text"),
        },
        FieldRef::Number(input) => match value {
            Value::Null => required_or_valid(input.required),
            Value::Number(number) => {
                let number = number.as_f64().unwrap_or(f64::NAN);
                match (input.min, input.max) {
                    (Some(min), _) if number < min => {
                        FieldState::invalid(format!("Must be at least {}", min))
                    }
                    (_, Some(max)) if number > max => {
                        FieldState::invalid(format!("Must be at most {}", max))
                    }
                    _ => FieldState::valid(),
                }
            }
            _ => FieldState::invalid("Expected a number"),
        },
        FieldRef::Checkbox(input) => match value {
            Value::Bool(true) => FieldState::valid(),
            Value::Bool(false) | Value::Null if input.required => {
                FieldState::invalid("Must be checked")
            }
            Value::Bool(false) | Value::Null => FieldState::valid(),
            _ => FieldState::invalid("Expected true or false"),
        },
        FieldRef::Select(input) => match value {
            Value::Null => required_or_valid(input.required),
            Value::String(choice) if choice.is_empty() => required_or_valid(input.required),
            Value::String(choice) if input.options.contains(choice) => FieldState::valid(),
            _ => FieldState::invalid("Not one of the available options"),
        },
    }
}

fn required_or_valid(required: bool) -> FieldState {
    if required {
        FieldState::invalid("This field is required")
    } else {
        FieldState::valid()
    }
}
