use async_trait::async_trait;
use pages_evaluator::*;
use pages_schema::{parse, Block, BlockPath, HttpMethod, Id, MutationDescriptor};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use tokio::sync::Notify;

fn id(value: &str) -> Id {
    Id::new(value).unwrap()
}

/// Records every request and answers with a fixed result
struct RecordingClient {
    calls: RefCell<Vec<MutationRequest>>,
    result: Result<Value, MutationFailure>,
}

impl RecordingClient {
    fn ok(response: Value) -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            result: Ok(response),
        }
    }

    fn failing(failure: MutationFailure) -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            result: Err(failure),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

#[async_trait(?Send)]
impl MutationClient for RecordingClient {
    async fn submit(&self, request: &MutationRequest) -> Result<Value, MutationFailure> {
        self.calls.borrow_mut().push(request.clone());
        self.result.clone()
    }
}

/// Blocks until the gate opens
struct GatedClient {
    gate: Rc<Notify>,
    calls: RefCell<usize>,
}

#[async_trait(?Send)]
impl MutationClient for GatedClient {
    async fn submit(&self, _request: &MutationRequest) -> Result<Value, MutationFailure> {
        *self.calls.borrow_mut() += 1;
        self.gate.notified().await;
        Ok(json!({ "status": "ok" }))
    }
}

fn descriptor(endpoint: &str) -> MutationDescriptor {
    let doc = parse(&json!({
        "apiVersion": "page/v1",
        "type": "page",
        "blocks": [{
            "type": "form",
            "trigger": { "type": "button", "label": "Create" },
            "mutation": { "method": "POST", "endpoint": endpoint },
            "blocks": []
        }]
    }))
    .expect("Failed to parse");

    match &doc.blocks[0] {
        Block::Form(form) => form.mutation.clone(),
        other => panic!("Expected form, got {:?}", other),
    }
}

fn params() -> TemplateParams {
    let mut params = TemplateParams::new();
    params.insert("namespace".to_string(), "demo".to_string());
    params
}

fn report_all(validation: &ValidationAggregator, scope: &FormScopeId, fields: &[(&str, bool, Value)]) {
    for (name, valid, value) in fields {
        let state = if *valid {
            FieldState::valid()
        } else {
            FieldState::invalid("invalid")
        };
        validation.report(scope, &id(name), Some(state));
        validation.set_value(scope, &id(name), value.clone());
    }
}

fn context<'a>(
    scope: &'a FormScopeId,
    validation: &'a ValidationAggregator,
    params: &'a TemplateParams,
) -> ExecutionContext<'a> {
    ExecutionContext {
        scope,
        validation,
        params,
        enabled: true,
    }
}

#[tokio::test]
async fn test_invalid_form_never_reaches_the_client() {
    let validation = ValidationAggregator::new();
    let scope = validation.mount_scope("form@0");
    report_all(
        &validation,
        &scope,
        &[("A", false, json!("")), ("B", true, json!("ok"))],
    );

    let params = params();
    let executor = MutationExecutor::new(RecordingClient::ok(json!({})));
    let outcome = executor
        .execute(
            &descriptor("/api/items"),
            &validation.values(&scope),
            context(&scope, &validation, &params),
        )
        .await;

    assert_eq!(
        outcome,
        MutationOutcome::ValidationBlocked {
            missing_fields: vec![id("A")],
        }
    );
    assert_eq!(executor.client().call_count(), 0);
}

#[tokio::test]
async fn test_valid_form_submits_deterministic_request() {
    let validation = ValidationAggregator::new();
    let scope = validation.mount_scope("form@0");
    report_all(
        &validation,
        &scope,
        &[("name", true, json!("build")), ("replicas", true, json!(3))],
    );

    let params = params();
    let executor = MutationExecutor::new(RecordingClient::ok(json!({ "created": true })));
    let descriptor = descriptor("/api/namespaces/{namespace}/services/{name}");
    let values = validation.values(&scope);

    let first = executor
        .execute(&descriptor, &values, context(&scope, &validation, &params))
        .await;
    let second = executor
        .execute(&descriptor, &values, context(&scope, &validation, &params))
        .await;

    let expected = MutationRequest {
        method: HttpMethod::Post,
        endpoint: "/api/namespaces/demo/services/build".to_string(),
        body: Some(json!({ "name": "build", "replicas": 3 })),
    };
    assert_eq!(
        first,
        MutationOutcome::Submitted {
            request: expected.clone(),
            response: json!({ "created": true }),
        }
    );
    assert_eq!(first, second);
    assert_eq!(executor.client().calls.borrow().as_slice(), &[expected.clone(), expected]);
    assert!(!validation.is_in_flight(&scope));
}

#[tokio::test]
async fn test_retracted_invalid_field_unblocks_submission() {
    let validation = ValidationAggregator::new();
    let scope = validation.mount_scope("form@0");
    report_all(&validation, &scope, &[("A", true, json!("x"))]);
    validation.report(&scope, &id("A"), Some(FieldState::invalid("changed")));
    report_all(&validation, &scope, &[("B", false, json!(""))]);
    validation.report(&scope, &id("B"), None);

    let params = params();
    let executor = MutationExecutor::new(RecordingClient::ok(json!({})));
    let outcome = executor
        .execute(
            &descriptor("/api/items"),
            &validation.values(&scope),
            context(&scope, &validation, &params),
        )
        .await;

    // Last write for A is invalid; B was retracted
    assert_eq!(
        outcome,
        MutationOutcome::ValidationBlocked {
            missing_fields: vec![id("A")],
        }
    );

    validation.report(&scope, &id("A"), Some(FieldState::valid()));
    let outcome = executor
        .execute(
            &descriptor("/api/items"),
            &validation.values(&scope),
            context(&scope, &validation, &params),
        )
        .await;
    assert!(outcome.is_submitted());
}

#[tokio::test]
async fn test_unknown_placeholder_fails_without_network() {
    let validation = ValidationAggregator::new();
    let scope = validation.mount_scope("form@0");

    let params = params();
    let executor = MutationExecutor::new(RecordingClient::ok(json!({})));
    let outcome = executor
        .execute(
            &descriptor("/api/{workflow}"),
            &BTreeMap::new(),
            context(&scope, &validation, &params),
        )
        .await;

    match outcome {
        MutationOutcome::Failed {
            request: None,
            failure: MutationFailure::Template(TemplateError::UnknownPlaceholder(name)),
        } => assert_eq!(name, "workflow"),
        other => panic!("Expected template failure, got {:?}", other),
    }
    assert_eq!(executor.client().call_count(), 0);
}

#[tokio::test]
async fn test_backend_failure_is_an_outcome() {
    let validation = ValidationAggregator::new();
    let scope = validation.mount_scope("form@0");

    let params = params();
    let failure = MutationFailure::Rejected {
        status: 422,
        message: "Unprocessable Entity".to_string(),
        body: Some(json!({ "error": "name taken" })),
    };
    let executor = MutationExecutor::new(RecordingClient::failing(failure.clone()));
    let outcome = executor
        .execute(
            &descriptor("/api/items"),
            &BTreeMap::new(),
            context(&scope, &validation, &params),
        )
        .await;

    match outcome {
        MutationOutcome::Failed {
            request: Some(request),
            failure: actual,
        } => {
            assert_eq!(request.endpoint, "/api/items");
            assert_eq!(actual, failure);
        }
        other => panic!("Expected failure, got {:?}", other),
    }
    assert!(!validation.is_in_flight(&scope));
}

#[tokio::test]
async fn test_disabled_execution_is_inert() {
    let validation = ValidationAggregator::new();
    let scope = validation.mount_scope("form@0");
    report_all(&validation, &scope, &[("A", false, json!(""))]);

    let params = params();
    let executor = MutationExecutor::new(RecordingClient::ok(json!({})));
    let ctx = ExecutionContext {
        enabled: false,
        ..context(&scope, &validation, &params)
    };
    let outcome = executor
        .execute(&descriptor("/api/items"), &validation.values(&scope), ctx)
        .await;

    match outcome {
        MutationOutcome::Inert { request: Some(request) } => {
            assert_eq!(request.endpoint, "/api/items");
            assert_eq!(request.body, Some(json!({ "A": "" })));
        }
        other => panic!("Expected inert preview, got {:?}", other),
    }
    assert_eq!(executor.client().call_count(), 0);
}

#[tokio::test]
async fn test_second_submit_while_in_flight_is_busy() {
    let validation = ValidationAggregator::new();
    let scope = validation.mount_scope("form@0");
    let params = params();
    let gate = Rc::new(Notify::new());
    let executor = MutationExecutor::new(GatedClient {
        gate: gate.clone(),
        calls: RefCell::new(0),
    });
    let descriptor = descriptor("/api/items");
    let values = BTreeMap::new();

    let first = executor.execute(&descriptor, &values, context(&scope, &validation, &params));
    let second = async {
        tokio::task::yield_now().await;
        let outcome = executor
            .execute(&descriptor, &values, context(&scope, &validation, &params))
            .await;
        gate.notify_one();
        outcome
    };

    let (first, second) = tokio::join!(first, second);
    assert!(first.is_submitted());
    assert_eq!(second, MutationOutcome::Busy);
    assert_eq!(*executor.client().calls.borrow(), 1);
}

#[tokio::test]
async fn test_unmount_during_flight_discards_result() {
    let validation = ValidationAggregator::new();
    let scope = validation.mount_scope("form@0");
    let params = params();
    let gate = Rc::new(Notify::new());
    let executor = MutationExecutor::new(GatedClient {
        gate: gate.clone(),
        calls: RefCell::new(0),
    });
    let descriptor = descriptor("/api/items");
    let values = BTreeMap::new();

    let submit = executor.execute(&descriptor, &values, context(&scope, &validation, &params));
    let unmount = async {
        tokio::task::yield_now().await;
        assert!(validation.is_in_flight(&scope));
        validation.unmount_scope(&scope);
        gate.notify_one();
    };

    let (outcome, _) = tokio::join!(submit, unmount);
    assert_eq!(outcome, MutationOutcome::Discarded);
    assert_eq!(*executor.client().calls.borrow(), 1);

    // A remounted form starts clean
    let remounted = validation.mount_scope("form@0");
    assert!(!validation.is_in_flight(&remounted));
}

#[tokio::test]
async fn test_shared_client_through_rc() {
    let client = Rc::new(RecordingClient::ok(json!({})));
    let executor = MutationExecutor::new(client.clone());
    let validation = ValidationAggregator::new();
    let scope = validation.mount_scope("form@0");
    let params = params();

    let outcome = executor
        .execute(
            &descriptor("/api/items"),
            &BTreeMap::new(),
            context(&scope, &validation, &params),
        )
        .await;
    assert!(outcome.is_submitted());
    assert_eq!(client.call_count(), 1);
}

#[tokio::test]
async fn test_runtime_submission_from_live_page() {
    let doc = parse(&json!({
        "apiVersion": "page/v1",
        "type": "page",
        "blocks": [{
            "type": "form",
            "trigger": { "type": "button", "label": "Create" },
            "mutation": {
                "method": "POST",
                "endpoint": "/api/namespaces/{namespace}/variables",
                "body": { "type": "object", "entries": [
                    { "key": "variable.name", "value": { "field": "name" } },
                    { "key": "namespace", "value": { "param": "namespace" } }
                ]}
            },
            "blocks": [{ "type": "string-input", "id": "name", "label": "Name", "required": true }]
        }]
    }))
    .expect("Failed to parse");

    let mut runtime = PageRuntime::new(doc, params(), Capabilities::for_mode(Mode::Live));
    runtime.render();
    let executor = MutationExecutor::new(RecordingClient::ok(json!({})));
    let form = BlockPath::from_indices(vec![0]);

    let blocked = runtime.submission(&form).unwrap().execute(&executor).await;
    assert_eq!(
        blocked,
        MutationOutcome::ValidationBlocked {
            missing_fields: vec![id("name")],
        }
    );

    runtime
        .set_field_value(&BlockPath::from_indices(vec![0, 0]), json!("TOKEN"))
        .unwrap();
    let outcome = runtime.submission(&form).unwrap().execute(&executor).await;

    match outcome {
        MutationOutcome::Submitted { request, .. } => {
            assert_eq!(request.endpoint, "/api/namespaces/demo/variables");
            assert_eq!(
                request.body,
                Some(json!({ "variable": { "name": "TOKEN" }, "namespace": "demo" }))
            );
        }
        other => panic!("Expected submitted, got {:?}", other),
    }
}

#[tokio::test]
async fn test_field_waiting_on_its_default_blocks_submission() {
    let doc = parse(&json!({
        "apiVersion": "page/v1",
        "type": "page",
        "blocks": [
            { "type": "query", "id": "profile", "endpoint": "/api/profile", "blocks": [] },
            {
                "type": "form",
                "trigger": { "type": "button", "label": "Save" },
                "mutation": { "method": "PUT", "endpoint": "/api/profile" },
                "blocks": [{
                    "type": "string-input", "id": "name", "label": "Name", "required": true,
                    "defaultValue": { "ref": "profile", "pointer": "/name" }
                }]
            }
        ]
    }))
    .expect("Failed to parse");

    let mut runtime = PageRuntime::new(doc, params(), Capabilities::for_mode(Mode::Live));
    runtime.render();
    let executor = MutationExecutor::new(RecordingClient::ok(json!({})));
    let form = BlockPath::from_indices(vec![1]);

    let blocked = runtime.submission(&form).unwrap().execute(&executor).await;
    assert_eq!(
        blocked,
        MutationOutcome::ValidationBlocked {
            missing_fields: vec![id("name")],
        }
    );
    assert_eq!(executor.client().call_count(), 0);

    runtime.publish(id("profile"), SourceState::Ready(json!({ "name": "ada" })));
    runtime.flush();

    match runtime.submission(&form).unwrap().execute(&executor).await {
        MutationOutcome::Submitted { request, .. } => {
            assert_eq!(request.body, Some(json!({ "name": "ada" })));
        }
        other => panic!("Expected submitted, got {:?}", other),
    }
}

#[tokio::test]
async fn test_field_whose_default_fails_blocks_submission() {
    let doc = parse(&json!({
        "apiVersion": "page/v1",
        "type": "page",
        "blocks": [{
            "type": "form",
            "trigger": { "type": "button", "label": "Save" },
            "mutation": { "method": "POST", "endpoint": "/save" },
            "blocks": [{
                "type": "string-input", "id": "name", "label": "Name",
                "defaultValue": { "ref": "ghost" }
            }]
        }]
    }))
    .expect("Failed to parse");

    let mut runtime = PageRuntime::new(doc, params(), Capabilities::for_mode(Mode::Live));
    runtime.render();
    let executor = MutationExecutor::new(RecordingClient::ok(json!({})));

    let outcome = runtime
        .submission(&BlockPath::from_indices(vec![0]))
        .unwrap()
        .execute(&executor)
        .await;
    assert_eq!(outcome.kind(), "validation-blocked");
    assert_eq!(executor.client().call_count(), 0);
}
