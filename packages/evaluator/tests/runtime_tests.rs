use pages_evaluator::*;
use pages_schema::{parse, BlockPath, Id, PageDocument};
use serde_json::json;

fn id(value: &str) -> Id {
    Id::new(value).unwrap()
}

fn path(indices: &[usize]) -> BlockPath {
    BlockPath::from_indices(indices.to_vec())
}

fn dashboard() -> PageDocument {
    parse(&json!({
        "apiVersion": "page/v1",
        "type": "page",
        "blocks": [
            { "type": "headline", "level": "h1", "label": "Dashboard" },
            { "type": "query", "id": "instances", "endpoint": "/api/namespaces/{namespace}/instances",
              "blocks": [{ "type": "text", "content": "Instances" }] },
            { "type": "query", "id": "services", "endpoint": "/api/namespaces/{namespace}/services",
              "blocks": [] },
            { "type": "card", "blocks": [
                { "type": "data", "id": "total", "value": { "ref": "instances", "pointer": "/total" } }
            ]}
        ]
    }))
    .expect("Failed to parse")
}

fn params() -> TemplateParams {
    let mut params = TemplateParams::new();
    params.insert("namespace".to_string(), "demo".to_string());
    params
}

#[test]
fn test_publish_rerenders_only_dependent_subtrees() {
    let mut runtime = PageRuntime::new(dashboard(), params(), Capabilities::for_mode(Mode::Live));
    runtime.render();

    let requests = runtime.take_query_requests();
    assert_eq!(
        requests.iter().map(|r| r.endpoint.as_str()).collect::<Vec<_>>(),
        vec!["/api/namespaces/demo/instances", "/api/namespaces/demo/services"]
    );
    assert_eq!(runtime.dependents(&id("instances")), vec![&path(&[1]), &path(&[3, 0])]);

    let before = runtime.tree().clone();
    runtime.publish(id("instances"), SourceState::Ready(json!({ "total": 4 })));
    assert_eq!(runtime.pending_invalidations(), vec![id("instances")]);

    let flushed = runtime.flush();
    assert_eq!(flushed, vec![path(&[1]), path(&[3, 0])]);
    assert_eq!(runtime.stats().full_renders, 1);
    assert_eq!(runtime.stats().subtree_renders, 2);

    let after = runtime.tree();
    // Siblings are untouched
    assert_eq!(after.nodes[0], before.nodes[0]);
    assert_eq!(after.nodes[2], before.nodes[2]);

    match after.find(&path(&[1])) {
        Some(RenderNode::Query { children, .. }) => assert_eq!(children.len(), 1),
        other => panic!("Expected query, got {:?}", other),
    }
    match after.find(&path(&[3, 0])) {
        Some(RenderNode::Data { value, .. }) => assert_eq!(value, &json!(4)),
        other => panic!("Expected data, got {:?}", other),
    }

    // Nothing queued, nothing re-rendered
    assert!(runtime.flush().is_empty());
}

#[test]
fn test_publish_without_dependents_schedules_nothing() {
    let mut runtime = PageRuntime::new(dashboard(), params(), Capabilities::for_mode(Mode::Live));
    runtime.render();

    runtime.publish(id("unrelated"), SourceState::Ready(json!(1)));
    assert!(runtime.pending_invalidations().is_empty());
    assert!(runtime.flush().is_empty());
}

#[test]
fn test_failed_source_renders_error_in_place() {
    let mut runtime = PageRuntime::new(dashboard(), params(), Capabilities::for_mode(Mode::Live));
    runtime.render();

    runtime.publish(id("services"), SourceState::Failed("timeout".to_string()));
    assert_eq!(runtime.flush(), vec![path(&[2])]);

    match runtime.tree().find(&path(&[2])) {
        Some(RenderNode::Error { error_kind: kind, source, .. }) => {
            assert_eq!(kind, "source-failed");
            assert_eq!(source.as_ref(), Some(&id("services")));
        }
        other => panic!("Expected error, got {:?}", other),
    }
}

#[test]
fn test_fields_leaving_the_tree_are_retracted() {
    let doc = parse(&json!({
        "apiVersion": "page/v1",
        "type": "page",
        "blocks": [
            { "type": "query", "id": "user", "endpoint": "/api/user", "blocks": [
                { "type": "string-input", "id": "filter", "label": "Filter", "required": true },
                { "type": "form",
                  "trigger": { "type": "button", "label": "Save" },
                  "mutation": { "method": "PATCH", "endpoint": "/api/user" },
                  "blocks": [
                    { "type": "string-input", "id": "email", "label": "Email",
                      "required": true, "defaultValue": { "ref": "user", "pointer": "/email" } },
                    { "type": "string-input", "id": "nickname", "label": "Nickname", "required": true }
                  ]}
            ]}
        ]
    }))
    .expect("Failed to parse");

    let mut runtime = PageRuntime::new(doc, params(), Capabilities::for_mode(Mode::Live));
    runtime.publish(id("user"), SourceState::Ready(json!({ "email": "ada@example.com" })));
    runtime.render();

    let page = FormScopeId::page();
    let form = runtime.validation().mount_scope(&form_scope_key(&path(&[0, 1])));
    assert_eq!(runtime.validation().summarize(&form).missing_fields, vec![id("nickname")]);
    assert_eq!(
        runtime.validation().value(&form, &id("email")),
        Some(json!("ada@example.com"))
    );
    assert_eq!(runtime.validation().summarize(&page).missing_fields, vec![id("filter")]);

    // Refetch: the query's children leave the tree until it settles again
    runtime.publish(id("user"), SourceState::Pending);
    assert_eq!(runtime.flush(), vec![path(&[0])]);

    assert_eq!(runtime.validation().field_state(&page, &id("filter")), None);
    assert!(runtime.validation().summarize(&page).is_valid);
    assert!(!runtime.validation().is_mounted(&form));
    assert!(runtime.form_values(&path(&[0, 1])).is_err());
    match runtime.tree().find(&path(&[0])) {
        Some(RenderNode::Loading { source, .. }) => assert_eq!(source, &id("user")),
        other => panic!("Expected loading, got {:?}", other),
    }
}

#[test]
fn test_replace_document_discards_scopes() {
    let form_page = parse(&json!({
        "apiVersion": "page/v1",
        "type": "page",
        "blocks": [{
            "type": "form",
            "trigger": { "type": "button", "label": "Save" },
            "mutation": { "method": "POST", "endpoint": "/save" },
            "blocks": [{ "type": "string-input", "id": "name", "label": "Name" }]
        }]
    }))
    .expect("Failed to parse");

    let mut runtime = PageRuntime::new(form_page.clone(), params(), Capabilities::for_mode(Mode::Live));
    runtime.render();
    runtime
        .set_field_value(&path(&[0, 0]), json!("draft"))
        .expect("Field should be mounted");
    let old_scope = runtime.submission(&path(&[0])).unwrap().scope;

    runtime.replace_document(form_page);
    let new_scope = runtime.submission(&path(&[0])).unwrap().scope;

    assert_ne!(old_scope, new_scope);
    assert!(!runtime.validation().is_mounted(&old_scope));
    assert_eq!(
        runtime.form_values(&path(&[0])).unwrap().get(&id("name")),
        Some(&json!(""))
    );
}

#[test]
fn test_switching_capabilities_rerenders() {
    let mut runtime = PageRuntime::new(dashboard(), params(), Capabilities::for_mode(Mode::Live));
    runtime.render();
    assert!(runtime.tree().capabilities.execute_mutations());

    runtime.set_capabilities(Capabilities::for_mode(Mode::Edit));
    assert!(!runtime.tree().capabilities.execute_mutations());
    assert_eq!(runtime.stats().full_renders, 2);
}

#[test]
fn test_reference_to_data_inside_pending_query_waits_for_the_query() {
    let doc = parse(&json!({
        "apiVersion": "page/v1",
        "type": "page",
        "blocks": [
            { "type": "query", "id": "stats", "endpoint": "/api/stats", "blocks": [
                { "type": "data", "id": "count", "value": { "ref": "stats", "pointer": "/count" } }
            ]},
            { "type": "data", "id": "shown", "value": { "ref": "count" } }
        ]
    }))
    .expect("Failed to parse");

    let mut runtime = PageRuntime::new(doc, params(), Capabilities::for_mode(Mode::Live));
    runtime.render();

    match runtime.tree().find(&path(&[1])) {
        Some(RenderNode::Loading { source, .. }) => assert_eq!(source, &id("stats")),
        other => panic!("Expected loading, got {:?}", other),
    }
    assert_eq!(runtime.dependents(&id("stats")), vec![&path(&[0]), &path(&[1])]);

    runtime.publish(id("stats"), SourceState::Ready(json!({ "count": 5 })));
    assert_eq!(runtime.flush(), vec![path(&[0]), path(&[1])]);

    match runtime.tree().find(&path(&[1])) {
        Some(RenderNode::Data { value, .. }) => assert_eq!(value, &json!(5)),
        other => panic!("Expected data, got {:?}", other),
    }
}
