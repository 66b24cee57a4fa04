use pages_evaluator::*;
use pages_schema::{parse, parse_str, BlockPath, HeadlineLevel, Id, PageDocument, EXAMPLE_PAGE};
use serde_json::json;

fn id(value: &str) -> Id {
    Id::new(value).unwrap()
}

fn path(indices: &[usize]) -> BlockPath {
    BlockPath::from_indices(indices.to_vec())
}

fn doc(blocks: serde_json::Value) -> PageDocument {
    parse(&json!({ "apiVersion": "page/v1", "type": "page", "blocks": blocks }))
        .expect("Failed to parse")
}

struct Harness {
    sources: ResolutionContext,
    validation: ValidationAggregator,
    params: TemplateParams,
}

impl Harness {
    fn new() -> Self {
        let mut params = TemplateParams::new();
        params.insert("namespace".to_string(), "demo".to_string());
        Self {
            sources: ResolutionContext::new(),
            validation: ValidationAggregator::new(),
            params,
        }
    }

    fn render(&mut self, doc: &PageDocument, mode: Mode) -> (Vec<RenderNode>, RenderEffects) {
        let mut walker = Walker::new(
            &mut self.sources,
            &self.validation,
            &self.params,
            Capabilities::for_mode(mode),
        );
        let nodes = walker.render_document(doc);
        (nodes, walker.into_effects())
    }
}

#[test]
fn test_example_page_renders_two_nodes_in_order() {
    let doc = parse_str(EXAMPLE_PAGE).expect("Failed to parse example");
    let (nodes, effects) = Harness::new().render(&doc, Mode::Live);

    assert_eq!(nodes.len(), 2);
    match &nodes[0] {
        RenderNode::Headline { path: at, level, label } => {
            assert_eq!(at, &path(&[0]));
            assert_eq!(*level, HeadlineLevel::H1);
            assert_eq!(label, "Welcome to Direktiv");
        }
        other => panic!("Expected headline, got {:?}", other),
    }
    match &nodes[1] {
        RenderNode::Text { path: at, .. } => assert_eq!(at, &path(&[1])),
        other => panic!("Expected text, got {:?}", other),
    }
    assert!(effects.dependencies.is_empty());
    assert!(effects.fields.is_empty());
}

#[test]
fn test_deeply_nested_field_reports_to_enclosing_form() {
    let doc = doc(json!([
        {
            "type": "form",
            "trigger": { "type": "button", "label": "Save" },
            "mutation": { "method": "POST", "endpoint": "/save" },
            "blocks": [
                { "type": "card", "blocks": [
                    { "type": "card", "blocks": [
                        { "type": "string-input", "id": "deep", "label": "Deep", "required": true }
                    ]}
                ]},
                { "type": "checkbox", "id": "agree", "label": "Agree" }
            ]
        },
        { "type": "number-input", "id": "outside", "label": "Outside", "required": true }
    ]));

    let mut harness = Harness::new();
    let (nodes, effects) = harness.render(&doc, Mode::Live);

    let form = harness.validation.mount_scope(&form_scope_key(&path(&[0])));
    assert_eq!(
        harness.validation.summarize(&form),
        Summary {
            is_valid: false,
            missing_fields: vec![id("deep")],
        }
    );
    assert_eq!(
        harness.validation.summarize(&FormScopeId::page()).missing_fields,
        vec![id("outside")]
    );

    assert_eq!(effects.fields.len(), 3);
    assert_eq!(effects.fields[0].path, path(&[0, 0, 0, 0]));
    assert_eq!(effects.fields[0].scope, form);
    assert_eq!(effects.scopes, vec![(path(&[0]), form.clone())]);

    match &nodes[0] {
        RenderNode::Form { trigger, summary, .. } => {
            assert!(trigger.disabled);
            assert!(!trigger.inert);
            assert_eq!(summary.as_ref().map(|s| s.missing_fields.len()), Some(1));
        }
        other => panic!("Expected form, got {:?}", other),
    }
}

#[test]
fn test_query_renders_loading_then_children() {
    let doc = doc(json!([
        { "type": "query", "id": "instances", "endpoint": "/api/namespaces/{namespace}/instances",
          "blocks": [{ "type": "data", "id": "total", "value": { "ref": "instances", "pointer": "/total" } }] },
        { "type": "text", "content": "after" }
    ]));

    let mut harness = Harness::new();
    let (nodes, _) = harness.render(&doc, Mode::Live);

    match &nodes[0] {
        RenderNode::Loading { source, .. } => assert_eq!(source, &id("instances")),
        other => panic!("Expected loading, got {:?}", other),
    }
    assert_eq!(nodes[1].kind(), "text");
    assert_eq!(
        harness.sources.take_requests(),
        vec![QueryRequest {
            id: id("instances"),
            endpoint: "/api/namespaces/demo/instances".to_string(),
        }]
    );

    harness
        .sources
        .publish(id("instances"), SourceState::Ready(json!({ "total": 12 })));
    let (nodes, effects) = harness.render(&doc, Mode::Live);

    match &nodes[0] {
        RenderNode::Query { children, .. } => match &children[0] {
            RenderNode::Data { value, .. } => assert_eq!(value, &json!(12)),
            other => panic!("Expected data, got {:?}", other),
        },
        other => panic!("Expected query, got {:?}", other),
    }
    assert!(effects.dependencies.contains(&(id("instances"), path(&[0]))));
    assert!(effects.dependencies.contains(&(id("instances"), path(&[0, 0]))));
    assert!(harness.sources.take_requests().is_empty());
}

#[test]
fn test_failed_query_renders_error_region() {
    let doc = doc(json!([
        { "type": "query", "id": "broken", "endpoint": "/api/broken", "blocks": [] }
    ]));

    let mut harness = Harness::new();
    harness
        .sources
        .publish(id("broken"), SourceState::Failed("503 Service Unavailable".to_string()));
    let (nodes, _) = harness.render(&doc, Mode::Live);

    match &nodes[0] {
        RenderNode::Error { error_kind: kind, message, source, .. } => {
            assert_eq!(kind, "source-failed");
            assert_eq!(message, "503 Service Unavailable");
            assert_eq!(source.as_ref(), Some(&id("broken")));
        }
        other => panic!("Expected error, got {:?}", other),
    }
}

#[test]
fn test_resolution_errors_stay_inline() {
    let doc = doc(json!([
        { "type": "data", "id": "early", "value": { "ref": "late" } },
        { "type": "data", "id": "late", "value": "ready" },
        { "type": "data", "id": "me", "value": { "ref": "me" } },
        { "type": "data", "id": "copy", "value": { "ref": "late" } }
    ]));

    let (nodes, _) = Harness::new().render(&doc, Mode::Live);
    assert_eq!(nodes.len(), 4);

    match &nodes[0] {
        RenderNode::Error { error_kind: kind, source, .. } => {
            assert_eq!(kind, "unresolved");
            assert_eq!(source.as_ref(), Some(&id("late")));
        }
        other => panic!("Expected error, got {:?}", other),
    }
    match &nodes[2] {
        RenderNode::Error { error_kind: kind, .. } => assert_eq!(kind, "cyclic-reference"),
        other => panic!("Expected error, got {:?}", other),
    }
    match &nodes[3] {
        RenderNode::Data { value, .. } => assert_eq!(value, &json!("ready")),
        other => panic!("Expected data, got {:?}", other),
    }
}

#[test]
fn test_field_default_resolves_from_earlier_data() {
    let doc = doc(json!([
        { "type": "data", "id": "owner", "value": { "name": "ada" } },
        { "type": "form",
          "trigger": { "type": "button", "label": "Save" },
          "mutation": { "method": "PUT", "endpoint": "/owner" },
          "blocks": [
            { "type": "string-input", "id": "name", "label": "Name",
              "defaultValue": { "ref": "owner", "pointer": "/name" } }
          ]}
    ]));

    let (nodes, _) = Harness::new().render(&doc, Mode::Live);
    match nodes[1].children().first() {
        Some(RenderNode::Field { value, validity, .. }) => {
            assert_eq!(value, &json!("ada"));
            assert_eq!(validity.as_ref().map(|v| v.valid), Some(true));
        }
        other => panic!("Expected field, got {:?}", other),
    }
}

#[test]
fn test_edit_mode_hides_validation_and_makes_trigger_inert() {
    let doc = doc(json!([
        { "type": "form",
          "trigger": { "type": "button", "label": "Save" },
          "mutation": { "method": "POST", "endpoint": "/save" },
          "blocks": [{ "type": "string-input", "id": "name", "label": "Name", "required": true }] }
    ]));

    let (nodes, _) = Harness::new().render(&doc, Mode::Edit);
    match &nodes[0] {
        RenderNode::Form { trigger, summary, children, .. } => {
            assert!(trigger.inert);
            assert!(!trigger.disabled);
            assert!(summary.is_none());
            match &children[0] {
                RenderNode::Field { validity, .. } => assert!(validity.is_none()),
                other => panic!("Expected field, got {:?}", other),
            }
        }
        other => panic!("Expected form, got {:?}", other),
    }
}

#[test]
fn test_render_at_rebuilds_scope_chain() {
    let doc = doc(json!([
        { "type": "text", "content": "intro" },
        { "type": "form",
          "trigger": { "type": "button", "label": "Save" },
          "mutation": { "method": "POST", "endpoint": "/save" },
          "blocks": [
            { "type": "card", "blocks": [
                { "type": "string-input", "id": "name", "label": "Name" }
            ]}
          ]}
    ]));

    let mut harness = Harness::new();
    harness.render(&doc, Mode::Live);

    let scope = harness.validation.mount_scope(&form_scope_key(&path(&[1])));
    harness.validation.set_value(&scope, &id("name"), json!("typed"));

    let mut walker = Walker::new(
        &mut harness.sources,
        &harness.validation,
        &harness.params,
        Capabilities::for_mode(Mode::Live),
    );
    let node = walker.render_at(&doc, &path(&[1, 0, 0]));
    let effects = walker.into_effects();

    match node {
        RenderNode::Field { value, .. } => assert_eq!(value, json!("typed")),
        other => panic!("Expected field, got {:?}", other),
    }
    assert_eq!(effects.fields[0].scope, scope);
}

#[test]
fn test_render_at_missing_path_renders_error_marker() {
    let doc = parse_str(EXAMPLE_PAGE).expect("Failed to parse example");
    let mut harness = Harness::new();
    let mut walker = Walker::new(
        &mut harness.sources,
        &harness.validation,
        &harness.params,
        Capabilities::for_mode(Mode::Live),
    );

    match walker.render_at(&doc, &path(&[5, 1])) {
        RenderNode::Error { error_kind: kind, path: at, .. } => {
            assert_eq!(kind, "not-found");
            assert_eq!(at, path(&[5, 1]));
        }
        other => panic!("Expected error, got {:?}", other),
    }
}

#[test]
fn test_long_data_chain_renders_every_link() {
    let length = 3_000;
    let blocks: Vec<serde_json::Value> = (0..length)
        .map(|index| {
            if index == 0 {
                json!({ "type": "data", "id": "d0", "value": 1 })
            } else {
                json!({ "type": "data", "id": format!("d{}", index), "value": { "ref": format!("d{}", index - 1) } })
            }
        })
        .collect();
    let doc = doc(serde_json::Value::Array(blocks));

    let (nodes, effects) = Harness::new().render(&doc, Mode::Live);
    assert_eq!(nodes.len(), length);
    match &nodes[length - 1] {
        RenderNode::Data { value, .. } => assert_eq!(value, &json!(1)),
        other => panic!("Expected data, got {:?}", other),
    }
    assert!(effects.dependencies.is_empty());
}
