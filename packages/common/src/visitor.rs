use pages_schema::*;

/// Visitor pattern for traversing a page document immutably
///
/// This trait provides default implementations that walk the entire tree.
/// Override specific visit_* methods to perform custom actions on blocks.
/// Every block is visited with its path from the document root.
pub trait Visitor: Sized {
    fn visit_document(&mut self, doc: &PageDocument) {
        walk_document(self, doc);
    }

    fn visit_block(&mut self, block: &Block, path: &BlockPath) {
        walk_block(self, block, path);
    }

    fn visit_field(&mut self, _field: FieldRef<'_>, _path: &BlockPath) {
        // Leaf node, no children to walk
    }

    fn visit_mutation(&mut self, _mutation: &MutationDescriptor, _path: &BlockPath) {
        // Leaf node, no children to walk
    }

    fn visit_dynamic_value(&mut self, _value: &DynamicValue, _path: &BlockPath) {
        // Leaf node, no children to walk
    }
}

/// Mutable visitor pattern for transforming documents
///
/// Similar to Visitor, but provides mutable access to blocks.
/// Use this to rewrite a copy of a document (documents loaded into a
/// render pass are never mutated in place).
pub trait VisitorMut: Sized {
    fn visit_document_mut(&mut self, doc: &mut PageDocument) {
        walk_document_mut(self, doc);
    }

    fn visit_block_mut(&mut self, block: &mut Block, path: &BlockPath) {
        walk_block_mut(self, block, path);
    }

    fn visit_dynamic_value_mut(&mut self, _value: &mut DynamicValue, _path: &BlockPath) {
        // Leaf node, no children to walk
    }

    fn visit_body_source_mut(&mut self, _source: &mut BodySource, _path: &BlockPath) {
        // Leaf node, no children to walk
    }
}

// Default walk implementations for immutable visitor

pub fn walk_document<V: Visitor>(visitor: &mut V, doc: &PageDocument) {
    let root = BlockPath::root();
    for (index, block) in doc.blocks.iter().enumerate() {
        visitor.visit_block(block, &root.child(index));
    }
}

pub fn walk_block<V: Visitor>(visitor: &mut V, block: &Block, path: &BlockPath) {
    for value in block.dynamic_values() {
        visitor.visit_dynamic_value(value, path);
    }

    if let Some(field) = block.as_field() {
        visitor.visit_field(field, path);
    }

    if let Block::Form(form) = block {
        visitor.visit_mutation(&form.mutation, path);
    }

    if let Some(children) = block.children() {
        for (index, child) in children.iter().enumerate() {
            visitor.visit_block(child, &path.child(index));
        }
    }
}

// Default walk implementations for mutable visitor

pub fn walk_document_mut<V: VisitorMut>(visitor: &mut V, doc: &mut PageDocument) {
    let root = BlockPath::root();
    for (index, block) in doc.blocks.iter_mut().enumerate() {
        visitor.visit_block_mut(block, &root.child(index));
    }
}

pub fn walk_block_mut<V: VisitorMut>(visitor: &mut V, block: &mut Block, path: &BlockPath) {
    match block {
        Block::Data(data) => {
            visitor.visit_dynamic_value_mut(&mut data.value, path);
        }
        Block::StringInput(StringInput { default_value, .. })
        | Block::NumberInput(NumberInput { default_value, .. })
        | Block::Checkbox(Checkbox { default_value, .. })
        | Block::Select(Select { default_value, .. }) => {
            if let Some(value) = default_value {
                visitor.visit_dynamic_value_mut(value, path);
            }
        }
        Block::Form(form) => {
            if let BodyMapping::Object { entries } = &mut form.mutation.body {
                for entry in entries {
                    visitor.visit_body_source_mut(&mut entry.value, path);
                }
            }
        }
        Block::Headline(_) | Block::Text(_) | Block::Card(_) | Block::Query(_) => {
            // No values to walk
        }
    }

    if let Some(children) = block.children_mut() {
        for (index, child) in children.iter_mut().enumerate() {
            visitor.visit_block_mut(child, &path.child(index));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct PathCollector {
        paths: Vec<(String, &'static str)>,
    }

    impl Visitor for PathCollector {
        fn visit_block(&mut self, block: &Block, path: &BlockPath) {
            self.paths.push((path.to_dotted(), block.type_name()));
            walk_block(self, block, path);
        }
    }

    #[test]
    fn test_visits_in_document_order_with_paths() {
        let doc = parse(&json!({
            "apiVersion": "page/v1",
            "type": "page",
            "blocks": [
                { "type": "headline", "level": "h1", "label": "Title" },
                { "type": "card", "blocks": [
                    { "type": "text", "content": "a" },
                    { "type": "card", "blocks": [{ "type": "text", "content": "b" }] }
                ]}
            ]
        }))
        .unwrap();

        let mut collector = PathCollector { paths: vec![] };
        collector.visit_document(&doc);

        assert_eq!(
            collector.paths,
            vec![
                ("0".to_string(), "headline"),
                ("1".to_string(), "card"),
                ("1.0".to_string(), "text"),
                ("1.1".to_string(), "card"),
                ("1.1.0".to_string(), "text"),
            ]
        );
    }
}
