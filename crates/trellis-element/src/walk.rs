//! Value tree traversal
//!
//! Depth-first helpers over [`Values`]. Paths passed to callbacks are the keys
//! (and sequence positions) leading from the root to the visited value.

use crate::value::{ReferenceExpression, TemplatePart, Value, Values};

/// Visit every reference, including references inside templates
pub fn walk_references(values: &Values, mut visit: impl FnMut(&[String], &ReferenceExpression)) {
    let mut path = Vec::new();
    for (key, value) in values {
        path.push(key.clone());
        walk_value(value, &mut path, &mut visit);
        path.pop();
    }
}

fn walk_value(
    value: &Value,
    path: &mut Vec<String>,
    visit: &mut impl FnMut(&[String], &ReferenceExpression),
) {
    match value {
        Value::Scalar(_) => {}
        Value::Reference(reference) => visit(path, reference),
        Value::Template(template) => {
            for part in template.parts() {
                if let TemplatePart::Reference(reference) = part {
                    visit(path, reference);
                }
            }
        }
        Value::Mapping(map) => {
            for (key, inner) in map {
                path.push(key.clone());
                walk_value(inner, path, visit);
                path.pop();
            }
        }
        Value::Sequence(items) => {
            for (idx, inner) in items.iter().enumerate() {
                path.push(idx.to_string());
                walk_value(inner, path, visit);
                path.pop();
            }
        }
    }
}

/// Every reference in the tree, in traversal order
#[must_use]
pub fn references_in(values: &Values) -> Vec<ReferenceExpression> {
    let mut found = Vec::new();
    walk_references(values, |_, reference| found.push(reference.clone()));
    found
}

/// Rebuild a tree bottom-up through `transform`
///
/// `transform` is called on every leaf (scalars, references and templates) and
/// returns the replacement; `None` removes the entry from its mapping or
/// sequence. Containers are rebuilt from their transformed children.
#[must_use]
pub fn transform_values(
    values: Values,
    transform: &mut impl FnMut(&[String], Value) -> Option<Value>,
) -> Values {
    let mut path = Vec::new();
    transform_map(values, &mut path, transform)
}

fn transform_map(
    values: Values,
    path: &mut Vec<String>,
    transform: &mut impl FnMut(&[String], Value) -> Option<Value>,
) -> Values {
    let mut out = Values::with_capacity(values.len());
    for (key, value) in values {
        path.push(key.clone());
        if let Some(v) = transform_value(value, path, transform) {
            out.insert(key, v);
        }
        path.pop();
    }
    out
}

fn transform_value(
    value: Value,
    path: &mut Vec<String>,
    transform: &mut impl FnMut(&[String], Value) -> Option<Value>,
) -> Option<Value> {
    match value {
        Value::Mapping(map) => Some(Value::Mapping(transform_map(map, path, transform))),
        Value::Sequence(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (idx, item) in items.into_iter().enumerate() {
                path.push(idx.to_string());
                if let Some(v) = transform_value(item, path, transform) {
                    out.push(v);
                }
                path.pop();
            }
            Some(Value::Sequence(out))
        }
        leaf => transform(path, leaf),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elem_id::ElemId;
    use crate::value::TemplateExpression;

    fn sample() -> Values {
        let r1 = ReferenceExpression::new(ElemId::instance("sf", "C", "c1"));
        let r2 = ReferenceExpression::new(ElemId::instance("sf", "C", "c2"));
        let mut nested = Values::new();
        nested.insert("Ref".to_string(), Value::Reference(r1.clone()));
        let mut values = Values::new();
        values.insert("Name".to_string(), Value::string("x"));
        values.insert("Nested".to_string(), Value::Mapping(nested));
        values.insert(
            "Logic".to_string(),
            Value::Template(TemplateExpression::new(vec![
                TemplatePart::Reference(r2),
                TemplatePart::from(" OR "),
                TemplatePart::Reference(r1),
            ])),
        );
        values
    }

    #[test]
    fn finds_references_with_paths() {
        let mut seen = Vec::new();
        walk_references(&sample(), |path, r| {
            seen.push((path.join("."), r.elem_id().name().to_string()));
        });
        assert_eq!(
            seen,
            vec![
                ("Nested.Ref".to_string(), "c1".to_string()),
                ("Logic".to_string(), "c2".to_string()),
                ("Logic".to_string(), "c1".to_string()),
            ]
        );
        assert_eq!(references_in(&sample()).len(), 3);
    }

    #[test]
    fn transform_drops_none() {
        let out = transform_values(sample(), &mut |_, v| match v {
            Value::Reference(_) => None,
            other => Some(other),
        });
        assert_eq!(out["Nested"].as_mapping().unwrap().len(), 0);
        assert!(out.contains_key("Logic"));
        assert_eq!(out["Name"], Value::string("x"));
    }

    #[test]
    fn transform_sequences() {
        let mut values = Values::new();
        values.insert(
            "Items".to_string(),
            Value::Sequence(vec![Value::int(1), Value::int(2), Value::int(3)]),
        );
        let out = transform_values(values, &mut |path, v| {
            if path.last().map(String::as_str) == Some("1") {
                None
            } else {
                Some(v)
            }
        });
        assert_eq!(out["Items"], Value::Sequence(vec![Value::int(1), Value::int(3)]));
    }
}
