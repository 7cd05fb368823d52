//! Property tests for the positional index template codec

use std::collections::BTreeMap;
use std::sync::Arc;

use proptest::prelude::*;
use trellis_element::{ElemId, Element, InstanceElement, ObjectType, TemplatePart, Values};
use trellis_reference::{pack_from_template, split_digit_runs, unpack_to_template};

fn lookup_for(indices: &[i64]) -> BTreeMap<i64, Arc<Element>> {
    let ty = Arc::new(ObjectType::new(ElemId::new_type("sf", "Condition")));
    indices
        .iter()
        .map(|idx| {
            let mut cond = InstanceElement::new(format!("c{idx}"), Arc::clone(&ty), Values::new());
            cond.set_value("Index", *idx);
            (*idx, Arc::new(Element::Instance(cond)))
        })
        .collect()
}

fn index_from(
    lookup: &BTreeMap<i64, Arc<Element>>,
) -> impl Fn(&trellis_element::ReferenceExpression) -> Option<i64> + '_ {
    move |reference| {
        lookup
            .iter()
            .find(|(_, element)| element.elem_id() == reference.elem_id())
            .map(|(idx, _)| *idx)
    }
}

proptest! {
    #[test]
    fn pack_inverts_unpack(
        raw in "[0-9 ()ANDOR]{0,40}",
        indices in prop::collection::btree_set(0i64..20, 0..6)
    ) {
        let indices: Vec<i64> = indices.into_iter().collect();
        let lookup = lookup_for(&indices);
        let outcome = unpack_to_template(&raw, &lookup);
        if let Some(template) = outcome.template {
            let packed = pack_from_template(&template, index_from(&lookup)).unwrap();
            prop_assert_eq!(packed, raw);
        }
    }

    #[test]
    fn non_digit_text_is_never_split(raw in "[^0-9]{1,30}") {
        prop_assert_eq!(split_digit_runs(&raw), vec![raw.as_str()]);
        let outcome = unpack_to_template(&raw, &lookup_for(&[1, 2, 3]));
        prop_assert!(outcome.template.is_none());
    }

    #[test]
    fn every_matched_run_becomes_a_reference(a in 1i64..50, b in 1i64..50) {
        prop_assume!(a != b);
        let raw = format!("({a} AND {b})");
        let outcome = unpack_to_template(&raw, &lookup_for(&[a, b]));
        let template = outcome.template.unwrap();
        let references = template
            .parts()
            .iter()
            .filter(|part| matches!(part, TemplatePart::Reference(_)))
            .count();
        prop_assert_eq!(references, 2);
    }
}

#[test]
fn concrete_rule_logic() {
    let lookup = lookup_for(&[1, 2]);
    let template = unpack_to_template("1 AND 2", &lookup).template.unwrap();
    assert_eq!(template.parts().len(), 3);
    assert_eq!(template.parts()[1], TemplatePart::Literal(" AND ".to_string()));
    assert_eq!(pack_from_template(&template, index_from(&lookup)).unwrap(), "1 AND 2");
}
