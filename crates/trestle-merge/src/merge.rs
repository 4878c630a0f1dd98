//! The two-tree merge algorithm.
//!
//! `merge(dominant, recessive)` produces a fresh tree in which the dominant
//! node's data wins on conflict and the recessive tree supplies inherited
//! defaults. Per-node combination directives steer the process; they are
//! consumed by the merge and stripped from the output.

use crate::directives::{ChildrenMode, Directives, SelfMode};
use crate::node::Element;

/// Merge two trees, dominant over recessive.
pub fn merge(dominant: &Element, recessive: &Element) -> Element {
    merge_with(dominant, recessive, None)
}

/// Merge two optional trees. If either side is absent the other is returned
/// unchanged — no merge takes place and no directives are stripped.
pub fn merge_opt(dominant: Option<&Element>, recessive: Option<&Element>) -> Option<Element> {
    match (dominant, recessive) {
        (Some(d), Some(r)) => Some(merge(d, r)),
        (Some(d), None) => Some(d.clone()),
        (None, r) => r.cloned(),
    }
}

/// Merge two trees with an optional children-mode override.
///
/// When `children_override` is set it takes precedence over the dominant
/// node's `combine.children` directive, recursively — callers use this to
/// force append or merge behavior regardless of what the trees declare.
pub fn merge_with(
    dominant: &Element,
    recessive: &Element,
    children_override: Option<ChildrenMode>,
) -> Element {
    // An explicit override keeps the dominant node in isolation: its own
    // value, attributes and children, with the recessive ignored entirely.
    if dominant.directives().self_mode == SelfMode::Override {
        return isolate(dominant);
    }

    // Value selection: the dominant's value slot always wins at a matched
    // node. An explicit empty string masks recessive text, and a true null
    // (self-closed element) propagates null rather than falling back to the
    // recessive value. Recessive values survive only through unmatched
    // children. This replicates observed legacy behavior and is covered by
    // tests; do not "fix" it.
    let value = dominant.value().map(str::to_owned);

    // Attribute union; on collision the dominant's value wins.
    let mut attributes = recessive.attributes().clone();
    for (k, v) in dominant.attributes() {
        attributes.insert(k.clone(), v.clone());
    }

    let mode = children_override.unwrap_or(dominant.directives().children_mode);
    let children = match mode {
        ChildrenMode::Append => append_children(dominant, recessive),
        ChildrenMode::Merge => merge_children(dominant, recessive, children_override),
    };

    // Provenance: the dominant side is the authority at a merged node; its
    // location survives. Copied recessive subtrees keep their own locations.
    let source = dominant
        .source()
        .or_else(|| recessive.source())
        .map(str::to_owned);

    Element::assemble(
        dominant.name().to_owned(),
        value,
        dominant.preserve_space(),
        attributes,
        Directives::default(),
        children,
        source,
    )
}

/// Copy the dominant node as-is, clearing its node-level directives.
fn isolate(dominant: &Element) -> Element {
    Element::assemble(
        dominant.name().to_owned(),
        dominant.value().map(str::to_owned),
        dominant.preserve_space(),
        dominant.attributes().clone(),
        Directives::default(),
        dominant.children().to_vec(),
        dominant.source().map(str::to_owned),
    )
}

/// Append mode: dominant children first, then recessive children, each an
/// identity copy. No pairing or recursive merge happens within the append.
fn append_children(dominant: &Element, recessive: &Element) -> Vec<Element> {
    let mut children = dominant.children().to_vec();
    children.extend(recessive.children().iter().cloned());
    children
}

/// Default merge mode: pair children preferentially by `combine.id`, then by
/// `combine.keys`, then positionally among same-named elements. Matched
/// pairs merge recursively; unmatched dominant children pass through;
/// unmatched recessive children append at the end in their original order.
fn merge_children(
    dominant: &Element,
    recessive: &Element,
    children_override: Option<ChildrenMode>,
) -> Vec<Element> {
    let dom = dominant.children();

    // Output slots in dominant order. A dominant child marked
    // combine.self="remove" never surfaces in the result; its slot exists
    // only so a recessive counterpart can be consumed and dropped with it.
    let mut slots: Vec<Option<Element>> = dom
        .iter()
        .map(|c| (c.directives().self_mode != SelfMode::Remove).then(|| c.clone()))
        .collect();
    let mut consumed = vec![false; dom.len()];

    let mut appended: Vec<Element> = Vec::new();
    for rc in recessive.children() {
        let keys = effective_keys(dominant, recessive, rc);
        let Some(idx) = find_match(dom, &consumed, rc, keys) else {
            appended.push(rc.clone());
            continue;
        };
        if let Some(flag) = consumed.get_mut(idx) {
            *flag = true;
        }
        let Some(dc) = dom.get(idx) else { continue };
        if dc.directives().self_mode == SelfMode::Remove {
            // the matched pair is deleted from the result
            continue;
        }
        if let Some(slot) = slots.get_mut(idx) {
            *slot = Some(merge_with(dc, rc, children_override));
        }
    }

    slots.into_iter().flatten().chain(appended).collect()
}

/// The combination keys in effect for a recessive child: the dominant
/// parent's directive wins, the recessive parent supplies a default, and a
/// recessive child may carry its own as a last resort.
fn effective_keys<'a>(
    dominant: &'a Element,
    recessive: &'a Element,
    recessive_child: &'a Element,
) -> &'a [String] {
    if !dominant.directives().keys.is_empty() {
        &dominant.directives().keys
    } else if !recessive.directives().keys.is_empty() {
        &recessive.directives().keys
    } else {
        &recessive_child.directives().keys
    }
}

/// Find the dominant child a recessive child pairs with, if any.
fn find_match(
    dom: &[Element],
    consumed: &[bool],
    rc: &Element,
    keys: &[String],
) -> Option<usize> {
    let unconsumed = |i: &usize| !consumed.get(*i).copied().unwrap_or(true);

    // 1. explicit combine.id, matched regardless of position
    if let Some(id) = rc.directives().id.as_deref() {
        return dom
            .iter()
            .enumerate()
            .position(|(i, dc)| unconsumed(&i) && dc.directives().id.as_deref() == Some(id));
    }

    // 2. combine.keys: same tag name, every key attribute present on both
    //    sides with equal values. A key absent on either side is no match —
    //    malformed keys degrade to append, never fail.
    if !keys.is_empty() {
        return dom.iter().enumerate().position(|(i, dc)| {
            unconsumed(&i) && dc.name() == rc.name() && keys_match(dc, rc, keys)
        });
    }

    // 3. positional pairing among same-named children
    dom.iter()
        .enumerate()
        .position(|(i, dc)| unconsumed(&i) && dc.name() == rc.name())
}

fn keys_match(dc: &Element, rc: &Element, keys: &[String]) -> bool {
    keys.iter().all(|k| match (dc.attribute(k), rc.attribute(k)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::collections::BTreeMap;

    use proptest::prelude::{prop, prop_assert_eq, proptest, Strategy};

    use super::*;
    use crate::xml::{parse, parse_with_source};

    #[test]
    fn merge_opt_returns_other_side_when_one_is_absent() {
        let t = parse("<config><item>x</item></config>").unwrap();
        assert_eq!(merge_opt(Some(&t), None).as_ref(), Some(&t));
        assert_eq!(merge_opt(None, Some(&t)).as_ref(), Some(&t));
        assert!(merge_opt(None, None).is_none());
    }

    #[test]
    fn dominant_text_always_wins() {
        let d = parse("<parameter>dominant</parameter>").unwrap();
        let r = parse("<parameter>recessive</parameter>").unwrap();
        assert_eq!(merge(&d, &r).value(), Some("dominant"));
    }

    #[test]
    fn dominant_empty_element_masks_recessive_text() {
        let d = parse("<parameter></parameter>").unwrap();
        let r = parse("<parameter>recessive</parameter>").unwrap();
        assert_eq!(merge(&d, &r).value(), Some(""));
    }

    #[test]
    fn dominant_self_closed_element_propagates_null() {
        let d = parse("<parameter/>").unwrap();
        let r = parse("<parameter>recessive</parameter>").unwrap();
        assert_eq!(merge(&d, &r).value(), None);
    }

    #[test]
    fn dominant_preserved_blank_value_wins() {
        let d = parse("<parameter xml:space=\"preserve\"> </parameter>").unwrap();
        let r = parse("<parameter>recessive</parameter>").unwrap();
        let m = merge(&d, &r);
        assert_eq!(m.value(), Some(" "));
        assert!(m.preserve_space());
    }

    #[test]
    fn attribute_union_dominant_wins_on_collision() {
        let d = parse("<item scope=\"test\" keep=\"d\"/>").unwrap();
        let r = parse("<item scope=\"runtime\" extra=\"r\"/>").unwrap();
        let m = merge(&d, &r);
        assert_eq!(m.attribute("scope"), Some("test"));
        assert_eq!(m.attribute("keep"), Some("d"));
        assert_eq!(m.attribute("extra"), Some("r"));
    }

    #[test]
    fn directives_are_stripped_from_output() {
        let d = parse("<items combine.children=\"append\"><item>a</item></items>").unwrap();
        let r = parse("<items><item>b</item></items>").unwrap();
        let m = merge(&d, &r);
        assert!(m.directives().is_default());
        assert_eq!(m.attribute("combine.children"), None);
    }

    #[test]
    fn append_mode_concatenates_dominant_then_recessive() {
        let d =
            parse("<items combine.children=\"append\"><item>one</item><item>two</item></items>")
                .unwrap();
        let r = parse("<items><item>three</item><item>four</item></items>").unwrap();
        let m = merge(&d, &r);
        let values: Vec<_> = m.children().iter().map(|c| c.value().unwrap()).collect();
        assert_eq!(values, vec!["one", "two", "three", "four"]);
    }

    #[test]
    fn append_merge_with_self_doubles_children() {
        let t =
            parse("<items combine.children=\"append\"><item>one</item><item>two</item></items>")
                .unwrap();
        let m = merge(&t, &t);
        let values: Vec<_> = m.children().iter().map(|c| c.value().unwrap()).collect();
        assert_eq!(values, vec!["one", "two", "one", "two"]);
    }

    #[test]
    fn default_merge_with_self_is_idempotent() {
        let t = parse(
            "<config><plugins><plugin><id>a</id><options><opt>1</opt><opt>2</opt></options>\
             </plugin></plugins><flag/></config>",
        )
        .unwrap();
        assert_eq!(merge(&t, &t), t);
    }

    #[test]
    fn self_override_masks_everything() {
        let d = parse("<item combine.self=\"override\" a=\"d\"><keep>me</keep></item>").unwrap();
        let r = parse("<item a=\"r\" b=\"r\"><keep>other</keep><extra>x</extra></item>").unwrap();
        let m = merge(&d, &r);
        assert_eq!(m.attribute("a"), Some("d"));
        assert_eq!(m.attribute("b"), None);
        assert_eq!(m.children().len(), 1);
        assert_eq!(m.child("keep").unwrap().value(), Some("me"));
    }

    #[test]
    fn combine_id_matches_regardless_of_position() {
        let d = parse_with_source(
            "<props>\
             <property combine.id=\"LHS-ONLY\"><name>LHS-ONLY</name><value>LHS</value></property>\
             <property combine.id=\"TOOVERWRITE\"><name>TOOVERWRITE</name><value>LHS</value></property>\
             </props>",
            "left",
        )
        .unwrap();
        let r = parse_with_source(
            "<props>\
             <property combine.id=\"RHS-ONLY\"><name>RHS-ONLY</name><value>RHS</value></property>\
             <property combine.id=\"TOOVERWRITE\"><name>TOOVERWRITE</name><value>RHS</value></property>\
             </props>",
            "right",
        )
        .unwrap();

        let m = merge(&d, &r);
        let props: Vec<_> = m.children_named("property").collect();
        assert_eq!(props.len(), 3);

        // dominant children first, in dominant order
        assert_eq!(props[0].child("name").unwrap().value(), Some("LHS-ONLY"));
        assert_eq!(props[1].child("name").unwrap().value(), Some("TOOVERWRITE"));
        assert_eq!(props[1].child("value").unwrap().value(), Some("LHS"));
        // unmatched recessive children appended at the end
        assert_eq!(props[2].child("name").unwrap().value(), Some("RHS-ONLY"));
        assert_eq!(props[2].child("value").unwrap().value(), Some("RHS"));
    }

    #[test]
    fn combine_keys_matches_by_attribute_values() {
        let d = parse(
            "<deps combine.keys=\"group,name\">\
             <dep group=\"g1\" name=\"a\"><version>2.0</version></dep>\
             </deps>",
        )
        .unwrap();
        let r = parse(
            "<deps>\
             <dep group=\"g1\" name=\"a\"><version>1.0</version><scope>test</scope></dep>\
             <dep group=\"g1\" name=\"b\"><version>1.0</version></dep>\
             </deps>",
        )
        .unwrap();

        let m = merge(&d, &r);
        let deps: Vec<_> = m.children_named("dep").collect();
        assert_eq!(deps.len(), 2);

        // matched pair merged: dominant version wins, recessive scope inherited
        assert_eq!(deps[0].attribute("name"), Some("a"));
        assert_eq!(deps[0].child("version").unwrap().value(), Some("2.0"));
        assert_eq!(deps[0].child("scope").unwrap().value(), Some("test"));
        // unmatched recessive dep appended
        assert_eq!(deps[1].attribute("name"), Some("b"));
    }

    #[test]
    fn combine_keys_missing_attribute_is_no_match() {
        // the key references an attribute neither child carries — both sides
        // absent must NOT match; the recessive child is appended instead
        let d = parse("<props combine.keys=\"key\"><property><value>LHS</value></property></props>")
            .unwrap();
        let r = parse("<props><property><value>RHS</value></property></props>").unwrap();

        let m = merge(&d, &r);
        let props: Vec<_> = m.children_named("property").collect();
        assert_eq!(props.len(), 2);
        assert_eq!(props[0].child("value").unwrap().value(), Some("LHS"));
        assert_eq!(props[1].child("value").unwrap().value(), Some("RHS"));
    }

    #[test]
    fn positional_pairing_merges_same_named_children_in_order() {
        let d = parse("<list><entry>d1</entry><entry>d2</entry></list>").unwrap();
        let r = parse("<list><entry>r1</entry><entry>r2</entry><entry>r3</entry></list>").unwrap();
        let m = merge(&d, &r);
        let values: Vec<_> = m.children().iter().map(|c| c.value().unwrap()).collect();
        // d1/r1 and d2/r2 pair (dominant text wins); r3 is unmatched, appended
        assert_eq!(values, vec!["d1", "d2", "r3"]);
    }

    #[test]
    fn unmatched_recessive_children_append_in_original_order() {
        let d = parse("<config><known>d</known></config>").unwrap();
        let r = parse("<config><first>1</first><known>r</known><second>2</second></config>")
            .unwrap();
        let m = merge(&d, &r);
        let names: Vec<_> = m.children().iter().map(|c| c.name().to_owned()).collect();
        assert_eq!(names, vec!["known", "first", "second"]);
    }

    #[test]
    fn self_remove_deletes_matched_child() {
        let d = parse("<config><service combine.self=\"remove\"/></config>").unwrap();
        let r = parse("<config><service><port>8080</port></service></config>").unwrap();
        let m = merge(&d, &r);
        assert!(m.child("service").is_none());
    }

    #[test]
    fn self_remove_without_counterpart_is_dropped() {
        let d = parse("<config><service combine.self=\"remove\"/><keep>x</keep></config>").unwrap();
        let r = parse("<config><keep>y</keep></config>").unwrap();
        let m = merge(&d, &r);
        assert!(m.child("service").is_none());
        assert_eq!(m.child("keep").unwrap().value(), Some("x"));
    }

    #[test]
    fn children_override_forces_append() {
        let d = parse("<items><item>a</item></items>").unwrap();
        let r = parse("<items><item>b</item></items>").unwrap();
        let m = merge_with(&d, &r, Some(ChildrenMode::Append));
        assert_eq!(m.children().len(), 2);
    }

    #[test]
    fn provenance_follows_the_surviving_side() {
        let d = parse_with_source("<config><shared>d</shared></config>", "left").unwrap();
        let r = parse_with_source(
            "<config><shared>r</shared><inherited>only</inherited></config>",
            "right",
        )
        .unwrap();
        let m = merge(&d, &r);
        assert_eq!(m.source(), Some("left"));
        assert_eq!(m.child("shared").unwrap().source(), Some("left"));
        assert_eq!(m.child("inherited").unwrap().source(), Some("right"));
    }

    #[test]
    fn nested_subtree_merge() {
        let d = parse(
            "<configuration><compiler><release>17</release></compiler></configuration>",
        )
        .unwrap();
        let r = parse(
            "<configuration><compiler><release>11</release><debug>true</debug></compiler>\
             <encoding>UTF-8</encoding></configuration>",
        )
        .unwrap();
        let m = merge(&d, &r);
        let compiler = m.child("compiler").unwrap();
        assert_eq!(compiler.child("release").unwrap().value(), Some("17"));
        assert_eq!(compiler.child("debug").unwrap().value(), Some("true"));
        assert_eq!(m.child("encoding").unwrap().value(), Some("UTF-8"));
    }

    // A directive-free tree strategy for algebraic properties.
    fn arb_tree() -> impl Strategy<Value = Element> {
        let leaf = ("[a-z]{1,6}", prop::option::of("[a-z0-9]{0,5}")).prop_map(|(name, value)| {
            Element::new(name, value, BTreeMap::new(), Vec::new(), None)
        });
        leaf.prop_recursive(3, 16, 4, |inner| {
            ("[a-z]{1,6}", prop::collection::vec(inner, 0..4)).prop_map(|(name, children)| {
                Element::new(name, None, BTreeMap::new(), children, None)
            })
        })
    }

    proptest! {
        #[test]
        fn merge_with_self_is_idempotent(tree in arb_tree()) {
            prop_assert_eq!(merge(&tree, &tree), tree);
        }

        #[test]
        fn merge_never_loses_dominant_children(d in arb_tree(), r in arb_tree()) {
            // every dominant child name must still be present in the result
            let m = merge_with(&d, &r, None);
            for child in d.children() {
                prop_assert_eq!(m.child(child.name()).is_some(), true);
            }
        }
    }
}
