use labelflow::{CompileConfig, InstrumentConfig, compile};
use proptest::prelude::*;

fn label_name() -> impl Strategy<Value = String> {
    "[A-Z][a-zA-Z0-9]{0,6}".prop_filter("annotation keyword", |s| {
        !matches!(s.as_str(), "SecAnn" | "Extends")
    })
}

fn label_list() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(label_name(), 1..5)
}

fn list_text(labels: &[String]) -> String {
    format!("<!{}!>", labels.join(" * "))
}

/// One parameter annotation suffix, or none.
fn param_annotation() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        label_list().prop_map(|l| format!(" :{}", list_text(&l))),
        label_list().prop_map(|l| format!(" :Number {}", list_text(&l))),
        label_list().prop_map(|l| format!(" :A {}", list_text(&l))),
        label_list().prop_map(|l| format!(" :S['k', {}]", list_text(&l))),
        label_list().prop_map(|l| format!(" :E[1, {}]", list_text(&l))),
    ]
}

/// Postfix `as`/`drop` operators.
fn label_ops() -> impl Strategy<Value = String> {
    prop::collection::vec((prop::bool::ANY, label_list()), 0..3).prop_map(|ops| {
        ops.iter()
            .map(|(drop, l)| format!(" {} {}", if *drop { "drop" } else { "as" }, list_text(l)))
            .collect()
    })
}

fn disabled() -> CompileConfig {
    CompileConfig {
        instrument: InstrumentConfig::disabled(),
        prelude: None,
    }
}

proptest! {
    #[test]
    fn declared_label_order_is_preserved(labels in label_list()) {
        let out = compile(&format!("SecAnn {};", list_text(&labels)), &CompileConfig::default()).unwrap();
        prop_assert_eq!(out, format!("SecurityAnnotation.declare(\"{}\");\n", labels.join(" * ")));
    }

    #[test]
    fn parameter_checks_follow_label_order(labels in label_list()) {
        let src = format!("function f(a :{}) {{}}", list_text(&labels));
        let out = compile(&src, &CompileConfig::default()).unwrap();
        let expected: String = labels
            .iter()
            .map(|l| format!("    SecurityAnnotation.assert(a, \"{l}\");\n"))
            .collect();
        prop_assert_eq!(out, format!("function f(a) {{\n{expected}}}\n"));
    }

    #[test]
    fn disabled_mode_matches_the_stripped_program(
        params in prop::collection::vec(param_annotation(), 1..4),
        ret in prop::option::of(label_list()),
        ops in label_ops(),
    ) {
        let names: Vec<String> = (0..params.len()).map(|i| format!("p{i}")).collect();
        let annotated_params: Vec<String> =
            names.iter().zip(&params).map(|(n, a)| format!("{n}{a}")).collect();
        let ret = ret.map(|l| format!(" :{}", list_text(&l))).unwrap_or_default();

        let annotated = format!(
            "function f({}){ret} {{\n    var t = p0{ops};\n    return t;\n}}\n",
            annotated_params.join(", ")
        );
        let stripped = format!(
            "function f({}) {{\n    var t = p0;\n    return t;\n}}\n",
            names.join(", ")
        );

        let left = compile(&annotated, &disabled()).unwrap();
        let right = compile(&stripped, &disabled()).unwrap();
        prop_assert_eq!(left, right);
    }

    #[test]
    fn each_return_site_is_checked_once(returns in 1usize..6) {
        let body: String = (0..returns)
            .map(|i| format!("    if (x == {i}) {{\n        return {i};\n    }}\n"))
            .collect();
        let src = format!("function f(x) :<!R!> {{\n{body}}}\n");
        let out = compile(&src, &CompileConfig::default()).unwrap();
        prop_assert_eq!(out.matches("SecurityAnnotation.assert(").count(), returns + 1);
        prop_assert_eq!(out.matches("SecurityAnnotation.assert(undefined, \"R\");").count(), 1);
    }
}
