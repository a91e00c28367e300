// Integration tests for parsing, composition, compilation and matching
//
// These tests drive the public API end to end: text in, match results out.

use pathexpr::{
    functions::path_library, link, ExtraArgs, Param, Path, PathExpression, PathExpressionEval, PathPattern,
    PredicateExpression, PredicateFunctionResult, PredicateLibrary,
};
use tracing_test::traced_test;

fn path(text: &str) -> Path {
    text.parse().unwrap()
}

fn compile(text: &str) -> PathExpressionEval<Path> {
    let expr = PathExpression::new(text);
    assert!(expr.parse_error().is_none(), "{}: {:?}", text, expr.parse_error());
    PathExpressionEval::new(&expr, &path_library()).unwrap()
}

fn matching<'a>(eval: &PathExpressionEval<Path>, paths: &[&'a str]) -> Vec<&'a str> {
    paths
        .iter()
        .copied()
        .filter(|p| eval.match_path(&path(p)).value())
        .collect()
}

/// Every path of a small hierarchy, in depth-first order.
fn hierarchy() -> Vec<Path> {
    fn visit(parent: Path, depth: usize, out: &mut Vec<Path>) {
        if depth < 4 {
            for name in ["a", "b", "geo", "Mesh1"] {
                if let Some(child) = parent.append_child(name) {
                    out.push(child.clone());
                    if let Some(prop) = child.append_property("points") {
                        out.push(prop);
                    }
                    visit(child, depth + 1, out);
                }
            }
        }
    }
    let mut out = vec![Path::absolute_root()];
    visit(Path::absolute_root(), 0, &mut out);
    out
}

// ── Round trips ─────────────────────────────────────────────────────────────

#[test]
fn test_printing_is_stable() {
    let expressions = [
        "/a /b /c /d/e/f",
        "/foo//bar",
        "/a// - /a/b/c",
        "~/World//Mesh* & (/World/set + %/lib:extras)",
        "//{isPrim and not name:Hidden*}",
        "/World/*.points /World//.size{depth(max=3)}",
        "%_ (.//geo - ../proxy*)",
        "//{isPrim (isProperty or name:a*)}",
    ];
    for text in expressions {
        let first = PathExpression::new(text);
        assert!(first.parse_error().is_none(), "{}", text);
        let reparsed = PathExpression::new(&first.text());
        assert_eq!(reparsed.text(), first.text(), "{}", text);
        assert_eq!(reparsed, first, "{}", text);
    }

    for text in [
        "isPrim",
        "not a and b or c",
        "f(1, x=2.5, y=\"s t\") g:-inf,true",
        "(a or b) c",
        "a (b or c)",
        "not a (b c)",
        "f:1 (a or b)",
    ] {
        let first = PredicateExpression::new(text);
        assert!(first.parse_error().is_none(), "{}", text);
        assert_eq!(PredicateExpression::new(&first.text()).text(), first.text(), "{}", text);
    }

    for text in ["/a/b*//c{isPrim}", ".//", "//", "../x?.p[ab]"] {
        let first: PathPattern = text.parse().unwrap();
        let second: PathPattern = first.text().parse().unwrap();
        assert_eq!(second.text(), first.text(), "{}", text);
    }
}

#[test]
fn test_parse_failure_keeps_error_text() {
    let expr = PathExpression::new("/a + (");
    assert!(expr.is_empty());
    assert!(expr.parse_error().is_some());

    let eval = PathExpressionEval::new(&expr, &path_library()).unwrap();
    assert!(!eval.match_path(&path("/a")).value());
}

// ── Algebra ─────────────────────────────────────────────────────────────────

#[test]
fn test_algebraic_identities() {
    use pathexpr::ExpressionOp::*;

    let x = PathExpression::new("/x/y*");
    assert_eq!(
        PathExpression::make_op(Intersection, PathExpression::nothing(), x.clone()),
        PathExpression::nothing()
    );
    assert_eq!(
        PathExpression::make_op(Union, PathExpression::everything(), x.clone()),
        PathExpression::everything()
    );
    assert_eq!(
        PathExpression::make_complement(PathExpression::make_complement(x.clone())),
        x
    );
    assert_eq!(
        PathExpression::nothing().compose_over(&PathExpression::nothing()),
        PathExpression::nothing()
    );
    assert_eq!(PathExpression::nothing().compose_over(&x), x);
}

#[test]
fn test_compose_over_chain() {
    let a = PathExpression::new("/a");
    let b = PathExpression::new("%_ /b");
    let c = PathExpression::new("%_ /c");

    let composed = c.compose_over(&b).compose_over(&a);
    assert!(!composed.contains_expression_references());
    assert!(composed.is_complete());

    let eval = PathExpressionEval::new(&composed, &path_library()).unwrap();
    let candidates = ["/a", "/b", "/c", "/d", "/a/b", "/"];
    assert_eq!(matching(&eval, &candidates), vec!["/a", "/b", "/c"]);
}

#[test]
fn test_resolve_named_references() {
    let expr = PathExpression::new("%/lib:geo - %/lib:hidden");
    let resolved = expr.resolve_references(|r| match r.name.as_str() {
        "geo" => PathExpression::new("/World//"),
        "hidden" => PathExpression::new("/World/Proxy//"),
        _ => PathExpression::nothing(),
    });
    let eval = PathExpressionEval::new(&resolved, &path_library()).unwrap();
    assert!(eval.match_path(&path("/World/set/Mesh")).value());
    assert!(!eval.match_path(&path("/World/Proxy/Mesh")).value());
}

#[test]
fn test_make_absolute_then_compile() {
    let expr = PathExpression::new("geo//{isPrim} - geo/skip");
    assert!(!expr.is_complete());
    let absolute = expr.make_absolute(&path("/World"));
    assert!(absolute.is_complete());
    assert_eq!(absolute.text(), "/World/geo//{isPrim} - /World/geo/skip");

    let eval = PathExpressionEval::new(&absolute, &path_library()).unwrap();
    assert!(eval.match_path(&path("/World/geo/a")).value());
    assert!(!eval.match_path(&path("/World/geo/skip")).value());
    assert!(!eval.match_path(&path("/World/geo/a.attr")).value());
}

// ── Matching ────────────────────────────────────────────────────────────────

#[test]
fn test_matching_scenarios() {
    let eval = compile("/foo//bar");
    assert_eq!(
        matching(
            &eval,
            &["/foo/bar", "/foo/x/bar", "/foo/x/y/z/bar", "/foo/x/y/z/bar/baz", "/foo.bar"]
        ),
        vec!["/foo/bar", "/foo/x/bar", "/foo/x/y/z/bar"]
    );

    let eval = compile("/foo/bar/*");
    assert_eq!(
        matching(&eval, &["/foo/bar/x", "/foo/bar/y", "/foo/bar", "/foo/bar/x/y"]),
        vec!["/foo/bar/x", "/foo/bar/y"]
    );

    let eval = compile("/a// - /a/b/c");
    assert_eq!(
        matching(&eval, &["/a", "/a/b", "/a/b/c/d", "/a/b/x", "/a/b/c"]),
        vec!["/a", "/a/b", "/a/b/c/d", "/a/b/x"]
    );

    let eval = compile("/a /b /c /d/e/f");
    assert_eq!(
        matching(&eval, &["/a", "/b", "/c", "/d/e/f", "/a/b", "/d/e", "/c/x"]),
        vec!["/a", "/b", "/c", "/d/e/f"]
    );
}

#[test]
fn test_everything_and_nothing() {
    let everything = PathExpressionEval::new(&PathExpression::everything(), &path_library()).unwrap();
    let nothing = PathExpressionEval::new(&PathExpression::nothing(), &path_library()).unwrap();
    for p in hierarchy() {
        assert!(everything.match_path(&p).value(), "{}", p);
        assert!(!nothing.match_path(&p).value(), "{}", p);
    }
}

#[test]
fn test_constancy_for_trailing_stretch() {
    let eval = compile("/prefix/path//");
    assert_eq!(eval.match_path(&path("/prefix")), PredicateFunctionResult::make_varying(false));
    assert_eq!(eval.match_path(&path("/prefix/path")), PredicateFunctionResult::make_constant(true));
    assert_eq!(eval.match_path(&path("/prefix/wrong")), PredicateFunctionResult::make_constant(false));
}

#[test]
fn test_predicates_in_patterns() {
    let eval = compile("/World//{name:Mesh*}.points");
    assert!(eval.match_path(&path("/World/Mesh1.points")).value());
    assert!(eval.match_path(&path("/World/a/b/Mesh2.points")).value());
    assert!(!eval.match_path(&path("/World/Cube.points")).value());
    assert!(!eval.match_path(&path("/World/Mesh1")).value());

    let eval = compile("//*{depth(min=2, max=2)}");
    assert_eq!(matching(&eval, &["/a", "/a/b", "/a/b/c"]), vec!["/a/b"]);

    let eval = compile("//{isPrim (name:a* or name:b*)}");
    assert_eq!(matching(&eval, &["/x", "/x/b1", "/a", "/a.b"]), vec!["/x/b1", "/a"]);

    let eval = compile("/a/[!b]x");
    assert_eq!(matching(&eval, &["/a/bx", "/a/cx"]), vec!["/a/cx"]);
    assert!(PathExpression::new("/a/[^b]x").parse_error().is_some());

    let eval = compile("//{name:[^b]x}");
    assert_eq!(matching(&eval, &["/a/bx", "/a/cx"]), vec!["/a/cx"]);
}

#[test]
fn test_custom_domain_objects() {
    #[derive(Clone)]
    struct Prim {
        kind: &'static str,
    }

    let mut lib: PredicateLibrary<Prim> = PredicateLibrary::new();
    lib.define("isa", |prim: &Prim, kind: String| prim.kind == kind);

    let eval = PathExpressionEval::new(&PathExpression::new("/World//{isa:Mesh}"), &lib).unwrap();
    let stage = |p: &Path| Prim {
        kind: if p.name().starts_with("geo") { "Mesh" } else { "Xform" },
    };
    assert!(eval.matches(&path("/World/set/geo1"), stage).value());
    assert!(!eval.matches(&path("/World/set"), stage).value());
}

// ── Incremental search ──────────────────────────────────────────────────────

#[test]
fn test_incremental_search_agrees_with_match() {
    let expressions = [
        "//",
        "/a//geo",
        "/a//geo//Mesh*",
        "/b/*/Mesh1 /a/geo",
        "//Mesh1.points",
        "/a// - /a/b// + //geo{depth(max=3)}",
        "~(/a//) & //b/*",
        "//{name:geo}//{name:M*}",
        "/a/b*//",
    ];
    let paths = hierarchy();
    for text in expressions {
        let eval = compile(text);
        let mut searcher = eval.path_searcher();
        for p in &paths {
            assert_eq!(
                searcher.next(p).value(),
                eval.match_path(p).value(),
                "{} at {}",
                text,
                p
            );
        }
    }
}

#[test]
fn test_incremental_search_constant_subtrees() {
    let eval = compile("/a/geo//");
    let mut searcher = eval.path_searcher();
    assert!(!searcher.next(&path("/")).value());
    assert!(!searcher.next(&path("/a")).value());
    assert_eq!(searcher.next(&path("/a/geo")), PredicateFunctionResult::make_constant(true));
    assert_eq!(searcher.next(&path("/a/geo/x")), PredicateFunctionResult::make_constant(true));
    assert_eq!(searcher.next(&path("/a/geo/x.points")), PredicateFunctionResult::make_constant(true));
    assert_eq!(searcher.next(&path("/a/other")), PredicateFunctionResult::make_constant(false));
}

// ── Linking ─────────────────────────────────────────────────────────────────

#[test]
#[traced_test]
fn test_link_failures_are_reported() {
    let mut lib: PredicateLibrary<Path> = PredicateLibrary::new();
    lib.define("noArgs", |_: &Path| true)
        .define("needsArg", |_: &Path, n: i64| n > 0)
        .define_with_params("keyword", |_: &Path, value: i64| value > 0, vec![Param::new("value")])
        .define("anyArgs", |_: &Path, rest: ExtraArgs| !rest.0.is_empty());

    for text in ["noArgs:1", "needsArg", "keyword(other=1)", "keyword(1, value=2)", "unknown"] {
        let expr = PredicateExpression::new(text);
        assert!(expr.parse_error().is_none(), "{}", text);
        let err = link(&expr, &lib).unwrap_err();
        assert!(!err.failures.is_empty(), "{}", text);
        assert!(!err.failures[0].errors.is_empty(), "{}", text);
        let program = link(&expr, &lib).unwrap_or_default();
        assert!(!program.is_valid(), "{}", text);
    }
    assert!(logs_contain("Failed to bind call of"));

    for text in ["noArgs", "needsArg:2", "keyword(value=1)", "keyword:1", "anyArgs:x,y"] {
        let program = link(&PredicateExpression::new(text), &lib).unwrap();
        assert!(program.is_valid(), "{}", text);
        assert!(program.call(&path("/a")).value(), "{}", text);
    }
}

// ── Pattern editing ─────────────────────────────────────────────────────────

#[test]
fn test_pattern_editing_is_idempotent() {
    for text in ["/a//", "/a/b*//", "//"] {
        let original: PathPattern = text.parse().unwrap();
        let mut edited = original.clone();
        edited.remove_trailing_stretch().append_stretch_if_possible();
        assert_eq!(edited, original, "{}", text);
        edited.append_stretch_if_possible();
        assert_eq!(edited, original, "{}", text);
    }

    let mut pattern: PathPattern = "/a//b*{isPrim}/c.p*".parse().unwrap();
    let prefix = pattern.prefix().clone();
    for _ in 0..10 {
        pattern.remove_trailing_component();
    }
    assert!(pattern.components().is_empty());
    assert!(pattern.predicate_exprs().is_empty());
    assert!(!pattern.is_property());
    assert_eq!(pattern.prefix(), &prefix);
    assert_eq!(pattern.text(), "/a");
}

#[test]
#[traced_test]
fn test_invalid_pattern_edits_warn() {
    let mut pattern: PathPattern = "/a/b.size".parse().unwrap();
    pattern.append_child("c");
    assert_eq!(pattern.text(), "/a/b.size");
    assert!(logs_contain("Cannot append child"));
}

#[test]
#[traced_test]
fn test_unsupported_paths_warn() {
    let eval = compile("//");
    let result = eval.match_path(&path("relative/path"));
    assert_eq!(result, PredicateFunctionResult::make_constant(false));
    assert!(logs_contain("Unsupported path"));
}

#[test]
fn test_expressions_serialize() {
    let expr = PathExpression::new("/World//{isPrim} - %_");
    let json = serde_json::to_string(&expr).unwrap();
    let back: PathExpression = serde_json::from_str(&json).unwrap();
    assert_eq!(back, expr);
}
