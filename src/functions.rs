// Stock predicate functions over paths

use std::sync::Arc;

use regex::Regex;

use crate::ast::FnArg;
use crate::library::{BindError, PredicateFunction, PredicateLibrary};
use crate::path::Path;
use crate::result::PredicateFunctionResult;
use crate::signature::Param;
use crate::utils::glob_to_regex;

/// A library of predicates that need nothing but the path:
///
/// - `isPrim`, `isProperty`
/// - `name:glob1,glob2,...`: the final element's name matches any glob
/// - `depth(min=0, max=...)`: element count within `[min, max]`
pub fn path_library() -> PredicateLibrary<Path> {
    let mut lib = PredicateLibrary::new();
    lib.define("isPrim", |p: &Path| p.is_prim_path())
        .define("isProperty", |p: &Path| p.is_property_path())
        .define_binder("name", bind_name)
        .define_with_params("depth", depth, vec![Param::with_default("min", 0i64), Param::with_default("max", i64::MAX)]);
    lib
}

/// Globs are compiled once, at link time.
fn bind_name(args: &[FnArg]) -> Result<PredicateFunction<Path>, BindError> {
    if args.is_empty() {
        return Err(BindError::TooFewArguments { min: 1, given: 0 });
    }

    let mut regexes = Vec::with_capacity(args.len());
    for arg in args {
        let glob = arg
            .value
            .as_str()
            .ok_or_else(|| BindError::Declined(format!("name expects glob strings, got {}", arg.value.to_source())))?;
        let regex = Regex::new(&glob_to_regex(glob))
            .map_err(|e| BindError::Declined(format!("invalid glob '{}': {}", glob, e)))?;
        regexes.push(regex);
    }

    Ok(Arc::new(move |p: &Path| {
        let name = p.name();
        PredicateFunctionResult::from(regexes.iter().any(|re| re.is_match(name)))
    }))
}

fn depth(p: &Path, min: i64, max: i64) -> PredicateFunctionResult {
    let depth = i64::try_from(p.element_count()).unwrap_or(i64::MAX);
    if depth > max {
        // Descendants are deeper still.
        return PredicateFunctionResult::make_constant(false);
    }
    PredicateFunctionResult::make_varying(depth >= min)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::PredicateExpression;

    fn call(text: &str, path: &str) -> PredicateFunctionResult {
        let program = path_library().link(&PredicateExpression::new(text)).unwrap();
        program.call(&Path::parse(path).unwrap())
    }

    #[test]
    fn test_kind_predicates() {
        assert!(call("isPrim", "/a/b").value());
        assert!(!call("isPrim", "/a.b").value());
        assert!(call("isProperty", "/a.b").value());
        assert!(call("not isProperty", "/").value());
    }

    #[test]
    fn test_name() {
        assert!(call("name:Mesh*", "/World/Mesh1").value());
        assert!(call("name:Cube,Mesh*", "/World/Cube").value());
        assert!(call("name:p*", "/World/Mesh.points").value());
        assert!(!call("name:Mesh*", "/World/Cube").value());
        assert!(path_library().link(&PredicateExpression::new("name")).is_err());
        assert!(path_library().link(&PredicateExpression::new("name:1")).is_err());
    }

    #[test]
    fn test_depth() {
        assert!(call("depth(min=2)", "/a/b").value());
        assert!(!call("depth(min=3)", "/a/b").value());
        assert!(call("depth(1, 2)", "/a").value());
        assert_eq!(call("depth(max=1)", "/a/b"), PredicateFunctionResult::make_constant(false));
        assert!(path_library().link(&PredicateExpression::new("depth(deep=1)")).is_err());
    }
}
