// pathexpr - Scene-graph path expressions and predicate matching
// Copyright (c) 2025 pathexpr contributors
// Licensed under the MIT License

//! # pathexpr
//!
//! Path expressions select sets of scene-graph paths with glob patterns,
//! stretches (`//`), embedded predicates (`{isa:Mesh}`) and set algebra
//! (`+`, `&`, `-`, `~`, and whitespace for implied union).
//!
//! ```
//! use pathexpr::{functions, PathExpression, PathExpressionEval};
//!
//! let expr = PathExpression::new("/World//{name:Mesh*} - /World/Proxies//");
//! let eval = PathExpressionEval::new(&expr, &functions::path_library()).unwrap();
//!
//! let hit = eval.match_path(&"/World/set/Mesh_01".parse().unwrap());
//! assert!(hit.value());
//!
//! // A constant result also holds for every descendant, so a traversal can
//! // stop descending.
//! let miss = eval.match_path(&"/Other".parse().unwrap());
//! assert!(!miss.value() && miss.is_constant());
//! ```
//!
//! ## Architecture
//!
//! - `parser` - Predicate expression parser (`not`, `and`, `or`, calls)
//! - `ast` - Predicate expression tree
//! - `signature` - Parameter names, defaults and argument binding
//! - `library` - Predicate function registry and linking
//! - `path` - Path value type
//! - `pattern` - Path patterns
//! - `expression` - Path expression tree and algebra
//! - `path_parser` - Path expression parser
//! - `vm` - Short-circuit logic interpreter
//! - `compiler` - Lowers expressions to logic programs
//! - `matcher` - Compiled patterns and incremental search state
//! - `evaluator` - Compiled path expressions and incremental search
//! - `functions` - Stock path predicates
//! - `utils` - Identifier checks, glob translation, quoting

pub mod ast;
pub mod compiler;
pub mod evaluator;
pub mod expression;
pub mod functions;
pub mod library;
mod matcher;
pub mod parser;
pub mod path;
pub mod path_parser;
pub mod pattern;
pub mod result;
pub mod signature;
pub mod utils;
pub mod value;
mod vm;

#[cfg(feature = "python")]
mod python;

pub use ast::{FnArg, FnCall, FnCallKind, PredicateExpression, PredicateNode, PredicateOp};
pub use compiler::CompileError;
pub use evaluator::{IncrementalSearcher, PathExpressionEval};
pub use expression::{ExprNode, ExpressionOp, ExpressionReference, PathExpression};
pub use library::{
    link, BindError, ExtraArgs, LinkError, PredicateFunction, PredicateLibrary, PredicateProgram,
};
pub use path::{Path, PathError};
pub use path_parser::PathParseError;
pub use pattern::PathPattern;
pub use result::{Constancy, PredicateFunctionResult};
pub use signature::{Param, ParamNamesAndDefaults, SignatureError};
pub use value::Value;
pub use vm::Visit;

/// Internal entry points for the criterion benches.
#[cfg(feature = "bench")]
pub mod _bench {
    use crate::{PathExpression, PredicateExpression};

    /// Instruction count of a compiled path expression, or `None` if it is
    /// incomplete.
    pub fn compile_expression_len(expr: &PathExpression) -> Option<usize> {
        crate::compiler::compile_expression(expr)
            .ok()
            .map(|(program, _)| program.instrs.len())
    }

    pub fn compile_predicate_len(expr: &PredicateExpression) -> usize {
        crate::compiler::compile_predicate(expr).0.instrs.len()
    }
}
