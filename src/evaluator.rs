// Path expression evaluator
//
// Compiles a complete `PathExpression` into a logic program over compiled
// patterns, then answers match queries one path at a time or incrementally
// over a depth-first traversal.

use std::fmt;

use tracing::debug;

use crate::compiler::{compile_expression, CompileError};
use crate::expression::PathExpression;
use crate::library::PredicateLibrary;
use crate::matcher::{PatternImpl, PatternIncrSearchState};
use crate::path::Path;
use crate::result::PredicateFunctionResult;
use crate::vm::{LogicProgram, Visit};

/// A compiled path expression over domain objects of type `D`.
///
/// Matching takes a `path_to_obj` function that produces the object a
/// pattern predicate is evaluated on. The evaluator itself is immutable and
/// can be shared; incremental searchers hold the mutable state.
///
/// # Examples
///
/// ```
/// use pathexpr::{functions, Path, PathExpression, PathExpressionEval};
///
/// let expr = PathExpression::new("/World//Mesh* - /World/Hidden//");
/// let eval = PathExpressionEval::new(&expr, &functions::path_library()).unwrap();
///
/// assert!(eval.match_path(&"/World/a/Mesh1".parse().unwrap()).value());
/// assert!(!eval.match_path(&"/World/Hidden/Mesh1".parse().unwrap()).value());
/// ```
pub struct PathExpressionEval<D> {
    program: LogicProgram,
    patterns: Vec<PatternImpl<D>>,
}

impl<D> Clone for PathExpressionEval<D> {
    fn clone(&self) -> Self {
        PathExpressionEval {
            program: self.program.clone(),
            patterns: self.patterns.clone(),
        }
    }
}

impl<D> Default for PathExpressionEval<D> {
    fn default() -> Self {
        PathExpressionEval {
            program: LogicProgram::default(),
            patterns: Vec::new(),
        }
    }
}

impl<D> fmt::Debug for PathExpressionEval<D> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PathExpressionEval")
            .field("instrs", &self.program.instrs)
            .field("patterns", &self.patterns)
            .finish()
    }
}

impl<D: 'static> PathExpressionEval<D> {
    /// Compile `expr`, linking pattern predicates against `library`.
    ///
    /// The expression must be complete: no references and only absolute
    /// paths. The empty expression compiles to an evaluator that matches
    /// nothing.
    pub fn new(expr: &PathExpression, library: &PredicateLibrary<D>) -> Result<Self, CompileError> {
        let (program, patterns) = compile_expression(expr)?;
        let patterns = patterns
            .into_iter()
            .map(|pattern| PatternImpl::new(pattern, library))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            expression = %expr,
            instrs = program.instrs.len(),
            patterns = patterns.len(),
            "Compiled path expression"
        );

        Ok(PathExpressionEval { program, patterns })
    }
}

impl<D> PathExpressionEval<D> {
    /// True for the evaluator of the empty expression.
    pub fn is_empty(&self) -> bool {
        self.program.is_empty()
    }

    /// Match a single absolute path.
    pub fn matches<F>(&self, path: &Path, path_to_obj: F) -> PredicateFunctionResult
    where
        F: Fn(&Path) -> D,
    {
        self.program.run(|index, visit| match visit {
            Visit::Evaluate => self.patterns[index].matches(path, &path_to_obj),
            Visit::Skip => PredicateFunctionResult::default(),
        })
    }

    /// Start an incremental search. Pass paths to `next` in depth-first
    /// order.
    pub fn incremental_searcher<F>(&self, path_to_obj: F) -> IncrementalSearcher<'_, D, F>
    where
        F: Fn(&Path) -> D,
    {
        IncrementalSearcher {
            eval: self,
            path_to_obj,
            states: vec![PatternIncrSearchState::default(); self.patterns.len()],
        }
    }
}

fn path_identity(path: &Path) -> Path {
    path.clone()
}

impl PathExpressionEval<Path> {
    /// Match with the path itself as the predicate object.
    pub fn match_path(&self, path: &Path) -> PredicateFunctionResult {
        self.matches(path, path_identity)
    }

    pub fn path_searcher(&self) -> IncrementalSearcher<'_, Path, fn(&Path) -> Path> {
        self.incremental_searcher(path_identity as fn(&Path) -> Path)
    }
}

/// Depth-first incremental matcher.
///
/// Each call to `next` must pass a path that continues a pre-order
/// traversal from the previous one: a child, a sibling, or a sibling of an
/// ancestor. Work done for shared ancestors is reused, and a subtree proven
/// constant is answered without matching.
///
/// Cloning a searcher forks the traversal: each copy can continue into a
/// different branch.
pub struct IncrementalSearcher<'e, D, F> {
    eval: &'e PathExpressionEval<D>,
    path_to_obj: F,
    states: Vec<PatternIncrSearchState>,
}

impl<D, F: Clone> Clone for IncrementalSearcher<'_, D, F> {
    fn clone(&self) -> Self {
        IncrementalSearcher {
            eval: self.eval,
            path_to_obj: self.path_to_obj.clone(),
            states: self.states.clone(),
        }
    }
}

impl<D, F> fmt::Debug for IncrementalSearcher<'_, D, F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("IncrementalSearcher")
            .field("states", &self.states)
            .finish()
    }
}

impl<D, F> IncrementalSearcher<'_, D, F>
where
    F: Fn(&Path) -> D,
{
    pub fn next(&mut self, path: &Path) -> PredicateFunctionResult {
        let depth = path.element_count();
        let IncrementalSearcher {
            eval,
            path_to_obj,
            states,
        } = self;

        eval.program.run(|index, visit| match visit {
            Visit::Evaluate => eval.patterns[index].next(path, &*path_to_obj, &mut states[index]),
            Visit::Skip => {
                states[index].pop(depth);
                PredicateFunctionResult::default()
            }
        })
    }

    /// Forget all traversal state, to start a new traversal.
    pub fn reset(&mut self) {
        for state in &mut self.states {
            *state = PatternIncrSearchState::default();
        }
    }
}
