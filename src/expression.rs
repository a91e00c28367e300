// Path expressions
//
// Set-algebraic combinations of path patterns and named references to other
// expressions: `/World//Mesh* - (%/lib:hidden + ~//*.points)`.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ast::{needs_parens, walk_tree, LogicNode, TreeVisit};
use crate::path::Path;
use crate::pattern::PathPattern;

/// Path expression operators, ordered from tightest to loosest binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ExpressionOp {
    Complement,
    ImpliedUnion,
    Union,
    Intersection,
    Difference,
}

impl ExpressionOp {
    fn symbol(self) -> &'static str {
        match self {
            ExpressionOp::Complement => "~",
            ExpressionOp::ImpliedUnion => " ",
            ExpressionOp::Union => " + ",
            ExpressionOp::Intersection => " & ",
            ExpressionOp::Difference => " - ",
        }
    }
}

/// A reference to another named expression, `%/path:name`, or to the
/// weaker expression being composed over, `%_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExpressionReference {
    pub path: Option<Path>,
    pub name: String,
}

impl ExpressionReference {
    pub fn new(path: Option<Path>, name: impl Into<String>) -> Self {
        ExpressionReference {
            path,
            name: name.into(),
        }
    }

    /// `%_`
    pub fn weaker() -> Self {
        Self::new(None, "_")
    }

    pub fn is_weaker(&self) -> bool {
        self.name == "_"
    }
}

impl fmt::Display for ExpressionReference {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("%")?;
        if let Some(path) = &self.path {
            write!(f, "{}", path)?;
        }
        if self.is_weaker() {
            f.write_str("_")
        } else {
            write!(f, ":{}", self.name)
        }
    }
}

/// Path expression tree node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprNode {
    Pattern(PathPattern),
    Ref(ExpressionReference),
    Complement(Box<ExprNode>),
    Binary {
        op: ExpressionOp,
        lhs: Box<ExprNode>,
        rhs: Box<ExprNode>,
    },
}

impl LogicNode for ExprNode {
    type Op = ExpressionOp;

    fn operator(&self) -> Option<ExpressionOp> {
        match self {
            ExprNode::Pattern(_) | ExprNode::Ref(_) => None,
            ExprNode::Complement(_) => Some(ExpressionOp::Complement),
            ExprNode::Binary { op, .. } => Some(*op),
        }
    }

    fn arity(&self) -> usize {
        match self {
            ExprNode::Pattern(_) | ExprNode::Ref(_) => 0,
            ExprNode::Complement(_) => 1,
            ExprNode::Binary { .. } => 2,
        }
    }

    fn operand(&self, index: usize) -> &ExprNode {
        match self {
            ExprNode::Complement(operand) => operand.as_ref(),
            ExprNode::Binary { lhs, .. } if index == 0 => lhs.as_ref(),
            ExprNode::Binary { rhs, .. } => rhs.as_ref(),
            ExprNode::Pattern(_) | ExprNode::Ref(_) => self,
        }
    }
}

/// Events produced by `PathExpression::walk`.
#[derive(Debug)]
pub enum PathWalkEvent<'a> {
    /// An operator, visited before, between and after its operands.
    Logic { op: ExpressionOp, arg_index: usize },
    Ref(&'a ExpressionReference),
    Pattern(&'a PathPattern),
}

/// Events produced by `PathExpression::walk_with_op_stack`.
#[derive(Debug)]
pub enum PathStackEvent<'a, 's> {
    Logic(&'s [(ExpressionOp, usize)]),
    Ref(&'a ExpressionReference),
    Pattern(&'a PathPattern),
}

/// A parsed or programmatically built path expression.
///
/// The empty expression matches nothing. A failed parse leaves the
/// expression empty and records the error text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathExpression {
    root: Option<ExprNode>,
    parse_error: Option<String>,
}

impl PathExpression {
    /// Parse `text`; on failure the result is empty and `parse_error()` is set.
    pub fn new(text: &str) -> Self {
        Self::with_context(text, "")
    }

    /// Like `new`, prefixing any error message with `context`.
    pub fn with_context(text: &str, context: &str) -> Self {
        match crate::path_parser::parse(text) {
            Ok(expr) => expr,
            Err(e) => PathExpression {
                root: None,
                parse_error: Some(if context.is_empty() {
                    e.to_string()
                } else {
                    format!("{}: {}", context, e)
                }),
            },
        }
    }

    pub(crate) fn from_root(root: ExprNode) -> Self {
        PathExpression {
            root: Some(root),
            parse_error: None,
        }
    }

    // ── Well-known expressions ──────────────────────────────────────────

    /// `//`
    pub fn everything() -> Self {
        Self::make_atom_pattern(PathPattern::everything())
    }

    /// `.//`
    pub fn every_descendant() -> Self {
        Self::make_atom_pattern(PathPattern::every_descendant())
    }

    /// The empty expression.
    pub fn nothing() -> Self {
        Self::default()
    }

    /// `%_`
    pub fn weaker_ref() -> Self {
        Self::make_atom_ref(ExpressionReference::weaker())
    }

    pub fn root(&self) -> Option<&ExprNode> {
        self.root.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn parse_error(&self) -> Option<&str> {
        self.parse_error.as_deref()
    }

    fn is_everything(&self) -> bool {
        matches!(&self.root, Some(ExprNode::Pattern(p)) if *p == PathPattern::everything())
    }

    // ── Builders ────────────────────────────────────────────────────────

    pub fn make_atom_pattern(pattern: PathPattern) -> Self {
        Self::from_root(ExprNode::Pattern(pattern))
    }

    pub fn make_atom_ref(reference: ExpressionReference) -> Self {
        Self::from_root(ExprNode::Ref(reference))
    }

    /// `~operand`, with `~~x == x` and everything/nothing swapping.
    pub fn make_complement(operand: PathExpression) -> Self {
        if operand.is_everything() {
            return Self::nothing();
        }
        match operand.root {
            None => Self::everything(),
            Some(ExprNode::Complement(inner)) => Self::from_root(*inner),
            Some(node) => Self::from_root(ExprNode::Complement(Box::new(node))),
        }
    }

    /// Combine two expressions, simplifying against everything and nothing.
    pub fn make_op(op: ExpressionOp, lhs: PathExpression, rhs: PathExpression) -> Self {
        debug_assert!(op != ExpressionOp::Complement);
        let mut op = op;
        let mut rhs = rhs;

        // With an everything or nothing operand, A - B is A & ~B, which
        // leaves only commutative cases below.
        let trivial = |e: &PathExpression| e.is_empty() || e.is_everything();
        if op == ExpressionOp::Difference && (trivial(&lhs) || trivial(&rhs)) {
            op = ExpressionOp::Intersection;
            rhs = Self::make_complement(rhs);
        }

        let intersection = op == ExpressionOp::Intersection;
        if lhs.is_empty() {
            return if intersection { Self::nothing() } else { rhs };
        }
        if rhs.is_empty() {
            return if intersection { Self::nothing() } else { lhs };
        }
        if lhs.is_everything() {
            return if intersection { rhs } else { Self::everything() };
        }
        if rhs.is_everything() {
            return if intersection { lhs } else { Self::everything() };
        }

        match (lhs.root, rhs.root) {
            (Some(l), Some(r)) => Self::from_root(ExprNode::Binary {
                op,
                lhs: Box::new(l),
                rhs: Box::new(r),
            }),
            _ => Self::nothing(),
        }
    }

    // ── Queries ─────────────────────────────────────────────────────────

    pub fn contains_expression_references(&self) -> bool {
        let mut found = false;
        self.walk(|event| {
            if let PathWalkEvent::Ref(_) = event {
                found = true;
            }
        });
        found
    }

    pub fn contains_weaker_expression_reference(&self) -> bool {
        let mut found = false;
        self.walk(|event| {
            if let PathWalkEvent::Ref(r) = event {
                found |= r.is_weaker();
            }
        });
        found
    }

    /// True if every pattern prefix and every reference path is absolute.
    pub fn is_absolute(&self) -> bool {
        let mut absolute = true;
        self.walk(|event| match event {
            PathWalkEvent::Ref(r) => {
                absolute &= r.path.as_ref().map_or(true, Path::is_absolute);
            }
            PathWalkEvent::Pattern(p) => absolute &= p.is_absolute(),
            PathWalkEvent::Logic { .. } => {}
        });
        absolute
    }

    /// No references and only absolute paths: ready to compile.
    pub fn is_complete(&self) -> bool {
        !self.contains_expression_references() && self.is_absolute()
    }

    // ── Traversal ───────────────────────────────────────────────────────

    pub fn walk<'a>(&'a self, mut visit: impl FnMut(PathWalkEvent<'a>)) {
        self.walk_with_op_stack(|event| match event {
            PathStackEvent::Logic(stack) => {
                if let Some(&(op, arg_index)) = stack.last() {
                    visit(PathWalkEvent::Logic { op, arg_index });
                }
            }
            PathStackEvent::Ref(r) => visit(PathWalkEvent::Ref(r)),
            PathStackEvent::Pattern(p) => visit(PathWalkEvent::Pattern(p)),
        });
    }

    pub fn walk_with_op_stack<'a>(&'a self, mut visit: impl FnMut(PathStackEvent<'a, '_>)) {
        let Some(root) = &self.root else { return };
        walk_tree(root, |step| match step {
            TreeVisit::Logic(stack) => visit(PathStackEvent::Logic(stack)),
            TreeVisit::Leaf(ExprNode::Ref(r)) => visit(PathStackEvent::Ref(r)),
            TreeVisit::Leaf(ExprNode::Pattern(p)) => visit(PathStackEvent::Pattern(p)),
            TreeVisit::Leaf(_) => {}
        });
    }

    // ── Rewrites ────────────────────────────────────────────────────────

    /// Replace every reference with `resolve(reference)`, rebuilding the
    /// operators above it so the everything/nothing rules apply again.
    pub fn resolve_references<F>(self, mut resolve: F) -> PathExpression
    where
        F: FnMut(&ExpressionReference) -> PathExpression,
    {
        if self.is_empty() {
            return Self::nothing();
        }

        let mut stack: Vec<PathExpression> = Vec::new();
        self.walk(|event| match event {
            PathWalkEvent::Logic { op: ExpressionOp::Complement, arg_index: 1 } => {
                if let Some(top) = stack.pop() {
                    stack.push(Self::make_complement(top));
                }
            }
            PathWalkEvent::Logic { op, arg_index: 2 } => {
                if let (Some(rhs), Some(lhs)) = (stack.pop(), stack.pop()) {
                    stack.push(Self::make_op(op, lhs, rhs));
                }
            }
            PathWalkEvent::Logic { .. } => {}
            PathWalkEvent::Ref(r) => stack.push(resolve(r)),
            PathWalkEvent::Pattern(p) => stack.push(Self::make_atom_pattern(p.clone())),
        });

        debug_assert_eq!(stack.len(), 1);
        stack.pop().unwrap_or_default()
    }

    /// Substitute `weaker` for every `%_`. Composing the empty expression
    /// over anything yields that thing.
    pub fn compose_over(self, weaker: &PathExpression) -> PathExpression {
        if self.is_empty() {
            return weaker.clone();
        }
        self.resolve_references(|r| {
            if r.is_weaker() {
                weaker.clone()
            } else {
                Self::make_atom_ref(r.clone())
            }
        })
    }

    /// Anchor every relative pattern prefix and reference path at `anchor`.
    /// Paths that cannot be anchored are left as they are, with a warning.
    pub fn make_absolute(mut self, anchor: &Path) -> PathExpression {
        self.for_each_leaf_mut(|leaf| match leaf {
            ExprNode::Ref(r) => {
                if let Some(path) = &r.path {
                    match path.make_absolute(anchor) {
                        Some(abs) => r.path = Some(abs),
                        None => warn!("Cannot make <{}> absolute with anchor <{}>", path, anchor),
                    }
                }
            }
            ExprNode::Pattern(p) => {
                if !p.make_absolute(anchor) {
                    warn!("Cannot make pattern '{}' absolute with anchor <{}>", p, anchor);
                }
            }
            _ => {}
        });
        self
    }

    /// Replace `old` with `new` at the front of every pattern prefix and
    /// reference path.
    pub fn replace_prefix(mut self, old: &Path, new: &Path) -> PathExpression {
        self.for_each_leaf_mut(|leaf| match leaf {
            ExprNode::Ref(r) => {
                if let Some(path) = &r.path {
                    r.path = Some(path.replace_prefix(old, new));
                }
            }
            ExprNode::Pattern(p) => p.replace_prefix(old, new),
            _ => {}
        });
        self
    }

    /// Visit leaves left to right, in place.
    fn for_each_leaf_mut(&mut self, mut f: impl FnMut(&mut ExprNode)) {
        let Some(root) = self.root.as_mut() else { return };
        let mut pending = vec![root];
        while let Some(node) = pending.pop() {
            match node {
                ExprNode::Complement(operand) => pending.push(operand.as_mut()),
                ExprNode::Binary { lhs, rhs, .. } => {
                    pending.push(rhs.as_mut());
                    pending.push(lhs.as_mut());
                }
                leaf => f(leaf),
            }
        }
    }

    // ── Printing ────────────────────────────────────────────────────────

    /// Source text with minimal parentheses; parses back to an equal tree.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.walk_with_op_stack(|event| match event {
            PathStackEvent::Logic(stack) => {
                let (op, index) = stack[stack.len() - 1];
                let parenthesize = needs_parens(stack);
                let unary = op == ExpressionOp::Complement;
                if parenthesize && index == 0 {
                    out.push('(');
                }
                if index == if unary { 0 } else { 1 } {
                    out.push_str(op.symbol());
                }
                if parenthesize && index == if unary { 1 } else { 2 } {
                    out.push(')');
                }
            }
            PathStackEvent::Ref(r) => out.push_str(&r.to_string()),
            PathStackEvent::Pattern(p) => out.push_str(&p.text()),
        });
        out
    }
}

impl fmt::Display for PathExpression {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.text())
    }
}
