// Predicate expression syntax tree
//
// Boolean combinations of predicate function calls, e.g.
// `isa:Mesh and not (hidden or name("tmp*"))`. Also hosts the iterative
// walker shared with path expressions.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Predicate operators, ordered from tightest to loosest binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PredicateOp {
    Call,
    Not,
    ImpliedAnd,
    And,
    Or,
}

/// The syntax a function call was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FnCallKind {
    /// `name`
    BareCall,
    /// `name:arg1,arg2`
    ColonCall,
    /// `name(arg1, key=value)`
    ParenCall,
}

/// One call argument; keyword arguments carry a name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FnArg {
    pub name: Option<String>,
    pub value: Value,
}

impl FnArg {
    pub fn positional(value: impl Into<Value>) -> Self {
        FnArg {
            name: None,
            value: value.into(),
        }
    }

    pub fn keyword(name: impl Into<String>, value: impl Into<Value>) -> Self {
        FnArg {
            name: Some(name.into()),
            value: value.into(),
        }
    }

    pub fn is_positional(&self) -> bool {
        self.name.is_none()
    }
}

impl fmt::Display for FnArg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}={}", name, self.value.to_source()),
            None => f.write_str(&self.value.to_source()),
        }
    }
}

/// A predicate function call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FnCall {
    pub kind: FnCallKind,
    pub name: String,
    pub args: Vec<FnArg>,
}

impl FnCall {
    pub fn bare(name: impl Into<String>) -> Self {
        FnCall {
            kind: FnCallKind::BareCall,
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn colon(name: impl Into<String>, args: Vec<FnArg>) -> Self {
        FnCall {
            kind: FnCallKind::ColonCall,
            name: name.into(),
            args,
        }
    }

    pub fn paren(name: impl Into<String>, args: Vec<FnArg>) -> Self {
        FnCall {
            kind: FnCallKind::ParenCall,
            name: name.into(),
            args,
        }
    }

    pub fn text(&self) -> String {
        match self.kind {
            FnCallKind::ColonCall if !self.args.is_empty() => {
                let args: Vec<String> = self.args.iter().map(|a| a.value.to_source()).collect();
                format!("{}:{}", self.name, args.join(","))
            }
            FnCallKind::ParenCall => {
                let args: Vec<String> = self.args.iter().map(FnArg::to_string).collect();
                format!("{}({})", self.name, args.join(", "))
            }
            _ => self.name.clone(),
        }
    }
}

/// Predicate expression tree node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PredicateNode {
    Call(FnCall),
    Not(Box<PredicateNode>),
    Binary {
        op: PredicateOp,
        lhs: Box<PredicateNode>,
        rhs: Box<PredicateNode>,
    },
}

/// Events produced by `PredicateExpression::walk`.
#[derive(Debug)]
pub enum PredicateWalkEvent<'a> {
    /// An operator, visited before, between and after its operands.
    Logic { op: PredicateOp, arg_index: usize },
    Call(&'a FnCall),
}

/// Events produced by `PredicateExpression::walk_with_op_stack`; `Logic`
/// carries every enclosing `(op, arg_index)` pair, innermost last.
#[derive(Debug)]
pub enum PredicateStackEvent<'a, 's> {
    Logic(&'s [(PredicateOp, usize)]),
    Call(&'a FnCall),
}

/// A parsed or programmatically built predicate expression.
///
/// The empty expression means "no predicate". A failed parse leaves the
/// expression empty and records the error text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredicateExpression {
    root: Option<PredicateNode>,
    parse_error: Option<String>,
}

impl PredicateExpression {
    /// Parse `text`; on failure the result is empty and `parse_error()` is set.
    pub fn new(text: &str) -> Self {
        Self::with_context(text, "")
    }

    /// Like `new`, prefixing any error message with `context`.
    pub fn with_context(text: &str, context: &str) -> Self {
        match crate::parser::parse(text) {
            Ok(expr) => expr,
            Err(e) => PredicateExpression {
                root: None,
                parse_error: Some(if context.is_empty() {
                    e.to_string()
                } else {
                    format!("{}: {}", context, e)
                }),
            },
        }
    }

    pub(crate) fn from_root(root: PredicateNode) -> Self {
        PredicateExpression {
            root: Some(root),
            parse_error: None,
        }
    }

    pub fn root(&self) -> Option<&PredicateNode> {
        self.root.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn parse_error(&self) -> Option<&str> {
        self.parse_error.as_deref()
    }

    // ── Builders ────────────────────────────────────────────────────────

    pub fn make_call(call: FnCall) -> Self {
        Self::from_root(PredicateNode::Call(call))
    }

    pub fn make_not(operand: PredicateExpression) -> Self {
        match operand.root {
            Some(node) => Self::from_root(PredicateNode::Not(Box::new(node))),
            None => PredicateExpression::default(),
        }
    }

    /// Combine two expressions with a binary operator. An empty operand
    /// yields the other one.
    pub fn make_op(op: PredicateOp, lhs: PredicateExpression, rhs: PredicateExpression) -> Self {
        debug_assert!(matches!(op, PredicateOp::ImpliedAnd | PredicateOp::And | PredicateOp::Or));
        match (lhs.root, rhs.root) {
            (Some(l), Some(r)) => Self::from_root(PredicateNode::Binary {
                op,
                lhs: Box::new(l),
                rhs: Box::new(r),
            }),
            (Some(node), None) | (None, Some(node)) => Self::from_root(node),
            (None, None) => PredicateExpression::default(),
        }
    }

    // ── Traversal ───────────────────────────────────────────────────────

    pub fn walk<'a>(&'a self, mut visit: impl FnMut(PredicateWalkEvent<'a>)) {
        self.walk_with_op_stack(|event| match event {
            PredicateStackEvent::Logic(stack) => {
                if let Some(&(op, arg_index)) = stack.last() {
                    visit(PredicateWalkEvent::Logic { op, arg_index });
                }
            }
            PredicateStackEvent::Call(call) => visit(PredicateWalkEvent::Call(call)),
        });
    }

    pub fn walk_with_op_stack<'a>(&'a self, mut visit: impl FnMut(PredicateStackEvent<'a, '_>)) {
        let Some(root) = &self.root else { return };
        walk_tree(root, |step| match step {
            TreeVisit::Logic(stack) => visit(PredicateStackEvent::Logic(stack)),
            TreeVisit::Leaf(PredicateNode::Call(call)) => visit(PredicateStackEvent::Call(call)),
            TreeVisit::Leaf(_) => {}
        });
    }

    /// Source text with minimal parentheses; parses back to an equal tree.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.walk_with_op_stack(|event| match event {
            PredicateStackEvent::Logic(stack) => {
                let (op, index) = stack[stack.len() - 1];
                let parenthesize = needs_parens(stack);
                if parenthesize && index == 0 {
                    out.push('(');
                }
                match (op, index) {
                    (PredicateOp::Not, 0) => out.push_str("not "),
                    (PredicateOp::ImpliedAnd, 1) => out.push(' '),
                    (PredicateOp::And, 1) => out.push_str(" and "),
                    (PredicateOp::Or, 1) => out.push_str(" or "),
                    _ => {}
                }
                let last = if op == PredicateOp::Not { 1 } else { 2 };
                if parenthesize && index == last {
                    out.push(')');
                }
            }
            PredicateStackEvent::Call(call) => out.push_str(&call.text()),
        });
        out
    }
}

impl fmt::Display for PredicateExpression {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.text())
    }
}

/// Parenthesize the innermost operator if its parent binds tighter, or
/// binds equally and this is the parent's right operand.
pub(crate) fn needs_parens<Op: Ord + Copy>(stack: &[(Op, usize)]) -> bool {
    match stack {
        [.., (parent_op, parent_index), (op, _)] => {
            parent_op < op || (parent_op == op && *parent_index == 2)
        }
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Shared tree walk
// ---------------------------------------------------------------------------

/// Operator/operand view of an expression tree node.
pub(crate) trait LogicNode {
    type Op: Copy;

    /// `None` for leaves.
    fn operator(&self) -> Option<Self::Op>;
    fn arity(&self) -> usize;
    fn operand(&self, index: usize) -> &Self;
}

pub(crate) enum TreeVisit<'a, 's, N: LogicNode> {
    Logic(&'s [(N::Op, usize)]),
    Leaf(&'a N),
}

/// Depth-first walk with an explicit stack. Each operator is visited with
/// argument index 0 before its first operand, then once after each operand;
/// leaves are visited once.
pub(crate) fn walk_tree<'a, N, F>(root: &'a N, mut visit: F)
where
    N: LogicNode,
    F: FnMut(TreeVisit<'a, '_, N>),
{
    let mut nodes: Vec<&'a N> = Vec::new();
    let mut ops: Vec<(N::Op, usize)> = Vec::new();
    let mut pending = Some(root);

    loop {
        if let Some(node) = pending.take() {
            match node.operator() {
                Some(op) => {
                    nodes.push(node);
                    ops.push((op, 0));
                }
                None => visit(TreeVisit::Leaf(node)),
            }
        }

        let Some(&node) = nodes.last() else { break };
        visit(TreeVisit::Logic(&ops));

        let top = ops.len() - 1;
        let index = ops[top].1 + 1;
        ops[top].1 = index;
        if index > node.arity() {
            nodes.pop();
            ops.pop();
        } else {
            pending = Some(node.operand(index - 1));
        }
    }
}

impl LogicNode for PredicateNode {
    type Op = PredicateOp;

    fn operator(&self) -> Option<PredicateOp> {
        match self {
            PredicateNode::Call(_) => None,
            PredicateNode::Not(_) => Some(PredicateOp::Not),
            PredicateNode::Binary { op, .. } => Some(*op),
        }
    }

    fn arity(&self) -> usize {
        match self {
            PredicateNode::Call(_) => 0,
            PredicateNode::Not(_) => 1,
            PredicateNode::Binary { .. } => 2,
        }
    }

    fn operand(&self, index: usize) -> &PredicateNode {
        match self {
            PredicateNode::Not(operand) => operand.as_ref(),
            PredicateNode::Binary { lhs, .. } if index == 0 => lhs.as_ref(),
            PredicateNode::Binary { rhs, .. } => rhs.as_ref(),
            PredicateNode::Call(_) => self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str) -> PredicateExpression {
        PredicateExpression::make_call(FnCall::bare(name))
    }

    #[test]
    fn test_call_text() {
        assert_eq!(FnCall::bare("visible").text(), "visible");
        let c = FnCall::colon("isa", vec![FnArg::positional("Mesh"), FnArg::positional(2)]);
        assert_eq!(c.text(), "isa:Mesh,2");
        let c = FnCall::paren(
            "range",
            vec![FnArg::positional(1.5), FnArg::keyword("max", "a b")],
        );
        assert_eq!(c.text(), "range(1.5, max=\"a b\")");
        assert_eq!(FnCall::paren("f", vec![]).text(), "f()");
    }

    #[test]
    fn test_builders_and_text() {
        let e = PredicateExpression::make_op(PredicateOp::And, call("a"), call("b"));
        assert_eq!(e.text(), "a and b");

        let e = PredicateExpression::make_op(PredicateOp::Or, e, call("c"));
        assert_eq!(e.text(), "a and b or c");

        let e = PredicateExpression::make_op(PredicateOp::And, call("x"), e);
        assert_eq!(e.text(), "x and (a and b or c)");

        let e = PredicateExpression::make_not(e);
        assert_eq!(e.text(), "not (x and (a and b or c))");
    }

    #[test]
    fn test_right_operand_of_same_op_is_parenthesized() {
        let rhs = PredicateExpression::make_op(PredicateOp::Or, call("b"), call("c"));
        let e = PredicateExpression::make_op(PredicateOp::Or, call("a"), rhs);
        assert_eq!(e.text(), "a or (b or c)");

        let lhs = PredicateExpression::make_op(PredicateOp::Or, call("a"), call("b"));
        let e = PredicateExpression::make_op(PredicateOp::Or, lhs, call("c"));
        assert_eq!(e.text(), "a or b or c");
    }

    #[test]
    fn test_empty_operands() {
        let e = PredicateExpression::make_op(PredicateOp::And, PredicateExpression::default(), call("b"));
        assert_eq!(e, call("b"));
        assert!(PredicateExpression::make_not(PredicateExpression::default()).is_empty());
    }

    #[test]
    fn test_walk_order() {
        let e = PredicateExpression::make_op(
            PredicateOp::Or,
            PredicateExpression::make_not(call("a")),
            call("b"),
        );
        let mut events = Vec::new();
        e.walk(|event| match event {
            PredicateWalkEvent::Logic { op, arg_index } => events.push(format!("{:?}{}", op, arg_index)),
            PredicateWalkEvent::Call(c) => events.push(c.name.clone()),
        });
        assert_eq!(events, vec!["Or0", "Not0", "a", "Not1", "Or1", "b", "Or2"]);
    }
}
