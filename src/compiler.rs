//! Compiler: lowers expression trees into flat `LogicProgram`s.
//!
//! Both predicate expressions and path expressions compile to the same
//! instruction set. A single walk over the tree emits, per node:
//!
//! - leaf (call or pattern): `Eval`, and the leaf joins the operand list
//! - `not` / `~`: `Not` after the operand
//! - `and`, implied and, `&`: `lhs, And, Open, rhs, Close`
//! - `or`, `+`, implied union: `lhs, Or, Open, rhs, Close`
//! - `-`: `lhs, And, Open, rhs, Not, Close`

use thiserror::Error;
use tracing::error;

use crate::ast::{FnCall, PredicateExpression, PredicateOp, PredicateWalkEvent};
use crate::expression::{ExpressionOp, PathExpression, PathWalkEvent};
use crate::library::LinkError;
use crate::pattern::PathPattern;
use crate::vm::{Instr, LogicProgram};

/// Path expression compilation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    /// The expression still has references or relative paths. This is a
    /// caller bug: resolve and anchor the expression before compiling.
    #[error("Cannot compile incomplete path expression '{0}'")]
    Incomplete(String),

    #[error("Invalid glob '{glob}': {message}")]
    InvalidGlob { glob: String, message: String },

    #[error(transparent)]
    Link(#[from] LinkError),
}

// ---------------------------------------------------------------------------
// Compiler state
// ---------------------------------------------------------------------------

struct LogicCompiler {
    instrs: Vec<Instr>,
    num_operands: usize,
}

impl LogicCompiler {
    fn new() -> Self {
        LogicCompiler {
            instrs: Vec::with_capacity(16),
            num_operands: 0,
        }
    }

    fn emit(&mut self, instr: Instr) {
        self.instrs.push(instr);
    }

    fn emit_operand(&mut self) {
        self.emit(Instr::Eval);
        self.num_operands += 1;
    }

    /// Emit the instructions a binary operator contributes after its
    /// `arg_index`-th visit. `negate_rhs` implements difference.
    fn emit_binary(&mut self, short_circuit: Instr, arg_index: usize, negate_rhs: bool) {
        match arg_index {
            1 => {
                self.emit(short_circuit);
                self.emit(Instr::Open);
            }
            2 => {
                if negate_rhs {
                    self.emit(Instr::Not);
                }
                self.emit(Instr::Close);
            }
            _ => {}
        }
    }

    fn finish(self) -> LogicProgram {
        LogicProgram {
            instrs: self.instrs,
            num_operands: self.num_operands,
        }
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Compile a predicate expression. Returns the program and its calls in
/// operand order. The empty expression compiles to the empty program.
pub(crate) fn compile_predicate(expr: &PredicateExpression) -> (LogicProgram, Vec<&FnCall>) {
    let mut compiler = LogicCompiler::new();
    let mut calls = Vec::new();

    expr.walk(|event| match event {
        PredicateWalkEvent::Call(call) => {
            compiler.emit_operand();
            calls.push(call);
        }
        PredicateWalkEvent::Logic { op, arg_index } => match op {
            PredicateOp::Not => {
                if arg_index == 1 {
                    compiler.emit(Instr::Not);
                }
            }
            PredicateOp::And | PredicateOp::ImpliedAnd => compiler.emit_binary(Instr::And, arg_index, false),
            PredicateOp::Or => compiler.emit_binary(Instr::Or, arg_index, false),
            PredicateOp::Call => {}
        },
    });

    (compiler.finish(), calls)
}

/// Compile a complete path expression. Returns the program and its patterns
/// in operand order.
pub(crate) fn compile_expression(expr: &PathExpression) -> Result<(LogicProgram, Vec<&PathPattern>), CompileError> {
    if !expr.is_complete() {
        let err = CompileError::Incomplete(expr.text());
        error!("{}", err);
        return Err(err);
    }

    let mut compiler = LogicCompiler::new();
    let mut patterns = Vec::new();
    let mut saw_reference = false;

    expr.walk(|event| match event {
        PathWalkEvent::Pattern(pattern) => {
            compiler.emit_operand();
            patterns.push(pattern);
        }
        PathWalkEvent::Ref(_) => saw_reference = true,
        PathWalkEvent::Logic { op, arg_index } => match op {
            ExpressionOp::Complement => {
                if arg_index == 1 {
                    compiler.emit(Instr::Not);
                }
            }
            ExpressionOp::Union | ExpressionOp::ImpliedUnion => compiler.emit_binary(Instr::Or, arg_index, false),
            ExpressionOp::Intersection => compiler.emit_binary(Instr::And, arg_index, false),
            ExpressionOp::Difference => compiler.emit_binary(Instr::And, arg_index, true),
        },
    });

    if saw_reference {
        let err = CompileError::Incomplete(expr.text());
        error!("Unexpected expression reference: {}", err);
        return Err(err);
    }

    Ok((compiler.finish(), patterns))
}
