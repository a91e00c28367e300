//! Logic VM shared by predicate programs and path expression evaluators.
//!
//! A `LogicProgram` is produced by `crate::compiler` from either expression
//! tree. It is a flat postfix-ish stream of `Instr` values over opaque
//! operands: the caller supplies a closure that evaluates operand `i` (a bound
//! predicate function, or a compiled path pattern).
//!
//! Binary operators are emitted as `lhs, And, Open, rhs, Close`, so when the
//! running result already decides an `And`/`Or` the interpreter can skip to
//! the matching `Close` without evaluating `rhs`. Skipped operands are still
//! reported to the caller with `Visit::Skip` so per-operand state stays in
//! step with the operand cursor.

use crate::result::PredicateFunctionResult;

// ---------------------------------------------------------------------------
// Instruction set
// ---------------------------------------------------------------------------

/// A single logic instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Instr {
    /// Evaluate the next operand and make it the running result.
    Eval,
    /// Negate the running result, keeping its constancy.
    Not,
    /// Start of a short-circuit scope.
    Open,
    /// End of a short-circuit scope.
    Close,
    /// If the running result is false, skip to the end of the next scope.
    And,
    /// If the running result is true, skip to the end of the next scope.
    Or,
}

/// How the interpreter is visiting an operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    Evaluate,
    /// The operand lies in a short-circuited scope; its result is ignored.
    Skip,
}

// ---------------------------------------------------------------------------
// Program
// ---------------------------------------------------------------------------

/// A compiled logic program over `num_operands` operands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct LogicProgram {
    pub instrs: Vec<Instr>,
    pub num_operands: usize,
}

impl LogicProgram {
    pub(crate) fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    /// Run the program. `operand(i, visit)` is called exactly once per
    /// operand, in order, on every run.
    ///
    /// The empty program yields constant false.
    pub(crate) fn run<F>(&self, mut operand: F) -> PredicateFunctionResult
    where
        F: FnMut(usize, Visit) -> PredicateFunctionResult,
    {
        let instrs = &self.instrs;
        let mut result = PredicateFunctionResult::make_constant(false);
        let mut nest: usize = 0;
        let mut cursor: usize = 0;
        let mut ip = 0;

        while ip < instrs.len() {
            match instrs[ip] {
                Instr::Eval => {
                    result.set_and_propagate_constancy(operand(cursor, Visit::Evaluate));
                    cursor += 1;
                }
                Instr::Not => result = !result,
                Instr::Open => nest += 1,
                Instr::Close => nest -= 1,
                op @ (Instr::And | Instr::Or) => {
                    let deciding = op == Instr::Or;
                    if result.value() == deciding {
                        let orig_nest = nest;
                        loop {
                            ip += 1;
                            match instrs.get(ip) {
                                Some(Instr::Eval) => {
                                    operand(cursor, Visit::Skip);
                                    cursor += 1;
                                }
                                Some(Instr::Open) => nest += 1,
                                Some(Instr::Close) => {
                                    nest -= 1;
                                    if nest == orig_nest {
                                        break;
                                    }
                                }
                                Some(_) => {}
                                None => break,
                            }
                        }
                    }
                }
            }
            ip += 1;
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Instr::*;

    fn program(instrs: Vec<Instr>) -> LogicProgram {
        let num_operands = instrs.iter().filter(|i| **i == Eval).count();
        LogicProgram { instrs, num_operands }
    }

    /// Run with fixed operand results, returning the result and the visits.
    fn run(
        prog: &LogicProgram,
        operands: &[PredicateFunctionResult],
    ) -> (PredicateFunctionResult, Vec<(usize, Visit)>) {
        let mut visits = Vec::new();
        let result = prog.run(|i, visit| {
            visits.push((i, visit));
            operands[i]
        });
        (result, visits)
    }

    const T: PredicateFunctionResult = PredicateFunctionResult::make_constant(true);
    const F: PredicateFunctionResult = PredicateFunctionResult::make_constant(false);

    #[test]
    fn test_empty_program_is_constant_false() {
        let (result, visits) = run(&LogicProgram::default(), &[]);
        assert_eq!(result, PredicateFunctionResult::make_constant(false));
        assert!(visits.is_empty());
    }

    #[test]
    fn test_single_operand_and_not() {
        let prog = program(vec![Eval, Not]);
        let (result, _) = run(&prog, &[PredicateFunctionResult::make_varying(true)]);
        assert_eq!(result, PredicateFunctionResult::make_varying(false));
    }

    #[test]
    fn test_or_short_circuits() {
        // a or b
        let prog = program(vec![Eval, Or, Open, Eval, Close]);
        let (result, visits) = run(&prog, &[T, F]);
        assert_eq!(result, T);
        assert_eq!(visits, vec![(0, Visit::Evaluate), (1, Visit::Skip)]);

        let (result, visits) = run(&prog, &[F, T]);
        assert_eq!(result, T);
        assert_eq!(visits, vec![(0, Visit::Evaluate), (1, Visit::Evaluate)]);
    }

    #[test]
    fn test_nested_skip_keeps_cursor_in_step() {
        // a and (b or c) or d
        let prog = program(vec![
            Eval, And, Open, Eval, Or, Open, Eval, Close, Close, Or, Open, Eval, Close,
        ]);
        let (result, visits) = run(&prog, &[F, T, T, T]);
        assert_eq!(result, T);
        assert_eq!(
            visits,
            vec![
                (0, Visit::Evaluate),
                (1, Visit::Skip),
                (2, Visit::Skip),
                (3, Visit::Evaluate),
            ]
        );
    }

    #[test]
    fn test_difference_shape() {
        // a and not b
        let prog = program(vec![Eval, And, Open, Eval, Not, Close]);
        let (result, _) = run(&prog, &[T, F]);
        assert_eq!(result, T);
        let (result, _) = run(&prog, &[T, T]);
        assert_eq!(result, F);
    }

    #[test]
    fn test_constancy_propagation() {
        let prog = program(vec![Eval, And, Open, Eval, Close]);
        let varying_true = PredicateFunctionResult::make_varying(true);
        let (result, _) = run(&prog, &[varying_true, T]);
        assert_eq!(result, PredicateFunctionResult::make_varying(true));

        let (result, _) = run(&prog, &[T, T]);
        assert_eq!(result, T);

        // Short-circuit keeps the deciding operand's constancy.
        let (result, _) = run(&prog, &[F, varying_true]);
        assert_eq!(result, F);
    }
}
