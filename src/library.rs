// Predicate function library and linking
//
// A `PredicateLibrary<D>` maps function names to overloads. Each overload
// binds a call's argument list to a callable `Fn(&D) -> PredicateFunctionResult`
// at link time; `link` binds every call in a predicate expression and pairs
// the results with the expression's compiled logic program.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use indexmap::IndexMap;
use thiserror::Error;
use tracing::error;

use crate::ast::{FnArg, FnCall, PredicateExpression};
use crate::compiler::compile_predicate;
use crate::result::PredicateFunctionResult;
use crate::signature::{BoundSlot, ParamNamesAndDefaults, Signature, SignatureError};
use crate::value::{FromValue, Value};
use crate::vm::{LogicProgram, Visit};

pub use crate::signature::BindError;

/// A predicate bound to its call arguments, ready to test domain objects.
pub type PredicateFunction<D> = Arc<dyn Fn(&D) -> PredicateFunctionResult + Send + Sync>;

// ---------------------------------------------------------------------------
// Parameter conversion
// ---------------------------------------------------------------------------

/// A type a predicate function can take as a parameter.
pub trait PredicateArg: Sized {
    /// True for the extra-arguments sink.
    const VARIADIC: bool = false;

    fn from_slot(slot: BoundSlot) -> Option<Self>;

    /// Whether `value` converts to this type; used to vet defaults.
    fn accepts(value: &Value) -> bool;
}

impl<T: FromValue> PredicateArg for T {
    fn from_slot(slot: BoundSlot) -> Option<Self> {
        match slot {
            BoundSlot::Value(value) => T::from_value(&value),
            BoundSlot::Extra(_) => None,
        }
    }

    fn accepts(value: &Value) -> bool {
        T::from_value(value).is_some()
    }
}

/// Final parameter collecting every argument no other parameter took.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtraArgs(pub Vec<FnArg>);

impl PredicateArg for ExtraArgs {
    const VARIADIC: bool = true;

    fn from_slot(slot: BoundSlot) -> Option<Self> {
        match slot {
            BoundSlot::Extra(args) => Some(ExtraArgs(args)),
            BoundSlot::Value(_) => None,
        }
    }

    fn accepts(_: &Value) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// Typed predicate functions
// ---------------------------------------------------------------------------

/// A function `Fn(&D, A1, A2, ...) -> R` usable as a predicate, where each
/// `Ai` is a `PredicateArg` and `R` is `bool` or `PredicateFunctionResult`.
pub trait PredicateFn<D, Args>: Clone + Send + Sync + 'static {
    /// Number of value parameters, excluding an extra-arguments sink.
    const ARITY: usize;
    const VARIADIC: bool;

    /// `(is_variadic, accepts)` for every parameter, in order.
    fn param_checks() -> Vec<(bool, fn(&Value) -> bool)>;

    fn bind_slots(&self, slots: Vec<BoundSlot>) -> Result<PredicateFunction<D>, BindError>;
}

fn slot_text(slot: &BoundSlot) -> String {
    match slot {
        BoundSlot::Value(value) => value.to_source(),
        BoundSlot::Extra(args) => {
            let args: Vec<String> = args.iter().map(FnArg::to_string).collect();
            args.join(", ")
        }
    }
}

macro_rules! impl_predicate_fn {
    ($($arg:ident),*) => {
        #[allow(non_snake_case, unused_mut, unused_variables)]
        impl<D, F, R, $($arg,)*> PredicateFn<D, ($($arg,)*)> for F
        where
            D: 'static,
            F: Fn(&D, $($arg),*) -> R + Clone + Send + Sync + 'static,
            R: Into<PredicateFunctionResult>,
            $($arg: PredicateArg + Clone + Send + Sync + 'static,)*
        {
            const ARITY: usize = 0 $(+ (!<$arg as PredicateArg>::VARIADIC) as usize)*;
            const VARIADIC: bool = false $(|| <$arg as PredicateArg>::VARIADIC)*;

            fn param_checks() -> Vec<(bool, fn(&Value) -> bool)> {
                vec![$((<$arg as PredicateArg>::VARIADIC, <$arg as PredicateArg>::accepts as fn(&Value) -> bool)),*]
            }

            fn bind_slots(&self, slots: Vec<BoundSlot>) -> Result<PredicateFunction<D>, BindError> {
                let mut slots = slots.into_iter().enumerate();
                $(
                    let $arg = match slots.next() {
                        Some((index, slot)) => {
                            let value = slot_text(&slot);
                            <$arg as PredicateArg>::from_slot(slot)
                                .ok_or(BindError::TypeMismatch { index, value })?
                        }
                        None => return Err(BindError::MissingPositional(0)),
                    };
                )*
                let f = self.clone();
                Ok(Arc::new(move |obj: &D| -> PredicateFunctionResult {
                    f(obj, $($arg.clone()),*).into()
                }))
            }
        }
    };
}

impl_predicate_fn!();
impl_predicate_fn!(A1);
impl_predicate_fn!(A1, A2);
impl_predicate_fn!(A1, A2, A3);
impl_predicate_fn!(A1, A2, A3, A4);
impl_predicate_fn!(A1, A2, A3, A4, A5);
impl_predicate_fn!(A1, A2, A3, A4, A5, A6);

// ---------------------------------------------------------------------------
// Binders
// ---------------------------------------------------------------------------

/// One overload: binds a call's arguments or explains why it cannot.
trait Binder<D>: Send + Sync {
    fn bind(&self, args: &[FnArg]) -> Result<PredicateFunction<D>, BindError>;
}

struct TypedBinder<D, F, Args> {
    f: F,
    signature: Signature,
    _marker: PhantomData<fn(&D, Args)>,
}

impl<D, F, Args> Binder<D> for TypedBinder<D, F, Args>
where
    F: PredicateFn<D, Args>,
{
    fn bind(&self, args: &[FnArg]) -> Result<PredicateFunction<D>, BindError> {
        let slots = self.signature.bind(args)?;
        self.f.bind_slots(slots)
    }
}

struct CustomBinder<B>(B);

impl<D, B> Binder<D> for CustomBinder<B>
where
    B: Fn(&[FnArg]) -> Result<PredicateFunction<D>, BindError> + Send + Sync,
{
    fn bind(&self, args: &[FnArg]) -> Result<PredicateFunction<D>, BindError> {
        (self.0)(args)
    }
}

// ---------------------------------------------------------------------------
// Library
// ---------------------------------------------------------------------------

/// Named predicate functions over domain objects of type `D`.
///
/// A name may carry several overloads; the most recently defined one that
/// binds a call's arguments wins. Clones share their registered binders.
pub struct PredicateLibrary<D> {
    binders: IndexMap<String, Vec<Arc<dyn Binder<D>>>>,
}

impl<D> Clone for PredicateLibrary<D> {
    fn clone(&self) -> Self {
        PredicateLibrary {
            binders: self.binders.clone(),
        }
    }
}

impl<D> Default for PredicateLibrary<D> {
    fn default() -> Self {
        PredicateLibrary {
            binders: IndexMap::new(),
        }
    }
}

impl<D> fmt::Debug for PredicateLibrary<D> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_map()
            .entries(self.binders.iter().map(|(name, overloads)| (name, overloads.len())))
            .finish()
    }
}

impl<D: 'static> PredicateLibrary<D> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `f` under `name`, with all parameters positional.
    pub fn define<Args, F>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: PredicateFn<D, Args>,
        Args: 'static,
    {
        self.define_with_params(name, f, ParamNamesAndDefaults::default())
    }

    /// Register `f` with names (and optional defaults) for its trailing
    /// parameters. An invalid declaration is logged and skipped.
    pub fn define_with_params<Args, F>(
        &mut self,
        name: &str,
        f: F,
        params: impl Into<ParamNamesAndDefaults>,
    ) -> &mut Self
    where
        F: PredicateFn<D, Args>,
        Args: 'static,
    {
        if let Err(e) = self.try_define_with_params(name, f, params) {
            error!(function = name, error = %e, "Invalid predicate function definition");
        }
        self
    }

    pub fn try_define_with_params<Args, F>(
        &mut self,
        name: &str,
        f: F,
        params: impl Into<ParamNamesAndDefaults>,
    ) -> Result<&mut Self, SignatureError>
    where
        F: PredicateFn<D, Args>,
        Args: 'static,
    {
        let checks = F::param_checks();
        if checks.iter().rev().skip(1).any(|(variadic, _)| *variadic) {
            return Err(SignatureError::MisplacedVariadic);
        }

        let signature = Signature::new(F::ARITY, F::VARIADIC, params.into())?;
        let num_unnamed = signature.arity - signature.params.len();
        for (i, param) in signature.params.params().iter().enumerate() {
            if let Some(default) = &param.default {
                let (_, accepts) = checks[num_unnamed + i];
                if !accepts(default) {
                    return Err(SignatureError::DefaultType {
                        name: param.name.clone(),
                        value: default.to_source(),
                    });
                }
            }
        }

        let binder = TypedBinder {
            f,
            signature,
            _marker: PhantomData,
        };
        self.push(name, Arc::new(binder));
        Ok(self)
    }

    /// Register a binder that inspects a call's raw arguments at link time,
    /// returning the bound function or a reason to decline.
    pub fn define_binder<B>(&mut self, name: &str, binder: B) -> &mut Self
    where
        B: Fn(&[FnArg]) -> Result<PredicateFunction<D>, BindError> + Send + Sync + 'static,
    {
        self.push(name, Arc::new(CustomBinder(binder)));
        self
    }

    fn push(&mut self, name: &str, binder: Arc<dyn Binder<D>>) {
        self.binders.entry(name.to_string()).or_default().push(binder);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.binders.contains_key(name)
    }

    /// Function names, in first-definition order.
    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.binders.keys().map(String::as_str)
    }

    /// Bind `call` against its overloads, newest first. On failure, returns
    /// each overload's reason, newest first.
    pub fn bind_call(&self, call: &FnCall) -> Result<PredicateFunction<D>, Vec<BindError>> {
        let Some(overloads) = self.binders.get(&call.name) else {
            return Err(vec![BindError::NoFunction(call.name.clone())]);
        };
        let mut errors = Vec::with_capacity(overloads.len());
        for binder in overloads.iter().rev() {
            match binder.bind(&call.args) {
                Ok(f) => return Ok(f),
                Err(e) => errors.push(e),
            }
        }
        Err(errors)
    }

    pub fn link(&self, expr: &PredicateExpression) -> Result<PredicateProgram<D>, LinkError> {
        link(expr, self)
    }
}

// ---------------------------------------------------------------------------
// Linking
// ---------------------------------------------------------------------------

/// A call that no overload could bind.
#[derive(Debug, Clone, PartialEq)]
pub struct CallFailure {
    pub call: String,
    pub errors: Vec<BindError>,
}

impl fmt::Display for CallFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let reasons: Vec<String> = self.errors.iter().map(BindError::to_string).collect();
        write!(f, "Failed to bind call of {}: {}", self.call, reasons.join("; "))
    }
}

/// Every call in an expression that failed to bind.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{}", format_failures(.failures))]
pub struct LinkError {
    pub failures: Vec<CallFailure>,
}

fn format_failures(failures: &[CallFailure]) -> String {
    let lines: Vec<String> = failures.iter().map(CallFailure::to_string).collect();
    lines.join("\n")
}

/// A predicate expression linked against a library. Call it with a domain
/// object to evaluate the expression.
///
/// The default program is invalid (`is_valid()` is false) and evaluates to
/// constant false.
pub struct PredicateProgram<D> {
    program: LogicProgram,
    functions: Vec<PredicateFunction<D>>,
}

impl<D> Clone for PredicateProgram<D> {
    fn clone(&self) -> Self {
        PredicateProgram {
            program: self.program.clone(),
            functions: self.functions.clone(),
        }
    }
}

impl<D> Default for PredicateProgram<D> {
    fn default() -> Self {
        PredicateProgram {
            program: LogicProgram::default(),
            functions: Vec::new(),
        }
    }
}

impl<D> fmt::Debug for PredicateProgram<D> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PredicateProgram")
            .field("instrs", &self.program.instrs)
            .field("functions", &self.functions.len())
            .finish()
    }
}

impl<D> PredicateProgram<D> {
    pub fn is_valid(&self) -> bool {
        !self.program.is_empty()
    }

    pub fn call(&self, obj: &D) -> PredicateFunctionResult {
        self.program.run(|index, visit| match visit {
            Visit::Evaluate => (self.functions[index])(obj),
            Visit::Skip => PredicateFunctionResult::default(),
        })
    }
}

/// Bind every call in `expr` against `library`.
///
/// The empty expression links to an invalid program. If any call fails to
/// bind, all failures are reported together and logged.
pub fn link<D: 'static>(
    expr: &PredicateExpression,
    library: &PredicateLibrary<D>,
) -> Result<PredicateProgram<D>, LinkError> {
    let (program, calls) = compile_predicate(expr);

    let mut functions = Vec::with_capacity(calls.len());
    let mut failures = Vec::new();
    for call in calls {
        match library.bind_call(call) {
            Ok(f) => functions.push(f),
            Err(errors) => failures.push(CallFailure {
                call: call.text(),
                errors,
            }),
        }
    }

    if !failures.is_empty() {
        let err = LinkError { failures };
        error!(expression = %expr, "{}", err);
        return Err(err);
    }

    Ok(PredicateProgram { program, functions })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::Param;

    fn lib() -> PredicateLibrary<i64> {
        let mut lib = PredicateLibrary::new();
        lib.define("even", |n: &i64| n % 2 == 0)
            .define("positive", |n: &i64| PredicateFunctionResult::make_constant(*n > 0))
            .define("eq", |n: &i64, m: i64| *n == m)
            .define_with_params(
                "between",
                |n: &i64, lo: i64, hi: i64| lo <= *n && *n <= hi,
                vec![Param::new("lo"), Param::with_default("hi", i64::MAX)],
            )
            .define("count", |_: &i64, first: String, rest: ExtraArgs| {
                !first.is_empty() && rest.0.len() == 2
            });
        lib
    }

    fn eval(lib: &PredicateLibrary<i64>, text: &str, n: i64) -> PredicateFunctionResult {
        let expr = PredicateExpression::new(text);
        assert!(expr.parse_error().is_none(), "{:?}", expr.parse_error());
        link(&expr, lib).unwrap().call(&n)
    }

    #[test]
    fn test_call_and_logic() {
        let lib = lib();
        assert!(eval(&lib, "even", 4).value());
        assert!(!eval(&lib, "even", 3).value());
        assert!(eval(&lib, "not even", 3).value());
        assert!(eval(&lib, "even or eq:3", 3).value());
        assert!(!eval(&lib, "even and eq:3", 3).value());
        assert!(eval(&lib, "between(1, hi=5) positive", 3).value());
        assert!(!eval(&lib, "between(lo=4)", 3).value());
        assert!(eval(&lib, "count:a,b,c", 0).value());
    }

    #[test]
    fn test_constancy_from_functions() {
        let lib = lib();
        let r = eval(&lib, "positive", 3);
        assert!(r.value() && r.is_constant());
        let r = eval(&lib, "positive and even", 4);
        assert!(r.value() && !r.is_constant());
        let r = eval(&lib, "positive and even", -4);
        assert!(!r.value() && r.is_constant());
    }

    #[test]
    fn test_later_overload_shadows_earlier() {
        let mut lib: PredicateLibrary<i64> = PredicateLibrary::new();
        lib.define("f", |_: &i64, _: String| false)
            .define("f", |_: &i64, _: i64| true);
        assert!(eval(&lib, "f:1", 0).value());
        // The newer overload fails to bind a string; the older one takes it.
        assert!(!eval(&lib, "f:x", 0).value());
    }

    #[test]
    fn test_link_failures() {
        let lib = lib();
        for text in ["even:1", "eq", "between(high=3)", "missing", "eq:x"] {
            let expr = PredicateExpression::new(text);
            let err = link(&expr, &lib).unwrap_err();
            assert_eq!(err.failures.len(), 1, "{}", text);
            assert!(!err.failures[0].errors.is_empty());
        }

        let expr = PredicateExpression::new("missing");
        let err = link(&expr, &lib).unwrap_err();
        assert_eq!(err.failures[0].errors, vec![BindError::NoFunction("missing".to_string())]);
        assert!(err.to_string().contains("No registered function 'missing'"));

        let expr = PredicateExpression::new("eq");
        let err = link(&expr, &lib).unwrap_err();
        assert!(err
            .to_string()
            .contains("Function requires at least 1 argument(s), 0 given"));
    }

    #[test]
    fn test_invalid_definitions_are_skipped() {
        let mut lib: PredicateLibrary<i64> = PredicateLibrary::new();
        let err = lib
            .try_define_with_params("bad", |_: &i64, _: i64| true, vec![Param::with_default("x", "s")])
            .unwrap_err();
        assert!(matches!(err, SignatureError::DefaultType { .. }));

        let err = lib
            .try_define_with_params("bad", |_: &i64, _: ExtraArgs, _: i64| true, ParamNamesAndDefaults::default())
            .unwrap_err();
        assert_eq!(err, SignatureError::MisplacedVariadic);

        lib.define_with_params("bad", |_: &i64, _: i64| true, vec![Param::new("a"), Param::new("b")]);
        assert!(!lib.contains("bad"));
    }

    #[test]
    fn test_custom_binder() {
        let mut lib: PredicateLibrary<i64> = PredicateLibrary::new();
        lib.define_binder("mod", |args: &[FnArg]| {
            let m = args
                .first()
                .and_then(|a| a.value.as_i64())
                .filter(|m| *m != 0)
                .ok_or_else(|| BindError::Declined("mod needs a non-zero divisor".to_string()))?;
            let f: PredicateFunction<i64> = Arc::new(move |n: &i64| PredicateFunctionResult::from(n % m == 0));
            Ok(f)
        });
        assert!(eval(&lib, "mod:3", 9).value());
        assert!(!eval(&lib, "mod:3", 10).value());
        assert!(link(&PredicateExpression::new("mod:0"), &lib).is_err());
    }

    #[test]
    fn test_empty_expression_links_to_invalid_program() {
        let program = link(&PredicateExpression::default(), &lib()).unwrap();
        assert!(!program.is_valid());
        assert_eq!(program.call(&1), PredicateFunctionResult::make_constant(false));
    }
}
