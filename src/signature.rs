// Predicate function signatures: parameter names, defaults, and binding of
// a call's argument list onto a function's parameters

use thiserror::Error;

use crate::ast::FnArg;
use crate::value::Value;

/// Invalid parameter declarations, reported at definition time.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SignatureError {
    #[error("Parameter name at position {0} is empty")]
    EmptyName(usize),

    #[error("Duplicate parameter name '{0}'")]
    DuplicateName(String),

    #[error("Parameter '{0}' has no default but follows a parameter with one")]
    DefaultOrder(String),

    #[error("{names} parameter name(s) given for a function taking {arity} argument(s)")]
    TooManyNames { names: usize, arity: usize },

    #[error("Default value {value} for '{name}' does not convert to the parameter type")]
    DefaultType { name: String, value: String },

    #[error("Extra-arguments parameter must come last")]
    MisplacedVariadic,
}

/// Per-call binding failures. One overload failing to bind is not an error
/// by itself; the call fails to link only if every overload fails.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BindError {
    #[error("No registered function '{0}'")]
    NoFunction(String),

    #[error("Function requires at least {min} argument(s), {given} given")]
    TooFewArguments { min: usize, given: usize },

    #[error("Function takes at most {max} argument(s), {given} given")]
    TooManyArguments { max: usize, given: usize },

    #[error("Missing positional argument {0}")]
    MissingPositional(usize),

    #[error("Missing argument '{0}'")]
    MissingArgument(String),

    #[error("Multiple values for argument '{0}'")]
    DuplicateArgument(String),

    #[error("Unexpected argument '{0}'")]
    UnexpectedArgument(String),

    #[error("Argument {index} ({value}) has the wrong type")]
    TypeMismatch { index: usize, value: String },

    #[error("{0}")]
    Declined(String),
}

/// A named parameter, optionally with a default value.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub default: Option<Value>,
}

impl Param {
    pub fn new(name: impl Into<String>) -> Self {
        Param {
            name: name.into(),
            default: None,
        }
    }

    pub fn with_default(name: impl Into<String>, default: impl Into<Value>) -> Self {
        Param {
            name: name.into(),
            default: Some(default.into()),
        }
    }
}

/// Names and defaults for the trailing parameters of a function. Leading
/// parameters not covered by a name can only be bound positionally.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamNamesAndDefaults {
    params: Vec<Param>,
    num_defaults: usize,
}

impl ParamNamesAndDefaults {
    pub fn new(params: Vec<Param>) -> Self {
        let num_defaults = params.iter().filter(|p| p.default.is_some()).count();
        ParamNamesAndDefaults {
            params,
            num_defaults,
        }
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn num_defaults(&self) -> usize {
        self.num_defaults
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Names must be non-empty and unique, and defaults must form a
    /// trailing run.
    pub fn check_validity(&self) -> Result<(), SignatureError> {
        let mut seen_default = false;
        for (i, param) in self.params.iter().enumerate() {
            if param.name.is_empty() {
                return Err(SignatureError::EmptyName(i));
            }
            if self.params[..i].iter().any(|p| p.name == param.name) {
                return Err(SignatureError::DuplicateName(param.name.clone()));
            }
            match (&param.default, seen_default) {
                (Some(_), _) => seen_default = true,
                (None, true) => return Err(SignatureError::DefaultOrder(param.name.clone())),
                (None, false) => {}
            }
        }
        Ok(())
    }
}

impl From<Vec<Param>> for ParamNamesAndDefaults {
    fn from(params: Vec<Param>) -> Self {
        ParamNamesAndDefaults::new(params)
    }
}

/// An argument bound to one parameter slot.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundSlot {
    Value(Value),
    /// Every argument no parameter consumed, in call order.
    Extra(Vec<FnArg>),
}

/// The shape of a registered function: how many value parameters it takes,
/// whether it ends in an extra-arguments sink, and its named parameters.
#[derive(Debug, Clone)]
pub struct Signature {
    pub arity: usize,
    pub variadic: bool,
    pub params: ParamNamesAndDefaults,
}

impl Signature {
    pub fn new(arity: usize, variadic: bool, params: ParamNamesAndDefaults) -> Result<Self, SignatureError> {
        params.check_validity()?;
        if params.len() > arity {
            return Err(SignatureError::TooManyNames {
                names: params.len(),
                arity,
            });
        }
        Ok(Signature {
            arity,
            variadic,
            params,
        })
    }

    pub fn min_args(&self) -> usize {
        self.arity - self.params.num_defaults()
    }

    pub fn max_args(&self) -> Option<usize> {
        (!self.variadic).then_some(self.arity)
    }

    /// Validate argument count
    pub fn validate_arg_count(&self, actual: usize) -> Result<(), BindError> {
        let min = self.min_args();
        if actual < min {
            return Err(BindError::TooFewArguments { min, given: actual });
        }
        if let Some(max) = self.max_args() {
            if actual > max {
                return Err(BindError::TooManyArguments { max, given: actual });
            }
        }
        Ok(())
    }

    /// Map `args` onto parameter slots. The result has one `Value` slot per
    /// parameter, followed by an `Extra` slot for variadic signatures.
    ///
    /// Unnamed leading parameters take the positional argument at their
    /// index. A named parameter takes the positional argument at its index,
    /// else the keyword argument with its name, else its default.
    pub fn bind(&self, args: &[FnArg]) -> Result<Vec<BoundSlot>, BindError> {
        self.validate_arg_count(args.len())?;

        let num_unnamed = self.arity - self.params.len();
        let mut used = vec![false; args.len()];
        let mut slots = Vec::with_capacity(self.arity + usize::from(self.variadic));

        for index in 0..self.arity {
            let positional = args.get(index).filter(|a| a.is_positional());

            if index < num_unnamed {
                let arg = positional.ok_or(BindError::MissingPositional(index))?;
                used[index] = true;
                slots.push(BoundSlot::Value(arg.value.clone()));
                continue;
            }

            let param = &self.params.params()[index - num_unnamed];
            let keyword = args
                .iter()
                .position(|a| a.name.as_deref() == Some(param.name.as_str()));

            let value = match (positional, keyword) {
                (Some(_), Some(_)) => return Err(BindError::DuplicateArgument(param.name.clone())),
                (Some(arg), None) => {
                    used[index] = true;
                    arg.value.clone()
                }
                (None, Some(k)) => {
                    used[k] = true;
                    args[k].value.clone()
                }
                (None, None) => param
                    .default
                    .clone()
                    .ok_or_else(|| BindError::MissingArgument(param.name.clone()))?,
            };
            slots.push(BoundSlot::Value(value));
        }

        let extra: Vec<FnArg> = args
            .iter()
            .zip(&used)
            .filter(|&(_, &u)| !u)
            .map(|(a, _)| a.clone())
            .collect();

        if self.variadic {
            slots.push(BoundSlot::Extra(extra));
        } else if let Some(arg) = extra.first() {
            return Err(BindError::UnexpectedArgument(arg.to_string()));
        }

        Ok(slots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(arity: usize, variadic: bool, params: Vec<Param>) -> Signature {
        Signature::new(arity, variadic, params.into()).unwrap()
    }

    fn values(slots: &[BoundSlot]) -> Vec<Value> {
        slots
            .iter()
            .filter_map(|s| match s {
                BoundSlot::Value(v) => Some(v.clone()),
                BoundSlot::Extra(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_check_validity() {
        let ok = ParamNamesAndDefaults::new(vec![Param::new("a"), Param::with_default("b", 1)]);
        assert!(ok.check_validity().is_ok());
        assert_eq!(ok.num_defaults(), 1);

        let empty = ParamNamesAndDefaults::new(vec![Param::new("")]);
        assert_eq!(empty.check_validity(), Err(SignatureError::EmptyName(0)));

        let dup = ParamNamesAndDefaults::new(vec![Param::new("a"), Param::new("a")]);
        assert_eq!(dup.check_validity(), Err(SignatureError::DuplicateName("a".to_string())));

        let order = ParamNamesAndDefaults::new(vec![Param::with_default("a", 1), Param::new("b")]);
        assert_eq!(order.check_validity(), Err(SignatureError::DefaultOrder("b".to_string())));
    }

    #[test]
    fn test_too_many_names() {
        let err = Signature::new(1, false, vec![Param::new("a"), Param::new("b")].into()).unwrap_err();
        assert_eq!(err, SignatureError::TooManyNames { names: 2, arity: 1 });
    }

    #[test]
    fn test_signature_validation() {
        let s = sig(2, false, vec![Param::new("a"), Param::with_default("b", 0)]);

        // Valid: 1 required arg provided
        assert!(s.validate_arg_count(1).is_ok());

        // Valid: both args provided
        assert!(s.validate_arg_count(2).is_ok());

        // Invalid: too few args
        assert_eq!(s.validate_arg_count(0), Err(BindError::TooFewArguments { min: 1, given: 0 }));

        // Invalid: too many args
        assert_eq!(s.validate_arg_count(3), Err(BindError::TooManyArguments { max: 2, given: 3 }));
    }

    #[test]
    fn test_bind_positional_keyword_default() {
        let s = sig(3, false, vec![Param::new("min"), Param::with_default("max", 10)]);

        let slots = s.bind(&[FnArg::positional("x"), FnArg::positional(1)]).unwrap();
        assert_eq!(values(&slots), vec![Value::from("x"), Value::Int(1), Value::Int(10)]);

        let slots = s
            .bind(&[FnArg::positional("x"), FnArg::keyword("max", 5), FnArg::keyword("min", 2)])
            .unwrap();
        assert_eq!(values(&slots), vec![Value::from("x"), Value::Int(2), Value::Int(5)]);
    }

    #[test]
    fn test_bind_failures() {
        let s = sig(2, false, vec![Param::new("b")]);

        // Unnamed leading parameter cannot be given by keyword.
        assert_eq!(
            s.bind(&[FnArg::keyword("a", 1), FnArg::keyword("b", 2)]),
            Err(BindError::MissingPositional(0))
        );
        assert_eq!(
            s.bind(&[FnArg::positional(1), FnArg::keyword("c", 2)]),
            Err(BindError::MissingArgument("b".to_string()))
        );
        assert_eq!(
            s.bind(&[FnArg::positional(1), FnArg::positional(2), FnArg::keyword("b", 2)]),
            Err(BindError::TooManyArguments { max: 2, given: 3 })
        );

        let s = sig(1, false, vec![Param::with_default("b", 0)]);
        assert_eq!(
            s.bind(&[FnArg::keyword("zz", 2)]),
            Err(BindError::UnexpectedArgument("zz=2".to_string()))
        );
        assert_eq!(
            s.bind(&[FnArg::positional(1), FnArg::keyword("b", 2)]),
            Err(BindError::TooManyArguments { max: 1, given: 2 })
        );
    }

    #[test]
    fn test_bind_variadic_sink() {
        let s = sig(1, true, vec![]);
        let slots = s
            .bind(&[FnArg::positional(1), FnArg::positional(2), FnArg::keyword("k", "v")])
            .unwrap();
        assert_eq!(
            slots,
            vec![
                BoundSlot::Value(Value::Int(1)),
                BoundSlot::Extra(vec![FnArg::positional(2), FnArg::keyword("k", "v")]),
            ]
        );
        assert_eq!(s.bind(&[]), Err(BindError::TooFewArguments { min: 1, given: 0 }));
    }
}
