use std::sync::OnceLock;

use regex::Regex;

use crate::error::EvalError;
use crate::value::{ReplayBinding, ReplayValue};

/// Evaluates a breakpoint condition within a binding.
///
/// Supported expressions are a single operand, or the comparison of two
/// operands with one of `==`, `!=`, `<`, `<=`, `>`, `>=`. Operands are
/// integers, double-quoted strings, `nil`, `true`, `false`, or local
/// variables.
pub fn evaluate(expr: &str, binding: Option<&ReplayBinding>) -> Result<bool, EvalError> {
    let expr = expr.trim();

    let Some(caps) = comparison().captures(expr) else {
        return operand(expr, binding).map(|value| value.is_truthy());
    };

    let lhs = operand(&caps[1], binding)?;
    let rhs = operand(&caps[3], binding)?;

    let res = match &caps[2] {
        "==" => lhs == rhs,
        "!=" => lhs != rhs,
        op => {
            let (ReplayValue::Int(l), ReplayValue::Int(r)) = (&lhs, &rhs) else {
                return Err(EvalError::NotComparable {
                    lhs: lhs.to_string(),
                    rhs: rhs.to_string(),
                });
            };

            match op {
                "<" => l < r,
                "<=" => l <= r,
                ">" => l > r,
                _ => l >= r,
            }
        }
    };

    Ok(res)
}

#[allow(clippy::expect_used)]
fn comparison() -> &'static Regex {
    static COMPARISON: OnceLock<Regex> = OnceLock::new();

    COMPARISON.get_or_init(|| {
        Regex::new(r"^(\S+)\s*(==|!=|<=|>=|<|>)\s*(\S+)$").expect("literal pattern")
    })
}

fn operand(text: &str, binding: Option<&ReplayBinding>) -> Result<ReplayValue, EvalError> {
    if let Some(s) = text.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        return Ok(ReplayValue::Str(s.into()));
    }

    match ReplayValue::parse(text) {
        ReplayValue::Str(_) => (),
        literal => return Ok(literal),
    }

    let is_ident = text
        .chars()
        .next()
        .is_some_and(|c| c == '_' || c.is_ascii_lowercase())
        && text.chars().all(|c| c == '_' || c.is_ascii_alphanumeric());

    if !is_ident {
        return Err(EvalError::Syntax(text.to_owned()));
    }

    binding
        .and_then(|binding| binding.get(text))
        .ok_or_else(|| EvalError::UnknownVariable(text.to_owned()))
}

#[cfg(test)]
mod tests {
    use hookdbg_core::host::Locals;

    use super::evaluate;
    use crate::error::EvalError;
    use crate::value::{BindingVars, ReplayBinding, ReplayValue};

    fn binding(vars: &[(&str, ReplayValue)]) -> ReplayBinding {
        let locals: Locals<ReplayValue> = vars
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();

        ReplayBinding {
            receiver: ReplayValue::Nil,
            vars: BindingVars::Frozen(locals),
        }
    }

    #[test]
    fn literals() {
        assert_eq!(evaluate("true", None), Ok(true));
        assert_eq!(evaluate("false", None), Ok(false));
        assert_eq!(evaluate("nil", None), Ok(false));
        assert_eq!(evaluate("1 < 2", None), Ok(true));
        assert_eq!(evaluate("\"a\" == \"a\"", None), Ok(true));

        assert_eq!(evaluate("true == 1", None), Ok(false));
        assert_eq!(evaluate("false == false", None), Ok(true));
        assert_eq!(evaluate("true != false", None), Ok(true));
        assert_eq!(evaluate("\"false\" == false", None), Ok(false));
    }

    #[test]
    fn variables() {
        let binding = binding(&[
            ("x", ReplayValue::Int(5)),
            ("name", ReplayValue::Str("bob".into())),
            ("none", ReplayValue::Nil),
            ("done", ReplayValue::Bool(false)),
        ]);

        assert_eq!(evaluate("x", Some(&binding)), Ok(true));
        assert_eq!(evaluate("none", Some(&binding)), Ok(false));
        assert_eq!(evaluate("x > 4", Some(&binding)), Ok(true));
        assert_eq!(evaluate("x>=6", Some(&binding)), Ok(false));
        assert_eq!(evaluate("name != \"bob\"", Some(&binding)), Ok(false));
        assert_eq!(evaluate("x == x", Some(&binding)), Ok(true));
        assert_eq!(evaluate("done", Some(&binding)), Ok(false));
        assert_eq!(evaluate("done == false", Some(&binding)), Ok(true));
    }

    #[test]
    fn failures() {
        let binding = binding(&[("name", ReplayValue::Str("bob".into()))]);

        assert_eq!(
            evaluate("y == 1", Some(&binding)),
            Err(EvalError::UnknownVariable("y".to_owned()))
        );
        assert_eq!(
            evaluate("x", None),
            Err(EvalError::UnknownVariable("x".to_owned()))
        );
        assert!(matches!(
            evaluate("name < 3", Some(&binding)),
            Err(EvalError::NotComparable { .. })
        ));
        assert!(matches!(
            evaluate("x.foo", Some(&binding)),
            Err(EvalError::Syntax(_))
        ));
    }
}
