//! Shunting-Yard formula evaluator (spec.md §4.5/§8 round-trip law),
//! grounded on `original_source/wperf/metric.cpp`'s
//! `metric_calculate_shunting_yard_expression`: that function evaluates
//! an already-postfix, space-tokenized formula against a variable map,
//! treating `/0` as `0`. This module adds the `to_postfix` half (the
//! original always received pre-converted formulae) so the round-trip
//! law `eval(to_sy(infix)) == eval(infix)` holds end to end.

use crate::error::{AgentError, Result};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
}

impl Op {
    fn precedence(self) -> u8 {
        match self {
            Op::Add | Op::Sub => 1,
            Op::Mul | Op::Div => 2,
        }
    }

    fn from_char(c: char) -> Option<Op> {
        match c {
            '+' => Some(Op::Add),
            '-' => Some(Op::Sub),
            '*' => Some(Op::Mul),
            '/' => Some(Op::Div),
            _ => None,
        }
    }

    fn apply(self, x: f64, y: f64) -> f64 {
        match self {
            Op::Add => x + y,
            Op::Sub => x - y,
            Op::Mul => x * y,
            Op::Div => {
                if y == 0.0 {
                    0.0
                } else {
                    x / y
                }
            }
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
        }
    }
}

#[derive(Debug, Clone)]
enum Token {
    Operand(String),
    Operator(Op),
}

fn tokenize(infix: &str) -> Vec<Token> {
    infix
        .split_whitespace()
        .map(|t| match t.chars().next() {
            Some(c) if t.len() == 1 && Op::from_char(c).is_some() => {
                Token::Operator(Op::from_char(c).unwrap())
            }
            _ => Token::Operand(t.to_string()),
        })
        .collect()
}

/// Classic shunting-yard infix-to-postfix conversion (`*`, `/` bind
/// tighter than `+`, `-`; left-associative; no parentheses since metric
/// formulae don't use them). Returns the postfix form as a
/// space-separated string, the exact shape
/// `metric_calculate_shunting_yard_expression` consumes.
pub fn to_postfix(infix: &str) -> Result<String> {
    let tokens = tokenize(infix);
    let mut output: Vec<String> = Vec::new();
    let mut ops: Vec<Op> = Vec::new();

    for token in tokens {
        match token {
            Token::Operand(s) => output.push(s),
            Token::Operator(op) => {
                while let Some(top) = ops.last() {
                    if top.precedence() >= op.precedence() {
                        output.push(ops.pop().unwrap().symbol().to_string());
                    } else {
                        break;
                    }
                }
                ops.push(op);
            }
        }
    }
    while let Some(op) = ops.pop() {
        output.push(op.symbol().to_string());
    }

    if output.is_empty() {
        return Err(AgentError::FormulaError("empty formula".to_string()));
    }
    Ok(output.join(" "))
}

/// Evaluates a postfix, space-tokenized formula against `vars`,
/// substituting named values and leaving numeric literals as-is;
/// division by zero yields 0 (spec.md §4.5/§8).
pub fn eval_postfix(vars: &HashMap<String, f64>, formula_sy: &str) -> Result<f64> {
    let mut stack: Vec<f64> = Vec::new();

    for tok in formula_sy.split_whitespace() {
        if let Some(op) = tok.chars().next().filter(|_| tok.len() == 1).and_then(Op::from_char) {
            let y = stack
                .pop()
                .ok_or_else(|| AgentError::FormulaError(format!("missing operand for {tok}")))?;
            let x = stack
                .pop()
                .ok_or_else(|| AgentError::FormulaError(format!("missing operand for {tok}")))?;
            stack.push(op.apply(x, y));
        } else if let Some(&value) = vars.get(tok) {
            stack.push(value);
        } else {
            let value: f64 = tok
                .parse()
                .map_err(|_| AgentError::FormulaError(format!("unknown token: {tok}")))?;
            stack.push(value);
        }
    }

    stack
        .pop()
        .ok_or_else(|| AgentError::FormulaError("formula produced no value".to_string()))
}

/// Evaluates an infix formula directly, i.e. `eval(to_sy(infix))`.
pub fn eval(vars: &HashMap<String, f64>, infix: &str) -> Result<f64> {
    eval_postfix(vars, &to_postfix(infix)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn precedence_matches_standard_arithmetic() {
        // 2 + 3 * 4 = 14, not 20
        assert_eq!(eval(&HashMap::new(), "2 + 3 * 4").unwrap(), 14.0);
    }

    #[test]
    fn named_operands_are_substituted() {
        let v = vars(&[("a", 10.0), ("b", 4.0)]);
        assert_eq!(eval(&v, "a / b").unwrap(), 2.5);
    }

    #[test]
    fn division_by_zero_yields_zero() {
        let v = vars(&[("a", 10.0), ("b", 0.0)]);
        assert_eq!(eval(&v, "a / b").unwrap(), 0.0);
    }

    #[test]
    fn left_associativity_holds_for_subtraction() {
        // 10 - 3 - 2 = 5, not 9
        assert_eq!(eval(&HashMap::new(), "10 - 3 - 2").unwrap(), 5.0);
    }

    #[test]
    fn postfix_matches_original_sy_tokenizer() {
        assert_eq!(to_postfix("2 + 3 * 4").unwrap(), "2 3 4 * +");
    }
}
