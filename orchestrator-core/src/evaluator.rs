use std::collections::HashMap;

use regex::Regex;
use serde_json::Value;

use crate::error::{OrchestratorError, Result};

/// Evaluates the small template/boolean expression language workflow steps
/// use to reference variables and gate conditional branches.
///
/// Two surfaces are supported:
/// - `substitute`: replaces `{{var}}` and `$var` references inside a string
///   template with the bound variable's display form.
/// - `evaluate_bool`: a boolean expression grammar supporting `==`, `!=`,
///   `<`, `<=`, `>`, `>=`, `contains` comparisons, `&&`/`||`/`!` logical
///   composition (short-circuiting), parenthesized grouping, and both
///   `{{var}}` and `$var` references.
pub struct ExpressionEvaluator;

const PLACEHOLDER: &str = r"\{\{\s*([a-zA-Z_][a-zA-Z0-9_.]*)\s*\}\}|\$([a-zA-Z_][a-zA-Z0-9_.]*)";

impl ExpressionEvaluator {
    /// Replaces every `{{var}}` or `$var` placeholder in `template` with the
    /// string form of the bound variable. Fails with `RequiredVariableMissing`
    /// if a placeholder references a variable not present in `vars`.
    pub fn substitute(template: &str, vars: &HashMap<String, Value>) -> Result<String> {
        let re = Regex::new(PLACEHOLDER).map_err(|e| OrchestratorError::Expression(e.to_string()))?;

        let mut missing: Option<String> = None;
        let result = re.replace_all(template, |caps: &regex::Captures| {
            let name = caps.get(1).or_else(|| caps.get(2)).unwrap().as_str();
            match vars.get(name) {
                Some(value) => value_to_display(value),
                None => {
                    missing.get_or_insert_with(|| name.to_string());
                    String::new()
                }
            }
        });

        if let Some(name) = missing {
            return Err(OrchestratorError::RequiredVariableMissing(name));
        }

        Ok(result.into_owned())
    }

    /// Evaluates a boolean expression: comparisons (`{{var}} OP literal`,
    /// `$var OP {{other}}`, ...) composed with `&&`, `||`, `!`, and
    /// parentheses. `&&`/`||` short-circuit, so a clause that would error
    /// (e.g. reference a missing variable) is never evaluated once the
    /// result is already determined.
    pub fn evaluate_bool(expr: &str, vars: &HashMap<String, Value>) -> Result<bool> {
        parse_or(expr.trim(), vars)
    }
}

fn parse_or(expr: &str, vars: &HashMap<String, Value>) -> Result<bool> {
    let parts = split_top_level(expr, "||");
    if parts.len() == 1 {
        return parse_and(parts[0], vars);
    }
    for part in parts {
        if parse_and(part, vars)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn parse_and(expr: &str, vars: &HashMap<String, Value>) -> Result<bool> {
    let parts = split_top_level(expr, "&&");
    if parts.len() == 1 {
        return parse_not(parts[0], vars);
    }
    for part in parts {
        if !parse_not(part, vars)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn parse_not(expr: &str, vars: &HashMap<String, Value>) -> Result<bool> {
    let trimmed = expr.trim();
    match trimmed.strip_prefix('!') {
        Some(rest) => Ok(!parse_not(rest, vars)?),
        None => parse_primary(trimmed, vars),
    }
}

fn parse_primary(expr: &str, vars: &HashMap<String, Value>) -> Result<bool> {
    let trimmed = expr.trim();
    if is_fully_parenthesized(trimmed) {
        return parse_or(&trimmed[1..trimmed.len() - 1], vars);
    }
    evaluate_comparison(trimmed, vars)
}

/// Splits `expr` on every top-level occurrence of `op` (ignoring
/// occurrences nested inside parentheses). Always returns at least one
/// element; a single-element result means `op` never appeared at depth 0.
fn split_top_level<'a>(expr: &'a str, op: &str) -> Vec<&'a str> {
    let bytes = expr.as_bytes();
    let op_bytes = op.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'(' => depth += 1,
            b')' => depth -= 1,
            _ => {}
        }
        if depth == 0 && i + op_bytes.len() <= bytes.len() && &bytes[i..i + op_bytes.len()] == op_bytes {
            parts.push(expr[start..i].trim());
            i += op_bytes.len();
            start = i;
            continue;
        }
        i += 1;
    }
    parts.push(expr[start..].trim());
    parts
}

fn is_fully_parenthesized(expr: &str) -> bool {
    if !(expr.starts_with('(') && expr.ends_with(')')) {
        return false;
    }
    let mut depth = 0i32;
    for (idx, c) in expr.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            _ => {}
        }
        if depth == 0 && idx != expr.len() - 1 {
            return false;
        }
    }
    true
}

fn evaluate_comparison(trimmed: &str, vars: &HashMap<String, Value>) -> Result<bool> {
    for op in ["==", "!=", "<=", ">=", "<", ">", "contains"] {
        if let Some(idx) = find_operator(trimmed, op) {
            let (lhs, rhs) = (trimmed[..idx].trim(), trimmed[idx + op.len()..].trim());
            let lhs_val = resolve_operand(lhs, vars)?;
            let rhs_val = resolve_operand(rhs, vars)?;
            return apply_operator(op, &lhs_val, &rhs_val);
        }
    }

    // Bare reference: truthy if present and not `false`/`0`/empty.
    let value = resolve_operand(trimmed, vars)?;
    Ok(is_truthy(&value))
}

fn find_operator(expr: &str, op: &str) -> Option<usize> {
    // Avoid matching `<=`/`>=` as a bare `<`/`>`.
    let bytes = expr.as_bytes();
    let op_bytes = op.as_bytes();
    let mut i = 0;
    while i + op_bytes.len() <= bytes.len() {
        if &bytes[i..i + op_bytes.len()] == op_bytes {
            if op == "<" && bytes.get(i + 1) == Some(&b'=') {
                i += 1;
                continue;
            }
            if op == ">" && bytes.get(i + 1) == Some(&b'=') {
                i += 1;
                continue;
            }
            return Some(i);
        }
        i += 1;
    }
    None
}

fn resolve_operand(token: &str, vars: &HashMap<String, Value>) -> Result<Value> {
    if let Some(name) = reference_name(token) {
        return vars.get(name).cloned().ok_or_else(|| OrchestratorError::RequiredVariableMissing(name.to_string()));
    }

    // Literal: string (optionally quoted), number, or bool.
    let unquoted = token.trim_matches('"').trim_matches('\'');
    if let Ok(n) = unquoted.parse::<f64>() {
        return Ok(Value::from(n));
    }
    if let Ok(b) = unquoted.parse::<bool>() {
        return Ok(Value::from(b));
    }
    Ok(Value::from(unquoted))
}

/// Recognizes `{{name}}` and `$name` reference tokens, returning the bare
/// variable name. `None` for anything else (literals).
fn reference_name(token: &str) -> Option<&str> {
    if let Some(inner) = token.strip_prefix("{{").and_then(|s| s.strip_suffix("}}")) {
        let name = inner.trim();
        return is_identifier(name).then_some(name);
    }
    if let Some(name) = token.strip_prefix('$') {
        return is_identifier(name).then_some(name);
    }
    None
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

fn apply_operator(op: &str, lhs: &Value, rhs: &Value) -> Result<bool> {
    match op {
        "==" => Ok(values_equal(lhs, rhs)),
        "!=" => Ok(!values_equal(lhs, rhs)),
        "contains" => Ok(match (lhs, rhs) {
            (Value::String(s), Value::String(needle)) => s.contains(needle.as_str()),
            (Value::Array(items), needle) => items.iter().any(|i| values_equal(i, needle)),
            _ => false,
        }),
        "<" | "<=" | ">" | ">=" => {
            let (l, r) = (
                lhs.as_f64().ok_or_else(|| OrchestratorError::Expression(format!("{lhs} is not numeric"))),
                rhs.as_f64().ok_or_else(|| OrchestratorError::Expression(format!("{rhs} is not numeric"))),
            );
            let (l, r) = (l?, r?);
            Ok(match op {
                "<" => l < r,
                "<=" => l <= r,
                ">" => l > r,
                ">=" => l >= r,
                _ => unreachable!(),
            })
        }
        _ => Err(OrchestratorError::Expression(format!("unsupported operator: {op}"))),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::String(x), Value::String(y)) => x == y,
        _ => a == b,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty() && s != "false",
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn value_to_display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
