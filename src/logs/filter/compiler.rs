//! Filter AST to SQL predicate compilation

use super::ast::{Expression, ExpressionType, FilterValue, Key, Operand};
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// `column["name"]` or `column['name']`, either side optionally dotted once
static ATTRIBUTE_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(?:(\w+\.?\w*)\["(\w+\.?\w*)"\]|(\w+\.?\w*)\['(\w+\.?\w*)'\])$"#).unwrap()
});

static PLAIN_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompileError {
    /// The AST carries an operator this dialect has no rendering for
    #[error("Not supported expression type: {0:?}")]
    UnsupportedOperator(ExpressionType),

    #[error("Invalid filter key: {0}")]
    InvalidKey(String),

    #[error("Missing right operand for {0:?}")]
    MissingOperand(ExpressionType),
}

impl CompileError {
    /// True when the failure comes from user-supplied content rather than
    /// from a parser/compiler mismatch
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidKey(_))
    }
}

/// Renders a filter expression into a backend predicate fragment
pub trait FilterCompiler: Send + Sync {
    fn compile(&self, expression: &Expression) -> Result<String, CompileError>;
}

/// SQLite dialect using the JSON1 `json_extract` function for attribute maps
#[derive(Debug, Clone, Copy, Default)]
pub struct Sqlite3FilterCompiler;

impl FilterCompiler for Sqlite3FilterCompiler {
    fn compile(&self, expression: &Expression) -> Result<String, CompileError> {
        let mut out = String::new();
        write_expression(expression, &mut out)?;
        Ok(out)
    }
}

fn write_expression(expression: &Expression, out: &mut String) -> Result<(), CompileError> {
    let symbol = operation_symbol(expression.kind)?;
    let right = expression
        .right
        .as_ref()
        .ok_or(CompileError::MissingOperand(expression.kind))?;

    write_operand(&expression.left, out)?;
    out.push_str(symbol);
    write_operand(right, out)
}

fn write_operand(operand: &Operand, out: &mut String) -> Result<(), CompileError> {
    match operand {
        Operand::Key(key) => write_key(key, out),
        Operand::Value(value) => {
            write_value(value, out);
            Ok(())
        }
        Operand::Expression(inner) => write_expression(inner, out),
        Operand::Group(inner) => {
            out.push('(');
            write_expression(inner, out)?;
            out.push(')');
            Ok(())
        }
    }
}

fn operation_symbol(kind: ExpressionType) -> Result<&'static str, CompileError> {
    let symbol = match kind {
        ExpressionType::And => " AND ",
        ExpressionType::Or => " OR ",
        ExpressionType::Eq => " == ",
        ExpressionType::Ne => " != ",
        ExpressionType::Lt => " < ",
        ExpressionType::Lte => " <= ",
        ExpressionType::Gt => " > ",
        ExpressionType::Gte => " >= ",
        ExpressionType::In => " IN ",
        ExpressionType::Nin => " NIN ",
        other => return Err(CompileError::UnsupportedOperator(other)),
    };
    Ok(symbol)
}

fn write_key(key: &Key, out: &mut String) -> Result<(), CompileError> {
    let identifier = strip_outer_quotes(&key.0);

    if let Some(caps) = ATTRIBUTE_KEY_RE.captures(identifier) {
        let column = caps.get(1).or_else(|| caps.get(3)).map(|m| m.as_str());
        let name = caps.get(2).or_else(|| caps.get(4)).map(|m| m.as_str());
        if let (Some(column), Some(name)) = (column, name) {
            out.push_str("json_extract(");
            out.push_str(&to_snake_case(column));
            out.push_str(", '$.");
            if name.contains('.') {
                out.push('"');
                out.push_str(name);
                out.push('"');
            } else {
                out.push_str(name);
            }
            out.push_str("')");
            return Ok(());
        }
    }

    // Plain keys land in the SQL text verbatim, so only bare identifiers pass.
    if !PLAIN_KEY_RE.is_match(identifier) {
        return Err(CompileError::InvalidKey(key.0.clone()));
    }
    out.push_str(&to_snake_case(identifier));
    Ok(())
}

fn write_value(value: &FilterValue, out: &mut String) {
    match value {
        FilterValue::Text(text) => {
            out.push('"');
            out.push_str(&text.replace('"', "\"\""));
            out.push('"');
        }
        FilterValue::Int(i) => out.push_str(&i.to_string()),
        FilterValue::Float(f) => out.push_str(&f.to_string()),
        FilterValue::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        FilterValue::List(values) => {
            out.push('[');
            for (i, item) in values.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
    }
}

fn strip_outer_quotes(s: &str) -> &str {
    let quoted = s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')));
    if quoted {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

/// `serviceName` -> `service_name`
pub fn to_snake_case(camel_case: &str) -> String {
    let mut snake = String::with_capacity(camel_case.len() + 4);
    for c in camel_case.chars() {
        if c.is_uppercase() {
            snake.push('_');
            snake.extend(c.to_lowercase());
        } else {
            snake.push(c);
        }
    }
    snake
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::filter::ast::ExpressionType::*;

    fn compile(expression: &Expression) -> String {
        Sqlite3FilterCompiler.compile(expression).unwrap()
    }

    fn text_list(items: &[&str]) -> FilterValue {
        FilterValue::List(items.iter().map(|s| FilterValue::from(*s)).collect())
    }

    #[test]
    fn test_eq() {
        let expr = Expression::compare(Eq, "country", "BG".into());
        assert_eq!(compile(&expr), r#"country == "BG""#);
    }

    #[test]
    fn test_and_with_gte() {
        let expr = Expression::and(
            Expression::compare(Eq, "genre", "drama".into()),
            Expression::compare(Gte, "year", 2020i64.into()),
        );
        assert_eq!(compile(&expr), r#"genre == "drama" AND year >= 2020"#);
    }

    #[test]
    fn test_in_list() {
        let expr = Expression::compare(In, "genre", text_list(&["comedy", "documentary", "drama"]));
        assert_eq!(
            compile(&expr),
            r#"genre IN ["comedy","documentary","drama"]"#
        );
    }

    #[test]
    fn test_mixed_and_or_without_group() {
        let expr = Expression::or(
            Expression::compare(Gte, "year", 2020i64.into()),
            Expression::and(
                Expression::compare(Eq, "country", "BG".into()),
                Expression::compare(Ne, "city", "Sofia".into()),
            ),
        );
        assert_eq!(
            compile(&expr),
            r#"year >= 2020 OR country == "BG" AND city != "Sofia""#
        );
    }

    #[test]
    fn test_group_preserves_precedence() {
        let expr = Expression::new(
            And,
            Operand::group(Expression::or(
                Expression::compare(Gte, "year", 2020i64.into()),
                Expression::compare(Eq, "country", "BG".into()),
            )),
            Operand::Expression(Box::new(Expression::compare(
                Nin,
                "city",
                text_list(&["Sofia", "Plovdiv"]),
            ))),
        );
        assert_eq!(
            compile(&expr),
            r#"(year >= 2020 OR country == "BG") AND city NIN ["Sofia","Plovdiv"]"#
        );
    }

    #[test]
    fn test_bool_and_negative_floats() {
        let expr = Expression::and(
            Expression::and(
                Expression::compare(Eq, "isOpen", true.into()),
                Expression::compare(Gte, "year", 2020i64.into()),
            ),
            Expression::compare(In, "country", text_list(&["BG", "NL", "US"])),
        );
        assert_eq!(
            compile(&expr),
            r#"is_open == true AND year >= 2020 AND country IN ["BG","NL","US"]"#
        );

        let range = Expression::and(
            Expression::compare(Gte, "temperature", (-15.6f64).into()),
            Expression::compare(Lte, "temperature", 20.13f64.into()),
        );
        assert_eq!(
            compile(&range),
            "temperature >= -15.6 AND temperature <= 20.13"
        );
    }

    #[test]
    fn test_attribute_keys() {
        let double = Expression::compare(Eq, r#"attributes["country"]"#, "BG".into());
        assert_eq!(
            compile(&double),
            r#"json_extract(attributes, '$.country') == "BG""#
        );

        let single = Expression::compare(Eq, "attributes['country']", "BG".into());
        assert_eq!(
            compile(&single),
            r#"json_extract(attributes, '$.country') == "BG""#
        );

        let resource = Expression::compare(Eq, r#"resourceAttributes["country"]"#, "BG".into());
        assert_eq!(
            compile(&resource),
            r#"json_extract(resource_attributes, '$.country') == "BG""#
        );
    }

    #[test]
    fn test_dotted_attribute_name_is_quoted() {
        let expr = Expression::compare(
            Eq,
            r#"attributes["user_agent.original"]"#,
            "kube-probe//".into(),
        );
        assert_eq!(
            compile(&expr),
            r#"json_extract(attributes, '$."user_agent.original"') == "kube-probe//""#
        );
    }

    #[test]
    fn test_text_value_escapes_quotes() {
        let expr = Expression::compare(Eq, "body", r#"say "hi""#.into());
        assert_eq!(compile(&expr), r#"body == "say ""hi""""#);
    }

    #[test]
    fn test_unsupported_operator_fails() {
        let expr = Expression {
            kind: Not,
            left: Operand::group(Expression::compare(Eq, "a", 1i64.into())),
            right: None,
        };
        let err = Sqlite3FilterCompiler.compile(&expr).unwrap_err();
        assert_eq!(err, CompileError::UnsupportedOperator(Not));
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_rejects_injected_key() {
        let expr = Expression::compare(Eq, "1=1 OR body", "x".into());
        let err = Sqlite3FilterCompiler.compile(&expr).unwrap_err();
        assert!(matches!(err, CompileError::InvalidKey(_)));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_to_snake_case() {
        assert_eq!(to_snake_case("resourceAttributes"), "resource_attributes");
        assert_eq!(to_snake_case("severity_text"), "severity_text");
        assert_eq!(to_snake_case("observedTimestamp"), "observed_timestamp");
    }
}
