//! Structured filter syntax tree

/// Operator of a filter expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpressionType {
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    Nin,
    /// Unary negation. The text parser never produces it and the SQLite
    /// dialect rejects it.
    Not,
}

/// Field path such as `serviceName` or `attributes["http.method"]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key(pub String);

/// Literal on the right-hand side of a comparison
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<FilterValue>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Key(Key),
    Value(FilterValue),
    Expression(Box<Expression>),
    /// Parenthesized sub-expression
    Group(Box<Expression>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub kind: ExpressionType,
    pub left: Operand,
    pub right: Option<Operand>,
}

impl Expression {
    pub fn new(kind: ExpressionType, left: Operand, right: Operand) -> Self {
        Self {
            kind,
            left,
            right: Some(right),
        }
    }

    /// `key OP value`
    pub fn compare(kind: ExpressionType, key: &str, value: FilterValue) -> Self {
        Self::new(kind, Operand::key(key), Operand::Value(value))
    }

    pub fn and(left: Expression, right: Expression) -> Self {
        Self::new(
            ExpressionType::And,
            Operand::Expression(Box::new(left)),
            Operand::Expression(Box::new(right)),
        )
    }

    pub fn or(left: Expression, right: Expression) -> Self {
        Self::new(
            ExpressionType::Or,
            Operand::Expression(Box::new(left)),
            Operand::Expression(Box::new(right)),
        )
    }
}

impl Operand {
    pub fn key(name: &str) -> Self {
        Self::Key(Key(name.to_string()))
    }

    pub fn group(inner: Expression) -> Self {
        Self::Group(Box::new(inner))
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}
