//! Predicate parser for accelerated Parquet queries.
//!
//! Recognises single-table scans with at most one scalar comparison on a
//! numeric column:
//!
//! ```sql
//! SELECT price, qty FROM read_parquet(['a.parquet', 'b.parquet']) WHERE price > 42.5
//! SELECT * FROM 'orders.parquet' WHERE price <= 100
//! ```
//!
//! Anything else is rejected so the caller can hand the query to the backing
//! engine untouched.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;

use crate::error::{Result, SmaqError};

static SELECT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)^\s*SELECT\s+(.+?)\s+FROM\s").unwrap());

static FROM_LIST_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)FROM\s+read_parquet\(\s*\[([^\]]*)\]\s*\)").unwrap());

static FROM_SINGLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)FROM\s+'([^']+)'").unwrap());

static WHERE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)WHERE\s+"?([A-Za-z_]\w*)"?\s*(>=|<=|!=|=|>|<)\s*(-?(?:\d+\.?\d*|\.\d+))"#)
        .unwrap()
});

/// Scalar comparison operator. The set is closed; evaluation and the
/// skip/outlier shortcuts are derived by pattern match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// SQL rendering, used when composing fallback scans.
    pub fn as_sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    /// Filesystem-safe mnemonic, used in predicate keys and artifact names.
    pub fn token(&self) -> &'static str {
        match self {
            CompareOp::Eq => "eq",
            CompareOp::Ne => "ne",
            CompareOp::Lt => "lt",
            CompareOp::Le => "le",
            CompareOp::Gt => "gt",
            CompareOp::Ge => "ge",
        }
    }

    /// Evaluate `value OP literal`.
    pub fn eval(&self, value: f64, literal: f64) -> bool {
        match self {
            CompareOp::Eq => value == literal,
            CompareOp::Ne => value != literal,
            CompareOp::Lt => value < literal,
            CompareOp::Le => value <= literal,
            CompareOp::Gt => value > literal,
            CompareOp::Ge => value >= literal,
        }
    }

    /// The predicate is provably empty given the column extrema.
    pub fn selects_nothing(&self, min: f64, max: f64, literal: f64) -> bool {
        match self {
            CompareOp::Gt => literal > max,
            CompareOp::Lt => literal < min,
            _ => false,
        }
    }

    /// Every satisfying row lies outside the fence, so the materialised
    /// outlier slice already holds the full answer.
    pub fn selects_only_outliers(&self, lower: f64, upper: f64, literal: f64) -> bool {
        match self {
            CompareOp::Gt => literal > upper,
            CompareOp::Lt => literal < lower,
            _ => false,
        }
    }
}

impl std::str::FromStr for CompareOp {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "=" | "==" => Ok(CompareOp::Eq),
            "!=" | "<>" => Ok(CompareOp::Ne),
            "<" => Ok(CompareOp::Lt),
            "<=" => Ok(CompareOp::Le),
            ">" => Ok(CompareOp::Gt),
            ">=" => Ok(CompareOp::Ge),
            _ => Err(format!("Unknown operator: {}", s)),
        }
    }
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_sql())
    }
}

/// A single scalar comparison on one column.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub column: String,
    pub op: CompareOp,
    pub literal: f64,
}

impl std::fmt::Display for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.column, self.op, self.literal)
    }
}

/// The recognised parts of an accelerable query.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuery {
    /// Source files in declaration order. Globs are expected to be expanded
    /// by the caller before the query reaches the parser.
    pub files: Vec<PathBuf>,
    /// Projected columns; `None` means `*`.
    pub projection: Option<Vec<String>>,
    pub predicate: Predicate,
}

/// Parse a query string into its accelerable parts.
pub fn parse_query(sql: &str) -> Result<ParsedQuery> {
    let select = SELECT_RE.captures(sql).ok_or_else(|| {
        SmaqError::UnsupportedQuery("expected a SELECT ... FROM statement".to_string())
    })?;
    let projection = parse_projection(&select[1]);

    let files = if let Some(caps) = FROM_LIST_RE.captures(sql) {
        parse_path_list(&caps[1])?
    } else if let Some(caps) = FROM_SINGLE_RE.captures(sql) {
        vec![PathBuf::from(caps[1].trim())]
    } else {
        return Err(SmaqError::UnsupportedQuery(
            "FROM clause must be read_parquet([...]) or a quoted path".to_string(),
        ));
    };
    if files.is_empty() {
        return Err(SmaqError::MalformedQuery("empty path list".to_string()));
    }

    let caps = WHERE_RE.captures(sql).ok_or_else(|| {
        SmaqError::MalformedQuery("expected WHERE <column> <op> <number>".to_string())
    })?;
    let op: CompareOp = caps[2].parse().map_err(SmaqError::MalformedQuery)?;
    let literal: f64 = caps[3]
        .parse()
        .map_err(|_| SmaqError::MalformedQuery(format!("invalid numeric literal: {}", &caps[3])))?;

    Ok(ParsedQuery {
        files,
        projection,
        predicate: Predicate {
            column: caps[1].to_string(),
            op,
            literal,
        },
    })
}

fn parse_projection(raw: &str) -> Option<Vec<String>> {
    let cols: Vec<String> = raw
        .split(',')
        .map(|c| c.trim().trim_matches('"').to_string())
        .filter(|c| !c.is_empty())
        .collect();
    if cols.is_empty() || cols == ["*"] {
        None
    } else {
        Some(cols)
    }
}

fn parse_path_list(raw: &str) -> Result<Vec<PathBuf>> {
    raw.split(',')
        .map(|p| {
            let path = p.trim().trim_matches(|c| c == '\'' || c == '"');
            if path.is_empty() {
                Err(SmaqError::MalformedQuery(
                    "empty path in read_parquet list".to_string(),
                ))
            } else {
                Ok(PathBuf::from(path))
            }
        })
        .collect()
}
