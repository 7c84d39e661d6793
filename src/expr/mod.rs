//! Predicate expression trees
//!
//! A WHERE clause compiles into a [`QExpr`]: logical connectives over leaf
//! predicates. Leaves name columns of one dataset; [`JoinTerm`] leaves relate
//! two columns of the same dataset and are resolved by the join evaluator
//! rather than by row scans.

mod parser;
mod select;

use std::cmp::Ordering;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::dataset::{DatasetData, Numeric};
use crate::{QueryError, Result};

pub use parser::{parse_math, parse_select, parse_where};
pub use select::{SelectClause, SelectTerm};

// ============================================================================
// Ranges
// ============================================================================

/// One end of a continuous range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    pub value: Numeric,
    pub inclusive: bool,
}

impl Bound {
    /// Whether `v` is on the inner side of this bound taken as a lower end
    #[inline]
    fn admits_from_below(self, v: Numeric) -> bool {
        match v.compare(self.value) {
            Some(Ordering::Greater) => true,
            Some(Ordering::Equal) => self.inclusive,
            _ => false,
        }
    }

    /// Whether `v` is on the inner side of this bound taken as an upper end
    #[inline]
    fn admits_from_above(self, v: Numeric) -> bool {
        match v.compare(self.value) {
            Some(Ordering::Less) => true,
            Some(Ordering::Equal) => self.inclusive,
            _ => false,
        }
    }
}

/// `lower (<|<=) column (<|<=) upper`, either end optional
///
/// Bounds keep the literal's numeric family, so integer columns are
/// compared exactly at any magnitude.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuousRange {
    pub column: String,
    pub lower: Option<Bound>,
    pub upper: Option<Bound>,
}

impl ContinuousRange {
    /// `column = value`
    pub fn equals(column: &str, value: impl Into<Numeric>) -> Self {
        let b = Bound { value: value.into(), inclusive: true };
        Self { column: column.to_string(), lower: Some(b), upper: Some(b) }
    }

    /// `low <= column <= high`
    pub fn between(column: &str, low: impl Into<Numeric>, high: impl Into<Numeric>) -> Self {
        Self {
            column: column.to_string(),
            lower: Some(Bound { value: low.into(), inclusive: true }),
            upper: Some(Bound { value: high.into(), inclusive: true }),
        }
    }

    /// `column < value` or `column <= value`
    pub fn below(column: &str, value: impl Into<Numeric>, inclusive: bool) -> Self {
        Self { column: column.to_string(), lower: None, upper: Some(Bound { value: value.into(), inclusive }) }
    }

    /// `column > value` or `column >= value`
    pub fn above(column: &str, value: impl Into<Numeric>, inclusive: bool) -> Self {
        Self { column: column.to_string(), lower: Some(Bound { value: value.into(), inclusive }), upper: None }
    }

    #[inline]
    pub fn contains(&self, v: Numeric) -> bool {
        if v.is_nan() {
            return false;
        }
        self.lower.map_or(true, |b| b.admits_from_below(v)) && self.upper.map_or(true, |b| b.admits_from_above(v))
    }

    /// Whether some value of `[lo, hi]` lies in the range
    pub fn overlaps(&self, lo: Numeric, hi: Numeric) -> bool {
        self.lower.map_or(true, |b| b.admits_from_below(hi))
            && self.upper.map_or(true, |b| b.admits_from_above(lo))
            && !self.is_void()
    }

    /// Whether every value of `[lo, hi]` lies in the range
    pub fn covers(&self, lo: Numeric, hi: Numeric) -> bool {
        self.contains(lo) && self.contains(hi)
    }

    /// Whether no value can satisfy the range
    pub fn is_void(&self) -> bool {
        match (self.lower, self.upper) {
            (Some(l), Some(u)) => match l.value.compare(u.value) {
                Some(Ordering::Less) => false,
                Some(Ordering::Equal) => !(l.inclusive && u.inclusive),
                _ => true,
            },
            _ => false,
        }
    }

    /// Whether this is `column = v`
    pub fn as_equality(&self) -> Option<Numeric> {
        match (self.lower, self.upper) {
            (Some(l), Some(u)) if l.inclusive && u.inclusive && l.value.equals(u.value) => Some(l.value),
            _ => None,
        }
    }
}

/// `column IN (v1, v2, ...)`, values kept sorted and distinct
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscreteRange {
    pub column: String,
    pub values: Vec<Numeric>,
}

impl DiscreteRange {
    pub fn new<V: Into<Numeric>>(column: &str, values: impl IntoIterator<Item = V>) -> Self {
        let mut values: Vec<Numeric> = values.into_iter().map(Into::<Numeric>::into).filter(|v| !v.is_nan()).collect();
        values.sort_by(|a, b| a.total_cmp(*b));
        values.dedup_by(|a, b| a.equals(*b));
        Self { column: column.to_string(), values }
    }

    #[inline]
    pub fn contains(&self, v: Numeric) -> bool {
        self.values.binary_search_by(|x| x.total_cmp(v)).is_ok()
    }

    /// Whether some listed value lies in `[lo, hi]`
    pub fn overlaps(&self, lo: Numeric, hi: Numeric) -> bool {
        let start = self.values.partition_point(|x| x.total_cmp(lo) == Ordering::Less);
        self.values.get(start).map_or(false, |x| x.total_cmp(hi) != Ordering::Greater)
    }
}

/// `column = 'value'` on a text column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringMatch {
    pub column: String,
    pub value: String,
}

/// `column LIKE 'pattern'` with `%` and `_` wildcards
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeMatch {
    pub column: String,
    pub pattern: String,
}

impl LikeMatch {
    /// Compile the pattern into an anchored regular expression
    pub fn regex(&self) -> Result<Regex> {
        let mut re = String::with_capacity(self.pattern.len() + 8);
        re.push_str("(?s)^");
        let mut literal = String::new();
        for c in self.pattern.chars() {
            match c {
                '%' | '_' => {
                    re.push_str(&regex::escape(&literal));
                    literal.clear();
                    re.push_str(if c == '%' { ".*" } else { "." });
                }
                _ => literal.push(c),
            }
        }
        re.push_str(&regex::escape(&literal));
        re.push('$');
        Regex::new(&re).map_err(|e| QueryError::Parse(format!("bad LIKE pattern '{}': {}", self.pattern, e)))
    }
}

/// `column CONTAINS 'keyword'` on a text column of delimited keywords
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordMatch {
    pub column: String,
    pub keyword: String,
}

/// Split a text value into keywords
pub fn tokenize_keywords(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| c.is_whitespace() || c == ',' || c == ';').filter(|t| !t.is_empty())
}

// ============================================================================
// Arithmetic terms
// ============================================================================

/// Comparison operator of an arithmetic predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl CompareOp {
    #[inline]
    pub fn apply(self, a: f64, b: f64) -> bool {
        match self {
            CompareOp::Lt => a < b,
            CompareOp::Le => a <= b,
            CompareOp::Gt => a > b,
            CompareOp::Ge => a >= b,
            CompareOp::Eq => a == b,
            CompareOp::Ne => a != b && !a.is_nan() && !b.is_nan(),
        }
    }

    /// The operator with its operands swapped
    pub fn flip(self) -> Self {
        match self {
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::Le => CompareOp::Ge,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::Ge => CompareOp::Le,
            other => other,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
        }
    }
}

/// Binary arithmetic operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MathOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
}

impl MathOp {
    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            MathOp::Add => a + b,
            MathOp::Sub => a - b,
            MathOp::Mul => a * b,
            MathOp::Div => a / b,
            MathOp::Rem => a % b,
            MathOp::Pow => a.powf(b),
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            MathOp::Add => "+",
            MathOp::Sub => "-",
            MathOp::Mul => "*",
            MathOp::Div => "/",
            MathOp::Rem => "%",
            MathOp::Pow => "^",
        }
    }
}

/// Single-argument math function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MathFunc {
    Abs,
    Sqrt,
    Exp,
    Ln,
    Log10,
    Floor,
    Ceil,
    Round,
}

impl MathFunc {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "abs" => Some(MathFunc::Abs),
            "sqrt" => Some(MathFunc::Sqrt),
            "exp" => Some(MathFunc::Exp),
            "ln" | "log" => Some(MathFunc::Ln),
            "log10" => Some(MathFunc::Log10),
            "floor" => Some(MathFunc::Floor),
            "ceil" => Some(MathFunc::Ceil),
            "round" => Some(MathFunc::Round),
            _ => None,
        }
    }

    fn apply(self, x: f64) -> f64 {
        match self {
            MathFunc::Abs => x.abs(),
            MathFunc::Sqrt => x.sqrt(),
            MathFunc::Exp => x.exp(),
            MathFunc::Ln => x.ln(),
            MathFunc::Log10 => x.log10(),
            MathFunc::Floor => x.floor(),
            MathFunc::Ceil => x.ceil(),
            MathFunc::Round => x.round(),
        }
    }

    fn name(self) -> &'static str {
        match self {
            MathFunc::Abs => "abs",
            MathFunc::Sqrt => "sqrt",
            MathFunc::Exp => "exp",
            MathFunc::Ln => "ln",
            MathFunc::Log10 => "log10",
            MathFunc::Floor => "floor",
            MathFunc::Ceil => "ceil",
            MathFunc::Round => "round",
        }
    }
}

/// Arithmetic expression over column values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MathTerm {
    Number(Numeric),
    Column(String),
    Negate(Box<MathTerm>),
    Binary {
        op: MathOp,
        left: Box<MathTerm>,
        right: Box<MathTerm>,
    },
    Function {
        func: MathFunc,
        arg: Box<MathTerm>,
    },
}

impl MathTerm {
    /// Evaluate with `lookup` supplying column values; `None` when any
    /// referenced value is null
    pub fn eval(&self, lookup: &mut dyn FnMut(&str) -> Option<f64>) -> Option<f64> {
        match self {
            MathTerm::Number(v) => Some(v.as_f64()),
            MathTerm::Column(name) => lookup(name),
            MathTerm::Negate(t) => t.eval(lookup).map(|v| -v),
            MathTerm::Binary { op, left, right } => {
                let a = left.eval(lookup)?;
                let b = right.eval(lookup)?;
                Some(op.apply(a, b))
            }
            MathTerm::Function { func, arg } => arg.eval(lookup).map(|v| func.apply(v)),
        }
    }

    /// Value when the term references no column
    pub fn constant_value(&self) -> Option<f64> {
        self.eval(&mut |_: &str| None)
    }

    /// Like [`constant_value`](Self::constant_value), but a bare literal keeps
    /// its integer family
    pub fn constant_numeric(&self) -> Option<Numeric> {
        match self {
            MathTerm::Number(v) => Some(*v),
            _ => self.constant_value().map(Numeric::Float),
        }
    }

    pub fn is_constant(&self) -> bool {
        let mut cols = Vec::new();
        self.collect_columns(&mut cols);
        cols.is_empty()
    }

    /// Bare column name, if the term is just a column
    pub fn as_column(&self) -> Option<&str> {
        match self {
            MathTerm::Column(name) => Some(name),
            _ => None,
        }
    }

    pub fn collect_columns(&self, out: &mut Vec<String>) {
        match self {
            MathTerm::Number(_) => {}
            MathTerm::Column(name) => push_unique(out, name),
            MathTerm::Negate(t) => t.collect_columns(out),
            MathTerm::Binary { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            MathTerm::Function { arg, .. } => arg.collect_columns(out),
        }
    }
}

impl fmt::Display for MathTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MathTerm::Number(v) => write!(f, "{}", v),
            MathTerm::Column(name) => write!(f, "{}", name),
            MathTerm::Negate(t) => write!(f, "-({})", t),
            MathTerm::Binary { op, left, right } => write!(f, "({} {} {})", left, op.symbol(), right),
            MathTerm::Function { func, arg } => write!(f, "{}({})", func.name(), arg),
        }
    }
}

/// `left op right` over arbitrary arithmetic terms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompareTerm {
    pub left: MathTerm,
    pub op: CompareOp,
    pub right: MathTerm,
}

impl CompareTerm {
    /// Truth value when neither side references a column
    pub fn constant_truth(&self) -> Option<bool> {
        let a = self.left.constant_value()?;
        let b = self.right.constant_value()?;
        Some(self.op.apply(a, b))
    }
}

// ============================================================================
// Join terms
// ============================================================================

/// Two-column join condition: `left = right` or `|left - right| <= tolerance`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinTerm {
    pub left: String,
    pub right: String,
    pub tolerance: Option<MathTerm>,
}

/// Shape of a join condition
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JoinKind<'a> {
    /// `left = right`
    Equality,
    /// `|left - right| <= delta`
    Band(f64),
    /// `|left - right| <= term`, term evaluated on the left row
    Computed(&'a MathTerm),
}

impl JoinTerm {
    pub fn new(left: &str, right: &str, tolerance: Option<MathTerm>) -> Self {
        Self { left: left.to_string(), right: right.to_string(), tolerance }
    }

    pub fn kind(&self) -> JoinKind<'_> {
        match &self.tolerance {
            None => JoinKind::Equality,
            Some(t) => match t.constant_value() {
                Some(d) if d == 0.0 => JoinKind::Equality,
                Some(d) => JoinKind::Band(d.abs()),
                None => JoinKind::Computed(t),
            },
        }
    }

    /// Whether both sides name the same column
    pub fn is_self_join(&self) -> bool {
        self.left == self.right
    }
}

impl fmt::Display for JoinTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tolerance {
            Some(t) => write!(f, "JOIN({}, {}, {})", self.left, self.right, t),
            None => write!(f, "JOIN({}, {})", self.left, self.right),
        }
    }
}

// ============================================================================
// Predicate tree
// ============================================================================

/// Predicate expression tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QExpr {
    And(Box<QExpr>, Box<QExpr>),
    Or(Box<QExpr>, Box<QExpr>),
    Xor(Box<QExpr>, Box<QExpr>),
    /// Left and not right
    Minus(Box<QExpr>, Box<QExpr>),
    Not(Box<QExpr>),
    Range(ContinuousRange),
    DiscreteRange(DiscreteRange),
    String(StringMatch),
    Like(LikeMatch),
    Keyword(KeywordMatch),
    /// Rows where the column exists and is not null
    Exists(String),
    Compare(CompareTerm),
    Constant(bool),
    Join(JoinTerm),
}

impl QExpr {
    pub fn and(l: QExpr, r: QExpr) -> QExpr {
        QExpr::And(Box::new(l), Box::new(r))
    }

    pub fn or(l: QExpr, r: QExpr) -> QExpr {
        QExpr::Or(Box::new(l), Box::new(r))
    }

    pub fn xor(l: QExpr, r: QExpr) -> QExpr {
        QExpr::Xor(Box::new(l), Box::new(r))
    }

    pub fn minus(l: QExpr, r: QExpr) -> QExpr {
        QExpr::Minus(Box::new(l), Box::new(r))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(e: QExpr) -> QExpr {
        QExpr::Not(Box::new(e))
    }

    pub fn is_leaf(&self) -> bool {
        !matches!(
            self,
            QExpr::And(..) | QExpr::Or(..) | QExpr::Xor(..) | QExpr::Minus(..) | QExpr::Not(_)
        )
    }

    /// Column names referenced anywhere in the tree, in order of appearance
    pub fn columns(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns(&self, out: &mut Vec<String>) {
        match self {
            QExpr::And(l, r) | QExpr::Or(l, r) | QExpr::Xor(l, r) | QExpr::Minus(l, r) => {
                l.collect_columns(out);
                r.collect_columns(out);
            }
            QExpr::Not(e) => e.collect_columns(out),
            QExpr::Range(r) => push_unique(out, &r.column),
            QExpr::DiscreteRange(r) => push_unique(out, &r.column),
            QExpr::String(s) => push_unique(out, &s.column),
            QExpr::Like(l) => push_unique(out, &l.column),
            QExpr::Keyword(k) => push_unique(out, &k.column),
            QExpr::Exists(c) => push_unique(out, c),
            QExpr::Compare(c) => {
                c.left.collect_columns(out);
                c.right.collect_columns(out);
            }
            QExpr::Constant(_) => {}
            QExpr::Join(j) => {
                push_unique(out, &j.left);
                push_unique(out, &j.right);
                if let Some(t) = &j.tolerance {
                    t.collect_columns(out);
                }
            }
        }
    }

    /// Whether a join term appears anywhere in the tree
    pub fn has_join(&self) -> bool {
        match self {
            QExpr::And(l, r) | QExpr::Or(l, r) | QExpr::Xor(l, r) | QExpr::Minus(l, r) => l.has_join() || r.has_join(),
            QExpr::Not(e) => e.has_join(),
            QExpr::Join(_) => true,
            _ => false,
        }
    }

    /// Leaves of the top-level conjunction
    pub fn conjuncts(&self) -> Vec<&QExpr> {
        let mut out = Vec::new();
        fn walk<'a>(e: &'a QExpr, out: &mut Vec<&'a QExpr>) {
            match e {
                QExpr::And(l, r) => {
                    walk(l, out);
                    walk(r, out);
                }
                _ => out.push(e),
            }
        }
        walk(self, &mut out);
        out
    }

    /// Join terms of the top-level conjunction
    pub fn join_terms(&self) -> Vec<JoinTerm> {
        self.conjuncts()
            .into_iter()
            .filter_map(|e| match e {
                QExpr::Join(j) => Some(j.clone()),
                _ => None,
            })
            .collect()
    }

    /// Range constraints in the top-level conjunction
    pub fn conjunctive_ranges(&self) -> Vec<ContinuousRange> {
        self.conjuncts()
            .into_iter()
            .filter_map(|e| match e {
                QExpr::Range(r) => Some(r.clone()),
                _ => None,
            })
            .collect()
    }

    /// A lone index-friendly leaf or a conjunction of them; reordering such a
    /// tree gains nothing
    pub fn is_directly_evaluable(&self) -> bool {
        match self {
            QExpr::And(l, r) => l.is_directly_evaluable() && r.is_directly_evaluable(),
            QExpr::Range(_)
            | QExpr::DiscreteRange(_)
            | QExpr::String(_)
            | QExpr::Keyword(_)
            | QExpr::Exists(_)
            | QExpr::Constant(_) => true,
            _ => false,
        }
    }

    /// Check that every referenced column exists with a suitable type
    pub fn validate(&self, data: &DatasetData) -> Result<()> {
        match self {
            QExpr::And(l, r) | QExpr::Or(l, r) | QExpr::Xor(l, r) | QExpr::Minus(l, r) => {
                l.validate(data)?;
                r.validate(data)
            }
            QExpr::Not(e) => e.validate(data),
            QExpr::Range(r) => data.numeric_column(&r.column).map(|_| ()),
            QExpr::DiscreteRange(r) => data.numeric_column(&r.column).map(|_| ()),
            QExpr::String(s) => data.text_column(&s.column).map(|_| ()),
            QExpr::Like(l) => {
                l.regex()?;
                data.text_column(&l.column).map(|_| ())
            }
            QExpr::Keyword(k) => data.text_column(&k.column).map(|_| ()),
            QExpr::Exists(_) | QExpr::Constant(_) => Ok(()),
            QExpr::Compare(c) => {
                let mut cols = Vec::new();
                c.left.collect_columns(&mut cols);
                c.right.collect_columns(&mut cols);
                cols.iter().try_for_each(|c| data.numeric_column(c).map(|_| ()))
            }
            QExpr::Join(j) => {
                data.numeric_column(&j.left)?;
                data.numeric_column(&j.right)?;
                if let Some(t) = &j.tolerance {
                    let mut cols = Vec::new();
                    t.collect_columns(&mut cols);
                    for c in &cols {
                        data.numeric_column(c)?;
                    }
                }
                Ok(())
            }
        }
    }

    /// Fold constants and double negations
    pub fn simplify(self) -> QExpr {
        match self {
            QExpr::Not(e) => match e.simplify() {
                QExpr::Not(inner) => *inner,
                QExpr::Constant(b) => QExpr::Constant(!b),
                other => QExpr::not(other),
            },
            QExpr::And(l, r) => match (l.simplify(), r.simplify()) {
                (QExpr::Constant(false), _) | (_, QExpr::Constant(false)) => QExpr::Constant(false),
                (QExpr::Constant(true), e) | (e, QExpr::Constant(true)) => e,
                (a, b) => QExpr::and(a, b),
            },
            QExpr::Or(l, r) => match (l.simplify(), r.simplify()) {
                (QExpr::Constant(true), _) | (_, QExpr::Constant(true)) => QExpr::Constant(true),
                (QExpr::Constant(false), e) | (e, QExpr::Constant(false)) => e,
                (a, b) => QExpr::or(a, b),
            },
            QExpr::Xor(l, r) => match (l.simplify(), r.simplify()) {
                (QExpr::Constant(a), QExpr::Constant(b)) => QExpr::Constant(a ^ b),
                (QExpr::Constant(false), e) | (e, QExpr::Constant(false)) => e,
                (QExpr::Constant(true), e) | (e, QExpr::Constant(true)) => QExpr::not(e).simplify(),
                (a, b) => QExpr::xor(a, b),
            },
            QExpr::Minus(l, r) => match (l.simplify(), r.simplify()) {
                (QExpr::Constant(false), _) | (_, QExpr::Constant(true)) => QExpr::Constant(false),
                (e, QExpr::Constant(false)) => e,
                (QExpr::Constant(true), e) => QExpr::not(e).simplify(),
                (a, b) => QExpr::minus(a, b),
            },
            QExpr::Range(r) if r.is_void() => QExpr::Constant(false),
            QExpr::DiscreteRange(r) if r.values.is_empty() => QExpr::Constant(false),
            QExpr::Compare(c) => match c.constant_truth() {
                Some(b) => QExpr::Constant(b),
                None => QExpr::Compare(c),
            },
            other => other,
        }
    }

    /// Reorder operands cheapest-first. `weigh` estimates the number of rows a
    /// leaf selects and `total` is the row count. AND evaluates its most
    /// selective operand first; OR evaluates its broadest operand first so
    /// the second scan runs over fewer rows. Returns the node's estimate.
    pub fn reorder(&mut self, total: f64, weigh: &mut dyn FnMut(&QExpr) -> f64) -> f64 {
        match self {
            QExpr::And(l, r) => {
                let wl = l.reorder(total, weigh);
                let wr = r.reorder(total, weigh);
                if wr < wl {
                    std::mem::swap(l, r);
                }
                wl.min(wr)
            }
            QExpr::Or(l, r) => {
                let wl = l.reorder(total, weigh);
                let wr = r.reorder(total, weigh);
                if wr > wl {
                    std::mem::swap(l, r);
                }
                (wl + wr).min(total)
            }
            QExpr::Xor(l, r) => {
                let wl = l.reorder(total, weigh);
                let wr = r.reorder(total, weigh);
                (wl + wr).min(total)
            }
            QExpr::Minus(l, r) => {
                let wl = l.reorder(total, weigh);
                r.reorder(total, weigh);
                wl
            }
            QExpr::Not(e) => (total - e.reorder(total, weigh)).max(0.0),
            leaf => weigh(leaf),
        }
    }
}

fn push_unique(out: &mut Vec<String>, name: &str) {
    if !out.iter().any(|c| c == name) {
        out.push(name.to_string());
    }
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
}

impl fmt::Display for QExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QExpr::And(l, r) => write!(f, "({} AND {})", l, r),
            QExpr::Or(l, r) => write!(f, "({} OR {})", l, r),
            QExpr::Xor(l, r) => write!(f, "({} XOR {})", l, r),
            QExpr::Minus(l, r) => write!(f, "({} MINUS {})", l, r),
            QExpr::Not(e) => write!(f, "NOT {}", e),
            QExpr::Range(r) => match (r.lower, r.upper, r.as_equality()) {
                (_, _, Some(v)) => write!(f, "{} = {}", r.column, v),
                (Some(l), Some(u), None) => write!(
                    f,
                    "{} {} {} {} {}",
                    l.value,
                    if l.inclusive { "<=" } else { "<" },
                    r.column,
                    if u.inclusive { "<=" } else { "<" },
                    u.value
                ),
                (Some(l), None, None) => write!(f, "{} {} {}", r.column, if l.inclusive { ">=" } else { ">" }, l.value),
                (None, Some(u), None) => write!(f, "{} {} {}", r.column, if u.inclusive { "<=" } else { "<" }, u.value),
                (None, None, None) => write!(f, "EXISTS({})", r.column),
            },
            QExpr::DiscreteRange(r) => {
                let vals: Vec<String> = r.values.iter().map(|v| v.to_string()).collect();
                write!(f, "{} IN ({})", r.column, vals.join(", "))
            }
            QExpr::String(s) => write!(f, "{} = {}", s.column, quote(&s.value)),
            QExpr::Like(l) => write!(f, "{} LIKE {}", l.column, quote(&l.pattern)),
            QExpr::Keyword(k) => write!(f, "{} CONTAINS {}", k.column, quote(&k.keyword)),
            QExpr::Exists(c) => write!(f, "EXISTS({})", c),
            QExpr::Compare(c) => write!(f, "{} {} {}", c.left, c.op.symbol(), c.right),
            QExpr::Constant(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            QExpr::Join(j) => write!(f, "{}", j),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(v: f64) -> Numeric {
        Numeric::Float(v)
    }

    #[test]
    fn test_range_membership() {
        let r = ContinuousRange::between("a", 2.0, 5.0);
        assert!(r.contains(n(2.0)) && r.contains(n(5.0)) && !r.contains(n(5.5)));
        assert!(r.contains(Numeric::Int(3)) && !r.contains(Numeric::UInt(6)));
        assert!(r.overlaps(n(4.0), n(9.0)));
        assert!(!r.overlaps(n(5.5), n(9.0)));
        assert!(r.covers(n(2.0), n(4.0)));
        assert!(!r.covers(n(1.0), n(4.0)));
        assert!(!r.contains(n(f64::NAN)));
        let open = ContinuousRange {
            column: "a".into(),
            lower: Some(Bound { value: n(3.0), inclusive: false }),
            upper: Some(Bound { value: n(3.0), inclusive: true }),
        };
        assert!(open.is_void());
    }

    #[test]
    fn test_integer_bounds_are_exact() {
        let base = 1u64 << 53;
        let r = ContinuousRange::equals("u", base + 1);
        assert!(r.contains(Numeric::UInt(base + 1)));
        assert!(!r.contains(Numeric::UInt(base)));
        assert!(!r.contains(Numeric::UInt(base + 2)));

        let r = ContinuousRange::above("u", base, false);
        assert!(r.contains(Numeric::UInt(base + 1)));
        assert!(!r.contains(Numeric::UInt(base)));
        assert!(r.overlaps(Numeric::UInt(base), Numeric::UInt(base + 1)));
        assert!(!r.covers(Numeric::UInt(base), Numeric::UInt(base + 1)));

        let r = ContinuousRange::between("i", i64::MAX - 1, i64::MAX);
        assert!(r.contains(Numeric::Int(i64::MAX)));
        assert!(!r.contains(Numeric::Int(i64::MAX - 2)));
        assert!(!r.contains(Numeric::Int(-1)));

        let d = DiscreteRange::new("u", vec![Numeric::UInt(base + 1), Numeric::UInt(base + 3)]);
        assert!(d.contains(Numeric::UInt(base + 3)));
        assert!(!d.contains(Numeric::UInt(base + 2)));
        assert!(!d.overlaps(Numeric::UInt(base), Numeric::UInt(base)));
    }

    #[test]
    fn test_discrete_range() {
        let d = DiscreteRange::new("a", vec![5.0, 1.0, 5.0, 3.0]);
        assert_eq!(d.values, vec![n(1.0), n(3.0), n(5.0)]);
        assert!(d.contains(n(3.0)) && !d.contains(n(4.0)));
        assert!(d.contains(Numeric::Int(5)));
        assert!(d.overlaps(n(3.5), n(5.0)));
        assert!(!d.overlaps(n(3.5), n(4.5)));
    }

    #[test]
    fn test_like_regex() {
        let l = LikeMatch { column: "s".into(), pattern: "a.c%".into() };
        let re = l.regex().unwrap();
        assert!(re.is_match("a.cdef"));
        assert!(!re.is_match("abcdef"));
        let l = LikeMatch { column: "s".into(), pattern: "_b_".into() };
        assert!(l.regex().unwrap().is_match("abc"));
    }

    #[test]
    fn test_like_wildcards_span_newlines() {
        let l = LikeMatch { column: "s".into(), pattern: "first%last".into() };
        assert!(l.regex().unwrap().is_match("first line\nlast"));
        let l = LikeMatch { column: "s".into(), pattern: "a_b".into() };
        assert!(l.regex().unwrap().is_match("a\nb"));
        assert!(!l.regex().unwrap().is_match("a\n\nb"));
    }

    #[test]
    fn test_simplify() {
        let e = QExpr::not(QExpr::not(QExpr::Range(ContinuousRange::equals("a", 1.0))));
        assert_eq!(e.simplify(), QExpr::Range(ContinuousRange::equals("a", 1.0)));
        let e = QExpr::and(QExpr::Constant(true), QExpr::Exists("a".into()));
        assert_eq!(e.simplify(), QExpr::Exists("a".into()));
        let e = QExpr::Compare(CompareTerm { left: MathTerm::Number(n(1.0)), op: CompareOp::Lt, right: MathTerm::Number(n(2.0)) });
        assert_eq!(e.simplify(), QExpr::Constant(true));
    }

    #[test]
    fn test_reorder_and_puts_selective_first() {
        let mut e = QExpr::and(
            QExpr::Range(ContinuousRange::above("big", 0.0, true)),
            QExpr::Range(ContinuousRange::equals("small", 1.0)),
        );
        let w = e.reorder(100.0, &mut |leaf| match leaf {
            QExpr::Range(r) if r.column == "small" => 1.0,
            _ => 90.0,
        });
        assert_eq!(w, 1.0);
        match &e {
            QExpr::And(l, _) => assert_eq!(l.columns(), vec!["small".to_string()]),
            _ => panic!("expected AND"),
        }
    }

    #[test]
    fn test_join_terms_and_kind() {
        let e = QExpr::and(
            QExpr::Join(JoinTerm::new("a", "b", None)),
            QExpr::and(
                QExpr::Range(ContinuousRange::below("a", 3.0, false)),
                QExpr::Join(JoinTerm::new("a", "c", Some(MathTerm::Number(n(2.0))))),
            ),
        );
        let joins = e.join_terms();
        assert_eq!(joins.len(), 2);
        assert_eq!(joins[0].kind(), JoinKind::Equality);
        assert_eq!(joins[1].kind(), JoinKind::Band(2.0));
        assert_eq!(e.conjunctive_ranges().len(), 1);
        assert!(e.has_join());
    }
}
