//! WHERE and SELECT clause parser
//!
//! Recursive descent over a token stream. Precedence from loosest to
//! tightest: OR, XOR, AND/MINUS, NOT, predicate. Arithmetic inside a
//! predicate follows the usual `+ -`, `* / %`, `^` ordering.

use super::{
    CompareOp, CompareTerm, ContinuousRange, Bound, DiscreteRange, JoinTerm, KeywordMatch, LikeMatch,
    MathFunc, MathOp, MathTerm, QExpr, SelectClause, SelectTerm, StringMatch,
};
use crate::dataset::Numeric;
use crate::{QueryError, Result};

/// Parse a WHERE clause into a predicate tree
pub fn parse_where(text: &str) -> Result<QExpr> {
    let mut parser = Parser::new(text)?;
    let expr = parser.parse_or_expr()?;
    parser.expect_end()?;
    Ok(expr)
}

/// Parse a comma separated select list; each term may carry `AS alias`
pub fn parse_select(text: &str) -> Result<SelectClause> {
    let mut parser = Parser::new(text).map_err(as_select_error)?;
    let mut terms = Vec::new();
    loop {
        let expr = parser.parse_math().map_err(as_select_error)?;
        let alias = if matches!(parser.current(), Token::As) {
            parser.advance();
            match parser.advance().clone() {
                Token::Identifier(name) => Some(name),
                other => return Err(QueryError::InvalidSelect(format!("Expected alias, got {:?}", other))),
            }
        } else {
            None
        };
        terms.push(SelectTerm { expr, alias });
        if matches!(parser.current(), Token::Comma) {
            parser.advance();
            continue;
        }
        break;
    }
    parser.expect_end().map_err(as_select_error)?;
    Ok(SelectClause::new(terms))
}

/// Parse a standalone arithmetic expression
pub fn parse_math(text: &str) -> Result<MathTerm> {
    let mut parser = Parser::new(text)?;
    let term = parser.parse_math()?;
    parser.expect_end()?;
    Ok(term)
}

fn as_select_error(e: QueryError) -> QueryError {
    match e {
        QueryError::Parse(msg) => QueryError::InvalidSelect(msg),
        other => other,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    // Keywords
    And, Or, Xor, Not, Minus,
    Between, In, Like, Contains, Exists, Join, As,
    True, False,
    // Symbols
    Comma,          // ,
    LParen,         // (
    RParen,         // )
    Eq,             // = or ==
    NotEq,          // != or <>
    Lt,             // <
    Le,             // <=
    Gt,             // >
    Ge,             // >=
    Plus,           // +
    Dash,           // -
    Star,           // *
    Slash,          // /
    Percent,        // %
    Caret,          // ^
    // Literals
    Identifier(String),
    StringLit(String),
    Number(Numeric),
    // End
    Eof,
}

impl Token {
    fn compare_op(&self) -> Option<CompareOp> {
        match self {
            Token::Eq => Some(CompareOp::Eq),
            Token::NotEq => Some(CompareOp::Ne),
            Token::Lt => Some(CompareOp::Lt),
            Token::Le => Some(CompareOp::Le),
            Token::Gt => Some(CompareOp::Gt),
            Token::Ge => Some(CompareOp::Ge),
            _ => None,
        }
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(text: &str) -> Result<Self> {
        Ok(Self { tokens: tokenize(text)?, pos: 0 })
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> &Token {
        let tok = &self.tokens[self.pos];
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        if std::mem::discriminant(self.current()) == std::mem::discriminant(&expected) {
            self.advance();
            Ok(())
        } else {
            Err(QueryError::Parse(format!("Expected {:?}, got {:?}", expected, self.current())))
        }
    }

    fn expect_end(&self) -> Result<()> {
        match self.current() {
            Token::Eof => Ok(()),
            other => Err(QueryError::Parse(format!("Unexpected trailing token: {:?}", other))),
        }
    }

    fn expect_identifier(&mut self) -> Result<String> {
        match self.advance().clone() {
            Token::Identifier(name) => Ok(name),
            other => Err(QueryError::Parse(format!("Expected column name, got {:?}", other))),
        }
    }

    fn expect_string(&mut self) -> Result<String> {
        match self.advance().clone() {
            Token::StringLit(s) => Ok(s),
            other => Err(QueryError::Parse(format!("Expected string literal, got {:?}", other))),
        }
    }

    // ========================================================================
    // Boolean structure
    // ========================================================================

    fn parse_or_expr(&mut self) -> Result<QExpr> {
        let mut left = self.parse_xor_expr()?;
        while matches!(self.current(), Token::Or) {
            self.advance();
            let right = self.parse_xor_expr()?;
            left = QExpr::or(left, right);
        }
        Ok(left)
    }

    fn parse_xor_expr(&mut self) -> Result<QExpr> {
        let mut left = self.parse_and_expr()?;
        while matches!(self.current(), Token::Xor) {
            self.advance();
            let right = self.parse_and_expr()?;
            left = QExpr::xor(left, right);
        }
        Ok(left)
    }

    fn parse_and_expr(&mut self) -> Result<QExpr> {
        let mut left = self.parse_not_expr()?;
        loop {
            match self.current() {
                Token::And => {
                    self.advance();
                    let right = self.parse_not_expr()?;
                    left = QExpr::and(left, right);
                }
                Token::Minus => {
                    self.advance();
                    let right = self.parse_not_expr()?;
                    left = QExpr::minus(left, right);
                }
                _ => return Ok(left),
            }
        }
    }

    fn parse_not_expr(&mut self) -> Result<QExpr> {
        if matches!(self.current(), Token::Not) {
            self.advance();
            let expr = self.parse_not_expr()?;
            Ok(QExpr::not(expr))
        } else {
            self.parse_predicate()
        }
    }

    fn parse_predicate(&mut self) -> Result<QExpr> {
        match self.current().clone() {
            Token::True => {
                self.advance();
                Ok(QExpr::Constant(true))
            }
            Token::False => {
                self.advance();
                Ok(QExpr::Constant(false))
            }
            Token::Exists => {
                self.advance();
                self.expect(Token::LParen)?;
                let column = self.expect_identifier()?;
                self.expect(Token::RParen)?;
                Ok(QExpr::Exists(column))
            }
            Token::Join => {
                self.advance();
                self.expect(Token::LParen)?;
                let left = self.expect_identifier()?;
                self.expect(Token::Comma)?;
                let right = self.expect_identifier()?;
                let tolerance = if matches!(self.current(), Token::Comma) {
                    self.advance();
                    Some(self.parse_math()?)
                } else {
                    None
                };
                self.expect(Token::RParen)?;
                Ok(QExpr::Join(JoinTerm { left, right, tolerance }))
            }
            Token::LParen => {
                // A parenthesised group is boolean unless it only parses as arithmetic
                let saved = self.pos;
                self.advance();
                if let Ok(expr) = self.parse_or_expr() {
                    if matches!(self.current(), Token::RParen) {
                        self.advance();
                        return Ok(expr);
                    }
                }
                self.pos = saved;
                self.parse_comparison()
            }
            _ => self.parse_comparison(),
        }
    }

    fn parse_comparison(&mut self) -> Result<QExpr> {
        let left = self.parse_math()?;
        match self.current().clone() {
            Token::Between => {
                self.advance();
                let column = column_of(&left)?;
                let low = self.parse_constant()?;
                self.expect(Token::And)?;
                let high = self.parse_constant()?;
                Ok(QExpr::Range(ContinuousRange::between(&column, low, high)))
            }
            Token::In => {
                self.advance();
                let column = column_of(&left)?;
                self.parse_in_list(&column)
            }
            Token::Like => {
                self.advance();
                let column = column_of(&left)?;
                let pattern = self.expect_string()?;
                Ok(QExpr::Like(LikeMatch { column, pattern }))
            }
            Token::Contains => {
                self.advance();
                let column = column_of(&left)?;
                let keyword = self.expect_string()?;
                Ok(QExpr::Keyword(KeywordMatch { column, keyword }))
            }
            tok => {
                let op = tok
                    .compare_op()
                    .ok_or_else(|| QueryError::Parse(format!("Expected comparison operator, got {:?}", tok)))?;
                self.advance();
                if let Token::StringLit(value) = self.current().clone() {
                    self.advance();
                    let column = column_of(&left)?;
                    let m = QExpr::String(StringMatch { column, value });
                    return match op {
                        CompareOp::Eq => Ok(m),
                        CompareOp::Ne => Ok(QExpr::not(m)),
                        _ => Err(QueryError::Parse("Strings only support = and !=".to_string())),
                    };
                }
                let middle = self.parse_math()?;
                if let Some(op2) = self.current().compare_op() {
                    self.advance();
                    let right = self.parse_math()?;
                    return Ok(double_sided(left, op, middle, op2, right));
                }
                Ok(single_sided(left, op, middle))
            }
        }
    }

    fn parse_in_list(&mut self, column: &str) -> Result<QExpr> {
        self.expect(Token::LParen)?;
        let mut numbers = Vec::new();
        let mut strings = Vec::new();
        loop {
            if let Token::StringLit(s) = self.current().clone() {
                self.advance();
                strings.push(s);
            } else {
                numbers.push(self.parse_constant()?);
            }
            if matches!(self.current(), Token::Comma) {
                self.advance();
                continue;
            }
            break;
        }
        self.expect(Token::RParen)?;
        match (numbers.is_empty(), strings.is_empty()) {
            (false, true) => Ok(QExpr::DiscreteRange(DiscreteRange::new(column, numbers))),
            (true, false) => {
                let mut iter = strings.into_iter().map(|value| QExpr::String(StringMatch { column: column.to_string(), value }));
                let first = iter.next().ok_or_else(|| QueryError::Parse("Empty IN list".to_string()))?;
                Ok(iter.fold(first, QExpr::or))
            }
            _ => Err(QueryError::Parse("IN list mixes numbers and strings".to_string())),
        }
    }

    fn parse_constant(&mut self) -> Result<Numeric> {
        let term = self.parse_math()?;
        term.constant_numeric()
            .ok_or_else(|| QueryError::Parse(format!("Expected a constant, got {}", term)))
    }

    // ========================================================================
    // Arithmetic
    // ========================================================================

    fn parse_math(&mut self) -> Result<MathTerm> {
        let mut left = self.parse_product()?;
        loop {
            let op = match self.current() {
                Token::Plus => MathOp::Add,
                Token::Dash => MathOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_product()?;
            left = MathTerm::Binary { op, left: Box::new(left), right: Box::new(right) };
        }
    }

    fn parse_product(&mut self) -> Result<MathTerm> {
        let mut left = self.parse_power()?;
        loop {
            let op = match self.current() {
                Token::Star => MathOp::Mul,
                Token::Slash => MathOp::Div,
                Token::Percent => MathOp::Rem,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_power()?;
            left = MathTerm::Binary { op, left: Box::new(left), right: Box::new(right) };
        }
    }

    fn parse_power(&mut self) -> Result<MathTerm> {
        let base = self.parse_unary()?;
        if matches!(self.current(), Token::Caret) {
            self.advance();
            let exp = self.parse_power()?;
            return Ok(MathTerm::Binary { op: MathOp::Pow, left: Box::new(base), right: Box::new(exp) });
        }
        Ok(base)
    }

    fn parse_unary(&mut self) -> Result<MathTerm> {
        match self.current() {
            Token::Dash => {
                self.advance();
                let inner = self.parse_unary()?;
                Ok(match inner {
                    MathTerm::Number(v) => MathTerm::Number(v.negate()),
                    other => MathTerm::Negate(Box::new(other)),
                })
            }
            Token::Plus => {
                self.advance();
                self.parse_unary()
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<MathTerm> {
        match self.current().clone() {
            Token::Number(v) => {
                self.advance();
                Ok(MathTerm::Number(v))
            }
            Token::Identifier(name) => {
                self.advance();
                if matches!(self.current(), Token::LParen) {
                    let func = MathFunc::from_name(&name)
                        .ok_or_else(|| QueryError::Parse(format!("Unknown function: {}", name)))?;
                    self.advance();
                    let arg = self.parse_math()?;
                    self.expect(Token::RParen)?;
                    return Ok(MathTerm::Function { func, arg: Box::new(arg) });
                }
                Ok(MathTerm::Column(name))
            }
            Token::LParen => {
                self.advance();
                let term = self.parse_math()?;
                self.expect(Token::RParen)?;
                Ok(term)
            }
            other => Err(QueryError::Parse(format!("Unexpected token in expression: {:?}", other))),
        }
    }
}

fn column_of(term: &MathTerm) -> Result<String> {
    term.as_column()
        .map(str::to_string)
        .ok_or_else(|| QueryError::Parse(format!("Expected a column name, got {}", term)))
}

/// `left op right` with one side a bare column and the other a constant
/// becomes a range; anything else stays an arithmetic comparison
fn single_sided(left: MathTerm, op: CompareOp, right: MathTerm) -> QExpr {
    let (column, op, value) = match (left.as_column(), right.constant_numeric(), right.as_column(), left.constant_numeric()) {
        (Some(c), Some(v), _, _) => (c.to_string(), op, v),
        (_, _, Some(c), Some(v)) => (c.to_string(), op.flip(), v),
        _ => return QExpr::Compare(CompareTerm { left, op, right }),
    };
    match op {
        CompareOp::Eq => QExpr::Range(ContinuousRange::equals(&column, value)),
        CompareOp::Ne => QExpr::not(QExpr::Range(ContinuousRange::equals(&column, value))),
        CompareOp::Lt => QExpr::Range(ContinuousRange::below(&column, value, false)),
        CompareOp::Le => QExpr::Range(ContinuousRange::below(&column, value, true)),
        CompareOp::Gt => QExpr::Range(ContinuousRange::above(&column, value, false)),
        CompareOp::Ge => QExpr::Range(ContinuousRange::above(&column, value, true)),
    }
}

/// `lo < col <= hi` and its mirrored forms
fn double_sided(left: MathTerm, op1: CompareOp, middle: MathTerm, op2: CompareOp, right: MathTerm) -> QExpr {
    let ascending = matches!(op1, CompareOp::Lt | CompareOp::Le) && matches!(op2, CompareOp::Lt | CompareOp::Le);
    let descending = matches!(op1, CompareOp::Gt | CompareOp::Ge) && matches!(op2, CompareOp::Gt | CompareOp::Ge);
    if let (Some(column), Some(a), Some(b)) = (middle.as_column(), left.constant_numeric(), right.constant_numeric()) {
        if ascending || descending {
            let (low, low_incl, high, high_incl) = if ascending {
                (a, op1 == CompareOp::Le, b, op2 == CompareOp::Le)
            } else {
                (b, op2 == CompareOp::Ge, a, op1 == CompareOp::Ge)
            };
            return QExpr::Range(ContinuousRange {
                column: column.to_string(),
                lower: Some(Bound { value: low, inclusive: low_incl }),
                upper: Some(Bound { value: high, inclusive: high_incl }),
            });
        }
    }
    QExpr::and(single_sided(left, op1, middle.clone()), single_sided(middle, op2, right))
}

/// Integer literals stay exact; anything with a fraction, an exponent or
/// beyond `u64` becomes a float
fn parse_number(text: &str) -> Result<Numeric> {
    if text.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(v) = text.parse::<u64>() {
            return Ok(match i64::try_from(v) {
                Ok(i) => Numeric::Int(i),
                Err(_) => Numeric::UInt(v),
            });
        }
    }
    text.parse::<f64>()
        .map(Numeric::Float)
        .map_err(|_| QueryError::Parse(format!("Invalid number: {}", text)))
}

fn tokenize(text: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let mut i = 0;

    while i < len {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        match c {
            ',' => { tokens.push(Token::Comma); i += 1; continue; }
            '(' => { tokens.push(Token::LParen); i += 1; continue; }
            ')' => { tokens.push(Token::RParen); i += 1; continue; }
            '+' => { tokens.push(Token::Plus); i += 1; continue; }
            '-' => { tokens.push(Token::Dash); i += 1; continue; }
            '*' => { tokens.push(Token::Star); i += 1; continue; }
            '/' => { tokens.push(Token::Slash); i += 1; continue; }
            '%' => { tokens.push(Token::Percent); i += 1; continue; }
            '^' => { tokens.push(Token::Caret); i += 1; continue; }
            _ => {}
        }

        if c == '=' {
            tokens.push(Token::Eq);
            i += if i + 1 < len && chars[i + 1] == '=' { 2 } else { 1 };
            continue;
        }
        if c == '!' && i + 1 < len && chars[i + 1] == '=' {
            tokens.push(Token::NotEq);
            i += 2;
            continue;
        }
        if c == '<' {
            if i + 1 < len && chars[i + 1] == '=' {
                tokens.push(Token::Le);
                i += 2;
            } else if i + 1 < len && chars[i + 1] == '>' {
                tokens.push(Token::NotEq);
                i += 2;
            } else {
                tokens.push(Token::Lt);
                i += 1;
            }
            continue;
        }
        if c == '>' {
            if i + 1 < len && chars[i + 1] == '=' {
                tokens.push(Token::Ge);
                i += 2;
            } else {
                tokens.push(Token::Gt);
                i += 1;
            }
            continue;
        }

        // String literals, backslash escapes the next character
        if c == '\'' || c == '"' {
            let quote = c;
            i += 1;
            let mut s = String::new();
            let mut closed = false;
            while i < len {
                if chars[i] == '\\' && i + 1 < len {
                    s.push(chars[i + 1]);
                    i += 2;
                } else if chars[i] == quote {
                    closed = true;
                    i += 1;
                    break;
                } else {
                    s.push(chars[i]);
                    i += 1;
                }
            }
            if !closed {
                return Err(QueryError::Parse("Unterminated string literal".to_string()));
            }
            tokens.push(Token::StringLit(s));
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && i + 1 < len && chars[i + 1].is_ascii_digit()) {
            let start = i;
            i += 1;
            while i < len && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            // exponent
            if i < len && (chars[i] == 'e' || chars[i] == 'E') {
                let mut j = i + 1;
                if j < len && (chars[j] == '+' || chars[j] == '-') {
                    j += 1;
                }
                if j < len && chars[j].is_ascii_digit() {
                    i = j;
                    while i < len && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let num_str: String = chars[start..i].iter().collect();
            tokens.push(Token::Number(parse_number(&num_str)?));
            continue;
        }

        // Identifiers may be qualified, e.g. `t.col`
        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < len && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            let token = match word.to_uppercase().as_str() {
                "AND" => Token::And,
                "OR" => Token::Or,
                "XOR" => Token::Xor,
                "NOT" => Token::Not,
                "MINUS" => Token::Minus,
                "BETWEEN" => Token::Between,
                "IN" => Token::In,
                "LIKE" => Token::Like,
                "CONTAINS" => Token::Contains,
                "EXISTS" => Token::Exists,
                "JOIN" => Token::Join,
                "AS" => Token::As,
                "TRUE" => Token::True,
                "FALSE" => Token::False,
                _ => Token::Identifier(word),
            };
            tokens.push(token);
            continue;
        }

        return Err(QueryError::Parse(format!("Unexpected character: {}", c)));
    }

    tokens.push(Token::Eof);
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_range() {
        let e = parse_where("a = 5").unwrap();
        assert_eq!(e, QExpr::Range(ContinuousRange::equals("a", 5.0)));
        let e = parse_where("3 < a").unwrap();
        assert_eq!(e, QExpr::Range(ContinuousRange::above("a", 3.0, false)));
    }

    #[test]
    fn test_between_and_double_sided() {
        let e = parse_where("a between 2 and 5").unwrap();
        assert_eq!(e, QExpr::Range(ContinuousRange::between("a", 2.0, 5.0)));
        let e = parse_where("2 <= a < 5").unwrap();
        match e {
            QExpr::Range(r) => {
                assert!(r.contains(Numeric::Int(2)) && !r.contains(Numeric::Int(5)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_integer_literals_stay_exact() {
        match parse_where("u = 9007199254740993").unwrap() {
            QExpr::Range(r) => assert!(matches!(r.as_equality(), Some(Numeric::Int(9007199254740993)))),
            other => panic!("unexpected {:?}", other),
        }
        match parse_where("u >= 18446744073709551615").unwrap() {
            QExpr::Range(r) => assert!(matches!(r.lower.map(|b| b.value), Some(Numeric::UInt(u64::MAX)))),
            other => panic!("unexpected {:?}", other),
        }
        match parse_where("a IN (-9223372036854775808, 2.5)").unwrap() {
            QExpr::DiscreteRange(d) => {
                assert!(matches!(d.values[0], Numeric::Int(i64::MIN)));
                assert!(matches!(d.values[1], Numeric::Float(_)));
            }
            other => panic!("unexpected {:?}", other),
        }
        let e = parse_where("u < 9007199254740993").unwrap();
        assert_eq!(e.to_string(), "u < 9007199254740993");
        assert_eq!(parse_where("a > 1.0").unwrap().to_string(), "a > 1.0");
    }

    #[test]
    fn test_precedence() {
        let e = parse_where("a = 1 OR b = 2 AND NOT c = 3").unwrap();
        match e {
            QExpr::Or(_, r) => assert!(matches!(*r, QExpr::And(_, _))),
            other => panic!("unexpected {:?}", other),
        }
        let e = parse_where("a = 1 XOR b = 2 MINUS c = 3").unwrap();
        match e {
            QExpr::Xor(_, r) => assert!(matches!(*r, QExpr::Minus(_, _))),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parenthesised_arithmetic() {
        let e = parse_where("(a + b) * 2 > 10").unwrap();
        assert!(matches!(e, QExpr::Compare(_)));
        let e = parse_where("(a > 1 OR b < 2) AND c = 1").unwrap();
        assert!(matches!(e, QExpr::And(_, _)));
    }

    #[test]
    fn test_text_predicates() {
        assert!(matches!(parse_where("s = 'x\\'y'").unwrap(), QExpr::String(ref m) if m.value == "x'y"));
        assert!(matches!(parse_where("s LIKE 'ab%'").unwrap(), QExpr::Like(_)));
        assert!(matches!(parse_where("s CONTAINS 'red'").unwrap(), QExpr::Keyword(_)));
        assert!(matches!(parse_where("s IN ('a', 'b')").unwrap(), QExpr::Or(_, _)));
        assert!(matches!(parse_where("a IN (3, 1, 2)").unwrap(), QExpr::DiscreteRange(ref d) if d.values.len() == 3));
    }

    #[test]
    fn test_join_and_exists() {
        let e = parse_where("JOIN(a, b, 1) AND EXISTS(c)").unwrap();
        assert_eq!(e.join_terms(), vec![JoinTerm::new("a", "b", Some(MathTerm::Number(Numeric::Int(1))))]);
    }

    #[test]
    fn test_display_round_trips() {
        for text in [
            "a = 5",
            "(a >= 2 AND NOT b < 3)",
            "s LIKE 'x%'",
            "JOIN(a, b, (c * 2))",
            "((a + 1) > b MINUS 1 <= c < 4)",
        ] {
            let e = parse_where(text).unwrap();
            assert_eq!(parse_where(&e.to_string()).unwrap(), e, "{}", text);
        }
    }

    #[test]
    fn test_select_list() {
        let s = parse_select("a, b + 1 AS bp, sqrt(c)").unwrap();
        assert_eq!(s.terms.len(), 3);
        assert_eq!(s.terms[1].alias.as_deref(), Some("bp"));
        assert!(matches!(parse_select("a,"), Err(QueryError::InvalidSelect(_))));
    }

    #[test]
    fn test_errors() {
        assert!(matches!(parse_where("a ="), Err(QueryError::Parse(_))));
        assert!(matches!(parse_where("a = 'x"), Err(QueryError::Parse(_))));
        assert!(matches!(parse_where("a # 1"), Err(QueryError::Parse(_))));
    }
}
