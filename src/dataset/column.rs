//! Typed column storage and value promotion rules

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bitvector::Bitvector;
use crate::{QueryError, Result};

use super::index::BitmapIndex;

// ============================================================================
// Column types
// ============================================================================

/// Physical type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Byte,
    UByte,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    Float,
    Double,
    Text,
}

/// Numeric family used for comparison promotion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumKind {
    Signed,
    Unsigned,
    Float,
}

impl ColumnType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "byte" | "i8" => Some(ColumnType::Byte),
            "ubyte" | "u8" => Some(ColumnType::UByte),
            "short" | "i16" => Some(ColumnType::Short),
            "ushort" | "u16" => Some(ColumnType::UShort),
            "int" | "i32" => Some(ColumnType::Int),
            "uint" | "u32" => Some(ColumnType::UInt),
            "long" | "i64" => Some(ColumnType::Long),
            "ulong" | "u64" => Some(ColumnType::ULong),
            "float" | "f32" => Some(ColumnType::Float),
            "double" | "f64" => Some(ColumnType::Double),
            "text" | "string" => Some(ColumnType::Text),
            _ => None,
        }
    }

    /// Numeric family, `None` for text
    pub fn kind(self) -> Option<NumKind> {
        match self {
            ColumnType::Byte | ColumnType::Short | ColumnType::Int | ColumnType::Long => Some(NumKind::Signed),
            ColumnType::UByte | ColumnType::UShort | ColumnType::UInt | ColumnType::ULong => Some(NumKind::Unsigned),
            ColumnType::Float | ColumnType::Double => Some(NumKind::Float),
            ColumnType::Text => None,
        }
    }

    /// Bytes per value (text counts as a pointer-sized handle)
    pub fn width(self) -> u64 {
        match self {
            ColumnType::Byte | ColumnType::UByte => 1,
            ColumnType::Short | ColumnType::UShort => 2,
            ColumnType::Int | ColumnType::UInt | ColumnType::Float => 4,
            ColumnType::Long | ColumnType::ULong | ColumnType::Double | ColumnType::Text => 8,
        }
    }

    /// Integers of at most 32 bits; every value fits an `i64` losslessly
    pub fn is_small_integer(self) -> bool {
        matches!(self.kind(), Some(NumKind::Signed) | Some(NumKind::Unsigned)) && self.width() <= 4
    }

    pub fn is_numeric(self) -> bool {
        self.kind().is_some()
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Byte => "byte",
            ColumnType::UByte => "ubyte",
            ColumnType::Short => "short",
            ColumnType::UShort => "ushort",
            ColumnType::Int => "int",
            ColumnType::UInt => "uint",
            ColumnType::Long => "long",
            ColumnType::ULong => "ulong",
            ColumnType::Float => "float",
            ColumnType::Double => "double",
            ColumnType::Text => "text",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Numeric promotion
// ============================================================================

/// A numeric cell widened to its family's 64-bit representative
///
/// Equality is numeric: `Int(5) == Float(5.0)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum Numeric {
    Int(i64),
    UInt(u64),
    Float(f64),
}

impl Numeric {
    #[inline]
    pub fn as_f64(self) -> f64 {
        match self {
            Numeric::Int(v) => v as f64,
            Numeric::UInt(v) => v as f64,
            Numeric::Float(v) => v,
        }
    }

    /// Compare across families. Signed against unsigned never sign-extends:
    /// a negative value sorts below every unsigned value. Any float operand
    /// promotes both sides to `f64`. `None` only when a NaN is involved.
    #[inline]
    pub fn compare(self, other: Numeric) -> Option<Ordering> {
        match (self, other) {
            (Numeric::Int(a), Numeric::Int(b)) => Some(a.cmp(&b)),
            (Numeric::UInt(a), Numeric::UInt(b)) => Some(a.cmp(&b)),
            (Numeric::Int(a), Numeric::UInt(b)) => Some(if a < 0 { Ordering::Less } else { (a as u64).cmp(&b) }),
            (Numeric::UInt(a), Numeric::Int(b)) => Some(if b < 0 { Ordering::Greater } else { a.cmp(&(b as u64)) }),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }

    /// Whether `|self - other| <= delta`; integer pairs are subtracted exactly
    #[inline]
    pub fn within(self, other: Numeric, delta: f64) -> bool {
        match (self.as_i128(), other.as_i128()) {
            (Some(a), Some(b)) => ((a - b).unsigned_abs() as f64) <= delta,
            _ => (self.as_f64() - other.as_f64()).abs() <= delta,
        }
    }

    #[inline]
    pub fn equals(self, other: Numeric) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }

    /// [`compare`](Self::compare) with NaN ordered by `f64::total_cmp`
    #[inline]
    pub fn total_cmp(self, other: Numeric) -> Ordering {
        self.compare(other)
            .unwrap_or_else(|| self.as_f64().total_cmp(&other.as_f64()))
    }

    /// Negation that stays exact where the result fits an integer family
    pub fn negate(self) -> Numeric {
        match self {
            Numeric::Int(v) => v.checked_neg().map_or(Numeric::UInt(1 << 63), Numeric::Int),
            Numeric::UInt(v) if v <= 1 << 63 => Numeric::Int((v as i64).wrapping_neg()),
            Numeric::UInt(v) => Numeric::Float(-(v as f64)),
            Numeric::Float(v) => Numeric::Float(-v),
        }
    }

    #[inline]
    fn as_i128(self) -> Option<i128> {
        match self {
            Numeric::Int(v) => Some(v as i128),
            Numeric::UInt(v) => Some(v as i128),
            Numeric::Float(_) => None,
        }
    }

    pub fn is_nan(self) -> bool {
        matches!(self, Numeric::Float(v) if v.is_nan())
    }
}

impl PartialEq for Numeric {
    fn eq(&self, other: &Self) -> bool {
        self.equals(*other)
    }
}

impl From<i64> for Numeric {
    fn from(v: i64) -> Self {
        Numeric::Int(v)
    }
}

impl From<u64> for Numeric {
    fn from(v: u64) -> Self {
        Numeric::UInt(v)
    }
}

impl From<f64> for Numeric {
    fn from(v: f64) -> Self {
        Numeric::Float(v)
    }
}

/// Floats keep a decimal point or exponent so the text parses back as a float
impl fmt::Display for Numeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Numeric::Int(v) => write!(f, "{}", v),
            Numeric::UInt(v) => write!(f, "{}", v),
            Numeric::Float(v) => write!(f, "{:?}", v),
        }
    }
}

// ============================================================================
// Cell values
// ============================================================================

/// A single cell as returned by select-clause materialization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn numeric(&self) -> Option<Numeric> {
        match self {
            Value::Int(v) => Some(Numeric::Int(*v)),
            Value::UInt(v) => Some(Numeric::UInt(*v)),
            Value::Float(v) => Some(Numeric::Float(*v)),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Int(_) | Value::UInt(_) | Value::Float(_) => 1,
            Value::Text(_) => 2,
        }
    }
}

impl From<Numeric> for Value {
    fn from(n: Numeric) -> Self {
        match n {
            Numeric::Int(v) => Value::Int(v),
            Numeric::UInt(v) => Value::UInt(v),
            Numeric::Float(v) => Value::Float(v),
        }
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (a, b) => match (a.numeric(), b.numeric()) {
                (Some(x), Some(y)) => x.total_cmp(y),
                _ => a.rank().cmp(&b.rank()),
            },
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Int(v) => write!(f, "{}", v),
            Value::UInt(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => f.write_str(s),
        }
    }
}

// ============================================================================
// Column data
// ============================================================================

/// Values of one column, one vector variant per physical type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnData {
    Byte(Vec<i8>),
    UByte(Vec<u8>),
    Short(Vec<i16>),
    UShort(Vec<u16>),
    Int(Vec<i32>),
    UInt(Vec<u32>),
    Long(Vec<i64>),
    ULong(Vec<u64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Text(Vec<String>),
}

macro_rules! each_variant {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            ColumnData::Byte($v) => $body,
            ColumnData::UByte($v) => $body,
            ColumnData::Short($v) => $body,
            ColumnData::UShort($v) => $body,
            ColumnData::Int($v) => $body,
            ColumnData::UInt($v) => $body,
            ColumnData::Long($v) => $body,
            ColumnData::ULong($v) => $body,
            ColumnData::Float($v) => $body,
            ColumnData::Double($v) => $body,
            ColumnData::Text($v) => $body,
        }
    };
}

impl ColumnData {
    /// Empty column of the given type
    pub fn new(ty: ColumnType) -> Self {
        match ty {
            ColumnType::Byte => ColumnData::Byte(Vec::new()),
            ColumnType::UByte => ColumnData::UByte(Vec::new()),
            ColumnType::Short => ColumnData::Short(Vec::new()),
            ColumnType::UShort => ColumnData::UShort(Vec::new()),
            ColumnType::Int => ColumnData::Int(Vec::new()),
            ColumnType::UInt => ColumnData::UInt(Vec::new()),
            ColumnType::Long => ColumnData::Long(Vec::new()),
            ColumnType::ULong => ColumnData::ULong(Vec::new()),
            ColumnType::Float => ColumnData::Float(Vec::new()),
            ColumnType::Double => ColumnData::Double(Vec::new()),
            ColumnType::Text => ColumnData::Text(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        each_variant!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            ColumnData::Byte(_) => ColumnType::Byte,
            ColumnData::UByte(_) => ColumnType::UByte,
            ColumnData::Short(_) => ColumnType::Short,
            ColumnData::UShort(_) => ColumnType::UShort,
            ColumnData::Int(_) => ColumnType::Int,
            ColumnData::UInt(_) => ColumnType::UInt,
            ColumnData::Long(_) => ColumnType::Long,
            ColumnData::ULong(_) => ColumnType::ULong,
            ColumnData::Float(_) => ColumnType::Float,
            ColumnData::Double(_) => ColumnType::Double,
            ColumnData::Text(_) => ColumnType::Text,
        }
    }

    /// Numeric value of `row`; `None` for text columns
    #[inline]
    pub fn numeric(&self, row: usize) -> Option<Numeric> {
        Some(match self {
            ColumnData::Byte(v) => Numeric::Int(v[row] as i64),
            ColumnData::UByte(v) => Numeric::UInt(v[row] as u64),
            ColumnData::Short(v) => Numeric::Int(v[row] as i64),
            ColumnData::UShort(v) => Numeric::UInt(v[row] as u64),
            ColumnData::Int(v) => Numeric::Int(v[row] as i64),
            ColumnData::UInt(v) => Numeric::UInt(v[row] as u64),
            ColumnData::Long(v) => Numeric::Int(v[row]),
            ColumnData::ULong(v) => Numeric::UInt(v[row]),
            ColumnData::Float(v) => Numeric::Float(v[row] as f64),
            ColumnData::Double(v) => Numeric::Float(v[row]),
            ColumnData::Text(_) => return None,
        })
    }

    /// Value of `row` as `f64`; `None` for text columns
    #[inline]
    pub fn as_f64(&self, row: usize) -> Option<f64> {
        self.numeric(row).map(Numeric::as_f64)
    }

    /// Value of `row` as `i64` for small integer columns
    #[inline]
    pub fn small_int(&self, row: usize) -> Option<i64> {
        match self {
            ColumnData::Byte(v) => Some(v[row] as i64),
            ColumnData::UByte(v) => Some(v[row] as i64),
            ColumnData::Short(v) => Some(v[row] as i64),
            ColumnData::UShort(v) => Some(v[row] as i64),
            ColumnData::Int(v) => Some(v[row] as i64),
            ColumnData::UInt(v) => Some(v[row] as i64),
            _ => None,
        }
    }

    #[inline]
    pub fn text(&self, row: usize) -> Option<&str> {
        match self {
            ColumnData::Text(v) => Some(v[row].as_str()),
            _ => None,
        }
    }

    pub fn value(&self, row: usize) -> Value {
        match self {
            ColumnData::Text(v) => Value::Text(v[row].clone()),
            other => other.numeric(row).map(Value::from).unwrap_or(Value::Null),
        }
    }

    /// Append a default value (used as the placeholder of a null cell)
    pub fn push_default(&mut self) {
        each_variant!(self, v => v.push(Default::default()))
    }

    /// Parse and append one textual cell
    pub fn push_parsed(&mut self, token: &str) -> Result<()> {
        fn parse<T: std::str::FromStr>(token: &str, ty: ColumnType) -> Result<T> {
            token
                .parse()
                .map_err(|_| QueryError::Parse(format!("'{}' is not a valid {} value", token, ty)))
        }
        let ty = self.column_type();
        match self {
            ColumnData::Byte(v) => v.push(parse(token, ty)?),
            ColumnData::UByte(v) => v.push(parse(token, ty)?),
            ColumnData::Short(v) => v.push(parse(token, ty)?),
            ColumnData::UShort(v) => v.push(parse(token, ty)?),
            ColumnData::Int(v) => v.push(parse(token, ty)?),
            ColumnData::UInt(v) => v.push(parse(token, ty)?),
            ColumnData::Long(v) => v.push(parse(token, ty)?),
            ColumnData::ULong(v) => v.push(parse(token, ty)?),
            ColumnData::Float(v) => v.push(parse(token, ty)?),
            ColumnData::Double(v) => v.push(parse(token, ty)?),
            ColumnData::Text(v) => v.push(token.to_string()),
        }
        Ok(())
    }

    /// Append all values of `other`, which must have the same type
    pub fn extend_from(&mut self, other: &ColumnData) -> Result<()> {
        match (self, other) {
            (ColumnData::Byte(a), ColumnData::Byte(b)) => a.extend_from_slice(b),
            (ColumnData::UByte(a), ColumnData::UByte(b)) => a.extend_from_slice(b),
            (ColumnData::Short(a), ColumnData::Short(b)) => a.extend_from_slice(b),
            (ColumnData::UShort(a), ColumnData::UShort(b)) => a.extend_from_slice(b),
            (ColumnData::Int(a), ColumnData::Int(b)) => a.extend_from_slice(b),
            (ColumnData::UInt(a), ColumnData::UInt(b)) => a.extend_from_slice(b),
            (ColumnData::Long(a), ColumnData::Long(b)) => a.extend_from_slice(b),
            (ColumnData::ULong(a), ColumnData::ULong(b)) => a.extend_from_slice(b),
            (ColumnData::Float(a), ColumnData::Float(b)) => a.extend_from_slice(b),
            (ColumnData::Double(a), ColumnData::Double(b)) => a.extend_from_slice(b),
            (ColumnData::Text(a), ColumnData::Text(b)) => a.extend_from_slice(b),
            (a, b) => {
                return Err(QueryError::InvalidState(format!(
                    "cannot append {} values to a {} column",
                    b.column_type(),
                    a.column_type()
                )))
            }
        }
        Ok(())
    }

    /// Keep only rows whose flag in `keep` is true
    pub fn retain_rows(&mut self, keep: &[bool]) {
        each_variant!(self, v => {
            let mut flags = keep.iter();
            v.retain(|_| flags.next().copied().unwrap_or(true));
        })
    }

    /// Bytes needed to hold `rows` values of this column in memory
    pub fn gather_bytes(&self, rows: u64) -> u64 {
        rows * self.column_type().width()
    }
}

// ============================================================================
// Column
// ============================================================================

/// A named column with its null mask and optional bitmap index
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
    /// Set bits mark non-null rows
    pub valid: Bitvector,
    pub index: Option<BitmapIndex>,
}

impl Column {
    pub fn new(name: &str, data: ColumnData, valid: Bitvector) -> Self {
        Self { name: name.to_string(), data, valid, index: None }
    }

    pub fn column_type(&self) -> ColumnType {
        self.data.column_type()
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_unsigned_compare() {
        let neg = Numeric::Int(-1);
        let big = Numeric::UInt(u64::MAX);
        assert_eq!(neg.compare(big), Some(Ordering::Less));
        assert_eq!(big.compare(neg), Some(Ordering::Greater));
        assert_eq!(Numeric::Int(5).compare(Numeric::UInt(5)), Some(Ordering::Equal));
        assert_eq!(Numeric::Float(f64::NAN).compare(Numeric::Int(1)), None);
        assert!(Numeric::Int(-3).within(Numeric::UInt(1), 4.0));
        assert!(!Numeric::Int(-3).within(Numeric::UInt(2), 4.0));
    }

    #[test]
    fn test_value_order() {
        let mut vals = vec![Value::Text("b".into()), Value::Float(1.5), Value::Null, Value::Int(-2), Value::UInt(1)];
        vals.sort();
        assert_eq!(vals, vec![Value::Null, Value::Int(-2), Value::UInt(1), Value::Float(1.5), Value::Text("b".into())]);
    }

    #[test]
    fn test_push_and_retain() {
        let mut d = ColumnData::new(ColumnType::Short);
        d.push_parsed("7").unwrap();
        d.push_default();
        d.push_parsed("-3").unwrap();
        assert!(d.push_parsed("x").is_err());
        d.retain_rows(&[true, false, true]);
        assert_eq!(d, ColumnData::Short(vec![7, -3]));
        assert_eq!(d.small_int(1), Some(-3));
        assert!(ColumnType::Short.is_small_integer());
        assert!(!ColumnType::Long.is_small_integer());
    }

    #[test]
    fn test_extend_type_mismatch() {
        let mut a = ColumnData::Int(vec![1]);
        assert!(a.extend_from(&ColumnData::Double(vec![1.0])).is_err());
        a.extend_from(&ColumnData::Int(vec![2])).unwrap();
        assert_eq!(a.len(), 2);
    }
}
