//! Select clauses

use std::fmt;

use serde::{Deserialize, Serialize};

use super::MathTerm;
use crate::bitvector::Bitvector;
use crate::dataset::{DatasetData, Value};
use crate::{QueryError, Result};

/// One selected term with an optional output name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectTerm {
    pub expr: MathTerm,
    pub alias: Option<String>,
}

impl SelectTerm {
    /// Output column name
    pub fn name(&self) -> String {
        match &self.alias {
            Some(a) => a.clone(),
            None => self.expr.to_string(),
        }
    }
}

/// Ordered list of selected terms
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SelectClause {
    pub terms: Vec<SelectTerm>,
}

impl SelectClause {
    pub fn new(terms: Vec<SelectTerm>) -> Self {
        Self { terms }
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Columns referenced by any term
    pub fn columns(&self) -> Vec<String> {
        let mut out = Vec::new();
        for t in &self.terms {
            t.expr.collect_columns(&mut out);
        }
        out
    }

    /// Term index by output name
    pub fn find(&self, name: &str) -> Option<usize> {
        self.terms.iter().position(|t| t.name() == name)
    }

    /// Check that every referenced column exists; text columns may only be
    /// selected bare
    pub fn validate(&self, data: &DatasetData) -> Result<()> {
        if self.terms.is_empty() {
            return Err(QueryError::InvalidSelect("empty select clause".to_string()));
        }
        for t in &self.terms {
            if let Some(name) = t.expr.as_column() {
                data.column(name)?;
                continue;
            }
            let mut cols = Vec::new();
            t.expr.collect_columns(&mut cols);
            for c in &cols {
                data.column(c)?;
                data.numeric_column(c)
                    .map_err(|_| QueryError::InvalidSelect(format!("text column {} used in arithmetic", c)))?;
            }
        }
        Ok(())
    }

    /// Rows where every referenced column is non-null
    pub fn validity_mask(&self, data: &DatasetData) -> Result<Bitvector> {
        data.valid_mask(&self.columns())
    }

    /// Values of every term at each row set in `rows`
    pub fn values(&self, data: &DatasetData, rows: &Bitvector) -> Result<Vec<Vec<Value>>> {
        let numeric_cols: Vec<String> = self
            .columns()
            .into_iter()
            .filter(|c| data.numeric_column(c).is_ok())
            .collect();
        let eval = data.math_evaluator(&numeric_cols)?;
        rows.positions()
            .map(|row| {
                self.terms
                    .iter()
                    .map(|t| match t.expr.as_column() {
                        Some(name) => data.value(name, row as usize),
                        None => Ok(eval.eval(&t.expr, row as usize).map_or(Value::Null, Value::Float)),
                    })
                    .collect::<Result<Vec<Value>>>()
            })
            .collect()
    }
}

impl fmt::Display for SelectClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, t) in self.terms.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", t.expr)?;
            if let Some(a) = &t.alias {
                write!(f, " AS {}", a)?;
            }
        }
        Ok(())
    }
}
