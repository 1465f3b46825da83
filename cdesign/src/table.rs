use crate::{Error, Result};
use nalgebra::DMatrix;
use std::fmt::Display;

/// Values of a single table column.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// Continuous, discrete or relaxed binary values.
    Numeric(Vec<f64>),
    /// Category labels.
    Categorical(Vec<String>),
}

impl Column {
    /// Number of rows.
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(v) => v.len(),
            Column::Categorical(v) => v.len(),
        }
    }

    /// True for an empty column.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn select(&self, rows: &[usize]) -> Self {
        match self {
            Column::Numeric(v) => Column::Numeric(rows.iter().map(|r| v[*r]).collect()),
            Column::Categorical(v) => {
                Column::Categorical(rows.iter().map(|r| v[*r].clone()).collect())
            }
        }
    }
}

/// Row-per-experiment table with keyed columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    keys: Vec<String>,
    columns: Vec<Column>,
    nrows: usize,
}

impl Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let header = self
            .keys
            .iter()
            .map(|k| format!("{k:>10}"))
            .collect::<Vec<String>>()
            .join(" ");
        let rows = (0..self.nrows)
            .map(|r| {
                self.columns
                    .iter()
                    .map(|c| match c {
                        Column::Numeric(v) => format!("{:>+10.4}", v[r]),
                        Column::Categorical(v) => format!("{:>10}", v[r]),
                    })
                    .collect::<Vec<String>>()
                    .join(" ")
            })
            .collect::<Vec<String>>()
            .join("\n");
        write!(f, "{header}\n{rows}")
    }
}

impl Table {
    /// Creates an empty table with `nrows` rows and no columns.
    pub fn new(nrows: usize) -> Self {
        Self {
            keys: vec![],
            columns: vec![],
            nrows,
        }
    }

    /// Creates a numeric table from a matrix with one row per experiment.
    pub fn from_matrix(keys: &[String], data: &DMatrix<f64>) -> Result<Self> {
        if keys.len() != data.ncols() {
            return Err(Error::LengthMismatch {
                list1: "keys",
                list2: "matrix columns",
                len1: keys.len(),
                len2: data.ncols(),
            });
        }
        let mut table = Self::new(data.nrows());
        for (j, key) in keys.iter().enumerate() {
            table.push(key, Column::Numeric(data.column(j).iter().copied().collect()))?;
        }
        Ok(table)
    }

    /// Creates a numeric table from row vectors.
    pub fn from_rows(keys: &[&str], rows: &[Vec<f64>]) -> Result<Self> {
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        if let Some(r) = rows.iter().find(|r| r.len() != keys.len()) {
            return Err(Error::LengthMismatch {
                list1: "keys",
                list2: "row",
                len1: keys.len(),
                len2: r.len(),
            });
        }
        let data = DMatrix::from_fn(rows.len(), keys.len(), |i, j| rows[i][j]);
        Self::from_matrix(&keys, &data)
    }

    /// Appends a column. Fails on duplicated keys or wrong column length.
    pub fn push(&mut self, key: &str, column: Column) -> Result<()> {
        if self.keys.iter().any(|k| k == key) {
            return Err(Error::DuplicateKey {
                key: key.to_string(),
                context: "table columns",
            });
        }
        if self.keys.is_empty() && self.nrows == 0 {
            self.nrows = column.len();
        }
        if column.len() != self.nrows {
            return Err(Error::LengthMismatch {
                list1: "table rows",
                list2: "column",
                len1: self.nrows,
                len2: column.len(),
            });
        }
        self.keys.push(key.to_string());
        self.columns.push(column);
        Ok(())
    }

    /// Column keys.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Number of rows.
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    /// Number of columns.
    pub fn ncols(&self) -> usize {
        self.keys.len()
    }

    /// Column by key.
    pub fn column(&self, key: &str) -> Option<&Column> {
        self.keys
            .iter()
            .position(|k| k == key)
            .map(|i| &self.columns[i])
    }

    /// Numeric column by key, fails if missing or categorical.
    pub fn numeric(&self, key: &str) -> Result<&[f64]> {
        match self.column(key) {
            Some(Column::Numeric(v)) => Ok(v),
            Some(Column::Categorical(_)) => Err(Error::InvalidCandidate {
                key: key.to_string(),
                reason: "expected numeric values".to_string(),
            }),
            None => Err(Error::InvalidCandidate {
                key: key.to_string(),
                reason: "column is missing".to_string(),
            }),
        }
    }

    /// Categorical column by key, fails if missing or numeric.
    pub fn categorical(&self, key: &str) -> Result<&[String]> {
        match self.column(key) {
            Some(Column::Categorical(v)) => Ok(v),
            Some(Column::Numeric(_)) => Err(Error::InvalidCandidate {
                key: key.to_string(),
                reason: "expected category labels".to_string(),
            }),
            None => Err(Error::InvalidCandidate {
                key: key.to_string(),
                reason: "column is missing".to_string(),
            }),
        }
    }

    /// Numeric matrix of the given columns, one row per experiment.
    pub fn to_matrix(&self, keys: &[String]) -> Result<DMatrix<f64>> {
        let columns = keys
            .iter()
            .map(|k| self.numeric(k))
            .collect::<Result<Vec<_>>>()?;
        Ok(DMatrix::from_fn(self.nrows, keys.len(), |i, j| columns[j][i]))
    }

    /// Table containing the given rows in the given order.
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        Self {
            keys: self.keys.clone(),
            columns: self.columns.iter().map(|c| c.select(rows)).collect(),
            nrows: rows.len(),
        }
    }

    /// Appends the rows of `other`, which must have the same keys.
    pub fn append(&mut self, other: &Table) -> Result<()> {
        if self.keys.is_empty() && self.nrows == 0 {
            *self = other.clone();
            return Ok(());
        }
        for (key, column) in self.keys.iter().zip(self.columns.iter_mut()) {
            match (column, other.column(key)) {
                (Column::Numeric(a), Some(Column::Numeric(b))) => a.extend_from_slice(b),
                (Column::Categorical(a), Some(Column::Categorical(b))) => {
                    a.extend_from_slice(b)
                }
                _ => {
                    return Err(Error::InvalidCandidate {
                        key: key.clone(),
                        reason: "column is missing or of different type".to_string(),
                    });
                }
            }
        }
        self.nrows += other.nrows;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_columns() -> Result<()> {
        let mut t = Table::from_rows(&["x1", "x2"], &[vec![1., 2.], vec![3., 4.]])?;
        t.push(
            "c",
            Column::Categorical(vec!["a".to_string(), "b".to_string()]),
        )?;
        assert_eq!(t.nrows(), 2);
        assert_eq!(t.ncols(), 3);
        assert_eq!(t.numeric("x2")?, &[2., 4.]);
        assert!(t.numeric("c").is_err());
        assert!(t.categorical("x1").is_err());
        assert!(t.push("x1", Column::Numeric(vec![0., 0.])).is_err());
        assert!(t.push("x3", Column::Numeric(vec![0.])).is_err());
        let m = t.to_matrix(&["x2".to_string(), "x1".to_string()])?;
        assert_eq!(m, DMatrix::from_row_slice(2, 2, &[2., 1., 4., 3.]));
        Ok(())
    }

    #[test]
    fn table_rows() -> Result<()> {
        let mut t = Table::from_rows(&["x"], &[vec![1.], vec![2.]])?;
        let other = Table::from_rows(&["x"], &[vec![3.]])?;
        t.append(&other)?;
        assert_eq!(t.numeric("x")?, &[1., 2., 3.]);
        let s = t.select_rows(&[2, 0]);
        assert_eq!(s.numeric("x")?, &[3., 1.]);
        let mut empty = Table::default();
        empty.append(&other)?;
        assert_eq!(empty, other);
        assert!(t.append(&Table::from_rows(&["y"], &[vec![1.]])?).is_err());
        Ok(())
    }
}
