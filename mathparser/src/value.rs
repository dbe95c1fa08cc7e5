//! FILENAME: mathparser/src/value.rs
//! PURPOSE: Runtime values and output-shape descriptors for expression trees.
//! CONTEXT: Every AST node reports an output shape (scalar, or matrix with
//! row/column counts) discovered lazily from its children. Evaluation
//! produces either an f64 scalar or an owned dense Matrix; the two paths are
//! mutually exclusive and calling the wrong one is a semantic error, decided
//! by the caller from the node's OutputInfo.

use crate::error::{MathError, MathResult};
use serde::{Deserialize, Serialize};

/// Output shape of an expression node: a scalar, or a matrix with known
/// dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputInfo {
    Scalar,
    Matrix { rows: usize, cols: usize },
}

impl OutputInfo {
    pub fn is_scalar(&self) -> bool {
        matches!(self, OutputInfo::Scalar)
    }

    pub fn is_matrix(&self) -> bool {
        matches!(self, OutputInfo::Matrix { .. })
    }
}

/// A value produced by evaluating an expression node or looked up from an
/// object scope. Textual values exist only so that string-typed script
/// properties can flow through scope lookups; using one where a number is
/// required is a semantic error.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Real(f64),
    Matrix(Matrix),
    Text(String),
}

impl Value {
    pub fn output_info(&self) -> OutputInfo {
        match self {
            // textual values report as scalars; evaluation raises the
            // actual non-numeric error
            Value::Real(_) | Value::Text(_) => OutputInfo::Scalar,
            Value::Matrix(m) => OutputInfo::Matrix {
                rows: m.rows(),
                cols: m.cols(),
            },
        }
    }

    pub fn is_textual(&self) -> bool {
        matches!(self, Value::Text(_))
    }

    /// Unwraps the scalar, or reports a shape mismatch.
    pub fn into_real(self) -> MathResult<f64> {
        match self {
            Value::Real(v) => Ok(v),
            Value::Matrix(_) => Err(MathError::semantic(
                "matrix value found where a scalar is required",
            )),
            Value::Text(_) => Err(MathError::semantic(
                "textual value found where a number is required",
            )),
        }
    }

    /// Unwraps the matrix, or reports a shape mismatch.
    pub fn into_matrix(self) -> MathResult<Matrix> {
        match self {
            Value::Matrix(m) => Ok(m),
            Value::Real(_) => Err(MathError::semantic(
                "scalar value found where a matrix is required",
            )),
            Value::Text(_) => Err(MathError::semantic(
                "textual value found where a matrix is required",
            )),
        }
    }
}

/// A dense, row-major, owned matrix of f64 elements.
///
/// This carries exactly the operations expression evaluation needs:
/// elementwise add/subtract, scaling, matrix multiply, transpose,
/// determinant and inverse (Gaussian elimination with partial pivoting),
/// Frobenius norm, and 3-vector cross/dot products.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// Creates a zero-filled matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Matrix {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Creates the n-by-n identity matrix.
    pub fn identity(n: usize) -> Self {
        let mut m = Matrix::zeros(n, n);
        for i in 0..n {
            m.set(i, i, 1.0);
        }
        m
    }

    /// Builds a matrix from nested row vectors. All rows must have the same
    /// length.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> MathResult<Self> {
        let nrows = rows.len();
        let ncols = rows.first().map(|r| r.len()).unwrap_or(0);
        if nrows == 0 || ncols == 0 {
            return Err(MathError::semantic("empty matrix literal"));
        }
        let mut data = Vec::with_capacity(nrows * ncols);
        for row in &rows {
            if row.len() != ncols {
                return Err(MathError::semantic(
                    "matrix rows have inconsistent lengths",
                ));
            }
            data.extend_from_slice(row);
        }
        Ok(Matrix {
            rows: nrows,
            cols: ncols,
            data,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.cols + col] = value;
    }

    fn same_shape(&self, other: &Matrix) -> MathResult<()> {
        if self.rows != other.rows || self.cols != other.cols {
            return Err(MathError::semantic(format!(
                "matrix shape mismatch: {}x{} vs {}x{}",
                self.rows, self.cols, other.rows, other.cols
            )));
        }
        Ok(())
    }

    /// Elementwise addition. Shapes must match.
    pub fn add(&self, other: &Matrix) -> MathResult<Matrix> {
        self.same_shape(other)?;
        let data = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| a + b)
            .collect();
        Ok(Matrix {
            rows: self.rows,
            cols: self.cols,
            data,
        })
    }

    /// Elementwise subtraction. Shapes must match.
    pub fn subtract(&self, other: &Matrix) -> MathResult<Matrix> {
        self.same_shape(other)?;
        let data = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| a - b)
            .collect();
        Ok(Matrix {
            rows: self.rows,
            cols: self.cols,
            data,
        })
    }

    /// Multiplies every element by a scalar.
    pub fn scale(&self, factor: f64) -> Matrix {
        Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|v| v * factor).collect(),
        }
    }

    /// Matrix product. The left operand's column count must equal the right
    /// operand's row count.
    pub fn multiply(&self, other: &Matrix) -> MathResult<Matrix> {
        if self.cols != other.rows {
            return Err(MathError::semantic(format!(
                "cannot multiply {}x{} by {}x{}",
                self.rows, self.cols, other.rows, other.cols
            )));
        }
        let mut out = Matrix::zeros(self.rows, other.cols);
        for i in 0..self.rows {
            for j in 0..other.cols {
                let mut sum = 0.0;
                for k in 0..self.cols {
                    sum += self.get(i, k) * other.get(k, j);
                }
                out.set(i, j, sum);
            }
        }
        Ok(out)
    }

    pub fn transpose(&self) -> Matrix {
        let mut out = Matrix::zeros(self.cols, self.rows);
        for i in 0..self.rows {
            for j in 0..self.cols {
                out.set(j, i, self.get(i, j));
            }
        }
        out
    }

    /// Frobenius norm: square root of the sum of squared elements.
    pub fn norm(&self) -> f64 {
        self.data.iter().map(|v| v * v).sum::<f64>().sqrt()
    }

    /// Determinant via LU factorization with partial pivoting. The matrix
    /// must be square.
    pub fn determinant(&self) -> MathResult<f64> {
        if self.rows != self.cols {
            return Err(MathError::semantic(
                "determinant requires a square matrix",
            ));
        }
        let n = self.rows;
        let mut lu = self.data.clone();
        let mut det = 1.0;
        for col in 0..n {
            // pivot selection
            let mut pivot = col;
            for row in col + 1..n {
                if lu[row * n + col].abs() > lu[pivot * n + col].abs() {
                    pivot = row;
                }
            }
            if lu[pivot * n + col] == 0.0 {
                return Ok(0.0);
            }
            if pivot != col {
                for k in 0..n {
                    lu.swap(col * n + k, pivot * n + k);
                }
                det = -det;
            }
            det *= lu[col * n + col];
            for row in col + 1..n {
                let factor = lu[row * n + col] / lu[col * n + col];
                for k in col..n {
                    lu[row * n + k] -= factor * lu[col * n + k];
                }
            }
        }
        Ok(det)
    }

    /// Matrix inverse via Gauss-Jordan elimination with partial pivoting.
    /// The matrix must be square and non-singular.
    pub fn inverse(&self) -> MathResult<Matrix> {
        if self.rows != self.cols {
            return Err(MathError::semantic("inverse requires a square matrix"));
        }
        let n = self.rows;
        let mut work = self.clone();
        let mut out = Matrix::identity(n);
        for col in 0..n {
            let mut pivot = col;
            for row in col + 1..n {
                if work.get(row, col).abs() > work.get(pivot, col).abs() {
                    pivot = row;
                }
            }
            if work.get(pivot, col) == 0.0 {
                return Err(MathError::semantic("matrix is singular"));
            }
            if pivot != col {
                for k in 0..n {
                    let a = work.get(col, k);
                    work.set(col, k, work.get(pivot, k));
                    work.set(pivot, k, a);
                    let b = out.get(col, k);
                    out.set(col, k, out.get(pivot, k));
                    out.set(pivot, k, b);
                }
            }
            let diag = work.get(col, col);
            for k in 0..n {
                work.set(col, k, work.get(col, k) / diag);
                out.set(col, k, out.get(col, k) / diag);
            }
            for row in 0..n {
                if row == col {
                    continue;
                }
                let factor = work.get(row, col);
                if factor == 0.0 {
                    continue;
                }
                for k in 0..n {
                    work.set(row, k, work.get(row, k) - factor * work.get(col, k));
                    out.set(row, k, out.get(row, k) - factor * out.get(col, k));
                }
            }
        }
        Ok(out)
    }

    /// Interprets the matrix as a flat vector of its elements, used by the
    /// 3-vector cross/dot built-ins which accept row or column vectors.
    fn as_vector(&self) -> MathResult<&[f64]> {
        if self.rows == 1 || self.cols == 1 {
            Ok(&self.data)
        } else {
            Err(MathError::semantic(format!(
                "expected a vector, found a {}x{} matrix",
                self.rows, self.cols
            )))
        }
    }

    /// 3-vector cross product; operands may be 3x1 or 1x3, result is 3x1.
    pub fn cross(&self, other: &Matrix) -> MathResult<Matrix> {
        let a = self.as_vector()?;
        let b = other.as_vector()?;
        if a.len() != 3 || b.len() != 3 {
            return Err(MathError::semantic(
                "cross product requires two 3-element vectors",
            ));
        }
        let mut out = Matrix::zeros(3, 1);
        out.set(0, 0, a[1] * b[2] - a[2] * b[1]);
        out.set(1, 0, a[2] * b[0] - a[0] * b[2]);
        out.set(2, 0, a[0] * b[1] - a[1] * b[0]);
        Ok(out)
    }

    /// Vector dot product; operands must be vectors of equal length.
    pub fn dot(&self, other: &Matrix) -> MathResult<f64> {
        let a = self.as_vector()?;
        let b = other.as_vector()?;
        if a.len() != b.len() {
            return Err(MathError::semantic(
                "dot product requires vectors of equal length",
            ));
        }
        Ok(a.iter().zip(b).map(|(x, y)| x * y).sum())
    }
}
