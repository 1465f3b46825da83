use crate::{Error, Formula, Result};
use nalgebra::{DMatrix, DVector};

#[cfg_attr(doc, katexit::katexit)]
/// Linear model defined by a [Formula] over an ordered list of input columns.
///
/// Defines the linear model ($y:\mathbb R^m \to\mathbb R$), where $y = \phi^T \beta$ with its
/// feature map $\phi:\mathbb R^m \to\mathbb R^n$ given by the formula terms and coefficient
/// $\beta \in \mathbb R^n$.
///
/// ```
/// use cdesign::{Formula, LinearModel};
/// use nalgebra::DMatrix;
///
/// let formula = Formula::parse("x1 + x2 + x1:x2").unwrap();
/// let lm = LinearModel::new(&formula, &["x1".into(), "x2".into()]).unwrap();
/// let design = lm.design(&DMatrix::from_row_slice(1, 2, &[2., 3.])).unwrap();
/// assert_eq!(design, DMatrix::from_row_slice(1, 4, &[1., 2., 3., 6.]));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct LinearModel {
    formula: Formula,
    columns: Vec<String>,
    term_indices: Vec<Vec<usize>>,
}

impl LinearModel {
    /// Creates the model, every formula variable has to be one of `columns`.
    pub fn new(formula: &Formula, columns: &[String]) -> Result<Self> {
        let term_indices = formula
            .terms()
            .iter()
            .map(|t| {
                t.variables()
                    .iter()
                    .map(|v| {
                        columns
                            .iter()
                            .position(|c| c == v)
                            .ok_or_else(|| Error::UnknownKey {
                                key: v.clone(),
                                context: format!("model term `{}`", t.name()),
                            })
                    })
                    .collect::<Result<Vec<usize>>>()
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            formula: formula.clone(),
            columns: columns.to_vec(),
            term_indices,
        })
    }

    /// Underlying formula.
    pub fn formula(&self) -> &Formula {
        &self.formula
    }

    /// Input columns in the order expected by all evaluation methods.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of model terms.
    pub fn n_terms(&self) -> usize {
        self.formula.len()
    }

    /// Number of input columns.
    pub fn n_inputs(&self) -> usize {
        self.columns.len()
    }

    fn args(&self, term: usize, x: &[f64]) -> Vec<f64> {
        self.term_indices[term].iter().map(|i| x[*i]).collect()
    }

    /// Returns the feature map $\phi(x)$.
    pub fn feature_vec(&self, x: &[f64]) -> DVector<f64> {
        DVector::from_iterator(
            self.n_terms(),
            self.formula
                .terms()
                .iter()
                .enumerate()
                .map(|(k, t)| t.value(&self.args(k, x))),
        )
    }

    /// Returns the model matrix $X$ with $X_{ij} = \phi_j(x^{(i)})$ for points given row-wise.
    pub fn design(&self, points: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        self.check_points(points)?;
        let mut design = DMatrix::zeros(points.nrows(), self.n_terms());
        for i in 0..points.nrows() {
            let x: Vec<f64> = points.row(i).iter().copied().collect();
            design.row_mut(i).copy_from(&self.feature_vec(&x).transpose());
        }
        Ok(design)
    }

    /// Returns the transposed jacobian $J^T \in \mathbb R^{m \times n}$, where $J_{ij}(x) =
    /// (\nabla \phi_j(x))_i$.
    pub fn jac_t(&self, x: &[f64]) -> DMatrix<f64> {
        let mut jac_t = DMatrix::zeros(self.n_inputs(), self.n_terms());
        for (k, t) in self.formula.terms().iter().enumerate() {
            let (_, grad) = t.value_grad(&self.args(k, x));
            for (g, i) in grad.iter().zip(&self.term_indices[k]) {
                jac_t[(*i, k)] += g;
            }
        }
        jac_t
    }

    /// Returns one transposed jacobian per point given row-wise.
    pub fn model_jacobian_t(&self, points: &DMatrix<f64>) -> Result<Vec<DMatrix<f64>>> {
        self.check_points(points)?;
        Ok((0..points.nrows())
            .map(|i| {
                let x: Vec<f64> = points.row(i).iter().copied().collect();
                self.jac_t(&x)
            })
            .collect())
    }

    /// Returns the fisher information matrix $X^T X$.
    pub fn fim(&self, points: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        let design = self.design(points)?;
        Ok(design.transpose() * design)
    }

    fn check_points(&self, points: &DMatrix<f64>) -> Result<()> {
        if points.ncols() != self.n_inputs() {
            return Err(Error::ShapeMismatch {
                mat1: "points",
                mat2: "columns",
                dim1: 1,
                dim2: 0,
                shape1: points.shape(),
                shape2: (self.n_inputs(), 1),
            });
        }
        Ok(())
    }
}
