use nalgebra::{Cholesky, Const, SMatrix, SVector};
use num::Zero;

/// Implements the standard Gauss Newton optimization
///
/// # Type parameters
///
/// * `DIM` - The dimension of the problem.
pub struct GaussNewton<const DIM: usize> {
    hessian: SMatrix<f64, DIM, DIM>,
    gradient: SVector<f64, DIM>,
    squared_residual_sum: f64,
    count: usize,
}

impl<const DIM: usize> Default for GaussNewton<DIM> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const DIM: usize> GaussNewton<DIM> {
    /// Creates a new Gauss Newton optimizer.
    pub fn new() -> Self {
        Self {
            hessian: SMatrix::zeros(),
            gradient: SVector::zeros(),
            squared_residual_sum: 0.0,
            count: 0,
        }
    }

    /// Resets the optimizer.
    pub fn reset(&mut self) {
        self.hessian.set_zero();
        self.gradient.set_zero();
        self.squared_residual_sum = 0.0;
        self.count = 0;
    }

    /// Adds a new step to the optimizer.
    ///
    /// # Arguments
    ///
    /// * `residual` - The residual of the step.
    /// * `jacobian` - The jacobian of the step.
    pub fn step(&mut self, residual: f64, jacobian: &[f64; DIM]) {
        let mut jt_j = [[0.0; DIM]; DIM];
        for i in 0..DIM {
            let ival = jacobian[i];
            self.gradient[i] += ival * residual;

            jt_j[i][i] = ival * ival;
            for j in i + 1..DIM {
                let jval = jacobian[j];
                let mul = ival * jval;
                jt_j[i][j] = mul;
                jt_j[j][i] = mul;
            }
        }

        for (i, row) in jt_j.iter().enumerate().take(DIM) {
            for (j, value) in row.iter().enumerate().take(DIM) {
                self.hessian[(i, j)] += value;
            }
        }

        self.squared_residual_sum += residual * residual;
        self.count += 1;
    }

    /// Solve the current gauss newton system.
    ///
    /// # Returns
    ///
    /// The update vector.
    pub fn solve(&self) -> Option<SVector<f64, DIM>> {
        if self.count == 0 {
            return None;
        }

        Cholesky::<f64, Const<DIM>>::new(self.hessian)
            .map(|cholesky| cholesky.solve(&self.gradient))
    }

    /// Adds the values of another optimizer to this one.
    /// Use this to combine the state of sub optimizers.
    ///
    /// # Arguments
    ///
    /// * `other` - The other optimizer.
    pub fn add(&mut self, other: &Self) {
        self.hessian += other.hessian;
        self.gradient += other.gradient;
        self.squared_residual_sum += other.squared_residual_sum;
        self.count += other.count;
    }

    /// Returns the mean squared residual.
    pub fn mean_squared_residual(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.squared_residual_sum / self.count as f64
        }
    }

    /// Number of accumulated steps.
    pub fn count(&self) -> usize {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use nshare::ToNalgebra;

    #[test]
    fn test_gauss_newton() {
        use super::*;
        use ndarray::array;

        let mut gn = GaussNewton::<6>::new();

        gn.step(1.0, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        gn.step(2.0, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        gn.step(3.0, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        let hessian = gn.hessian;
        let gradient = gn.gradient;

        let expected_hessian = array![
            [3.0, 6.0, 9.0, 12.0, 15.0, 18.0],
            [6.0, 12.0, 18.0, 24.0, 30.0, 36.0],
            [9.0, 18.0, 27.0, 36.0, 45.0, 54.0],
            [12.0, 24.0, 36.0, 48.0, 60.0, 72.0],
            [15.0, 30.0, 45.0, 60.0, 75.0, 90.0],
            [18.0, 36.0, 54.0, 72.0, 90.0, 108.0],
        ]
        .into_nalgebra();
        assert_eq!(hessian, expected_hessian);

        let expected_gradient = array![6.0, 12.0, 18.0, 24.0, 30.0, 36.0].into_nalgebra();
        assert_eq!(gradient, expected_gradient);
    }

    #[test]
    fn test_merge_partial_sums() {
        use super::*;

        let mut full = GaussNewton::<6>::new();
        let mut first = GaussNewton::<6>::new();
        let mut second = GaussNewton::<6>::new();

        let rows = [
            (0.5, [1.0, 0.0, 0.0, 0.5, -0.5, 0.25]),
            (-1.5, [0.0, 1.0, 0.0, -0.25, 0.5, 1.0]),
            (2.0, [0.0, 0.0, 1.0, 1.0, 0.0, -1.0]),
            (0.25, [1.0, 1.0, 0.0, 0.0, 1.0, 0.5]),
        ];
        for (residual, jacobian) in &rows[..2] {
            full.step(*residual, jacobian);
            first.step(*residual, jacobian);
        }
        for (residual, jacobian) in &rows[2..] {
            full.step(*residual, jacobian);
            second.step(*residual, jacobian);
        }

        first.add(&second);
        assert_eq!(first.hessian, full.hessian);
        assert_eq!(first.gradient, full.gradient);
        assert_eq!(first.count(), full.count());
    }
}
