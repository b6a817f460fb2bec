#![allow(dead_code)]

use candle_core::{Result, Tensor};

/// Lower bound on cosine-similarity denominators. An all-zero gene or
/// voxel slice upstream would otherwise divide by zero.
pub const COSINE_EPS: f64 = 1e-8;

/// Column-wise cosine similarity between two matrices of equal shape
///
/// cos(j) = <x(.,j), y(.,j)> / max(ε, |x(.,j)| * |y(.,j)|)
///
/// * `x_vg` - predicted values (voxel x gene)
/// * `y_vg` - observed values (voxel x gene)
///
/// Returns a 1-d tensor with one similarity per column.
pub fn columnwise_cosine(x_vg: &Tensor, y_vg: &Tensor) -> Result<Tensor> {
    let dot_g = x_vg.mul(y_vg)?.sum(0)?;
    let x_norm_g = x_vg.sqr()?.sum(0)?.sqrt()?;
    let y_norm_g = y_vg.sqr()?.sum(0)?.sqrt()?;
    let denom_g = x_norm_g.mul(&y_norm_g)?.maximum(COSINE_EPS)?;
    dot_g.div(&denom_g)
}

/// Row-wise cosine similarity between two matrices of equal shape
///
/// cos(i) = <x(i,.), y(i,.)> / max(ε, |x(i,.)| * |y(i,.)|)
///
/// * `x_vg` - predicted values (voxel x gene)
/// * `y_vg` - observed values (voxel x gene)
///
/// Returns a 1-d tensor with one similarity per row.
pub fn rowwise_cosine(x_vg: &Tensor, y_vg: &Tensor) -> Result<Tensor> {
    let dot_v = x_vg.mul(y_vg)?.sum(1)?;
    let x_norm_v = x_vg.sqr()?.sum(1)?.sqrt()?;
    let y_norm_v = y_vg.sqr()?.sum(1)?.sqrt()?;
    let denom_v = x_norm_v.mul(&y_norm_v)?.maximum(COSINE_EPS)?;
    dot_v.div(&denom_v)
}

/// KL divergence from a predicted voxel occupancy to a target density
///
/// KL(d || m) = Σ_v d(v) * [ log d(v) - log m(v) ]
///
/// Zero entries of `d_v` contribute nothing. `mass_v` must be strictly
/// positive, which holds for any softmax column marginal.
///
/// * `d_v` - target density, sums to one
/// * `mass_v` - predicted occupancy, sums to one
///
pub fn density_kl_divergence(d_v: &Tensor, mass_v: &Tensor) -> Result<Tensor> {
    let log_d_v = d_v
        .gt(0.0)?
        .where_cond(&d_v.log()?, &Tensor::zeros_like(d_v)?)?;

    d_v.mul(&log_d_v.sub(&mass_v.log()?)?)?.sum_all()
}

/// Negative entropy of a row-stochastic mapping matrix
///
/// Σ_ij p(i,j) * log p(i,j)
///
/// Summed over all entries. The total loss scales this by -λr, so a
/// positive λr favors rows peaked over a narrow set of voxels.
///
/// * `p_nv` - probabilities (cell x voxel)
/// * `log_p_nv` - their logarithms, finite by construction when taken
///   from a log-softmax
///
pub fn negative_entropy(p_nv: &Tensor, log_p_nv: &Tensor) -> Result<Tensor> {
    p_nv.mul(log_p_nv)?.sum_all()
}
