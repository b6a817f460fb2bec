use crate::mapper_config::{MapHyperParams, MapTrainConfig};
use crate::mapper_loss::*;

use candle_core::{Device, Tensor, Var};
use candle_nn::ops;
use candle_nn::{AdamW, Optimizer};
use indicatif::{ProgressBar, ProgressDrawTarget};
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

/// Initializer for the mapping parameter matrix
pub enum MapInit {
    /// `N(0,1)` values from a seeded generator
    Seeded(u64),
    /// `N(0,1)` values from OS entropy
    Random,
    /// resume from a previous mapping parameter (cell x voxel)
    Resume(Tensor),
}

/// One loss snapshot per epoch. Inactive terms stay at zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct MapLossTerms {
    pub total: f32,
    /// mean cosine similarity across gene columns
    pub gene_voxel_cos: f32,
    /// mean cosine similarity across voxel rows
    pub voxel_gene_cos: f32,
    /// KL(d || predicted voxel occupancy)
    pub density_kl: f32,
    /// Σ p log p over the mapping rows
    pub neg_entropy: f32,
}

/// Learns a cell-to-voxel mapping matrix by gradient descent.
///
/// The free parameter is a real-valued (cell x voxel) matrix; its
/// row-softmax is the probability of placing each cell on each voxel.
/// Epochs run strictly sequentially and the parameter is owned here for
/// the duration of the run.
pub struct Mapper {
    s_ng: Tensor,
    g_vg: Tensor,
    d_v: Option<Tensor>,
    hyper: MapHyperParams,
    map_nv: Var,
}

impl Mapper {
    /// Validate shapes and hyperparameters, then allocate the mapping
    /// parameter on `device`. All configuration and shape errors
    /// surface here, before any epoch runs.
    ///
    /// * `s_ng` - source expression (cell x gene)
    /// * `g_vg` - target expression (voxel x gene)
    /// * `d_v` - optional target density over voxels, sums to one
    pub fn new(
        s_ng: Tensor,
        g_vg: Tensor,
        d_v: Option<Tensor>,
        hyper: MapHyperParams,
        init: MapInit,
        device: &Device,
    ) -> anyhow::Result<Self> {
        hyper.validate(d_v.is_some())?;

        let (n_cells, n_genes) = s_ng.dims2()?;
        let (n_voxels, n_genes_sp) = g_vg.dims2()?;

        anyhow::ensure!(
            n_genes == n_genes_sp,
            "source has {} genes but target has {}",
            n_genes,
            n_genes_sp
        );

        if let Some(d_v) = d_v.as_ref() {
            anyhow::ensure!(
                d_v.dims1()? == n_voxels,
                "density target length {} != {} voxels",
                d_v.dims1()?,
                n_voxels
            );
        }

        let map_nv = match init {
            MapInit::Resume(prev_nv) => {
                let dims = prev_nv.dims2()?;
                anyhow::ensure!(
                    dims == (n_cells, n_voxels),
                    "resumed mapping is {} x {}, expected {} x {}",
                    dims.0,
                    dims.1,
                    n_cells,
                    n_voxels
                );
                prev_nv.to_dtype(candle_core::DType::F32)?.to_device(device)?
            }
            MapInit::Seeded(seed) => {
                rnorm_tensor(n_cells, n_voxels, StdRng::seed_from_u64(seed), device)?
            }
            MapInit::Random => rnorm_tensor(n_cells, n_voxels, StdRng::from_os_rng(), device)?,
        };

        Ok(Self {
            s_ng: s_ng.to_device(device)?,
            g_vg: g_vg.to_device(device)?,
            d_v: d_v.map(|d| d.to_device(device)).transpose()?,
            hyper,
            map_nv: Var::from_tensor(&map_nv)?,
        })
    }

    /// Row-softmax of the current mapping parameter: each row is a
    /// probability distribution of one cell over all voxels.
    pub fn probabilities(&self) -> anyhow::Result<Tensor> {
        Ok(ops::log_softmax(self.map_nv.as_tensor(), 1)?.exp()?)
    }

    /// One forward pass; no parameter update, no history entry.
    pub fn evaluate(&self) -> anyhow::Result<MapLossTerms> {
        let (_, terms) = self.loss_terms()?;
        Ok(terms)
    }

    /// Minimize the mapping objective for exactly `num_epochs` steps.
    ///
    /// Returns the row-normalized probability matrix (not the raw
    /// parameter, which stays with the `Mapper`) together with one loss
    /// snapshot per epoch.
    pub fn train(
        &mut self,
        config: &MapTrainConfig,
    ) -> anyhow::Result<(Tensor, Vec<MapLossTerms>)> {
        let mut adam = AdamW::new_lr(vec![self.map_nv.clone()], config.learning_rate.into())?;

        let pb = ProgressBar::new(config.num_epochs as u64);
        if !config.show_progress || config.print_each.is_some() {
            pb.set_draw_target(ProgressDrawTarget::hidden());
        }

        let mut history = Vec::with_capacity(config.num_epochs);

        for epoch in 0..config.num_epochs {
            let (loss, terms) = self.loss_terms()?;
            adam.backward_step(&loss)?;
            history.push(terms);
            pb.inc(1);

            if let Some(print_each) = config.print_each {
                if print_each > 0 && (epoch + 1) % print_each == 0 {
                    info!(
                        "[{}] loss: {:.6}, gene-voxel cos: {:.3}",
                        epoch + 1,
                        terms.total,
                        terms.gene_voxel_cos
                    );
                }
            }
        }
        pb.finish_and_clear();

        Ok((self.probabilities()?, history))
    }

    /// total = λd * KL(d || m) - λg1 * <cos genes> - λg2 * <cos voxels>
    ///         - λr * Σ p log p
    ///
    /// Zero-weighted terms are skipped so they can never poison the
    /// gradient with a NaN.
    fn loss_terms(&self) -> anyhow::Result<(Tensor, MapLossTerms)> {
        let log_p_nv = ops::log_softmax(self.map_nv.as_tensor(), 1)?;
        let p_nv = log_p_nv.exp()?;

        let g_pred_vg = p_nv.t()?.matmul(&self.s_ng)?;

        let mut terms = MapLossTerms::default();

        let gv_cos = columnwise_cosine(&g_pred_vg, &self.g_vg)?.mean_all()?;
        terms.gene_voxel_cos = gv_cos.to_scalar::<f32>()?;
        let mut total = gv_cos.affine(-self.hyper.lambda_g1, 0.)?;

        if self.hyper.lambda_g2 != 0. {
            let vg_cos = rowwise_cosine(&g_pred_vg, &self.g_vg)?.mean_all()?;
            terms.voxel_gene_cos = vg_cos.to_scalar::<f32>()?;
            total = total.add(&vg_cos.affine(-self.hyper.lambda_g2, 0.)?)?;
        }

        if let Some(d_v) = self.d_v.as_ref() {
            let n_cells = p_nv.dim(0)? as f64;
            let mass_v = (p_nv.sum(0)? / n_cells)?;
            let kl = density_kl_divergence(d_v, &mass_v)?;
            terms.density_kl = kl.to_scalar::<f32>()?;
            total = total.add(&kl.affine(self.hyper.lambda_d, 0.)?)?;
        }

        if self.hyper.lambda_r != 0. {
            let neg_ent = negative_entropy(&p_nv, &log_p_nv)?;
            terms.neg_entropy = neg_ent.to_scalar::<f32>()?;
            total = total.add(&neg_ent.affine(-self.hyper.lambda_r, 0.)?)?;
        }

        terms.total = total.to_scalar::<f32>()?;
        Ok((total, terms))
    }
}

fn rnorm_tensor(
    nrow: usize,
    ncol: usize,
    mut rng: StdRng,
    device: &Device,
) -> anyhow::Result<Tensor> {
    let rnorm = Normal::new(0_f32, 1_f32)?;
    let data: Vec<f32> = (0..(nrow * ncol)).map(|_| rnorm.sample(&mut rng)).collect();
    Ok(Tensor::from_vec(data, (nrow, ncol), device)?)
}
