/// Weights for the four terms of the mapping objective.
///
/// total = λd * KL(d || m) - λg1 * <cos(genes)> - λg2 * <cos(voxels)>
///         - λr * Σ p log p
///
#[derive(Debug, Clone, Copy)]
pub struct MapHyperParams {
    /// density (KL) term
    pub lambda_d: f64,
    /// gene-voxel cosine similarity term
    pub lambda_g1: f64,
    /// voxel-gene cosine similarity term
    pub lambda_g2: f64,
    /// entropy regularizer on the mapping rows
    pub lambda_r: f64,
}

impl Default for MapHyperParams {
    fn default() -> Self {
        Self {
            lambda_d: 0.,
            lambda_g1: 1.,
            lambda_g2: 0.,
            lambda_r: 0.,
        }
    }
}

impl MapHyperParams {
    /// The gene-voxel term anchors the objective; a density target
    /// without a density weight is silently ignored otherwise, so both
    /// misconfigurations abort before any epoch runs.
    pub fn validate(&self, has_density_target: bool) -> anyhow::Result<()> {
        if self.lambda_g1 == 0. {
            anyhow::bail!("lambda_g1 cannot be 0");
        }
        if has_density_target && self.lambda_d == 0. {
            anyhow::bail!("a density target was given but lambda_d is 0");
        }
        Ok(())
    }
}

pub struct MapTrainConfig {
    pub learning_rate: f32,
    pub num_epochs: usize,
    /// log the loss every `print_each` epochs; `None` disables logging
    pub print_each: Option<usize>,
    pub show_progress: bool,
}

impl Default for MapTrainConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            num_epochs: 1000,
            print_each: None,
            show_progress: false,
        }
    }
}
