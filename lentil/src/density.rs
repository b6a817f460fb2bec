use crate::expr_data::ExprDataset;
use crate::map_common::*;

/// Target density over spatial spots, resolved to a concrete vector
/// before the optimizer sees it.
#[derive(Debug, Clone, PartialEq)]
pub enum DensityPrior {
    Unset,
    Uniform,
    /// fraction of RNA molecules observed per spot (from preprocessing)
    RnaCountBased,
    /// user-supplied vector, one entry per spot, summing to one
    Explicit(DVec),
}

/// Resolve a density prior against the (prepared) spatial dataset.
///
/// In cluster mode an unset prior falls back to uniform, since cluster
/// masses are only meaningful relative to some spatial expectation.
pub fn resolve_density_prior(
    prior: &DensityPrior,
    sp_data: &ExprDataset,
    cluster_mode: bool,
) -> anyhow::Result<Option<DVec>> {
    let n_spots = sp_data.n_obs();
    let uniform = || DVec::from_element(n_spots, 1. / n_spots as f32);

    match prior {
        DensityPrior::Unset => Ok(cluster_mode.then(uniform)),
        DensityPrior::Uniform => Ok(Some(uniform())),
        DensityPrior::RnaCountBased => {
            let d = sp_data.density.clone().ok_or_else(|| {
                anyhow::anyhow!("no rna-count density; run preprocessing first")
            })?;
            Ok(Some(d))
        }
        DensityPrior::Explicit(d) => {
            anyhow::ensure!(
                d.len() == n_spots,
                "density has {} entries for {} spots",
                d.len(),
                n_spots
            );
            anyhow::ensure!(d.min() >= 0., "density entries must be non-negative");
            anyhow::ensure!(
                (d.sum() - 1.).abs() < 1e-3,
                "density sums to {}, expected 1",
                d.sum()
            );
            Ok(Some(d.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr_data::ExprMatrix;
    use approx::assert_abs_diff_eq;

    fn three_spot_dataset() -> ExprDataset {
        let x = Mat::from_row_slice(3, 2, &[1., 1., 1., 1., 2., 2.]);
        ExprDataset::new(
            ExprMatrix::Dense(x),
            vec!["s1".into(), "s2".into(), "s3".into()],
            vec!["g1".into(), "g2".into()],
        )
        .unwrap()
    }

    #[test]
    fn unset_prior_defaults_to_uniform_only_for_clusters() -> anyhow::Result<()> {
        let sp_data = three_spot_dataset();

        assert!(resolve_density_prior(&DensityPrior::Unset, &sp_data, false)?.is_none());

        let d = resolve_density_prior(&DensityPrior::Unset, &sp_data, true)?.unwrap();
        assert_abs_diff_eq!(d[0], 1. / 3., epsilon = 1e-6);
        Ok(())
    }

    #[test]
    fn rna_count_prior_requires_preprocessing() {
        let sp_data = three_spot_dataset();
        assert!(resolve_density_prior(&DensityPrior::RnaCountBased, &sp_data, false).is_err());
    }

    #[test]
    fn explicit_prior_must_be_a_distribution() {
        let sp_data = three_spot_dataset();

        let bad = DensityPrior::Explicit(DVec::from_vec(vec![0.5, 0.2, 0.1]));
        assert!(resolve_density_prior(&bad, &sp_data, false).is_err());

        let short = DensityPrior::Explicit(DVec::from_vec(vec![0.5, 0.5]));
        assert!(resolve_density_prior(&short, &sp_data, false).is_err());

        let good = DensityPrior::Explicit(DVec::from_vec(vec![0.5, 0.25, 0.25]));
        assert!(resolve_density_prior(&good, &sp_data, false).is_ok());
    }
}
