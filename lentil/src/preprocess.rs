use crate::expr_data::ExprDataset;
use crate::map_common::*;
use std::collections::HashSet;

/// Prepare a single-cell and a spatial dataset for mapping:
/// canonicalize gene names, drop all-zero genes, intersect the gene
/// sets (optionally restricted to a marker list), and compute the
/// RNA-count based density of the spatial data.
///
/// The shared gene list keeps the single-cell dataset's gene order, so
/// repeated runs see the same column ordering.
pub fn pp_datasets(
    sc_data: &mut ExprDataset,
    sp_data: &mut ExprDataset,
    marker_genes: Option<&[Box<str>]>,
) -> anyhow::Result<Vec<Box<str>>> {
    sc_data.canonical_gene_names();
    sp_data.canonical_gene_names();

    let removed_sc = sc_data.drop_zero_genes()?;
    let removed_sp = sp_data.drop_zero_genes()?;
    info!(
        "removed all-zero genes: {} single-cell, {} spatial",
        removed_sc, removed_sp
    );

    let markers: Option<HashSet<Box<str>>> = marker_genes.map(|genes| {
        genes
            .iter()
            .map(|g| g.to_lowercase().into_boxed_str())
            .collect()
    });

    let sp_genes: HashSet<&str> = sp_data.gene_names.iter().map(|g| g.as_ref()).collect();

    let shared: Vec<Box<str>> = sc_data
        .gene_names
        .iter()
        .filter(|g| sp_genes.contains(g.as_ref()))
        .filter(|g| markers.as_ref().map_or(true, |m| m.contains(g.as_ref())))
        .cloned()
        .collect();

    anyhow::ensure!(
        !shared.is_empty(),
        "no genes shared between the two datasets"
    );
    info!("{} shared training genes", shared.len());

    sc_data.training_genes = Some(shared.clone());
    sp_data.training_genes = Some(shared.clone());

    let counts_per_spot = sp_data.matrix.row_sums();
    let total = counts_per_spot.sum();
    anyhow::ensure!(total > 0., "spatial dataset has no counts");
    sp_data.density = Some(counts_per_spot / total);
    info!("rna-count based density attached to the spatial dataset");

    Ok(shared)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr_data::ExprMatrix;
    use approx::assert_abs_diff_eq;

    fn dataset(names: &[&str], x: Mat) -> ExprDataset {
        let n_obs = x.nrows();
        ExprDataset::new(
            ExprMatrix::Dense(x),
            (0..n_obs).map(|i| format!("obs{}", i).into_boxed_str()).collect(),
            names.iter().map(|g| (*g).into()).collect(),
        )
        .unwrap()
    }

    #[test]
    fn shared_genes_follow_single_cell_order() -> anyhow::Result<()> {
        let mut sc_data = dataset(
            &["B", "a", "C", "d"],
            Mat::from_row_slice(2, 4, &[1., 2., 3., 0., 4., 5., 6., 0.]),
        );
        // gene d is absent, gene c present under another case
        let mut sp_data = dataset(
            &["c", "A", "b"],
            Mat::from_row_slice(2, 3, &[1., 1., 1., 2., 2., 2.]),
        );

        let shared = pp_datasets(&mut sc_data, &mut sp_data, None)?;
        let shared: Vec<&str> = shared.iter().map(|g| g.as_ref()).collect();
        assert_eq!(shared, vec!["b", "a", "c"]);

        assert_eq!(sc_data.training_genes, sp_data.training_genes);
        Ok(())
    }

    #[test]
    fn marker_list_restricts_the_intersection() -> anyhow::Result<()> {
        let mut sc_data = dataset(
            &["a", "b", "c"],
            Mat::from_row_slice(1, 3, &[1., 2., 3.]),
        );
        let mut sp_data = dataset(
            &["a", "b", "c"],
            Mat::from_row_slice(1, 3, &[1., 2., 3.]),
        );

        let markers: Vec<Box<str>> = vec!["B".into(), "c".into()];
        let shared = pp_datasets(&mut sc_data, &mut sp_data, Some(&markers))?;
        let shared: Vec<&str> = shared.iter().map(|g| g.as_ref()).collect();
        assert_eq!(shared, vec!["b", "c"]);
        Ok(())
    }

    #[test]
    fn spatial_density_sums_to_one() -> anyhow::Result<()> {
        let mut sc_data = dataset(&["a", "b"], Mat::from_row_slice(1, 2, &[1., 1.]));
        let mut sp_data = dataset(
            &["a", "b"],
            Mat::from_row_slice(2, 2, &[3., 1., 2., 2.]),
        );

        pp_datasets(&mut sc_data, &mut sp_data, None)?;
        let density = sp_data.density.as_ref().unwrap();
        assert_abs_diff_eq!(density.sum(), 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(density[0], 0.5, epsilon = 1e-6);
        Ok(())
    }

    #[test]
    fn disjoint_gene_sets_are_rejected() {
        let mut sc_data = dataset(&["a"], Mat::from_row_slice(1, 1, &[1.]));
        let mut sp_data = dataset(&["b"], Mat::from_row_slice(1, 1, &[1.]));
        assert!(pp_datasets(&mut sc_data, &mut sp_data, None).is_err());
    }
}
