use crate::expr_data::{ExprDataset, ExprMatrix};
use crate::map_common::*;
use std::collections::HashMap;

/// How cluster-level expression is formed from member cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOp {
    Sum,
    Mean,
}

/// Collapse a dataset to one row per cluster under the named label.
///
/// Clusters are ordered by descending size (ties by name) and the
/// normalized cluster sizes become the dataset density, so downstream
/// reporting can match source and target mass.
pub fn collapse_to_clusters(
    data: &ExprDataset,
    cluster_label: &str,
    op: AggregateOp,
) -> anyhow::Result<ExprDataset> {
    let labels = data.obs_labels.get(cluster_label).ok_or_else(|| {
        anyhow::anyhow!("label '{}' is not annotated on the dataset", cluster_label)
    })?;

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for label in labels.iter() {
        *counts.entry(label.as_ref()).or_insert(0) += 1;
    }

    let mut cluster_names: Vec<&str> = counts.keys().copied().collect();
    cluster_names.sort_by_key(|name| (usize::MAX - counts[name], *name));

    let cluster_index: HashMap<&str, usize> = cluster_names
        .iter()
        .enumerate()
        .map(|(k, &name)| (name, k))
        .collect();

    let membership: Vec<usize> = labels
        .iter()
        .map(|label| cluster_index[label.as_ref()])
        .collect();

    let collapsed =
        data.matrix
            .aggregate_rows(&membership, cluster_names.len(), op == AggregateOp::Mean)?;

    let total = labels.len() as f32;
    let cluster_density = DVec::from_iterator(
        cluster_names.len(),
        cluster_names.iter().map(|&name| counts[name] as f32 / total),
    );

    info!(
        "collapsed {} observations into {} '{}' clusters",
        data.n_obs(),
        cluster_names.len(),
        cluster_label
    );

    let mut ret = ExprDataset::new(
        ExprMatrix::Dense(collapsed),
        cluster_names.iter().map(|&name| name.into()).collect(),
        data.gene_names.clone(),
    )?;
    ret.training_genes = data.training_genes.clone();
    ret.density = Some(cluster_density);
    Ok(ret)
}
