use crate::cluster::*;
use crate::density::*;
use crate::expr_data::ExprDataset;
use crate::map_common::*;
use crate::map_input::*;
use crate::map_result::MapResult;

use clap::{Args, ValueEnum};
use mapper_util::mapper_config::{MapHyperParams, MapTrainConfig};
use mapper_util::mapper_optimizer::{MapInit, Mapper};

#[derive(ValueEnum, Clone, Debug, PartialEq)]
#[clap(rename_all = "lowercase")]
pub enum ComputeDevice {
    Cpu,
    Cuda,
    Metal,
}

#[derive(ValueEnum, Clone, Debug, PartialEq)]
#[clap(rename_all = "lowercase")]
pub enum MapMode {
    /// map every cell independently
    Cells,
    /// collapse cells to cluster centroids first
    Clusters,
}

#[derive(ValueEnum, Clone, Debug, PartialEq)]
#[clap(rename_all = "kebab-case")]
pub enum DensityPriorKind {
    None,
    Uniform,
    RnaCount,
    File,
}

#[derive(Args, Debug, Clone)]
pub struct MapArgs {
    /// single-cell expression table (`.tsv`, `.csv`, optionally `.gz`);
    /// rows are cells, columns are genes
    #[arg(long, short = 'c', required = true)]
    sc_data_file: Box<str>,

    /// spatial expression table, same layout with spots as rows
    #[arg(long, short = 's', required = true)]
    sp_data_file: Box<str>,

    /// output header; writes `{out}.mapping.tsv.gz`,
    /// `{out}.train_scores.tsv.gz` and `{out}.history.tsv.gz`
    #[arg(long, short, required = true)]
    out: Box<str>,

    /// restrict training to these marker genes (one per line)
    #[arg(long, short = 'g')]
    marker_gene_file: Option<Box<str>>,

    /// mapping granularity
    #[arg(long, value_enum, default_value = "cells")]
    mode: MapMode,

    /// `cell <tab> cluster` assignments, required in cluster mode
    #[arg(long)]
    cluster_file: Option<Box<str>>,

    /// average member cells per cluster instead of summing
    #[arg(long)]
    cluster_average: bool,

    /// weight of the density (KL) term
    #[arg(long, default_value_t = 0.)]
    lambda_d: f64,

    /// weight of the gene-voxel similarity term
    #[arg(long, default_value_t = 1.)]
    lambda_g1: f64,

    /// weight of the voxel-gene similarity term
    #[arg(long, default_value_t = 0.)]
    lambda_g2: f64,

    /// weight of the entropy regularizer
    #[arg(long, default_value_t = 0.)]
    lambda_r: f64,

    /// target density over spots
    #[arg(long, value_enum, default_value = "none")]
    density_prior: DensityPriorKind,

    /// one density value per spot (with `--density-prior file`)
    #[arg(long)]
    density_file: Option<Box<str>>,

    /// resume from a previously written mapping matrix
    #[arg(long)]
    resume_file: Option<Box<str>>,

    /// random seed for the mapping initialization
    #[arg(long)]
    seed: Option<u64>,

    #[arg(long, default_value_t = 0.1)]
    learning_rate: f32,

    /// # training epochs
    #[arg(long, short = 'i', default_value_t = 1000)]
    epochs: usize,

    /// log the loss every `print-each` epochs
    #[arg(long, default_value_t = 100)]
    print_each: usize,

    /// candle device
    #[arg(long, value_enum, default_value = "cpu")]
    device: ComputeDevice,

    /// show a progress bar over epochs
    #[arg(long)]
    progress: bool,

    /// verbosity
    #[arg(long, short)]
    verbose: bool,
}

pub fn run_map(args: &MapArgs) -> anyhow::Result<()> {
    // 1. read and prepare the two datasets
    let mut sc_data = read_expr_dataset(&args.sc_data_file)?;
    let mut sp_data = read_expr_dataset(&args.sp_data_file)?;

    let marker_genes = args
        .marker_gene_file
        .as_deref()
        .map(read_gene_list)
        .transpose()?;

    crate::preprocess::pp_datasets(&mut sc_data, &mut sp_data, marker_genes.as_deref())?;

    // 2. optionally collapse cells to clusters
    let sc_data = match args.mode {
        MapMode::Cells => sc_data,
        MapMode::Clusters => {
            let cluster_file = args.cluster_file.as_deref().ok_or_else(|| {
                anyhow::anyhow!("a cluster file must be given in cluster mode")
            })?;
            let assignment = read_obs_labels(cluster_file)?;
            let labels = sc_data
                .obs_names
                .iter()
                .map(|cell| {
                    assignment
                        .get(cell)
                        .cloned()
                        .ok_or_else(|| anyhow::anyhow!("no cluster for cell '{}'", cell))
                })
                .collect::<anyhow::Result<Vec<_>>>()?;

            let mut sc_data = sc_data;
            sc_data.attach_label("cluster", labels)?;
            let op = if args.cluster_average {
                AggregateOp::Mean
            } else {
                AggregateOp::Sum
            };
            collapse_to_clusters(&sc_data, "cluster", op)?
        }
    };

    // 3. density prior, checked against the weights before any epoch
    let prior = match args.density_prior {
        DensityPriorKind::None => DensityPrior::Unset,
        DensityPriorKind::Uniform => DensityPrior::Uniform,
        DensityPriorKind::RnaCount => DensityPrior::RnaCountBased,
        DensityPriorKind::File => {
            let density_file = args.density_file.as_deref().ok_or_else(|| {
                anyhow::anyhow!("`--density-prior file` needs `--density-file`")
            })?;
            DensityPrior::Explicit(read_density_vector(density_file)?)
        }
    };

    if prior != DensityPrior::Unset && args.lambda_d == 0. {
        anyhow::bail!("a density prior was given but lambda_d is 0");
    }

    let cluster_mode = args.mode == MapMode::Clusters;
    let d_v = resolve_density_prior(&prior, &sp_data, cluster_mode)?
        // a defaulted prior with a zero weight would be rejected by the
        // optimizer; it carries no information, so drop it
        .filter(|_| args.lambda_d != 0.);

    let hyper = MapHyperParams {
        lambda_d: args.lambda_d,
        lambda_g1: args.lambda_g1,
        lambda_g2: args.lambda_g2,
        lambda_r: args.lambda_r,
    };

    // 4. assemble tensors and train
    let device = match args.device {
        ComputeDevice::Cpu => Device::Cpu,
        ComputeDevice::Cuda => Device::new_cuda(0)?,
        ComputeDevice::Metal => Device::new_metal(0)?,
    };

    let (s_ng, g_vg, training_genes) = extract_matrices(&sc_data, &sp_data)?;

    let init = match (args.resume_file.as_deref(), args.seed) {
        (Some(resume_file), _) => {
            let prev = read_named_matrix(resume_file)?;
            MapInit::Resume(mat_to_tensor(&prev.values, &device)?)
        }
        (None, Some(seed)) => MapInit::Seeded(seed),
        (None, None) => MapInit::Random,
    };

    info!(
        "begin training: {} cells x {} spots over {} genes",
        sc_data.n_obs(),
        sp_data.n_obs(),
        training_genes.len()
    );

    let mut mapper = Mapper::new(
        mat_to_tensor(&s_ng, &device)?,
        mat_to_tensor(&g_vg, &device)?,
        d_v.as_ref().map(|d| dvec_to_tensor(d, &device)).transpose()?,
        hyper,
        init,
        &device,
    )?;

    let config = MapTrainConfig {
        learning_rate: args.learning_rate,
        num_epochs: args.epochs,
        print_each: args.verbose.then_some(args.print_each),
        show_progress: args.progress,
    };

    let (p_nv, history) = mapper.train(&config)?;

    // 5. package and write the result
    let ret = MapResult::new(
        tensor_to_mat(&p_nv)?,
        &s_ng,
        &g_vg,
        &training_genes,
        sc_data.obs_names.clone(),
        sp_data.obs_names.clone(),
        &sc_data.training_gene_sparsity()?,
        &sp_data.training_gene_sparsity()?,
        history,
    )?;

    ret.write_mapping(&format!("{}.mapping.tsv.gz", args.out))?;
    ret.write_gene_scores(&format!("{}.train_scores.tsv.gz", args.out))?;
    ret.write_history(&format!("{}.history.tsv.gz", args.out))?;

    // cluster mode carries the source-side density (normalized cluster
    // sizes); keep it next to the mapping for downstream reporting
    if let Some(cluster_density) = sc_data.density.as_ref() {
        let lines: Vec<Box<str>> = sc_data
            .obs_names
            .iter()
            .zip(cluster_density.iter())
            .map(|(name, d)| format!("{}\t{:.6}", name, d).into_boxed_str())
            .collect();
        crate::common_io::write_lines(&lines, &format!("{}.cluster_density.tsv.gz", args.out))?;
    }
    info!("done; results written under {}.*", args.out);

    Ok(())
}

/// Densify both datasets over their (identical) training gene lists.
/// Fails fast on missing annotations, mismatched lists, or an all-zero
/// gene column in either matrix.
pub fn extract_matrices(
    sc_data: &ExprDataset,
    sp_data: &ExprDataset,
) -> anyhow::Result<(Mat, Mat, Vec<Box<str>>)> {
    let sc_genes = sc_data
        .training_genes
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("single-cell data has no training genes; run preprocessing"))?;
    let sp_genes = sp_data
        .training_genes
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("spatial data has no training genes; run preprocessing"))?;

    anyhow::ensure!(
        sc_genes == sp_genes,
        "training gene lists differ between the two datasets"
    );

    let s_ng = sc_data.dense_training_matrix()?;
    let g_vg = sp_data.dense_training_matrix()?;

    for (j, gene) in sc_genes.iter().enumerate() {
        anyhow::ensure!(
            s_ng.column(j).iter().any(|&x| x != 0.),
            "gene '{}' is all zero in the single-cell data",
            gene
        );
        anyhow::ensure!(
            g_vg.column(j).iter().any(|&x| x != 0.),
            "gene '{}' is all zero in the spatial data",
            gene
        );
    }

    Ok((s_ng, g_vg, sc_genes.clone()))
}
