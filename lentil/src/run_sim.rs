use crate::common_io::write_lines;
use crate::map_common::*;
use crate::map_input::write_named_matrix;

use clap::Args;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Gamma};

#[derive(Args, Debug, Clone)]
pub struct SimArgs {
    /// # single cells
    #[arg(long, default_value_t = 200)]
    n_cells: usize,

    /// # genes
    #[arg(long, default_value_t = 50)]
    n_genes: usize,

    /// # spatial spots
    #[arg(long, default_value_t = 40)]
    n_spots: usize,

    /// # cell clusters with distinct gene programs
    #[arg(long, default_value_t = 5)]
    n_clusters: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// output header; writes `{out}.sc.tsv.gz`, `{out}.sp.tsv.gz` and
    /// `{out}.clusters.tsv`
    #[arg(long, short, required = true)]
    out: Box<str>,
}

/// Simulate a paired single-cell and spatial dataset with shared gene
/// programs, so the mapping pipeline can be exercised end to end.
///
/// Each cluster over-expresses its own block of genes; each spot draws
/// its expression from one dominant cluster plus a diffuse background.
pub fn run_sim(args: &SimArgs) -> anyhow::Result<()> {
    anyhow::ensure!(args.n_clusters > 0, "need at least one cluster");
    anyhow::ensure!(
        args.n_genes >= args.n_clusters,
        "need at least one gene per cluster"
    );

    let mut rng = StdRng::seed_from_u64(args.seed);
    let gamma = Gamma::new(2_f32, 0.5_f32)?;

    let kk = args.n_clusters;
    let block = args.n_genes / kk;

    // cluster-by-gene programs: elevated within the cluster's block
    let program_kg = Mat::from_fn(kk, args.n_genes, |k, g| {
        if g / block.max(1) == k {
            5.
        } else {
            0.5
        }
    });

    let cell_cluster: Vec<usize> = (0..args.n_cells).map(|i| i % kk).collect();
    let sc_xg = Mat::from_fn(args.n_cells, args.n_genes, |i, g| {
        program_kg[(cell_cluster[i], g)] * gamma.sample(&mut rng)
    });

    let spot_cluster: Vec<usize> = (0..args.n_spots).map(|j| j % kk).collect();
    let background_g = program_kg.row_mean();
    let sp_xg = Mat::from_fn(args.n_spots, args.n_genes, |j, g| {
        let rate = 0.7 * program_kg[(spot_cluster[j], g)] + 0.3 * background_g[g];
        rate * gamma.sample(&mut rng)
    });

    let gene_names: Vec<Box<str>> = (0..args.n_genes)
        .map(|g| format!("gene{}", g).into_boxed_str())
        .collect();
    let cell_names: Vec<Box<str>> = (0..args.n_cells)
        .map(|i| format!("cell{}", i).into_boxed_str())
        .collect();
    let spot_names: Vec<Box<str>> = (0..args.n_spots)
        .map(|j| format!("spot{}", j).into_boxed_str())
        .collect();

    write_named_matrix(
        &sc_xg,
        &cell_names,
        &gene_names,
        &format!("{}.sc.tsv.gz", args.out),
    )?;
    write_named_matrix(
        &sp_xg,
        &spot_names,
        &gene_names,
        &format!("{}.sp.tsv.gz", args.out),
    )?;

    let cluster_lines: Vec<Box<str>> = cell_names
        .iter()
        .zip(cell_cluster.iter())
        .map(|(cell, k)| format!("{}\tclust{}", cell, k).into_boxed_str())
        .collect();
    write_lines(&cluster_lines, &format!("{}.clusters.tsv", args.out))?;

    info!(
        "simulated {} cells, {} spots, {} genes under {}.*",
        args.n_cells, args.n_spots, args.n_genes, args.out
    );
    Ok(())
}
