use crate::common_io::open_buf_writer;
use crate::map_common::*;

use mapper_util::mapper_loss::COSINE_EPS;
use mapper_util::mapper_optimizer::MapLossTerms;
use std::io::Write;

/// Per-gene diagnostics: how well the mapped expression reproduces the
/// observed spatial expression, and how sparse the gene is in each
/// dataset.
pub struct GeneScore {
    pub gene: Box<str>,
    pub train_score: f32,
    pub sparsity_sc: f32,
    pub sparsity_sp: f32,
}

impl GeneScore {
    pub fn sparsity_diff(&self) -> f32 {
        self.sparsity_sp - self.sparsity_sc
    }
}

/// Everything a finished mapping run produces: the row-stochastic
/// mapping matrix with its labels, the gene score table, and the
/// training history.
pub struct MapResult {
    pub mapping: Mat,
    pub cell_names: Vec<Box<str>>,
    pub spot_names: Vec<Box<str>>,
    pub gene_scores: Vec<GeneScore>,
    pub history: Vec<MapLossTerms>,
}

impl MapResult {
    /// Assemble the result from a trained mapping.
    ///
    /// The score of each training gene is the cosine similarity between
    /// its observed spatial profile (column of `g_vg`) and the profile
    /// predicted by mapping the source expression, `mappingᵀ · s_ng`.
    /// Scores are sorted in descending order, as in the report tables.
    pub fn new(
        mapping: Mat,
        s_ng: &Mat,
        g_vg: &Mat,
        training_genes: &[Box<str>],
        cell_names: Vec<Box<str>>,
        spot_names: Vec<Box<str>>,
        sparsity_sc: &DVec,
        sparsity_sp: &DVec,
        history: Vec<MapLossTerms>,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(
            training_genes.len() == g_vg.ncols(),
            "{} gene names for {} columns",
            training_genes.len(),
            g_vg.ncols()
        );

        let g_pred_vg = mapping.transpose() * s_ng;

        let mut gene_scores: Vec<GeneScore> = training_genes
            .iter()
            .enumerate()
            .map(|(j, gene)| {
                let observed = g_vg.column(j);
                let predicted = g_pred_vg.column(j);
                let denom = (observed.norm() * predicted.norm()).max(COSINE_EPS as f32);
                GeneScore {
                    gene: gene.clone(),
                    train_score: observed.dot(&predicted) / denom,
                    sparsity_sc: sparsity_sc[j],
                    sparsity_sp: sparsity_sp[j],
                }
            })
            .collect();

        gene_scores.sort_by(|a, b| {
            b.train_score
                .partial_cmp(&a.train_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(Self {
            mapping,
            cell_names,
            spot_names,
            gene_scores,
            history,
        })
    }

    /// cell x spot probability table, spot names in the header
    pub fn write_mapping(&self, output_file: &str) -> anyhow::Result<()> {
        let mut buf = open_buf_writer(output_file)?;

        writeln!(
            buf,
            "\t{}",
            self.spot_names
                .iter()
                .map(|x| x.as_ref())
                .collect::<Vec<_>>()
                .join("\t")
        )?;

        for (i, cell) in self.cell_names.iter().enumerate() {
            let row: Vec<String> = self
                .mapping
                .row(i)
                .iter()
                .map(|x| format!("{:.6e}", x))
                .collect();
            writeln!(buf, "{}\t{}", cell, row.join("\t"))?;
        }
        buf.flush()?;
        Ok(())
    }

    pub fn write_gene_scores(&self, output_file: &str) -> anyhow::Result<()> {
        let mut buf = open_buf_writer(output_file)?;
        writeln!(buf, "gene\ttrain_score\tsparsity_sc\tsparsity_sp\tsparsity_diff")?;
        for score in self.gene_scores.iter() {
            writeln!(
                buf,
                "{}\t{:.6}\t{:.6}\t{:.6}\t{:.6}",
                score.gene,
                score.train_score,
                score.sparsity_sc,
                score.sparsity_sp,
                score.sparsity_diff()
            )?;
        }
        buf.flush()?;
        Ok(())
    }

    pub fn write_history(&self, output_file: &str) -> anyhow::Result<()> {
        let mut buf = open_buf_writer(output_file)?;
        writeln!(
            buf,
            "epoch\ttotal\tgene_voxel_cos\tvoxel_gene_cos\tdensity_kl\tneg_entropy"
        )?;
        for (epoch, terms) in self.history.iter().enumerate() {
            writeln!(
                buf,
                "{}\t{:.6}\t{:.6}\t{:.6}\t{:.6}\t{:.6}",
                epoch + 1,
                terms.total,
                terms.gene_voxel_cos,
                terms.voxel_gene_cos,
                terms.density_kl,
                terms.neg_entropy
            )?;
        }
        buf.flush()?;
        Ok(())
    }
}
