use crate::map_common::*;
use nalgebra_sparse::CooMatrix;
use std::collections::HashMap;

/// Expression matrix storage (observation x gene). The tagged variants
/// replace run-time matrix-type dispatch; every operation is defined
/// for all three representations.
pub enum ExprMatrix {
    Dense(Mat),
    Csc(CscMat),
    Csr(CsrMat),
}

impl ExprMatrix {
    pub fn nrows(&self) -> usize {
        match self {
            ExprMatrix::Dense(x) => x.nrows(),
            ExprMatrix::Csc(x) => x.nrows(),
            ExprMatrix::Csr(x) => x.nrows(),
        }
    }

    pub fn ncols(&self) -> usize {
        match self {
            ExprMatrix::Dense(x) => x.ncols(),
            ExprMatrix::Csc(x) => x.ncols(),
            ExprMatrix::Csr(x) => x.ncols(),
        }
    }

    fn visit_nonzero(&self, mut visit: impl FnMut(usize, usize, f32)) {
        match self {
            ExprMatrix::Dense(x) => {
                for j in 0..x.ncols() {
                    for i in 0..x.nrows() {
                        let x_ij = x[(i, j)];
                        if x_ij != 0. {
                            visit(i, j, x_ij);
                        }
                    }
                }
            }
            ExprMatrix::Csc(x) => {
                for (i, j, &x_ij) in x.triplet_iter() {
                    visit(i, j, x_ij);
                }
            }
            ExprMatrix::Csr(x) => {
                for (i, j, &x_ij) in x.triplet_iter() {
                    visit(i, j, x_ij);
                }
            }
        }
    }

    /// total expression per observation
    pub fn row_sums(&self) -> DVec {
        let mut ret = DVec::zeros(self.nrows());
        self.visit_nonzero(|i, _, x_ij| ret[i] += x_ij);
        ret
    }

    /// number of nonzero entries per gene column
    pub fn column_nnz(&self) -> Vec<usize> {
        let mut ret = vec![0; self.ncols()];
        self.visit_nonzero(|_, j, _| ret[j] += 1);
        ret
    }

    /// fraction of zero entries in each of the selected columns
    pub fn column_sparsity(&self, columns: &[usize]) -> DVec {
        let nnz = self.column_nnz();
        let nn = self.nrows() as f32;
        DVec::from_iterator(
            columns.len(),
            columns.iter().map(|&j| 1. - nnz[j] as f32 / nn),
        )
    }

    /// Densify the selected columns, in the given order.
    pub fn dense_columns(&self, columns: &[usize]) -> Mat {
        let remap: HashMap<usize, usize> =
            columns.iter().enumerate().map(|(new, &old)| (old, new)).collect();

        let mut ret = Mat::zeros(self.nrows(), columns.len());
        self.visit_nonzero(|i, j, x_ij| {
            if let Some(&jj) = remap.get(&j) {
                ret[(i, jj)] = x_ij;
            }
        });
        ret
    }

    /// Keep the selected columns, preserving the storage representation.
    pub fn select_columns(&self, columns: &[usize]) -> anyhow::Result<ExprMatrix> {
        if let ExprMatrix::Dense(x) = self {
            return Ok(ExprMatrix::Dense(x.select_columns(columns.iter())));
        }

        let remap: HashMap<usize, usize> =
            columns.iter().enumerate().map(|(new, &old)| (old, new)).collect();

        let mut coo = CooMatrix::new(self.nrows(), columns.len());
        self.visit_nonzero(|i, j, x_ij| {
            if let Some(&jj) = remap.get(&j) {
                coo.push(i, jj, x_ij);
            }
        });

        Ok(match self {
            ExprMatrix::Csc(_) => ExprMatrix::Csc(CscMat::from(&coo)),
            ExprMatrix::Csr(_) => ExprMatrix::Csr(CsrMat::from(&coo)),
            ExprMatrix::Dense(_) => unreachable!("handled above"),
        })
    }

    /// Aggregate rows into `num_groups` groups (densifying).
    ///
    /// * `membership` - group index per row
    pub fn aggregate_rows(
        &self,
        membership: &[usize],
        num_groups: usize,
        average: bool,
    ) -> anyhow::Result<Mat> {
        anyhow::ensure!(
            membership.len() == self.nrows(),
            "membership length {} != {} rows",
            membership.len(),
            self.nrows()
        );

        let mut ret = Mat::zeros(num_groups, self.ncols());
        self.visit_nonzero(|i, j, x_ij| ret[(membership[i], j)] += x_ij);

        if average {
            let mut sizes = vec![0_f32; num_groups];
            for &k in membership {
                sizes[k] += 1.;
            }
            for (k, &size) in sizes.iter().enumerate() {
                if size > 0. {
                    ret.row_mut(k).scale_mut(1. / size);
                }
            }
        }
        Ok(ret)
    }
}

/// A labeled expression dataset: one row per observation (cell, cluster
/// or spatial spot), one column per gene, plus the annotations the
/// mapping pipeline attaches along the way.
pub struct ExprDataset {
    pub matrix: ExprMatrix,
    pub obs_names: Vec<Box<str>>,
    pub gene_names: Vec<Box<str>>,
    /// named categorical annotations per observation (e.g. cluster ids)
    pub obs_labels: HashMap<Box<str>, Vec<Box<str>>>,
    /// shared gene list, set by preprocessing
    pub training_genes: Option<Vec<Box<str>>>,
    /// per-observation density: RNA-count based for spatial data,
    /// normalized cluster size after aggregation
    pub density: Option<DVec>,
}

impl ExprDataset {
    pub fn new(
        matrix: ExprMatrix,
        obs_names: Vec<Box<str>>,
        gene_names: Vec<Box<str>>,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(
            obs_names.len() == matrix.nrows(),
            "{} observation names for {} rows",
            obs_names.len(),
            matrix.nrows()
        );
        anyhow::ensure!(
            gene_names.len() == matrix.ncols(),
            "{} gene names for {} columns",
            gene_names.len(),
            matrix.ncols()
        );
        Ok(Self {
            matrix,
            obs_names,
            gene_names,
            obs_labels: HashMap::new(),
            training_genes: None,
            density: None,
        })
    }

    pub fn n_obs(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn n_genes(&self) -> usize {
        self.matrix.ncols()
    }

    /// Lower-case all gene names and de-duplicate repeats by appending
    /// `.1`, `.2`, ... to later occurrences.
    pub fn canonical_gene_names(&mut self) {
        use std::collections::hash_map::Entry;

        let mut seen: HashMap<Box<str>, usize> = HashMap::new();
        for name in self.gene_names.iter_mut() {
            let lower = name.to_lowercase();
            let ret = match seen.entry(lower.clone().into_boxed_str()) {
                Entry::Occupied(mut entry) => {
                    let count = entry.get_mut();
                    *count += 1;
                    format!("{}.{}", lower, count)
                }
                Entry::Vacant(entry) => {
                    entry.insert(0);
                    lower
                }
            };
            *name = ret.into_boxed_str();
        }
    }

    /// Remove genes with no observed expression. Returns the number of
    /// genes removed.
    pub fn drop_zero_genes(&mut self) -> anyhow::Result<usize> {
        let nnz = self.matrix.column_nnz();
        let keep: Vec<usize> = (0..self.n_genes()).filter(|&j| nnz[j] > 0).collect();
        let removed = self.n_genes() - keep.len();

        if removed > 0 {
            self.matrix = self.matrix.select_columns(&keep)?;
            self.gene_names = keep
                .iter()
                .map(|&j| self.gene_names[j].clone())
                .collect();
        }
        Ok(removed)
    }

    pub fn attach_label(
        &mut self,
        name: &str,
        values: Vec<Box<str>>,
    ) -> anyhow::Result<()> {
        anyhow::ensure!(
            values.len() == self.n_obs(),
            "{} label values for {} observations",
            values.len(),
            self.n_obs()
        );
        self.obs_labels.insert(name.into(), values);
        Ok(())
    }

    /// Column positions of the given genes; every gene must be present.
    pub fn gene_positions(&self, genes: &[Box<str>]) -> anyhow::Result<Vec<usize>> {
        let index: HashMap<&str, usize> = self
            .gene_names
            .iter()
            .enumerate()
            .map(|(j, g)| (g.as_ref(), j))
            .collect();

        genes
            .iter()
            .map(|g| {
                index
                    .get(g.as_ref())
                    .copied()
                    .ok_or_else(|| anyhow::anyhow!("gene '{}' not in dataset", g))
            })
            .collect()
    }

    /// Densify this dataset restricted to its training genes.
    pub fn dense_training_matrix(&self) -> anyhow::Result<Mat> {
        let genes = self
            .training_genes
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("no training genes; run preprocessing first"))?;
        Ok(self.matrix.dense_columns(&self.gene_positions(genes)?))
    }

    /// Fraction of zero entries per training gene.
    pub fn training_gene_sparsity(&self) -> anyhow::Result<DVec> {
        let genes = self
            .training_genes
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("no training genes; run preprocessing first"))?;
        Ok(self.matrix.column_sparsity(&self.gene_positions(genes)?))
    }
}
