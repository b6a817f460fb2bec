use crate::common_io::*;
use crate::expr_data::{ExprDataset, ExprMatrix};
use crate::map_common::*;

use rayon::prelude::*;
use std::collections::HashMap;

/// A dense matrix with row and column names, read from a delimited
/// table whose header carries the column names and whose first field
/// on each line is the row name.
pub struct NamedMat {
    pub values: Mat,
    pub row_names: Vec<Box<str>>,
    pub col_names: Vec<Box<str>>,
}

pub fn read_named_matrix(input_file: &str) -> anyhow::Result<NamedMat> {
    let lines = read_lines(input_file)?;
    anyhow::ensure!(!lines.is_empty(), "empty table: {}", input_file);

    let col_names: Vec<Box<str>> = lines[0]
        .split(['\t', ','])
        .skip(1)
        .map(|x| x.trim().to_owned().into_boxed_str())
        .collect();
    let ncol = col_names.len();
    anyhow::ensure!(ncol > 0, "no columns in the header: {}", input_file);

    let rows: Vec<(Box<str>, Vec<f32>)> = lines[1..]
        .par_iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| -> anyhow::Result<(Box<str>, Vec<f32>)> {
            let mut words = line.split(['\t', ',']);
            let name = words
                .next()
                .ok_or_else(|| anyhow::anyhow!("empty line"))?
                .trim()
                .to_owned()
                .into_boxed_str();
            let values = words
                .map(|w| {
                    w.trim()
                        .parse::<f32>()
                        .map_err(|_| anyhow::anyhow!("bad number '{}' in row '{}'", w, name))
                })
                .collect::<anyhow::Result<Vec<f32>>>()?;
            anyhow::ensure!(
                values.len() == ncol,
                "row '{}' has {} values, expected {}",
                name,
                values.len(),
                ncol
            );
            Ok((name, values))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let row_names: Vec<Box<str>> = rows.iter().map(|(name, _)| name.clone()).collect();
    let values = Mat::from_row_iterator(
        row_names.len(),
        ncol,
        rows.into_iter().flat_map(|(_, values)| values),
    );

    Ok(NamedMat {
        values,
        row_names,
        col_names,
    })
}

/// Read an observation-by-gene expression table into a dataset.
pub fn read_expr_dataset(input_file: &str) -> anyhow::Result<ExprDataset> {
    let named = read_named_matrix(input_file)?;
    info!(
        "read {}: {} observations x {} genes",
        input_file,
        named.row_names.len(),
        named.col_names.len()
    );
    ExprDataset::new(
        ExprMatrix::Dense(named.values),
        named.row_names,
        named.col_names,
    )
}

/// Write a dense matrix as a delimited table with row and column names
/// (the inverse of `read_named_matrix`).
pub fn write_named_matrix(
    x: &Mat,
    row_names: &[Box<str>],
    col_names: &[Box<str>],
    output_file: &str,
) -> anyhow::Result<()> {
    use std::io::Write;

    anyhow::ensure!(row_names.len() == x.nrows(), "row name mismatch");
    anyhow::ensure!(col_names.len() == x.ncols(), "column name mismatch");

    let mut buf = open_buf_writer(output_file)?;
    writeln!(
        buf,
        "\t{}",
        col_names
            .iter()
            .map(|name| name.as_ref())
            .collect::<Vec<_>>()
            .join("\t")
    )?;
    for (i, name) in row_names.iter().enumerate() {
        let row: Vec<String> = x.row(i).iter().map(|v| format!("{}", v)).collect();
        writeln!(buf, "{}\t{}", name, row.join("\t"))?;
    }
    buf.flush()?;
    Ok(())
}

/// Read `observation <tab> label` pairs.
pub fn read_obs_labels(input_file: &str) -> anyhow::Result<HashMap<Box<str>, Box<str>>> {
    let mut ret = HashMap::new();
    for words in read_lines_of_words(input_file)? {
        anyhow::ensure!(
            words.len() >= 2,
            "expected `observation <tab> label` lines in {}",
            input_file
        );
        ret.insert(words[0].clone(), words[1].clone());
    }
    Ok(ret)
}

/// Read one gene name per line (only the first word is used).
pub fn read_gene_list(input_file: &str) -> anyhow::Result<Vec<Box<str>>> {
    Ok(read_lines_of_words(input_file)?
        .into_iter()
        .filter_map(|words| words.first().cloned())
        .filter(|gene| !gene.is_empty())
        .collect())
}

/// Read one density value per line.
pub fn read_density_vector(input_file: &str) -> anyhow::Result<DVec> {
    let values = read_lines(input_file)?
        .iter()
        .map(|line| {
            line.trim()
                .parse::<f32>()
                .map_err(|_| anyhow::anyhow!("bad density value '{}'", line))
        })
        .collect::<anyhow::Result<Vec<f32>>>()?;
    Ok(DVec::from_vec(values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn named_matrix_round_trip_through_gzip() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let file = dir.path().join("expr.tsv.gz");
        let file = file.to_str().unwrap();

        let lines: Vec<Box<str>> = vec![
            "\tg1\tg2\tg3".into(),
            "c1\t1\t0\t2.5".into(),
            "c2\t0\t3\t0".into(),
        ];
        write_lines(&lines, file)?;

        let data = read_expr_dataset(file)?;
        assert_eq!(data.n_obs(), 2);
        assert_eq!(data.n_genes(), 3);
        assert_eq!(data.obs_names[1].as_ref(), "c2");
        assert_eq!(data.gene_names[2].as_ref(), "g3");
        if let ExprMatrix::Dense(x) = &data.matrix {
            assert_abs_diff_eq!(x[(0, 2)], 2.5);
            assert_abs_diff_eq!(x[(1, 1)], 3.0);
        }
        Ok(())
    }

    #[test]
    fn ragged_rows_are_rejected() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let file = dir.path().join("bad.tsv");
        let file = file.to_str().unwrap();

        let lines: Vec<Box<str>> = vec!["\tg1\tg2".into(), "c1\t1".into()];
        write_lines(&lines, file)?;
        assert!(read_expr_dataset(file).is_err());
        Ok(())
    }
}
