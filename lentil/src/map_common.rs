#![allow(dead_code)]

pub use log::info;

pub type Mat = nalgebra::DMatrix<f32>;
pub type DVec = nalgebra::DVector<f32>;
pub type CscMat = nalgebra_sparse::CscMatrix<f32>;
pub type CsrMat = nalgebra_sparse::CsrMatrix<f32>;

pub use mapper_util::candle_core::{Device, Tensor};

/// nalgebra stores column-major, candle expects row-major
pub fn mat_to_tensor(x: &Mat, dev: &Device) -> anyhow::Result<Tensor> {
    let data: Vec<f32> = x.transpose().as_slice().to_vec();
    Ok(Tensor::from_vec(data, (x.nrows(), x.ncols()), dev)?)
}

pub fn tensor_to_mat(x_nm: &Tensor) -> anyhow::Result<Mat> {
    let (nrow, ncol) = x_nm.dims2()?;
    let rows: Vec<Vec<f32>> = x_nm.to_vec2()?;
    Ok(Mat::from_row_iterator(
        nrow,
        ncol,
        rows.into_iter().flatten(),
    ))
}

pub fn dvec_to_tensor(x_n: &DVec, dev: &Device) -> anyhow::Result<Tensor> {
    Ok(Tensor::from_vec(
        x_n.as_slice().to_vec(),
        x_n.len(),
        dev,
    )?)
}
