pub mod mapper_config;
pub mod mapper_loss;
pub mod mapper_optimizer;

pub use candle_core;
pub use candle_nn;
