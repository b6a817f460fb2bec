use approx::assert_abs_diff_eq;

use mapper_util::candle_core;
use mapper_util::candle_core::{Device, Tensor};
use mapper_util::mapper_config::{MapHyperParams, MapTrainConfig};
use mapper_util::mapper_optimizer::{MapInit, Mapper};

fn identity_2x2(dev: &Device) -> (Tensor, Tensor) {
    let s = Tensor::new(&[[1_f32, 0.], [0., 1.]], dev).unwrap();
    let g = Tensor::new(&[[1_f32, 0.], [0., 1.]], dev).unwrap();
    (s, g)
}

fn uniform_density(n_voxels: usize, dev: &Device) -> Tensor {
    let d = vec![1_f32 / n_voxels as f32; n_voxels];
    Tensor::from_vec(d, n_voxels, dev).unwrap()
}

#[test]
fn probabilities_are_row_stochastic() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let s = Tensor::rand(0_f32, 1_f32, (5, 4), &dev)?;
    let g = Tensor::rand(0_f32, 1_f32, (3, 4), &dev)?;

    let mapper = Mapper::new(
        s,
        g,
        None,
        MapHyperParams::default(),
        MapInit::Seeded(42),
        &dev,
    )?;

    let p = mapper.probabilities()?.to_vec2::<f32>()?;
    for row in p {
        let total: f32 = row.iter().sum();
        assert_abs_diff_eq!(total, 1.0, epsilon = 1e-5);
        for x in row {
            assert!((0.0..=1.0).contains(&x));
        }
    }
    Ok(())
}

#[test]
fn loss_is_invariant_to_rowwise_shift() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let s = Tensor::rand(0_f32, 1_f32, (4, 6), &dev)?;
    let g = Tensor::rand(0_f32, 1_f32, (3, 6), &dev)?;
    let d = uniform_density(3, &dev);

    let hyper = MapHyperParams {
        lambda_d: 0.5,
        lambda_g1: 1.,
        lambda_g2: 0.3,
        lambda_r: 0.1,
    };

    let m0 = Tensor::rand(-1_f32, 1_f32, (4, 3), &dev)?;
    let shift = Tensor::new(&[[0.7_f32], [-1.3], [2.0], [0.0]], &dev)?;
    let m1 = m0.broadcast_add(&shift)?;

    let mapper0 = Mapper::new(
        s.clone(),
        g.clone(),
        Some(d.clone()),
        hyper,
        MapInit::Resume(m0),
        &dev,
    )?;
    let mapper1 = Mapper::new(s, g, Some(d), hyper, MapInit::Resume(m1), &dev)?;

    let t0 = mapper0.evaluate()?;
    let t1 = mapper1.evaluate()?;
    assert_abs_diff_eq!(t0.total, t1.total, epsilon = 1e-4);
    Ok(())
}

#[test]
fn gene_term_alone_is_negative_mean_cosine() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let (s, g) = identity_2x2(&dev);

    // uniform mapping: both predicted gene columns are (0.5, 0.5), so
    // each cosine is 1/sqrt(2) and the loss is its negative
    let m0 = Tensor::zeros((2, 2), candle_core::DType::F32, &dev)?;
    let mapper = Mapper::new(
        s,
        g,
        None,
        MapHyperParams::default(),
        MapInit::Resume(m0),
        &dev,
    )?;

    let terms = mapper.evaluate()?;
    let expected = -1.0_f32 / 2.0_f32.sqrt();
    assert_abs_diff_eq!(terms.total, expected, epsilon = 1e-5);
    assert_abs_diff_eq!(terms.gene_voxel_cos, -expected, epsilon = 1e-5);
    Ok(())
}

#[test]
fn identity_example_converges_to_identity_mapping() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let (s, g) = identity_2x2(&dev);

    let m0 = Tensor::zeros((2, 2), candle_core::DType::F32, &dev)?;
    let mut mapper = Mapper::new(
        s,
        g,
        None,
        MapHyperParams::default(),
        MapInit::Resume(m0),
        &dev,
    )?;

    let config = MapTrainConfig {
        learning_rate: 0.1,
        num_epochs: 1000,
        ..Default::default()
    };

    let (p, history) = mapper.train(&config)?;
    let p = p.to_vec2::<f32>()?;

    assert!(p[0][0] > 0.9 && p[1][1] > 0.9);
    let last = history.last().unwrap();
    assert!(last.total < -0.99);
    Ok(())
}

#[test]
fn resumed_mapping_with_wrong_shape_fails_before_training() {
    let dev = Device::Cpu;
    let (s, g) = identity_2x2(&dev);

    let bad = Tensor::zeros((3, 2), candle_core::DType::F32, &dev).unwrap();
    let ret = Mapper::new(
        s,
        g,
        None,
        MapHyperParams::default(),
        MapInit::Resume(bad),
        &dev,
    );
    assert!(ret.is_err());
}

#[test]
fn zero_gene_weight_is_rejected() {
    let dev = Device::Cpu;
    let (s, g) = identity_2x2(&dev);

    let hyper = MapHyperParams {
        lambda_g1: 0.,
        ..Default::default()
    };
    assert!(Mapper::new(s, g, None, hyper, MapInit::Seeded(1), &dev).is_err());
}

#[test]
fn density_target_without_density_weight_is_rejected() {
    let dev = Device::Cpu;
    let (s, g) = identity_2x2(&dev);
    let d = uniform_density(2, &dev);

    let ret = Mapper::new(
        s,
        g,
        Some(d),
        MapHyperParams::default(),
        MapInit::Seeded(1),
        &dev,
    );
    assert!(ret.is_err());
}

#[test]
fn history_length_matches_epochs_regardless_of_reporting() -> anyhow::Result<()> {
    let dev = Device::Cpu;

    for print_each in [None, Some(3)] {
        let (s, g) = identity_2x2(&dev);
        let mut mapper = Mapper::new(
            s,
            g,
            None,
            MapHyperParams::default(),
            MapInit::Seeded(7),
            &dev,
        )?;

        let config = MapTrainConfig {
            num_epochs: 7,
            print_each,
            ..Default::default()
        };
        let (_, history) = mapper.train(&config)?;
        assert_eq!(history.len(), 7);
    }
    Ok(())
}

#[test]
fn same_seed_reproduces_the_same_mapping() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let s = Tensor::rand(0_f32, 1_f32, (6, 5), &dev)?;
    let g = Tensor::rand(0_f32, 1_f32, (4, 5), &dev)?;

    let config = MapTrainConfig {
        num_epochs: 30,
        ..Default::default()
    };

    let run = |seed: u64| -> anyhow::Result<Vec<Vec<f32>>> {
        let mut mapper = Mapper::new(
            s.clone(),
            g.clone(),
            None,
            MapHyperParams::default(),
            MapInit::Seeded(seed),
            &dev,
        )?;
        let (p, _) = mapper.train(&config)?;
        Ok(p.to_vec2::<f32>()?)
    };

    let p1 = run(2024)?;
    let p2 = run(2024)?;
    for (row1, row2) in p1.iter().zip(p2.iter()) {
        for (a, b) in row1.iter().zip(row2.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-6);
        }
    }
    Ok(())
}

#[test]
fn uniform_mapping_has_zero_density_divergence() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let (s, g) = identity_2x2(&dev);
    let d = uniform_density(2, &dev);

    let hyper = MapHyperParams {
        lambda_d: 1.,
        lambda_r: 1.,
        ..Default::default()
    };

    let m0 = Tensor::zeros((2, 2), candle_core::DType::F32, &dev)?;
    let mapper = Mapper::new(s, g, Some(d), hyper, MapInit::Resume(m0), &dev)?;
    let terms = mapper.evaluate()?;

    // uniform rows put uniform mass on both voxels
    assert_abs_diff_eq!(terms.density_kl, 0.0, epsilon = 1e-6);

    // sum of p log p over four entries of 0.5
    assert_abs_diff_eq!(terms.neg_entropy, 2.0 * 0.5_f32.ln(), epsilon = 1e-5);
    Ok(())
}
