#![allow(dead_code)]
use bulwark_candle::{MlpClassifier, Session};
use bulwark_core::{ClassifierConfig, CompileConfig};
use ndarray::{Array2, ArrayD, IxDyn};
use rand::{rngs::SmallRng, Rng, SeedableRng};

/// Height and width of synthetic images.
pub const SIDE: usize = 8;

pub const NB_CLASSES: usize = 10;

const PROTOTYPE_SEED: u64 = 0;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Returns `n` grayscale `SIDE x SIDE` images with one-hot labels.
///
/// Each class has a fixed binary prototype; samples are the prototype with
/// pixels at 0.15 or 0.85 plus uniform noise in [-0.1, 0.1]. Prototypes do
/// not depend on `seed`, so training and test sets share them.
pub fn synthetic_digits(n: usize, seed: u64) -> (ArrayD<f32>, Array2<f32>) {
    let mut rng = SmallRng::seed_from_u64(PROTOTYPE_SEED);
    let prototypes: Vec<Vec<bool>> = (0..NB_CLASSES)
        .map(|_| (0..SIDE * SIDE).map(|_| rng.gen_bool(0.5)).collect())
        .collect();

    let mut rng = SmallRng::seed_from_u64(seed);
    let labels: Vec<usize> = (0..n).map(|_| rng.gen_range(0..NB_CLASSES)).collect();
    let x = ArrayD::from_shape_fn(IxDyn(&[n, SIDE, SIDE]), |ix| {
        let on = prototypes[labels[ix[0]]][ix[1] * SIDE + ix[2]];
        let base = if on { 0.85 } else { 0.15 };
        base + rng.gen_range(-0.1f32..0.1)
    });
    let y = Array2::from_shape_fn((n, NB_CLASSES), |(i, j)| (labels[i] == j) as u8 as f32);

    (x, y)
}

pub fn compile_config() -> CompileConfig {
    CompileConfig::default()
        .loss("categorical_crossentropy")
        .optimizer("adam")
        .metrics(["accuracy"])
}

pub fn classifier(config: &ClassifierConfig) -> anyhow::Result<MlpClassifier> {
    MlpClassifier::new(config, &compile_config(), &Session::cpu())
}
