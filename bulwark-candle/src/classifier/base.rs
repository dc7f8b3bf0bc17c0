use super::loss_tensor;
use crate::{
    mlp::Mlp,
    opt::{Optimizer, OptimizerConfig},
    util::{array_to_tensor, tensor_to_array2, trainable_vars, Snapshot},
    Session,
};
use anyhow::Result;
use bulwark_core::{
    artifact::{existing_file, ArtifactWriter, ModelDescription, MODEL_FILE, WEIGHTS_FILE},
    construct,
    defence::{preprocess_inputs, preprocess_labels},
    record::{Record, RecordValue, Recorder},
    Architecture, BulwarkError, Classifier, ClassifierConfig, CompileConfig, CompileParams,
    FitConfig, LayerSpec, Scores,
};
use candle_core::{Tensor, D};
use candle_nn::{ops::softmax, VarBuilder, VarMap};
use log::{debug, info, trace};
use ndarray::{concatenate, Array2, ArrayD, Axis};
use rand::{rngs::SmallRng, seq::SliceRandom, SeedableRng};
use std::{fs, path::Path, time::Instant};

/// Number of samples per forward pass in evaluation and prediction.
const EVAL_BATCH_SIZE: usize = 256;

fn training_error(e: impl std::fmt::Display) -> BulwarkError {
    BulwarkError::training(e.to_string())
}

/// Splits `indices` into batches, merging a trailing single-sample batch into
/// the previous one.
fn batches(indices: &[u32], batch_size: usize) -> Vec<&[u32]> {
    let mut batches: Vec<&[u32]> = indices.chunks(batch_size).collect();
    if batches.len() >= 2 && batches[batches.len() - 1].len() == 1 {
        let n = indices.len();
        batches.pop();
        batches.pop();
        batches.push(&indices[n - batch_size - 1..]);
    }
    batches
}

/// A multilayer perceptron compiled with a loss, an optimizer and metrics.
///
/// The classifier owns its variables and optimizer state. It is created
/// with [`MlpClassifier::compile`] (or [`MlpClassifier::new`]) and restored
/// from disk with [`MlpClassifier::load`].
pub struct MlpClassifier {
    architecture: Architecture,
    compile: CompileParams,
    session: Session,
    varmap: VarMap,
    mlp: Mlp,
    opt: Optimizer,
}

impl MlpClassifier {
    /// Constructs the architecture described by `config` and compiles it.
    pub fn new(config: &ClassifierConfig, compile: &CompileConfig, session: &Session) -> Result<Self> {
        let architecture = construct(config)?;
        Self::compile(architecture, compile, session)
    }

    /// Binds an architecture to a loss, an optimizer and metrics.
    ///
    /// Fails with a configuration error when the loss or the optimizer is
    /// missing or unknown, or when a metric is unknown.
    pub fn compile(
        architecture: Architecture,
        config: &CompileConfig,
        session: &Session,
    ) -> Result<Self> {
        let compile = config.resolve()?;
        architecture.validate()?;
        let classifier = Self::build(architecture, compile, session)?;
        info!(
            "Compiled classifier with loss {}, optimizer {:?} (lr = {}) and metrics {:?}",
            classifier.compile.loss.name(),
            classifier.compile.optimizer,
            classifier.compile.learning_rate,
            classifier.metric_names(),
        );
        Ok(classifier)
    }

    fn build(architecture: Architecture, compile: CompileParams, session: &Session) -> Result<Self> {
        let varmap = VarMap::new();
        let vs = VarBuilder::from_varmap(&varmap, session.dtype(), session.device());
        let mlp = Mlp::build(vs, &architecture)?;
        let opt = OptimizerConfig::from_kind(compile.optimizer, compile.learning_rate)
            .build(trainable_vars(&varmap)?)?;

        Ok(Self {
            architecture,
            compile,
            session: session.clone(),
            varmap,
            mlp,
            opt,
        })
    }

    /// Restores a classifier saved with [`Classifier::save`].
    ///
    /// Both files must be present and non-empty. The optimizer starts from a
    /// fresh state. Any failure is reported as a storage error.
    pub fn load(dir: impl AsRef<Path>, session: &Session) -> Result<Self> {
        let dir = dir.as_ref();
        existing_file(dir, MODEL_FILE)?;
        let weights = existing_file(dir, WEIGHTS_FILE)?;
        let desc = ModelDescription::load(dir)?;

        let mut classifier = Self::build(desc.architecture, desc.compile, session)
            .map_err(|e| BulwarkError::storage(format!("failed to rebuild model: {}", e)))?;
        classifier.varmap.load(&weights).map_err(|e| {
            BulwarkError::storage(format!("failed to load {}: {}", weights.display(), e))
        })?;
        info!("Loaded classifier from {:?}", dir);

        Ok(classifier)
    }

    /// Resolved loss, optimizer and metrics.
    pub fn compile_params(&self) -> &CompileParams {
        &self.compile
    }

    /// Names of the values returned by [`Classifier::evaluate`].
    pub fn metric_names(&self) -> Vec<&'static str> {
        std::iter::once("loss")
            .chain(self.compile.metrics.iter().map(|m| m.name()))
            .collect()
    }

    /// Session the classifier was compiled against.
    pub fn session(&self) -> &Session {
        &self.session
    }

    fn has_batch_norm(&self) -> bool {
        self.architecture.layers().iter().any(LayerSpec::is_batch_norm)
    }

    /// Applies the input defences and moves samples to the device.
    fn input_tensor(&self, x: &ArrayD<f32>) -> Result<Tensor> {
        let x = preprocess_inputs(self.architecture.defences(), x.clone());
        array_to_tensor::<f32, f32, _, _>(&x, self.session.device())
    }

    /// Runs inference in batches and returns the logits of all samples.
    fn logits(&self, xs: &Tensor, n: usize) -> Result<Tensor> {
        let mut outputs = Vec::with_capacity(n.div_ceil(EVAL_BATCH_SIZE));
        for start in (0..n).step_by(EVAL_BATCH_SIZE) {
            let len = EVAL_BATCH_SIZE.min(n - start);
            let xb = xs.narrow(0, start, len)?;
            outputs.push(self.mlp.forward_logits(&xb, false)?);
        }
        Ok(Tensor::cat(&outputs, 0)?)
    }

    fn run_epoch(&mut self, xs: &Tensor, ys: &Tensor, indices: &[u32], batch_size: usize) -> Result<f32> {
        let device = self.session.device();
        let mut loss_sum = 0f32;
        for (i, batch) in batches(indices, batch_size).into_iter().enumerate() {
            let ids = Tensor::from_slice(batch, batch.len(), device)?;
            let xb = xs.index_select(&ids, 0)?;
            let yb = ys.index_select(&ids, 0)?;
            let logits = self.mlp.forward_logits(&xb, true)?;
            let loss = loss_tensor(self.compile.loss, &logits, &yb)?;
            self.opt.backward_step(&loss)?;

            let loss = loss.to_scalar::<f32>()?;
            if !loss.is_finite() {
                return Err(training_error(format!("loss diverged at batch {}", i)).into());
            }
            trace!("batch {}: loss = {}", i, loss);
            loss_sum += loss * batch.len() as f32;
        }
        Ok(loss_sum / indices.len() as f32)
    }
}

impl Classifier for MlpClassifier {
    fn architecture(&self) -> &Architecture {
        &self.architecture
    }

    /// Trains on `(x, y)` for `config.epochs` epochs.
    ///
    /// Input defences are applied to `x` and label defences to `y` first.
    /// If an epoch fails, the variables are restored to their values at the
    /// start of that epoch and a training error is returned.
    fn fit(
        &mut self,
        x: &ArrayD<f32>,
        y: &Array2<f32>,
        config: &FitConfig,
        recorder: &mut dyn Recorder,
    ) -> Result<()> {
        config.validate()?;
        let n = self.architecture.check_data(x, y)?;
        if self.has_batch_norm() && (n < 2 || config.batch_size < 2) {
            return Err(training_error(
                "batch normalization needs at least 2 samples per batch",
            )
            .into());
        }

        let defences = self.architecture.defences();
        let y = preprocess_labels(defences, y.clone());
        let xs = self.input_tensor(x).map_err(training_error)?;
        let ys = array_to_tensor::<f32, f32, _, _>(&y, self.session.device())
            .map_err(training_error)?;

        let mut rng = match config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        let mut indices: Vec<u32> = (0..n as u32).collect();
        info!(
            "Training on {} samples for {} epochs (batch_size = {})",
            n, config.epochs, config.batch_size
        );

        for epoch in 1..=config.epochs {
            if config.shuffle {
                indices.shuffle(&mut rng);
            }
            let snapshot = Snapshot::take(&self.varmap).map_err(training_error)?;
            let start = Instant::now();

            match self.run_epoch(&xs, &ys, &indices, config.batch_size) {
                Ok(loss) => {
                    let elapsed = start.elapsed().as_secs_f32();
                    info!("Epoch {}/{}: loss = {:.4} ({:.2}s)", epoch, config.epochs, loss, elapsed);
                    recorder.write(Record::from_slice(&[
                        ("epoch", RecordValue::Scalar(epoch as f32)),
                        ("loss", RecordValue::Scalar(loss)),
                        ("elapsed_secs", RecordValue::Scalar(elapsed)),
                    ]));
                }
                Err(e) => {
                    snapshot.restore().map_err(training_error)?;
                    debug!("Restored variables after failure in epoch {}", epoch);
                    return Err(training_error(format!("epoch {} failed: {}", epoch, e)).into());
                }
            }
        }

        Ok(())
    }

    /// Returns the loss followed by the compiled metrics, computed in
    /// inference mode on unsmoothed targets.
    fn evaluate(&self, x: &ArrayD<f32>, y: &Array2<f32>) -> Result<Scores> {
        let n = self.architecture.check_data(x, y)?;
        let eval = || -> Result<(f32, Array2<f32>)> {
            let xs = self.input_tensor(x)?;
            let ys = array_to_tensor::<f32, f32, _, _>(y, self.session.device())?;
            let logits = self.logits(&xs, n)?;
            let loss = loss_tensor(self.compile.loss, &logits, &ys)?.to_scalar::<f32>()?;
            let probs = tensor_to_array2::<f32>(&softmax(&logits, D::Minus1)?)?;
            Ok((loss, probs))
        };
        let (loss, probs) = eval().map_err(training_error)?;

        let metrics = self
            .compile
            .metrics
            .iter()
            .map(|m| (*m, m.compute(probs.view(), y.view())));
        let scores = Scores::new(loss, metrics);
        debug!("Evaluated {} samples: {:?}", n, scores);

        Ok(scores)
    }

    fn predict(&self, x: &ArrayD<f32>) -> Result<Array2<f32>> {
        let n = self.architecture.check_inputs(x)?;
        let predict = || -> Result<Array2<f32>> {
            let xs = self.input_tensor(x)?;
            let mut chunks = Vec::new();
            for start in (0..n).step_by(EVAL_BATCH_SIZE) {
                let len = EVAL_BATCH_SIZE.min(n - start);
                let probs = self.mlp.forward_t(&xs.narrow(0, start, len)?, false)?;
                chunks.push(tensor_to_array2::<f32>(&probs)?);
            }
            let views: Vec<_> = chunks.iter().map(|c| c.view()).collect();
            Ok(concatenate(Axis(0), &views)?)
        };
        Ok(predict().map_err(training_error)?)
    }

    /// Writes [`MODEL_FILE`] and [`WEIGHTS_FILE`] into `dir`, creating it if
    /// needed. On failure, neither file is left behind.
    fn save(&self, dir: &Path) -> Result<()> {
        let desc = ModelDescription::new(self.architecture.clone(), self.compile.clone());
        let json = desc.to_json_string_pretty()?;

        let mut writer = ArtifactWriter::create(dir)?;
        writer.write(MODEL_FILE, |path| Ok(fs::write(path, &json)?))?;
        writer.write(WEIGHTS_FILE, |path| Ok(self.varmap.save(path)?))?;
        writer.commit()?;

        Ok(())
    }
}
