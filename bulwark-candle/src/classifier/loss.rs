use bulwark_core::Loss;
use candle_core::{Result, Tensor, D};
use candle_nn::ops::{log_softmax, softmax};

/// Mean loss over a batch, given pre-softmax scores and targets.
///
/// Cross entropy is computed from log-softmax of the logits rather than from
/// the probabilities.
pub fn loss_tensor(loss: Loss, logits: &Tensor, targets: &Tensor) -> Result<Tensor> {
    match loss {
        Loss::CategoricalCrossentropy => {
            let log_probs = log_softmax(logits, D::Minus1)?;
            (log_probs * targets)?.sum(D::Minus1)?.neg()?.mean_all()
        }
        Loss::MeanSquaredError => {
            let probs = softmax(logits, D::Minus1)?;
            candle_nn::loss::mse(&probs, targets)
        }
    }
}
