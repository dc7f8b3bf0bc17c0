use super::Layer;
use anyhow::Result;
use bulwark_core::{Architecture, LayerSpec};
use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use log::debug;

/// Multilayer perceptron following the layer list of an [`Architecture`].
///
/// Variables of the `i`-th layer are named `mlp.l{i}.*`.
pub struct Mlp {
    device: Device,
    layers: Vec<Layer>,
}

impl Mlp {
    /// Creates the layers and their variables.
    pub fn build(vs: VarBuilder, architecture: &Architecture) -> Result<Self> {
        let device = vs.device().clone();
        let vs = vs.pp("mlp");
        let layers = architecture
            .layers()
            .iter()
            .enumerate()
            .map(|(i, spec)| Layer::build(spec, vs.pp(format!("l{}", i))))
            .collect::<Result<Vec<_>>>()?;
        debug!(
            "Built mlp with layers {:?}",
            architecture.layers().iter().map(LayerSpec::name).collect::<Vec<_>>()
        );

        Ok(Self { device, layers })
    }

    /// Number of layers, including the final softmax.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Always false for networks built from a valid architecture.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Returns the pre-softmax scores.
    pub fn forward_logits(&self, xs: &Tensor, train: bool) -> candle_core::Result<Tensor> {
        let mut xs = xs.to_device(&self.device)?;
        let n = match self.layers.last() {
            Some(Layer::Softmax) => self.layers.len() - 1,
            _ => self.layers.len(),
        };
        for layer in self.layers[..n].iter() {
            xs = layer.forward_t(&xs, train)?;
        }
        Ok(xs)
    }

    /// Returns class probabilities.
    pub fn forward_t(&self, xs: &Tensor, train: bool) -> candle_core::Result<Tensor> {
        let mut xs = xs.to_device(&self.device)?;
        for layer in self.layers.iter() {
            xs = layer.forward_t(&xs, train)?;
        }
        Ok(xs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulwark_core::{construct, ClassifierConfig};
    use candle_core::{DType, D};
    use candle_nn::VarMap;

    fn build(config: &ClassifierConfig) -> Result<(VarMap, Mlp)> {
        let architecture = construct(config)?;
        let varmap = VarMap::new();
        let vs = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let mlp = Mlp::build(vs, &architecture)?;
        Ok((varmap, mlp))
    }

    #[test]
    fn test_variables_follow_layer_indices() -> Result<()> {
        let config = ClassifierConfig::new([3, 2]).units([4, 5]).nb_classes(2).batch_norm(true);
        let (varmap, mlp) = build(&config)?;
        assert_eq!(mlp.len(), 8);
        assert!(mlp.layers[3].has_vars());

        let data = varmap.data().lock().unwrap();
        let mut names = data.keys().cloned().collect::<Vec<_>>();
        names.sort();
        assert_eq!(
            names,
            vec![
                "mlp.l1.bias",
                "mlp.l1.weight",
                "mlp.l3.bias",
                "mlp.l3.running_mean",
                "mlp.l3.running_var",
                "mlp.l3.weight",
                "mlp.l4.bias",
                "mlp.l4.weight",
                "mlp.l6.bias",
                "mlp.l6.weight",
            ]
        );
        assert_eq!(data["mlp.l1.weight"].dims(), &[4, 6]);
        assert_eq!(data["mlp.l6.weight"].dims(), &[2, 5]);
        Ok(())
    }

    #[test]
    fn test_forward_shapes_and_probabilities() -> Result<()> {
        let config = ClassifierConfig::new([3, 2]).units([4, 5]).nb_classes(3);
        let (_varmap, mlp) = build(&config)?;
        let xs = Tensor::rand(0f32, 1f32, (7, 3, 2), &Device::Cpu)?;

        let logits = mlp.forward_logits(&xs, false)?;
        assert_eq!(logits.dims(), &[7, 3]);

        let probs = mlp.forward_t(&xs, false)?;
        let sums = probs.sum(D::Minus1)?.to_vec1::<f32>()?;
        for s in sums {
            assert!((s - 1.0).abs() < 1e-5);
        }
        Ok(())
    }

    #[test]
    fn test_batch_norm_running_stats_update_only_in_training() -> Result<()> {
        let config = ClassifierConfig::new([4])
            .activation("tanh")
            .units([3, 3])
            .nb_classes(2)
            .batch_norm(true);
        let (varmap, mlp) = build(&config)?;
        let running_mean = |vm: &VarMap| -> Result<Vec<f32>> {
            Ok(vm.data().lock().unwrap()["mlp.l3.running_mean"]
                .as_tensor()
                .to_vec1::<f32>()?)
        };
        let xs = Tensor::rand(1f32, 2f32, (8, 4), &Device::Cpu)?;

        let before = running_mean(&varmap)?;
        mlp.forward_t(&xs, false)?;
        assert_eq!(running_mean(&varmap)?, before);

        mlp.forward_t(&xs, true)?;
        assert_ne!(running_mean(&varmap)?, before);
        Ok(())
    }
}
