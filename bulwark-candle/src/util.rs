//! Utilities.
use anyhow::{anyhow, Result};
use candle_core::{Device, Tensor, Var, WithDType};
use candle_nn::VarMap;
use ndarray::{Array2, ArrayBase, Data, Dimension};
use num_traits::AsPrimitive;

/// Suffixes of variables updated by forward passes rather than by the optimizer.
const RUNNING_STAT_SUFFIXES: [&str; 2] = ["running_mean", "running_var"];

/// Converts an array into a tensor of the same shape on `device`.
pub fn array_to_tensor<T1, T2, S, D>(a: &ArrayBase<S, D>, device: &Device) -> Result<Tensor>
where
    S: Data<Elem = T1>,
    D: Dimension,
    T1: AsPrimitive<T2>,
    T2: WithDType,
{
    let shape = a.shape().to_vec();
    let v: Vec<T2> = a.iter().map(|e| e.as_()).collect();
    Ok(Tensor::from_vec(v, shape, device)?)
}

/// Converts a 2-dimensional tensor into an array.
pub fn tensor_to_array2<T: WithDType>(t: &Tensor) -> Result<Array2<T>> {
    let (rows, cols) = t.dims2()?;
    let v: Vec<T> = t.flatten_all()?.to_vec1()?;
    Ok(Array2::from_shape_vec((rows, cols), v)?)
}

/// Returns the variables to be updated by an optimizer.
///
/// Batch normalization statistics are excluded.
pub fn trainable_vars(varmap: &VarMap) -> Result<Vec<Var>> {
    let data = varmap
        .data()
        .lock()
        .map_err(|_| anyhow!("variable map lock poisoned"))?;
    Ok(data
        .iter()
        .filter(|(k, _)| !RUNNING_STAT_SUFFIXES.iter().any(|s| k.ends_with(s)))
        .map(|(_, v)| v.clone())
        .collect())
}

/// Deep copy of every variable in a [`VarMap`].
pub struct Snapshot(Vec<(Var, Tensor)>);

impl Snapshot {
    /// Copies the current values of the variables.
    pub fn take(varmap: &VarMap) -> Result<Self> {
        let data = varmap
            .data()
            .lock()
            .map_err(|_| anyhow!("variable map lock poisoned"))?;
        let mut values = Vec::with_capacity(data.len());
        for v in data.values() {
            values.push((v.clone(), v.as_tensor().copy()?));
        }
        Ok(Self(values))
    }

    /// Writes the copied values back.
    pub fn restore(&self) -> Result<()> {
        for (var, t) in self.0.iter() {
            var.set(t)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;
    use candle_nn::Init;
    use ndarray::{array, ArrayD, IxDyn};

    #[test]
    fn test_array_conversion() -> Result<()> {
        let a = ArrayD::from_shape_fn(IxDyn(&[2, 3, 2]), |ix| (ix[0] * 6 + ix[1] * 2 + ix[2]) as f32);
        let t = array_to_tensor::<f32, f32, _, _>(&a, &Device::Cpu)?;
        assert_eq!(t.dims(), &[2, 3, 2]);
        assert_eq!(t.flatten_all()?.to_vec1::<f32>()?[7], 7.0);

        let b = array![[1u8, 2], [3, 4]];
        let t = array_to_tensor::<u8, f32, _, _>(&b, &Device::Cpu)?;
        assert_eq!(tensor_to_array2::<f32>(&t)?, array![[1.0f32, 2.0], [3.0, 4.0]]);
        Ok(())
    }

    #[test]
    fn test_trainable_vars_skip_running_stats() -> Result<()> {
        let vm = VarMap::new();
        let dev = Device::Cpu;
        vm.get((3,), "bn.weight", Init::Const(1.0), DType::F32, &dev)?;
        vm.get((3,), "bn.running_mean", Init::Const(0.0), DType::F32, &dev)?;
        vm.get((3,), "bn.running_var", Init::Const(1.0), DType::F32, &dev)?;
        assert_eq!(trainable_vars(&vm)?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_snapshot_restore() -> Result<()> {
        let vm = VarMap::new();
        let dev = Device::Cpu;
        let t = vm.get((3,), "w", Init::Const(1.0), DType::F32, &dev)?;
        let snapshot = Snapshot::take(&vm)?;

        let var = vm.data().lock().unwrap().get("w").unwrap().clone();
        var.set(&Tensor::from_slice(&[5.0f32, 6.0, 7.0], (3,), &dev)?)?;
        assert_eq!(t.to_vec1::<f32>()?, vec![5.0, 6.0, 7.0]);

        snapshot.restore()?;
        assert_eq!(t.to_vec1::<f32>()?, vec![1.0, 1.0, 1.0]);
        Ok(())
    }
}
