//! Backend-agnostic tensor inputs and outputs.

use crate::core::errors::{RecError, RecResult};
use half::f16;
use ndarray::{ArrayD, ArrayViewD, IxDyn};
use ort::session::SessionInputValue;
use ort::value::TensorRef;

/// A named model input of one of the supported element types.
#[derive(Debug)]
pub enum TensorInput<'a> {
    /// 32-bit float tensor (pixel values, hidden states).
    F32(ArrayViewD<'a, f32>),
    /// 16-bit float tensor for half-precision graphs.
    F16(ArrayViewD<'a, f16>),
    /// 64-bit integer tensor (token ids, attention masks).
    I64(ArrayViewD<'a, i64>),
}

impl<'a> TensorInput<'a> {
    /// Shape of the tensor.
    pub fn shape(&self) -> Vec<usize> {
        match self {
            TensorInput::F32(arr) => arr.shape().to_vec(),
            TensorInput::F16(arr) => arr.shape().to_vec(),
            TensorInput::I64(arr) => arr.shape().to_vec(),
        }
    }

    pub(crate) fn to_session_value(&self) -> RecResult<SessionInputValue<'a>> {
        fn tensor_ref<'v, T>(
            arr: &ArrayViewD<'v, T>,
            kind: &str,
        ) -> RecResult<TensorRef<'v, T>>
        where
            T: ort::tensor::PrimitiveTensorElementType + std::fmt::Debug + Clone + 'static,
        {
            let dims: Vec<i64> = arr.shape().iter().map(|&d| d as i64).collect();
            let data = arr.to_slice().ok_or_else(|| RecError::InvalidInput {
                message: format!("{kind} tensor is not contiguous in memory"),
            })?;
            TensorRef::from_array_view((dims, data)).map_err(|e| RecError::InvalidInput {
                message: format!("Failed to create {kind} TensorRef: {e}"),
            })
        }

        Ok(match self {
            TensorInput::F32(arr) => tensor_ref(arr, "f32")?.into(),
            TensorInput::F16(arr) => tensor_ref(arr, "f16")?.into(),
            TensorInput::I64(arr) => tensor_ref(arr, "i64")?.into(),
        })
    }
}

/// Raw tensor returned by a session. Half-precision outputs are widened to f32.
#[derive(Debug, Clone)]
pub enum TensorOutput {
    /// 32-bit floating point tensor
    F32 { shape: Vec<i64>, data: Vec<f32> },
    /// 64-bit integer tensor
    I64 { shape: Vec<i64>, data: Vec<i64> },
}

impl TensorOutput {
    /// Returns the shape of the tensor.
    pub fn shape(&self) -> &[i64] {
        match self {
            TensorOutput::F32 { shape, .. } => shape,
            TensorOutput::I64 { shape, .. } => shape,
        }
    }

    /// Converts into a dynamic-rank f32 array.
    pub fn try_into_array_f32(self) -> RecResult<ArrayD<f32>> {
        match self {
            TensorOutput::F32 { shape, data } => {
                let dims = shape
                    .iter()
                    .map(|&d| {
                        usize::try_from(d).map_err(|_| RecError::InvalidInput {
                            message: format!("negative dimension {d} in output shape {shape:?}"),
                        })
                    })
                    .collect::<RecResult<Vec<usize>>>()?;
                Ok(ArrayD::from_shape_vec(IxDyn(&dims), data)?)
            }
            TensorOutput::I64 { .. } => Err(RecError::InvalidInput {
                message: "Expected f32 tensor, got i64".to_string(),
            }),
        }
    }
}

/// Converts an f32 array to half precision.
pub fn to_f16(arr: &ArrayViewD<'_, f32>) -> ArrayD<f16> {
    arr.mapv(f16::from_f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_into_array() -> RecResult<()> {
        let output = TensorOutput::F32 {
            shape: vec![2, 3],
            data: vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0],
        };
        let arr = output.try_into_array_f32()?;
        assert_eq!(arr.shape(), &[2, 3]);
        assert_eq!(arr[[1, 2]], 5.0);
        Ok(())
    }

    #[test]
    fn test_output_shape_mismatch_is_an_error() {
        let output = TensorOutput::F32 {
            shape: vec![2, 2],
            data: vec![0.0; 3],
        };
        assert!(output.try_into_array_f32().is_err());
    }

    #[test]
    fn test_i64_output_is_not_f32() {
        let output = TensorOutput::I64 {
            shape: vec![1],
            data: vec![7],
        };
        assert!(output.try_into_array_f32().is_err());
    }

    #[test]
    fn test_half_conversion() {
        let arr = ndarray::arr1(&[0.5f32, -2.0]).into_dyn();
        let half = to_f16(&arr.view());
        assert_eq!(half[[0]].to_f32(), 0.5);
        assert_eq!(half[[1]].to_f32(), -2.0);
    }
}
