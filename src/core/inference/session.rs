//! ONNX Runtime sessions with name-addressed inputs and outputs.

use super::tensor::{TensorInput, TensorOutput};
use crate::core::config::{DeviceSpec, OrtGraphOptimizationLevel, OrtSessionConfig};
use crate::core::errors::{OpaqueError, RecError, RecResult};
use half::f16;
use ort::execution_providers::ExecutionProviderDispatch;
use ort::logging::LogLevel;
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::{Session, SessionInputValue, SessionInputs};
use ort::tensor::TensorElementType;
use ort::value::ValueType;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// A loaded ONNX graph.
///
/// `Session::run` needs exclusive access, so the session sits behind a mutex
/// and `OrtSession` can be shared between threads.
pub struct OrtSession {
    session: Mutex<Session>,
    inputs: Vec<(String, Option<TensorElementType>)>,
    output_names: Vec<String>,
    model_path: PathBuf,
    model_name: String,
}

impl std::fmt::Debug for OrtSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrtSession")
            .field("inputs", &self.inputs)
            .field("output_names", &self.output_names)
            .field("model_path", &self.model_path)
            .field("model_name", &self.model_name)
            .finish()
    }
}

impl OrtSession {
    /// Loads a model on `device` with the given session settings.
    pub fn load(
        model_path: impl AsRef<Path>,
        device: &DeviceSpec,
        cfg: &OrtSessionConfig,
    ) -> RecResult<Self> {
        let path = model_path.as_ref();
        if !path.is_file() {
            return Err(RecError::model_load_error(
                path,
                "model file not found",
                Some("check that the model directory contains the exported ONNX graphs"),
                None::<ort::Error>,
            ));
        }

        let builder = Session::builder()?.with_log_level(LogLevel::Error)?;
        let builder = apply_ort_config(builder, cfg)?;
        let providers = execution_providers(device)?;
        let builder = builder
            .with_execution_providers(providers)
            .map_err(|e| RecError::device_unavailable(device, e.to_string()))?;

        let session = builder.commit_from_file(path).map_err(|e| {
            RecError::model_load_error(
                path,
                "failed to create ONNX session",
                Some("check device/EP configuration and model file"),
                Some(e),
            )
        })?;

        let inputs = session
            .inputs
            .iter()
            .map(|input| {
                let ty = match &input.input_type {
                    ValueType::Tensor { ty, .. } => Some(*ty),
                    _ => None,
                };
                (input.name.clone(), ty)
            })
            .collect::<Vec<_>>();
        let output_names = session.outputs.iter().map(|o| o.name.clone()).collect();

        let model_name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown_model")
            .to_string();

        debug!(
            "Loaded '{}' on {} with inputs {:?}",
            path.display(),
            device,
            inputs.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>()
        );

        Ok(Self {
            session: Mutex::new(session),
            inputs,
            output_names,
            model_path: path.to_path_buf(),
            model_name,
        })
    }

    /// Returns the model path associated with this session.
    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Returns the model name associated with this session.
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Input names in graph order.
    pub fn input_names(&self) -> impl Iterator<Item = &str> {
        self.inputs.iter().map(|(n, _)| n.as_str())
    }

    /// Output names in graph order.
    pub fn output_names(&self) -> &[String] {
        &self.output_names
    }

    /// Returns true if the graph declares an input called `name`.
    pub fn has_input(&self, name: &str) -> bool {
        self.inputs.iter().any(|(n, _)| n == name)
    }

    /// Returns true if the named input expects half-precision floats.
    pub fn expects_f16(&self, name: &str) -> bool {
        self.inputs
            .iter()
            .any(|(n, ty)| n == name && *ty == Some(TensorElementType::Float16))
    }

    /// Runs the graph and returns every output by name.
    ///
    /// `batch_size` and `operation` only feed error context.
    pub fn run(
        &self,
        inputs: &[(&str, TensorInput<'_>)],
        batch_size: usize,
        operation: &str,
    ) -> RecResult<Vec<(String, TensorOutput)>> {
        let input_shape = inputs
            .first()
            .map(|(_, t)| t.shape())
            .unwrap_or_default();
        let error = |context: String| {
            RecError::model_inference_error_builder(&self.model_name, operation)
                .batch_size(batch_size)
                .input_shape(&input_shape)
                .context(context)
        };

        let mut values: Vec<(Cow<'_, str>, SessionInputValue<'_>)> =
            Vec::with_capacity(inputs.len());
        for (name, tensor) in inputs {
            let value = tensor.to_session_value().map_err(|e| {
                error(format!("Failed to convert input '{name}'")).build(e)
            })?;
            values.push((Cow::Borrowed(*name), value));
        }

        let mut session = self.session.lock().map_err(|_| {
            error("Failed to acquire session lock".to_string())
                .build(OpaqueError("session lock poisoned".to_string()))
        })?;

        let session_inputs: SessionInputs<'_, '_> = SessionInputs::ValueMap(values);
        let outputs = session
            .run(session_inputs)
            .map_err(|e| {
                error(format!(
                    "ONNX Runtime inference failed for '{}'",
                    self.model_path.display()
                ))
                .build(e)
            })?;

        let mut extracted = Vec::with_capacity(self.output_names.len());
        for name in &self.output_names {
            let value = &outputs[name.as_str()];
            let output = if let Ok((shape, data)) = value.try_extract_tensor::<f32>() {
                TensorOutput::F32 {
                    shape: shape.to_vec(),
                    data: data.to_vec(),
                }
            } else if let Ok((shape, data)) = value.try_extract_tensor::<f16>() {
                TensorOutput::F32 {
                    shape: shape.to_vec(),
                    data: data.iter().map(|v| v.to_f32()).collect(),
                }
            } else {
                let (shape, data) = value.try_extract_tensor::<i64>().map_err(|e| {
                    error(format!("Failed to extract output tensor '{name}'")).build(e)
                })?;
                TensorOutput::I64 {
                    shape: shape.to_vec(),
                    data: data.to_vec(),
                }
            };
            extracted.push((name.clone(), output));
        }
        Ok(extracted)
    }
}

/// Checks that `device` can host a session without loading any model.
pub fn probe_device(device: &DeviceSpec) -> RecResult<()> {
    execution_providers(device).map(|_| ())
}

fn apply_ort_config(
    mut builder: SessionBuilder,
    cfg: &OrtSessionConfig,
) -> Result<SessionBuilder, ort::Error> {
    if let Some(intra) = cfg.intra_threads {
        builder = builder.with_intra_threads(intra)?;
    }
    if let Some(inter) = cfg.inter_threads {
        builder = builder.with_inter_threads(inter)?;
    }
    let level = match cfg.optimization_level.unwrap_or_default() {
        OrtGraphOptimizationLevel::DisableAll => GraphOptimizationLevel::Disable,
        OrtGraphOptimizationLevel::Level1 => GraphOptimizationLevel::Level1,
        OrtGraphOptimizationLevel::Level2 => GraphOptimizationLevel::Level2,
        OrtGraphOptimizationLevel::Level3 => GraphOptimizationLevel::Level3,
    };
    builder.with_optimization_level(level)
}

fn execution_providers(device: &DeviceSpec) -> RecResult<Vec<ExecutionProviderDispatch>> {
    match device {
        DeviceSpec::Cpu => Ok(vec![
            ort::execution_providers::CPUExecutionProvider::default().build(),
        ]),
        #[cfg(feature = "cuda")]
        DeviceSpec::Cuda(id) => {
            use ort::execution_providers::ExecutionProvider;
            let cuda = ort::execution_providers::CUDAExecutionProvider::default().with_device_id(*id);
            match cuda.is_available() {
                Ok(true) => Ok(vec![cuda.build().error_on_failure()]),
                Ok(false) => Err(RecError::device_unavailable(
                    device,
                    "the CUDA execution provider is not available in this ONNX Runtime build",
                )),
                Err(e) => Err(RecError::device_unavailable(device, e.to_string())),
            }
        }
        #[cfg(not(feature = "cuda"))]
        DeviceSpec::Cuda(_) => Err(RecError::device_unavailable(
            device,
            "linerec was built without the `cuda` feature",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_is_always_reachable() {
        assert!(probe_device(&DeviceSpec::Cpu).is_ok());
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn test_cuda_without_feature_is_unavailable() {
        let err = probe_device(&DeviceSpec::Cuda(0)).unwrap_err();
        assert!(matches!(err, RecError::DeviceUnavailable { .. }));
        assert!(err.is_setup_fatal());
    }

    #[test]
    fn test_missing_model_file_is_a_load_error() {
        let err = OrtSession::load(
            "/nonexistent/encoder_model.onnx",
            &DeviceSpec::Cpu,
            &OrtSessionConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, RecError::ModelLoad { .. }));
    }
}
