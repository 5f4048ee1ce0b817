//! ONNX encoder-decoder runner shared by both recognizer families.
//!
//! The encoder runs once per batch. The decoder graph has no KV cache, so each
//! generation step feeds the full prefix and reads the logits at the last
//! position.

use super::generation::{GeneratedSequence, GenerationParams, generate};
use super::model_files::ModelFiles;
use crate::core::config::{BackendConfig, Precision};
use crate::core::errors::{ProcessingStage, RecError, RecResult};
use crate::core::inference::{OrtSession, TensorInput, TensorOutput, to_f16};
use crate::domain::{LineCrop, RecognitionResult};
use crate::processors::{LineResizer, NormalizeImage};
use half::f16;
use image::RgbImage;
use ndarray::{Array2, Array3, Array4, ArrayD, Axis, Ix3};
use rayon::prelude::*;
use tokenizers::Tokenizer;
use tracing::debug;

const PIXEL_VALUES: &str = "pixel_values";
const INPUT_IDS: &str = "input_ids";
const ENCODER_HIDDEN_STATES: &str = "encoder_hidden_states";
const ENCODER_ATTENTION_MASK: &str = "encoder_attention_mask";
const LAST_HIDDEN_STATE: &str = "last_hidden_state";
const LOGITS: &str = "logits";

/// Loaded encoder and decoder sessions plus tokenizer.
pub struct EncoderDecoder {
    encoder: OrtSession,
    decoder: OrtSession,
    tokenizer: Tokenizer,
    generation: GenerationParams,
    model_name: String,
}

impl std::fmt::Debug for EncoderDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncoderDecoder")
            .field("encoder", &self.encoder)
            .field("decoder", &self.decoder)
            .field("generation", &self.generation)
            .field("model_name", &self.model_name)
            .finish()
    }
}

impl EncoderDecoder {
    /// Loads both graphs and the tokenizer on the configured device.
    pub fn load(files: &ModelFiles, cfg: &BackendConfig) -> RecResult<Self> {
        let encoder = OrtSession::load(&files.encoder_path, &cfg.device, &cfg.ort_session)?;
        let decoder = OrtSession::load(&files.decoder_path, &cfg.device, &cfg.ort_session)?;
        let tokenizer = files.tokenizer()?;

        if !decoder.has_input(INPUT_IDS) || !decoder.has_input(ENCODER_HIDDEN_STATES) {
            return Err(RecError::model_load_error(
                &files.decoder_path,
                format!("decoder must take '{INPUT_IDS}' and '{ENCODER_HIDDEN_STATES}'"),
                Some("export the decoder without past key values"),
                None::<RecError>,
            ));
        }

        let generation = GenerationParams {
            decoder_start_token_id: files.decoder_start_token_id(),
            eos_token_id: files.eos_token_id(),
            max_new_tokens: files.max_new_tokens(cfg.max_new_tokens),
            strategy: cfg.decoding,
            prompt: Vec::new(),
        };
        debug!("Generation parameters for '{}': {:?}", files.model_name(), generation);

        Ok(Self {
            encoder,
            decoder,
            tokenizer,
            generation,
            model_name: files.model_name(),
        })
    }

    /// Forces `prompt` after the decoder start token.
    pub fn set_prompt(&mut self, prompt: Vec<i64>) {
        self.generation.prompt = prompt;
    }

    /// Encodes text into prompt token ids, without special tokens.
    pub fn encode_prompt(&self, prompt: &str) -> RecResult<Vec<i64>> {
        let encoding = self
            .tokenizer
            .encode(prompt, false)
            .map_err(|e| RecError::config_error(format!("failed to tokenize prompt: {e}")))?;
        Ok(encoding.get_ids().iter().map(|&id| id as i64).collect())
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Resizes, normalizes and recognizes a batch of crops.
    pub fn recognize_crops(
        &self,
        crops: &[LineCrop],
        resizer: &LineResizer,
        normalizer: &NormalizeImage,
    ) -> RecResult<Vec<RecognitionResult>> {
        if crops.is_empty() {
            return Ok(Vec::new());
        }
        let resized: Vec<RgbImage> = crops
            .par_iter()
            .map(|crop| resizer.apply(crop.image()))
            .collect();
        let pixel_values = normalizer.to_batch_tensor(&resized)?;

        let sequences = self.run(pixel_values)?;
        crops
            .iter()
            .zip(sequences)
            .map(|(crop, sequence)| {
                let text = self.decode_text(&sequence.tokens)?;
                Ok(RecognitionResult::new(
                    crop.line_id().clone(),
                    text,
                    sequence.confidence(),
                ))
            })
            .collect()
    }

    /// Runs encoder and generation on a normalized NCHW batch.
    pub fn run(&self, pixel_values: Array4<f32>) -> RecResult<Vec<GeneratedSequence>> {
        let batch_size = pixel_values.shape()[0];
        let hidden = self.encode(pixel_values)?;
        let decoder_half = self.decoder.expects_f16(ENCODER_HIDDEN_STATES);
        let with_mask = self.decoder.has_input(ENCODER_ATTENTION_MASK);

        let mut step = |rows: &[(usize, &[i64])]| -> RecResult<Vec<Vec<f32>>> {
            let feed = StepFeed::new(rows, &hidden, decoder_half, with_mask)?;
            let outputs = self.decoder.run(&feed.inputs(), rows.len(), "decoder_step")?;
            last_position_logits(pick_output(outputs, LOGITS)?)
        };

        generate(batch_size, &self.generation, &mut step)
    }

    fn encode(&self, pixel_values: Array4<f32>) -> RecResult<Array3<f32>> {
        let batch_size = pixel_values.shape()[0];
        let input_name = if self.encoder.has_input(PIXEL_VALUES) {
            PIXEL_VALUES.to_string()
        } else {
            self.encoder
                .input_names()
                .next()
                .map(str::to_string)
                .ok_or_else(|| RecError::invalid_input("encoder declares no inputs"))?
        };

        let pixel_values: ArrayD<f32> = pixel_values.into_dyn();
        let half = self
            .encoder
            .expects_f16(&input_name)
            .then(|| to_f16(&pixel_values.view()));
        let input = match &half {
            Some(half) => TensorInput::F16(half.view()),
            None => TensorInput::F32(pixel_values.view()),
        };

        let outputs = self
            .encoder
            .run(&[(input_name.as_str(), input)], batch_size, "encoder")?;
        let hidden = pick_output(outputs, LAST_HIDDEN_STATE)?
            .try_into_array_f32()?
            .into_dimensionality::<Ix3>()?;
        Ok(hidden)
    }

    /// Detokenizes generated ids, skipping special tokens.
    pub fn decode_text(&self, tokens: &[i64]) -> RecResult<String> {
        let ids: Vec<u32> = tokens
            .iter()
            .filter_map(|&id| u32::try_from(id).ok())
            .collect();
        let text = self
            .tokenizer
            .decode(&ids, true)
            .map_err(|e| RecError::processing_message(ProcessingStage::Decoding, e.to_string()))?;
        Ok(text.trim().to_string())
    }
}

/// Decoder inputs for one generation step.
///
/// Row `i` of every tensor belongs to `rows[i]`: its prefix and the encoder
/// states of the batch row it decodes.
struct StepFeed {
    input_ids: ArrayD<i64>,
    states: ArrayD<f32>,
    states_half: Option<ArrayD<f16>>,
    mask: Option<ArrayD<i64>>,
}

impl StepFeed {
    fn new(
        rows: &[(usize, &[i64])],
        hidden: &Array3<f32>,
        half: bool,
        with_mask: bool,
    ) -> RecResult<Self> {
        let prefix_len = rows.first().map(|(_, p)| p.len()).unwrap_or(0);
        if rows.iter().any(|(_, p)| p.len() != prefix_len) {
            return Err(RecError::processing_message(
                ProcessingStage::Decoding,
                "decoder prefixes in one step must have equal length",
            ));
        }
        let ids: Vec<i64> = rows.iter().flat_map(|(_, p)| p.iter().copied()).collect();
        let input_ids = Array2::from_shape_vec((rows.len(), prefix_len), ids)?.into_dyn();
        let row_index: Vec<usize> = rows.iter().map(|(r, _)| *r).collect();
        let states = hidden.select(Axis(0), &row_index).into_dyn();
        let states_half = half.then(|| to_f16(&states.view()));
        let mask = with_mask
            .then(|| Array2::<i64>::ones((rows.len(), hidden.shape()[1])).into_dyn());
        Ok(Self {
            input_ids,
            states,
            states_half,
            mask,
        })
    }

    fn inputs(&self) -> Vec<(&'static str, TensorInput<'_>)> {
        let mut inputs = vec![
            (INPUT_IDS, TensorInput::I64(self.input_ids.view())),
            (
                ENCODER_HIDDEN_STATES,
                match &self.states_half {
                    Some(half) => TensorInput::F16(half.view()),
                    None => TensorInput::F32(self.states.view()),
                },
            ),
        ];
        if let Some(mask) = &self.mask {
            inputs.push((ENCODER_ATTENTION_MASK, TensorInput::I64(mask.view())));
        }
        inputs
    }
}

/// Per-row logits at the last decoded position of a `[rows, positions, vocab]` output.
fn last_position_logits(output: TensorOutput) -> RecResult<Vec<Vec<f32>>> {
    let logits = output.try_into_array_f32()?.into_dimensionality::<Ix3>()?;
    let last = logits.shape()[1].checked_sub(1).ok_or_else(|| {
        RecError::processing_message(ProcessingStage::Decoding, "decoder returned no positions")
    })?;
    Ok(logits
        .index_axis(Axis(1), last)
        .outer_iter()
        .map(|row| row.to_vec())
        .collect())
}

/// Chooses the named output, or the first one when the name is absent.
fn pick_output(outputs: Vec<(String, TensorOutput)>, name: &str) -> RecResult<TensorOutput> {
    let mut first = None;
    for (output_name, tensor) in outputs {
        if output_name == name {
            return Ok(tensor);
        }
        if first.is_none() {
            first = Some(tensor);
        }
    }
    first.ok_or_else(|| RecError::invalid_input(format!("model produced no '{name}' output")))
}

/// Session precision to use for a configuration, with the CPU downgrade logged.
pub fn session_precision(cfg: &BackendConfig) -> Precision {
    let effective = cfg.effective_precision();
    if effective != cfg.precision {
        tracing::warn!(
            "half precision is only used on accelerators; running '{}' in full precision on {}",
            cfg.model,
            cfg.device
        );
    }
    effective
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::DeviceSpec;

    #[test]
    fn test_pick_output_by_name_or_first() -> RecResult<()> {
        let outputs = vec![
            ("a".to_string(), TensorOutput::I64 { shape: vec![1], data: vec![1] }),
            ("logits".to_string(), TensorOutput::I64 { shape: vec![1], data: vec![2] }),
        ];
        match pick_output(outputs.clone(), "logits")? {
            TensorOutput::I64 { data, .. } => assert_eq!(data, vec![2]),
            other => panic!("unexpected output {other:?}"),
        }
        match pick_output(outputs, "missing")? {
            TensorOutput::I64 { data, .. } => assert_eq!(data, vec![1]),
            other => panic!("unexpected output {other:?}"),
        }
        assert!(pick_output(Vec::new(), "logits").is_err());
        Ok(())
    }

    fn hidden_states() -> Array3<f32> {
        // Row r is filled with r so selected rows are easy to recognise.
        Array3::from_shape_fn((3, 2, 4), |(r, _, _)| r as f32)
    }

    #[test]
    fn test_step_feed_selects_encoder_rows() -> RecResult<()> {
        let hidden = hidden_states();
        let rows: Vec<(usize, &[i64])> = vec![(2, &[0, 7][..]), (0, &[0, 9][..])];
        let feed = StepFeed::new(&rows, &hidden, false, true)?;

        let inputs = feed.inputs();
        let names: Vec<&str> = inputs.iter().map(|(name, _)| *name).collect();
        assert_eq!(names, vec![INPUT_IDS, ENCODER_HIDDEN_STATES, ENCODER_ATTENTION_MASK]);
        assert_eq!(inputs[0].1.shape(), vec![2, 2]);
        assert_eq!(inputs[2].1.shape(), vec![2, 2]);
        assert_eq!(feed.input_ids.as_slice(), Some(&[0, 7, 0, 9][..]));
        assert_eq!(feed.states.shape(), &[2, 2, 4]);
        assert!(feed.states.index_axis(Axis(0), 0).iter().all(|&v| v == 2.0));
        assert!(feed.states.index_axis(Axis(0), 1).iter().all(|&v| v == 0.0));
        Ok(())
    }

    #[test]
    fn test_step_feed_uses_f16_states_for_half_decoders() -> RecResult<()> {
        let hidden = hidden_states();
        let rows: Vec<(usize, &[i64])> = vec![(1, &[0][..])];
        let feed = StepFeed::new(&rows, &hidden, true, false)?;
        let inputs = feed.inputs();
        assert_eq!(inputs.len(), 2);
        match &inputs[1].1 {
            TensorInput::F16(states) => {
                assert_eq!(states.shape(), &[1, 2, 4]);
                assert!(states.iter().all(|&v| v == f16::from_f32(1.0)));
            }
            other => panic!("expected f16 states, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn test_step_feed_rejects_ragged_prefixes() {
        let hidden = hidden_states();
        let rows: Vec<(usize, &[i64])> = vec![(0, &[0, 1][..]), (1, &[0][..])];
        assert!(StepFeed::new(&rows, &hidden, false, false).is_err());
    }

    #[test]
    fn test_logits_come_from_the_last_position() -> RecResult<()> {
        // Two rows, three positions, vocabulary of two.
        let output = TensorOutput::F32 {
            shape: vec![2, 3, 2],
            data: vec![
                0.0, 0.0, 0.0, 0.0, 1.0, 2.0, //
                0.0, 0.0, 0.0, 0.0, 3.0, 4.0,
            ],
        };
        assert_eq!(last_position_logits(output)?, vec![vec![1.0, 2.0], vec![3.0, 4.0]]);

        let empty = TensorOutput::F32 {
            shape: vec![1, 0, 2],
            data: Vec::new(),
        };
        assert!(last_position_logits(empty).is_err());
        Ok(())
    }

    #[test]
    fn test_half_precision_is_downgraded_on_cpu() {
        let cfg = BackendConfig::new("m").with_precision(Precision::Half);
        assert_eq!(session_precision(&cfg), Precision::Full);
        let cfg = cfg.with_device(DeviceSpec::Cuda(0));
        assert_eq!(session_precision(&cfg), Precision::Half);
    }
}
