//! Autoregressive token generation.
//!
//! The decoder is abstracted as a [`StepLogits`] callback returning next-token
//! logits for a set of prefixes. All prefixes passed in one call have the same
//! length, so implementations can stack them into a single tensor.

use crate::core::config::DecodingStrategy;
use crate::core::errors::{ProcessingStage, RecError, RecResult};
use itertools::Itertools;
use rand::SeedableRng;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;

/// Produces next-token logits for a set of decoder prefixes.
pub trait StepLogits {
    /// `rows` pairs an encoder row index with the token prefix to extend.
    /// Returns one logit vector per entry, in the same order.
    fn next_logits(&mut self, rows: &[(usize, &[i64])]) -> RecResult<Vec<Vec<f32>>>;
}

impl<F> StepLogits for F
where
    F: FnMut(&[(usize, &[i64])]) -> RecResult<Vec<Vec<f32>>>,
{
    fn next_logits(&mut self, rows: &[(usize, &[i64])]) -> RecResult<Vec<Vec<f32>>> {
        self(rows)
    }
}

/// Token ids and limits controlling generation.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub decoder_start_token_id: i64,
    pub eos_token_id: i64,
    pub max_new_tokens: usize,
    pub strategy: DecodingStrategy,
    /// Tokens forced after the start token (task prompt).
    pub prompt: Vec<i64>,
}

impl GenerationParams {
    fn prefix(&self) -> Vec<i64> {
        let mut prefix = Vec::with_capacity(1 + self.prompt.len());
        prefix.push(self.decoder_start_token_id);
        prefix.extend_from_slice(&self.prompt);
        prefix
    }
}

/// A generated sequence for one input row.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedSequence {
    /// Generated tokens, without the start token, prompt, or EOS.
    pub tokens: Vec<i64>,
    /// Mean log-probability over every chosen token, EOS included.
    pub mean_logprob: Option<f32>,
}

impl GeneratedSequence {
    /// Geometric mean of the chosen token probabilities.
    pub fn confidence(&self) -> Option<f32> {
        self.mean_logprob
            .filter(|m| m.is_finite())
            .map(|m| m.exp().clamp(0.0, 1.0))
    }
}

/// Generates one sequence per encoder row.
pub fn generate(
    batch_size: usize,
    params: &GenerationParams,
    step: &mut dyn StepLogits,
) -> RecResult<Vec<GeneratedSequence>> {
    match params.strategy {
        DecodingStrategy::Greedy => token_by_token(batch_size, params, step, None),
        DecodingStrategy::Sampling { temperature, seed } => {
            let mut sampler = Sampler {
                rng: StdRng::seed_from_u64(seed),
                temperature,
            };
            token_by_token(batch_size, params, step, Some(&mut sampler))
        }
        DecodingStrategy::BeamSearch { num_beams } if num_beams <= 1 => {
            token_by_token(batch_size, params, step, None)
        }
        DecodingStrategy::BeamSearch { num_beams } => {
            beam_search(batch_size, num_beams, params, step)
        }
    }
}

/// Numerically stable log-softmax.
pub fn log_softmax(logits: &[f32]) -> RecResult<Vec<f32>> {
    let max = logits
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return Err(RecError::processing_message(
            ProcessingStage::Decoding,
            "decoder produced no finite logits",
        ));
    }
    let log_sum = logits
        .iter()
        .map(|&v| (v - max).exp())
        .filter(|v| !v.is_nan())
        .sum::<f32>()
        .ln();
    Ok(logits.iter().map(|&v| v - max - log_sum).collect())
}

struct Sampler {
    rng: StdRng,
    temperature: f32,
}

impl Sampler {
    fn pick(&mut self, logits: &[f32]) -> RecResult<usize> {
        let scaled: Vec<f32> = logits.iter().map(|v| v / self.temperature).collect();
        let weights: Vec<f32> = log_softmax(&scaled)?
            .into_iter()
            .map(|lp| if lp.is_nan() { 0.0 } else { lp.exp() })
            .collect();
        let dist = WeightedIndex::new(&weights)
            .map_err(|e| RecError::decoding("building sampling distribution", e))?;
        Ok(dist.sample(&mut self.rng))
    }
}

fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, &v)| {
            if v > best.1 { (i, v) } else { best }
        })
        .0
}

fn check_step_output(logits: &[Vec<f32>], expected: usize) -> RecResult<()> {
    if logits.len() != expected {
        return Err(RecError::processing_message(
            ProcessingStage::Decoding,
            format!(
                "decoder returned {} logit rows for {} prefixes",
                logits.len(),
                expected
            ),
        ));
    }
    Ok(())
}

/// Greedy and sampled decoding: one hypothesis per row.
fn token_by_token(
    batch_size: usize,
    params: &GenerationParams,
    step: &mut dyn StepLogits,
    mut sampler: Option<&mut Sampler>,
) -> RecResult<Vec<GeneratedSequence>> {
    let prefix_len = 1 + params.prompt.len();
    let mut seqs = vec![params.prefix(); batch_size];
    let mut logprob_sum = vec![0.0f32; batch_size];
    let mut chosen = vec![0usize; batch_size];
    let mut finished = vec![false; batch_size];

    for _ in 0..params.max_new_tokens {
        let active: Vec<usize> = (0..batch_size).filter(|&i| !finished[i]).collect();
        if active.is_empty() {
            break;
        }
        let logits = {
            let rows: Vec<(usize, &[i64])> =
                active.iter().map(|&i| (i, seqs[i].as_slice())).collect();
            step.next_logits(&rows)?
        };
        check_step_output(&logits, active.len())?;

        for (row_logits, &i) in logits.iter().zip(&active) {
            let logprobs = log_softmax(row_logits)?;
            let token = match sampler.as_deref_mut() {
                Some(sampler) => sampler.pick(row_logits)?,
                None => argmax(&logprobs),
            };
            logprob_sum[i] += logprobs[token];
            chosen[i] += 1;
            if token as i64 == params.eos_token_id {
                finished[i] = true;
            } else {
                seqs[i].push(token as i64);
            }
        }
    }

    Ok(seqs
        .into_iter()
        .enumerate()
        .map(|(i, seq)| GeneratedSequence {
            tokens: seq[prefix_len..].to_vec(),
            mean_logprob: (chosen[i] > 0).then(|| logprob_sum[i] / chosen[i] as f32),
        })
        .collect())
}

#[derive(Debug, Clone)]
struct Hypothesis {
    tokens: Vec<i64>,
    logprob_sum: f32,
    chosen: usize,
}

impl Hypothesis {
    fn normalized(&self) -> f32 {
        if self.chosen == 0 {
            f32::NEG_INFINITY
        } else {
            self.logprob_sum / self.chosen as f32
        }
    }
}

#[derive(Debug)]
struct BeamRow {
    live: Vec<Hypothesis>,
    finished: Vec<Hypothesis>,
}

fn beam_search(
    batch_size: usize,
    num_beams: usize,
    params: &GenerationParams,
    step: &mut dyn StepLogits,
) -> RecResult<Vec<GeneratedSequence>> {
    let prefix_len = 1 + params.prompt.len();
    let mut rows: Vec<BeamRow> = (0..batch_size)
        .map(|_| BeamRow {
            live: vec![Hypothesis {
                tokens: params.prefix(),
                logprob_sum: 0.0,
                chosen: 0,
            }],
            finished: Vec::new(),
        })
        .collect();

    for _ in 0..params.max_new_tokens {
        let logits = {
            let prefixes: Vec<(usize, &[i64])> = rows
                .iter()
                .enumerate()
                .flat_map(|(r, row)| row.live.iter().map(move |h| (r, h.tokens.as_slice())))
                .collect();
            if prefixes.is_empty() {
                break;
            }
            let logits = step.next_logits(&prefixes)?;
            check_step_output(&logits, prefixes.len())?;
            logits
        };

        let mut logits = logits.into_iter();
        for row in rows.iter_mut().filter(|row| !row.live.is_empty()) {
            // (beam index, token, cumulative log-probability)
            let mut candidates: Vec<(usize, usize, f32)> = Vec::new();
            for (b, hypothesis) in row.live.iter().enumerate() {
                let Some(row_logits) = logits.next() else {
                    return Err(RecError::processing_message(
                        ProcessingStage::Decoding,
                        "decoder returned too few logit rows",
                    ));
                };
                let logprobs = log_softmax(&row_logits)?;
                candidates.extend(
                    logprobs
                        .iter()
                        .enumerate()
                        .k_largest_by(2 * num_beams, |a, b| {
                            a.1.total_cmp(b.1).then(b.0.cmp(&a.0))
                        })
                        .map(|(token, lp)| (b, token, hypothesis.logprob_sum + lp)),
                );
            }
            candidates.sort_by(|a, b| {
                b.2.total_cmp(&a.2)
                    .then(a.0.cmp(&b.0))
                    .then(a.1.cmp(&b.1))
            });

            let mut next = Vec::with_capacity(num_beams);
            for (rank, (b, token, sum)) in candidates.into_iter().enumerate() {
                if next.len() == num_beams {
                    break;
                }
                let parent = &row.live[b];
                if token as i64 == params.eos_token_id {
                    if rank < num_beams {
                        row.finished.push(Hypothesis {
                            tokens: parent.tokens.clone(),
                            logprob_sum: sum,
                            chosen: parent.chosen + 1,
                        });
                    }
                    continue;
                }
                let mut tokens = parent.tokens.clone();
                tokens.push(token as i64);
                next.push(Hypothesis {
                    tokens,
                    logprob_sum: sum,
                    chosen: parent.chosen + 1,
                });
            }

            row.live = if row.finished.len() >= num_beams {
                Vec::new()
            } else {
                next
            };
        }
    }

    Ok(rows
        .into_iter()
        .map(|row| {
            let best = row
                .finished
                .into_iter()
                .chain(row.live)
                .reduce(|best, h| {
                    if h.normalized() > best.normalized() {
                        h
                    } else {
                        best
                    }
                });
            match best {
                Some(h) => GeneratedSequence {
                    tokens: h.tokens[prefix_len.min(h.tokens.len())..].to_vec(),
                    mean_logprob: (h.chosen > 0).then(|| h.normalized()),
                },
                None => GeneratedSequence {
                    tokens: Vec::new(),
                    mean_logprob: None,
                },
            }
        })
        .collect())
}
