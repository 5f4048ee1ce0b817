//! Overlapping document loading with recognition.
//!
//! A producer thread loads the next document and its page image and extracts
//! the line crops while the caller recognizes the current one. Documents are
//! handed over through a bounded channel, so at most `prefetch_depth`
//! prepared documents wait in memory.

use super::cancel::CancellationToken;
use super::extractor::{LineExtractor, LineFailure};
use crate::core::config::PipelineConfig;
use crate::core::errors::{RecError, RecResult};
use crate::domain::{LayoutDocument, LineCrop};
use crossbeam_channel::bounded;
use image::RgbImage;
use std::thread;
use tracing::debug;

/// A loaded document with its crops already extracted.
#[derive(Debug)]
pub struct Prepared<D> {
    pub document: D,
    pub extracted: Vec<Result<LineCrop, LineFailure>>,
}

/// Runs loading and extraction one step ahead of recognition.
#[derive(Debug, Clone)]
pub struct PrefetchRunner {
    depth: usize,
    extractor: LineExtractor,
    cancel: CancellationToken,
}

impl PrefetchRunner {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            depth: config.prefetch_depth.max(1),
            extractor: LineExtractor::new(config),
            cancel: CancellationToken::new(),
        }
    }

    /// Stops loading further documents once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Loads every item with `load` on a producer thread and passes each,
    /// in input order, to `handle` on the calling thread.
    ///
    /// Items that fail to load reach `handle` with their error. After
    /// cancellation the remaining items reach it with [`RecError::Cancelled`].
    pub fn run<T, D, L, H>(&self, items: Vec<T>, load: L, mut handle: H)
    where
        T: Send,
        D: AsRef<LayoutDocument> + Send,
        L: Fn(&T) -> RecResult<(D, RgbImage)> + Sync,
        H: FnMut(T, RecResult<Prepared<D>>),
    {
        let (tx, rx) = bounded::<(T, RecResult<Prepared<D>>)>(self.depth);
        let extractor = &self.extractor;
        let cancel = &self.cancel;
        let load = &load;

        thread::scope(|scope| {
            scope.spawn(move || {
                for item in items {
                    let prepared = if cancel.is_cancelled() {
                        Err(RecError::Cancelled)
                    } else {
                        load(&item).map(|(document, image)| {
                            let extracted =
                                extractor.crops(document.as_ref(), &image).iter().collect();
                            Prepared {
                                document,
                                extracted,
                            }
                        })
                    };
                    if tx.send((item, prepared)).is_err() {
                        debug!("prefetch consumer stopped, dropping remaining documents");
                        break;
                    }
                }
            });

            for (item, prepared) in rx {
                handle(item, prepared);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Region, TextLine};
    use crate::processors::Polygon;
    use std::sync::Mutex;

    fn load(lines: &usize) -> RecResult<(LayoutDocument, RgbImage)> {
        if *lines == 0 {
            return Err(RecError::malformed_document("no lines"));
        }
        let lines = (0..*lines)
            .map(|i| {
                let y = (i * 10) as f32;
                TextLine::new(format!("l{i}"), Polygon::from_coords(0.0, y, 40.0, y + 8.0))
            })
            .collect();
        let doc = LayoutDocument::new("page", vec![Region::new("r", lines)])
            .map_err(|id| RecError::malformed_document(format!("duplicate line {id}")))?;
        Ok((doc, RgbImage::new(50, 100)))
    }

    #[test]
    fn test_items_arrive_in_order_with_crops() {
        let runner = PrefetchRunner::new(&PipelineConfig::default());
        let mut seen = Vec::new();
        runner.run(vec![2usize, 0, 3], load, |item, prepared| {
            seen.push((item, prepared.map(|p| p.extracted.len()).ok()));
        });
        assert_eq!(seen, vec![(2, Some(2)), (0, None), (3, Some(3))]);
    }

    #[test]
    fn test_cancellation_stops_loading() {
        let token = CancellationToken::new();
        let runner = PrefetchRunner::new(&PipelineConfig::default()).with_cancellation(token.clone());
        let loads = Mutex::new(0usize);
        let mut outcomes = Vec::new();
        runner.run(
            vec![1usize, 1, 1, 1],
            |n| {
                *loads.lock().unwrap() += 1;
                load(n)
            },
            |_, prepared| {
                token.cancel();
                outcomes.push(matches!(prepared, Err(RecError::Cancelled)));
            },
        );
        assert_eq!(outcomes.len(), 4);
        assert!(!outcomes[0]);
        assert!(outcomes[3]);
        // With depth 1, at most two documents are loaded ahead of the first cancel.
        assert!(*loads.lock().unwrap() <= 3);
    }
}
