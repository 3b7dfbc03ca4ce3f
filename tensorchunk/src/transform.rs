//! Parallel transform driver
//!
//! A pipeline maps each input to samples for named tensors. Inputs are split
//! into contiguous ranges, one per worker. Every worker writes its chunks
//! straight into the destination storage and keeps metadata in a private
//! in-memory provider; the worker outputs are then merged in range order.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::ChunkConfig;
use crate::engine::ChunkEngine;
use crate::error::{Error, Result};
use crate::merge::{merge_into, MergeSummary, WorkerOutput};
use crate::meta::TensorMeta;
use crate::sample::Sample;
use crate::storage::{MemoryProvider, StorageProvider};

/// Samples per tensor produced for one input
pub type TensorSamples = HashMap<String, Vec<Sample>>;

/// What a pipeline returned for one input
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    /// Samples keyed by tensor name
    Map(TensorSamples),
    List(Vec<Sample>),
    Sample(Sample),
}

impl Output {
    fn kind(&self) -> &'static str {
        match self {
            Output::Map(_) => "map",
            Output::List(_) => "list",
            Output::Sample(_) => "sample",
        }
    }
}

impl From<TensorSamples> for Output {
    fn from(map: TensorSamples) -> Self {
        Output::Map(map)
    }
}

/// Check that `output` maps declared tensor names to samples
pub fn verify_transform_output(output: Output, tensors: &[&str]) -> Result<TensorSamples> {
    let map = match output {
        Output::Map(map) => map,
        other => {
            return Err(Error::InvalidTransformOutput(format!(
                "expected a map of tensor name to samples, got a {}",
                other.kind()
            )))
        }
    };
    if let Some(unknown) = map.keys().find(|name| !tensors.contains(&name.as_str())) {
        return Err(Error::InvalidTransformOutput(format!("unknown tensor {unknown}")));
    }
    Ok(map)
}

/// Split `len` inputs into at most `workers` contiguous ranges
///
/// Range sizes differ by at most one and empty ranges are omitted.
pub fn partition(len: usize, workers: usize) -> Vec<Range<usize>> {
    let workers = workers.max(1).min(len.max(1));
    let (base, extra) = (len / workers, len % workers);
    let mut start = 0;
    (0..workers)
        .map(|w| {
            let size = base + usize::from(w < extra);
            let range = start..start + size;
            start += size;
            range
        })
        .filter(|r| !r.is_empty())
        .collect()
}

/// Runs a pipeline over inputs and merges the results into tensors
#[derive(Debug, Clone)]
pub struct Transform {
    storage: Arc<dyn StorageProvider>,
    config: ChunkConfig,
    num_workers: usize,
}

impl Transform {
    pub fn new(storage: Arc<dyn StorageProvider>, config: ChunkConfig) -> Self {
        Self {
            storage,
            config,
            num_workers: rayon::current_num_threads(),
        }
    }

    pub fn with_num_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers.max(1);
        self
    }

    /// Apply `pipeline` to every input and append the results to `tensors`
    ///
    /// Every output is verified before any chunk is written. Returns one
    /// merge summary per tensor, in the order of `tensors`.
    pub fn run<I, F, O>(&self, inputs: &[I], tensors: &mut [ChunkEngine], pipeline: F) -> Result<Vec<MergeSummary>>
    where
        I: Sync,
        F: Fn(&I) -> O + Sync,
        O: Into<Output>,
    {
        let names: Vec<String> = tensors.iter().map(|t| t.key().to_string()).collect();
        let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let templates = tensors
            .iter()
            .map(|t| t.tensor_meta().map(worker_template))
            .collect::<Result<Vec<_>>>()?;

        let ranges = partition(inputs.len(), self.num_workers);
        let outputs: Vec<Vec<TensorSamples>> = ranges
            .par_iter()
            .map(|range| {
                inputs[range.clone()]
                    .iter()
                    .map(|input| verify_transform_output(pipeline(input).into(), &name_refs))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<_>>()?;

        let worker_outputs: Vec<Vec<WorkerOutput>> = outputs
            .into_par_iter()
            .enumerate()
            .map(|(worker, outputs)| self.run_worker(worker, outputs, &names, &templates))
            .collect::<Result<_>>()?;

        let summaries = tensors
            .iter_mut()
            .enumerate()
            .map(|(t, tensor)| {
                let per_worker: Vec<WorkerOutput> =
                    worker_outputs.iter().map(|outputs| outputs[t].clone()).collect();
                merge_into(tensor, &per_worker)
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            inputs = inputs.len(),
            workers = ranges.len(),
            tensors = names.len(),
            "transform finished"
        );
        Ok(summaries)
    }

    /// Write one worker's samples and return its metadata per tensor
    fn run_worker(
        &self,
        worker: usize,
        outputs: Vec<TensorSamples>,
        names: &[String],
        templates: &[TensorMeta],
    ) -> Result<Vec<WorkerOutput>> {
        let mut per_tensor: Vec<Vec<Sample>> = vec![Vec::new(); names.len()];
        for mut output in outputs {
            for (name, samples) in names.iter().zip(per_tensor.iter_mut()) {
                if let Some(produced) = output.remove(name) {
                    samples.extend(produced);
                }
            }
        }

        names
            .iter()
            .zip(templates)
            .zip(per_tensor)
            .map(|((name, template), samples)| {
                let mut engine = ChunkEngine::with_meta_storage(
                    name,
                    self.storage.clone(),
                    Arc::new(MemoryProvider::new()),
                    self.config.clone(),
                );
                engine.create_tensor(template.clone())?;
                let count = samples.len();
                engine.extend(samples)?;
                debug!(worker, tensor = %name, samples = count, "worker wrote tensor");
                WorkerOutput::from_engine(&mut engine)
            })
            .collect()
    }
}

/// Declared settings of a tensor without any of its samples
fn worker_template(meta: TensorMeta) -> TensorMeta {
    TensorMeta {
        length: 0,
        min_shape: Vec::new(),
        max_shape: Vec::new(),
        ..meta
    }
}
