use crate::gemini::GeminiError;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Progress sink: percentage (0–100) plus a human status line, invoked after
/// every completed batch.
pub type ProgressFn<'a> = &'a (dyn Fn(u8, &str) + Send + Sync);

/// Produces one window of results. Calls are strictly sequential because each
/// window receives everything produced so far as continuity context.
#[async_trait]
pub trait BatchProducer<T>: Send + Sync {
    /// `start` is the 0-based index of the window's first unit; `count` is
    /// the window size (≤ batch size); `done` is everything produced so far.
    async fn produce(&self, start: usize, count: usize, done: &[T]) -> Result<Vec<T>, GeminiError>;

    /// Status line reported after the window covering `completed` units.
    fn status(&self, completed: usize, total: usize) -> String;
}

/// Partition `total_units` into windows of at most `batch_size`, run the
/// producer over each in order, and concatenate the results.
///
/// The cancellation token is checked before every window; a cancel observed
/// there fails the whole run and the partial results are dropped by the
/// caller (state only commits on full success). Progress is clamped to the
/// true number of completed units, so the final partial window reports 100
/// rather than overshooting.
pub async fn run_batched<T, P>(
    total_units: usize,
    batch_size: usize,
    producer: &P,
    cancel: &CancellationToken,
    on_progress: ProgressFn<'_>,
) -> Result<Vec<T>, GeminiError>
where
    T: Send,
    P: BatchProducer<T> + ?Sized,
{
    assert!(batch_size > 0, "batch_size must be positive");
    if total_units == 0 {
        on_progress(100, &producer.status(0, 0));
        return Ok(Vec::new());
    }

    let mut acc: Vec<T> = Vec::with_capacity(total_units);
    let mut start = 0usize;
    while start < total_units {
        if cancel.is_cancelled() {
            debug!("cancellation observed before batch at unit {start}");
            return Err(GeminiError::Cancelled);
        }
        let count = batch_size.min(total_units - start);
        let mut produced = producer.produce(start, count, &acc).await?;
        acc.append(&mut produced);

        let completed = start + count;
        let percent = ((completed as f64 / total_units as f64) * 100.0).round() as u8;
        on_progress(percent, &producer.status(completed, total_units));
        start = completed;
    }
    Ok(acc)
}
