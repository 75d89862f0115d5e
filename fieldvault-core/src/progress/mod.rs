//! Progress reporting shared by every pipeline.
//!
//! Pipelines are plain iterators that do one unit of work per `next()`.
//! [`blocking_stream`] runs each step on tokio's blocking pool and yields the
//! events as a `Stream`, ending after the first terminal event.

mod format;

pub use format::{format_bytes, format_duration, fraction};

use futures_util::stream::{self, Stream};

/// An event emitted by a pipeline.
pub trait ProgressEvent: Send + 'static {
    /// Terminal error event carrying `message`.
    fn failure(message: String) -> Self;

    /// True for `Completed` and `Error` events.
    fn is_terminal(&self) -> bool;
}

/// Drive `steps` on the blocking pool, one step per poll.
///
/// Dropping the stream stops further work once the in-flight step returns.
pub fn blocking_stream<I>(steps: I) -> impl Stream<Item = I::Item> + Send
where
    I: Iterator + Send + 'static,
    I::Item: ProgressEvent,
{
    stream::unfold(Some(steps), |state| async move {
        let mut steps = state?;
        let joined = tokio::task::spawn_blocking(move || {
            let event = steps.next();
            (steps, event)
        })
        .await;

        match joined {
            Ok((steps, Some(event))) => {
                let next = if event.is_terminal() { None } else { Some(steps) };
                Some((event, next))
            }
            Ok((_, None)) => None,
            Err(e) => Some((I::Item::failure(format!("worker task failed: {e}")), None)),
        }
    })
}
