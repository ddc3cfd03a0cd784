//! Paginated walk engine
//!
//! Recursive enumeration for backends that only expose paged listing. The
//! producer task owns the sink; the stream ends when the task finishes and the
//! sender is dropped, whichever way the loop exits.

use crate::object_layer::{ObjectLayer, WalkSink};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Spawn a background task that pages through `bucket`/`prefix` and pushes
/// every object into `results`.
///
/// Listing errors are logged and end the stream early; cancellation ends it
/// silently. Consumers only observe the stream closing.
pub fn spawn_paginated_walk<L>(
    layer: Arc<L>,
    ctx: CancellationToken,
    bucket: String,
    prefix: String,
    results: WalkSink,
) -> JoinHandle<()>
where
    L: ObjectLayer + ?Sized + 'static,
{
    tokio::spawn(async move {
        let mut marker = String::new();
        let mut pushed: u64 = 0;

        loop {
            if ctx.is_cancelled() {
                debug!(bucket = %bucket, prefix = %prefix, pushed, "walk cancelled");
                return;
            }

            let page = match layer.list_objects(&bucket, &prefix, &marker, "", None).await {
                Ok(page) => page,
                Err(e) => {
                    error!(error = %e, bucket = %bucket, prefix = %prefix, marker = %marker, "walk listing failed");
                    return;
                }
            };

            let last_name = page.objects.last().map(|obj| obj.name.clone());
            for obj in page.objects {
                tokio::select! {
                    biased;
                    _ = ctx.cancelled() => {
                        debug!(bucket = %bucket, prefix = %prefix, pushed, "walk cancelled");
                        return;
                    }
                    sent = results.send(obj) => {
                        if sent.is_err() {
                            // Receiver dropped
                            return;
                        }
                        pushed += 1;
                    }
                }
            }

            if !page.is_truncated {
                break;
            }

            marker = if !page.next_marker.is_empty() {
                page.next_marker
            } else if let Some(name) = last_name {
                name
            } else {
                error!(bucket = %bucket, prefix = %prefix, "truncated listing returned no marker, stopping walk");
                return;
            };
        }

        debug!(bucket = %bucket, prefix = %prefix, pushed, "walk complete");
    })
}
