//! Serial, paced removal over a list of candidates.

use crate::client::{panic_message, UnsubscribeClient};
use crate::models::{BatchItem, BatchSummary, Candidate, FailureReason, RemovalOutcome};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Emitted after each processed candidate. `index` is zero-based.
#[derive(Debug, Clone)]
pub struct BatchProgress {
    pub index: usize,
    pub total: usize,
    pub item: BatchItem,
}

/// Caller hooks for a batch run.
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub progress: Option<UnboundedSender<BatchProgress>>,
    /// Checked after every item; once set, the remaining candidates are
    /// skipped.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl BatchOptions {
    pub fn with_progress(mut self, sink: UnboundedSender<BatchProgress>) -> Self {
        self.progress = Some(sink);
        self
    }

    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}

impl UnsubscribeClient {
    /// Process `candidates` one at a time, in order, waiting
    /// `inter_item_delay` between attempts.
    pub async fn batch_unsubscribe(
        &self,
        candidates: &[Candidate],
        options: BatchOptions,
    ) -> BatchSummary {
        let total = candidates.len();
        let mut summary = BatchSummary::default();
        info!("starting batch of {total} candidates");

        for (index, candidate) in candidates.iter().enumerate() {
            let attempt = AssertUnwindSafe(self.unsubscribe_candidate(candidate))
                .catch_unwind()
                .await;
            let outcome = attempt.unwrap_or_else(|payload| {
                let details = panic_message(payload.as_ref());
                warn!("attempt for {} panicked: {details}", candidate.sender_email);
                RemovalOutcome::failed(
                    FailureReason::Failed,
                    "Unexpected error during unsubscribe",
                    candidate.unsubscribe_link.as_deref(),
                    details,
                )
            });

            let item = BatchItem {
                category: outcome.category(),
                outcome,
                sender_name: candidate.sender_name.clone(),
                sender_email: candidate.sender_email.clone(),
            };
            debug!(
                "[{}/{}] {} -> {:?}",
                index + 1,
                total,
                item.sender_email,
                item.outcome.method()
            );
            summary.record(item.clone());

            if let Some(sink) = &options.progress {
                // A dropped receiver only means nobody is listening.
                let _ = sink.send(BatchProgress { index, total, item });
            }

            if options.cancelled() {
                summary.cancelled = true;
                summary.skipped = total - index - 1;
                info!("batch cancelled, {} candidates skipped", summary.skipped);
                break;
            }

            if index + 1 < total {
                sleep(self.config().inter_item_delay).await;
            }
        }

        info!(
            "batch finished: {} succeeded, {} need manual action, {} failed",
            summary.auto_success_count, summary.manual_required_count, summary.failed_count
        );
        summary
    }
}
