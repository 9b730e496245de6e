//! Fan-out of encoded messages to live sessions.
//!
//! Every session owns a bounded outbound queue drained by its own writer
//! task. Fan-out only enqueues (`try_send`), so one slow client cannot hold
//! up delivery to the others: when its queue is full the message is dropped
//! for that client and counted as a failed delivery.

use std::sync::Arc;

use tokio::sync::mpsc;

use digsite_engine::ids::ShortId;

/// Default per-session queue capacity.
pub const OUTBOX_CAPACITY: usize = 256;

/// Upper bound on elements per message for bulk replies (tiles, dropped items).
pub const PAGE_SIZE: usize = 100;

/// An encoded JSON frame. Shared by refcount across every recipient.
pub type Outbound = Arc<[u8]>;

/// Sending half of a session's outbound queue.
pub type Outbox = mpsc::Sender<Outbound>;

/// Result of a single fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Enqueue `message` for every recipient except `exclude`.
///
/// Per-recipient failures (queue full, connection already gone) are logged
/// and counted, never returned.
pub fn fan_out<'a>(
    recipients: impl IntoIterator<Item = (&'a ShortId, &'a Outbox)>,
    exclude: Option<&ShortId>,
    message: &Outbound,
) -> FanoutReport {
    let mut report = FanoutReport::default();
    for (session_id, outbox) in recipients {
        if exclude == Some(session_id) {
            continue;
        }
        match outbox.try_send(Arc::clone(message)) {
            Ok(()) => report.delivered += 1,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!("Outbox for {} is full, dropping message", session_id);
                report.failed += 1;
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("Outbox for {} is closed, dropping message", session_id);
                report.failed += 1;
            }
        }
    }
    report
}

/// Split a bulk payload into pages of at most [`PAGE_SIZE`] elements.
/// An empty payload yields no pages.
pub fn pages<T>(items: &[T]) -> std::slice::Chunks<'_, T> {
    items.chunks(PAGE_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(text: &str) -> Outbound {
        text.as_bytes().into()
    }

    #[test]
    fn pages_of_250_are_100_100_50() {
        let items: Vec<u32> = (0..250).collect();
        let sizes: Vec<usize> = pages(&items).map(<[u32]>::len).collect();
        assert_eq!(sizes, vec![100, 100, 50]);
        let first_of_last = pages(&items).last().unwrap()[0];
        assert_eq!(first_of_last, 200);
    }

    #[test]
    fn empty_payload_has_no_pages() {
        let items: Vec<u32> = Vec::new();
        assert_eq!(pages(&items).count(), 0);
    }

    #[tokio::test]
    async fn excluded_session_receives_nothing() {
        let ids: Vec<ShortId> = ["AAAAAA", "BBBBBB", "CCCCCC"].map(ShortId::from).to_vec();
        let mut outboxes = Vec::new();
        let mut inboxes = Vec::new();
        for _ in &ids {
            let (tx, rx) = mpsc::channel(4);
            outboxes.push(tx);
            inboxes.push(rx);
        }

        let report = fan_out(ids.iter().zip(outboxes.iter()), Some(&ids[1]), &msg("hi"));
        assert_eq!(report, FanoutReport { delivered: 2, failed: 0 });

        assert_eq!(&*inboxes[0].recv().await.unwrap(), b"hi");
        assert!(inboxes[1].try_recv().is_err());
        assert_eq!(&*inboxes[2].recv().await.unwrap(), b"hi");
    }

    #[tokio::test]
    async fn failing_recipient_does_not_block_others() {
        let ids: Vec<ShortId> = ["AAAAAA", "BBBBBB", "CCCCCC"].map(ShortId::from).to_vec();

        let (full_tx, _full_rx) = mpsc::channel(1);
        full_tx.try_send(msg("backlog")).unwrap();
        let (closed_tx, closed_rx) = mpsc::channel(4);
        drop(closed_rx);
        let (ok_tx, mut ok_rx) = mpsc::channel(4);

        let outboxes = [full_tx, closed_tx, ok_tx];
        let report = fan_out(ids.iter().zip(outboxes.iter()), None, &msg("tick"));
        assert_eq!(report, FanoutReport { delivered: 1, failed: 2 });
        assert_eq!(&*ok_rx.recv().await.unwrap(), b"tick");
    }
}
