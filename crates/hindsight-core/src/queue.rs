//! Bounded drop-oldest queues connecting the pipeline stages.
//!
//! Every inter-stage queue in the recorder has the same discipline: FIFO,
//! bounded capacity, and overflow by displacing the *oldest* element. A
//! sender never waits on a full queue — under sustained overrun the newest
//! frames win and latency stays bounded at the cost of sample continuity.
//!
//! The stock `tokio::sync::mpsc` channel cannot express drop-oldest (its
//! `try_send` rejects the *new* element), so this is a small queue of our
//! own: a `Mutex<VecDeque>` for the buffer and a [`Notify`] to wake the
//! consumer.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

/// Default capacity for frame queues.
pub const DEFAULT_CAPACITY: usize = 256;

/// Outcome of a non-blocking push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Push {
    /// Enqueued without overflow.
    Queued,
    /// Enqueued, displacing the oldest element.
    Displaced,
    /// The receiver is gone; the element was dropped.
    Closed,
}

struct Shared<T> {
    buffer: Mutex<State<T>>,
    notify: Notify,
    capacity: usize,
    senders: AtomicUsize,
}

struct State<T> {
    items: VecDeque<T>,
    receiver_alive: bool,
}

/// Create a bounded drop-oldest queue. `capacity` is clamped to at least 1.
pub fn bounded<T>(capacity: usize) -> (QueueSender<T>, QueueReceiver<T>) {
    let shared = Arc::new(Shared {
        buffer: Mutex::new(State {
            items: VecDeque::with_capacity(capacity.max(1)),
            receiver_alive: true,
        }),
        notify: Notify::new(),
        capacity: capacity.max(1),
        senders: AtomicUsize::new(1),
    });
    (
        QueueSender {
            shared: Arc::clone(&shared),
        },
        QueueReceiver { shared },
    )
}

// ── Sender ────────────────────────────────────────────────────────────────────

/// Producer half. Cloneable; the queue closes when the last clone drops.
pub struct QueueSender<T> {
    shared: Arc<Shared<T>>,
}

impl<T> QueueSender<T> {
    /// Push without waiting. Displaces the oldest element on overflow.
    pub fn push(&self, item: T) -> Push {
        let outcome = {
            let mut state = self.shared.buffer.lock().expect("queue lock poisoned");
            if !state.receiver_alive {
                return Push::Closed;
            }
            if state.items.len() >= self.shared.capacity {
                state.items.pop_front();
                state.items.push_back(item);
                Push::Displaced
            } else {
                state.items.push_back(item);
                Push::Queued
            }
        };
        self.shared.notify.notify_one();
        outcome
    }

    /// Number of elements currently queued.
    pub fn len(&self) -> usize {
        self.shared.buffer.lock().expect("queue lock poisoned").items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        self.shared.senders.fetch_add(1, Ordering::Relaxed);
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Drop for QueueSender<T> {
    fn drop(&mut self) {
        if self.shared.senders.fetch_sub(1, Ordering::AcqRel) == 1 {
            // Last sender gone: wake the consumer so it can observe closure.
            self.shared.notify.notify_one();
        }
    }
}

// ── Receiver ──────────────────────────────────────────────────────────────────

/// Consumer half. Single consumer; FIFO within the queue.
pub struct QueueReceiver<T> {
    shared: Arc<Shared<T>>,
}

impl<T> QueueReceiver<T> {
    /// Receive the next element, waiting if the queue is empty. Returns
    /// `None` once every sender has dropped and the queue has drained.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            // Register for a wake-up before checking, so a push between the
            // check and the await is not lost.
            let notified = self.shared.notify.notified();
            {
                let mut state = self.shared.buffer.lock().expect("queue lock poisoned");
                if let Some(item) = state.items.pop_front() {
                    return Some(item);
                }
            }
            if self.shared.senders.load(Ordering::Acquire) == 0 {
                // Drained and no producer left.
                let mut state = self.shared.buffer.lock().expect("queue lock poisoned");
                if let Some(item) = state.items.pop_front() {
                    return Some(item);
                }
                return None;
            }
            notified.await;
        }
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Option<T> {
        self.shared
            .buffer
            .lock()
            .expect("queue lock poisoned")
            .items
            .pop_front()
    }

    pub fn len(&self) -> usize {
        self.shared.buffer.lock().expect("queue lock poisoned").items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Drop for QueueReceiver<T> {
    fn drop(&mut self) {
        let mut state = self.shared.buffer.lock().expect("queue lock poisoned");
        state.receiver_alive = false;
        state.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fifo_order_is_preserved() {
        let (tx, mut rx) = bounded(8);
        for i in 0..5 {
            assert_eq!(tx.push(i), Push::Queued);
        }
        for i in 0..5 {
            assert_eq!(rx.recv().await, Some(i));
        }
    }

    #[tokio::test]
    async fn overflow_displaces_the_oldest() {
        let (tx, mut rx) = bounded(3);
        assert_eq!(tx.push(1), Push::Queued);
        assert_eq!(tx.push(2), Push::Queued);
        assert_eq!(tx.push(3), Push::Queued);
        assert_eq!(tx.push(4), Push::Displaced);
        assert_eq!(tx.push(5), Push::Displaced);
        // 1 and 2 are gone; the newest survive in order.
        assert_eq!(rx.recv().await, Some(3));
        assert_eq!(rx.recv().await, Some(4));
        assert_eq!(rx.recv().await, Some(5));
    }

    #[tokio::test]
    async fn recv_returns_none_after_last_sender_drops() {
        let (tx, mut rx) = bounded::<u32>(4);
        let tx2 = tx.clone();
        tx.push(7);
        drop(tx);
        drop(tx2);
        assert_eq!(rx.recv().await, Some(7));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn push_after_receiver_drop_reports_closed() {
        let (tx, rx) = bounded(4);
        drop(rx);
        assert_eq!(tx.push(1), Push::Closed);
    }

    #[tokio::test]
    async fn recv_wakes_on_push_from_another_task() {
        let (tx, mut rx) = bounded(4);
        let handle = tokio::spawn(async move { rx.recv().await });
        tokio::task::yield_now().await;
        tx.push(42u32);
        assert_eq!(handle.await.unwrap(), Some(42));
    }

    #[tokio::test]
    async fn capacity_zero_is_clamped_to_one() {
        let (tx, mut rx) = bounded(0);
        assert_eq!(tx.push(1), Push::Queued);
        assert_eq!(tx.push(2), Push::Displaced);
        assert_eq!(rx.recv().await, Some(2));
    }
}
