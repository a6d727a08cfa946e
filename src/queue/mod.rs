//! Weight-bounded work queue.
//!
//! The pipeline stages hand images to each other through these queues, and
//! the queue's capacity is what bounds the batch's peak memory: a producer
//! blocks until the decoded bytes it wants to enqueue fit under the limit.
//!
//! A single lock guards both the item list and the running weight total, so
//! the two can never disagree. Producers and consumers park on separate
//! condition variables.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

/// Types that know how many bytes they pin while queued.
pub trait Weighted {
    /// Queue weight in bytes.
    fn weight(&self) -> usize;
}

/// A queued message: either a job or a shutdown sentinel.
///
/// Sentinels carry no weight and bypass the capacity check, so a full queue
/// can always be told to shut down.
#[derive(Debug)]
pub enum Message<T> {
    Job(T),
    Shutdown,
}

struct Inner<T> {
    items: VecDeque<Message<T>>,
    used: usize,
}

/// A blocking FIFO queue bounded by total item weight rather than count.
pub struct BoundedQueue<T> {
    capacity: usize,
    inner: Mutex<Inner<T>>,
    not_full: Condvar,
    not_empty: Condvar,
}

impl<T: Weighted> BoundedQueue<T> {
    /// Create a queue admitting up to `capacity` bytes of queued weight.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                used: 0,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        }
    }

    /// Block until `job` fits under the capacity, then enqueue it.
    ///
    /// An item heavier than the whole capacity is admitted once the queue is
    /// empty; rejecting it outright would wedge the batch on its largest
    /// image.
    pub fn push(&self, job: T) {
        let weight = job.weight();
        let mut inner = self.inner.lock();
        while inner.used + weight > self.capacity && !inner.items.is_empty() {
            self.not_full.wait(&mut inner);
        }
        inner.used += weight;
        inner.items.push_back(Message::Job(job));
        self.not_empty.notify_one();
    }

    /// Enqueue a shutdown sentinel. Never blocks on capacity.
    ///
    /// Each sentinel wakes exactly one consumer; enqueue one per consumer
    /// thread to drain them all.
    pub fn push_shutdown(&self) {
        let mut inner = self.inner.lock();
        inner.items.push_back(Message::Shutdown);
        self.not_empty.notify_one();
    }

    /// Block until a message is available and dequeue it.
    pub fn pop(&self) -> Message<T> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(msg) = inner.items.pop_front() {
                if let Message::Job(job) = &msg {
                    inner.used -= job.weight();
                    // Freed weight may admit several waiting producers.
                    self.not_full.notify_all();
                }
                return msg;
            }
            self.not_empty.wait(&mut inner);
        }
    }

    /// Queued messages, sentinels included.
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    /// Bytes of job weight currently queued.
    pub fn used(&self) -> usize {
        self.inner.lock().used
    }

    /// The configured weight limit.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    struct Job(usize, &'static str);

    impl Weighted for Job {
        fn weight(&self) -> usize {
            self.0
        }
    }

    fn pop_job(queue: &BoundedQueue<Job>) -> Job {
        match queue.pop() {
            Message::Job(job) => job,
            Message::Shutdown => panic!("unexpected shutdown"),
        }
    }

    #[test]
    fn test_fifo_order() {
        let queue = BoundedQueue::new(100);
        queue.push(Job(10, "a"));
        queue.push(Job(10, "b"));
        queue.push(Job(10, "c"));
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.used(), 30);

        assert_eq!(pop_job(&queue).1, "a");
        assert_eq!(pop_job(&queue).1, "b");
        assert_eq!(pop_job(&queue).1, "c");
        assert_eq!(queue.used(), 0);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_push_blocks_until_weight_frees() {
        let queue = BoundedQueue::new(10);
        queue.push(Job(8, "first"));

        let pushed = AtomicBool::new(false);
        std::thread::scope(|s| {
            s.spawn(|| {
                queue.push(Job(8, "second"));
                pushed.store(true, Ordering::SeqCst);
            });

            // The second push exceeds the capacity while "first" is queued.
            std::thread::sleep(Duration::from_millis(50));
            assert!(!pushed.load(Ordering::SeqCst), "push did not block");

            assert_eq!(pop_job(&queue).1, "first");
            assert_eq!(pop_job(&queue).1, "second");
        });
        assert!(pushed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_oversize_job_admitted_when_empty() {
        // A job heavier than the capacity must still pass through.
        let queue = BoundedQueue::new(10);
        queue.push(Job(50, "huge"));
        assert_eq!(queue.used(), 50);
        assert_eq!(pop_job(&queue).1, "huge");
    }

    #[test]
    fn test_shutdown_bypasses_capacity() {
        let queue = BoundedQueue::new(10);
        queue.push(Job(10, "full"));
        // The queue is at capacity but the sentinel goes in regardless.
        queue.push_shutdown();
        assert_eq!(queue.len(), 2);

        assert_eq!(pop_job(&queue).1, "full");
        assert!(matches!(queue.pop(), Message::Shutdown));
    }

    #[test]
    fn test_sentinels_wake_all_consumers() {
        let queue: BoundedQueue<Job> = BoundedQueue::new(10);
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    assert!(matches!(queue.pop(), Message::Shutdown));
                });
            }
            for _ in 0..4 {
                queue.push_shutdown();
            }
        });
        assert!(queue.is_empty());
    }
}
