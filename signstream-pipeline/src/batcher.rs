//! Batching scheduler: accumulates finalized text until a flush trigger
//!
//! The scheduler itself is synchronous and timer-free; the pipeline owns
//! the quiet-period timer and calls [`BatchScheduler::take_batch`] when
//! either trigger fires. Keeping the accumulator pure makes the flush
//! semantics unit-testable without a runtime.

use std::time::Instant;

/// What a push did to the pending buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Buffered; (re)arm the quiet-period timer.
    Buffered,
    /// The word threshold was reached; flush immediately, preempting the timer.
    SizeTriggered,
}

/// One batch ready for translation.
#[derive(Debug, Clone)]
pub struct PendingBatch {
    /// Normalized, space-joined batch text
    pub text: String,
    /// Receipt time of the segment that triggered the flush
    pub triggered_at: Instant,
}

/// Accumulates finalized transcript text between flushes.
pub struct BatchScheduler {
    pending: Vec<String>,
    word_count: usize,
    max_batch_size: usize,
    last_push: Option<Instant>,
}

impl BatchScheduler {
    pub fn new(max_batch_size: usize) -> Self {
        Self {
            pending: Vec::new(),
            word_count: 0,
            max_batch_size,
            last_push: None,
        }
    }

    /// Append a final segment's text, normalized to lowercase with
    /// collapsed whitespace. Returns whether the size trigger fired.
    pub fn push_final(&mut self, text: &str, now: Instant) -> PushOutcome {
        let normalized = normalize(text);
        if normalized.is_empty() {
            return PushOutcome::Buffered;
        }

        self.word_count += normalized.split(' ').count();
        self.pending.push(normalized);
        self.last_push = Some(now);

        if self.word_count >= self.max_batch_size {
            PushOutcome::SizeTriggered
        } else {
            PushOutcome::Buffered
        }
    }

    /// Atomically drain the buffer into a batch.
    ///
    /// The buffer is empty the moment this returns, so a translation
    /// failure can never lose or duplicate words from a later batch.
    pub fn take_batch(&mut self) -> Option<PendingBatch> {
        if self.pending.is_empty() {
            return None;
        }
        let words = std::mem::take(&mut self.pending);
        self.word_count = 0;
        let triggered_at = self.last_push.take().unwrap_or_else(Instant::now);
        Some(PendingBatch {
            text: words.join(" "),
            triggered_at,
        })
    }

    pub fn word_count(&self) -> usize {
        self.word_count
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drop any pending text, used on stop.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.word_count = 0;
        self.last_push = None;
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_normalizes_and_counts_words() {
        let mut batcher = BatchScheduler::new(10);
        assert_eq!(
            batcher.push_final("  HELLO   There ", Instant::now()),
            PushOutcome::Buffered
        );
        assert_eq!(batcher.word_count(), 2);

        let batch = batcher.take_batch().unwrap();
        assert_eq!(batch.text, "hello there");
    }

    #[test]
    fn test_size_trigger_preempts_timer() {
        let mut batcher = BatchScheduler::new(3);
        let now = Instant::now();
        assert_eq!(batcher.push_final("one", now), PushOutcome::Buffered);
        assert_eq!(batcher.push_final("two", now), PushOutcome::Buffered);
        assert_eq!(batcher.push_final("three", now), PushOutcome::SizeTriggered);
    }

    #[test]
    fn test_size_trigger_at_tenth_of_eleven_words() {
        // Eleven single-word segments with max_batch_size = 10: the 10th
        // flushes on size, the 11th waits for the timer.
        let mut batcher = BatchScheduler::new(10);
        let now = Instant::now();
        for i in 0..9 {
            assert_eq!(
                batcher.push_final(&format!("w{}", i), now),
                PushOutcome::Buffered
            );
        }
        assert_eq!(batcher.push_final("w9", now), PushOutcome::SizeTriggered);

        let first = batcher.take_batch().unwrap();
        assert_eq!(first.text.split(' ').count(), 10);
        assert!(batcher.is_empty());

        assert_eq!(batcher.push_final("w10", now), PushOutcome::Buffered);
        let second = batcher.take_batch().unwrap();
        assert_eq!(second.text, "w10");
    }

    #[test]
    fn test_buffer_empty_immediately_after_take() {
        let mut batcher = BatchScheduler::new(10);
        batcher.push_final("hello world", Instant::now());
        let batch = batcher.take_batch().unwrap();
        assert_eq!(batch.text, "hello world");
        assert!(batcher.is_empty());
        assert_eq!(batcher.word_count(), 0);
        assert!(batcher.take_batch().is_none());
    }

    #[test]
    fn test_multiword_segment_can_overshoot_threshold() {
        let mut batcher = BatchScheduler::new(10);
        let now = Instant::now();
        batcher.push_final("a b c d e f", now);
        assert_eq!(
            batcher.push_final("g h i j k l", now),
            PushOutcome::SizeTriggered
        );
        let batch = batcher.take_batch().unwrap();
        assert_eq!(batch.text.split(' ').count(), 12);
    }

    #[test]
    fn test_whitespace_only_segment_is_ignored() {
        let mut batcher = BatchScheduler::new(10);
        assert_eq!(
            batcher.push_final("   ", Instant::now()),
            PushOutcome::Buffered
        );
        assert!(batcher.is_empty());
        assert!(batcher.take_batch().is_none());
    }
}
