//! Transcript source trait and the channel-backed reference implementation

use crate::error::{PipelineError, Result};
use signstream_types::TranscriptSegment;
use std::sync::Arc;
use tokio::sync::mpsc;

/// A live stream of transcript segments.
///
/// The speech engine itself is an external collaborator; the pipeline only
/// needs a segment channel and suspend/resume control. Implementations
/// deliver segments through the receiver returned by [`take_segments`],
/// which the pipeline claims exactly once after acquisition.
///
/// [`take_segments`]: TranscriptSource::take_segments
pub trait TranscriptSource: Send {
    /// Claim the segment channel. Returns `None` if already claimed.
    fn take_segments(&mut self) -> Option<mpsc::UnboundedReceiver<TranscriptSegment>>;

    /// Suspend recognition without releasing the underlying resource.
    fn pause(&mut self) -> Result<()>;

    /// Resume a paused source.
    fn resume(&mut self) -> Result<()>;

    /// Release the underlying resource. The segment channel closes.
    fn stop(&mut self) -> Result<()>;
}

/// Factory the pipeline uses to acquire (and on recovery, re-acquire) a
/// transcript source. Injected at construction, never via global accessors.
pub type SourceFactory = Arc<dyn Fn() -> Result<Box<dyn TranscriptSource>> + Send + Sync>;

/// Host-side handle for pushing segments into a [`ChannelSource`].
#[derive(Debug, Clone)]
pub struct SegmentSender {
    tx: mpsc::UnboundedSender<TranscriptSegment>,
}

impl SegmentSender {
    /// Push a segment. Fails once the source side has been stopped.
    pub fn send(&self, segment: TranscriptSegment) -> Result<()> {
        self.tx
            .send(segment)
            .map_err(|_| PipelineError::Source("segment channel closed".to_string()))
    }
}

/// Channel-backed [`TranscriptSource`] for hosts that adapt their own
/// speech engine, and for tests.
pub struct ChannelSource {
    rx: Option<mpsc::UnboundedReceiver<TranscriptSegment>>,
    paused: bool,
}

impl ChannelSource {
    /// Create a paired sender and source.
    pub fn channel() -> (SegmentSender, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            SegmentSender { tx },
            Self {
                rx: Some(rx),
                paused: false,
            },
        )
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }
}

impl TranscriptSource for ChannelSource {
    fn take_segments(&mut self) -> Option<mpsc::UnboundedReceiver<TranscriptSegment>> {
        self.rx.take()
    }

    fn pause(&mut self) -> Result<()> {
        self.paused = true;
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        self.paused = false;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.rx = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_source_delivers_segments() {
        let (sender, mut source) = ChannelSource::channel();
        let mut rx = source.take_segments().unwrap();

        sender
            .send(TranscriptSegment::final_text("s1", "hello", 0.9))
            .unwrap();

        let seg = rx.recv().await.unwrap();
        assert_eq!(seg.text, "hello");
        assert!(seg.is_final);
    }

    #[test]
    fn test_segments_claimed_once() {
        let (_sender, mut source) = ChannelSource::channel();
        assert!(source.take_segments().is_some());
        assert!(source.take_segments().is_none());
    }

    #[test]
    fn test_send_after_stop_fails() {
        let (sender, mut source) = ChannelSource::channel();
        source.stop().unwrap();
        let result = sender.send(TranscriptSegment::final_text("s1", "hello", 0.9));
        assert!(result.is_err());
    }
}
