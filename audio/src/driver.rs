//! Output driver: the device callback contract
//!
//! Each invocation pulls one block from the queue, pads whatever the queue
//! could not provide with silence, records the callback for pacing, and
//! acknowledges a pending resume. It never blocks, allocates (after the
//! first call at a given size), or logs.

use std::sync::Arc;

use cpal::{FromSample, Sample};

use crate::clock::{ClockEstimator, PacingHandle};
use crate::diagnostics::AudioStats;
use crate::frame::Frame;
use crate::queue::QueueConsumer;
use crate::transport::TransportHandle;

/// Result of one driver invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockReport {
    /// Frames the device asked for
    pub requested: usize,
    /// Frames that came from the queue; the rest are silence
    pub filled: usize,
}

impl BlockReport {
    /// Whether the queue could not cover the block
    pub fn is_underrun(&self) -> bool {
        self.filled < self.requested
    }
}

/// Consumer side of the stream, moved into the device callback
pub struct OutputDriver {
    consumer: QueueConsumer,
    clock: ClockEstimator,
    transport: TransportHandle,
    stats: Arc<AudioStats>,
    block_size: usize,
    /// Frame staging for interleaved output, and the last rendered block
    scratch: Vec<Frame>,
}

impl OutputDriver {
    /// Create a driver producing `block_size` frames per invocation
    pub fn new(
        consumer: QueueConsumer,
        clock: ClockEstimator,
        transport: TransportHandle,
        stats: Arc<AudioStats>,
        block_size: u32,
    ) -> Self {
        let block_size = block_size.max(1) as usize;
        Self {
            consumer,
            clock,
            transport,
            stats,
            block_size,
            scratch: vec![Frame::SILENCE; block_size],
        }
    }

    /// Frames per invocation negotiated at setup
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Read side of the pacing estimate this driver maintains
    pub fn pacing(&self) -> PacingHandle {
        self.clock.handle()
    }

    /// Render into `out`, one invocation
    ///
    /// The first `filled` frames come from the queue in order, the rest are
    /// zeroed.
    pub fn render(&mut self, out: &mut [Frame]) -> BlockReport {
        if self.transport.acknowledge_resume() {
            // The time since the last callback before the suspend is not a delta
            self.clock.restart_interval();
        }
        self.clock.record_callback();

        let filled = self.consumer.pull_into(out);
        out[filled..].fill(Frame::SILENCE);

        self.stats.record_block(out.len(), filled);
        BlockReport {
            requested: out.len(),
            filled,
        }
    }

    /// Render one `block_size` block into the driver's own buffer
    ///
    /// The result stays readable through [`OutputDriver::last_block`].
    pub fn render_block(&mut self) -> BlockReport {
        let mut block = std::mem::take(&mut self.scratch);
        block.resize(self.block_size, Frame::SILENCE);
        let report = self.render(&mut block);
        self.scratch = block;
        report
    }

    /// The most recent block rendered by [`OutputDriver::render_block`]
    pub fn last_block(&self) -> &[Frame] {
        &self.scratch[..self.block_size.min(self.scratch.len())]
    }

    /// Render straight into an interleaved device buffer
    ///
    /// `channels` is the device channel count. Left/right go to the first two
    /// channels; any extra channels get silence, a mono device gets the
    /// average of both.
    pub fn render_interleaved<T>(&mut self, data: &mut [T], channels: usize) -> BlockReport
    where
        T: Sample + FromSample<f32>,
    {
        let channels = channels.max(1);
        let frames = data.len() / channels;

        // Resize staging if needed (rare, only on first use or a size change)
        let mut staging = std::mem::take(&mut self.scratch);
        if staging.len() < frames {
            staging.resize(frames, Frame::SILENCE);
        }
        let report = self.render(&mut staging[..frames]);

        for (slot, frame) in data.chunks_exact_mut(channels).zip(&staging[..frames]) {
            if channels == 1 {
                slot[0] = T::from_sample((frame.left + frame.right) * 0.5);
                continue;
            }
            slot[0] = T::from_sample(frame.left);
            slot[1] = T::from_sample(frame.right);
            for extra in &mut slot[2..] {
                *extra = T::EQUILIBRIUM;
            }
        }
        // Trailing partial frame, if the host handed us one
        for sample in &mut data[frames * channels..] {
            *sample = T::EQUILIBRIUM;
        }

        self.scratch = staging;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::DEFAULT_PACING_WINDOW;
    use crate::queue::{QueueProducer, SampleQueue};
    use crate::transport::{Transport, TransportState};

    fn setup(
        block_size: u32,
        capacity: usize,
    ) -> (QueueProducer, OutputDriver, Transport, Arc<AudioStats>) {
        let stats = Arc::new(AudioStats::new());
        let (producer, consumer) = SampleQueue::new(capacity, stats.clone()).split();
        let transport = Transport::new();
        let driver = OutputDriver::new(
            consumer,
            ClockEstimator::for_stream(DEFAULT_PACING_WINDOW, block_size, 44_100),
            transport.handle(),
            stats.clone(),
            block_size,
        );
        (producer, driver, transport, stats)
    }

    #[test]
    fn test_partial_block_padded_with_silence() {
        let (mut producer, mut driver, _transport, stats) = setup(4, 16);
        let f0 = Frame::new(0.1, 0.2);
        let f1 = Frame::new(0.3, 0.4);
        producer.push(&[f0, f1]);

        let report = driver.render_block();
        assert_eq!(report, BlockReport { requested: 4, filled: 2 });
        assert!(report.is_underrun());
        assert_eq!(driver.last_block(), &[f0, f1, Frame::SILENCE, Frame::SILENCE]);
        assert_eq!(stats.underruns(), 1);
    }

    #[test]
    fn test_empty_queue_all_silence() {
        let (_producer, mut driver, _transport, _stats) = setup(8, 16);
        let mut out = [Frame::new(1.0, 1.0); 8];
        let report = driver.render(&mut out);
        assert_eq!(report.filled, 0);
        assert!(out.iter().all(|f| f.is_silent()));
    }

    #[test]
    fn test_full_block_no_underrun() {
        let (mut producer, mut driver, _transport, stats) = setup(4, 16);
        producer.push(&[Frame::mono(0.5); 6]);

        assert!(!driver.render_block().is_underrun());
        assert_eq!(producer.len(), 2);
        assert_eq!(stats.underruns(), 0);
        assert_eq!(stats.callbacks(), 1);
    }

    #[test]
    fn test_first_callback_acknowledges_resume() {
        let (_producer, mut driver, transport, _stats) = setup(4, 16);
        transport.play();
        assert_eq!(transport.state(), TransportState::Starting);

        driver.render_block();
        assert_eq!(transport.state(), TransportState::Running);
    }

    #[test]
    fn test_underrun_leaves_transport_running() {
        let (_producer, mut driver, transport, _stats) = setup(4, 16);
        transport.play();
        for _ in 0..10 {
            assert!(driver.render_block().is_underrun());
        }
        assert!(transport.is_running());
    }

    #[test]
    fn test_interleaved_f32() {
        let (mut producer, mut driver, _transport, _stats) = setup(3, 16);
        producer.push(&[Frame::new(0.25, -0.25), Frame::new(0.5, -0.5)]);

        let mut data = [9.0f32; 6];
        let report = driver.render_interleaved(&mut data, 2);
        assert_eq!(report.filled, 2);
        assert_eq!(data, [0.25, -0.25, 0.5, -0.5, 0.0, 0.0]);
    }

    #[test]
    fn test_interleaved_u16_silence_is_midpoint() {
        let (_producer, mut driver, _transport, _stats) = setup(2, 16);
        let mut data = [0u16; 4];
        driver.render_interleaved(&mut data, 2);
        assert!(data.iter().all(|&s| s == 32768));
    }

    #[test]
    fn test_interleaved_i16_extra_channels() {
        let (mut producer, mut driver, _transport, _stats) = setup(1, 16);
        producer.push(&[Frame::new(1.0, -1.0)]);

        let mut data = [7i16; 4];
        driver.render_interleaved(&mut data, 4);
        assert_eq!(data[0], i16::MAX);
        assert!(data[1] <= -i16::MAX);
        assert_eq!(&data[2..], &[0, 0]);
    }

    #[test]
    fn test_interleaved_mono_mixdown() {
        let (mut producer, mut driver, _transport, _stats) = setup(2, 16);
        producer.push(&[Frame::new(0.5, 0.0), Frame::new(0.25, 0.25)]);

        let mut data = [1.0f32; 2];
        driver.render_interleaved(&mut data, 1);
        assert_eq!(data, [0.25, 0.25]);
    }

    #[test]
    fn test_callbacks_feed_pacing() {
        let (_producer, mut driver, _transport, _stats) = setup(4, 16);
        let pacing = driver.pacing();
        let nominal = pacing.pacing_ms();
        std::thread::sleep(std::time::Duration::from_millis(2));
        driver.render_block();
        // First callback only stores the timestamp
        assert_eq!(pacing.pacing_ms(), nominal);
        std::thread::sleep(std::time::Duration::from_millis(5));
        driver.render_block();
        assert!(pacing.pacing_ms() >= 5.0);
    }

    #[test]
    fn test_pause_gap_not_counted_as_delta() {
        let (_producer, mut driver, transport, _stats) = setup(4, 16);
        let pacing = driver.pacing();
        transport.play();
        for _ in 0..10 {
            std::thread::sleep(std::time::Duration::from_millis(2));
            driver.render_block();
        }
        let before = pacing.pacing_ms();

        transport.stop();
        std::thread::sleep(std::time::Duration::from_millis(200));
        transport.play();
        driver.render_block();

        assert_eq!(transport.state(), TransportState::Running);
        assert_eq!(pacing.pacing_ms(), before);
    }
}
