use std::sync::{Arc, Mutex};

use rodio::{OutputStreamHandle, Sink, Source};

use crate::error::{RecorderError, Result};
use crate::mixer::MixerManager;

pub const AUDIO_CHANNELS: u16 = 2;
pub const AUDIO_SAMPLE_RATE: u32 = 44_100;

/// Passthrough mixer: actually audible, backed by a rodio sink. The host
/// pushes mixed samples into the shared queue; the sink drains it.
///
/// The caller keeps the `OutputStream` alive; only the sink lives here.
pub struct RodioMixer {
    sink: Sink,
    queue: Arc<Mutex<Vec<i16>>>,
}

impl RodioMixer {
    pub fn new(stream_handle: &OutputStreamHandle) -> Result<Self> {
        let queue: Arc<Mutex<Vec<i16>>> = Default::default();
        let sink = Sink::try_new(stream_handle)
            .map_err(|e| RecorderError::AudioUnavailable(e.to_string()))?;
        sink.append(QueueStream::new(queue.clone()));

        Ok(RodioMixer { sink, queue })
    }

    /// Handle the host's mixing path appends samples to.
    pub fn queue_handle(&self) -> Arc<Mutex<Vec<i16>>> {
        self.queue.clone()
    }
}

impl MixerManager for RodioMixer {
    fn init(&mut self) {}

    fn suspend_audio(&mut self) {
        self.sink.pause();
    }

    fn resume_audio(&mut self) {
        self.sink.play();
    }

    fn update(&mut self, _virtual_millis: u32) {
        // device-driven; nothing to pump
    }

    fn is_suspended(&self) -> bool {
        self.sink.is_paused()
    }
}

/// Frames of silence emitted per underrun block. Bounds how long the
/// stream goes without re-checking the queue (~12ms at 44.1kHz).
const UNDERRUN_BLOCK_FRAMES: usize = 512;

/// Frames over which the last played frame decays to zero when the
/// queue runs dry, so an underrun does not click.
const UNDERRUN_FADE_FRAMES: usize = 8;

/// A continuously playing source over the host's mixed output. Plays
/// whatever the queue holds; when the queue runs dry it fades the last
/// frame down to silence and keeps emitting short silent blocks,
/// re-checking the queue between blocks.
#[derive(Debug, Clone)]
pub struct QueueStream {
    queue: Arc<Mutex<Vec<i16>>>,
    block: Vec<i16>,
    position: usize,
    last_frame: [i16; AUDIO_CHANNELS as usize],
}

impl QueueStream {
    pub fn new(queue: Arc<Mutex<Vec<i16>>>) -> Self {
        QueueStream {
            queue,
            block: Vec::new(),
            position: 0,
            last_frame: [0; AUDIO_CHANNELS as usize],
        }
    }

    fn refill(&mut self) {
        self.position = 0;
        if let Ok(mut queue) = self.queue.lock() {
            if !queue.is_empty() {
                self.block = std::mem::take(&mut *queue);
                return;
            }
        }

        let channels = AUDIO_CHANNELS as usize;
        self.block.clear();
        self.block.resize(UNDERRUN_BLOCK_FRAMES * channels, 0);
        for frame in 0..UNDERRUN_FADE_FRAMES {
            let gain = (UNDERRUN_FADE_FRAMES - frame) as i32;
            for channel in 0..channels {
                let faded = i32::from(self.last_frame[channel]) * gain
                    / UNDERRUN_FADE_FRAMES as i32;
                self.block[frame * channels + channel] = faded as i16;
            }
        }
    }
}

impl Iterator for QueueStream {
    type Item = i16;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.block.len() {
            self.refill();
        }
        let sample = self.block.get(self.position).copied().unwrap_or(0);
        self.last_frame[self.position % AUDIO_CHANNELS as usize] = sample;
        self.position += 1;
        Some(sample)
    }
}

impl Source for QueueStream {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        AUDIO_CHANNELS
    }

    fn sample_rate(&self) -> u32 {
        AUDIO_SAMPLE_RATE
    }

    fn total_duration(&self) -> Option<std::time::Duration> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHANNELS: usize = AUDIO_CHANNELS as usize;

    #[test]
    fn silent_stream_yields_zeroes() {
        let queue: Arc<Mutex<Vec<i16>>> = Default::default();
        let mut stream = QueueStream::new(queue);
        for _ in 0..UNDERRUN_BLOCK_FRAMES * CHANNELS + 32 {
            assert_eq!(stream.next(), Some(0));
        }
    }

    #[test]
    fn queued_samples_play_back_in_order() {
        let queue: Arc<Mutex<Vec<i16>>> = Default::default();
        queue.lock().unwrap().extend([10, -10, 20, -20]);
        let mut stream = QueueStream::new(queue);
        assert_eq!(stream.next(), Some(10));
        assert_eq!(stream.next(), Some(-10));
        assert_eq!(stream.next(), Some(20));
        assert_eq!(stream.next(), Some(-20));
    }

    #[test]
    fn underrun_fades_the_last_frame_to_silence() {
        let queue: Arc<Mutex<Vec<i16>>> = Default::default();
        queue.lock().unwrap().extend([800, -600]);
        let mut stream = QueueStream::new(queue);
        assert_eq!(stream.next(), Some(800));
        assert_eq!(stream.next(), Some(-600));

        // The queue is dry: the fade starts from the last frame and the
        // amplitude never grows on the way down to zero.
        let mut previous = (i16::MAX, i16::MAX);
        for _ in 0..UNDERRUN_FADE_FRAMES {
            let left = stream.next().unwrap();
            let right = stream.next().unwrap();
            assert!(left >= 0 && left.abs() <= previous.0);
            assert!(right <= 0 && right.abs() <= previous.1);
            previous = (left.abs(), right.abs());
        }
        for _ in UNDERRUN_FADE_FRAMES..UNDERRUN_BLOCK_FRAMES {
            assert_eq!(stream.next(), Some(0));
            assert_eq!(stream.next(), Some(0));
        }
    }

    #[test]
    fn queue_refills_are_picked_up_after_an_underrun_block() {
        let queue: Arc<Mutex<Vec<i16>>> = Default::default();
        let mut stream = QueueStream::new(queue.clone());
        for _ in 0..UNDERRUN_BLOCK_FRAMES * CHANNELS {
            stream.next();
        }
        queue.lock().unwrap().extend([3, 4]);
        assert_eq!(stream.next(), Some(3));
        assert_eq!(stream.next(), Some(4));
    }
}
