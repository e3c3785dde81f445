/// Callback the host registers to fill (or observe) sample buffers.
pub type SampleCallback = Box<dyn FnMut(&mut [i16]) + Send>;

/// Seam between the engine and whatever produces audible output.
///
/// The engine only ever suspends, resumes and ticks a mixer; mixing
/// itself stays on the other side of this trait.
pub trait MixerManager: Send {
    fn init(&mut self);
    fn suspend_audio(&mut self);
    fn resume_audio(&mut self);
    /// Periodic drive from the engine, stamped with virtual time.
    fn update(&mut self, virtual_millis: u32);
    fn is_suspended(&self) -> bool;
}

/// Synthetic sample rate of the stand-in mixer.
pub const NULL_MIXER_OUTPUT_RATE: u32 = 22_050;

/// Sample frames handed to the callback per synthetic invocation.
pub const NULL_MIXER_CALLBACK_PERIOD: u32 = 1_024;

/// Stand-in mixer active outside passthrough. It never touches an audio
/// device; it fulfils sample demand at a fixed synthetic rate with zeroed
/// buffers, driven entirely by virtual time.
pub struct NullMixer {
    output_rate: u32,
    callback_period: u32,
    calls_counter: u64,
    total_frames: u64,
    pending_frames: u64,
    last_update_millis: Option<u32>,
    suspended: bool,
    callback: Option<SampleCallback>,
    samples_buf: Vec<i16>,
}

impl Default for NullMixer {
    fn default() -> Self {
        Self::new()
    }
}

impl NullMixer {
    pub fn new() -> Self {
        NullMixer {
            output_rate: NULL_MIXER_OUTPUT_RATE,
            callback_period: NULL_MIXER_CALLBACK_PERIOD,
            calls_counter: 0,
            total_frames: 0,
            pending_frames: 0,
            last_update_millis: None,
            suspended: true,
            callback: None,
            samples_buf: vec![0; NULL_MIXER_CALLBACK_PERIOD as usize],
        }
    }

    pub fn set_callback(&mut self, callback: SampleCallback) {
        self.callback = Some(callback);
    }

    pub fn calls_counter(&self) -> u64 {
        self.calls_counter
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }
}

impl MixerManager for NullMixer {
    fn init(&mut self) {
        self.calls_counter = 0;
        self.total_frames = 0;
        self.pending_frames = 0;
        self.last_update_millis = None;
    }

    fn suspend_audio(&mut self) {
        self.suspended = true;
    }

    fn resume_audio(&mut self) {
        self.suspended = false;
        self.last_update_millis = None;
    }

    fn update(&mut self, virtual_millis: u32) {
        if self.suspended {
            return;
        }
        let last = match self.last_update_millis {
            Some(last) => last,
            None => {
                self.last_update_millis = Some(virtual_millis);
                return;
            }
        };
        let elapsed_ms = u64::from(virtual_millis.wrapping_sub(last));
        self.last_update_millis = Some(virtual_millis);
        self.pending_frames += elapsed_ms * u64::from(self.output_rate) / 1000;

        while self.pending_frames >= u64::from(self.callback_period) {
            self.pending_frames -= u64::from(self.callback_period);
            self.samples_buf.fill(0);
            if let Some(cb) = self.callback.as_mut() {
                cb(&mut self.samples_buf);
            }
            self.calls_counter += 1;
            self.total_frames += u64::from(self.callback_period);
        }
    }

    fn is_suspended(&self) -> bool {
        self.suspended
    }
}
