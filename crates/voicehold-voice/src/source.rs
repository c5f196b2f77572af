//! Audio sources that a voice connection can play.

/// Number of interleaved output channels.
pub const CHANNELS: usize = 2;
/// Bytes per sample (signed 16-bit PCM).
pub const SAMPLE_WIDTH: usize = 2;
/// Output sample rate in Hz.
pub const SAMPLE_RATE: usize = 48_000;
/// Duration of one frame in milliseconds.
pub const FRAME_MILLIS: usize = 20;
/// Size in bytes of one 20ms stereo PCM frame: 2 * 2 * 48000 * 0.02.
pub const FRAME_SIZE: usize = CHANNELS * SAMPLE_WIDTH * SAMPLE_RATE * FRAME_MILLIS / 1000;

static SILENT_FRAME: [u8; FRAME_SIZE] = [0; FRAME_SIZE];

/// Something a voice connection can stream.
///
/// The connection pulls one frame per 20ms tick. Raw PCM sources report
/// `is_opus() == false` so the transport encodes them before sending.
pub trait AudioSource: Send {
    /// Produces the next frame. An empty slice ends playback.
    fn read(&mut self) -> &[u8];

    /// Whether frames are already Opus-encoded.
    fn is_opus(&self) -> bool;
}

/// An endless source of 20ms silent PCM frames.
#[derive(Debug, Default)]
pub struct SilenceSource {
    reads: u64,
}

impl SilenceSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frames handed out so far. Diagnostic only.
    pub fn reads(&self) -> u64 {
        self.reads
    }
}

impl AudioSource for SilenceSource {
    fn read(&mut self) -> &[u8] {
        self.reads = self.reads.wrapping_add(1);
        &SILENT_FRAME
    }

    fn is_opus(&self) -> bool {
        false
    }
}
