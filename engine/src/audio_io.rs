pub const TARGET_SAMPLE_RATE: u32 = 16_000;
pub const TARGET_CHANNELS: u16 = 1;

/// One fixed-size block of mono samples in [-1.0, 1.0].
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub samples: Vec<f32>,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>) -> Self {
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn to_pcm16(&self) -> Vec<i16> {
        self.samples
            .iter()
            .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
            .collect()
    }
}

/// Linear resampler that keeps its phase between calls, so feeding a signal
/// in chunks yields the same samples as feeding it in one piece.
pub(crate) struct LinearResampler {
    /// Source samples advanced per output sample.
    step: f64,
    /// Position of the next output sample, relative to `carry` (or the next input).
    phase: f64,
    /// Last source sample of the previous call, still needed for interpolation.
    carry: Option<f32>,
}

impl LinearResampler {
    /// Zero rates pass audio through unchanged.
    pub(crate) fn new(from_sr: u32, to_sr: u32) -> Self {
        let step = if from_sr == 0 || to_sr == 0 {
            1.0
        } else {
            from_sr as f64 / to_sr as f64
        };
        Self {
            step,
            phase: 0.0,
            carry: None,
        }
    }

    pub(crate) fn process(&mut self, input: &[f32], output: &mut Vec<f32>) {
        if self.step == 1.0 {
            output.extend_from_slice(input);
            return;
        }

        let mut source = Vec::with_capacity(input.len() + 1);
        source.extend(self.carry.take());
        source.extend_from_slice(input);

        let mut pos = self.phase;
        loop {
            let idx = pos.floor() as usize;
            if idx + 1 >= source.len() {
                break;
            }
            let frac = (pos - idx as f64) as f32;
            output.push(source[idx] + (source[idx + 1] - source[idx]) * frac);
            pos += self.step;
        }

        // the sample under `pos` is the left end of the next interpolation
        let consumed = (pos.floor() as usize).min(source.len());
        self.carry = source.get(consumed).copied();
        self.phase = pos - consumed as f64;
    }
}

/// Averages interleaved channels into a mono signal.
pub(crate) fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}
