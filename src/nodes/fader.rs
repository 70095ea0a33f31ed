/// A ramp waiting for the global clock to reach `start`.
#[derive(Clone, Copy, Debug, PartialEq)]
struct PendingFade {
    from: f32,
    to: f32,
    length: u64,
    start: u64,
}

/// Linear volume ramp, optionally starting at a scheduled global frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Fader {
    from: f32,
    to: f32,
    length: u64,
    cursor: u64,
    pending: Option<PendingFade>,
}

impl Default for Fader {
    fn default() -> Self {
        Self {
            from: 1.0,
            to: 1.0,
            length: 0,
            cursor: 0,
            pending: None,
        }
    }
}

impl Fader {
    /// Volume at the current position of the ramp.
    pub fn current(&self) -> f32 {
        if self.length == 0 || self.cursor >= self.length {
            return self.to;
        }
        let t = self.cursor as f32 / self.length as f32;
        self.from + (self.to - self.from) * t
    }

    /// Start a ramp now. A negative `from` continues from the current volume.
    pub fn set_fade(&mut self, from: f32, to: f32, length: u64) {
        let from = if from < 0.0 { self.current() } else { from };
        *self = Self {
            from,
            to,
            length,
            cursor: 0,
            pending: None,
        };
    }

    /// Start a ramp once the global clock reaches `start`. The running ramp
    /// carries on until then, and a negative `from` is resolved at that
    /// point.
    pub fn set_timed_fade(&mut self, from: f32, to: f32, length: u64, start: u64) {
        self.pending = Some(PendingFade {
            from,
            to,
            length,
            start,
        });
    }

    /// Gain for the frame at `global_frame`, advancing the ramp by one.
    pub fn gain_at(&mut self, global_frame: u64) -> f32 {
        if let Some(fade) = self.pending.filter(|f| global_frame >= f.start) {
            self.set_fade(fade.from, fade.to, fade.length);
        }
        let gain = self.current();
        if self.cursor < self.length {
            self.cursor += 1;
        }
        gain
    }
}
