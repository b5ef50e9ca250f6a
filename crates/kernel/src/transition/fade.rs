use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const CLEAR: Rgba = Rgba::new(0.0, 0.0, 0.0, 0.0);
    pub const BLACK: Rgba = Rgba::new(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Rgba = Rgba::new(1.0, 1.0, 1.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn lerp(self, to: Rgba, t: f32) -> Rgba {
        let t = t.clamp(0.0, 1.0);
        Rgba {
            r: self.r + (to.r - self.r) * t,
            g: self.g + (to.g - self.g) * t,
            b: self.b + (to.b - self.b) * t,
            a: self.a + (to.a - self.a) * t,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ColorSegment {
    from: Rgba,
    to: Rgba,
    duration: Duration,
}

/// Overlay color over time, as a queue of linear segments.
///
/// Progress is measured in elapsed time rather than ticks, so a fade lasts as
/// long as configured regardless of tick rate. Time left over when a segment
/// ends carries into the next one.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorTrack {
    segments: VecDeque<ColorSegment>,
    elapsed: Duration,
    current: Rgba,
}

impl ColorTrack {
    pub fn fade(from: Rgba, to: Rgba, duration: Duration) -> Self {
        Self::starting_at(from).then(from, to, duration)
    }

    /// Opaque black to transparent, the reverse of [`ColorTrack::fade_to_opaque`].
    pub fn fade_to_clear(duration: Duration) -> Self {
        Self::fade(Rgba::BLACK, Rgba::CLEAR, duration)
    }

    pub fn fade_to_opaque(duration: Duration) -> Self {
        Self::fade(Rgba::CLEAR, Rgba::BLACK, duration)
    }

    /// Solid white for `hold`, then white to opaque black over `fade`.
    pub fn flash(hold: Duration, fade: Duration) -> Self {
        Self::starting_at(Rgba::WHITE)
            .then(Rgba::WHITE, Rgba::WHITE, hold)
            .then(Rgba::WHITE, Rgba::BLACK, fade)
    }

    fn starting_at(color: Rgba) -> Self {
        Self {
            segments: VecDeque::new(),
            elapsed: Duration::ZERO,
            current: color,
        }
    }

    fn then(mut self, from: Rgba, to: Rgba, duration: Duration) -> Self {
        self.segments.push_back(ColorSegment { from, to, duration });
        self
    }

    pub fn current(&self) -> Rgba {
        self.current
    }

    pub fn is_finished(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn advance(&mut self, dt: Duration) -> Rgba {
        let mut budget = self.elapsed.saturating_add(dt);
        while let Some(segment) = self.segments.front().copied() {
            if budget < segment.duration {
                let t = budget.as_secs_f32() / segment.duration.as_secs_f32();
                self.current = segment.from.lerp(segment.to, t);
                self.elapsed = budget;
                return self.current;
            }
            budget -= segment.duration;
            self.current = segment.to;
            self.segments.pop_front();
        }
        self.elapsed = Duration::ZERO;
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f32, expected: f32) {
        assert!(
            (actual - expected).abs() < 1e-4,
            "{actual} vs {expected}"
        );
    }

    #[test]
    fn fade_tracks_elapsed_time_not_calls() {
        let mut coarse = ColorTrack::fade_to_opaque(Duration::from_secs(1));
        coarse.advance(Duration::from_millis(500));

        let mut fine = ColorTrack::fade_to_opaque(Duration::from_secs(1));
        for _ in 0..50 {
            fine.advance(Duration::from_millis(10));
        }

        assert_close(coarse.current().a, 0.5);
        assert_close(fine.current().a, 0.5);
        assert!(!coarse.is_finished());
    }

    #[test]
    fn fade_finishes_exactly_at_target() {
        let mut track = ColorTrack::fade_to_clear(Duration::from_millis(200));
        let color = track.advance(Duration::from_millis(250));
        assert_eq!(color, Rgba::CLEAR);
        assert!(track.is_finished());
    }

    #[test]
    fn flash_holds_white_then_fades_to_black() {
        let mut track = ColorTrack::flash(Duration::from_millis(150), Duration::from_millis(200));

        assert_eq!(track.advance(Duration::from_millis(100)), Rgba::WHITE);

        // 150ms hold done, 100ms into the 200ms fade.
        let mid = track.advance(Duration::from_millis(150));
        assert_close(mid.r, 0.5);
        assert_close(mid.a, 1.0);

        assert_eq!(track.advance(Duration::from_millis(200)), Rgba::BLACK);
        assert!(track.is_finished());
    }

    #[test]
    fn zero_duration_fade_completes_on_first_advance() {
        let mut track = ColorTrack::fade_to_opaque(Duration::ZERO);
        assert_eq!(track.advance(Duration::ZERO), Rgba::BLACK);
        assert!(track.is_finished());
    }
}
