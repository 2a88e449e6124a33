//! Tap dot state shared between the coordinator and the rendering backends.
//!
//! All bookkeeping (adding, clearing, fading, pruning) happens here behind a
//! single lock; backends only read snapshots on their render tick. That keeps
//! the "clear on slide change, then add for the new slide" ordering correct
//! no matter which thread renders.

use parking_lot::Mutex;
use std::f32::consts::PI;
use std::time::{Duration, Instant};

/// Opaque RGB fill color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    /// Parse a `#RRGGBB` string.
    pub fn parse(s: &str) -> Option<Color> {
        let hex = s.strip_prefix('#')?;
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        Some(Color {
            r: u8::from_str_radix(&hex[0..2], 16).ok()?,
            g: u8::from_str_radix(&hex[2..4], 16).ok()?,
            b: u8::from_str_radix(&hex[4..6], 16).ok()?,
        })
    }
}

/// Appearance and fade timing for tap dots
#[derive(Debug, Clone)]
pub struct DotStyle {
    pub color: Color,
    pub radius_px: u32,
    /// Time from fully opaque to gone. Zero disables fading.
    pub fade: Duration,
}

/// One tap marker in virtual-desktop pixel coordinates
#[derive(Debug, Clone, Copy)]
pub struct Dot {
    pub x: i32,
    pub y: i32,
    created: Instant,
}

impl Dot {
    fn new_at(x: i32, y: i32, created: Instant) -> Self {
        Self { x, y, created }
    }

    /// Current opacity in [0, 1]: a half-cosine ease from 1 at creation down
    /// to exactly 0 once `fade` has elapsed.
    pub fn alpha(&self, now: Instant, fade: Duration) -> f32 {
        if fade.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.created);
        if elapsed >= fade {
            return 0.0;
        }
        let progress = elapsed.as_secs_f32() / fade.as_secs_f32();
        ((progress * PI).cos() + 1.0) / 2.0
    }

    pub fn is_expired(&self, now: Instant, fade: Duration) -> bool {
        !fade.is_zero() && now.saturating_duration_since(self.created) >= fade
    }
}

/// The set of currently visible dots
pub struct DotField {
    style: DotStyle,
    dots: Mutex<Vec<Dot>>,
}

impl DotField {
    pub fn new(style: DotStyle) -> Self {
        Self {
            style,
            dots: Mutex::new(Vec::new()),
        }
    }

    pub fn style(&self) -> &DotStyle {
        &self.style
    }

    /// Add a dot at the given pixel position, fully opaque.
    pub fn add(&self, x: i32, y: i32) {
        self.add_at(x, y, Instant::now());
    }

    pub(crate) fn add_at(&self, x: i32, y: i32, now: Instant) {
        self.dots.lock().push(Dot::new_at(x, y, now));
    }

    /// Drop every dot immediately.
    pub fn clear(&self) {
        self.dots.lock().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.dots.lock().is_empty()
    }

    /// Prune expired dots and return the remaining ones with their current
    /// opacity. Backends call this once per render tick.
    pub fn snapshot(&self, now: Instant) -> Vec<(Dot, f32)> {
        let fade = self.style.fade;
        let mut dots = self.dots.lock();
        dots.retain(|dot| !dot.is_expired(now, fade));
        dots.iter().map(|dot| (*dot, dot.alpha(now, fade))).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn style(fade_ms: u64) -> DotStyle {
        DotStyle {
            color: Color { r: 0x8E, g: 0x4E, b: 0xC6 },
            radius_px: 8,
            fade: Duration::from_millis(fade_ms),
        }
    }

    #[test]
    fn parses_hex_colors() {
        assert_eq!(
            Color::parse("#8E4EC6"),
            Some(Color { r: 0x8E, g: 0x4E, b: 0xC6 })
        );
        assert_eq!(Color::parse("#ffffff"), Some(Color { r: 255, g: 255, b: 255 }));
        assert_eq!(Color::parse("8E4EC6"), None);
        assert_eq!(Color::parse("#8E4EC"), None);
        assert_eq!(Color::parse("#8E4EGG"), None);
    }

    #[test]
    fn alpha_fades_monotonically_to_zero() {
        let fade = Duration::from_millis(10_000);
        let start = Instant::now();
        let dot = Dot::new_at(0, 0, start);

        let mut last = dot.alpha(start, fade);
        assert_eq!(last, 1.0);

        // Sample the curve at 100ms steps; it must strictly decrease.
        for step in 1..100 {
            let t = start + Duration::from_millis(step * 100);
            let alpha = dot.alpha(t, fade);
            assert!(
                alpha < last,
                "alpha {} at step {} should be below {}",
                alpha,
                step,
                last
            );
            last = alpha;
        }

        assert_eq!(dot.alpha(start + fade, fade), 0.0);
        assert_eq!(dot.alpha(start + fade + Duration::from_millis(1), fade), 0.0);
    }

    #[test]
    fn zero_fade_never_expires() {
        let start = Instant::now();
        let dot = Dot::new_at(0, 0, start);
        let much_later = start + Duration::from_secs(3600);
        assert_eq!(dot.alpha(much_later, Duration::ZERO), 1.0);
        assert!(!dot.is_expired(much_later, Duration::ZERO));
    }

    #[test]
    fn snapshot_prunes_expired_dots() {
        let field = DotField::new(style(1_000));
        let start = Instant::now();
        field.add_at(10, 20, start);
        field.add_at(30, 40, start + Duration::from_millis(900));

        // Just before the first dot expires: both visible
        let visible = field.snapshot(start + Duration::from_millis(999));
        assert_eq!(visible.len(), 2);

        // At exactly the fade duration the first dot is gone
        let visible = field.snapshot(start + Duration::from_millis(1_000));
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].0.x, 30);

        // And it stays gone on the next query
        let visible = field.snapshot(start + Duration::from_millis(1_001));
        assert_eq!(visible.len(), 1);
    }

    #[test]
    fn clear_removes_everything() {
        let field = DotField::new(style(10_000));
        field.add(1, 1);
        field.add(2, 2);
        assert!(!field.is_empty());

        field.clear();
        assert!(field.is_empty());
        assert!(field.snapshot(Instant::now()).is_empty());
    }
}
