//! Pointer paths and typing schedules with human-shaped variance.
//!
//! Paths follow a Bezier curve through randomized control points offset from
//! the straight line, sampled at more waypoints for longer distances, with
//! per-waypoint micro-jitter.  Typing schedules slow slightly over long
//! strings and occasionally pause at word boundaries.  Both generators are
//! stateless: same inputs need not produce identical outputs, but the
//! configured bounds are hard invariants.

use std::time::Duration;

use rand::Rng;

use crate::config::{MotionConfig, TypingConfig};

/// A point in viewport coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        ((other.x - self.x).powi(2) + (other.y - self.y).powi(2)).sqrt()
    }
}

/// One timed step of a pointer movement.
#[derive(Debug, Clone, PartialEq)]
pub struct Waypoint {
    pub x: f64,
    pub y: f64,
    /// Pause before dispatching the move to this position.
    pub delay: Duration,
}

/// One timed keystroke of a typing sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Keystroke {
    pub ch: char,
    /// Pause before dispatching this character.
    pub delay: Duration,
}

/// Generate a curved, timed pointer path from `start` to `end`.
///
/// Invariants: the final waypoint lands exactly on `end`; every waypoint
/// stays within `config.max_overshoot_px` of the start/end bounding box;
/// the summed delays fall within `[min_duration_ms, max_duration_ms]`.
pub fn pointer_path<R: Rng + ?Sized>(
    start: Point,
    end: Point,
    config: &MotionConfig,
    rng: &mut R,
) -> Vec<Waypoint> {
    let distance = start.distance(&end);
    let max_waypoints = config.max_waypoints.max(config.min_waypoints);
    let count = ((distance / config.px_per_waypoint.max(1.0)).ceil() as usize)
        .clamp(config.min_waypoints.max(1), max_waypoints.max(1));

    let controls = control_polygon(start, end, distance, config, rng);

    let total_ms = rng.gen_range(config.min_duration_ms..=config.max_duration_ms.max(config.min_duration_ms)) as f64;

    // Relative step weights with variation, normalized to the total below.
    let variation = config.step_variation.clamp(0.0, 0.95);
    let weights: Vec<f64> = (0..count)
        .map(|_| rng.gen_range(1.0 - variation..=1.0 + variation))
        .collect();
    let weight_sum: f64 = weights.iter().sum();

    let lo_x = start.x.min(end.x) - config.max_overshoot_px;
    let hi_x = start.x.max(end.x) + config.max_overshoot_px;
    let lo_y = start.y.min(end.y) - config.max_overshoot_px;
    let hi_y = start.y.max(end.y) + config.max_overshoot_px;

    let mut path = Vec::with_capacity(count);
    for i in 0..count {
        let t = (i + 1) as f64 / count as f64;
        let p = de_casteljau(&controls, t);

        let (mut x, mut y) = (p.x, p.y);
        let is_last = i + 1 == count;
        if !is_last && config.jitter_px > 0.0 {
            x += rng.gen_range(-config.jitter_px..=config.jitter_px);
            y += rng.gen_range(-config.jitter_px..=config.jitter_px);
        }
        x = x.clamp(lo_x, hi_x);
        y = y.clamp(lo_y, hi_y);
        if is_last {
            x = end.x;
            y = end.y;
        }

        let delay_ms = weights[i] / weight_sum * total_ms;
        path.push(Waypoint {
            x,
            y,
            delay: Duration::from_secs_f64(delay_ms / 1_000.0),
        });
    }
    path
}

/// Build the Bezier control polygon: start, 1–3 perpendicular-offset control
/// points, end.
fn control_polygon<R: Rng + ?Sized>(
    start: Point,
    end: Point,
    distance: f64,
    config: &MotionConfig,
    rng: &mut R,
) -> Vec<Point> {
    let n_ctrl = rng.gen_range(
        config.control_points_min..=config.control_points_max.max(config.control_points_min),
    ) as usize;

    let dx = end.x - start.x;
    let dy = end.y - start.y;
    let (perp_x, perp_y) = if distance > f64::EPSILON {
        (-dy / distance, dx / distance)
    } else {
        (0.0, 0.0)
    };
    // Control points may not push sampled waypoints past the overshoot
    // bound, so the offset is capped by both knobs.
    let max_dev = (distance * config.deviation_ratio).min(config.max_overshoot_px);

    let mut controls = Vec::with_capacity(n_ctrl + 2);
    controls.push(start);
    for i in 1..=n_ctrl {
        let t = i as f64 / (n_ctrl + 1) as f64;
        let dev = if max_dev > f64::EPSILON {
            rng.gen_range(-max_dev..=max_dev)
        } else {
            0.0
        };
        controls.push(Point::new(
            start.x + dx * t + perp_x * dev,
            start.y + dy * t + perp_y * dev,
        ));
    }
    controls.push(end);
    controls
}

fn de_casteljau(points: &[Point], t: f64) -> Point {
    let mut layer: Vec<Point> = points.to_vec();
    while layer.len() > 1 {
        layer = layer
            .windows(2)
            .map(|pair| {
                Point::new(
                    pair[0].x + (pair[1].x - pair[0].x) * t,
                    pair[0].y + (pair[1].y - pair[0].y) * t,
                )
            })
            .collect();
    }
    layer[0]
}

/// Generate a per-character timing schedule for `text`.
///
/// Produces exactly one entry per character, in order.  The delay mean
/// drifts upward over the string (fatigue) and word boundaries occasionally
/// carry an extra think-pause; each component respects its configured
/// bounds.
pub fn typing_schedule<R: Rng + ?Sized>(
    text: &str,
    config: &TypingConfig,
    rng: &mut R,
) -> Vec<Keystroke> {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len().max(1) as f64;

    let mut schedule = Vec::with_capacity(chars.len());
    for (i, &ch) in chars.iter().enumerate() {
        let fatigue = 1.0 + config.fatigue_growth * (i as f64 / len);
        let class_multiplier = if ch.is_whitespace() {
            config.space_multiplier
        } else if matches!(ch, '.' | ',' | '!' | '?' | ';' | ':') {
            config.punctuation_multiplier
        } else {
            1.0
        };
        let variation = rng.gen_range(config.variation_min..=config.variation_max);

        let mut delay_ms = (config.base_delay_ms * class_multiplier * fatigue * variation).clamp(
            config.min_char_delay_ms.max(1) as f64,
            config.max_char_delay_ms.max(config.min_char_delay_ms.max(1)) as f64,
        );

        if ch.is_whitespace() && rng.gen_bool(config.think_pause_probability.clamp(0.0, 1.0)) {
            delay_ms += rng
                .gen_range(config.think_pause_min_ms..=config.think_pause_max_ms.max(config.think_pause_min_ms))
                as f64;
        }

        schedule.push(Keystroke {
            ch,
            delay: Duration::from_secs_f64(delay_ms / 1_000.0),
        });
    }
    schedule
}
