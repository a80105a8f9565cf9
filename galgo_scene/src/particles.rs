//! Particle emitter component: parallel slot arrays with free-index reuse and
//! independently seeded attribute streams, so a restored emitter continues the
//! exact sequence an uninterrupted run would have produced.

use std::collections::VecDeque;
use std::sync::Arc;

use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::SeedableRng;

use galgo_variant::Vec2;

use crate::render::SpriteRequest;

// One fixed seed per attribute stream. Streams are independent so that
// discarding `generated` samples from each reproduces the continuation.
const SEED_EMIT_ANGLE: u64 = 298;
const SEED_EMIT_RADIUS: u64 = 404;
const SEED_ROTATION: u64 = 440;
const SEED_SPEED: u64 = 498;
const SEED_SCALE: u64 = 494;
const SEED_SPIN: u64 = 305;

/// Uniform sampler over a fixed range with its own deterministic stream.
#[derive(Clone)]
pub struct RangeSampler {
    dist: Uniform<f32>,
    rng: StdRng,
}

impl RangeSampler {
    pub fn new(min: f32, max: f32, seed: u64) -> Self {
        let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
        Self {
            dist: Uniform::new_inclusive(lo, hi),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    #[inline]
    pub fn sample(&mut self) -> f32 {
        self.dist.sample(&mut self.rng)
    }

    /// Advance the stream by `n` samples without keeping them.
    pub fn discard(&mut self, n: u64) {
        for _ in 0..n {
            let _ = self.dist.sample(&mut self.rng);
        }
    }
}

#[derive(Clone)]
struct AttributeStreams {
    emit_angle: RangeSampler,
    emit_radius: RangeSampler,
    rotation: RangeSampler,
    speed: RangeSampler,
    scale: RangeSampler,
    spin: RangeSampler,
}

impl AttributeStreams {
    fn discard_all(&mut self, n: u64) {
        self.emit_angle.discard(n);
        self.emit_radius.discard(n);
        self.rotation.discard(n);
        self.speed.discard(n);
        self.scale.discard(n);
        self.spin.discard(n);
    }
}

/// Which per-particle interpolations this emitter performs. All four paths
/// compute identical results, the specialized ones just skip dead work.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum UpdateMode {
    #[default]
    Full,
    NoColor,
    NoScale,
    Bare,
}

#[derive(Clone)]
pub struct ParticleEmitter {
    // Slot arrays; a slot is live while its age is within the lifetime cap.
    pub positions: Vec<Vec2>,
    pub ages: Vec<f32>,
    pub velocities: Vec<Vec2>,
    /// x = angular velocity, y = rotation.
    pub spins: Vec<Vec2>,
    pub scales: Vec<f32>,
    pub free_slots: VecDeque<usize>,

    // Configuration. Range fields hold (min, max) in x/y.
    pub start_pos: Vec2,
    pub start_speed: Vec2,
    pub rotation_speed: Vec2,
    pub accel: Vec2,
    pub start_scale: Vec2,
    pub rotation_range: Vec2,
    pub emit_radius_range: Vec2,
    pub emit_angle_range: Vec2,
    pub start_color: [u8; 4],
    pub end_color: [u8; 4],
    /// Which end-color channels were explicitly configured.
    pub end_mask: [bool; 4],
    pub drag_factor: f32,
    pub angular_drag_factor: f32,
    pub end_scale: Option<f32>,
    pub frames_between_bursts: i32,
    pub burst_quantity: i32,
    pub duration_frames: i32,
    pub sorting_order: i32,
    pub image: Arc<str>,

    // Runtime state.
    pub lifetime_per_frame: f32,
    pub lifetime_cap: f32,
    pub generated: u64,
    pub frame_count: i32,
    pub playing: bool,
    pub enabled: bool,
    pub mode: UpdateMode,
    streams: Option<AttributeStreams>,
}

impl Default for ParticleEmitter {
    fn default() -> Self {
        Self {
            positions: Vec::new(),
            ages: Vec::new(),
            velocities: Vec::new(),
            spins: Vec::new(),
            scales: Vec::new(),
            free_slots: VecDeque::new(),
            start_pos: Vec2::ZERO,
            start_speed: Vec2::ZERO,
            rotation_speed: Vec2::ZERO,
            accel: Vec2::ZERO,
            start_scale: Vec2::new(1.0, 1.0),
            rotation_range: Vec2::ZERO,
            emit_radius_range: Vec2::new(0.0, 0.5),
            emit_angle_range: Vec2::new(0.0, 360.0),
            start_color: [255, 255, 255, 255],
            end_color: [255, 255, 255, 255],
            end_mask: [false; 4],
            drag_factor: 1.0,
            angular_drag_factor: 1.0,
            end_scale: None,
            frames_between_bursts: 1,
            burst_quantity: 1,
            duration_frames: 300,
            sorting_order: 9999,
            image: Arc::<str>::from(""),
            lifetime_per_frame: 0.0,
            lifetime_cap: 0.0,
            generated: 0,
            frame_count: 0,
            playing: true,
            enabled: true,
            mode: UpdateMode::Full,
            streams: None,
        }
    }
}

impl ParticleEmitter {
    pub fn play(&mut self) {
        self.playing = true;
    }

    pub fn stop(&mut self) {
        self.playing = false;
    }

    pub fn live_particles(&self) -> usize {
        self.ages.iter().filter(|a| **a <= self.lifetime_cap).count()
    }

    pub fn set_end_color(&mut self, channel: usize, value: u8) {
        self.end_color[channel] = value;
        self.end_mask[channel] = true;
    }

    /// First-frame setup: clamp cadence knobs, quantize the per-frame age
    /// step so the final frame of a particle's life stays stable across
    /// float precision, seed streams, pick the interpolation path.
    pub fn start(&mut self) {
        if self.duration_frames < 1 {
            self.duration_frames = 1;
        }
        if self.burst_quantity < 1 {
            self.burst_quantity = 1;
        }
        if self.frames_between_bursts < 1 {
            self.frames_between_bursts = 1;
        }
        self.lifetime_per_frame = 1.0 / self.duration_frames as f32;
        let quantum = if self.duration_frames <= 60 {
            100_000_000.0
        } else {
            1_000_000_000.0
        };
        let significand = (self.lifetime_per_frame * quantum) as i64;
        self.lifetime_per_frame = significand as f32 / quantum;
        self.lifetime_cap = 0.999999 + self.lifetime_per_frame;

        self.streams = Some(self.make_streams());
        self.mode = self.select_mode();
    }

    /// After a state restore: re-seed every stream and discard the samples
    /// already consumed, so the continuation matches an uninterrupted run.
    /// The quantized lifetime values come in with the restored state.
    pub fn restore_streams(&mut self) {
        let mut streams = self.make_streams();
        streams.discard_all(self.generated);
        self.streams = Some(streams);
        self.mode = self.select_mode();
    }

    fn make_streams(&self) -> AttributeStreams {
        AttributeStreams {
            emit_angle: RangeSampler::new(
                self.emit_angle_range.x,
                self.emit_angle_range.y,
                SEED_EMIT_ANGLE,
            ),
            emit_radius: RangeSampler::new(
                self.emit_radius_range.x,
                self.emit_radius_range.y,
                SEED_EMIT_RADIUS,
            ),
            rotation: RangeSampler::new(
                self.rotation_range.x,
                self.rotation_range.y,
                SEED_ROTATION,
            ),
            speed: RangeSampler::new(self.start_speed.x, self.start_speed.y, SEED_SPEED),
            scale: RangeSampler::new(self.start_scale.x, self.start_scale.y, SEED_SCALE),
            spin: RangeSampler::new(self.rotation_speed.x, self.rotation_speed.y, SEED_SPIN),
        }
    }

    fn select_mode(&self) -> UpdateMode {
        let no_scale = self.end_scale.is_none();
        let no_color = !self.end_mask.iter().any(|set| *set);
        match (no_scale, no_color) {
            (true, true) => UpdateMode::Bare,
            (false, true) => UpdateMode::NoColor,
            (true, false) => UpdateMode::NoScale,
            (false, false) => UpdateMode::Full,
        }
    }

    /// Emit one batch, recycling expired slots before growing the arrays.
    pub fn burst(&mut self) {
        if self.streams.is_none() {
            self.streams = Some(self.make_streams());
        }
        let Some(streams) = self.streams.as_mut() else {
            return;
        };
        for _ in 0..self.burst_quantity {
            let angle = streams.emit_angle.sample().to_radians();
            let dist = streams.emit_radius.sample();
            let position = Vec2::new(
                self.start_pos.x + dist * angle.cos(),
                self.start_pos.y + dist * angle.sin(),
            );
            let rotation = streams.rotation.sample();
            let speed = streams.speed.sample();
            let velocity = Vec2::new(angle.cos() * speed, angle.sin() * speed);
            let angular_velocity = streams.spin.sample();
            let scale = streams.scale.sample();

            if let Some(slot) = self.free_slots.pop_front() {
                self.positions[slot] = position;
                self.ages[slot] = 0.0;
                self.velocities[slot] = velocity;
                self.spins[slot] = Vec2::new(angular_velocity, rotation);
                self.scales[slot] = scale;
            } else {
                self.positions.push(position);
                self.ages.push(0.0);
                self.velocities.push(velocity);
                self.spins.push(Vec2::new(angular_velocity, rotation));
                self.scales.push(scale);
            }
            self.generated += 1;
        }
    }

    pub fn update(&mut self, queue: &mut Vec<SpriteRequest>) {
        match self.mode {
            UpdateMode::Full => self.update_full(queue),
            UpdateMode::NoColor => self.update_no_color(queue),
            UpdateMode::NoScale => self.update_no_scale(queue),
            UpdateMode::Bare => self.update_bare(queue),
        }
    }

    fn maybe_burst(&mut self) {
        if self.frame_count % self.frames_between_bursts == 0 && self.playing {
            self.burst();
        }
    }

    /// Slot step shared by the four paths: expire-or-integrate. Returns the
    /// particle's age when the slot stays live this frame.
    #[inline]
    fn integrate_slot(&mut self, i: usize) -> Option<f32> {
        if self.ages[i] > self.lifetime_cap {
            return None;
        }
        if self.ages[i] >= 0.999999 {
            self.free_slots.push_back(i);
            // Push past the cap so the slot cannot expire twice.
            self.ages[i] += 1.0;
            return None;
        }
        self.velocities[i].x += self.accel.x;
        self.velocities[i].y += self.accel.y;
        self.velocities[i].x *= self.drag_factor;
        self.velocities[i].y *= self.drag_factor;
        self.spins[i].x *= self.angular_drag_factor;
        self.spins[i].y += self.spins[i].x;
        self.positions[i].x += self.velocities[i].x;
        self.positions[i].y += self.velocities[i].y;
        let age = self.ages[i];
        self.ages[i] += self.lifetime_per_frame;
        Some(age)
    }

    #[inline]
    fn mixed_color(&self, age: f32) -> [u8; 4] {
        let mut color = self.start_color;
        for channel in 0..4 {
            if self.end_mask[channel] {
                color[channel] = mix_u8(self.start_color[channel], self.end_color[channel], age);
            }
        }
        color
    }

    #[inline]
    fn submit(&self, queue: &mut Vec<SpriteRequest>, i: usize, scale: f32, color: [u8; 4]) {
        queue.push(SpriteRequest {
            image: self.image.clone(),
            x: self.positions[i].x,
            y: self.positions[i].y,
            scale_x: scale,
            scale_y: scale,
            rotation: self.spins[i].y,
            pivot_x: 0.5,
            pivot_y: 0.5,
            sorting_order: self.sorting_order,
            color,
        });
    }

    fn update_full(&mut self, queue: &mut Vec<SpriteRequest>) {
        self.maybe_burst();
        let end_scale = self.end_scale.unwrap_or(0.0);
        for i in 0..self.positions.len() {
            if let Some(age) = self.integrate_slot(i) {
                let scale = mix_f32(self.scales[i], end_scale, age);
                let color = self.mixed_color(age);
                self.submit(queue, i, scale, color);
            }
        }
        self.frame_count += 1;
    }

    fn update_no_color(&mut self, queue: &mut Vec<SpriteRequest>) {
        self.maybe_burst();
        let end_scale = self.end_scale.unwrap_or(0.0);
        for i in 0..self.positions.len() {
            if let Some(age) = self.integrate_slot(i) {
                let scale = mix_f32(self.scales[i], end_scale, age);
                self.submit(queue, i, scale, self.start_color);
            }
        }
        self.frame_count += 1;
    }

    fn update_no_scale(&mut self, queue: &mut Vec<SpriteRequest>) {
        self.maybe_burst();
        for i in 0..self.positions.len() {
            if let Some(age) = self.integrate_slot(i) {
                let color = self.mixed_color(age);
                self.submit(queue, i, self.scales[i], color);
            }
        }
        self.frame_count += 1;
    }

    fn update_bare(&mut self, queue: &mut Vec<SpriteRequest>) {
        self.maybe_burst();
        for i in 0..self.positions.len() {
            if self.integrate_slot(i).is_some() {
                self.submit(queue, i, self.scales[i], self.start_color);
            }
        }
        self.frame_count += 1;
    }
}

#[inline]
fn mix_f32(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

#[inline]
fn mix_u8(a: u8, b: u8, t: f32) -> u8 {
    (a as f32 + (b as f32 - a as f32) * t) as u8
}
