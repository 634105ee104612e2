//! Random numbers for the host side of the integrator, plus the sequences
//! and warps shared with the per-pixel kernels.

use std::f32::consts::PI;

use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::geometry::{Vec2, Vec3};

/// Seeded host sampler: camera jitter, lens offsets, light choice, roulette
#[derive(Clone, Debug)]
pub struct Sampler {
    rng: ChaCha8Rng,
}

impl Sampler {
    pub fn new(seed: u64) -> Self {
        Sampler { rng: ChaCha8Rng::seed_from_u64(seed) }
    }

    /// Independent stream for the same seed
    pub fn with_stream(seed: u64, stream: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        rng.set_stream(stream);
        Sampler { rng }
    }

    pub fn uniform(&mut self) -> f32 {
        self.rng.random::<f32>()
    }

    pub fn uniform2(&mut self) -> Vec2 {
        Vec2(self.uniform(), self.uniform())
    }

    pub fn index(&mut self, len: usize) -> usize {
        self.rng.random_range(0..len)
    }

    pub fn unit_disk(&mut self) -> Vec2 {
        let u = self.uniform2();
        unit_disk(u.0, u.1)
    }

    /// Nonzero xorshift states, one per pixel
    pub fn pixel_states(&mut self, n: usize) -> Vec<u32> {
        (0..n).map(|_| self.rng.next_u32() | 1).collect()
    }

    pub fn next_u32(&mut self) -> u32 {
        self.rng.next_u32()
    }
}

/// Maps a uniform number to [-1, 1] with a triangular density
pub fn tent(u: f32) -> f32 {
    let x = 2.0 * u;
    if x < 1.0 {
        x.sqrt() - 1.0
    } else {
        1.0 - (2.0 - x).sqrt()
    }
}

pub fn unit_disk(u1: f32, u2: f32) -> Vec2 {
    let r = u1.sqrt();
    let theta = 2.0 * PI * u2;
    Vec2(r * theta.cos(), r * theta.sin())
}

/// Cosine-weighted direction around +z
pub fn cosine_hemisphere(u1: f32, u2: f32) -> Vec3 {
    let d = unit_disk(u1, u2);
    let z = f32::max(0.0, 1.0 - d.0 * d.0 - d.1 * d.1).sqrt();
    Vec3(d.0, d.1, z)
}

/// Unit vector uniformly distributed on the sphere
pub fn uniform_sphere(u1: f32, u2: f32) -> Vec3 {
    let z = 1.0 - 2.0 * u1;
    let r = f32::max(0.0, 1.0 - z * z).sqrt();
    let phi = 2.0 * PI * u2;
    Vec3(r * phi.cos(), r * phi.sin(), z)
}

/// Expresses `local` (around +z) in the frame whose z axis is `n`
pub fn to_world(local: Vec3, n: Vec3) -> Vec3 {
    let (t, b) = Vec3::orthonormal_basis(n);
    t * local.0 + b * local.1 + n * local.2
}

const GOLDEN_RATIO_CONJUGATE: f32 = 0.618_034;

/// Point `i` of an `n`-point Fermat spiral, in the unit square.
///
/// Warped through `unit_disk` the points fill the disk evenly, so through
/// `cosine_hemisphere` they cover the hemisphere with cosine density.
/// Indices past `n` start another pass over the spiral, shifted within each
/// radial stratum, so every pass stays stratified.
pub fn fermat_spiral(i: u32, n: u32) -> (f32, f32) {
    let n = n.max(1);
    let pass = i / n;
    let offset = (0.5 + pass as f32 * GOLDEN_RATIO_CONJUGATE).fract();
    let u1 = ((i % n) as f32 + offset) / n as f32;
    let u2 = (i as f32 * GOLDEN_RATIO_CONJUGATE).fract();
    (u1, u2)
}

/// Toroidal shift of a point in the unit square
pub fn cranley_patterson(point: (f32, f32), offset: (f32, f32)) -> (f32, f32) {
    ((point.0 + offset.0).fract(), (point.1 + offset.1).fract())
}

/// Fixed per-pixel shift, so each pixel walks its own rotation of the spiral
pub fn pixel_rotation(pixel: u32, seed: u32) -> (f32, f32) {
    let mut state = wang_hash(pixel ^ seed) | 1;
    let a = xorshift32(&mut state);
    let b = xorshift32(&mut state);
    (a, b)
}

pub fn wang_hash(mut x: u32) -> u32 {
    x = (x ^ 61) ^ (x >> 16);
    x = x.wrapping_mul(9);
    x ^= x >> 4;
    x = x.wrapping_mul(0x27d4_eb2d);
    x ^ (x >> 15)
}

/// Advances a per-pixel state and returns a uniform number in [0, 1)
pub fn xorshift32(state: &mut u32) -> f32 {
    let mut x = *state;
    x ^= x << 13;
    x ^= x >> 17;
    x ^= x << 5;
    *state = x;
    (x >> 8) as f32 * (1.0 / 16_777_216.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tent_range() {
        assert_eq!(tent(0.0), -1.0);
        assert_eq!(tent(0.5), 0.0);
        let mut sampler = Sampler::new(3);
        let mut mean = 0.0;
        for _ in 0..10_000 {
            let t = tent(sampler.uniform());
            assert!((-1.0..=1.0).contains(&t));
            mean += t / 10_000.0;
        }
        assert!(mean.abs() < 0.02);
    }

    #[test]
    fn xorshift_stays_in_unit_interval() {
        let mut state = 1;
        for _ in 0..10_000 {
            let u = xorshift32(&mut state);
            assert!((0.0..1.0).contains(&u));
            assert_ne!(state, 0);
        }
    }

    #[test]
    fn spiral_covers_the_disk() {
        let n = 1000;
        let mut inner = 0;
        for i in 0..n {
            let (u1, u2) = fermat_spiral(i, n);
            assert!((0.0..1.0).contains(&u1) && (0.0..1.0).contains(&u2));
            let p = unit_disk(u1, u2);
            if p.length() < std::f32::consts::FRAC_1_SQRT_2 {
                inner += 1;
            }
        }
        // half the area lies inside radius 1/sqrt(2)
        assert_eq!(inner, 500);
    }

    #[test]
    fn spiral_passes_stay_stratified() {
        let n = 1000;
        let mut inner = 0;
        for i in 0..2 * n {
            let (u1, u2) = fermat_spiral(i, n);
            assert!((0.0..1.0).contains(&u1) && (0.0..1.0).contains(&u2));
            if unit_disk(u1, u2).length() < std::f32::consts::FRAC_1_SQRT_2 {
                inner += 1;
            }
        }
        assert_eq!(inner, 1000);
        // the second pass does not repeat the first
        for i in 0..n {
            assert_ne!(fermat_spiral(i, n).0, fermat_spiral(i + n, n).0);
        }
    }

    #[test]
    fn hemisphere_samples_face_the_normal() {
        let n = Vec3::normalized(Vec3(1.0, -2.0, 0.5));
        let mut sampler = Sampler::new(9);
        for _ in 0..1000 {
            let u = sampler.uniform2();
            let d = to_world(cosine_hemisphere(u.0, u.1), n);
            assert!(Vec3::dot(d, n) >= -1e-6);
            assert!((d.length() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn seeded_samplers_repeat() {
        let mut a = Sampler::new(42);
        let mut b = Sampler::new(42);
        assert_eq!(a.pixel_states(8), b.pixel_states(8));
        assert!(a.pixel_states(8).iter().all(|&s| s != 0));
        assert_ne!(Sampler::with_stream(42, 1).next_u32(), Sampler::new(42).next_u32());
    }
}
