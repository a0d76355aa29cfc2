// Stateless hash noise.
//
// frac(sin(dot(p, K)) * 43758.5453), evaluated in f64 so that large lattice
// coordinates keep enough precision to stay uncorrelated. Every function here
// is pure: same inputs, same bits.

use glam::Vec3;

const K_X: f64 = 12.9898;
const K_Y: f64 = 78.233;
const K_Z: f64 = 37.719;
const K_SEED: f64 = 4.581_3;
const SCALE: f64 = 43_758.545_3;

/// Largest f32 strictly below 1.0.
const BELOW_ONE: f32 = 1.0 - f32::EPSILON / 2.0;

#[inline]
fn finish(dot: f64) -> f32 {
    let v = dot.sin() * SCALE;
    let r = (v - v.floor()) as f32;
    // f64 -> f32 rounding can land exactly on 1.0.
    if r.is_finite() { r.min(BELOW_ONE) } else { 0.0 }
}

/// Hash a 2D point into `[0, 1)`.
pub fn hash2(x: f32, y: f32, seed: u32) -> f32 {
    finish(x as f64 * K_X + y as f64 * K_Y + seed as f64 * K_SEED)
}

/// Hash a 3D point into `[0, 1)`.
pub fn hash3(x: f32, y: f32, z: f32, seed: u32) -> f32 {
    finish(x as f64 * K_X + y as f64 * K_Y + z as f64 * K_Z + seed as f64 * K_SEED)
}

/// Three decorrelated hashes remapped to `[-1, 1)` per axis.
/// Used as the per-node turbulence kick.
pub fn signed3(x: f32, y: f32, z: f32, seed: u32) -> Vec3 {
    Vec3::new(
        hash3(x, y, z, seed) * 2.0 - 1.0,
        hash3(x + 17.0, y - 31.0, z + 7.0, seed.wrapping_add(1)) * 2.0 - 1.0,
        hash3(x - 5.0, y + 11.0, z - 23.0, seed.wrapping_add(2)) * 2.0 - 1.0,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_calls_are_bit_identical() {
        for i in 0..64 {
            let x = i as f32 * 0.37 - 5.0;
            let y = i as f32 * 1.13;
            let z = -(i as f32) * 2.9;
            assert_eq!(hash2(x, y, 7).to_bits(), hash2(x, y, 7).to_bits());
            assert_eq!(hash3(x, y, z, 7).to_bits(), hash3(x, y, z, 7).to_bits());
        }
    }

    #[test]
    fn output_stays_in_unit_interval() {
        for ix in -20..20 {
            for iy in -20..20 {
                let h2 = hash2(ix as f32 * 3.7, iy as f32 * 0.11, 3);
                let h3 = hash3(ix as f32, iy as f32, (ix * iy) as f32, 99);
                assert!((0.0..1.0).contains(&h2), "hash2 out of range: {h2}");
                assert!((0.0..1.0).contains(&h3), "hash3 out of range: {h3}");
            }
        }
    }

    #[test]
    fn large_finite_inputs_never_produce_nan() {
        let big = [f32::MAX, -f32::MAX, 1.0e30, -3.0e20, f32::MIN_POSITIVE];
        for &a in &big {
            for &b in &big {
                assert!(!hash2(a, b, u32::MAX).is_nan());
                assert!(!hash3(a, b, a, 0).is_nan());
                let s = signed3(a, b, a, 1);
                assert!(s.is_finite());
            }
        }
    }

    #[test]
    fn seed_changes_output() {
        let differing = (0..32)
            .filter(|&i| hash3(i as f32, 0.5, 2.0, 1) != hash3(i as f32, 0.5, 2.0, 2))
            .count();
        assert!(differing > 28);
    }

    #[test]
    fn output_is_roughly_uniform() {
        let mut buckets = [0u32; 4];
        for i in 0..4000 {
            let h = hash3(i as f32, (i / 7) as f32, (i % 13) as f32, 5);
            buckets[(h * 4.0) as usize] += 1;
        }
        for count in buckets {
            assert!(count > 700 && count < 1300, "skewed buckets: {buckets:?}");
        }
    }
}
