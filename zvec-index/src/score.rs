// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Similarity scoring kernels
//!
//! Everything in the engine ranks by `score(q, v)` = dot product, higher is
//! better. Under the cosine metric both sides have been L2-normalised, so the
//! same kernel yields cosine similarity.
//!
//! Graph traversal spends most of its cycles here, so the kernel is
//! vectorized with runtime dispatch:
//!
//! - AVX2 + FMA: 8 floats per register (x86_64)
//! - NEON: 4 floats per register (aarch64, always available)
//! - Scalar fallback everywhere else
//!
//! The kernel is pure: it takes two slices and returns a float, with no
//! access to engine state, which is what lets the parallel scan fan it out
//! across rayon workers.

use std::sync::OnceLock;

/// Detected SIMD capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimdLevel {
    /// No SIMD (portable fallback)
    Scalar,
    /// AVX2 + FMA (x86_64)
    Avx2,
    /// NEON (aarch64)
    Neon,
}

impl SimdLevel {
    /// Detect CPU capability at runtime.
    #[allow(unreachable_code)]
    pub fn detect() -> Self {
        #[cfg(target_arch = "x86_64")]
        {
            if is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma") {
                return SimdLevel::Avx2;
            }
        }

        #[cfg(target_arch = "aarch64")]
        {
            return SimdLevel::Neon;
        }

        SimdLevel::Scalar
    }
}

static SIMD_LEVEL: OnceLock<SimdLevel> = OnceLock::new();

/// Cached capability for the process.
pub fn simd_level() -> SimdLevel {
    *SIMD_LEVEL.get_or_init(SimdLevel::detect)
}

/// Dot-product kernel with automatic dispatch.
#[derive(Debug, Clone, Copy)]
pub struct ScoreKernel {
    level: SimdLevel,
}

impl ScoreKernel {
    pub fn detect() -> Self {
        Self {
            level: simd_level(),
        }
    }

    /// Pin a specific capability (used by tests to cross-check kernels).
    pub fn with_level(level: SimdLevel) -> Self {
        Self { level }
    }

    pub fn level(&self) -> SimdLevel {
        self.level
    }

    /// `score(a, b)`: dot product, higher is better.
    #[inline]
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len());
        match self.level {
            #[cfg(target_arch = "x86_64")]
            SimdLevel::Avx2 => unsafe { dot_avx2(a, b) },
            #[cfg(target_arch = "aarch64")]
            SimdLevel::Neon => unsafe { dot_neon(a, b) },
            _ => dot_scalar(a, b),
        }
    }
}

impl Default for ScoreKernel {
    fn default() -> Self {
        Self::detect()
    }
}

/// L2-normalise in place; returns the original norm.
///
/// Near-zero vectors are left untouched (a zero query scores 0 against
/// everything, which is the least surprising behaviour).
pub fn l2_normalize(v: &mut [f32]) -> f32 {
    let norm_sq: f32 = v.iter().map(|x| x * x).sum();
    if norm_sq < 1e-16 {
        return 0.0;
    }
    let norm = norm_sq.sqrt();
    let inv_norm = 1.0 / norm;
    for x in v.iter_mut() {
        *x *= inv_norm;
    }
    norm
}

// ============================================================================
// Scalar fallback
// ============================================================================

#[inline]
pub fn dot_scalar(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

// ============================================================================
// x86_64 AVX2 + FMA
// ============================================================================

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2", enable = "fma")]
#[inline]
unsafe fn dot_avx2(a: &[f32], b: &[f32]) -> f32 {
    use std::arch::x86_64::*;

    let n = a.len();
    let mut sum = _mm256_setzero_ps();

    let chunks = n / 8;
    let a_ptr = a.as_ptr();
    let b_ptr = b.as_ptr();

    for i in 0..chunks {
        let offset = i * 8;
        let va = unsafe { _mm256_loadu_ps(a_ptr.add(offset)) };
        let vb = unsafe { _mm256_loadu_ps(b_ptr.add(offset)) };
        sum = _mm256_fmadd_ps(va, vb, sum);
    }

    // Horizontal sum
    let sum_high = _mm256_extractf128_ps(sum, 1);
    let sum_low = _mm256_castps256_ps128(sum);
    let sum128 = _mm_add_ps(sum_low, sum_high);
    let sum64 = _mm_add_ps(sum128, _mm_movehl_ps(sum128, sum128));
    let sum32 = _mm_add_ss(sum64, _mm_shuffle_ps(sum64, sum64, 1));

    let mut result = _mm_cvtss_f32(sum32);

    // Handle remainder
    for i in (chunks * 8)..n {
        result += unsafe { *a.get_unchecked(i) * *b.get_unchecked(i) };
    }

    result
}

// ============================================================================
// aarch64 NEON
// ============================================================================

#[cfg(target_arch = "aarch64")]
#[target_feature(enable = "neon")]
#[inline]
unsafe fn dot_neon(a: &[f32], b: &[f32]) -> f32 {
    use std::arch::aarch64::*;

    let n = a.len();
    let mut sum = unsafe { vdupq_n_f32(0.0) };

    let chunks = n / 4;
    let a_ptr = a.as_ptr();
    let b_ptr = b.as_ptr();

    for i in 0..chunks {
        let offset = i * 4;
        let va = unsafe { vld1q_f32(a_ptr.add(offset)) };
        let vb = unsafe { vld1q_f32(b_ptr.add(offset)) };
        sum = unsafe { vfmaq_f32(sum, va, vb) };
    }

    let mut result = unsafe { vaddvq_f32(sum) };

    for i in (chunks * 4)..n {
        result += unsafe { *a.get_unchecked(i) * *b.get_unchecked(i) };
    }

    result
}
