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

//! Similarity metrics
//!
//! The engine scores candidates with a plain dot product in both modes;
//! under [`DistanceFunction::Cosine`] vectors are L2-normalised on ingress
//! and queries on entry, which makes the dot product equal to cosine
//! similarity. Higher scores are always better.

use serde::{Deserialize, Serialize};

/// Similarity metric recorded in the file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DistanceFunction {
    /// Raw dot product of the stored vectors.
    Dot = 0,
    /// Cosine similarity; vectors are normalised once at write time.
    #[default]
    Cosine = 1,
}

impl DistanceFunction {
    /// On-disk header encoding.
    #[inline]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Decode the header field; unknown values are a format error.
    pub fn from_i32(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(DistanceFunction::Dot),
            1 => Some(DistanceFunction::Cosine),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_codec() {
        assert_eq!(DistanceFunction::from_i32(0), Some(DistanceFunction::Dot));
        assert_eq!(DistanceFunction::from_i32(1), Some(DistanceFunction::Cosine));
        assert_eq!(DistanceFunction::from_i32(7), None);
        assert_eq!(DistanceFunction::Cosine.as_i32(), 1);
    }
}
