// This file is part of Astarte.
//
// Copyright 2025, 2026 SECO Mind Srl
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use tracing::warn;

/// Delay between two rounds over the rendezvous directives.
pub(crate) const DEFAULT_DELAY: Duration = Duration::from_secs(120);

/// Delay before retrying an HTTP request.
pub(crate) const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Creates a delay by adding a random 25% more or less to it.
pub(crate) fn add_random_jitter(mut delay: Duration) -> Duration {
    const DEFAULT_RANGE: i64 = DEFAULT_DELAY.as_millis().div_euclid(100).saturating_mul(25) as i64;

    // Millis give a non empty range for short delays
    let add = i64::try_from(delay.as_millis().div_euclid(100).saturating_mul(25))
        .ok()
        .filter(|value| *value != 0)
        .unwrap_or_else(|| {
            warn!(?delay, "invalid delay using default");

            delay = DEFAULT_DELAY;

            DEFAULT_RANGE
        });

    let value = rand::random_range(-add..=add);

    let add = Duration::from_millis(value.unsigned_abs());

    if value.is_negative() {
        delay - add
    } else {
        delay + add
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_in_range() {
        for _ in 0..100 {
            let delay = add_random_jitter(RETRY_DELAY);

            assert!(delay >= Duration::from_millis(1500), "{delay:?}");
            assert!(delay <= Duration::from_millis(2500), "{delay:?}");
        }
    }

    #[test]
    fn zero_uses_default() {
        let delay = add_random_jitter(Duration::ZERO);

        assert!(delay >= Duration::from_secs(90), "{delay:?}");
        assert!(delay <= Duration::from_secs(150), "{delay:?}");
    }
}
