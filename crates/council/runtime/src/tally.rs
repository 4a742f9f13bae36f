//! Weighted tally math
//!
//! Pure functions over score vectors. Nothing here touches engine state,
//! so every function can be called from any context in any order.
//!
//! Scores and totals are `u128`; every multiplication on an accumulation
//! or comparison path is checked and reports [`TallyError::Overflow`]
//! instead of wrapping.

use council_types::{TallyError, TallyResult};

/// Sum every valid weight distribution must reach
pub const WEIGHT_TOTAL: u32 = 100;

/// Result of a winner scan
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Winner {
    /// Index of the first option holding the highest score
    pub index: usize,
    /// Quorum and margin rules both hold
    pub valid: bool,
    pub highest: u128,
    pub second: u128,
}

/// Check a ballot's weight distribution against `option_count` options
pub fn validate_weights(
    indices: &[usize],
    weights: &[u8],
    option_count: usize,
) -> TallyResult<()> {
    if indices.len() != weights.len() {
        return Err(TallyError::LengthMismatch {
            left: indices.len(),
            right: weights.len(),
        });
    }

    let mut seen = vec![0u64; option_count.div_ceil(64)];
    let mut sum: u32 = 0;
    for (&index, &weight) in indices.iter().zip(weights) {
        if index >= option_count {
            return Err(TallyError::InvalidIndex {
                index,
                option_count,
            });
        }
        if u32::from(weight) > WEIGHT_TOTAL {
            return Err(TallyError::InvalidWeight(weight));
        }
        let (word, bit) = (index / 64, 1u64 << (index % 64));
        if seen[word] & bit != 0 {
            return Err(TallyError::DuplicateIndex(index));
        }
        seen[word] |= bit;
        sum += u32::from(weight);
    }

    if sum != WEIGHT_TOTAL {
        return Err(TallyError::WeightSumNot100(sum));
    }
    Ok(())
}

/// Integer square root, Babylonian method: the largest `r` with `r * r <= n`
pub fn isqrt(n: u128) -> u128 {
    if n < 2 {
        return n;
    }
    if n < 4 {
        return 1;
    }
    // 2^64 exceeds sqrt(u128::MAX) so the first guess is always above the root
    let mut x = n.min(u128::from(u64::MAX) + 1);
    let mut y = (x + n / x) / 2;
    while y < x {
        x = y;
        y = (x + n / x) / 2;
    }
    x
}

/// Voting power for a balance: zero below `min_balance`, otherwise the
/// balance itself or its integer square root
pub fn power_for(balance: u128, min_balance: u128, quadratic: bool) -> u128 {
    if balance < min_balance {
        0
    } else if quadratic {
        isqrt(balance)
    } else {
        balance
    }
}

/// Per-option increments for one ballot: `power * weight` for each named
/// option
pub fn score_deltas(
    indices: &[usize],
    weights: &[u8],
    power: u128,
) -> TallyResult<Vec<(usize, u128)>> {
    indices
        .iter()
        .zip(weights)
        .map(|(&index, &weight)| {
            power
                .checked_mul(u128::from(weight))
                .map(|delta| (index, delta))
                .ok_or(TallyError::Overflow)
        })
        .collect()
}

/// Add `deltas` to `scores`, failing without touching `scores` when any
/// sum would overflow
pub fn apply_deltas(scores: &mut [u128], deltas: &[(usize, u128)]) -> TallyResult<()> {
    let mut updated = scores.to_vec();
    for &(index, delta) in deltas {
        let slot = updated.get_mut(index).ok_or(TallyError::InvalidIndex {
            index,
            option_count: scores.len(),
        })?;
        *slot = slot.checked_add(delta).ok_or(TallyError::Overflow)?;
    }
    scores.copy_from_slice(&updated);
    Ok(())
}

/// Scan once keeping the highest and second-highest score. A later option
/// equal to the running highest never displaces it.
fn scan(scores: impl IntoIterator<Item = u128>) -> (usize, u128, u128) {
    let (mut index, mut highest, mut second) = (0usize, 0u128, 0u128);
    for (i, score) in scores.into_iter().enumerate() {
        if score > highest {
            second = highest;
            highest = score;
            index = i;
        } else if score > second {
            second = score;
        }
    }
    (index, highest, second)
}

fn margin_holds(highest: u128, second: u128, strict: bool) -> bool {
    if strict {
        highest > second
    } else {
        highest >= second
    }
}

/// Majority winner: valid only when `highest * 100 > total_weight * quorum`
/// and the margin rule holds. All-zero scores are never valid.
pub fn pick_winner_majority(
    scores: &[u128],
    total_weight: u128,
    quorum_percent: u8,
    strict: bool,
) -> TallyResult<Winner> {
    let (index, highest, second) = scan(scores.iter().copied());
    if highest == 0 {
        return Ok(Winner {
            index,
            valid: false,
            highest,
            second,
        });
    }

    let scaled_high = highest
        .checked_mul(u128::from(WEIGHT_TOTAL))
        .ok_or(TallyError::Overflow)?;
    let threshold = total_weight
        .checked_mul(u128::from(quorum_percent))
        .ok_or(TallyError::Overflow)?;

    Ok(Winner {
        index,
        valid: scaled_high > threshold && margin_holds(highest, second, strict),
        highest,
        second,
    })
}

/// Validate class slices: at least one, each in `1..=100`, summing to 100
pub fn validate_class_slices(slices: &[u8]) -> TallyResult<()> {
    if slices.is_empty() {
        return Err(TallyError::NoClasses);
    }
    let mut sum: u32 = 0;
    for &slice in slices {
        if slice == 0 || u32::from(slice) > WEIGHT_TOTAL {
            return Err(TallyError::InvalidSlice(slice));
        }
        sum += u32::from(slice);
    }
    if sum != WEIGHT_TOTAL {
        return Err(TallyError::SliceSumNot100(sum));
    }
    Ok(())
}

/// Blend each option's per-class raw scores into a `[0, 100]` score
///
/// Option `i` scores `sum(raw[i][c] * slices[c] / totals[c])` over classes
/// whose total is non-zero.
pub fn blend_scores(
    raw: &[Vec<u128>],
    totals: &[u128],
    slices: &[u8],
) -> TallyResult<Vec<u128>> {
    if totals.len() != slices.len() {
        return Err(TallyError::LengthMismatch {
            left: totals.len(),
            right: slices.len(),
        });
    }

    raw.iter()
        .map(|option| {
            if option.len() != totals.len() {
                return Err(TallyError::LengthMismatch {
                    left: option.len(),
                    right: totals.len(),
                });
            }
            option
                .iter()
                .zip(totals.iter().zip(slices))
                .filter(|(_, (total, _))| **total > 0)
                .try_fold(0u128, |acc, (&score, (&total, &slice))| {
                    let term = score
                        .checked_mul(u128::from(slice))
                        .ok_or(TallyError::Overflow)?
                        / total;
                    acc.checked_add(term).ok_or(TallyError::Overflow)
                })
        })
        .collect()
}

/// Winner over blended scores. The blended total is 100 by construction, so
/// the quorum rule reduces to `highest > quorum`.
pub fn pick_winner_n_slices(
    raw: &[Vec<u128>],
    totals: &[u128],
    slices: &[u8],
    quorum_percent: u8,
    strict: bool,
) -> TallyResult<Winner> {
    let blended = blend_scores(raw, totals, slices)?;
    let (index, highest, second) = scan(blended);
    Ok(Winner {
        index,
        valid: highest > 0
            && highest > u128::from(quorum_percent)
            && margin_holds(highest, second, strict),
        highest,
        second,
    })
}

/// Two-class blend with slices `[a_slice, 100 - a_slice]`
#[allow(clippy::too_many_arguments)]
pub fn pick_winner_two_slice(
    a_scores: &[u128],
    b_scores: &[u128],
    a_total: u128,
    b_total: u128,
    a_slice: u8,
    quorum_percent: u8,
    strict: bool,
) -> TallyResult<Winner> {
    if a_slice == 0 || u32::from(a_slice) >= WEIGHT_TOTAL {
        return Err(TallyError::InvalidSlice(a_slice));
    }
    if a_scores.len() != b_scores.len() {
        return Err(TallyError::LengthMismatch {
            left: a_scores.len(),
            right: b_scores.len(),
        });
    }
    let raw: Vec<Vec<u128>> = a_scores
        .iter()
        .zip(b_scores)
        .map(|(&a, &b)| vec![a, b])
        .collect();
    pick_winner_n_slices(
        &raw,
        &[a_total, b_total],
        &[a_slice, 100 - a_slice],
        quorum_percent,
        strict,
    )
}
