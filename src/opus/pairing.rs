//! Pairing data blocks with the data status blocks that describe them.
//!
//! Nothing in a data block points to its status block, so the two are matched up by type,
//! falling back on comparing the data's range to the MNY/MXY parameters when a file holds
//! several data blocks of the same type. The stages are:
//!
//! 1. match by type (equal apart from the status level),
//! 2. accept data blocks with exactly one candidate,
//! 3. for the rest, drop candidates whose MNY/MXY disagree with the scaled data,
//! 4. accept data blocks now down to one candidate,
//! 5. drop candidates already accepted for another data block, and accept again,
//! 6. drop accepted pairs where the data block has fewer than NPT points,
//! 7. order pairs by data block position, last in the file first.
//!
//! If an error stops the range comparison in stage 3, the candidate is kept: it is better to
//! have an ambiguous match than to exclude the right one.
use itertools::{Itertools, MinMaxResult};
use log::{debug, warn};

use super::{
    data::{parse_data, trim_data, DataPointFormat},
    header::BlockDescriptor,
    params::ParameterSet,
};

/// A data or data series block waiting to be paired, `bytes` being the block's content
#[derive(Debug, Clone, Copy)]
pub struct DataCandidate<'a> {
    pub descriptor: BlockDescriptor,
    pub bytes: &'a [u8],
    pub is_series: bool,
}

/// A parsed data status block
#[derive(Debug, Clone, Copy)]
pub struct StatusCandidate<'a> {
    pub descriptor: BlockDescriptor,
    pub params: &'a ParameterSet,
}

/// The result of pairing. All values are indices into the data and status slices given to
/// [`pair_blocks`]; every index appears exactly once across `pairs` and the unmatched lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pairing {
    /// (data index, status index), ordered by data block start, descending
    pub pairs: Vec<(usize, usize)>,
    pub unmatched_data: Vec<usize>,
    pub unmatched_status: Vec<usize>,
}

/// Match data blocks to status blocks. See the module documentation for the procedure.
///
/// A status block is used for at most one data block. If two accepted pairs share a status
/// block, the data block later in the file keeps it and the other is left unmatched.
pub fn pair_blocks(data: &[DataCandidate], status: &[StatusCandidate]) -> Pairing {
    let type_matches: Vec<(usize, Vec<usize>)> = data.iter()
        .enumerate()
        .map(|(i, d)| {
            let candidates = status.iter()
                .enumerate()
                .filter(|(_, s)| d.descriptor.block_type.matches_status(&s.descriptor.block_type))
                .map(|(j, _)| j)
                .collect();
            (i, candidates)
        }).collect();

    let (mut singles, multi) = split_singles(type_matches);
    debug!("{} data blocks paired by type alone, {} ambiguous", singles.len(), multi.len());

    let multi = multi.into_iter()
        .map(|(i, candidates)| {
            let kept = candidates.into_iter()
                .filter(|&j| range_matches(&data[i], status[j].params))
                .collect();
            (i, kept)
        }).collect();
    let (by_value, multi) = split_singles(multi);
    debug!("{} more data blocks paired by value range, {} still ambiguous", by_value.len(), multi.len());
    singles.extend(by_value);

    let multi = multi.into_iter()
        .map(|(i, candidates)| {
            let kept = candidates.into_iter()
                .filter(|j| !singles.iter().any(|(_, s)| s == j))
                .collect();
            (i, kept)
        }).collect();
    let (by_exclusion, multi) = split_singles(multi);
    debug!("{} more data blocks paired by excluding used status blocks, {} still ambiguous", by_exclusion.len(), multi.len());
    singles.extend(by_exclusion);

    for (i, candidates) in multi.iter() {
        warn!("Data block at {} has {} possible status blocks, leaving it unmatched", data[*i].descriptor.start, candidates.len());
    }

    singles.retain(|&(i, j)| {
        let ok = is_valid_match(&data[i], status[j].params);
        if !ok {
            warn!("Data block at {} is shorter than NPT of its status block at {}, discarding the pair",
                data[i].descriptor.start, status[j].descriptor.start);
        }
        ok
    });

    singles.sort_by(|a, b| data[b.0].descriptor.start.cmp(&data[a.0].descriptor.start));

    let mut pairs: Vec<(usize, usize)> = Vec::with_capacity(singles.len());
    for (i, j) in singles {
        if pairs.iter().any(|&(_, used)| used == j) {
            warn!("Status block at {} already paired with a later data block, leaving data block at {} unmatched",
                status[j].descriptor.start, data[i].descriptor.start);
        } else {
            pairs.push((i, j));
        }
    }

    let unmatched_data = (0..data.len())
        .filter(|i| !pairs.iter().any(|(d, _)| d == i))
        .collect();
    let unmatched_status = (0..status.len())
        .filter(|j| !pairs.iter().any(|(_, s)| s == j))
        .collect();

    Pairing { pairs, unmatched_data, unmatched_status }
}

/// Separate data blocks with exactly one candidate from those with several. Data blocks
/// with no candidates are dropped.
fn split_singles(matches: Vec<(usize, Vec<usize>)>) -> (Vec<(usize, usize)>, Vec<(usize, Vec<usize>)>) {
    let mut singles = vec![];
    let mut multi = vec![];
    for (i, candidates) in matches {
        match candidates.len() {
            0 => (),
            1 => singles.push((i, candidates[0])),
            _ => multi.push((i, candidates)),
        }
    }
    (singles, multi)
}

/// Whether the scaled data agree with the status block's MNY and MXY.
///
/// Data series are never excluded here, nor are candidates for which the comparison cannot
/// be made (missing parameters or no data points).
fn range_matches(data: &DataCandidate, params: &ParameterSet) -> bool {
    if data.is_series {
        return true;
    }
    scaled_range_agrees(data, params).unwrap_or(true)
}

fn scaled_range_agrees(data: &DataCandidate, params: &ParameterSet) -> Option<bool> {
    let npt = params.npt().ok()?;
    let csf = params.csf().ok()?;
    let mny = params.mny().ok()?;
    let mxy = params.mxy().ok()?;

    let raw = parse_data(data.bytes, DataPointFormat::from_dpf(params.dpf()));
    if raw.len() < npt {
        return Some(false);
    }

    let y = trim_data(raw.view(), npt, data.descriptor.block_type.is_compact_data());
    let (min, max) = match y.iter().map(|v| v * csf).minmax() {
        MinMaxResult::NoElements => return None,
        MinMaxResult::OneElement(v) => (v, v),
        MinMaxResult::MinMax(lo, hi) => (lo, hi),
    };
    Some(values_agree(min, mny) && values_agree(max, mxy))
}

/// Opus computes MNY/MXY from single precision data, so also accept values equal at that precision
fn values_agree(computed: f64, stored: f64) -> bool {
    computed == stored || (computed as f32) == (stored as f32)
}

/// A pair is invalid if the data block has fewer points than the status block declares, or
/// the status block does not declare a point count. Data series are checked when decoded.
fn is_valid_match(data: &DataCandidate, params: &ParameterSet) -> bool {
    if data.is_series {
        return true;
    }
    match params.npt() {
        Ok(npt) => data.bytes.len() / 4 >= npt,
        Err(_) => false,
    }
}
