//! Running header/footer removal.

use indexmap::IndexMap;
use itertools::Itertools;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::geometry::{self, BBox};
use crate::params::GatherParams;

use super::blocks::{FullyMergedBlock, page_relative};
use super::spans::MergedBlock;

/// Text key under which repeated blocks are compared.
///
/// Case and whitespace are folded and digit runs collapse to `#`, so
/// "Page 3" and "page 14" share a key.
fn repeat_key(text: &str) -> String {
    let mut key = String::with_capacity(text.len());
    let mut in_digits = false;
    for word in text.split_whitespace() {
        if !key.is_empty() {
            key.push(' ');
        }
        for c in word.chars() {
            if c.is_ascii_digit() {
                if !in_digits {
                    key.push('#');
                }
                in_digits = true;
            } else {
                in_digits = false;
                key.extend(c.to_lowercase());
            }
        }
        in_digits = false;
    }
    key
}

/// Number of pages a block must recur on to be running, or `None` when the
/// document is too short to tell.
fn required_pages(page_count: usize, params: &GatherParams) -> Option<usize> {
    if page_count < params.header_min_pages.max(2) {
        return None;
    }
    let majority = (params.header_majority * page_count as f64).floor() as usize + 1;
    Some(majority.max(params.header_min_pages).max(2))
}

/// Splits same-text `members` (id, page, page-relative box) into position
/// bands and returns the bands found on at least `min_pages` distinct pages.
fn recurring_bands<T: Copy>(
    members: &[(T, usize, BBox)],
    min_pages: usize,
    threshold: f64,
) -> Vec<Vec<T>> {
    let mut bands: Vec<(BBox, Vec<(T, usize)>)> = Vec::new();
    for &(id, pnum, bbox) in members {
        match bands
            .iter_mut()
            .find(|(anchor, _)| geometry::overlaps_above(anchor, &bbox, threshold))
        {
            Some((_, band)) => band.push((id, pnum)),
            None => bands.push((bbox, vec![(id, pnum)])),
        }
    }
    bands
        .into_iter()
        .filter(|(_, band)| band.iter().map(|&(_, pnum)| pnum).unique().count() >= min_pages)
        .map(|(_, band)| band.into_iter().map(|(id, _)| id).collect())
        .collect()
}

/// `(page, index)` of every block that recurs with the same text at the same
/// page position on enough pages to be a running header/footer.
pub(crate) fn repeated_text(
    merged_pages: &[Vec<MergedBlock>],
    extents: &[BBox],
    params: &GatherParams,
) -> FxHashSet<(usize, usize)> {
    let Some(min_pages) = required_pages(merged_pages.len(), params) else {
        return FxHashSet::default();
    };

    let mut groups: FxHashMap<String, Vec<((usize, usize), usize, BBox)>> = FxHashMap::default();
    for (pnum, blocks) in merged_pages.iter().enumerate() {
        let extent = extents.get(pnum).copied().unwrap_or_default();
        for (idx, block) in blocks.iter().enumerate() {
            if block.block_type.is_recognized() {
                continue;
            }
            let key = repeat_key(&block.text());
            if !key.is_empty() {
                let bbox = page_relative(&block.bbox, &extent);
                groups.entry(key).or_default().push(((pnum, idx), pnum, bbox));
            }
        }
    }

    groups
        .values()
        .flat_map(|members| recurring_bands(members, min_pages, params.header_overlap_threshold))
        .flatten()
        .collect()
}

/// Drops blocks that repeat at the same page position across most pages.
///
/// A block is a running header/footer when, on more than
/// [`GatherParams::header_majority`] of `page_count` pages, a block with the
/// same [`repeat_key`] sits at a position whose overlap ratio with it exceeds
/// [`GatherParams::header_overlap_threshold`]. Blocks spanning a page break
/// and recognized content (tables, equations, pictures) are never candidates.
/// Blocks typed as page header/footer are dropped outright when
/// [`GatherParams::drop_page_furniture`] is set.
pub fn filter_common_titles(
    blocks: Vec<FullyMergedBlock>,
    page_count: usize,
    params: &GatherParams,
) -> Vec<FullyMergedBlock> {
    let mut blocks = blocks;
    if params.drop_page_furniture {
        blocks.retain(|b| !b.block_type.is_page_furniture());
    }
    let Some(min_pages) = required_pages(page_count, params) else {
        return blocks;
    };

    let mut groups: IndexMap<String, Vec<(usize, usize, BBox)>> = IndexMap::new();
    for (idx, block) in blocks.iter().enumerate() {
        if block.spans_pages() || block.block_type.is_recognized() {
            continue;
        }
        let key = repeat_key(&block.text);
        if key.is_empty() {
            continue;
        }
        groups.entry(key).or_default().push((idx, block.pnum, block.bbox));
    }

    let mut running: FxHashSet<usize> = FxHashSet::default();
    for members in groups.values() {
        if members.len() < min_pages {
            continue;
        }
        for band in recurring_bands(members, min_pages, params.header_overlap_threshold) {
            tracing::debug!(
                text = %blocks[band[0]].text,
                blocks = band.len(),
                "dropping running header/footer"
            );
            running.extend(band);
        }
    }

    if running.is_empty() {
        return blocks;
    }
    blocks
        .into_iter()
        .enumerate()
        .filter(|(idx, _)| !running.contains(idx))
        .map(|(_, b)| b)
        .collect()
}
