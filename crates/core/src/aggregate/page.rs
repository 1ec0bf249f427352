//! Per-page fragment collection.

use std::collections::BTreeMap;

use crate::fragment::{Fragment, Payload};
use crate::model::Page;

/// Fragments received so far for one page, keyed by block-group index.
#[derive(Debug, Clone)]
pub struct PageAggregate {
    group_count: usize,
    fragments: BTreeMap<usize, Fragment>,
}

impl PageAggregate {
    pub fn new(group_count: usize) -> Self {
        Self {
            group_count,
            fragments: BTreeMap::new(),
        }
    }

    pub fn group_count(&self) -> usize {
        self.group_count
    }

    pub fn received(&self) -> usize {
        self.fragments.len()
    }

    /// Stores a fragment. A re-delivered block-group index overwrites.
    pub fn insert(&mut self, fragment: Fragment) {
        self.fragments.insert(fragment.id.group_index, fragment);
    }

    pub fn has_skeleton(&self) -> bool {
        self.fragments.values().any(|f| f.id.kind.is_layout())
    }

    /// Every block-group index has arrived, the skeleton among them.
    pub fn is_complete(&self) -> bool {
        self.fragments.len() == self.group_count && self.has_skeleton()
    }

    /// Builds the page: the skeleton with each content fragment's text
    /// injected into its target block.
    ///
    /// Without a skeleton the page comes out empty. Fragments are applied in
    /// block-group order, so the result does not depend on arrival order.
    pub fn assemble(self, pnum: usize) -> Page {
        let mut skeleton: Option<Page> = None;
        let mut contents: Vec<(usize, String)> = Vec::new();

        for (_, fragment) in self.fragments {
            match fragment.payload {
                Payload::Layout(page) => skeleton = Some(page),
                Payload::Text(text) => contents.push((fragment.id.block_index, text)),
            }
        }

        let Some(mut page) = skeleton else {
            if !contents.is_empty() {
                tracing::warn!(
                    pnum,
                    dropped = contents.len(),
                    "page skeleton never arrived, content fragments dropped"
                );
            }
            return Page::empty(pnum);
        };

        page.pnum = pnum;
        for (block_index, text) in contents {
            match page.blocks.get_mut(block_index) {
                Some(block) => block.fill_text(&text),
                None => tracing::warn!(
                    pnum,
                    block_index,
                    blocks = page.blocks.len(),
                    "content fragment targets a block outside the skeleton"
                ),
            }
        }
        page
    }
}
