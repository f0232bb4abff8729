use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::UserId;
use crate::store::PageRequest;

/// When a paged feed stops asking for more
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndOfDataPolicy {
    /// A page shorter than the page size is the last one
    #[default]
    ShortPage,
    /// Keep paging until a page comes back empty
    EmptyPage,
}

impl EndOfDataPolicy {
    pub fn is_last_page(&self, returned: usize, page_size: usize) -> bool {
        match self {
            EndOfDataPolicy::ShortPage => returned < page_size,
            EndOfDataPolicy::EmptyPage => returned == 0,
        }
    }
}

impl FromStr for EndOfDataPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "short_page" | "short" => Ok(EndOfDataPolicy::ShortPage),
            "empty_page" | "empty" => Ok(EndOfDataPolicy::EmptyPage),
            other => Err(format!("unknown end-of-data policy: {}", other)),
        }
    }
}

impl fmt::Display for EndOfDataPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndOfDataPolicy::ShortPage => f.write_str("short_page"),
            EndOfDataPolicy::EmptyPage => f.write_str("empty_page"),
        }
    }
}

/// Paging position of one feed
///
/// `page` counts pages already applied. The next request is always `page + 1`
/// and only [`FeedCursor::commit`] moves the cursor, so a failed fetch leaves
/// it where it was.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedCursor {
    page: u32,
    page_size: usize,
    owner: Option<UserId>,
    exhausted: bool,
    policy: EndOfDataPolicy,
}

impl FeedCursor {
    pub fn new(page_size: usize, owner: Option<UserId>, policy: EndOfDataPolicy) -> Self {
        Self {
            page: 0,
            page_size: page_size.max(1),
            owner,
            exhausted: false,
            policy,
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn owner(&self) -> Option<UserId> {
        self.owner
    }

    pub fn policy(&self) -> EndOfDataPolicy {
        self.policy
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Request for the page after the last committed one, `None` once exhausted
    pub fn next_request(&self) -> Option<PageRequest> {
        if self.exhausted {
            return None;
        }
        Some(PageRequest {
            page: self.page + 1,
            page_size: self.page_size,
            owner: self.owner,
        })
    }

    /// Record a page that was fetched and applied. Returns whether the feed is now exhausted.
    pub fn commit(&mut self, request: &PageRequest, returned: usize) -> bool {
        // Out-of-order commits never move the cursor backwards
        self.page = self.page.max(request.page);
        if self.policy.is_last_page(returned, request.page_size) {
            self.exhausted = true;
        }
        self.exhausted
    }

    /// Back to page zero, optionally re-scoped to another owner
    pub fn reset(&mut self, owner: Option<UserId>) {
        self.page = 0;
        self.owner = owner;
        self.exhausted = false;
    }
}
