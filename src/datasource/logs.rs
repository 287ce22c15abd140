//! Paginated, restartable event log scans.

use super::{ChainError, ChainReader, LogEntry, LogFilter};
use crate::domain::{BlockHeight, BlockRange};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Resume point of a log scan.
///
/// `next_block` is the first block not yet queried. `last_seen` is the
/// (block, log_index) of the last entry handed out; entries at or before it
/// are dropped if a page is re-queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanCursor {
    pub next_block: u64,
    pub last_seen: Option<(u64, u64)>,
}

impl ScanCursor {
    pub fn start(block: BlockHeight) -> Self {
        Self {
            next_block: block.as_u64(),
            last_seen: None,
        }
    }
}

/// Lazily pages through `[from, to_exclusive)` for one filter.
///
/// Pages shrink by half whenever the node rejects a span as too large.
#[derive(Debug)]
pub struct LogScan<'a> {
    reader: &'a dyn ChainReader,
    filter: LogFilter,
    range: BlockRange,
    page_blocks: u64,
    cursor: ScanCursor,
}

impl<'a> LogScan<'a> {
    pub fn new(
        reader: &'a dyn ChainReader,
        filter: LogFilter,
        range: BlockRange,
        page_blocks: u64,
    ) -> Self {
        let cursor = ScanCursor::start(range.from());
        Self::resume(reader, filter, range, page_blocks, cursor)
    }

    /// Continue a scan from a persisted cursor.
    pub fn resume(
        reader: &'a dyn ChainReader,
        filter: LogFilter,
        range: BlockRange,
        page_blocks: u64,
        cursor: ScanCursor,
    ) -> Self {
        Self {
            reader,
            filter,
            range,
            page_blocks: page_blocks.max(1),
            cursor,
        }
    }

    pub fn cursor(&self) -> ScanCursor {
        self.cursor
    }

    pub fn is_done(&self) -> bool {
        self.cursor.next_block >= self.range.to_exclusive().as_u64()
    }

    /// Fetch the next page, or `None` once the range is exhausted.
    ///
    /// Entries are returned in (block, log_index) order.
    pub async fn next_page(&mut self) -> Result<Option<Vec<LogEntry>>, ChainError> {
        if self.is_done() {
            return Ok(None);
        }
        let last_block = self.range.to_exclusive().as_u64() - 1;

        loop {
            let from = self.cursor.next_block;
            let to = from
                .saturating_add(self.page_blocks - 1)
                .min(last_block);

            match self
                .reader
                .logs(&self.filter, BlockHeight::new(from), BlockHeight::new(to))
                .await
            {
                Ok(mut entries) => {
                    entries.sort_by_key(|e| (e.block_number, e.log_index));
                    if let Some(seen) = self.cursor.last_seen {
                        entries.retain(|e| (e.block_number, e.log_index) > seen);
                    }
                    debug!(
                        address = %self.filter.address,
                        from,
                        to,
                        count = entries.len(),
                        "Fetched log page"
                    );
                    self.cursor.next_block = to + 1;
                    if let Some(last) = entries.last() {
                        self.cursor.last_seen = Some((last.block_number, last.log_index));
                    }
                    return Ok(Some(entries));
                }
                Err(ChainError::RangeTooLarge(msg)) if self.page_blocks > 1 => {
                    self.page_blocks = (self.page_blocks / 2).max(1);
                    warn!(
                        address = %self.filter.address,
                        from,
                        page_blocks = self.page_blocks,
                        "Log range rejected ({}), shrinking page",
                        msg
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Drain the remaining pages into one vector.
    pub async fn collect_all(mut self) -> Result<Vec<LogEntry>, ChainError> {
        let mut all = Vec::new();
        while let Some(page) = self.next_page().await? {
            all.extend(page);
        }
        Ok(all)
    }
}
