//! Byte-range math for partial downloads.
//!
//! CBC decryption of block `n` needs ciphertext block `n - 1` as its IV, so a
//! read starting mid-object fetches one extra block in front and consumes it
//! as the IV. Output is trimmed back to the requested plaintext window.

use mmc_core::{MediaError, MediaResult};

use crate::AES_BLOCK_SIZE;

const BLOCK: u64 = AES_BLOCK_SIZE as u64;

/// Plaintext window `[start, end)`. `None` means unbounded on that side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadRange {
    pub start: Option<u64>,
    pub end: Option<u64>,
}

impl DownloadRange {
    pub fn new(start: Option<u64>, end: Option<u64>) -> Self {
        Self { start, end }
    }

    pub fn full() -> Self {
        Self::default()
    }

    /// Reject a window whose start lies past its end.
    pub fn check(&self) -> MediaResult<()> {
        match (self.start, self.end) {
            (Some(start), Some(end)) if start > end => Err(MediaError::InvalidRange(format!(
                "start {start} is past end {end}"
            ))),
            _ => Ok(()),
        }
    }

    /// True when the whole object is requested.
    pub fn is_full(&self) -> bool {
        self.start.unwrap_or(0) == 0 && self.end.is_none()
    }
}

/// What to fetch from the content host for a given plaintext range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPlan {
    /// First ciphertext byte to request
    pub start_chunk: u64,
    /// End bound sent in the `Range` header
    pub end_chunk: Option<u64>,
    /// The first fetched block is the IV, not data
    pub first_block_is_iv: bool,
    /// Plaintext offset of the first decrypted byte
    pub plaintext_offset: u64,
    /// Strip PKCS7 padding at the end (only when the tail is fetched)
    pub unpad: bool,
    pub range: DownloadRange,
}

fn to_smallest_chunk(n: u64) -> u64 {
    n / BLOCK * BLOCK
}

impl FetchPlan {
    pub fn new(range: DownloadRange) -> Self {
        let mut start_chunk = 0;
        let mut first_block_is_iv = false;
        let mut plaintext_offset = 0;

        if let Some(start) = range.start {
            let chunk = to_smallest_chunk(start);
            if chunk > 0 {
                start_chunk = chunk - BLOCK;
                plaintext_offset = chunk;
                first_block_is_iv = true;
            }
        }

        let end_chunk = range.end.map(|end| to_smallest_chunk(end) + BLOCK);

        Self {
            start_chunk,
            end_chunk,
            first_block_is_iv,
            plaintext_offset,
            unpad: range.end.is_none(),
            range,
        }
    }

    /// `Range` header value, if the fetch is partial.
    pub fn range_header(&self) -> Option<String> {
        if self.start_chunk == 0 && self.end_chunk.is_none() {
            return None;
        }
        Some(match self.end_chunk {
            Some(end) => format!("bytes={}-{}", self.start_chunk, end),
            None => format!("bytes={}-", self.start_chunk),
        })
    }

    pub fn window(&self) -> RangeWindow {
        RangeWindow {
            position: self.plaintext_offset,
            start: self.range.start.unwrap_or(0),
            end: self.range.end,
        }
    }
}

/// Running trim of decrypted output to the requested window.
#[derive(Debug, Clone)]
pub struct RangeWindow {
    position: u64,
    start: u64,
    end: Option<u64>,
}

impl RangeWindow {
    /// Slice of `bytes` that falls inside the window; advances the position.
    pub fn trim<'a>(&mut self, bytes: &'a [u8]) -> &'a [u8] {
        let len = bytes.len() as u64;
        let lo = self.start.saturating_sub(self.position).min(len);
        let hi = match self.end {
            Some(end) => end.saturating_sub(self.position).min(len),
            None => len,
        };
        self.position += len;
        if lo >= hi {
            &[]
        } else {
            &bytes[lo as usize..hi as usize]
        }
    }

    pub fn position(&self) -> u64 {
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn full_range_has_no_header() {
        let plan = FetchPlan::new(DownloadRange::full());
        assert_eq!(plan.start_chunk, 0);
        assert!(!plan.first_block_is_iv);
        assert!(plan.unpad);
        assert_eq!(plan.range_header(), None);
    }

    #[test]
    fn mid_object_range() {
        let plan = FetchPlan::new(DownloadRange::new(Some(20), Some(500)));
        assert_eq!(plan.start_chunk, 0);
        assert!(plan.first_block_is_iv);
        assert_eq!(plan.plaintext_offset, 16);
        assert_eq!(plan.end_chunk, Some(512));
        assert!(!plan.unpad);
        assert_eq!(plan.range_header().as_deref(), Some("bytes=0-512"));
    }

    #[test]
    fn start_in_first_block_fetches_from_zero() {
        let plan = FetchPlan::new(DownloadRange::new(Some(5), None));
        assert_eq!(plan.start_chunk, 0);
        assert!(!plan.first_block_is_iv);
        assert!(plan.unpad);
        assert_eq!(plan.range_header(), None);
    }

    #[test]
    fn open_ended_tail() {
        let plan = FetchPlan::new(DownloadRange::new(Some(992), None));
        assert_eq!(plan.start_chunk, 976);
        assert_eq!(plan.plaintext_offset, 992);
        assert_eq!(plan.range_header().as_deref(), Some("bytes=976-"));
    }

    #[test]
    fn inverted_range_is_rejected() {
        let err = DownloadRange::new(Some(500), Some(20)).check().unwrap_err();
        assert!(matches!(err, MediaError::InvalidRange(_)));
        assert!(DownloadRange::new(Some(20), Some(20)).check().is_ok());
        assert!(DownloadRange::new(Some(500), None).check().is_ok());
    }

    #[test]
    fn window_trims_across_calls() {
        let plan = FetchPlan::new(DownloadRange::new(Some(20), Some(40)));
        let mut window = plan.window();
        let block: Vec<u8> = (16u8..32).collect();
        assert_eq!(window.trim(&block), &(20u8..32).collect::<Vec<_>>()[..]);
        let block: Vec<u8> = (32u8..48).collect();
        assert_eq!(window.trim(&block), &(32u8..40).collect::<Vec<_>>()[..]);
        assert!(window.trim(&[0u8; 16]).is_empty());
        assert_eq!(window.position(), 64);
    }

    proptest! {
        #[test]
        fn plan_covers_requested_window(start in 0u64..10_000, len in 1u64..5_000) {
            let end = start + len;
            let plan = FetchPlan::new(DownloadRange::new(Some(start), Some(end)));
            prop_assert_eq!(plan.start_chunk % BLOCK, 0);
            prop_assert!(plan.plaintext_offset <= start);
            prop_assert!(plan.end_chunk.unwrap() >= end);
            if plan.first_block_is_iv {
                prop_assert_eq!(plan.start_chunk + BLOCK, plan.plaintext_offset);
            }
        }

        #[test]
        fn window_emits_exactly_the_range(start in 0u64..2_000, len in 0u64..2_000, step in 1usize..100) {
            let end = start + len;
            let plan = FetchPlan::new(DownloadRange::new(Some(start), Some(end)));
            let mut window = plan.window();
            let source: Vec<u8> = (plan.plaintext_offset..end + 64).map(|i| i as u8).collect();
            let mut out = Vec::new();
            for piece in source.chunks(step) {
                out.extend_from_slice(window.trim(piece));
            }
            let expected: Vec<u8> = (start..end).map(|i| i as u8).collect();
            prop_assert_eq!(out, expected);
        }
    }
}
