use serde::Serialize;

/// Decorative engagement counters shown under a post.
///
/// Derived from the post's position in the log, never from the post itself,
/// so a given position shows the same numbers for the whole session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Engagement {
    pub likes: u32,
    pub retweets: u32,
    pub replies: u32,
    /// Views in tenths of a thousand: `57` renders as `5.7K`.
    pub views_tenths: u32,
}

impl Engagement {
    /// Counters for the post at `global_index`.
    #[must_use]
    pub fn for_index(global_index: usize) -> Self {
        let seed = u64::try_from(global_index).unwrap_or(u64::MAX);
        let digest = blake3::hash(&seed.to_le_bytes());
        let bytes = digest.as_bytes();

        let word = |slot: usize| {
            let mut buf = [0_u8; 8];
            buf.copy_from_slice(&bytes[slot * 8..(slot + 1) * 8]);
            u64::from_le_bytes(buf)
        };

        Self {
            likes: bounded(word(0), 10, 500),
            retweets: bounded(word(1), 5, 100),
            replies: bounded(word(2), 2, 50),
            views_tenths: bounded(word(3), 10, 100),
        }
    }

    /// Views as rendered on the card, e.g. `5.7K`.
    #[must_use]
    pub fn views_label(&self) -> String {
        format!("{}.{}K", self.views_tenths / 10, self.views_tenths % 10)
    }
}

/// `base + (value % span)`.
fn bounded(value: u64, base: u32, span: u32) -> u32 {
    let offset = u32::try_from(value % u64::from(span)).unwrap_or(0);
    base + offset
}
