/// Maximum number of scored Want slots in [`ResultRecord::score_wants`].
pub const MAX_SCORE_WANTS: usize = 32;

/// The fixed 46-byte on-wire result record produced by the compute kernel for
/// each scored seed. Layout is bit-exact with the kernel and MUST NOT change:
/// offsets are part of the host/device contract (see the data model).
///
/// `seed[0] == 0` is the kernel's sentinel for "no result in this slot" (an
/// empty tail slot of a batch). This is flagged in DESIGN.md as a brittle
/// convention inherited unchanged from upstream — do not replace it with a
/// `total_score == 0` check without confirming with the kernel author.
#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct ResultRecord {
    /// NUL-padded base-35 seed string, bytes 0-8.
    pub seed: [u8; 9],
    /// Explicit padding byte, offset 9.
    pub _padding: u8,
    /// Total score, offset 10-11.
    pub total_score: u16,
    /// Natural negative joker count, offset 12.
    pub natural_negative_jokers: u8,
    /// Desired negative joker count, offset 13.
    pub desired_negative_jokers: u8,
    /// Per-Want score, offset 14-45.
    pub score_wants: [u8; MAX_SCORE_WANTS],
}

impl Default for ResultRecord {
    fn default() -> Self {
        ResultRecord {
            seed: [0; 9],
            _padding: 0,
            total_score: 0,
            natural_negative_jokers: 0,
            desired_negative_jokers: 0,
            score_wants: [0; MAX_SCORE_WANTS],
        }
    }
}

// Required so `ResultRecord` can back an `ocl::Buffer<ResultRecord>`.
unsafe impl ocl::OclPrm for ResultRecord {}

impl ResultRecord {
    /// `true` if this slot holds no result (the kernel's empty-slot sentinel).
    pub fn is_empty_slot(&self) -> bool {
        self.seed[0] == 0
    }

    /// The seed string, stopping at the first NUL.
    pub fn seed_str(&self) -> &str {
        let end = self.seed.iter().position(|&b| b == 0).unwrap_or(self.seed.len());
        std::str::from_utf8(&self.seed[..end]).unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_exactly_46_bytes() {
        assert_eq!(std::mem::size_of::<ResultRecord>(), 46);
    }

    #[test]
    fn field_offsets_match_the_wire_contract() {
        assert_eq!(std::mem::offset_of!(ResultRecord, seed), 0);
        assert_eq!(std::mem::offset_of!(ResultRecord, _padding), 9);
        assert_eq!(std::mem::offset_of!(ResultRecord, total_score), 10);
        assert_eq!(std::mem::offset_of!(ResultRecord, natural_negative_jokers), 12);
        assert_eq!(std::mem::offset_of!(ResultRecord, desired_negative_jokers), 13);
        assert_eq!(std::mem::offset_of!(ResultRecord, score_wants), 14);
    }

    #[test]
    fn default_record_is_the_empty_slot_sentinel() {
        assert!(ResultRecord::default().is_empty_slot());
    }

    #[test]
    fn seed_str_stops_at_nul() {
        let mut r = ResultRecord::default();
        r.seed[..4].copy_from_slice(b"ABCD");
        assert_eq!(r.seed_str(), "ABCD");
    }
}
