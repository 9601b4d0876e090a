/// Broadcast a single source bit over a lane literal.
///
/// Returns `literal` when the low bit of `bit` is set and `0` otherwise, so
/// one source bit can feed every lane named in `literal` at once.
#[inline]
pub fn select(bit: u64, literal: u64) -> u64 {
    let mask = if bit & 1 == 1 { u64::MAX } else { 0 };
    mask & literal
}

/// Mask with the low `lanes` bits set. 64 or more lanes give all ones.
#[inline]
pub fn live_mask(lanes: u32) -> u64 {
    if lanes >= u64::BITS {
        u64::MAX
    } else {
        (1u64 << lanes) - 1
    }
}

/// Extract bit `pos` of `word` as 0 or 1.
#[inline]
pub fn bit_of(word: u64, pos: u32) -> u64 {
    (word >> pos) & 1
}

/// Parse a numeric literal, decimal or `0x` prefixed hexadecimal.
pub fn parse_literal(s: &str) -> Option<u64> {
    if let Ok(r) = s.parse() {
        return Some(r);
    }
    if let Some(hex) = s.strip_prefix("0x") {
        return u64::from_str_radix(hex, 16).ok();
    }
    None
}

/// Render the low `width` bits of `word`, most significant lane first.
pub fn format_lanes(word: u64, width: u32) -> String {
    (0..width.min(u64::BITS))
        .rev()
        .map(|i| if bit_of(word, i) == 1 { '1' } else { '0' })
        .collect()
}
