//! RFC 1071 internet checksum.

/// Ones'-complement sum of `data` taken as big-endian 16-bit words, starting
/// from `seed`. The carry out of bit 16 is folded back in after every word.
///
/// A trailing odd byte is treated as the high half of a word padded with zero.
pub fn sum16(data: &[u8], seed: u16) -> u16 {
    let mut sum = seed;
    let mut words = data.chunks_exact(2);
    for word in &mut words {
        sum = add_ones_complement(sum, u16::from_be_bytes([word[0], word[1]]));
    }
    if let [last] = words.remainder() {
        sum = add_ones_complement(sum, u16::from_be_bytes([*last, 0]));
    }
    sum
}

/// Ones'-complement of a running sum. A header whose sum includes its own
/// checksum field finalizes to zero.
#[inline]
pub fn finalize(sum: u16) -> u16 {
    !sum
}

/// Checksum of `data` in one go.
pub fn checksum(data: &[u8]) -> u16 {
    finalize(sum16(data, 0))
}

#[inline]
fn add_ones_complement(x: u16, y: u16) -> u16 {
    let (sum, carry) = x.overflowing_add(y);
    sum + carry as u16
}
