//! Lowercase hex encoding for fixed-width identifiers, keys, and digests.

/// Encode bytes as lowercase hex.
pub fn encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Decode a hex string into exactly `N` bytes.
///
/// Accepts an optional `0x` prefix and surrounding whitespace.
pub fn decode_array<const N: usize>(hex: &str) -> Result<[u8; N], String> {
    let hex = hex.trim();
    let hex = hex.strip_prefix("0x").unwrap_or(hex);
    if hex.len() != N * 2 {
        return Err(format!("expected {} hex chars, got {}", N * 2, hex.len()));
    }
    let mut out = [0u8; N];
    for (i, pair) in hex.as_bytes().chunks(2).enumerate() {
        let digit = |at: usize| {
            char::from(pair[at])
                .to_digit(16)
                .ok_or_else(|| format!("invalid hex digit {:?} at {}", char::from(pair[at]), i * 2 + at))
        };
        out[i] = (digit(0)? * 16 + digit(1)?) as u8;
    }
    Ok(out)
}

/// First four bytes as hex, for `Debug` output.
pub fn prefix(bytes: &[u8]) -> String {
    encode(&bytes[..bytes.len().min(4)])
}
