//! Query encoding and the download verification code.

use std::fmt::Write;

const MASK: i128 = 0xFFFF_FFFF;
const WRAP: i128 = 0x1_0000_0000;
const HALF: i128 = 0x8000_0000;

/// Upper-case hex of the UTF-16LE bytes of `text`, lower-cased first with
/// spaces and apostrophes removed.
pub fn encode_term(text: &str) -> String {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .filter(|c| *c != ' ' && *c != '\'')
        .collect();

    let mut out = String::with_capacity(cleaned.len() * 4);
    for unit in cleaned.encode_utf16() {
        for byte in unit.to_le_bytes() {
            let _ = write!(out, "{byte:02X}");
        }
    }
    out
}

/// Reduce to the server's signed 32-bit window.
fn fold(value: i128) -> i128 {
    let mut r = value.rem_euclid(WRAP);
    if value >= 0 && r > HALF {
        r -= WRAP;
    }
    if value < 0 && r < HALF {
        r += WRAP;
    }
    r
}

/// Bytes are mixed in as signed chars.
fn signed(byte: u8) -> i128 {
    i128::from(byte) - if byte >= 0x80 { 0x100 } else { 0 }
}

/// Verification code the server expects with a download request for lyric
/// `id`, computed over the artist and title as returned by the search.
pub fn download_code(id: u32, artist: &str, title: &str) -> i64 {
    let id = i128::from(id);
    let data: Vec<u8> = artist.bytes().chain(title.bytes()).collect();

    let mut t1 = (id & 0xFF00) >> 8;
    let mut t3 = if id & 0x00FF_0000 == 0 {
        0xFF & !t1
    } else {
        0xFF & (id >> 16)
    };
    t3 |= (0xFF & id) << 8;
    t3 <<= 8;
    t3 |= 0xFF & t1;
    t3 <<= 8;
    t3 |= if id & 0xFF00_0000 == 0 {
        0xFF & !id
    } else {
        0xFF & (id >> 24)
    };

    let mut t2: i128 = 0;
    for (j, &byte) in data.iter().enumerate().rev() {
        t1 = (signed(byte) + t2) & MASK;
        t2 = (t2 << (j % 2 + 4)) & MASK;
        t2 = (t1 + t2) & MASK;
    }

    t1 = 0;
    for (j, &byte) in data.iter().enumerate() {
        let t4 = (signed(byte) + t1) & MASK;
        t1 = (t1 << (j % 2 + 3)) & MASK;
        t1 = (t1 + t4) & MASK;
    }

    let mut code = fold(t2 ^ t3);
    code = fold(code + (t1 | id));
    code = fold(code * (t1 | t3));
    code = fold(code * (t2 ^ id));
    if code > HALF {
        code -= WRAP;
    }

    // Always within (-2^31, 2^31] here
    i64::try_from(code).unwrap_or_default()
}
