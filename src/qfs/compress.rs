use super::{FrameHeader, QfsError, MAX_MATCH, MAX_UNCOMPRESSED_SIZE, MIN_MATCH, WINDOW};
use crate::record::Record;

/// Literal run sizes the encoder emits, largest first.
const LITERAL_CHUNKS: [usize; 10] = [28, 24, 20, 16, 12, 8, 4, 3, 2, 1];

const HASH_BITS: u32 = 16;
const NONE: usize = usize::MAX;

/// Compress `plain` into a complete QFS frame.
pub fn compress(plain: &[u8]) -> Result<Vec<u8>, QfsError> {
    if plain.len() > MAX_UNCOMPRESSED_SIZE {
        return Err(QfsError::InputTooLarge(plain.len()));
    }
    let body = compress_body(plain)?;
    let mut out = FrameHeader::new(body.len(), plain.len()).to_bytes();
    out.extend_from_slice(&body);
    Ok(out)
}

/// Compress only if it helps.  Returns `(true, frame)` when the frame is
/// strictly shorter than `plain`, otherwise `(false, plain)` unchanged.
pub fn try_compress(plain: &[u8]) -> (bool, Vec<u8>) {
    match compress(plain) {
        Ok(frame) if frame.len() < plain.len() => (true, frame),
        Ok(_) => (false, plain.to_vec()),
        Err(e) => {
            tracing::debug!(error = %e, "storing payload uncompressed");
            (false, plain.to_vec())
        }
    }
}

/// Encode the opcode stream for `plain` (no frame header).
///
/// Greedy: at each position take the longest match of at least
/// [`MIN_MATCH`] bytes starting no more than [`WINDOW`] bytes back, capped at
/// [`MAX_MATCH`]; otherwise queue the byte as a literal.
pub fn compress_body(plain: &[u8]) -> Result<Vec<u8>, QfsError> {
    let mut out = Vec::with_capacity(plain.len() / 2 + 16);
    let mut finder = MatchFinder::new(plain);
    let mut literal_start = 0;
    let mut pos = 0;

    while pos < plain.len() {
        match finder.longest_match(pos) {
            Some((length, offset)) => {
                emit_literals(&mut out, &plain[literal_start..pos]);
                emit_copy(&mut out, length, offset)?;
                for p in pos..pos + length {
                    finder.insert(p);
                }
                pos += length;
                literal_start = pos;
            }
            None => {
                finder.insert(pos);
                pos += 1;
            }
        }
    }
    emit_literals(&mut out, &plain[literal_start..]);
    Ok(out)
}

fn emit_literals(out: &mut Vec<u8>, mut literals: &[u8]) {
    while !literals.is_empty() {
        let size = LITERAL_CHUNKS
            .iter()
            .copied()
            .find(|&c| c <= literals.len())
            .unwrap_or(1);
        let op = if size >= 4 { 0xE0 | ((size - 4) >> 2) as u8 } else { 0xFC + size as u8 };
        out.push(op);
        out.extend_from_slice(&literals[..size]);
        literals = &literals[size..];
    }
}

/// Emit a copy with the narrowest opcode class that can hold it.
fn emit_copy(out: &mut Vec<u8>, length: usize, offset: usize) -> Result<(), QfsError> {
    if offset == 0 {
        return Err(QfsError::EncodingRange { length, offset });
    }
    let o = offset - 1;
    if (3..=10).contains(&length) && offset <= 1024 {
        out.push((((o >> 3) & 0x60) | ((length - 3) << 2)) as u8);
        out.push(o as u8);
    } else if (4..=67).contains(&length) && offset <= 16384 {
        out.push(0x80 | (length - 4) as u8);
        out.push((o >> 8) as u8 & 0x3F);
        out.push(o as u8);
    } else if (5..=1028).contains(&length) && offset <= 131_072 {
        let l = length - 5;
        out.push(0xC0 | ((o >> 12) & 0x10) as u8 | ((l >> 6) & 0x0C) as u8);
        out.push((o >> 8) as u8);
        out.push(o as u8);
        out.push(l as u8);
    } else {
        return Err(QfsError::EncodingRange { length, offset });
    }
    Ok(())
}

/// Hash chains over 4-byte prefixes.  Chains run newest first, so on equal
/// lengths the nearest match wins.
struct MatchFinder<'a> {
    data: &'a [u8],
    head: Vec<usize>,
    prev: Vec<usize>,
}

impl<'a> MatchFinder<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            head: vec![NONE; 1 << HASH_BITS],
            prev: vec![NONE; data.len()],
        }
    }

    fn hash(&self, pos: usize) -> usize {
        let d = &self.data[pos..pos + 4];
        let v = u32::from_le_bytes([d[0], d[1], d[2], d[3]]);
        (v.wrapping_mul(0x9E37_79B1) >> (32 - HASH_BITS)) as usize
    }

    fn insert(&mut self, pos: usize) {
        if pos + MIN_MATCH > self.data.len() {
            return;
        }
        let h = self.hash(pos);
        self.prev[pos] = self.head[h];
        self.head[h] = pos;
    }

    /// `(length, offset)` of the best match for the bytes at `pos`.
    fn longest_match(&self, pos: usize) -> Option<(usize, usize)> {
        if pos + MIN_MATCH > self.data.len() {
            return None;
        }
        let max_len = MAX_MATCH.min(self.data.len() - pos);
        let mut best: Option<(usize, usize)> = None;
        let mut cand = self.head[self.hash(pos)];

        while cand != NONE && pos - cand <= WINDOW {
            let len = self.data[cand..cand + max_len]
                .iter()
                .zip(&self.data[pos..pos + max_len])
                .take_while(|(a, b)| a == b)
                .count();
            if len >= MIN_MATCH && best.map_or(true, |(l, _)| len > l) {
                best = Some((len, pos - cand));
                if len == max_len {
                    break;
                }
            }
            cand = self.prev[cand];
        }
        best
    }
}
