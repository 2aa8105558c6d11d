use super::{FrameHeader, QfsError, FRAME_HEADER_SIZE};

/// Decompress a whole QFS frame: header followed by the opcode stream.
///
/// Bytes beyond the header's `compressed_size` are ignored.
pub fn decompress(data: &[u8]) -> Result<(FrameHeader, Vec<u8>), QfsError> {
    let header = FrameHeader::read_from(data)?;
    let end = (header.compressed_size as usize).min(data.len());
    let body = &data[FRAME_HEADER_SIZE..end];
    let plain = decompress_body(body, header.uncompressed_size as usize)?;
    Ok((header, plain))
}

/// Run the opcode loop over `body` until it is consumed or `expected` bytes
/// have been produced.  Ending short of `expected` is an error; output past
/// it is cut off.
pub fn decompress_body(body: &[u8], expected: usize) -> Result<Vec<u8>, QfsError> {
    let mut out = Vec::with_capacity(expected);
    let mut input = Input { body, pos: 0, expected };

    while !input.is_empty() && out.len() < expected {
        let op = input.byte(out.len())?;

        let (plain, copy, offset) = match op {
            0x00..=0x7F => {
                let b0 = input.byte(out.len())? as usize;
                let op = op as usize;
                (op & 0x03, ((op >> 2) & 0x07) + 3, ((op & 0x60) << 3) + b0 + 1)
            }
            0x80..=0xBF => {
                let b0 = input.byte(out.len())? as usize;
                let b1 = input.byte(out.len())? as usize;
                ((b0 >> 6) & 0x03, (op as usize & 0x3F) + 4, ((b0 & 0x3F) << 8) + b1 + 1)
            }
            0xC0..=0xDF => {
                let b0 = input.byte(out.len())? as usize;
                let b1 = input.byte(out.len())? as usize;
                let b2 = input.byte(out.len())? as usize;
                let op = op as usize;
                (op & 0x03, ((op & 0x0C) << 6) + b2 + 5, ((op & 0x10) << 12) + (b0 << 8) + b1 + 1)
            }
            0xE0..=0xFB => ((((op & 0x1F) as usize) << 2) + 4, 0, 0),
            0xFC..=0xFF => ((op & 0x03) as usize, 0, 0),
        };

        if plain > 0 {
            out.extend_from_slice(input.take(plain, out.len())?);
        }

        if copy > 0 {
            if offset > out.len() {
                return Err(QfsError::InvalidBackReference { offset, available: out.len() });
            }
            // Byte at a time: the source may overlap what is being written.
            let from = out.len() - offset;
            for i in 0..copy {
                let b = out[from + i];
                out.push(b);
            }
        }
    }

    if out.len() < expected {
        return Err(QfsError::TruncatedStream { produced: out.len(), expected });
    }
    // A final copy may run past the declared size; the excess is dropped.
    out.truncate(expected);
    Ok(out)
}

struct Input<'a> {
    body:     &'a [u8],
    pos:      usize,
    expected: usize,
}

impl<'a> Input<'a> {
    fn is_empty(&self) -> bool {
        self.pos >= self.body.len()
    }

    fn take(&mut self, n: usize, produced: usize) -> Result<&'a [u8], QfsError> {
        let end = self.pos + n;
        if end > self.body.len() {
            return Err(QfsError::TruncatedStream { produced, expected: self.expected });
        }
        let slice = &self.body[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn byte(&mut self, produced: usize) -> Result<u8, QfsError> {
        Ok(self.take(1, produced)?[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qfs::QFS_MAGIC;
    use crate::record::Record;

    fn frame(body: &[u8], size: usize) -> Vec<u8> {
        let mut out = FrameHeader::new(body.len(), size).to_bytes();
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn overlapping_copy_repeats_pattern() {
        // one literal 'A', then copy 6 from one byte back
        let body = [0x0D, 0x00, b'A'];
        let (header, plain) = decompress(&frame(&body, 7)).unwrap();
        assert_eq!(header.magic, QFS_MAGIC);
        assert_eq!(plain, b"AAAAAAA");
    }

    #[test]
    fn overlapping_copy_with_period_two() {
        // literals "AB" via 0xFE, then copy 6 from two back
        let body = [0xFE, b'A', b'B', 0x0C, 0x01];
        let (_, plain) = decompress(&frame(&body, 8)).unwrap();
        assert_eq!(plain, b"ABABABAB");
    }

    #[test]
    fn literal_run_classes() {
        // 0xE0 = 4 literals, 0xFF = 3 literals
        let body = [0xE0, 1, 2, 3, 4, 0xFF, 5, 6, 7];
        let (_, plain) = decompress(&frame(&body, 7)).unwrap();
        assert_eq!(plain, [1u8, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn medium_and_long_copy_classes() {
        let mut body = vec![0xE0, b'w', b'x', b'y', b'z'];
        // 0x80 class: one literal (b0's top bits), then copy 4 from offset 5
        body.extend_from_slice(&[0x80, 0x40, 0x04, b'!']);
        // 0xC0 class: copy 5 from offset 9
        body.extend_from_slice(&[0xC0, 0x00, 0x08, 0x00]);
        let (_, plain) = decompress(&frame(&body, 14)).unwrap();
        assert_eq!(plain, b"wxyz!wxyzwxyz!");
    }

    #[test]
    fn stream_ending_early_is_truncated() {
        let body = [0xE0, 1, 2, 3, 4];
        let err = decompress(&frame(&body, 10)).unwrap_err();
        assert!(matches!(err, QfsError::TruncatedStream { produced: 4, expected: 10 }));
    }

    #[test]
    fn literal_run_past_end_of_input_is_truncated() {
        let body = [0xE0, 1, 2];
        assert!(matches!(
            decompress(&frame(&body, 4)),
            Err(QfsError::TruncatedStream { .. })
        ));
    }

    #[test]
    fn copy_past_declared_size_is_cut_off() {
        // 'A' then a copy of 6 from one back, but only 5 bytes declared
        let body = [0xFD, b'A', 0x0C, 0x00];
        let (header, plain) = decompress(&frame(&body, 5)).unwrap();
        assert_eq!(header.uncompressed_size, 5);
        assert_eq!(plain, b"AAAAA");
    }

    #[test]
    fn back_reference_before_start_is_rejected() {
        let body = [0xFD, b'A', 0x0C, 0x05];
        assert!(matches!(
            decompress(&frame(&body, 7)),
            Err(QfsError::InvalidBackReference { offset: 6, available: 1 })
        ));
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut data = frame(&[0xFD, b'A'], 1);
        data[5] = 0x00;
        assert!(matches!(decompress(&data), Err(QfsError::InvalidMagic(0x0010))));
    }

    #[test]
    fn trailing_bytes_past_compressed_size_are_ignored() {
        let mut data = frame(&[0xFD, b'A'], 1);
        data.extend_from_slice(&[0xFF, 0xFF, 0xFF]);
        assert_eq!(decompress(&data).unwrap().1, b"A");
    }
}
