//! Batch QFS work over many independent payloads.
//!
//! With the `parallel` feature the batch runs on the Rayon global pool;
//! otherwise it runs in order on the calling thread.  The QFS functions
//! share no state, so the results are identical either way.

use crate::qfs::{self, QfsError};

/// `try_compress` every payload.  Output order matches input order.
pub fn compress_payloads(payloads: &[&[u8]]) -> Vec<(bool, Vec<u8>)> {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        payloads.par_iter().map(|p| qfs::try_compress(p)).collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        payloads.iter().map(|p| qfs::try_compress(p)).collect()
    }
}

/// Decompress every frame.  The first failure is returned.
pub fn decompress_payloads(frames: &[&[u8]]) -> Result<Vec<Vec<u8>>, QfsError> {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        frames
            .par_iter()
            .map(|f| qfs::decompress(f).map(|(_, plain)| plain))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        frames
            .iter()
            .map(|f| qfs::decompress(f).map(|(_, plain)| plain))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_preserves_order() {
        let a = vec![1u8; 300];
        let b = b"xy".to_vec();
        let out = compress_payloads(&[a.as_slice(), b.as_slice()]);
        assert!(out[0].0);
        assert_eq!(out[1], (false, b.clone()));

        let plain = decompress_payloads(&[out[0].1.as_slice()]).unwrap();
        assert_eq!(plain[0], a);
    }
}
