//! Filesize-limit compression (§4.4), grounded on
//! `modules/MediaServer2.py::compress_image`.

use crate::error::TcmError;

/// A single compression attempt at a given JPEG quality. Implemented by
/// the image-composition kernel (out of scope here, §1); this module
/// only owns the search loop over quality levels.
pub trait JpegCompressor {
    fn recompress(&self, bytes: &[u8], quality: u8) -> Result<Vec<u8>, TcmError>;
}

const STARTING_QUALITY: u8 = 95;
const QUALITY_STEP: u8 = 5;

/// Re-encode `bytes` at decreasing JPEG quality (95, 90, ..., 0) until
/// the result fits `filesize_limit`. Returns the original bytes
/// unmodified if they already fit. Returns `ResourceExceeded` if no
/// quality level (down to 0) fits — the caller should skip the upload
/// for this Card rather than retry immediately (§7).
pub fn compress_to_limit(
    compressor: &dyn JpegCompressor,
    bytes: &[u8],
    filesize_limit: Option<u64>,
) -> Result<Vec<u8>, TcmError> {
    let Some(limit) = filesize_limit else {
        return Ok(bytes.to_vec());
    };

    if (bytes.len() as u64) <= limit {
        return Ok(bytes.to_vec());
    }

    let mut quality = STARTING_QUALITY;
    loop {
        let candidate = compressor.recompress(bytes, quality)?;
        if (candidate.len() as u64) <= limit {
            return Ok(candidate);
        }

        if quality < QUALITY_STEP {
            return Err(TcmError::ResourceExceeded(format!(
                "could not compress below {limit} bytes (last attempt at quality 0 was {} bytes)",
                candidate.len()
            )));
        }
        quality -= QUALITY_STEP;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A fake compressor whose output size shrinks linearly with
    /// quality, letting tests drive the search loop deterministically
    /// without a real JPEG encoder.
    struct LinearShrink {
        bytes_per_quality_point: usize,
    }

    impl JpegCompressor for LinearShrink {
        fn recompress(&self, bytes: &[u8], quality: u8) -> Result<Vec<u8>, TcmError> {
            let size = (quality as usize) * self.bytes_per_quality_point;
            Ok(vec![0u8; size.min(bytes.len())])
        }
    }

    #[test]
    fn returns_original_bytes_when_already_under_limit() {
        let compressor = LinearShrink { bytes_per_quality_point: 1000 };
        let bytes = vec![0u8; 100];
        let out = compress_to_limit(&compressor, &bytes, Some(1000)).unwrap();
        assert_eq!(out.len(), 100);
    }

    #[test]
    fn no_limit_means_no_compression() {
        let compressor = LinearShrink { bytes_per_quality_point: 1000 };
        let bytes = vec![0u8; 1_000_000];
        let out = compress_to_limit(&compressor, &bytes, None).unwrap();
        assert_eq!(out.len(), bytes.len());
    }

    #[test]
    fn steps_quality_down_until_it_fits() {
        let compressor = LinearShrink { bytes_per_quality_point: 100 };
        let bytes = vec![0u8; 1_000_000];
        // quality*100 <= 5000 => quality <= 50, first tried at 95 -> 9500 (too big)... walk down to 50.
        let out = compress_to_limit(&compressor, &bytes, Some(5000)).unwrap();
        assert!(out.len() <= 5000);
    }

    #[test]
    fn resource_exceeded_when_even_quality_zero_does_not_fit() {
        let compressor = LinearShrink { bytes_per_quality_point: 1000 };
        let bytes = vec![0u8; 1_000_000];
        let err = compress_to_limit(&compressor, &bytes, Some(1)).unwrap_err();
        assert!(matches!(err, TcmError::ResourceExceeded(_)));
    }
}
