//! Box-filter decimation from the capture rate to the link rate.
//!
//! Each output sample is the plain mean of its source window. There is no
//! anti-aliasing filter, so content above the target Nyquist frequency folds
//! back into the band. Receivers depend on this exact output, keep it as is.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DownsampleError {
    #[error("Target rate {target_rate} Hz exceeds source rate {source_rate} Hz")]
    Upsampling { source_rate: u32, target_rate: u32 },

    #[error("Sample rates must be positive")]
    ZeroRate,
}

/// Scales a sample in `[-1, 1]` to the signed 16-bit range, truncating.
pub fn quantize(sample: f32) -> i16 {
    // NaN saturates to 0 through `as`
    (sample.clamp(-1.0, 1.0) * 32767.0) as i16
}

pub fn quantize_block(block: &[f32]) -> Vec<i16> {
    block.iter().copied().map(quantize).collect()
}

/// Converts a block at `source_rate` to 16-bit samples at `target_rate`.
///
/// Output length is `round(len / ratio)`; sample `i` averages the source
/// window `[round(i * ratio), round((i + 1) * ratio))`, clipped to the input.
/// An empty window yields `0`.
pub fn downsample(
    block: &[f32],
    source_rate: u32,
    target_rate: u32,
) -> Result<Vec<i16>, DownsampleError> {
    if source_rate == 0 || target_rate == 0 {
        return Err(DownsampleError::ZeroRate);
    }
    if target_rate > source_rate {
        return Err(DownsampleError::Upsampling {
            source_rate,
            target_rate,
        });
    }
    if target_rate == source_rate {
        return Ok(quantize_block(block));
    }

    let ratio = source_rate as f64 / target_rate as f64;
    let output_len = (block.len() as f64 / ratio).round() as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let start = ((i as f64 * ratio).round() as usize).min(block.len());
        let end = (((i + 1) as f64 * ratio).round() as usize).min(block.len());
        if start >= end {
            output.push(0);
            continue;
        }
        let window = &block[start..end];
        let mean = window.iter().map(|s| *s as f64).sum::<f64>() / window.len() as f64;
        output.push(quantize(mean as f32));
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_rate_is_quantize() {
        let block = [0.0, 0.5, -0.5, 1.0, -1.0, 1.5, -2.0];
        for rate in [8000, 44100, 48000] {
            assert_eq!(downsample(&block, rate, rate).unwrap(), quantize_block(&block));
        }
        assert_eq!(quantize(0.5), 16383);
        assert_eq!(quantize(-0.5), -16383);
        assert_eq!(quantize(1.5), 32767);
        assert_eq!(quantize(-2.0), -32767);
    }

    #[test]
    fn test_constant_full_scale_halved() {
        let out = downsample(&[1.0; 8], 8000, 4000).unwrap();
        assert_eq!(out, vec![32767; 4]);
    }

    #[test]
    fn test_alternating_signal_averages_to_zero() {
        let block: Vec<f32> = [1.0, -1.0].repeat(4);
        let out = downsample(&block, 8000, 4000).unwrap();
        assert_eq!(out, vec![0; 4]);
    }

    #[test]
    fn test_upsampling_is_rejected() {
        assert_eq!(
            downsample(&[0.0; 4], 8000, 16000),
            Err(DownsampleError::Upsampling {
                source_rate: 8000,
                target_rate: 16000
            })
        );
        assert_eq!(downsample(&[0.0; 4], 0, 0), Err(DownsampleError::ZeroRate));
    }

    #[test]
    fn test_capture_buffer_length() {
        // 4096 samples at 44.1 kHz down to 16 kHz
        let out = downsample(&vec![0.25; 4096], 44100, 16000).unwrap();
        assert_eq!(out.len(), (4096.0_f64 / (44100.0 / 16000.0)).round() as usize);
        assert!(out.iter().all(|s| *s == quantize(0.25)));
    }

    #[test]
    fn test_trailing_window_clipped() {
        // ratio 1.5: windows [0,2) [2,3) [3,5), the last one clipped to [3,4)
        let block = [0.5, 0.5, -0.5, 1.0];
        let out = downsample(&block, 3, 2).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[0], quantize(0.5));
        assert_eq!(out[1], quantize(-0.5));
        assert_eq!(out[2], quantize(1.0));
    }

    #[test]
    fn test_empty_block() {
        assert!(downsample(&[], 44100, 16000).unwrap().is_empty());
    }
}
