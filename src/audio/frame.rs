use anyhow::Result;

/// All streams run at 48 kHz mono.
pub const SAMPLE_RATE: u32 = 48_000;
/// Samples per frame: 20 ms at 48 kHz.
pub const FRAME_SAMPLES: usize = 960;
/// Wire size of one frame: raw little-endian f32 PCM.
pub const FRAME_BYTES: usize = FRAME_SAMPLES * size_of::<f32>();

/// One fixed-size unit of audio plus the time it arrived.
///
/// Immutable once ingested. The playback queue owns it until render time,
/// at which point the samples move into the audio sink and the frame is gone.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Mono f32 samples at 48 kHz.
    pub samples: Vec<f32>,
    /// Receive timestamp, monotonic milliseconds since session start.
    pub arrival_ms: u64,
}

impl Frame {
    /// Decode a wire payload into a frame.
    ///
    /// Payloads that are empty, truncated mid-sample, or the wrong frame size
    /// are rejected; the caller drops them without touching any statistics.
    pub fn decode(payload: &[u8], arrival_ms: u64) -> Result<Self> {
        if payload.is_empty() {
            anyhow::bail!("empty frame payload");
        }
        if payload.len() % size_of::<f32>() != 0 {
            anyhow::bail!(
                "payload length {} is not a whole number of f32 samples",
                payload.len()
            );
        }
        if payload.len() != FRAME_BYTES {
            anyhow::bail!(
                "payload is {} bytes, expected {} ({} samples)",
                payload.len(),
                FRAME_BYTES,
                FRAME_SAMPLES
            );
        }

        let samples = payload
            .chunks_exact(size_of::<f32>())
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        Ok(Self { samples, arrival_ms })
    }

    /// Serialize samples into the wire format accepted by [`Frame::decode`].
    pub fn encode(samples: &[f32]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(samples.len() * size_of::<f32>());
        for sample in samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_valid_payload() {
        let samples: Vec<f32> = (0..FRAME_SAMPLES).map(|i| i as f32 * 0.001).collect();
        let payload = Frame::encode(&samples);

        let frame = Frame::decode(&payload, 42).unwrap();
        assert_eq!(frame.samples, samples);
        assert_eq!(frame.arrival_ms, 42);
    }

    #[test]
    fn test_decode_rejects_empty_payload() {
        assert!(Frame::decode(&[], 0).is_err());
    }

    #[test]
    fn test_decode_rejects_truncated_sample() {
        let payload = vec![0u8; FRAME_BYTES - 1];
        assert!(Frame::decode(&payload, 0).is_err());
    }

    #[test]
    fn test_decode_rejects_undersized_frame() {
        let payload = vec![0u8; FRAME_BYTES / 2];
        assert!(Frame::decode(&payload, 0).is_err());
    }
}
