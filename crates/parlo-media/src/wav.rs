//! WAV container packaging for captured PCM.

/// Wrap raw mono 16-bit PCM in a WAV container.
pub fn pcm_to_wav(samples: &[i16], sample_rate: u32) -> Vec<u8> {
    const CHANNELS: u16 = 1;
    const BITS_PER_SAMPLE: u16 = 16;

    let data_len = samples.len() * 2;
    let byte_rate = sample_rate * u32::from(CHANNELS) * u32::from(BITS_PER_SAMPLE) / 8;
    let block_align = CHANNELS * BITS_PER_SAMPLE / 8;
    let file_size = 36 + data_len as u32;

    let mut wav = Vec::with_capacity(44 + data_len);

    // RIFF header
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&file_size.to_le_bytes());
    wav.extend_from_slice(b"WAVE");

    // fmt chunk
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM format
    wav.extend_from_slice(&CHANNELS.to_le_bytes());
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&block_align.to_le_bytes());
    wav.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    // data chunk
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&(data_len as u32).to_le_bytes());
    for &sample in samples {
        wav.extend_from_slice(&sample.to_le_bytes());
    }

    wav
}

/// A short stretch of silence, used to prime gated audio outputs.
pub fn silent_wav(sample_rate: u32, millis: u32) -> Vec<u8> {
    let samples = (u64::from(sample_rate) * u64::from(millis) / 1000) as usize;
    pcm_to_wav(&vec![0i16; samples], sample_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wav_header_layout() {
        let pcm = vec![0i16; 16000]; // 1 second at 16kHz
        let wav = pcm_to_wav(&pcm, 16000);

        // 44-byte header followed by 2 bytes per sample
        assert_eq!(wav.len(), 44 + 16000 * 2);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(&wav[36..40], b"data");

        // mono, 16kHz, 16-bit
        assert_eq!(u16::from_le_bytes([wav[22], wav[23]]), 1);
        assert_eq!(u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]), 16000);
        assert_eq!(u16::from_le_bytes([wav[34], wav[35]]), 16);
    }

    #[test]
    fn test_empty_pcm_still_has_header() {
        let wav = pcm_to_wav(&[], 16000);
        assert_eq!(wav.len(), 44);
        assert_eq!(u32::from_le_bytes([wav[40], wav[41], wav[42], wav[43]]), 0);
    }

    #[test]
    fn test_samples_are_little_endian() {
        let wav = pcm_to_wav(&[0x0102, -1], 16000);
        assert_eq!(&wav[44..48], &[0x02, 0x01, 0xFF, 0xFF]);
    }

    #[test]
    fn test_silent_wav_duration() {
        let wav = silent_wav(16000, 50);
        assert_eq!(wav.len(), 44 + 800 * 2); // 50ms at 16kHz
        assert!(wav[44..].iter().all(|&b| b == 0));
    }
}
