//! Fixed-duration audio segmentation for streaming upload.

/// A bounded slice of source audio tagged with its upload position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSegment {
    /// Ordinal position, ascending from 1.
    pub sequence: i32,
    pub data: Vec<u8>,
    pub is_last: bool,
}

/// Partition `data` into segments of at most `segment_bytes`, preserving
/// byte order. The final segment may be short. Empty input yields a single
/// empty final segment so the upload still carries a terminating frame.
pub fn segment_audio(data: &[u8], segment_bytes: usize) -> Vec<AudioSegment> {
    let segment_bytes = segment_bytes.max(1);
    if data.is_empty() {
        return vec![AudioSegment {
            sequence: 1,
            data: Vec::new(),
            is_last: true,
        }];
    }

    let count = data.len().div_ceil(segment_bytes);
    data.chunks(segment_bytes)
        .enumerate()
        .map(|(i, chunk)| AudioSegment {
            sequence: (i + 1) as i32,
            data: chunk.to_vec(),
            is_last: i + 1 == count,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_even_split() {
        let segments = segment_audio(&[0u8; 100], 25);
        assert_eq!(segments.len(), 4);
        assert_eq!(segments[0].sequence, 1);
        assert_eq!(segments[3].sequence, 4);
        assert!(segments[3].is_last);
        assert!(segments[..3].iter().all(|s| !s.is_last));
    }

    #[test]
    fn test_short_final_segment() {
        let data: Vec<u8> = (0..10).collect();
        let segments = segment_audio(&data, 4);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[2].data, vec![8, 9]);
        assert!(segments[2].is_last);
        // Concatenation reproduces the source in order
        let joined: Vec<u8> = segments.iter().flat_map(|s| s.data.clone()).collect();
        assert_eq!(joined, data);
    }

    #[test]
    fn test_single_segment() {
        let segments = segment_audio(b"tiny", 1024);
        assert_eq!(segments.len(), 1);
        assert!(segments[0].is_last);
        assert_eq!(segments[0].sequence, 1);
    }

    #[test]
    fn test_empty_input_yields_terminator() {
        let segments = segment_audio(&[], 1024);
        assert_eq!(segments.len(), 1);
        assert!(segments[0].is_last);
        assert!(segments[0].data.is_empty());
    }
}
