//! Binary template format for stored embeddings.
//!
//! Layout: magic `RCE1`, `u16` LE dimension, then `dimension` × `f32` LE.

use crate::types::Embedding;
use thiserror::Error;

const MAGIC: &[u8; 4] = b"RCE1";
const HEADER_LEN: usize = 6;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CodecError {
    #[error("not a face template (bad magic)")]
    BadMagic,
    #[error("template truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("template has {0} trailing bytes")]
    TrailingBytes(usize),
    #[error("template has zero dimension")]
    ZeroDimension,
    #[error("embedding too large: {0} values")]
    TooLarge(usize),
}

/// Serialize embedding values. The model version is stored alongside, not here.
pub fn encode_template(embedding: &Embedding) -> Result<Vec<u8>, CodecError> {
    let dim = embedding.values.len();
    if dim == 0 {
        return Err(CodecError::ZeroDimension);
    }
    let dim16 = u16::try_from(dim).map_err(|_| CodecError::TooLarge(dim))?;

    let mut out = Vec::with_capacity(HEADER_LEN + dim * 4);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&dim16.to_le_bytes());
    for v in &embedding.values {
        out.extend_from_slice(&v.to_le_bytes());
    }
    Ok(out)
}

pub fn decode_template(bytes: &[u8], model_version: Option<String>) -> Result<Embedding, CodecError> {
    if bytes.len() < HEADER_LEN {
        return Err(CodecError::Truncated {
            expected: HEADER_LEN,
            actual: bytes.len(),
        });
    }
    if &bytes[..4] != MAGIC {
        return Err(CodecError::BadMagic);
    }
    let dim = u16::from_le_bytes([bytes[4], bytes[5]]) as usize;
    if dim == 0 {
        return Err(CodecError::ZeroDimension);
    }

    let expected = HEADER_LEN + dim * 4;
    if bytes.len() < expected {
        return Err(CodecError::Truncated {
            expected,
            actual: bytes.len(),
        });
    }
    if bytes.len() > expected {
        return Err(CodecError::TrailingBytes(bytes.len() - expected));
    }

    let values = bytes[HEADER_LEN..]
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    Ok(Embedding {
        values,
        model_version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let bytes = encode_template(&Embedding::new(vec![1.0, -2.5])).unwrap();
        assert_eq!(&bytes[..4], b"RCE1");
        assert_eq!(&bytes[4..6], &[2, 0]);
        assert_eq!(&bytes[6..10], &1.0f32.to_le_bytes());
        assert_eq!(bytes.len(), 14);
    }

    #[test]
    fn test_decode_keeps_model_version() {
        let bytes = encode_template(&Embedding::new(vec![0.25; 512])).unwrap();
        let emb = decode_template(&bytes, Some("w600k_r50".into())).unwrap();
        assert_eq!(emb.values.len(), 512);
        assert_eq!(emb.model_version.as_deref(), Some("w600k_r50"));
    }

    #[test]
    fn test_rejects_bad_input() {
        assert_eq!(decode_template(b"RCE", None), Err(CodecError::Truncated { expected: 6, actual: 3 }));
        assert_eq!(decode_template(b"XXXX\x01\x00abcd", None), Err(CodecError::BadMagic));
        assert_eq!(decode_template(b"RCE1\x00\x00", None), Err(CodecError::ZeroDimension));
        assert_eq!(
            decode_template(b"RCE1\x02\x00abcd", None),
            Err(CodecError::Truncated { expected: 14, actual: 10 })
        );
        assert_eq!(decode_template(b"RCE1\x01\x00abcdef", None), Err(CodecError::TrailingBytes(2)));
    }

    #[test]
    fn test_rejects_empty_embedding() {
        assert_eq!(encode_template(&Embedding::new(vec![])), Err(CodecError::ZeroDimension));
    }
}
