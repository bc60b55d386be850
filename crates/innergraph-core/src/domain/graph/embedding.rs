//! Embedding vector helpers: validation, BLOB encoding and cosine similarity

use crate::error::{Error, Result};

/// Check that a vector has the index dimensionality and only finite components
pub fn validate_embedding(embedding: &[f32], expected: usize) -> Result<()> {
    if embedding.len() != expected {
        return Err(Error::DimensionMismatch {
            expected,
            actual: embedding.len(),
        });
    }
    if let Some(pos) = embedding.iter().position(|x| !x.is_finite()) {
        return Err(Error::Validation(format!(
            "embedding component {} is not finite",
            pos
        )));
    }
    Ok(())
}

/// Encode as little-endian f32 bytes for BLOB storage
pub fn to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Decode a little-endian f32 BLOB; trailing partial chunks are ignored
pub fn from_blob(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two vectors
///
/// Returns 0.0 for length mismatches and zero-magnitude vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_dimension_mismatch() {
        let err = validate_embedding(&[1.0, 0.0], 3).unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_validate_non_finite() {
        assert!(matches!(
            validate_embedding(&[1.0, f32::NAN, 0.0], 3),
            Err(Error::Validation(_))
        ));
        assert!(validate_embedding(&[1.0, f32::INFINITY, 0.0], 3).is_err());
        assert!(validate_embedding(&[1.0, 0.5, 0.0], 3).is_ok());
    }

    #[test]
    fn test_blob_encoding() {
        let v = vec![0.25_f32, -1.5, 3.0];
        let bytes = to_blob(&v);
        assert_eq!(bytes.len(), 12);
        assert_eq!(from_blob(&bytes), v);
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }
}
