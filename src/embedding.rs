//! Deterministic hashed bag-of-words embeddings.
//!
//! [`embed`] maps text to a fixed-dimension vector without any model or
//! network call: each lowercase whitespace token is hashed with a fixed
//! multiplicative byte hash, the hash selects a bucket, and the bucket
//! counts are L2-normalized. Identical `(text, dim)` always yields a
//! bit-identical vector, across runs and platforms.
//!
//! Also provides the storage helpers used by the index:
//! - [`vec_to_blob`]: encode a vector as little-endian `f32` bytes
//! - [`blob_to_vec`]: decode a BLOB back into a vector
//! - [`dot`]: dot product (cosine similarity for normalized vectors)

/// Default embedding dimensionality.
pub const DEFAULT_DIM: usize = 64;

/// Embed `text` into a unit-length vector of `dim` buckets.
///
/// Text with no tokens produces the zero vector.
///
/// ```rust
/// use context_pack::embedding::embed;
///
/// let v = embed("hello world", 64);
/// assert_eq!(v.len(), 64);
/// assert_eq!(v, embed("Hello   WORLD", 64));
/// ```
pub fn embed(text: &str, dim: usize) -> Vec<f32> {
    let mut vec = vec![0.0f32; dim];
    if dim == 0 {
        return vec;
    }

    for token in text.to_lowercase().split_whitespace() {
        let bucket = token_hash(token) as usize % dim;
        vec[bucket] += 1.0;
    }

    let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vec.iter_mut() {
            *x /= norm;
        }
    }

    vec
}

/// `h = h * 31 + byte` over the token's UTF-8 bytes, wrapping at 32 bits.
pub fn token_hash(token: &str) -> u32 {
    token
        .bytes()
        .fold(0u32, |h, b| h.wrapping_mul(31).wrapping_add(b as u32))
}

/// Dot product of two vectors; `0.0` when the lengths differ.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// ```rust
/// use context_pack::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
