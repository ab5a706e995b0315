//! Duplicate detector (C8): exact content-hash grouping and MinHash/LSH
//! near-duplicate detection.

use std::collections::{HashMap, HashSet};

use sha2::{Digest, Sha256};

use crate::{Result, Store};

/// Documents shorter than this many characters are ignored by near-duplicate
/// detection entirely.
const MIN_CONTENT_LEN: usize = 50;
/// Default MinHash permutation count — tuned so the estimated Jaccard stays
/// within ~10% of the true value for realistic document sizes.
const DEFAULT_PERMS: usize = 256;
/// LSH band size; `perms` must be a multiple of this for even banding.
const BAND_SIZE: usize = 8;

/// A group of documents sharing the exact same content hash.
#[derive(Debug, Clone, PartialEq)]
pub struct ExactDuplicateGroup {
    /// SHA-256 hex digest of the shared content.
    pub content_hash: String,
    /// Ids of every document with that content.
    pub document_ids: Vec<i64>,
}

/// One estimated near-duplicate pair.
#[derive(Debug, Clone, PartialEq)]
pub struct NearDuplicatePair {
    /// First document id (lower id).
    pub a: i64,
    /// Second document id (higher id).
    pub b: i64,
    /// MinHash-estimated Jaccard similarity.
    pub estimated_jaccard: f64,
}

#[must_use]
fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Tokenizes `content` into word tokens, character 3-grams, and adjacent-word
/// bigrams, the shingle set MinHash is computed over.
fn tokenize(content: &str) -> HashSet<String> {
    let lowercase = content.to_lowercase();
    let words: Vec<&str> = lowercase.split_whitespace().collect();
    let mut shingles = HashSet::new();

    for word in &words {
        shingles.insert((*word).to_string());
    }
    for pair in words.windows(2) {
        shingles.insert(format!("{} {}", pair[0], pair[1]));
    }
    let chars: Vec<char> = lowercase.chars().filter(|c| !c.is_whitespace()).collect();
    for window in chars.windows(3) {
        shingles.insert(window.iter().collect());
    }
    shingles
}

/// Deterministic 64-bit hash of `value` salted by permutation index `seed`.
fn hash_with_seed(value: &str, seed: u64) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(seed.to_le_bytes());
    hasher.update(value.as_bytes());
    let digest = hasher.finalize();
    u64::from_le_bytes([digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6], digest[7]])
}

/// A MinHash signature: the minimum hash value under each of `perms`
/// independent hash functions, over a shingle set.
fn minhash_signature(shingles: &HashSet<String>, perms: usize) -> Vec<u64> {
    (0..perms)
        .map(|seed| {
            shingles
                .iter()
                .map(|s| hash_with_seed(s, seed as u64))
                .min()
                .unwrap_or(u64::MAX)
        })
        .collect()
}

/// Fraction of matching positions between two signatures — the MinHash
/// estimator of Jaccard similarity.
fn estimated_jaccard(a: &[u64], b: &[u64]) -> f64 {
    if a.is_empty() {
        return 0.0;
    }
    let matches = a.iter().zip(b.iter()).filter(|(x, y)| x == y).count();
    matches as f64 / a.len() as f64
}

impl Store {
    /// Groups non-deleted documents by exact content hash, keeping only
    /// groups of size > 1.
    ///
    /// # Errors
    ///
    /// Propagates storage errors from document listing.
    pub fn find_exact_duplicates(&self) -> Result<Vec<ExactDuplicateGroup>> {
        let documents = self.list_documents(None, 1_000_000)?;
        let mut by_hash: HashMap<String, Vec<i64>> = HashMap::new();
        for item in &documents {
            let Some(doc) = self.get_document(crate::storage::documents::DocRef::Id(item.id))?
            else {
                continue;
            };
            by_hash.entry(content_hash(&doc.content)).or_default().push(doc.id);
        }
        Ok(by_hash
            .into_iter()
            .filter(|(_, ids)| ids.len() > 1)
            .map(|(content_hash, document_ids)| ExactDuplicateGroup {
                content_hash,
                document_ids,
            })
            .collect())
    }

    /// A small-corpus legacy method that compares every pair's content hash
    /// directly rather than grouping, retained for validation against
    /// [`Store::find_exact_duplicates`].
    ///
    /// # Errors
    ///
    /// Propagates storage errors from document listing.
    pub fn find_exact_duplicates_pairwise(&self) -> Result<Vec<(i64, i64)>> {
        let documents = self.list_documents(None, 1_000_000)?;
        let mut hashes = Vec::new();
        for item in &documents {
            if let Some(doc) = self.get_document(crate::storage::documents::DocRef::Id(item.id))? {
                hashes.push((doc.id, content_hash(&doc.content)));
            }
        }
        let mut pairs = Vec::new();
        for i in 0..hashes.len() {
            for j in (i + 1)..hashes.len() {
                if hashes[i].1 == hashes[j].1 {
                    pairs.push((hashes[i].0.min(hashes[j].0), hashes[i].0.max(hashes[j].0)));
                }
            }
        }
        Ok(pairs)
    }

    /// Finds near-duplicate documents via MinHash/LSH: tokenizes each
    /// non-deleted document (ignoring content shorter than
    /// [`MIN_CONTENT_LEN`]), builds a `perms`-permutation MinHash
    /// signature, buckets documents sharing any LSH band, and emits every
    /// unique candidate pair whose estimated Jaccard is at least
    /// `threshold`. `limit` caps the number of documents processed.
    ///
    /// # Errors
    ///
    /// Propagates storage errors from document listing.
    pub fn find_near_duplicates(
        &self,
        threshold: f64,
        perms: Option<usize>,
        limit: Option<usize>,
    ) -> Result<Vec<NearDuplicatePair>> {
        let perms = perms.unwrap_or(DEFAULT_PERMS);
        let documents = self.list_documents(None, limit.unwrap_or(1_000_000))?;

        let mut signatures: HashMap<i64, Vec<u64>> = HashMap::new();
        for item in &documents {
            let Some(doc) = self.get_document(crate::storage::documents::DocRef::Id(item.id))?
            else {
                continue;
            };
            if doc.content.len() < MIN_CONTENT_LEN {
                continue;
            }
            let shingles = tokenize(&doc.content);
            signatures.insert(doc.id, minhash_signature(&shingles, perms));
        }

        let band_count = perms / BAND_SIZE.max(1);
        let mut buckets: HashMap<(usize, u64), Vec<i64>> = HashMap::new();
        for (&doc_id, signature) in &signatures {
            for band in 0..band_count {
                let start = band * BAND_SIZE;
                let end = (start + BAND_SIZE).min(signature.len());
                let mut hasher = Sha256::new();
                for value in &signature[start..end] {
                    hasher.update(value.to_le_bytes());
                }
                let band_digest = hasher.finalize();
                let bucket_key: u64 = u64::from_le_bytes([
                    band_digest[0],
                    band_digest[1],
                    band_digest[2],
                    band_digest[3],
                    band_digest[4],
                    band_digest[5],
                    band_digest[6],
                    band_digest[7],
                ]);
                buckets.entry((band, bucket_key)).or_default().push(doc_id);
            }
        }

        let mut seen_pairs = HashSet::new();
        let mut results = Vec::new();
        for bucket_docs in buckets.values() {
            for i in 0..bucket_docs.len() {
                for j in (i + 1)..bucket_docs.len() {
                    let a = bucket_docs[i].min(bucket_docs[j]);
                    let b = bucket_docs[i].max(bucket_docs[j]);
                    if !seen_pairs.insert((a, b)) {
                        continue;
                    }
                    let jaccard = estimated_jaccard(&signatures[&a], &signatures[&b]);
                    if jaccard >= threshold {
                        results.push(NearDuplicatePair {
                            a,
                            b,
                            estimated_jaccard: jaccard,
                        });
                    }
                }
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocType;

    #[test]
    fn minhash_of_set_against_itself_is_one() {
        let shingles = tokenize("the quick brown fox jumps over the lazy dog repeatedly");
        let sig_a = minhash_signature(&shingles, 256);
        let sig_b = minhash_signature(&shingles, 256);
        assert!((estimated_jaccard(&sig_a, &sig_b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn exact_duplicates_are_grouped() {
        let store = Store::open_in_memory().unwrap();
        store.save_document("A", "same content here", None, &[], None, DocType::User).unwrap();
        store.save_document("B", "same content here", None, &[], None, DocType::User).unwrap();
        store.save_document("C", "different content", None, &[], None, DocType::User).unwrap();

        let groups = store.find_exact_duplicates().unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].document_ids.len(), 2);
    }

    #[test]
    fn short_documents_are_ignored_by_near_duplicate_detection() {
        let store = Store::open_in_memory().unwrap();
        store.save_document("A", "too short", None, &[], None, DocType::User).unwrap();
        store.save_document("B", "too short", None, &[], None, DocType::User).unwrap();
        let pairs = store.find_near_duplicates(0.5, Some(64), None).unwrap();
        assert!(pairs.is_empty());
    }

    #[test]
    fn similar_long_documents_are_flagged_near_duplicate() {
        let store = Store::open_in_memory().unwrap();
        let base = "The quick brown fox jumps over the lazy dog in the middle of a sunny afternoon walk.";
        let variant = "The quick brown fox jumps over the lazy dog in the middle of a sunny afternoon stroll.";
        store.save_document("A", base, None, &[], None, DocType::User).unwrap();
        store.save_document("B", variant, None, &[], None, DocType::User).unwrap();

        let pairs = store.find_near_duplicates(0.5, Some(128), None).unwrap();
        assert_eq!(pairs.len(), 1);
        assert!(pairs[0].estimated_jaccard >= 0.5);
    }
}
