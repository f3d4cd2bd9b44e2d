use rand::seq::SliceRandom;
use rand::Rng;

use crate::client::ProbeTarget;

/// Length of the synthetic hex object identifiers.
const ID_LEN: usize = 16;

/// Combinatorial candidate-path generator for object-storage fuzzing.
///
/// Patterns are template strings with `{id}`, `{ext}` and `{endpoint}`
/// placeholders, crossed with every domain, identifier and extension:
/// the candidate count is exactly |domains| x |patterns| x |ids| x |exts|,
/// so pool sizes must be kept small (low thousands of candidates total).
///
/// The identifier pool is drawn once per generator and reused across every
/// combination, so the same synthetic object id is probed through every
/// pattern; repeated sightings of one id are what make caching artifacts
/// visible. Runs are not reproducible unless the pool is injected via
/// [`PathGenerator::with_ids`]; `{endpoint}` substitution stays random
/// either way.
pub struct PathGenerator {
    domains: Vec<String>,
    patterns: Vec<String>,
    endpoints: Vec<String>,
    extensions: Vec<String>,
    ids: Vec<String>,
}

impl PathGenerator {
    pub fn new(
        domains: Vec<String>,
        patterns: Vec<String>,
        endpoints: Vec<String>,
        id_count: usize,
        extensions: Vec<String>,
    ) -> Self {
        let ids = random_ids(id_count);
        Self::with_ids(domains, patterns, endpoints, ids, extensions)
    }

    /// Build with a caller-supplied identifier pool (fixed seed, replays).
    pub fn with_ids(
        domains: Vec<String>,
        patterns: Vec<String>,
        endpoints: Vec<String>,
        ids: Vec<String>,
        extensions: Vec<String>,
    ) -> Self {
        Self { domains, patterns, endpoints, extensions, ids }
    }

    /// Total candidates this generator will yield.
    pub fn len(&self) -> usize {
        self.domains.len() * self.patterns.len() * self.ids.len() * self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lazy expansion: domain, then pattern, then identifier, then extension.
    /// Candidates are HEAD targets; body content is irrelevant to the caller's
    /// classification, only status and headers are.
    pub fn candidates(&self) -> impl Iterator<Item = ProbeTarget> + '_ {
        self.domains.iter().flat_map(move |domain| {
            self.patterns.iter().flat_map(move |pattern| {
                self.ids.iter().flat_map(move |id| {
                    self.extensions.iter().map(move |ext| {
                        let mut path = pattern.replace("{id}", id).replace("{ext}", ext);
                        if path.contains("{endpoint}") {
                            let endpoint = self
                                .endpoints
                                .choose(&mut rand::thread_rng())
                                .map(String::as_str)
                                .unwrap_or("");
                            path = path.replace("{endpoint}", endpoint);
                        }
                        ProbeTarget::head(format!("https://{domain}/{path}"))
                    })
                })
            })
        })
    }
}

/// `count` random fixed-length lowercase-hex identifiers.
pub fn random_ids(count: usize) -> Vec<String> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| (0..ID_LEN).map(|_| format!("{:x}", rng.gen_range(0..16u8))).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn candidate_count_is_exact_product() {
        let gen = PathGenerator::with_ids(
            ids(&["cdn.example.com", "media.example.net"]),
            ids(&["{id}.{ext}"]),
            vec![],
            ids(&["aaaa", "bbbb", "cccc"]),
            ids(&["png", "gif"]),
        );
        assert_eq!(gen.len(), 12);
        let candidates: Vec<_> = gen.candidates().collect();
        assert_eq!(candidates.len(), 12);
    }

    #[test]
    fn distinct_tuples_yield_distinct_urls() {
        let gen = PathGenerator::with_ids(
            ids(&["cdn.example.com", "media.example.net"]),
            ids(&["{id}.{ext}", "{id}/original"]),
            vec![],
            ids(&["0123456789abcdef", "fedcba9876543210"]),
            ids(&["png", "jpg", "webp"]),
        );
        let urls: HashSet<String> = gen.candidates().map(|t| t.url).collect();
        // "{id}/original" ignores the extension, so its tuples collapse.
        let expected = 2 * 2 * 3 + 2 * 2;
        assert_eq!(urls.len(), expected);
    }

    #[test]
    fn endpoint_placeholder_is_substituted() {
        let gen = PathGenerator::with_ids(
            ids(&["cdn.example.com"]),
            ids(&["{endpoint}/{id}"]),
            ids(&["avatars"]),
            ids(&["0123456789abcdef"]),
            ids(&["png"]),
        );
        let candidates: Vec<_> = gen.candidates().collect();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].url, "https://cdn.example.com/avatars/0123456789abcdef");
    }

    #[test]
    fn random_ids_are_fixed_length_hex() {
        let pool = random_ids(5);
        assert_eq!(pool.len(), 5);
        for id in &pool {
            assert_eq!(id.len(), 16);
            assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }
}
