//! Posting deduplication for jobsignal.
//!
//! Two postings are duplicates when they share a non-empty URL or when their
//! normalized comparison keys ([`NormalizedPosting`]) produce the same
//! [`Fingerprint`]. One representative survives per group: a posting with a
//! fetched full description wins, otherwise the earliest in input order.
//! Survivors keep their relative input order.

pub mod normalize;

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::hash::Hash;

use tracing::{debug, info, instrument};

use jobsignal_shared::{DedupeSettings, Fingerprint, Posting};

pub use normalize::{Metro, NormalizedPosting, canonical_location, default_metros, normalize_text};

/// Dedupe configuration.
#[derive(Debug, Clone)]
pub struct DedupeConfig {
    pub metros: Vec<Metro>,
    pub description_prefix_chars: usize,
}

impl Default for DedupeConfig {
    fn default() -> Self {
        Self::from(&DedupeSettings::default())
    }
}

impl From<&DedupeSettings> for DedupeConfig {
    fn from(settings: &DedupeSettings) -> Self {
        Self {
            metros: default_metros(),
            description_prefix_chars: settings.description_prefix_chars,
        }
    }
}

/// Dedupe counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DedupeStats {
    pub input: usize,
    /// Removed because another posting had the same URL.
    pub url_duplicates: usize,
    /// Removed because another posting had the same fingerprint.
    pub content_duplicates: usize,
    pub surviving: usize,
}

impl DedupeStats {
    pub fn duplicates_removed(&self) -> usize {
        self.url_duplicates + self.content_duplicates
    }
}

/// Survivors in input order, with their fingerprints and original indices.
#[derive(Debug, Clone)]
pub struct DedupeOutcome {
    pub survivors: Vec<Posting>,
    /// Parallel to `survivors`.
    pub fingerprints: Vec<Fingerprint>,
    /// Parallel to `survivors`: position of each survivor in the input.
    pub kept_indices: Vec<usize>,
    pub stats: DedupeStats,
}

/// Compute the fingerprint of one posting.
pub fn fingerprint(posting: &Posting, config: &DedupeConfig) -> Fingerprint {
    NormalizedPosting::from_posting(posting, &config.metros, config.description_prefix_chars)
        .fingerprint()
}

/// Collapse duplicate postings. Idempotent.
#[instrument(skip_all, fields(input = postings.len()))]
pub fn dedupe(postings: Vec<Posting>, config: &DedupeConfig) -> DedupeOutcome {
    let input = postings.len();
    let all: Vec<usize> = (0..input).collect();

    let by_url = collapse(&postings, &all, |i| {
        let url = postings[i].url.as_str();
        (!url.is_empty()).then_some(url)
    });
    let url_duplicates = input - by_url.len();

    let fingerprints: HashMap<usize, Fingerprint> = by_url
        .iter()
        .map(|&i| (i, fingerprint(&postings[i], config)))
        .collect();
    let kept = collapse(&postings, &by_url, |i| fingerprints.get(&i));
    let content_duplicates = by_url.len() - kept.len();

    let stats = DedupeStats {
        input,
        url_duplicates,
        content_duplicates,
        surviving: kept.len(),
    };

    let mut kept_fingerprints = Vec::with_capacity(kept.len());
    for &i in &kept {
        if let Some(fp) = fingerprints.get(&i) {
            kept_fingerprints.push(fp.clone());
        }
    }

    let mut keep_iter = kept.iter().peekable();
    let mut survivors = Vec::with_capacity(kept.len());
    for (i, posting) in postings.into_iter().enumerate() {
        if keep_iter.peek() == Some(&&i) {
            keep_iter.next();
            survivors.push(posting);
        }
    }

    info!(
        input = stats.input,
        url_duplicates = stats.url_duplicates,
        content_duplicates = stats.content_duplicates,
        surviving = stats.surviving,
        "dedupe completed"
    );

    DedupeOutcome {
        survivors,
        fingerprints: kept_fingerprints,
        kept_indices: kept,
        stats,
    }
}

/// Group `candidates` by `key` and return one representative per group, in
/// ascending index order. Candidates without a key are always kept.
fn collapse<K, F>(postings: &[Posting], candidates: &[usize], key: F) -> Vec<usize>
where
    K: Eq + Hash,
    F: Fn(usize) -> Option<K>,
{
    let mut representative: HashMap<K, usize> = HashMap::new();
    let mut keyless = Vec::new();

    for &i in candidates {
        let Some(k) = key(i) else {
            keyless.push(i);
            continue;
        };
        match representative.entry(k) {
            Entry::Vacant(slot) => {
                slot.insert(i);
            }
            Entry::Occupied(mut slot) => {
                let current = *slot.get();
                if !postings[current].has_full_description() && postings[i].has_full_description()
                {
                    debug!(replaced = current, by = i, "preferring posting with full description");
                    slot.insert(i);
                }
            }
        }
    }

    let mut kept: Vec<usize> = representative.into_values().chain(keyless).collect();
    kept.sort_unstable();
    kept
}
