//! Fixed vocabularies for the synthetic document.

use rand::{Rng, seq::IndexedRandom};

pub(crate) const FIRST_NAMES: [&str; 16] = [
    "Ada", "Alan", "Barbara", "Dennis", "Edsger", "Frances", "Grace", "Jean", "John", "Ken",
    "Leslie", "Margaret", "Niklaus", "Radia", "Sophie", "Tony",
];
pub(crate) const LAST_NAMES: [&str; 16] = [
    "Allen", "Backus", "Dijkstra", "Hamilton", "Hopper", "Kay", "Knuth", "Lamport", "Liskov",
    "Lovelace", "Perlman", "Ritchie", "Sammet", "Thompson", "Turing", "Wirth",
];
pub(crate) const COMPANIES: [&str; 6] = ["facebook", "google", "rockset", "tesla", "uber", "lyft"];
pub(crate) const STREETS: [&str; 10] = [
    "1st", "2nd", "3rd", "4th", "5th", "6th", "7th", "8th", "9th", "10th",
];
pub(crate) const CITIES: [&str; 6] = [
    "SF",
    "San Mateo",
    "San Jose",
    "Mountain View",
    "Menlo Park",
    "Palo Alto",
];
pub(crate) const AGES: [i64; 3] = [15, 27, 61];
pub(crate) const DOMAINS: [&str; 4] = ["example.com", "example.org", "mail.test", "corp.test"];
const WORDS: [&str; 32] = [
    "alpha", "bravo", "cache", "delta", "epoch", "fjord", "gamma", "harbor", "index", "jitter",
    "kernel", "lambda", "merge", "node", "offset", "packet", "quorum", "replica", "shard",
    "tablet", "update", "vector", "window", "xenon", "yield", "zephyr", "ingest", "latency",
    "rollup", "segment", "stream", "tombstone",
];

pub(crate) fn pick<'a, R>(rng: &mut R, pool: &'a [&'a str]) -> &'a str
where
    R: Rng + ?Sized,
{
    pool.choose(rng).copied().unwrap_or_default()
}

pub(crate) fn word<R>(rng: &mut R) -> &'static str
where
    R: Rng + ?Sized,
{
    pick(rng, &WORDS)
}

pub(crate) fn sentence<R>(rng: &mut R) -> String
where
    R: Rng + ?Sized,
{
    let len = rng.random_range(6..14);
    let mut out = String::with_capacity(len * 8);
    for i in 0..len {
        let w = word(rng);
        if i == 0 {
            let mut chars = w.chars();
            if let Some(first) = chars.next() {
                out.extend(first.to_uppercase());
                out.push_str(chars.as_str());
            }
        } else {
            out.push(' ');
            out.push_str(w);
        }
    }
    out.push('.');
    out
}

pub(crate) fn paragraph<R>(rng: &mut R) -> String
where
    R: Rng + ?Sized,
{
    let sentences = rng.random_range(4..9);
    (0..sentences)
        .map(|_| sentence(rng))
        .collect::<Vec<_>>()
        .join(" ")
}
