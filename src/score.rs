//! Rank prior successes against a failing command line
//!
//! Scores are additive: how often a command succeeded, how recently, and how
//! much of the failing argv it shares. A small typo bonus lets `--jsn` find
//! its way to `--json` even when a plainer command has far more history.

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::redact;

/// A distinct successful argv with its history
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Full argv, tool base name first
    pub argv: Vec<String>,
    /// How many times exactly this argv succeeded
    pub count: i64,
    /// Most recent success
    pub last_seen: DateTime<Utc>,
}

const BASE_WEIGHT: f64 = 100.0;
const RECENCY_WEIGHT: f64 = 150.0;
const OVERLAP_WEIGHT: f64 = 250.0;
const OVERLAP_CAP: usize = 2;
const CORRECTION_WEIGHT: f64 = 500.0;
const CORRECTION_MIN_LEN: usize = 3;

/// Matching tokens for one argv element, case-folded.
///
/// `-n5` also yields `-n` and `5`; `--name=value` also yields `--name` and
/// `value`.
pub fn element_tokens(arg: &str) -> Vec<String> {
    let lower = arg.to_lowercase();
    let mut out = vec![lower.clone()];

    if let Some(rest) = lower.strip_prefix("--") {
        if let Some((name, value)) = rest.split_once('=') {
            if !name.is_empty() {
                out.push(format!("--{}", name));
            }
            if !value.is_empty() {
                out.push(value.to_string());
            }
        }
    } else if let Some(rest) = lower.strip_prefix('-') {
        let mut chars = rest.chars();
        if let Some(letter) = chars.next() {
            let digits = chars.as_str();
            if letter.is_alphabetic() && !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
                out.push(format!("-{}", letter));
                out.push(digits.to_string());
            }
        }
    }

    dedup(out)
}

/// Deduplicated token set for a whole argv.
pub fn tokenize(argv: &[String]) -> Vec<String> {
    dedup(argv.iter().flat_map(|a| element_tokens(a)).collect())
}

fn dedup(tokens: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    tokens.into_iter().filter(|t| seen.insert(t.clone())).collect()
}

struct Scored<'a> {
    candidate: &'a Candidate,
    base: f64,
    overlap: f64,
}

impl Scored<'_> {
    fn total(&self, with_overlap: bool) -> f64 {
        if with_overlap {
            self.base + self.overlap
        } else {
            self.base
        }
    }
}

fn base_score(c: &Candidate, now: DateTime<Utc>) -> f64 {
    let base = (c.count.max(0) as f64).ln_1p() * BASE_WEIGHT;
    let age_days = ((now - c.last_seen).num_milliseconds().max(0) as f64) / 86_400_000.0;
    let recency = RECENCY_WEIGHT / (1.0 + age_days);
    base + recency
}

/// Shared-token and near-miss terms against the failing elements.
fn overlap_score(failing: &[Vec<String>], candidate_tokens: &HashSet<String>) -> f64 {
    let mut score = 0.0;
    for element in failing {
        let hits = element.iter().filter(|t| candidate_tokens.contains(*t)).count();
        if hits > 0 {
            score += hits.min(OVERLAP_CAP) as f64 * OVERLAP_WEIGHT;
        } else if element.iter().any(|t| near_miss(t, candidate_tokens)) {
            score += CORRECTION_WEIGHT;
        }
    }
    score
}

/// Short words get one edit, longer ones two.
fn max_distance(len: usize) -> usize {
    if len <= 4 {
        1
    } else {
        2
    }
}

fn near_miss(token: &str, candidate_tokens: &HashSet<String>) -> bool {
    let len = token.chars().count();
    if len < CORRECTION_MIN_LEN {
        return false;
    }
    candidate_tokens.iter().any(|c| {
        c.chars().count() >= CORRECTION_MIN_LEN && edit_distance(token, c) <= max_distance(len)
    })
}

/// Optimal string alignment distance (adjacent transpositions count as one).
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (n, m) = (a.len(), b.len());
    let mut d = vec![vec![0usize; m + 1]; n + 1];
    for (i, row) in d.iter_mut().enumerate() {
        row[0] = i;
    }
    for (j, cell) in d[0].iter_mut().enumerate() {
        *cell = j;
    }
    for i in 1..=n {
        for j in 1..=m {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            let mut best = (d[i - 1][j] + 1).min(d[i][j - 1] + 1).min(d[i - 1][j - 1] + cost);
            if i > 1 && j > 1 && a[i - 1] == b[j - 2] && a[i - 2] == b[j - 1] {
                best = best.min(d[i - 2][j - 2] + 1);
            }
            d[i][j] = best;
        }
    }
    d[n][m]
}

/// Rank `candidates` against `query` (the failing argv tail, or free-form
/// query words). `exclude` is dropped from the result, as is anything
/// carrying the redaction marker. Best first.
pub fn rank<'a>(
    candidates: &'a [Candidate],
    query: &[String],
    exclude: Option<&[String]>,
    now: DateTime<Utc>,
) -> Vec<&'a Candidate> {
    let failing: Vec<Vec<String>> = query.iter().map(|a| element_tokens(a)).collect();

    let mut scored: Vec<Scored<'a>> = candidates
        .iter()
        .filter(|c| !c.argv.is_empty())
        .filter(|c| !redact::contains_marker(&c.argv))
        .filter(|c| exclude != Some(c.argv.as_slice()))
        .map(|c| {
            let tokens: HashSet<String> = tokenize(&c.argv).into_iter().collect();
            Scored {
                candidate: c,
                base: base_score(c, now),
                overlap: overlap_score(&failing, &tokens),
            }
        })
        .collect();

    // No candidate shares anything with the query: fall back to history alone.
    let with_overlap = !failing.is_empty() && scored.iter().any(|s| s.overlap > 0.0);

    scored.sort_by(|x, y| {
        y.total(with_overlap)
            .partial_cmp(&x.total(with_overlap))
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| x.candidate.argv.len().cmp(&y.candidate.argv.len()))
            .then_with(|| y.candidate.last_seen.cmp(&x.candidate.last_seen))
    });

    scored.into_iter().map(|s| s.candidate).collect()
}

/// The single best suggestion for a failing invocation.
///
/// `failing_argv` is the full redacted argv (tool first); its tail drives the
/// overlap terms and the whole of it is never suggested back.
pub fn pick<'a>(candidates: &'a [Candidate], failing_argv: &[String], now: DateTime<Utc>) -> Option<&'a Candidate> {
    let tail = failing_argv.get(1..).unwrap_or(&[]);
    rank(candidates, tail, Some(failing_argv), now).into_iter().next()
}

/// Top `limit` candidates for free-form query words.
pub fn best<'a>(candidates: &'a [Candidate], query: &[String], limit: usize, now: DateTime<Utc>) -> Vec<&'a Candidate> {
    let tokens: Vec<String> = query
        .iter()
        .flat_map(|q| q.split_whitespace().map(str::to_string).collect::<Vec<_>>())
        .collect();
    let mut ranked = rank(candidates, &tokens, None, now);
    ranked.truncate(limit);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    fn argv(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn cand(items: &[&str], count: i64, last_seen: DateTime<Utc>) -> Candidate {
        Candidate {
            argv: argv(items),
            count,
            last_seen,
        }
    }

    #[test]
    fn test_element_tokens_attached_short_flag() {
        assert_eq!(element_tokens("-n5"), argv(&["-n5", "-n", "5"]));
        assert_eq!(element_tokens("-N12"), argv(&["-n12", "-n", "12"]));
        assert_eq!(element_tokens("-nx"), argv(&["-nx"]));
        assert_eq!(element_tokens("-5"), argv(&["-5"]));
    }

    #[test]
    fn test_element_tokens_equals_flag() {
        assert_eq!(element_tokens("--format=JSON"), argv(&["--format=json", "--format", "json"]));
        assert_eq!(element_tokens("--x="), argv(&["--x=", "--x"]));
        assert_eq!(element_tokens("status"), argv(&["status"]));
    }

    #[test]
    fn test_tokenize_dedups() {
        assert_eq!(tokenize(&argv(&["run", "-n1", "-n", "1"])), argv(&["run", "-n1", "-n", "1"]));
    }

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("stauts", "status"), 1);
        assert_eq!(edit_distance("--jsn", "--json"), 1);
        assert_eq!(edit_distance("abc", "abc"), 0);
        assert_eq!(edit_distance("", "abc"), 3);
    }

    #[test]
    fn test_unknown_subcommand_one_prior_success() {
        let now = Utc::now();
        let cands = vec![cand(&["git", "status"], 1, now - Duration::minutes(5))];
        let picked = pick(&cands, &argv(&["git", "stauts"]), now).unwrap();
        assert_eq!(picked.argv, argv(&["git", "status"]));
    }

    #[test]
    fn test_flag_typo_beats_popular_plain_command() {
        let now = Utc::now();
        let cands = vec![
            cand(&["ranktool", "list"], 50, now - Duration::minutes(1)),
            cand(&["ranktool", "list", "--json"], 1, now - Duration::days(2)),
        ];
        let picked = pick(&cands, &argv(&["ranktool", "list", "--jsn"]), now).unwrap();
        assert_eq!(picked.argv, argv(&["ranktool", "list", "--json"]));
    }

    #[test]
    fn test_attached_short_flag_overlap() {
        let now = Utc::now();
        let cands = vec![cand(&["attachttool", "run", "-n1"], 1, now)];
        let picked = pick(&cands, &argv(&["attachttool", "run", "-n", "1", "--badflag"]), now).unwrap();
        assert_eq!(picked.argv, argv(&["attachttool", "run", "-n1"]));
    }

    #[test]
    fn test_never_suggests_failing_argv_back() {
        let now = Utc::now();
        let cands = vec![cand(&["make", "test"], 9, now)];
        assert!(pick(&cands, &argv(&["make", "test"]), now).is_none());
    }

    #[test]
    fn test_never_suggests_redacted_commands() {
        let now = Utc::now();
        let cands = vec![
            cand(&["gh", "auth", "login", "--token", "<redacted>"], 20, now),
            cand(&["gh", "auth", "status"], 1, now - Duration::days(10)),
        ];
        let picked = pick(&cands, &argv(&["gh", "auth", "logn"]), now).unwrap();
        assert_eq!(picked.argv, argv(&["gh", "auth", "status"]));
    }

    #[test]
    fn test_falls_back_to_history_without_overlap() {
        let now = Utc::now();
        let cands = vec![
            cand(&["tool", "alpha"], 1, now - Duration::days(30)),
            cand(&["tool", "beta"], 10, now),
        ];
        let picked = pick(&cands, &argv(&["tool", "zzzzzzzz"]), now).unwrap();
        assert_eq!(picked.argv, argv(&["tool", "beta"]));
    }

    #[test]
    fn test_tie_breaks_on_shorter_argv() {
        let now = Utc::now();
        let cands = vec![
            cand(&["t", "a", "b"], 1, now),
            cand(&["t", "a"], 1, now),
        ];
        let ranked = rank(&cands, &[], None, now);
        assert_eq!(ranked[0].argv, argv(&["t", "a"]));
    }

    #[test]
    fn test_empty_candidates() {
        assert!(pick(&[], &argv(&["git", "x"]), Utc::now()).is_none());
    }

    #[test]
    fn test_best_limits_and_uses_query_words() {
        let now = Utc::now();
        let cands = vec![
            cand(&["go", "build", "./..."], 3, now),
            cand(&["go", "test", "./...", "-run", "TestX"], 1, now - Duration::days(1)),
            cand(&["go", "vet"], 5, now),
        ];
        let top = best(&cands, &argv(&["test run"]), 2, now);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].argv[1], "test");
    }

    proptest! {
        #[test]
        fn prop_higher_count_scores_higher(count in 0i64..10_000, extra in 1i64..10_000, age in 0i64..1_000_000) {
            let now = Utc::now();
            let seen = now - Duration::seconds(age);
            let low = cand(&["t", "a"], count, seen);
            let high = cand(&["t", "a"], count + extra, seen);
            prop_assert!(base_score(&high, now) > base_score(&low, now));
        }

        #[test]
        fn prop_pick_never_returns_failing_or_marker(
            words in proptest::collection::vec("[a-z-]{1,8}", 1..4),
            extra in 0i64..100,
        ) {
            let now = Utc::now();
            let mut failing = vec!["t".to_string()];
            failing.extend(words.iter().cloned());
            let mut marked = failing.clone();
            marked.insert(1, "<redacted>".to_string());
            let cands = vec![
                Candidate { argv: failing.clone(), count: 100, last_seen: now },
                Candidate { argv: marked, count: 100 + extra, last_seen: now },
            ];
            prop_assert!(pick(&cands, &failing, now).is_none());
        }
    }
}
