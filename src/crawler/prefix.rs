//! Course-prefix search spaces.
//!
//! EvaluationKit's search caps results per query, so the crawl partitions the
//! catalogue by course prefix: a school stem plus a three-digit department
//! code (`AS.010`, `EN.601`, ...).

use regex::Regex;
use std::str::FromStr;
use std::sync::LazyLock;

/// School stems covered by a full scan.
pub const STEMS: [&str; 2] = ["AS", "EN"];

/// Department codes per stem (`000`..=`999`).
pub const CODES_PER_STEM: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("--prefix must be AS | EN | AS.xxx | EN.xxx (got {0:?})")]
pub struct PrefixError(pub String);

/// Which part of the prefix space to crawl.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PrefixFilter {
    /// Every code under every stem.
    #[default]
    All,
    /// Every code under one stem, e.g. `AS`.
    Stem(String),
    /// One fully qualified prefix, e.g. `EN.601`.
    Exact(String),
}

impl FromStr for PrefixFilter {
    type Err = PrefixError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        static PREFIX_RE: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"^(AS|EN)(?:\.(\d{3}))?$").unwrap());

        let normalized = raw.trim().to_uppercase();
        let caps = PREFIX_RE
            .captures(&normalized)
            .ok_or_else(|| PrefixError(raw.to_string()))?;

        let stem = caps[1].to_string();
        Ok(match caps.get(2) {
            Some(code) => Self::Exact(format!("{stem}.{}", code.as_str())),
            None => Self::Stem(stem),
        })
    }
}

impl PrefixFilter {
    /// Lazily yield the prefixes this filter covers, in crawl order.
    pub fn prefixes(&self) -> Box<dyn Iterator<Item = String> + Send + '_> {
        match self {
            Self::All => Box::new(STEMS.into_iter().flat_map(|stem| expand_stem(stem))),
            Self::Stem(stem) => Box::new(expand_stem(stem)),
            Self::Exact(prefix) => Box::new(std::iter::once(prefix.clone())),
        }
    }

    /// How many prefixes [`PrefixFilter::prefixes`] yields.
    pub fn prefix_count(&self) -> u64 {
        match self {
            Self::All => STEMS.len() as u64 * u64::from(CODES_PER_STEM),
            Self::Stem(_) => u64::from(CODES_PER_STEM),
            Self::Exact(_) => 1,
        }
    }
}

fn expand_stem(stem: &str) -> impl Iterator<Item = String> + Send + '_ {
    (0..CODES_PER_STEM).map(move |n| format!("{stem}.{n:03}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_stem() {
        assert_eq!("AS".parse::<PrefixFilter>(), Ok(PrefixFilter::Stem("AS".to_owned())));
        assert_eq!("en".parse::<PrefixFilter>(), Ok(PrefixFilter::Stem("EN".to_owned())));
    }

    #[test]
    fn test_parse_qualified_prefix() {
        assert_eq!(
            " en.601 ".parse::<PrefixFilter>(),
            Ok(PrefixFilter::Exact("EN.601".to_owned()))
        );
    }

    #[test]
    fn test_parse_rejects_invalid() {
        for bad in ["", "ME", "AS.", "AS.01", "AS.0101", "AS601", "AS.abc", "AS.010.101"] {
            assert_eq!(
                bad.parse::<PrefixFilter>(),
                Err(PrefixError(bad.to_owned())),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_error_message_names_the_input() {
        let err = "XX".parse::<PrefixFilter>().unwrap_err();
        assert!(err.to_string().contains("\"XX\""));
    }

    #[test]
    fn test_stem_expands_to_thousand_codes() {
        let prefixes: Vec<String> = PrefixFilter::Stem("AS".to_owned()).prefixes().collect();
        assert_eq!(prefixes.len(), 1000);
        assert_eq!(prefixes[0], "AS.000");
        assert_eq!(prefixes[999], "AS.999");
        assert!(prefixes.iter().all(|p| p.starts_with("AS.")));
    }

    #[test]
    fn test_exact_yields_itself() {
        let prefixes: Vec<String> = "EN.601"
            .parse::<PrefixFilter>()
            .unwrap()
            .prefixes()
            .collect();
        assert_eq!(prefixes, vec!["EN.601".to_owned()]);
    }

    #[test]
    fn test_full_scan_covers_both_stems() {
        let prefixes: Vec<String> = PrefixFilter::All.prefixes().collect();
        assert_eq!(prefixes.len(), 2000);
        assert_eq!(prefixes[0], "AS.000");
        assert_eq!(prefixes[1000], "EN.000");
        assert_eq!(prefixes[1999], "EN.999");
    }

    #[test]
    fn test_prefix_count_matches_expansion() {
        for filter in [
            PrefixFilter::All,
            PrefixFilter::Stem("EN".to_owned()),
            PrefixFilter::Exact("AS.010".to_owned()),
        ] {
            assert_eq!(filter.prefix_count(), filter.prefixes().count() as u64, "{filter:?}");
        }
        assert_eq!(PrefixFilter::All.prefix_count(), 2000);
    }
}
