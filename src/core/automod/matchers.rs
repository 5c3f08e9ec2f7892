// Text matchers used by the link, invite, word and site rules.
//
// Word and site lists are compiled once per config load into lookup sets;
// the regexes below are process-wide and compiled on first use.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Words checked when a guild turns on the built-in swear filter.
pub const BUILTIN_SWEAR_WORDS: &[&str] = &[
    "asshole",
    "bastard",
    "bitch",
    "bullshit",
    "cunt",
    "dickhead",
    "fuck",
    "fucker",
    "fucking",
    "motherfucker",
    "shit",
    "wanker",
];

/// Known IP grabbers and link shorteners used to harvest addresses.
pub const BUILTIN_BAD_SITES: &[&str] = &[
    "02ip.ru",
    "2no.co",
    "blasze.com",
    "bmwforum.co",
    "ezstat.ru",
    "gamingfun.me",
    "grabify.link",
    "headshot.monster",
    "iplis.ru",
    "iplogger.com",
    "iplogger.org",
    "iplogger.ru",
    "leancoding.co",
    "ps3cfw.com",
    "spottyfly.com",
    "stopify.co",
    "yip.su",
];

// Links with an explicit scheme.
static STRICT_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bhttps?://([a-z0-9.-]+)(?::\d+)?[^\s<>]*").expect("valid strict url regex")
});

// Anything that looks like a hostname, with or without a scheme.
static RELAXED_HOST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b((?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,63})\b")
        .expect("valid relaxed host regex")
});

static INVITE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:discord(?:app)?\.com/invite|discord\.gg|discord\.me|discord\.io)/([a-z0-9-]+)",
    )
    .expect("valid invite regex")
});

/// Lowercase a domain and drop a leading `www.` and trailing dot.
pub fn normalize_domain(domain: &str) -> String {
    let lowered = domain.trim().trim_end_matches('.').to_lowercase();
    match lowered.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => lowered,
    }
}

/// Hosts of every `http(s)://` link in the text, in order of appearance.
pub fn link_hosts(text: &str) -> Vec<String> {
    STRICT_URL_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| normalize_domain(m.as_str()))
        .filter(|host| !host.is_empty())
        .collect()
}

/// Every hostname-looking token in the text, scheme or not.
pub fn mentioned_hosts(text: &str) -> Vec<String> {
    RELAXED_HOST_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| normalize_domain(m.as_str()))
        .collect()
}

/// The first invite code found in the text.
pub fn find_invite(text: &str) -> Option<String> {
    INVITE_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// `host` itself or one of its parent domains is in `domains`.
pub fn domain_matches<'a>(domains: &'a HashSet<String>, host: &str) -> Option<&'a str> {
    let mut candidate = host;
    loop {
        if let Some(found) = domains.get(candidate) {
            return Some(found.as_str());
        }
        match candidate.find('.') {
            Some(idx) => candidate = &candidate[idx + 1..],
            None => return None,
        }
    }
}

/// Compiled banned-word list.
#[derive(Debug, Clone, Default)]
pub struct WordMatcher {
    words: HashSet<String>,
}

impl WordMatcher {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let words = words
            .into_iter()
            .map(|w| w.as_ref().trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();
        Self { words }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// First banned word in message order. Matching is whole-word and case-insensitive.
    pub fn find(&self, text: &str) -> Option<&str> {
        if self.is_empty() {
            return None;
        }

        text.split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
            .find_map(|token| self.words.get(&token.to_lowercase()))
            .map(String::as_str)
    }
}

/// Compiled banned-site list.
#[derive(Debug, Clone, Default)]
pub struct SiteMatcher {
    domains: HashSet<String>,
}

impl SiteMatcher {
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let domains = domains
            .into_iter()
            .map(|d| normalize_domain(d.as_ref()))
            .filter(|d| !d.is_empty())
            .collect();
        Self { domains }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    /// First banned domain referenced by the text.
    pub fn find(&self, text: &str) -> Option<&str> {
        if self.is_empty() {
            return None;
        }

        mentioned_hosts(text)
            .iter()
            .find_map(|host| domain_matches(&self.domains, host))
    }
}
