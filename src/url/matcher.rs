/// A set of exclusion substrings
///
/// A URL is excluded when it contains any of the substrings anywhere in its
/// text. Matching is case-sensitive and performed on the raw URL string.
#[derive(Debug, Clone, Default)]
pub struct Exclusions {
    substrings: Vec<String>,
}

impl Exclusions {
    /// Creates an exclusion set
    ///
    /// Substrings are kept as given, so an empty substring excludes every URL.
    ///
    /// # Examples
    ///
    /// ```
    /// use level_crawler::url::Exclusions;
    ///
    /// let excludes = Exclusions::new(["ads", "tracker"]);
    /// assert!(excludes.matches("https://ads.example.com/"));
    /// assert!(!excludes.matches("https://example.com/"));
    /// ```
    pub fn new<I, S>(substrings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            substrings: substrings
                .into_iter()
                .map(Into::into)
                .collect(),
        }
    }

    /// Returns true if the URL contains any exclusion substring
    pub fn matches(&self, url: &str) -> bool {
        self.substrings.iter().any(|s| url.contains(s.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.substrings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.substrings.len()
    }
}
