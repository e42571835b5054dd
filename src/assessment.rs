/// Result of scanning a description for assessment keywords.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Assessment {
    pub flagged: bool,
    /// Matched keywords joined with ", ", in configured order.
    pub terms: String,
}

/// Case-insensitive substring matcher over a configured keyword list.
#[derive(Debug, Clone)]
pub struct AssessmentDetector {
    terms: Vec<String>,
}

impl AssessmentDetector {
    pub fn new<S: AsRef<str>>(terms: &[S]) -> Self {
        let mut normalized: Vec<String> = Vec::with_capacity(terms.len());
        for term in terms {
            let term = term.as_ref().trim().to_lowercase();
            if !term.is_empty() && !normalized.contains(&term) {
                normalized.push(term);
            }
        }
        AssessmentDetector { terms: normalized }
    }

    pub fn detect(&self, text: &str) -> Assessment {
        if text.is_empty() {
            return Assessment::default();
        }
        let haystack = text.to_lowercase();
        let hits: Vec<&str> = self
            .terms
            .iter()
            .filter(|term| haystack.contains(term.as_str()))
            .map(String::as_str)
            .collect();

        Assessment {
            flagged: !hits.is_empty(),
            terms: hits.join(", "),
        }
    }
}
