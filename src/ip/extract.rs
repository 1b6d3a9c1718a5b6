use regex::Regex;
use thiserror::Error;

/// How an IP address candidate is pulled out of a source's response body.
#[derive(Clone, Debug)]
pub enum Extractor {
    /// The whole body, minus surrounding whitespace.
    Trim,

    /// The named group `ip` if the pattern has one, the first capture group
    /// otherwise.
    RegexCapture(Regex),
}

#[derive(Debug, Error, Clone)]
pub enum ExtractorError {
    #[error("unable to parse the regex: {0}")]
    InvalidRegex(regex::Error),

    #[error("the regex {0:?} has no capture group")]
    NoCaptureGroup(Box<str>),
}

impl PartialEq for Extractor {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Extractor::Trim, Extractor::Trim) => true,
            (Extractor::RegexCapture(a), Extractor::RegexCapture(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

impl Eq for Extractor {}

impl Extractor {
    pub fn regex(pattern: &str) -> Result<Self, ExtractorError> {
        let regex = Regex::new(pattern).map_err(ExtractorError::InvalidRegex)?;

        if regex.captures_len() < 2 {
            return Err(ExtractorError::NoCaptureGroup(pattern.into()));
        }

        Ok(Self::RegexCapture(regex))
    }

    pub fn extract<'a>(&self, body: &'a str) -> Option<&'a str> {
        match self {
            Extractor::Trim => Some(body.trim()).filter(|s| !s.is_empty()),

            Extractor::RegexCapture(regex) => {
                let captured = regex.captures(body)?;
                captured
                    .name("ip")
                    .or_else(|| captured.get(1))
                    .map(|matched| matched.as_str())
            }
        }
    }
}
