use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Which end of a source's date span a date fell outside of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Minimum,
    Maximum,
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::Minimum => f.write_str("minimum"),
            Bound::Maximum => f.write_str("maximum"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{value:?}: invalid choice (not one of {})", quoted(.choices))]
    Choice { value: String, choices: Vec<String> },

    #[error("date {date} violates the {bound} date for this dataset ({limit})")]
    DateRange {
        date: String,
        bound: Bound,
        limit: String,
    },

    #[error("malformed date {input:?}: {reason}")]
    DateFormat { input: String, reason: String },

    #[error("failed to retrieve {url}: {source}")]
    Retrieval {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url has no file name: {0}")]
    NoFileName(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid resolver expression: {0}")]
    Expression(String),

    #[error("invalid step: {0}")]
    Step(String),

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("failed to fetch {} file(s): {}", .failed.len(), .failed.join("; "))]
    Incomplete { failed: Vec<String> },

    #[error("toml error: {0}")]
    Toml(#[from] toml::ser::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn choice<'a>(value: &str, choices: impl IntoIterator<Item = &'a str>) -> Self {
        let mut choices: Vec<String> = choices.into_iter().map(str::to_string).collect();
        choices.sort();
        Error::Choice {
            value: value.to_string(),
            choices,
        }
    }

    /// True for errors raised while validating user input (as opposed to I/O).
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::Choice { .. }
                | Error::DateRange { .. }
                | Error::DateFormat { .. }
                | Error::Expression(_)
                | Error::Step(_)
        )
    }
}

fn quoted(choices: &[String]) -> String {
    choices
        .iter()
        .map(|c| format!("{c:?}"))
        .collect::<Vec<_>>()
        .join(", ")
}
