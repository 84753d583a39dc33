use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::defaults::{DEFAULT_FETCH_TIMEOUT, DEFAULT_SCHEME, DEFAULT_SUBCOMMAND, DEFAULT_WINDOW};

/// The document written once to the fetch process's stdin.
///
/// Keys are serialized in the PascalCase form the fetch tool reads (`Scheme`, `Host`, `After`,
/// `Before`, `Slug`, `Endpoint`, `Products`, `Timeout`, `StdOut`, ...). `location` never leaves
/// this process; it only overrides the A part of produced pathnames.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExtractionRequest {
    pub scheme: String,
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub after: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub before: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watershed_id: Option<String>,
    pub slug: String,
    pub endpoint: String,
    #[serde(default)]
    pub products: Vec<String>,
    /// Seconds the fetch process allows its remote calls.
    pub timeout: u64,
    pub subcommand: String,
    pub std_out: bool,
    #[serde(skip)]
    pub location: Option<String>,
}

impl ExtractionRequest {
    /// Request for the watershed `slug` on `host`, covering the last seven days.
    pub fn new(host: impl Into<String>, slug: impl Into<String>) -> Self {
        let before = whole_minute(OffsetDateTime::now_utc());
        let slug = slug.into();
        Self {
            scheme: DEFAULT_SCHEME.to_string(),
            host: host.into(),
            token: None,
            after: before - DEFAULT_WINDOW,
            before,
            watershed_id: None,
            endpoint: format!("watersheds/{slug}/extract"),
            slug,
            products: Vec::new(),
            timeout: DEFAULT_FETCH_TIMEOUT.as_secs(),
            subcommand: DEFAULT_SUBCOMMAND.to_string(),
            std_out: true,
            location: None,
        }
    }

    pub fn scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.token = (!token.trim().is_empty()).then_some(token);
        self
    }

    pub fn window(mut self, after: OffsetDateTime, before: OffsetDateTime) -> Self {
        self.after = after;
        self.before = before;
        self
    }

    pub fn watershed_id(mut self, id: impl Into<String>) -> Self {
        self.watershed_id = Some(id.into());
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn products<I, S>(mut self, products: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.products = products.into_iter().map(Into::into).collect();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.as_secs();
        self
    }

    pub fn subcommand(mut self, subcommand: impl Into<String>) -> Self {
        self.subcommand = subcommand.into();
        self
    }

    /// Overrides the A part of every pathname this request produces. Defaults to the slug.
    pub fn location(mut self, location: impl Into<String>) -> Self {
        let location = location.into();
        self.location = (!location.trim().is_empty()).then_some(location);
        self
    }

    pub fn location_part(&self) -> &str {
        self.location.as_deref().unwrap_or(&self.slug)
    }

    pub(crate) fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

impl fmt::Debug for ExtractionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionRequest")
            .field("scheme", &self.scheme)
            .field("host", &self.host)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("after", &self.after)
            .field("before", &self.before)
            .field("watershed_id", &self.watershed_id)
            .field("slug", &self.slug)
            .field("endpoint", &self.endpoint)
            .field("products", &self.products)
            .field("timeout", &self.timeout)
            .field("subcommand", &self.subcommand)
            .field("location", &self.location)
            .finish()
    }
}

fn whole_minute(at: OffsetDateTime) -> OffsetDateTime {
    at - time::Duration::seconds(i64::from(at.second()))
        - time::Duration::nanoseconds(i64::from(at.nanosecond()))
}
