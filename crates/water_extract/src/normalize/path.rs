use std::{fmt, str::FromStr};

/// Six-part series pathname, `/A/B/C/D/E/F/`.
///
/// A is the location (watershed), B the site identifier, C the parameter, D the block date
/// (left empty; the store owns it), E the interval token and F the version. Parts are stored
/// upper-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesPath {
    pub a: String,
    pub b: String,
    pub c: String,
    pub d: String,
    pub e: String,
    pub f: String,
}

impl SeriesPath {
    pub fn new(
        location: &str,
        identifier: &str,
        parameter: &str,
        interval: &str,
        version: &str,
    ) -> Self {
        Self {
            a: location.to_uppercase(),
            b: identifier.to_uppercase(),
            c: parameter.to_uppercase(),
            d: String::new(),
            e: interval.to_uppercase(),
            f: version.to_uppercase(),
        }
    }
}

impl fmt::Display for SeriesPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "/{}/{}/{}/{}/{}/{}/",
            self.a, self.b, self.c, self.d, self.e, self.f
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("not a six-part pathname: `{0}`")]
pub struct PathParseError(pub String);

impl FromStr for SeriesPath {
    type Err = PathParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let inner = s
            .strip_prefix('/')
            .and_then(|rest| rest.strip_suffix('/'))
            .ok_or_else(|| PathParseError(s.to_string()))?;
        let parts: Vec<&str> = inner.split('/').collect();
        let [a, b, c, d, e, f] = parts.as_slice() else {
            return Err(PathParseError(s.to_string()));
        };
        Ok(Self {
            a: a.to_uppercase(),
            b: b.to_uppercase(),
            c: c.to_uppercase(),
            d: d.to_uppercase(),
            e: e.to_uppercase(),
            f: f.to_uppercase(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pathname_is_upper_cased_with_empty_d_part() {
        let path = SeriesPath::new("illinois-river", "05586100", "Flow", "15MIN", "water-usgs");
        assert_eq!(path.to_string(), "/ILLINOIS-RIVER/05586100/FLOW//15MIN/WATER-USGS/");
    }

    #[test]
    fn parse_reads_back_display() {
        let path = SeriesPath::new("a", "b", "c", "1HOUR", "f");
        let parsed: SeriesPath = path.to_string().parse().unwrap();
        assert_eq!(parsed, path);
        assert!("/A/B/C/".parse::<SeriesPath>().is_err());
        assert!("A/B/C/D/E/F".parse::<SeriesPath>().is_err());
    }
}
