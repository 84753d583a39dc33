/// Regular intervals the store understands, in minutes, ascending.
const INTERVALS: &[(i64, &str)] = &[
    (1, "1MIN"),
    (2, "2MIN"),
    (3, "3MIN"),
    (4, "4MIN"),
    (5, "5MIN"),
    (6, "6MIN"),
    (10, "10MIN"),
    (12, "12MIN"),
    (15, "15MIN"),
    (20, "20MIN"),
    (30, "30MIN"),
    (60, "1HOUR"),
    (120, "2HOUR"),
    (180, "3HOUR"),
    (240, "4HOUR"),
    (360, "6HOUR"),
    (480, "8HOUR"),
    (720, "12HOUR"),
    (1440, "1DAY"),
    (10080, "1WEEK"),
];

/// A named regular interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalToken {
    pub minutes: i64,
    pub token: &'static str,
}

impl IntervalToken {
    /// Largest named interval that does not exceed `minutes`.
    ///
    /// Exact matches map to themselves; anything shorter than a minute maps to `1MIN` and
    /// anything longer than a week maps to `1WEEK`.
    pub fn for_minutes(minutes: i64) -> Self {
        let (minutes, token) = INTERVALS
            .iter()
            .rev()
            .find(|(m, _)| *m <= minutes)
            .copied()
            .unwrap_or(INTERVALS[0]);
        Self { minutes, token }
    }

    pub fn parse(token: &str) -> Option<Self> {
        INTERVALS
            .iter()
            .find(|(_, t)| t.eq_ignore_ascii_case(token))
            .map(|(minutes, token)| Self {
                minutes: *minutes,
                token: *token,
            })
    }
}

/// Smallest positive `|m[i+1] - m[i]|` over entries neighbouring in the order given.
///
/// Callers pass times as the source delivered them, before any sorting.
pub(crate) fn min_adjacent_gap(minutes: &[i64]) -> Option<i64> {
    minutes
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).abs())
        .filter(|gap| *gap > 0)
        .min()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_intervals_map_to_their_token() {
        assert_eq!(IntervalToken::for_minutes(1).token, "1MIN");
        assert_eq!(IntervalToken::for_minutes(15).token, "15MIN");
        assert_eq!(IntervalToken::for_minutes(60).token, "1HOUR");
        assert_eq!(IntervalToken::for_minutes(1440).token, "1DAY");
    }

    #[test]
    fn uneven_intervals_round_down() {
        assert_eq!(IntervalToken::for_minutes(7).token, "6MIN");
        assert_eq!(IntervalToken::for_minutes(59).token, "30MIN");
        assert_eq!(IntervalToken::for_minutes(90).token, "1HOUR");
        assert_eq!(IntervalToken::for_minutes(2 * 10080).token, "1WEEK");
        assert_eq!(IntervalToken::for_minutes(0).token, "1MIN");
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(IntervalToken::parse("1hour").unwrap().minutes, 60);
        assert!(IntervalToken::parse("7MIN").is_none());
    }

    #[test]
    fn min_gap_ignores_duplicates() {
        assert_eq!(min_adjacent_gap(&[0, 0, 15, 30, 35]), Some(5));
        assert_eq!(min_adjacent_gap(&[10, 10]), None);
        assert_eq!(min_adjacent_gap(&[10]), None);
    }

    #[test]
    fn min_gap_reads_neighbours_in_given_order() {
        // Sorted neighbours would be 10 apart; as given they are 30 and 20 apart.
        assert_eq!(min_adjacent_gap(&[0, 30, 10]), Some(20));
        assert_eq!(min_adjacent_gap(&[60, 0]), Some(60));
    }
}
