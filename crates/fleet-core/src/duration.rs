//! Duration strings used throughout the config file.

use std::time::Duration;

/// Parse a duration string like "500ms", "30s", "5m", "1h".
///
/// A bare number is read as seconds. Values too large to represent are
/// rejected.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim().parse::<u64>().ok().and_then(|m| m.checked_mul(60)).map(Duration::from_secs)
    } else if let Some(hours) = s.strip_suffix('h') {
        hours.trim().parse::<u64>().ok().and_then(|h| h.checked_mul(3600)).map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_units() {
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("45"), Some(Duration::from_secs(45)));
        assert_eq!(parse_duration(" 2m "), Some(Duration::from_secs(120)));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_duration("soon"), None);
        assert_eq!(parse_duration("5d"), None);
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("-1s"), None);
        assert_eq!(parse_duration("307445734561825861m"), None);
        assert_eq!(parse_duration("5124095576030432h"), None);
    }
}
