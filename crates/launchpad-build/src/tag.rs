//! Image tag policy.
//!
//! Version tokens are UTC timestamps `YYYYMMDD.HHMMSS`, which sort
//! lexicographically in time order. Tags for one app strictly increase even
//! when two builds land in the same second or the clock steps backwards.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use tracing::debug;

use launchpad_core::{AppName, ImageTag};

pub struct TagPolicy;

impl TagPolicy {
    pub const TOKEN_FORMAT: &'static str = "%Y%m%d.%H%M%S";

    /// Next tag for `app`, strictly greater than `newest`.
    pub fn next(app: &AppName, newest: Option<&ImageTag>, now: DateTime<Utc>) -> ImageTag {
        let candidate = now.format(Self::TOKEN_FORMAT).to_string();
        let Some(newest) = newest else {
            return ImageTag::new(app.clone(), candidate);
        };
        if candidate.as_str() > newest.token() {
            return ImageTag::new(app.clone(), candidate);
        }

        let token = match NaiveDateTime::parse_from_str(newest.token(), Self::TOKEN_FORMAT) {
            Ok(ts) => (ts + Duration::seconds(1)).format(Self::TOKEN_FORMAT).to_string(),
            // Not one of ours; any extension sorts after it.
            Err(_) => format!("{}1", newest.token()),
        };
        debug!(app = %app, newest = %newest, %token, "clock behind newest tag, bumping");
        ImageTag::new(app.clone(), token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn app() -> AppName {
        AppName::parse("demo").unwrap()
    }

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    fn tag(token: &str) -> ImageTag {
        ImageTag::new(app(), token)
    }

    #[test]
    fn first_tag_uses_clock() {
        let t = TagPolicy::next(&app(), None, at(2026, 2, 21, 10, 0, 0));
        assert_eq!(t.to_string(), "demo:20260221.100000");
    }

    #[test]
    fn later_clock_wins() {
        let t = TagPolicy::next(&app(), Some(&tag("20260221.100000")), at(2026, 2, 21, 10, 30, 0));
        assert_eq!(t.token(), "20260221.103000");
    }

    #[test]
    fn same_second_bumps_by_one() {
        let newest = tag("20260221.100000");
        let t = TagPolicy::next(&app(), Some(&newest), at(2026, 2, 21, 10, 0, 0));
        assert_eq!(t.token(), "20260221.100001");
        assert!(t > newest);
    }

    #[test]
    fn clock_going_backwards_still_increases() {
        let newest = tag("20260221.235959");
        let t = TagPolicy::next(&app(), Some(&newest), at(2026, 1, 1, 0, 0, 0));
        assert_eq!(t.token(), "20260222.000000");
    }

    #[test]
    fn foreign_token_is_extended() {
        let newest = tag("zzz");
        let t = TagPolicy::next(&app(), Some(&newest), at(2026, 2, 21, 10, 0, 0));
        assert!(t > newest);
    }

    #[test]
    fn tags_strictly_increase_across_rapid_builds() {
        let now = at(2026, 2, 21, 10, 0, 0);
        let mut newest: Option<ImageTag> = None;
        for _ in 0..5 {
            let next = TagPolicy::next(&app(), newest.as_ref(), now);
            if let Some(prev) = &newest {
                assert!(&next > prev);
            }
            newest = Some(next);
        }
        assert_eq!(newest.unwrap().token(), "20260221.100004");
    }
}
