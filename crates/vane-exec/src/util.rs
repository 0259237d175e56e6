use std::collections::HashSet;

use time::{Date, Duration, Weekday};

/// Drop repeated codes, keeping the first occurrence of each.
pub fn dedupe_codes<I>(codes: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    codes
        .into_iter()
        .filter(|code| seen.insert(code.clone()))
        .collect()
}

/// Trading day before `date`; a Monday maps to the previous Friday.
///
/// Exchange holidays are not considered.
pub fn previous_trading_day(date: Date) -> Date {
    let back = if date.weekday() == Weekday::Monday { 3 } else { 1 };
    date.saturating_sub(Duration::days(back))
}

/// `sh600000` / `sz000001` -> bare six-digit code; anything else unchanged.
pub fn strip_exchange_prefix(code: &str) -> &str {
    match code.get(..2) {
        Some("sh" | "sz") if code.len() == 8 => &code[2..],
        _ => code,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Month;

    fn day(d: u8) -> Date {
        Date::from_calendar_date(2024, Month::January, d).unwrap()
    }

    #[test]
    fn dedupe_keeps_first_occurrence_order() {
        let codes = ["600000", "000001", "600000", "300750", "000001"]
            .map(String::from)
            .to_vec();
        assert_eq!(dedupe_codes(codes), vec!["600000", "000001", "300750"]);
    }

    #[test]
    fn monday_goes_back_to_friday() {
        // 2024-01-08 is a Monday
        assert_eq!(previous_trading_day(day(8)), day(5));
        assert_eq!(previous_trading_day(day(10)), day(9));
    }

    #[test]
    fn prefix_is_stripped_only_for_exchange_codes() {
        assert_eq!(strip_exchange_prefix("sh600000"), "600000");
        assert_eq!(strip_exchange_prefix("sz000001"), "000001");
        assert_eq!(strip_exchange_prefix("600000"), "600000");
        assert_eq!(strip_exchange_prefix("bj830799x"), "bj830799x");
        assert_eq!(strip_exchange_prefix("sh6000"), "sh6000");
    }
}
