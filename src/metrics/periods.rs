use chrono::{Datelike, Months, NaiveDate};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Trailing periods reported by every metric table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Period {
    Mtd,
    Qtd,
    Ytd,
    All,
    ThreeMonths,
    SixMonths,
    OneYear,
    ThreeYears,
    FiveYears,
    TenYears,
}

/// Table row order
pub const ALL_PERIODS: [Period; 10] = [
    Period::Mtd,
    Period::Qtd,
    Period::Ytd,
    Period::All,
    Period::ThreeMonths,
    Period::SixMonths,
    Period::OneYear,
    Period::ThreeYears,
    Period::FiveYears,
    Period::TenYears,
];

impl Period {
    pub fn label(&self) -> &'static str {
        match self {
            Period::Mtd => "mtd",
            Period::Qtd => "qtd",
            Period::Ytd => "ytd",
            Period::All => "all",
            Period::ThreeMonths => "3m",
            Period::SixMonths => "6m",
            Period::OneYear => "1y",
            Period::ThreeYears => "3y",
            Period::FiveYears => "5y",
            Period::TenYears => "10y",
        }
    }

    /// Trading days used for annualizing and window sizing
    pub fn days(&self) -> usize {
        match self {
            Period::Mtd => 21,
            Period::Qtd => 63,
            Period::Ytd => 252,
            Period::All => 1,
            Period::ThreeMonths => 63,
            Period::SixMonths => 126,
            Period::OneYear => 252,
            Period::ThreeYears => 756,
            Period::FiveYears => 1260,
            Period::TenYears => 2520,
        }
    }

    fn trailing_months(&self) -> Option<u32> {
        match self {
            Period::ThreeMonths => Some(3),
            Period::SixMonths => Some(6),
            Period::OneYear => Some(12),
            Period::ThreeYears => Some(36),
            Period::FiveYears => Some(60),
            Period::TenYears => Some(120),
            _ => None,
        }
    }

    /// Whether `date` falls inside this period ending at `as_of`
    pub fn contains(&self, date: NaiveDate, as_of: NaiveDate) -> bool {
        if date > as_of {
            return false;
        }
        match self {
            Period::All => true,
            Period::Mtd => date.year() == as_of.year() && date.month() == as_of.month(),
            Period::Qtd => date.year() == as_of.year() && quarter(date) == quarter(as_of),
            Period::Ytd => date.year() == as_of.year(),
            trailing => {
                let months = trailing.trailing_months().unwrap_or(0);
                match as_of.checked_sub_months(Months::new(months)) {
                    Some(start) => date > start,
                    None => true,
                }
            }
        }
    }
}

fn quarter(date: NaiveDate) -> u32 {
    (date.month() - 1) / 3
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim().to_lowercase();
        ALL_PERIODS
            .iter()
            .find(|p| p.label() == text)
            .copied()
            .ok_or_else(|| {
                format!(
                    "unknown period '{}' (expected one of: {})",
                    s,
                    ALL_PERIODS.iter().map(|p| p.label()).collect::<Vec<_>>().join(", ")
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_calendar_periods() {
        let as_of = date(2024, 5, 15);
        assert!(Period::Mtd.contains(date(2024, 5, 1), as_of));
        assert!(!Period::Mtd.contains(date(2024, 4, 30), as_of));
        assert!(Period::Qtd.contains(date(2024, 4, 1), as_of));
        assert!(!Period::Qtd.contains(date(2024, 3, 31), as_of));
        assert!(Period::Ytd.contains(date(2024, 1, 2), as_of));
        assert!(!Period::Ytd.contains(date(2023, 12, 29), as_of));
        assert!(!Period::All.contains(date(2024, 5, 16), as_of));
    }

    #[test]
    fn test_trailing_periods_are_exclusive_at_start() {
        let as_of = date(2024, 5, 15);
        assert!(!Period::ThreeMonths.contains(date(2024, 2, 15), as_of));
        assert!(Period::ThreeMonths.contains(date(2024, 2, 16), as_of));
        assert!(Period::OneYear.contains(date(2023, 5, 16), as_of));
        assert!(!Period::OneYear.contains(date(2023, 5, 15), as_of));
    }

    #[test]
    fn test_parse_and_days() {
        assert_eq!("3Y".parse::<Period>().unwrap(), Period::ThreeYears);
        assert_eq!(Period::ThreeYears.days(), 756);
        assert_eq!(Period::All.days(), 1);
        assert!("2w".parse::<Period>().is_err());
    }
}
