//! Calendar quarters

use chrono::{Datelike, NaiveDate};
use std::cmp::Ordering;

/// A calendar quarter identified by a zero-based index
/// (`year * 4 + quarter_of_year`).
///
/// Equality and ordering look only at the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Quarter {
    index: i64,
}

impl Quarter {
    pub fn from_index(index: i64) -> Self {
        Self { index }
    }

    pub fn from_date(date: NaiveDate) -> Self {
        let quarter_of_year = i64::from(date.month0() / 3);
        Self {
            index: i64::from(date.year()) * 4 + quarter_of_year,
        }
    }

    pub fn index(&self) -> i64 {
        self.index
    }

    pub fn year(&self) -> i64 {
        self.index.div_euclid(4)
    }

    /// First month of the quarter, 1-based
    pub fn first_month(&self) -> u32 {
        // rem_euclid(4) is in 0..4
        (self.index.rem_euclid(4) as u32) * 3 + 1
    }

    /// The quarter `n` quarters away
    pub fn offset(&self, n: i64) -> Self {
        Self {
            index: self.index.saturating_add(n),
        }
    }

    /// First day of the quarter; `None` outside the supported calendar range
    pub fn start(&self) -> Option<NaiveDate> {
        let year = i32::try_from(self.year()).ok()?;
        NaiveDate::from_ymd_opt(year, self.first_month(), 1)
    }

    /// Last day of the quarter's third month
    pub fn end(&self) -> Option<NaiveDate> {
        self.offset(1).start()?.pred_opt()
    }
}

impl PartialOrd for Quarter {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Quarter {
    fn cmp(&self, other: &Self) -> Ordering {
        self.index.cmp(&other.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_index_from_date() {
        assert_eq!(Quarter::from_date(date(2017, 1, 1)).index(), 2017 * 4);
        assert_eq!(Quarter::from_date(date(2017, 5, 15)).index(), 2017 * 4 + 1);
        assert_eq!(Quarter::from_date(date(2017, 12, 31)).index(), 2017 * 4 + 3);
    }

    #[test]
    fn test_start_and_end() {
        let q = Quarter::from_date(date(2017, 5, 15));
        assert_eq!(q.start(), Some(date(2017, 4, 1)));
        assert_eq!(q.end(), Some(date(2017, 6, 30)));

        let q4 = Quarter::from_date(date(2019, 11, 2));
        assert_eq!(q4.end(), Some(date(2019, 12, 31)));
        assert_eq!(Quarter::from_date(date(2020, 2, 29)).end(), Some(date(2020, 3, 31)));
    }

    #[test]
    fn test_offset_crosses_years() {
        let q = Quarter::from_date(date(2017, 11, 1)).offset(1);
        assert_eq!(q.start(), Some(date(2018, 1, 1)));
        let back = Quarter::from_date(date(2017, 2, 1)).offset(-1);
        assert_eq!(back.end(), Some(date(2016, 12, 31)));
    }

    #[test]
    fn test_ordering_by_index() {
        let a = Quarter::from_index(10);
        let b = Quarter::from_index(11);
        assert!(a < b);
        assert_eq!(Quarter::from_date(date(2017, 4, 1)), Quarter::from_date(date(2017, 6, 30)));
    }
}
