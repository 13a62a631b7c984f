//! Values derived from a user's birthday: age, western horoscope and
//! chinese zodiac.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Horoscope {
    Aquarius,
    Pisces,
    Aries,
    Taurus,
    Gemini,
    Cancer,
    Leo,
    Virgo,
    Libra,
    Scorpius,
    Sagittarius,
    Capricornus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Zodiac {
    Monkey,
    Rooster,
    Dog,
    Pig,
    Rat,
    Ox,
    Tiger,
    Rabbit,
    Dragon,
    Snake,
    Horse,
    Goat,
}

impl Horoscope {
    pub fn as_str(self) -> &'static str {
        match self {
            Horoscope::Aquarius => "aquarius",
            Horoscope::Pisces => "pisces",
            Horoscope::Aries => "aries",
            Horoscope::Taurus => "taurus",
            Horoscope::Gemini => "gemini",
            Horoscope::Cancer => "cancer",
            Horoscope::Leo => "leo",
            Horoscope::Virgo => "virgo",
            Horoscope::Libra => "libra",
            Horoscope::Scorpius => "scorpius",
            Horoscope::Sagittarius => "sagittarius",
            Horoscope::Capricornus => "capricornus",
        }
    }
}

impl Zodiac {
    pub fn as_str(self) -> &'static str {
        match self {
            Zodiac::Monkey => "monkey",
            Zodiac::Rooster => "rooster",
            Zodiac::Dog => "dog",
            Zodiac::Pig => "pig",
            Zodiac::Rat => "rat",
            Zodiac::Ox => "ox",
            Zodiac::Tiger => "tiger",
            Zodiac::Rabbit => "rabbit",
            Zodiac::Dragon => "dragon",
            Zodiac::Snake => "snake",
            Zodiac::Horse => "horse",
            Zodiac::Goat => "goat",
        }
    }
}

/// Indexed by `chinese_year % 12`.
pub const ORDERED_ZODIAC: [Zodiac; 12] = [
    Zodiac::Monkey,
    Zodiac::Rooster,
    Zodiac::Dog,
    Zodiac::Pig,
    Zodiac::Rat,
    Zodiac::Ox,
    Zodiac::Tiger,
    Zodiac::Rabbit,
    Zodiac::Dragon,
    Zodiac::Snake,
    Zodiac::Horse,
    Zodiac::Goat,
];

/// (start month, start day, end month, end day, sign). Capricornus spans the
/// year boundary.
const HOROSCOPE_TABLE: [(u32, u32, u32, u32, Horoscope); 12] = [
    (1, 20, 2, 18, Horoscope::Aquarius),
    (2, 19, 3, 20, Horoscope::Pisces),
    (3, 21, 4, 19, Horoscope::Aries),
    (4, 20, 5, 20, Horoscope::Taurus),
    (5, 21, 6, 21, Horoscope::Gemini),
    (6, 22, 7, 22, Horoscope::Cancer),
    (7, 23, 8, 22, Horoscope::Leo),
    (8, 23, 9, 22, Horoscope::Virgo),
    (9, 23, 10, 23, Horoscope::Libra),
    (10, 24, 11, 21, Horoscope::Scorpius),
    (11, 22, 12, 21, Horoscope::Sagittarius),
    (12, 22, 1, 19, Horoscope::Capricornus),
];

const LUNAR_NEW_YEAR_FIRST: i32 = 1950;

/// Lunar new year (month, day) for 1950..=2030.
const LUNAR_NEW_YEAR: [(u32, u32); 81] = [
    (2, 17), (2, 6), (1, 27), (2, 14), (2, 3), (1, 24), (2, 12), (1, 31), (2, 18), (2, 8),
    (1, 28), (2, 15), (2, 5), (1, 25), (2, 13), (2, 2), (1, 21), (2, 9), (1, 30), (2, 17),
    (2, 6), (1, 27), (2, 15), (2, 3), (1, 23), (2, 11), (1, 31), (2, 18), (2, 7), (1, 28),
    (2, 16), (2, 5), (1, 25), (2, 13), (2, 2), (2, 20), (2, 9), (1, 29), (2, 17), (2, 6),
    (1, 27), (2, 15), (2, 4), (1, 23), (2, 10), (1, 31), (2, 19), (2, 7), (1, 28), (2, 16),
    (2, 5), (1, 24), (2, 12), (2, 1), (1, 22), (2, 9), (1, 29), (2, 18), (2, 7), (1, 26),
    (2, 14), (2, 3), (1, 23), (2, 10), (1, 31), (2, 19), (2, 8), (1, 28), (2, 16), (2, 5),
    (1, 25), (2, 12), (2, 1), (1, 22), (2, 10), (1, 29), (2, 17), (2, 6), (1, 26), (2, 13),
    (2, 3),
];

/// Whole years elapsed, counting a year as 365.25 days.
pub fn calculate_age(birthday: NaiveDate, compare_to: NaiveDate) -> i64 {
    let days = (compare_to - birthday).num_days();
    (days as f64 / 365.25).floor() as i64
}

pub fn calculate_horoscope(birthday: NaiveDate) -> Horoscope {
    let md = (birthday.month(), birthday.day());
    HOROSCOPE_TABLE
        .iter()
        .find(|(sm, sd, em, ed, _)| {
            let start = (*sm, *sd);
            let end = (*em, *ed);
            if start <= end {
                md >= start && md <= end
            } else {
                md >= start || md <= end
            }
        })
        .map(|entry| entry.4)
        .unwrap_or(Horoscope::Capricornus)
}

/// The chinese year a gregorian date falls in, numbered by the gregorian
/// year in which that chinese year begins.
pub fn chinese_year(date: NaiveDate) -> i32 {
    let year = date.year();
    let (month, day) = usize::try_from(year - LUNAR_NEW_YEAR_FIRST)
        .ok()
        .and_then(|idx| LUNAR_NEW_YEAR.get(idx).copied())
        .unwrap_or((2, 4));
    if (date.month(), date.day()) < (month, day) {
        year - 1
    } else {
        year
    }
}

pub fn calculate_zodiac(birthday: NaiveDate) -> Zodiac {
    ORDERED_ZODIAC[chinese_year(birthday).rem_euclid(12) as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn age_counts_completed_years() {
        assert_eq!(calculate_age(date(1997, 6, 2), date(2024, 5, 30)), 26);
        assert_eq!(calculate_age(date(1997, 6, 2), date(2024, 6, 2)), 27);
    }

    #[test]
    fn horoscope_boundaries() {
        assert_eq!(calculate_horoscope(date(1990, 1, 20)), Horoscope::Aquarius);
        assert_eq!(calculate_horoscope(date(1990, 2, 18)), Horoscope::Aquarius);
        assert_eq!(calculate_horoscope(date(1990, 2, 19)), Horoscope::Pisces);
        assert_eq!(calculate_horoscope(date(1997, 6, 2)), Horoscope::Gemini);
        assert_eq!(calculate_horoscope(date(1990, 10, 24)), Horoscope::Scorpius);
    }

    #[test]
    fn capricornus_wraps_the_new_year() {
        assert_eq!(calculate_horoscope(date(1990, 12, 22)), Horoscope::Capricornus);
        assert_eq!(calculate_horoscope(date(1991, 1, 1)), Horoscope::Capricornus);
        assert_eq!(calculate_horoscope(date(1991, 1, 19)), Horoscope::Capricornus);
    }

    #[test]
    fn zodiac_rolls_over_at_lunar_new_year() {
        assert_eq!(calculate_zodiac(date(2016, 3, 1)), Zodiac::Monkey);
        assert_eq!(calculate_zodiac(date(2016, 1, 1)), Zodiac::Goat);
        assert_eq!(calculate_zodiac(date(1997, 6, 2)), Zodiac::Ox);
    }

    #[test]
    fn zodiac_outside_table_uses_early_february() {
        assert_eq!(chinese_year(date(1940, 2, 3)), 1939);
        assert_eq!(chinese_year(date(1940, 2, 4)), 1940);
        assert_eq!(calculate_zodiac(date(1940, 6, 1)), Zodiac::Dragon);
    }
}
