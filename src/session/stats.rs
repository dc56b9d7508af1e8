// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{collections::BTreeMap, fmt, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

/// The verdict given to a file. NG categories name what is wrong with the melody.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "NG1")]
    Ng1,
    #[serde(rename = "NG2")]
    Ng2,
    #[serde(rename = "NG3")]
    Ng3,
    #[serde(rename = "NG4")]
    Ng4,
    #[serde(rename = "NG5")]
    Ng5,
    #[serde(rename = "NG6")]
    Ng6,
    #[serde(rename = "NG7")]
    Ng7,
    #[serde(rename = "NG8")]
    Ng8,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::Ok,
        Category::Ng1,
        Category::Ng2,
        Category::Ng3,
        Category::Ng4,
        Category::Ng5,
        Category::Ng6,
        Category::Ng7,
        Category::Ng8,
    ];

    /// Maps 0 to OK and 1-8 to the NG categories, matching the number keys.
    pub fn from_number(number: u8) -> Option<Category> {
        Category::ALL.get(usize::from(number)).copied()
    }

    pub fn code(&self) -> &'static str {
        match self {
            Category::Ok => "OK",
            Category::Ng1 => "NG1",
            Category::Ng2 => "NG2",
            Category::Ng3 => "NG3",
            Category::Ng4 => "NG4",
            Category::Ng5 => "NG5",
            Category::Ng6 => "NG6",
            Category::Ng7 => "NG7",
            Category::Ng8 => "NG8",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Category::Ok => "Good melody",
            Category::Ng1 => "Does not match the chord",
            Category::Ng2 => "Melody is not good",
            Category::Ng3 => "Rest is too long",
            Category::Ng4 => "Too many small notes in a row",
            Category::Ng5 => "Monotonous repetition",
            Category::Ng6 => "Too much movement",
            Category::Ng7 => "Same motif repeated",
            Category::Ng8 => "Sounds like accompaniment",
        }
    }

    pub fn is_ng(&self) -> bool {
        *self != Category::Ok
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Category::ALL
            .into_iter()
            .find(|category| category.code().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown category {}", s))
    }
}

/// Running counts per category and the time spent classifying.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Stats {
    counts: [u64; 9],
    total_time: Duration,
}

/// A snapshot of the stats.
#[derive(Clone, Debug, PartialEq)]
pub struct Summary {
    pub total_files: u64,
    /// Zero when nothing has been classified.
    pub ok_ratio: f64,
    /// The first NG category with the highest count. None when nothing has been
    /// classified.
    pub most_common_ng: Option<Category>,
    pub avg_time_per_file: Duration,
}

impl Stats {
    /// Rebuilds stats from saved counts. Categories missing from the map count zero.
    pub fn from_counts(counts: &BTreeMap<Category, u64>, total_time: Duration) -> Stats {
        let mut stats = Stats {
            total_time,
            ..Default::default()
        };
        for (category, count) in counts {
            stats.counts[category.index()] = *count;
        }
        stats
    }

    pub fn update(&mut self, category: Category, time_spent: Duration) {
        self.counts[category.index()] += 1;
        self.total_time += time_spent;
    }

    pub fn count(&self, category: Category) -> u64 {
        self.counts[category.index()]
    }

    /// Every category with its count, OK first.
    pub fn counts(&self) -> BTreeMap<Category, u64> {
        Category::ALL
            .into_iter()
            .map(|category| (category, self.count(category)))
            .collect()
    }

    pub fn total_time(&self) -> Duration {
        self.total_time
    }

    pub fn summary(&self) -> Summary {
        let total_files: u64 = self.counts.iter().sum();
        if total_files == 0 {
            return Summary {
                total_files,
                ok_ratio: 0.0,
                most_common_ng: None,
                avg_time_per_file: Duration::ZERO,
            };
        }

        let mut most_common_ng = Category::Ng1;
        for category in Category::ALL.into_iter().filter(Category::is_ng) {
            if self.count(category) > self.count(most_common_ng) {
                most_common_ng = category;
            }
        }

        Summary {
            total_files,
            ok_ratio: self.count(Category::Ok) as f64 / total_files as f64,
            most_common_ng: Some(most_common_ng),
            avg_time_per_file: self
                .total_time
                .div_f64(total_files as f64),
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total files: {}", self.total_files)?;
        writeln!(f, "OK ratio: {:.1}%", self.ok_ratio * 100.0)?;
        match self.most_common_ng {
            Some(category) => writeln!(
                f,
                "Most common NG: {} ({})",
                category,
                category.description()
            )?,
            None => writeln!(f, "Most common NG: none")?,
        }
        write!(
            f,
            "Avg. time per file: {}s",
            self.avg_time_per_file.as_secs()
        )
    }
}

#[cfg(test)]
mod test {
    use std::{str::FromStr, time::Duration};

    use super::{Category, Stats};

    #[test]
    fn test_category_parsing() {
        assert_eq!(Ok(Category::Ok), Category::from_str("ok"));
        assert_eq!(Ok(Category::Ng3), Category::from_str("NG3"));
        assert_eq!(Ok(Category::Ng8), Category::from_str(" ng8 "));
        assert!(Category::from_str("NG9").is_err());

        assert_eq!(Some(Category::Ok), Category::from_number(0));
        assert_eq!(Some(Category::Ng5), Category::from_number(5));
        assert_eq!(None, Category::from_number(9));

        assert_eq!("NG4", Category::Ng4.to_string());
        assert_eq!("Rest is too long", Category::Ng3.description());
    }

    #[test]
    fn test_category_serializes_as_code() -> Result<(), serde_json::Error> {
        assert_eq!("\"NG2\"", serde_json::to_string(&Category::Ng2)?);
        assert_eq!(Category::Ok, serde_json::from_str::<Category>("\"OK\"")?);
        Ok(())
    }

    #[test]
    fn test_empty_summary() {
        let summary = Stats::default().summary();

        assert_eq!(0, summary.total_files);
        assert_eq!(0.0, summary.ok_ratio);
        assert_eq!(None, summary.most_common_ng);
        assert_eq!(Duration::ZERO, summary.avg_time_per_file);
    }

    #[test]
    fn test_summary() {
        let mut stats = Stats::default();
        stats.update(Category::Ok, Duration::from_secs(10));
        stats.update(Category::Ng2, Duration::from_secs(20));
        stats.update(Category::Ng5, Duration::from_secs(30));
        stats.update(Category::Ng5, Duration::from_secs(20));
        stats.update(Category::Ng2, Duration::from_secs(20));

        let summary = stats.summary();
        assert_eq!(5, summary.total_files);
        assert_eq!(0.2, summary.ok_ratio);
        // Ties go to the first NG category.
        assert_eq!(Some(Category::Ng2), summary.most_common_ng);
        assert_eq!(Duration::from_secs(20), summary.avg_time_per_file);
        assert_eq!(Duration::from_secs(100), stats.total_time());
    }

    #[test]
    fn test_only_ok_reports_first_ng() {
        let mut stats = Stats::default();
        stats.update(Category::Ok, Duration::from_secs(1));

        let summary = stats.summary();
        assert_eq!(1.0, summary.ok_ratio);
        assert_eq!(Some(Category::Ng1), summary.most_common_ng);
    }

    #[test]
    fn test_counts_round_trip() {
        let mut stats = Stats::default();
        stats.update(Category::Ng7, Duration::from_secs(3));

        let counts = stats.counts();
        assert_eq!(9, counts.len());
        assert_eq!(Some(&1), counts.get(&Category::Ng7));
        assert_eq!(stats, Stats::from_counts(&counts, Duration::from_secs(3)));
    }

    #[test]
    fn test_summary_display() {
        let mut stats = Stats::default();
        stats.update(Category::Ok, Duration::from_secs(4));
        stats.update(Category::Ng1, Duration::from_secs(8));

        assert_eq!(
            "Total files: 2\nOK ratio: 50.0%\nMost common NG: NG1 (Does not match the chord)\nAvg. time per file: 6s",
            stats.summary().to_string()
        );
    }
}
