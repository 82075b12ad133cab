use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::trip::Trip;

pub const UNCATEGORIZED: &str = "Uncategorized";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub category: String,
    pub trips: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TripStats {
    pub total: usize,
    pub favorites: usize,
    pub to_repeat: usize,
    pub by_category: Vec<CategoryCount>,
    /// Mean length of the trips with both dates set.
    pub average_duration_days: Option<f64>,
}

impl TripStats {
    #[must_use]
    pub fn compute(trips: &[Trip]) -> Self {
        let mut by_category: BTreeMap<&str, usize> = BTreeMap::new();
        for trip in trips {
            let category = match trip.category.trim() {
                "" => UNCATEGORIZED,
                c => c,
            };
            *by_category.entry(category).or_default() += 1;
        }

        let durations: Vec<i64> = trips.iter().filter_map(Trip::duration_days).collect();
        #[allow(clippy::cast_precision_loss)]
        let average_duration_days = (!durations.is_empty())
            .then(|| durations.iter().sum::<i64>() as f64 / durations.len() as f64);

        Self {
            total: trips.len(),
            favorites: trips.iter().filter(|t| t.is_favorite).count(),
            to_repeat: trips.iter().filter(|t| t.repeat).count(),
            by_category: by_category
                .into_iter()
                .map(|(category, trips)| CategoryCount {
                    category: category.to_string(),
                    trips,
                })
                .collect(),
            average_duration_days,
        }
    }

    /// One decimal, or "N/A" without any dated trip.
    #[must_use]
    pub fn average_duration_label(&self) -> String {
        self.average_duration_days
            .map_or_else(|| "N/A".to_string(), |d| format!("{d:.1}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trip::{parse_wire_date, TripId};

    fn dated(id: i64, start: &str, end: &str) -> Trip {
        Trip::new(TripId(id), "t").with_dates(parse_wire_date(start), parse_wire_date(end))
    }

    #[test]
    fn test_empty_collection() {
        let stats = TripStats::compute(&[]);
        assert_eq!(stats.total, 0);
        assert!(stats.by_category.is_empty());
        assert_eq!(stats.average_duration_label(), "N/A");
    }

    #[test]
    fn test_counts_and_categories() {
        let mut fav = Trip::new(TripId(1), "a").with_category("Beach");
        fav.is_favorite = true;
        let mut again = Trip::new(TripId(2), "b").with_category("Beach");
        again.repeat = true;
        let plain = Trip::new(TripId(3), "c");

        let stats = TripStats::compute(&[fav, again, plain]);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.favorites, 1);
        assert_eq!(stats.to_repeat, 1);
        assert_eq!(
            stats.by_category,
            vec![
                CategoryCount { category: "Beach".into(), trips: 2 },
                CategoryCount { category: UNCATEGORIZED.into(), trips: 1 },
            ]
        );
    }

    #[test]
    fn test_average_duration() {
        let trips = vec![
            dated(1, "2024-01-01", "2024-01-01"),
            dated(2, "2024-01-01", "2024-01-05"),
            Trip::new(TripId(3), "undated"),
        ];
        let stats = TripStats::compute(&trips);
        assert_eq!(stats.average_duration_days, Some(2.5));
        assert_eq!(stats.average_duration_label(), "2.5");
    }
}
