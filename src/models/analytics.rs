//! Analytics model
//!
//! Site activity is kept as one counter per (day, metric). Days are stored
//! as `YYYY-MM-DD` text so both backends compare them lexicographically.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

string_enum! {
    pub enum Metric {
        JobView => "job_view",
        JobPosted => "job_posted",
        ApplicationSubmitted => "application_submitted",
        UserRegistered => "user_registered",
        ArticleView => "article_view",
    }
}

/// Stored counter row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalyticsCounter {
    pub date: String,
    pub metric: Metric,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyPoint {
    pub date: String,
    pub count: i64,
}

/// Zero-filled daily series for one metric
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricSeries {
    pub metric: Metric,
    pub total: i64,
    pub points: Vec<DailyPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalyticsReport {
    pub from: String,
    pub to: String,
    pub days: u32,
    pub series: Vec<MetricSeries>,
}

impl AnalyticsReport {
    /// Expand sparse counters into one zero-filled series per metric for
    /// the inclusive range `[to - days + 1, to]`.
    pub fn build(counters: &[AnalyticsCounter], to: NaiveDate, days: u32) -> Self {
        let days = days.max(1);
        let from = to - chrono::Duration::days(days as i64 - 1);
        let dates: Vec<String> = (0..days as i64)
            .map(|offset| (from + chrono::Duration::days(offset)).format("%Y-%m-%d").to_string())
            .collect();

        let series = Metric::ALL
            .iter()
            .map(|metric| {
                let points: Vec<DailyPoint> = dates
                    .iter()
                    .map(|date| DailyPoint {
                        date: date.clone(),
                        count: counters
                            .iter()
                            .filter(|c| c.metric == *metric && &c.date == date)
                            .map(|c| c.count)
                            .sum(),
                    })
                    .collect();
                MetricSeries {
                    metric: *metric,
                    total: points.iter().map(|p| p.count).sum(),
                    points,
                }
            })
            .collect();

        Self {
            from: from.format("%Y-%m-%d").to_string(),
            to: to.format("%Y-%m-%d").to_string(),
            days,
            series,
        }
    }

    pub fn total(&self, metric: Metric) -> i64 {
        self.series
            .iter()
            .find(|s| s.metric == metric)
            .map_or(0, |s| s.total)
    }
}
