// Copyright 2024 Strand Project
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Calendar genes. Validity is delegated to `chrono`.

use crate::randomness::Randomness;
use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_MIN_YEAR: i32 = 1900;
pub const DEFAULT_MAX_YEAR: i32 = 2100;

/// `YYYY-MM-DD`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateGene {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub min_year: i32,
    pub max_year: i32,
}

impl Default for DateGene {
    fn default() -> Self {
        Self {
            year: 2016,
            month: 3,
            day: 12,
            min_year: DEFAULT_MIN_YEAR,
            max_year: DEFAULT_MAX_YEAR,
        }
    }
}

impl DateGene {
    fn as_date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
    }

    fn set_date(&mut self, date: NaiveDate) {
        self.year = date.year();
        self.month = date.month();
        self.day = date.day();
    }

    pub fn is_locally_valid(&self) -> bool {
        self.year >= self.min_year && self.year <= self.max_year && self.as_date().is_some()
    }

    pub fn randomize(&mut self, rng: &mut Randomness, force_new: bool) {
        if self.min_year > self.max_year {
            return;
        }
        let previous = self.clone();
        self.year = rng.next_i64(self.min_year as i64, self.max_year as i64) as i32;
        self.month = rng.next_i64(1, 12) as u32;
        let last_day = days_in_month(self.year, self.month);
        self.day = rng.next_i64(1, last_day as i64) as u32;
        if force_new && *self == previous {
            self.shift_days(1);
        }
    }

    /// Moves the date by up to a month in either direction, within the year bounds.
    pub fn mutate(&mut self, rng: &mut Randomness) {
        let mut delta = rng.next_i64(1, 31);
        if rng.coin() {
            delta = -delta;
        }
        self.shift_days(delta);
    }

    fn shift_days(&mut self, delta: i64) {
        let Some(current) = self.as_date() else {
            return;
        };
        for candidate in [delta, -delta] {
            if let Some(moved) = current.checked_add_signed(Duration::days(candidate)) {
                if moved.year() >= self.min_year && moved.year() <= self.max_year {
                    self.set_date(moved);
                    return;
                }
            }
        }
    }

    pub fn printable(&self) -> String {
        format!("{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }

    pub fn set_from_json(&mut self, json: &Value) -> Result<(), String> {
        let Value::String(text) = json else {
            return Err(format!("cannot bind {} to a date", json));
        };
        let date = NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|e| e.to_string())?;
        let mut candidate = self.clone();
        candidate.set_date(date);
        if !candidate.is_locally_valid() {
            return Err(format!("{} outside year bounds", text));
        }
        *self = candidate;
        Ok(())
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}

/// `HH:MM:SS`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeGene {
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl TimeGene {
    pub fn is_locally_valid(&self) -> bool {
        NaiveTime::from_hms_opt(self.hour, self.minute, self.second).is_some()
    }

    pub fn randomize(&mut self, rng: &mut Randomness, force_new: bool) {
        let previous = self.clone();
        self.hour = rng.next_i64(0, 23) as u32;
        self.minute = rng.next_i64(0, 59) as u32;
        self.second = rng.next_i64(0, 59) as u32;
        if force_new && *self == previous {
            self.second = (self.second + 1) % 60;
        }
    }

    pub fn mutate(&mut self, rng: &mut Randomness) {
        let Some(time) = NaiveTime::from_hms_opt(self.hour, self.minute, self.second) else {
            self.randomize(rng, true);
            return;
        };
        let mut delta = rng.next_i64(1, 3_600);
        if rng.coin() {
            delta = -delta;
        }
        let (moved, _) = time.overflowing_add_signed(Duration::seconds(delta));
        self.hour = moved.hour();
        self.minute = moved.minute();
        self.second = moved.second();
    }

    pub fn printable(&self) -> String {
        format!("{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }

    pub fn set_from_json(&mut self, json: &Value) -> Result<(), String> {
        let Value::String(text) = json else {
            return Err(format!("cannot bind {} to a time", json));
        };
        let time = NaiveTime::parse_from_str(text, "%H:%M:%S").map_err(|e| e.to_string())?;
        self.hour = time.hour();
        self.minute = time.minute();
        self.second = time.second();
        Ok(())
    }
}

/// `YYYY-MM-DDTHH:MM:SS`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DateTimeGene {
    pub date: DateGene,
    pub time: TimeGene,
}

impl DateTimeGene {
    pub fn is_locally_valid(&self) -> bool {
        self.date.is_locally_valid() && self.time.is_locally_valid()
    }

    pub fn randomize(&mut self, rng: &mut Randomness, force_new: bool) {
        self.date.randomize(rng, false);
        self.time.randomize(rng, force_new);
    }

    pub fn mutate(&mut self, rng: &mut Randomness) {
        if rng.coin() {
            self.date.mutate(rng);
        } else {
            self.time.mutate(rng);
        }
    }

    pub fn printable(&self) -> String {
        format!("{}T{}", self.date.printable(), self.time.printable())
    }

    pub fn set_from_json(&mut self, json: &Value) -> Result<(), String> {
        let Value::String(text) = json else {
            return Err(format!("cannot bind {} to a date-time", json));
        };
        let (date, time) = text
            .split_once('T')
            .ok_or_else(|| format!("'{}' is not a date-time", text))?;
        let mut candidate = self.clone();
        candidate.date.set_from_json(&Value::String(date.to_string()))?;
        candidate.time.set_from_json(&Value::String(time.to_string()))?;
        *self = candidate;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_dates_are_valid() {
        let mut rng = Randomness::with_seed(21);
        let mut gene = DateGene::default();
        for _ in 0..500 {
            gene.randomize(&mut rng, true);
            assert!(gene.is_locally_valid(), "{}", gene.printable());
            gene.mutate(&mut rng);
            assert!(gene.is_locally_valid(), "{}", gene.printable());
        }
    }

    #[test]
    fn test_february_29() {
        assert_eq!(days_in_month(2024, 2), 29);
        assert_eq!(days_in_month(2023, 2), 28);
        assert_eq!(days_in_month(2023, 12), 31);
        let gene = DateGene { year: 2023, month: 2, day: 29, ..DateGene::default() };
        assert!(!gene.is_locally_valid());
    }

    #[test]
    fn test_date_time_printable_and_binding() {
        let mut gene = DateTimeGene::default();
        gene.set_from_json(&serde_json::json!("2020-01-31T23:59:01")).unwrap();
        assert_eq!(gene.printable(), "2020-01-31T23:59:01");
        assert!(gene.set_from_json(&serde_json::json!("2020-13-01T00:00:00")).is_err());
        assert_eq!(gene.printable(), "2020-01-31T23:59:01");
    }

    #[test]
    fn test_time_mutation_wraps() {
        let mut rng = Randomness::with_seed(8);
        let mut gene = TimeGene { hour: 23, minute: 59, second: 59 };
        for _ in 0..200 {
            gene.mutate(&mut rng);
            assert!(gene.is_locally_valid());
        }
    }
}
