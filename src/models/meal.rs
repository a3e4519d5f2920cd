use chrono::{
    DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone,
    Timelike, Utc,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MealType {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
}

impl MealType {
    pub const ALL: [MealType; 4] = [
        MealType::Breakfast,
        MealType::Lunch,
        MealType::Dinner,
        MealType::Snack,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MealType::Breakfast => "Breakfast",
            MealType::Lunch => "Lunch",
            MealType::Dinner => "Dinner",
            MealType::Snack => "Snack",
        }
    }

    /// Bucket for a food logged at the given local wall-clock time.
    pub fn for_local_time(time: NaiveTime) -> Self {
        match time.hour() {
            4..=10 => MealType::Breakfast,
            11..=15 => MealType::Lunch,
            16..=21 => MealType::Dinner,
            _ => MealType::Snack,
        }
    }
}

impl fmt::Display for MealType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MealType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "breakfast" => Ok(MealType::Breakfast),
            "lunch" => Ok(MealType::Lunch),
            "dinner" => Ok(MealType::Dinner),
            "snack" => Ok(MealType::Snack),
            other => Err(format!("unknown meal type: {other}")),
        }
    }
}

/// One eating occasion. `meal_type` is kept as stored so that rows written by
/// older clients with unexpected values can be skipped instead of failing a fetch.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Meal {
    pub id: Uuid,
    pub user_id: Uuid,
    pub date: DateTime<Utc>,
    pub meal_type: String,
}

impl Meal {
    pub fn kind(&self) -> Option<MealType> {
        self.meal_type.parse().ok()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct FoodItem {
    pub id: Uuid,
    pub meal_id: Uuid,
    /// Calories eaten: `calorie_estimate` scaled by `percentage_consumed`.
    pub calorie_number: i32,
    /// Full-portion estimate.
    pub calorie_estimate: i32,
    pub food_name: String,
    pub image_url: String,
    pub percentage_consumed: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct NewFoodItem {
    pub meal_id: Uuid,
    pub calorie_number: i32,
    pub calorie_estimate: i32,
    pub food_name: String,
    pub image_url: String,
    pub percentage_consumed: Option<i32>,
}

/// Calories actually eaten when only part of a portion was consumed.
pub fn scaled_calories(estimate: i32, percentage_consumed: Option<i32>) -> i32 {
    match percentage_consumed {
        Some(pct) => {
            let pct = pct.clamp(0, 100) as i64;
            ((estimate as i64 * pct + 50) / 100) as i32
        }
        None => estimate,
    }
}

/// A calendar day as seen from the client's UTC offset: `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub day: NaiveDate,
    pub offset: FixedOffset,
}

impl DayWindow {
    pub fn new(day: NaiveDate, utc_offset_minutes: i32) -> Option<Self> {
        let offset = FixedOffset::east_opt(utc_offset_minutes.checked_mul(60)?)?;
        Some(Self { day, offset })
    }

    pub fn utc(day: NaiveDate) -> Self {
        Self {
            day,
            offset: Utc.fix(),
        }
    }

    /// The window containing `instant` in the given offset.
    pub fn containing(instant: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self {
            day: instant.with_timezone(&offset).date_naive(),
            offset,
        }
    }

    /// `[start, end)` in UTC, or `None` for days at the edge of the
    /// representable range.
    pub fn checked_bounds(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let midnight = self.day.and_time(NaiveTime::MIN);
        let start = midnight
            .checked_sub_signed(Duration::seconds(self.offset.local_minus_utc() as i64))?;
        let end = start.checked_add_signed(Duration::days(1))?;
        Some((Utc.from_utc_datetime(&start), Utc.from_utc_datetime(&end)))
    }

    /// Clamped to the representable range; see [`DayWindow::checked_bounds`].
    pub fn start(&self) -> DateTime<Utc> {
        match self.checked_bounds() {
            Some((start, _)) => start,
            None => Utc.from_utc_datetime(&self.day.and_time(NaiveTime::MIN)),
        }
    }

    pub fn end(&self) -> DateTime<Utc> {
        match self.checked_bounds() {
            Some((_, end)) => end,
            None => Utc.from_utc_datetime(&NaiveDateTime::MAX),
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start() && instant < self.end()
    }
}
