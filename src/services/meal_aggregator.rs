//! Daily dashboard: meals of one day bucketed by meal type.

use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::meal::{scaled_calories, DayWindow, FoodItem, Meal, MealType, NewFoodItem};
use crate::store::MealStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DashboardPhase {
    Idle,
    Loading,
    Populated,
    Empty,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardState {
    pub date: NaiveDate,
    pub breakfast: Vec<FoodItem>,
    pub lunch: Vec<FoodItem>,
    pub dinner: Vec<FoodItem>,
    pub snack: Vec<FoodItem>,
    pub total_calories: i64,
    pub exceeded: bool,
    pub phase: DashboardPhase,
}

impl DashboardState {
    fn new(date: NaiveDate) -> Self {
        Self {
            date,
            breakfast: Vec::new(),
            lunch: Vec::new(),
            dinner: Vec::new(),
            snack: Vec::new(),
            total_calories: 0,
            exceeded: false,
            phase: DashboardPhase::Idle,
        }
    }

    pub fn bucket(&self, meal_type: MealType) -> &[FoodItem] {
        match meal_type {
            MealType::Breakfast => &self.breakfast,
            MealType::Lunch => &self.lunch,
            MealType::Dinner => &self.dinner,
            MealType::Snack => &self.snack,
        }
    }

    fn bucket_mut(&mut self, meal_type: MealType) -> &mut Vec<FoodItem> {
        match meal_type {
            MealType::Breakfast => &mut self.breakfast,
            MealType::Lunch => &mut self.lunch,
            MealType::Dinner => &mut self.dinner,
            MealType::Snack => &mut self.snack,
        }
    }

    fn items(&self) -> impl Iterator<Item = &FoodItem> {
        MealType::ALL
            .into_iter()
            .flat_map(move |t| self.bucket(t).iter())
    }

    fn find(&self, food_item_id: Uuid) -> Option<&FoodItem> {
        self.items().find(|f| f.id == food_item_id)
    }

    fn clear(&mut self) {
        for meal_type in MealType::ALL {
            self.bucket_mut(meal_type).clear();
        }
        self.total_calories = 0;
    }

    fn retain(&mut self, keep: impl Fn(&FoodItem) -> bool) {
        for meal_type in MealType::ALL {
            self.bucket_mut(meal_type).retain(&keep);
        }
    }

    fn recompute(&mut self) {
        self.total_calories = self.items().map(|f| f.calorie_number as i64).sum();
        self.phase = if self.items().next().is_some() {
            DashboardPhase::Populated
        } else {
            DashboardPhase::Empty
        };
    }
}

/// A food item to log. Calories are the full-portion estimate.
#[derive(Debug, Clone, Deserialize)]
pub struct FoodItemDraft {
    pub food_name: String,
    pub calorie_number: i32,
    pub image_url: String,
    pub percentage_consumed: Option<i32>,
    /// Bucketed by the current local time when absent.
    pub meal_type: Option<MealType>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FoodItemPatch {
    pub food_name: Option<String>,
    pub calorie_number: Option<i32>,
    pub percentage_consumed: Option<i32>,
}

fn check_percentage(pct: Option<i32>) -> AppResult<()> {
    match pct {
        Some(p) if !(0..=100).contains(&p) => Err(AppError::Validation(
            "percentage_consumed must be between 0 and 100".into(),
        )),
        _ => Ok(()),
    }
}

/// Per-request dashboard container for one user and one day.
pub struct MealAggregator {
    store: Arc<dyn MealStore>,
    user_id: Uuid,
    window: DayWindow,
    state: DashboardState,
}

impl MealAggregator {
    pub fn new(store: Arc<dyn MealStore>, user_id: Uuid, window: DayWindow) -> Self {
        Self {
            store,
            user_id,
            window,
            state: DashboardState::new(window.day),
        }
    }

    pub fn state(&self) -> &DashboardState {
        &self.state
    }

    pub fn into_state(self) -> DashboardState {
        self.state
    }

    /// Loads a food item and its meal, failing with `NotFound` unless both
    /// belong to `user_id`.
    pub async fn locate(
        store: &dyn MealStore,
        user_id: Uuid,
        food_item_id: Uuid,
    ) -> AppResult<(FoodItem, Meal)> {
        let item = store
            .get_food_item(food_item_id)
            .await?
            .ok_or(AppError::NotFound("Food item not found".into()))?;
        let meal = store
            .get_meal(item.meal_id)
            .await?
            .filter(|m| m.user_id == user_id)
            .ok_or(AppError::NotFound("Food item not found".into()))?;
        Ok((item, meal))
    }

    pub async fn fetch_meals(&mut self) -> AppResult<()> {
        self.state.phase = DashboardPhase::Loading;
        self.state.clear();

        if let Err(e) = self.load().await {
            tracing::error!(
                user_id = %self.user_id,
                date = %self.window.day,
                error = %e,
                "Failed to fetch meals"
            );
            self.state.clear();
            self.state.phase = DashboardPhase::Error;
            return Err(e);
        }

        self.state.recompute();
        Ok(())
    }

    async fn load(&mut self) -> AppResult<()> {
        let meals = self
            .store
            .meals_in_range(self.user_id, self.window.start(), self.window.end())
            .await?;

        for meal in meals {
            let Some(meal_type) = meal.kind() else {
                tracing::warn!(meal_id = %meal.id, meal_type = %meal.meal_type, "Skipping meal with unknown type");
                continue;
            };
            let items = self.store.food_items_for_meal(meal.id).await?;
            self.state.bucket_mut(meal_type).extend(items);
        }
        Ok(())
    }

    /// Unset, unparsable or zero targets are never exceeded.
    pub fn check_calorie_target(&mut self, target: Option<&str>) -> bool {
        let target = target
            .and_then(|t| t.trim().parse::<i64>().ok())
            .filter(|t| *t != 0);

        self.state.exceeded = match target {
            Some(target) => self.state.total_calories > target,
            None => false,
        };
        self.state.exceeded
    }

    /// Moves a food item of the loaded day into another bucket, deleting the
    /// source meal if that leaves it empty.
    pub async fn move_food_item(&mut self, target: MealType, food_item_id: Uuid) -> AppResult<()> {
        let mut item = self
            .state
            .find(food_item_id)
            .cloned()
            .ok_or(AppError::NotFound("Food item not found".into()))?;
        let source_meal_id = item.meal_id;
        let source = self
            .store
            .get_meal(source_meal_id)
            .await?
            .ok_or(AppError::NotFound("Meal not found".into()))?;

        // same stored day as the source, whatever offset this request used
        let destination = self
            .store
            .get_or_create_meal(self.user_id, target, source.date)
            .await?;
        if destination.id == source_meal_id {
            return Ok(());
        }

        item.meal_id = destination.id;
        self.store.update_food_item(&item).await?;

        if self.store.food_items_for_meal(source_meal_id).await?.is_empty() {
            self.store.delete_meal(source_meal_id).await?;
            tracing::debug!(meal_id = %source_meal_id, "Removed emptied meal");
        }

        tracing::info!(
            user_id = %self.user_id,
            food_item_id = %food_item_id,
            meal_type = %target,
            "Food item moved"
        );
        self.fetch_meals().await
    }

    pub async fn delete_food_item(&mut self, food_item_id: Uuid) -> AppResult<()> {
        Self::locate(self.store.as_ref(), self.user_id, food_item_id).await?;
        self.store.delete_food_item(food_item_id).await?;

        self.state.retain(|f| f.id != food_item_id);
        self.state.recompute();
        Ok(())
    }

    /// Deletes the meal together with its food items.
    pub async fn delete_meal(&mut self, meal_id: Uuid) -> AppResult<()> {
        self.store
            .get_meal(meal_id)
            .await?
            .filter(|m| m.user_id == self.user_id)
            .ok_or(AppError::NotFound("Meal not found".into()))?;
        self.store.delete_meal(meal_id).await?;

        self.state.retain(|f| f.meal_id != meal_id);
        self.state.recompute();
        Ok(())
    }

    pub async fn save_food_item(&mut self, draft: FoodItemDraft) -> AppResult<FoodItem> {
        if draft.food_name.trim().is_empty() {
            return Err(AppError::Validation("food_name is required".into()));
        }
        if draft.calorie_number < 0 {
            return Err(AppError::Validation("calorie_number must not be negative".into()));
        }
        check_percentage(draft.percentage_consumed)?;

        let meal_type = draft.meal_type.unwrap_or_else(|| {
            let local_now = Utc::now().with_timezone(&self.window.offset);
            MealType::for_local_time(local_now.time())
        });

        let meal = self
            .store
            .get_or_create_meal(self.user_id, meal_type, self.window.start())
            .await?;

        let item = self
            .store
            .insert_food_item(NewFoodItem {
                meal_id: meal.id,
                calorie_number: scaled_calories(draft.calorie_number, draft.percentage_consumed),
                calorie_estimate: draft.calorie_number,
                food_name: draft.food_name.trim().to_string(),
                image_url: draft.image_url,
                percentage_consumed: draft.percentage_consumed,
            })
            .await?;

        tracing::info!(user_id = %self.user_id, food_item_id = %item.id, meal_type = %meal_type, "Food item saved");
        self.state.bucket_mut(meal_type).push(item.clone());
        self.state.recompute();
        Ok(item)
    }

    pub async fn update_food_item(
        &mut self,
        food_item_id: Uuid,
        patch: FoodItemPatch,
    ) -> AppResult<FoodItem> {
        check_percentage(patch.percentage_consumed)?;
        let (mut item, _) = Self::locate(self.store.as_ref(), self.user_id, food_item_id).await?;

        if let Some(name) = patch.food_name {
            if name.trim().is_empty() {
                return Err(AppError::Validation("food_name is required".into()));
            }
            item.food_name = name.trim().to_string();
        }
        if patch.percentage_consumed.is_some() {
            item.percentage_consumed = patch.percentage_consumed;
        }
        // a new estimate is a full-portion figure
        if let Some(calories) = patch.calorie_number {
            if calories < 0 {
                return Err(AppError::Validation("calorie_number must not be negative".into()));
            }
            item.calorie_estimate = calories;
        }
        item.calorie_number = scaled_calories(item.calorie_estimate, item.percentage_consumed);

        self.store.update_food_item(&item).await?;
        Ok(item)
    }
}

/// Deletes meals left without food items (for example by a move that was
/// interrupted between its two writes) once they are older than `grace`.
pub async fn sweep_empty_meals(store: &dyn MealStore, grace: Duration) -> AppResult<u64> {
    store.delete_empty_meals(Utc::now() - grace).await
}

pub fn spawn_empty_meal_sweeper(store: Arc<dyn MealStore>, every: std::time::Duration) {
    let grace = Duration::from_std(every).unwrap_or_else(|_| Duration::minutes(15));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            match sweep_empty_meals(store.as_ref(), grace).await {
                Ok(count) if count > 0 => {
                    tracing::info!(purged = count, "Empty meal sweep: removed orphaned meals");
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Empty meal sweeper error"),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use chrono::{Offset, TimeZone};

    fn day() -> DayWindow {
        DayWindow::utc(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap())
    }

    fn draft(name: &str, calories: i32, meal_type: MealType) -> FoodItemDraft {
        FoodItemDraft {
            food_name: name.into(),
            calorie_number: calories,
            image_url: format!("memory://foodItem/{name}.jpg"),
            percentage_consumed: None,
            meal_type: Some(meal_type),
        }
    }

    async fn fetched(store: &MemoryStore, user_id: Uuid) -> MealAggregator {
        let mut agg = MealAggregator::new(Arc::new(store.clone()), user_id, day());
        agg.fetch_meals().await.unwrap();
        agg
    }

    #[tokio::test]
    async fn test_fetch_buckets_and_sums() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let mut agg = fetched(&store, user).await;
        assert_eq!(agg.state().phase, DashboardPhase::Empty);

        agg.save_food_item(draft("Oats", 350, MealType::Breakfast)).await.unwrap();
        agg.save_food_item(draft("Coffee", 5, MealType::Breakfast)).await.unwrap();
        agg.save_food_item(draft("Salad", 420, MealType::Lunch)).await.unwrap();

        let agg = fetched(&store, user).await;
        let state = agg.state();
        assert_eq!(state.phase, DashboardPhase::Populated);
        assert_eq!(state.breakfast.len(), 2);
        assert_eq!(state.lunch.len(), 1);
        assert!(state.dinner.is_empty() && state.snack.is_empty());
        assert_eq!(state.total_calories, 775);
    }

    #[tokio::test]
    async fn test_fetch_ignores_other_days_and_users() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let mut agg = fetched(&store, user).await;
        agg.save_food_item(draft("Toast", 200, MealType::Breakfast)).await.unwrap();

        let next_day = DayWindow::utc(NaiveDate::from_ymd_opt(2024, 5, 2).unwrap());
        let mut other = MealAggregator::new(Arc::new(store.clone()), user, next_day);
        other.save_food_item(draft("Pizza", 900, MealType::Dinner)).await.unwrap();

        let mut stranger = MealAggregator::new(Arc::new(store.clone()), Uuid::new_v4(), day());
        stranger.save_food_item(draft("Cake", 500, MealType::Snack)).await.unwrap();

        assert_eq!(fetched(&store, user).await.state().total_calories, 200);
    }

    #[tokio::test]
    async fn test_fetch_skips_unknown_meal_types() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        store
            .insert_raw_meal(Meal {
                id: Uuid::new_v4(),
                user_id: user,
                date: day().start(),
                meal_type: "Brunch".into(),
            })
            .await;
        let mut agg = fetched(&store, user).await;
        agg.save_food_item(draft("Eggs", 300, MealType::Breakfast)).await.unwrap();

        let agg = fetched(&store, user).await;
        assert_eq!(agg.state().total_calories, 300);
    }

    #[tokio::test]
    async fn test_fetch_is_idempotent() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let mut agg = fetched(&store, user).await;
        agg.save_food_item(draft("Rice", 250, MealType::Dinner)).await.unwrap();

        agg.fetch_meals().await.unwrap();
        agg.fetch_meals().await.unwrap();
        assert_eq!(agg.state().dinner.len(), 1);
        assert_eq!(agg.state().total_calories, 250);
    }

    #[test]
    fn test_calorie_target() {
        let mut agg = MealAggregator::new(Arc::new(MemoryStore::new()), Uuid::new_v4(), day());
        agg.state.total_calories = 1600;

        assert!(!agg.check_calorie_target(None));
        assert!(!agg.check_calorie_target(Some("0")));
        assert!(!agg.check_calorie_target(Some("plenty")));
        assert!(agg.check_calorie_target(Some("1500")));

        agg.state.total_calories = 1500;
        assert!(!agg.check_calorie_target(Some("1500")));
    }

    #[tokio::test]
    async fn test_move_preserves_total_and_deletes_emptied_meal() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let mut agg = fetched(&store, user).await;
        let eggs = agg.save_food_item(draft("Eggs", 300, MealType::Breakfast)).await.unwrap();
        agg.save_food_item(draft("Soup", 250, MealType::Lunch)).await.unwrap();
        assert_eq!(store.meal_count().await, 2);

        agg.move_food_item(MealType::Lunch, eggs.id).await.unwrap();

        let state = agg.state();
        assert_eq!(state.total_calories, 550);
        assert!(state.breakfast.is_empty());
        assert_eq!(state.lunch.len(), 2);
        assert_eq!(
            state.items().filter(|f| f.id == eggs.id).count(),
            1,
            "item must live in exactly one bucket"
        );
        assert_eq!(store.meal_count().await, 1);
    }

    #[tokio::test]
    async fn test_move_keeps_source_meal_with_remaining_items() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let mut agg = fetched(&store, user).await;
        let eggs = agg.save_food_item(draft("Eggs", 300, MealType::Breakfast)).await.unwrap();
        agg.save_food_item(draft("Juice", 120, MealType::Breakfast)).await.unwrap();

        agg.move_food_item(MealType::Snack, eggs.id).await.unwrap();

        assert_eq!(agg.state().breakfast.len(), 1);
        assert_eq!(agg.state().snack.len(), 1);
        assert_eq!(agg.state().total_calories, 420);
        assert_eq!(store.meal_count().await, 2);
    }

    #[tokio::test]
    async fn test_move_lands_on_source_meal_day_across_offsets() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let new_york = DayWindow::new(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(), -300).unwrap();
        let mut saved_in = MealAggregator::new(Arc::new(store.clone()), user, new_york);
        let eggs = saved_in
            .save_food_item(draft("Eggs", 300, MealType::Breakfast))
            .await
            .unwrap();
        let source = store.get_meal(eggs.meal_id).await.unwrap().unwrap();

        // same instant viewed from UTC: a different window start
        let utc = DayWindow::containing(source.date, Utc.fix());
        assert_ne!(utc.start(), source.date);
        let mut agg = MealAggregator::new(Arc::new(store.clone()), user, utc);
        agg.fetch_meals().await.unwrap();
        agg.move_food_item(MealType::Lunch, eggs.id).await.unwrap();

        let moved = store.get_food_item(eggs.id).await.unwrap().unwrap();
        let destination = store.get_meal(moved.meal_id).await.unwrap().unwrap();
        assert_eq!(destination.date, source.date);
        assert_eq!(destination.kind(), Some(MealType::Lunch));

        saved_in.fetch_meals().await.unwrap();
        assert_eq!(saved_in.state().lunch.len(), 1);
        assert_eq!(saved_in.state().total_calories, 300);
    }

    #[tokio::test]
    async fn test_move_to_same_bucket_is_noop() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let mut agg = fetched(&store, user).await;
        let eggs = agg.save_food_item(draft("Eggs", 300, MealType::Breakfast)).await.unwrap();

        agg.move_food_item(MealType::Breakfast, eggs.id).await.unwrap();
        assert_eq!(agg.state().breakfast, vec![eggs]);
        assert_eq!(store.meal_count().await, 1);
    }

    #[tokio::test]
    async fn test_move_unknown_item_is_not_found() {
        let mut agg = fetched(&MemoryStore::new(), Uuid::new_v4()).await;
        let err = agg.move_food_item(MealType::Lunch, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_food_item_updates_total() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let mut agg = fetched(&store, user).await;
        let a = agg.save_food_item(draft("A", 100, MealType::Snack)).await.unwrap();
        agg.save_food_item(draft("B", 200, MealType::Snack)).await.unwrap();

        agg.delete_food_item(a.id).await.unwrap();
        assert_eq!(agg.state().total_calories, 200);
        assert!(store.get_food_item(a.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_food_item_of_another_user_is_not_found() {
        let store = MemoryStore::new();
        let mut owner = fetched(&store, Uuid::new_v4()).await;
        let item = owner.save_food_item(draft("A", 100, MealType::Snack)).await.unwrap();

        let mut intruder = fetched(&store, Uuid::new_v4()).await;
        let err = intruder.delete_food_item(item.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(store.get_food_item(item.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_meal_cascades() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let mut agg = fetched(&store, user).await;
        let a = agg.save_food_item(draft("A", 100, MealType::Dinner)).await.unwrap();
        agg.save_food_item(draft("B", 200, MealType::Dinner)).await.unwrap();
        agg.save_food_item(draft("C", 50, MealType::Snack)).await.unwrap();

        agg.delete_meal(a.meal_id).await.unwrap();
        assert_eq!(agg.state().total_calories, 50);
        assert!(store.food_items_for_meal(a.meal_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_scales_partial_portions() {
        let mut agg = fetched(&MemoryStore::new(), Uuid::new_v4()).await;
        let mut half = draft("Burger", 800, MealType::Lunch);
        half.percentage_consumed = Some(50);

        let item = agg.save_food_item(half).await.unwrap();
        assert_eq!(item.calorie_number, 400);
        assert_eq!(item.percentage_consumed, Some(50));

        let mut bad = draft("Fries", 300, MealType::Lunch);
        bad.percentage_consumed = Some(120);
        assert!(matches!(
            agg.save_food_item(bad).await.unwrap_err(),
            AppError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn test_save_reuses_meal_for_same_type_and_day() {
        let store = MemoryStore::new();
        let mut agg = fetched(&store, Uuid::new_v4()).await;
        let a = agg.save_food_item(draft("A", 1, MealType::Lunch)).await.unwrap();
        let b = agg.save_food_item(draft("B", 2, MealType::Lunch)).await.unwrap();
        assert_eq!(a.meal_id, b.meal_id);
        assert_eq!(store.meal_count().await, 1);
    }

    #[tokio::test]
    async fn test_update_food_item() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let mut agg = fetched(&store, user).await;
        let item = agg.save_food_item(draft("Pasta", 600, MealType::Dinner)).await.unwrap();

        let updated = agg
            .update_food_item(
                item.id,
                FoodItemPatch {
                    calorie_number: Some(600),
                    percentage_consumed: Some(25),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.calorie_number, 150);
        assert_eq!(updated.food_name, "Pasta");
        assert_eq!(store.get_food_item(item.id).await.unwrap(), Some(updated));
    }

    #[tokio::test]
    async fn test_percentage_only_patch_rescales_from_full_portion() {
        let store = MemoryStore::new();
        let mut agg = fetched(&store, Uuid::new_v4()).await;
        let mut half = draft("Burger", 800, MealType::Lunch);
        half.percentage_consumed = Some(50);
        let item = agg.save_food_item(half).await.unwrap();
        assert_eq!(item.calorie_number, 400);
        assert_eq!(item.calorie_estimate, 800);

        let whole = agg
            .update_food_item(
                item.id,
                FoodItemPatch {
                    percentage_consumed: Some(100),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(whole.calorie_number, 800);
        assert_eq!(whole.percentage_consumed, Some(100));

        let quarter = agg
            .update_food_item(
                item.id,
                FoodItemPatch {
                    percentage_consumed: Some(25),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(quarter.calorie_number, 200);
        assert_eq!(quarter.calorie_estimate, 800);
    }

    #[tokio::test]
    async fn test_daily_total_against_target() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let mut agg = fetched(&store, user).await;

        agg.save_food_item(draft("Pancakes", 600, MealType::Breakfast)).await.unwrap();
        agg.save_food_item(draft("Burrito", 900, MealType::Lunch)).await.unwrap();
        agg.fetch_meals().await.unwrap();
        assert_eq!(agg.state().total_calories, 1500);
        assert!(!agg.check_calorie_target(Some("2000")));

        agg.save_food_item(draft("Steak", 600, MealType::Dinner)).await.unwrap();
        agg.fetch_meals().await.unwrap();
        assert_eq!(agg.state().total_calories, 2100);
        assert!(agg.check_calorie_target(Some("2000")));
    }

    #[tokio::test]
    async fn test_sweeper_removes_only_stale_empty_meals() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let mut agg = fetched(&store, user).await;
        agg.save_food_item(draft("Kept", 100, MealType::Lunch)).await.unwrap();
        store
            .get_or_create_meal(user, MealType::Dinner, day().start())
            .await
            .unwrap();
        assert_eq!(store.meal_count().await, 2);

        // too fresh to sweep
        assert_eq!(sweep_empty_meals(&store, Duration::minutes(10)).await.unwrap(), 0);

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert_eq!(sweep_empty_meals(&store, Duration::zero()).await.unwrap(), 1);
        assert_eq!(store.meal_count().await, 1);
    }
}
