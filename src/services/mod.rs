pub mod chat_catalog;
pub mod chat_session;
pub mod food_analysis;
pub mod image_ingestion;
pub mod meal_aggregator;
