//! MongoDB store (feature `mongo`).

use super::{
    CropRecommendation, HardwareMessage, RecommendationStore, StoreError, READINGS_COLLECTION,
    RECOMMENDATIONS_COLLECTION,
};
use async_trait::async_trait;
use mongodb::bson::doc;
use mongodb::{Client, Collection};

pub struct MongoStore {
    readings: Collection<HardwareMessage>,
    recommendations: Collection<CropRecommendation>,
}

impl MongoStore {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(uri)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let db = client.database(database);
        tracing::info!("Connected to MongoDB database {}", database);

        Ok(Self {
            readings: db.collection(READINGS_COLLECTION),
            recommendations: db.collection(RECOMMENDATIONS_COLLECTION),
        })
    }
}

#[async_trait]
impl RecommendationStore for MongoStore {
    async fn save_reading(&self, message: &HardwareMessage) -> Result<(), StoreError> {
        self.readings
            .insert_one(message)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    async fn save_recommendation(&self, recommendation: &CropRecommendation) -> Result<(), StoreError> {
        self.recommendations
            .insert_one(recommendation)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    async fn latest_reading(&self) -> Result<Option<HardwareMessage>, StoreError> {
        self.readings
            .find_one(doc! {})
            .sort(doc! { "createdAt": -1 })
            .await
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn backend_name(&self) -> &'static str {
        "mongo"
    }
}
