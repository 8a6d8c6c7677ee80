use crate::finalization::{Category, StructuredIntent};
use crate::generic_types::GeoPoint;
use crate::turn_log::InlineImage;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Who is talking to the assistant, as known to the surrounding application.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomerContext {
    pub id: String,
    pub name: String,
    pub pin_code: String,
    pub city: String,
    pub locality: Option<String>,
    pub location: Option<GeoPoint>,
}

/// Everything handed to the application once an intake finishes.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedIntake {
    pub intent: StructuredIntent,
    pub image: Option<InlineImage>,
    pub customer: CustomerContext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Drafting,
    Summarized,
    Broadcasted,
    Fulfilled,
    Cancelled,
}

/// A marketplace request ready for the store. The store assigns its identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRequestDraft {
    pub customer_id: String,
    pub customer_name: String,
    pub pin_code: String,
    pub city: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locality: Option<String>,
    pub category: Category,
    pub description: String,
    pub status: RequestStatus,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    /// Data URL of the attached photo.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl FinalizedIntake {
    /// Builds the broadcast request for this intake.
    pub fn to_request_draft(&self, created_at: DateTime<Utc>) -> ProductRequestDraft {
        ProductRequestDraft {
            customer_id: self.customer.id.clone(),
            customer_name: self.customer.name.clone(),
            pin_code: self.customer.pin_code.clone(),
            city: self.customer.city.clone(),
            locality: self.customer.locality.clone(),
            category: self.intent.category(),
            description: self.intent.summary().to_string(),
            status: RequestStatus::Broadcasted,
            created_at,
            image: self.image.as_ref().map(InlineImage::to_data_url),
        }
    }
}
