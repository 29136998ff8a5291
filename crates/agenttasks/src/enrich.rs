use agentcore::{ExecutionContext, ExecutionResult, TaskError, TaskHandler};
use async_trait::async_trait;
use chrono::{Datelike, Utc};
use serde_json::{json, Map, Value};

pub const LISTINGS: &str = "listings";

const REQUIRED_FIELDS: [&str; 5] = ["address", "price", "bedrooms", "bathrooms", "sqft"];

/// Derives listing facts from the `listings` document collection
pub struct ListingEnricher;

fn size_class(sqft: f64) -> &'static str {
    if sqft < 1000.0 {
        "compact"
    } else if sqft < 2500.0 {
        "standard"
    } else {
        "large"
    }
}

fn derive_facts(listing: &Value) -> (Map<String, Value>, Vec<String>) {
    let mut facts = Map::new();
    let missing: Vec<String> = REQUIRED_FIELDS
        .iter()
        .filter(|field| listing.get(**field).map_or(true, Value::is_null))
        .map(|field| field.to_string())
        .collect();

    for field in REQUIRED_FIELDS {
        if let Some(value) = listing.get(field).filter(|v| !v.is_null()) {
            facts.insert(field.to_string(), value.clone());
        }
    }

    let price = listing.get("price").and_then(Value::as_f64);
    let sqft = listing.get("sqft").and_then(Value::as_f64).filter(|s| *s > 0.0);

    if let Some(sqft) = sqft {
        facts.insert("sizeClass".into(), json!(size_class(sqft)));
    }
    if let (Some(price), Some(sqft)) = (price, sqft) {
        facts.insert("pricePerSqft".into(), json!((price / sqft).round()));
    }
    let current_year = i64::from(Utc::now().year());
    if let Some(year) = listing
        .get("yearBuilt")
        .and_then(Value::as_i64)
        .filter(|year| (1..=current_year).contains(year))
    {
        facts.insert("ageYears".into(), json!(current_year - year));
    }
    if let Some(kind) = listing.get("propertyType").and_then(Value::as_str) {
        facts.insert("propertyType".into(), json!(kind));
    }

    (facts, missing)
}

#[async_trait]
impl TaskHandler for ListingEnricher {
    async fn execute(&self, ctx: ExecutionContext) -> Result<ExecutionResult, TaskError> {
        let listing_id = ctx
            .correlation("listingId")
            .ok_or_else(|| TaskError::MissingInput("listingId".to_string()))?
            .to_string();

        ctx.events.info(format!("Loading listing {}", listing_id));
        let listing = ctx.store.get_document(LISTINGS, &listing_id).await?;

        let (facts, missing) = derive_facts(&listing);
        let mut result = ExecutionResult::success(json!({
            "listingId": listing_id,
            "facts": facts,
            "missingFields": missing,
        }));
        for field in &missing {
            let message = format!("Listing {} has no {}", listing_id, field);
            ctx.events.warn(message.clone());
            result = result.with_warning(message);
        }

        tracing::info!(listing_id, missing = missing.len(), "Listing enriched");
        Ok(result)
    }
}
