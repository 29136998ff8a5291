use agentcore::{ExecutionContext, ExecutionResult, Payload, TaskError, TaskHandler};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc, Weekday};
use serde_json::{json, Value};

pub const BOOKINGS: &str = "bookings";

const SLOT_START_HOURS: [u32; 4] = [9, 11, 13, 15];
const SLOT_LENGTH_HOURS: i64 = 2;
const DEFAULT_DAYS: u64 = 7;
const MAX_DAYS: u64 = 60;
const DEFAULT_COUNT: u64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Slot {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl Slot {
    fn overlaps(&self, other: &Slot) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Suggests free photo-shoot slots that avoid existing `bookings`
pub struct ShootScheduler;

fn parse_booking(doc: &Value) -> Option<Slot> {
    let start = doc.get("start")?.as_str()?;
    let end = doc.get("end")?.as_str()?;
    Some(Slot {
        start: DateTime::parse_from_rfc3339(start).ok()?.with_timezone(&Utc),
        end: DateTime::parse_from_rfc3339(end).ok()?.with_timezone(&Utc),
    })
}

fn candidate_slots(from: NaiveDate, days: u64) -> impl Iterator<Item = Slot> {
    from.iter_days()
        .take(days as usize)
        .filter(|day| day.weekday() != Weekday::Sun)
        .flat_map(|day| {
            SLOT_START_HOURS.iter().filter_map(move |hour| {
                let start = Utc.from_utc_datetime(&day.and_hms_opt(*hour, 0, 0)?);
                Some(Slot {
                    start,
                    end: start + Duration::hours(SLOT_LENGTH_HOURS),
                })
            })
        })
}

fn window_days(input: &Payload) -> Result<u64, TaskError> {
    match input.get("days") {
        None | Some(Value::Null) => Ok(DEFAULT_DAYS),
        Some(value) => value
            .as_u64()
            .filter(|days| (1..=MAX_DAYS).contains(days))
            .ok_or_else(|| TaskError::InvalidInput {
                field: "days".to_string(),
                expected: format!("whole number of days between 1 and {}", MAX_DAYS),
            }),
    }
}

fn start_date(input: &Payload) -> Result<NaiveDate, TaskError> {
    match input.get("from").and_then(Value::as_str) {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
            TaskError::InvalidInput {
                field: "from".to_string(),
                expected: "date as YYYY-MM-DD".to_string(),
            }
        }),
        None => Ok(Utc::now().date_naive() + Duration::days(1)),
    }
}

#[async_trait]
impl TaskHandler for ShootScheduler {
    async fn execute(&self, ctx: ExecutionContext) -> Result<ExecutionResult, TaskError> {
        let listing_id = ctx
            .correlation("listingId")
            .ok_or_else(|| TaskError::MissingInput("listingId".to_string()))?
            .to_string();
        let from = start_date(&ctx.input)?;
        let days = window_days(&ctx.input)?;
        let count = ctx.input.get("count").and_then(Value::as_u64).unwrap_or(DEFAULT_COUNT);

        let documents = ctx.store.query_documents(BOOKINGS, &Payload::new()).await?;
        let booked: Vec<Slot> = documents.iter().filter_map(parse_booking).collect();
        if booked.len() < documents.len() {
            ctx.events.warn(format!(
                "Ignoring {} booking(s) without a valid start and end",
                documents.len() - booked.len()
            ));
        }

        let free: Vec<Value> = candidate_slots(from, days)
            .filter(|slot| !booked.iter().any(|b| b.overlaps(slot)))
            .take(count as usize)
            .map(|slot| json!({ "start": slot.start.to_rfc3339(), "end": slot.end.to_rfc3339() }))
            .collect();

        ctx.events.info(format!("Found {} free slot(s) from {}", free.len(), from));
        let mut result = ExecutionResult::success(json!({
            "listingId": listing_id,
            "slots": free,
        }));
        if free.is_empty() {
            result = result.with_warning(format!("No free shoot slots in the {} days from {}", days, from));
        }
        Ok(result)
    }
}
