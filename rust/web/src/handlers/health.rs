use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use warp::reply::Json;

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    timestamp: String,
}

pub fn health() -> Json {
    warp::reply::json(&HealthBody {
        status: "healthy",
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}
