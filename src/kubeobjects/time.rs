//! # Time Conversion
//!
//! Bridges Kubernetes `Time` values and `chrono`, which the reconcilers use
//! for age and expiry arithmetic. Conversion goes through the RFC 3339 wire
//! form so it does not depend on the time library `k8s-openapi` is built on.

use chrono::{DateTime, SecondsFormat, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::Resource;

pub fn to_datetime(time: &Time) -> Option<DateTime<Utc>> {
    let value = serde_json::to_value(time).ok()?;
    parse_rfc3339(value.as_str()?)
}

pub fn from_datetime(time: DateTime<Utc>) -> Result<Time, serde_json::Error> {
    serde_json::from_value(serde_json::Value::String(format_rfc3339(time)))
}

pub fn parse_rfc3339(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Second precision, `Z` suffix, as the API server writes timestamps
pub fn format_rfc3339(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn creation_time<K: Resource>(obj: &K) -> Option<DateTime<Utc>> {
    obj.meta().creation_timestamp.as_ref().and_then(to_datetime)
}
