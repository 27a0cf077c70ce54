//! Dashboard queries and the paginated query executor.
//!
//! A query names a device, an interface and a datastream path. The executor
//! walks the datastream page by page over the query's time range and turns
//! every sample into a `f64`:
//!
//! - floats pass through, integers are widened
//! - strings are parsed; unparseable strings are dropped with a warning
//! - any other JSON kind fails the whole query
//!
//! A failed page fails the whole query as well; partial results are discarded.

use chrono::{DateTime, TimeZone, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::client::{AppEngineApi, DatastreamWindow, PAGE_SIZE, PageToken, PageValues};
use crate::error::QueryError;
use crate::frame::{Frame, TimeSeries};
use crate::value::Coercion;

/// Query fields set in the panel editor. Missing fields default to empty.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryModel {
    pub device: String,
    pub interface_name: String,
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct TimeRange {
    #[serde(deserialize_with = "deserialize_instant")]
    pub from: DateTime<Utc>,
    #[serde(deserialize_with = "deserialize_instant")]
    pub to: DateTime<Utc>,
}

/// One query of a batch, as sent by the host.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataQuery {
    pub ref_id: String,
    pub time_range: TimeRange,
    /// Panel-defined fields, decoded into [`QueryModel`] per query.
    #[serde(flatten)]
    pub json: Map<String, Value>,
}

impl DataQuery {
    /// Decodes one query of a batch.
    pub fn from_json(raw: &Value) -> Result<Self, QueryError> {
        serde_json::from_value(raw.clone()).map_err(|e| QueryError::InvalidQuery {
            message: e.to_string(),
        })
    }

    /// Response key of a raw query: its `refId`, or `#<position>` when it has none.
    pub fn response_key(raw: &Value, position: usize) -> String {
        raw.get("refId")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .unwrap_or_else(|| format!("#{position}"))
    }

    pub fn model(&self) -> Result<QueryModel, QueryError> {
        serde_json::from_value(Value::Object(self.json.clone())).map_err(|e| {
            QueryError::InvalidQuery {
                message: e.to_string(),
            }
        })
    }
}

/// A batch of queries. Each entry is decoded on its own so one malformed
/// query does not reject the batch.
#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "api", derive(utoipa::ToSchema))]
pub struct QueryDataRequest {
    pub queries: Vec<Value>,
}

/// Result of one query: frames on success, error text otherwise.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataResponse {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub frames: Vec<Frame>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Result<Frame, QueryError>> for DataResponse {
    fn from(result: Result<Frame, QueryError>) -> Self {
        match result {
            Ok(frame) => DataResponse {
                frames: vec![frame],
                error: None,
            },
            Err(e) => DataResponse {
                frames: Vec::new(),
                error: Some(e.to_string()),
            },
        }
    }
}

/// Responses keyed by `refId`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryDataResponse {
    pub results: std::collections::BTreeMap<String, DataResponse>,
}

/// Reads the datastream named by `model` over `range` and returns its samples
/// as a `Time`/`Value` frame.
pub async fn execute_query(
    api: &dyn AppEngineApi,
    model: &QueryModel,
    range: TimeRange,
) -> Result<Frame, QueryError> {
    if range.from > range.to {
        return Err(QueryError::InvalidQuery {
            message: format!("time range starts at {} after its end {}", range.from, range.to),
        });
    }

    let window = DatastreamWindow {
        device_id: model.device.clone(),
        interface: model.interface_name.clone(),
        path: model.path.clone(),
        since: range.from,
        to: range.to,
        page_size: PAGE_SIZE,
    };

    let mut series = TimeSeries::default();
    let mut cursor: Option<PageToken> = None;
    let mut pages = 0usize;

    loop {
        let page = api
            .datastream_page(&window, cursor.as_ref())
            .await
            .inspect_err(|e| {
                error!(
                    device = %model.device,
                    interface = %model.interface_name,
                    path = %model.path,
                    page = pages,
                    error = %e,
                    "error retrieving datastream page"
                );
            })?;
        pages += 1;

        let values = match page.values {
            PageValues::Individual(values) => values,
            PageValues::Unexpected { shape } => {
                let err = QueryError::SchemaMismatch {
                    device: model.device.clone(),
                    interface: model.interface_name.clone(),
                    path: model.path.clone(),
                };
                error!(shape = %shape, error = %err, "unexpected datastream page shape");
                return Err(err);
            }
        };
        debug!(page = pages, entries = values.len(), "reading datastream page");

        for entry in values {
            match entry.value.coerce() {
                Ok(Coercion::Sample(v)) => series.push(entry.timestamp, v),
                Ok(Coercion::Malformed) => {
                    warn!(
                        value = ?entry.value,
                        timestamp = %entry.timestamp,
                        "could not parse as numeric datatype, dropping sample"
                    );
                }
                Err(kind) => {
                    let err = QueryError::NonNumeric {
                        device: model.device.clone(),
                        interface: model.interface_name.clone(),
                        path: model.path.clone(),
                        kind,
                    };
                    error!(error = %err, "error on value type read");
                    return Err(err);
                }
            }
        }

        match page.next {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    debug!(pages, samples = series.len(), "datastream read complete");
    Ok(series.into_frame())
}

/// Accepts RFC 3339 strings, epoch milliseconds, or epoch milliseconds as a string.
fn deserialize_instant<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(i64),
        Text(String),
    }

    let millis = match Raw::deserialize(deserializer)? {
        Raw::Millis(ms) => ms,
        Raw::Text(s) => match s.parse::<i64>() {
            Ok(ms) => ms,
            Err(_) => {
                return DateTime::parse_from_rfc3339(&s)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(de::Error::custom);
            }
        },
    };
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| de::Error::custom(format!("timestamp {millis} out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::mock::MockAppEngine;
    use crate::value::ValueKind;
    use chrono::Duration;
    use serde_json::json;

    const DEVICE: &str = "dev1";
    const IFACE: &str = "com.example.Temp";
    const PATH: &str = "/value";

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 5, 1, 0, 0, 0).unwrap()
    }

    fn model() -> QueryModel {
        QueryModel {
            device: DEVICE.to_string(),
            interface_name: IFACE.to_string(),
            path: PATH.to_string(),
        }
    }

    fn range() -> TimeRange {
        TimeRange {
            from: t0(),
            to: t0() + Duration::days(1),
        }
    }

    fn number_column(frame: &Frame) -> Vec<f64> {
        match &frame.fields[1].values {
            crate::frame::FieldValues::Number(v) => v.clone(),
            other => panic!("unexpected column {other:?}"),
        }
    }

    fn time_column(frame: &Frame) -> Vec<DateTime<Utc>> {
        match &frame.fields[0].values {
            crate::frame::FieldValues::Time(v) => v.clone(),
            other => panic!("unexpected column {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_range_is_empty_frame() {
        let api = MockAppEngine::new().with_datastream(DEVICE, IFACE, PATH, Vec::new());
        let frame = execute_query(&api, &model(), range()).await.unwrap();
        assert!(time_column(&frame).is_empty());
        assert!(number_column(&frame).is_empty());
    }

    #[tokio::test]
    async fn test_integer_widened_and_position_preserved() {
        let ts = t0() + Duration::minutes(5);
        let api = MockAppEngine::new().with_datastream(
            DEVICE,
            IFACE,
            PATH,
            vec![
                (t0(), json!(1.5)),
                (ts, json!(42)),
                (ts + Duration::minutes(1), json!("7")),
            ],
        );
        let frame = execute_query(&api, &model(), range()).await.unwrap();
        assert_eq!(number_column(&frame), vec![1.5, 42.0, 7.0]);
        assert_eq!(time_column(&frame)[1], ts);
    }

    #[tokio::test]
    async fn test_spans_pages_in_arrival_order() {
        let samples: Vec<_> = (0..250)
            .map(|i| (t0() + Duration::seconds(i), json!(i)))
            .collect();
        let api = MockAppEngine::new().with_datastream(DEVICE, IFACE, PATH, samples);

        let frame = execute_query(&api, &model(), range()).await.unwrap();
        let values = number_column(&frame);
        assert_eq!(values.len(), 250);
        assert!(values.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(api.datastream_calls(), 3);
    }

    #[tokio::test]
    async fn test_malformed_string_dropped_across_pages() {
        let mut samples: Vec<_> = (0..150)
            .map(|i| (t0() + Duration::seconds(i), json!(i as f64)))
            .collect();
        samples[10].1 = json!("not a number");
        let api = MockAppEngine::new().with_datastream(DEVICE, IFACE, PATH, samples);

        let frame = execute_query(&api, &model(), range()).await.unwrap();
        let values = number_column(&frame);
        assert_eq!(values.len(), 149);
        assert!(!values.contains(&10.0));
        assert_eq!(values.last(), Some(&149.0));
        assert_eq!(time_column(&frame).len(), 149);
    }

    #[tokio::test]
    async fn test_non_numeric_fails_whole_query() {
        let mut samples: Vec<_> = (0..150)
            .map(|i| (t0() + Duration::seconds(i), json!(i)))
            .collect();
        samples[120].1 = json!(true);
        let api = MockAppEngine::new().with_datastream(DEVICE, IFACE, PATH, samples);

        let err = execute_query(&api, &model(), range()).await.unwrap_err();
        match &err {
            QueryError::NonNumeric {
                device,
                interface,
                path,
                kind,
            } => {
                assert_eq!(device, DEVICE);
                assert_eq!(interface, IFACE);
                assert_eq!(path, PATH);
                assert_eq!(*kind, ValueKind::Boolean);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_page_failure_discards_earlier_pages() {
        let samples: Vec<_> = (0..250)
            .map(|i| (t0() + Duration::seconds(i), json!(i)))
            .collect();
        let api = MockAppEngine::new()
            .with_datastream(DEVICE, IFACE, PATH, samples)
            .fail_page(
                2,
                ApiError::Network {
                    message: "connection reset".to_string(),
                },
            );

        let err = execute_query(&api, &model(), range()).await.unwrap_err();
        assert!(matches!(err, QueryError::Api(ApiError::Network { .. })));
        assert_eq!(api.datastream_calls(), 2);
    }

    #[tokio::test]
    async fn test_aggregated_payload_is_schema_mismatch() {
        let api = MockAppEngine::new().with_aggregated_datastream(DEVICE, IFACE, PATH);
        let err = execute_query(&api, &model(), range()).await.unwrap_err();
        assert!(matches!(err, QueryError::SchemaMismatch { .. }));
        let msg = err.to_string();
        assert!(msg.contains(DEVICE) && msg.contains(IFACE) && msg.contains(PATH));
    }

    #[tokio::test]
    async fn test_inverted_range_rejected() {
        let api = MockAppEngine::new();
        let inverted = TimeRange {
            from: range().to,
            to: range().from,
        };
        assert!(matches!(
            execute_query(&api, &model(), inverted).await,
            Err(QueryError::InvalidQuery { .. })
        ));
        assert_eq!(api.datastream_calls(), 0);
    }

    #[test]
    fn test_data_query_parsing() {
        let q: DataQuery = serde_json::from_value(json!({
            "refId": "A",
            "timeRange": {"from": "1682899200000", "to": 1682985600000i64},
            "device": "dev1",
            "interfaceName": "com.example.Temp",
            "path": "/value",
            "datasource": {"type": "astarte"}
        }))
        .unwrap();
        assert_eq!(q.ref_id, "A");
        assert_eq!(q.time_range.from, t0());
        assert_eq!(q.time_range.to, t0() + Duration::days(1));
        assert_eq!(q.model().unwrap(), model());
    }

    #[test]
    fn test_time_range_rfc3339() {
        let r: TimeRange = serde_json::from_value(json!({
            "from": "2023-05-01T00:00:00Z",
            "to": "2023-05-02T02:00:00+02:00"
        }))
        .unwrap();
        assert_eq!(r, range());
    }

    #[test]
    fn test_from_json_rejects_bad_time_range() {
        let raw = json!({
            "refId": "B",
            "timeRange": {"from": "yesterday", "to": "now"},
            "device": "dev1"
        });
        assert!(matches!(
            DataQuery::from_json(&raw),
            Err(QueryError::InvalidQuery { .. })
        ));
        assert_eq!(DataQuery::response_key(&raw, 1), "B");
        assert_eq!(DataQuery::response_key(&json!({"device": "dev1"}), 3), "#3");
    }

    #[test]
    fn test_model_defaults_and_type_errors() {
        let q: DataQuery = serde_json::from_value(json!({
            "refId": "B",
            "timeRange": {"from": 0, "to": 1},
            "device": "dev1"
        }))
        .unwrap();
        assert_eq!(q.model().unwrap().path, "");

        let q: DataQuery = serde_json::from_value(json!({
            "refId": "C",
            "timeRange": {"from": 0, "to": 1},
            "device": 12
        }))
        .unwrap();
        assert!(matches!(q.model(), Err(QueryError::InvalidQuery { .. })));
    }
}
