//! Tabular frames returned to the dashboard host.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Named table of equally long columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    pub name: String,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub name: String,
    #[serde(flatten)]
    pub values: FieldValues,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "values", rename_all = "lowercase")]
pub enum FieldValues {
    Time(Vec<DateTime<Utc>>),
    Number(Vec<f64>),
}

impl FieldValues {
    pub fn len(&self) -> usize {
        match self {
            FieldValues::Time(v) => v.len(),
            FieldValues::Number(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Accumulated numeric time series, in arrival order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeries {
    timestamps: Vec<DateTime<Utc>>,
    values: Vec<f64>,
}

impl TimeSeries {
    pub fn push(&mut self, timestamp: DateTime<Utc>, value: f64) {
        self.timestamps.push(timestamp);
        self.values.push(value);
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Builds the `Time`/`Value` frame.
    pub fn into_frame(self) -> Frame {
        Frame {
            name: "response".to_string(),
            fields: vec![
                Field {
                    name: "Time".to_string(),
                    values: FieldValues::Time(self.timestamps),
                },
                Field {
                    name: "Value".to_string(),
                    values: FieldValues::Number(self.values),
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_empty_series_builds_two_empty_columns() {
        let frame = TimeSeries::default().into_frame();
        assert_eq!(frame.name, "response");
        assert_eq!(frame.fields.len(), 2);
        assert_eq!(frame.fields[0].name, "Time");
        assert_eq!(frame.fields[1].name, "Value");
        assert!(frame.fields.iter().all(|f| f.values.is_empty()));
    }

    #[test]
    fn test_frame_json_layout() {
        let mut series = TimeSeries::default();
        series.push(Utc.with_ymd_and_hms(2023, 5, 1, 10, 0, 0).unwrap(), 42.0);
        let json = serde_json::to_value(series.into_frame()).unwrap();
        assert_eq!(
            json,
            json!({
                "name": "response",
                "fields": [
                    {"name": "Time", "type": "time", "values": ["2023-05-01T10:00:00Z"]},
                    {"name": "Value", "type": "number", "values": [42.0]}
                ]
            })
        );
    }
}
