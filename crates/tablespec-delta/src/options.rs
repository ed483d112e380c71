use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

/// Delta reader and writer option keys.
pub struct DeltaOptionKey;

impl DeltaOptionKey {
    pub const IGNORE_CHANGES: &'static str = "ignoreChanges";
    pub const STARTING_TIMESTAMP: &'static str = "startingTimestamp";
    pub const MAX_BYTES_PER_TRIGGER: &'static str = "maxBytesPerTrigger";
    pub const CHECKPOINT_LOCATION: &'static str = "checkpointLocation";
}

/// Resolver properties that configure table handles and stream loaders.
pub struct HandlePropertyKey;

impl HandlePropertyKey {
    pub const IGNORE_CHANGES: &'static str = "ignore_changes";
    pub const STREAM_START: &'static str = "stream_start";
    pub const MAX_BYTES_PER_TRIGGER: &'static str = "max_bytes_per_trigger";
    pub const CHECKPOINT_PATH: &'static str = "checkpoint_path";
    pub const QUERY_NAME: &'static str = "query_name";
}

const STARTING_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Options for reading a table as a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamReadOptions {
    pub ignore_changes: bool,
    pub stream_start: Option<DateTime<Utc>>,
    pub max_bytes_per_trigger: Option<u64>,
    pub extra: BTreeMap<String, String>,
}

impl Default for StreamReadOptions {
    fn default() -> Self {
        Self {
            ignore_changes: true,
            stream_start: None,
            max_bytes_per_trigger: None,
            extra: BTreeMap::new(),
        }
    }
}

impl StreamReadOptions {
    pub fn to_options(&self) -> BTreeMap<String, String> {
        let mut options = self.extra.clone();
        options.insert(
            DeltaOptionKey::IGNORE_CHANGES.to_string(),
            self.ignore_changes.to_string(),
        );
        if let Some(start) = &self.stream_start {
            options.insert(
                DeltaOptionKey::STARTING_TIMESTAMP.to_string(),
                start.format(STARTING_TIMESTAMP_FORMAT).to_string(),
            );
        }
        if let Some(max_bytes) = self.max_bytes_per_trigger {
            options.insert(
                DeltaOptionKey::MAX_BYTES_PER_TRIGGER.to_string(),
                max_bytes.to_string(),
            );
        }
        options
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_stream_read_options() {
        let options = StreamReadOptions {
            ignore_changes: false,
            stream_start: Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap()),
            max_bytes_per_trigger: Some(1024),
            extra: BTreeMap::new(),
        }
        .to_options();
        assert_eq!(options["ignoreChanges"], "false");
        assert_eq!(options["startingTimestamp"], "2024-03-01T12:30:00.000000Z");
        assert_eq!(options["maxBytesPerTrigger"], "1024");
        assert_eq!(
            StreamReadOptions::default().to_options().keys().collect::<Vec<_>>(),
            vec!["ignoreChanges"]
        );
    }
}
