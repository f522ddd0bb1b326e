use crate::domain::model::ScanRecord;
use crate::domain::ports::Storage;
use crate::utils::error::{Result, WatcherError};

/// 掃描紀錄檔，相對於輸出根目錄
pub const HISTORY_FILE: &str = "scans.csv";

/// 新增一筆掃描紀錄，檔案不存在時先寫標頭
pub async fn append_record<S: Storage>(storage: &S, record: &ScanRecord) -> Result<()> {
    let write_header = !storage.exists(HISTORY_FILE).await;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(write_header)
        .from_writer(Vec::new());
    writer.serialize(record)?;
    let data = writer
        .into_inner()
        .map_err(|e| WatcherError::IoError(e.into_error()))?;

    storage.append_file(HISTORY_FILE, &data).await
}

pub async fn read_history<S: Storage>(storage: &S) -> Result<Vec<ScanRecord>> {
    if !storage.exists(HISTORY_FILE).await {
        return Ok(Vec::new());
    }

    let data = storage.read_file(HISTORY_FILE).await?;
    let mut reader = csv::Reader::from_reader(data.as_slice());
    let mut records = Vec::new();
    for row in reader.deserialize() {
        records.push(row?);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::LocalStorage;
    use chrono::Local;
    use tempfile::TempDir;

    fn record(coverage_ratio: f64, alarm: bool) -> ScanRecord {
        ScanRecord {
            timestamp: Local::now(),
            image: "captures/frame.png".to_string(),
            coverage_ratio,
            coverage_percent: crate::domain::model::round_percent(coverage_ratio),
            threshold_percent: 10.0,
            alarm,
        }
    }

    #[tokio::test]
    async fn test_header_written_once() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path());

        append_record(&storage, &record(0.01, false)).await.unwrap();
        append_record(&storage, &record(0.25, true)).await.unwrap();

        let content = String::from_utf8(storage.read_file(HISTORY_FILE).await.unwrap()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("timestamp,image,coverage_ratio"));
        assert_eq!(content.matches("timestamp").count(), 1);
    }

    #[tokio::test]
    async fn test_read_history_round_trip() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path());
        assert!(read_history(&storage).await.unwrap().is_empty());

        let first = record(0.02, false);
        let second = record(0.3, true);
        append_record(&storage, &first).await.unwrap();
        append_record(&storage, &second).await.unwrap();

        let history = read_history(&storage).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].coverage_percent, 30.0);
        assert!(history[1].alarm);
        assert_eq!(history[0].timestamp, first.timestamp);
    }
}
