// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use arrow_array::{
    Array, ArrayRef, Int32Array, Int64Array, RecordBatch, StringArray, TimestampMicrosecondArray,
};
use arrow_schema::{ArrowError, DataType, Field, Schema, SchemaRef, TimeUnit};
use chrono::{DateTime, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::errors::ParquetError;
use parquet::file::properties::WriterProperties;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::models::landing_artifact::MatchRow;
use crate::utils::errors::{Classify, ErrorClass};

/// 列式编解码错误
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] ParquetError),

    #[error("Missing or mistyped column: {0}")]
    MissingColumn(&'static str),

    #[error("Invalid value in column {column} at row {row}")]
    InvalidValue { column: &'static str, row: usize },
}

impl Classify for CodecError {
    fn class(&self) -> ErrorClass {
        ErrorClass::Permanent
    }
}

fn timestamp_type() -> DataType {
    DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into()))
}

/// 落地文件的固定schema
pub fn match_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("match_id", DataType::Int64, true),
        Field::new("competition_id", DataType::Int64, true),
        Field::new("competition_code", DataType::Utf8, false),
        Field::new("competition_name", DataType::Utf8, true),
        Field::new("competition_country", DataType::Utf8, true),
        Field::new("season", DataType::Int32, true),
        Field::new("matchday", DataType::Int32, true),
        Field::new("utc_date", timestamp_type(), true),
        Field::new("status", DataType::Utf8, true),
        Field::new("home_team_id", DataType::Int64, true),
        Field::new("home_team_name", DataType::Utf8, true),
        Field::new("home_team_short_name", DataType::Utf8, true),
        Field::new("home_team_tla", DataType::Utf8, true),
        Field::new("away_team_id", DataType::Int64, true),
        Field::new("away_team_name", DataType::Utf8, true),
        Field::new("away_team_short_name", DataType::Utf8, true),
        Field::new("away_team_tla", DataType::Utf8, true),
        Field::new("half_time_home", DataType::Int64, true),
        Field::new("half_time_away", DataType::Int64, true),
        Field::new("full_time_home", DataType::Int64, true),
        Field::new("full_time_away", DataType::Int64, true),
        Field::new("winner", DataType::Utf8, true),
        Field::new("extraction_run_id", DataType::Int64, false),
        Field::new("extracted_at", timestamp_type(), false),
    ]))
}

fn strings<'a>(rows: &'a [MatchRow], f: impl Fn(&'a MatchRow) -> Option<&'a str>) -> ArrayRef {
    Arc::new(StringArray::from(rows.iter().map(f).collect::<Vec<_>>()))
}

fn longs(rows: &[MatchRow], f: impl Fn(&MatchRow) -> Option<i64>) -> ArrayRef {
    Arc::new(Int64Array::from(rows.iter().map(f).collect::<Vec<_>>()))
}

fn ints(rows: &[MatchRow], f: impl Fn(&MatchRow) -> Option<i32>) -> ArrayRef {
    Arc::new(Int32Array::from(rows.iter().map(f).collect::<Vec<_>>()))
}

fn timestamps(rows: &[MatchRow], f: impl Fn(&MatchRow) -> Option<DateTime<Utc>>) -> ArrayRef {
    Arc::new(
        TimestampMicrosecondArray::from(
            rows.iter()
                .map(|r| f(r).map(|t| t.timestamp_micros()))
                .collect::<Vec<_>>(),
        )
        .with_timezone("UTC"),
    )
}

/// 把行编码为Parquet字节
pub fn encode(rows: &[MatchRow]) -> Result<Vec<u8>, CodecError> {
    let schema = match_schema();
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            longs(rows, |r| r.match_id),
            longs(rows, |r| r.competition_id),
            strings(rows, |r| Some(r.competition_code.as_str())),
            strings(rows, |r| r.competition_name.as_deref()),
            strings(rows, |r| r.competition_country.as_deref()),
            ints(rows, |r| r.season),
            ints(rows, |r| r.matchday),
            timestamps(rows, |r| r.utc_date),
            strings(rows, |r| r.status.as_deref()),
            longs(rows, |r| r.home_team_id),
            strings(rows, |r| r.home_team_name.as_deref()),
            strings(rows, |r| r.home_team_short_name.as_deref()),
            strings(rows, |r| r.home_team_tla.as_deref()),
            longs(rows, |r| r.away_team_id),
            strings(rows, |r| r.away_team_name.as_deref()),
            strings(rows, |r| r.away_team_short_name.as_deref()),
            strings(rows, |r| r.away_team_tla.as_deref()),
            longs(rows, |r| r.half_time_home),
            longs(rows, |r| r.half_time_away),
            longs(rows, |r| r.full_time_home),
            longs(rows, |r| r.full_time_away),
            strings(rows, |r| r.winner.as_deref()),
            longs(rows, |r| Some(r.extraction_run_id)),
            timestamps(rows, |r| Some(r.extracted_at)),
        ],
    )?;

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(Vec::new(), schema, Some(props))?;
    writer.write(&batch)?;
    Ok(writer.into_inner()?)
}

fn column<'a, T: Array + 'static>(
    batch: &'a RecordBatch,
    name: &'static str,
) -> Result<&'a T, CodecError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or(CodecError::MissingColumn(name))
}

fn opt_string(array: &StringArray, row: usize) -> Option<String> {
    (!array.is_null(row)).then(|| array.value(row).to_string())
}

fn opt_i64(array: &Int64Array, row: usize) -> Option<i64> {
    (!array.is_null(row)).then(|| array.value(row))
}

fn opt_i32(array: &Int32Array, row: usize) -> Option<i32> {
    (!array.is_null(row)).then(|| array.value(row))
}

fn opt_timestamp(
    array: &TimestampMicrosecondArray,
    row: usize,
    name: &'static str,
) -> Result<Option<DateTime<Utc>>, CodecError> {
    if array.is_null(row) {
        return Ok(None);
    }
    DateTime::from_timestamp_micros(array.value(row))
        .map(Some)
        .ok_or(CodecError::InvalidValue { column: name, row })
}

fn decode_batch(batch: &RecordBatch, out: &mut Vec<MatchRow>) -> Result<(), CodecError> {
    let match_id = column::<Int64Array>(batch, "match_id")?;
    let competition_id = column::<Int64Array>(batch, "competition_id")?;
    let competition_code = column::<StringArray>(batch, "competition_code")?;
    let competition_name = column::<StringArray>(batch, "competition_name")?;
    let competition_country = column::<StringArray>(batch, "competition_country")?;
    let season = column::<Int32Array>(batch, "season")?;
    let matchday = column::<Int32Array>(batch, "matchday")?;
    let utc_date = column::<TimestampMicrosecondArray>(batch, "utc_date")?;
    let status = column::<StringArray>(batch, "status")?;
    let home_team_id = column::<Int64Array>(batch, "home_team_id")?;
    let home_team_name = column::<StringArray>(batch, "home_team_name")?;
    let home_team_short_name = column::<StringArray>(batch, "home_team_short_name")?;
    let home_team_tla = column::<StringArray>(batch, "home_team_tla")?;
    let away_team_id = column::<Int64Array>(batch, "away_team_id")?;
    let away_team_name = column::<StringArray>(batch, "away_team_name")?;
    let away_team_short_name = column::<StringArray>(batch, "away_team_short_name")?;
    let away_team_tla = column::<StringArray>(batch, "away_team_tla")?;
    let half_time_home = column::<Int64Array>(batch, "half_time_home")?;
    let half_time_away = column::<Int64Array>(batch, "half_time_away")?;
    let full_time_home = column::<Int64Array>(batch, "full_time_home")?;
    let full_time_away = column::<Int64Array>(batch, "full_time_away")?;
    let winner = column::<StringArray>(batch, "winner")?;
    let extraction_run_id = column::<Int64Array>(batch, "extraction_run_id")?;
    let extracted_at = column::<TimestampMicrosecondArray>(batch, "extracted_at")?;

    for row in 0..batch.num_rows() {
        let code = opt_string(competition_code, row).ok_or(CodecError::InvalidValue {
            column: "competition_code",
            row,
        })?;
        let run_id = opt_i64(extraction_run_id, row).ok_or(CodecError::InvalidValue {
            column: "extraction_run_id",
            row,
        })?;
        let extracted = opt_timestamp(extracted_at, row, "extracted_at")?.ok_or(
            CodecError::InvalidValue {
                column: "extracted_at",
                row,
            },
        )?;

        out.push(MatchRow {
            match_id: opt_i64(match_id, row),
            competition_id: opt_i64(competition_id, row),
            competition_code: code,
            competition_name: opt_string(competition_name, row),
            competition_country: opt_string(competition_country, row),
            season: opt_i32(season, row),
            matchday: opt_i32(matchday, row),
            utc_date: opt_timestamp(utc_date, row, "utc_date")?,
            status: opt_string(status, row),
            home_team_id: opt_i64(home_team_id, row),
            home_team_name: opt_string(home_team_name, row),
            home_team_short_name: opt_string(home_team_short_name, row),
            home_team_tla: opt_string(home_team_tla, row),
            away_team_id: opt_i64(away_team_id, row),
            away_team_name: opt_string(away_team_name, row),
            away_team_short_name: opt_string(away_team_short_name, row),
            away_team_tla: opt_string(away_team_tla, row),
            half_time_home: opt_i64(half_time_home, row),
            half_time_away: opt_i64(half_time_away, row),
            full_time_home: opt_i64(full_time_home, row),
            full_time_away: opt_i64(full_time_away, row),
            winner: opt_string(winner, row),
            extraction_run_id: run_id,
            extracted_at: extracted,
        });
    }
    Ok(())
}

/// 从Parquet字节解码行
pub fn decode(data: &[u8]) -> Result<Vec<MatchRow>, CodecError> {
    let reader =
        ParquetRecordBatchReaderBuilder::try_new(bytes::Bytes::copy_from_slice(data))?.build()?;

    let mut rows = Vec::new();
    for batch in reader {
        decode_batch(&batch?, &mut rows)?;
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(id: Option<i64>) -> MatchRow {
        MatchRow {
            match_id: id,
            competition_id: Some(2014),
            competition_code: "PD".to_string(),
            competition_name: Some("Primera Division".to_string()),
            competition_country: None,
            season: Some(2024),
            matchday: None,
            utc_date: Some(Utc.with_ymd_and_hms(2024, 8, 18, 19, 30, 0).unwrap()),
            status: Some("SCHEDULED".to_string()),
            home_team_id: Some(86),
            home_team_name: Some("Real Madrid CF".to_string()),
            home_team_short_name: Some("Real Madrid".to_string()),
            home_team_tla: Some("RMA".to_string()),
            away_team_id: Some(81),
            away_team_name: Some("FC Barcelona".to_string()),
            away_team_short_name: None,
            away_team_tla: Some("FCB".to_string()),
            half_time_home: None,
            half_time_away: None,
            full_time_home: None,
            full_time_away: None,
            winner: None,
            extraction_run_id: 7,
            extracted_at: Utc.with_ymd_and_hms(2024, 8, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_encode_decode_preserves_nulls() {
        let rows = vec![sample(Some(1)), sample(None)];
        let bytes = encode(&rows).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, rows);
    }

    #[test]
    fn test_empty_batch_encodes() {
        let bytes = encode(&[]).unwrap();
        assert!(decode(&bytes).unwrap().is_empty());
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let rows = vec![sample(Some(1))];
        assert_eq!(encode(&rows).unwrap(), encode(&rows).unwrap());
    }

    #[test]
    fn test_garbage_fails_to_decode() {
        assert!(matches!(
            decode(b"not a parquet file"),
            Err(CodecError::Parquet(_))
        ));
    }
}
