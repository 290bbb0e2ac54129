use std::time::Duration;

use bytes::Bytes;
use moka::sync::Cache;
use reqwest::Client;
use serde::Deserialize;

use crate::config::Config;
use crate::error::AppError;
use crate::models::Table;
use crate::services::normalizer::expected_columns;
use crate::services::sheet::{load_table, SourceFormat};

#[derive(Debug, Clone, Deserialize)]
pub struct FileInfo {
    #[serde(rename = "type")]
    pub file_type: String,
    pub signed_url: String,
}

/// Keeps recently uploaded file bodies so that a filter change does not
/// download the same file again.
#[derive(Clone)]
pub struct UploadCache {
    files: Cache<String, Bytes>,
}

impl UploadCache {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        Self {
            files: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.upload_cache_capacity, config.upload_cache_ttl)
    }

    pub fn get(&self, url: &str) -> Option<Bytes> {
        self.files.get(url)
    }

    pub fn insert(&self, url: &str, file_data: Bytes) {
        self.files.insert(url.to_string(), file_data);
    }
}

pub async fn load_file_from_url(url: &str, max_file_size: usize) -> Result<Bytes, AppError> {
    let client = Client::new();
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| AppError::FileProcessingError(format!("Failed to fetch file: {}", e)))?;

    if !response.status().is_success() {
        return Err(AppError::FileProcessingError(
            format!("Failed to fetch file. Status: {}", response.status())
        ));
    }

    if let Some(declared) = response.content_length() {
        check_size(declared, max_file_size)?;
    }

    response
        .bytes()
        .await
        .map_err(|e| AppError::FileProcessingError(format!("Failed to read response bytes: {}", e)))
}

fn check_size(len: u64, max_file_size: usize) -> Result<(), AppError> {
    if len > max_file_size as u64 {
        return Err(AppError::InvalidInput(format!(
            "File is {}KB, the limit is {}KB",
            len / 1024,
            max_file_size / 1024
        )));
    }
    Ok(())
}

/// Servers may omit `Content-Length`, so the body is checked again once read.
pub fn check_file_size(file_data: &Bytes, max_file_size: usize) -> Result<(), AppError> {
    check_size(file_data.len() as u64, max_file_size)
}

/// Downloads a file unless the cache already holds it.
pub async fn fetch_file(url: &str, cache: &UploadCache, max_file_size: usize) -> Result<Bytes, AppError> {
    if let Some(file_data) = cache.get(url) {
        tracing::info!("Using cached upload, size: {}KB", file_data.len() / 1024);
        return Ok(file_data);
    }

    let download_start = std::time::Instant::now();
    let file_data = load_file_from_url(url, max_file_size).await?;
    check_file_size(&file_data, max_file_size)?;
    tracing::info!(
        "File downloaded, size: {}KB, took: {:?}",
        file_data.len() / 1024,
        download_start.elapsed()
    );

    cache.insert(url, file_data.clone());
    Ok(file_data)
}

pub fn rejects_empty_upload(files: &[FileInfo]) -> Result<(), AppError> {
    if files.is_empty() {
        return Err(AppError::InvalidInput(format!(
            "Upload a CSV or XLS/XLSX file with columns: {}",
            expected_columns()
        )));
    }
    Ok(())
}

/// Stacks already loaded tables. Columns missing from some files are left as
/// gaps in their rows.
pub fn concat_tables(tables: Vec<Table>) -> Table {
    let widths: Vec<usize> = tables.iter().map(Table::column_count).collect();
    if widths.windows(2).any(|w| w[0] != w[1]) {
        tracing::warn!("Uploaded files have different column counts {:?}; rows will have gaps", widths);
    }
    Table::concat(tables)
}

/// Fetches every file in order, parses it and stacks the rows.
pub async fn load_files(files: &[FileInfo], cache: &UploadCache, config: &Config) -> Result<Table, AppError> {
    rejects_empty_upload(files)?;

    let start = std::time::Instant::now();
    let mut tables = Vec::with_capacity(files.len());
    for file_info in files {
        let format = SourceFormat::from_hint(&file_info.file_type).ok_or_else(|| {
            tracing::error!("Unsupported file type: {}", file_info.file_type);
            AppError::InvalidInput(format!(
                "Unsupported file type '{}', expected CSV, XLS or XLSX",
                file_info.file_type
            ))
        })?;

        tracing::info!("Processing {:?} file, URL length: {}", format, file_info.signed_url.len());
        let file_data = fetch_file(&file_info.signed_url, cache, config.max_file_size).await?;
        let table = load_table(file_data, format)?;
        tracing::info!("Loaded {} rows, {} columns", table.row_count(), table.column_count());
        tables.push(table);
    }

    let table = concat_tables(tables);
    tracing::info!(
        "Loaded {} files into {} rows in {:?}",
        files.len(),
        table.row_count(),
        start.elapsed()
    );
    Ok(table)
}
