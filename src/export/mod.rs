//! Writing star-schema tables to object storage as Hive-partitioned Parquet.

use anyhow::Result;
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use object_store::path::Path;
use object_store::PutPayload;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::config::{CompressionCodec, OutputConfig, WriteMode};
use crate::error::EtlError;
use crate::storage::StoreHandle;
use crate::tables::StarTable;

/// Directory name Hive readers map back to a null partition value.
pub const HIVE_DEFAULT_PARTITION: &str = "__HIVE_DEFAULT_PARTITION__";

/// Marker written once every part of a table is in place.
pub const SUCCESS_MARKER: &str = "_SUCCESS";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportOptions {
    pub compression: CompressionCodec,
    pub max_rows_per_file: usize,
    pub write_mode: WriteMode,
}

impl ExportOptions {
    pub fn new(output: &OutputConfig, write_mode: WriteMode) -> Self {
        Self {
            compression: output.compression,
            max_rows_per_file: output.max_rows_per_file,
            write_mode,
        }
    }

    fn writer_properties(&self) -> WriterProperties {
        let compression = match self.compression {
            CompressionCodec::Snappy => Compression::SNAPPY,
            CompressionCodec::Zstd => Compression::ZSTD(ZstdLevel::default()),
            CompressionCodec::Uncompressed => Compression::UNCOMPRESSED,
        };
        WriterProperties::builder()
            .set_compression(compression)
            .build()
    }
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self::new(&OutputConfig::default(), WriteMode::default())
    }
}

/// What one table write produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableReport {
    pub table: String,
    pub rows: usize,
    pub partitions: usize,
    pub files: usize,
    pub replaced: usize,
}

pub struct TableWriter<'a> {
    handle: &'a StoreHandle,
    options: ExportOptions,
}

impl<'a> TableWriter<'a> {
    pub fn new(handle: &'a StoreHandle, options: ExportOptions) -> Self {
        Self { handle, options }
    }

    /// Prefix a table is written under.
    pub fn table_root<T: StarTable>(&self) -> Path {
        self.handle.path(&T::dir_name())
    }

    /// Write every row of a table, one directory per distinct partition.
    pub async fn write<T: StarTable>(&self, rows: &[T]) -> Result<TableReport> {
        let root = self.table_root::<T>();
        let replaced = self.prepare(&root).await?;

        let groups = group_by_partition(rows);
        let props = self.options.writer_properties();
        let max_rows = self.options.max_rows_per_file.max(1);

        let mut report = TableReport {
            table: T::NAME.to_string(),
            rows: rows.len(),
            partitions: groups.len(),
            files: 0,
            replaced,
        };

        for (values, group) in &groups {
            let dir = partition_segments(T::PARTITION_BY, values)
                .into_iter()
                .fold(root.clone(), |dir, segment| dir.child(segment));
            for (index, chunk) in group.chunks(max_rows).enumerate() {
                let encoded = encode::<T>(chunk, props.clone())?;
                let path = dir.child(format!("part-{:05}.parquet", index));
                self.put(&path, encoded.into()).await?;
                debug!("Wrote {} rows to {}", chunk.len(), path);
                report.files += 1;
            }
        }

        if rows.is_empty() {
            // Zero-row file so readers still find the schema.
            let batch = RecordBatch::new_empty(T::schema());
            let encoded = encode_batch(T::NAME, &batch, props)?;
            self.put(&root.child("part-00000.parquet"), encoded.into())
                .await?;
            report.files += 1;
        }

        self.put(&root.child(SUCCESS_MARKER), Bytes::new().into()).await?;

        info!(
            "Wrote table {}: {} rows in {} files across {} partitions",
            T::NAME,
            report.rows,
            report.files,
            report.partitions
        );
        Ok(report)
    }

    /// Apply the write mode to whatever is already under `root`.
    async fn prepare(&self, root: &Path) -> Result<usize, EtlError> {
        match self.options.write_mode {
            WriteMode::Overwrite => {
                let removed = self.handle.delete_prefix(root).await?;
                if removed > 0 {
                    debug!("Removed {} existing objects under {}", removed, root);
                }
                Ok(removed)
            }
            WriteMode::ErrorIfExists => {
                if self.handle.list(root).await?.is_empty() {
                    Ok(0)
                } else {
                    Err(EtlError::OutputExists {
                        path: format!("{}/{}", self.handle.label, root),
                    })
                }
            }
        }
    }

    async fn put(&self, path: &Path, payload: PutPayload) -> Result<(), EtlError> {
        self.handle
            .store
            .put(path, payload)
            .await
            .map_err(|e| EtlError::storage("put", path, e))?;
        Ok(())
    }
}

/// Rows grouped by partition values, groups in value order.
fn group_by_partition<T: StarTable>(rows: &[T]) -> BTreeMap<Vec<Option<String>>, Vec<&T>> {
    let mut groups: BTreeMap<Vec<Option<String>>, Vec<&T>> = BTreeMap::new();
    for row in rows {
        groups.entry(row.partition_values()).or_default().push(row);
    }
    groups
}

/// One `col=value` path segment per partition column. Characters that are
/// not allowed in a path segment (including `/`) are percent-encoded by
/// `object_store` when the segment becomes a path part.
fn partition_segments(columns: &[&str], values: &[Option<String>]) -> Vec<String> {
    columns
        .iter()
        .zip(values)
        .map(|(column, value)| {
            format!(
                "{}={}",
                column,
                value.as_deref().unwrap_or(HIVE_DEFAULT_PARTITION)
            )
        })
        .collect()
}

fn encode<T: StarTable>(rows: &[&T], props: WriterProperties) -> Result<Bytes, EtlError> {
    let batch = T::to_record_batch(rows).map_err(|source| EtlError::Batch {
        table: T::NAME,
        source,
    })?;
    encode_batch(T::NAME, &batch, props)
}

fn encode_batch(
    table: &'static str,
    batch: &RecordBatch,
    props: WriterProperties,
) -> Result<Bytes, EtlError> {
    let encode_err = |source| EtlError::Encode { table, source };
    let mut writer =
        ArrowWriter::try_new(Vec::new(), batch.schema(), Some(props)).map_err(encode_err)?;
    writer.write(batch).map_err(encode_err)?;
    let buffer = writer.into_inner().map_err(encode_err)?;

    Ok(Bytes::from(buffer))
}
