use anyhow::{Context, Result};
use polars::io::parquet::write::BatchedWriter;
use polars::prelude::*;
use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::cleaning::chunk::ChunkCleaner;
use crate::cleaning::record::{
    CleanRecord, ColumnIndices, RAW_COLUMNS, RawRecord, RejectedRecord,
};
use crate::config::CleanConfig;
use crate::lookup::{Resolver, Vocabulary};

/// Counters accumulated over one cleaning run.
#[derive(Debug, Clone, Default)]
pub struct CleanStats {
    pub input_rows: usize,
    pub clean_rows: usize,
    pub rejected_rows: usize,
    pub chunks: usize,
    pub unique_order_ids: usize,
    pub elapsed_secs: f64,
}

impl CleanStats {
    pub fn rows_per_sec(&self) -> f64 {
        if self.elapsed_secs > 0.0 {
            self.input_rows as f64 / self.elapsed_secs
        } else {
            0.0
        }
    }

    pub fn retention_rate(&self) -> f64 {
        if self.input_rows > 0 {
            self.clean_rows as f64 / self.input_rows as f64 * 100.0
        } else {
            0.0
        }
    }
}

/// Paths and statistics produced by a cleaning run. `rejected_path` is the
/// configured sink; the file only exists when at least one row was rejected.
#[derive(Debug)]
pub struct CleanOutcome {
    pub clean_path: PathBuf,
    pub rejected_path: Option<PathBuf>,
    pub stats: CleanStats,
}

/// Drives chunked reads of the source CSV through the chunk cleaner and
/// incrementally persists both sinks. Holds at most one chunk in memory plus
/// the run-scoped seen-order-id set.
pub struct CleanPipeline {
    config: CleanConfig,
    cleaner: ChunkCleaner,
    resolver: Resolver,
}

impl CleanPipeline {
    pub fn new(config: CleanConfig, vocabulary: Vocabulary) -> Result<Self> {
        Ok(Self {
            cleaner: ChunkCleaner::new(&config)?,
            resolver: Resolver::new(vocabulary),
            config,
        })
    }

    /// Clean `input_csv` into a Parquet dataset at `clean_path`, writing
    /// rejected rows (raw values plus reason) to `rejected_path` when
    /// configured. Chunks are processed strictly in file order; the clean
    /// artefact is always produced, even when every row is rejected.
    pub fn run(
        &mut self,
        input_csv: &Path,
        clean_path: &Path,
        rejected_path: &Path,
    ) -> Result<CleanOutcome> {
        let start = Instant::now();
        info!("Starting to process CSV file: {}", input_csv.display());
        info!("Chunk size: {} rows", self.config.chunk_size);
        info!("Save rejected rows: {}", self.config.save_rejected_rows);

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(input_csv)
            .with_context(|| format!("Failed to open source CSV {}", input_csv.display()))?;
        let headers = reader
            .headers()
            .context("Failed to read CSV header row")?
            .clone();
        let indices = ColumnIndices::from_headers(&headers);

        let mut sinks = ChunkSinks::new(
            clean_path,
            self.config.save_rejected_rows.then_some(rejected_path),
        );
        let mut seen_order_ids: HashSet<String> = HashSet::new();
        let mut stats = CleanStats::default();
        let mut chunk: Vec<RawRecord> = Vec::with_capacity(self.config.chunk_size);

        for result in reader.records() {
            let record = result.context("Failed to read CSV record")?;
            chunk.push(RawRecord::from_csv(&indices, &record));
            if chunk.len() >= self.config.chunk_size {
                self.process_chunk(&chunk, &mut seen_order_ids, &mut sinks, &mut stats, start)?;
                chunk.clear();
            }
        }
        if !chunk.is_empty() {
            self.process_chunk(&chunk, &mut seen_order_ids, &mut sinks, &mut stats, start)?;
        }

        sinks.finish()?;
        stats.unique_order_ids = seen_order_ids.len();
        stats.elapsed_secs = start.elapsed().as_secs_f64();

        if stats.clean_rows == 0 {
            warn!("No data survived the cleaning process - created empty parquet file");
        } else {
            info!(
                "Cleaning completed: {} chunks processed in {:.1}s",
                stats.chunks, stats.elapsed_secs
            );
            info!(
                "Final stats: {} input rows -> {} clean, {} rejected ({:.1}% retained)",
                stats.input_rows,
                stats.clean_rows,
                stats.rejected_rows,
                stats.retention_rate()
            );
            info!("Unique orders processed: {}", stats.unique_order_ids);
            info!("Processing rate: {:.0} rows/second", stats.rows_per_sec());
        }

        Ok(CleanOutcome {
            clean_path: clean_path.to_path_buf(),
            rejected_path: self
                .config
                .save_rejected_rows
                .then(|| rejected_path.to_path_buf()),
            stats,
        })
    }

    fn process_chunk(
        &mut self,
        chunk: &[RawRecord],
        seen_order_ids: &mut HashSet<String>,
        sinks: &mut ChunkSinks,
        stats: &mut CleanStats,
        run_start: Instant,
    ) -> Result<()> {
        let chunk_start = Instant::now();
        let chunk_num = stats.chunks + 1;
        debug!("Processing chunk {} ({} rows)", chunk_num, chunk.len());

        let (clean, rejected) = self
            .cleaner
            .clean_chunk(chunk, &mut self.resolver, seen_order_ids);

        sinks.write_clean(&clean)?;
        sinks.write_rejected(&rejected)?;

        stats.input_rows += chunk.len();
        stats.clean_rows += clean.len();
        stats.rejected_rows += rejected.len();
        stats.chunks = chunk_num;

        let chunk_elapsed = chunk_start.elapsed().as_secs_f64();
        if chunk_num % 10 == 0 || chunk_elapsed > 5.0 {
            let elapsed = run_start.elapsed().as_secs_f64();
            let rate = if elapsed > 0.0 {
                stats.input_rows as f64 / elapsed
            } else {
                0.0
            };
            info!(
                "Processed chunk {}: {} rows -> {} clean, {} rejected in {:.1}s",
                chunk_num,
                chunk.len(),
                clean.len(),
                rejected.len(),
                chunk_elapsed
            );
            info!(
                "Total progress: {} rows processed, {} clean, {} rejected ({:.0} rows/sec)",
                stats.input_rows, stats.clean_rows, stats.rejected_rows, rate
            );
            info!("Unique order IDs seen: {}", seen_order_ids.len());
        }

        Ok(())
    }
}

/// The two incremental output sinks. Writers are created on the first
/// non-empty batch so that a fully rejected run still yields a schema-stable
/// empty clean artefact and no spurious rejected file.
struct ChunkSinks {
    clean_path: PathBuf,
    rejected_path: Option<PathBuf>,
    clean_writer: Option<BatchedWriter<File>>,
    rejected_writer: Option<csv::Writer<File>>,
}

impl ChunkSinks {
    fn new(clean_path: &Path, rejected_path: Option<&Path>) -> Self {
        Self {
            clean_path: clean_path.to_path_buf(),
            rejected_path: rejected_path.map(Path::to_path_buf),
            clean_writer: None,
            rejected_writer: None,
        }
    }

    fn write_clean(&mut self, records: &[CleanRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let df = records_to_dataframe(records)?;
        if self.clean_writer.is_none() {
            let file = File::create(&self.clean_path).with_context(|| {
                format!("Failed to create clean sink {}", self.clean_path.display())
            })?;
            let writer = ParquetWriter::new(file)
                .with_compression(ParquetCompression::Snappy)
                .batched(df.schema())
                .context("Failed to create batched parquet writer")?;
            info!("Created parquet writer with schema: {} columns", df.width());
            self.clean_writer = Some(writer);
        }
        if let Some(writer) = self.clean_writer.as_mut() {
            writer.write_batch(&df).context("Failed to write clean chunk")?;
        }
        Ok(())
    }

    fn write_rejected(&mut self, records: &[RejectedRecord]) -> Result<()> {
        let Some(rejected_path) = self.rejected_path.clone() else {
            return Ok(());
        };
        if records.is_empty() {
            return Ok(());
        }
        if self.rejected_writer.is_none() {
            let mut writer = csv::Writer::from_path(&rejected_path).with_context(|| {
                format!("Failed to create rejected sink {}", rejected_path.display())
            })?;
            let mut header: Vec<&str> = RAW_COLUMNS.to_vec();
            header.push("rejection_reason");
            writer.write_record(&header)?;
            info!("Created rejected rows writer: {}", rejected_path.display());
            self.rejected_writer = Some(writer);
        }
        if let Some(writer) = self.rejected_writer.as_mut() {
            for record in records {
                let mut fields: Vec<&str> = record.raw.values().to_vec();
                fields.push(record.reason.as_str());
                writer.write_record(&fields)?;
            }
            writer.flush().context("Failed to flush rejected sink")?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        match self.clean_writer.as_mut() {
            Some(writer) => {
                writer.finish().context("Failed to finalize clean sink")?;
            }
            None => {
                // Emit an empty parquet file with the full schema so
                // downstream readers still have a predictable artefact.
                let mut empty = records_to_dataframe(&[])?;
                let file = File::create(&self.clean_path).with_context(|| {
                    format!("Failed to create clean sink {}", self.clean_path.display())
                })?;
                ParquetWriter::new(file)
                    .with_compression(ParquetCompression::Snappy)
                    .finish(&mut empty)
                    .context("Failed to write empty clean sink")?;
            }
        }
        if let Some(writer) = self.rejected_writer.as_mut() {
            writer.flush().context("Failed to flush rejected sink")?;
        }
        Ok(())
    }
}

/// Assemble one chunk of clean records into the documented 11-column frame.
pub(crate) fn records_to_dataframe(records: &[CleanRecord]) -> Result<DataFrame> {
    let columns: Vec<Column> = vec![
        Series::new(
            "order_id".into(),
            records.iter().map(|r| r.order_id.clone()).collect::<Vec<String>>(),
        )
        .into(),
        Series::new(
            "product_name".into(),
            records
                .iter()
                .map(|r| r.product_name.clone())
                .collect::<Vec<String>>(),
        )
        .into(),
        Series::new(
            "category".into(),
            records.iter().map(|r| r.category.clone()).collect::<Vec<String>>(),
        )
        .into(),
        Series::new(
            "quantity".into(),
            records.iter().map(|r| r.quantity).collect::<Vec<i64>>(),
        )
        .into(),
        Series::new(
            "unit_price".into(),
            records.iter().map(|r| r.unit_price).collect::<Vec<f64>>(),
        )
        .into(),
        Series::new(
            "discount_percent".into(),
            records
                .iter()
                .map(|r| r.discount_percent)
                .collect::<Vec<f64>>(),
        )
        .into(),
        Series::new(
            "region".into(),
            records.iter().map(|r| r.region.clone()).collect::<Vec<String>>(),
        )
        .into(),
        Series::new(
            "sale_date".into(),
            records.iter().map(|r| r.sale_date).collect::<Vec<i64>>(),
        )
        .into(),
        Series::new(
            "customer_email".into(),
            records
                .iter()
                .map(|r| r.customer_email.clone())
                .collect::<Vec<Option<String>>>(),
        )
        .into(),
        Series::new(
            "revenue".into(),
            records.iter().map(|r| r.revenue).collect::<Vec<f64>>(),
        )
        .into(),
        Series::new(
            "anomaly_flag".into(),
            records
                .iter()
                .map(|r| r.anomaly_flag.clone())
                .collect::<Vec<Option<String>>>(),
        )
        .into(),
    ];
    DataFrame::new(columns).context("Failed to build clean DataFrame")
}
