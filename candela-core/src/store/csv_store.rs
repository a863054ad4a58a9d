use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use super::{SeriesStore, StoredSeries, TailProbe};
use crate::{CandelaError, Candle, SeriesKey, WriteMode};

/// Column names written as the first row of every series file.
pub const HEADER: [&str; 7] = [
    "timestamp", "open", "high", "low", "close", "volume", "datetime",
];

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const TAIL_WINDOW: u64 = 1024;
const TMP_SUFFIX: &str = ".tmp";
// Shortest header we accept (files written without the datetime column).
const MIN_PLAUSIBLE_BYTES: u64 = "timestamp,open,high,low,close,volume\n".len() as u64;

/// One CSV file per series under a root directory.
///
/// Writes go to `<file>.tmp`, are fsynced, then renamed over the target, so a
/// reader sees either the previous or the new file, never a partial one.
#[derive(Debug, Clone)]
pub struct CsvStore {
    root: PathBuf,
}

impl CsvStore {
    /// Store rooted at `root`. The directory is not touched until first use.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    /// Returns `Storage` when the directory cannot be created.
    pub fn create(root: impl Into<PathBuf>) -> Result<Self, CandelaError> {
        let store = Self::new(root);
        fs::create_dir_all(&store.root)
            .map_err(|e| CandelaError::storage(store.root.display().to_string(), e))?;
        Ok(store)
    }

    /// Root directory holding the series files.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Name of the temporary file used while writing `key`.
    #[must_use]
    pub fn temp_file_name(key: &SeriesKey) -> String {
        format!("{}{TMP_SUFFIX}", key.file_name())
    }

    fn file_path(&self, key: &SeriesKey) -> PathBuf {
        self.root.join(key.file_name())
    }

    fn write_via_tmp(
        &self,
        key: &SeriesKey,
        path: &Path,
        tmp: &Path,
        candles: &[Candle],
        mode: WriteMode,
    ) -> Result<(), CandelaError> {
        let series = key.file_name();
        let io_err = |e: io::Error| CandelaError::storage(&series, e);

        let file = match mode {
            WriteMode::Create => File::create(tmp).map_err(io_err)?,
            WriteMode::Append => {
                let first = candles[0].timestamp_ms;
                match self.probe(key) {
                    TailProbe::Last(last) if first > last => {}
                    TailProbe::Last(last) => {
                        return Err(CandelaError::Data(format!(
                            "{series}: append starting at {first} does not follow stored tail {last}"
                        )));
                    }
                    TailProbe::Missing => {
                        return Err(CandelaError::storage(&series, "append to a missing series"));
                    }
                    TailProbe::Corrupt(reason) => {
                        return Err(CandelaError::storage(
                            &series,
                            format!("append to a corrupt series: {reason}"),
                        ));
                    }
                }
                fs::copy(path, tmp).map_err(io_err)?;
                OpenOptions::new().append(true).open(tmp).map_err(io_err)?
            }
        };

        let out = write_rows(BufWriter::new(file), candles, mode == WriteMode::Create)
            .map_err(|e| CandelaError::storage(&series, e))?;
        let file = out
            .into_inner()
            .map_err(|e| CandelaError::storage(&series, e.error()))?;
        file.sync_all().map_err(io_err)?;
        drop(file);
        fs::rename(tmp, path).map_err(io_err)?;
        sync_dir(&self.root);
        Ok(())
    }
}

impl SeriesStore for CsvStore {
    fn probe(&self, key: &SeriesKey) -> TailProbe {
        let mut file = match File::open(self.file_path(key)) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return TailProbe::Missing,
            Err(e) => return TailProbe::Corrupt(format!("cannot open: {e}")),
        };
        let probe = read_tail(&mut file)
            .unwrap_or_else(|e| TailProbe::Corrupt(format!("tail read failed: {e}")));
        #[cfg(feature = "tracing")]
        if let TailProbe::Corrupt(reason) = &probe {
            tracing::debug!(series = %key, reason = %reason, "tail probe found corruption");
        }
        probe
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "candela_core::store::write",
            skip_all,
            fields(series = %key, rows = candles.len(), mode = ?mode),
            err,
        )
    )]
    fn write(
        &self,
        key: &SeriesKey,
        candles: &[Candle],
        mode: WriteMode,
    ) -> Result<(), CandelaError> {
        if candles.is_empty() {
            return Ok(());
        }
        if let Some(w) = candles
            .windows(2)
            .find(|w| w[1].timestamp_ms <= w[0].timestamp_ms)
        {
            return Err(CandelaError::Data(format!(
                "{}: batch not strictly increasing at {}",
                key.file_name(),
                w[1].timestamp_ms
            )));
        }

        let path = self.file_path(key);
        let tmp = self.root.join(Self::temp_file_name(key));
        let result = self.write_via_tmp(key, &path, &tmp, candles, mode);
        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result
    }

    fn read_full(&self, key: &SeriesKey) -> Result<Vec<Candle>, CandelaError> {
        let series = key.file_name();
        let file = match File::open(self.file_path(key)) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CandelaError::not_found(format!("series {series}")));
            }
            Err(e) => return Err(CandelaError::storage(&series, e)),
        };
        decode_csv(io::BufReader::new(file)).map_err(|e| CandelaError::storage(&series, e))
    }

    fn delete(&self, key: &SeriesKey) -> Result<(), CandelaError> {
        for path in [
            self.file_path(key),
            self.root.join(Self::temp_file_name(key)),
        ] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(CandelaError::storage(key.file_name(), e)),
            }
        }
        Ok(())
    }

    fn path(&self, key: &SeriesKey) -> Option<PathBuf> {
        let path = self.file_path(key);
        path.is_file().then_some(path)
    }

    fn list(&self) -> Result<Vec<StoredSeries>, CandelaError> {
        let root = self.root.display().to_string();
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CandelaError::storage(root, e)),
        };
        let mut out = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| CandelaError::storage(&root, e))?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if !file_name.ends_with(".csv") {
                continue;
            }
            let meta = entry
                .metadata()
                .map_err(|e| CandelaError::storage(&file_name, e))?;
            if !meta.is_file() {
                continue;
            }
            out.push(StoredSeries {
                file_name,
                size: meta.len(),
                modified: meta.modified().ok().map(DateTime::<Utc>::from),
            });
        }
        out.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Ok(out)
    }
}

/// Encode candles as a complete CSV document, header included.
///
/// # Errors
/// Returns `Data` if the CSV writer fails.
pub fn encode_csv(candles: &[Candle]) -> Result<Vec<u8>, CandelaError> {
    write_rows(Vec::new(), candles, true).map_err(CandelaError::Data)
}

fn write_rows<W: Write>(out: W, candles: &[Candle], with_header: bool) -> Result<W, String> {
    let mut w = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(out);
    if with_header {
        w.write_record(HEADER).map_err(|e| e.to_string())?;
    }
    for c in candles {
        let datetime = c
            .datetime()
            .map(|d| d.format(DATETIME_FORMAT).to_string())
            .unwrap_or_default();
        w.write_record([
            c.timestamp_ms.to_string(),
            c.open.to_string(),
            c.high.to_string(),
            c.low.to_string(),
            c.close.to_string(),
            c.volume.to_string(),
            datetime,
        ])
        .map_err(|e| e.to_string())?;
    }
    w.into_inner().map_err(|e| e.to_string())
}

fn decode_csv<R: Read>(input: R) -> Result<Vec<Candle>, String> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(input);
    let mut out = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record.map_err(|e| e.to_string())?;
        out.push(parse_row(record.iter()).map_err(|e| format!("row {}: {e}", i + 1))?);
    }
    Ok(out)
}

fn read_tail(file: &mut File) -> io::Result<TailProbe> {
    let len = file.metadata()?.len();
    if len <= MIN_PLAUSIBLE_BYTES {
        return Ok(TailProbe::Corrupt(format!(
            "{len} bytes cannot hold a header and a row"
        )));
    }
    let window = len.min(TAIL_WINDOW);
    let back = i64::try_from(window).map_err(io::Error::other)?;
    file.seek(SeekFrom::End(-back))?;
    let mut buf = Vec::with_capacity(usize::try_from(window).unwrap_or_default());
    file.read_to_end(&mut buf)?;
    Ok(parse_tail(&buf, window < len))
}

/// Parse the last row of a tail window. `truncated` is true when the window does
/// not start at the beginning of the file.
fn parse_tail(buf: &[u8], truncated: bool) -> TailProbe {
    let Some(body) = buf.strip_suffix(b"\n") else {
        return TailProbe::Corrupt("partial final row".into());
    };
    let body = body.strip_suffix(b"\r").unwrap_or(body);
    let line = match body.iter().rposition(|b| *b == b'\n') {
        Some(i) => &body[i + 1..],
        None if truncated => return TailProbe::Corrupt("final row exceeds the probe window".into()),
        None => body,
    };
    let Ok(text) = std::str::from_utf8(line) else {
        return TailProbe::Corrupt("final row is not valid UTF-8".into());
    };
    match parse_row(text.split(',')) {
        Ok(candle) => TailProbe::Last(candle.timestamp_ms),
        Err(e) => TailProbe::Corrupt(format!("unparseable final row: {e}")),
    }
}

fn parse_row<'a>(mut fields: impl Iterator<Item = &'a str>) -> Result<Candle, String> {
    let mut next = |name: &str| {
        fields
            .next()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| format!("missing {name}"))
    };
    let timestamp_ms = parse_timestamp(next("timestamp")?)?;
    let open = parse_decimal(next("open")?)?;
    let high = parse_decimal(next("high")?)?;
    let low = parse_decimal(next("low")?)?;
    let close = parse_decimal(next("close")?)?;
    let volume = parse_decimal(next("volume")?)?;
    Ok(Candle::new(timestamp_ms, open, high, low, close, volume))
}

fn parse_timestamp(s: &str) -> Result<i64, String> {
    if let Ok(ts) = s.parse::<i64>() {
        return Ok(ts);
    }
    // Legacy files sometimes carry float-formatted timestamps.
    let d = parse_decimal(s)?;
    if !d.fract().is_zero() {
        return Err(format!("fractional timestamp '{s}'"));
    }
    d.to_i64().ok_or_else(|| format!("bad timestamp '{s}'"))
}

fn parse_decimal(s: &str) -> Result<Decimal, String> {
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .map_err(|e| format!("bad number '{s}': {e}"))
}

fn sync_dir(dir: &Path) {
    #[cfg(unix)]
    if let Ok(d) = File::open(dir) {
        let _ = d.sync_all();
    }
    #[cfg(not(unix))]
    let _ = dir;
}
