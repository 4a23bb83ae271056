//! Record-level LDIF reading.
//!
//! Handles comments, line folding, the `version:` line and base64 values.
//! Change records and URL values are rejected.

use super::config::{branch_filter, EntryProcessor, SinkWriter};
use super::LdifImportResult;
use crate::error::Result;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use dirstore_commons::{Dn, Entry};
use parking_lot::Mutex;
use std::io::{BufRead, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// One LDIF record with folded lines joined back together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// Line number of the first line of the record
    pub line_number: u64,
    pub lines: Vec<String>,
}

impl RawRecord {
    pub fn dn_line(&self) -> Option<&str> {
        self.lines.first().map(String::as_str)
    }
}

/// Import counters and the reject/skip sinks, shared by every reader and worker.
pub struct ImportReporter {
    entries_read: AtomicU64,
    entries_ignored: AtomicU64,
    entries_rejected: AtomicU64,
    entries_imported: AtomicU64,
    reject_sink: Option<Mutex<SinkWriter>>,
    skip_sink: Option<Mutex<SinkWriter>>,
}

impl ImportReporter {
    pub fn new(reject_sink: Option<SinkWriter>, skip_sink: Option<SinkWriter>) -> Self {
        Self {
            entries_read: AtomicU64::new(0),
            entries_ignored: AtomicU64::new(0),
            entries_rejected: AtomicU64::new(0),
            entries_imported: AtomicU64::new(0),
            reject_sink: reject_sink.map(Mutex::new),
            skip_sink: skip_sink.map(Mutex::new),
        }
    }

    pub(crate) fn record_read(&self) {
        self.entries_read.fetch_add(1, Ordering::Relaxed);
    }

    pub fn entry_imported(&self) {
        self.entries_imported.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts `record` as rejected and copies it to the reject sink.
    pub fn reject(&self, record: &RawRecord, reason: &str) {
        self.entries_rejected.fetch_add(1, Ordering::Relaxed);
        log::debug!("Rejected record at line {}: {}", record.line_number, reason);
        write_record(self.reject_sink.as_ref(), record, reason);
    }

    /// Counts `record` as ignored and copies it to the skip sink.
    pub fn skip(&self, record: &RawRecord, reason: &str) {
        self.entries_ignored.fetch_add(1, Ordering::Relaxed);
        log::trace!("Skipped record at line {}: {}", record.line_number, reason);
        write_record(self.skip_sink.as_ref(), record, reason);
    }

    pub fn snapshot(&self) -> LdifImportResult {
        LdifImportResult {
            entries_read: self.entries_read.load(Ordering::Relaxed),
            entries_imported: self.entries_imported.load(Ordering::Relaxed),
            entries_ignored: self.entries_ignored.load(Ordering::Relaxed),
            entries_rejected: self.entries_rejected.load(Ordering::Relaxed),
        }
    }

    /// Flushes both sinks.
    pub fn flush(&self) {
        for sink in [&self.reject_sink, &self.skip_sink].into_iter().flatten() {
            if let Err(err) = sink.lock().flush() {
                log::warn!("Unable to flush import output: {}", err);
            }
        }
    }
}

fn write_record(sink: Option<&Mutex<SinkWriter>>, record: &RawRecord, reason: &str) {
    let Some(sink) = sink else {
        return;
    };
    let mut out = sink.lock();
    let written = (|| -> std::io::Result<()> {
        for line in reason.lines() {
            writeln!(out, "# {}", line)?;
        }
        for line in &record.lines {
            writeln!(out, "{}", line)?;
        }
        writeln!(out)
    })();
    if let Err(err) = written {
        log::warn!("Unable to write record at line {}: {}", record.line_number, err);
    }
}

/// Splits `name: value`, `name:: base64` lines.
pub fn parse_attribute_line(line: &str) -> std::result::Result<(&str, String), String> {
    let (name, rest) = line
        .split_once(':')
        .ok_or_else(|| format!("Missing ':' in line '{}'", line))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("Missing attribute name in line '{}'", line));
    }
    if let Some(encoded) = rest.strip_prefix(':') {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|err| format!("Invalid base64 value for {}: {}", name, err))?;
        let value = String::from_utf8(bytes)
            .map_err(|_| format!("Value of {} is not valid UTF-8", name))?;
        return Ok((name, value));
    }
    if rest.starts_with('<') {
        return Err(format!("URL values are not supported ({})", name));
    }
    Ok((name, rest.trim_start().to_string()))
}

/// Parses the DN line of `record`.
pub fn parse_dn(record: &RawRecord) -> std::result::Result<Dn, String> {
    let line = record.dn_line().ok_or_else(|| "Empty record".to_string())?;
    let (name, value) = parse_attribute_line(line)?;
    if !name.eq_ignore_ascii_case("dn") {
        return Err(format!("Record does not start with a DN: '{}'", line));
    }
    Dn::parse(&value).map_err(|err| format!("Invalid DN '{}': {}", value, err))
}

/// Builds the entry of `record`, adding the RDN values when they are missing.
pub fn parse_entry(record: &RawRecord, dn: Dn) -> std::result::Result<Entry, String> {
    let mut entry = Entry::new(dn);
    for line in record.lines.iter().skip(1) {
        let (name, value) = parse_attribute_line(line)?;
        if name.eq_ignore_ascii_case("changetype") {
            return Err("Change records are not supported by import".to_string());
        }
        entry.add_attribute_value(name, value);
    }

    let dn = entry.dn().clone();
    if let Some(rdn) = dn.rdn() {
        if !entry.has_attribute(rdn.attribute_type()) {
            entry.add_attribute_value(rdn.attribute_type(), rdn.value());
        }
    }
    Ok(entry)
}

/// Sequential LDIF reader.
pub struct LdifReader<R> {
    input: R,
    line_number: u64,
    first_record: bool,
    include_branches: Vec<Dn>,
    exclude_branches: Vec<Dn>,
    reporter: Arc<ImportReporter>,
    processor: Arc<EntryProcessor>,
    last_record: Option<RawRecord>,
}

impl<R: BufRead> LdifReader<R> {
    pub fn new(input: R, reporter: Arc<ImportReporter>, processor: Arc<EntryProcessor>) -> Self {
        Self {
            input,
            line_number: 0,
            first_record: true,
            include_branches: Vec::new(),
            exclude_branches: Vec::new(),
            reporter,
            processor,
            last_record: None,
        }
    }

    pub fn with_branches(mut self, include: Vec<Dn>, exclude: Vec<Dn>) -> Self {
        self.include_branches = include;
        self.exclude_branches = exclude;
        self
    }

    pub fn reporter(&self) -> &Arc<ImportReporter> {
        &self.reporter
    }

    pub fn processor(&self) -> &Arc<EntryProcessor> {
        &self.processor
    }

    pub fn is_included(&self, dn: &Dn) -> bool {
        branch_filter(&self.include_branches, &self.exclude_branches, dn)
    }

    fn next_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        self.line_number += 1;
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(Some(line))
    }

    /// Reads the next record, or `None` at end of input. Counts it as read.
    pub fn read_raw_record(&mut self) -> Result<Option<RawRecord>> {
        loop {
            let mut lines: Vec<String> = Vec::new();
            let mut start_line = 0;
            let mut in_comment = false;

            while let Some(line) = self.next_line()? {
                if line.is_empty() {
                    if lines.is_empty() {
                        in_comment = false;
                        continue;
                    }
                    break;
                }
                if line.starts_with('#') {
                    in_comment = true;
                    continue;
                }
                if let Some(folded) = line.strip_prefix(' ') {
                    if in_comment {
                        continue;
                    }
                    match lines.last_mut() {
                        Some(last) => last.push_str(folded),
                        None => lines.push(folded.to_string()),
                    }
                    continue;
                }
                in_comment = false;
                if lines.is_empty() {
                    start_line = self.line_number;
                }
                lines.push(line);
            }

            if lines.is_empty() {
                return Ok(None);
            }

            if self.first_record {
                self.first_record = false;
                if lines[0].to_ascii_lowercase().starts_with("version:") {
                    lines.remove(0);
                    start_line += 1;
                    if lines.is_empty() {
                        continue;
                    }
                }
            }

            self.reporter.record_read();
            return Ok(Some(RawRecord {
                line_number: start_line,
                lines,
            }));
        }
    }

    /// Reads the next entry that parses, passes the branch filter, the
    /// plugins and schema validation. Everything else is rejected or skipped
    /// along the way.
    pub fn read_entry(&mut self) -> Result<Option<Entry>> {
        loop {
            let Some(record) = self.read_raw_record()? else {
                return Ok(None);
            };
            let dn = match parse_dn(&record) {
                Ok(dn) => dn,
                Err(reason) => {
                    self.reporter.reject(&record, &reason);
                    continue;
                }
            };
            if !self.is_included(&dn) {
                self.reporter.skip(&record, "Entry is outside the included branches");
                continue;
            }
            let mut entry = match parse_entry(&record, dn) {
                Ok(entry) => entry,
                Err(reason) => {
                    self.reporter.reject(&record, &reason);
                    continue;
                }
            };
            if let Err(reason) = self.processor.process(&mut entry) {
                self.reporter.reject(&record, &reason);
                continue;
            }
            self.last_record = Some(record);
            return Ok(Some(entry));
        }
    }

    /// Rejects the record last returned by [`LdifReader::read_entry`].
    pub fn reject_last_entry(&self, reason: &str) {
        if let Some(record) = &self.last_record {
            self.reporter.reject(record, reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().clone()).unwrap()
        }
    }

    fn reader(ldif: &str) -> (LdifReader<Cursor<Vec<u8>>>, SharedBuf, SharedBuf) {
        let rejects = SharedBuf::default();
        let skips = SharedBuf::default();
        let reporter = Arc::new(ImportReporter::new(
            Some(Box::new(rejects.clone())),
            Some(Box::new(skips.clone())),
        ));
        let reader = LdifReader::new(
            Cursor::new(ldif.as_bytes().to_vec()),
            reporter,
            Arc::new(EntryProcessor::default()),
        );
        (reader, rejects, skips)
    }

    #[test]
    fn test_reads_records_with_folding_and_comments() {
        let ldif = "version: 1\n\n# a comment\n#  folded comment\ndn: o=test\nobjectClass: organization\n\n\n\
                    dn: cn=John,\n o=test\ndescription: long\n  value\ncn:: Sm9obg==\n";
        let (mut reader, _, _) = reader(ldif);

        let first = reader.read_raw_record().unwrap().unwrap();
        assert_eq!(first.lines, vec!["dn: o=test", "objectClass: organization"]);
        assert_eq!(first.line_number, 5);

        let entry = reader.read_entry().unwrap().unwrap();
        assert_eq!(entry.dn(), &Dn::parse("cn=John,o=test").unwrap());
        assert_eq!(entry.attribute("description").unwrap(), &["long value".to_string()]);
        assert_eq!(entry.attribute("cn").unwrap(), &["John".to_string()]);

        assert!(reader.read_entry().unwrap().is_none());
        assert_eq!(reader.reporter().snapshot().entries_read, 2);
    }

    #[test]
    fn test_missing_rdn_value_is_added() {
        let (mut reader, _, _) = reader("dn: uid=jdoe,o=test\nobjectClass: person\n");
        let entry = reader.read_entry().unwrap().unwrap();
        assert_eq!(entry.attribute("uid").unwrap(), &["jdoe".to_string()]);
    }

    #[test]
    fn test_rejects_and_skips() {
        let ldif = "dn: cn=a,o=test\nchangetype: delete\n\n\
                    foo: bar\n\n\
                    dn: cn=b,o=test\njpegPhoto:< file:///tmp/b.jpg\n\n\
                    dn: cn=c,o=other\ncn: c\n\n\
                    dn: cn=d,o=test\ncn: d\n";
        let (reader, rejects, skips) = reader(ldif);
        let mut reader = reader.with_branches(vec![Dn::parse("o=test").unwrap()], Vec::new());

        let entry = reader.read_entry().unwrap().unwrap();
        assert_eq!(entry.dn(), &Dn::parse("cn=d,o=test").unwrap());
        reader.reject_last_entry("duplicate");

        let result = reader.reporter().snapshot();
        assert_eq!(result.entries_read, 5);
        assert_eq!(result.entries_rejected, 4);
        assert_eq!(result.entries_ignored, 1);

        let rejected = rejects.text();
        assert!(rejected.contains("# Change records are not supported"));
        assert!(rejected.contains("# URL values are not supported"));
        assert!(rejected.contains("# duplicate\ndn: cn=d,o=test\ncn: d\n"));
        assert!(skips.text().contains("dn: cn=c,o=other"));
    }

    #[test]
    fn test_parse_attribute_line() {
        assert_eq!(parse_attribute_line("cn: a b").unwrap(), ("cn", "a b".to_string()));
        assert_eq!(parse_attribute_line("cn::YQ==").unwrap(), ("cn", "a".to_string()));
        assert!(parse_attribute_line("no separator").is_err());
        assert!(parse_attribute_line("cn:: !!!").is_err());
    }
}
