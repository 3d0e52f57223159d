//! Streaming reader for health export XML.
//!
//! The export is read as a forward-only stream of quick-xml events through a
//! single reusable buffer. Each `Record` or `Workout` element is copied out
//! into an owned [`ExportElement`] (workouts together with their
//! `WorkoutStatistics` children) and the buffer is cleared before the next
//! event, so peak memory is bounded by the largest single element rather
//! than by the size of the file.

use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

const RECORD: &[u8] = b"Record";
const WORKOUT: &[u8] = b"Workout";
const WORKOUT_STATISTICS: &[u8] = b"WorkoutStatistics";

const READ_BUFFER_BYTES: usize = 64 * 1024;

/// A leaf sample element, detached from the document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordElement {
    pub record_type: String,
    pub value: Option<String>,
    pub unit: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub creation_date: Option<String>,
    pub source_name: Option<String>,
}

/// A workout container with its statistic children.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkoutElement {
    pub activity_type: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub duration: Option<String>,
    pub duration_unit: Option<String>,
    pub source_name: Option<String>,
    pub statistics: Vec<WorkoutStatistic>,
}

/// One `WorkoutStatistics` child.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkoutStatistic {
    pub statistic_type: String,
    pub sum: Option<String>,
    pub unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExportElement {
    Record(RecordElement),
    Workout(WorkoutElement),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportError {
    Malformed { position: u64, message: String },
    UnexpectedEof { element: &'static str },
}

impl std::fmt::Display for ExportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportError::Malformed { position, message } => {
                write!(f, "malformed export XML at byte {}: {}", position, message)
            }
            ExportError::UnexpectedEof { element } => {
                write!(f, "export ended inside an open <{}> element", element)
            }
        }
    }
}

impl std::error::Error for ExportError {}

/// Counters describing what the reader has consumed so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    pub records: u64,
    pub workouts: u64,
    /// Largest number of bytes held in the event buffer at any point.
    pub peak_event_bytes: usize,
}

impl ReaderStats {
    pub fn elements(&self) -> u64 {
        self.records + self.workouts
    }
}

/// Pull-based iterator over the `Record` and `Workout` elements of an export.
///
/// Any other element (`ExportDate`, `Me`, `ActivitySummary`, correlation
/// wrappers, ...) is stepped over; records nested inside correlations are
/// still yielded.
pub struct ExportReader<R> {
    reader: Reader<R>,
    buf: Vec<u8>,
    stats: ReaderStats,
    done: bool,
}

impl ExportReader<BufReader<File>> {
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::with_capacity(READ_BUFFER_BYTES, file)))
    }
}

enum Step {
    Record(RecordElement, bool),
    Workout(WorkoutElement, bool),
    Skip,
    Eof,
}

enum Child {
    Statistic(WorkoutStatistic, bool),
    Open,
    Close,
    Other,
    Eof,
}

impl<R: BufRead> ExportReader<R> {
    pub fn new(source: R) -> Self {
        let mut reader = Reader::from_reader(source);
        reader.config_mut().trim_text(true);
        Self {
            reader,
            buf: Vec::new(),
            stats: ReaderStats::default(),
            done: false,
        }
    }

    pub fn stats(&self) -> ReaderStats {
        self.stats
    }

    /// Read the next `Record` or `Workout`, or `None` at end of document.
    pub fn next_element(&mut self) -> Result<Option<ExportElement>, ExportError> {
        loop {
            self.buf.clear();
            let step = match self.reader.read_event_into(&mut self.buf) {
                Ok(Event::Empty(e)) => open_step(&e, false),
                Ok(Event::Start(e)) => open_step(&e, true),
                Ok(Event::Eof) => Ok(Step::Eof),
                Ok(_) => Ok(Step::Skip),
                Err(e) => Err(e.to_string()),
            }
            .map_err(|message| ExportError::Malformed {
                position: self.reader.buffer_position() as u64,
                message,
            })?;
            self.note_peak();

            match step {
                Step::Record(record, has_children) => {
                    if has_children {
                        self.skip_to_end("Record")?;
                    }
                    self.stats.records += 1;
                    return Ok(Some(ExportElement::Record(record)));
                }
                Step::Workout(mut workout, has_children) => {
                    if has_children {
                        self.read_workout_children(&mut workout)?;
                    }
                    self.stats.workouts += 1;
                    return Ok(Some(ExportElement::Workout(workout)));
                }
                Step::Skip => continue,
                Step::Eof => return Ok(None),
            }
        }
    }

    /// Consume events up to and including the end tag of the element just opened.
    fn skip_to_end(&mut self, element: &'static str) -> Result<(), ExportError> {
        let mut depth = 0usize;
        loop {
            self.buf.clear();
            let child = self.read_child(false)?;
            self.note_peak();
            match child {
                Child::Open | Child::Statistic(_, true) => depth += 1,
                Child::Close if depth == 0 => return Ok(()),
                Child::Close => depth -= 1,
                Child::Eof => return Err(ExportError::UnexpectedEof { element }),
                Child::Statistic(_, false) | Child::Other => {}
            }
        }
    }

    fn read_workout_children(&mut self, workout: &mut WorkoutElement) -> Result<(), ExportError> {
        let mut depth = 0usize;
        loop {
            self.buf.clear();
            let child = self.read_child(depth == 0)?;
            self.note_peak();
            match child {
                Child::Statistic(stat, opened) => {
                    workout.statistics.push(stat);
                    if opened {
                        depth += 1;
                    }
                }
                Child::Open => depth += 1,
                Child::Close if depth == 0 => return Ok(()),
                Child::Close => depth -= 1,
                Child::Eof => return Err(ExportError::UnexpectedEof { element: "Workout" }),
                Child::Other => {}
            }
        }
    }

    fn read_child(&mut self, collect_statistics: bool) -> Result<Child, ExportError> {
        let child = match self.reader.read_event_into(&mut self.buf) {
            Ok(Event::Empty(e)) if collect_statistics && e.name().as_ref() == WORKOUT_STATISTICS => {
                WorkoutStatistic::from_start(&e).map(|s| Child::Statistic(s, false))
            }
            Ok(Event::Start(e)) if collect_statistics && e.name().as_ref() == WORKOUT_STATISTICS => {
                WorkoutStatistic::from_start(&e).map(|s| Child::Statistic(s, true))
            }
            Ok(Event::Start(_)) => Ok(Child::Open),
            Ok(Event::End(_)) => Ok(Child::Close),
            Ok(Event::Eof) => Ok(Child::Eof),
            Ok(_) => Ok(Child::Other),
            Err(e) => Err(e.to_string()),
        };
        child.map_err(|message| ExportError::Malformed {
            position: self.reader.buffer_position() as u64,
            message,
        })
    }

    fn note_peak(&mut self) {
        self.stats.peak_event_bytes = self.stats.peak_event_bytes.max(self.buf.len());
    }
}

impl<R: BufRead> Iterator for ExportReader<R> {
    type Item = Result<ExportElement, ExportError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let next = self.next_element();
        if !matches!(next, Ok(Some(_))) {
            self.done = true;
        }
        next.transpose()
    }
}

fn open_step(e: &BytesStart<'_>, has_children: bool) -> Result<Step, String> {
    match e.name().as_ref() {
        RECORD => RecordElement::from_start(e).map(|r| Step::Record(r, has_children)),
        WORKOUT => WorkoutElement::from_start(e).map(|w| Step::Workout(w, has_children)),
        _ => Ok(Step::Skip),
    }
}

fn attr_text(attr: &Attribute<'_>) -> Result<String, String> {
    attr.unescape_value()
        .map(|v| v.into_owned())
        .map_err(|e| e.to_string())
}

impl RecordElement {
    fn from_start(e: &BytesStart<'_>) -> Result<Self, String> {
        let mut record = RecordElement::default();
        let mut record_type = None;
        for attr in e.attributes() {
            let attr = attr.map_err(|err| err.to_string())?;
            let slot = match attr.key.as_ref() {
                b"type" => &mut record_type,
                b"value" => &mut record.value,
                b"unit" => &mut record.unit,
                b"startDate" => &mut record.start_date,
                b"endDate" => &mut record.end_date,
                b"creationDate" => &mut record.creation_date,
                b"sourceName" => &mut record.source_name,
                _ => continue,
            };
            *slot = Some(attr_text(&attr)?);
        }
        record.record_type = record_type.unwrap_or_default();
        Ok(record)
    }
}

impl WorkoutElement {
    fn from_start(e: &BytesStart<'_>) -> Result<Self, String> {
        let mut workout = WorkoutElement::default();
        for attr in e.attributes() {
            let attr = attr.map_err(|err| err.to_string())?;
            let slot = match attr.key.as_ref() {
                b"workoutActivityType" => &mut workout.activity_type,
                b"startDate" => &mut workout.start_date,
                b"endDate" => &mut workout.end_date,
                b"duration" => &mut workout.duration,
                b"durationUnit" => &mut workout.duration_unit,
                b"sourceName" => &mut workout.source_name,
                _ => continue,
            };
            *slot = Some(attr_text(&attr)?);
        }
        Ok(workout)
    }
}

impl WorkoutStatistic {
    fn from_start(e: &BytesStart<'_>) -> Result<Self, String> {
        let mut stat = WorkoutStatistic::default();
        let mut statistic_type = None;
        for attr in e.attributes() {
            let attr = attr.map_err(|err| err.to_string())?;
            let slot = match attr.key.as_ref() {
                b"type" => &mut statistic_type,
                b"sum" => &mut stat.sum,
                b"unit" => &mut stat.unit,
                _ => continue,
            };
            *slot = Some(attr_text(&attr)?);
        }
        stat.statistic_type = statistic_type.unwrap_or_default();
        Ok(stat)
    }
}
