//! Pipeline orchestration: read → batch → parse → publish.
//!
//! With one worker every stage of a batch completes before the next batch is
//! read, so memory stays at one batch plus its JSON encoding. With more
//! workers, parsed batches go through a bounded queue to a fixed pool of
//! publisher threads; the reader blocks when the queue is full and batches
//! may commit out of input order.

use std::io::{self, BufRead};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, sync_channel};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use indicatif::ProgressBar;
use solrfeed_core::fmt_count;

use crate::batch::{RawLines, batches};
use crate::config::Config;
use crate::publish::{Publish, PublishError};
use crate::record::{Document, ParseError, RawLine, parse_line};

/// Line rewrite applied before batching; receives the zero-based line index.
pub type Decorator<'a> = &'a dyn Fn(u64, RawLine) -> RawLine;

/// Prefix a line with a synthetic `id` field holding its zero-based index.
///
/// `x\t9` at index 5 becomes `id\t5\tx\t9`.
pub fn with_sequence_id(index: u64, line: RawLine) -> RawLine {
    let mut out = format!("id\t{index}\t").into_bytes();
    out.extend_from_slice(&line);
    out
}

/// Pipeline state in which a run failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Reading,
    Parsing,
    Publishing,
}

/// Fatal pipeline error; the run stops at the first one.
#[derive(Debug)]
pub enum PipelineError {
    /// Input stream failed
    Read(io::Error),
    /// Line (1-based) could not be decoded
    Parse { line: u64, source: ParseError },
    /// Batch (1-based) was not accepted by the index
    Publish { batch: u64, source: PublishError },
    /// Shutdown was requested between batches
    Interrupted,
}

impl PipelineError {
    /// Stage that failed; `None` for an interrupt.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Read(_) => Some(Stage::Reading),
            Self::Parse { .. } => Some(Stage::Parsing),
            Self::Publish { .. } => Some(Stage::Publishing),
            Self::Interrupted => None,
        }
    }
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read(e) => write!(f, "failed reading input: {e}"),
            Self::Parse { line, source } => write!(f, "line {line}: {source}"),
            Self::Publish { batch, source } => write!(f, "batch {batch}: {source}"),
            Self::Interrupted => write!(f, "interrupted"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Read(e) => Some(e),
            Self::Parse { source, .. } => Some(source),
            Self::Publish { source, .. } => Some(source),
            Self::Interrupted => None,
        }
    }
}

/// Outcome of a successful run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub batches: u64,
    pub documents: u64,
    pub elapsed: Duration,
}

impl Summary {
    pub fn log(&self) {
        log::info!("=== Indexing Summary ===");
        log::info!("Batches: {}", fmt_count(self.batches));
        log::info!("Documents: {}", fmt_count(self.documents));
        log::info!("Time: {:.1}s", self.elapsed.as_secs_f64());
        if self.documents > 0 && !self.elapsed.is_zero() {
            let rate = self.documents as f64 / self.elapsed.as_secs_f64();
            log::info!("Throughput: {rate:.0} docs/sec");
        }
    }
}

/// Run the pipeline over `input` with default options.
pub fn run<R: BufRead, P: Publish>(
    input: R,
    publisher: &P,
    config: Config,
    decorate: Option<Decorator<'_>>,
) -> Result<Summary, PipelineError> {
    let mut pipeline = Pipeline::new(publisher, config);
    if let Some(decorate) = decorate {
        pipeline = pipeline.decorate(decorate);
    }
    pipeline.run(input)
}

/// One indexing run against a single publisher.
pub struct Pipeline<'a, P> {
    publisher: &'a P,
    config: Config,
    decorate: Option<Decorator<'a>>,
    progress: ProgressBar,
    stop: Option<&'a AtomicBool>,
}

impl<'a, P: Publish> Pipeline<'a, P> {
    pub fn new(publisher: &'a P, config: Config) -> Self {
        Self {
            publisher,
            config,
            decorate: None,
            progress: ProgressBar::hidden(),
            stop: None,
        }
    }

    /// Rewrite every line before batching.
    pub fn decorate(mut self, decorate: Decorator<'a>) -> Self {
        self.decorate = Some(decorate);
        self
    }

    /// Bar whose position tracks the published document count.
    pub fn progress(mut self, pb: ProgressBar) -> Self {
        self.progress = pb;
        self
    }

    /// Flag checked between batches; when set the run ends with
    /// [`PipelineError::Interrupted`].
    pub fn stop_flag(mut self, flag: &'a AtomicBool) -> Self {
        self.stop = Some(flag);
        self
    }

    /// Index every line of `input`.
    pub fn run<R: BufRead>(&self, input: R) -> Result<Summary, PipelineError> {
        self.run_lines(RawLines::new(input))
    }

    /// Index an already-split line stream.
    pub fn run_lines<I>(&self, lines: I) -> Result<Summary, PipelineError>
    where
        I: IntoIterator<Item = io::Result<RawLine>>,
    {
        let start = Instant::now();
        let decorate = self.decorate;
        let lines = lines.into_iter().enumerate().map(move |(i, line)| match decorate {
            Some(f) => line.map(|l| f(i as u64, l)),
            None => line,
        });

        log::debug!(
            "pipeline: chunk_size={}, workers={}",
            self.config.chunk_size,
            self.config.workers
        );

        let counts = if self.config.is_sequential() {
            self.run_sequential(lines)?
        } else {
            self.run_parallel(lines)?
        };

        self.progress.finish_and_clear();
        Ok(Summary {
            batches: counts.batches,
            documents: counts.documents,
            elapsed: start.elapsed(),
        })
    }

    fn stop_requested(&self) -> bool {
        self.stop.is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    fn run_sequential<I>(&self, lines: I) -> Result<Counts, PipelineError>
    where
        I: Iterator<Item = io::Result<RawLine>>,
    {
        let mut reader = BatchReader::new(lines, self.config);
        let mut counts = Counts::default();

        loop {
            if self.stop_requested() {
                return Err(PipelineError::Interrupted);
            }
            let Some((batch_no, docs)) = reader.next_batch()? else {
                return Ok(counts);
            };
            self.publisher
                .publish(&docs)
                .map_err(|source| PipelineError::Publish {
                    batch: batch_no,
                    source,
                })?;
            counts.batches += 1;
            counts.documents += docs.len() as u64;
            report(&self.progress, counts.documents);
        }
    }

    fn run_parallel<I>(&self, lines: I) -> Result<Counts, PipelineError>
    where
        I: Iterator<Item = io::Result<RawLine>>,
    {
        let workers = self.config.workers.get();
        let (tx, rx) = sync_channel::<(u64, Vec<Document>)>(workers);
        let rx = Mutex::new(rx);
        let shared = Shared::default();
        let publisher = self.publisher;
        let progress = &self.progress;
        let stop = self.stop;

        std::thread::scope(|s| {
            for _ in 0..workers {
                s.spawn(|| publish_worker(publisher, &rx, &shared, progress, stop));
            }
            if let Err(e) = self.produce(lines, tx, &shared) {
                shared.fail(e);
            }
        });

        match shared.failure.into_inner().unwrap_or_else(PoisonError::into_inner) {
            Some(e) => Err(e),
            None => Ok(shared.counts.into_inner().unwrap_or_else(PoisonError::into_inner)),
        }
    }

    /// Read and parse batches into the queue until input ends or a failure is recorded.
    fn produce<I>(
        &self,
        lines: I,
        tx: SyncSender<(u64, Vec<Document>)>,
        shared: &Shared,
    ) -> Result<(), PipelineError>
    where
        I: Iterator<Item = io::Result<RawLine>>,
    {
        let mut reader = BatchReader::new(lines, self.config);
        loop {
            if shared.failed.load(Ordering::Relaxed) {
                return Ok(());
            }
            if self.stop_requested() {
                return Err(PipelineError::Interrupted);
            }
            let Some(job) = reader.next_batch()? else {
                return Ok(());
            };
            // Blocks while the queue is full
            if tx.send(job).is_err() {
                return Ok(());
            }
        }
    }
}

#[derive(Debug, Default)]
struct Counts {
    batches: u64,
    documents: u64,
}

/// Batches of parsed documents, numbered from 1, with input line tracking.
struct BatchReader<I: Iterator<Item = io::Result<RawLine>>> {
    batches: crate::batch::Batches<I, io::Error>,
    batch_no: u64,
    lines_read: u64,
}

impl<I: Iterator<Item = io::Result<RawLine>>> BatchReader<I> {
    fn new(lines: I, config: Config) -> Self {
        Self {
            batches: batches(lines, config.chunk_size),
            batch_no: 0,
            lines_read: 0,
        }
    }

    fn next_batch(&mut self) -> Result<Option<(u64, Vec<Document>)>, PipelineError> {
        let Some(raw) = self.batches.next() else {
            return Ok(None);
        };
        let raw = raw.map_err(PipelineError::Read)?;
        let docs = parse_batch(&raw, self.lines_read)?;
        self.lines_read += raw.len() as u64;
        self.batch_no += 1;
        Ok(Some((self.batch_no, docs)))
    }
}

fn parse_batch(lines: &[RawLine], lines_before: u64) -> Result<Vec<Document>, PipelineError> {
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            parse_line(line).map_err(|source| PipelineError::Parse {
                line: lines_before + i as u64 + 1,
                source,
            })
        })
        .collect()
}

fn report(pb: &ProgressBar, total: u64) {
    pb.set_position(total);
    log::info!("{} documents indexed", fmt_count(total));
}

/// State shared between the reader and publisher threads
#[derive(Default)]
struct Shared {
    failed: AtomicBool,
    failure: Mutex<Option<PipelineError>>,
    /// Held while reporting so the bar never moves backwards
    counts: Mutex<Counts>,
}

impl Shared {
    /// Record `err` unless an earlier failure is already recorded.
    fn fail(&self, err: PipelineError) {
        let mut slot = self.failure.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(err);
        } else {
            log::debug!("suppressed follow-up error: {err}");
        }
        self.failed.store(true, Ordering::Relaxed);
    }
}

/// Publish queued batches until the queue closes.
///
/// After a failure or once `stop` is set, batches still queued are dropped;
/// requests already in flight on other workers run to completion.
fn publish_worker<P: Publish>(
    publisher: &P,
    rx: &Mutex<Receiver<(u64, Vec<Document>)>>,
    shared: &Shared,
    progress: &ProgressBar,
    stop: Option<&AtomicBool>,
) {
    loop {
        let job = rx.lock().unwrap_or_else(PoisonError::into_inner).recv();
        let Ok((batch_no, docs)) = job else {
            return;
        };
        if shared.failed.load(Ordering::Relaxed) {
            log::debug!("batch {batch_no}: dropped after earlier failure");
            continue;
        }
        if stop.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            log::debug!("batch {batch_no}: dropped on shutdown");
            shared.fail(PipelineError::Interrupted);
            continue;
        }
        match publisher.publish(&docs) {
            Ok(()) => {
                let mut counts = shared.counts.lock().unwrap_or_else(PoisonError::into_inner);
                counts.batches += 1;
                counts.documents += docs.len() as u64;
                report(progress, counts.documents);
            }
            Err(source) => shared.fail(PipelineError::Publish {
                batch: batch_no,
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// In-memory publisher; fails the `fail_on`-th call (1-based).
    #[derive(Default)]
    struct Recorder {
        published: Mutex<Vec<Vec<Document>>>,
        calls: AtomicUsize,
        fail_on: Option<usize>,
    }

    impl Recorder {
        fn failing_on(call: usize) -> Self {
            Self {
                fail_on: Some(call),
                ..Self::default()
            }
        }

        fn published(&self) -> Vec<Vec<Document>> {
            self.published.lock().unwrap().clone()
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Publish for Recorder {
        fn publish(&self, batch: &[Document]) -> Result<(), PublishError> {
            assert!(!batch.is_empty(), "empty batch published");
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on == Some(call) {
                return Err(PublishError::Index {
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            self.published.lock().unwrap().push(batch.to_vec());
            Ok(())
        }
    }

    fn config(chunk_size: usize, workers: usize) -> Config {
        Config::new(chunk_size, workers).unwrap()
    }

    fn doc(pairs: &[(&str, &str)]) -> Document {
        pairs.iter().copied().collect()
    }

    fn numbered_input(n: usize) -> String {
        (0..n).map(|i| format!("n\t{i}\n")).collect()
    }

    #[test]
    fn three_lines_chunk_two() {
        let publisher = Recorder::default();
        let input: &[u8] = b"a\t1\nb\t2\nc\t3\n";
        let summary = run(input, &publisher, config(2, 1), None).unwrap();

        assert_eq!(
            publisher.published(),
            vec![
                vec![doc(&[("a", "1")]), doc(&[("b", "2")])],
                vec![doc(&[("c", "3")])],
            ]
        );
        assert_eq!(summary.batches, 2);
        assert_eq!(summary.documents, 3);
    }

    #[test]
    fn one_document_per_line_in_order() {
        let publisher = Recorder::default();
        let input = numbered_input(25);
        run(input.as_bytes(), &publisher, config(4, 1), None).unwrap();

        let flat: Vec<String> = publisher
            .published()
            .into_iter()
            .flatten()
            .map(|d| d.get("n").unwrap().to_string())
            .collect();
        let expected: Vec<String> = (0..25).map(|i| i.to_string()).collect();
        assert_eq!(flat, expected);
        assert_eq!(publisher.calls(), 7);
    }

    #[test]
    fn empty_input_publishes_nothing() {
        let publisher = Recorder::default();
        let summary = run(&b""[..], &publisher, config(10, 1), None).unwrap();
        assert_eq!(publisher.calls(), 0);
        assert_eq!(summary.documents, 0);
        assert_eq!(summary.batches, 0);
    }

    #[test]
    fn sequence_id_decoration() {
        assert_eq!(with_sequence_id(5, b"x\t9".to_vec()), b"id\t5\tx\t9".to_vec());

        let publisher = Recorder::default();
        let input: &[u8] = b"a\t0\na\t1\na\t2\na\t3\na\t4\nx\t9\n";
        run(input, &publisher, config(4, 1), Some(&with_sequence_id)).unwrap();

        let published = publisher.published();
        assert_eq!(published[0][0], doc(&[("id", "0"), ("a", "0")]));
        assert_eq!(published[1][1], doc(&[("id", "5"), ("x", "9")]));
    }

    #[test]
    fn failed_publish_stops_without_retry() {
        let publisher = Recorder::failing_on(2);
        let input = numbered_input(5);
        let err = run(input.as_bytes(), &publisher, config(2, 1), None).unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Publish {
                batch: 2,
                source: PublishError::Index { status: 500, .. }
            }
        ));
        assert_eq!(err.stage(), Some(Stage::Publishing));
        // First batch stays published, third never attempted
        assert_eq!(publisher.calls(), 2);
        assert_eq!(publisher.published().len(), 1);
    }

    #[test]
    fn parse_error_reports_input_line() {
        let publisher = Recorder::default();
        let input: &[u8] = b"a\t1\nb\t2\nc\t\xff\nd\t4\n";
        let err = run(input, &publisher, config(2, 1), None).unwrap_err();

        match err {
            PipelineError::Parse { line, .. } => assert_eq!(line, 3),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(publisher.published().len(), 1);
    }

    #[test]
    fn read_error_after_partial_batch() {
        let publisher = Recorder::default();
        let lines = vec![
            Ok(b"a\t1".to_vec()),
            Ok(b"b\t2".to_vec()),
            Ok(b"c\t3".to_vec()),
            Err(io::Error::other("stdin closed")),
        ];
        let err = Pipeline::new(&publisher, config(2, 1))
            .run_lines(lines)
            .unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Reading));
        // Lines read before the failure were still published
        assert_eq!(publisher.published().len(), 2);
        assert_eq!(publisher.published()[1], vec![doc(&[("c", "3")])]);
    }

    #[test]
    fn stop_flag_interrupts_before_next_batch() {
        let publisher = Recorder::default();
        let stop = AtomicBool::new(true);
        let input = numbered_input(3);
        let err = Pipeline::new(&publisher, config(2, 1))
            .stop_flag(&stop)
            .run(input.as_bytes())
            .unwrap_err();

        assert!(matches!(err, PipelineError::Interrupted));
        assert_eq!(err.stage(), None);
        assert_eq!(publisher.calls(), 0);
    }

    #[test]
    fn parallel_publishes_every_document() {
        let publisher = Recorder::default();
        let input = numbered_input(100);
        let summary = run(input.as_bytes(), &publisher, config(7, 4), None).unwrap();

        assert_eq!(summary.documents, 100);
        assert_eq!(summary.batches, 15);
        let mut seen: Vec<u64> = publisher
            .published()
            .into_iter()
            .flatten()
            .map(|d| d.get("n").unwrap().parse().unwrap())
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..100u64).collect::<Vec<_>>());
    }

    #[test]
    fn parallel_keeps_batches_intact() {
        let publisher = Recorder::default();
        let input = numbered_input(10);
        run(input.as_bytes(), &publisher, config(3, 3), None).unwrap();

        let mut sizes: Vec<usize> = publisher.published().iter().map(Vec::len).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![1, 3, 3, 3]);
    }

    #[test]
    fn parallel_failure_is_reported() {
        let publisher = Recorder::failing_on(1);
        let input = numbered_input(50);
        let err = run(input.as_bytes(), &publisher, config(5, 2), None).unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Publishing));
        let published: usize = publisher.published().iter().map(Vec::len).sum();
        assert!(published < 50);
    }

    #[test]
    fn parallel_parse_error_is_reported() {
        let publisher = Recorder::default();
        let input: &[u8] = b"a\t1\n\xc3\n";
        let err = run(input, &publisher, config(1, 2), None).unwrap_err();
        assert!(matches!(err, PipelineError::Parse { line: 2, .. }));
    }

    /// Fails every call after a pause, so the queue fills while workers are busy.
    struct SlowFailing {
        calls: AtomicUsize,
    }

    impl Publish for SlowFailing {
        fn publish(&self, _batch: &[Document]) -> Result<(), PublishError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(50));
            Err(PublishError::Transport("unavailable".to_string()))
        }
    }

    #[test]
    fn parallel_reader_blocks_on_full_queue() {
        let publisher = SlowFailing {
            calls: AtomicUsize::new(0),
        };
        let pulled = AtomicUsize::new(0);
        let lines = (0..10_000).map(|i| {
            pulled.fetch_add(1, Ordering::SeqCst);
            Ok(format!("n\t{i}").into_bytes())
        });
        let (chunk, workers) = (10, 2);
        let err = Pipeline::new(&publisher, config(chunk, workers))
            .run_lines(lines)
            .unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Publishing));
        // One batch per busy worker, a full queue, one held by a blocked send
        let pulled = pulled.load(Ordering::SeqCst);
        assert!(pulled <= (2 * workers + 1) * chunk, "pulled {pulled} lines");
        assert!(publisher.calls.load(Ordering::SeqCst) <= workers);
    }

    /// Raises `stop` during its first call.
    struct StopOnFirst<'a> {
        stop: &'a AtomicBool,
        calls: AtomicUsize,
    }

    impl Publish for StopOnFirst<'_> {
        fn publish(&self, _batch: &[Document]) -> Result<(), PublishError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                self.stop.store(true, Ordering::SeqCst);
            }
            std::thread::sleep(Duration::from_millis(20));
            Ok(())
        }
    }

    #[test]
    fn parallel_stop_flag_halts_publishing() {
        let stop = AtomicBool::new(false);
        let publisher = StopOnFirst {
            stop: &stop,
            calls: AtomicUsize::new(0),
        };
        let input = numbered_input(1000);
        let err = Pipeline::new(&publisher, config(10, 2))
            .stop_flag(&stop)
            .run(input.as_bytes())
            .unwrap_err();

        assert!(matches!(err, PipelineError::Interrupted));
        // Only requests already in flight when the flag went up
        assert!(publisher.calls.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn parallel_stop_flag_set_up_front() {
        let publisher = Recorder::default();
        let stop = AtomicBool::new(true);
        let input = numbered_input(100);
        let err = Pipeline::new(&publisher, config(10, 4))
            .stop_flag(&stop)
            .run(input.as_bytes())
            .unwrap_err();

        assert!(matches!(err, PipelineError::Interrupted));
        assert_eq!(publisher.calls(), 0);
    }

    /// Records the bar position seen at the start of each call.
    struct Watcher {
        pb: ProgressBar,
        seen: Mutex<Vec<u64>>,
    }

    impl Publish for Watcher {
        fn publish(&self, _batch: &[Document]) -> Result<(), PublishError> {
            let mut seen = self.seen.lock().unwrap();
            seen.push(self.pb.position());
            Ok(())
        }
    }

    #[test]
    fn progress_position_only_moves_forward() {
        for workers in [1, 8] {
            let pb = ProgressBar::hidden();
            let publisher = Watcher {
                pb: pb.clone(),
                seen: Mutex::new(Vec::new()),
            };
            let input = numbered_input(2000);
            let summary = Pipeline::new(&publisher, config(1, workers))
                .progress(pb.clone())
                .run(input.as_bytes())
                .unwrap();

            assert_eq!(summary.documents, 2000);
            assert_eq!(pb.position(), summary.documents, "workers={workers}");
            let seen = publisher.seen.into_inner().unwrap();
            assert!(
                seen.windows(2).all(|w| w[0] <= w[1]),
                "workers={workers}: position went backwards"
            );
        }
    }

    #[test]
    fn error_display_includes_position() {
        let err = PipelineError::Publish {
            batch: 3,
            source: PublishError::Transport("connection refused".to_string()),
        };
        assert_eq!(err.to_string(), "batch 3: transport error: connection refused");
        assert!(std::error::Error::source(&err).is_some());
    }
}
