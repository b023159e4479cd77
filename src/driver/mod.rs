//! 多线程批处理驱动。
//!
//! 各 worker 轮流在读锁下取至多 `batch_size` 行，放锁后映射，再在写锁下整批追加结果行。
//! 第一个致命错误会取消整个运行并返回给调用方。

pub mod output;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use crate::error::{MapError, Result};
use crate::io::lines::{LineReader, LineWriter};
use crate::mapper::{PeptideMapper, ProteinMapping, TagParams};
use crate::policy::MatchingPolicy;
use crate::query::{parse_peptide_line, parse_tag_line};

pub use output::RowLayout;

/// 与调用方共享的取消与进度信号。
pub trait WaitingHandler: Send + Sync {
    fn is_canceled(&self) -> bool;
    fn cancel(&self);
    fn increase_progress(&self);
}

/// 基于原子变量的默认实现。
#[derive(Debug, Default)]
pub struct AtomicWaitingHandler {
    canceled: AtomicBool,
    progress: AtomicUsize,
}

impl AtomicWaitingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn progress(&self) -> usize {
        self.progress.load(Ordering::Relaxed)
    }
}

impl WaitingHandler for AtomicWaitingHandler {
    fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Relaxed)
    }

    fn cancel(&self) {
        self.canceled.store(true, Ordering::Relaxed);
    }

    fn increase_progress(&self) {
        self.progress.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum QueryMode {
    /// One peptide sequence per line.
    #[default]
    Peptide,
    /// Comma-separated residue runs and mass gaps per line.
    Tag,
}

#[derive(Debug, Clone)]
pub struct DriverOptions {
    pub mode: QueryMode,
    pub batch_size: usize,
    pub flanking: bool,
    pub fail_on_overflow: bool,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            mode: QueryMode::Peptide,
            batch_size: 1000,
            flanking: false,
            fail_on_overflow: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// 已处理的非空查询行
    pub queries: usize,
    /// 至少有一个映射的查询
    pub mapped: usize,
    pub rows: usize,
    /// 因 `AmbiguityOverflow` 跳过的查询
    pub overflowed: usize,
    /// 因取消而停止，而不是读到输入末尾
    pub canceled: bool,
}

/// 读游标：互斥锁保护，同一批次只属于一个 worker。
struct Cursor<R> {
    reader: R,
    line_no: usize,
    exhausted: bool,
}

pub struct BatchDriver<'a, M: PeptideMapper + ?Sized, R: LineReader, W: LineWriter> {
    mapper: &'a M,
    policy: MatchingPolicy,
    tag_params: TagParams,
    options: DriverOptions,
    layout: RowLayout,
    handler: &'a dyn WaitingHandler,
    cursor: Mutex<Cursor<R>>,
    writer: Mutex<W>,
    first_error: Mutex<Option<MapError>>,
    queries: AtomicUsize,
    mapped: AtomicUsize,
    rows: AtomicUsize,
    overflowed: AtomicUsize,
}

impl<'a, M, R, W> BatchDriver<'a, M, R, W>
where
    M: PeptideMapper + ?Sized,
    R: LineReader,
    W: LineWriter,
{
    pub fn new(
        mapper: &'a M,
        policy: MatchingPolicy,
        tag_params: TagParams,
        options: DriverOptions,
        handler: &'a dyn WaitingHandler,
        reader: R,
        writer: W,
    ) -> Self {
        let layout = RowLayout {
            flanking: options.flanking,
            modifications: options.mode == QueryMode::Tag && !tag_params.variable_modifications.is_empty(),
        };
        Self {
            mapper,
            policy,
            tag_params,
            options: DriverOptions {
                batch_size: options.batch_size.max(1),
                ..options
            },
            layout,
            handler,
            cursor: Mutex::new(Cursor { reader, line_no: 0, exhausted: false }),
            writer: Mutex::new(writer),
            first_error: Mutex::new(None),
            queries: AtomicUsize::new(0),
            mapped: AtomicUsize::new(0),
            rows: AtomicUsize::new(0),
            overflowed: AtomicUsize::new(0),
        }
    }

    /// 运行 `threads` 个 worker 直到结束。返回第一个致命错误；之前写出的行保留。
    pub fn run(&self, threads: usize) -> Result<RunSummary> {
        let threads = threads.max(1);
        let started = Instant::now();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("mapper-{}", i))
            .build()
            .map_err(|e| MapError::Config(format!("cannot start worker pool: {}", e)))?;

        pool.scope(|s| {
            for id in 0..threads {
                s.spawn(move |_| self.worker(id));
            }
        });

        let flushed = lock(&self.writer).flush();
        if let Some(err) = lock(&self.first_error).take() {
            log::error!("run aborted: {}", err);
            return Err(err);
        }
        flushed?;

        let summary = RunSummary {
            queries: self.queries.load(Ordering::Relaxed),
            mapped: self.mapped.load(Ordering::Relaxed),
            rows: self.rows.load(Ordering::Relaxed),
            overflowed: self.overflowed.load(Ordering::Relaxed),
            canceled: self.handler.is_canceled(),
        };
        log::info!(
            "mapped {}/{} queries, {} rows, {} overflowed{} in {:.2?}",
            summary.mapped,
            summary.queries,
            summary.rows,
            summary.overflowed,
            if summary.canceled { " (canceled)" } else { "" },
            started.elapsed()
        );
        Ok(summary)
    }

    pub fn into_writer(self) -> W {
        self.writer.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn worker(&self, id: usize) {
        let mut batches = 0usize;
        loop {
            // 读取
            if self.handler.is_canceled() {
                break;
            }
            let batch = self.read_batch();
            if batch.is_empty() {
                break;
            }

            // 映射
            let mut rows = Vec::new();
            let mut failure = None;
            for (line_no, line) in batch {
                if self.handler.is_canceled() {
                    log::debug!("worker {} dropping batch after cancellation", id);
                    return;
                }
                if let Err(e) = line.and_then(|line| self.process(line_no, &line, &mut rows)) {
                    failure = Some(e);
                    break;
                }
                self.handler.increase_progress();
            }

            // 写出：出错行之前的结果照常写出
            if let Err(e) = self.write_rows(&rows) {
                self.fail(e);
                break;
            }
            if let Some(e) = failure {
                self.fail(e);
                break;
            }
            batches += 1;
        }
        log::debug!("worker {} finished after {} batches", id, batches);
    }

    /// 读错误作为批次的最后一项返回，之前读到的行不丢弃。
    fn read_batch(&self) -> Vec<(usize, Result<String>)> {
        let mut cursor = lock(&self.cursor);
        let mut batch = Vec::with_capacity(self.options.batch_size);
        while !cursor.exhausted && batch.len() < self.options.batch_size {
            match cursor.reader.read_line() {
                Ok(Some(line)) => {
                    cursor.line_no += 1;
                    batch.push((cursor.line_no, Ok(line)));
                }
                Ok(None) => cursor.exhausted = true,
                Err(e) => {
                    cursor.line_no += 1;
                    cursor.exhausted = true;
                    batch.push((cursor.line_no, Err(e)));
                }
            }
        }
        batch
    }

    fn process(&self, line_no: usize, line: &str, rows: &mut Vec<String>) -> Result<()> {
        let corpus = self.mapper.corpus();
        let (tag_text, result) = match self.options.mode {
            QueryMode::Peptide => match parse_peptide_line(line, line_no)? {
                Some(peptide) => (None, self.mapper.map_peptide(&peptide, &self.policy)),
                None => return Ok(()),
            },
            QueryMode::Tag => match parse_tag_line(line, line_no)? {
                Some(tag) => (Some(line.trim()), self.mapper.map_tag(&tag, &self.policy, &self.tag_params)),
                None => return Ok(()),
            },
        };
        self.queries.fetch_add(1, Ordering::Relaxed);

        let hits: Vec<ProteinMapping> = match result {
            Ok(hits) => hits,
            Err(e) if !e.is_fatal() && !self.options.fail_on_overflow => {
                log::warn!("line {}: {}", line_no, e);
                self.overflowed.fetch_add(1, Ordering::Relaxed);
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        if !hits.is_empty() {
            self.mapped.fetch_add(1, Ordering::Relaxed);
        }
        rows.extend(hits.iter().map(|m| self.layout.format(tag_text, m, corpus)));
        Ok(())
    }

    fn write_rows(&self, rows: &[String]) -> Result<()> {
        let mut writer = lock(&self.writer);
        for row in rows {
            writer.write_line(row)?;
        }
        self.rows.fetch_add(rows.len(), Ordering::Relaxed);
        Ok(())
    }

    /// 记录第一个致命错误并取消整个运行；之后的错误只记日志。
    fn fail(&self, err: MapError) {
        self.handler.cancel();
        let mut slot = lock(&self.first_error);
        if slot.is_none() {
            *slot = Some(err);
        } else {
            log::debug!("ignoring error after cancellation: {}", err);
        }
    }
}

/// 锁中毒时沿用内部数据。
fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
