//! 既存データセットの再スコアリング
//!
//! 入力の.binをストリーミングで読み、各局面を新しい設定で探索（または
//! テーブルベース照会）してスコアを付け直す。入出力の順序は保たれない
//! （スレッドが読んだ順に書く）。

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

use anyhow::{Context, Result};

use ratomic_core::position::BoardHistory;
use ratomic_core::search::{SearchConstants, SearchLimits, SearchWorker, Wdl, WdlProbe};
use ratomic_core::tt::TranspositionTable;
use ratomic_core::types::{Depth, Value};

use super::sample::{read_sample, GameResult, Sample};

/// 再スコアリングのモード
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RescoreMode {
    /// 常に探索でスコアを付け直す
    Search,
    /// テーブルベースのみ（確定しない局面はそのまま）
    Tb,
    /// テーブルベース優先、外れたら探索
    TbOrSearch,
}

/// 再スコアリングの設定
pub struct RescoreConfig {
    pub in_path: PathBuf,
    pub out_path: PathBuf,
    pub mode: RescoreMode,
    pub nodes: u64,
    pub depth: Depth,
    pub threads: usize,
    pub progress_every: u64,
    pub tb_pieces: usize,
}

/// 入力ストリーム（スレッド間で直列に読む）
struct SampleStream {
    reader: Mutex<BufReader<File>>,
}

impl SampleStream {
    fn next(&self) -> Option<Sample> {
        let mut reader = self.reader.lock().expect("stream mutex poisoned");
        read_sample(&mut *reader)
    }
}

/// 出力側（進捗報告込み）
struct RescoreWriter {
    out: Mutex<BufWriter<File>>,
    completed: AtomicU64,
    report_every: u64,
    next_report: AtomicU64,
    start_time: Instant,
}

impl RescoreWriter {
    fn write(&self, sample: &Sample) -> io::Result<()> {
        let mut out = self.out.lock().expect("writer mutex poisoned");
        sample.write_to(&mut *out)?;
        let completed = self.completed.fetch_add(1, Ordering::Relaxed) + 1;

        if self.report_every > 0 && completed >= self.next_report.load(Ordering::Relaxed) {
            let elapsed = self.start_time.elapsed().as_secs_f64();
            let rate = if elapsed > 0.0 {
                (completed as f64 / elapsed) as u64
            } else {
                0
            };
            eprintln!("progress {completed} samples {rate} samples/s");
            self.next_report.store(
                (completed / self.report_every + 1) * self.report_every,
                Ordering::Relaxed,
            );
        }
        Ok(())
    }
}

/// テーブルベースディレクトリからWDLオラクルをロードする
///
/// プローブ実装は外部バックエンドの責務で、このクレートはロードの口だけを
/// 提供する。ディレクトリ検証を通ってもバックエンドがリンクされていなければ
/// エラーを返す（実行時エラーであり、引数エラーではない）。
pub fn load_tablebase<P: AsRef<Path>>(path: P) -> Result<Arc<dyn WdlProbe>> {
    let path = path.as_ref();
    let meta = std::fs::metadata(path)
        .with_context(|| format!("unable to open TB path: {}", path.display()))?;
    if !meta.is_dir() {
        anyhow::bail!("TB path is not a directory: {}", path.display());
    }
    anyhow::bail!(
        "no WDL probe backend is linked into this build (TB path: {})",
        path.display()
    );
}

/// 再スコアリングを実行する
///
/// `tb` はWDLオラクル（`load_tablebase` などで得る。なければNone）。
pub fn run_rescore(config: &RescoreConfig, tb: Option<Arc<dyn WdlProbe>>) -> Result<()> {
    let in_file = File::open(&config.in_path)
        .with_context(|| format!("unable to open input bin: {}", config.in_path.display()))?;
    let out_file = File::create(&config.out_path)
        .with_context(|| format!("unable to create output bin: {}", config.out_path.display()))?;

    let stream = SampleStream {
        reader: Mutex::new(BufReader::new(in_file)),
    };
    let writer = RescoreWriter {
        out: Mutex::new(BufWriter::new(out_file)),
        completed: AtomicU64::new(0),
        report_every: config.progress_every,
        next_report: AtomicU64::new(config.progress_every.max(1)),
        start_time: Instant::now(),
    };

    let threads = config.threads.max(1);
    let tt = Arc::new(TranspositionTable::new(128));
    let constants = Arc::new(SearchConstants::new(threads));
    let allow_search = config.mode != RescoreMode::Tb;
    let failed = AtomicBool::new(false);

    let limits = SearchLimits {
        max_depth: if config.depth > 0 {
            Some(config.depth)
        } else {
            None
        },
        max_nodes: if config.nodes > 0 {
            Some(config.nodes)
        } else {
            None
        },
        max_time: None,
    };

    thread::scope(|scope| {
        for _ in 0..threads {
            let stream = &stream;
            let writer = &writer;
            let failed = &failed;
            let tt = tt.clone();
            let constants = constants.clone();
            let tb = tb.clone();

            scope.spawn(move || {
                let mut worker = SearchWorker::new(tt, constants, 0);
                let history = BoardHistory::new();

                while let Some(mut sample) = stream.next() {
                    if failed.load(Ordering::Relaxed) {
                        return;
                    }

                    let tb_used = apply_tb(&mut sample, tb.as_deref(), config.tb_pieces);
                    if !tb_used && allow_search {
                        worker.new_game();
                        let result = worker.go(&history, sample.position, limits);
                        sample.score = result.score;
                    }

                    if let Err(err) = writer.write(&sample) {
                        log::error!("rescore write failed: {err}");
                        failed.store(true, Ordering::Relaxed);
                        return;
                    }
                }
            });
        }
    });

    writer
        .out
        .lock()
        .expect("writer mutex poisoned")
        .flush()
        .context("flush failed")?;

    if failed.load(Ordering::Relaxed) {
        anyhow::bail!("a rescore thread aborted on write failure");
    }
    Ok(())
}

/// テーブルベースで確定したらスコアと結果を書き換える
fn apply_tb(sample: &mut Sample, tb: Option<&dyn WdlProbe>, tb_pieces: usize) -> bool {
    let tb = match tb {
        Some(tb) => tb,
        None => return false,
    };
    if sample.position.num_pieces() > tb_pieces {
        return false;
    }
    match tb.probe_wdl(&sample.position) {
        Some(Wdl::Win) => {
            sample.result = GameResult::Win;
            sample.score = Value::mate_in(2);
            true
        }
        Some(Wdl::Loss) => {
            sample.result = GameResult::Loss;
            sample.score = Value::mated_in(2);
            true
        }
        Some(Wdl::Draw) => {
            sample.result = GameResult::Draw;
            sample.score = Value::DRAW;
            true
        }
        None => false,
    }
}
