//! サンプルライター
//!
//! 1ゲーム分のサンプルブロックをまとめて書く。書き込みはMutexで直列化し、
//! 完了数はアトミックに数える。進捗行はstderrへ
//! `progress <done>/<total> (<pct>%) <rate> samples/s` 形式で出す。

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use super::sample::Sample;

struct WriterState {
    out: BufWriter<File>,
    next_report: u64,
}

/// 並列生成スレッドが共有するサンプルライター
pub struct DataWriter {
    state: Mutex<WriterState>,
    total: u64,
    completed: AtomicU64,
    report_every: u64,
    start_time: Instant,
}

impl DataWriter {
    /// 出力ファイルを作成する
    pub fn new<P: AsRef<Path>>(path: P, total: u64, report_every: u64) -> io::Result<DataWriter> {
        let file = File::create(path)?;
        Ok(DataWriter {
            state: Mutex::new(WriterState {
                out: BufWriter::new(file),
                next_report: if report_every > 0 { report_every } else { u64::MAX },
            }),
            total,
            completed: AtomicU64::new(0),
            report_every,
            start_time: Instant::now(),
        })
    }

    /// 目標数に達したか
    pub fn is_complete(&self) -> bool {
        self.completed.load(Ordering::Relaxed) >= self.total
    }

    /// (完了数, 目標数)
    pub fn progress(&self) -> (u64, u64) {
        (self.completed.load(Ordering::Relaxed), self.total)
    }

    /// 1ゲーム分のサンプルをまとめて書く
    ///
    /// 目標数に達した分は捨てる。書き込み失敗は致命的としてエラーを返す。
    pub fn write_block(&self, block: &[Sample]) -> io::Result<()> {
        let mut state = self.state.lock().expect("writer mutex poisoned");

        for sample in block {
            if self.completed.load(Ordering::Relaxed) >= self.total {
                break;
            }
            sample.write_to(&mut state.out)?;
            self.completed.fetch_add(1, Ordering::Relaxed);
        }

        let completed = self.completed.load(Ordering::Relaxed);
        if self.report_every > 0 && completed >= state.next_report {
            let elapsed = self.start_time.elapsed().as_secs_f64();
            let rate = if elapsed > 0.0 {
                (completed as f64 / elapsed) as u64
            } else {
                0
            };
            let percent = if self.total > 0 {
                completed * 100 / self.total
            } else {
                0
            };
            eprintln!(
                "progress {completed}/{} ({percent}%) {rate} samples/s",
                self.total
            );
            state.next_report = (completed / self.report_every + 1) * self.report_every;
        }

        Ok(())
    }

    /// バッファをフラッシュして閉じる
    pub fn finish(&self) -> io::Result<()> {
        let mut state = self.state.lock().expect("writer mutex poisoned");
        state.out.flush()
    }
}
