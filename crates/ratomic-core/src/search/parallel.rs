//! Lazy SMP並列探索
//!
//! 各スレッドが独立に反復深化を回し、置換表と停止フラグだけを共有する。
//! ヘルパースレッドの結果は捨て、メインスレッド（thread 0）の結果を
//! 採用する。時間制限はタイマースレッドが停止フラグを立てて実現する。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crate::position::{BoardHistory, Position};
use crate::tt::TranspositionTable;

use super::alpha_beta::{SearchLimits, SearchResult, SearchWorker};
use super::constants::SearchConstants;
use super::tablebase::WdlProbe;

/// 並列探索ドライバ
pub struct ParallelSearcher {
    tt: Arc<TranspositionTable>,
    constants: Arc<SearchConstants>,
    tb: Option<Arc<dyn WdlProbe>>,
    stop: Arc<AtomicBool>,
    num_threads: usize,
}

impl ParallelSearcher {
    /// 新しいドライバを作成
    pub fn new(num_threads: usize, tt_mb: usize) -> ParallelSearcher {
        let num_threads = num_threads.max(1);
        ParallelSearcher {
            tt: Arc::new(TranspositionTable::new(tt_mb)),
            constants: Arc::new(SearchConstants::new(num_threads)),
            tb: None,
            stop: Arc::new(AtomicBool::new(false)),
            num_threads,
        }
    }

    /// テーブルベースのオラクルを設定
    pub fn set_tablebase(&mut self, tb: Option<Arc<dyn WdlProbe>>) {
        self.tb = tb;
    }

    /// 共有置換表
    pub fn tt(&self) -> Arc<TranspositionTable> {
        self.tt.clone()
    }

    /// 探索を外部から停止する
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// 全スレッドで探索し、メインスレッドの結果を返す
    pub fn search(
        &self,
        history: &BoardHistory,
        root: Position,
        limits: SearchLimits,
    ) -> SearchResult {
        self.stop.store(false, Ordering::Relaxed);

        // 時間制限はタイマースレッドが停止フラグで伝える
        if let Some(max_time) = limits.max_time {
            let stop = self.stop.clone();
            thread::spawn(move || {
                thread::sleep(max_time);
                stop.store(true, Ordering::Relaxed);
            });
        }

        thread::scope(|scope| {
            let mut helpers = Vec::with_capacity(self.num_threads - 1);

            for thread_id in 1..self.num_threads {
                let tt = self.tt.clone();
                let constants = self.constants.clone();
                let tb = self.tb.clone();
                let stop = self.stop.clone();
                let history = history.clone();
                let helper_limits = SearchLimits {
                    // ノード・深さ上限はメインスレッドが停止フラグで伝える
                    max_depth: None,
                    max_nodes: None,
                    max_time: None,
                };

                helpers.push(scope.spawn(move || {
                    let mut worker = SearchWorker::new(tt, constants, thread_id);
                    worker.set_stop_handle(stop);
                    worker.set_tablebase(tb);
                    worker.go(&history, root, helper_limits);
                    worker.node_count()
                }));
            }

            let mut main = SearchWorker::new(self.tt.clone(), self.constants.clone(), 0);
            main.set_stop_handle(self.stop.clone());
            main.set_tablebase(self.tb.clone());
            let mut result = main.go(history, root, limits);

            // メインが抜けたらヘルパーも止める
            self.stop.store(true, Ordering::Relaxed);
            for handle in helpers {
                if let Ok(nodes) = handle.join() {
                    result.nodes += nodes;
                }
            }
            result
        })
    }
}
