//! 探索モジュール
//!
//! Alpha-Beta探索（PVS）+ アトミック特化の静止探索。
//! - 反復深化 + aspiration window
//! - 枝刈り: razoring / SNMP / NMP / ProbCut / futility / LMP / SEE / history
//! - 延長: singular extension（multicut・negative extension付き）
//! - LMR（深さ×手番号の対数テーブル + 文脈補正）
//! - History: butterfly + 継続文脈 + 駒取り + 静的評価補正
//! - Lazy SMPによる並列化（置換表と停止フラグのみ共有）

mod alpha_beta;
mod constants;
mod eval_cache;
mod history;
mod movepicker;
mod parallel;
mod pruning;
mod qsearch;
mod tablebase;

#[cfg(test)]
mod tests;

pub use alpha_beta::{SearchLimits, SearchResult, SearchWorker};
pub use constants::SearchConstants;
pub use eval_cache::EvalCache;
pub use history::{stat_bonus, stat_malus, HistoryTables, PrevMove, StatsEntry};
pub use movepicker::{piece_value, MovePicker};
pub use parallel::ParallelSearcher;
pub use tablebase::{Wdl, WdlProbe};

use crate::types::Value;

/// NNUE出力（センチポーン）から探索内部スケールへの換算分子
pub const NNUE_SCALE_NUMERATOR: i32 = 1024;

/// NNUE出力から探索内部スケールへの換算分母
pub const NNUE_SCALE_DENOMINATOR: i32 = 288;

/// NNUE出力を探索内部スケールへ換算する
#[inline]
pub fn scale_nnue_score(raw: i32) -> Value {
    Value::new(raw * NNUE_SCALE_NUMERATOR / NNUE_SCALE_DENOMINATOR)
}

/// 引き分けスコアの揺らぎ（千日手盲点を避けるため±1させる）
#[inline]
pub(crate) fn draw_jitter(nodes: u64) -> i32 {
    ((nodes & 2) as i32) - 1
}
