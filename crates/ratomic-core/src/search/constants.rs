//! 探索パラメータ
//!
//! 枝刈り・延長・縮小のしきい値とマージンを一箇所に集める。LMRの縮小
//! テーブルはスレッド数に応じて再計算される（ヘルパースレッドは
//! わずかに深く削る）。

use crate::types::{Depth, Value};

/// 探索パラメータ一式
pub struct SearchConstants {
    reductions: [[i32; 64]; 64],
}

impl SearchConstants {
    /// スレッド数に合わせてパラメータを構築
    pub fn new(threads: usize) -> SearchConstants {
        let threads = threads.max(1);
        let base = 0.65 + (threads as f64).ln() / 16.0;

        let mut reductions = [[0i32; 64]; 64];
        for (d, row) in reductions.iter_mut().enumerate().skip(1) {
            for (i, cell) in row.iter_mut().enumerate().skip(1) {
                *cell = (base + (d as f64).ln() * (i as f64).ln() / 2.3) as i32;
            }
        }

        SearchConstants { reductions }
    }

    /// LMRの基本縮小量
    #[inline]
    pub fn reduction(&self, depth: Depth, move_idx: usize) -> i32 {
        let d = depth.clamp(0, 63) as usize;
        let i = move_idx.min(63);
        self.reductions[d][i]
    }

    /// LMRを適用する最小深さ
    pub fn reduce_depth(&self) -> Depth {
        3
    }

    /// History値による追加縮小（負の履歴ほど深く削る）
    pub fn history_reduction(&self, history: i32) -> i32 {
        (-history / 6000).clamp(-1, 2)
    }

    // =========================================================================
    // Razoring
    // =========================================================================

    pub fn razor_depth(&self) -> Depth {
        4
    }

    pub fn razor_margin(&self, depth: Depth) -> Value {
        Value::new(280 * depth)
    }

    // =========================================================================
    // Static null move pruning
    // =========================================================================

    pub fn snmp_depth(&self) -> Depth {
        8
    }

    pub fn snmp_margin(&self, improving: bool, threatened: bool, depth: Depth) -> Value {
        let per_depth = if improving { 55 } else { 75 };
        Value::new(per_depth * depth + if threatened { 40 } else { 0 })
    }

    // =========================================================================
    // Null move pruning
    // =========================================================================

    pub fn nmp_depth(&self) -> Depth {
        2
    }

    pub fn nmp_reduction(&self, depth: Depth, beta: Value, value: Value) -> Depth {
        let eval_term = ((value.raw() - beta.raw()) / 200).clamp(0, 3);
        4 + depth / 6 + eval_term
    }

    pub fn nmp_see_threshold(&self) -> i32 {
        0
    }

    // =========================================================================
    // ProbCut
    // =========================================================================

    pub fn probcut_depth(&self) -> Depth {
        5
    }

    pub fn probcut_search_depth(&self, depth: Depth) -> Depth {
        (depth - 3).max(1)
    }

    pub fn probcut_beta(&self, beta: Value) -> Value {
        beta + 200
    }

    // =========================================================================
    // 浅い深さの枝刈り
    // =========================================================================

    pub fn iir_depth(&self) -> Depth {
        4
    }

    pub fn lmp_depth(&self) -> Depth {
        7
    }

    pub fn lmp_count(&self, improving: bool, depth: Depth) -> usize {
        let d = depth as usize;
        if improving {
            3 + d * d
        } else {
            1 + d * d / 2
        }
    }

    pub fn futility_prune_depth(&self) -> Depth {
        8
    }

    pub fn futility_margin(&self, depth: Depth) -> Value {
        Value::new(90 * depth)
    }

    pub fn quiet_see_prune_depth(&self) -> Depth {
        8
    }

    pub fn quiet_see_prune_threshold(&self, depth: Depth) -> i32 {
        -55 * depth
    }

    pub fn noisy_see_prune_depth(&self) -> Depth {
        6
    }

    pub fn noisy_see_prune_threshold(&self, depth: Depth) -> i32 {
        -110 * depth
    }

    pub fn history_prune_threshold(&self, depth: Depth) -> i32 {
        -2200 * depth
    }

    // =========================================================================
    // Singular extension
    // =========================================================================

    pub fn singular_extension_depth(&self) -> Depth {
        7
    }

    pub fn singular_depth_margin(&self) -> Depth {
        3
    }

    pub fn singular_search_depth(&self, depth: Depth) -> Depth {
        ((depth - 1) / 2).max(1)
    }

    pub fn singular_beta(&self, tt_value: Value, depth: Depth) -> Value {
        tt_value - depth * 2
    }

    pub fn singular_double_margin(&self) -> Value {
        Value::new(220)
    }

    // =========================================================================
    // 静止探索
    // =========================================================================

    pub fn delta_margin(&self) -> Value {
        Value::new(300)
    }

    pub fn good_capture_see_margin(&self) -> i32 {
        100
    }

    pub fn good_capture_score_margin(&self) -> Value {
        Value::new(300)
    }

    // =========================================================================
    // Aspiration window
    // =========================================================================

    pub fn aspiration_depth(&self) -> Depth {
        4
    }

    pub fn aspiration_delta(&self) -> Value {
        Value::new(16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reduction_monotonic() {
        let c = SearchConstants::new(1);
        assert_eq!(c.reduction(0, 5), 0);
        assert!(c.reduction(20, 30) >= c.reduction(4, 4));
        assert!(c.reduction(63, 63) >= c.reduction(10, 10));
    }

    #[test]
    fn test_helper_threads_reduce_more() {
        let single = SearchConstants::new(1);
        let many = SearchConstants::new(16);
        assert!(many.reduction(30, 30) >= single.reduction(30, 30));
    }

    #[test]
    fn test_margins_grow_with_depth() {
        let c = SearchConstants::new(1);
        assert!(c.razor_margin(4) > c.razor_margin(1));
        assert!(c.futility_margin(6) > c.futility_margin(2));
        assert!(c.lmp_count(true, 5) > c.lmp_count(false, 5));
        assert!(c.quiet_see_prune_threshold(8) < c.quiet_see_prune_threshold(1));
    }
}
