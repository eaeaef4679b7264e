//! 自己対局によるデータ生成
//!
//! スレッドごとの流れ:
//!
//! 1. シード局面を取得（EPDストリーム → シードリスト → 平手）
//! 2. `random_ply` 手のランダム序盤（合法手から一様に選ぶ）
//! 3. 固定深さ/ノードの探索で1手ずつ進め、フィルタを通った局面を
//!    ゲームバッファへ積む
//! 4. 終局（キング消滅・千日手・50手・手数上限・評価打ち切り）で
//!    WDLを決め、各サンプルへ手番視点で刻印
//! 5. ライターのロック内でブロックごと書き出す
//!
//! スレッドごとのRNGは `seed ^ (0x9E3779B97F4A7C15 * (i+1))` で分離する。

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use rand::prelude::IndexedRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha12Rng;

use ratomic_core::movegen::{generate_moves, GenMode};
use ratomic_core::position::{BoardHistory, Position};
use ratomic_core::search::{SearchConstants, SearchLimits, SearchWorker};
use ratomic_core::tt::TranspositionTable;
use ratomic_core::types::{Color, Depth, Value};

use super::dedup::DedupCache;
use super::sample::{GameResult, Sample};
use super::seeds::SeedProvider;
use super::writer::DataWriter;

/// フィルタプリセット
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterPreset {
    /// 合法・非終端・非即詰みのみ要求
    Minimal,
    /// Minimal + 重複排除 + 確率的なコンタクト局面要求
    Balanced,
    /// Minimal + 重複排除 + 静的評価と静止探索値の一致を要求
    Quiet,
}

/// スレッドRNGの分離用乗数
const SEED_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

/// 自己対局データ生成器
pub struct DataGenerator {
    concurrency: usize,
    ply_limit: i32,
    random_ply_min: i32,
    random_ply_max: i32,
    fixed_depth: Depth,
    fixed_nodes: u64,
    eval_limit: i32,
    min_pieces: usize,
    require_capture_prob: f64,
    filter: FilterPreset,
    quiet_filter_enabled: bool,
    allow_mate_in_one: bool,
    seed: u64,
    tt: Arc<TranspositionTable>,
    constants: Arc<SearchConstants>,
    dedup: Option<Arc<DedupCache>>,
    seed_provider: Option<Arc<dyn SeedProvider>>,
    seeds: Vec<Position>,
    writer: DataWriter,
}

impl DataGenerator {
    /// 出力先・目標サンプル数・置換表サイズを指定して作成
    pub fn new<P: AsRef<Path>>(
        path: P,
        total: u64,
        tt_mb: usize,
        progress_every: u64,
    ) -> io::Result<DataGenerator> {
        Ok(DataGenerator {
            concurrency: 1,
            ply_limit: 256,
            random_ply_min: 8,
            random_ply_max: 16,
            fixed_depth: 6,
            fixed_nodes: 5120,
            eval_limit: 6144,
            min_pieces: 0,
            require_capture_prob: 0.0,
            filter: FilterPreset::Balanced,
            quiet_filter_enabled: true,
            allow_mate_in_one: false,
            seed: 1,
            tt: Arc::new(TranspositionTable::new(tt_mb)),
            constants: Arc::new(SearchConstants::new(1)),
            dedup: None,
            seed_provider: None,
            seeds: Vec::new(),
            writer: DataWriter::new(path, total, progress_every)?,
        })
    }

    pub fn set_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self.constants = Arc::new(SearchConstants::new(self.concurrency));
        self
    }

    pub fn set_ply_limit(mut self, ply_limit: i32) -> Self {
        self.ply_limit = ply_limit;
        self
    }

    pub fn set_random_ply_range(mut self, min_ply: i32, max_ply: i32) -> Self {
        self.random_ply_min = min_ply.max(0);
        self.random_ply_max = max_ply.max(self.random_ply_min);
        self
    }

    pub fn set_fixed_depth(mut self, depth: Depth) -> Self {
        self.fixed_depth = depth;
        self
    }

    pub fn set_fixed_nodes(mut self, nodes: u64) -> Self {
        self.fixed_nodes = nodes;
        self
    }

    pub fn set_eval_limit(mut self, limit: i32) -> Self {
        self.eval_limit = limit.abs();
        self
    }

    pub fn set_min_pieces(mut self, min_pieces: usize) -> Self {
        self.min_pieces = min_pieces;
        self
    }

    pub fn set_require_capture_prob(mut self, prob: f64) -> Self {
        self.require_capture_prob = prob.clamp(0.0, 1.0);
        self
    }

    pub fn set_filter(mut self, filter: FilterPreset) -> Self {
        self.filter = filter;
        self
    }

    pub fn set_quiet_filter_enabled(mut self, enabled: bool) -> Self {
        self.quiet_filter_enabled = enabled;
        self
    }

    pub fn set_allow_mate_in_one(mut self, allow: bool) -> Self {
        self.allow_mate_in_one = allow;
        self
    }

    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn set_dedup_capacity(mut self, capacity: usize) -> Self {
        self.dedup = if capacity == 0 {
            None
        } else {
            Some(Arc::new(DedupCache::new(capacity)))
        };
        self
    }

    pub fn set_seed_provider(mut self, provider: Option<Arc<dyn SeedProvider>>) -> Self {
        self.seed_provider = provider;
        self
    }

    pub fn set_seeds(mut self, seeds: Vec<Position>) -> Self {
        self.seeds = seeds;
        self
    }

    /// 生成を実行する（目標数に達するまでブロックする）
    pub fn generate_data(&self) -> io::Result<()> {
        let failed = AtomicBool::new(false);

        thread::scope(|scope| {
            for thread_idx in 0..self.concurrency {
                let failed = &failed;
                scope.spawn(move || {
                    if let Err(err) = self.run_thread(thread_idx) {
                        log::error!("datagen thread {thread_idx} failed: {err}");
                        failed.store(true, Ordering::Relaxed);
                    }
                });
            }
        });

        self.writer.finish()?;
        if failed.load(Ordering::Relaxed) {
            return Err(io::Error::other("a generator thread aborted on write failure"));
        }
        Ok(())
    }

    fn run_thread(&self, thread_idx: usize) -> io::Result<()> {
        let mix = SEED_MIX.wrapping_mul(thread_idx as u64 + 1);
        let mut rng = ChaCha12Rng::seed_from_u64(self.seed ^ mix);

        let mut worker = SearchWorker::new(self.tt.clone(), self.constants.clone(), 0);
        let limits = SearchLimits {
            max_depth: Some(self.fixed_depth),
            max_nodes: Some(self.fixed_nodes),
            max_time: None,
        };

        while !self.writer.is_complete() {
            worker.new_game();

            let mut block: Vec<Sample> = Vec::new();
            let mut hist = BoardHistory::new();
            let mut state = self.next_seed(&mut rng);

            let lo = self.random_ply_min.min(self.ply_limit);
            let hi = self.random_ply_max.min(self.ply_limit).max(lo);
            let random_ply = if lo == hi { lo } else { rng.random_range(lo..=hi) };

            let (game_result, final_stm) =
                self.play_game(&mut worker, &mut rng, &mut hist, &mut state, random_ply, &mut block, &limits);

            for sample in block.iter_mut() {
                sample.result = game_result.relative(final_stm, sample.pov());
            }

            self.writer.write_block(&block)?;
        }
        Ok(())
    }

    fn next_seed(&self, rng: &mut ChaCha12Rng) -> Position {
        if let Some(provider) = &self.seed_provider {
            if let Some(pos) = provider.next() {
                return pos;
            }
        }
        if let Some(pos) = self.seeds.choose(rng) {
            return *pos;
        }
        Position::startpos()
    }

    /// 1ゲームを進め、(結果, 終局時の手番) を返す
    #[allow(clippy::too_many_arguments)]
    fn play_game(
        &self,
        worker: &mut SearchWorker,
        rng: &mut ChaCha12Rng,
        hist: &mut BoardHistory,
        state: &mut Position,
        random_ply: i32,
        block: &mut Vec<Sample>,
        limits: &SearchLimits,
    ) -> (GameResult, Color) {
        for ply in 0..=self.ply_limit {
            if is_terminal(hist, state) {
                break;
            }

            // ランダム序盤
            if ply < random_ply {
                let moves = generate_moves(state, GenMode::ALL);
                if moves.is_empty() {
                    break;
                }
                let idx = rng.random_range(0..moves.len());
                hist.push(state.sided_key());
                *state = state.apply(moves.at(idx));
                continue;
            }

            let result = worker.go(hist, *state, *limits);
            let best_move = result.best_move;
            let best_score = result.score;

            if best_move.is_null() {
                break;
            }

            // 評価値による早期打ち切り（アジュディケーション）
            if best_score.raw() >= self.eval_limit {
                return (GameResult::Win, state.side_to_move());
            }
            if best_score.raw() <= -self.eval_limit {
                return (GameResult::Loss, state.side_to_move());
            }

            if let Some(sample) = self.filter_position(worker, rng, hist, state, best_score) {
                block.push(sample);
            }

            hist.push(state.sided_key());
            *state = state.apply(best_move);
        }

        (get_result(hist, state), state.side_to_move())
    }

    /// フィルタを適用し、受理ならサンプルを返す
    fn filter_position(
        &self,
        worker: &mut SearchWorker,
        rng: &mut ChaCha12Rng,
        hist: &BoardHistory,
        state: &Position,
        best_score: Value,
    ) -> Option<Sample> {
        if !state.has_both_kings() {
            return None;
        }
        if self.min_pieces > 0 && state.num_pieces() < self.min_pieces {
            return None;
        }

        let captures = generate_moves(state, GenMode::NOISY);
        let mate_in_one = captures.iter().any(|mv| state.is_blast_mate(*mv));
        if mate_in_one && !self.allow_mate_in_one {
            return None;
        }

        let direct_check = state.is_check();
        let atomic_check = state.in_blast_check();

        // Balanced: 確率pでコンタクト局面（王手・爆発王手・駒取りあり）を要求
        let contact = direct_check || atomic_check || !captures.is_empty();
        let require_contact =
            self.require_capture_prob > 0.0 && rng.random::<f64>() < self.require_capture_prob;
        if require_contact && !contact {
            return None;
        }

        // Quiet: 静的評価と静止探索値が一致する静かな局面のみ
        if self.filter == FilterPreset::Quiet && self.quiet_filter_enabled {
            if direct_check || atomic_check {
                return None;
            }
            let static_eval = worker.filter_eval(state);
            let q_eval = worker.quiesce_value(hist, state);
            if static_eval != q_eval {
                return None;
            }
        }

        if let Some(dedup) = &self.dedup {
            if !dedup.accept(state.hash()) {
                return None;
            }
        }

        Some(Sample::new(*state, best_score))
    }
}

/// 終局判定
fn is_terminal(hist: &BoardHistory, state: &Position) -> bool {
    if hist.contains(state.sided_key()) {
        return true;
    }
    if !state.has_both_kings() {
        return true;
    }
    if state.is_rule50_draw() {
        return true;
    }
    generate_moves(state, GenMode::ALL).is_empty()
}

/// 終局局面の結果（手番視点）
fn get_result(hist: &BoardHistory, state: &Position) -> GameResult {
    if hist.contains(state.sided_key()) {
        return GameResult::Draw;
    }
    let us = state.side_to_move();
    if state.us(us).king().is_empty() {
        return GameResult::Loss;
    }
    if state.them(us).king().is_empty() {
        return GameResult::Win;
    }
    if state.is_rule50_draw() {
        return GameResult::Draw;
    }
    if generate_moves(state, GenMode::ALL).is_empty() {
        // 王手（直接・爆発とも）されたまま指せなければ負け、そうでなければステイルメイト
        if state.is_check() || state.in_blast_check() {
            return GameResult::Loss;
        }
        return GameResult::Draw;
    }
    GameResult::Draw
}
