//! Alpha-Beta探索の実装
//!
//! - Principal Variation Search（negamax、ゼロ窓再探索付き）
//! - 反復深化 + aspiration window
//! - アトミック固有の終端: キング消滅の即判定、即詰み駒取りの短絡
//!
//! ワーカーは対局全体で再利用される。History統計は `new_game` でクリアし、
//! `go` では保持する。置換表と停止フラグは全ワーカーで共有する。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::movegen::{generate_moves, is_legal, GenMode};
use crate::nnue::{build_updates, get_network, AccumulatorStack};
use crate::position::{BoardHistory, Position};
use crate::tt::{Bound, TTData, TranspositionTable};
use crate::types::{Color, Depth, Move, PieceType, Value, MAX_PLY};

use super::eval_cache::EvalCache;
use super::history::{stat_bonus, stat_malus, HistoryTables, PrevMove};
use super::movepicker::MovePicker;
use super::tablebase::{Wdl, WdlProbe};
use super::{draw_jitter, scale_nnue_score, SearchConstants};

/// 探索の打ち切り条件
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchLimits {
    /// 完了した反復の最大深さ
    pub max_depth: Option<Depth>,
    /// このワーカーの最大ノード数
    pub max_nodes: Option<u64>,
    /// 実時間の上限
    pub max_time: Option<Duration>,
}

/// 探索結果
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchResult {
    pub best_move: Move,
    pub ponder_move: Move,
    pub score: Value,
    pub depth: Depth,
    pub nodes: u64,
}

/// 探索スタックの1エントリ
#[derive(Clone, Copy)]
pub(super) struct StackEntry {
    pub(super) killer: Move,
    pub(super) excluded: Move,
    pub(super) static_eval: Value,
    /// このplyで指された手（ナル手はNone）
    pub(super) prev: Option<PrevMove>,
}

impl StackEntry {
    fn fresh() -> StackEntry {
        StackEntry {
            killer: Move::NULL,
            excluded: Move::NULL,
            static_eval: Value::NONE,
            prev: None,
        }
    }
}

/// 停止フラグの確認間隔（ノード数）
const ABORT_CHECK_INTERVAL: i32 = 1024;

/// 探索ワーカー
///
/// 1スレッドが1ワーカーを専有する。置換表（`Arc`）と停止フラグだけを
/// 他スレッドと共有し、History・評価キャッシュ・NNUEスタックは専有する。
pub struct SearchWorker {
    pub(super) tt: Arc<TranspositionTable>,
    pub(super) constants: Arc<SearchConstants>,
    pub(super) tb: Option<Arc<dyn WdlProbe>>,
    pub(super) nnue: AccumulatorStack,
    pub(super) history: Box<HistoryTables>,
    pub(super) eval_cache: EvalCache,
    pub(super) stack: Vec<StackEntry>,
    /// ルートまでの局面履歴 + 探索経路（千日手検出用）
    pub(super) path: BoardHistory,
    pub(super) nodes: u64,
    pub(super) stop: Arc<AtomicBool>,
    pub(super) abort: bool,
    calls_cnt: i32,
    start: Instant,
    limits: SearchLimits,
    /// 現在の反復でのルート最善手候補
    root_candidate: Move,
    root_score: Value,
    thread_id: usize,
}

impl SearchWorker {
    /// 新しいワーカーを作成
    pub fn new(
        tt: Arc<TranspositionTable>,
        constants: Arc<SearchConstants>,
        thread_id: usize,
    ) -> SearchWorker {
        SearchWorker {
            tt,
            constants,
            tb: None,
            nnue: AccumulatorStack::new(get_network()),
            history: HistoryTables::new(),
            eval_cache: EvalCache::new(),
            stack: vec![StackEntry::fresh(); MAX_PLY as usize + 8],
            path: BoardHistory::new(),
            nodes: 0,
            stop: Arc::new(AtomicBool::new(false)),
            abort: false,
            calls_cnt: 0,
            start: Instant::now(),
            limits: SearchLimits::default(),
            root_candidate: Move::NULL,
            root_score: Value::NONE,
            thread_id,
        }
    }

    /// テーブルベースのオラクルを設定
    pub fn set_tablebase(&mut self, tb: Option<Arc<dyn WdlProbe>>) {
        self.tb = tb;
    }

    /// 共有停止フラグを差し替える（並列探索用）
    pub fn set_stop_handle(&mut self, stop: Arc<AtomicBool>) {
        self.stop = stop;
    }

    /// 停止フラグのハンドルを取得
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// 探索を停止する
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// 新しい対局の開始（History・キャッシュをクリア）
    pub fn new_game(&mut self) {
        self.history.clear();
        self.eval_cache.clear();
        for entry in self.stack.iter_mut() {
            *entry = StackEntry::fresh();
        }
    }

    /// 探索ノード数
    pub fn node_count(&self) -> u64 {
        self.nodes
    }

    /// 反復深化で探索する
    pub fn go(
        &mut self,
        game_history: &BoardHistory,
        root: Position,
        limits: SearchLimits,
    ) -> SearchResult {
        self.limits = limits;
        self.start = Instant::now();
        self.abort = false;
        self.nodes = 0;
        self.calls_cnt = ABORT_CHECK_INTERVAL;
        self.path = game_history.clone();
        self.root_candidate = Move::NULL;
        self.root_score = Value::NONE;
        for entry in self.stack.iter_mut() {
            entry.excluded = Move::NULL;
            entry.static_eval = Value::NONE;
            entry.prev = None;
        }
        if self.thread_id == 0 {
            self.stop.store(false, Ordering::Relaxed);
            self.tt.new_search();
        }
        self.nnue.reset(&root);

        let mut result = SearchResult::default();
        let mut alpha = -Value::INFINITE;
        let mut beta = Value::INFINITE;

        let mut depth: Depth = 1;
        'deepening: while depth < MAX_PLY {
            if depth >= self.constants.aspiration_depth() && self.root_score != Value::NONE {
                alpha = self.root_score - self.constants.aspiration_delta();
                beta = self.root_score + self.constants.aspiration_delta();
            }

            let mut delta = self.constants.aspiration_delta();
            let mut failed_high: Depth = 0;

            loop {
                let adjusted_depth = (depth - failed_high).max(1);
                let score =
                    self.pv_search::<true>(&root, alpha, beta, adjusted_depth, 0, None);

                if self.abort {
                    break 'deepening;
                }

                if score <= alpha {
                    beta = Value::new((alpha.raw() + beta.raw()) / 2);
                    alpha = score - delta;
                    failed_high = 0;
                } else if score >= beta {
                    beta = score + delta;
                    failed_high += 1;
                } else {
                    self.root_score = score;
                    if self.root_candidate.is_some() {
                        result.best_move = self.root_candidate;
                        result.ponder_move = self.extract_ponder(&root, self.root_candidate);
                    }
                    result.score = score;
                    result.depth = depth;
                    break;
                }

                // 窓を指数的に広げる
                delta = delta + delta / 3;
            }

            if let Some(max_depth) = self.limits.max_depth {
                if depth >= max_depth {
                    break;
                }
            }
            depth += 1;
        }

        result.nodes = self.nodes;
        result
    }

    /// 最善手を適用した局面の置換表から ponder 手を引く
    fn extract_ponder(&self, root: &Position, best: Move) -> Move {
        let next = root.apply(best);
        let probe = self.tt.probe(next.hash());
        if probe.found && probe.data.mv.is_some() && is_legal(&next, probe.data.mv) {
            probe.data.mv
        } else {
            Move::NULL
        }
    }

    /// 引き分けスコア（±1の揺らぎ付き）
    #[inline]
    pub(super) fn draw_value(&self) -> Value {
        Value::new(draw_jitter(self.nodes))
    }

    /// 補正込みの静的評価を単発で計算する（データ生成のフィルタ用）
    ///
    /// NNUEスタックをこの局面でリセットして評価する。王手中の局面に
    /// 使ってはならない。
    pub fn filter_eval(&mut self, pos: &Position) -> Value {
        debug_assert!(!pos.is_check() && !pos.in_blast_check());
        self.nnue.reset(pos);
        let (_, static_eval, _) =
            self.evaluate::<true>(pos, 0, false, &TTData::EMPTY, false, false);
        static_eval
    }

    /// ノードカウンタのゲート付きで打ち切り条件を確認する
    pub(super) fn check_abort(&mut self) {
        self.calls_cnt -= 1;
        if self.calls_cnt > 0 {
            return;
        }
        self.calls_cnt = ABORT_CHECK_INTERVAL;

        if self.stop.load(Ordering::Relaxed) {
            self.abort = true;
            return;
        }
        if let Some(max_nodes) = self.limits.max_nodes {
            if self.nodes >= max_nodes {
                self.stop.store(true, Ordering::Relaxed);
                self.abort = true;
                return;
            }
        }
        if let Some(max_time) = self.limits.max_time {
            if self.start.elapsed() >= max_time {
                self.stop.store(true, Ordering::Relaxed);
                self.abort = true;
            }
        }
    }

    // =========================================================================
    // 静的評価
    // =========================================================================

    /// 静的評価の計算（キャッシュ + 補正History + TT境界によるクランプ）
    ///
    /// 返り値は (特徴ハッシュ, 補正後静的評価, TTクランプ後の値)。
    pub(super) fn evaluate<const PV: bool>(
        &mut self,
        pos: &Position,
        ply: i32,
        tt_hit: bool,
        tt_data: &TTData,
        in_check: bool,
        use_tt: bool,
    ) -> (u64, Value, Value) {
        if in_check {
            let loss = Value::mated_in(ply);
            return (0, loss, loss);
        }

        let us = pos.side_to_move();
        let hash = pos.hash();

        let cached = if PV { None } else { self.eval_cache.find(hash) };
        let (uncorrected, feature_hash) = match cached {
            Some((eval, feature_hash)) => (eval, feature_hash),
            None => {
                let raw = self.nnue.evaluate(pos, us);
                let eval = scale_nnue_score(raw);
                let feature_hash = pos.pawn_hash() ^ self.nnue.sign_hash(us).rotate_left(1);
                self.eval_cache.insert(hash, eval, feature_hash);
                (eval, feature_hash)
            }
        };

        let correction = self.history.correction_for(us, feature_hash);
        let static_eval = Value::new(
            (uncorrected.raw() + correction).clamp(
                Value::MATED_IN_MAX_PLY.raw() + 1,
                Value::MATE_IN_MAX_PLY.raw() - 1,
            ),
        );

        let mut value = static_eval;
        if use_tt && tt_hit {
            let tt_value = tt_data.value.from_tt(ply);
            if tt_value != Value::NONE {
                match tt_data.bound {
                    Bound::Upper if value > tt_value => value = tt_value,
                    Bound::Lower if value < tt_value => value = tt_value,
                    _ => {}
                }
            }
        }

        (feature_hash, static_eval, value)
    }

    // =========================================================================
    // PV探索（negamax）
    // =========================================================================

    /// PV探索の本体
    ///
    /// `reducer` はゼロ窓探索で縮小を主導している側。その相手番では
    /// fail-lowしても再探索で救済されるため、LMRを1段深くする。
    pub(super) fn pv_search<const PV: bool>(
        &mut self,
        pos: &Position,
        mut alpha: Value,
        beta: Value,
        mut depth: Depth,
        ply: i32,
        reducer: Option<Color>,
    ) -> Value {
        let is_root = ply == 0;
        debug_assert!(!is_root || PV);

        // step 1. 深さが尽きたら静止探索へ
        if depth <= 0 {
            return self.qsearch::<PV>(pos, alpha, beta, ply, 0, true);
        }

        self.check_abort();
        if self.abort {
            return Value::ZERO;
        }
        self.nodes += 1;

        let us = pos.side_to_move();

        // step 2. 終端判定
        if pos.us(us).king().is_empty() {
            return Value::mated_in(ply);
        }
        if pos.them(us).king().is_empty() {
            return Value::mate_in(ply);
        }

        let is_check = pos.is_check();
        let atomic_check = pos.in_blast_check();
        let is_check_any = is_check || atomic_check;

        if !is_root {
            if pos.is_rule50_draw()
                && (!is_check_any || !generate_moves(pos, GenMode::ALL).is_empty())
            {
                return self.draw_value();
            }

            // 半手クロック内の同一局面（繰り返しサイクル）はαを引き分けに寄せる
            if self
                .path
                .repetition_within(pos.sided_key(), pos.latent.halfmove_clock as usize + 1)
            {
                let draw = self.draw_value();
                if draw >= beta {
                    return draw;
                }
                if draw > alpha {
                    alpha = draw;
                }
            }
        }

        // step 3. 置換表（singular検証中は引かない）
        let excluded = self.stack[ply as usize].excluded;
        let (tt_hit, tt_data) = if excluded.is_some() {
            (false, TTData::EMPTY)
        } else {
            let probe = self.tt.probe(pos.hash());
            (probe.found, probe.data)
        };

        let mut tt_move = if tt_hit { tt_data.mv } else { Move::NULL };
        if tt_move.is_some() && !is_legal(pos, tt_move) {
            tt_move = Move::NULL;
        }
        let tt_value = if tt_hit {
            tt_data.value.from_tt(ply)
        } else {
            Value::NONE
        };

        if !PV && tt_hit && tt_data.depth >= depth && tt_value != Value::NONE {
            let cutoff = match tt_data.bound {
                Bound::Lower => tt_value >= beta,
                Bound::Upper => tt_value <= alpha,
                Bound::Exact => true,
                Bound::None => false,
            };
            if cutoff {
                return tt_value;
            }
        }

        let original_alpha = alpha;
        let tt_pv = PV || (tt_hit && tt_data.is_pv);

        // step 4. テーブルベース
        if !is_root && excluded.is_null() {
            if let Some(tb) = self.tb.clone() {
                if pos.num_pieces() <= tb.max_pieces() {
                    if let Some(wdl) = tb.probe_wdl(pos) {
                        return match wdl {
                            Wdl::Loss => Value::mated_in(ply),
                            Wdl::Draw => self.draw_value(),
                            Wdl::Win => Value::mate_in(ply),
                        };
                    }
                }
            }
        }

        // step 5. internal iterative reduction
        if !tt_hit && excluded.is_null() && depth >= self.constants.iir_depth() {
            depth -= 1;
        }

        // step 6. 静的評価
        let (feature_hash, static_eval, value) =
            self.evaluate::<PV>(pos, ply, tt_hit, &tt_data, is_check_any, true);

        if ply >= MAX_PLY - 4 {
            return value;
        }

        self.stack[ply as usize].static_eval = static_eval;
        let improving = !is_check_any
            && ply >= 2
            && {
                let prev = self.stack[(ply - 2) as usize].static_eval;
                prev == Value::NONE || static_eval > prev
            };
        let threatened = pos.them_threat_mask();

        // step 7-9. 探索前枝刈り（razor / SNMP / NMP / ProbCut）
        let prune_ctx = super::pruning::PrePruneContext {
            alpha,
            beta,
            depth,
            ply,
            value,
            improving,
            threatened: threatened.any(),
            in_check: is_check_any,
            excluded,
            tt_hit,
            tt_move,
            tt_value,
            tt_bound: tt_data.bound,
            tt_depth: tt_data.depth,
            reducer,
        };
        if let Some(pruned) = self.pre_move_pruning::<PV>(pos, &prune_ctx) {
            return pruned;
        }
        if self.abort {
            return Value::ZERO;
        }

        // step 10. 指し手ループ
        let prev1 = if ply >= 1 {
            self.stack[(ply - 1) as usize].prev
        } else {
            None
        };
        let prev2 = if ply >= 2 {
            self.stack[(ply - 2) as usize].prev
        } else {
            None
        };
        let killer = self.stack[ply as usize].killer;

        let mut picker = MovePicker::new(tt_move, killer);
        let mut best_score = Value::mated_in(ply);
        let mut best_move = Move::NULL;
        let mut legal_count: usize = 0;
        let mut did_double_extend = false;
        let mut quiets_tried: Vec<Move> = Vec::with_capacity(32);
        let mut noisy_tried: Vec<Move> = Vec::with_capacity(16);

        while let Some(mv) = picker.next(pos, &self.history, prev1, prev2) {
            let idx = legal_count;
            legal_count += 1;

            if self.abort {
                break;
            }
            if mv == excluded {
                continue;
            }

            let hist_value = if mv.is_quiet() {
                self.history.quiet_score(us, mv, prev1, prev2)
            } else {
                self.history.capture_score(mv)
            };

            // 即詰み駒取りの短絡: 爆発が相手キングだけを破壊する
            if pos.is_blast_mate(mv) {
                let score = Value::mate_in(ply);
                if score > best_score {
                    best_score = score;
                    best_move = mv;
                    if is_root {
                        self.root_candidate = mv;
                    }
                    if score > alpha {
                        alpha = score;
                    }
                }
                if best_score >= beta {
                    break;
                }
                continue;
            }

            let next = pos.apply(mv);

            // step 11. 浅い深さの枝刈り
            let try_pruning = !is_root && idx >= 2 && !best_score.is_loss();
            if try_pruning {
                let child_check = next.is_check() || next.in_blast_check();
                let c = &self.constants;

                if !child_check
                    && depth <= c.lmp_depth()
                    && idx > c.lmp_count(improving, depth)
                {
                    break;
                }
                if mv.is_quiet()
                    && depth <= c.futility_prune_depth()
                    && value + c.futility_margin(depth) < alpha
                {
                    continue;
                }
                if mv.is_quiet()
                    && depth <= c.quiet_see_prune_depth()
                    && !pos.see_ge(mv, c.quiet_see_prune_threshold(depth))
                {
                    continue;
                }
                if mv.is_noisy()
                    && depth <= c.noisy_see_prune_depth()
                    && !pos.see_ge(mv, c.noisy_see_prune_threshold(depth))
                {
                    continue;
                }
                if mv.is_quiet() && hist_value <= c.history_prune_threshold(depth) {
                    continue;
                }
            }

            self.tt.prefetch(next.hash());

            // step 12. singular extension
            let mut multicut = false;
            let mut extension: Depth = 0;
            let try_singular = !is_root
                && excluded.is_null()
                && depth >= self.constants.singular_extension_depth()
                && tt_hit
                && mv == tt_move
                && tt_move.is_some()
                && tt_data.bound != Bound::Upper
                && tt_value != Value::NONE
                && tt_data.depth + self.constants.singular_depth_margin() >= depth;

            if try_singular {
                let singular_depth = self.constants.singular_search_depth(depth);
                let singular_beta = self.constants.singular_beta(tt_value, depth);
                self.stack[ply as usize].excluded = mv;
                let excluded_score = self.pv_search::<false>(
                    pos,
                    singular_beta - 1,
                    singular_beta,
                    singular_depth,
                    ply,
                    reducer,
                );
                self.stack[ply as usize].excluded = Move::NULL;

                if !PV
                    && excluded_score + self.constants.singular_double_margin() < singular_beta
                {
                    did_double_extend = true;
                    extension = 2;
                } else if excluded_score < singular_beta {
                    extension = 1;
                } else if excluded_score >= beta {
                    multicut = true;
                } else if !PV {
                    extension = -1;
                }
            }

            if !is_root && multicut {
                return beta;
            }

            // 手を適用してスタックを積む
            self.path.push(pos.sided_key());
            let updates = build_updates(pos, &next);
            self.nnue.push(&updates, &next);
            let placed = mv.promotion().unwrap_or(mv.piece());
            self.stack[ply as usize].prev = Some(PrevMove::new(placed, mv.to()));

            let next_depth = depth + extension - 1;

            // step 13. LMR + ゼロ窓/全窓探索
            let score = if PV && idx == 0 {
                -self.pv_search::<true>(&next, -beta, -alpha, next_depth, ply + 1, reducer)
            } else {
                let try_lmr = !is_check_any
                    && (mv.is_quiet() || !pos.see_ge(mv, 0))
                    && idx >= 2
                    && depth >= self.constants.reduce_depth();

                let mut lmr_depth = next_depth;
                let mut searched_reduced = false;
                let mut zw_score = Value::ZERO;

                if try_lmr {
                    let mut reduction = self.constants.reduction(depth, idx);

                    if mv.piece() == PieceType::Pawn {
                        let near_promo = mv.to().relative_rank(us) >= 6;
                        if mv.promotion().is_some() || near_promo || pos.is_passed_push(mv) {
                            reduction = 0;
                        }
                    }
                    if improving {
                        reduction -= 1;
                    }
                    if next.is_check() || next.in_blast_check() {
                        reduction -= 1;
                    }
                    if pos.creates_threat(mv) {
                        reduction -= 1;
                    }
                    if mv == killer {
                        reduction -= 1;
                    }
                    if !tt_pv {
                        reduction += 1;
                    }
                    if did_double_extend {
                        reduction += 1;
                    }
                    // 縮小主導側の相手番ではfail-lowしても再探索で拾えるため深く削る
                    if reducer == Some(us.opponent()) {
                        reduction += 1;
                    }
                    if mv.is_quiet() {
                        reduction += self.constants.history_reduction(hist_value);
                    }

                    let reduction = reduction.max(0);
                    lmr_depth = (next_depth - reduction).max(1);
                    searched_reduced = true;
                    let next_reducer = if PV || lmr_depth < next_depth {
                        Some(us)
                    } else {
                        reducer
                    };
                    zw_score = -self.pv_search::<false>(
                        &next,
                        -alpha - 1,
                        -alpha,
                        lmr_depth,
                        ply + 1,
                        next_reducer,
                    );
                }

                // 必要なら全深さで再探索
                if !searched_reduced || (zw_score > alpha && lmr_depth < next_depth) {
                    let next_reducer = if PV { Some(us) } else { reducer };
                    zw_score = -self.pv_search::<false>(
                        &next,
                        -alpha - 1,
                        -alpha,
                        next_depth,
                        ply + 1,
                        next_reducer,
                    );
                }

                // PVノードで窓内に入ったら全窓で再探索
                if PV && alpha < zw_score && zw_score < beta {
                    -self.pv_search::<true>(&next, -beta, -alpha, next_depth, ply + 1, reducer)
                } else {
                    zw_score
                }
            };

            self.nnue.pop();
            self.path.pop();

            if score < beta && (mv.is_quiet() || !pos.see_gt(mv, 0)) {
                if mv.is_quiet() {
                    if quiets_tried.len() < 32 {
                        quiets_tried.push(mv);
                    }
                } else if noisy_tried.len() < 16 {
                    noisy_tried.push(mv);
                }
            }

            if score > best_score {
                best_score = score;
                best_move = mv;
                if is_root {
                    self.root_candidate = mv;
                }
                if score > alpha {
                    if score < beta {
                        alpha = score;
                    }
                }
            }

            if best_score >= beta {
                break;
            }
        }

        if legal_count == 0 {
            return if is_check_any {
                Value::mated_in(ply)
            } else {
                self.draw_value()
            };
        }

        // step 14. History更新と置換表への格納
        if !self.abort && excluded.is_null() {
            let bound = if best_score >= beta {
                Bound::Lower
            } else if PV && best_score > original_alpha {
                Bound::Exact
            } else {
                Bound::Upper
            };

            if bound == Bound::Lower && (best_move.is_quiet() || !pos.see_gt(best_move, 0)) {
                let bonus = stat_bonus(depth);
                let malus = stat_malus(depth);
                if best_move.is_quiet() {
                    self.history.update_quiet(us, best_move, prev1, prev2, bonus);
                    self.stack[ply as usize].killer = best_move;
                } else {
                    self.history.update_capture(best_move, bonus);
                }
                for mv in &quiets_tried {
                    if *mv != best_move {
                        self.history.update_quiet(us, *mv, prev1, prev2, malus);
                    }
                }
                for mv in &noisy_tried {
                    if *mv != best_move {
                        self.history.update_capture(*mv, malus);
                    }
                }
            }

            if !is_check_any && best_move.is_quiet() && static_eval != Value::NONE {
                let error = (best_score - static_eval).raw();
                self.history.update_correction(
                    us,
                    feature_hash,
                    error,
                    depth,
                    bound == Bound::Lower,
                    bound == Bound::Upper,
                );
            }

            self.tt.probe(pos.hash()).write(
                pos.hash(),
                best_score.to_tt(ply),
                bound,
                depth,
                best_move,
                tt_pv,
            );
        }

        best_score
    }
}
