//! 探索前の枝刈り
//!
//! 指し手ループに入る前に適用する4種の枝刈りをまとめる。
//! いずれも非PV・非王手・非singular検証ノードに限る。
//!
//! - Razoring: 評価値がαを大きく割るとき静止探索で確認して打ち切る
//! - Static NMP: 評価値がβを大きく超えるとき評価値側に寄せて返す
//! - Null move pruning: パスしてもβを超えるなら枝刈り
//! - ProbCut: うるさい手の浅い探索でβ+マージンを超えたら打ち切る

use crate::nnue::build_updates;
use crate::position::Position;
use crate::tt::Bound;
use crate::types::{Color, Depth, Move, Value};

use super::alpha_beta::SearchWorker;
use super::movepicker::MovePicker;

/// 探索前枝刈りに必要な文脈
pub(super) struct PrePruneContext {
    pub alpha: Value,
    pub beta: Value,
    pub depth: Depth,
    pub ply: i32,
    /// TTクランプ後の静的評価
    pub value: Value,
    pub improving: bool,
    pub threatened: bool,
    pub in_check: bool,
    pub excluded: Move,
    pub tt_hit: bool,
    pub tt_move: Move,
    pub tt_value: Value,
    pub tt_bound: Bound,
    pub tt_depth: Depth,
    pub reducer: Option<Color>,
}

impl SearchWorker {
    /// razor / SNMP / NMP / ProbCut を順に試す
    ///
    /// 枝刈りが成立したら `Some(score)` を返す。
    pub(super) fn pre_move_pruning<const PV: bool>(
        &mut self,
        pos: &Position,
        ctx: &PrePruneContext,
    ) -> Option<Value> {
        if PV || ctx.in_check || ctx.excluded.is_some() {
            return None;
        }

        if let Some(score) = self.try_razoring(pos, ctx) {
            return Some(score);
        }
        if let Some(score) = self.try_static_null_move(ctx) {
            return Some(score);
        }
        if let Some(score) = self.try_null_move(pos, ctx) {
            return Some(score);
        }
        if let Some(score) = self.try_probcut(pos, ctx) {
            return Some(score);
        }
        None
    }

    /// Razoring: 浅い深さで評価値がαを大きく割っていたら静止探索で検証
    fn try_razoring(&mut self, pos: &Position, ctx: &PrePruneContext) -> Option<Value> {
        if ctx.depth > self.constants.razor_depth()
            || ctx.value + self.constants.razor_margin(ctx.depth) > ctx.alpha
        {
            return None;
        }
        let score = self.qsearch::<false>(pos, ctx.alpha, ctx.alpha + 1, ctx.ply, 0, true);
        if score <= ctx.alpha {
            Some(score)
        } else {
            None
        }
    }

    /// Static null move pruning（reverse futility）
    fn try_static_null_move(&mut self, ctx: &PrePruneContext) -> Option<Value> {
        let margin = self
            .constants
            .snmp_margin(ctx.improving, ctx.threatened, ctx.depth);
        if ctx.depth <= self.constants.snmp_depth()
            && !ctx.value.is_mate_score()
            && ctx.value > ctx.beta + margin
        {
            // βと評価値の中間へ寄せて返す
            return Some(Value::new((ctx.beta.raw() + ctx.value.raw()) / 2));
        }
        None
    }

    /// Null move pruning
    fn try_null_move(&mut self, pos: &Position, ctx: &PrePruneContext) -> Option<Value> {
        // 非PVノードはply>=1なので親エントリは常に存在する
        let parent_was_null = self.stack[(ctx.ply - 1) as usize].prev.is_none();

        let tt_allows = !ctx.tt_hit
            || (ctx.tt_bound == Bound::Lower
                && ctx.tt_move.is_some()
                && !pos.see_gt(ctx.tt_move, self.constants.nmp_see_threshold()));

        if ctx.depth < self.constants.nmp_depth()
            || ctx.value <= ctx.beta
            || parent_was_null
            || !pos.has_non_pawn_material()
            || (ctx.threatened && ctx.depth < 4)
            || !tt_allows
        {
            return None;
        }

        let us = pos.side_to_move();
        self.stack[ctx.ply as usize].prev = None;

        let reduction = self.constants.nmp_reduction(ctx.depth, ctx.beta, ctx.value);
        let null_depth = (ctx.depth - reduction).max(0);

        let next = pos.apply_null();
        self.path.push(pos.sided_key());
        let updates = build_updates(pos, &next);
        self.nnue.push(&updates, &next);
        let score = -self.pv_search::<false>(
            &next,
            -ctx.beta,
            -ctx.beta + 1,
            null_depth,
            ctx.ply + 1,
            Some(us.opponent()),
        );
        self.nnue.pop();
        self.path.pop();

        if score >= ctx.beta && !self.abort {
            Some(score)
        } else {
            None
        }
    }

    /// ProbCut: うるさい手の静止探索 + 浅い探索でβ+マージンを超えたら打ち切る
    fn try_probcut(&mut self, pos: &Position, ctx: &PrePruneContext) -> Option<Value> {
        let probcut_beta = self.constants.probcut_beta(ctx.beta);
        let probcut_depth = self.constants.probcut_search_depth(ctx.depth);

        if ctx.depth < self.constants.probcut_depth() {
            return None;
        }
        if ctx.tt_hit && ctx.tt_move.is_some() && ctx.tt_move.is_quiet() {
            return None;
        }
        if ctx.tt_hit
            && ctx.tt_depth >= probcut_depth
            && ctx.tt_value != Value::NONE
            && ctx.tt_value < probcut_beta
        {
            return None;
        }

        let mut picker = MovePicker::new_qsearch(ctx.tt_move);
        let prev1 = if ctx.ply >= 1 {
            self.stack[(ctx.ply - 1) as usize].prev
        } else {
            None
        };
        let prev2 = if ctx.ply >= 2 {
            self.stack[(ctx.ply - 2) as usize].prev
        } else {
            None
        };

        while let Some(mv) = picker.next(pos, &self.history, prev1, prev2) {
            if self.abort {
                break;
            }
            if mv == ctx.excluded || !pos.see_ge(mv, 0) {
                continue;
            }

            // 即詰み駒取りならこのノードは勝ち
            if pos.is_blast_mate(mv) {
                let score = Value::mate_in(ctx.ply);
                if score >= probcut_beta {
                    return Some(score);
                }
                continue;
            }

            let next = pos.apply(mv);
            self.tt.prefetch(next.hash());
            self.path.push(pos.sided_key());
            let updates = build_updates(pos, &next);
            self.nnue.push(&updates, &next);
            let placed = mv.promotion().unwrap_or(mv.piece());
            self.stack[ctx.ply as usize].prev =
                Some(super::history::PrevMove::new(placed, mv.to()));

            let q_score = -self.qsearch::<false>(
                &next,
                -probcut_beta,
                -probcut_beta + 1,
                ctx.ply + 1,
                0,
                true,
            );
            let score = if q_score >= probcut_beta {
                -self.pv_search::<false>(
                    &next,
                    -probcut_beta,
                    -probcut_beta + 1,
                    probcut_depth,
                    ctx.ply + 1,
                    ctx.reducer,
                )
            } else {
                q_score
            };

            self.nnue.pop();
            self.path.pop();

            if score >= probcut_beta && !self.abort {
                return Some(score);
            }
        }

        None
    }
}
