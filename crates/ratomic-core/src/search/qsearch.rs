//! 静止探索（Quiescence Search）
//!
//! うるさい手だけを探索して局面を静まらせる。アトミック特化の拡張:
//!
//! - 即詰み駒取り（爆発が相手キングに届く手）は適用せずに勝ちを返す
//! - Promotion quiescence: うるさい手生成から漏れる静かな昇格を
//!   先頭レベルに限り少数だけ探索する
//! - Threat quiescence: 相手キング圏に入り、適用後に即詰み脅威を作る
//!   静かな手を少数だけ探索する
//!
//! 王手（直接・爆発とも）を受けている局面ではstand-patせず、生成が
//! 全合法手に昇格する。

use crate::bitboard::blast_mask;
use crate::movegen::{generate_moves, GenMode};
use crate::nnue::build_updates;
use crate::position::{BoardHistory, Position};
use crate::tt::{Bound, TTData};
use crate::types::{Move, Value, MAX_PLY};

use super::alpha_beta::SearchWorker;
use super::history::PrevMove;
use super::movepicker::MovePicker;

/// Promotion/Threat quiescence それぞれで試す手数の上限
const QUIET_EXTENSION_LIMIT: usize = 6;

impl SearchWorker {
    /// 静止探索の本体
    ///
    /// `elevation` は静止探索内の深さ（0が入口）。`use_tt` を落とすと
    /// 置換表に依存しない純粋な値を返す（データ生成のフィルタ用）。
    pub(crate) fn qsearch<const PV: bool>(
        &mut self,
        pos: &Position,
        mut alpha: Value,
        beta: Value,
        ply: i32,
        elevation: i32,
        use_tt: bool,
    ) -> Value {
        self.check_abort();
        if self.abort {
            return Value::ZERO;
        }
        self.nodes += 1;

        let us = pos.side_to_move();
        if pos.us(us).king().is_empty() {
            return Value::mated_in(ply);
        }
        if pos.them(us).king().is_empty() {
            return Value::mate_in(ply);
        }

        let is_check = pos.is_check();
        let atomic_check = pos.in_blast_check();
        let is_check_any = is_check || atomic_check;

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

        // 置換表（静止探索は深さ0として扱う）
        let (tt_hit, tt_data) = if use_tt {
            let probe = self.tt.probe(pos.hash());
            (probe.found, probe.data)
        } else {
            (false, TTData::EMPTY)
        };
        let mut tt_move = if tt_hit { tt_data.mv } else { Move::NULL };
        if tt_move.is_some() && !crate::movegen::is_legal(pos, tt_move) {
            tt_move = Move::NULL;
        }

        if use_tt && tt_hit {
            let tt_value = tt_data.value.from_tt(ply);
            if tt_value != Value::NONE {
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
        }

        let (_, _, value) =
            self.evaluate::<PV>(pos, ply, tt_hit, &tt_data, is_check_any, use_tt);

        if !is_check_any && value >= beta {
            return value;
        }
        if ply >= MAX_PLY - 4 {
            return value;
        }
        if value > alpha {
            alpha = value;
        }

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

        let mut best_score = value;
        let mut best_move = Move::NULL;
        let mut legal_count: usize = 0;

        let mut picker = MovePicker::new_qsearch(tt_move);
        while let Some(mv) = picker.next(pos, &self.history, prev1, prev2) {
            legal_count += 1;
            if self.abort {
                break;
            }

            let is_blast_mate = pos.is_blast_mate(mv);

            // SEEで負ける手以降は全て打ち切る（オーダリングでSEE負けは後方）
            if !is_check_any && !is_blast_mate && !pos.see_ge(mv, 0) {
                break;
            }

            // Delta pruning: 上振れしてもαに届かない駒取りは捨てる
            if !PV
                && !is_check_any
                && !is_blast_mate
                && !pos.see_gt(mv, 0)
                && value + self.constants.delta_margin() < alpha
            {
                break;
            }

            // 良い駒取りがβを十分超えるなら詳細は省く
            if !PV
                && !is_check_any
                && !is_blast_mate
                && !tt_hit
                && pos.see_ge(mv, self.constants.good_capture_see_margin())
                && value + self.constants.good_capture_score_margin() > beta
            {
                return beta;
            }

            if is_blast_mate {
                return Value::mate_in(ply);
            }

            let score = self.qsearch_step::<PV>(pos, mv, alpha, beta, ply, elevation, use_tt);

            if score > best_score {
                best_score = score;
                best_move = mv;
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

        // Promotion quiescence: 静かな昇格を先頭レベルでだけ拾う
        if !is_check_any
            && best_score < beta
            && elevation == 0
            && best_score + 100 >= alpha
            && !self.abort
        {
            let mut explored = 0;
            let quiets = generate_moves(pos, GenMode::QUIET);
            for mv in quiets.iter().copied() {
                if mv.promotion().is_none() || mv.is_noisy() {
                    continue;
                }
                if explored >= QUIET_EXTENSION_LIMIT {
                    break;
                }
                explored += 1;

                let score =
                    self.qsearch_step::<PV>(pos, mv, alpha, beta, ply, elevation, use_tt);
                if score > best_score {
                    best_score = score;
                    best_move = mv;
                    if score > alpha && score < beta {
                        alpha = score;
                    }
                }
                if best_score >= beta || self.abort {
                    break;
                }
            }
        }

        // Threat quiescence: 相手キング圏へ入り即詰み脅威を作る静かな手
        if !is_check_any
            && best_score < beta
            && elevation == 0
            && best_score + 100 >= alpha
            && !self.abort
        {
            let king_zone = pos
                .king_square(us.opponent())
                .map(blast_mask)
                .unwrap_or_default();

            let mut explored = 0;
            let quiets = generate_moves(pos, GenMode::QUIET);
            for mv in quiets.iter().copied() {
                if mv.is_noisy() {
                    continue;
                }
                if explored >= QUIET_EXTENSION_LIMIT {
                    break;
                }
                if !king_zone.contains(mv.to()) && !mv.is_castle(us) {
                    continue;
                }

                let next = pos.apply(mv);
                if !next.has_blast_capture_for(us) {
                    continue;
                }
                explored += 1;

                let score =
                    self.qsearch_step::<PV>(pos, mv, alpha, beta, ply, elevation, use_tt);
                if score > best_score {
                    best_score = score;
                    best_move = mv;
                    if score > alpha && score < beta {
                        alpha = score;
                    }
                }
                if best_score >= beta || self.abort {
                    break;
                }
            }
        }

        if legal_count == 0 {
            // うるさい手がない: 王手なら詰み、そうでなければ拡張層の結果を含む下界
            return if is_check_any {
                Value::mated_in(ply)
            } else {
                best_score
            };
        }

        if use_tt && !self.abort {
            let bound = if best_score >= beta {
                Bound::Lower
            } else {
                Bound::Upper
            };
            self.tt.probe(pos.hash()).write(
                pos.hash(),
                best_score.to_tt(ply),
                bound,
                0,
                best_move,
                false,
            );
        }

        best_score
    }

    /// 1手を適用して再帰する（NNUE・履歴スタックの積み下ろし込み）
    #[allow(clippy::too_many_arguments)]
    fn qsearch_step<const PV: bool>(
        &mut self,
        pos: &Position,
        mv: Move,
        alpha: Value,
        beta: Value,
        ply: i32,
        elevation: i32,
        use_tt: bool,
    ) -> Value {
        let next = pos.apply(mv);
        self.tt.prefetch(next.hash());
        self.path.push(pos.sided_key());
        let updates = build_updates(pos, &next);
        self.nnue.push(&updates, &next);
        let placed = mv.promotion().unwrap_or(mv.piece());
        self.stack[ply as usize].prev = Some(PrevMove::new(placed, mv.to()));

        let score =
            -self.qsearch::<PV>(&next, -beta, -alpha, ply + 1, elevation + 1, use_tt);

        self.nnue.pop();
        self.path.pop();
        score
    }

    /// 置換表に依存しない全窓の静止探索値（データ生成のquietフィルタ用）
    ///
    /// 呼び出しごとにNNUEスタックをルートとして再構築する。
    pub fn quiesce_value(&mut self, history: &BoardHistory, pos: &Position) -> Value {
        self.path = history.clone();
        self.abort = false;
        self.nnue.reset(pos);
        self.qsearch::<true>(pos, -Value::INFINITE, Value::INFINITE, 0, 0, false)
    }
}
