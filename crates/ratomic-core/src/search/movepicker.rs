//! MovePicker（指し手オーダリング）
//!
//! カットオフを起こしやすい手から順に返す。生成は段階的（lazy）で、
//! LMPが成立したら `skip_quiets` で残りの静かな手を省略できる。
//!
//! ## Stage
//!
//! 1. TTMove - 置換表の手
//! 2. NoisyInit / Noisy - うるさい手（即詰み駒取り → SEE・MVV/LVA順）
//! 3. QuietInit / Quiet - 静かな手（killer昇格 + 合成History順）
//!
//! History参照はフィールドに保持せず、`next` の引数で受け取る
//! （再帰呼び出し中の参照エイリアスを避けるため）。

use crate::movegen::{generate_moves, GenMode, MoveList};
use crate::position::Position;
use crate::types::{Move, PieceType, MAX_MOVES};

use super::history::{HistoryTables, PrevMove};

/// SEE順序付け用の駒価値（センチポーン相当の粗い値）
#[inline]
pub fn piece_value(pt: PieceType) -> i32 {
    match pt {
        PieceType::Pawn => 100,
        PieceType::Knight => 450,
        PieceType::Bishop => 450,
        PieceType::Rook => 650,
        PieceType::Queen => 1250,
        PieceType::King => 0,
    }
}

/// 指し手生成の段階
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Stage {
    TTMove,
    NoisyInit,
    Noisy,
    QuietInit,
    Quiet,
    Done,
}

/// 指し手オーダリング器
pub struct MovePicker {
    stage: Stage,
    tt_move: Move,
    killer: Move,
    /// 静止探索用（quietステージを生成しない）
    noisy_only: bool,
    skip_quiets: bool,
    buffer: MoveList,
    scores: [i32; MAX_MOVES],
    idx: usize,
}

impl MovePicker {
    /// 通常探索用のpicker
    pub fn new(tt_move: Move, killer: Move) -> MovePicker {
        MovePicker {
            stage: Stage::TTMove,
            tt_move,
            killer,
            noisy_only: false,
            skip_quiets: false,
            buffer: MoveList::new(),
            scores: [0; MAX_MOVES],
            idx: 0,
        }
    }

    /// 静止探索用のpicker（うるさい手のみ。王手中は全手に昇格）
    pub fn new_qsearch(tt_move: Move) -> MovePicker {
        MovePicker {
            stage: Stage::TTMove,
            tt_move,
            killer: Move::NULL,
            noisy_only: true,
            skip_quiets: false,
            buffer: MoveList::new(),
            scores: [0; MAX_MOVES],
            idx: 0,
        }
    }

    /// 残りの静かな手をスキップする（LMP成立時）
    pub fn skip_quiets(&mut self) {
        self.skip_quiets = true;
    }

    /// 次の手を返す
    pub fn next(
        &mut self,
        pos: &Position,
        history: &HistoryTables,
        prev1: Option<PrevMove>,
        prev2: Option<PrevMove>,
    ) -> Option<Move> {
        loop {
            match self.stage {
                Stage::TTMove => {
                    self.stage = Stage::NoisyInit;
                    if self.tt_move.is_some() && crate::movegen::is_legal(pos, self.tt_move) {
                        return Some(self.tt_move);
                    }
                }
                Stage::NoisyInit => {
                    let mode = if self.noisy_only {
                        GenMode::NOISY_AND_CHECK
                    } else {
                        GenMode::NOISY
                    };
                    self.buffer = generate_moves(pos, mode);
                    self.score_moves(pos, history, prev1, prev2);
                    self.idx = 0;
                    self.stage = Stage::Noisy;
                }
                Stage::Noisy => match self.pick_best() {
                    Some(mv) => {
                        if mv == self.tt_move {
                            continue;
                        }
                        return Some(mv);
                    }
                    None => {
                        if self.noisy_only {
                            self.stage = Stage::Done;
                        } else {
                            self.stage = Stage::QuietInit;
                        }
                    }
                },
                Stage::QuietInit => {
                    if self.skip_quiets {
                        self.stage = Stage::Done;
                        continue;
                    }
                    self.buffer = generate_moves(pos, GenMode::QUIET);
                    self.score_moves(pos, history, prev1, prev2);
                    self.idx = 0;
                    self.stage = Stage::Quiet;
                }
                Stage::Quiet => {
                    if self.skip_quiets {
                        self.stage = Stage::Done;
                        continue;
                    }
                    match self.pick_best() {
                        Some(mv) => {
                            if mv == self.tt_move {
                                continue;
                            }
                            return Some(mv);
                        }
                        None => self.stage = Stage::Done,
                    }
                }
                Stage::Done => return None,
            }
        }
    }

    /// バッファ内の手をスコアリングする
    fn score_moves(
        &mut self,
        pos: &Position,
        history: &HistoryTables,
        prev1: Option<PrevMove>,
        prev2: Option<PrevMove>,
    ) {
        let us = pos.side_to_move();
        for i in 0..self.buffer.len() {
            let mv = self.buffer.at(i);
            self.scores[i] = if mv.is_capture() {
                // 即詰み駒取りは最優先
                if pos.is_blast_mate(mv) {
                    1 << 24
                } else {
                    let mvv_lva = 10 * piece_value(mv.captured()) - piece_value(mv.piece());
                    let see_bonus = if pos.see_ge(mv, 0) { 1 << 20 } else { -(1 << 20) };
                    mvv_lva + see_bonus + history.capture_score(mv)
                }
            } else if mv == self.killer {
                1 << 18
            } else {
                history.quiet_score(us, mv, prev1, prev2)
            };
        }
    }

    /// 残りから最大スコアの手を取り出す（部分選択ソート）
    fn pick_best(&mut self) -> Option<Move> {
        if self.idx >= self.buffer.len() {
            return None;
        }
        let mut best = self.idx;
        for i in self.idx + 1..self.buffer.len() {
            if self.scores[i] > self.scores[best] {
                best = i;
            }
        }
        if best != self.idx {
            self.scores.swap(self.idx, best);
            // MoveListはswapを持たないのでバッファを入れ替える
            let tmp = self.buffer.at(self.idx);
            self.buffer.set(self.idx, self.buffer.at(best));
            self.buffer.set(best, tmp);
        }
        let mv = self.buffer.at(self.idx);
        self.idx += 1;
        Some(mv)
    }
}
