//! 静的交換評価（SEE、アトミック版）
//!
//! 駒取りは必ず爆発を伴い、取り返しも爆発を連鎖させるため、古典的な
//! swap-offは行わない。駒取りは爆発1回の材料収支、静かな手は相手の
//! 最安攻撃駒による取り返し爆発1回をシミュレートして判定する。

use crate::bitboard::{blast_mask, Bitboard};
use crate::types::{Color, Move, PieceType, Square};

use super::pos::Position;

/// SEE用の駒価値（センチポーン）
pub const SEE_VALUES: [i32; PieceType::NUM] = [100, 450, 450, 650, 1250, 0];

/// キング死亡時に使う大スコア
const SEE_MATE: i32 = 1_000_000;

#[inline]
fn value_of(pt: PieceType) -> i32 {
    SEE_VALUES[pt.index()]
}

impl Position {
    /// 手 `mv` の材料収支が `threshold` 以上かどうか
    pub fn see_ge(&self, mv: Move, threshold: i32) -> bool {
        if mv.is_null() {
            return true;
        }

        let us = self.side_to_move();

        if mv.is_castle(us) {
            return 0 >= threshold;
        }

        if mv.is_capture() {
            return self.see_capture(mv, us) >= threshold;
        }

        self.see_quiet(mv, us, threshold)
    }

    /// 材料収支が `threshold` を超えるかどうか
    #[inline]
    pub fn see_gt(&self, mv: Move, threshold: i32) -> bool {
        self.see_ge(mv, threshold + 1)
    }

    /// 駒取り: 爆発1回の材料収支
    fn see_capture(&self, mv: Move, us: Color) -> i32 {
        let mut score = if mv.is_en_passant() {
            value_of(PieceType::Pawn)
        } else {
            value_of(mv.captured())
        };

        // 爆発圏（ポーンは生き残る）+ 取った駒自身
        let pawns = self.us(us).pawn() | self.them(us).pawn();
        let boom = (blast_mask(mv.to()) & !pawns) | Bitboard::from_square(mv.to());

        if let Some(k) = self.king_square(us) {
            if boom.contains(k) {
                return -SEE_MATE;
            }
        }
        if let Some(k) = self.king_square(us.opponent()) {
            if boom.contains(k) {
                return SEE_MATE;
            }
        }

        let moved = mv.promotion().unwrap_or(mv.piece());
        // 取った駒は上で加算済み。自分の動かした駒は爆発で必ず失う。
        score -= value_of(moved);

        for sq in boom & self.us(us).all() & !Bitboard::from_square(mv.from()) {
            score -= self.piece_value_at(sq);
        }
        let captured_sq = if mv.is_en_passant() { mv.ep_square() } else { mv.to() };
        for sq in boom & self.them(us).all() & !Bitboard::from_square(captured_sq) {
            score += self.piece_value_at(sq);
        }

        score
    }

    /// 静かな手: 相手の最安攻撃駒による取り返し爆発をシミュレート
    fn see_quiet(&self, mv: Move, us: Color, threshold: i32) -> bool {
        let next = self.apply(mv);
        let occ = next.occupied();
        let them = us.opponent();

        let attackers = next.attackers_to(them, mv.to(), occ);
        if attackers.is_empty() {
            return 0 >= threshold;
        }

        let mut min_value = i32::MAX;
        for sq in attackers {
            min_value = min_value.min(next.piece_value_at(sq));
        }

        let moved = mv.promotion().unwrap_or(mv.piece());
        let pawns = next.us(us).pawn() | next.them(us).pawn();
        let boom = (blast_mask(mv.to()) & !pawns) | Bitboard::from_square(mv.to());

        // 取り返しで自キングが死ぬなら負け、相手キングが死ぬなら相手は取り返せない
        if let Some(k) = next.king_square(us) {
            if boom.contains(k) {
                return -SEE_MATE >= threshold;
            }
        }
        if let Some(k) = next.king_square(them) {
            if boom.contains(k) {
                return 0 >= threshold;
            }
        }

        let mut score = min_value - value_of(moved);
        for sq in boom & next.us(us).all() & !Bitboard::from_square(mv.to()) {
            score -= next.piece_value_at(sq);
        }
        for sq in boom & next.them(us).all() {
            score += next.piece_value_at(sq);
        }

        score >= threshold
    }

    fn piece_value_at(&self, sq: Square) -> i32 {
        match self.piece_at(sq) {
            Some((_, pt)) => value_of(pt),
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movegen::{generate_moves, GenMode};

    fn find_move(pos: &Position, name: &str) -> Move {
        let us = pos.side_to_move();
        generate_moves(pos, GenMode::ALL)
            .iter()
            .copied()
            .find(|mv| mv.name(us) == name)
            .unwrap_or_else(|| panic!("move {name} not found"))
    }

    #[test]
    fn test_see_free_pawn_capture_loses_capturer() {
        // 駒取りは自駒も爆発で失うため、単独ポーン取りはほぼ収支ゼロ
        let pos = Position::parse_fen("4k3/8/8/3p4/4P3/8/8/4K3 w - - 0 1").unwrap();
        let mv = find_move(&pos, "e4d5");
        // +100(取り) -100(自ポーン) = 0
        assert!(pos.see_ge(mv, 0));
        assert!(!pos.see_ge(mv, 1));
    }

    #[test]
    fn test_see_capture_destroys_bystanders() {
        // d5を取ると爆発圏のc6黒ナイトも消える: +100 +450 -100 = +450
        let pos = Position::parse_fen("4k3/8/2n5/3p4/4P3/8/8/4K3 w - - 0 1").unwrap();
        let mv = find_move(&pos, "e4d5");
        assert!(pos.see_ge(mv, 450));
        assert!(!pos.see_ge(mv, 451));
    }

    #[test]
    fn test_see_capture_losing_own_piece_nearby() {
        // 自分のクイーンが爆発圏にあると大損: +100 -100 -1250 = -1250
        let pos = Position::parse_fen("4k3/8/8/3p4/3QP3/8/8/4K3 w - - 0 1").unwrap();
        let mv = find_move(&pos, "e4d5");
        assert!(pos.see_ge(mv, -1250));
        assert!(!pos.see_ge(mv, -1249));
    }

    #[test]
    fn test_see_blast_mate_is_huge() {
        // 爆発が黒キングに届く駒取りは +MATE
        let pos = Position::parse_fen("8/8/8/3pk3/8/3R4/8/4K3 w - - 0 1").unwrap();
        let mv = find_move(&pos, "d3d5");
        assert!(pos.see_ge(mv, 100_000));
    }

    #[test]
    fn test_see_quiet_unattacked_is_zero() {
        let pos = Position::parse_fen("4k3/8/8/8/8/8/4P3/4K3 w - - 0 1").unwrap();
        let mv = find_move(&pos, "e2e3");
        assert!(pos.see_ge(mv, 0));
        assert!(!pos.see_ge(mv, 1));
    }

    #[test]
    fn test_see_quiet_recapture_punished() {
        // ルークがポーンの利きに飛び込む: 取り返し爆発で -650 +100 = -550
        let pos = Position::parse_fen("4k3/8/3p4/8/4R3/8/8/4K3 w - - 0 1").unwrap();
        let mv = find_move(&pos, "e4e5");
        assert!(pos.see_ge(mv, -550));
        assert!(!pos.see_ge(mv, -549));
    }

    #[test]
    fn test_see_null_always_passes() {
        let pos = Position::startpos();
        assert!(pos.see_ge(Move::NULL, 0));
    }
}
