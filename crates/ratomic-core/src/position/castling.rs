//! キャスリング定数
//!
//! キャスリングは「キングがルークの初期位置へ動く手」として表現する。
//! 短側は通過マスク1本、長側は占有マスクと通過（危険）マスクが異なる
//! （b1は空いている必要があるがキングは通らない）。

use crate::bitboard::Bitboard;
use crate::types::{Color, Square};

/// 片側分のキャスリング情報
pub struct CastleInfo {
    /// キングの初期位置
    pub start_king: Square,
    /// 短側ルークの初期位置
    pub short_rook: Square,
    /// 長側ルークの初期位置
    pub long_rook: Square,
    /// 短側キャスリング後のキング位置
    pub after_short_king: Square,
    /// 短側キャスリング後のルーク位置
    pub after_short_rook: Square,
    /// 長側キャスリング後のキング位置
    pub after_long_king: Square,
    /// 長側キャスリング後のルーク位置
    pub after_long_rook: Square,
    /// 短側: 空きかつ非攻撃であるべきマス（f1, g1）
    pub short_mask: Bitboard,
    /// 長側: 空きであるべきマス（b1, c1, d1）
    pub long_occ_mask: Bitboard,
    /// 長側: キングが通る非攻撃であるべきマス（c1, d1）
    pub long_danger_mask: Bitboard,
}

const fn squares_bb(squares: &[Square]) -> Bitboard {
    let mut bb = 0u64;
    let mut i = 0;
    while i < squares.len() {
        bb |= squares[i].bit();
        i += 1;
    }
    Bitboard(bb)
}

static WHITE_CASTLE: CastleInfo = CastleInfo {
    start_king: Square::E1,
    short_rook: Square::H1,
    long_rook: Square::A1,
    after_short_king: Square::G1,
    after_short_rook: Square::F1,
    after_long_king: Square::C1,
    after_long_rook: Square::D1,
    short_mask: squares_bb(&[Square::F1, Square::G1]),
    long_occ_mask: squares_bb(&[Square::B1, Square::C1, Square::D1]),
    long_danger_mask: squares_bb(&[Square::C1, Square::D1]),
};

static BLACK_CASTLE: CastleInfo = CastleInfo {
    start_king: Square::E8,
    short_rook: Square::H8,
    long_rook: Square::A8,
    after_short_king: Square::G8,
    after_short_rook: Square::F8,
    after_long_king: Square::C8,
    after_long_rook: Square::D8,
    short_mask: squares_bb(&[Square::F8, Square::G8]),
    long_occ_mask: squares_bb(&[Square::B8, Square::C8, Square::D8]),
    long_danger_mask: squares_bb(&[Square::C8, Square::D8]),
};

/// 指定手番のキャスリング情報
#[inline]
pub fn castle_info(c: Color) -> &'static CastleInfo {
    match c {
        Color::White => &WHITE_CASTLE,
        Color::Black => &BLACK_CASTLE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_castle_masks() {
        let w = castle_info(Color::White);
        assert_eq!(w.short_mask.count(), 2);
        assert_eq!(w.long_occ_mask.count(), 3);
        assert_eq!(w.long_danger_mask.count(), 2);
        assert!(w.long_occ_mask.contains(Square::B1));
        assert!(!w.long_danger_mask.contains(Square::B1));

        let b = castle_info(Color::Black);
        assert_eq!(b.start_king, Square::E8);
        assert_eq!(b.after_long_king, Square::C8);
    }
}
