//! ビットボードモジュール
//!
//! 64マスの盤面を64bitで表現し、ビット演算と利き計算を提供する。
//!
//! - `Bitboard`: 64bit盤面表現
//! - 近接駒の利きテーブル（キング・ナイト・ポーン）
//! - 遠方駒の利き計算（ビショップ・ルーク、古典的レイ方式）
//! - 爆発マスク（`blast_mask` = 中心 ∪ キング近傍）
//! - `between_bb` / パッサーマスク

mod core;
mod tables;

pub use core::{Bitboard, BitboardIter};
pub use tables::{
    between_bb, bishop_attacks, blast_mask, king_attacks, knight_attacks, passer_mask,
    pawn_attacks, pawn_pushes, queen_attacks, rook_attacks,
};
