//! 入力特徴の定義
//!
//! 特徴インデックスは
//! `bucket * INPUT_SIZE + 敵味方(0/1) * 384 + 駒種 * 64 + マス`。
//! マスは視点が黒のとき段を反転して正規化する。キングバケットは
//! 視点側キングの位置で決まり、境界を跨ぐキング移動はその視点の
//! 全特徴の作り直し（refresh）を要求する。

use crate::types::{Color, PieceType, Square};

use super::INPUT_SIZE;

/// キングバケット数
pub const BUCKET_COUNT: usize = 4;

/// キング位置 → バケット（白視点。黒は段反転してから引く）
#[rustfmt::skip]
const KING_BUCKETS: [u8; 64] = [
    0, 0, 1, 1, 1, 1, 0, 0,
    2, 2, 3, 3, 3, 3, 2, 2,
    2, 2, 3, 3, 3, 3, 2, 2,
    2, 2, 3, 3, 3, 3, 2, 2,
    2, 2, 3, 3, 3, 3, 2, 2,
    2, 2, 3, 3, 3, 3, 2, 2,
    2, 2, 3, 3, 3, 3, 2, 2,
    2, 2, 3, 3, 3, 3, 2, 2,
];

/// 視点から見たマスのインデックス（黒は段反転）
#[inline]
fn perspective_square(sq: Square, perspective: Color) -> usize {
    match perspective {
        Color::White => sq.index(),
        Color::Black => sq.flip_rank().index(),
    }
}

/// 視点側キングのバケット
#[inline]
pub fn bucket_of(perspective: Color, king: Square) -> usize {
    KING_BUCKETS[perspective_square(king, perspective)] as usize
}

/// キング移動でこの視点のrefreshが必要か
#[inline]
pub fn refresh_required(perspective: Color, prev_king: Square, next_king: Square) -> bool {
    bucket_of(perspective, prev_king) != bucket_of(perspective, next_king)
}

/// 特徴インデックスを計算
#[inline]
pub fn feature_index(
    perspective: Color,
    piece_color: Color,
    piece: PieceType,
    sq: Square,
    king: Square,
) -> usize {
    const COLOR_STRIDE: usize = 6 * 64;
    const PIECE_STRIDE: usize = 64;

    let side = (piece_color != perspective) as usize;
    bucket_of(perspective, king) * INPUT_SIZE
        + side * COLOR_STRIDE
        + piece.index() * PIECE_STRIDE
        + perspective_square(sq, perspective)
}
