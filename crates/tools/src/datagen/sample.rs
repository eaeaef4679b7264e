//! 教師サンプルとバイナリ形式
//!
//! 1レコードのレイアウト（リトルエンディアン）:
//!
//! ```text
//! u8  n        駒数 (2..=32)
//! u8  stm      手番 (1=白, 0=黒)
//! n × { u8 code, u8 square }   code=0..11 (白PNBRQK, 黒PNBRQK)
//!                              square = rank*8 + (7 - file)  ※筋ミラー
//! i16 score    手番視点のスコア（i16にクランプ）
//! i8  result   手番視点 0=負け, 1=引き分け, 2=勝ち
//! ```
//!
//! 駒は (code, square) 昇順に並ぶ。読み出しは壊れたレコードでNoneを返し、
//! 呼び出し側がスキップできるようにする。

use std::io::{self, Read, Write};

use ratomic_core::position::Position;
use ratomic_core::types::{Color, PieceType, Square, Value};

/// 対局結果（ある視点から見た勝敗）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameResult {
    Loss,
    Draw,
    Win,
}

impl GameResult {
    /// 視点を反転した結果
    pub fn mirrored(self) -> GameResult {
        match self {
            GameResult::Loss => GameResult::Win,
            GameResult::Draw => GameResult::Draw,
            GameResult::Win => GameResult::Loss,
        }
    }

    /// `result` が `pov_a` 視点の結果のとき、`pov_b` 視点の結果に換算する
    pub fn relative(self, pov_a: Color, pov_b: Color) -> GameResult {
        if pov_a == pov_b {
            self
        } else {
            self.mirrored()
        }
    }
}

/// 教師サンプル（局面 + 手番視点スコア + 手番視点結果）
#[derive(Debug, Clone, Copy)]
pub struct Sample {
    pub position: Position,
    pub score: Value,
    pub result: GameResult,
}

impl Sample {
    /// 結果未確定のサンプルを作る（結果は対局終了後に刻印する）
    pub fn new(position: Position, score: Value) -> Sample {
        Sample {
            position,
            score,
            result: GameResult::Draw,
        }
    }

    /// サンプルの視点（記録時の手番）
    pub fn pov(&self) -> Color {
        self.position.side_to_move()
    }

    /// バイナリ形式で書き出す
    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let mut pieces: Vec<(u8, u8)> = Vec::with_capacity(self.position.num_pieces());

        for color in [Color::White, Color::Black] {
            for pt in PieceType::ALL {
                for sq in self.position.us(color).plane(pt) {
                    let code = pt.index() as u8 + if color == Color::Black { 6 } else { 0 };
                    let sq_idx = sq.rank() * 8 + (7 - sq.file());
                    pieces.push((code, sq_idx));
                }
            }
        }
        pieces.sort_unstable();

        let n = pieces.len() as u8;
        let stm: u8 = match self.position.side_to_move() {
            Color::White => 1,
            Color::Black => 0,
        };
        out.write_all(&[n, stm])?;
        for (code, sq) in pieces {
            out.write_all(&[code, sq])?;
        }

        let score = self.score.raw().clamp(i16::MIN as i32, i16::MAX as i32) as i16;
        out.write_all(&score.to_le_bytes())?;

        let result: i8 = match self.result {
            GameResult::Loss => 0,
            GameResult::Draw => 1,
            GameResult::Win => 2,
        };
        out.write_all(&result.to_le_bytes())?;
        Ok(())
    }
}

/// バイナリ形式から1サンプル読む
///
/// EOFや壊れたレコード（駒数範囲外・不正な駒コード・キング数不一致）では
/// `None` を返す。
pub fn read_sample<R: Read>(input: &mut R) -> Option<Sample> {
    let mut header = [0u8; 2];
    input.read_exact(&mut header).ok()?;
    let (n, stm) = (header[0], header[1]);

    if !(2..=32).contains(&n) || stm > 1 {
        return None;
    }

    let mut pos = Position::new();
    pos.latent.ply_count = if stm == 1 { 0 } else { 1 };

    let mut white_kings = 0u8;
    let mut black_kings = 0u8;

    for _ in 0..n {
        let mut entry = [0u8; 2];
        input.read_exact(&mut entry).ok()?;
        let (code, sq_idx) = (entry[0], entry[1]);
        if code >= 12 || sq_idx >= 64 {
            return None;
        }

        let color = if code < 6 { Color::White } else { Color::Black };
        let pt = PieceType::from_index((code % 6) as usize);
        // 直列化は筋ミラーされているので戻す
        let file = 7 - (sq_idx % 8);
        let rank = sq_idx / 8;
        let sq = Square::new(file, rank);

        if pos.piece_at(sq).is_some() {
            return None;
        }
        pos.add_piece(color, pt, sq);

        if pt == PieceType::King {
            match color {
                Color::White => white_kings += 1,
                Color::Black => black_kings += 1,
            }
        }
    }

    if white_kings != 1 || black_kings != 1 {
        return None;
    }

    let mut score_bytes = [0u8; 2];
    input.read_exact(&mut score_bytes).ok()?;
    let score = i16::from_le_bytes(score_bytes);

    let mut result_byte = [0u8; 1];
    input.read_exact(&mut result_byte).ok()?;
    let result = match result_byte[0] as i8 {
        0 => GameResult::Loss,
        1 => GameResult::Draw,
        2 => GameResult::Win,
        _ => return None,
    };

    let mut sample = Sample::new(pos, Value::new(score as i32));
    sample.result = result;
    Some(sample)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_roundtrip() {
        let pos = Position::parse_fen("4k3/2n5/8/3p4/8/8/3R4/4K3 b - - 0 1").unwrap();
        let mut sample = Sample::new(pos, Value::new(-123));
        sample.result = GameResult::Win;

        let mut buf = Vec::new();
        sample.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), 2 + 2 * 5 + 2 + 1);

        let restored = read_sample(&mut buf.as_slice()).unwrap();
        assert_eq!(restored.position.fen().split(' ').next(), pos.fen().split(' ').next());
        assert_eq!(restored.position.side_to_move(), Color::Black);
        assert_eq!(restored.score, Value::new(-123));
        assert_eq!(restored.result, GameResult::Win);
    }

    #[test]
    fn test_sample_score_clamped() {
        let pos = Position::parse_fen("4k3/8/8/8/8/8/8/4K3 w - - 0 1").unwrap();
        let sample = Sample::new(pos, Value::new(1_000_000));
        let mut buf = Vec::new();
        sample.write_to(&mut buf).unwrap();
        let restored = read_sample(&mut buf.as_slice()).unwrap();
        assert_eq!(restored.score, Value::new(i16::MAX as i32));
    }

    #[test]
    fn test_sample_pieces_sorted() {
        let pos = Position::startpos();
        let sample = Sample::new(pos, Value::ZERO);
        let mut buf = Vec::new();
        sample.write_to(&mut buf).unwrap();

        assert_eq!(buf[0], 32);
        assert_eq!(buf[1], 1);
        let mut prev = (0u8, 0u8);
        for chunk in buf[2..2 + 64].chunks_exact(2) {
            let cur = (chunk[0], chunk[1]);
            assert!(cur > prev || prev == (0, 0));
            prev = cur;
        }
    }

    #[test]
    fn test_read_rejects_malformed() {
        // 駒数範囲外
        assert!(read_sample(&mut [1u8, 1].as_slice()).is_none());
        // キング不足
        let pos = Position::parse_fen("4k3/8/8/8/8/8/8/4K3 w - - 0 1").unwrap();
        let sample = Sample::new(pos, Value::ZERO);
        let mut buf = Vec::new();
        sample.write_to(&mut buf).unwrap();
        buf[2] = 0; // 白キングのコードをポーンへ書き換え
        assert!(read_sample(&mut buf.as_slice()).is_none());
        // EOF途中
        assert!(read_sample(&mut buf[..3].to_vec().as_slice()).is_none());
    }

    #[test]
    fn test_relative_result() {
        assert_eq!(GameResult::Win.relative(Color::White, Color::White), GameResult::Win);
        assert_eq!(GameResult::Win.relative(Color::White, Color::Black), GameResult::Loss);
        assert_eq!(GameResult::Draw.relative(Color::White, Color::Black), GameResult::Draw);
    }

    #[test]
    fn test_square_mirror_convention() {
        // 白キングe1: code=5, square = 0*8 + (7-4) = 3
        let pos = Position::parse_fen("4k3/8/8/8/8/8/8/4K3 w - - 0 1").unwrap();
        let sample = Sample::new(pos, Value::ZERO);
        let mut buf = Vec::new();
        sample.write_to(&mut buf).unwrap();
        // (code, square) 昇順: 白K(5,3), 黒k(11, 7*8+(7-4)=59)
        assert_eq!(&buf[2..6], &[5, 3, 11, 59]);
    }
}
